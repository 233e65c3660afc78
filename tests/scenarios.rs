//! End-to-end lifecycle scenarios against a real sled database and upload
//! directory, one temporary directory per test.
#![allow(unused_imports)]

use anyhow::Context;
use image::{Rgba, RgbaImage};
use process_file::{
    ApprovalDecision, Equipment, FileQuery, FileStatus, InMemoryEquipmentDirectory,
    OverlayWarning, ProcessFileError, ProcessFileForm, ProcessFileService, RoleCode,
    ServiceConfig, SignatureType, SignatureUpload, UploadForm, ValidationError,
    auth::Actor,
    detail::{ActionSetting, ActionTable, MaterialInfo, ProcessFileDetail},
    model::FileType,
    seal,
    types::{PageRequest, TimeStamp},
};
use std::collections::BTreeSet;
use std::sync::Arc;

use tempfile::{TempDir, tempdir}; // Use for test db and upload cleanup.

const EQUIPMENT_ID: u64 = 7;

struct Fixture {
    // Keeps the database and upload root alive for the test's duration.
    dir: TempDir,
    service: ProcessFileService,
    equipment: Arc<InMemoryEquipmentDirectory>,
}

impl Fixture {
    fn upload_root(&self) -> std::path::PathBuf {
        self.dir.path().join("uploads")
    }
}

fn setup() -> anyhow::Result<Fixture> {
    // Sled locks its directory, so every test gets its own database.
    let dir = tempdir()?;
    let config = ServiceConfig::default()
        .set_database_path(dir.path().join("process-files.db"))
        .set_upload_root(dir.path().join("uploads"))
        .set_company_name("测试电器有限公司");

    let equipment = Arc::new(InMemoryEquipmentDirectory::new());
    equipment.insert(
        Equipment::new(EQUIPMENT_ID, "EQ-007", "海天 MA1600")
            .set_machine_no("M07")
            .set_robot_model("YS-500"),
    );
    equipment.insert(Equipment::new(8, "EQ-008", "震雄 JM200").set_machine_no("M07"));

    let service = ProcessFileService::open(&config, equipment.clone())?;
    Ok(Fixture {
        dir,
        service,
        equipment,
    })
}

fn preparer() -> Actor {
    Actor::new(1, "张三").with_role(RoleCode::InjectionLeader)
}

fn director() -> Actor {
    Actor::new(2, "李四").with_role(RoleCode::WorkshopDirector)
}

fn tech_manager() -> Actor {
    Actor::new(3, "王五").with_role(RoleCode::ProductionTechManager)
}

fn injection_manager() -> Actor {
    Actor::new(4, "赵六").with_role(RoleCode::InjectionManager)
}

/// A white pad with a dark stroke; `seed` changes the stroke so every
/// signature is a distinct image.
fn signature(seed: u32) -> SignatureUpload {
    let mut img = RgbaImage::from_pixel(200, 80, Rgba([255, 255, 255, 255]));
    for x in 20..(60 + seed * 20) {
        for y in 30..(36 + seed) {
            img.put_pixel(x, y, Rgba([10, 10, 40, 255]));
        }
    }
    let png = seal::encode_png(img).expect("png encoding");
    SignatureUpload::new(png)
        .set_ip_address("10.0.0.8")
        .set_device_info("tablet")
}

fn detail() -> ProcessFileDetail {
    ProcessFileDetail::new()
        .set_material(MaterialInfo {
            material_name: Some("PP".into()),
            material_grade: Some("K8003".into()),
            part_net_weight: Some(12.5),
            ..MaterialInfo::default()
        })
        .set_actions(ActionTable {
            injection1: ActionSetting::new(80.0, 60.5, 45.0),
            holding1: ActionSetting::new(40.0, 30.0, 10.0),
            ..ActionTable::default()
        })
}

fn create(fx: &Fixture, file_no: &str) -> anyhow::Result<u64> {
    let form = ProcessFileForm::new(EQUIPMENT_ID, file_no, &format!("{file_no}.xlsx"))
        .set_detail(detail())
        .set_remark("首版");
    fx.service
        .save_form(&form, &preparer())
        .context("create failed")
}

/// Drives a fresh document all the way to Effective.
fn make_effective(fx: &Fixture, file_no: &str) -> anyhow::Result<u64> {
    let id = create(fx, file_no)?;
    fx.service.submit(id, &preparer(), &signature(1))?;
    fx.service
        .approve(id, &director(), &ApprovalDecision::pass(), Some(&signature(2)))?;
    fx.service
        .approve(id, &tech_manager(), &ApprovalDecision::pass(), Some(&signature(3)))?;
    fx.service
        .approve(id, &injection_manager(), &ApprovalDecision::pass(), Some(&signature(4)))?;
    Ok(id)
}

/// Distinct media parts in an xlsx container. Zip entry names are stored
/// uncompressed so a byte scan is enough.
fn media_parts(xlsx: &[u8]) -> BTreeSet<String> {
    let needle = b"xl/media/";
    let mut parts = BTreeSet::new();
    for start in 0..xlsx.len().saturating_sub(needle.len()) {
        if &xlsx[start..start + needle.len()] != needle {
            continue;
        }
        let name: Vec<u8> = xlsx[start..]
            .iter()
            .take(40)
            .copied()
            .take_while(|b| b.is_ascii_alphanumeric() || *b == b'/' || *b == b'.' || *b == b'_')
            .collect();
        let name = String::from_utf8_lossy(&name).into_owned();
        if name.ends_with(".png") {
            parts.insert(name);
        }
    }
    parts
}

/// PNG files stored under `dir`, at any depth.
fn stored_pngs(dir: &std::path::Path) -> anyhow::Result<usize> {
    if !dir.exists() {
        return Ok(0);
    }
    let mut count = 0;
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            count += stored_pngs(&path)?;
        } else if path.extension().is_some_and(|e| e == "png") {
            count += 1;
        }
    }
    Ok(count)
}

#[test]
fn document_becomes_effective_and_downloads_with_overlays() -> anyhow::Result<()> {
    let fx = setup()?;
    let id = create(&fx, "GY-2024-001")?;
    assert_eq!(fx.service.file(id)?.status, FileStatus::Draft);

    let file = fx
        .service
        .submit(id, &preparer(), &signature(1))
        .context("submit failed")?;
    assert_eq!(file.status, FileStatus::PendingWorkshopDirectorReview);
    assert!(file.submit_time.is_some());
    assert_eq!(fx.service.signatures(id)?.len(), 1);

    let file = fx
        .service
        .approve(id, &director(), &ApprovalDecision::pass(), Some(&signature(2)))?;
    assert_eq!(file.status, FileStatus::PendingProductionTechManagerApproval);
    let doc = fx.service.document(id)?;
    assert_eq!(doc.approvals.len(), 1);
    assert_eq!(doc.approvals[0].approval.approval_level.number(), 1);
    assert_eq!(doc.next_approver_role, Some("生产技术部经理"));

    let file = fx
        .service
        .approve(id, &tech_manager(), &ApprovalDecision::pass(), Some(&signature(3)))?;
    assert_eq!(file.status, FileStatus::PendingInjectionManagerCountersign);

    let file = fx.service.approve(
        id,
        &injection_manager(),
        &ApprovalDecision::pass().set_opinion("同意"),
        Some(&signature(4)),
    )?;
    assert_eq!(file.status, FileStatus::Effective);
    assert!(file.effective_time.is_some());
    assert!(file.approval_time.is_some());

    let doc = fx.service.document(id)?;
    let seal = doc.seal.context("seal missing")?;
    assert_eq!(seal.seal_type, "受控章");
    assert!(seal.seal_no.starts_with("SEAL"));
    assert_eq!(doc.approvals.len(), 3);
    assert!(doc.approvals.iter().all(|a| a.signature.is_some()));
    assert_eq!(doc.status_text, "已批准（生效中）");

    // Nothing was rendered along the way, the first download materializes.
    assert_eq!(fx.service.file(id)?.file_type, FileType::Form);
    let download = fx.service.download(id).context("download failed")?;
    assert_eq!(download.file_name, "GY-2024-001.xlsx");
    assert_eq!(&download.bytes[..2], b"PK");
    assert_eq!(media_parts(&download.bytes).len(), 5, "four signatures and one seal");

    let file = fx.service.file(id)?;
    assert_eq!(file.file_type, FileType::Xlsx);
    assert_eq!(file.file_size, download.bytes.len() as u64);
    assert!(file.file_path.ends_with("GY-2024-001.xlsx"));
    let manifest = file.artifact.context("manifest missing")?;
    assert_eq!(manifest.signature_ids.len(), 4);
    assert!(manifest.sealed);

    assert!(!fx.service.seal_image(id)?.is_empty());
    Ok(())
}

#[test]
fn rejection_then_revision_starts_a_new_version() -> anyhow::Result<()> {
    let fx = setup()?;
    let id = create(&fx, "GY-2024-002")?;
    fx.service.submit(id, &preparer(), &signature(1))?;
    fx.service
        .approve(id, &director(), &ApprovalDecision::pass(), Some(&signature(2)))?;
    fx.service
        .approve(id, &tech_manager(), &ApprovalDecision::pass(), Some(&signature(3)))?;

    // a reject needs no signature
    let file = fx.service.approve(
        id,
        &injection_manager(),
        &ApprovalDecision::reject().set_opinion("保压参数偏高"),
        None,
    )?;
    assert_eq!(file.status, FileStatus::Rejected);
    assert!(fx.service.document(id)?.seal.is_none());

    let missing_reason = fx
        .service
        .save_form(&ProcessFileForm::revision(id, "  "), &preparer())
        .unwrap_err();
    assert!(matches!(
        missing_reason,
        ProcessFileError::Validation(ValidationError::MissingChangeReason)
    ));

    let mut change = ProcessFileDetail::new();
    change.actions.holding1.pressure = Some(35.0);
    let revision = ProcessFileForm::revision(id, "调整保压参数").set_detail(change);
    let v2 = fx.service.save_form(&revision, &preparer())?;

    let new = fx.service.file(v2)?;
    let old = fx.service.file(id)?;
    assert_eq!(new.version, 2);
    assert_eq!(new.status, FileStatus::Draft);
    assert_eq!(new.parent_file_id, Some(id));
    assert!(new.is_current);
    assert!(!old.is_current);
    assert_eq!(old.status, FileStatus::Rejected);
    assert!(new.file_no.starts_with("PF"));
    assert_eq!(new.file_no.len(), 13);
    assert_eq!(new.file_name, format!("注塑工艺卡片_{}.xlsx", new.file_no));
    assert_eq!(new.change_reason.as_deref(), Some("调整保压参数"));
    assert_eq!(new.remark.as_deref(), Some("首版"));

    // copied forward, then overlaid
    let detail = fx.service.detail(v2)?;
    assert_eq!(detail.material.material_name.as_deref(), Some("PP"));
    assert_eq!(detail.actions.holding1.pressure, Some(35.0));
    assert_eq!(detail.actions.holding1.flow, Some(30.0));
    assert_eq!(fx.service.detail(id)?.actions.holding1.pressure, Some(40.0));

    let chain = fx.service.version_chain(id)?;
    assert_eq!(chain.iter().map(|f| f.version).collect::<Vec<_>>(), vec![1, 2]);
    assert_eq!(chain.iter().filter(|f| f.is_current).count(), 1);

    // only the head of a chain can be revised
    let stale = fx
        .service
        .save_form(&ProcessFileForm::revision(id, "again"), &preparer())
        .unwrap_err();
    assert_eq!(stale.status_code(), 409);

    let v3 = fx
        .service
        .save_form(&ProcessFileForm::revision(v2, "再次调整"), &preparer())?;
    let v3_file = fx.service.file(v3)?;
    assert_eq!(v3_file.version, 3);
    assert_ne!(v3_file.file_no, new.file_no);
    let head = fx.service.current_version(id)?.context("chain has a head")?;
    assert_eq!(head.id, v3);
    Ok(())
}

#[test]
fn creation_is_validated() -> anyhow::Result<()> {
    let fx = setup()?;
    create(&fx, "GY-2024-003")?;

    let duplicate = create(&fx, "GY-2024-003").unwrap_err();
    let duplicate = duplicate.downcast::<ProcessFileError>()?;
    assert!(matches!(duplicate, ProcessFileError::Conflict(_)));

    let traversal = ProcessFileForm::new(EQUIPMENT_ID, "../etc", "x.xlsx");
    let err = fx.service.save_form(&traversal, &preparer()).unwrap_err();
    assert!(matches!(
        err,
        ProcessFileError::Validation(ValidationError::IllegalCharacters { field: "fileNo", .. })
    ));

    let blank_name = ProcessFileForm::new(EQUIPMENT_ID, "GY-2024-004", " ");
    let err = fx.service.save_form(&blank_name, &preparer()).unwrap_err();
    assert!(matches!(
        err,
        ProcessFileError::Validation(ValidationError::MissingFileName)
    ));

    let unknown = ProcessFileForm::new(999, "GY-2024-005", "x.xlsx");
    let err = fx.service.save_form(&unknown, &preparer()).unwrap_err();
    assert_eq!(err.status_code(), 404);
    Ok(())
}

#[test]
fn roles_and_ownership_gate_transitions() -> anyhow::Result<()> {
    let fx = setup()?;
    let id = create(&fx, "GY-2024-006")?;

    let err = fx.service.submit(id, &director(), &signature(1)).unwrap_err();
    assert!(matches!(err, ProcessFileError::PermissionDenied(_)));

    let err = fx
        .service
        .approve(id, &director(), &ApprovalDecision::pass(), Some(&signature(2)))
        .unwrap_err();
    assert!(matches!(err, ProcessFileError::InvalidStateTransition(_)));

    fx.service.submit(id, &preparer(), &signature(1))?;
    let err = fx.service.submit(id, &preparer(), &signature(1)).unwrap_err();
    assert_eq!(err.status_code(), 409);

    for wrong in [preparer(), tech_manager(), injection_manager()] {
        let err = fx
            .service
            .approve(id, &wrong, &ApprovalDecision::pass(), Some(&signature(2)))
            .unwrap_err();
        assert!(matches!(err, ProcessFileError::PermissionDenied(_)));
    }
    let err = fx
        .service
        .approve(id, &director(), &ApprovalDecision::pass(), None)
        .unwrap_err();
    assert!(matches!(
        err,
        ProcessFileError::Validation(ValidationError::MissingApprovalSignature)
    ));

    assert_eq!(fx.service.file(id)?.status, FileStatus::PendingWorkshopDirectorReview);
    assert!(fx.service.document(id)?.approvals.is_empty());

    // a legacy role name alone is enough
    let legacy = Actor::from_identities(
        9,
        "老周",
        [process_file::RoleIdentity::LegacyName("车间主任".into())],
    );
    let file = fx
        .service
        .approve(id, &legacy, &ApprovalDecision::pass(), Some(&signature(2)))?;
    assert_eq!(file.status, FileStatus::PendingProductionTechManagerApproval);
    Ok(())
}

#[test]
fn repeated_download_reuses_the_artifact() -> anyhow::Result<()> {
    let fx = setup()?;
    let id = make_effective(&fx, "GY-2024-007")?;

    let first = fx.service.materializer().obtain_artifact(id)?;
    assert!(first.report.regenerated);
    assert!(first.report.sealed);
    assert!(first.report.warnings.is_empty());

    let second = fx.service.materializer().obtain_artifact(id)?;
    assert!(!second.report.regenerated);
    assert_eq!(first.bytes, second.bytes);
    assert_eq!(fx.service.download(id)?.bytes, first.bytes);

    // nothing changed, so an overlay pass is a no-op as well
    let report = fx.service.ensure_overlaid(id)?.context("materialized")?;
    assert!(!report.regenerated);
    Ok(())
}

#[test]
fn corrupted_or_deleted_artifact_is_rebuilt() -> anyhow::Result<()> {
    let fx = setup()?;
    let id = make_effective(&fx, "GY-2024-008")?;
    fx.service.download(id)?;
    let path = fx.service.file(id)?.file_path;
    let on_disk = fx.upload_root().join(&path);

    std::fs::write(&on_disk, b"PK truncated")?;
    let repaired = fx.service.materializer().obtain_artifact(id)?;
    assert!(repaired.report.regenerated);
    assert_eq!(repaired.file.file_path, path, "regeneration keeps the recorded path");
    assert_eq!(std::fs::read(&on_disk)?, repaired.bytes);
    assert_eq!(media_parts(&repaired.bytes).len(), 5);

    std::fs::remove_file(&on_disk)?;
    let rebuilt = fx.service.materializer().obtain_artifact(id)?;
    assert!(rebuilt.report.regenerated);
    assert!(on_disk.exists());
    Ok(())
}

#[test]
fn new_signatures_reach_a_materialized_artifact() -> anyhow::Result<()> {
    let fx = setup()?;
    let id = create(&fx, "GY-2024-009")?;
    fx.service.submit(id, &preparer(), &signature(1))?;

    let first = fx.service.download(id)?;
    assert_eq!(media_parts(&first.bytes).len(), 1);

    // approving re-renders right away
    fx.service
        .approve(id, &director(), &ApprovalDecision::pass(), Some(&signature(2)))?;
    let manifest = fx.service.file(id)?.artifact.context("manifest")?;
    assert_eq!(manifest.signature_ids.len(), 2);
    assert!(!manifest.sealed);

    let second = fx.service.materializer().obtain_artifact(id)?;
    assert!(!second.report.regenerated);
    assert_eq!(media_parts(&second.bytes).len(), 2);

    // a recaptured submit signature replaces the earlier one on the card
    let sig = fx
        .service
        .capture_signature(id, SignatureType::Submit, &signature(5), &preparer())?;
    let manifest = fx.service.file(id)?.artifact.context("manifest")?;
    assert!(manifest.signature_ids.contains(&sig));
    assert_eq!(manifest.signature_ids.len(), 2);
    assert_eq!(fx.service.signatures(id)?.len(), 3);
    assert!(!fx.service.signature_image(sig)?.is_empty());
    Ok(())
}

#[test]
fn missing_signature_image_is_a_soft_failure() -> anyhow::Result<()> {
    let fx = setup()?;
    let id = create(&fx, "GY-2024-010")?;
    fx.service.submit(id, &preparer(), &signature(1))?;
    fx.service
        .approve(id, &director(), &ApprovalDecision::pass(), Some(&signature(2)))?;

    let signatures = fx.service.signatures(id)?;
    let lost = &signatures[0].signature;
    let lost_path = fx.upload_root().join(&lost.signature_image_path);
    let image = std::fs::read(&lost_path)?;
    std::fs::remove_file(&lost_path)?;

    let artifact = fx.service.materializer().obtain_artifact(id)?;
    assert_eq!(artifact.report.signatures_placed, 1);
    assert_eq!(
        artifact.report.warnings,
        vec![OverlayWarning::ImageMissing {
            signature_id: lost.id,
            path: lost.signature_image_path.clone(),
        }]
    );
    assert_eq!(media_parts(&artifact.bytes).len(), 1);
    let manifest = fx.service.file(id)?.artifact.context("manifest")?;
    assert!(!manifest.signature_ids.contains(&lost.id), "only placed signatures are recorded");

    // once the image is back the next download places it
    std::fs::write(&lost_path, image)?;
    let repaired = fx.service.materializer().obtain_artifact(id)?;
    assert!(repaired.report.regenerated);
    assert_eq!(repaired.report.signatures_placed, 2);
    assert!(repaired.report.warnings.is_empty());
    assert_eq!(media_parts(&repaired.bytes).len(), 2);
    assert!(!fx.service.materializer().obtain_artifact(id)?.report.regenerated);
    Ok(())
}

#[test]
fn missing_equipment_fails_generation() -> anyhow::Result<()> {
    let fx = setup()?;
    let id = create(&fx, "GY-2024-011")?;
    fx.equipment.remove(EQUIPMENT_ID);

    let err = fx.service.download(id).unwrap_err();
    assert!(matches!(err, ProcessFileError::ArtifactGeneration(_)));
    assert_eq!(err.status_code(), 422);
    let file = fx.service.file(id)?;
    assert_eq!(file.file_type, FileType::Form);
    assert!(file.file_path.is_empty());
    Ok(())
}

#[test]
fn concurrent_same_level_approval_has_one_winner() -> anyhow::Result<()> {
    let fx = setup()?;
    let id = create(&fx, "GY-2024-012")?;
    fx.service.submit(id, &preparer(), &signature(1))?;

    let service = &fx.service;
    let results: Vec<_> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..4u64)
            .map(|n| {
                scope.spawn(move || {
                    let approver =
                        Actor::new(100 + n, "主任").with_role(RoleCode::WorkshopDirector);
                    service.approve(id, &approver, &ApprovalDecision::pass(), Some(&signature(2)))
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().expect("approver thread panicked"))
            .collect()
    });

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    for err in results.iter().filter_map(|r| r.as_ref().err()) {
        assert!(matches!(err, ProcessFileError::InvalidStateTransition(_)));
    }
    assert_eq!(
        fx.service.file(id)?.status,
        FileStatus::PendingProductionTechManagerApproval
    );
    assert_eq!(fx.service.document(id)?.approvals.len(), 1);
    let level1 = fx
        .service
        .signatures(id)?
        .into_iter()
        .filter(|s| s.signature.signature_type == SignatureType::ApproveLevel1)
        .count();
    assert_eq!(level1, 1);

    // images of the refused decisions are removed again
    assert_eq!(
        stored_pngs(&fx.upload_root().join("signatures"))?,
        fx.service.signatures(id)?.len()
    );
    Ok(())
}

#[test]
fn batch_invalidation_covers_the_equipment() -> anyhow::Result<()> {
    let fx = setup()?;
    let a = create(&fx, "GY-2024-013")?;
    let b = make_effective(&fx, "GY-2024-014")?;
    let c = create(&fx, "GY-2024-015")?;
    fx.service.invalidate(c, &director())?;

    let other = fx.service.save_form(
        &ProcessFileForm::new(8, "GY-2024-016", "other.xlsx"),
        &preparer(),
    )?;

    let count = fx.service.batch_invalidate_by_equipment(EQUIPMENT_ID, &director())?;
    assert_eq!(count, 2);
    for id in [a, b, c] {
        let file = fx.service.file(id)?;
        assert_eq!(file.status, FileStatus::Invalidated);
        assert!(file.invalid_time.is_some());
        assert!(!file.enabled);
    }
    assert_eq!(fx.service.file(other)?.status, FileStatus::Draft);

    // history survives
    assert_eq!(fx.service.document(b)?.approvals.len(), 3);
    assert!(fx.service.document(b)?.seal.is_some());

    let err = fx.service.invalidate(a, &director()).unwrap_err();
    assert!(matches!(err, ProcessFileError::InvalidStateTransition(_)));
    assert_eq!(fx.service.batch_invalidate_by_equipment(EQUIPMENT_ID, &director())?, 0);
    Ok(())
}

#[test]
fn one_enabled_document_per_machine() -> anyhow::Result<()> {
    let fx = setup()?;
    let first = make_effective(&fx, "GY-2024-017")?;
    let second = make_effective(&fx, "GY-2024-018")?;
    let draft = create(&fx, "GY-2024-019")?;

    let err = fx.service.set_enabled(draft).unwrap_err();
    assert!(matches!(err, ProcessFileError::InvalidStateTransition(_)));

    assert!(fx.service.set_enabled(first)?.enabled);
    assert!(fx.service.set_enabled(second)?.enabled);
    assert!(!fx.service.file(first)?.enabled);

    let enabled = fx
        .service
        .list(&FileQuery::new().set_machine_no("M07").set_enabled(true), PageRequest::default())?;
    assert_eq!(enabled.total, 1);
    assert_eq!(enabled.records[0].id, second);

    assert!(!fx.service.set_archived(second)?.enabled);
    let enabled = fx
        .service
        .list(&FileQuery::new().set_enabled(true), PageRequest::default())?;
    assert_eq!(enabled.total, 0);
    Ok(())
}

#[test]
fn pending_queue_follows_roles() -> anyhow::Result<()> {
    let fx = setup()?;
    let a = create(&fx, "GY-2024-020")?;
    let b = create(&fx, "GY-2024-021")?;
    create(&fx, "GY-2024-022")?;
    fx.service.submit(a, &preparer(), &signature(1))?;
    fx.service.submit(b, &preparer(), &signature(1))?;

    let queue = fx.service.pending_approval(&director(), PageRequest::default())?;
    assert_eq!(queue.records.iter().map(|f| f.id).collect::<Vec<_>>(), vec![a, b]);
    assert_eq!(queue.records[0].next_approver_role, Some("车间主任"));
    assert_eq!(
        fx.service
            .pending_approval(&tech_manager(), PageRequest::default())?
            .total,
        0
    );

    fx.service
        .approve(a, &director(), &ApprovalDecision::pass(), Some(&signature(2)))?;
    let queue = fx.service.pending_approval(&tech_manager(), PageRequest::default())?;
    assert_eq!(queue.records.iter().map(|f| f.id).collect::<Vec<_>>(), vec![a]);

    let both = Actor::new(50, "兼任")
        .with_role(RoleCode::WorkshopDirector)
        .with_role(RoleCode::ProductionTechManager);
    assert_eq!(fx.service.pending_approval(&both, PageRequest::default())?.total, 2);
    assert_eq!(fx.service.pending_approval(&preparer(), PageRequest::default())?.total, 0);
    Ok(())
}

#[test]
fn listing_filters_and_pages() -> anyhow::Result<()> {
    let fx = setup()?;
    for n in 0..5 {
        create(&fx, &format!("GY-2025-{n:03}"))?;
    }
    fx.service.save_form(
        &ProcessFileForm::new(8, "JM-2025-001", "jm.xlsx"),
        &preparer(),
    )?;

    let all = fx.service.list(&FileQuery::new(), PageRequest::new(1, 4))?;
    assert_eq!(all.total, 6);
    assert_eq!(all.records.len(), 4);
    assert_eq!(all.records[0].file_no, "JM-2025-001", "newest first");

    let page2 = fx.service.list(&FileQuery::new(), PageRequest::new(2, 4))?;
    assert_eq!(page2.records.len(), 2);

    let gy = fx
        .service
        .list(&FileQuery::new().set_file_no("GY-2025"), PageRequest::default())?;
    assert_eq!(gy.total, 5);

    let by_equipment = fx.service.list_by_equipment(8, PageRequest::default())?;
    assert_eq!(by_equipment.total, 1);

    let drafts = fx.service.list(
        &FileQuery::new()
            .set_status(FileStatus::Draft)
            .set_version(1)
            .set_is_current(true)
            .set_creator_name("张"),
        PageRequest::default(),
    )?;
    assert_eq!(drafts.total, 6);
    assert_eq!(drafts.records[0].version_text, "V1.0");
    assert_eq!(drafts.records[0].status_text, "草稿");
    Ok(())
}

#[test]
fn oversized_manual_numbers_do_not_break_numbering() -> anyhow::Result<()> {
    let fx = setup()?;
    let prefix = format!("PF{}", TimeStamp::new().date_code());
    let id = create(&fx, &format!("{prefix}4294967295"))?;
    create(&fx, &format!("{prefix}12345"))?;

    let v2 = fx
        .service
        .save_form(&ProcessFileForm::revision(id, "换料"), &preparer())?;
    assert_eq!(fx.service.file(v2)?.file_no, format!("{prefix}001"));

    let v3 = fx
        .service
        .save_form(&ProcessFileForm::revision(v2, "再换料"), &preparer())?;
    assert_eq!(fx.service.file(v3)?.file_no, format!("{prefix}002"));
    Ok(())
}

#[test]
fn superseded_version_cannot_be_approved() -> anyhow::Result<()> {
    let fx = setup()?;
    let v1 = create(&fx, "GY-2024-030")?;
    fx.service.submit(v1, &preparer(), &signature(1))?;
    let v2 = fx
        .service
        .save_form(&ProcessFileForm::revision(v1, "改模"), &preparer())?;

    let err = fx
        .service
        .approve(v1, &director(), &ApprovalDecision::pass(), Some(&signature(2)))
        .unwrap_err();
    assert!(matches!(err, ProcessFileError::InvalidStateTransition(_)));
    assert_eq!(err.status_code(), 409);

    let old = fx.service.file(v1)?;
    assert_eq!(old.status, FileStatus::PendingWorkshopDirectorReview);
    assert!(fx.service.document(v1)?.approvals.is_empty());
    assert_eq!(fx.service.signatures(v1)?.len(), 1);
    assert_eq!(stored_pngs(&fx.upload_root().join("signatures"))?, 1);

    // the superseded version is out of the queue, the new head is a draft
    let queue = fx.service.pending_approval(&director(), PageRequest::default())?;
    assert_eq!(queue.total, 0);
    assert_eq!(fx.service.file(v2)?.status, FileStatus::Draft);
    Ok(())
}

#[test]
fn revision_can_move_to_other_equipment() -> anyhow::Result<()> {
    let fx = setup()?;
    let v1 = create(&fx, "GY-2024-031")?;

    let unknown = ProcessFileForm::revision(v1, "换机").set_equipment_id(999);
    let err = fx.service.save_form(&unknown, &preparer()).unwrap_err();
    assert!(matches!(err, ProcessFileError::NotFound(_)));
    assert!(fx.service.file(v1)?.is_current);

    let moved = ProcessFileForm::revision(v1, "换机").set_equipment_id(8);
    let v2 = fx.service.save_form(&moved, &preparer())?;
    let file = fx.service.file(v2)?;
    assert_eq!(file.equipment_id, 8);
    assert_eq!(file.equipment_no, "EQ-008");
    assert_eq!(file.machine_no.as_deref(), Some("M07"));

    // a revision that names no equipment keeps the previous version's
    let v3 = fx
        .service
        .save_form(&ProcessFileForm::revision(v2, "微调"), &preparer())?;
    assert_eq!(fx.service.file(v3)?.equipment_no, "EQ-008");

    let chain = fx.service.version_chain(v1)?;
    assert_eq!(chain.iter().map(|f| f.id).collect::<Vec<_>>(), vec![v1, v2, v3]);
    assert_eq!(fx.service.list_by_equipment(8, PageRequest::default())?.total, 2);
    assert_eq!(fx.service.list_by_equipment(EQUIPMENT_ID, PageRequest::default())?.total, 1);
    Ok(())
}

#[test]
fn uploaded_workbook_is_versioned_and_served_as_uploaded() -> anyhow::Result<()> {
    let fx = setup()?;
    let workbook = b"PK\x03\x04 uploaded process card".to_vec();
    let id = fx
        .service
        .upload_document(
            &UploadForm::new(EQUIPMENT_ID, "注塑工艺卡.xlsx").set_remark("外部导入"),
            &workbook,
            &preparer(),
        )
        .context("upload failed")?;

    let file = fx.service.file(id)?;
    assert_eq!(file.file_type, FileType::Upload);
    assert_eq!(file.status, FileStatus::Draft);
    assert_eq!(file.version, 1);
    assert!(file.file_no.starts_with("PF"));
    assert_eq!(file.file_name, "注塑工艺卡.xlsx");
    assert!(file.file_path.ends_with(&format!("{}.xlsx", file.file_no)));
    assert_eq!(file.file_size, workbook.len() as u64);
    assert_eq!(file.equipment_no, "EQ-007");

    let download = fx.service.download(id)?;
    assert_eq!(download.bytes, workbook);
    assert_eq!(download.file_name, "注塑工艺卡.xlsx");

    // signatures are recorded but the stored workbook is left untouched
    fx.service.submit(id, &preparer(), &signature(1))?;
    fx.service
        .approve(id, &director(), &ApprovalDecision::pass(), Some(&signature(2)))?;
    let artifact = fx.service.materializer().obtain_artifact(id)?;
    assert!(!artifact.report.regenerated);
    assert_eq!(artifact.report.signatures_placed, 0);
    assert_eq!(artifact.report.warnings.len(), 2);
    assert!(matches!(
        artifact.report.warnings[0],
        OverlayWarning::UploadedWorkbook { .. }
    ));
    assert_eq!(artifact.bytes, workbook);

    let err = fx
        .service
        .upload_document(&UploadForm::revision(id, "v2.xls", " "), &workbook, &preparer())
        .unwrap_err();
    assert!(matches!(
        err,
        ProcessFileError::Validation(ValidationError::MissingChangeReason)
    ));

    let legacy = b"legacy xls bytes".to_vec();
    let v2 = fx.service.upload_document(
        &UploadForm::revision(id, "v2.xls", "换模"),
        &legacy,
        &preparer(),
    )?;
    let new = fx.service.file(v2)?;
    assert_eq!(new.version, 2);
    assert_eq!(new.parent_file_id, Some(id));
    assert_eq!(new.remark.as_deref(), Some("外部导入"));
    assert!(new.file_path.ends_with(".xls"));
    assert!(!fx.service.file(id)?.is_current);
    assert_eq!(fx.service.download(v2)?.bytes, legacy);

    // a workbook changed behind the service's back is refused, not served
    std::fs::write(fx.upload_root().join(&new.file_path), b"tampered")?;
    let err = fx.service.download(v2).unwrap_err();
    assert!(matches!(err, ProcessFileError::ArtifactGeneration(_)));
    Ok(())
}

#[test]
fn uploads_are_validated() -> anyhow::Result<()> {
    let fx = setup()?;
    let cases = [
        (UploadForm::new(EQUIPMENT_ID, "card.pdf"), b"%PDF".to_vec(), 400),
        (UploadForm::new(EQUIPMENT_ID, "card.xlsx"), vec![], 400),
        (UploadForm::new(EQUIPMENT_ID, "../card.xlsx"), b"PK".to_vec(), 400),
        (UploadForm::new(999, "card.xlsx"), b"PK".to_vec(), 404),
    ];
    for (form, bytes, status) in cases {
        let err = fx
            .service
            .upload_document(&form, &bytes, &preparer())
            .unwrap_err();
        assert_eq!(err.status_code(), status, "{err}");
    }
    assert!(matches!(
        fx.service
            .upload_document(&UploadForm::new(EQUIPMENT_ID, "card.pdf"), b"%PDF", &preparer())
            .unwrap_err(),
        ProcessFileError::Validation(ValidationError::UnsupportedFileType(_))
    ));
    assert_eq!(fx.service.list(&FileQuery::new(), PageRequest::default())?.total, 0);
    assert!(!fx.upload_root().join("process-files").exists());
    Ok(())
}
