//! Lazy materialization of the spreadsheet artifact and its overlays.
//!
//! The artifact is always derived data. Whatever is on disk is checked
//! against the overlay manifest stored on the file row, and rebuilt from the
//! detail record, the equipment snapshot, the live signatures and the seal
//! whenever the two disagree. Uploaded workbooks are the exception: they
//! are stored as received and never rebuilt.
use crate::card::{self, SEAL_REGION};
use crate::equipment::EquipmentDirectory;
use crate::error::{OverlayWarning, ProcessFileError, Result};
use crate::model::{FileType, OverlayManifest, ProcessFile, ProcessFileSignature};
use crate::render::{self, ImageOverlay};
use crate::seal;
use crate::sheet::{self, SheetLayout};
use crate::storage::{ArtifactLocks, DocumentStore};
use crate::store::Store;
use crate::types::TimeStamp;
use crate::workflow::{FileStatus, SignatureType};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What one materialization pass did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OverlayReport {
    pub regenerated: bool,
    pub signatures_placed: usize,
    pub sealed: bool,
    pub warnings: Vec<OverlayWarning>,
}

#[derive(Debug, Clone)]
pub struct Artifact {
    pub file: ProcessFile,
    pub bytes: Vec<u8>,
    pub report: OverlayReport,
}

/// Why the bytes on disk cannot be served as they are.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Staleness {
    NeverRendered,
    Missing,
    Unverified,
    Corrupted,
    Outdated,
}

impl Staleness {
    fn as_str(self) -> &'static str {
        match self {
            Staleness::NeverRendered => "never rendered",
            Staleness::Missing => "artifact missing on disk",
            Staleness::Unverified => "no overlay manifest",
            Staleness::Corrupted => "digest mismatch",
            Staleness::Outdated => "overlays outdated",
        }
    }
}

/// Latest signature per type, ordered by type.
pub fn live_signatures(
    signatures: Vec<ProcessFileSignature>,
) -> BTreeMap<SignatureType, ProcessFileSignature> {
    let mut live = BTreeMap::new();
    for signature in signatures {
        live.insert(signature.signature_type, signature);
    }
    live
}

pub fn artifact_path(file: &ProcessFile) -> String {
    format!(
        "process-files/{}/{}.xlsx",
        file.create_time.month_partition(),
        file.file_no
    )
}

#[derive(Clone)]
pub struct Materializer {
    store: Store,
    documents: DocumentStore,
    equipment: Arc<dyn EquipmentDirectory>,
    locks: ArtifactLocks,
    company_name: String,
}

impl Materializer {
    pub fn new(
        store: Store,
        documents: DocumentStore,
        equipment: Arc<dyn EquipmentDirectory>,
        company_name: &str,
    ) -> Self {
        Self {
            store,
            documents,
            equipment,
            locks: ArtifactLocks::new(),
            company_name: company_name.to_string(),
        }
    }

    /// Current artifact bytes, generating or repairing them first if needed.
    pub fn obtain_artifact(&self, file_id: u64) -> Result<Artifact> {
        let lock = self.locks.for_file(file_id);
        let _guard = lock.lock();
        self.materialize(file_id)
    }

    /// Brings an already materialized artifact up to date with the live
    /// signatures and seal. Files that were never rendered are left alone.
    pub fn ensure_overlaid(&self, file_id: u64) -> Result<Option<OverlayReport>> {
        let lock = self.locks.for_file(file_id);
        let _guard = lock.lock();
        let file = self.store.require_file(file_id)?;
        if !file.is_materialized() {
            debug!(file_id, "artifact not materialized yet, overlay deferred");
            return Ok(None);
        }
        Ok(Some(self.materialize(file_id)?.report))
    }

    /// Caller must hold the file's artifact lock.
    fn materialize(&self, file_id: u64) -> Result<Artifact> {
        let file = self.store.require_file(file_id)?;
        let live = live_signatures(self.store.signatures(file_id)?);
        let signature_ids: Vec<u64> = {
            let mut ids: Vec<u64> = live.values().map(|s| s.id).collect();
            ids.sort_unstable();
            ids
        };
        let sealed = file.status == FileStatus::Effective && self.store.seal(file_id)?.is_some();
        if file.is_uploaded() {
            return self.serve_upload(file, &live, sealed);
        }

        let (existing, staleness) = self.inspect(&file, &signature_ids, sealed);
        if let (Some(bytes), None) = (existing, staleness) {
            debug!(file_id, file_no = %file.file_no, "reusing artifact");
            return Ok(Artifact {
                report: OverlayReport {
                    regenerated: false,
                    signatures_placed: signature_ids.len(),
                    sealed,
                    warnings: vec![],
                },
                file,
                bytes,
            });
        }
        let reason = staleness.unwrap_or(Staleness::NeverRendered);

        let detail = self.store.detail(file_id)?.ok_or_else(|| {
            ProcessFileError::ArtifactGeneration(format!("detail record of {} is missing", file.file_no))
        })?;
        let equipment = self
            .equipment
            .equipment_by_id(file.equipment_id)
            .ok_or_else(|| {
                ProcessFileError::ArtifactGeneration(format!(
                    "equipment {} of {} is missing",
                    file.equipment_id, file.file_no
                ))
            })?;

        let layout = card::build_card(&self.company_name, &file, &detail, &equipment);
        let mut report = OverlayReport {
            regenerated: true,
            ..OverlayReport::default()
        };
        let (mut overlays, mut placed) = self.signature_overlays(&layout, live.values(), &mut report);
        // skipped signatures stay out of the manifest so the next pass retries them
        placed.sort_unstable();
        if sealed {
            overlays.push(self.seal_overlay(&layout, &file)?);
            report.sealed = true;
        }
        let bytes = render::render_workbook(&layout, &overlays)?;

        let path = if file.file_path.is_empty() {
            artifact_path(&file)
        } else {
            file.file_path.clone()
        };
        let size = self.documents.write(&path, &bytes)?;
        let manifest = OverlayManifest {
            digest: sha256::digest(&bytes),
            signature_ids: placed,
            sealed,
            rendered_at: TimeStamp::new(),
        };
        let file = self.store.update_file(file_id, |f| {
            f.file_path = path.clone();
            f.file_size = size;
            f.file_type = FileType::Xlsx;
            f.artifact = Some(manifest.clone());
            Ok(())
        })?;

        info!(
            file_id,
            file_no = %file.file_no,
            reason = reason.as_str(),
            signatures = report.signatures_placed,
            sealed,
            warnings = report.warnings.len(),
            "artifact rendered"
        );
        Ok(Artifact {
            file,
            bytes,
            report,
        })
    }

    /// Uploaded workbooks are served byte for byte. The renderer only writes
    /// new workbooks, so signatures and the seal stay in the records and are
    /// reported as warnings.
    fn serve_upload(
        &self,
        file: ProcessFile,
        live: &BTreeMap<SignatureType, ProcessFileSignature>,
        sealed: bool,
    ) -> Result<Artifact> {
        let bytes = self.documents.read(&file.file_path).map_err(|e| {
            ProcessFileError::ArtifactGeneration(format!(
                "uploaded workbook {} of {} is unreadable: {e}",
                file.file_path, file.file_no
            ))
        })?;
        let digest = sha256::digest(&bytes);
        if file.artifact.as_ref().is_some_and(|m| m.digest != digest) {
            return Err(ProcessFileError::ArtifactGeneration(format!(
                "uploaded workbook {} of {} changed on disk",
                file.file_path, file.file_no
            )));
        }
        let mut warnings: Vec<OverlayWarning> = live
            .values()
            .map(|s| OverlayWarning::UploadedWorkbook {
                what: format!("signature {}", s.id),
            })
            .collect();
        if sealed {
            warnings.push(OverlayWarning::UploadedWorkbook {
                what: "seal".to_string(),
            });
        }
        debug!(
            file_id = file.id,
            file_no = %file.file_no,
            unplaced = warnings.len(),
            "serving uploaded workbook"
        );
        Ok(Artifact {
            report: OverlayReport {
                warnings,
                ..OverlayReport::default()
            },
            file,
            bytes,
        })
    }

    /// Reads the current bytes, if any, and decides whether they are usable.
    fn inspect(
        &self,
        file: &ProcessFile,
        signature_ids: &[u64],
        sealed: bool,
    ) -> (Option<Vec<u8>>, Option<Staleness>) {
        if !file.is_materialized() {
            return (None, Some(Staleness::NeverRendered));
        }
        let bytes = match self.documents.read(&file.file_path) {
            Ok(bytes) => bytes,
            Err(_) => return (None, Some(Staleness::Missing)),
        };
        let staleness = match &file.artifact {
            None => Some(Staleness::Unverified),
            Some(manifest) if manifest.digest != sha256::digest(&bytes) => {
                Some(Staleness::Corrupted)
            }
            Some(manifest) if !manifest.covers(signature_ids, sealed) => Some(Staleness::Outdated),
            Some(_) => None,
        };
        (Some(bytes), staleness)
    }

    fn signature_overlays<'a>(
        &self,
        layout: &SheetLayout,
        signatures: impl Iterator<Item = &'a ProcessFileSignature>,
        report: &mut OverlayReport,
    ) -> (Vec<ImageOverlay>, Vec<u64>) {
        let mut overlays = vec![];
        let mut placed = vec![];
        for signature in signatures {
            match self.signature_overlay(layout, signature) {
                Ok(overlay) => {
                    overlays.push(overlay);
                    placed.push(signature.id);
                    report.signatures_placed += 1;
                }
                Err(warning) => {
                    warn!(
                        file_id = signature.file_id,
                        signature_id = signature.id,
                        %warning,
                        "signature overlay skipped"
                    );
                    report.warnings.push(warning);
                }
            }
        }
        (overlays, placed)
    }

    fn signature_overlay(
        &self,
        layout: &SheetLayout,
        signature: &ProcessFileSignature,
    ) -> Result<ImageOverlay, OverlayWarning> {
        let label = signature.signature_type.anchor_label();
        let anchor = sheet::find_anchor(layout, label).ok_or(OverlayWarning::LabelNotFound {
            signature_id: signature.id,
            label,
        })?;
        let path = &signature.signature_image_path;
        if !self.documents.exists(path) {
            return Err(OverlayWarning::ImageMissing {
                signature_id: signature.id,
                path: path.clone(),
            });
        }
        let unreadable = |reason: String| OverlayWarning::ImageUnreadable {
            signature_id: signature.id,
            path: path.clone(),
            reason,
        };
        let png = self
            .documents
            .read(path)
            .map_err(|e| unreadable(e.to_string()))?;
        let dimensions = image::load_from_memory(&png)
            .map(|img| (img.width(), img.height()))
            .map_err(|e| unreadable(e.to_string()))?;
        let placement = sheet::fit_image(dimensions, layout.region_size_px(anchor.target));
        Ok(ImageOverlay {
            cell: anchor.target.top_left(),
            placement,
            png,
        })
    }

    fn seal_overlay(&self, layout: &SheetLayout, file: &ProcessFile) -> Result<ImageOverlay> {
        let stored = file
            .seal_image_path
            .as_deref()
            .filter(|p| self.documents.exists(p))
            .map(|p| self.documents.read(p))
            .transpose()?;
        let png = match stored {
            Some(png) => png,
            None => seal::controlled_seal_png()?,
        };
        let placement = sheet::fit_image(
            (seal::SEAL_WIDTH, seal::SEAL_HEIGHT),
            layout.region_size_px(SEAL_REGION),
        );
        Ok(ImageOverlay {
            cell: SEAL_REGION.top_left(),
            placement,
            png,
        })
    }
}
