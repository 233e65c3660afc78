//! Walks one process card from draft to an effective, sealed spreadsheet.
//!
//! Reads `process-file.toml` from the working directory when present and
//! writes the final artifact next to it.
use anyhow::Context;
use image::{Rgba, RgbaImage};
use process_file::{
    ApprovalDecision, Equipment, InMemoryEquipmentDirectory, ProcessFileForm, ProcessFileService,
    RoleCode, ServiceConfig, SignatureUpload,
    auth::Actor,
    detail::{ActionSetting, ActionTable, MaterialInfo, ProcessFileDetail},
    seal,
};
use std::path::Path;
use std::sync::Arc;

fn signature(stroke: u32) -> anyhow::Result<SignatureUpload> {
    let mut pad = RgbaImage::from_pixel(300, 120, Rgba([255, 255, 255, 255]));
    for x in 30..(150 + stroke * 30) {
        let y = 60 + (x % 17);
        pad.put_pixel(x, y, Rgba([0, 0, 0, 255]));
        pad.put_pixel(x, y + 1, Rgba([0, 0, 0, 255]));
    }
    Ok(SignatureUpload::new(seal::encode_png(pad)?).set_device_info("demo"))
}

fn main() -> anyhow::Result<()> {
    let config_file = Path::new("process-file.toml");
    let config = ServiceConfig::load(config_file.exists().then_some(config_file))?;
    config.init_tracing();

    let equipment = Arc::new(InMemoryEquipmentDirectory::new());
    equipment.insert(
        Equipment::new(1, "EQ-001", "海天 MA1600")
            .set_machine_no("M01")
            .set_robot_model("YS-500"),
    );
    let service = ProcessFileService::open(&config, equipment)?;

    let leader = Actor::new(1, "张三").with_role(RoleCode::InjectionLeader);
    let director = Actor::new(2, "李四").with_role(RoleCode::WorkshopDirector);
    let tech = Actor::new(3, "王五").with_role(RoleCode::ProductionTechManager);
    let manager = Actor::new(4, "赵六").with_role(RoleCode::InjectionManager);

    let detail = ProcessFileDetail::new()
        .set_material(MaterialInfo {
            material_name: Some("PP".into()),
            material_grade: Some("K8003".into()),
            ..MaterialInfo::default()
        })
        .set_actions(ActionTable {
            injection1: ActionSetting::new(80.0, 60.0, 45.0),
            holding1: ActionSetting::new(40.0, 30.0, 10.0),
            ..ActionTable::default()
        });
    let form = ProcessFileForm::new(1, "GY-DEMO-001", "GY-DEMO-001.xlsx").set_detail(detail);
    let id = service.save_form(&form, &leader).context("create")?;

    service.submit(id, &leader, &signature(0)?)?;
    service.approve(id, &director, &ApprovalDecision::pass(), Some(&signature(1)?))?;
    service.approve(id, &tech, &ApprovalDecision::pass(), Some(&signature(2)?))?;
    let file = service.approve(
        id,
        &manager,
        &ApprovalDecision::pass().set_opinion("同意生效"),
        Some(&signature(3)?),
    )?;
    println!("{} {} {}", file.file_no, file.version_text(), file.status_text());

    let download = service.download(id)?;
    std::fs::write(&download.file_name, &download.bytes)?;
    println!("wrote {} ({} bytes)", download.file_name, download.bytes.len());

    service.flush()?;
    Ok(())
}
