//! The fixed 30 x 16 layout of an injection process card.
use crate::detail::{ActionSetting, ProcessFileDetail};
use crate::equipment::Equipment;
use crate::model::ProcessFile;
use crate::sheet::{CellRange, CellStyle, SIGNATURE_LABEL_ROW, SheetLayout};
use crate::utils::format_decimal;
use crate::workflow::SignatureType;

pub const SHEET_NAME: &str = "注塑工艺卡片";
pub const CARD_ROWS: u32 = 30;
pub const CARD_COLS: u16 = 16;
pub const COLUMN_WIDTH: f64 = 8.8;
pub const ROW_HEIGHT: f64 = 18.0;
pub const SIGNATURE_ROW_HEIGHT: f64 = 48.0;

/// L24:P27, where the controlled seal is stamped.
pub const SEAL_REGION: CellRange = CellRange {
    first_row: 23,
    first_col: 11,
    last_row: 26,
    last_col: 15,
};

const DEFAULT_PROCESS_CONTENT: [&str; 4] = [
    "按照要求将模具码调好并调整。",
    "按照要求配料(配色)并将其按标准将原料烘干。",
    "按照注塑工艺要求将加工工艺调整。",
    "检查注塑设备及模具运行的安全性。",
];

const DEFAULT_QUALITY_INSPECTION: [&str; 4] = [
    "产品的尺寸光洁度符合图样要求,尺寸稳定。",
    "形状完整,表面光滑,结合部位平滑。",
    "产品无明显收缩及明显溶解线。",
    "产品外观颜色一致,无色差,杂质,油垢等。",
];

const DEFAULT_ASSESSMENT: &str = "可以量产。";

fn text(value: &Option<String>) -> String {
    value.clone().unwrap_or_default()
}

/// `label：value`, or just the label when the value is blank.
fn labelled(label: &str, value: &str) -> String {
    if value.trim().is_empty() {
        label.to_string()
    } else {
        format!("{label}：{value}")
    }
}

/// First four lines of a free text block, or the defaults when it is blank.
fn four_lines(value: &Option<String>, defaults: [&str; 4]) -> [String; 4] {
    match value.as_deref().filter(|v| !v.trim().is_empty()) {
        Some(content) => {
            let mut lines = content.split('\n').map(str::trim);
            std::array::from_fn(|_| lines.next().unwrap_or_default().to_string())
        }
        None => defaults.map(str::to_string),
    }
}

pub fn equipment_caption(equipment: &Equipment) -> String {
    let number = equipment
        .machine_no
        .as_deref()
        .unwrap_or(&equipment.equipment_no);
    format!("{number} - {}", equipment.equipment_name)
}

/// Lays out the whole card for one document version.
pub fn build_card(
    company: &str,
    file: &ProcessFile,
    detail: &ProcessFileDetail,
    equipment: &Equipment,
) -> SheetLayout {
    let mut sheet = SheetLayout::new(SHEET_NAME, CARD_ROWS, CARD_COLS, COLUMN_WIDTH, ROW_HEIGHT);
    sheet.set_column_width(3, 9.2);
    sheet.set_row_height(SIGNATURE_LABEL_ROW + 1, SIGNATURE_ROW_HEIGHT);

    title_block(&mut sheet, company, detail);
    material_rows(&mut sheet, detail, equipment);
    parameter_table(&mut sheet, detail);
    treatment_block(&mut sheet, detail);
    signature_block(&mut sheet, detail);
    footer(&mut sheet, file, equipment);
    sheet
}

fn title_block(sheet: &mut SheetLayout, company: &str, detail: &ProcessFileDetail) {
    use CellStyle::{Header, Title};
    let product = &detail.product;
    sheet.merge(CellRange::new(0, 0, 1, 3), company, Title);
    sheet.merge(CellRange::new(0, 4, 1, 7), "塑料零件注塑卡片", Title);
    sheet.merge(
        CellRange::new(0, 8, 0, 9),
        labelled("产品型号", &text(&product.product_model)),
        Header,
    );
    sheet.merge(CellRange::new(0, 10, 0, 11), "", Header);
    sheet.merge(
        CellRange::new(0, 12, 0, 13),
        labelled("模具制造公司", &text(&product.mold_manufacturing_company)),
        Header,
    );
    sheet.merge(CellRange::new(0, 14, 0, 15), "", Header);
    sheet.merge(
        CellRange::new(1, 8, 1, 9),
        labelled("产品名称", &text(&product.product_name)),
        Header,
    );
    sheet.merge(CellRange::new(1, 10, 1, 11), "", Header);
    sheet.merge(
        CellRange::new(1, 12, 1, 13),
        labelled("零件名称", &text(&product.part_name)),
        Header,
    );
    sheet.merge(CellRange::new(1, 14, 1, 15), "", Header);
}

fn material_rows(sheet: &mut SheetLayout, detail: &ProcessFileDetail, equipment: &Equipment) {
    use CellStyle::{Data, Label};
    let material = &detail.material;

    sheet.put(2, 0, "材料名称", Label);
    sheet.merge(CellRange::new(2, 1, 2, 2), text(&material.material_name), Data);
    sheet.put(2, 3, "材料牌号", Label);
    sheet.merge(CellRange::new(2, 4, 2, 5), text(&material.material_grade), Data);
    sheet.put(2, 6, "材料颜色", Label);
    sheet.merge(CellRange::new(2, 7, 2, 8), text(&material.material_color), Data);
    sheet.put(2, 9, "颜料名称", Label);
    sheet.put(2, 10, text(&material.pigment_name), Data);
    sheet.put(2, 11, labelled("比例", &format_decimal(material.pigment_ratio)), Label);
    sheet.merge(CellRange::new(2, 12, 2, 13), "项目负责人", Label);
    sheet.merge(
        CellRange::new(2, 14, 2, 15),
        text(&detail.product.project_leader),
        Data,
    );

    sheet.put(3, 0, "零件净重", Label);
    sheet.merge(CellRange::new(3, 1, 3, 2), format_decimal(material.part_net_weight), Data);
    sheet.put(3, 3, "零件毛重", Label);
    sheet.merge(CellRange::new(3, 4, 3, 5), format_decimal(material.part_gross_weight), Data);
    sheet.put(3, 6, "消耗定额", Label);
    sheet.merge(CellRange::new(3, 7, 3, 8), format_decimal(material.consumption_quota), Data);
    sheet.merge(CellRange::new(3, 9, 3, 12), "使用设备名称/规格", Label);
    sheet.merge(CellRange::new(3, 13, 3, 15), equipment_caption(equipment), Data);
}

fn action_cells(sheet: &mut SheetLayout, row: u32, col: u16, name: &str, setting: &ActionSetting) {
    sheet.put(row, col, name, CellStyle::Label);
    sheet.put(row, col + 1, format_decimal(setting.pressure), CellStyle::Data);
    sheet.put(row, col + 2, format_decimal(setting.flow), CellStyle::Data);
    sheet.put(row, col + 3, format_decimal(setting.position), CellStyle::Data);
}

/// Rows 5 to 21: mold block, action table and the temperature/time side table.
fn parameter_table(sheet: &mut SheetLayout, detail: &ProcessFileDetail) {
    use CellStyle::{Data, Header, Label, Text, Vertical};
    let mold = &detail.mold;

    sheet.merge(CellRange::new(4, 0, 6, 0), "模具", Vertical);
    sheet.put(4, 1, "模具编号", Label);
    sheet.merge(CellRange::new(4, 2, 4, 3), text(&mold.mold_number), Data);
    sheet.put(5, 1, "型腔数量", Label);
    sheet.merge(
        CellRange::new(5, 2, 5, 3),
        mold.cavity_quantity.map(|q| q.to_string()).unwrap_or_default(),
        Data,
    );
    sheet.put(6, 1, "锁模力", Label);
    sheet.merge(CellRange::new(6, 2, 6, 3), format_decimal(mold.clamping_force), Data);
    sheet.merge(CellRange::new(7, 0, 20, 0), "产品关键尺寸", Vertical);
    sheet.merge(
        CellRange::new(7, 1, 20, 3),
        text(&detail.product.product_key_dimensions),
        Text,
    );

    sheet.merge(CellRange::new(4, 4, 20, 4), "注射成型工艺", Vertical);
    for (offset, heading) in ["动作", "压力/bar", "流量/%", "位置/mm"].iter().enumerate() {
        sheet.put(4, 5 + offset as u16, *heading, Header);
        sheet.put(4, 9 + offset as u16, *heading, Header);
    }
    for (row, (name, setting)) in (5u32..).zip(detail.actions.inbound()) {
        action_cells(sheet, row, 5, name, setting);
    }
    for (row, (name, setting)) in (5u32..).zip(detail.actions.outbound()) {
        action_cells(sheet, row, 9, name, setting);
    }

    let modes = &detail.modes;
    sheet.put(20, 5, "注射模式", Label);
    sheet.put(20, 6, text(&modes.injection_mode), Data);
    sheet.put(20, 7, "进芯方式", Label);
    sheet.put(20, 8, text(&modes.core_pull_in_method), Data);
    sheet.put(20, 9, "抽芯方式", Label);
    sheet.put(20, 10, text(&modes.core_pull_out_method), Data);
    sheet.put(20, 11, "座台方式", Label);
    sheet.put(20, 12, text(&modes.nozzle_contact_method), Data);

    let temps = &detail.temperatures;
    sheet.merge(CellRange::new(4, 13, 7, 13), "料筒温度℃", Vertical);
    let barrel = [
        ("第一段", temps.barrel_temp1),
        ("第二段", temps.barrel_temp2),
        ("第三段", temps.barrel_temp3),
        ("第四段", temps.barrel_temp4),
    ];
    for (row, (name, value)) in (4u32..).zip(barrel) {
        sheet.put(row, 14, name, Label);
        sheet.put(row, 15, format_decimal(value), Data);
    }
    sheet.merge(CellRange::new(8, 13, 8, 14), "模具温度", Label);
    sheet.put(8, 15, format_decimal(temps.mold_temp), Data);

    sheet.merge(CellRange::new(9, 13, 20, 13), "时间/S", Vertical);
    for (row, (name, value)) in (9u32..).zip(detail.times.rows()) {
        sheet.put(row, 14, name, Label);
        sheet.put(row, 15, format_decimal(value), Data);
    }
}

/// Rows 22 to 27: drying, post treatment, process steps and inspection.
fn treatment_block(sheet: &mut SheetLayout, detail: &ProcessFileDetail) {
    use CellStyle::{Data, Label, Text, Vertical};
    let drying = &detail.drying;
    let modes = &detail.modes;

    sheet.merge(CellRange::new(21, 0, 26, 0), "原料干燥处理", Vertical);
    sheet.put(21, 1, "使用设备", Label);
    sheet.put(21, 2, text(&drying.drying_equipment), Data);
    sheet.put(21, 3, "零件后处理", Label);
    sheet.put(21, 4, text(&drying.part_post_treatment), Data);
    sheet.put(21, 5, "顶针模式", Label);
    sheet.put(21, 6, text(&modes.ejection_mode), Data);
    sheet.put(21, 7, "顶针次数", Label);
    sheet.put(
        21,
        8,
        modes.ejection_count.map(|c| c.to_string()).unwrap_or_default(),
        Data,
    );
    sheet.put(21, 9, "螺杆转速", Label);
    sheet.put(21, 10, format_decimal(modes.screw_speed), Data);
    sheet.merge(CellRange::new(21, 11, 21, 12), "抽芯行程方式", Label);
    sheet.merge(
        CellRange::new(21, 13, 21, 15),
        text(&modes.core_pull_stroke_method),
        Data,
    );

    sheet.put(22, 1, "盛料高度", Label);
    sheet.put(22, 2, format_decimal(drying.material_fill_height), Data);
    sheet.put(22, 3, "产品后处理", Label);
    sheet.put(22, 4, text(&drying.product_post_treatment), Data);
    sheet.put(22, 5, "工序号", Label);
    sheet.merge(CellRange::new(22, 6, 22, 10), "工序内容", Label);
    sheet.merge(CellRange::new(22, 11, 22, 15), "品质检查", Label);

    sheet.merge(CellRange::new(23, 1, 24, 1), "翻料时间", Label);
    sheet.put(23, 2, format_decimal(drying.material_turning_time), Data);
    sheet.put(23, 3, "加热温度", Label);
    sheet.put(23, 4, format_decimal(drying.heating_temp), Data);
    sheet.put(24, 3, "保温温度", Label);
    sheet.put(24, 4, format_decimal(drying.holding_temp), Data);
    sheet.put(25, 1, "干燥温度", Label);
    sheet.put(25, 2, format_decimal(drying.drying_temp), Data);
    sheet.put(25, 3, "干燥时间", Label);
    sheet.put(25, 4, format_decimal(drying.drying_time), Data);
    sheet.put(26, 1, "前模冷却", Label);
    sheet.put(26, 2, text(&drying.front_mold_cooling), Data);
    sheet.put(26, 3, "后模冷却", Label);
    sheet.put(26, 4, text(&drying.rear_mold_cooling), Data);

    let content = four_lines(&detail.instructions.process_content, DEFAULT_PROCESS_CONTENT);
    let quality = four_lines(
        &detail.instructions.quality_inspection,
        DEFAULT_QUALITY_INSPECTION,
    );
    for (i, (step, check)) in content.iter().zip(quality.iter()).enumerate() {
        let row = 23 + i as u32;
        let n = i + 1;
        sheet.put(row, 5, n.to_string(), Label);
        sheet.merge(CellRange::new(row, 6, row, 10), format!("{n}.{step}"), Text);
        sheet.merge(CellRange::new(row, 11, row, 15), format!("{n}.{check}"), Text);
    }
}

/// Rows 28 and 29: assessment plus the labelled signature cells.
fn signature_block(sheet: &mut SheetLayout, detail: &ProcessFileDetail) {
    let assessment = detail
        .instructions
        .comprehensive_assessment
        .as_deref()
        .filter(|a| !a.trim().is_empty())
        .unwrap_or(DEFAULT_ASSESSMENT);
    sheet.merge(
        CellRange::new(SIGNATURE_LABEL_ROW, 0, SIGNATURE_LABEL_ROW + 1, 6),
        format!("模具及注塑工艺综合评估:{assessment}"),
        CellStyle::Text,
    );

    let spans: [(SignatureType, u16, u16); 4] = [
        (SignatureType::Submit, 7, 8),
        (SignatureType::ApproveLevel1, 9, 10),
        (SignatureType::ApproveLevel2, 11, 12),
        (SignatureType::ApproveLevel3, 13, 15),
    ];
    for (kind, first, last) in spans {
        sheet.merge(
            CellRange::new(SIGNATURE_LABEL_ROW, first, SIGNATURE_LABEL_ROW, last),
            kind.anchor_label(),
            CellStyle::Label,
        );
        sheet.merge(
            CellRange::new(SIGNATURE_LABEL_ROW + 1, first, SIGNATURE_LABEL_ROW + 1, last),
            "",
            CellStyle::Data,
        );
    }
}

fn footer(sheet: &mut SheetLayout, file: &ProcessFile, equipment: &Equipment) {
    sheet.merge(
        CellRange::new(29, 0, 29, 7),
        format!("工艺参数文件编号：{}", file.file_no),
        CellStyle::Label,
    );
    sheet.merge(
        CellRange::new(29, 8, 29, 15),
        format!(
            "机械手参数型号：{}",
            equipment.robot_model.as_deref().unwrap_or_default()
        ),
        CellStyle::Label,
    );
}
