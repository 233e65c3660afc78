//! The process card body: material, mold and machine parameters.
//!
//! Every field is independently optional. A revision starts from a copy of
//! the previous version's detail and overlays whatever the new form sets.
use minicbor::{Decode, Encode};
use serde::{Deserialize, Serialize};

/// Copies every `Some` field of `$from` over `$into`.
macro_rules! overlay_fields {
    ($into:ident, $from:ident; $($field:ident),+ $(,)?) => {
        $(
            if $from.$field.is_some() {
                $into.$field = $from.$field.clone();
            }
        )+
    };
}

/// Pressure, flow and position of one machine action.
#[derive(Debug, Clone, Default, PartialEq, Encode, Decode, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ActionSetting {
    #[n(0)]
    pub pressure: Option<f64>,
    #[n(1)]
    pub flow: Option<f64>,
    #[n(2)]
    pub position: Option<f64>,
}

impl ActionSetting {
    pub fn new(pressure: f64, flow: f64, position: f64) -> Self {
        Self {
            pressure: Some(pressure),
            flow: Some(flow),
            position: Some(position),
        }
    }

    pub fn overlay(&mut self, other: &ActionSetting) {
        overlay_fields!(self, other; pressure, flow, position);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Encode, Decode, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProductInfo {
    #[n(0)]
    pub product_model: Option<String>,
    #[n(1)]
    pub product_name: Option<String>,
    #[n(2)]
    pub mold_manufacturing_company: Option<String>,
    #[n(3)]
    pub part_name: Option<String>,
    #[n(4)]
    pub project_leader: Option<String>,
    #[n(5)]
    pub product_key_dimensions: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Encode, Decode, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MaterialInfo {
    #[n(0)]
    pub material_name: Option<String>,
    #[n(1)]
    pub material_grade: Option<String>,
    #[n(2)]
    pub material_color: Option<String>,
    #[n(3)]
    pub pigment_name: Option<String>,
    #[n(4)]
    pub pigment_ratio: Option<f64>,
    #[n(5)]
    pub part_net_weight: Option<f64>,
    #[n(6)]
    pub part_gross_weight: Option<f64>,
    #[n(7)]
    pub consumption_quota: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Encode, Decode, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MoldInfo {
    #[n(0)]
    pub mold_number: Option<String>,
    #[n(1)]
    pub cavity_quantity: Option<u32>,
    #[n(2)]
    pub clamping_force: Option<f64>,
}

/// The paired action table of the card.
#[derive(Debug, Clone, Default, PartialEq, Encode, Decode, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ActionTable {
    #[n(0)]
    pub clamp1: ActionSetting,
    #[n(1)]
    pub clamp2: ActionSetting,
    #[n(2)]
    pub mold_protection: ActionSetting,
    #[n(3)]
    pub high_pressure: ActionSetting,
    #[n(4)]
    pub core_pull1_in: ActionSetting,
    #[n(5)]
    pub core_pull2_in: ActionSetting,
    #[n(6)]
    pub injection1: ActionSetting,
    #[n(7)]
    pub injection2: ActionSetting,
    #[n(8)]
    pub injection3: ActionSetting,
    #[n(9)]
    pub injection4: ActionSetting,
    #[n(10)]
    pub injection5: ActionSetting,
    #[n(11)]
    pub injection6: ActionSetting,
    #[n(12)]
    pub holding1: ActionSetting,
    #[n(13)]
    pub holding2: ActionSetting,
    #[n(14)]
    pub holding3: ActionSetting,
    #[n(15)]
    pub open_mold1: ActionSetting,
    #[n(16)]
    pub open_mold2: ActionSetting,
    #[n(17)]
    pub open_mold3: ActionSetting,
    #[n(18)]
    pub open_mold4: ActionSetting,
    #[n(19)]
    pub core_pull1_out: ActionSetting,
    #[n(20)]
    pub core_pull2_out: ActionSetting,
    #[n(21)]
    pub melt1: ActionSetting,
    #[n(22)]
    pub decompression_before_melt: ActionSetting,
    #[n(23)]
    pub decompression_after_melt: ActionSetting,
    #[n(24)]
    pub eject1_speed: ActionSetting,
    #[n(25)]
    pub eject2_speed: ActionSetting,
    #[n(26)]
    pub eject_retract1_speed: ActionSetting,
    #[n(27)]
    pub eject_retract2_speed: ActionSetting,
}

impl ActionTable {
    /// Left half of the table, in card order.
    pub fn inbound(&self) -> [(&'static str, &ActionSetting); 15] {
        [
            ("合模1", &self.clamp1),
            ("合模2", &self.clamp2),
            ("模保", &self.mold_protection),
            ("高压", &self.high_pressure),
            ("进芯一", &self.core_pull1_in),
            ("进芯二", &self.core_pull2_in),
            ("射胶一段", &self.injection1),
            ("射胶二段", &self.injection2),
            ("射胶三段", &self.injection3),
            ("射胶四段", &self.injection4),
            ("射胶五段", &self.injection5),
            ("射胶六段", &self.injection6),
            ("保压一段", &self.holding1),
            ("保压二段", &self.holding2),
            ("保压三段", &self.holding3),
        ]
    }

    /// Right half of the table, in card order.
    pub fn outbound(&self) -> [(&'static str, &ActionSetting); 13] {
        [
            ("开模1", &self.open_mold1),
            ("开模2", &self.open_mold2),
            ("开模3", &self.open_mold3),
            ("开模4", &self.open_mold4),
            ("抽芯一", &self.core_pull1_out),
            ("抽芯二", &self.core_pull2_out),
            ("熔胶1", &self.melt1),
            ("熔前松退", &self.decompression_before_melt),
            ("熔后松退", &self.decompression_after_melt),
            ("顶出一速", &self.eject1_speed),
            ("顶出二速", &self.eject2_speed),
            ("顶退一速", &self.eject_retract1_speed),
            ("顶退二速", &self.eject_retract2_speed),
        ]
    }

    fn settings_mut(&mut self) -> [&mut ActionSetting; 28] {
        [
            &mut self.clamp1,
            &mut self.clamp2,
            &mut self.mold_protection,
            &mut self.high_pressure,
            &mut self.core_pull1_in,
            &mut self.core_pull2_in,
            &mut self.injection1,
            &mut self.injection2,
            &mut self.injection3,
            &mut self.injection4,
            &mut self.injection5,
            &mut self.injection6,
            &mut self.holding1,
            &mut self.holding2,
            &mut self.holding3,
            &mut self.open_mold1,
            &mut self.open_mold2,
            &mut self.open_mold3,
            &mut self.open_mold4,
            &mut self.core_pull1_out,
            &mut self.core_pull2_out,
            &mut self.melt1,
            &mut self.decompression_before_melt,
            &mut self.decompression_after_melt,
            &mut self.eject1_speed,
            &mut self.eject2_speed,
            &mut self.eject_retract1_speed,
            &mut self.eject_retract2_speed,
        ]
    }

    fn settings(&self) -> [&ActionSetting; 28] {
        let inbound = self.inbound();
        let outbound = self.outbound();
        let mut all: [&ActionSetting; 28] = [&self.clamp1; 28];
        for (slot, (_, setting)) in all.iter_mut().zip(inbound.into_iter().chain(outbound)) {
            *slot = setting;
        }
        all
    }

    pub fn overlay(&mut self, other: &ActionTable) {
        for (mine, theirs) in self.settings_mut().into_iter().zip(other.settings()) {
            mine.overlay(theirs);
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Encode, Decode, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MachineModes {
    #[n(0)]
    pub injection_mode: Option<String>,
    #[n(1)]
    pub core_pull_in_method: Option<String>,
    #[n(2)]
    pub core_pull_out_method: Option<String>,
    #[n(3)]
    pub nozzle_contact_method: Option<String>,
    #[n(4)]
    pub ejection_mode: Option<String>,
    #[n(5)]
    pub ejection_count: Option<u32>,
    #[n(6)]
    pub screw_speed: Option<f64>,
    #[n(7)]
    pub core_pull_stroke_method: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Encode, Decode, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Temperatures {
    #[n(0)]
    pub barrel_temp1: Option<f64>,
    #[n(1)]
    pub barrel_temp2: Option<f64>,
    #[n(2)]
    pub barrel_temp3: Option<f64>,
    #[n(3)]
    pub barrel_temp4: Option<f64>,
    #[n(4)]
    pub mold_temp: Option<f64>,
}

/// Seconds spent in each phase of the cycle.
#[derive(Debug, Clone, Default, PartialEq, Encode, Decode, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CycleTimes {
    #[n(0)]
    pub clamping_time: Option<f64>,
    #[n(1)]
    pub mold_protection_time: Option<f64>,
    #[n(2)]
    pub core_pull1_in_time: Option<f64>,
    #[n(3)]
    pub core_pull2_in_time: Option<f64>,
    #[n(4)]
    pub injection_time: Option<f64>,
    #[n(5)]
    pub holding_time: Option<f64>,
    #[n(6)]
    pub cooling_time: Option<f64>,
    #[n(7)]
    pub core_pull1_out_time: Option<f64>,
    #[n(8)]
    pub core_pull2_out_time: Option<f64>,
    #[n(9)]
    pub mold_opening_time: Option<f64>,
    #[n(10)]
    pub part_ejection_time: Option<f64>,
    #[n(11)]
    pub total_time: Option<f64>,
}

impl CycleTimes {
    pub fn rows(&self) -> [(&'static str, Option<f64>); 12] {
        [
            ("合模", self.clamping_time),
            ("模保", self.mold_protection_time),
            ("进芯1", self.core_pull1_in_time),
            ("进芯2", self.core_pull2_in_time),
            ("注射", self.injection_time),
            ("保压", self.holding_time),
            ("冷却", self.cooling_time),
            ("抽芯1", self.core_pull1_out_time),
            ("抽芯2", self.core_pull2_out_time),
            ("开模", self.mold_opening_time),
            ("取件时间", self.part_ejection_time),
            ("总时间", self.total_time),
        ]
    }
}

#[derive(Debug, Clone, Default, PartialEq, Encode, Decode, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DryingTreatment {
    #[n(0)]
    pub drying_equipment: Option<String>,
    #[n(1)]
    pub material_fill_height: Option<f64>,
    #[n(2)]
    pub material_turning_time: Option<f64>,
    #[n(3)]
    pub drying_temp: Option<f64>,
    #[n(4)]
    pub drying_time: Option<f64>,
    #[n(5)]
    pub front_mold_cooling: Option<String>,
    #[n(6)]
    pub rear_mold_cooling: Option<String>,
    #[n(7)]
    pub part_post_treatment: Option<String>,
    #[n(8)]
    pub product_post_treatment: Option<String>,
    #[n(9)]
    pub heating_temp: Option<f64>,
    #[n(10)]
    pub holding_temp: Option<f64>,
}

/// Free text blocks, one line per `\n`.
#[derive(Debug, Clone, Default, PartialEq, Encode, Decode, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Instructions {
    #[n(0)]
    pub process_content: Option<String>,
    #[n(1)]
    pub quality_inspection: Option<String>,
    #[n(2)]
    pub comprehensive_assessment: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Encode, Decode, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProcessFileDetail {
    #[n(0)]
    pub product: ProductInfo,
    #[n(1)]
    pub material: MaterialInfo,
    #[n(2)]
    pub mold: MoldInfo,
    #[n(3)]
    pub actions: ActionTable,
    #[n(4)]
    pub modes: MachineModes,
    #[n(5)]
    pub temperatures: Temperatures,
    #[n(6)]
    pub times: CycleTimes,
    #[n(7)]
    pub drying: DryingTreatment,
    #[n(8)]
    pub instructions: Instructions,
}

impl ProcessFileDetail {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_product(mut self, product: ProductInfo) -> Self {
        self.product = product;
        self
    }
    pub fn set_material(mut self, material: MaterialInfo) -> Self {
        self.material = material;
        self
    }
    pub fn set_mold(mut self, mold: MoldInfo) -> Self {
        self.mold = mold;
        self
    }
    pub fn set_actions(mut self, actions: ActionTable) -> Self {
        self.actions = actions;
        self
    }
    pub fn set_temperatures(mut self, temperatures: Temperatures) -> Self {
        self.temperatures = temperatures;
        self
    }
    pub fn set_times(mut self, times: CycleTimes) -> Self {
        self.times = times;
        self
    }
    pub fn set_instructions(mut self, instructions: Instructions) -> Self {
        self.instructions = instructions;
        self
    }

    /// Applies a revision on top of this (copied) detail. Unset fields keep their value.
    pub fn overlay(&mut self, other: &ProcessFileDetail) {
        let (p, q) = (&mut self.product, &other.product);
        overlay_fields!(p, q; product_model, product_name, mold_manufacturing_company,
            part_name, project_leader, product_key_dimensions);

        let (m, n) = (&mut self.material, &other.material);
        overlay_fields!(m, n; material_name, material_grade, material_color, pigment_name,
            pigment_ratio, part_net_weight, part_gross_weight, consumption_quota);

        let (m, n) = (&mut self.mold, &other.mold);
        overlay_fields!(m, n; mold_number, cavity_quantity, clamping_force);

        self.actions.overlay(&other.actions);

        let (m, n) = (&mut self.modes, &other.modes);
        overlay_fields!(m, n; injection_mode, core_pull_in_method, core_pull_out_method,
            nozzle_contact_method, ejection_mode, ejection_count, screw_speed,
            core_pull_stroke_method);

        let (t, u) = (&mut self.temperatures, &other.temperatures);
        overlay_fields!(t, u; barrel_temp1, barrel_temp2, barrel_temp3, barrel_temp4, mold_temp);

        let (t, u) = (&mut self.times, &other.times);
        overlay_fields!(t, u; clamping_time, mold_protection_time, core_pull1_in_time,
            core_pull2_in_time, injection_time, holding_time, cooling_time,
            core_pull1_out_time, core_pull2_out_time, mold_opening_time,
            part_ejection_time, total_time);

        let (d, e) = (&mut self.drying, &other.drying);
        overlay_fields!(d, e; drying_equipment, material_fill_height, material_turning_time,
            drying_temp, drying_time, front_mold_cooling, rear_mold_cooling,
            part_post_treatment, product_post_treatment, heating_temp, holding_temp);

        let (i, j) = (&mut self.instructions, &other.instructions);
        overlay_fields!(i, j; process_content, quality_inspection, comprehensive_assessment);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlay_keeps_unset_fields() {
        let mut prior = ProcessFileDetail::new()
            .set_material(MaterialInfo {
                material_name: Some("ABS".into()),
                part_net_weight: Some(12.5),
                ..Default::default()
            })
            .set_actions(ActionTable {
                injection3: ActionSetting::new(80.0, 45.0, 32.5),
                ..Default::default()
            });
        let revision = ProcessFileDetail::new()
            .set_material(MaterialInfo {
                part_net_weight: Some(13.0),
                ..Default::default()
            })
            .set_actions(ActionTable {
                injection3: ActionSetting {
                    flow: Some(50.0),
                    ..Default::default()
                },
                eject_retract2_speed: ActionSetting::new(1.0, 2.0, 3.0),
                ..Default::default()
            });

        prior.overlay(&revision);

        assert_eq!(prior.material.material_name.as_deref(), Some("ABS"));
        assert_eq!(prior.material.part_net_weight, Some(13.0));
        assert_eq!(prior.actions.injection3, ActionSetting::new(80.0, 50.0, 32.5));
        assert_eq!(prior.actions.eject_retract2_speed, ActionSetting::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn table_halves_cover_every_action() {
        let table = ActionTable::default();
        assert_eq!(table.inbound().len() + table.outbound().len(), 28);
    }

    #[test]
    fn detail_encoding() {
        let detail = ProcessFileDetail::new().set_times(CycleTimes {
            cooling_time: Some(18.0),
            ..Default::default()
        });
        let bytes = minicbor::to_vec(&detail).unwrap();
        let decoded: ProcessFileDetail = minicbor::decode(&bytes).unwrap();
        assert_eq!(detail, decoded);
    }
}
