//! Equipment lookup owned by another subsystem.
use parking_lot::RwLock;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Equipment {
    pub id: u64,
    pub equipment_no: String,
    pub equipment_name: String,
    pub machine_no: Option<String>,
    pub robot_model: Option<String>,
}

impl Equipment {
    pub fn new(id: u64, equipment_no: &str, equipment_name: &str) -> Self {
        Self {
            id,
            equipment_no: equipment_no.to_string(),
            equipment_name: equipment_name.to_string(),
            machine_no: None,
            robot_model: None,
        }
    }

    pub fn set_machine_no(mut self, machine_no: &str) -> Self {
        self.machine_no = Some(machine_no.to_string());
        self
    }

    pub fn set_robot_model(mut self, robot_model: &str) -> Self {
        self.robot_model = Some(robot_model.to_string());
        self
    }
}

pub trait EquipmentDirectory: Send + Sync {
    fn equipment_by_id(&self, id: u64) -> Option<Equipment>;
}

#[derive(Debug, Default)]
pub struct InMemoryEquipmentDirectory {
    entries: RwLock<HashMap<u64, Equipment>>,
}

impl InMemoryEquipmentDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, equipment: Equipment) {
        self.entries.write().insert(equipment.id, equipment);
    }

    pub fn remove(&self, id: u64) -> Option<Equipment> {
        self.entries.write().remove(&id)
    }
}

impl EquipmentDirectory for InMemoryEquipmentDirectory {
    fn equipment_by_id(&self, id: u64) -> Option<Equipment> {
        self.entries.read().get(&id).cloned()
    }
}
