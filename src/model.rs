//! Persisted records of the process file lifecycle.
use crate::types::TimeStamp;
use crate::utils;
use crate::workflow::{ApprovalLevel, ApprovalResult, FileStatus, SignatureType};
use chrono::Utc;
use minicbor::{Decode, Encode};
use serde::Serialize;

pub const SEAL_TYPE: &str = "受控章";
pub const SEAL_CONTENT: &str = "已批准生效";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode, Serialize)]
#[cbor(index_only)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    /// Only the structured detail exists, nothing has been rendered yet.
    #[n(0)]
    Form,
    #[n(1)]
    Xlsx,
    /// A workbook uploaded as is. Never re-rendered.
    #[n(2)]
    Upload,
}

impl FileType {
    pub fn as_str(self) -> &'static str {
        match self {
            FileType::Form => "form",
            FileType::Xlsx => "xlsx",
            FileType::Upload => "upload",
        }
    }
}

/// What the rendered artifact on disk currently contains.
#[derive(Debug, Clone, PartialEq, Encode, Decode)]
pub struct OverlayManifest {
    /// sha256 of the bytes that were written.
    #[n(0)]
    pub digest: String,
    /// Ids of the signatures drawn at render time, ascending.
    #[n(1)]
    pub signature_ids: Vec<u64>,
    #[n(2)]
    pub sealed: bool,
    #[n(3)]
    pub rendered_at: TimeStamp<Utc>,
}

impl OverlayManifest {
    pub fn covers(&self, signature_ids: &[u64], sealed: bool) -> bool {
        self.signature_ids == signature_ids && self.sealed == sealed
    }
}

/// Document header, one row per version.
#[derive(Debug, Clone, PartialEq, Encode, Decode, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessFile {
    #[n(0)]
    pub id: u64,
    #[n(1)]
    pub file_no: String,
    #[n(2)]
    pub equipment_id: u64,
    #[n(3)]
    pub equipment_no: String,
    #[n(4)]
    pub machine_no: Option<String>,
    #[n(5)]
    pub file_name: String,
    #[n(6)]
    pub file_path: String,
    #[n(7)]
    pub file_size: u64,
    #[n(8)]
    pub file_type: FileType,
    #[n(9)]
    pub version: u32,
    #[n(10)]
    pub status: FileStatus,
    #[n(11)]
    pub creator_id: u64,
    #[n(12)]
    pub creator_name: String,
    #[n(13)]
    pub submit_time: Option<TimeStamp<Utc>>,
    #[n(14)]
    pub approval_time: Option<TimeStamp<Utc>>,
    #[n(15)]
    pub effective_time: Option<TimeStamp<Utc>>,
    #[n(16)]
    pub invalid_time: Option<TimeStamp<Utc>>,
    #[n(17)]
    pub seal_image_path: Option<String>,
    #[n(18)]
    pub is_current: bool,
    #[n(19)]
    pub enabled: bool,
    #[n(20)]
    pub parent_file_id: Option<u64>,
    #[n(21)]
    pub change_reason: Option<String>,
    #[n(22)]
    pub remark: Option<String>,
    #[n(23)]
    pub create_time: TimeStamp<Utc>,
    #[n(24)]
    pub update_time: TimeStamp<Utc>,
    #[n(25)]
    #[serde(skip)]
    pub artifact: Option<OverlayManifest>,
}

impl ProcessFile {
    pub fn is_materialized(&self) -> bool {
        matches!(self.file_type, FileType::Xlsx | FileType::Upload) && !self.file_path.is_empty()
    }

    pub fn is_uploaded(&self) -> bool {
        self.file_type == FileType::Upload
    }

    /// Key used to keep at most one enabled card per machine.
    pub fn machine_key(&self) -> &str {
        self.machine_no
            .as_deref()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or(&self.equipment_no)
    }

    pub fn status_text(&self) -> &'static str {
        self.status.text()
    }

    pub fn version_text(&self) -> String {
        utils::version_text(self.version)
    }

    pub fn file_size_text(&self) -> String {
        utils::format_file_size(self.file_size)
    }

    pub fn current_approval_level(&self) -> Option<ApprovalLevel> {
        self.status.pending_level()
    }

    /// Legacy name of the role that has to act next.
    pub fn next_approver_role(&self) -> Option<&'static str> {
        self.current_approval_level()
            .map(|level| level.required_role().legacy_name())
    }

    /// Name offered when downloading the artifact.
    pub fn download_name(&self) -> String {
        if self.file_name.trim().is_empty() {
            format!("工艺文件_{}.xlsx", self.id)
        } else {
            self.file_name.clone()
        }
    }
}

/// One approval decision, immutable once stored.
#[derive(Debug, Clone, PartialEq, Encode, Decode, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessFileApproval {
    #[n(0)]
    pub id: u64,
    #[n(1)]
    pub file_id: u64,
    #[n(2)]
    pub file_no: String,
    #[n(3)]
    pub approval_level: ApprovalLevel,
    #[n(4)]
    pub approver_id: u64,
    #[n(5)]
    pub approver_name: String,
    #[n(6)]
    pub approver_role: String,
    #[n(7)]
    pub approval_result: ApprovalResult,
    #[n(8)]
    pub approval_opinion: Option<String>,
    #[n(9)]
    pub approval_time: TimeStamp<Utc>,
    #[n(10)]
    pub signature_id: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Encode, Decode, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessFileSignature {
    #[n(0)]
    pub id: u64,
    #[n(1)]
    pub file_id: u64,
    #[n(2)]
    pub file_no: String,
    #[n(3)]
    pub signature_type: SignatureType,
    #[n(4)]
    pub signer_id: u64,
    #[n(5)]
    pub signer_name: String,
    #[n(6)]
    pub signer_role: String,
    /// Relative to the document store root.
    #[n(7)]
    pub signature_image_path: String,
    #[n(8)]
    pub signature_time: TimeStamp<Utc>,
    #[n(9)]
    pub ip_address: Option<String>,
    #[n(10)]
    pub device_info: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Encode, Decode, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessFileSeal {
    #[n(0)]
    pub id: u64,
    #[n(1)]
    pub file_id: u64,
    #[n(2)]
    pub file_no: String,
    #[n(3)]
    pub seal_no: String,
    #[n(4)]
    pub seal_type: String,
    #[n(5)]
    pub seal_content: String,
    #[n(6)]
    pub seal_image_path: String,
    #[n(7)]
    pub seal_time: TimeStamp<Utc>,
    #[n(8)]
    pub seal_by_id: u64,
    #[n(9)]
    pub seal_by_name: String,
}

impl ProcessFileSeal {
    pub fn seal_image_path_for(file_no: &str) -> String {
        format!("seals/{file_no}_seal.png")
    }
}
