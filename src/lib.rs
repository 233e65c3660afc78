pub mod approval;
pub mod artifact;
pub mod auth;
pub mod card;
pub mod config;
pub mod detail;
pub mod equipment;
pub mod error;
pub mod model;
pub mod render;
pub mod seal;
pub mod service;
pub mod sheet;
pub mod signature;
pub mod storage;
pub mod store;
pub mod telemetry;
pub mod types;
pub mod utils;
pub mod versioning;
pub mod workflow;

pub use approval::ApprovalDecision;
pub use auth::{Actor, Authorization, RoleIdentity, SessionIdentity};
pub use config::ServiceConfig;
pub use equipment::{Equipment, EquipmentDirectory, InMemoryEquipmentDirectory};
pub use error::{OverlayWarning, ProcessFileError, Result, ValidationError};
pub use service::{Download, FileQuery, ProcessFileService};
pub use signature::SignatureUpload;
pub use versioning::{ProcessFileForm, UploadForm};
pub use workflow::{ApprovalLevel, ApprovalResult, FileStatus, RoleCode, SignatureType};
