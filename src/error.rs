//! Error taxonomy for the process file engine.
use sled::transaction::TransactionError;

/// Input problems detected before anything is written.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("a change reason is required when revising an existing process file")]
    MissingChangeReason,
    #[error("file number must not be blank")]
    MissingFileNo,
    #[error("file name must not be blank")]
    MissingFileName,
    #[error("{field} contains illegal characters: {value}")]
    IllegalCharacters { field: &'static str, value: String },
    #[error("signature image is empty")]
    EmptySignature,
    #[error("signature image could not be decoded: {0}")]
    UndecodableSignature(String),
    #[error("signature image is {size} bytes, limit is {limit}")]
    SignatureTooLarge { size: usize, limit: usize },
    #[error("approving requires a signature")]
    MissingApprovalSignature,
    #[error("uploaded file is empty")]
    EmptyUpload,
    #[error("uploaded file is {size} bytes, limit is {limit}")]
    UploadTooLarge { size: usize, limit: usize },
    #[error("only Excel workbooks (.xls, .xlsx) can be uploaded, got {0:?}")]
    UnsupportedFileType(String),
}

/// Overlay problems that are logged and reported but never fail the caller.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum OverlayWarning {
    #[error("anchor label {label:?} not found for signature {signature_id}")]
    LabelNotFound { signature_id: u64, label: &'static str },
    #[error("signature image {path} is missing")]
    ImageMissing { signature_id: u64, path: String },
    #[error("signature image {path} is unreadable: {reason}")]
    ImageUnreadable {
        signature_id: u64,
        path: String,
        reason: String,
    },
    #[error("{what} kept in the record only, uploaded workbooks are served as uploaded")]
    UploadedWorkbook { what: String },
}

#[derive(thiserror::Error, Debug)]
pub enum ProcessFileError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("{0} not found")]
    NotFound(String),
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("invalid state transition: {0}")]
    InvalidStateTransition(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("artifact generation failed: {0}")]
    ArtifactGeneration(String),
    #[error("storage error: {0}")]
    Storage(#[from] sled::Error),
    #[error("failed to encode record: {0}")]
    Encoding(String),
    #[error("failed to decode record: {0}")]
    Decoding(#[from] minicbor::decode::Error),
    #[error("document store I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("image processing failed: {0}")]
    Image(#[from] image::ImageError),
    #[error("spreadsheet rendering failed: {0}")]
    Render(#[from] rust_xlsxwriter::XlsxError),
    #[error("configuration error: {0}")]
    Config(#[from] Box<figment::Error>),
}

impl ProcessFileError {
    pub fn not_found(what: impl std::fmt::Display) -> Self {
        Self::NotFound(what.to_string())
    }

    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::PermissionDenied(message.into())
    }

    pub fn invalid_transition(message: impl Into<String>) -> Self {
        Self::InvalidStateTransition(message.into())
    }

    /// HTTP status an outer boundary should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            Self::PermissionDenied(_) => 403,
            Self::NotFound(_) => 404,
            Self::Conflict(_) | Self::InvalidStateTransition(_) => 409,
            Self::ArtifactGeneration(_) => 422,
            _ => 500,
        }
    }

    /// Errors that leave persisted state untouched and are safe to show to end users.
    pub fn is_client_error(&self) -> bool {
        self.status_code() < 500
    }
}

impl From<figment::Error> for ProcessFileError {
    fn from(value: figment::Error) -> Self {
        Self::Config(Box::new(value))
    }
}

impl From<TransactionError<ProcessFileError>> for ProcessFileError {
    fn from(value: TransactionError<ProcessFileError>) -> Self {
        match value {
            TransactionError::Abort(inner) => inner,
            TransactionError::Storage(err) => Self::Storage(err),
        }
    }
}

pub type Result<T, E = ProcessFileError> = std::result::Result<T, E>;
