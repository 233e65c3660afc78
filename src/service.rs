//! Service layer API for process file lifecycle operations
use crate::approval::{ApprovalDecision, ApprovalStateMachine};
use crate::artifact::{Artifact, Materializer, OverlayReport};
use crate::auth::{Actor, Authorization};
use crate::config::ServiceConfig;
use crate::detail::ProcessFileDetail;
use crate::equipment::EquipmentDirectory;
use crate::error::{ProcessFileError, Result};
use crate::model::{ProcessFile, ProcessFileApproval, ProcessFileSeal, ProcessFileSignature};
use crate::seal;
use crate::signature::{SignatureCapture, SignatureUpload};
use crate::storage::DocumentStore;
use crate::store::Store;
use crate::types::{Page, PageRequest, TimeStamp};
use crate::versioning::{ProcessFileForm, UploadForm, VersionChain};
use crate::workflow::{FileStatus, SignatureType};
use chrono::Utc;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::info;

/// Row of a listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileSummary {
    pub id: u64,
    pub file_no: String,
    pub file_name: String,
    pub equipment_no: String,
    pub machine_no: Option<String>,
    pub version: u32,
    pub version_text: String,
    pub status: FileStatus,
    pub status_text: &'static str,
    pub is_current: bool,
    pub enabled: bool,
    pub creator_name: String,
    pub file_size_text: String,
    pub next_approver_role: Option<&'static str>,
    pub submit_time: Option<TimeStamp<Utc>>,
    pub effective_time: Option<TimeStamp<Utc>>,
    pub create_time: TimeStamp<Utc>,
}

impl From<&ProcessFile> for FileSummary {
    fn from(file: &ProcessFile) -> Self {
        Self {
            id: file.id,
            file_no: file.file_no.clone(),
            file_name: file.file_name.clone(),
            equipment_no: file.equipment_no.clone(),
            machine_no: file.machine_no.clone(),
            version: file.version,
            version_text: file.version_text(),
            status: file.status,
            status_text: file.status_text(),
            is_current: file.is_current,
            enabled: file.enabled,
            creator_name: file.creator_name.clone(),
            file_size_text: file.file_size_text(),
            next_approver_role: file.next_approver_role(),
            submit_time: file.submit_time.clone(),
            effective_time: file.effective_time.clone(),
            create_time: file.create_time.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureView {
    #[serde(flatten)]
    pub signature: ProcessFileSignature,
    pub signature_type_text: &'static str,
}

impl From<ProcessFileSignature> for SignatureView {
    fn from(signature: ProcessFileSignature) -> Self {
        Self {
            signature_type_text: signature.signature_type.text(),
            signature,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalView {
    #[serde(flatten)]
    pub approval: ProcessFileApproval,
    pub approval_level_text: &'static str,
    pub approval_result_text: &'static str,
    pub signature: Option<SignatureView>,
}

/// A document with its approval history and seal.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentView {
    #[serde(flatten)]
    pub file: ProcessFile,
    pub status_text: &'static str,
    pub version_text: String,
    pub file_size_text: String,
    pub current_approval_level: Option<u8>,
    pub next_approver_role: Option<&'static str>,
    pub approvals: Vec<ApprovalView>,
    pub seal: Option<ProcessFileSeal>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Download {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// Listing filters. Text filters match substrings, the rest exactly.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileQuery {
    pub file_no: Option<String>,
    pub equipment_no: Option<String>,
    pub machine_no: Option<String>,
    pub file_name: Option<String>,
    pub creator_name: Option<String>,
    pub status: Option<FileStatus>,
    pub version: Option<u32>,
    pub is_current: Option<bool>,
    pub enabled: Option<bool>,
}

impl FileQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_file_no(mut self, file_no: &str) -> Self {
        self.file_no = Some(file_no.to_string());
        self
    }

    pub fn set_equipment_no(mut self, equipment_no: &str) -> Self {
        self.equipment_no = Some(equipment_no.to_string());
        self
    }

    pub fn set_machine_no(mut self, machine_no: &str) -> Self {
        self.machine_no = Some(machine_no.to_string());
        self
    }

    pub fn set_file_name(mut self, file_name: &str) -> Self {
        self.file_name = Some(file_name.to_string());
        self
    }

    pub fn set_creator_name(mut self, creator_name: &str) -> Self {
        self.creator_name = Some(creator_name.to_string());
        self
    }

    pub fn set_status(mut self, status: FileStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn set_version(mut self, version: u32) -> Self {
        self.version = Some(version);
        self
    }

    pub fn set_is_current(mut self, is_current: bool) -> Self {
        self.is_current = Some(is_current);
        self
    }

    pub fn set_enabled(mut self, enabled: bool) -> Self {
        self.enabled = Some(enabled);
        self
    }

    pub fn matches(&self, file: &ProcessFile) -> bool {
        fn contains(filter: &Option<String>, value: Option<&str>) -> bool {
            match filter.as_deref().map(str::trim).filter(|f| !f.is_empty()) {
                None => true,
                Some(needle) => value.is_some_and(|v| v.contains(needle)),
            }
        }
        fn equals<T: PartialEq>(filter: &Option<T>, value: &T) -> bool {
            filter.as_ref().is_none_or(|f| f == value)
        }
        contains(&self.file_no, Some(file.file_no.as_str()))
            && contains(&self.equipment_no, Some(file.equipment_no.as_str()))
            && contains(&self.machine_no, file.machine_no.as_deref())
            && contains(&self.file_name, Some(file.file_name.as_str()))
            && contains(&self.creator_name, Some(file.creator_name.as_str()))
            && equals(&self.status, &file.status)
            && equals(&self.version, &file.version)
            && equals(&self.is_current, &file.is_current)
            && equals(&self.enabled, &file.enabled)
    }
}

pub struct ProcessFileService {
    store: Store,
    documents: DocumentStore,
    versions: VersionChain,
    approvals: ApprovalStateMachine,
    signatures: SignatureCapture,
    materializer: Materializer,
}

impl ProcessFileService {
    pub fn new(
        instance: Arc<sled::Db>,
        equipment: Arc<dyn EquipmentDirectory>,
        config: &ServiceConfig,
    ) -> Result<Self> {
        let store = Store::open(instance)?;
        let documents = DocumentStore::new(config.upload_root.clone());
        let materializer = Materializer::new(
            store.clone(),
            documents.clone(),
            equipment.clone(),
            &config.company_name,
        );
        let signatures = SignatureCapture::new(
            store.clone(),
            documents.clone(),
            materializer.clone(),
            config.max_signature_bytes,
        );
        Ok(Self {
            versions: VersionChain::new(
                store.clone(),
                documents.clone(),
                equipment,
                config.max_upload_bytes,
            ),
            approvals: ApprovalStateMachine::new(store.clone(), documents.clone(), signatures.clone()),
            signatures,
            materializer,
            documents,
            store,
        })
    }

    /// Opens the sled database at `config.database_path`.
    pub fn open(config: &ServiceConfig, equipment: Arc<dyn EquipmentDirectory>) -> Result<Self> {
        let db = sled::open(&config.database_path)?;
        info!(
            database = %config.database_path.display(),
            uploads = %config.upload_root.display(),
            "process file service opened"
        );
        Self::new(Arc::new(db), equipment, config)
    }

    /// Resolves the caller once, before any business rule runs.
    pub fn actor(&self, auth: &dyn Authorization) -> Result<Actor> {
        Actor::resolve(auth)
    }

    pub fn materializer(&self) -> &Materializer {
        &self.materializer
    }

    /// Creates a document, or a new version when `form.id` is set.
    pub fn save_form(&self, form: &ProcessFileForm, actor: &Actor) -> Result<u64> {
        self.versions.create_or_revise(form, actor)
    }

    /// Stores a workbook as uploaded, as a new document or a new version
    /// when `form.id` is set.
    pub fn upload_document(&self, form: &UploadForm, bytes: &[u8], actor: &Actor) -> Result<u64> {
        self.versions.upload(form, bytes, actor)
    }

    pub fn submit(&self, file_id: u64, actor: &Actor, upload: &SignatureUpload) -> Result<ProcessFile> {
        self.approvals.submit(file_id, actor, upload)
    }

    pub fn approve(
        &self,
        file_id: u64,
        actor: &Actor,
        decision: &ApprovalDecision,
        upload: Option<&SignatureUpload>,
    ) -> Result<ProcessFile> {
        self.approvals.approve(file_id, actor, decision, upload)
    }

    pub fn invalidate(&self, file_id: u64, actor: &Actor) -> Result<ProcessFile> {
        self.approvals.invalidate(file_id, actor)
    }

    pub fn batch_invalidate_by_equipment(&self, equipment_id: u64, actor: &Actor) -> Result<usize> {
        self.approvals.batch_invalidate_by_equipment(equipment_id, actor)
    }

    pub fn set_enabled(&self, file_id: u64) -> Result<ProcessFile> {
        self.approvals.set_enabled(file_id)
    }

    pub fn set_archived(&self, file_id: u64) -> Result<ProcessFile> {
        self.approvals.set_archived(file_id)
    }

    pub fn capture_signature(
        &self,
        file_id: u64,
        signature_type: SignatureType,
        upload: &SignatureUpload,
        actor: &Actor,
    ) -> Result<u64> {
        self.signatures.capture(file_id, signature_type, upload, actor)
    }

    /// Re-applies overlays to an already rendered artifact.
    pub fn ensure_overlaid(&self, file_id: u64) -> Result<Option<OverlayReport>> {
        self.materializer.ensure_overlaid(file_id)
    }

    pub fn file(&self, file_id: u64) -> Result<ProcessFile> {
        self.store.require_file(file_id)
    }

    pub fn document(&self, file_id: u64) -> Result<DocumentView> {
        let file = self.store.require_file(file_id)?;
        let signatures: HashMap<u64, ProcessFileSignature> = self
            .store
            .signatures(file_id)?
            .into_iter()
            .map(|s| (s.id, s))
            .collect();
        let approvals = self
            .store
            .approvals(file_id)?
            .into_iter()
            .map(|approval| ApprovalView {
                approval_level_text: approval.approval_level.text(),
                approval_result_text: approval.approval_result.text(),
                signature: approval
                    .signature_id
                    .and_then(|id| signatures.get(&id).cloned())
                    .map(SignatureView::from),
                approval,
            })
            .collect();
        Ok(DocumentView {
            status_text: file.status_text(),
            version_text: file.version_text(),
            file_size_text: file.file_size_text(),
            current_approval_level: file.current_approval_level().map(|l| l.number()),
            next_approver_role: file.next_approver_role(),
            approvals,
            seal: self.store.seal(file_id)?,
            file,
        })
    }

    pub fn detail(&self, file_id: u64) -> Result<ProcessFileDetail> {
        self.store.require_file(file_id)?;
        self.store
            .detail(file_id)?
            .ok_or_else(|| ProcessFileError::not_found(format!("detail of process file {file_id}")))
    }

    /// The artifact bytes, materialized on first use.
    pub fn download(&self, file_id: u64) -> Result<Download> {
        let Artifact { file, bytes, .. } = self.materializer.obtain_artifact(file_id)?;
        Ok(Download {
            file_name: file.download_name(),
            bytes,
        })
    }

    pub fn signatures(&self, file_id: u64) -> Result<Vec<SignatureView>> {
        self.store.require_file(file_id)?;
        Ok(self
            .store
            .signatures(file_id)?
            .into_iter()
            .map(SignatureView::from)
            .collect())
    }

    pub fn signature_image(&self, signature_id: u64) -> Result<Vec<u8>> {
        let signature = self
            .store
            .signature(signature_id)?
            .ok_or_else(|| ProcessFileError::not_found(format!("signature {signature_id}")))?;
        self.documents.read(&signature.signature_image_path)
    }

    /// The stored seal stamp, redrawn if the image went missing.
    pub fn seal_image(&self, file_id: u64) -> Result<Vec<u8>> {
        let seal = self
            .store
            .seal(file_id)?
            .ok_or_else(|| ProcessFileError::not_found(format!("seal of process file {file_id}")))?;
        if self.documents.exists(&seal.seal_image_path) {
            self.documents.read(&seal.seal_image_path)
        } else {
            seal::controlled_seal_png()
        }
    }

    pub fn version_chain(&self, file_id: u64) -> Result<Vec<FileSummary>> {
        Ok(self
            .versions
            .chain(file_id)?
            .iter()
            .map(FileSummary::from)
            .collect())
    }

    /// Head of the chain `file_id` belongs to.
    pub fn current_version(&self, file_id: u64) -> Result<Option<FileSummary>> {
        Ok(self
            .versions
            .current_of(file_id)?
            .as_ref()
            .map(FileSummary::from))
    }

    /// Newest first.
    pub fn list(&self, query: &FileQuery, page: PageRequest) -> Result<Page<FileSummary>> {
        let mut files: Vec<ProcessFile> = self
            .store
            .files()?
            .into_iter()
            .filter(|f| query.matches(f))
            .collect();
        files.sort_by(|a, b| b.create_time.cmp(&a.create_time).then(b.id.cmp(&a.id)));
        Ok(page.paginate(files.iter().map(FileSummary::from).collect()))
    }

    pub fn list_by_equipment(&self, equipment_id: u64, page: PageRequest) -> Result<Page<FileSummary>> {
        let mut files = self.store.files_for_equipment(equipment_id)?;
        files.sort_by(|a, b| b.create_time.cmp(&a.create_time).then(b.id.cmp(&a.id)));
        Ok(page.paginate(files.iter().map(FileSummary::from).collect()))
    }

    /// Current versions waiting on a level the actor may decide, oldest
    /// submission first.
    pub fn pending_approval(&self, actor: &Actor, page: PageRequest) -> Result<Page<FileSummary>> {
        let statuses: BTreeSet<i8> = actor
            .roles()
            .filter_map(|role| role.approval_level())
            .map(|level| level.pending_status().code())
            .collect();
        let mut files: Vec<ProcessFile> = self
            .store
            .files()?
            .into_iter()
            .filter(|f| f.is_current && statuses.contains(&f.status.code()))
            .collect();
        files.sort_by(|a, b| {
            (a.submit_time.is_none(), &a.submit_time, a.id).cmp(&(b.submit_time.is_none(), &b.submit_time, b.id))
        });
        Ok(page.paginate(files.iter().map(FileSummary::from).collect()))
    }

    pub fn flush(&self) -> Result<()> {
        self.store.flush()
    }
}
