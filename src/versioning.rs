//! Document creation and revision into append-only version chains.
use crate::auth::Actor;
use crate::detail::ProcessFileDetail;
use crate::equipment::{Equipment, EquipmentDirectory};
use crate::error::{ProcessFileError, Result, ValidationError};
use crate::model::{FileType, OverlayManifest, ProcessFile};
use crate::storage::DocumentStore;
use crate::store::{Store, TxResult, abort, id_key, tx_load_file, tx_put, tx_put_file};
use crate::types::TimeStamp;
use crate::utils;
use crate::workflow::FileStatus;
use chrono::Utc;
use parking_lot::Mutex;
use serde::Deserialize;
use sled::Transactional;
use sled::transaction::TransactionalTree;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// Input of a save: a new document when `id` is `None`, otherwise a
/// revision of the document with that id.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProcessFileForm {
    pub id: Option<u64>,
    /// On a revision, zero keeps the equipment of the revised version.
    pub equipment_id: u64,
    pub file_no: Option<String>,
    pub file_name: Option<String>,
    pub change_reason: Option<String>,
    pub remark: Option<String>,
    pub detail: ProcessFileDetail,
}

impl ProcessFileForm {
    pub fn new(equipment_id: u64, file_no: &str, file_name: &str) -> Self {
        Self {
            equipment_id,
            file_no: Some(file_no.to_string()),
            file_name: Some(file_name.to_string()),
            ..Self::default()
        }
    }

    /// A revision of `id`. Fields left unset in `detail` keep their value.
    pub fn revision(id: u64, change_reason: &str) -> Self {
        Self {
            id: Some(id),
            change_reason: Some(change_reason.to_string()),
            ..Self::default()
        }
    }

    pub fn set_equipment_id(mut self, equipment_id: u64) -> Self {
        self.equipment_id = equipment_id;
        self
    }

    pub fn set_detail(mut self, detail: ProcessFileDetail) -> Self {
        self.detail = detail;
        self
    }

    pub fn set_remark(mut self, remark: &str) -> Self {
        self.remark = Some(remark.to_string());
        self
    }
}

/// A workbook stored exactly as uploaded. Same versioning rules as
/// [`ProcessFileForm`]; the structured body is carried forward on revision.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UploadForm {
    pub id: Option<u64>,
    pub equipment_id: u64,
    /// Name the client uploaded the workbook under, kept for downloads.
    pub original_file_name: String,
    pub change_reason: Option<String>,
    pub remark: Option<String>,
}

impl UploadForm {
    pub fn new(equipment_id: u64, original_file_name: &str) -> Self {
        Self {
            equipment_id,
            original_file_name: original_file_name.to_string(),
            ..Self::default()
        }
    }

    pub fn revision(id: u64, original_file_name: &str, change_reason: &str) -> Self {
        Self {
            id: Some(id),
            original_file_name: original_file_name.to_string(),
            change_reason: Some(change_reason.to_string()),
            ..Self::default()
        }
    }

    pub fn set_equipment_id(mut self, equipment_id: u64) -> Self {
        self.equipment_id = equipment_id;
        self
    }

    pub fn set_remark(mut self, remark: &str) -> Self {
        self.remark = Some(remark.to_string());
        self
    }
}

/// Name given to system numbered revisions.
pub fn revision_file_name(file_no: &str) -> String {
    format!("注塑工艺卡片_{file_no}.xlsx")
}

/// Where an uploaded workbook is kept.
pub fn upload_path(at: &TimeStamp<Utc>, file_no: &str, extension: &str) -> String {
    format!("process-files/{}/{file_no}.{extension}", at.month_partition())
}

fn tx_register_file_no(numbers: &TransactionalTree, file: &ProcessFile) -> TxResult<()> {
    if numbers.get(file.file_no.as_bytes())?.is_some() {
        return abort(ProcessFileError::Conflict(format!(
            "file number {} already exists",
            file.file_no
        )));
    }
    numbers.insert(file.file_no.as_bytes(), &id_key(file.id)[..])?;
    Ok(())
}

/// Takes the revised version off the head of its chain.
fn tx_retire(files: &TransactionalTree, id: u64, now: &TimeStamp<Utc>) -> TxResult<()> {
    let mut prior = tx_load_file(files, id)?;
    if !prior.is_current {
        return abort(ProcessFileError::invalid_transition(format!(
            "{} was revised concurrently",
            prior.file_no
        )));
    }
    prior.is_current = false;
    prior.update_time = now.clone();
    tx_put_file(files, &prior)
}

/// Header of a fresh version 1 draft.
fn draft(
    id: u64,
    file_no: String,
    file_name: String,
    equipment: Equipment,
    remark: Option<String>,
    actor: &Actor,
    now: &TimeStamp<Utc>,
) -> ProcessFile {
    ProcessFile {
        id,
        file_no,
        equipment_id: equipment.id,
        equipment_no: equipment.equipment_no,
        machine_no: equipment.machine_no,
        file_name,
        file_path: String::new(),
        file_size: 0,
        file_type: FileType::Form,
        version: 1,
        status: FileStatus::Draft,
        creator_id: actor.id,
        creator_name: actor.name.clone(),
        submit_time: None,
        approval_time: None,
        effective_time: None,
        invalid_time: None,
        seal_image_path: None,
        is_current: true,
        enabled: false,
        parent_file_id: None,
        change_reason: None,
        remark,
        create_time: now.clone(),
        update_time: now.clone(),
        artifact: None,
    }
}

/// Links a draft into the chain after `previous`.
fn succeed(file: &mut ProcessFile, previous: &ProcessFile, change_reason: String) {
    file.version = previous.version + 1;
    file.parent_file_id = Some(previous.id);
    file.change_reason = Some(change_reason);
    if file.remark.is_none() {
        file.remark = previous.remark.clone();
    }
}

#[derive(Clone)]
pub struct VersionChain {
    store: Store,
    documents: DocumentStore,
    equipment: Arc<dyn EquipmentDirectory>,
    max_upload_bytes: usize,
    /// Held from choosing a generated number until it is committed.
    numbering: Arc<Mutex<()>>,
}

impl VersionChain {
    pub fn new(
        store: Store,
        documents: DocumentStore,
        equipment: Arc<dyn EquipmentDirectory>,
        max_upload_bytes: usize,
    ) -> Self {
        Self {
            store,
            documents,
            equipment,
            max_upload_bytes,
            numbering: Arc::new(Mutex::new(())),
        }
    }

    pub fn create_or_revise(&self, form: &ProcessFileForm, actor: &Actor) -> Result<u64> {
        match form.id {
            None => self.create(form, actor),
            Some(id) => self.revise(id, form, actor),
        }
    }

    fn resolve_equipment(&self, equipment_id: u64) -> Result<Equipment> {
        self.equipment
            .equipment_by_id(equipment_id)
            .ok_or_else(|| ProcessFileError::not_found(format!("equipment {equipment_id}")))
    }

    /// Equipment of a new version: the requested one, or the previous
    /// version's when none was requested. Looked up either way.
    fn successor_equipment(&self, requested: u64, previous: &ProcessFile) -> Result<Equipment> {
        let id = if requested == 0 {
            previous.equipment_id
        } else {
            requested
        };
        self.resolve_equipment(id)
    }

    /// The version `id` after checking it is a head that may be revised.
    fn revisable(&self, id: u64, change_reason: Option<&str>) -> Result<(ProcessFile, String)> {
        let change_reason =
            utils::non_blank(change_reason).ok_or(ValidationError::MissingChangeReason)?;
        let previous = self.store.require_file(id)?;
        if !previous.is_current {
            return Err(ProcessFileError::invalid_transition(format!(
                "{} v{} is not the current version",
                previous.file_no, previous.version
            )));
        }
        if previous.status == FileStatus::Invalidated {
            return Err(ProcessFileError::invalid_transition(format!(
                "{} is invalidated",
                previous.file_no
            )));
        }
        Ok((previous, change_reason))
    }

    /// Next free `PF<date><seq>` number. Caller holds the numbering lock.
    fn generate_file_no(&self, now: &TimeStamp<Utc>) -> Result<String> {
        let prefix = utils::file_no_prefix(&now.date_code());
        let mut file_no = utils::next_file_no(&prefix, self.store.last_file_no(&prefix)?.as_deref());
        while self.store.file_no_taken(&file_no)? {
            file_no = utils::next_file_no(&prefix, Some(&file_no));
        }
        Ok(file_no)
    }

    fn create(&self, form: &ProcessFileForm, actor: &Actor) -> Result<u64> {
        let file_no = utils::validate_identifier(
            "fileNo",
            form.file_no.as_deref(),
            ValidationError::MissingFileNo,
        )?;
        let file_name = utils::validate_identifier(
            "fileName",
            form.file_name.as_deref(),
            ValidationError::MissingFileName,
        )?;
        let equipment = self.resolve_equipment(form.equipment_id)?;
        if self.store.file_no_taken(&file_no)? {
            return Err(ProcessFileError::Conflict(format!(
                "file number {file_no} already exists"
            )));
        }

        let now = TimeStamp::new();
        let file = draft(
            self.store.next_id()?,
            file_no,
            file_name,
            equipment,
            utils::non_blank(form.remark.as_deref()),
            actor,
            &now,
        );

        let store = &self.store;
        (&store.files, &store.details, &store.file_numbers).transaction(
            |(files, details, numbers)| -> TxResult<()> {
                tx_register_file_no(numbers, &file)?;
                tx_put_file(files, &file)?;
                tx_put(details, &id_key(file.id), &form.detail)?;
                Ok(())
            },
        )?;

        info!(file_id = file.id, file_no = %file.file_no, "process file created");
        Ok(file.id)
    }

    fn revise(&self, id: u64, form: &ProcessFileForm, actor: &Actor) -> Result<u64> {
        let (previous, change_reason) = self.revisable(id, form.change_reason.as_deref())?;
        let equipment = self.successor_equipment(form.equipment_id, &previous)?;

        // Copy the previous body forward, then apply what the form sets
        let mut detail = self.store.detail(id)?.unwrap_or_default();
        detail.overlay(&form.detail);

        let _numbering = self.numbering.lock();
        let now = TimeStamp::new();
        let file_no = self.generate_file_no(&now)?;
        let mut file = draft(
            self.store.next_id()?,
            file_no.clone(),
            revision_file_name(&file_no),
            equipment,
            utils::non_blank(form.remark.as_deref()),
            actor,
            &now,
        );
        succeed(&mut file, &previous, change_reason);

        let store = &self.store;
        (&store.files, &store.details, &store.file_numbers).transaction(
            |(files, details, numbers)| -> TxResult<()> {
                tx_retire(files, id, &now)?;
                tx_register_file_no(numbers, &file)?;
                tx_put_file(files, &file)?;
                tx_put(details, &id_key(file.id), &detail)?;
                Ok(())
            },
        )?;

        info!(
            file_id = file.id,
            file_no = %file.file_no,
            parent_file_id = id,
            version = file.version,
            equipment_id = file.equipment_id,
            "process file revised"
        );
        Ok(file.id)
    }

    /// Stores an uploaded workbook as a new document, or as the next
    /// version of `form.id`. The file gets a generated number and is kept
    /// under it with its original extension.
    pub fn upload(&self, form: &UploadForm, bytes: &[u8], actor: &Actor) -> Result<u64> {
        if bytes.is_empty() {
            return Err(ValidationError::EmptyUpload.into());
        }
        if bytes.len() > self.max_upload_bytes {
            return Err(ValidationError::UploadTooLarge {
                size: bytes.len(),
                limit: self.max_upload_bytes,
            }
            .into());
        }
        let file_name = utils::validate_identifier(
            "fileName",
            Some(&form.original_file_name),
            ValidationError::MissingFileName,
        )?;
        let extension = utils::upload_extension(&file_name)?;

        let (lineage, equipment) = match form.id {
            None => (None, self.resolve_equipment(form.equipment_id)?),
            Some(id) => {
                let (previous, reason) = self.revisable(id, form.change_reason.as_deref())?;
                let equipment = self.successor_equipment(form.equipment_id, &previous)?;
                (Some((previous, reason)), equipment)
            }
        };
        let detail = match &lineage {
            Some((previous, _)) => self.store.detail(previous.id)?,
            None => None,
        };

        let _numbering = self.numbering.lock();
        let now = TimeStamp::new();
        let file_no = self.generate_file_no(&now)?;
        let id = self.store.next_id()?;
        let path = upload_path(&now, &file_no, extension);
        let size = self.documents.write(&path, bytes)?;

        let mut file = draft(
            id,
            file_no,
            file_name,
            equipment,
            utils::non_blank(form.remark.as_deref()),
            actor,
            &now,
        );
        let previous = lineage.map(|(previous, reason)| {
            succeed(&mut file, &previous, reason);
            previous
        });
        file.file_path = path.clone();
        file.file_size = size;
        file.file_type = FileType::Upload;
        file.artifact = Some(OverlayManifest {
            digest: sha256::digest(bytes),
            signature_ids: vec![],
            sealed: false,
            rendered_at: now.clone(),
        });

        let store = &self.store;
        let committed = (&store.files, &store.details, &store.file_numbers).transaction(
            |(files, details, numbers)| -> TxResult<()> {
                if let Some(previous) = &previous {
                    tx_retire(files, previous.id, &now)?;
                }
                tx_register_file_no(numbers, &file)?;
                tx_put_file(files, &file)?;
                if let Some(detail) = &detail {
                    tx_put(details, &id_key(file.id), detail)?;
                }
                Ok(())
            },
        );
        if let Err(err) = committed {
            self.documents.discard(&path);
            return Err(err.into());
        }

        info!(
            file_id = file.id,
            file_no = %file.file_no,
            parent_file_id = ?file.parent_file_id,
            version = file.version,
            size,
            "process file uploaded"
        );
        Ok(file.id)
    }

    /// Every version of the chain `file_id` belongs to, oldest first.
    pub fn chain(&self, file_id: u64) -> Result<Vec<ProcessFile>> {
        let start = self.store.require_file(file_id)?;
        // a revision may move to other equipment, so the whole table is walked
        let files: HashMap<u64, ProcessFile> = self
            .store
            .files()?
            .into_iter()
            .map(|f| (f.id, f))
            .collect();
        let mut children: HashMap<u64, Vec<u64>> = HashMap::new();
        for file in files.values() {
            if let Some(parent) = file.parent_file_id {
                children.entry(parent).or_default().push(file.id);
            }
        }

        let mut root = start.id;
        while let Some(parent) = files.get(&root).and_then(|f| f.parent_file_id) {
            if !files.contains_key(&parent) {
                break;
            }
            root = parent;
        }

        let mut chain = vec![];
        let mut pending = vec![root];
        while let Some(id) = pending.pop() {
            if let Some(file) = files.get(&id) {
                chain.push(file.clone());
            }
            if let Some(next) = children.get(&id) {
                pending.extend(next);
            }
        }
        chain.sort_by_key(|f| (f.version, f.id));
        Ok(chain)
    }

    /// The current version of the chain `file_id` belongs to.
    pub fn current_of(&self, file_id: u64) -> Result<Option<ProcessFile>> {
        Ok(self.chain(file_id)?.into_iter().find(|f| f.is_current))
    }
}
