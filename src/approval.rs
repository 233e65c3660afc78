//! The role gated approval workflow.
//!
//! `status` on the file row is the single-writer gate. Every transition is
//! validated up front and then re-checked inside the transaction that writes
//! it, so of two concurrent decisions at the same level only the first one
//! lands and the other sees InvalidStateTransition. Only the current version
//! of a chain moves through the workflow. Images written ahead of a
//! transaction that does not commit are removed again.
use crate::auth::Actor;
use crate::error::{ProcessFileError, Result, ValidationError};
use crate::model::{
    ProcessFile, ProcessFileApproval, ProcessFileSeal, ProcessFileSignature, SEAL_CONTENT, SEAL_TYPE,
};
use crate::seal;
use crate::signature::{SignatureCapture, SignatureUpload};
use crate::storage::DocumentStore;
use crate::store::{
    Store, TxResult, abort, child_key, id_key, tx_insert_signature, tx_load_file, tx_put, tx_put_file,
};
use crate::types::TimeStamp;
use crate::workflow::{ApprovalLevel, ApprovalResult, FileStatus, SignatureType};
use chrono::Utc;
use parking_lot::Mutex;
use sled::Transactional;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApprovalDecision {
    pub result: ApprovalResult,
    pub opinion: Option<String>,
}

impl ApprovalDecision {
    pub fn pass() -> Self {
        Self {
            result: ApprovalResult::Pass,
            opinion: None,
        }
    }

    pub fn reject() -> Self {
        Self {
            result: ApprovalResult::Reject,
            opinion: None,
        }
    }

    pub fn set_opinion(mut self, opinion: &str) -> Self {
        self.opinion = Some(opinion.to_string());
        self
    }
}

/// The level awaiting a decision on `file`.
pub fn pending_step(file: &ProcessFile) -> Result<ApprovalLevel> {
    file.status.pending_level().ok_or_else(|| {
        ProcessFileError::invalid_transition(format!(
            "{} is {} and awaits no approval",
            file.file_no,
            file.status.text()
        ))
    })
}

pub fn authorize(actor: &Actor, level: ApprovalLevel) -> Result<()> {
    let role = level.required_role();
    if actor.holds(role) {
        Ok(())
    } else {
        Err(ProcessFileError::permission_denied(format!(
            "{} requires role {}",
            level.text(),
            role.code()
        )))
    }
}

fn concurrent_change(file: &ProcessFile) -> ProcessFileError {
    ProcessFileError::invalid_transition(format!("status of {} changed concurrently", file.file_no))
}

#[derive(Clone)]
pub struct ApprovalStateMachine {
    store: Store,
    documents: DocumentStore,
    signatures: SignatureCapture,
    /// Serializes enabling so two machines never end up with two enabled cards.
    enabling: Arc<Mutex<()>>,
}

impl ApprovalStateMachine {
    pub fn new(store: Store, documents: DocumentStore, signatures: SignatureCapture) -> Self {
        Self {
            store,
            documents,
            signatures,
            enabling: Arc::new(Mutex::new(())),
        }
    }

    /// Draft to pending review. Only the creator may submit, with a signature.
    pub fn submit(&self, file_id: u64, actor: &Actor, upload: &SignatureUpload) -> Result<ProcessFile> {
        let file = self.store.require_file(file_id)?;
        if file.creator_id != actor.id {
            return Err(ProcessFileError::permission_denied(format!(
                "only the creator of {} may submit it",
                file.file_no
            )));
        }
        if file.status != FileStatus::Draft || !file.is_current {
            return Err(ProcessFileError::invalid_transition(format!(
                "{} is {} and cannot be submitted",
                file.file_no,
                file.status.text()
            )));
        }

        let signature = self
            .signatures
            .prepare(&file, SignatureType::Submit, upload, actor)?;

        let store = &self.store;
        let committed = (&store.files, &store.signatures, &store.signature_index).transaction(
            |(files, signatures, index)| -> TxResult<ProcessFile> {
                let mut current = tx_load_file(files, file_id)?;
                if current.status != FileStatus::Draft || !current.is_current {
                    return abort(concurrent_change(&current));
                }
                tx_insert_signature(signatures, index, &signature)?;
                current.status = FileStatus::PendingWorkshopDirectorReview;
                current.submit_time = Some(signature.signature_time.clone());
                current.update_time = TimeStamp::new();
                tx_put_file(files, &current)?;
                Ok(current)
            },
        );
        let submitted = match committed {
            Ok(submitted) => submitted,
            Err(err) => {
                self.discard_prepared(file_id, Some(&signature), None);
                return Err(err.into());
            }
        };

        info!(
            file_id,
            file_no = %submitted.file_no,
            status = submitted.status.code(),
            "process file submitted"
        );
        self.signatures.refresh_overlay(file_id);
        Ok(submitted)
    }

    /// Records a decision for the pending level. A pass needs a signature,
    /// a reject may carry one.
    pub fn approve(
        &self,
        file_id: u64,
        actor: &Actor,
        decision: &ApprovalDecision,
        upload: Option<&SignatureUpload>,
    ) -> Result<ProcessFile> {
        let file = self.store.require_file(file_id)?;
        if !file.is_current {
            return Err(ProcessFileError::invalid_transition(format!(
                "{} v{} was superseded and can no longer be approved",
                file.file_no, file.version
            )));
        }
        let level = pending_step(&file)?;
        authorize(actor, level)?;
        let passed = decision.result == ApprovalResult::Pass;
        if passed && upload.is_none() {
            return Err(ValidationError::MissingApprovalSignature.into());
        }

        let signature = upload
            .map(|upload| {
                self.signatures
                    .prepare(&file, level.signature_type(), upload, actor)
            })
            .transpose()?;
        let now = TimeStamp::new();
        let seal = if passed && level.next_status() == FileStatus::Effective {
            Some(self.prepare_seal(&file, actor, &now)?)
        } else {
            None
        };
        let approval = ProcessFileApproval {
            id: self.store.next_id()?,
            file_id,
            file_no: file.file_no.clone(),
            approval_level: level,
            approver_id: actor.id,
            approver_name: actor.name.clone(),
            approver_role: level.required_role().legacy_name().to_string(),
            approval_result: decision.result,
            approval_opinion: decision.opinion.clone(),
            approval_time: now.clone(),
            signature_id: signature.as_ref().map(|s| s.id),
        };

        let store = &self.store;
        let committed = (
            &store.files,
            &store.approvals,
            &store.signatures,
            &store.signature_index,
            &store.seals,
        )
            .transaction(|(files, approvals, signatures, index, seals)| -> TxResult<ProcessFile> {
                let mut current = tx_load_file(files, file_id)?;
                if current.status != file.status || !current.is_current {
                    return abort(concurrent_change(&current));
                }
                if let Some(signature) = &signature {
                    tx_insert_signature(signatures, index, signature)?;
                }
                tx_put(approvals, &child_key(file_id, approval.id), &approval)?;

                current.status = if passed {
                    level.next_status()
                } else {
                    FileStatus::Rejected
                };
                if let Some(seal) = &seal {
                    if seals.get(id_key(file_id))?.is_some() {
                        return abort(ProcessFileError::Conflict(format!(
                            "{} is already sealed",
                            current.file_no
                        )));
                    }
                    tx_put(seals, &id_key(file_id), seal)?;
                    current.approval_time = Some(now.clone());
                    current.effective_time = Some(now.clone());
                    current.seal_image_path = Some(seal.seal_image_path.clone());
                }
                current.update_time = now.clone();
                tx_put_file(files, &current)?;
                Ok(current)
            });
        let decided = match committed {
            Ok(decided) => decided,
            Err(err) => {
                self.discard_prepared(file_id, signature.as_ref(), seal.as_ref());
                return Err(err.into());
            }
        };

        info!(
            file_id,
            file_no = %decided.file_no,
            level = level.number(),
            result = decision.result.text(),
            status = decided.status.code(),
            "approval recorded"
        );
        if seal.is_some() {
            info!(file_id, file_no = %decided.file_no, "process file sealed and effective");
        }
        self.signatures.refresh_overlay(file_id);
        Ok(decided)
    }

    /// Removes images written for a decision that did not commit.
    fn discard_prepared(
        &self,
        file_id: u64,
        signature: Option<&ProcessFileSignature>,
        seal: Option<&ProcessFileSeal>,
    ) {
        if let Some(signature) = signature {
            self.documents.discard(&signature.signature_image_path);
        }
        // the seal image path is per file number, keep it if someone else sealed
        if let Some(seal) = seal.filter(|_| matches!(self.store.seal(file_id), Ok(None))) {
            self.documents.discard(&seal.seal_image_path);
        }
    }

    fn prepare_seal(
        &self,
        file: &ProcessFile,
        actor: &Actor,
        now: &TimeStamp<Utc>,
    ) -> Result<ProcessFileSeal> {
        let path = ProcessFileSeal::seal_image_path_for(&file.file_no);
        self.documents.write(&path, &seal::controlled_seal_png()?)?;
        Ok(ProcessFileSeal {
            id: self.store.next_id()?,
            file_id: file.id,
            file_no: file.file_no.clone(),
            seal_no: format!("SEAL{}", now.second_code()),
            seal_type: SEAL_TYPE.to_string(),
            seal_content: SEAL_CONTENT.to_string(),
            seal_image_path: path,
            seal_time: now.clone(),
            seal_by_id: actor.id,
            seal_by_name: actor.name.clone(),
        })
    }

    /// Irreversibly retires a document. History stays readable.
    pub fn invalidate(&self, file_id: u64, actor: &Actor) -> Result<ProcessFile> {
        let file = self.store.require_file(file_id)?;
        if file.status == FileStatus::Invalidated {
            return Err(ProcessFileError::invalid_transition(format!(
                "{} is already invalidated",
                file.file_no
            )));
        }
        let invalidated = self.store.files.transaction(|files| -> TxResult<ProcessFile> {
            let mut current = tx_load_file(files, file_id)?;
            if current.status == FileStatus::Invalidated {
                return abort(concurrent_change(&current));
            }
            let now = TimeStamp::new();
            current.status = FileStatus::Invalidated;
            current.invalid_time = Some(now.clone());
            current.enabled = false;
            current.update_time = now;
            tx_put_file(files, &current)?;
            Ok(current)
        })?;
        info!(
            file_id,
            file_no = %invalidated.file_no,
            actor_id = actor.id,
            "process file invalidated"
        );
        Ok(invalidated)
    }

    /// Invalidates every live document of one equipment in one transaction.
    pub fn batch_invalidate_by_equipment(&self, equipment_id: u64, actor: &Actor) -> Result<usize> {
        let ids: Vec<u64> = self
            .store
            .files_for_equipment(equipment_id)?
            .into_iter()
            .filter(|f| f.status != FileStatus::Invalidated)
            .map(|f| f.id)
            .collect();
        let count = self.store.files.transaction(|files| -> TxResult<usize> {
            let now = TimeStamp::new();
            let mut count = 0usize;
            for id in &ids {
                let mut current = tx_load_file(files, *id)?;
                if current.status == FileStatus::Invalidated {
                    continue;
                }
                current.status = FileStatus::Invalidated;
                current.invalid_time = Some(now.clone());
                current.enabled = false;
                current.update_time = now.clone();
                tx_put_file(files, &current)?;
                count += 1;
            }
            Ok(count)
        })?;
        info!(equipment_id, count, actor_id = actor.id, "process files invalidated");
        Ok(count)
    }

    /// Makes an effective document the one in use on its machine.
    pub fn set_enabled(&self, file_id: u64) -> Result<ProcessFile> {
        let _enabling = self.enabling.lock();
        let file = self.store.require_file(file_id)?;
        if file.status != FileStatus::Effective {
            return Err(ProcessFileError::invalid_transition(format!(
                "{} is {}, only effective documents can be enabled",
                file.file_no,
                file.status.text()
            )));
        }
        let others: Vec<u64> = self
            .store
            .files()?
            .into_iter()
            .filter(|f| f.id != file_id && f.enabled && f.machine_key() == file.machine_key())
            .map(|f| f.id)
            .collect();

        let enabled = self.store.files.transaction(|files| -> TxResult<ProcessFile> {
            let now = TimeStamp::new();
            for id in &others {
                let mut other = tx_load_file(files, *id)?;
                other.enabled = false;
                other.update_time = now.clone();
                tx_put_file(files, &other)?;
            }
            let mut current = tx_load_file(files, file_id)?;
            if current.status != FileStatus::Effective {
                return abort(concurrent_change(&current));
            }
            current.enabled = true;
            current.update_time = now;
            tx_put_file(files, &current)?;
            Ok(current)
        })?;
        info!(
            file_id,
            file_no = %enabled.file_no,
            machine = enabled.machine_key(),
            disabled = others.len(),
            "process file enabled"
        );
        Ok(enabled)
    }

    pub fn set_archived(&self, file_id: u64) -> Result<ProcessFile> {
        let archived = self.store.update_file(file_id, |f| {
            f.enabled = false;
            Ok(())
        })?;
        info!(file_id, file_no = %archived.file_no, "process file archived");
        Ok(archived)
    }
}
