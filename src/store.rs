//! sled backed persistence for process file records.
//!
//! Each record type lives in its own tree. Keys are big-endian ids so that
//! iteration follows insertion order. Child rows (approvals, signatures) are
//! keyed by `file id ++ row id` and read back with a prefix scan.
use crate::detail::ProcessFileDetail;
use crate::error::{ProcessFileError, Result};
use crate::model::{ProcessFile, ProcessFileApproval, ProcessFileSeal, ProcessFileSignature};
use crate::types::TimeStamp;
use crate::utils;
use minicbor::{Decode, Encode};
use sled::transaction::{
    ConflictableTransactionError, ConflictableTransactionResult, TransactionalTree,
};
use sled::{Db, Transactional, Tree};
use std::sync::Arc;

pub(crate) type TxResult<T> = ConflictableTransactionResult<T, ProcessFileError>;

pub(crate) fn id_key(id: u64) -> [u8; 8] {
    id.to_be_bytes()
}

pub(crate) fn child_key(parent: u64, child: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(16);
    key.extend_from_slice(&parent.to_be_bytes());
    key.extend_from_slice(&child.to_be_bytes());
    key
}

pub(crate) fn encode<T: Encode<()>>(value: &T) -> Result<Vec<u8>> {
    minicbor::to_vec(value).map_err(|e| ProcessFileError::Encoding(e.to_string()))
}

pub(crate) fn decode<T: for<'b> Decode<'b, ()>>(bytes: &[u8]) -> Result<T> {
    Ok(minicbor::decode(bytes)?)
}

/// Aborts the surrounding transaction with `err`.
pub(crate) fn abort<T>(err: impl Into<ProcessFileError>) -> TxResult<T> {
    Err(ConflictableTransactionError::Abort(err.into()))
}

pub(crate) fn tx_get<T: for<'b> Decode<'b, ()>>(
    tree: &TransactionalTree,
    key: &[u8],
) -> TxResult<Option<T>> {
    match tree.get(key)? {
        Some(bytes) => decode(&bytes)
            .map(Some)
            .map_err(ConflictableTransactionError::Abort),
        None => Ok(None),
    }
}

pub(crate) fn tx_put<T: Encode<()>>(tree: &TransactionalTree, key: &[u8], value: &T) -> TxResult<()> {
    let bytes = encode(value).map_err(ConflictableTransactionError::Abort)?;
    tree.insert(key, bytes)?;
    Ok(())
}

pub(crate) fn tx_load_file(files: &TransactionalTree, file_id: u64) -> TxResult<ProcessFile> {
    match tx_get(files, &id_key(file_id))? {
        Some(file) => Ok(file),
        None => abort(ProcessFileError::not_found(format!("process file {file_id}"))),
    }
}

pub(crate) fn tx_put_file(files: &TransactionalTree, file: &ProcessFile) -> TxResult<()> {
    tx_put(files, &id_key(file.id), file)
}

pub(crate) fn tx_insert_signature(
    signatures: &TransactionalTree,
    index: &TransactionalTree,
    signature: &ProcessFileSignature,
) -> TxResult<()> {
    tx_put(signatures, &child_key(signature.file_id, signature.id), signature)?;
    index.insert(&id_key(signature.id)[..], &id_key(signature.file_id)[..])?;
    Ok(())
}

fn scan<T: for<'b> Decode<'b, ()>>(tree: &Tree, prefix: &[u8]) -> Result<Vec<T>> {
    tree.scan_prefix(prefix)
        .map(|item| {
            let (_, value) = item?;
            decode(&value)
        })
        .collect()
}

#[derive(Clone)]
pub struct Store {
    db: Arc<Db>,
    pub(crate) files: Tree,
    pub(crate) details: Tree,
    pub(crate) approvals: Tree,
    pub(crate) signatures: Tree,
    pub(crate) signature_index: Tree,
    pub(crate) seals: Tree,
    pub(crate) file_numbers: Tree,
}

impl Store {
    pub fn open(db: Arc<Db>) -> Result<Self> {
        Ok(Self {
            files: db.open_tree("files")?,
            details: db.open_tree("details")?,
            approvals: db.open_tree("approvals")?,
            signatures: db.open_tree("signatures")?,
            signature_index: db.open_tree("signature_index")?,
            seals: db.open_tree("seals")?,
            file_numbers: db.open_tree("file_numbers")?,
            db,
        })
    }

    /// Monotonic id, never zero.
    pub fn next_id(&self) -> Result<u64> {
        Ok(self.db.generate_id()? + 1)
    }

    pub fn file(&self, id: u64) -> Result<Option<ProcessFile>> {
        self.files
            .get(id_key(id))?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    pub fn require_file(&self, id: u64) -> Result<ProcessFile> {
        self.file(id)?
            .ok_or_else(|| ProcessFileError::not_found(format!("process file {id}")))
    }

    /// All headers in id order.
    pub fn files(&self) -> Result<Vec<ProcessFile>> {
        scan(&self.files, &[])
    }

    pub fn files_for_equipment(&self, equipment_id: u64) -> Result<Vec<ProcessFile>> {
        Ok(self
            .files()?
            .into_iter()
            .filter(|f| f.equipment_id == equipment_id)
            .collect())
    }

    pub fn detail(&self, file_id: u64) -> Result<Option<ProcessFileDetail>> {
        self.details
            .get(id_key(file_id))?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    pub fn approvals(&self, file_id: u64) -> Result<Vec<ProcessFileApproval>> {
        scan(&self.approvals, &id_key(file_id))
    }

    /// Signatures of a file in capture order.
    pub fn signatures(&self, file_id: u64) -> Result<Vec<ProcessFileSignature>> {
        scan(&self.signatures, &id_key(file_id))
    }

    pub fn signature(&self, signature_id: u64) -> Result<Option<ProcessFileSignature>> {
        let Some(file_id) = self.signature_index.get(id_key(signature_id))? else {
            return Ok(None);
        };
        let file_id = u64::from_be_bytes(
            file_id
                .as_ref()
                .try_into()
                .map_err(|_| ProcessFileError::Encoding("corrupt signature index".into()))?,
        );
        self.signatures
            .get(child_key(file_id, signature_id))?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    pub fn seal(&self, file_id: u64) -> Result<Option<ProcessFileSeal>> {
        self.seals
            .get(id_key(file_id))?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    pub fn file_no_taken(&self, file_no: &str) -> Result<bool> {
        Ok(self.file_numbers.contains_key(file_no.as_bytes())?)
    }

    /// Highest generated file number under `prefix`. Manual numbers that
    /// merely share the prefix are ignored unless their suffix is a daily
    /// sequence.
    pub fn last_file_no(&self, prefix: &str) -> Result<Option<String>> {
        let mut best: Option<(u64, String)> = None;
        for item in self.file_numbers.scan_prefix(prefix.as_bytes()) {
            let (key, _) = item?;
            let no = String::from_utf8_lossy(&key).into_owned();
            let Some(seq) = no
                .strip_prefix(prefix)
                .filter(|suffix| utils::is_daily_sequence(suffix))
                .and_then(|suffix| suffix.parse::<u64>().ok())
            else {
                continue;
            };
            if best.as_ref().is_none_or(|(max, _)| seq > *max) {
                best = Some((seq, no));
            }
        }
        Ok(best.map(|(_, no)| no))
    }

    pub fn insert_signature(&self, signature: &ProcessFileSignature) -> Result<()> {
        (&self.signatures, &self.signature_index)
            .transaction(|(signatures, index)| tx_insert_signature(signatures, index, signature))?;
        Ok(())
    }

    /// Read-modify-write of one header inside a transaction, so concurrent
    /// status changes are never overwritten. `apply` may run more than once.
    pub fn update_file<F>(&self, id: u64, apply: F) -> Result<ProcessFile>
    where
        F: Fn(&mut ProcessFile) -> Result<()>,
    {
        let updated = self.files.transaction(|files| -> TxResult<ProcessFile> {
            let mut file = tx_load_file(files, id)?;
            apply(&mut file).map_err(ConflictableTransactionError::Abort)?;
            file.update_time = TimeStamp::new();
            tx_put_file(files, &file)?;
            Ok(file)
        })?;
        Ok(updated)
    }

    pub fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }
}
