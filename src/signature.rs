//! Handwritten signature intake: validation, whitespace trimming, storage.
use crate::artifact::Materializer;
use crate::auth::Actor;
use crate::error::{ProcessFileError, Result, ValidationError};
use crate::model::{ProcessFile, ProcessFileSignature};
use crate::seal;
use crate::storage::DocumentStore;
use crate::store::Store;
use crate::types::TimeStamp;
use crate::workflow::{ApprovalLevel, FileStatus, SignatureType};
use chrono::Utc;
use image::{GenericImageView, RgbaImage};
use tracing::{info, warn};

/// Channel value at or above which a pixel counts as paper.
pub const WHITE_THRESHOLD: u8 = 240;
pub const CROP_PADDING: u32 = 5;

/// A raw signature as it arrives from a client.
#[derive(Debug, Clone, Default)]
pub struct SignatureUpload {
    pub image: Vec<u8>,
    pub ip_address: Option<String>,
    pub device_info: Option<String>,
}

impl SignatureUpload {
    pub fn new(image: Vec<u8>) -> Self {
        Self {
            image,
            ..Self::default()
        }
    }

    pub fn set_ip_address(mut self, ip: &str) -> Self {
        self.ip_address = Some(ip.to_string());
        self
    }

    pub fn set_device_info(mut self, device: &str) -> Self {
        self.device_info = Some(device.to_string());
        self
    }
}

/// `(x, y, width, height)` in pixels.
pub type PixelBox = (u32, u32, u32, u32);

fn is_ink(pixel: &image::Rgba<u8>) -> bool {
    let [r, g, b, a] = pixel.0;
    a > 0 && (r < WHITE_THRESHOLD || g < WHITE_THRESHOLD || b < WHITE_THRESHOLD)
}

/// Bounding box of inked pixels grown by [`CROP_PADDING`] and clamped to the
/// image. `None` when nothing but paper was drawn.
pub fn ink_bounds(img: &RgbaImage) -> Option<PixelBox> {
    let mut bounds: Option<(u32, u32, u32, u32)> = None;
    for (x, y, pixel) in img.enumerate_pixels() {
        if !is_ink(pixel) {
            continue;
        }
        bounds = Some(match bounds {
            None => (x, y, x, y),
            Some((x0, y0, x1, y1)) => (x0.min(x), y0.min(y), x1.max(x), y1.max(y)),
        });
    }
    let (x0, y0, x1, y1) = bounds?;
    let left = x0.saturating_sub(CROP_PADDING);
    let top = y0.saturating_sub(CROP_PADDING);
    let right = (x1 + CROP_PADDING).min(img.width() - 1);
    let bottom = (y1 + CROP_PADDING).min(img.height() - 1);
    Some((left, top, right - left + 1, bottom - top + 1))
}

/// Validates and trims a signature, returning it as PNG.
pub fn crop_signature(bytes: &[u8], max_bytes: usize) -> Result<Vec<u8>> {
    if bytes.is_empty() {
        return Err(ValidationError::EmptySignature.into());
    }
    if bytes.len() > max_bytes {
        return Err(ValidationError::SignatureTooLarge {
            size: bytes.len(),
            limit: max_bytes,
        }
        .into());
    }
    let decoded = image::load_from_memory(bytes)
        .map_err(|e| ValidationError::UndecodableSignature(e.to_string()))?;
    if decoded.width() == 0 || decoded.height() == 0 {
        return Err(ValidationError::EmptySignature.into());
    }
    let rgba = decoded.to_rgba8();
    let trimmed = match ink_bounds(&rgba) {
        Some((x, y, w, h)) => rgba.view(x, y, w, h).to_image(),
        None => rgba,
    };
    seal::encode_png(trimmed)
}

/// Storage path of a signature image. The signature id keeps concurrent
/// captures within one millisecond apart.
pub fn signature_path(
    file_id: u64,
    signature_id: u64,
    signature_type: SignatureType,
    at: &TimeStamp<Utc>,
) -> String {
    format!(
        "signatures/{}/SIG_{}_{}_{}_{}.png",
        at.month_partition(),
        file_id,
        signature_type.code(),
        at.milli_code(),
        signature_id
    )
}

/// Role label recorded for whoever signs as `signature_type`.
pub fn signer_role(actor: &Actor, signature_type: SignatureType) -> String {
    let level = match signature_type {
        SignatureType::Submit => None,
        SignatureType::ApproveLevel1 => Some(ApprovalLevel::Review),
        SignatureType::ApproveLevel2 => Some(ApprovalLevel::Approve),
        SignatureType::ApproveLevel3 => Some(ApprovalLevel::Countersign),
    };
    match level.map(ApprovalLevel::required_role) {
        Some(role) if actor.holds(role) => role.legacy_name().to_string(),
        _ => actor.preparer_role(),
    }
}

#[derive(Clone)]
pub struct SignatureCapture {
    store: Store,
    documents: DocumentStore,
    materializer: Materializer,
    max_bytes: usize,
}

impl SignatureCapture {
    pub fn new(
        store: Store,
        documents: DocumentStore,
        materializer: Materializer,
        max_bytes: usize,
    ) -> Self {
        Self {
            store,
            documents,
            materializer,
            max_bytes,
        }
    }

    /// Trims and stores the image and builds the record, without inserting it.
    /// The caller commits the record together with its own writes.
    pub fn prepare(
        &self,
        file: &ProcessFile,
        signature_type: SignatureType,
        upload: &SignatureUpload,
        actor: &Actor,
    ) -> Result<ProcessFileSignature> {
        let png = crop_signature(&upload.image, self.max_bytes)?;
        let id = self.store.next_id()?;
        let now = TimeStamp::new();
        let path = signature_path(file.id, id, signature_type, &now);
        self.documents.write(&path, &png)?;
        Ok(ProcessFileSignature {
            id,
            file_id: file.id,
            file_no: file.file_no.clone(),
            signature_type,
            signer_id: actor.id,
            signer_name: actor.name.clone(),
            signer_role: signer_role(actor, signature_type),
            signature_image_path: path,
            signature_time: now,
            ip_address: upload.ip_address.clone(),
            device_info: upload.device_info.clone(),
        })
    }

    /// Records a standalone signature and tries to show it on the artifact
    /// right away. Overlay trouble is logged, the next download retries.
    pub fn capture(
        &self,
        file_id: u64,
        signature_type: SignatureType,
        upload: &SignatureUpload,
        actor: &Actor,
    ) -> Result<u64> {
        let file = self.store.require_file(file_id)?;
        if file.status == FileStatus::Invalidated {
            return Err(ProcessFileError::invalid_transition(format!(
                "{} is invalidated and cannot be signed",
                file.file_no
            )));
        }
        let signature = self.prepare(&file, signature_type, upload, actor)?;
        if let Err(err) = self.store.insert_signature(&signature) {
            self.documents.discard(&signature.signature_image_path);
            return Err(err);
        }
        info!(
            file_id,
            signature_id = signature.id,
            signature_type = signature_type.code(),
            "signature captured"
        );
        self.refresh_overlay(file_id);
        Ok(signature.id)
    }

    pub(crate) fn refresh_overlay(&self, file_id: u64) {
        if let Err(err) = self.materializer.ensure_overlaid(file_id) {
            warn!(file_id, error = %err, "overlay refresh failed, retrying on next download");
        }
    }
}
