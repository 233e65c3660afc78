//! Small formatting and naming helpers shared across modules.
use crate::error::ValidationError;
use uuid7::uuid7;

/// Prefix of system generated file numbers for a given `yyyyMMdd` date code.
pub fn file_no_prefix(date_code: &str) -> String {
    format!("PF{date_code}")
}

/// Next file number after `last`, which must carry the same prefix.
/// A suffix that is not a number, or is too large to increment, restarts
/// the sequence at 001.
pub fn next_file_no(prefix: &str, last: Option<&str>) -> String {
    let seq = last
        .and_then(|no| no.strip_prefix(prefix))
        .and_then(|suffix| suffix.parse::<u32>().ok())
        .and_then(|seq| seq.checked_add(1))
        .unwrap_or(1);
    format!("{prefix}{seq:03}")
}

/// Whether `suffix` is a generated daily sequence (one to three digits).
pub fn is_daily_sequence(suffix: &str) -> bool {
    (1..=3).contains(&suffix.len()) && suffix.bytes().all(|b| b.is_ascii_digit())
}

/// Stored extension of an uploaded workbook, taken from its original name.
pub fn upload_extension(file_name: &str) -> Result<&'static str, ValidationError> {
    let lower = file_name.trim().to_ascii_lowercase();
    if lower.ends_with(".xlsx") {
        Ok("xlsx")
    } else if lower.ends_with(".xls") {
        Ok("xls")
    } else {
        Err(ValidationError::UnsupportedFileType(file_name.to_string()))
    }
}

/// Trims `value` and rejects blanks, path separators and traversal.
pub fn validate_identifier(
    field: &'static str,
    value: Option<&str>,
    missing: ValidationError,
) -> Result<String, ValidationError> {
    let value = value.map(str::trim).unwrap_or_default();
    if value.is_empty() {
        return Err(missing);
    }
    if value.contains('/') || value.contains('\\') || value.contains("..") {
        return Err(ValidationError::IllegalCharacters {
            field,
            value: value.to_string(),
        });
    }
    Ok(value.to_string())
}

pub fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

pub fn version_text(version: u32) -> String {
    format!("V{version}.0")
}

pub fn format_file_size(size: u64) -> String {
    const KB: f64 = 1024.0;
    let bytes = size as f64;
    if bytes < KB {
        format!("{size} B")
    } else if bytes < KB * KB {
        format!("{:.2} KB", bytes / KB)
    } else {
        format!("{:.2} MB", bytes / (KB * KB))
    }
}

/// Decimal without trailing zeros, empty for `None`.
pub fn format_decimal(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

/// Unique name for a temporary sibling file.
pub fn temp_file_name(target: &str) -> String {
    format!(".{target}.{}.tmp", uuid7())
}
