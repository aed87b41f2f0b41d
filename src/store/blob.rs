use crate::error::{IngestError, Result};
use crate::types::BlobId;

/// BLAKE3 content address of a payload.
#[must_use]
pub fn content_id(payload: &[u8]) -> BlobId {
    BlobId(blake3::hash(payload).to_hex().to_string())
}

/// Bucket names become directory names in the file store.
pub fn validate_bucket(bucket: &str) -> Result<()> {
    let ok = !bucket.is_empty()
        && bucket
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if ok {
        Ok(())
    } else {
        Err(IngestError::invalid_document(format!(
            "blob bucket '{bucket}' must be a plain identifier"
        )))
    }
}

pub(crate) fn validate_blob_id(id: &BlobId) -> Result<()> {
    if id.0.len() == 64 && id.0.chars().all(|c| c.is_ascii_hexdigit()) {
        Ok(())
    } else {
        Err(IngestError::invalid_document(format!(
            "blob id '{id}' is not a content address"
        )))
    }
}
