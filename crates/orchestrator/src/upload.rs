//! Inline payload resolution.
//!
//! Clients may embed source images directly in the parameters as base64
//! (`image_data`, `mask_data`) instead of referencing a previously
//! uploaded asset. Before compilation the worker pushes those payloads
//! to the engine and rewrites the parameters to carry the
//! engine-assigned filenames.

use base64::Engine as _;
use serde_json::Value;

use prism_core::types::JobId;
use prism_engine::{EngineClient, EngineError};

/// Inline field -> filename field it materializes into.
const INLINE_FIELDS: [(&str, &str, &str); 2] = [
    ("image_data", "image_filename", "input"),
    ("mask_data", "mask_filename", "mask"),
];

/// What went wrong while resolving inline payloads.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    /// The payload is not valid base64; the job can never succeed.
    #[error("Invalid {field} payload: {source}")]
    Decode {
        field: &'static str,
        source: base64::DecodeError,
    },

    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Upload any inline payloads in `params` and substitute the assigned
/// filenames. Returns the names of the uploaded files.
pub async fn resolve_inline_payloads(
    engine: &EngineClient,
    job_id: JobId,
    params: &mut Value,
) -> Result<Vec<String>, UploadError> {
    let mut uploaded = Vec::new();

    for (data_field, name_field, suffix) in INLINE_FIELDS {
        let Some(encoded) = params.get(data_field).and_then(Value::as_str) else {
            continue;
        };
        let bytes = decode_payload(data_field, encoded)?;
        let requested = format!("{job_id}_{suffix}.png");
        let assigned = engine.upload_asset(bytes, &requested).await?;

        if let Some(obj) = params.as_object_mut() {
            obj.remove(data_field);
            obj.insert(name_field.to_string(), Value::String(assigned.clone()));
        }
        uploaded.push(assigned);
    }

    Ok(uploaded)
}

/// Decode a base64 payload, tolerating a `data:image/...;base64,` URL
/// prefix.
fn decode_payload(field: &'static str, encoded: &str) -> Result<Vec<u8>, UploadError> {
    let raw = encoded
        .split_once(";base64,")
        .map(|(_, rest)| rest)
        .unwrap_or(encoded);
    base64::engine::general_purpose::STANDARD
        .decode(raw.trim())
        .map_err(|source| UploadError::Decode { field, source })
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn decodes_bare_base64() {
        assert_eq!(decode_payload("image_data", "aGVsbG8=").unwrap(), b"hello");
    }

    #[test]
    fn decodes_data_urls() {
        let url = "data:image/png;base64,aGVsbG8=";
        assert_eq!(decode_payload("image_data", url).unwrap(), b"hello");
    }

    #[test]
    fn rejects_garbage() {
        assert_matches!(
            decode_payload("mask_data", "!!not base64!!"),
            Err(UploadError::Decode { field: "mask_data", .. })
        );
    }
}
