use crate::error::PipelineError;
use percent_encoding::percent_decode_str;
use serde::Deserialize;
use std::fmt;
use tracing::{debug, warn};

/// Bucket notification in the S3 event format.
///
/// Fields are optional so a malformed notification is reported as
/// [`PipelineError::InvalidEvent`] instead of a generic decode failure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BucketEvent {
    #[serde(rename = "Records", default)]
    pub records: Vec<EventRecord>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventRecord {
    #[serde(rename = "eventName", default)]
    pub event_name: Option<String>,
    #[serde(default)]
    pub s3: Option<S3Entity>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct S3Entity {
    #[serde(default)]
    pub bucket: Option<BucketEntity>,
    #[serde(default)]
    pub object: Option<ObjectEntity>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BucketEntity {
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ObjectEntity {
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
}

/// The stored object that triggered an invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceReference {
    pub bucket: String,
    pub key: String,
}

impl SourceReference {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    /// Decode a raw notification payload and extract its first record
    pub fn from_payload(payload: &[u8]) -> Result<Self, PipelineError> {
        let event: BucketEvent = serde_json::from_slice(payload)
            .map_err(|e| PipelineError::InvalidEvent(format!("payload is not an S3 event: {}", e)))?;

        Self::from_event(&event)
    }

    /// Extract the bucket and URL-decoded key of the first record
    pub fn from_event(event: &BucketEvent) -> Result<Self, PipelineError> {
        let record = event
            .records
            .first()
            .ok_or_else(|| PipelineError::InvalidEvent("event has no records".to_string()))?;

        if event.records.len() > 1 {
            warn!(
                records = event.records.len(),
                "Event carries multiple records, only the first is processed"
            );
        }

        let s3 = record
            .s3
            .as_ref()
            .ok_or_else(|| PipelineError::InvalidEvent("record has no s3 entity".to_string()))?;

        let bucket = s3
            .bucket
            .as_ref()
            .and_then(|b| b.name.as_deref())
            .filter(|name| !name.is_empty())
            .ok_or_else(|| PipelineError::InvalidEvent("record has no bucket name".to_string()))?;

        let raw_key = s3
            .object
            .as_ref()
            .and_then(|o| o.key.as_deref())
            .filter(|key| !key.is_empty())
            .ok_or_else(|| PipelineError::InvalidEvent("record has no object key".to_string()))?;

        debug!(
            event_name = record.event_name.as_deref().unwrap_or("unknown"),
            size_bytes = s3.object.as_ref().and_then(|o| o.size),
            "Decoded bucket notification"
        );

        Ok(Self::new(bucket, decode_key(raw_key)?))
    }

    /// File name of the key without its final extension
    pub fn stem(&self) -> &str {
        key_stem(&self.key)
    }
}

impl fmt::Display for SourceReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.bucket, self.key)
    }
}

/// Decode a form-encoded object key: `+` is a space, then percent escapes.
fn decode_key(raw: &str) -> Result<String, PipelineError> {
    let spaced = raw.replace('+', " ");
    percent_decode_str(&spaced)
        .decode_utf8()
        .map(|key| key.into_owned())
        .map_err(|e| PipelineError::InvalidEvent(format!("object key is not valid UTF-8: {}", e)))
}

/// Final path segment of `key`
pub fn file_name(key: &str) -> &str {
    key.rsplit('/').next().unwrap_or(key)
}

/// Final path segment of `key` with its last extension removed.
///
/// A leading dot does not start an extension, so `.env` is its own stem.
pub fn key_stem(key: &str) -> &str {
    let name = file_name(key);
    match name.rfind('.') {
        Some(idx) if idx > 0 => &name[..idx],
        _ => name,
    }
}

/// Lower-cased final extension of `key`, if any
pub fn key_extension(key: &str) -> Option<String> {
    let name = file_name(key);
    match name.rfind('.') {
        Some(idx) if idx > 0 && idx + 1 < name.len() => Some(name[idx + 1..].to_ascii_lowercase()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event_json(bucket: &str, key: &str) -> String {
        format!(
            r#"{{
                "Records": [{{
                    "eventVersion": "2.1",
                    "eventSource": "aws:s3",
                    "eventName": "ObjectCreated:Put",
                    "s3": {{
                        "bucket": {{ "name": "{}", "arn": "arn:aws:s3:::uploads" }},
                        "object": {{ "key": "{}", "size": 1024 }}
                    }}
                }}]
            }}"#,
            bucket, key
        )
    }

    #[test]
    fn test_extracts_bucket_and_decoded_key() {
        let payload = event_json("uploads", "incoming/Q1+sales%20%282024%29.csv");
        let source = SourceReference::from_payload(payload.as_bytes()).unwrap();

        assert_eq!(source.bucket, "uploads");
        assert_eq!(source.key, "incoming/Q1 sales (2024).csv");
        assert_eq!(source.stem(), "Q1 sales (2024)");
    }

    #[test]
    fn test_missing_key_is_invalid_event() {
        let payload = r#"{"Records":[{"s3":{"bucket":{"name":"uploads"},"object":{}}}]}"#;

        match SourceReference::from_payload(payload.as_bytes()) {
            Err(PipelineError::InvalidEvent(message)) => assert!(message.contains("object key")),
            other => panic!("Expected InvalidEvent, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_records_and_garbage_are_invalid_events() {
        assert!(matches!(
            SourceReference::from_payload(br#"{"Records":[]}"#),
            Err(PipelineError::InvalidEvent(_))
        ));
        assert!(matches!(
            SourceReference::from_payload(b"not json"),
            Err(PipelineError::InvalidEvent(_))
        ));
        assert!(matches!(
            SourceReference::from_payload(br#"{"Records":[{"s3":{"bucket":{"name":""},"object":{"key":"a.csv"}}}]}"#),
            Err(PipelineError::InvalidEvent(_))
        ));
    }

    #[test]
    fn test_invalid_utf8_escape_is_invalid_event() {
        let payload = event_json("uploads", "bad%FF.csv");
        assert!(matches!(
            SourceReference::from_payload(payload.as_bytes()),
            Err(PipelineError::InvalidEvent(_))
        ));
    }

    #[test]
    fn test_key_stem() {
        assert_eq!(key_stem("in/2024/sales.v2.csv"), "sales.v2");
        assert_eq!(key_stem("report.xlsx"), "report");
        assert_eq!(key_stem("dir/no_extension"), "no_extension");
        assert_eq!(key_stem(".env"), ".env");
    }

    #[test]
    fn test_key_extension() {
        assert_eq!(key_extension("in/data.CSV").as_deref(), Some("csv"));
        assert_eq!(key_extension("bundle.tar.zip").as_deref(), Some("zip"));
        assert_eq!(key_extension("README"), None);
        assert_eq!(key_extension("trailing."), None);
        assert_eq!(key_extension(".hidden"), None);
    }
}
