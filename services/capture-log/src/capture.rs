use crate::artifact_store::{ArtifactStore, RenderedArtifact, StoredArtifact};
use crate::data_url::ImageDataUrl;
use crate::error::IngestError;
use chrono::Utc;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Request field carrying the data URL
pub const IMAGE_FIELD: &str = "imageBase64";

/// Route prefix captures are served under
pub const CAPTURES_ROUTE: &str = "/captures";

/// A decoded capture ready to be written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureFile {
    /// Raw image bytes
    pub bytes: Vec<u8>,
    /// Extension taken from the MIME subtype
    pub extension: String,
}

impl CaptureFile {
    /// Validate an upload body and decode its data URL.
    ///
    /// Checks run in order: the field must be present and truthy
    /// (`missing imageBase64`), then a string matching the image data URL
    /// shape (`invalid data url`).
    pub fn from_upload(body: &Value) -> Result<Self, IngestError> {
        let field = body.get(IMAGE_FIELD).unwrap_or(&Value::Null);

        let data_url = match field {
            Value::Null | Value::Bool(false) => return Err(IngestError::MissingImage),
            Value::String(s) if s.is_empty() => return Err(IngestError::MissingImage),
            Value::Number(n) if n.as_f64() == Some(0.0) => return Err(IngestError::MissingImage),
            Value::String(s) => ImageDataUrl::parse(s)?,
            _ => return Err(IngestError::InvalidDataUrl),
        };

        Ok(Self {
            bytes: data_url.decode()?,
            extension: data_url.extension().to_string(),
        })
    }

    /// `capture_<id>.<ext>`
    pub fn file_name(&self, id: u64) -> String {
        format!("capture_{}.{}", id, self.extension)
    }
}

/// Retrieval path for a written capture
pub fn capture_route(file_name: &str) -> String {
    format!("{}/{}", CAPTURES_ROUTE, file_name)
}

/// Writes decoded captures into the captures directory
pub struct CaptureWriter {
    store: Arc<ArtifactStore>,
}

impl CaptureWriter {
    /// Create a writer over the (already provisioned) captures directory
    pub fn new(captures_dir: impl Into<PathBuf>) -> Self {
        Self {
            store: Arc::new(ArtifactStore::new(captures_dir)),
        }
    }

    pub fn dir(&self) -> &Path {
        self.store.dir()
    }

    /// Persist `capture` as `capture_<id>.<ext>`
    #[instrument(skip(self, capture), fields(extension = %capture.extension, size_bytes = capture.bytes.len()))]
    pub async fn write(&self, capture: CaptureFile) -> Result<StoredArtifact, IngestError> {
        let store = self.store.clone();

        tokio::task::spawn_blocking(move || {
            debug!("Writing capture");
            store.write_new(Utc::now(), |id| {
                Ok(RenderedArtifact::new(
                    capture.file_name(id),
                    capture.bytes.as_slice(),
                ))
            })
        })
        .await
        .map_err(|e| IngestError::Internal(format!("capture writer task failed: {e}")))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde_json::json;
    use tempfile::TempDir;

    const PNG_HEADER: &[u8] = &[0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];

    fn upload_body(bytes: &[u8], mime: &str) -> Value {
        json!({ "imageBase64": format!("data:{};base64,{}", mime, STANDARD.encode(bytes)) })
    }

    #[test]
    fn test_from_upload_decodes_png() {
        let capture = CaptureFile::from_upload(&upload_body(PNG_HEADER, "image/png")).unwrap();
        assert_eq!(capture.bytes, PNG_HEADER);
        assert_eq!(capture.extension, "png");
    }

    #[test]
    fn test_from_upload_missing_field() {
        for body in [
            json!({}),
            json!({ "imageBase64": null }),
            json!({ "imageBase64": "" }),
            json!({ "imageBase64": false }),
            json!({ "imageBase64": 0 }),
            json!([]),
            json!(null),
        ] {
            assert!(
                matches!(CaptureFile::from_upload(&body), Err(IngestError::MissingImage)),
                "expected missing for {body}"
            );
        }
    }

    #[test]
    fn test_from_upload_invalid_data_url() {
        for body in [
            json!({ "imageBase64": "not-a-data-url" }),
            json!({ "imageBase64": "data:application/pdf;base64,JVBERi0=" }),
            json!({ "imageBase64": 42 }),
            json!({ "imageBase64": { "nested": true } }),
        ] {
            assert!(
                matches!(CaptureFile::from_upload(&body), Err(IngestError::InvalidDataUrl)),
                "expected invalid for {body}"
            );
        }
    }

    #[test]
    fn test_file_name_and_route() {
        let capture = CaptureFile {
            bytes: vec![],
            extension: "jpeg".to_string(),
        };
        let name = capture.file_name(1705314645123);
        assert_eq!(name, "capture_1705314645123.jpeg");
        assert_eq!(capture_route(&name), "/captures/capture_1705314645123.jpeg");
    }

    #[tokio::test]
    async fn test_write_persists_decoded_bytes() {
        let dir = TempDir::new().unwrap();
        let writer = CaptureWriter::new(dir.path());
        let capture = CaptureFile::from_upload(&upload_body(PNG_HEADER, "image/png")).unwrap();

        let stored = writer.write(capture).await.unwrap();

        assert!(stored.file_name.starts_with("capture_"));
        assert!(stored.file_name.ends_with(".png"));
        assert_eq!(stored.size_bytes, PNG_HEADER.len());
        assert_eq!(std::fs::read(&stored.path).unwrap(), PNG_HEADER);
    }

    #[tokio::test]
    async fn test_rapid_writes_do_not_overwrite() {
        let dir = TempDir::new().unwrap();
        let writer = CaptureWriter::new(dir.path());

        let mut names = Vec::new();
        for i in 0u8..5 {
            let capture = CaptureFile {
                bytes: vec![i; 4],
                extension: "webp".to_string(),
            };
            names.push(writer.write(capture).await.unwrap().file_name);
        }

        names.sort();
        names.dedup();
        assert_eq!(names.len(), 5);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 5);
    }
}
