use crate::artifact_store::{ArtifactStore, RenderedArtifact, StoredArtifact};
use crate::error::IngestError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::instrument;

/// A client payload wrapped with the server-assigned id and capture time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionLogEntry {
    /// Artifact id, also the file stem
    pub id: u64,
    /// Server clock at capture, millisecond ISO-8601
    #[serde(with = "iso_millis")]
    pub timestamp: DateTime<Utc>,
    /// Caller payload, stored verbatim
    pub body: serde_json::Value,
}

/// Millisecond ISO-8601 timestamps (`2024-01-15T10:30:45.123Z`)
mod iso_millis {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(timestamp: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&timestamp.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&s)
            .map(|t| t.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}

/// Writes one pretty-printed JSON file per detection log entry
pub struct DetectionLogWriter {
    store: Arc<ArtifactStore>,
}

impl DetectionLogWriter {
    /// Create a writer over the (already provisioned) log directory
    pub fn new(logs_dir: impl Into<PathBuf>) -> Self {
        Self {
            store: Arc::new(ArtifactStore::new(logs_dir)),
        }
    }

    /// Directory entries are written into
    pub fn dir(&self) -> &Path {
        self.store.dir()
    }

    /// Wrap `body` into an entry and persist it as `<id>.json`
    #[instrument(skip(self, body))]
    pub async fn write(&self, body: serde_json::Value) -> Result<StoredArtifact, IngestError> {
        let store = self.store.clone();

        tokio::task::spawn_blocking(move || write_entry(&store, Utc::now(), body))
            .await
            .map_err(|e| IngestError::Internal(format!("log writer task failed: {e}")))?
    }
}

fn write_entry(
    store: &ArtifactStore,
    now: DateTime<Utc>,
    body: serde_json::Value,
) -> Result<StoredArtifact, IngestError> {
    let mut entry = DetectionLogEntry {
        id: 0,
        timestamp: now,
        body,
    };

    store.write_new(now, |id| {
        entry.id = id;
        let contents = serde_json::to_vec_pretty(&entry).map_err(IngestError::Serialization)?;
        Ok(RenderedArtifact::new(format!("{id}.json"), contents))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn read_entry(path: &Path) -> DetectionLogEntry {
        serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap()
    }

    #[test]
    fn test_timestamp_serializes_with_millisecond_precision() {
        let entry = DetectionLogEntry {
            id: 1705314645123,
            timestamp: DateTime::parse_from_rfc3339("2024-01-15T10:30:45.123456Z")
                .unwrap()
                .with_timezone(&Utc),
            body: json!({}),
        };

        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value["timestamp"], "2024-01-15T10:30:45.123Z");
        assert_eq!(value["id"], 1705314645123u64);
    }

    #[tokio::test]
    async fn test_write_wraps_body_with_id_and_timestamp() {
        let dir = TempDir::new().unwrap();
        let writer = DetectionLogWriter::new(dir.path());
        let body = json!({"detections": [{"label": "helmet", "confidence": 0.5}]});

        let before = Utc::now().timestamp_millis() as u64;
        let stored = writer.write(body.clone()).await.unwrap();

        assert_eq!(stored.file_name, format!("{}.json", stored.id));
        assert!(stored.id >= before);

        let entry = read_entry(&stored.path);
        assert_eq!(entry.id, stored.id);
        assert_eq!(entry.body, body);
    }

    #[tokio::test]
    async fn test_write_is_pretty_printed() {
        let dir = TempDir::new().unwrap();
        let writer = DetectionLogWriter::new(dir.path());

        let stored = writer.write(json!({"a": 1})).await.unwrap();
        let text = std::fs::read_to_string(&stored.path).unwrap();

        assert!(text.starts_with("{\n  \"id\": "));
        assert!(text.contains("\n  \"body\": {\n    \"a\": 1\n  }"));
    }

    #[tokio::test]
    async fn test_sequential_writes_get_increasing_names() {
        let dir = TempDir::new().unwrap();
        let writer = DetectionLogWriter::new(dir.path());

        let first = writer.write(json!({"n": 1})).await.unwrap();
        let second = writer.write(json!({"n": 2})).await.unwrap();

        assert!(second.id > first.id);
        assert_ne!(first.path, second.path);
        assert_eq!(read_entry(&first.path).body, json!({"n": 1}));
        assert_eq!(read_entry(&second.path).body, json!({"n": 2}));
    }

    #[tokio::test]
    async fn test_write_fails_without_directory() {
        let dir = TempDir::new().unwrap();
        let writer = DetectionLogWriter::new(dir.path().join("missing"));

        let err = writer.write(json!({})).await.unwrap_err();
        assert!(matches!(err, IngestError::Io(_)));
    }
}
