use super::{CaptureRecord, RecordSink};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;

/// Record sink that appends one JSON object per line to a flat file.
pub struct JsonlRecordSink {
    path: PathBuf,
    write_lock: tokio::sync::Mutex<()>,
}

impl JsonlRecordSink {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            write_lock: tokio::sync::Mutex::new(()),
        }
    }
}

#[async_trait]
impl RecordSink for JsonlRecordSink {
    async fn persist(&self, record: &CaptureRecord) -> Result<()> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .with_context(|| format!("failed to open {}", self.path.display()))?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::JsonlRecordSink;
    use crate::sink::{CaptureKind, CaptureRecord, RecordSink};
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    fn record(id: &str) -> CaptureRecord {
        CaptureRecord {
            id: id.to_string(),
            kind: CaptureKind::Deleted,
            captured_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
            chat_location: "Engineering".into(),
            sender_name: "Ada".into(),
            sender_address: "+15550001111".into(),
            body: "hello".into(),
            sent_at: None,
            media_filename: None,
        }
    }

    #[tokio::test]
    async fn persist_appends_one_parseable_line_per_record() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("records.jsonl");
        let sink = JsonlRecordSink::new(path.clone());

        sink.persist(&record("r1")).await.unwrap();
        sink.persist(&record("r2")).await.unwrap();

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        for (line, id) in lines.iter().zip(["r1", "r2"]) {
            let parsed: serde_json::Value = serde_json::from_str(line).unwrap();
            assert_eq!(parsed["id"], id);
            assert_eq!(parsed["kind"], "deleted");
        }
    }
}
