pub mod jsonl;
pub mod webhook;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

pub use jsonl::JsonlRecordSink;
pub use webhook::WebhookNotifier;

/// How a record came to be captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureKind {
    Deleted,
    ViewOnce,
}

/// Finalized output of one capture event. Produced exactly once per
/// reconciled deletion (or view-once interception), handed to the record
/// sink, never mutated afterward.
#[derive(Debug, Clone, Serialize)]
pub struct CaptureRecord {
    pub id: String,
    pub kind: CaptureKind,
    pub captured_at: DateTime<Utc>,
    pub chat_location: String,
    pub sender_name: String,
    pub sender_address: String,
    pub body: String,
    pub sent_at: Option<DateTime<Utc>>,
    pub media_filename: Option<String>,
}

/// Outbound notification transport. Implementations are best-effort; the
/// engine guards every call and drops failures after logging, so a failing
/// endpoint never blocks reconciliation.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, title: &str, body: &str) -> anyhow::Result<()>;

    async fn send_file(
        &self,
        bytes: &[u8],
        mime_type: &str,
        filename: &str,
        caption: &str,
    ) -> anyhow::Result<()>;
}

/// Durable sink for finalized capture records. Failure is logged only.
#[async_trait]
pub trait RecordSink: Send + Sync {
    async fn persist(&self, record: &CaptureRecord) -> anyhow::Result<()>;
}

/// Notifier for hosts that run with notifications disabled.
pub struct NullNotifier;

#[async_trait]
impl Notifier for NullNotifier {
    async fn notify(&self, _title: &str, _body: &str) -> anyhow::Result<()> {
        Ok(())
    }

    async fn send_file(
        &self,
        _bytes: &[u8],
        _mime_type: &str,
        _filename: &str,
        _caption: &str,
    ) -> anyhow::Result<()> {
        Ok(())
    }
}
