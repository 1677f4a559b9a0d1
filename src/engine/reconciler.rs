use super::CaptureEngine;
use crate::events::RevokeEvent;
use crate::sink::{CaptureKind, CaptureRecord};
use anyhow::Result;
use chrono::{DateTime, Utc};
use uuid::Uuid;

const UNKNOWN: &str = "Unknown";
const UNKNOWN_CHAT: &str = "Unknown Chat";

impl CaptureEngine {
    /// Handle a "deleted for everyone" event: gate out replays and
    /// duplicates, then reconcile the best-known message content from the
    /// before-view and the cache, promote tracked artifacts, notify, and
    /// persist a finalized record.
    ///
    /// This path never propagates a failure; when reconciliation itself
    /// breaks, a fallback notification is sent instead.
    pub async fn handle_revoke(&self, event: RevokeEvent) {
        let id = event.target_id().to_string();

        if self.suppressor.is_within_grace_period() {
            tracing::debug!(%id, "dropping revoke replayed during startup grace");
            return;
        }
        if !self.guard.should_process(&id) {
            tracing::debug!(%id, "dropping duplicate revoke delivery");
            return;
        }

        if let Err(error) = self.reconcile(&id, &event).await {
            tracing::warn!(%id, %error, "reconciliation failed, sending fallback notification");
            self.notify_best_effort(
                "Message deleted",
                "A message was deleted, but its details could not be recovered.",
            )
            .await;
        }
    }

    async fn reconcile(&self, id: &str, event: &RevokeEvent) -> Result<()> {
        let deleted_at = self.clock.now();
        let cached = self.messages.get(id);
        let before = event.before.as_ref();

        // Ranked merge, field by field: the live before-view wins, the
        // cached snapshot fills the gaps, anything left is Unknown.
        let chat_location = event
            .after
            .chat_location
            .clone()
            .or_else(|| cached.as_ref().map(|s| s.chat_location.clone()))
            .unwrap_or_else(|| UNKNOWN_CHAT.to_string());
        let sender_name = resolve(
            before.and_then(|b| b.sender_name.clone()),
            cached.as_ref().map(|s| s.sender_name.clone()),
        );
        let sender_address = resolve(
            before.and_then(|b| b.sender_address.clone()),
            cached.as_ref().map(|s| s.sender_address.clone()),
        );
        let body = resolve(
            before.and_then(|b| b.body.clone()),
            cached.as_ref().map(|s| s.body.clone()),
        );
        let sent_at = before
            .and_then(|b| b.timestamp)
            .and_then(|t| DateTime::from_timestamp(t, 0))
            .or_else(|| cached.as_ref().map(|s| s.sent_at));

        let promoted = self.artifacts.promote(id, &self.storage.saved_dir).await;
        let media_filename = promoted.media.as_ref().map(|m| m.filename.clone());

        let notice = deletion_notice(
            &sender_name,
            &sender_address,
            &chat_location,
            sent_at,
            deleted_at,
            &body,
            media_filename.as_deref(),
        );
        self.notify_best_effort("Message deleted", &notice).await;

        if let Some(media) = &promoted.media {
            match tokio::fs::read(&media.path).await {
                Ok(bytes) => {
                    let mime_type = media
                        .mime_type
                        .as_deref()
                        .unwrap_or("application/octet-stream");
                    let caption = format!("Deleted media from {sender_name}");
                    self.send_file_best_effort(&bytes, mime_type, &media.filename, &caption)
                        .await;
                }
                Err(error) => {
                    tracing::warn!(%id, %error, "failed to read promoted media for delivery");
                }
            }
        }

        let record = CaptureRecord {
            id: Uuid::new_v4().to_string(),
            kind: CaptureKind::Deleted,
            captured_at: deleted_at,
            chat_location,
            sender_name,
            sender_address,
            body,
            sent_at,
            media_filename,
        };
        self.persist_best_effort(&record).await;

        self.messages.remove(id);
        tracing::info!(
            id,
            media = record.media_filename.is_some(),
            "deleted message captured"
        );
        Ok(())
    }
}

fn resolve(live: Option<String>, cached: Option<String>) -> String {
    live.or(cached).unwrap_or_else(|| UNKNOWN.to_string())
}

fn deletion_notice(
    sender_name: &str,
    sender_address: &str,
    chat_location: &str,
    sent_at: Option<DateTime<Utc>>,
    deleted_at: DateTime<Utc>,
    body: &str,
    media_filename: Option<&str>,
) -> String {
    let sent = sent_at.map_or_else(
        || UNKNOWN.to_string(),
        |at| at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    );
    let mut notice = format!(
        "Sender: {sender_name} ({sender_address})\n\
         Chat: {chat_location}\n\
         Sent: {sent}\n\
         Deleted: {}\n\n{body}",
        deleted_at.format("%Y-%m-%d %H:%M:%S UTC"),
    );
    if let Some(filename) = media_filename {
        notice.push_str(&format!("\n\nMedia saved as {filename}"));
    }
    notice
}
