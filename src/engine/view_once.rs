use super::CaptureEngine;
use crate::events::IncomingMessage;
use crate::media::files;
use crate::sink::{CaptureKind, CaptureRecord};
use chrono::DateTime;
use uuid::Uuid;

impl CaptureEngine {
    /// Capture view-once media at receipt time. The message itself is not
    /// deleted, so only the media slot is consumed; a transcript slot keeps
    /// its own expiry and times out normally.
    pub(super) async fn capture_view_once(&self, msg: &IncomingMessage) {
        let Some(descriptor) = self.artifacts.take_media(&msg.id) else {
            tracing::debug!(id = %msg.id, "view-once message had no tracked media");
            return;
        };

        let saved = match files::copy_into(
            &descriptor.path,
            &self.storage.saved_dir,
            &descriptor.filename,
        )
        .await
        {
            Ok(Some(path)) => path,
            Ok(None) => {
                tracing::debug!(id = %msg.id, "view-once media already reaped");
                return;
            }
            Err(error) => {
                tracing::warn!(id = %msg.id, %error, "failed to save view-once media");
                return;
            }
        };
        // The temp copy is untracked from here on; drop it.
        files::remove_quietly(&descriptor.path).await;

        let now = self.clock.now();
        let notice = format!(
            "View-once media from {} ({}) in {} saved as {}",
            msg.sender_name, msg.sender_address, msg.chat_location, descriptor.filename
        );
        self.notify_best_effort("View-once media captured", &notice)
            .await;

        let record = CaptureRecord {
            id: Uuid::new_v4().to_string(),
            kind: CaptureKind::ViewOnce,
            captured_at: now,
            chat_location: msg.chat_location.clone(),
            sender_name: msg.sender_name.clone(),
            sender_address: msg.sender_address.clone(),
            body: msg.body.clone(),
            sent_at: DateTime::from_timestamp(msg.timestamp, 0),
            media_filename: Some(descriptor.filename.clone()),
        };
        self.persist_best_effort(&record).await;

        tracing::info!(id = %msg.id, saved = %saved.display(), "view-once capture complete");
    }
}
