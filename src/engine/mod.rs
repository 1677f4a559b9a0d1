mod gates;
mod reconciler;
mod view_once;

use crate::cache::{ArtifactDescriptor, ArtifactTracker, MessageCache, MessageSnapshot};
use crate::clock::SharedClock;
use crate::config::{Config, ResolvedStorage};
use crate::error::StorageError;
use crate::events::{IncomingMessage, MediaAttachment};
use crate::media::{self, files};
use crate::sink::{CaptureRecord, Notifier, RecordSink};
use anyhow::{Context, Result};
use chrono::DateTime;
use gates::{RevokeGuard, StartupSuppressor};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;

/// The ephemeral retention and deletion-capture engine.
///
/// Owns the bounded message cache, the artifact tracker and the revoke
/// gates; consumes protocol events and drives notifications and record
/// persistence through the injected sinks. All state is per-instance, so
/// engines built side by side (as tests do) share nothing.
pub struct CaptureEngine {
    messages: MessageCache,
    artifacts: ArtifactTracker,
    guard: RevokeGuard,
    suppressor: StartupSuppressor,
    clock: SharedClock,
    notifier: Arc<dyn Notifier>,
    sink: Arc<dyn RecordSink>,
    storage: ResolvedStorage,
    sweep_interval: Duration,
    reaper: Mutex<Option<JoinHandle<()>>>,
}

impl CaptureEngine {
    /// Build an engine, bootstrapping the temp and saved directories.
    pub fn new(
        config: &Config,
        clock: SharedClock,
        notifier: Arc<dyn Notifier>,
        sink: Arc<dyn RecordSink>,
    ) -> crate::error::Result<Self> {
        let storage = config.storage.resolve()?;
        for dir in [&storage.temp_dir, &storage.saved_dir] {
            std::fs::create_dir_all(dir).map_err(|source| StorageError::CreateDir {
                path: dir.display().to_string(),
                source,
            })?;
        }

        let retention = config.retention.window();
        Ok(Self {
            messages: MessageCache::new(
                config.retention.message_capacity,
                retention,
                clock.clone(),
            ),
            artifacts: ArtifactTracker::new(retention, clock.clone()),
            guard: RevokeGuard::new(config.retention.dedup_ttl(), clock.clone()),
            suppressor: StartupSuppressor::new(config.retention.grace_period(), clock.clone()),
            sweep_interval: config.retention.sweep_interval(),
            clock,
            notifier,
            sink,
            storage,
            reaper: Mutex::new(None),
        })
    }

    /// Ingest one message from the live stream: snapshot it, render its
    /// transcript into temp storage, download any media into temp storage,
    /// and intercept view-once media immediately.
    pub async fn handle_incoming_message(&self, msg: IncomingMessage) {
        let now = self.clock.now();
        let snapshot = MessageSnapshot {
            id: msg.id.clone(),
            sender_name: msg.sender_name.clone(),
            sender_address: msg.sender_address.clone(),
            chat_location: msg.chat_location.clone(),
            body: msg.body.clone(),
            sent_at: DateTime::from_timestamp(msg.timestamp, 0).unwrap_or(now),
            cached_at: now,
        };
        self.messages.put(snapshot.clone());

        if let Err(error) = self.write_transcript(&snapshot).await {
            tracing::warn!(id = %msg.id, %error, "failed to write transcript artifact");
        }

        if let Some(attachment) = &msg.media
            && let Err(error) = self.download_media(&msg.id, attachment).await
        {
            tracing::warn!(id = %msg.id, %error, "failed to capture media artifact");
        }

        if msg.view_once && msg.media.is_some() {
            self.capture_view_once(&msg).await;
        }
    }

    /// Record connection readiness; revokes arriving inside the grace
    /// window from now are treated as session-resume replays.
    pub fn mark_ready(&self) {
        self.suppressor.mark_ready();
        tracing::info!("connection ready; startup grace window started");
    }

    /// Start the background reaper that drops expired cache entries and
    /// deletes expired temp artifacts. Idempotent.
    pub fn spawn_reaper(&self) {
        let mut reaper = self.reaper.lock().unwrap_or_else(PoisonError::into_inner);
        if reaper.is_some() {
            return;
        }

        let messages = self.messages.clone();
        let artifacts = self.artifacts.clone();
        let interval = self.sweep_interval;
        *reaper = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let reaped_messages = messages.sweep();
                let reaped_artifacts = artifacts.sweep().await;
                if reaped_messages + reaped_artifacts > 0 {
                    tracing::debug!(reaped_messages, reaped_artifacts, "reaper pass complete");
                }
            }
        }));
    }

    /// One reap pass over both caches. The reaper task runs this on an
    /// interval; hosts and tests can call it directly.
    pub async fn sweep_expired(&self) -> (usize, usize) {
        let messages = self.messages.sweep();
        let artifacts = self.artifacts.sweep().await;
        (messages, artifacts)
    }

    /// Stop the reaper so no callbacks are left dangling at process exit.
    pub fn shutdown(&self) {
        let handle = self
            .reaper
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            handle.abort();
        }
        tracing::info!("capture engine shut down");
    }

    async fn write_transcript(&self, snapshot: &MessageSnapshot) -> Result<()> {
        let filename = media::artifact_filename(snapshot.cached_at, &snapshot.id, "txt");
        let path = self.storage.temp_dir.join(&filename);
        tokio::fs::write(&path, render_transcript(snapshot))
            .await
            .with_context(|| format!("failed to write {}", path.display()))?;
        self.artifacts.attach_transcript(
            &snapshot.id,
            ArtifactDescriptor {
                path,
                filename,
                mime_type: None,
            },
        );
        Ok(())
    }

    async fn download_media(&self, id: &str, attachment: &MediaAttachment) -> Result<()> {
        let bytes = files::load_media_bytes(&attachment.data).await?;
        let mime_type = attachment
            .mime_type
            .clone()
            .unwrap_or_else(|| media::detect_mime(&bytes));
        let extension = media::extension_for_mime(&mime_type);
        let filename = media::artifact_filename(self.clock.now(), id, &extension);
        let path = self.storage.temp_dir.join(&filename);
        tokio::fs::write(&path, &bytes)
            .await
            .with_context(|| format!("failed to write {}", path.display()))?;
        self.artifacts.attach_media(
            id,
            ArtifactDescriptor {
                path,
                filename,
                mime_type: Some(mime_type),
            },
        );
        tracing::debug!(id, "media artifact captured");
        Ok(())
    }

    pub(crate) async fn notify_best_effort(&self, title: &str, body: &str) {
        if let Err(error) = self.notifier.notify(title, body).await {
            tracing::warn!(%error, "notification delivery failed");
        }
    }

    pub(crate) async fn send_file_best_effort(
        &self,
        bytes: &[u8],
        mime_type: &str,
        filename: &str,
        caption: &str,
    ) {
        if let Err(error) = self
            .notifier
            .send_file(bytes, mime_type, filename, caption)
            .await
        {
            tracing::warn!(%error, filename, "file delivery failed");
        }
    }

    pub(crate) async fn persist_best_effort(&self, record: &CaptureRecord) {
        if let Err(error) = self.sink.persist(record).await {
            tracing::warn!(%error, record_id = %record.id, "record persistence failed");
        }
    }
}

fn render_transcript(snapshot: &MessageSnapshot) -> String {
    format!(
        "[{}] {} ({}) in {}\n{}\n",
        snapshot.sent_at.format("%Y-%m-%d %H:%M:%S UTC"),
        snapshot.sender_name,
        snapshot.sender_address,
        snapshot.chat_location,
        snapshot.body
    )
}

#[cfg(test)]
mod tests {
    use super::render_transcript;
    use crate::cache::MessageSnapshot;
    use chrono::{TimeZone, Utc};

    #[test]
    fn transcript_includes_header_and_body() {
        let snapshot = MessageSnapshot {
            id: "m1".into(),
            sender_name: "Ada".into(),
            sender_address: "+15550001111".into(),
            chat_location: "Engineering".into(),
            body: "hello".into(),
            sent_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
            cached_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 5).unwrap(),
        };

        let rendered = render_transcript(&snapshot);
        assert!(rendered.starts_with("[2024-05-01 12:00:00 UTC] Ada (+15550001111) in Engineering"));
        assert!(rendered.ends_with("hello\n"));
    }
}
