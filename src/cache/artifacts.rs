use crate::clock::SharedClock;
use crate::media::files;
use chrono::{DateTime, TimeDelta, Utc};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// A pending on-disk artifact awaiting promotion or reaping.
#[derive(Debug, Clone)]
pub struct ArtifactDescriptor {
    /// Absolute path. Points into the temp directory while pending; promotion
    /// rewrites it to the saved location.
    pub path: PathBuf,
    pub filename: String,
    /// Set for media artifacts, absent for transcripts.
    pub mime_type: Option<String>,
}

struct Slot {
    descriptor: ArtifactDescriptor,
    expires_at: DateTime<Utc>,
}

/// The two artifact slots are independently nullable and independently
/// timed; writes to one never clobber the other.
#[derive(Default)]
struct Record {
    media: Option<Slot>,
    transcript: Option<Slot>,
}

impl Record {
    fn is_empty(&self) -> bool {
        self.media.is_none() && self.transcript.is_none()
    }
}

/// Non-destructive view of what is tracked for a message.
#[derive(Debug, Clone)]
pub struct TrackedArtifacts {
    pub media: Option<ArtifactDescriptor>,
    pub transcript: Option<ArtifactDescriptor>,
}

/// Artifacts moved into permanent storage by [`ArtifactTracker::promote`].
/// Descriptor paths point at the saved files.
#[derive(Debug, Default)]
pub struct PromotedArtifacts {
    pub media: Option<ArtifactDescriptor>,
    pub transcript: Option<ArtifactDescriptor>,
}

/// Tracks temporary on-disk artifacts (downloaded media, rendered
/// transcripts) per message id until they are promoted by a capture event or
/// reaped when the retention window elapses untouched.
#[derive(Clone)]
pub struct ArtifactTracker {
    inner: Arc<Mutex<HashMap<String, Record>>>,
    clock: SharedClock,
    retention: TimeDelta,
}

impl ArtifactTracker {
    pub fn new(retention: std::time::Duration, clock: SharedClock) -> Self {
        Self {
            inner: Arc::new(Mutex::new(HashMap::new())),
            clock,
            retention: TimeDelta::from_std(retention).unwrap_or(TimeDelta::MAX),
        }
    }

    /// Attach a downloaded media file. Creates the record if absent; the
    /// transcript slot is left untouched.
    pub fn attach_media(&self, id: &str, descriptor: ArtifactDescriptor) {
        let expires_at = self.deadline();
        let mut inner = self.lock();
        inner.entry(id.to_string()).or_default().media = Some(Slot {
            descriptor,
            expires_at,
        });
    }

    /// Attach a rendered transcript file. Creates the record if absent; the
    /// media slot is left untouched.
    pub fn attach_transcript(&self, id: &str, descriptor: ArtifactDescriptor) {
        let expires_at = self.deadline();
        let mut inner = self.lock();
        inner.entry(id.to_string()).or_default().transcript = Some(Slot {
            descriptor,
            expires_at,
        });
    }

    /// Non-destructive read of the live (unexpired) slots for `id`.
    pub fn peek(&self, id: &str) -> Option<TrackedArtifacts> {
        let now = self.clock.now();
        let inner = self.lock();
        let record = inner.get(id)?;
        let live = |slot: &Option<Slot>| {
            slot.as_ref()
                .filter(|s| s.expires_at > now)
                .map(|s| s.descriptor.clone())
        };
        Some(TrackedArtifacts {
            media: live(&record.media),
            transcript: live(&record.transcript),
        })
    }

    /// Move every populated slot for `id` from temporary into permanent
    /// storage and clear the record. Removing the record first is what
    /// cancels the slots' expiry, so a reap can never race the move.
    ///
    /// Idempotent-safe: a second call, or a slot whose temp file was already
    /// reaped, yields an absent slot rather than a failure.
    pub async fn promote(&self, id: &str, saved_dir: &Path) -> PromotedArtifacts {
        let record = self.lock().remove(id);
        let Some(record) = record else {
            return PromotedArtifacts::default();
        };

        PromotedArtifacts {
            media: Self::move_slot(record.media, saved_dir).await,
            transcript: Self::move_slot(record.transcript, saved_dir).await,
        }
    }

    /// Remove and return only the media slot, leaving the transcript slot
    /// and its expiry untouched. Used by the view-once path.
    pub fn take_media(&self, id: &str) -> Option<ArtifactDescriptor> {
        let now = self.clock.now();
        let mut inner = self.lock();
        let record = inner.get_mut(id)?;
        // An expired slot stays in place for the sweep to reap its file.
        if record.media.as_ref().is_none_or(|slot| slot.expires_at <= now) {
            return None;
        }
        let slot = record.media.take()?;
        if record.is_empty() {
            inner.remove(id);
        }
        Some(slot.descriptor)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Reap expired slots: delete the temp file if still present and clear
    /// only that slot; records left with both slots empty are dropped.
    /// Called by the reaper task.
    pub async fn sweep(&self) -> usize {
        let now = self.clock.now();
        let mut reaped: Vec<PathBuf> = Vec::new();
        {
            let mut inner = self.lock();
            for record in inner.values_mut() {
                for slot in [&mut record.media, &mut record.transcript] {
                    if slot.as_ref().is_some_and(|s| s.expires_at <= now)
                        && let Some(expired) = slot.take()
                    {
                        reaped.push(expired.descriptor.path);
                    }
                }
            }
            inner.retain(|_, record| !record.is_empty());
        }

        for path in &reaped {
            files::remove_quietly(path).await;
        }
        reaped.len()
    }

    async fn move_slot(slot: Option<Slot>, saved_dir: &Path) -> Option<ArtifactDescriptor> {
        let slot = slot?;
        let mut descriptor = slot.descriptor;
        match files::move_into(&descriptor.path, saved_dir, &descriptor.filename).await {
            Ok(Some(saved_path)) => {
                descriptor.path = saved_path;
                Some(descriptor)
            }
            Ok(None) => {
                tracing::debug!(
                    filename = %descriptor.filename,
                    "artifact already reaped before promotion"
                );
                None
            }
            Err(error) => {
                tracing::warn!(
                    filename = %descriptor.filename,
                    %error,
                    "failed to promote artifact"
                );
                None
            }
        }
    }

    fn deadline(&self) -> DateTime<Utc> {
        self.clock
            .now()
            .checked_add_signed(self.retention)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Record>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::{ArtifactDescriptor, ArtifactTracker};
    use crate::clock::ManualClock;
    use chrono::{Duration, TimeZone, Utc};
    use std::path::Path;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn tracker() -> (Arc<ManualClock>, ArtifactTracker) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        ));
        let tracker = ArtifactTracker::new(
            std::time::Duration::from_secs(68 * 3600),
            clock.clone(),
        );
        (clock, tracker)
    }

    async fn write_temp(dir: &Path, name: &str) -> ArtifactDescriptor {
        let path = dir.join(name);
        tokio::fs::write(&path, b"artifact").await.unwrap();
        ArtifactDescriptor {
            path,
            filename: name.to_string(),
            mime_type: name.ends_with(".jpg").then(|| "image/jpeg".to_string()),
        }
    }

    #[tokio::test]
    async fn attach_preserves_the_other_slot() {
        let dir = TempDir::new().unwrap();
        let (_clock, tracker) = tracker();

        tracker.attach_media("m1", write_temp(dir.path(), "1_m1.jpg").await);
        tracker.attach_transcript("m1", write_temp(dir.path(), "1_m1.txt").await);

        let tracked = tracker.peek("m1").unwrap();
        assert!(tracked.media.is_some());
        assert!(tracked.transcript.is_some());
        assert_eq!(tracker.len(), 1);
    }

    #[tokio::test]
    async fn promote_moves_both_slots_and_clears_record() {
        let dir = TempDir::new().unwrap();
        let saved = dir.path().join("saved");
        tokio::fs::create_dir_all(&saved).await.unwrap();
        let (_clock, tracker) = tracker();

        let media = write_temp(dir.path(), "1_m1.jpg").await;
        let media_temp = media.path.clone();
        tracker.attach_media("m1", media);
        tracker.attach_transcript("m1", write_temp(dir.path(), "1_m1.txt").await);

        let promoted = tracker.promote("m1", &saved).await;

        let media = promoted.media.unwrap();
        assert_eq!(media.path, saved.join("1_m1.jpg"));
        assert!(media.path.exists());
        assert!(!media_temp.exists());
        assert!(promoted.transcript.is_some());
        assert!(tracker.is_empty());
    }

    #[tokio::test]
    async fn promote_twice_is_safe_and_empty() {
        let dir = TempDir::new().unwrap();
        let saved = dir.path().join("saved");
        tokio::fs::create_dir_all(&saved).await.unwrap();
        let (_clock, tracker) = tracker();

        tracker.attach_media("m1", write_temp(dir.path(), "1_m1.jpg").await);
        let first = tracker.promote("m1", &saved).await;
        let second = tracker.promote("m1", &saved).await;

        assert!(first.media.is_some());
        assert!(second.media.is_none());
        assert!(second.transcript.is_none());
    }

    #[tokio::test]
    async fn promote_with_reaped_file_returns_absent_slot() {
        let dir = TempDir::new().unwrap();
        let saved = dir.path().join("saved");
        tokio::fs::create_dir_all(&saved).await.unwrap();
        let (_clock, tracker) = tracker();

        let media = write_temp(dir.path(), "1_m1.jpg").await;
        tokio::fs::remove_file(&media.path).await.unwrap();
        tracker.attach_media("m1", media);
        tracker.attach_transcript("m1", write_temp(dir.path(), "1_m1.txt").await);

        let promoted = tracker.promote("m1", &saved).await;

        assert!(promoted.media.is_none());
        assert!(promoted.transcript.is_some());
    }

    #[tokio::test]
    async fn sweep_deletes_expired_files_and_keeps_live_slots() {
        let dir = TempDir::new().unwrap();
        let (clock, tracker) = tracker();

        let old = write_temp(dir.path(), "1_m1.jpg").await;
        let old_path = old.path.clone();
        tracker.attach_media("m1", old);

        clock.advance(Duration::hours(40));
        let fresh = write_temp(dir.path(), "2_m1.txt").await;
        tracker.attach_transcript("m1", fresh);

        clock.advance(Duration::hours(30));
        let reaped = tracker.sweep().await;

        assert_eq!(reaped, 1);
        assert!(!old_path.exists());
        let tracked = tracker.peek("m1").unwrap();
        assert!(tracked.media.is_none());
        assert!(tracked.transcript.is_some());
    }

    #[tokio::test]
    async fn sweep_drops_fully_empty_records() {
        let dir = TempDir::new().unwrap();
        let (clock, tracker) = tracker();

        tracker.attach_media("m1", write_temp(dir.path(), "1_m1.jpg").await);
        clock.advance(Duration::hours(69));
        tracker.sweep().await;

        assert!(tracker.is_empty());
        assert!(tracker.peek("m1").is_none());
    }

    #[tokio::test]
    async fn take_media_leaves_transcript_tracked() {
        let dir = TempDir::new().unwrap();
        let (_clock, tracker) = tracker();

        tracker.attach_media("m1", write_temp(dir.path(), "1_m1.jpg").await);
        tracker.attach_transcript("m1", write_temp(dir.path(), "1_m1.txt").await);

        let taken = tracker.take_media("m1").unwrap();
        assert_eq!(taken.filename, "1_m1.jpg");

        let tracked = tracker.peek("m1").unwrap();
        assert!(tracked.media.is_none());
        assert!(tracked.transcript.is_some());
        assert!(tracker.take_media("m1").is_none());
    }
}
