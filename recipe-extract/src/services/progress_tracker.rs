//! In-memory live progress for running jobs
//!
//! Entries exist only while a job runs in this process. The persisted
//! record stays authoritative; this map only makes polling cheaper.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

use crate::models::{JobProgress, JobStatus};

#[derive(Debug, Clone, Default)]
pub struct ProgressTracker {
    entries: Arc<Mutex<HashMap<Uuid, JobProgress>>>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Uuid, JobProgress>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Begin tracking a job (replaces any stale entry)
    pub fn start(&self, job_id: Uuid, progress: JobProgress) {
        self.lock().insert(job_id, progress);
    }

    /// Update stage and step; progress never moves backwards
    ///
    /// Ignored for untracked jobs, so a late write after cancel is dropped.
    pub fn update(&self, job_id: Uuid, status: JobStatus, current_step: impl Into<String>, progress: u8) {
        if let Some(entry) = self.lock().get_mut(&job_id) {
            entry.status = status;
            entry.current_step = current_step.into();
            entry.progress = entry.progress.max(progress.min(100));
            entry.updated_at = chrono::Utc::now();
        }
    }

    pub fn set_total_frames(&self, job_id: Uuid, total_frames: u32) {
        if let Some(entry) = self.lock().get_mut(&job_id) {
            entry.total_frames = Some(total_frames);
        }
    }

    pub fn set_frames_with_text(&self, job_id: Uuid, frames_with_text: u32) {
        if let Some(entry) = self.lock().get_mut(&job_id) {
            entry.frames_with_text = Some(frames_with_text);
        }
    }

    pub fn get(&self, job_id: Uuid) -> Option<JobProgress> {
        self.lock().get(&job_id).cloned()
    }

    pub fn remove(&self, job_id: Uuid) -> Option<JobProgress> {
        self.lock().remove(&job_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_is_monotonic() {
        let tracker = ProgressTracker::new();
        let job_id = Uuid::new_v4();
        tracker.start(job_id, JobProgress::new(JobStatus::Downloading, "Downloading video...", 5));

        tracker.update(job_id, JobStatus::Downloading, "Downloading video... 50%", 15);
        tracker.update(job_id, JobStatus::Downloading, "Downloading video... 40%", 13);

        let progress = tracker.get(job_id).unwrap();
        assert_eq!(progress.progress, 15);
        assert_eq!(progress.current_step, "Downloading video... 40%");
    }

    #[test]
    fn test_untracked_updates_are_ignored() {
        let tracker = ProgressTracker::new();
        let job_id = Uuid::new_v4();
        tracker.update(job_id, JobStatus::Transcribing, "Transcribing audio...", 40);
        tracker.set_total_frames(job_id, 12);

        assert!(tracker.get(job_id).is_none());
    }

    #[test]
    fn test_remove_stops_tracking() {
        let tracker = ProgressTracker::new();
        let job_id = Uuid::new_v4();
        tracker.start(job_id, JobProgress::new(JobStatus::Pending, "Starting...", 0));
        tracker.set_total_frames(job_id, 30);
        tracker.set_frames_with_text(job_id, 4);

        let removed = tracker.remove(job_id).unwrap();
        assert_eq!(removed.total_frames, Some(30));
        assert_eq!(removed.frames_with_text, Some(4));
        assert!(tracker.get(job_id).is_none());
        assert!(tracker.remove(job_id).is_none());
    }
}
