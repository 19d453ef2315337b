//! Job-scoped scratch directory

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// `<jobs_root>/<job_id>`, holding the download, audio track and frames
#[derive(Debug)]
pub struct JobWorkspace {
    job_id: Uuid,
    root: PathBuf,
}

impl JobWorkspace {
    pub async fn create(jobs_root: &Path, job_id: Uuid) -> std::io::Result<Self> {
        let root = Self::path_for(jobs_root, job_id);
        tokio::fs::create_dir_all(&root).await?;
        Ok(Self { job_id, root })
    }

    pub fn path_for(jobs_root: &Path, job_id: Uuid) -> PathBuf {
        jobs_root.join(job_id.to_string())
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    pub fn frames_dir(&self) -> PathBuf {
        self.root.join("frames")
    }

    /// Delete the directory; consumes the workspace so it happens once
    pub async fn remove(self) {
        remove_dir(self.job_id, &self.root).await;
    }

    /// Best-effort removal when no run owns the directory
    pub async fn remove_orphaned(jobs_root: &Path, job_id: Uuid) {
        remove_dir(job_id, &Self::path_for(jobs_root, job_id)).await;
    }
}

async fn remove_dir(job_id: Uuid, dir: &Path) {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => tracing::debug!(job_id = %job_id, dir = %dir.display(), "Removed job directory"),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(
            job_id = %job_id,
            dir = %dir.display(),
            error = %e,
            "Failed to remove job directory"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_and_remove() {
        let jobs_root = tempfile::tempdir().unwrap();
        let job_id = Uuid::new_v4();

        let workspace = JobWorkspace::create(jobs_root.path(), job_id).await.unwrap();
        let dir = workspace.path().to_path_buf();
        tokio::fs::create_dir_all(workspace.frames_dir()).await.unwrap();
        tokio::fs::write(dir.join("video.mp4"), b"x").await.unwrap();
        assert!(dir.is_dir());

        workspace.remove().await;
        assert!(!dir.exists());

        // Already gone: no panic, no error
        JobWorkspace::remove_orphaned(jobs_root.path(), job_id).await;
    }
}
