use async_trait::async_trait;
use backup_engine::adapter::DestinationAdapter;
use backup_engine::crypto::sha256_hex;
use bytes::Bytes;
use std::path::PathBuf;

/// Stores each job as `<root>/<job_id>.bak`. Useful for a mounted NAS or a
/// second disk.
pub struct LocalDirDestination {
    root: PathBuf,
}

impl LocalDirDestination {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn object_path(&self, job_id: &str) -> anyhow::Result<PathBuf> {
        if job_id.is_empty() || job_id.contains(['/', '\\']) || job_id.starts_with('.') {
            anyhow::bail!("invalid object name '{job_id}'");
        }
        Ok(self.root.join(format!("{job_id}.bak")))
    }
}

#[async_trait]
impl DestinationAdapter for LocalDirDestination {
    async fn probe(&self) -> bool {
        if let Err(e) = tokio::fs::create_dir_all(&self.root).await {
            tracing::warn!(root = %self.root.display(), error = %e, "Local destination not writable");
            return false;
        }
        tokio::fs::metadata(&self.root)
            .await
            .map(|m| m.is_dir() && !m.permissions().readonly())
            .unwrap_or(false)
    }

    async fn upload(&self, job_id: &str, payload: Bytes) -> anyhow::Result<String> {
        let path = self.object_path(job_id)?;
        let partial = path.with_extension("bak.partial");
        tokio::fs::create_dir_all(&self.root).await?;
        tokio::fs::write(&partial, &payload).await?;
        tokio::fs::rename(&partial, &path).await?;

        // Hash what actually landed on disk
        let stored = tokio::fs::read(&path).await?;
        Ok(sha256_hex(&stored))
    }

    async fn download(&self, job_id: &str) -> anyhow::Result<Bytes> {
        let path = self.object_path(job_id)?;
        Ok(Bytes::from(tokio::fs::read(&path).await?))
    }

    async fn delete(&self, job_id: &str) -> anyhow::Result<()> {
        let path = self.object_path(job_id)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_upload_download_delete() {
        let dir = tempfile::tempdir().unwrap();
        let dest = LocalDirDestination::new(dir.path().join("nas"));
        assert!(dest.probe().await);

        let payload = Bytes::from_static(b"sealed snapshot");
        let hash = dest.upload("job-1", payload.clone()).await.unwrap();
        assert_eq!(hash, sha256_hex(&payload));
        assert_eq!(dest.download("job-1").await.unwrap(), payload);

        dest.delete("job-1").await.unwrap();
        assert!(dest.download("job-1").await.is_err());
        dest.delete("job-1").await.unwrap();
    }

    #[tokio::test]
    async fn test_rejects_path_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let dest = LocalDirDestination::new(dir.path());
        assert!(dest.upload("../escape", Bytes::new()).await.is_err());
    }
}
