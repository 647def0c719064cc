use std::path::{Path, PathBuf};

use crate::models::job::RecognitionJob;

/// Writes job images to a scratch directory so engines can address them by URI.
#[derive(Debug, Clone)]
pub struct ImageStager {
    dir: PathBuf,
}

/// A job image staged on disk. Engines read it through [`StagedImage::read`]
/// or its URI. Removed by [`StagedImage::release`], or on drop if the job
/// never got that far.
#[derive(Debug)]
pub struct StagedImage {
    path: PathBuf,
    len: usize,
    released: bool,
}

impl ImageStager {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Stage a job's image under a name derived from its id.
    pub async fn stage(&self, job: &RecognitionJob) -> Result<StagedImage, StagingError> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let path = self.dir.join(format!("{}{}", job.id, extension_of(&job.image_name)));
        tokio::fs::write(&path, &job.image).await?;

        tracing::debug!(job_id = %job.id, path = %path.display(), "Staged image");

        Ok(StagedImage {
            path,
            len: job.image.len(),
            released: false,
        })
    }
}

impl StagedImage {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn uri(&self) -> String {
        format!("file://{}", self.path.display())
    }

    /// Size of the staged image in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Read the staged image back from disk.
    pub async fn read(&self) -> Result<Vec<u8>, StagingError> {
        Ok(tokio::fs::read(&self.path).await?)
    }

    pub async fn release(mut self) -> Result<(), StagingError> {
        self.released = true;
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

impl Drop for StagedImage {
    fn drop(&mut self) {
        if !self.released {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

fn extension_of(name: &str) -> String {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|ext| format!(".{}", ext.to_ascii_lowercase()))
        .unwrap_or_default()
}

#[derive(Debug, thiserror::Error)]
pub enum StagingError {
    #[error("Staging I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(label: &str) -> PathBuf {
        std::env::temp_dir().join(format!("geostamp-staging-test-{label}-{}", uuid::Uuid::new_v4()))
    }

    #[tokio::test]
    async fn test_stage_and_release() {
        let stager = ImageStager::new(scratch_dir("release"));
        let job = RecognitionJob::new("Site 7.JPG", b"jpeg bytes".to_vec());

        let staged = stager.stage(&job).await.expect("stage");
        assert!(staged.path().exists());
        assert!(staged.uri().starts_with("file://"));
        assert!(staged.uri().ends_with(".jpg"));
        assert_eq!(staged.len(), 10);
        assert_eq!(staged.read().await.expect("read"), b"jpeg bytes");

        let path = staged.path().to_path_buf();
        staged.release().await.expect("release");
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_read_sees_file_contents() {
        let stager = ImageStager::new(scratch_dir("read"));
        let job = RecognitionJob::new("a.png", b"original".to_vec());

        let staged = stager.stage(&job).await.expect("stage");
        tokio::fs::write(staged.path(), b"rewritten").await.expect("overwrite");
        assert_eq!(staged.read().await.expect("read"), b"rewritten");

        tokio::fs::remove_file(staged.path()).await.expect("remove");
        assert!(matches!(staged.read().await, Err(StagingError::Io(_))));
    }

    #[tokio::test]
    async fn test_drop_removes_file() {
        let stager = ImageStager::new(scratch_dir("drop"));
        let job = RecognitionJob::new("no-extension", b"bytes".to_vec());

        let staged = stager.stage(&job).await.expect("stage");
        let path = staged.path().to_path_buf();
        assert_eq!(path.extension(), None);
        drop(staged);
        assert!(!path.exists());
    }
}
