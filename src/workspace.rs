use crate::error::FatalError;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::info;

/// A uniquely named directory under the working directory, removed when dropped
/// unless it was created with `keep`.
#[derive(Debug)]
pub struct Workspace {
    dir: Option<TempDir>,
    path: PathBuf,
    keep: bool,
}

impl Workspace {
    pub fn create(prefix: &str, keep: bool) -> Result<Self, FatalError> {
        Self::create_in(Path::new("."), prefix, keep)
    }

    pub fn create_in(parent: &Path, prefix: &str, keep: bool) -> Result<Self, FatalError> {
        let dir = tempfile::Builder::new()
            .prefix(prefix)
            .tempdir_in(parent)
            .map_err(|e| FatalError::io(format!("creating a directory in {}", parent.display()), e))?;
        let path = dir.path().to_path_buf();
        Ok(Workspace {
            dir: Some(dir),
            path,
            keep,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        let Some(dir) = self.dir.take() else {
            return;
        };
        if self.keep {
            let kept = dir.keep();
            info!("keeping temporary files in {}", kept.display());
        } else {
            info!("removing temporary files in {}", self.path.display());
            drop(dir);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn removed_unless_kept() {
        let parent = tempfile::tempdir().unwrap();
        let gone = Workspace::create_in(parent.path(), "testing_", false).unwrap();
        let gone_path = gone.path().to_path_buf();
        let kept = Workspace::create_in(parent.path(), "testing_", true).unwrap();
        let kept_path = kept.path().to_path_buf();
        drop(gone);
        drop(kept);
        assert!(!gone_path.exists());
        assert!(kept_path.is_dir());
    }
}
