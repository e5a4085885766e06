use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::{debug, warn};

use crate::error::WorkspaceError;

/// Prefix of every workspace directory name.
pub const WORKSPACE_PREFIX: &str = "obpo";

/// Private working directory for one task.
///
/// The directory is removed when the value is dropped, so a workspace never
/// outlives the task that created it, whichever way the task exits.
#[derive(Debug)]
pub struct Workspace {
    dir: TempDir,
}

impl Workspace {
    /// Allocates a fresh, empty directory with a random name under `temp_root`.
    pub async fn create(temp_root: &Path) -> Result<Self, WorkspaceError> {
        let root = temp_root.to_path_buf();
        let dir = tokio::task::spawn_blocking(move || {
            tempfile::Builder::new()
                .prefix(WORKSPACE_PREFIX)
                .tempdir_in(&root)
        })
        .await
        .map_err(io::Error::other)
        .and_then(|created| created)
        .map_err(|source| WorkspaceError {
            root: temp_root.to_path_buf(),
            source,
        })?;
        debug!(workspace = %dir.path().display(), "workspace created");
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn join(&self, name: impl AsRef<Path>) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Removes the directory now and logs if that fails. The recursive
    /// delete runs on the blocking pool; staged databases can be large.
    pub async fn destroy(self) {
        let path = self.dir.path().to_path_buf();
        let dir = self.dir;
        match tokio::task::spawn_blocking(move || dir.close()).await {
            Ok(Ok(())) => debug!(workspace = %path.display(), "workspace removed"),
            Ok(Err(e)) => warn!(workspace = %path.display(), error = %e, "failed to remove workspace"),
            Err(e) => warn!(workspace = %path.display(), error = %e, "workspace removal task failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn creates_unique_prefixed_dirs() {
        let root = tempdir().unwrap();
        let a = Workspace::create(root.path()).await.unwrap();
        let b = Workspace::create(root.path()).await.unwrap();
        assert_ne!(a.path(), b.path());
        assert!(a.path().starts_with(root.path()));
        let name = a.path().file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with(WORKSPACE_PREFIX), "{name}");
        assert_eq!(std::fs::read_dir(a.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn destroy_removes_contents() {
        let root = tempdir().unwrap();
        let ws = Workspace::create(root.path()).await.unwrap();
        std::fs::create_dir(ws.join("nested")).unwrap();
        std::fs::write(ws.join("nested").join("mba"), "x").unwrap();
        let path = ws.path().to_path_buf();
        ws.destroy().await;
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn drop_removes_dir() {
        let root = tempdir().unwrap();
        let path = {
            let ws = Workspace::create(root.path()).await.unwrap();
            std::fs::write(ws.join("task.json"), "{}").unwrap();
            ws.path().to_path_buf()
        };
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn missing_root_is_an_error() {
        let root = tempdir().unwrap();
        let missing = root.path().join("does-not-exist");
        let err = Workspace::create(&missing).await.unwrap_err();
        assert_eq!(err.root, missing);
    }
}
