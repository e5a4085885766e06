//! Archive of failed tasks for offline triage.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::model::TaskResult;
use crate::util::now_unix;

/// Requests larger than this are not archived.
pub const MAX_ARCHIVED_REQUEST_BYTES: usize = 2 * 1024 * 1024;

/// Paths of one archived failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorRecord {
    pub request_path: PathBuf,
    pub error_path: PathBuf,
}

/// Append-only directory of `{code}_{unix}.json` / `{code}_{unix}.err` pairs.
///
/// Nothing here can fail a task: write errors are logged and dropped. Two
/// failures with the same code in the same second share a name and the later
/// one wins.
#[derive(Debug, Clone)]
pub struct DiagnosticsArchive {
    dir: PathBuf,
}

impl DiagnosticsArchive {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Creates the archive directory. Called once at startup.
    pub async fn ensure_dir(&self) {
        if let Err(e) = tokio::fs::create_dir_all(&self.dir).await {
            warn!(dir = %self.dir.display(), error = %e, "cannot create diagnostics dir");
        }
    }

    pub fn should_record(raw_request: &[u8], result: &TaskResult) -> bool {
        !result.is_success() && raw_request.len() <= MAX_ARCHIVED_REQUEST_BYTES
    }

    /// Archives a failed task. Returns the written record, if any.
    pub async fn record(&self, raw_request: &[u8], result: &TaskResult) -> Option<ErrorRecord> {
        if !Self::should_record(raw_request, result) {
            return None;
        }

        let stem = format!("{}_{}", result.code, now_unix());
        let record = ErrorRecord {
            request_path: self.dir.join(format!("{stem}.json")),
            error_path: self.dir.join(format!("{stem}.err")),
        };

        if let Err(e) = tokio::fs::write(&record.request_path, raw_request).await {
            warn!(path = %record.request_path.display(), error = %e, "failed to archive request");
            return None;
        }
        if let Err(e) = tokio::fs::write(&record.error_path, result.error.as_bytes()).await {
            warn!(path = %record.error_path.display(), error = %e, "failed to archive error");
            return None;
        }

        debug!(code = result.code, path = %record.request_path.display(), "failure archived");
        Some(record)
    }
}
