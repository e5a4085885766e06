//! Turns the files the tool leaves in a workspace into a [`TaskResult`].

use std::io::ErrorKind;
use std::path::Path;

use tracing::debug;

use crate::error::RunError;
use crate::model::{FailureCode, ResultData, TaskResult};
use crate::util::tail_lossy;

pub const ERROR_FILE: &str = "error";
pub const WARN_FILE: &str = "warn";
pub const MBA_FILE: &str = "mba";
/// Written by older script revisions instead of `mba`.
pub const RESULT_FILE: &str = "result";
/// Script debug log; logged, never returned.
pub const LOG_FILE: &str = "log.txt";

const LOGGED_TOOL_LOG_BYTES: usize = 8192;

/// Reads the outputs in `dir`.
///
/// Success is decided by `mba` alone. A run error is always surfaced, in front
/// of whatever the tool wrote to `error`.
pub async fn collect(dir: &Path, run_error: Option<&RunError>) -> TaskResult {
    let mut error = read_output(dir, ERROR_FILE).await;
    let warning = read_output(dir, WARN_FILE).await;
    let mba = read_output(dir, MBA_FILE).await;
    let result = read_output(dir, RESULT_FILE).await;

    let log = read_output(dir, LOG_FILE).await;
    if !log.is_empty() {
        debug!(log = %tail_lossy(log.as_bytes(), LOGGED_TOOL_LOG_BYTES), "tool log");
    }

    if let Some(e) = run_error {
        error = format!("{e}\n{error}");
    }

    let code = if mba.is_empty() {
        FailureCode::NoOutput.code()
    } else {
        0
    };

    TaskResult {
        code,
        error,
        warning,
        payload: ResultData { mba, result },
    }
}

/// Contents of `dir/name`, or empty if it is missing or unreadable.
async fn read_output(dir: &Path, name: &str) -> String {
    match tokio::fs::read(dir.join(name)).await {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(e) if e.kind() == ErrorKind::NotFound => String::new(),
        Err(e) => {
            debug!(file = name, error = %e, "unreadable tool output");
            String::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::tempdir;

    #[tokio::test]
    async fn mba_present_is_success() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("mba"), "(a+b)").unwrap();
        std::fs::write(dir.path().join("warn"), "slow path").unwrap();

        let res = collect(dir.path(), None).await;
        assert_eq!(res.code, 0);
        assert_eq!(res.payload.mba, "(a+b)");
        assert_eq!(res.warning, "slow path");
        assert_eq!(res.error, "");
    }

    #[tokio::test]
    async fn no_outputs_is_no_output_failure() {
        let dir = tempdir().unwrap();
        let res = collect(dir.path(), None).await;
        assert_eq!(res.code, -6);
        assert_eq!(res.error, "");
        assert_eq!(res.warning, "");
        assert_eq!(res.payload, ResultData::default());
    }

    #[tokio::test]
    async fn empty_mba_file_is_no_output_failure() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("mba"), "").unwrap();
        std::fs::write(dir.path().join("error"), "dispatcher not found").unwrap();
        let res = collect(dir.path(), None).await;
        assert_eq!(res.code, -6);
        assert_eq!(res.error, "dispatcher not found");
    }

    #[tokio::test]
    async fn run_error_is_prepended_even_on_success() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("mba"), "(a+b)").unwrap();
        std::fs::write(dir.path().join("error"), "partial").unwrap();
        let err = RunError::Timeout(Duration::from_secs(60));

        let res = collect(dir.path(), Some(&err)).await;
        assert_eq!(res.code, 0);
        assert_eq!(res.error, "process timeout after 60s\npartial");
    }

    #[tokio::test]
    async fn run_error_without_outputs() {
        let dir = tempdir().unwrap();
        let err = RunError::Timeout(Duration::from_secs(1));
        let res = collect(dir.path(), Some(&err)).await;
        assert_eq!(res.code, -6);
        assert_eq!(res.error, "process timeout after 1s\n");
    }

    #[tokio::test]
    async fn legacy_result_file_is_carried_without_affecting_code() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("result"), "QUJD").unwrap();
        let res = collect(dir.path(), None).await;
        assert_eq!(res.code, -6);
        assert_eq!(res.payload.result, "QUJD");
    }
}
