//! Bounded execution of the external analysis tool.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::RunError;
use crate::model::Target;
use crate::util::tail_lossy;

/// Exit code IDA reports after a script calls `exit()`. It is the tool's
/// normal completion code, so it is not treated as a failure.
pub const EXPECTED_TOOL_EXIT_CODE: i32 = 1;

/// Environment variable through which the tool learns the payload path.
pub const PAYLOAD_PATH_ENV: &str = "JSON_PATH";

/// How long to keep draining stdout/stderr once the tool is gone. Grandchildren
/// holding the pipes open must not stall the task.
const OUTPUT_DRAIN_GRACE: Duration = Duration::from_secs(2);
const LOGGED_OUTPUT_BYTES: usize = 4096;

/// One fully staged tool run.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub tool: PathBuf,
    pub workdir: PathBuf,
    pub script: PathBuf,
    pub payload: PathBuf,
    pub artifact: PathBuf,
}

impl Invocation {
    /// `-A -S"<script> <payload>" <artifact>`: autonomous mode, run the script
    /// with the payload path as its argument, then open the database.
    pub fn args(&self) -> Vec<OsString> {
        let mut script_flag = OsString::from("-S");
        script_flag.push(self.script.as_os_str());
        script_flag.push(" ");
        script_flag.push(self.payload.as_os_str());
        vec!["-A".into(), script_flag, self.artifact.clone().into_os_string()]
    }
}

/// `<versions_root>/<version>/idapro/ida64` for 64-bit targets, `ida` otherwise.
pub fn tool_path(versions_root: &Path, target: &Target) -> PathBuf {
    versions_root
        .join(&target.version)
        .join("idapro")
        .join(format!(
            "{}{}",
            target.bits.tool_stem(),
            std::env::consts::EXE_SUFFIX
        ))
}

/// Maps a finished tool's status onto the run outcome.
pub fn classify_exit(status: ExitStatus) -> Result<(), RunError> {
    match status.code() {
        Some(0) | Some(EXPECTED_TOOL_EXIT_CODE) => Ok(()),
        _ => Err(RunError::AbnormalExit { status }),
    }
}

/// Runs the tool and waits at most `timeout` for it.
///
/// On timeout the child is killed and reaped before this returns.
pub async fn run(invocation: &Invocation, timeout: Duration) -> Result<(), RunError> {
    debug!(
        tool = %invocation.tool.display(),
        artifact = %invocation.artifact.display(),
        timeout_ms = timeout.as_millis() as u64,
        "starting tool"
    );

    let mut child = Command::new(&invocation.tool)
        .args(invocation.args())
        .env(PAYLOAD_PATH_ENV, &invocation.payload)
        .current_dir(&invocation.workdir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| {
            warn!(tool = %invocation.tool.display(), error = %source, "failed to start tool");
            RunError::Spawn {
                program: invocation.tool.clone(),
                source,
            }
        })?;

    let stdout = tokio::spawn(drain(child.stdout.take()));
    let stderr = tokio::spawn(drain(child.stderr.take()));

    let outcome = match tokio::time::timeout(timeout, child.wait()).await {
        Ok(Ok(status)) => {
            debug!(%status, "tool exited");
            classify_exit(status)
        }
        Ok(Err(e)) => Err(RunError::Wait(e)),
        Err(_elapsed) => {
            if let Err(e) = child.kill().await {
                warn!(error = %e, "failed to kill timed out tool");
            }
            Err(RunError::Timeout(timeout))
        }
    };

    let (out, err) = (collect_output(stdout).await, collect_output(stderr).await);
    if !out.is_empty() || !err.is_empty() {
        debug!(
            stdout = %tail_lossy(&out, LOGGED_OUTPUT_BYTES),
            stderr = %tail_lossy(&err, LOGGED_OUTPUT_BYTES),
            "tool output"
        );
    }

    outcome
}

async fn drain<R: AsyncRead + Unpin>(reader: Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut reader) = reader {
        let _ = reader.read_to_end(&mut buf).await;
    }
    buf
}

async fn collect_output(handle: tokio::task::JoinHandle<Vec<u8>>) -> Vec<u8> {
    let abort = handle.abort_handle();
    match tokio::time::timeout(OUTPUT_DRAIN_GRACE, handle).await {
        Ok(Ok(bytes)) => bytes,
        Ok(Err(_)) => Vec::new(),
        Err(_) => {
            abort.abort();
            Vec::new()
        }
    }
}
