use std::path::PathBuf;
use std::process::ExitStatus;
use std::time::Duration;

use thiserror::Error;

/// Startup configuration problems. These are fatal for the process.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot find OBPO_PATH: set it or place {fallback} in the working directory")]
    MissingScriptPath { fallback: String },
}

/// The per-task workspace could not be allocated.
#[derive(Debug, Error)]
#[error("failed to create workspace under {}: {source}", .root.display())]
pub struct WorkspaceError {
    pub root: PathBuf,
    #[source]
    pub source: std::io::Error,
}

/// Failure while preparing workspace inputs.
#[derive(Debug, Error)]
pub enum StageError {
    /// Reported to the caller as-is.
    #[error(
        "unsupported current hexrays version({version}) or architecture({arch}:{bit}), \
         please see: github.com/obpo-project/obpo-plugin"
    )]
    UnsupportedTarget {
        version: String,
        arch: String,
        bit: i64,
    },

    /// Not the caller's fault; details only go to the log.
    #[error("server internal error")]
    InternalStaging {
        what: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Run-level failure of the external tool.
///
/// None of these is terminal by itself: the message is prepended to whatever
/// the tool reported and the outputs are still collected.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("process timeout after {0:?}")]
    Timeout(Duration),

    #[error("obpo except exit: {status}")]
    AbnormalExit { status: ExitStatus },

    /// The program path stays out of the message, which reaches the client.
    #[error("obpo except exit")]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("obpo except exit: failed waiting for tool: {0}")]
    Wait(#[source] std::io::Error),
}
