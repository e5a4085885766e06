//! Copies task inputs into a workspace.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::StageError;
use crate::model::{BitWidth, TaskRequest, Target};
use crate::workspace::Workspace;

/// Stem of the staged database; the extension follows the bit width.
pub const STAGED_ARTIFACT_STEM: &str = "binary";
pub const STAGED_SCRIPT_NAME: &str = "obpo_script.py";
pub const STAGED_PAYLOAD_NAME: &str = "task.json";

/// A supported target together with its template database on disk.
#[derive(Debug, Clone)]
pub struct ResolvedTarget {
    pub target: Target,
    pub artifact: PathBuf,
}

/// Finds the template database for `request` under `versions_root/<version>/`.
pub async fn resolve_artifact(
    versions_root: &Path,
    request: &TaskRequest,
) -> Result<ResolvedTarget, StageError> {
    let unsupported = || StageError::UnsupportedTarget {
        version: request.version.clone(),
        arch: request.arch.clone(),
        bit: request.bit,
    };

    let target = request.target().ok_or_else(unsupported)?;
    let artifact = versions_root
        .join(&target.version)
        .join(target.artifact_name());

    match tokio::fs::metadata(&artifact).await {
        Ok(meta) if meta.is_file() => Ok(ResolvedTarget { target, artifact }),
        _ => Err(unsupported()),
    }
}

pub async fn stage_artifact(
    workspace: &Workspace,
    source: &Path,
    bits: BitWidth,
) -> Result<PathBuf, StageError> {
    let dest = workspace.join(format!(
        "{STAGED_ARTIFACT_STEM}.{}",
        bits.database_extension()
    ));
    copy_into(source, dest, "artifact").await
}

pub async fn stage_script(workspace: &Workspace, script: &Path) -> Result<PathBuf, StageError> {
    copy_into(script, workspace.join(STAGED_SCRIPT_NAME), "script").await
}

/// Writes the raw request body, byte for byte, for the script to read.
pub async fn stage_request_payload(
    workspace: &Workspace,
    raw: &[u8],
) -> Result<PathBuf, StageError> {
    let dest = workspace.join(STAGED_PAYLOAD_NAME);
    tokio::fs::write(&dest, raw)
        .await
        .map_err(|source| StageError::InternalStaging {
            what: "payload",
            path: dest.clone(),
            source,
        })?;
    debug!(path = %dest.display(), bytes = raw.len(), "payload staged");
    Ok(dest)
}

async fn copy_into(source: &Path, dest: PathBuf, what: &'static str) -> Result<PathBuf, StageError> {
    tokio::fs::copy(source, &dest)
        .await
        .map_err(|e| StageError::InternalStaging {
            what,
            path: source.to_path_buf(),
            source: e,
        })?;
    debug!(what, from = %source.display(), to = %dest.display(), "staged");
    Ok(dest)
}
