use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::collector;
use crate::config::PipelineConfig;
use crate::diagnostics::DiagnosticsArchive;
use crate::error::StageError;
use crate::model::{FailureCode, TaskRequest, TaskResult};
use crate::runner::{self, Invocation};
use crate::stager;
use crate::workspace::Workspace;

pub const MALFORMED_REQUEST_MESSAGE: &str = "Unable to unmarshal request.";
pub const WORKSPACE_FAILURE_MESSAGE: &str = "Server internal error.";

/// Runs tasks end to end. Cheap to clone; clones share the configuration.
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: Arc<PipelineConfig>,
    diagnostics: Option<DiagnosticsArchive>,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        let diagnostics = config.diagnostics_dir.clone().map(DiagnosticsArchive::new);
        Self {
            config: Arc::new(config),
            diagnostics,
        }
    }

    pub fn diagnostics(&self) -> Option<&DiagnosticsArchive> {
        self.diagnostics.as_ref()
    }

    /// Processes one raw request body. Never fails: every problem is encoded
    /// in the returned code and message.
    pub async fn process(&self, raw: &[u8]) -> TaskResult {
        let started = Instant::now();
        let result = self.execute(raw).await;

        info!(
            code = result.code,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "task finished"
        );
        result
    }

    async fn execute(&self, raw: &[u8]) -> TaskResult {
        let request = match TaskRequest::from_slice(raw) {
            Ok(request) => request,
            Err(e) => {
                debug!(error = %e, "malformed request");
                return TaskResult::failure(FailureCode::MalformedRequest, MALFORMED_REQUEST_MESSAGE);
            }
        };

        let workspace = match Workspace::create(&self.config.temp_root).await {
            Ok(ws) => ws,
            Err(e) => {
                warn!(error = %e, "workspace unavailable");
                return TaskResult::failure(
                    FailureCode::WorkspaceUnavailable,
                    WORKSPACE_FAILURE_MESSAGE,
                );
            }
        };

        let result = self.run_in(&workspace, &request, raw).await;
        workspace.destroy().await;

        // Only tasks that got as far as a workspace are archived.
        if let Some(archive) = &self.diagnostics {
            archive.record(raw, &result).await;
        }
        result
    }

    async fn run_in(&self, workspace: &Workspace, request: &TaskRequest, raw: &[u8]) -> TaskResult {
        let config = &self.config;

        let resolved = match stager::resolve_artifact(&config.versions_root, request).await {
            Ok(resolved) => resolved,
            Err(e) => return stage_failure(FailureCode::UnsupportedTarget, e),
        };
        let artifact =
            match stager::stage_artifact(workspace, &resolved.artifact, resolved.target.bits).await {
                Ok(path) => path,
                Err(e) => return stage_failure(FailureCode::UnsupportedTarget, e),
            };
        let script = match stager::stage_script(workspace, &config.script_path).await {
            Ok(path) => path,
            Err(e) => return stage_failure(FailureCode::ScriptStaging, e),
        };
        let payload = match stager::stage_request_payload(workspace, raw).await {
            Ok(path) => path,
            Err(e) => return stage_failure(FailureCode::PayloadStaging, e),
        };

        let invocation = Invocation {
            tool: runner::tool_path(&config.versions_root, &resolved.target),
            workdir: workspace.path().to_path_buf(),
            script,
            payload,
            artifact,
        };

        let run_error = runner::run(&invocation, config.timeout).await.err();
        if let Some(e) = &run_error {
            warn!(
                error = %e,
                arch = resolved.target.arch.as_str(),
                bits = resolved.target.bits.bits(),
                version = %resolved.target.version,
                "tool run failed"
            );
        }

        collector::collect(workspace.path(), run_error.as_ref()).await
    }
}

fn stage_failure(code: FailureCode, err: StageError) -> TaskResult {
    match &err {
        StageError::InternalStaging { what, path, source } => warn!(
            code = code.code(),
            what = *what,
            path = %path.display(),
            error = %source,
            "staging failed"
        ),
        StageError::UnsupportedTarget { .. } => debug!(error = %err, "unsupported target"),
    }
    TaskResult::failure(code, err.to_string())
}
