use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;

/// Environment variable holding the analysis script path.
pub const SCRIPT_PATH_ENV: &str = "OBPO_PATH";
/// Environment variable overriding the tool deadline, in seconds.
pub const TIMEOUT_ENV: &str = "OBPO_TIMEOUT";
/// Script looked up in the working directory when `OBPO_PATH` is unset.
pub const FALLBACK_SCRIPT: &str = "obpo_script.py";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Everything the pipeline needs from its environment.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Directory holding one subdirectory per tool version, each with the
    /// template databases and an `idapro/` install.
    pub versions_root: PathBuf,
    /// Analysis script copied into every workspace.
    pub script_path: PathBuf,
    /// Deadline for one tool run.
    pub timeout: Duration,
    /// Where workspaces are allocated.
    pub temp_root: PathBuf,
    /// Archive for failed tasks; `None` disables it.
    pub diagnostics_dir: Option<PathBuf>,
}

impl PipelineConfig {
    pub fn new(versions_root: impl Into<PathBuf>, script_path: impl Into<PathBuf>) -> Self {
        Self {
            versions_root: versions_root.into(),
            script_path: script_path.into(),
            timeout: DEFAULT_TIMEOUT,
            temp_root: std::env::temp_dir(),
            diagnostics_dir: None,
        }
    }

    /// Resolves `OBPO_PATH` and `OBPO_TIMEOUT` from the process environment.
    pub fn from_env(versions_root: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        Self::from_lookup(versions_root, |key| std::env::var(key).ok())
    }

    /// Same as [`PipelineConfig::from_env`] over an arbitrary lookup.
    pub fn from_lookup<F>(versions_root: impl Into<PathBuf>, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let script_path = resolve_script_path(lookup(SCRIPT_PATH_ENV))?;
        let timeout = parse_timeout(lookup(TIMEOUT_ENV).as_deref());
        Ok(Self::new(versions_root, script_path).with_timeout(timeout))
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_script_path(mut self, script_path: impl Into<PathBuf>) -> Self {
        self.script_path = script_path.into();
        self
    }

    pub fn with_temp_root(mut self, temp_root: impl Into<PathBuf>) -> Self {
        self.temp_root = temp_root.into();
        self
    }

    pub fn with_diagnostics_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.diagnostics_dir = Some(dir.into());
        self
    }

    pub fn without_diagnostics(mut self) -> Self {
        self.diagnostics_dir = None;
        self
    }
}

fn resolve_script_path(from_env: Option<String>) -> Result<PathBuf, ConfigError> {
    if let Some(path) = from_env.filter(|p| !p.is_empty()) {
        return Ok(PathBuf::from(path));
    }
    let fallback = Path::new(FALLBACK_SCRIPT);
    if fallback.is_file() {
        return Ok(fallback.to_path_buf());
    }
    Err(ConfigError::MissingScriptPath {
        fallback: FALLBACK_SCRIPT.to_string(),
    })
}

/// Seconds from `OBPO_TIMEOUT`; unparsable or zero values keep the default.
pub fn parse_timeout(raw: Option<&str>) -> Duration {
    raw.and_then(|s| s.trim().parse::<u64>().ok())
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_TIMEOUT)
}
