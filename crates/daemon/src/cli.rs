use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use obpo_core::config::{parse_timeout, TIMEOUT_ENV};
use obpo_core::PipelineConfig;

#[derive(Parser, Debug, Clone)]
#[command(name = "obpo-daemon", version, about = "OBPO analysis task server")]
pub struct Args {
    /// Listen address.
    #[arg(short, long, default_value = "0.0.0.0:10000")]
    pub listen: SocketAddr,

    /// Directory holding one subdirectory per tool version.
    #[arg(long, default_value = ".")]
    pub versions_root: PathBuf,

    /// Analysis script. Overrides OBPO_PATH.
    #[arg(long)]
    pub script: Option<PathBuf>,

    /// Tool deadline in seconds. Overrides OBPO_TIMEOUT.
    #[arg(long)]
    pub timeout_secs: Option<u64>,

    /// Where per-task workspaces are created (system temp dir by default).
    #[arg(long)]
    pub temp_root: Option<PathBuf>,

    /// Archive directory for failed tasks.
    #[arg(long, default_value = "errors")]
    pub errors_dir: PathBuf,

    /// Do not archive failed tasks.
    #[arg(long, default_value_t = false)]
    pub no_diagnostics: bool,

    /// Maximum request body size in bytes.
    #[arg(long, default_value_t = 64 * 1024 * 1024)]
    pub body_limit_bytes: usize,

    /// Log level (env-filter syntax). RUST_LOG takes precedence.
    #[arg(long, default_value = "info")]
    pub log: String,
}

impl Args {
    /// Builds the pipeline configuration from flags and environment.
    ///
    /// Fails when no analysis script can be found.
    pub fn pipeline_config(&self) -> Result<PipelineConfig> {
        let mut config = match &self.script {
            Some(script) => PipelineConfig::new(&self.versions_root, script)
                .with_timeout(parse_timeout(std::env::var(TIMEOUT_ENV).ok().as_deref())),
            None => PipelineConfig::from_env(&self.versions_root)
                .context("resolve analysis script")?,
        };

        if let Some(secs) = self.timeout_secs.filter(|s| *s > 0) {
            config = config.with_timeout(Duration::from_secs(secs));
        }
        if let Some(temp_root) = &self.temp_root {
            config = config.with_temp_root(temp_root);
        }
        config = if self.no_diagnostics {
            config.without_diagnostics()
        } else {
            config.with_diagnostics_dir(&self.errors_dir)
        };
        Ok(config)
    }
}
