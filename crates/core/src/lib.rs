#![forbid(unsafe_code)]

//! Task pipeline for the OBPO analysis service.
//!
//! A request names a target (architecture, bit width, tool version). The
//! pipeline stages the matching analysis database into a private workspace,
//! runs the external tool against it under a deadline and turns the files the
//! tool leaves behind into a [`TaskResult`].

pub mod collector;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod model;
pub mod pipeline;
pub mod runner;
pub mod stager;
pub mod workspace;

mod util;

pub use config::PipelineConfig;
pub use diagnostics::DiagnosticsArchive;
pub use error::{ConfigError, RunError, StageError, WorkspaceError};
pub use model::{Arch, BitWidth, FailureCode, ResultData, Target, TaskRequest, TaskResult};
pub use pipeline::Pipeline;
