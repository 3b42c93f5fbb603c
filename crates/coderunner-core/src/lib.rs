//! Runtime provisioning and sandboxed execution of user-supplied
//! JavaScript and TypeScript.
//!
//! This crate acquires a verified runtime executable (Bun or Deno) for the
//! host platform, content-addresses user code on disk next to a bootstrap
//! shim, and supervises each run as an isolated child process. Inputs go
//! in over stdin, diagnostics go to a per-execution log file, and the
//! structured result comes back over a dedicated descriptor so it can
//! never mix with the logs.
//!
//! # Architecture Overview
//!
//! - **Provisioning**: release download, checksum verification, and
//!   single-binary extraction per runtime kind
//! - **Locating**: presence-checked installs with an optional system-PATH
//!   short-circuit
//! - **Code cache**: truncated-digest content addressing under per-caller
//!   namespaces, plus per-kind shim bundles and config generation
//! - **Execution**: child process supervision with a cleared environment,
//!   exclusive log files, and a result channel on descriptor 3
//! - **Outcomes**: typed success/failure that separates user-code
//!   misbehavior from faults in the machinery

pub mod archive;
pub mod cache;
pub mod checksum;
pub mod config;
pub mod errors;
#[cfg(unix)]
pub mod executor;
pub mod fetch;
pub mod provision;
pub mod runtime;
pub mod shim;
pub mod types;

pub use cache::{CacheStats, CodeCache, MaterializedCode};
pub use config::RunnerConfig;
pub use errors::RunnerError;
#[cfg(unix)]
pub use executor::SandboxExecutor;
pub use fetch::{ArtifactFetcher, HttpFetcher};
pub use provision::{RuntimeLocator, RuntimeProvisioner};
pub use runtime::{Platform, RuntimeKind};
pub use types::{ChildFailure, CodeType, ExecutionOutcome, ExecutionRequest, Record};

#[cfg(test)]
pub mod test_utils;
