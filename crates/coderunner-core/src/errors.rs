//! Error types for runtime provisioning and sandboxed execution.

use thiserror::Error;

/// Errors surfaced by provisioning, caching, and execution plumbing.
///
/// User code that runs and misbehaves is not an error: it comes back as an
/// [`ExecutionOutcome::Failure`](crate::ExecutionOutcome) carrying the exit
/// status and captured log. `RunnerError` is reserved for faults in the
/// machinery itself.
#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("Platform not supported for {runtime}: {os}-{arch}")]
    UnsupportedPlatform {
        runtime: String,
        os: String,
        arch: String,
    },

    #[error("Checksum mismatch for {artifact}: expected {expected}, computed {computed}")]
    ChecksumMismatch {
        artifact: String,
        expected: String,
        computed: String,
    },

    #[error("Checksum listing has no entry for {artifact}")]
    ChecksumMissing { artifact: String },

    #[error("Unknown runtime: {0:?} (expected \"bun\" or \"deno\")")]
    UnknownRuntime(String),

    #[error("Invalid code type: {0:?} (expected \"javascript\" or \"typescript\")")]
    InvalidCodeType(String),

    #[error("Invalid {field}: {value:?} is not usable as a path component")]
    InvalidIdentifier { field: &'static str, value: String },

    #[error("Failed to fetch {url}: {message}")]
    Fetch { url: String, message: String },

    #[error("Entry {entry:?} not found in archive {archive}")]
    EntryNotFound { entry: String, archive: String },

    #[error("Failed to read archive {archive}: {message}")]
    Archive { archive: String, message: String },

    #[error("Malformed result channel payload: {0}")]
    MalformedResult(#[source] serde_json::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::ser::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
