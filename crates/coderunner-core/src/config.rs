//! Runner configuration: on-disk root, timeouts, and per-runtime overrides.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::runtime::RuntimeKind;

/// Environment variable that replaces the OS temp directory as the parent
/// of the runner's on-disk root.
pub const ROOT_DIR_ENV: &str = "CODERUNNER_DIR";

const ROOT_DIR_NAME: &str = "coderunner";

/// Configuration shared by the locator, caches, and executor.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    root_dir: PathBuf,
    timeout: Option<Duration>,
    prefer_system_runtime: bool,
    release_tags: HashMap<RuntimeKind, String>,
    shim_overrides: HashMap<RuntimeKind, PathBuf>,
}

impl RunnerConfig {
    /// Creates a configuration rooted at a `coderunner` directory under
    /// `$CODERUNNER_DIR` when set, or under the OS temp directory otherwise.
    pub fn new() -> Self {
        let parent = match std::env::var(ROOT_DIR_ENV) {
            Ok(dir) if !dir.is_empty() => PathBuf::from(dir),
            _ => std::env::temp_dir(),
        };
        let root_dir = parent.join(ROOT_DIR_NAME);
        log::debug!("Runner root directory: {}", root_dir.display());
        Self {
            root_dir,
            timeout: None,
            prefer_system_runtime: false,
            release_tags: HashMap::new(),
            shim_overrides: HashMap::new(),
        }
    }

    /// Overrides the on-disk root.
    pub fn with_root_dir(mut self, root_dir: PathBuf) -> Self {
        self.root_dir = root_dir;
        self
    }

    /// Bounds each execution; unset means executions run to completion.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Prefer a runtime already installed on the system `PATH` over
    /// provisioning one.
    pub fn with_system_runtime(mut self, prefer: bool) -> Self {
        self.prefer_system_runtime = prefer;
        self
    }

    /// Pins the release tag used when provisioning `kind`. Unpinned kinds
    /// install from the vendor's latest release.
    pub fn with_release_tag(mut self, kind: RuntimeKind, tag: impl Into<String>) -> Self {
        self.release_tags.insert(kind, tag.into());
        self
    }

    /// Sources the shim bundle for `kind` from a directory on disk instead
    /// of the bundle embedded in this crate.
    pub fn with_shim_override(mut self, kind: RuntimeKind, dir: PathBuf) -> Self {
        self.shim_overrides.insert(kind, dir);
        self
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn prefer_system_runtime(&self) -> bool {
        self.prefer_system_runtime
    }

    pub fn release_tag(&self, kind: RuntimeKind) -> Option<&str> {
        self.release_tags.get(&kind).map(String::as_str)
    }

    pub fn shim_override(&self, kind: RuntimeKind) -> Option<&Path> {
        self.shim_overrides.get(&kind).map(PathBuf::as_path)
    }
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self::new()
    }
}
