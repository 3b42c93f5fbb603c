//! Runtime kinds and their provisioning and launch policies.
//!
//! The set of runtimes is closed. Every policy in this module dispatches by
//! matching on [`RuntimeKind`]; adding a runtime means adding a variant and
//! filling in each match arm.

mod bun;
mod deno;

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::RunnerError;

/// Host platform, as reported by the compiler's target constants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Platform {
    pub os: String,
    pub arch: String,
}

impl Platform {
    pub fn current() -> Self {
        Self {
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
        }
    }
}

/// The interchangeable language runtimes user code can be executed under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeKind {
    Bun,
    Deno,
}

impl RuntimeKind {
    pub fn name(&self) -> &'static str {
        match self {
            RuntimeKind::Bun => "bun",
            RuntimeKind::Deno => "deno",
        }
    }

    /// File name of the runtime executable inside its install directory.
    pub fn executable_name(&self) -> &'static str {
        self.name()
    }

    /// `<root>/<kind>`; everything for one runtime lives under here.
    pub fn runtime_dir(&self, root: &Path) -> PathBuf {
        root.join(self.name())
    }

    pub fn executable_path(&self, root: &Path) -> PathBuf {
        self.runtime_dir(root).join(self.executable_name())
    }

    /// Content-addressed code cache for this runtime.
    pub fn cache_dir(&self, root: &Path) -> PathBuf {
        self.runtime_dir(root).join("cache")
    }

    /// Materialized shim bundle shared by all executions under this kind.
    pub fn shim_dir(&self, root: &Path) -> PathBuf {
        self.runtime_dir(root).join("shim")
    }

    /// Dependency cache managed by the runtime itself; opaque to us.
    pub fn packages_dir(&self, root: &Path) -> PathBuf {
        self.runtime_dir(root).join("packages")
    }

    /// Maps the host platform into the vendor's release naming scheme, or
    /// fails before any network traffic when the platform is not covered.
    pub fn release_target(&self, platform: &Platform) -> Result<String, RunnerError> {
        let target = match self {
            RuntimeKind::Bun => bun::release_target(platform),
            RuntimeKind::Deno => deno::release_target(platform),
        };
        target.ok_or_else(|| RunnerError::UnsupportedPlatform {
            runtime: self.name().to_string(),
            os: platform.os.clone(),
            arch: platform.arch.clone(),
        })
    }

    /// Release archive file name for a resolved target.
    pub fn archive_name(&self, target: &str) -> String {
        match self {
            RuntimeKind::Bun => bun::archive_name(target),
            RuntimeKind::Deno => deno::archive_name(target),
        }
    }

    /// Download URL for the archive, from the pinned release when a tag is
    /// configured and from the latest release otherwise.
    pub fn download_url(&self, archive_name: &str, release_tag: Option<&str>) -> String {
        match self {
            RuntimeKind::Bun => bun::release_url(archive_name, release_tag),
            RuntimeKind::Deno => deno::release_url(archive_name, release_tag),
        }
    }

    /// Location of the SHA-256 listing covering `archive_name`.
    pub fn checksums_url(&self, archive_name: &str, release_tag: Option<&str>) -> String {
        match self {
            RuntimeKind::Bun => bun::checksums_url(release_tag),
            RuntimeKind::Deno => deno::checksums_url(archive_name, release_tag),
        }
    }

    /// Argument list that launches the shim under this runtime.
    pub fn launch_args(&self, code_dir: &Path, shim_entry: &Path) -> Vec<String> {
        match self {
            RuntimeKind::Bun => bun::launch_args(code_dir, shim_entry),
            RuntimeKind::Deno => deno::launch_args(shim_entry),
        }
    }

    /// Environment handed to the child on top of the executor's baseline.
    pub fn launch_env(&self, code_dir: &Path, packages_dir: &Path) -> Vec<(String, String)> {
        let mut env = vec![("CODE_DIR".to_string(), code_dir.display().to_string())];
        match self {
            RuntimeKind::Bun => {}
            RuntimeKind::Deno => {
                env.push(("DENO_DIR".to_string(), packages_dir.display().to_string()));
            }
        }
        env
    }

    /// Writes the kind's per-code-directory configuration file, once.
    pub async fn write_runtime_config(
        &self,
        code_dir: &Path,
        packages_dir: &Path,
    ) -> Result<(), RunnerError> {
        match self {
            RuntimeKind::Bun => bun::write_bunfig(code_dir, packages_dir).await,
            RuntimeKind::Deno => Ok(()),
        }
    }

    /// Creates the directories the runtime's own package manager caches
    /// into, so first executions don't race to create them.
    pub async fn prepare_package_cache(&self, root: &Path) -> Result<(), RunnerError> {
        let packages = self.packages_dir(root);
        match self {
            RuntimeKind::Bun => {
                tokio::fs::create_dir_all(packages.join(bun::PACKAGE_CACHE_DIR)).await?;
            }
            RuntimeKind::Deno => {
                tokio::fs::create_dir_all(&packages).await?;
            }
        }
        Ok(())
    }
}

impl FromStr for RuntimeKind {
    type Err = RunnerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bun" => Ok(RuntimeKind::Bun),
            "deno" => Ok(RuntimeKind::Deno),
            other => Err(RunnerError::UnknownRuntime(other.to_string())),
        }
    }
}

impl fmt::Display for RuntimeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
