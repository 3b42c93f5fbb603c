//! Runtime acquisition: locating an installed executable or provisioning
//! one from the vendor's release archives.

use std::path::PathBuf;
use std::sync::Arc;

use crate::archive;
use crate::checksum;
use crate::config::RunnerConfig;
use crate::errors::RunnerError;
use crate::fetch::{ArtifactFetcher, HttpFetcher};
use crate::runtime::{Platform, RuntimeKind};

/// Downloads, verifies, and installs runtime executables.
pub struct RuntimeProvisioner {
    config: RunnerConfig,
    platform: Platform,
    fetcher: Arc<dyn ArtifactFetcher>,
}

impl RuntimeProvisioner {
    pub fn new(config: RunnerConfig) -> Self {
        Self {
            config,
            platform: Platform::current(),
            fetcher: Arc::new(HttpFetcher::new()),
        }
    }

    /// Replaces the release fetcher, for tests and mirrored downloads.
    pub fn with_fetcher(mut self, fetcher: Arc<dyn ArtifactFetcher>) -> Self {
        self.fetcher = fetcher;
        self
    }

    /// Overrides the detected host platform.
    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    /// Installs `kind` under the configured root and returns the
    /// executable path.
    ///
    /// The downloaded archive stays on disk next to the executable after a
    /// successful install; an archive that fails verification is deleted.
    /// The executable is extracted to a staging name and renamed into
    /// place, so a crash mid-install never leaves a half-written binary at
    /// the published path.
    pub async fn provision(&self, kind: RuntimeKind) -> Result<PathBuf, RunnerError> {
        let target = kind.release_target(&self.platform)?;
        let archive_name = kind.archive_name(&target);
        let release_tag = self.config.release_tag(kind);

        let runtime_dir = kind.runtime_dir(self.config.root_dir());
        tokio::fs::create_dir_all(&runtime_dir).await?;

        let url = kind.download_url(&archive_name, release_tag);
        log::info!("Downloading {} from {}", kind, url);
        let archive_bytes = self.fetcher.fetch(&url).await?;

        let archive_path = runtime_dir.join(&archive_name);
        tokio::fs::write(&archive_path, &archive_bytes).await?;

        let checksums_url = kind.checksums_url(&archive_name, release_tag);
        let listing_bytes = self.fetcher.fetch(&checksums_url).await?;
        let listing = String::from_utf8_lossy(&listing_bytes);
        if let Err(err) = checksum::verify_archive(&archive_bytes, &listing, &archive_name) {
            if let Err(remove_err) = tokio::fs::remove_file(&archive_path).await {
                log::warn!(
                    "Failed to remove unverified archive {}: {}",
                    archive_path.display(),
                    remove_err
                );
            }
            return Err(err);
        }

        let staging_path = runtime_dir.join(format!("{}.partial", kind.executable_name()));
        archive::extract_binary(&archive_path, kind.executable_name(), &staging_path).await?;
        archive::make_executable(&staging_path)?;

        let executable_path = kind.executable_path(self.config.root_dir());
        tokio::fs::rename(&staging_path, &executable_path).await?;

        kind.prepare_package_cache(self.config.root_dir()).await?;

        log::info!("Installed {} at {}", kind, executable_path.display());
        Ok(executable_path)
    }
}

/// Finds a usable runtime executable, provisioning when none exists.
pub struct RuntimeLocator {
    config: RunnerConfig,
    provisioner: RuntimeProvisioner,
}

impl RuntimeLocator {
    pub fn new(config: RunnerConfig) -> Self {
        let provisioner = RuntimeProvisioner::new(config.clone());
        Self {
            config,
            provisioner,
        }
    }

    /// Replaces the provisioner used for cache misses.
    pub fn with_provisioner(mut self, provisioner: RuntimeProvisioner) -> Self {
        self.provisioner = provisioner;
        self
    }

    /// Returns the executable to spawn for `kind`.
    ///
    /// An executable already on disk is trusted as-is; nothing re-verifies
    /// or upgrades an install once it exists.
    pub async fn locate(&self, kind: RuntimeKind) -> Result<PathBuf, RunnerError> {
        if self.config.prefer_system_runtime() {
            if let Ok(path) = which::which(kind.executable_name()) {
                log::debug!("Using system {} at {}", kind, path.display());
                return Ok(path);
            }
        }

        let executable = kind.executable_path(self.config.root_dir());
        if tokio::fs::try_exists(&executable).await? {
            return Ok(executable);
        }

        log::info!(
            "{} not found at {}, provisioning",
            kind,
            executable.display()
        );
        self.provisioner.provision(kind).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::sha256_hex;
    use crate::test_utils::{build_zip, create_fake_runtime, MockFetcher};
    use std::path::Path;
    use tempfile::tempdir;

    const BUN_ARCHIVE_URL: &str =
        "https://github.com/oven-sh/bun/releases/latest/download/bun-linux-x64.zip";
    const BUN_CHECKSUMS_URL: &str =
        "https://github.com/oven-sh/bun/releases/latest/download/SHASUMS256.txt";

    fn linux_x64() -> Platform {
        Platform {
            os: "linux".to_string(),
            arch: "x86_64".to_string(),
        }
    }

    fn config_in(dir: &Path) -> RunnerConfig {
        RunnerConfig::new().with_root_dir(dir.to_path_buf())
    }

    /// Builds a bun release zip plus its listing, ready for the mock.
    fn bun_release(dir: &Path) -> (Vec<u8>, String) {
        let archive_path = dir.join("bun-linux-x64.zip");
        build_zip(
            &archive_path,
            &[
                ("bun-linux-x64/LICENSE", "MIT"),
                ("bun-linux-x64/bun", "#!/bin/sh\necho fake bun\n"),
            ],
        );
        let bytes = std::fs::read(&archive_path).unwrap();
        let listing = format!("{}  bun-linux-x64.zip\n", sha256_hex(&bytes));
        (bytes, listing)
    }

    #[tokio::test]
    async fn test_provisions_bun_from_verified_archive() {
        let dir = tempdir().unwrap();
        let (bytes, listing) = bun_release(dir.path());
        let fetcher = Arc::new(
            MockFetcher::new()
                .with_response(BUN_ARCHIVE_URL, bytes)
                .with_response(BUN_CHECKSUMS_URL, listing.into_bytes()),
        );

        let provisioner = RuntimeProvisioner::new(config_in(dir.path()))
            .with_platform(linux_x64())
            .with_fetcher(fetcher.clone());

        let executable = provisioner.provision(RuntimeKind::Bun).await.unwrap();
        assert_eq!(executable, dir.path().join("bun/bun"));
        assert_eq!(
            std::fs::read_to_string(&executable).unwrap(),
            "#!/bin/sh\necho fake bun\n"
        );
        assert_eq!(fetcher.fetch_count(), 2);

        // Side artifacts of a successful install.
        assert!(dir.path().join("bun/bun-linux-x64.zip").exists());
        assert!(dir.path().join("bun/packages/.bun-cache").is_dir());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&executable).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o755);
        }
    }

    #[tokio::test]
    async fn test_checksum_mismatch_deletes_archive() {
        let dir = tempdir().unwrap();
        let (bytes, _) = bun_release(dir.path());
        let listing = format!("{}  bun-linux-x64.zip\n", sha256_hex(b"different bytes"));
        let fetcher = Arc::new(
            MockFetcher::new()
                .with_response(BUN_ARCHIVE_URL, bytes)
                .with_response(BUN_CHECKSUMS_URL, listing.into_bytes()),
        );

        let provisioner = RuntimeProvisioner::new(config_in(dir.path()))
            .with_platform(linux_x64())
            .with_fetcher(fetcher);

        let err = provisioner.provision(RuntimeKind::Bun).await.unwrap_err();
        assert!(matches!(err, RunnerError::ChecksumMismatch { .. }));
        assert!(!dir.path().join("bun/bun-linux-x64.zip").exists());
        assert!(!dir.path().join("bun/bun").exists());
    }

    #[tokio::test]
    async fn test_listing_without_artifact_fails_closed() {
        let dir = tempdir().unwrap();
        let (bytes, _) = bun_release(dir.path());
        let listing = format!("{}  bun-darwin-aarch64.zip\n", sha256_hex(&bytes));
        let fetcher = Arc::new(
            MockFetcher::new()
                .with_response(BUN_ARCHIVE_URL, bytes)
                .with_response(BUN_CHECKSUMS_URL, listing.into_bytes()),
        );

        let provisioner = RuntimeProvisioner::new(config_in(dir.path()))
            .with_platform(linux_x64())
            .with_fetcher(fetcher);

        let err = provisioner.provision(RuntimeKind::Bun).await.unwrap_err();
        assert!(matches!(err, RunnerError::ChecksumMissing { .. }));
        assert!(!dir.path().join("bun/bun-linux-x64.zip").exists());
    }

    #[tokio::test]
    async fn test_unsupported_platform_fetches_nothing() {
        let dir = tempdir().unwrap();
        let fetcher = Arc::new(MockFetcher::new());

        let provisioner = RuntimeProvisioner::new(config_in(dir.path()))
            .with_platform(Platform {
                os: "windows".to_string(),
                arch: "x86_64".to_string(),
            })
            .with_fetcher(fetcher.clone());

        let err = provisioner.provision(RuntimeKind::Bun).await.unwrap_err();
        assert!(matches!(err, RunnerError::UnsupportedPlatform { .. }));
        assert_eq!(fetcher.fetch_count(), 0);
    }

    #[tokio::test]
    async fn test_pinned_release_tag_urls() {
        let dir = tempdir().unwrap();
        let (bytes, listing) = bun_release(dir.path());
        let fetcher = Arc::new(
            MockFetcher::new()
                .with_response(
                    "https://github.com/oven-sh/bun/releases/download/bun-v1.2.0/bun-linux-x64.zip",
                    bytes,
                )
                .with_response(
                    "https://github.com/oven-sh/bun/releases/download/bun-v1.2.0/SHASUMS256.txt",
                    listing.into_bytes(),
                ),
        );

        let config = config_in(dir.path()).with_release_tag(RuntimeKind::Bun, "bun-v1.2.0");
        let provisioner = RuntimeProvisioner::new(config)
            .with_platform(linux_x64())
            .with_fetcher(fetcher);

        provisioner.provision(RuntimeKind::Bun).await.unwrap();
        assert!(dir.path().join("bun/bun").exists());
    }

    #[tokio::test]
    async fn test_provisions_deno_per_asset_listing() {
        let dir = tempdir().unwrap();
        let archive_path = dir.path().join("deno.zip");
        build_zip(&archive_path, &[("deno", "#!/bin/sh\necho fake deno\n")]);
        let bytes = std::fs::read(&archive_path).unwrap();
        let listing = format!("{} *deno-x86_64-unknown-linux-gnu.zip\n", sha256_hex(&bytes));

        let fetcher = Arc::new(
            MockFetcher::new()
                .with_response(
                    "https://github.com/denoland/deno/releases/latest/download/deno-x86_64-unknown-linux-gnu.zip",
                    bytes,
                )
                .with_response(
                    "https://github.com/denoland/deno/releases/latest/download/deno-x86_64-unknown-linux-gnu.zip.sha256sum",
                    listing.into_bytes(),
                ),
        );

        let provisioner = RuntimeProvisioner::new(config_in(dir.path()))
            .with_platform(linux_x64())
            .with_fetcher(fetcher);

        let executable = provisioner.provision(RuntimeKind::Deno).await.unwrap();
        assert_eq!(executable, dir.path().join("deno/deno"));
        assert!(dir.path().join("deno/packages").is_dir());
    }

    #[tokio::test]
    async fn test_locate_prefers_existing_install() {
        let dir = tempdir().unwrap();
        create_fake_runtime(&dir.path().join("bun/bun"), "echo existing");

        let fetcher = Arc::new(MockFetcher::new());
        let provisioner = RuntimeProvisioner::new(config_in(dir.path()))
            .with_platform(linux_x64())
            .with_fetcher(fetcher.clone());
        let locator = RuntimeLocator::new(config_in(dir.path())).with_provisioner(provisioner);

        let executable = locator.locate(RuntimeKind::Bun).await.unwrap();
        assert_eq!(executable, dir.path().join("bun/bun"));
        assert_eq!(fetcher.fetch_count(), 0);
    }

    #[tokio::test]
    async fn test_locate_provisions_when_missing() {
        let dir = tempdir().unwrap();
        let (bytes, listing) = bun_release(dir.path());
        let fetcher = Arc::new(
            MockFetcher::new()
                .with_response(BUN_ARCHIVE_URL, bytes)
                .with_response(BUN_CHECKSUMS_URL, listing.into_bytes()),
        );

        let provisioner = RuntimeProvisioner::new(config_in(dir.path()))
            .with_platform(linux_x64())
            .with_fetcher(fetcher.clone());
        let locator = RuntimeLocator::new(config_in(dir.path())).with_provisioner(provisioner);

        let executable = locator.locate(RuntimeKind::Bun).await.unwrap();
        assert!(executable.exists());
        assert_eq!(fetcher.fetch_count(), 2);

        // A second locate finds the install and leaves the network alone.
        locator.locate(RuntimeKind::Bun).await.unwrap();
        assert_eq!(fetcher.fetch_count(), 2);
    }

    #[cfg(unix)]
    #[tokio::test]
    #[serial_test::serial]
    async fn test_locate_prefers_system_runtime() {
        let dir = tempdir().unwrap();
        let system_bin = dir.path().join("system-bin");
        create_fake_runtime(&system_bin.join("bun"), "echo system");

        let saved_path = std::env::var("PATH").ok();
        std::env::set_var("PATH", &system_bin);

        let config = config_in(&dir.path().join("root")).with_system_runtime(true);
        let fetcher = Arc::new(MockFetcher::new());
        let provisioner = RuntimeProvisioner::new(config.clone())
            .with_platform(linux_x64())
            .with_fetcher(fetcher.clone());
        let locator = RuntimeLocator::new(config).with_provisioner(provisioner);

        let located = locator.locate(RuntimeKind::Bun).await;

        match saved_path {
            Some(value) => std::env::set_var("PATH", value),
            None => std::env::remove_var("PATH"),
        }

        assert_eq!(located.unwrap(), system_bin.join("bun"));
        assert_eq!(fetcher.fetch_count(), 0);
    }
}
