//! Bun release naming and launch policy.

use std::path::Path;

use crate::errors::RunnerError;

use super::Platform;

const RELEASE_BASE: &str = "https://github.com/oven-sh/bun/releases";

pub(super) const BUNFIG_FILE: &str = "bunfig.toml";

/// Directory under `packages/` that bunfig points the install cache at.
pub(super) const PACKAGE_CACHE_DIR: &str = ".bun-cache";

pub(super) fn release_target(platform: &Platform) -> Option<String> {
    let os = match platform.os.as_str() {
        "linux" => "linux",
        "macos" => "darwin",
        _ => return None,
    };
    let arch = match platform.arch.as_str() {
        "x86_64" => "x64",
        "aarch64" => "aarch64",
        _ => return None,
    };
    Some(format!("{}-{}", os, arch))
}

pub(super) fn archive_name(target: &str) -> String {
    format!("bun-{}.zip", target)
}

pub(super) fn release_url(asset: &str, release_tag: Option<&str>) -> String {
    match release_tag {
        Some(tag) => format!("{}/download/{}/{}", RELEASE_BASE, tag, asset),
        None => format!("{}/latest/download/{}", RELEASE_BASE, asset),
    }
}

/// One listing covers every asset of a Bun release.
pub(super) fn checksums_url(release_tag: Option<&str>) -> String {
    release_url("SHASUMS256.txt", release_tag)
}

pub(super) fn launch_args(code_dir: &Path, shim_entry: &Path) -> Vec<String> {
    vec![
        "run".to_string(),
        format!("--config={}", code_dir.join(BUNFIG_FILE).display()),
        "--install=force".to_string(),
        "--prefer-offline".to_string(),
        shim_entry.display().to_string(),
    ]
}

/// Generates the per-code-directory Bun config pointing the install cache
/// at the shared package cache. Written once; later executions of the same
/// snippet find it in place.
pub(super) async fn write_bunfig(code_dir: &Path, packages_dir: &Path) -> Result<(), RunnerError> {
    let path = code_dir.join(BUNFIG_FILE);
    if tokio::fs::try_exists(&path).await? {
        return Ok(());
    }

    let mut cache = toml::Table::new();
    cache.insert(
        "dir".to_string(),
        toml::Value::String(packages_dir.join(PACKAGE_CACHE_DIR).display().to_string()),
    );
    cache.insert("disable".to_string(), toml::Value::Boolean(false));
    let mut install = toml::Table::new();
    install.insert("cache".to_string(), toml::Value::Table(cache));
    let mut config = toml::Table::new();
    config.insert("install".to_string(), toml::Value::Table(install));

    let rendered = format!("# Generated by coderunner\n{}", toml::to_string(&config)?);
    tokio::fs::write(&path, rendered).await?;
    Ok(())
}
