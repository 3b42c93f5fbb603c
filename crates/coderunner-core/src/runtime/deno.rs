//! Deno release naming and launch policy.

use std::path::Path;

use super::Platform;

const RELEASE_BASE: &str = "https://github.com/denoland/deno/releases";

/// Deno names its assets by Rust target triple.
pub(super) fn release_target(platform: &Platform) -> Option<String> {
    let arch = match platform.arch.as_str() {
        "x86_64" => "x86_64",
        "aarch64" => "aarch64",
        _ => return None,
    };
    let os = match platform.os.as_str() {
        "linux" => "unknown-linux-gnu",
        "macos" => "apple-darwin",
        _ => return None,
    };
    Some(format!("{}-{}", arch, os))
}

pub(super) fn archive_name(target: &str) -> String {
    format!("deno-{}.zip", target)
}

pub(super) fn release_url(asset: &str, release_tag: Option<&str>) -> String {
    match release_tag {
        Some(tag) => format!("{}/download/{}/{}", RELEASE_BASE, tag, asset),
        None => format!("{}/latest/download/{}", RELEASE_BASE, asset),
    }
}

/// Deno publishes one `.sha256sum` file per asset instead of a combined
/// listing.
pub(super) fn checksums_url(archive_name: &str, release_tag: Option<&str>) -> String {
    release_url(&format!("{}.sha256sum", archive_name), release_tag)
}

pub(super) fn launch_args(shim_entry: &Path) -> Vec<String> {
    vec![
        "run".to_string(),
        "--allow-all".to_string(),
        "--no-lock".to_string(),
        shim_entry.display().to_string(),
    ]
}
