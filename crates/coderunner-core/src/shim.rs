//! Shim bundle materialization.
//!
//! Each runtime kind ships a bootstrap bundle (entry script plus support
//! files) embedded in this crate. The bundle is copied into the runtime's
//! shim directory when the directory or its entry script is missing and is
//! left untouched otherwise, so a partially-deleted cache self-heals while
//! the common path does a single existence check. A configured override
//! directory replaces the embedded bundle wholesale.

use std::path::{Path, PathBuf};

use crate::config::RunnerConfig;
use crate::errors::RunnerError;
use crate::runtime::RuntimeKind;

/// Entry script the runtime is pointed at.
pub const SHIM_ENTRY: &str = "shim.js";

/// One embedded bundle file: path relative to the shim directory, plus
/// contents.
struct BundleFile {
    rel_path: &'static str,
    contents: &'static str,
}

const BUN_BUNDLE: &[BundleFile] = &[
    BundleFile {
        rel_path: "shim.js",
        contents: include_str!("../shim/bun/shim.js"),
    },
    BundleFile {
        rel_path: "utils/io.js",
        contents: include_str!("../shim/bun/utils/io.js"),
    },
];

const DENO_BUNDLE: &[BundleFile] = &[
    BundleFile {
        rel_path: "shim.js",
        contents: include_str!("../shim/deno/shim.js"),
    },
    BundleFile {
        rel_path: "utils/io.js",
        contents: include_str!("../shim/deno/utils/io.js"),
    },
];

fn bundle(kind: RuntimeKind) -> &'static [BundleFile] {
    match kind {
        RuntimeKind::Bun => BUN_BUNDLE,
        RuntimeKind::Deno => DENO_BUNDLE,
    }
}

/// Path of the entry script for `kind` under the configured root.
pub fn shim_entry_path(kind: RuntimeKind, root: &Path) -> PathBuf {
    kind.shim_dir(root).join(SHIM_ENTRY)
}

/// Ensures the shim bundle for `kind` is present, returning the entry
/// script path.
pub async fn materialize_shim(
    kind: RuntimeKind,
    config: &RunnerConfig,
) -> Result<PathBuf, RunnerError> {
    let shim_dir = kind.shim_dir(config.root_dir());
    let entry = shim_dir.join(SHIM_ENTRY);

    if tokio::fs::try_exists(&entry).await? {
        return Ok(entry);
    }

    log::info!("Materializing {} shim at {}", kind, shim_dir.display());
    tokio::fs::create_dir_all(&shim_dir).await?;

    match config.shim_override(kind) {
        Some(source) => copy_dir_dereferenced(source, &shim_dir).await?,
        None => {
            for file in bundle(kind) {
                let dest = shim_dir.join(file.rel_path);
                if let Some(parent) = dest.parent() {
                    tokio::fs::create_dir_all(parent).await?;
                }
                tokio::fs::write(&dest, file.contents).await?;
            }
        }
    }

    Ok(entry)
}

/// Recursively copies `source` into `dest`. Symbolic links are followed,
/// so the copied bundle stands alone.
async fn copy_dir_dereferenced(source: &Path, dest: &Path) -> Result<(), RunnerError> {
    let mut stack = vec![(source.to_path_buf(), dest.to_path_buf())];
    while let Some((from, to)) = stack.pop() {
        tokio::fs::create_dir_all(&to).await?;
        let mut entries = tokio::fs::read_dir(&from).await?;
        while let Some(entry) = entries.next_entry().await? {
            let from_path = entry.path();
            let to_path = to.join(entry.file_name());
            // metadata() resolves links; symlinked files land as copies.
            let meta = tokio::fs::metadata(&from_path).await?;
            if meta.is_dir() {
                stack.push((from_path, to_path));
            } else {
                tokio::fs::copy(&from_path, &to_path).await?;
            }
        }
    }
    Ok(())
}
