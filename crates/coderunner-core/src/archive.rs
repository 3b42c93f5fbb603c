//! Single-entry extraction out of release archives.
//!
//! Runtime releases ship as a zip or gzipped tarball wrapping one
//! executable next to files we have no use for (licenses, completions).
//! The routines here pull that one entry out by file name.

use std::path::Path;

use crate::errors::RunnerError;

/// Extracts the archive entry whose file name is `entry_name` into
/// `dest_path`. The archive format is chosen from the archive's own file
/// name (`.zip`, `.tar.gz`, or `.tgz`).
pub async fn extract_binary(
    archive_path: &Path,
    entry_name: &str,
    dest_path: &Path,
) -> Result<(), RunnerError> {
    let archive_name = archive_path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| archive_path.display().to_string());

    if archive_name.ends_with(".zip") {
        extract_zip(archive_path, entry_name, dest_path, &archive_name)
    } else if archive_name.ends_with(".tar.gz") || archive_name.ends_with(".tgz") {
        extract_tar_gz(archive_path, entry_name, dest_path, &archive_name).await
    } else {
        Err(RunnerError::Archive {
            archive: archive_name,
            message: "unsupported archive format".to_string(),
        })
    }
}

fn extract_zip(
    archive_path: &Path,
    entry_name: &str,
    dest_path: &Path,
    archive_name: &str,
) -> Result<(), RunnerError> {
    let file = std::fs::File::open(archive_path)?;
    let mut archive = zip::ZipArchive::new(file).map_err(|e| RunnerError::Archive {
        archive: archive_name.to_string(),
        message: e.to_string(),
    })?;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).map_err(|e| RunnerError::Archive {
            archive: archive_name.to_string(),
            message: e.to_string(),
        })?;
        let matches = entry
            .enclosed_name()
            .and_then(|path| path.file_name().map(|name| name == entry_name))
            .unwrap_or(false);
        if matches && entry.is_file() {
            let mut out = std::fs::File::create(dest_path)?;
            std::io::copy(&mut entry, &mut out)?;
            return Ok(());
        }
    }

    Err(RunnerError::EntryNotFound {
        entry: entry_name.to_string(),
        archive: archive_name.to_string(),
    })
}

async fn extract_tar_gz(
    archive_path: &Path,
    entry_name: &str,
    dest_path: &Path,
    archive_name: &str,
) -> Result<(), RunnerError> {
    use async_compression::tokio::bufread::GzipDecoder;
    use futures_util::StreamExt;
    use tokio_tar::Archive;

    let file = tokio::fs::File::open(archive_path).await?;
    let buf_reader = tokio::io::BufReader::new(file);
    let mut archive = Archive::new(GzipDecoder::new(buf_reader));
    let mut entries = archive.entries()?;

    while let Some(entry) = entries.next().await {
        let mut entry = entry?;
        let matches = {
            let path = entry.path()?;
            path.file_name().map(|name| name == entry_name).unwrap_or(false)
        };
        if matches {
            entry.unpack(dest_path).await?;
            return Ok(());
        }
    }

    Err(RunnerError::EntryNotFound {
        entry: entry_name.to_string(),
        archive: archive_name.to_string(),
    })
}

/// Marks an extracted binary executable. No-op outside Unix.
pub fn make_executable(path: &Path) -> Result<(), RunnerError> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = std::fs::metadata(path)?.permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(path, perms)?;
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{build_tar_gz, build_zip};
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_extracts_nested_zip_entry() {
        let dir = tempdir().unwrap();
        let archive_path = dir.path().join("bun-linux-x64.zip");
        build_zip(
            &archive_path,
            &[
                ("bun-linux-x64/LICENSE", "MIT"),
                ("bun-linux-x64/bun", "#!/bin/sh\necho bun\n"),
            ],
        );

        let dest = dir.path().join("bun");
        extract_binary(&archive_path, "bun", &dest).await.unwrap();
        assert_eq!(
            std::fs::read_to_string(&dest).unwrap(),
            "#!/bin/sh\necho bun\n"
        );
    }

    #[tokio::test]
    async fn test_missing_zip_entry() {
        let dir = tempdir().unwrap();
        let archive_path = dir.path().join("bun-linux-x64.zip");
        build_zip(&archive_path, &[("bun-linux-x64/LICENSE", "MIT")]);

        let err = extract_binary(&archive_path, "bun", &dir.path().join("bun"))
            .await
            .unwrap_err();
        assert!(matches!(err, RunnerError::EntryNotFound { .. }));
    }

    #[tokio::test]
    async fn test_extracts_from_tar_gz() {
        let dir = tempdir().unwrap();
        let archive_path = dir.path().join("deno.tar.gz");
        build_tar_gz(&archive_path, &[("release/deno", "#!/bin/sh\necho deno\n")]);

        let dest = dir.path().join("deno");
        extract_binary(&archive_path, "deno", &dest).await.unwrap();
        assert_eq!(
            std::fs::read_to_string(&dest).unwrap(),
            "#!/bin/sh\necho deno\n"
        );
    }

    #[tokio::test]
    async fn test_unknown_archive_format() {
        let dir = tempdir().unwrap();
        let archive_path = dir.path().join("runtime.rar");
        std::fs::write(&archive_path, b"not an archive").unwrap();

        let err = extract_binary(&archive_path, "bun", &dir.path().join("bun"))
            .await
            .unwrap_err();
        assert!(matches!(err, RunnerError::Archive { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_make_executable_sets_mode() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let path = dir.path().join("tool");
        std::fs::write(&path, "#!/bin/sh\n").unwrap();
        make_executable(&path).unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
    }
}
