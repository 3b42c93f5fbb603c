//! SHA-256 verification of downloaded release archives.

use sha2::{Digest, Sha256};

use crate::errors::RunnerError;

/// Hex SHA-256 of `bytes`.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Verifies `artifact_name`'s digest against a `sha256sum`-style listing.
///
/// Each listing line is `<hex-digest><whitespace><file-name>`; a leading `*`
/// on the file name (binary-mode marker) is tolerated. The check fails
/// closed: an artifact absent from the listing is an error, not a pass.
pub fn verify_archive(
    archive: &[u8],
    listing: &str,
    artifact_name: &str,
) -> Result<(), RunnerError> {
    let expected =
        find_digest(listing, artifact_name).ok_or_else(|| RunnerError::ChecksumMissing {
            artifact: artifact_name.to_string(),
        })?;

    let computed = sha256_hex(archive);
    if computed.eq_ignore_ascii_case(expected) {
        log::debug!("Checksum verified for {}", artifact_name);
        Ok(())
    } else {
        Err(RunnerError::ChecksumMismatch {
            artifact: artifact_name.to_string(),
            expected: expected.to_string(),
            computed,
        })
    }
}

fn find_digest<'a>(listing: &'a str, artifact_name: &str) -> Option<&'a str> {
    listing.lines().find_map(|line| {
        let mut parts = line.split_whitespace();
        let digest = parts.next()?;
        let name = parts.next()?;
        let name = name.strip_prefix('*').unwrap_or(name);
        (name == artifact_name).then_some(digest)
    })
}
