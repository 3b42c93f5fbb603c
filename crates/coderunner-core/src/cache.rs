//! Content-addressed cache of materialized user code.
//!
//! A snippet is keyed by its caller's namespace plus a truncated SHA-256 of
//! its bytes; identical code re-runs from the same directory. Entries are
//! never mutated once written and never evicted on their own; the
//! maintenance accessors at the bottom exist for operators who want bounds.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::checksum::sha256_hex;
use crate::config::RunnerConfig;
use crate::errors::RunnerError;
use crate::runtime::RuntimeKind;
use crate::shim;
use crate::types::{validate_path_component, CodeType};

/// Digest prefix length used in cache paths. Long enough that collisions
/// are negligible for this population, short enough to keep paths readable.
const HASH_PREFIX_LEN: usize = 12;

/// Paths produced by a materialization, everything the executor needs to
/// spawn against the cached snippet.
#[derive(Debug, Clone)]
pub struct MaterializedCode {
    pub code_dir: PathBuf,
    pub code_file: PathBuf,
    pub shim_entry: PathBuf,
}

/// Usage summary for one runtime kind's code cache.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub entry_count: usize,
    pub total_size_bytes: u64,
    pub cache_dir: PathBuf,
}

/// Content-addressed store of user code under a per-caller namespace.
pub struct CodeCache {
    config: RunnerConfig,
}

impl CodeCache {
    pub fn new(config: RunnerConfig) -> Self {
        Self { config }
    }

    /// Truncated hex SHA-256 used as the cache path component.
    pub fn code_hash(source: &str) -> String {
        let mut digest = sha256_hex(source.as_bytes());
        digest.truncate(HASH_PREFIX_LEN);
        digest
    }

    /// Directory a snippet materializes into, whether or not it exists yet.
    pub fn code_dir(&self, kind: RuntimeKind, namespace: &str, source: &str) -> PathBuf {
        kind.cache_dir(self.config.root_dir())
            .join(namespace)
            .join(Self::code_hash(source))
    }

    /// Materializes `source` for `kind` under `namespace`, reusing an
    /// existing entry when the content hash already has one. Also ensures
    /// the kind's shim bundle and per-code-directory config are in place.
    pub async fn materialize_code(
        &self,
        kind: RuntimeKind,
        namespace: &str,
        source: &str,
        code_type: CodeType,
    ) -> Result<MaterializedCode, RunnerError> {
        validate_path_component("caller_namespace", namespace)?;

        let code_dir = self.code_dir(kind, namespace, source);
        let code_file = code_dir.join(code_type.file_name());

        if !tokio::fs::try_exists(&code_file).await? {
            log::debug!("Caching {} code at {}", code_type, code_dir.display());
            tokio::fs::create_dir_all(&code_dir).await?;
            tokio::fs::write(&code_file, source).await?;
        }

        let shim_entry = shim::materialize_shim(kind, &self.config).await?;
        kind.write_runtime_config(&code_dir, &kind.packages_dir(self.config.root_dir()))
            .await?;

        Ok(MaterializedCode {
            code_dir,
            code_file,
            shim_entry,
        })
    }

    /// Counts cache entries (one per namespace/hash pair) and their total
    /// size on disk.
    pub async fn cache_stats(&self, kind: RuntimeKind) -> Result<CacheStats, RunnerError> {
        let cache_dir = kind.cache_dir(self.config.root_dir());
        let mut stats = CacheStats {
            entry_count: 0,
            total_size_bytes: 0,
            cache_dir: cache_dir.clone(),
        };

        if !tokio::fs::try_exists(&cache_dir).await? {
            return Ok(stats);
        }

        let mut namespaces = tokio::fs::read_dir(&cache_dir).await?;
        while let Some(namespace) = namespaces.next_entry().await? {
            if !namespace.file_type().await?.is_dir() {
                continue;
            }
            let mut entries = tokio::fs::read_dir(namespace.path()).await?;
            while let Some(entry) = entries.next_entry().await? {
                if entry.file_type().await?.is_dir() {
                    stats.entry_count += 1;
                    stats.total_size_bytes += dir_size(&entry.path()).await?;
                }
            }
        }
        Ok(stats)
    }

    /// Deletes every cached snippet for one namespace. Returns whether
    /// anything was there to delete.
    pub async fn purge_namespace(
        &self,
        kind: RuntimeKind,
        namespace: &str,
    ) -> Result<bool, RunnerError> {
        validate_path_component("caller_namespace", namespace)?;

        let dir = kind.cache_dir(self.config.root_dir()).join(namespace);
        if !tokio::fs::try_exists(&dir).await? {
            return Ok(false);
        }
        log::info!("Purging code cache namespace {}", dir.display());
        tokio::fs::remove_dir_all(&dir).await?;
        Ok(true)
    }
}

async fn dir_size(dir: &Path) -> Result<u64, RunnerError> {
    let mut total = 0;
    let mut stack = vec![dir.to_path_buf()];
    while let Some(current) = stack.pop() {
        let mut entries = tokio::fs::read_dir(&current).await?;
        while let Some(entry) = entries.next_entry().await? {
            let file_type = entry.file_type().await?;
            if file_type.is_dir() {
                stack.push(entry.path());
            } else if file_type.is_file() {
                total += entry.metadata().await?.len();
            }
        }
    }
    Ok(total)
}
