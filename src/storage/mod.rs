//! Object-store abstraction over the `input/`, `clean/`, `error/` and `done/`
//! prefixes of a single bucket.

mod gcs;
mod local;
mod memory;

pub use gcs::GcsStore;
pub use local::LocalStore;
pub use memory::MemoryStore;

use async_trait::async_trait;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::error::{PipelineError, Result};

/// Marker objects some tools create to keep an otherwise empty "folder".
const PLACEHOLDER_SUFFIX: &str = ".placeholder";

/// Flat key/value blob store. Keys are `/`-separated and never start with `/`.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// All keys under `prefix`, unfiltered.
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;

    /// Fetch `key` into the local file `dest`; returns the byte count.
    async fn download(&self, key: &str, dest: &Path) -> Result<u64>;

    /// Write the local file `src` to `key`, replacing any existing object.
    async fn upload(&self, src: &Path, key: &str) -> Result<u64>;

    async fn copy(&self, src: &str, dst: &str) -> Result<()>;

    async fn delete(&self, key: &str) -> Result<()>;

    async fn exists(&self, key: &str) -> Result<bool>;

    /// Location of `key` as understood by the table loader.
    fn uri(&self, key: &str) -> String;
}

/// Pseudo-directory markers and placeholder sentinels are not artifacts.
pub fn is_artifact_key(key: &str) -> bool {
    !key.is_empty() && !key.ends_with('/') && !key.ends_with(PLACEHOLDER_SUFFIX)
}

/// Artifacts under `prefix`, sorted so runs process files in a stable order.
pub async fn list_artifacts<S: ObjectStore + ?Sized>(store: &S, prefix: &str) -> Result<Vec<String>> {
    let mut keys: Vec<String> = store
        .list(prefix)
        .await?
        .into_iter()
        .filter(|k| k.starts_with(prefix) && is_artifact_key(k))
        .collect();
    keys.sort();
    keys.dedup();
    debug!(prefix, count = keys.len(), "listed artifacts");
    Ok(keys)
}

/// Normalise a prefix to the `name/` form.
pub fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{}/", trimmed)
    }
}

/// `clean/2024/a.csv` with `clean/` → `done/` gives `done/2024/a.csv`.
/// Only the leading prefix is swapped.
pub fn swap_prefix(key: &str, from: &str, to: &str) -> Option<String> {
    key.strip_prefix(from).map(|rest| format!("{}{}", to, rest))
}

/// `2024/sales.csv` → `2024/sales`.
pub fn strip_extension(relative: &str) -> &str {
    let name_start = relative.rfind('/').map(|i| i + 1).unwrap_or(0);
    match relative[name_start..].rfind('.') {
        Some(dot) if dot > 0 => &relative[..name_start + dot],
        _ => relative,
    }
}

/// Copy `src` to `dst`, confirm `dst` exists, then delete `src`.
///
/// Re-running after an interrupted move converges: a source that is already
/// gone with the destination present counts as moved, and a leftover source
/// simply overwrites the destination again.
#[tracing::instrument(level = "debug", skip(store))]
pub async fn move_artifact<S: ObjectStore + ?Sized>(store: &S, src: &str, dst: &str) -> Result<()> {
    if !store.exists(src).await? {
        if store.exists(dst).await? {
            warn!(src, dst, "source already gone and destination present; treating as moved");
            return Ok(());
        }
        return Err(PipelineError::storage("move", src, "source artifact not found"));
    }

    store.copy(src, dst).await?;
    if !store.exists(dst).await? {
        return Err(PipelineError::storage(
            "move",
            dst,
            "destination not visible after copy; source kept",
        ));
    }
    store.delete(src).await?;
    info!(src, dst, "moved artifact");
    Ok(())
}
