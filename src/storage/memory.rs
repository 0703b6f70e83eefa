use async_trait::async_trait;
use std::{
    collections::BTreeMap,
    path::Path,
    sync::{Mutex, MutexGuard, PoisonError},
};

use super::ObjectStore;
use crate::error::{PipelineError, Result};

/// In-process object store. Used by tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    objects: Mutex<BTreeMap<String, Vec<u8>>>,
    /// Writes under these prefixes report success but store nothing.
    blackholes: Mutex<Vec<String>>,
    /// Writes under these prefixes fail.
    refused: Mutex<Vec<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn objects(&self) -> MutexGuard<'_, BTreeMap<String, Vec<u8>>> {
        self.objects.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn swallowed(&self, key: &str) -> bool {
        matches_prefix(&self.blackholes, key)
    }

    pub fn put_bytes(&self, key: &str, bytes: &[u8]) {
        self.objects().insert(key.to_string(), bytes.to_vec());
    }

    pub fn get_bytes(&self, key: &str) -> Option<Vec<u8>> {
        self.objects().get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        self.objects().keys().cloned().collect()
    }

    /// Simulate an eventually-consistent or failing backend for `prefix`.
    pub fn drop_writes_to(&self, prefix: &str) {
        self.blackholes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(prefix.to_string());
    }

    /// Make every write under `prefix` fail with a storage error.
    pub fn refuse_writes_to(&self, prefix: &str) {
        self.refused
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(prefix.to_string());
    }

    fn write(&self, op: &'static str, key: &str, bytes: Vec<u8>) -> Result<()> {
        if matches_prefix(&self.refused, key) {
            return Err(PipelineError::storage(op, key, "write refused"));
        }
        if !self.swallowed(key) {
            self.objects().insert(key.to_string(), bytes);
        }
        Ok(())
    }
}

fn matches_prefix(prefixes: &Mutex<Vec<String>>, key: &str) -> bool {
    prefixes
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .iter()
        .any(|p| key.starts_with(p.as_str()))
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .objects()
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect())
    }

    async fn download(&self, key: &str, dest: &Path) -> Result<u64> {
        let bytes = self
            .get_bytes(key)
            .ok_or_else(|| PipelineError::storage("download", key, "no such object"))?;
        tokio::fs::write(dest, &bytes).await?;
        Ok(bytes.len() as u64)
    }

    async fn upload(&self, src: &Path, key: &str) -> Result<u64> {
        let bytes = tokio::fs::read(src).await?;
        let len = bytes.len() as u64;
        self.write("upload", key, bytes)?;
        Ok(len)
    }

    async fn copy(&self, src: &str, dst: &str) -> Result<()> {
        let bytes = self
            .get_bytes(src)
            .ok_or_else(|| PipelineError::storage("copy", src, "no such object"))?;
        self.write("copy", dst, bytes)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.objects()
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| PipelineError::storage("delete", key, "no such object"))
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.objects().contains_key(key))
    }

    fn uri(&self, key: &str) -> String {
        format!("mem://{}", key)
    }
}
