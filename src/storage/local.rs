use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use walkdir::WalkDir;

use super::ObjectStore;
use crate::error::{PipelineError, Result};

/// A directory tree used as a bucket: key `clean/a.csv` is `<root>/clean/a.csv`.
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self {
            root: root.canonicalize()?,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_of(&self, key: &str) -> Result<PathBuf> {
        let rel = Path::new(key);
        if rel
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(PipelineError::storage("resolve", key, "key escapes the store root"));
        }
        Ok(self.root.join(rel))
    }

    async fn ensure_parent(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for LocalStore {
    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let root = self.root.clone();
        let prefix = prefix.to_string();
        // walkdir is blocking
        tokio::task::spawn_blocking(move || {
            let mut keys = Vec::new();
            for entry in WalkDir::new(&root).follow_links(false) {
                let entry = entry.map_err(|e| PipelineError::storage("list", &prefix, e))?;
                if !entry.file_type().is_file() {
                    continue;
                }
                let Ok(rel) = entry.path().strip_prefix(&root) else {
                    continue;
                };
                let key = rel
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                if key.starts_with(&prefix) {
                    keys.push(key);
                }
            }
            Ok::<_, PipelineError>(keys)
        })
        .await
        .map_err(|e| PipelineError::storage("list", "", e))?
    }

    async fn download(&self, key: &str, dest: &Path) -> Result<u64> {
        let src = self.path_of(key)?;
        fs::copy(&src, dest)
            .await
            .map_err(|e| PipelineError::storage("download", key, e))
    }

    async fn upload(&self, src: &Path, key: &str) -> Result<u64> {
        let dst = self.path_of(key)?;
        Self::ensure_parent(&dst).await?;
        fs::copy(src, &dst)
            .await
            .map_err(|e| PipelineError::storage("upload", key, e))
    }

    async fn copy(&self, src: &str, dst: &str) -> Result<()> {
        let from = self.path_of(src)?;
        let to = self.path_of(dst)?;
        Self::ensure_parent(&to).await?;
        fs::copy(&from, &to)
            .await
            .map_err(|e| PipelineError::storage("copy", src, e))?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = self.path_of(key)?;
        fs::remove_file(&path)
            .await
            .map_err(|e| PipelineError::storage("delete", key, e))
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let path = self.path_of(key)?;
        Ok(fs::try_exists(&path).await?)
    }

    fn uri(&self, key: &str) -> String {
        self.root.join(key).display().to_string()
    }
}
