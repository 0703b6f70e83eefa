//! Scoped local scratch space. Every staged file is deleted when its handle
//! drops, whichever way the per-file processing exits.

use std::path::{Path, PathBuf};
use tempfile::{Builder, NamedTempFile, TempDir};

use crate::error::Result;

#[derive(Debug)]
pub struct StagingArea {
    dir: TempDir,
}

impl StagingArea {
    /// Create a private directory under `root`, or under the system temp dir.
    pub fn new(root: Option<&Path>) -> Result<Self> {
        let builder = {
            let mut b = Builder::new();
            b.prefix("transloader-");
            b
        };
        let dir = match root {
            Some(root) => {
                std::fs::create_dir_all(root)?;
                builder.tempdir_in(root)?
            }
            None => builder.tempdir()?,
        };
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// A fresh, empty file whose name hints at the artifact it holds.
    pub fn stage(&self, key: &str) -> Result<NamedTempFile> {
        let hint: String = key
            .rsplit('/')
            .next()
            .unwrap_or("artifact")
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '.' { c } else { '_' })
            .take(48)
            .collect();
        let file = Builder::new()
            .prefix(&format!("{}-", hint))
            .suffix(".csv")
            .tempfile_in(self.dir.path())?;
        Ok(file)
    }

    /// Paths still present in the area; empty once all handles are dropped.
    pub fn leftovers(&self) -> Result<Vec<PathBuf>> {
        let mut out = Vec::new();
        for entry in std::fs::read_dir(self.dir.path())? {
            out.push(entry?.path());
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn staged_files_are_removed_on_drop() {
        let area = StagingArea::new(None).unwrap();
        let path = {
            let mut f = area.stage("input/2024/sales report.csv").unwrap();
            writeln!(f, "a,b").unwrap();
            let name = f.path().file_name().unwrap().to_string_lossy().to_string();
            assert!(name.starts_with("sales_report.csv-"));
            f.path().to_path_buf()
        };
        assert!(!path.exists());
        assert!(area.leftovers().unwrap().is_empty());
    }

    #[test]
    fn area_is_removed_on_drop() {
        let root = tempfile::tempdir().unwrap();
        let area = StagingArea::new(Some(root.path())).unwrap();
        let dir = area.path().to_path_buf();
        let _f = area.stage("k.csv").unwrap();
        drop(_f);
        drop(area);
        assert!(!dir.exists());
    }
}
