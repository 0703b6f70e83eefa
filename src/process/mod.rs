// src/process/mod.rs
pub mod classify;
pub mod date_parser;
pub mod policy;
pub mod raw_table;
pub mod utils;
pub mod validate;
pub mod write;

use std::path::Path;
use tracing::debug;

use crate::error::Result;
use classify::{classify, Classification};
use policy::ValidationPolicy;
use raw_table::RawTable;
use validate::validate;

/// A decoded input file together with its row classification.
#[derive(Debug, Clone)]
pub struct CleanedFile {
    pub raw: RawTable,
    pub classification: Classification,
}

impl CleanedFile {
    pub fn accepted_rows(&self) -> usize {
        self.classification.accepted_rows()
    }

    pub fn rejected_rows(&self) -> usize {
        self.classification.rejected_rows()
    }
}

/// Decode, validate and classify a staged CSV file.
///
/// Any error here means the file as a whole cannot be trusted; callers route
/// the original bytes to `error/`.
#[tracing::instrument(level = "debug", skip(path, policy), fields(path = %path.display()))]
pub fn clean_file(path: &Path, key: &str, policy: &ValidationPolicy) -> Result<CleanedFile> {
    let raw = RawTable::from_path(path, key)?;
    let validated = validate(&raw, policy)?;
    let classification = classify(&validated)?;
    debug!(
        rows = raw.num_rows(),
        accepted = classification.accepted_rows(),
        rejected = classification.rejected_rows(),
        "classified"
    );
    Ok(CleanedFile {
        raw,
        classification,
    })
}
