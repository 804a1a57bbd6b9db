//! Per-run label manifest.
//!
//! One JSON line per processed label, appended as labels finish so a
//! killed run still documents what it completed.

use crate::StoreError;
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelStatus {
    Written,
    Skipped,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, Serialize)]
pub struct LabelOutcome {
    pub label_id: i32,
    pub status: LabelStatus,
    pub rows_written: usize,
    pub sssp_seconds: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

pub struct ManifestWriter {
    file: File,
}

impl ManifestWriter {
    /// Opens (appending) `manifest.jsonl` under `out_root`.
    ///
    /// # Errors
    ///
    /// I/O failures creating the root or the file.
    pub fn open(out_root: &Path) -> Result<ManifestWriter, StoreError> {
        std::fs::create_dir_all(out_root)?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(out_root.join("manifest.jsonl"))?;
        Ok(ManifestWriter { file })
    }

    /// # Errors
    ///
    /// Serialization or write failures.
    pub fn record(&mut self, outcome: &LabelOutcome) -> Result<(), StoreError> {
        let mut line = serde_json::to_vec(outcome)?;
        line.push(b'\n');
        self.file.write_all(&line)?;
        self.file.flush()?;
        Ok(())
    }
}
