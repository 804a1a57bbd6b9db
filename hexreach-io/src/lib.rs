//! Columnar I/O for the hexreach engine: POI tables in, anchor tables,
//! T_hex rows, and D_anchor shards out, plus the per-run label manifest.
//!
//! All writes are atomic: data lands in a `.tmp` sibling, is fsynced,
//! and a rename publishes it. Consumers never observe partial files.

pub mod anchor_store;
pub mod danchor_store;
pub mod labels;
pub mod manifest;
pub mod poi;
pub mod thex;
mod util;

use std::path::PathBuf;
use thiserror::Error;

pub use labels::LabelLimitsTable;
pub use manifest::{LabelOutcome, LabelStatus, ManifestWriter};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),
    #[error("arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("table at {} is missing column {column}", .path.display())]
    MissingColumn { path: PathBuf, column: &'static str },
    #[error("unexpected schema: {0}")]
    Schema(String),
    #[error(
        "implausible speed in label {label_id}: anchor {anchor_int_id} to poi {poi_id:#034x} \
         covers {meters:.0} m in {seconds} s ({implied_kmh:.0} km/h)"
    )]
    ImplausibleSpeed {
        label_id: i32,
        anchor_int_id: u32,
        poi_id: u128,
        meters: f64,
        seconds: u16,
        implied_kmh: f64,
    },
}
