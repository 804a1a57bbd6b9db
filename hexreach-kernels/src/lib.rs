//! Shortest-path kernels for the hexreach travel-time engine.
//!
//! The shared machinery is a multi-source bucketed Dijkstra over small
//! integer weights (seconds) that keeps, per node, the K best labels to
//! K *distinct* tags. The k-best kernel runs it forward with anchor ids
//! as tags; the D_anchor kernel runs it on the transpose with POI
//! indices as tags.

pub mod bucket;
pub mod config;
pub mod danchor;
pub mod engine;
pub mod kbest;
pub mod topk;

use thiserror::Error;

pub use config::{CancelFlag, RunConfig};
pub use danchor::{DAnchorRow, LabelLimits, nearest_pois_per_anchor};
pub use kbest::{KBestResult, k_best_to_anchors};

/// Travel seconds meaning "unreachable under the cutoff".
///
/// This value never appears in persisted output; rows that would carry
/// it are omitted instead.
pub const SENTINEL_SECONDS: u16 = 0xFFFF;

/// Tag paired with [`SENTINEL_SECONDS`] in padded rows.
pub const SENTINEL_TAG: i32 = -1;

/// Largest representable cutoff: one below the sentinel.
pub const MAX_CUTOFF_SECONDS: u32 = (SENTINEL_SECONDS as u32) - 1;

#[derive(Debug, Error)]
pub enum KernelError {
    #[error("K must be at least 1 (and at most 255 for ranked output)")]
    InvalidK,
    #[error("cutoffs must satisfy primary <= overflow <= {MAX_CUTOFF_SECONDS}; got primary={primary}, overflow={overflow}")]
    InvalidCutoff { primary: u32, overflow: u32 },
    #[error("label {0} has no snapped sources")]
    NoSources(i32),
    #[error("run cancelled")]
    Cancelled,
    #[error("kernel invariant violated: {0}")]
    InvariantViolation(String),
}
