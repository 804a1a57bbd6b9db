//! Hexagonal-grid indexing and aggregation for k-best results.

mod aggregate;
mod indexer;
mod verify;

pub use aggregate::{HexRow, aggregate_to_hexes};
pub use indexer::{H3Matrix, index_nodes};
pub use verify::{VerifyReport, verify_rows};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GridError {
    #[error("invalid resolution list: {0}")]
    InvalidResolutions(String),
    #[error("node {node} has coordinates outside WGS84")]
    InvalidCoordinate { node: u32 },
    #[error("malformed hex id {0:#x}")]
    InvalidCell(u64),
    #[error("hex invariant violated: {0}")]
    InvariantViolation(String),
}
