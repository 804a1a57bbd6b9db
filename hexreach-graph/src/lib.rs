#![doc = include_str!("../README.md")]

pub mod cache;
pub mod csr;
pub mod loader;
pub mod profile;
pub mod snap;

use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use thiserror::Error;

pub use cache::GraphCache;
pub use csr::{CsrGraph, CsrView};
pub use snap::SnapIndex;

/// Travel mode a graph was built for.
///
/// The mode selects the profile (kept ways, speeds, one-way handling)
/// and keys the on-disk cache. Anchors and kernel outputs are never mixed
/// across modes.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TravelMode {
    Drive,
    Walk,
}

impl TravelMode {
    pub const fn as_str(self) -> &'static str {
        match self {
            TravelMode::Drive => "drive",
            TravelMode::Walk => "walk",
        }
    }
}

impl Display for TravelMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TravelMode {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "drive" => Ok(TravelMode::Drive),
            "walk" => Ok(TravelMode::Walk),
            other => Err(GraphError::ProfileMissing(other.to_string())),
        }
    }
}

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("source file not found: {}", .0.display())]
    SourceMissing(PathBuf),
    #[error("source file could not be parsed: {0}")]
    SourceUnreadable(String),
    #[error("graph cache is corrupt: {0}")]
    CacheCorrupt(String),
    #[error("unknown mode profile: {0}")]
    ProfileMissing(String),
    #[error("graph cache is locked by another writer")]
    CacheLocked,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("metadata error: {0}")]
    Meta(#[from] serde_json::Error),
}

impl From<osmpbf::Error> for GraphError {
    fn from(e: osmpbf::Error) -> Self {
        GraphError::SourceUnreadable(e.to_string())
    }
}
