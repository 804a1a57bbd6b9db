//! Node-to-hex assignment at every requested resolution.
//!
//! Only the finest resolution is computed from coordinates. Every
//! coarser cell is derived with `parent()` from the finest cell. Going
//! through lat/lon separately per resolution can disagree with the
//! parent hierarchy near cell boundaries and breaks the aggregator's
//! monotonicity guarantee, so it is never done here.

use crate::GridError;
use h3o::{LatLng, Resolution};
use hexreach_graph::CsrGraph;
use tracing::info;

/// Dense node-aligned `[N, R]` matrix of hex ids.
pub struct H3Matrix {
    resolutions: Vec<u8>,
    n_nodes: u32,
    cells: Vec<u64>,
}

impl H3Matrix {
    /// Requested resolutions, ascending (coarse to fine).
    pub fn resolutions(&self) -> &[u8] {
        &self.resolutions
    }

    pub fn n_nodes(&self) -> u32 {
        self.n_nodes
    }

    /// The hex containing `node` at `resolutions()[res_idx]`.
    #[inline]
    pub fn cell(&self, node: u32, res_idx: usize) -> u64 {
        self.cells[node as usize * self.resolutions.len() + res_idx]
    }
}

fn validated(resolutions: &[u8]) -> Result<Vec<Resolution>, GridError> {
    if resolutions.is_empty() {
        return Err(GridError::InvalidResolutions("empty list".to_string()));
    }
    if resolutions.windows(2).any(|w| w[0] >= w[1]) {
        return Err(GridError::InvalidResolutions(format!(
            "must be strictly ascending, got {resolutions:?}"
        )));
    }
    resolutions
        .iter()
        .map(|&r| {
            Resolution::try_from(r)
                .map_err(|_| GridError::InvalidResolutions(format!("resolution {r} out of range")))
        })
        .collect()
}

/// Indexes every graph node at the requested resolutions.
///
/// # Errors
///
/// - [`GridError::InvalidResolutions`] unless the list is non-empty,
///   strictly ascending, and within the grid's 0..=15 range.
/// - [`GridError::InvalidCoordinate`] for nodes outside WGS84 bounds
///   (a corrupt graph; healthy extracts cannot produce this).
pub fn index_nodes(graph: &CsrGraph, resolutions: &[u8]) -> Result<H3Matrix, GridError> {
    let resolved = validated(resolutions)?;
    let finest = *resolved.last().expect("validated non-empty");

    let n = graph.node_count();
    let mut cells = Vec::with_capacity(n as usize * resolved.len());
    for node in 0..n {
        let (lon, lat) = graph.node_lonlat(node);
        let latlng = LatLng::new(f64::from(lat), f64::from(lon))
            .map_err(|_| GridError::InvalidCoordinate { node })?;
        let fine_cell = latlng.to_cell(finest);
        for &res in &resolved {
            let cell = if res == finest {
                fine_cell
            } else {
                fine_cell.parent(res).ok_or(GridError::InvalidCell(fine_cell.into()))?
            };
            cells.push(cell.into());
        }
    }

    info!(nodes = n, resolutions = ?resolutions, "indexed nodes to hexes");
    Ok(H3Matrix {
        resolutions: resolutions.to_vec(),
        n_nodes: n,
        cells,
    })
}
