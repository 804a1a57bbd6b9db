//! Compressed Sparse Row digraph storage.
//!
//! A graph is stored once in forward orientation as three flat arrays
//! (`indptr`, `indices`, `weights`) plus interleaved node positions.
//! The arrays are either owned (fresh build) or borrowed from memory maps
//! (cache load); all consumers go through [`CsrView`] so the kernels never
//! care which one they got.

use crate::{GraphError, TravelMode};
use memmap2::Mmap;
use zerocopy::FromBytes;

/// An immutable weighted digraph in CSR form.
///
/// Invariants (checked on construction):
/// - `indptr` has `N + 1` entries, is non-decreasing, and ends at `M`.
/// - every entry of `indices` is `< N`.
/// - `node_lonlat` has `2 * N` entries (lon, lat interleaved).
#[derive(Debug)]
pub struct CsrGraph {
    mode: TravelMode,
    n_nodes: u32,
    n_edges: u32,
    arrays: Arrays,
}

#[derive(Debug)]
enum Arrays {
    Owned {
        indptr: Vec<u32>,
        indices: Vec<u32>,
        weights: Vec<u32>,
        node_lonlat: Vec<f32>,
    },
    Mapped {
        indptr: Mmap,
        indices: Mmap,
        weights: Mmap,
        node_lonlat: Mmap,
    },
}

/// Borrowed CSR slices handed to the shortest-path kernels.
///
/// Copy-cheap; extracted once per kernel invocation so the hot loop
/// never branches on the storage backing.
#[derive(Copy, Clone)]
pub struct CsrView<'a> {
    pub indptr: &'a [u32],
    pub indices: &'a [u32],
    pub weights: &'a [u32],
}

impl<'a> CsrView<'a> {
    pub fn node_count(&self) -> u32 {
        debug_assert!(!self.indptr.is_empty());
        u32::try_from(self.indptr.len() - 1).expect("validated at graph construction")
    }

    /// Iterates the outgoing `(neighbor, weight_seconds)` pairs of `v`.
    #[inline]
    pub fn out_edges(&self, v: u32) -> impl Iterator<Item = (u32, u32)> + 'a {
        let start = self.indptr[v as usize] as usize;
        let end = self.indptr[v as usize + 1] as usize;
        self.indices[start..end]
            .iter()
            .copied()
            .zip(self.weights[start..end].iter().copied())
    }

    #[inline]
    pub fn out_degree(&self, v: u32) -> u32 {
        self.indptr[v as usize + 1] - self.indptr[v as usize]
    }
}

impl CsrGraph {
    /// Assembles a graph from an unsorted edge list via counting sort.
    ///
    /// The sort is stable: edges sharing a source keep their input order,
    /// which keeps builds reproducible from identical sources.
    pub fn from_edges(
        mode: TravelMode,
        node_lonlat: Vec<f32>,
        edges: &[(u32, u32, u32)],
    ) -> CsrGraph {
        let n = node_lonlat.len() / 2;
        let mut indptr = vec![0u32; n + 1];
        for &(src, _, _) in edges {
            indptr[src as usize + 1] += 1;
        }
        for i in 0..n {
            indptr[i + 1] += indptr[i];
        }

        let mut cursor: Vec<u32> = indptr[..n].to_vec();
        let mut indices = vec![0u32; edges.len()];
        let mut weights = vec![0u32; edges.len()];
        for &(src, dst, w) in edges {
            let at = cursor[src as usize] as usize;
            indices[at] = dst;
            weights[at] = w;
            cursor[src as usize] += 1;
        }

        let n_nodes = u32::try_from(n).expect("node count bounded by the loader");
        let n_edges = u32::try_from(edges.len()).expect("edge count bounded by the loader");
        CsrGraph {
            mode,
            n_nodes,
            n_edges,
            arrays: Arrays::Owned {
                indptr,
                indices,
                weights,
                node_lonlat,
            },
        }
    }

    /// Wraps memory-mapped cache files without copying.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::CacheCorrupt`] if any array has a length that
    /// is not a whole number of elements, or the arrays are mutually
    /// inconsistent (see the type-level invariants).
    pub(crate) fn from_maps(
        mode: TravelMode,
        indptr: Mmap,
        indices: Mmap,
        weights: Mmap,
        node_lonlat: Mmap,
    ) -> Result<CsrGraph, GraphError> {
        let ip = cast_u32(&indptr, "indptr")?;
        let ix = cast_u32(&indices, "indices")?;
        let ws = cast_u32(&weights, "weights")?;
        let ll = cast_f32(&node_lonlat, "node_lonlat")?;

        if ip.is_empty() {
            return Err(GraphError::CacheCorrupt("indptr is empty".to_string()));
        }
        let n = ip.len() - 1;
        let m = ix.len();
        if ws.len() != m {
            return Err(GraphError::CacheCorrupt(format!(
                "weights has {} entries but indices has {m}",
                ws.len()
            )));
        }
        if ll.len() != n * 2 {
            return Err(GraphError::CacheCorrupt(format!(
                "node_lonlat has {} entries for {n} nodes",
                ll.len()
            )));
        }
        if ip[0] != 0 || ip[n] as usize != m || ip.windows(2).any(|w| w[0] > w[1]) {
            return Err(GraphError::CacheCorrupt(
                "indptr is not a valid offset array".to_string(),
            ));
        }
        let n_nodes =
            u32::try_from(n).map_err(|_| GraphError::CacheCorrupt("node overflow".to_string()))?;
        if ix.iter().any(|&dst| dst >= n_nodes) {
            return Err(GraphError::CacheCorrupt(
                "edge target out of range".to_string(),
            ));
        }

        let n_edges =
            u32::try_from(m).map_err(|_| GraphError::CacheCorrupt("edge overflow".to_string()))?;
        Ok(CsrGraph {
            mode,
            n_nodes,
            n_edges,
            arrays: Arrays::Mapped {
                indptr,
                indices,
                weights,
                node_lonlat,
            },
        })
    }

    pub fn mode(&self) -> TravelMode {
        self.mode
    }

    pub fn node_count(&self) -> u32 {
        self.n_nodes
    }

    pub fn edge_count(&self) -> u32 {
        self.n_edges
    }

    pub fn indptr(&self) -> &[u32] {
        match &self.arrays {
            Arrays::Owned { indptr, .. } => indptr,
            Arrays::Mapped { indptr, .. } => {
                cast_u32(indptr, "indptr").expect("validated in from_maps")
            }
        }
    }

    pub fn indices(&self) -> &[u32] {
        match &self.arrays {
            Arrays::Owned { indices, .. } => indices,
            Arrays::Mapped { indices, .. } => {
                cast_u32(indices, "indices").expect("validated in from_maps")
            }
        }
    }

    pub fn weights(&self) -> &[u32] {
        match &self.arrays {
            Arrays::Owned { weights, .. } => weights,
            Arrays::Mapped { weights, .. } => {
                cast_u32(weights, "weights").expect("validated in from_maps")
            }
        }
    }

    /// Interleaved `[lon, lat, lon, lat, ...]` node positions.
    pub fn lonlat_flat(&self) -> &[f32] {
        match &self.arrays {
            Arrays::Owned { node_lonlat, .. } => node_lonlat,
            Arrays::Mapped { node_lonlat, .. } => {
                cast_f32(node_lonlat, "node_lonlat").expect("validated in from_maps")
            }
        }
    }

    #[inline]
    pub fn node_lonlat(&self, v: u32) -> (f32, f32) {
        let ll = self.lonlat_flat();
        (ll[v as usize * 2], ll[v as usize * 2 + 1])
    }

    #[inline]
    pub fn out_degree(&self, v: u32) -> u32 {
        self.view().out_degree(v)
    }

    pub fn view(&self) -> CsrView<'_> {
        CsrView {
            indptr: self.indptr(),
            indices: self.indices(),
            weights: self.weights(),
        }
    }

    /// Builds the transposed graph (every edge reversed) by counting sort.
    ///
    /// The result owns its arrays, shares the node positions, and is
    /// deterministic: reversed edges sharing a source appear in the order
    /// their forward counterparts are stored.
    pub fn transpose(&self) -> CsrGraph {
        let view = self.view();
        let n = self.n_nodes as usize;

        let mut indptr = vec![0u32; n + 1];
        for &dst in view.indices {
            indptr[dst as usize + 1] += 1;
        }
        for i in 0..n {
            indptr[i + 1] += indptr[i];
        }

        let mut cursor: Vec<u32> = indptr[..n].to_vec();
        let mut indices = vec![0u32; view.indices.len()];
        let mut weights = vec![0u32; view.indices.len()];
        for src in 0..n {
            let (start, end) = (view.indptr[src] as usize, view.indptr[src + 1] as usize);
            for e in start..end {
                let dst = view.indices[e] as usize;
                let at = cursor[dst] as usize;
                indices[at] = u32::try_from(src).expect("src < n_nodes");
                weights[at] = view.weights[e];
                cursor[dst] += 1;
            }
        }

        CsrGraph {
            mode: self.mode,
            n_nodes: self.n_nodes,
            n_edges: self.n_edges,
            arrays: Arrays::Owned {
                indptr,
                indices,
                weights,
                node_lonlat: self.lonlat_flat().to_vec(),
            },
        }
    }
}

fn cast_u32<'a>(bytes: &'a [u8], name: &str) -> Result<&'a [u32], GraphError> {
    <[u32]>::ref_from_bytes(bytes)
        .map_err(|_| GraphError::CacheCorrupt(format!("{name} is not a u32 array")))
}

fn cast_f32<'a>(bytes: &'a [u8], name: &str) -> Result<&'a [f32], GraphError> {
    <[f32]>::ref_from_bytes(bytes)
        .map_err(|_| GraphError::CacheCorrupt(format!("{name} is not an f32 array")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn diamond() -> CsrGraph {
        // 0 -> 1 (10), 0 -> 2 (20), 1 -> 3 (5), 2 -> 3 (5)
        let lonlat = vec![0.0; 8];
        CsrGraph::from_edges(
            TravelMode::Drive,
            lonlat,
            &[(0, 1, 10), (0, 2, 20), (1, 3, 5), (2, 3, 5)],
        )
    }

    #[test]
    fn csr_offsets_and_degrees() {
        let g = diamond();
        assert_eq!(g.node_count(), 4);
        assert_eq!(g.edge_count(), 4);
        assert_eq!(g.indptr(), &[0, 2, 3, 4, 4]);
        assert_eq!(g.out_degree(0), 2);
        assert_eq!(g.out_degree(3), 0);

        let out: Vec<_> = g.view().out_edges(0).collect();
        assert_eq!(out, vec![(1, 10), (2, 20)]);
    }

    #[test]
    fn transpose_reverses_every_edge() {
        let g = diamond();
        let t = g.transpose();
        assert_eq!(t.node_count(), 4);
        assert_eq!(t.edge_count(), 4);

        let into_3: Vec<_> = t.view().out_edges(3).collect();
        assert_eq!(into_3, vec![(1, 5), (2, 5)]);
        assert_eq!(t.out_degree(0), 0);

        // Transposing twice restores the forward adjacency.
        let tt = t.transpose();
        assert_eq!(tt.indptr(), g.indptr());
        assert_eq!(tt.indices(), g.indices());
        assert_eq!(tt.weights(), g.weights());
    }
}
