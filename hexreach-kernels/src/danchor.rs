//! Nearest labeled POIs per anchor, one label at a time.
//!
//! The question is "how far is each anchor from the nearest POIs of
//! label ℓ", i.e. distances *to* the POIs. Running the sweep from all
//! POIs of the label over the *transposed* graph answers it for every
//! anchor in a single multi-source pass; the distinct dimension is the
//! POI, not the anchor.

use crate::config::RunConfig;
use crate::engine::{Seed, run_multi_source};
use crate::{KernelError, MAX_CUTOFF_SECONDS};
use hexreach_graph::CsrView;
use tracing::info;

/// Per-label runtime limits, resolved from the label-limits config.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct LabelLimits {
    /// Strict upper bound: reported seconds are `< max_seconds`.
    pub max_seconds: u32,
    /// POIs retained per anchor.
    pub top_k: usize,
}

/// A POI source for one label sweep. `poi_index` refers into the
/// caller's per-label POI list, which callers MUST order by ascending
/// `poi_id` so that index ties reproduce id ties.
#[derive(Debug, Copy, Clone)]
pub struct PoiSeed {
    pub node: u32,
    pub poi_index: u32,
}

/// One output row before POI ids are resolved.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct DAnchorRow {
    pub anchor_int_id: u32,
    pub rank: u8,
    pub poi_index: u32,
    pub seconds: u16,
}

/// Computes the per-anchor nearest POIs for one label.
///
/// `transpose` must be the view of the transposed graph; `anchors` are
/// `(node, anchor_int_id)` pairs. Anchors with no reachable POI under
/// the cap simply produce no rows. Rows come back sorted by
/// `(anchor_int_id, seconds, poi_index)`.
///
/// # Errors
///
/// - [`KernelError::NoSources`] when the label has no snapped POIs.
/// - [`KernelError::InvalidK`] / [`KernelError::InvalidCutoff`] on bad
///   limits.
/// - [`KernelError::Cancelled`] if the run was cancelled; no rows are
///   produced.
pub fn nearest_pois_per_anchor(
    transpose: CsrView<'_>,
    label_id: i32,
    pois: &[PoiSeed],
    anchors: &[(u32, u32)],
    limits: &LabelLimits,
    cfg: &RunConfig,
) -> Result<Vec<DAnchorRow>, KernelError> {
    if pois.is_empty() {
        return Err(KernelError::NoSources(label_id));
    }
    if limits.top_k < 1 || limits.top_k > usize::from(u8::MAX) {
        return Err(KernelError::InvalidK);
    }
    // Strictly-below semantics: a cap of M seconds admits at most M-1.
    if limits.max_seconds < 1 || limits.max_seconds - 1 > MAX_CUTOFF_SECONDS {
        return Err(KernelError::InvalidCutoff {
            primary: 0,
            overflow: limits.max_seconds,
        });
    }
    let cutoff = limits.max_seconds - 1;

    let mut seeds = Vec::with_capacity(pois.len());
    for poi in pois {
        let tag = i32::try_from(poi.poi_index).map_err(|_| {
            KernelError::InvariantViolation("poi index exceeds i32 tag space".to_string())
        })?;
        seeds.push(Seed {
            node: poi.node,
            tag,
        });
    }

    let table = run_multi_source(
        transpose,
        &seeds,
        limits.top_k,
        cutoff,
        cfg.bucket_width_log2,
        &cfg.cancel,
    )?;

    let mut rows = Vec::new();
    for &(node, anchor_int_id) in anchors {
        if node >= transpose.node_count() {
            continue;
        }
        for (rank, (tag, seconds)) in table.labels(node).enumerate() {
            rows.push(DAnchorRow {
                anchor_int_id,
                rank: u8::try_from(rank).expect("top_k bounded by u8"),
                poi_index: tag.cast_unsigned(),
                seconds,
            });
        }
    }
    rows.sort_by_key(|r| (r.anchor_int_id, r.seconds, r.poi_index));
    // Ranks were assigned per anchor before the global sort and remain
    // 0..count within each anchor because the per-anchor order is the
    // same (seconds, then poi).
    info!(
        label_id,
        sources = pois.len(),
        rows = rows.len(),
        "d-anchor sweep complete"
    );
    Ok(rows)
}
