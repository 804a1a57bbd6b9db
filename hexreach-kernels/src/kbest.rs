//! K-best travel times from every node to its K nearest anchors.

use crate::config::RunConfig;
use crate::engine::{Seed, run_multi_source};
use crate::topk::TopKTable;
use crate::{KernelError, SENTINEL_SECONDS, SENTINEL_TAG};
use fixedbitset::FixedBitSet;
use hexreach_graph::CsrView;
use tracing::info;

/// An anchor seed: the graph node an anchor site lives on, plus its
/// dense integer id.
#[derive(Debug, Copy, Clone)]
pub struct AnchorSeed {
    pub node: u32,
    pub anchor_int_id: u32,
}

/// Per-node K-best labels plus the primary-cutoff confidence flags.
pub struct KBestResult {
    k: usize,
    table: TopKTable,
    exceeded_primary: FixedBitSet,
}

impl KBestResult {
    pub fn k(&self) -> usize {
        self.k
    }

    pub fn n_nodes(&self) -> usize {
        self.table.n_nodes()
    }

    /// Labels of `node`, ascending, without sentinel padding.
    pub fn labels(&self, node: u32) -> impl Iterator<Item = (i32, u16)> + '_ {
        self.table.labels(node)
    }

    /// The fixed-width row: labels padded to K with sentinels.
    pub fn padded_row(&self, node: u32) -> Vec<(i32, u16)> {
        let mut row: Vec<(i32, u16)> = self.labels(node).collect();
        row.resize(self.k, (SENTINEL_TAG, SENTINEL_SECONDS));
        row
    }

    /// Whether `node` found fewer than K anchors inside the primary
    /// cutoff (its K-th label, if any, lives in the overflow band).
    pub fn exceeded_primary(&self, node: u32) -> bool {
        self.exceeded_primary.contains(node as usize)
    }
}

/// Runs the k-best kernel over the forward graph.
///
/// # Errors
///
/// - [`KernelError::InvalidK`] / [`KernelError::InvalidCutoff`] on bad
///   parameters.
/// - [`KernelError::Cancelled`] if the run's cancel flag is raised.
/// - [`KernelError::InvariantViolation`] on an internal bug.
pub fn k_best_to_anchors(
    view: CsrView<'_>,
    anchors: &[AnchorSeed],
    cfg: &RunConfig,
) -> Result<KBestResult, KernelError> {
    cfg.validate()?;

    let mut seeds = Vec::with_capacity(anchors.len());
    for a in anchors {
        let tag = i32::try_from(a.anchor_int_id).map_err(|_| {
            KernelError::InvariantViolation("anchor id exceeds i32 tag space".to_string())
        })?;
        seeds.push(Seed { node: a.node, tag });
    }

    let table = run_multi_source(
        view,
        &seeds,
        cfg.k,
        cfg.overflow_cutoff_s,
        cfg.bucket_width_log2,
        &cfg.cancel,
    )?;

    let n = table.n_nodes();
    let mut exceeded_primary = FixedBitSet::with_capacity(n);
    for node in 0..u32::try_from(n).expect("node count fits u32") {
        if table.count_within(node, cfg.primary_cutoff_s) < cfg.k {
            exceeded_primary.insert(node as usize);
        }
    }

    info!(
        anchors = anchors.len(),
        nodes = n,
        k = cfg.k,
        flagged = exceeded_primary.count_ones(..),
        "k-best sweep complete"
    );
    Ok(KBestResult {
        k: cfg.k,
        table,
        exceeded_primary,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CancelFlag;
    use hexreach_graph::{CsrGraph, TravelMode};

    fn cfg(k: usize, primary: u32, overflow: u32) -> RunConfig {
        RunConfig {
            k,
            primary_cutoff_s: primary,
            overflow_cutoff_s: overflow,
            bucket_width_log2: 2,
            workers: 1,
            cancel: CancelFlag::new(),
        }
    }

    fn path_graph() -> CsrGraph {
        // 0 -60- 1 -60- 2 -60- 3, bidirectional
        CsrGraph::from_edges(
            TravelMode::Drive,
            vec![0.0; 8],
            &[
                (0, 1, 60),
                (1, 0, 60),
                (1, 2, 60),
                (2, 1, 60),
                (2, 3, 60),
                (3, 2, 60),
            ],
        )
    }

    #[test]
    fn path_with_one_anchor_pads_with_sentinels() {
        let g = path_graph();
        let result = k_best_to_anchors(
            g.view(),
            &[AnchorSeed {
                node: 0,
                anchor_int_id: 0,
            }],
            &cfg(2, 1800, 3600),
        )
        .unwrap();

        assert_eq!(
            result.padded_row(2),
            vec![(0, 120), (SENTINEL_TAG, SENTINEL_SECONDS)]
        );
        // The seeding anchor is its own node's first label at zero.
        assert_eq!(result.padded_row(0)[0], (0, 0));
    }

    #[test]
    fn tie_between_anchors_orders_by_anchor_id() {
        let g = CsrGraph::from_edges(
            TravelMode::Drive,
            vec![0.0; 6],
            &[(0, 2, 100), (1, 2, 100)],
        );
        let result = k_best_to_anchors(
            g.view(),
            &[
                AnchorSeed {
                    node: 0,
                    anchor_int_id: 0,
                },
                AnchorSeed {
                    node: 1,
                    anchor_int_id: 1,
                },
            ],
            &cfg(2, 1800, 3600),
        )
        .unwrap();
        assert_eq!(
            result.labels(2).collect::<Vec<_>>(),
            vec![(0, 100), (1, 100)]
        );
    }

    #[test]
    fn primary_flag_marks_thin_coverage() {
        let g = path_graph();
        // Primary 90 s: node 3 reaches its only anchor in 180 s.
        let result = k_best_to_anchors(
            g.view(),
            &[AnchorSeed {
                node: 0,
                anchor_int_id: 0,
            }],
            &cfg(1, 90, 3600),
        )
        .unwrap();
        assert!(!result.exceeded_primary(1));
        assert!(result.exceeded_primary(3));
        // Label still present, merely flagged.
        assert_eq!(result.labels(3).collect::<Vec<_>>(), vec![(0, 180)]);
    }

    #[test]
    fn overflow_cutoff_drops_far_nodes_entirely() {
        let g = path_graph();
        let result = k_best_to_anchors(
            g.view(),
            &[AnchorSeed {
                node: 0,
                anchor_int_id: 0,
            }],
            &cfg(1, 60, 130),
        )
        .unwrap();
        assert_eq!(result.labels(2).collect::<Vec<_>>(), vec![(0, 120)]);
        assert_eq!(result.labels(3).count(), 0);
    }

    #[test]
    fn rejects_bad_parameters() {
        let g = path_graph();
        let anchor = AnchorSeed {
            node: 0,
            anchor_int_id: 0,
        };
        assert!(matches!(
            k_best_to_anchors(g.view(), &[anchor], &cfg(0, 10, 20)),
            Err(KernelError::InvalidK)
        ));
        assert!(matches!(
            k_best_to_anchors(g.view(), &[anchor], &cfg(1, 50, 20)),
            Err(KernelError::InvalidCutoff { .. })
        ));
    }
}
