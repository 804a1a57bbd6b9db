//! The shared multi-source bucketed Dijkstra.
//!
//! Both kernels are thin wrappers over [`run_multi_source`]: the k-best
//! kernel seeds anchor tags on the forward graph, the D_anchor kernel
//! seeds POI tags on the transpose. The engine is single-threaded by
//! design; the frontier is shared state, and distinct-tag correctness
//! depends on every relaxation seeing the same label table.

use crate::bucket::{BucketQueue, QueueEntry};
use crate::config::CancelFlag;
use crate::topk::TopKTable;
use crate::{KernelError, SENTINEL_SECONDS};
use hexreach_graph::CsrView;
use tracing::warn;

/// A seed: `tag` starts at `node` with distance zero.
#[derive(Debug, Copy, Clone)]
pub struct Seed {
    pub node: u32,
    pub tag: i32,
}

/// Runs the k-best multi-source sweep up to `cutoff_s` inclusive.
///
/// Seeds outside the node range are skipped with a warning rather than
/// failing the run. Cancellation is polled once per drained bucket.
///
/// # Errors
///
/// - [`KernelError::Cancelled`] if the cancel flag was raised.
/// - [`KernelError::InvariantViolation`] if the final table fails its
///   structural self-check (a bug, not an input problem).
pub fn run_multi_source(
    view: CsrView<'_>,
    seeds: &[Seed],
    k: usize,
    cutoff_s: u32,
    bucket_width_log2: u8,
    cancel: &CancelFlag,
) -> Result<TopKTable, KernelError> {
    debug_assert!(cutoff_s < u32::from(SENTINEL_SECONDS));
    let n = view.node_count();
    let mut table = TopKTable::new(n as usize, k);
    let mut queue = BucketQueue::new(bucket_width_log2, cutoff_s);

    for seed in seeds {
        if seed.node >= n {
            warn!(node = seed.node, tag = seed.tag, "seed outside graph, skipped");
            continue;
        }
        if table.offer(seed.node, seed.tag, 0) {
            queue.push(QueueEntry {
                node: seed.node,
                tag: seed.tag,
                seconds: 0,
            });
        }
    }

    let mut last_bucket = 0usize;
    while let Some(QueueEntry { node, tag, seconds }) = queue.pop() {
        if queue.current_bucket() != last_bucket {
            last_bucket = queue.current_bucket();
            if cancel.is_cancelled() {
                return Err(KernelError::Cancelled);
            }
        }

        // Evicted or improved since it was queued.
        let stored = u16::try_from(seconds).expect("bounded by cutoff");
        if !table.is_current(node, tag, stored) {
            continue;
        }

        for (next, weight) in view.out_edges(node) {
            if next == node {
                // Self-loops are tolerated in the graph, ignored here.
                continue;
            }
            let reached = seconds + weight;
            if reached > cutoff_s {
                continue;
            }
            let reached_u16 = u16::try_from(reached).expect("bounded by cutoff");
            if table.offer(next, tag, reached_u16) {
                queue.push(QueueEntry {
                    node: next,
                    tag,
                    seconds: reached,
                });
            }
        }
    }

    if cancel.is_cancelled() {
        return Err(KernelError::Cancelled);
    }
    for node in 0..n {
        table
            .check_node(node)
            .map_err(KernelError::InvariantViolation)?;
    }
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hexreach_graph::{CsrGraph, TravelMode};

    fn graph(n: usize, edges: &[(u32, u32, u32)]) -> CsrGraph {
        CsrGraph::from_edges(TravelMode::Drive, vec![0.0; n * 2], edges)
    }

    fn seeds(pairs: &[(u32, i32)]) -> Vec<Seed> {
        pairs.iter().map(|&(node, tag)| Seed { node, tag }).collect()
    }

    #[test]
    fn single_source_distances_on_a_path() {
        // 0 -60- 1 -60- 2 -60- 3
        let g = graph(
            4,
            &[
                (0, 1, 60),
                (1, 0, 60),
                (1, 2, 60),
                (2, 1, 60),
                (2, 3, 60),
                (3, 2, 60),
            ],
        );
        let t = run_multi_source(
            g.view(),
            &seeds(&[(0, 0)]),
            2,
            3600,
            2,
            &CancelFlag::new(),
        )
        .unwrap();
        assert_eq!(t.labels(0).collect::<Vec<_>>(), vec![(0, 0)]);
        assert_eq!(t.labels(2).collect::<Vec<_>>(), vec![(0, 120)]);
        assert_eq!(t.labels(3).collect::<Vec<_>>(), vec![(0, 180)]);
    }

    #[test]
    fn cutoff_truncates_propagation() {
        let g = graph(3, &[(0, 1, 100), (1, 2, 100)]);
        let t = run_multi_source(
            g.view(),
            &seeds(&[(0, 0)]),
            1,
            150,
            2,
            &CancelFlag::new(),
        )
        .unwrap();
        assert_eq!(t.labels(1).collect::<Vec<_>>(), vec![(0, 100)]);
        assert_eq!(t.labels(2).count(), 0);
    }

    #[test]
    fn k_distinct_tags_with_deterministic_tie_order() {
        // Two anchors both 100 s from node 2.
        let g = graph(3, &[(0, 2, 100), (1, 2, 100)]);
        let t = run_multi_source(
            g.view(),
            &seeds(&[(0, 0), (1, 1)]),
            2,
            3600,
            2,
            &CancelFlag::new(),
        )
        .unwrap();
        assert_eq!(t.labels(2).collect::<Vec<_>>(), vec![(0, 100), (1, 100)]);
    }

    #[test]
    fn better_path_replaces_worse_label_for_same_tag() {
        // Direct 0->2 is 300, the detour via 1 is 120.
        let g = graph(3, &[(0, 2, 300), (0, 1, 60), (1, 2, 60)]);
        let t = run_multi_source(g.view(), &seeds(&[(0, 0)]), 2, 3600, 2, &CancelFlag::new())
            .unwrap();
        assert_eq!(t.labels(2).collect::<Vec<_>>(), vec![(0, 120)]);
    }

    #[test]
    fn out_of_range_seed_is_skipped_not_fatal() {
        let g = graph(2, &[(0, 1, 10)]);
        let t = run_multi_source(
            g.view(),
            &seeds(&[(7, 0), (0, 1)]),
            1,
            3600,
            2,
            &CancelFlag::new(),
        )
        .unwrap();
        assert_eq!(t.labels(1).collect::<Vec<_>>(), vec![(1, 10)]);
    }

    #[test]
    fn pre_cancelled_run_reports_cancellation() {
        let g = graph(2, &[(0, 1, 10)]);
        let cancel = CancelFlag::new();
        cancel.cancel();
        // A tiny run may drain before the first bucket boundary; the
        // final check still reports the cancellation.
        assert!(matches!(
            run_multi_source(g.view(), &seeds(&[(0, 0)]), 1, 3600, 2, &cancel),
            Err(KernelError::Cancelled)
        ));
    }

    #[test]
    fn disconnected_component_stays_unlabelled() {
        let g = graph(4, &[(0, 1, 30), (1, 0, 30), (2, 3, 30), (3, 2, 30)]);
        let t = run_multi_source(g.view(), &seeds(&[(0, 0)]), 2, 3600, 2, &CancelFlag::new())
            .unwrap();
        assert_eq!(t.labels(2).count(), 0);
        assert_eq!(t.labels(3).count(), 0);
    }
}
