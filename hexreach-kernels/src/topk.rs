//! Per-node bounded label lists.
//!
//! One flat pair of arrays for all nodes, preallocated up front, because
//! per-node heap allocations fragmented the predecessor of this engine
//! into irrelevance. Each node's slice is kept sorted ascending by
//! `(seconds, tag)` with sentinel padding at the tail, so membership
//! checks, staleness checks, and final extraction are all linear scans
//! over at most K elements.

use crate::{SENTINEL_SECONDS, SENTINEL_TAG};

/// Composite sort key; sentinels order after every real label because
/// real seconds never reach [`SENTINEL_SECONDS`].
#[inline]
fn key(seconds: u16, tag: i32) -> u64 {
    (u64::from(seconds) << 32) | u64::from(tag.cast_unsigned())
}

/// K best distinct-tag labels for every node of a graph.
pub struct TopKTable {
    k: usize,
    tags: Vec<i32>,
    seconds: Vec<u16>,
}

impl TopKTable {
    pub fn new(n_nodes: usize, k: usize) -> TopKTable {
        assert!(k >= 1, "K must be positive");
        TopKTable {
            k,
            tags: vec![SENTINEL_TAG; n_nodes * k],
            seconds: vec![SENTINEL_SECONDS; n_nodes * k],
        }
    }

    pub fn k(&self) -> usize {
        self.k
    }

    pub fn n_nodes(&self) -> usize {
        self.tags.len() / self.k
    }

    #[inline]
    fn range(&self, node: u32) -> std::ops::Range<usize> {
        let start = node as usize * self.k;
        start..start + self.k
    }

    /// Offers a label to `node`'s list.
    ///
    /// Accepted iff the tag is absent and the label beats the current
    /// worst (or a free slot remains), or the tag is present with worse
    /// seconds (updated in place). Returns whether the label entered the
    /// list, i.e. whether it is worth propagating further.
    pub fn offer(&mut self, node: u32, tag: i32, seconds: u16) -> bool {
        debug_assert!(tag >= 0 && seconds < SENTINEL_SECONDS);
        let r = self.range(node);
        let (tags, secs) = (&mut self.tags[r.clone()], &mut self.seconds[r]);

        // Remove a worse duplicate of this tag; reject if the resident
        // entry is at least as good.
        if let Some(i) = tags.iter().position(|&t| t == tag) {
            if secs[i] <= seconds {
                return false;
            }
            // Shift the tail left over the removed entry.
            for j in i..self.k - 1 {
                tags[j] = tags[j + 1];
                secs[j] = secs[j + 1];
            }
            tags[self.k - 1] = SENTINEL_TAG;
            secs[self.k - 1] = SENTINEL_SECONDS;
        } else if key(seconds, tag) >= key(secs[self.k - 1], tags[self.k - 1]) {
            // Full, and the candidate does not beat the worst resident.
            return false;
        }

        // Sorted insertion; the worst resident (possibly a sentinel)
        // falls off the end.
        let at = tags
            .iter()
            .zip(secs.iter())
            .position(|(&t, &s)| key(seconds, tag) < key(s, t))
            .expect("candidate beats at least the tail entry");
        for j in (at..self.k - 1).rev() {
            tags[j + 1] = tags[j];
            secs[j + 1] = secs[j];
        }
        tags[at] = tag;
        secs[at] = seconds;
        true
    }

    /// Whether `(tag, seconds)` is currently resident, exactly.
    /// Used to discard stale queue entries on pop.
    #[inline]
    pub fn is_current(&self, node: u32, tag: i32, seconds: u16) -> bool {
        let r = self.range(node);
        self.tags[r.clone()]
            .iter()
            .zip(self.seconds[r].iter())
            .any(|(&t, &s)| t == tag && s == seconds)
    }

    /// Non-sentinel labels of `node`, ascending by `(seconds, tag)`.
    pub fn labels(&self, node: u32) -> impl Iterator<Item = (i32, u16)> + '_ {
        let r = self.range(node);
        self.tags[r.clone()]
            .iter()
            .zip(self.seconds[r].iter())
            .take_while(|&(&t, _)| t != SENTINEL_TAG)
            .map(|(&t, &s)| (t, s))
    }

    /// Number of labels found within `cutoff` seconds.
    pub fn count_within(&self, node: u32, cutoff: u32) -> usize {
        self.labels(node)
            .take_while(|&(_, s)| u32::from(s) <= cutoff)
            .count()
    }

    /// Checks the structural invariants of one node's list: sorted
    /// ascending, distinct tags, sentinels only as a suffix.
    pub(crate) fn check_node(&self, node: u32) -> Result<(), String> {
        let row: Vec<(i32, u16)> = self.labels(node).collect();
        for w in row.windows(2) {
            if key(w[0].1, w[0].0) >= key(w[1].1, w[1].0) {
                return Err(format!("node {node}: labels not strictly ascending"));
            }
            if w[0].0 == w[1].0 {
                return Err(format!("node {node}: tag {} appears twice", w[0].0));
            }
        }
        let r = self.range(node);
        if self.tags[r][row.len()..]
            .iter()
            .any(|&t| t != SENTINEL_TAG)
        {
            return Err(format!("node {node}: non-sentinel after sentinel"));
        }
        Ok(())
    }
}
