//! Anchor sites: graph nodes that aggregate snapped points of interest.
//!
//! The k-best kernel treats anchors as its sources; the D_anchor kernel
//! treats them as its report targets. Both consume the table built here.

mod builder;

pub use builder::{AnchorBuildStats, LabelAllowlist, build_anchor_table};

use hexreach_graph::TravelMode;
use uuid::Uuid;

/// Namespace under which deterministic site ids are derived.
/// Changing this invalidates every previously published site id.
pub const SITE_ID_NAMESPACE: Uuid = Uuid::from_u128(0x8d3f_6a1e_42c7_4b09_9e5d_72fa_1c08_b654);

/// A point of interest, as delivered by the upstream POI pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct Poi {
    pub poi_id: u128,
    pub lon: f32,
    pub lat: f32,
    pub category_id: i32,
    pub brand_id: Option<i32>,
    /// Whether the upstream pipeline allows this POI to seed anchors.
    pub anchorable: bool,
}

/// One anchor site: a graph node plus everything that snapped onto it.
#[derive(Debug, Clone, PartialEq)]
pub struct AnchorSite {
    /// Dense id, contiguous `0..A` within a mode, assigned by ascending
    /// `node_id`.
    pub anchor_int_id: u32,
    /// Deterministic 128-bit id over `"{mode}|{node_id}"`.
    pub site_id: Uuid,
    pub node_id: u32,
    /// Centroid of the contributing POIs.
    pub lon: f32,
    pub lat: f32,
    /// Contributing POIs, ascending.
    pub poi_ids: Vec<u128>,
    /// Sorted, deduplicated brand ids present at this site.
    pub brands: Vec<i32>,
    /// Sorted, deduplicated category ids present at this site.
    pub categories: Vec<i32>,
}

impl AnchorSite {
    pub fn site_id_for(mode: TravelMode, node_id: u32) -> Uuid {
        Uuid::new_v5(&SITE_ID_NAMESPACE, format!("{mode}|{node_id}").as_bytes())
    }
}

/// The anchor table for one `(region, mode)` pair, ordered by
/// `anchor_int_id`.
#[derive(Debug, Clone)]
pub struct AnchorTable {
    mode: TravelMode,
    sites: Vec<AnchorSite>,
}

impl AnchorTable {
    pub fn new(mode: TravelMode, sites: Vec<AnchorSite>) -> AnchorTable {
        debug_assert!(
            sites
                .iter()
                .enumerate()
                .all(|(i, s)| s.anchor_int_id as usize == i),
            "anchor ids must be dense and ordered"
        );
        AnchorTable { mode, sites }
    }

    pub fn mode(&self) -> TravelMode {
        self.mode
    }

    pub fn len(&self) -> usize {
        self.sites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }

    pub fn sites(&self) -> &[AnchorSite] {
        &self.sites
    }

    pub fn get(&self, anchor_int_id: u32) -> Option<&AnchorSite> {
        self.sites.get(anchor_int_id as usize)
    }

    /// `(node_id, anchor_int_id)` pairs in table order.
    pub fn node_anchor_pairs(&self) -> Vec<(u32, u32)> {
        self.sites
            .iter()
            .map(|s| (s.node_id, s.anchor_int_id))
            .collect()
    }
}
