//! Groups snapped, anchorable POIs into anchor sites.
//!
//! Given identical POIs, snap radii, and graph, the output is
//! byte-identical across runs: grouping is over an ordered map, label
//! arrays are sorted, and ids are assigned by ascending node id.

use crate::{AnchorSite, AnchorTable, Poi};
use hexreach_graph::{CsrGraph, SnapIndex, TravelMode};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{info, warn};

/// Which labels may seed anchors. POIs whose category and brand are
/// both unregistered are skipped before snapping.
#[derive(Debug, Clone, Default)]
pub struct LabelAllowlist {
    categories: BTreeSet<i32>,
    brands: BTreeSet<i32>,
    allow_all: bool,
}

impl LabelAllowlist {
    pub fn new(categories: impl IntoIterator<Item = i32>, brands: impl IntoIterator<Item = i32>) -> LabelAllowlist {
        LabelAllowlist {
            categories: categories.into_iter().collect(),
            brands: brands.into_iter().collect(),
            allow_all: false,
        }
    }

    /// Accepts every label; used when no allowlist config is supplied.
    pub fn allow_all() -> LabelAllowlist {
        LabelAllowlist {
            allow_all: true,
            ..LabelAllowlist::default()
        }
    }

    pub fn permits(&self, poi: &Poi) -> bool {
        self.allow_all
            || self.categories.contains(&poi.category_id)
            || poi.brand_id.is_some_and(|b| self.brands.contains(&b))
    }
}

/// Counters surfaced to the run log and manifest.
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq)]
pub struct AnchorBuildStats {
    pub input_pois: usize,
    pub not_anchorable: usize,
    pub unlisted_label: usize,
    pub unsnapped: usize,
    pub sites: usize,
}

/// Builds the anchor table for one mode.
///
/// Snapping failures are not errors: the POI is counted and excluded,
/// per the unsnapped-POI policy.
pub fn build_anchor_table(
    pois: &[Poi],
    graph: &CsrGraph,
    snap_index: &SnapIndex,
    mode: TravelMode,
    snap_radius_m: f64,
    allowlist: &LabelAllowlist,
) -> (AnchorTable, AnchorBuildStats) {
    let mut stats = AnchorBuildStats {
        input_pois: pois.len(),
        ..AnchorBuildStats::default()
    };

    let mut groups: BTreeMap<u32, Vec<&Poi>> = BTreeMap::new();
    for poi in pois {
        if !poi.anchorable {
            stats.not_anchorable += 1;
            continue;
        }
        if !allowlist.permits(poi) {
            stats.unlisted_label += 1;
            continue;
        }
        match snap_index.snap(
            graph,
            f64::from(poi.lon),
            f64::from(poi.lat),
            snap_radius_m,
        ) {
            Some(snapped) => groups.entry(snapped.node).or_default().push(poi),
            None => {
                stats.unsnapped += 1;
                warn!(poi_id = %format_args!("{:032x}", poi.poi_id), "poi outside snap radius, excluded");
            }
        }
    }

    let sites: Vec<AnchorSite> = groups
        .into_iter()
        .enumerate()
        .map(|(idx, (node_id, members))| {
            let mut poi_ids: Vec<u128> = members.iter().map(|p| p.poi_id).collect();
            poi_ids.sort_unstable();
            let mut brands: Vec<i32> = members.iter().filter_map(|p| p.brand_id).collect();
            brands.sort_unstable();
            brands.dedup();
            let mut categories: Vec<i32> = members.iter().map(|p| p.category_id).collect();
            categories.sort_unstable();
            categories.dedup();

            #[allow(clippy::cast_precision_loss)]
            let inv = 1.0 / members.len() as f64;
            let lon = members.iter().map(|p| f64::from(p.lon)).sum::<f64>() * inv;
            let lat = members.iter().map(|p| f64::from(p.lat)).sum::<f64>() * inv;

            #[allow(clippy::cast_possible_truncation)]
            AnchorSite {
                anchor_int_id: u32::try_from(idx).expect("site count fits u32"),
                site_id: AnchorSite::site_id_for(mode, node_id),
                node_id,
                lon: lon as f32,
                lat: lat as f32,
                poi_ids,
                brands,
                categories,
            }
        })
        .collect();

    stats.sites = sites.len();
    info!(
        mode = %mode,
        input = stats.input_pois,
        sites = stats.sites,
        unsnapped = stats.unsnapped,
        "anchor table built"
    );
    (AnchorTable::new(mode, sites), stats)
}
