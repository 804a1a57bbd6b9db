//! Connectivity-aware point snapping.
//!
//! Nearest-node snapping alone tends to land POIs on service-road
//! dead-ends that propagate nowhere. The snapper therefore queries a
//! small candidate pool from an R-tree and prefers a well-connected
//! node when the geometrically nearest one is a degree-1 stub.
//!
//! All distance comparisons use millimeter-rounded values so that
//! tie-breaking is exact and runs are reproducible.

use crate::csr::CsrGraph;
use crate::TravelMode;
use rstar::{AABB, PointDistance, RTree, RTreeObject};
use std::cmp::Reverse;

/// Nodes considered per query before filtering.
const CANDIDATE_POOL: usize = 10;

/// Default snap radii: one mile driving, a quarter mile walking.
pub fn default_snap_radius_m(mode: TravelMode) -> f64 {
    match mode {
        TravelMode::Drive => 1609.344,
        TravelMode::Walk => 402.336,
    }
}

struct NodeEntry {
    pos: [f64; 2],
    node: u32,
}

impl RTreeObject for NodeEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point(self.pos)
    }
}

impl PointDistance for NodeEntry {
    fn distance_2(&self, point: &[f64; 2]) -> f64 {
        let dx = self.pos[0] - point[0];
        let dy = self.pos[1] - point[1];
        dx * dx + dy * dy
    }
}

/// Fast planar distance approximation around a reference point.
///
/// Good to well under a meter at the sub-2-km ranges snap radii allow;
/// degrades toward the poles, which the covered regions never reach.
struct LocalMeters {
    lon: f64,
    lat: f64,
    meters_per_lon_deg: f64,
    meters_per_lat_deg: f64,
}

const METERS_PER_DEGREE_LAT: f64 = 111_132.954;

impl LocalMeters {
    fn centered_on(lon: f64, lat: f64) -> LocalMeters {
        LocalMeters {
            lon,
            lat,
            meters_per_lon_deg: lat.to_radians().cos() * METERS_PER_DEGREE_LAT,
            meters_per_lat_deg: METERS_PER_DEGREE_LAT,
        }
    }

    /// Distance to `(lon, lat)` rounded to whole millimeters.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn distance_mm(&self, lon: f64, lat: f64) -> u64 {
        let dx = (lon - self.lon) * self.meters_per_lon_deg;
        let dy = (lat - self.lat) * self.meters_per_lat_deg;
        (dx.hypot(dy) * 1000.0).round() as u64
    }
}

/// A successful snap: the chosen node and its millimeter distance.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Snapped {
    pub node: u32,
    pub distance_mm: u64,
}

/// Spatial index over a graph's node positions.
pub struct SnapIndex {
    tree: RTree<NodeEntry>,
}

impl SnapIndex {
    pub fn build(graph: &CsrGraph) -> SnapIndex {
        let lonlat = graph.lonlat_flat();
        let entries = (0..graph.node_count())
            .map(|node| NodeEntry {
                pos: [
                    f64::from(lonlat[node as usize * 2]),
                    f64::from(lonlat[node as usize * 2 + 1]),
                ],
                node,
            })
            .collect();
        SnapIndex {
            tree: RTree::bulk_load(entries),
        }
    }

    /// Snaps a point to a nearby, preferably well-connected node.
    ///
    /// Returns `None` when no candidate lies within `radius_m`; such
    /// points are excluded from anchor building.
    pub fn snap(&self, graph: &CsrGraph, lon: f64, lat: f64, radius_m: f64) -> Option<Snapped> {
        let local = LocalMeters::centered_on(lon, lat);
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let radius_mm = (radius_m * 1000.0).round() as u64;

        struct Candidate {
            dist_mm: u64,
            degree: u32,
            node: u32,
        }

        let mut pool: Vec<Candidate> = self
            .tree
            .nearest_neighbor_iter(&[lon, lat])
            .take(CANDIDATE_POOL)
            .map(|entry| Candidate {
                dist_mm: local.distance_mm(entry.pos[0], entry.pos[1]),
                degree: graph.out_degree(entry.node),
                node: entry.node,
            })
            .collect();
        // The tree orders by degree-space distance; re-sort by the metric
        // the tiebreakers are defined over.
        pool.sort_by_key(|c| (c.dist_mm, c.node));

        let d1 = pool.first()?.dist_mm;
        let retained: Vec<&Candidate> = pool
            .iter()
            .filter(|c| c.dist_mm <= d1.saturating_mul(2) && c.dist_mm <= radius_mm)
            .collect();
        let nearest = *retained.first()?;

        let chosen = if nearest.degree == 1 && retained.iter().any(|c| c.degree >= 2) {
            retained
                .iter()
                .max_by_key(|c| (c.degree, Reverse(c.dist_mm), Reverse(c.node)))
                .expect("retained is non-empty")
        } else {
            nearest
        };
        Some(Snapped {
            node: chosen.node,
            distance_mm: chosen.dist_mm,
        })
    }
}
