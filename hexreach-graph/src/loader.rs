//! Builds a routable CSR graph from an OSM PBF extract.
//!
//! Two sequential passes over the extract: the first evaluates every way
//! under the mode profile and assigns dense node ids in encounter order
//! (which makes builds reproducible); the second resolves node
//! coordinates. Edges are then emitted per consecutive node pair with
//! Haversine lengths converted to whole seconds at the profile speed.

use crate::csr::CsrGraph;
use crate::profile::{WaySpec, evaluate_way};
use crate::{GraphError, TravelMode};
use geo::{Distance, Haversine, Point};
use osmpbf::{Element, ElementReader};
use std::collections::HashMap;
use std::path::Path;
use tracing::{info, warn};

struct KeptWay {
    spec: WaySpec,
    nodes: Vec<u32>,
}

/// Parses `source` and builds the graph for `mode`.
///
/// # Errors
///
/// - [`GraphError::SourceMissing`] if the file does not exist.
/// - [`GraphError::SourceUnreadable`] if the PBF is malformed or the
///   extract exceeds the 32-bit node space.
pub fn load_graph(source: &Path, mode: TravelMode) -> Result<CsrGraph, GraphError> {
    if !source.is_file() {
        return Err(GraphError::SourceMissing(source.to_path_buf()));
    }

    // Pass 1: keep routable ways, assign dense node ids in encounter order.
    let mut node_ids: HashMap<i64, u32> = HashMap::new();
    let mut ways: Vec<KeptWay> = Vec::new();
    let reader = ElementReader::from_path(source)?;
    reader.for_each(|element| {
        if let Element::Way(way) = element {
            let Some(spec) = evaluate_way(mode, way.tags()) else {
                return;
            };
            let nodes: Vec<u32> = way
                .refs()
                .map(|osm_id| {
                    let next = u32::try_from(node_ids.len()).unwrap_or(u32::MAX);
                    *node_ids.entry(osm_id).or_insert(next)
                })
                .collect();
            ways.push(KeptWay { spec, nodes });
        }
    })?;
    if node_ids.len() >= u32::MAX as usize {
        return Err(GraphError::SourceUnreadable(
            "extract exceeds the 32-bit node space".to_string(),
        ));
    }

    // Pass 2: resolve coordinates for referenced nodes.
    let n = node_ids.len();
    let mut lonlat = vec![f32::NAN; n * 2];
    let reader = ElementReader::from_path(source)?;
    reader.for_each(|element| {
        let (osm_id, lon, lat) = match element {
            Element::Node(node) => (node.id(), node.lon(), node.lat()),
            Element::DenseNode(node) => (node.id(), node.lon(), node.lat()),
            _ => return,
        };
        if let Some(&idx) = node_ids.get(&osm_id) {
            #[allow(clippy::cast_possible_truncation)]
            {
                lonlat[idx as usize * 2] = lon as f32;
                lonlat[idx as usize * 2 + 1] = lat as f32;
            }
        }
    })?;

    // Emit one edge per direction per consecutive node pair.
    let mut edges: Vec<(u32, u32, u32)> = Vec::new();
    let mut dangling_segments: u64 = 0;
    for way in &ways {
        for pair in way.nodes.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            if a == b {
                continue;
            }
            let pa = node_point(&lonlat, a);
            let pb = node_point(&lonlat, b);
            if pa.x().is_nan() || pa.y().is_nan() || pb.x().is_nan() || pb.y().is_nan() {
                // The extract referenced a node it does not contain.
                dangling_segments += 1;
                continue;
            }
            let meters = Haversine.distance(pa, pb);
            let seconds = travel_seconds(meters, way.spec.speed_mps);
            if way.spec.forward {
                edges.push((a, b, seconds));
            }
            if way.spec.backward {
                edges.push((b, a, seconds));
            }
        }
    }
    if dangling_segments > 0 {
        warn!(dangling_segments, "skipped segments with unresolved nodes");
    }

    let graph = CsrGraph::from_edges(mode, lonlat, &edges);
    info!(
        mode = %mode,
        nodes = graph.node_count(),
        edges = graph.edge_count(),
        kept_ways = ways.len(),
        "built graph from extract"
    );
    Ok(graph)
}

fn node_point(lonlat: &[f32], v: u32) -> Point<f64> {
    Point::new(
        f64::from(lonlat[v as usize * 2]),
        f64::from(lonlat[v as usize * 2 + 1]),
    )
}

/// Free-flow traversal time, rounded up and never zero so that every
/// edge strictly advances a shortest-path frontier.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn travel_seconds(meters: f64, speed_mps: f64) -> u32 {
    let secs = (meters / speed_mps).ceil();
    if secs < 1.0 { 1 } else { secs as u32 }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn travel_seconds_rounds_up_and_floors_at_one() {
        assert_eq!(travel_seconds(0.2, 1.4), 1);
        assert_eq!(travel_seconds(100.0, 10.0), 10);
        assert_eq!(travel_seconds(101.0, 10.0), 11);
    }

    #[test]
    fn missing_source_is_reported() {
        let err = load_graph(Path::new("/nonexistent/region.osm.pbf"), TravelMode::Drive)
            .expect_err("must fail");
        assert!(matches!(err, GraphError::SourceMissing(_)));
    }
}
