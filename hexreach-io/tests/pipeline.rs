//! End-to-end pipeline over a synthetic street grid: anchors, k-best,
//! hex aggregation, persistence, verification, and determinism.

use hexreach_anchors::{LabelAllowlist, Poi, build_anchor_table};
use hexreach_graph::{CsrGraph, SnapIndex, TravelMode};
use hexreach_grid::{aggregate_to_hexes, index_nodes, verify_rows};
use hexreach_io::danchor_store::{self, PoiRef};
use hexreach_io::{anchor_store, poi, thex};
use hexreach_kernels::danchor::PoiSeed;
use hexreach_kernels::kbest::AnchorSeed;
use hexreach_kernels::{LabelLimits, RunConfig, k_best_to_anchors, nearest_pois_per_anchor};

/// A bidirectional west-to-east street: 10 nodes, ~340 m / 45 s apart,
/// through central Berlin coordinates.
fn street() -> CsrGraph {
    let n = 10u32;
    let mut lonlat = Vec::new();
    for i in 0..n {
        lonlat.push(13.38 + 0.005 * i as f32);
        lonlat.push(52.52);
    }
    let mut edges = Vec::new();
    for i in 0..n - 1 {
        edges.push((i, i + 1, 45));
        edges.push((i + 1, i, 45));
    }
    CsrGraph::from_edges(TravelMode::Walk, lonlat, &edges)
}

fn poi_at(id: u128, node_lon: f32, category: i32) -> Poi {
    Poi {
        poi_id: id,
        lon: node_lon,
        lat: 52.52,
        category_id: category,
        brand_id: None,
        anchorable: true,
    }
}

#[test]
fn anchors_to_t_hex_round_trip_verifies_and_is_deterministic() {
    let graph = street();
    let index = SnapIndex::build(&graph);

    // POIs at both ends of the street.
    let pois = vec![poi_at(1, 13.38, 7), poi_at(2, 13.425, 7)];
    let (anchors, stats) = build_anchor_table(
        &pois,
        &graph,
        &index,
        TravelMode::Walk,
        400.0,
        &LabelAllowlist::allow_all(),
    );
    assert_eq!(stats.sites, 2);

    // Persist and reload the anchor table before running the kernel,
    // the way the pipeline actually flows between subcommands.
    let dir = tempfile::tempdir().unwrap();
    let anchor_path = dir.path().join("anchors.parquet");
    anchor_store::write_anchor_table(&anchor_path, &anchors).unwrap();
    let anchors = anchor_store::read_anchor_table(&anchor_path, TravelMode::Walk).unwrap();

    let seeds: Vec<AnchorSeed> = anchors
        .sites()
        .iter()
        .map(|s| AnchorSeed {
            node: s.node_id,
            anchor_int_id: s.anchor_int_id,
        })
        .collect();
    let cfg = RunConfig {
        k: 2,
        ..RunConfig::default()
    };
    let result = k_best_to_anchors(graph.view(), &seeds, &cfg).unwrap();
    let matrix = index_nodes(&graph, &[7, 8]).unwrap();
    let rows = aggregate_to_hexes(&result, &matrix).unwrap();

    let t_hex_path = dir.path().join("t_hex.parquet");
    thex::write_t_hex(&t_hex_path, &rows).unwrap();
    let reread = thex::read_t_hex(&t_hex_path).unwrap();
    assert_eq!(reread, rows);

    let report = verify_rows(&reread).unwrap();
    assert_eq!(report.sentinel_rows, 0);
    assert_eq!(report.resolutions, vec![7, 8]);

    // Second run over identical inputs: identical sorted-row digest.
    let result2 = k_best_to_anchors(graph.view(), &seeds, &cfg).unwrap();
    let rows2 = aggregate_to_hexes(&result2, &matrix).unwrap();
    assert_eq!(
        thex::sorted_row_digest(&rows),
        thex::sorted_row_digest(&rows2)
    );
    assert_eq!(rows, rows2);
}

#[test]
fn poi_table_feeds_d_anchor_shard_with_plausible_speeds() {
    let graph = street();
    let transpose = graph.transpose();
    let index = SnapIndex::build(&graph);

    let dir = tempfile::tempdir().unwrap();
    let poi_path = dir.path().join("pois.parquet");
    let pois = vec![
        poi_at(0x11, 13.38, 7),
        poi_at(0x22, 13.40, 7),
        poi_at(0x33, 13.425, 9),
    ];
    poi::write_poi_table(&poi_path, &pois).unwrap();
    let pois = poi::read_poi_table(&poi_path).unwrap();

    let (anchors, _) = build_anchor_table(
        &pois,
        &graph,
        &index,
        TravelMode::Walk,
        400.0,
        &LabelAllowlist::allow_all(),
    );

    // Label 7 sources, sorted by poi id, snapped to their nodes.
    let members: Vec<&Poi> = pois.iter().filter(|p| p.category_id == 7).collect();
    let seeds: Vec<PoiSeed> = members
        .iter()
        .enumerate()
        .map(|(i, p)| PoiSeed {
            node: index
                .snap(&graph, f64::from(p.lon), f64::from(p.lat), 400.0)
                .unwrap()
                .node,
            poi_index: u32::try_from(i).unwrap(),
        })
        .collect();
    let refs: Vec<PoiRef> = members
        .iter()
        .map(|p| PoiRef {
            poi_id: p.poi_id,
            lon: p.lon,
            lat: p.lat,
        })
        .collect();

    let rows = nearest_pois_per_anchor(
        transpose.view(),
        7,
        &seeds,
        &anchors.node_anchor_pairs(),
        &LabelLimits {
            max_seconds: 3600,
            top_k: 2,
        },
        &RunConfig::default(),
    )
    .unwrap();
    assert!(!rows.is_empty());

    let written = danchor_store::write_shard(dir.path(), 7, &rows, &refs, &anchors).unwrap();
    assert_eq!(written, rows.len());

    let shard = danchor_store::read_shard(&danchor_store::shard_path(
        dir.path(),
        TravelMode::Walk,
        7,
    ))
    .unwrap();
    assert_eq!(shard.len(), rows.len());
    // Every anchor's rows are ranked from zero in ascending seconds.
    for pair in shard.windows(2) {
        if pair[0].anchor_int_id == pair[1].anchor_int_id {
            assert!(pair[0].seconds <= pair[1].seconds);
            assert_eq!(pair[0].rank + 1, pair[1].rank);
        }
    }
}
