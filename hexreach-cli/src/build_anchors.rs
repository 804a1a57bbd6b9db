use crate::GraphArgs;
use hexreach_anchors::{LabelAllowlist, build_anchor_table};
use hexreach_graph::{GraphCache, SnapIndex, snap::default_snap_radius_m};
use hexreach_io::LabelLimitsTable;
use hexreach_io::{anchor_store, poi};
use std::path::PathBuf;
use tracing::info;

#[derive(clap::Args)]
pub(crate) struct Args {
    #[command(flatten)]
    graph: GraphArgs,

    /// POI table (parquet).
    #[arg(long)]
    pois: PathBuf,

    /// Output anchor table path.
    #[arg(long)]
    out: PathBuf,

    /// Label limits config; its listed labels form the anchor
    /// allowlist. Without it, every label is anchorable.
    #[arg(long)]
    labels_config: Option<PathBuf>,

    /// Snap radius override in meters (default: 1 mile driving, 1/4
    /// mile walking).
    #[arg(long)]
    snap_radius_m: Option<f64>,
}

pub(crate) fn run(args: &Args) -> anyhow::Result<()> {
    let cache = GraphCache::new(&args.graph.cache_dir);
    let graph = cache.load_or_build(&args.graph.source, args.graph.mode)?;
    let snap_index = SnapIndex::build(&graph);
    let pois = poi::read_poi_table(&args.pois)?;

    let allowlist = match &args.labels_config {
        Some(path) => {
            let table = LabelLimitsTable::from_json_path(path)?;
            // Category and brand ids share the label namespace.
            LabelAllowlist::new(table.listed_labels(), table.listed_labels())
        }
        None => LabelAllowlist::allow_all(),
    };
    let radius = args
        .snap_radius_m
        .unwrap_or_else(|| default_snap_radius_m(args.graph.mode));

    let (table, stats) = build_anchor_table(
        &pois,
        &graph,
        &snap_index,
        args.graph.mode,
        radius,
        &allowlist,
    );
    anchor_store::write_anchor_table(&args.out, &table)?;
    info!(
        sites = stats.sites,
        unsnapped = stats.unsnapped,
        not_anchorable = stats.not_anchorable,
        unlisted = stats.unlisted_label,
        out = %args.out.display(),
        "anchor table written"
    );
    Ok(())
}
