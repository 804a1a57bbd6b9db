use crate::{GraphArgs, KernelArgs};
use hexreach_graph::GraphCache;
use hexreach_grid::{aggregate_to_hexes, index_nodes};
use hexreach_io::{anchor_store, thex};
use hexreach_kernels::kbest::AnchorSeed;
use hexreach_kernels::{CancelFlag, RunConfig, k_best_to_anchors};
use std::path::PathBuf;
use tracing::info;

#[derive(clap::Args)]
pub(crate) struct Args {
    #[command(flatten)]
    graph: GraphArgs,

    /// Anchor table path.
    #[arg(long)]
    anchors: PathBuf,

    /// Distinct nearest anchors kept per node and per hex.
    #[arg(long, default_value_t = 20)]
    k: usize,

    /// Primary cutoff in minutes.
    #[arg(long, default_value_t = 30)]
    cutoff: u32,

    /// Overflow cutoff in minutes.
    #[arg(long, default_value_t = 60)]
    overflow_cutoff: u32,

    /// Output resolutions, ascending (e.g. --res 7 8 9).
    #[arg(long, num_args = 1.., required = true)]
    res: Vec<u8>,

    /// Output T_hex parquet path.
    #[arg(long)]
    out: PathBuf,

    #[command(flatten)]
    kernel: KernelArgs,
}

pub(crate) fn run(args: &Args) -> anyhow::Result<()> {
    args.kernel.validate()?;
    let cache = GraphCache::new(&args.graph.cache_dir);
    let graph = cache.load_or_build(&args.graph.source, args.graph.mode)?;
    let anchors = anchor_store::read_anchor_table(&args.anchors, args.graph.mode)?;

    let cfg = RunConfig {
        k: args.k,
        primary_cutoff_s: args.cutoff * 60,
        overflow_cutoff_s: args.overflow_cutoff * 60,
        bucket_width_log2: args.kernel.bucket_width_log2()?,
        workers: 1,
        cancel: CancelFlag::new(),
    };
    let seeds: Vec<AnchorSeed> = anchors
        .sites()
        .iter()
        .map(|s| AnchorSeed {
            node: s.node_id,
            anchor_int_id: s.anchor_int_id,
        })
        .collect();

    let result = k_best_to_anchors(graph.view(), &seeds, &cfg)?;
    let matrix = index_nodes(&graph, &args.res)?;
    let rows = aggregate_to_hexes(&result, &matrix)?;
    thex::write_t_hex(&args.out, &rows)?;

    info!(
        rows = rows.len(),
        digest = %format_args!("{:016x}", thex::sorted_row_digest(&rows)),
        out = %args.out.display(),
        "t_hex written"
    );
    Ok(())
}
