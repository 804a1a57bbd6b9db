use crate::GraphArgs;
use hexreach_graph::GraphCache;
use tracing::info;

#[derive(clap::Args)]
pub(crate) struct Args {
    #[command(flatten)]
    graph: GraphArgs,
}

pub(crate) fn run(args: &Args) -> anyhow::Result<()> {
    let cache = GraphCache::new(&args.graph.cache_dir);
    let graph = cache.load_or_build(&args.graph.source, args.graph.mode)?;
    info!(
        mode = %graph.mode(),
        nodes = graph.node_count(),
        edges = graph.edge_count(),
        cache_dir = %cache.cache_dir(&args.graph.source, args.graph.mode).display(),
        "graph ready"
    );
    Ok(())
}
