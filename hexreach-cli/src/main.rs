use clap::{Parser, Subcommand};
use hexreach_graph::{GraphError, TravelMode};
use hexreach_grid::GridError;
use hexreach_io::StoreError;
use hexreach_kernels::KernelError;
use std::path::PathBuf;
use tracing::error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

mod build_anchors;
mod build_graph;
mod d_anchor;
mod t_hex;
mod verify;

const EXIT_INVALID_INPUT: i32 = 2;
const EXIT_CACHE_CORRUPT: i32 = 3;
const EXIT_KERNEL_FAILURE: i32 = 4;
const EXIT_VALIDATION_FAILURE: i32 = 5;

#[derive(Parser)]
#[command(name = "hexreach", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build (or refresh) the cached routable graph for a region.
    BuildGraph(build_graph::Args),
    /// Snap POIs onto the graph and build the anchor table.
    BuildAnchors(build_anchors::Args),
    /// Compute per-hex K-best travel times to anchors (T_hex).
    ComputeTHex(t_hex::Args),
    /// Compute per-anchor nearest POIs per label (D_anchor).
    ComputeDAnchor(d_anchor::Args),
    /// Check a T_hex table's structural invariants.
    Verify(verify::Args),
}

/// Arguments shared by every subcommand that needs the graph.
#[derive(clap::Args)]
pub(crate) struct GraphArgs {
    /// Road-network extract (OSM PBF) for the region.
    #[arg(long)]
    pub source: PathBuf,

    /// Travel mode profile.
    #[arg(long, value_parser = parse_mode)]
    pub mode: TravelMode,

    /// Graph cache directory.
    #[arg(long, env = "GRAPH_CACHE_DIR", default_value = "graph-cache")]
    pub cache_dir: PathBuf,
}

/// Kernel tuning knobs shared by the compute subcommands.
#[derive(clap::Args)]
pub(crate) struct KernelArgs {
    /// Bucket width in seconds; must be a power of two up to 64.
    #[arg(long, env = "BUCKET_WIDTH_SECONDS", default_value_t = 4)]
    pub bucket_width_seconds: u32,

    /// Intra-kernel threads. The shared-frontier kernels are
    /// single-threaded by design; values above 1 are accepted and ignored.
    #[arg(long, env = "THREADS", default_value_t = 1)]
    pub threads: usize,

    /// Unreachable sentinel; fixed by the storage contract.
    #[arg(long, env = "SENTINEL_U16", default_value_t = 65535)]
    pub sentinel_u16: u32,
}

impl KernelArgs {
    pub fn bucket_width_log2(&self) -> anyhow::Result<u8> {
        anyhow::ensure!(
            self.bucket_width_seconds.is_power_of_two() && self.bucket_width_seconds <= 64,
            "bucket width must be a power of two between 1 and 64 seconds, got {}",
            self.bucket_width_seconds
        );
        Ok(u8::try_from(self.bucket_width_seconds.trailing_zeros()).expect("log2 of u32 fits"))
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.sentinel_u16 == u32::from(u16::MAX),
            "SENTINEL_U16 is fixed at 65535 by the storage contract"
        );
        if self.threads > 1 {
            tracing::warn!(
                threads = self.threads,
                "shared-frontier kernels are single-threaded; THREADS > 1 has no effect"
            );
        }
        self.bucket_width_log2().map(|_| ())
    }
}

fn parse_mode(s: &str) -> Result<TravelMode, String> {
    s.parse().map_err(|e: GraphError| e.to_string())
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    if let Some(g) = err.downcast_ref::<GraphError>() {
        return match g {
            GraphError::CacheCorrupt(_) | GraphError::CacheLocked => EXIT_CACHE_CORRUPT,
            _ => EXIT_INVALID_INPUT,
        };
    }
    if let Some(k) = err.downcast_ref::<KernelError>() {
        return match k {
            KernelError::InvalidK
            | KernelError::InvalidCutoff { .. }
            | KernelError::NoSources(_) => EXIT_INVALID_INPUT,
            KernelError::Cancelled | KernelError::InvariantViolation(_) => EXIT_KERNEL_FAILURE,
        };
    }
    if let Some(g) = err.downcast_ref::<GridError>() {
        return match g {
            GridError::InvariantViolation(_) | GridError::InvalidCell(_) => {
                EXIT_VALIDATION_FAILURE
            }
            _ => EXIT_INVALID_INPUT,
        };
    }
    if err.downcast_ref::<StoreError>().is_some() {
        return EXIT_INVALID_INPUT;
    }
    EXIT_INVALID_INPUT
}

fn main() {
    tracing_subscriber::registry()
        // Standard logger, configured via the RUST_LOG env variable
        .with(tracing_subscriber::fmt::layer().with_filter(EnvFilter::from_default_env()))
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::BuildGraph(args) => build_graph::run(&args),
        Commands::BuildAnchors(args) => build_anchors::run(&args),
        Commands::ComputeTHex(args) => t_hex::run(&args),
        Commands::ComputeDAnchor(args) => d_anchor::run(&args),
        Commands::Verify(args) => verify::run(&args),
    };

    if let Err(err) = result {
        error!("{err:#}");
        std::process::exit(exit_code_for(&err));
    }
}
