use crate::{GraphArgs, KernelArgs};
use hexreach_anchors::Poi;
use hexreach_graph::{GraphCache, SnapIndex, snap::default_snap_radius_m};
use hexreach_io::danchor_store::{self, PoiRef};
use hexreach_io::{LabelLimitsTable, LabelOutcome, LabelStatus, ManifestWriter, StoreError};
use hexreach_kernels::danchor::PoiSeed;
use hexreach_kernels::{CancelFlag, KernelError, RunConfig, nearest_pois_per_anchor};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{info, warn};

#[derive(clap::Args)]
pub(crate) struct Args {
    #[command(flatten)]
    graph: GraphArgs,

    /// Anchor table path.
    #[arg(long)]
    anchors: PathBuf,

    /// POI table (parquet).
    #[arg(long)]
    pois: PathBuf,

    /// Comma-separated label ids; defaults to every label present in
    /// the POI table.
    #[arg(long, value_delimiter = ',')]
    labels: Option<Vec<i32>>,

    /// Output shard root directory.
    #[arg(long)]
    out: PathBuf,

    /// Labels processed in parallel; each label runs single-threaded.
    #[arg(long, env = "WORKERS", default_value_t = 4)]
    workers: usize,

    /// Per-label limits config (JSON with a `default` entry).
    #[arg(long)]
    labels_config: Option<PathBuf>,

    /// Abort after this many seconds; unfinished labels are abandoned
    /// and their shards are not written.
    #[arg(long)]
    max_duration: Option<u64>,

    /// Snap radius override in meters.
    #[arg(long)]
    snap_radius_m: Option<f64>,

    /// Disables progress output.
    #[arg(long)]
    no_progress: bool,

    #[command(flatten)]
    kernel: KernelArgs,
}

/// A POI with its snapped node, ready to seed label sweeps.
struct SnappedPoi {
    poi: Poi,
    node: u32,
}

pub(crate) fn run(args: &Args) -> anyhow::Result<()> {
    args.kernel.validate()?;
    let limits = match &args.labels_config {
        Some(path) => LabelLimitsTable::from_json_path(path)?,
        None => LabelLimitsTable::default(),
    };

    let cache = GraphCache::new(&args.graph.cache_dir);
    let graph = cache.load_or_build(&args.graph.source, args.graph.mode)?;
    let transpose = graph.transpose();
    let anchors = hexreach_io::anchor_store::read_anchor_table(&args.anchors, args.graph.mode)?;
    let anchor_pairs = anchors.node_anchor_pairs();

    // Snap every POI once; label sweeps reuse the result.
    let snap_index = SnapIndex::build(&graph);
    let radius = args
        .snap_radius_m
        .unwrap_or_else(|| default_snap_radius_m(args.graph.mode));
    let mut snapped: Vec<SnappedPoi> = Vec::new();
    let mut unsnapped = 0usize;
    for poi in hexreach_io::poi::read_poi_table(&args.pois)? {
        match snap_index.snap(&graph, f64::from(poi.lon), f64::from(poi.lat), radius) {
            Some(s) => snapped.push(SnappedPoi { poi, node: s.node }),
            None => unsnapped += 1,
        }
    }
    if unsnapped > 0 {
        warn!(unsnapped, "pois outside snap radius excluded from all labels");
    }

    let labels: Vec<i32> = match &args.labels {
        Some(ids) => ids.clone(),
        None => {
            let mut set = BTreeSet::new();
            for s in &snapped {
                set.insert(s.poi.category_id);
                if let Some(brand) = s.poi.brand_id {
                    set.insert(brand);
                }
            }
            set.into_iter().collect()
        }
    };

    let cancel = CancelFlag::new();
    if let Some(seconds) = args.max_duration {
        let watchdog = cancel.clone();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_secs(seconds));
            warn!(seconds, "max duration reached, cancelling in-flight labels");
            watchdog.cancel();
        });
    }
    let cfg = RunConfig {
        workers: args.workers,
        bucket_width_log2: args.kernel.bucket_width_log2()?,
        cancel: cancel.clone(),
        ..RunConfig::default()
    };

    let manifest = Mutex::new(ManifestWriter::open(&args.out)?);
    let progress = (!args.no_progress).then(|| {
        let bar = ProgressBar::new(labels.len() as u64);
        bar.set_style(
            ProgressStyle::with_template("[{elapsed}] {bar:40.cyan/blue} {pos}/{len} labels")
                .expect("static template parses")
                .progress_chars("##-"),
        );
        bar
    });

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(args.workers)
        .build()?;
    let outcomes: Vec<LabelStatus> = pool.install(|| {
        use rayon::prelude::*;
        labels
            .par_iter()
            .map(|&label_id| {
                let outcome = process_label(
                    label_id,
                    &snapped,
                    &anchor_pairs,
                    &anchors,
                    transpose.view(),
                    &limits,
                    &cfg,
                    &args.out,
                );
                let status = outcome.status;
                if let Ok(mut m) = manifest.lock() {
                    if let Err(e) = m.record(&outcome) {
                        warn!(label_id, "failed to record manifest entry: {e}");
                    }
                }
                progress.as_ref().inspect(|bar| bar.inc(1));
                status
            })
            .collect()
    });
    progress.inspect(|bar| bar.finish());

    let written = outcomes
        .iter()
        .filter(|s| **s == LabelStatus::Written)
        .count();
    let failed = outcomes
        .iter()
        .filter(|s| **s == LabelStatus::Failed)
        .count();
    let cancelled = outcomes
        .iter()
        .filter(|s| **s == LabelStatus::Cancelled)
        .count();
    info!(
        labels = labels.len(),
        written,
        failed,
        cancelled,
        out = %args.out.display(),
        "d_anchor batch complete"
    );
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn process_label(
    label_id: i32,
    snapped: &[SnappedPoi],
    anchor_pairs: &[(u32, u32)],
    anchors: &hexreach_anchors::AnchorTable,
    transpose: hexreach_graph::CsrView<'_>,
    limits: &LabelLimitsTable,
    cfg: &RunConfig,
    out: &std::path::Path,
) -> LabelOutcome {
    // Per-label sources, ordered by poi_id so index ties equal id ties.
    let mut members: Vec<&SnappedPoi> = snapped
        .iter()
        .filter(|s| s.poi.category_id == label_id || s.poi.brand_id == Some(label_id))
        .collect();
    members.sort_by_key(|s| s.poi.poi_id);

    let seeds: Vec<PoiSeed> = members
        .iter()
        .enumerate()
        .map(|(index, s)| PoiSeed {
            node: s.node,
            poi_index: u32::try_from(index).expect("per-label poi count fits u32"),
        })
        .collect();
    let refs: Vec<PoiRef> = members
        .iter()
        .map(|s| PoiRef {
            poi_id: s.poi.poi_id,
            lon: s.poi.lon,
            lat: s.poi.lat,
        })
        .collect();

    let started = Instant::now();
    let result = nearest_pois_per_anchor(
        transpose,
        label_id,
        &seeds,
        anchor_pairs,
        &limits.limits_for(label_id),
        cfg,
    );
    let sssp_seconds = started.elapsed().as_secs_f64();

    match result {
        Ok(rows) => match danchor_store::write_shard(out, label_id, &rows, &refs, anchors) {
            Ok(rows_written) => LabelOutcome {
                label_id,
                status: LabelStatus::Written,
                rows_written,
                sssp_seconds,
                reason: None,
            },
            Err(e @ StoreError::ImplausibleSpeed { .. }) => {
                warn!(label_id, "shard rejected: {e}");
                LabelOutcome {
                    label_id,
                    status: LabelStatus::Failed,
                    rows_written: 0,
                    sssp_seconds,
                    reason: Some(e.to_string()),
                }
            }
            Err(e) => LabelOutcome {
                label_id,
                status: LabelStatus::Failed,
                rows_written: 0,
                sssp_seconds,
                reason: Some(e.to_string()),
            },
        },
        Err(KernelError::NoSources(_)) => {
            warn!(label_id, "no snapped sources, shard skipped");
            LabelOutcome {
                label_id,
                status: LabelStatus::Skipped,
                rows_written: 0,
                sssp_seconds,
                reason: Some("no sources".to_string()),
            }
        }
        Err(KernelError::Cancelled) => LabelOutcome {
            label_id,
            status: LabelStatus::Cancelled,
            rows_written: 0,
            sssp_seconds,
            reason: Some("cancelled".to_string()),
        },
        Err(e) => LabelOutcome {
            label_id,
            status: LabelStatus::Failed,
            rows_written: 0,
            sssp_seconds,
            reason: Some(e.to_string()),
        },
    }
}
