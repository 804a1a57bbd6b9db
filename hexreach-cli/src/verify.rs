use hexreach_grid::verify_rows;
use hexreach_io::thex;
use std::path::PathBuf;
use tracing::info;

#[derive(clap::Args)]
pub(crate) struct Args {
    /// T_hex parquet to check.
    #[arg(long = "t-hex")]
    t_hex: PathBuf,
}

pub(crate) fn run(args: &Args) -> anyhow::Result<()> {
    let rows = thex::read_t_hex(&args.t_hex)?;
    let report = verify_rows(&rows)?;
    info!(
        rows = report.rows,
        groups = report.groups,
        resolutions = ?report.resolutions,
        sentinel_rows = report.sentinel_rows,
        digest = %format_args!("{:016x}", thex::sorted_row_digest(&rows)),
        "t_hex verification passed"
    );
    println!(
        "OK: {} rows in {} (res, hex) groups across resolutions {:?}; 0 sentinel rows",
        report.rows, report.groups, report.resolutions
    );
    Ok(())
}
