//! T_hex persistence: long-format per-hex travel-time rows.

use crate::util::{column, read_batches, write_batch_atomic};
use crate::StoreError;
use arrow::array::{ArrayRef, Int32Array, UInt8Array, UInt16Array, UInt64Array};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use hexreach_grid::HexRow;
use hexreach_kernels::SENTINEL_SECONDS;
use std::path::Path;
use std::sync::Arc;
use tracing::info;
use xxhash_rust::xxh3::Xxh3;

fn schema() -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("h3_id", DataType::UInt64, false),
        Field::new("res", DataType::UInt8, false),
        Field::new("anchor_int_id", DataType::Int32, false),
        Field::new("seconds", DataType::UInt16, false),
    ]))
}

/// Writes T_hex rows. Sentinel rows are dropped here as a second line
/// of defense; the aggregator never produces them.
///
/// # Errors
///
/// Arrow/parquet/I-O failures. The write is atomic.
pub fn write_t_hex(path: &Path, rows: &[HexRow]) -> Result<(), StoreError> {
    let rows: Vec<&HexRow> = rows
        .iter()
        .filter(|r| r.seconds != SENTINEL_SECONDS)
        .collect();
    let columns: Vec<ArrayRef> = vec![
        Arc::new(UInt64Array::from(
            rows.iter().map(|r| r.h3_id).collect::<Vec<_>>(),
        )),
        Arc::new(UInt8Array::from(
            rows.iter().map(|r| r.res).collect::<Vec<_>>(),
        )),
        Arc::new(Int32Array::from(
            rows.iter().map(|r| r.anchor_int_id).collect::<Vec<_>>(),
        )),
        Arc::new(UInt16Array::from(
            rows.iter().map(|r| r.seconds).collect::<Vec<_>>(),
        )),
    ];
    let batch = RecordBatch::try_new(schema(), columns)?;
    write_batch_atomic(path, schema(), &batch)?;
    info!(path = %path.display(), rows = rows.len(), "wrote t_hex table");
    Ok(())
}

/// # Errors
///
/// I/O, parquet, and schema mismatches.
pub fn read_t_hex(path: &Path) -> Result<Vec<HexRow>, StoreError> {
    let mut rows = Vec::new();
    for batch in read_batches(path)? {
        let h3: &UInt64Array = column(&batch, path, "h3_id")?;
        let res: &UInt8Array = column(&batch, path, "res")?;
        let anchor: &Int32Array = column(&batch, path, "anchor_int_id")?;
        let seconds: &UInt16Array = column(&batch, path, "seconds")?;
        for row in 0..batch.num_rows() {
            rows.push(HexRow {
                h3_id: h3.value(row),
                res: res.value(row),
                anchor_int_id: anchor.value(row),
                seconds: seconds.value(row),
            });
        }
    }
    Ok(rows)
}

/// Order-insensitive digest of a row set.
///
/// Two runs over identical inputs must produce identical digests even
/// if row groups land in a different order, so rows are canonically
/// sorted before hashing.
pub fn sorted_row_digest(rows: &[HexRow]) -> u64 {
    let mut sorted: Vec<&HexRow> = rows.iter().collect();
    sorted.sort_by_key(|r| (r.res, r.h3_id, r.seconds, r.anchor_int_id));
    let mut hasher = Xxh3::new();
    for row in sorted {
        hasher.update(&row.h3_id.to_le_bytes());
        hasher.update(&[row.res]);
        hasher.update(&row.anchor_int_id.to_le_bytes());
        hasher.update(&row.seconds.to_le_bytes());
    }
    hasher.digest()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows() -> Vec<HexRow> {
        vec![
            HexRow {
                h3_id: 0x0881_1d25_a5a5_ffff,
                res: 8,
                anchor_int_id: 0,
                seconds: 120,
            },
            HexRow {
                h3_id: 0x0881_1d25_a5a5_ffff,
                res: 8,
                anchor_int_id: 3,
                seconds: 240,
            },
        ]
    }

    #[test]
    fn round_trips_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t_hex.parquet");
        write_t_hex(&path, &rows()).unwrap();
        assert_eq!(read_t_hex(&path).unwrap(), rows());
    }

    #[test]
    fn sentinel_rows_never_reach_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t_hex.parquet");
        let mut with_sentinel = rows();
        with_sentinel.push(HexRow {
            h3_id: 1,
            res: 8,
            anchor_int_id: -1,
            seconds: SENTINEL_SECONDS,
        });
        write_t_hex(&path, &with_sentinel).unwrap();
        assert_eq!(read_t_hex(&path).unwrap(), rows());
    }

    #[test]
    fn digest_ignores_row_order_but_not_content() {
        let a = rows();
        let mut b = rows();
        b.reverse();
        assert_eq!(sorted_row_digest(&a), sorted_row_digest(&b));

        b[0].seconds += 1;
        assert_ne!(sorted_row_digest(&a), sorted_row_digest(&b));
    }
}
