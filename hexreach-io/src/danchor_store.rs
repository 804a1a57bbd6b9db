//! D_anchor shard persistence.
//!
//! One parquet shard per `(mode, label)` partition:
//! `<root>/mode=<mode>/label_id=<id>/part-000.parquet`. Missing
//! `(anchor, label)` pairs encode "unreachable"; there are no sentinel
//! rows. A rewrite of a shard replaces it atomically.
//!
//! Before anything is written, a deterministic sample of rows is
//! speed-checked against great-circle distance. A graph/anchor-table
//! mismatch shows up as teleporting POIs, and one poisoned shard is
//! cheaper to reject here than to chase downstream.

use crate::util::{column, read_batches, u128_from_bytes, write_batch_atomic};
use crate::StoreError;
use arrow::array::{
    ArrayRef, FixedSizeBinaryArray, FixedSizeBinaryBuilder, Int32Array, UInt8Array, UInt16Array,
};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use geo::{Distance, Haversine, Point};
use hexreach_anchors::AnchorTable;
use hexreach_graph::TravelMode;
use hexreach_kernels::DAnchorRow;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// 200 km/h; free-flow driving never implies more.
const MAX_PLAUSIBLE_MPS: f64 = 200.0 / 3.6;

/// Rows sampled for the speed guardrail.
const SPEED_SAMPLE: usize = 100;

/// A POI source as the shard writer needs it: id plus position,
/// index-aligned with [`DAnchorRow::poi_index`].
#[derive(Debug, Copy, Clone)]
pub struct PoiRef {
    pub poi_id: u128,
    pub lon: f32,
    pub lat: f32,
}

pub fn shard_path(root: &Path, mode: TravelMode, label_id: i32) -> PathBuf {
    root.join(format!("mode={mode}"))
        .join(format!("label_id={label_id}"))
        .join("part-000.parquet")
}

fn schema() -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("anchor_int_id", DataType::Int32, false),
        Field::new("seconds_u16", DataType::UInt16, false),
        Field::new("rank", DataType::UInt8, false),
        Field::new("poi_id", DataType::FixedSizeBinary(16), false),
    ]))
}

/// Validates and writes one label's shard, returning the row count.
///
/// # Errors
///
/// - [`StoreError::ImplausibleSpeed`] if any sampled row implies more
///   than 200 km/h; nothing is written.
/// - [`StoreError::Schema`] if a row references an unknown anchor or
///   POI index (a kernel/caller mismatch).
/// - Arrow/parquet/I-O failures.
pub fn write_shard(
    root: &Path,
    label_id: i32,
    rows: &[DAnchorRow],
    pois: &[PoiRef],
    anchors: &AnchorTable,
) -> Result<usize, StoreError> {
    check_speed_plausibility(label_id, rows, pois, anchors)?;

    let mut anchor_ids = Vec::with_capacity(rows.len());
    let mut poi_ids = FixedSizeBinaryBuilder::with_capacity(rows.len(), 16);
    for row in rows {
        let anchor = i32::try_from(row.anchor_int_id)
            .map_err(|_| StoreError::Schema("anchor id exceeds i32".to_string()))?;
        anchor_ids.push(anchor);
        let poi = poi_lookup(pois, row.poi_index)?;
        poi_ids.append_value(poi.poi_id.to_le_bytes())?;
    }

    let columns: Vec<ArrayRef> = vec![
        Arc::new(Int32Array::from(anchor_ids)),
        Arc::new(UInt16Array::from(
            rows.iter().map(|r| r.seconds).collect::<Vec<_>>(),
        )),
        Arc::new(UInt8Array::from(
            rows.iter().map(|r| r.rank).collect::<Vec<_>>(),
        )),
        Arc::new(poi_ids.finish()),
    ];
    let batch = RecordBatch::try_new(schema(), columns)?;

    let path = shard_path(root, anchors.mode(), label_id);
    write_batch_atomic(&path, schema(), &batch)?;
    info!(label_id, rows = rows.len(), path = %path.display(), "wrote d_anchor shard");
    Ok(rows.len())
}

fn poi_lookup(pois: &[PoiRef], index: u32) -> Result<&PoiRef, StoreError> {
    pois.get(index as usize).ok_or_else(|| {
        StoreError::Schema(format!("row references poi index {index} beyond source list"))
    })
}

fn check_speed_plausibility(
    label_id: i32,
    rows: &[DAnchorRow],
    pois: &[PoiRef],
    anchors: &AnchorTable,
) -> Result<(), StoreError> {
    if rows.is_empty() {
        return Ok(());
    }
    let step = (rows.len() / SPEED_SAMPLE).max(1);
    for row in rows.iter().step_by(step) {
        let site = anchors.get(row.anchor_int_id).ok_or_else(|| {
            StoreError::Schema(format!(
                "row references anchor {} beyond the table",
                row.anchor_int_id
            ))
        })?;
        let poi = poi_lookup(pois, row.poi_index)?;
        let meters = Haversine.distance(
            Point::new(f64::from(site.lon), f64::from(site.lat)),
            Point::new(f64::from(poi.lon), f64::from(poi.lat)),
        );
        let seconds = row.seconds.max(1);
        let speed = meters / f64::from(seconds);
        if speed > MAX_PLAUSIBLE_MPS {
            return Err(StoreError::ImplausibleSpeed {
                label_id,
                anchor_int_id: row.anchor_int_id,
                poi_id: poi.poi_id,
                meters,
                seconds: row.seconds,
                implied_kmh: speed * 3.6,
            });
        }
    }
    Ok(())
}

/// One shard row as stored.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct ShardRow {
    pub anchor_int_id: i32,
    pub seconds: u16,
    pub rank: u8,
    pub poi_id: u128,
}

/// # Errors
///
/// I/O, parquet, and schema mismatches.
pub fn read_shard(path: &Path) -> Result<Vec<ShardRow>, StoreError> {
    let mut rows = Vec::new();
    for batch in read_batches(path)? {
        let anchor: &Int32Array = column(&batch, path, "anchor_int_id")?;
        let seconds: &UInt16Array = column(&batch, path, "seconds_u16")?;
        let rank: &UInt8Array = column(&batch, path, "rank")?;
        let poi: &FixedSizeBinaryArray = column(&batch, path, "poi_id")?;
        for row in 0..batch.num_rows() {
            rows.push(ShardRow {
                anchor_int_id: anchor.value(row),
                seconds: seconds.value(row),
                rank: rank.value(row),
                poi_id: u128_from_bytes(poi.value(row))?,
            });
        }
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hexreach_anchors::AnchorSite;

    fn table_with_anchor_at(lon: f32, lat: f32) -> AnchorTable {
        AnchorTable::new(
            TravelMode::Drive,
            vec![AnchorSite {
                anchor_int_id: 0,
                site_id: AnchorSite::site_id_for(TravelMode::Drive, 5),
                node_id: 5,
                lon,
                lat,
                poi_ids: Vec::new(),
                brands: Vec::new(),
                categories: vec![1],
            }],
        )
    }

    fn row(seconds: u16) -> DAnchorRow {
        DAnchorRow {
            anchor_int_id: 0,
            rank: 0,
            poi_index: 0,
            seconds,
        }
    }

    #[test]
    fn writes_into_mode_label_partitions_and_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let anchors = table_with_anchor_at(13.40, 52.50);
        // ~700 m away, 60 s: ~42 km/h, plausible.
        let pois = [PoiRef {
            poi_id: 0xabcd,
            lon: 13.41,
            lat: 52.50,
        }];
        let n = write_shard(dir.path(), 31, &[row(60)], &pois, &anchors).unwrap();
        assert_eq!(n, 1);

        let path = shard_path(dir.path(), TravelMode::Drive, 31);
        assert!(path.ends_with("mode=drive/label_id=31/part-000.parquet"));
        assert_eq!(
            read_shard(&path).unwrap(),
            vec![ShardRow {
                anchor_int_id: 0,
                seconds: 60,
                rank: 0,
                poi_id: 0xabcd,
            }]
        );
    }

    #[test]
    fn implausible_speed_rejects_the_shard_without_writing() {
        let dir = tempfile::tempdir().unwrap();
        let anchors = table_with_anchor_at(13.40, 52.50);
        // ~75 km away in 10 seconds: far beyond 200 km/h.
        let pois = [PoiRef {
            poi_id: 1,
            lon: 14.50,
            lat: 52.50,
        }];
        let err = write_shard(dir.path(), 31, &[row(10)], &pois, &anchors)
            .expect_err("must be implausible");
        assert!(matches!(err, StoreError::ImplausibleSpeed { .. }));
        assert!(!shard_path(dir.path(), TravelMode::Drive, 31).exists());
    }

    #[test]
    fn empty_shard_is_valid() {
        let dir = tempfile::tempdir().unwrap();
        let anchors = table_with_anchor_at(13.40, 52.50);
        let n = write_shard(dir.path(), 8, &[], &[], &anchors).unwrap();
        assert_eq!(n, 0);
        let path = shard_path(dir.path(), TravelMode::Drive, 8);
        assert!(read_shard(&path).unwrap().is_empty());
    }

    #[test]
    fn zero_seconds_does_not_divide_by_zero() {
        let dir = tempfile::tempdir().unwrap();
        let anchors = table_with_anchor_at(13.40, 52.50);
        // Co-located POI and anchor at 0 s is fine.
        let pois = [PoiRef {
            poi_id: 2,
            lon: 13.40,
            lat: 52.50,
        }];
        assert!(write_shard(dir.path(), 9, &[row(0)], &pois, &anchors).is_ok());
    }
}
