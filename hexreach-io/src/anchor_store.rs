//! Anchor table persistence.
//!
//! The columnar layout follows the published contract:
//! `(anchor_int_id, site_id, mode, node_id, lon, lat, brands[],
//! categories[])`, sorted by `anchor_int_id`. Contributing POI ids are
//! not part of the table; readers get sites with empty `poi_ids`, which
//! the kernels never consult.

use crate::util::{column, read_batches, write_batch_atomic};
use crate::StoreError;
use arrow::array::{
    ArrayRef, FixedSizeBinaryArray, FixedSizeBinaryBuilder, Float32Array, Int32Array,
    Int32Builder, ListArray, ListBuilder, StringArray, UInt32Array,
};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use hexreach_anchors::{AnchorSite, AnchorTable};
use hexreach_graph::TravelMode;
use std::path::Path;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

fn schema() -> Arc<Schema> {
    let label_list = |name: &str| {
        Field::new(
            name,
            DataType::List(Arc::new(Field::new("item", DataType::Int32, true))),
            false,
        )
    };
    Arc::new(Schema::new(vec![
        Field::new("anchor_int_id", DataType::UInt32, false),
        Field::new("site_id", DataType::FixedSizeBinary(16), false),
        Field::new("mode", DataType::Utf8, false),
        Field::new("node_id", DataType::UInt32, false),
        Field::new("lon", DataType::Float32, false),
        Field::new("lat", DataType::Float32, false),
        label_list("brands"),
        label_list("categories"),
    ]))
}

fn label_list_array(values: impl Iterator<Item = Vec<i32>>) -> ListArray {
    let mut builder = ListBuilder::new(Int32Builder::new());
    for labels in values {
        for label in labels {
            builder.values().append_value(label);
        }
        builder.append(true);
    }
    builder.finish()
}

/// # Errors
///
/// Arrow/parquet/I-O failures. The write is atomic.
pub fn write_anchor_table(path: &Path, table: &AnchorTable) -> Result<(), StoreError> {
    let sites = table.sites();
    let mut site_ids = FixedSizeBinaryBuilder::with_capacity(sites.len(), 16);
    for site in sites {
        site_ids.append_value(site.site_id.as_bytes())?;
    }
    let columns: Vec<ArrayRef> = vec![
        Arc::new(UInt32Array::from(
            sites.iter().map(|s| s.anchor_int_id).collect::<Vec<_>>(),
        )),
        Arc::new(site_ids.finish()),
        Arc::new(StringArray::from(
            sites
                .iter()
                .map(|_| table.mode().as_str())
                .collect::<Vec<_>>(),
        )),
        Arc::new(UInt32Array::from(
            sites.iter().map(|s| s.node_id).collect::<Vec<_>>(),
        )),
        Arc::new(Float32Array::from(
            sites.iter().map(|s| s.lon).collect::<Vec<_>>(),
        )),
        Arc::new(Float32Array::from(
            sites.iter().map(|s| s.lat).collect::<Vec<_>>(),
        )),
        Arc::new(label_list_array(sites.iter().map(|s| s.brands.clone()))),
        Arc::new(label_list_array(
            sites.iter().map(|s| s.categories.clone()),
        )),
    ];
    let batch = RecordBatch::try_new(schema(), columns)?;
    write_batch_atomic(path, schema(), &batch)?;
    info!(path = %path.display(), sites = sites.len(), "wrote anchor table");
    Ok(())
}

fn read_label_list(array: &ListArray, row: usize) -> Result<Vec<i32>, StoreError> {
    let values = array.value(row);
    let values = values
        .as_any()
        .downcast_ref::<Int32Array>()
        .ok_or_else(|| StoreError::Schema("label list items must be int32".to_string()))?;
    Ok(values.iter().flatten().collect())
}

/// Reads an anchor table written by [`write_anchor_table`].
///
/// # Errors
///
/// Besides I/O and schema errors, fails if a row's mode disagrees with
/// `mode` or `anchor_int_id`s are not dense and ascending.
pub fn read_anchor_table(path: &Path, mode: TravelMode) -> Result<AnchorTable, StoreError> {
    let mut sites = Vec::new();
    for batch in read_batches(path)? {
        let ids: &UInt32Array = column(&batch, path, "anchor_int_id")?;
        let site_ids: &FixedSizeBinaryArray = column(&batch, path, "site_id")?;
        let modes: &StringArray = column(&batch, path, "mode")?;
        let nodes: &UInt32Array = column(&batch, path, "node_id")?;
        let lon: &Float32Array = column(&batch, path, "lon")?;
        let lat: &Float32Array = column(&batch, path, "lat")?;
        let brands: &ListArray = column(&batch, path, "brands")?;
        let categories: &ListArray = column(&batch, path, "categories")?;

        for row in 0..batch.num_rows() {
            if modes.value(row) != mode.as_str() {
                return Err(StoreError::Schema(format!(
                    "anchor table row {row} is for mode {:?}, expected {mode}",
                    modes.value(row)
                )));
            }
            sites.push(AnchorSite {
                anchor_int_id: ids.value(row),
                site_id: Uuid::from_slice(site_ids.value(row))
                    .map_err(|e| StoreError::Schema(format!("bad site id: {e}")))?,
                node_id: nodes.value(row),
                lon: lon.value(row),
                lat: lat.value(row),
                poi_ids: Vec::new(),
                brands: read_label_list(brands, row)?,
                categories: read_label_list(categories, row)?,
            });
        }
    }

    if sites
        .iter()
        .enumerate()
        .any(|(i, s)| s.anchor_int_id as usize != i)
    {
        return Err(StoreError::Schema(
            "anchor_int_id must be dense and ascending".to_string(),
        ));
    }
    Ok(AnchorTable::new(mode, sites))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_table() -> AnchorTable {
        let sites = vec![
            AnchorSite {
                anchor_int_id: 0,
                site_id: AnchorSite::site_id_for(TravelMode::Drive, 17),
                node_id: 17,
                lon: 13.4,
                lat: 52.5,
                poi_ids: Vec::new(),
                brands: vec![2, 9],
                categories: vec![1],
            },
            AnchorSite {
                anchor_int_id: 1,
                site_id: AnchorSite::site_id_for(TravelMode::Drive, 99),
                node_id: 99,
                lon: 13.5,
                lat: 52.6,
                poi_ids: Vec::new(),
                brands: Vec::new(),
                categories: vec![1, 4],
            },
        ];
        AnchorTable::new(TravelMode::Drive, sites)
    }

    #[test]
    fn round_trips_sites_and_label_lists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("anchors.parquet");
        let table = sample_table();
        write_anchor_table(&path, &table).unwrap();
        let back = read_anchor_table(&path, TravelMode::Drive).unwrap();
        assert_eq!(back.sites(), table.sites());
    }

    #[test]
    fn wrong_mode_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("anchors.parquet");
        write_anchor_table(&path, &sample_table()).unwrap();
        assert!(matches!(
            read_anchor_table(&path, TravelMode::Walk),
            Err(StoreError::Schema(_))
        ));
    }
}
