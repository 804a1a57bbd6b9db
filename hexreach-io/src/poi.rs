//! POI table reader (and a writer, used for fixtures and round-trip
//! tests; production POI tables come from the upstream pipeline).

use crate::util::{column, read_batches, u128_from_bytes, write_batch_atomic};
use crate::StoreError;
use arrow::array::{
    Array, ArrayRef, BooleanArray, FixedSizeBinaryArray, FixedSizeBinaryBuilder, Float32Array,
    Int32Array,
};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use hexreach_anchors::Poi;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

fn schema() -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("poi_id", DataType::FixedSizeBinary(16), false),
        Field::new("lon", DataType::Float32, false),
        Field::new("lat", DataType::Float32, false),
        Field::new("category_id", DataType::Int32, false),
        Field::new("brand_id", DataType::Int32, true),
        Field::new("anchorable", DataType::Boolean, false),
    ]))
}

/// # Errors
///
/// Arrow/parquet/I-O failures; the write is atomic, so a failure leaves
/// any previous file untouched.
pub fn write_poi_table(path: &Path, pois: &[Poi]) -> Result<(), StoreError> {
    let mut ids = FixedSizeBinaryBuilder::with_capacity(pois.len(), 16);
    for poi in pois {
        ids.append_value(poi.poi_id.to_le_bytes())?;
    }
    let columns: Vec<ArrayRef> = vec![
        Arc::new(ids.finish()),
        Arc::new(Float32Array::from(
            pois.iter().map(|p| p.lon).collect::<Vec<_>>(),
        )),
        Arc::new(Float32Array::from(
            pois.iter().map(|p| p.lat).collect::<Vec<_>>(),
        )),
        Arc::new(Int32Array::from(
            pois.iter().map(|p| p.category_id).collect::<Vec<_>>(),
        )),
        Arc::new(Int32Array::from(
            pois.iter().map(|p| p.brand_id).collect::<Vec<_>>(),
        )),
        Arc::new(BooleanArray::from(
            pois.iter().map(|p| p.anchorable).collect::<Vec<_>>(),
        )),
    ];
    let batch = RecordBatch::try_new(schema(), columns)?;
    write_batch_atomic(path, schema(), &batch)
}

/// Reads the whole POI table into memory.
///
/// # Errors
///
/// I/O and parquet failures, or [`StoreError::MissingColumn`] /
/// [`StoreError::Schema`] when the file does not match the contract.
pub fn read_poi_table(path: &Path) -> Result<Vec<Poi>, StoreError> {
    let mut pois = Vec::new();
    for batch in read_batches(path)? {
        let ids: &FixedSizeBinaryArray = column(&batch, path, "poi_id")?;
        let lon: &Float32Array = column(&batch, path, "lon")?;
        let lat: &Float32Array = column(&batch, path, "lat")?;
        let category: &Int32Array = column(&batch, path, "category_id")?;
        let brand: &Int32Array = column(&batch, path, "brand_id")?;
        let anchorable: &BooleanArray = column(&batch, path, "anchorable")?;

        for row in 0..batch.num_rows() {
            pois.push(Poi {
                poi_id: u128_from_bytes(ids.value(row))?,
                lon: lon.value(row),
                lat: lat.value(row),
                category_id: category.value(row),
                brand_id: brand.is_valid(row).then(|| brand.value(row)),
                anchorable: anchorable.value(row),
            });
        }
    }
    info!(path = %path.display(), pois = pois.len(), "read poi table");
    Ok(pois)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<Poi> {
        vec![
            Poi {
                poi_id: 0x0123_4567_89ab_cdef_0011_2233_4455_6677,
                lon: 13.4,
                lat: 52.5,
                category_id: 12,
                brand_id: Some(7),
                anchorable: true,
            },
            Poi {
                poi_id: 2,
                lon: -73.98,
                lat: 40.74,
                category_id: 3,
                brand_id: None,
                anchorable: false,
            },
        ]
    }

    #[test]
    fn round_trips_including_null_brand() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pois.parquet");
        write_poi_table(&path, &sample()).unwrap();
        let back = read_poi_table(&path).unwrap();
        assert_eq!(back, sample());
    }

    #[test]
    fn missing_column_is_reported_by_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.parquet");

        // A parquet file with a different schema entirely.
        let other = Arc::new(Schema::new(vec![Field::new("x", DataType::Int32, false)]));
        let batch = RecordBatch::try_new(
            other.clone(),
            vec![Arc::new(Int32Array::from(vec![1])) as ArrayRef],
        )
        .unwrap();
        crate::util::write_batch_atomic(&path, other, &batch).unwrap();

        match read_poi_table(&path) {
            Err(StoreError::MissingColumn { column, .. }) => assert_eq!(column, "poi_id"),
            other => panic!("expected MissingColumn, got {other:?}"),
        }
    }
}
