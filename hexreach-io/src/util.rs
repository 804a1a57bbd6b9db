//! Shared parquet plumbing: atomic single-batch writes and typed column
//! access.

use crate::StoreError;
use arrow::array::Array;
use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

/// Writes one batch to `path` via a `.tmp` sibling, fsync, rename.
pub(crate) fn write_batch_atomic(
    path: &Path,
    schema: SchemaRef,
    batch: &RecordBatch,
) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = tmp_sibling(path);
    let file = File::create(&tmp)?;
    let mut writer = ArrowWriter::try_new(file, schema, None)?;
    writer.write(batch)?;
    let file = writer.into_inner()?;
    file.sync_all()?;
    fs::rename(&tmp, path)?;
    Ok(())
}

fn tmp_sibling(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map_or_else(|| "out".to_string(), |n| n.to_string_lossy().into_owned());
    name.push_str(".tmp");
    path.with_file_name(name)
}

pub(crate) fn read_batches(path: &Path) -> Result<Vec<RecordBatch>, StoreError> {
    let file = File::open(path)?;
    let reader = ParquetRecordBatchReaderBuilder::try_new(file)?.build()?;
    reader
        .collect::<Result<Vec<_>, _>>()
        .map_err(StoreError::from)
}

/// Typed access to a named column.
pub(crate) fn column<'a, T: Array + 'static>(
    batch: &'a RecordBatch,
    path: &Path,
    name: &'static str,
) -> Result<&'a T, StoreError> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<T>())
        .ok_or_else(|| StoreError::MissingColumn {
            path: path.to_path_buf(),
            column: name,
        })
}

/// Decodes one fixed-size-binary value as a little-endian u128.
pub(crate) fn u128_from_bytes(bytes: &[u8]) -> Result<u128, StoreError> {
    let arr: [u8; 16] = bytes
        .try_into()
        .map_err(|_| StoreError::Schema(format!("id field has {} bytes, wanted 16", bytes.len())))?;
    Ok(u128::from_le_bytes(arr))
}
