//! Structural checks over T_hex rows.
//!
//! Used by the `verify` subcommand after reading rows back from
//! storage, and by tests directly against in-memory aggregation.

use crate::GridError;
use crate::aggregate::HexRow;
use h3o::{CellIndex, Resolution};
use hexreach_kernels::SENTINEL_SECONDS;
use std::collections::HashMap;

/// Summary of a successful verification pass.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct VerifyReport {
    pub rows: usize,
    pub groups: usize,
    /// Distinct resolutions present, ascending.
    pub resolutions: Vec<u8>,
    /// Rows carrying the sentinel; any non-zero count fails the pass,
    /// the field exists so the failure message can quote the rate.
    pub sentinel_rows: usize,
}

/// Verifies K-distinctness, ascending seconds, sentinel containment,
/// and hierarchical monotonicity between adjacent resolutions.
///
/// # Errors
///
/// [`GridError::InvariantViolation`] naming the first failed check, or
/// [`GridError::InvalidCell`] for ids that fail to parse.
pub fn verify_rows(rows: &[HexRow]) -> Result<VerifyReport, GridError> {
    let sentinel_rows = rows
        .iter()
        .filter(|r| r.seconds == SENTINEL_SECONDS)
        .count();
    if sentinel_rows > 0 {
        return Err(GridError::InvariantViolation(format!(
            "{sentinel_rows} of {} rows carry the sentinel; sentinel rows must be omitted",
            rows.len()
        )));
    }

    // Stable sort by group key keeps each group's input order, so the
    // ascending-seconds check sees rows as they were written.
    let mut sorted: Vec<&HexRow> = rows.iter().collect();
    sorted.sort_by_key(|r| (r.res, r.h3_id));

    let mut groups = 0usize;
    for group in sorted.chunk_by(|a, b| (a.res, a.h3_id) == (b.res, b.h3_id)) {
        groups += 1;
        for pair in group.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            if (a.seconds, a.anchor_int_id) >= (b.seconds, b.anchor_int_id) {
                return Err(GridError::InvariantViolation(format!(
                    "group ({}, {:#x}) is not strictly ascending by (seconds, anchor)",
                    a.res, a.h3_id
                )));
            }
        }
        let mut anchors: Vec<i32> = group.iter().map(|r| r.anchor_int_id).collect();
        anchors.sort_unstable();
        anchors.dedup();
        if anchors.len() != group.len() {
            return Err(GridError::InvariantViolation(format!(
                "group ({}, {:#x}) repeats an anchor",
                group[0].res, group[0].h3_id
            )));
        }
    }

    let mut resolutions: Vec<u8> = rows.iter().map(|r| r.res).collect();
    resolutions.sort_unstable();
    resolutions.dedup();

    // Parent-never-slower across each adjacent resolution pair.
    for pair in resolutions.windows(2) {
        let (coarse_res, fine_res) = (pair[0], pair[1]);
        let target = Resolution::try_from(coarse_res)
            .map_err(|_| GridError::InvariantViolation(format!("resolution {coarse_res} out of range")))?;

        let coarse: HashMap<(u64, i32), u16> = rows
            .iter()
            .filter(|r| r.res == coarse_res)
            .map(|r| ((r.h3_id, r.anchor_int_id), r.seconds))
            .collect();
        for row in rows.iter().filter(|r| r.res == fine_res) {
            let cell =
                CellIndex::try_from(row.h3_id).map_err(|_| GridError::InvalidCell(row.h3_id))?;
            let parent: u64 = cell
                .parent(target)
                .ok_or(GridError::InvalidCell(row.h3_id))?
                .into();
            if let Some(&parent_seconds) = coarse.get(&(parent, row.anchor_int_id))
                && parent_seconds > row.seconds
            {
                return Err(GridError::InvariantViolation(format!(
                    "parent {parent:#x} reports anchor {} at {parent_seconds} s, \
                     slower than child {:#x} at {} s",
                    row.anchor_int_id, row.h3_id, row.seconds
                )));
            }
        }
    }

    Ok(VerifyReport {
        rows: rows.len(),
        groups,
        resolutions,
        sentinel_rows,
    })
}
