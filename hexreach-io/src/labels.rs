//! Per-label runtime limits.
//!
//! The config file is a JSON object mapping label ids to
//! `{max_minutes, top_k}`, with a required `"default"` entry covering
//! every label not listed explicitly:
//!
//! ```json
//! {
//!     "default": { "max_minutes": 60, "top_k": 12 },
//!     "101": { "max_minutes": 180, "top_k": 8 }
//! }
//! ```

use crate::StoreError;
use hexreach_kernels::LabelLimits;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Copy, Clone, Deserialize)]
struct RawEntry {
    max_minutes: u32,
    top_k: usize,
}

impl RawEntry {
    fn limits(self) -> LabelLimits {
        LabelLimits {
            max_seconds: self.max_minutes * 60,
            top_k: self.top_k,
        }
    }
}

/// Resolved limits table with a default fallback.
#[derive(Debug, Clone)]
pub struct LabelLimitsTable {
    default: LabelLimits,
    per_label: BTreeMap<i32, LabelLimits>,
}

impl LabelLimitsTable {
    /// Parses the JSON config.
    ///
    /// # Errors
    ///
    /// [`StoreError::Json`] on malformed JSON, [`StoreError::Schema`] if
    /// the `default` entry is absent or a key is not a label id.
    pub fn from_json_str(json: &str) -> Result<LabelLimitsTable, StoreError> {
        let raw: BTreeMap<String, RawEntry> = serde_json::from_str(json)?;
        let mut default = None;
        let mut per_label = BTreeMap::new();
        for (key, entry) in raw {
            if key == "default" {
                default = Some(entry.limits());
            } else {
                let label: i32 = key
                    .parse()
                    .map_err(|_| StoreError::Schema(format!("bad label id key {key:?}")))?;
                per_label.insert(label, entry.limits());
            }
        }
        let default = default
            .ok_or_else(|| StoreError::Schema("label limits config needs a 'default' entry".to_string()))?;
        Ok(LabelLimitsTable { default, per_label })
    }

    /// # Errors
    ///
    /// As [`LabelLimitsTable::from_json_str`], plus I/O failures reading
    /// the file.
    pub fn from_json_path(path: &Path) -> Result<LabelLimitsTable, StoreError> {
        LabelLimitsTable::from_json_str(&std::fs::read_to_string(path)?)
    }

    pub fn limits_for(&self, label_id: i32) -> LabelLimits {
        self.per_label.get(&label_id).copied().unwrap_or(self.default)
    }

    /// Labels with explicit entries, ascending.
    pub fn listed_labels(&self) -> impl Iterator<Item = i32> + '_ {
        self.per_label.keys().copied()
    }
}

impl Default for LabelLimitsTable {
    /// Local-amenity defaults: an hour of travel, a dozen rows kept.
    fn default() -> LabelLimitsTable {
        LabelLimitsTable {
            default: LabelLimits {
                max_seconds: 60 * 60,
                top_k: 12,
            },
            per_label: BTreeMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_entry_overrides_default() {
        let table = LabelLimitsTable::from_json_str(
            r#"{
                "default": { "max_minutes": 60, "top_k": 12 },
                "101": { "max_minutes": 180, "top_k": 8 }
            }"#,
        )
        .unwrap();
        assert_eq!(
            table.limits_for(101),
            LabelLimits {
                max_seconds: 180 * 60,
                top_k: 8
            }
        );
        assert_eq!(
            table.limits_for(7),
            LabelLimits {
                max_seconds: 3600,
                top_k: 12
            }
        );
        assert_eq!(table.listed_labels().collect::<Vec<_>>(), vec![101]);
    }

    #[test]
    fn missing_default_is_rejected() {
        let err = LabelLimitsTable::from_json_str(r#"{"1": {"max_minutes": 5, "top_k": 1}}"#)
            .expect_err("no default");
        assert!(matches!(err, StoreError::Schema(_)));
    }

    #[test]
    fn non_numeric_key_is_rejected() {
        let err = LabelLimitsTable::from_json_str(
            r#"{"default": {"max_minutes": 5, "top_k": 1}, "groceries": {"max_minutes": 5, "top_k": 1}}"#,
        )
        .expect_err("bad key");
        assert!(matches!(err, StoreError::Schema(_)));
    }
}
