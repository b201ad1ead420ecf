//! Log category definitions.
//!
//! Each category is an independently paginated upstream stream with its own
//! selector parameters and its own timestamp field.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

fn default_id_field() -> String {
    "_id".to_string()
}

fn default_lower_bound_param() -> String {
    "created_timestamp".to_string()
}

/// One configured upstream log stream. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogCategory {
    /// Stable identifier, also the key in the persisted last-run map.
    pub id: String,
    /// Category-specific query parameters (e.g. `app`, `subtype`).
    #[serde(default)]
    pub selector: BTreeMap<String, String>,
    /// Record field carrying the event timestamp.
    pub timestamp_field: String,
    /// Record field carrying the unique record identifier.
    #[serde(default = "default_id_field")]
    pub id_field: String,
    /// Query parameter the upstream filters the lower bound on.
    #[serde(default = "default_lower_bound_param")]
    pub lower_bound_param: String,
    /// Value written to the `type` field of accepted records.
    #[serde(default)]
    pub event_label: Option<String>,
    /// Overrides the global first-fetch expression.
    #[serde(default)]
    pub first_fetch: Option<String>,
    /// Upstream retention window; first fetches older than this are clamped.
    #[serde(default)]
    pub max_lookback_days: Option<u32>,
    /// Overrides the global per-cycle record budget.
    #[serde(default)]
    pub max_fetch: Option<usize>,
}

impl LogCategory {
    /// The two Cloud SOC log streams, in collection order.
    pub fn builtin() -> Vec<LogCategory> {
        vec![
            LogCategory {
                id: "Investigate_logs".into(),
                selector: BTreeMap::from([
                    ("app".into(), "Investigate".into()),
                    ("subtype".into(), "all".into()),
                ]),
                timestamp_field: "created_timestamp".into(),
                id_field: default_id_field(),
                lower_bound_param: default_lower_bound_param(),
                event_label: Some("Investigate".into()),
                first_fetch: None,
                max_lookback_days: Some(180),
                max_fetch: None,
            },
            LogCategory {
                id: "Incident_logs".into(),
                selector: BTreeMap::from([
                    ("app".into(), "Detect".into()),
                    ("subtype".into(), "incidents".into()),
                ]),
                timestamp_field: "incident_start_time".into(),
                id_field: default_id_field(),
                lower_bound_param: default_lower_bound_param(),
                event_label: Some("Detect incident".into()),
                first_fetch: None,
                max_lookback_days: None,
                max_fetch: None,
            },
        ]
    }

    /// Record budget for this category, falling back to `global`.
    pub fn budget(&self, global: usize) -> usize {
        self.max_fetch.unwrap_or(global)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.id.trim().is_empty() {
            return Err(ConfigError::Category("category id is empty".into()));
        }
        if self.timestamp_field.trim().is_empty() {
            return Err(ConfigError::Category(format!(
                "{}: timestamp_field is empty",
                self.id
            )));
        }
        if self.lower_bound_param.trim().is_empty() {
            return Err(ConfigError::Category(format!(
                "{}: lower_bound_param is empty",
                self.id
            )));
        }
        if self.id_field.trim().is_empty() {
            return Err(ConfigError::Category(format!(
                "{}: id_field is empty",
                self.id
            )));
        }
        Ok(())
    }
}

/// Parse and validate a JSON array of category definitions.
///
/// Order is preserved; it is the order categories are reported in.
pub fn parse_categories(json: &str) -> Result<Vec<LogCategory>, ConfigError> {
    let categories: Vec<LogCategory> =
        serde_json::from_str(json).map_err(|e| ConfigError::Category(e.to_string()))?;
    if categories.is_empty() {
        return Err(ConfigError::Category("no categories defined".into()));
    }
    let mut seen = HashSet::new();
    for category in &categories {
        category.validate()?;
        if !seen.insert(category.id.as_str()) {
            return Err(ConfigError::Category(format!(
                "duplicate category id {}",
                category.id
            )));
        }
    }
    Ok(categories)
}
