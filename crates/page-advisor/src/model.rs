use std::collections::HashMap;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer};

use crate::error::AppError;

/// Structured report produced by the audit engine.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuditReport {
    /// URL the audit was asked to load.
    #[serde(rename = "requestedUrl", default)]
    pub requested_url: Option<String>,
    /// Aggregate scores keyed by category name, e.g. "performance", "best-practices".
    #[serde(default)]
    pub categories: HashMap<String, Category>,
    /// Individual audits in the order the engine reported them.
    #[serde(default, deserialize_with = "audits_in_report_order")]
    pub audits: Vec<AuditResult>,
}

/// Aggregate score for a group of audits.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Category {
    /// Fraction in [0, 1]; `None` means not applicable.
    #[serde(default)]
    pub score: Option<f64>,
}

/// A single measured check.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct AuditResult {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: String,
    /// Fraction in [0, 1]; `None` means the audit does not apply.
    #[serde(default)]
    pub score: Option<f64>,
    /// Markdown text, usually ending in a "Learn more" link.
    #[serde(default)]
    pub description: String,
}

impl AuditReport {
    /// Parse the engine's JSON output.
    pub fn from_json(raw: &str) -> Result<Self, AppError> {
        serde_json::from_str(raw)
            .map_err(|e| AppError::AuditFailure(format!("invalid report JSON: {e}")))
    }

    /// Score of a category, or `None` when absent, null, or outside [0, 1].
    pub fn category_score(&self, name: &str) -> Option<f64> {
        self.categories
            .get(name)
            .and_then(|c| c.score)
            .filter(|s| (0.0..=1.0).contains(s))
    }
}

/// The engine emits audits as a JSON object keyed by id. With `preserve_order` the map
/// iterates in document order, which ranking relies on for tie-breaking.
fn audits_in_report_order<'de, D>(deserializer: D) -> Result<Vec<AuditResult>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = serde_json::Map::<String, serde_json::Value>::deserialize(deserializer)?;
    raw.into_iter()
        .map(|(key, value)| {
            let mut audit: AuditResult = serde_json::from_value(value).map_err(D::Error::custom)?;
            if audit.id.is_empty() {
                audit.id = key;
            }
            Ok(audit)
        })
        .collect()
}
