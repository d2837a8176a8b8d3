//! Post-fetch row corrections.
//!
//! Some extraction strategies cannot hand back the final value from SQL alone: the database returns
//! JSON as text, or the dialect cannot evaluate the sub-path at all and the raw document is fetched
//! instead. Each such node registers a [`Correction`], applied to every row after execution. A
//! failure never aborts the result set; the affected value becomes null.

use serde_json::{Map, Value};
use skein_ql::jsonpath::JsonPath;
use tracing::warn;

pub type Row = Map<String, Value>;

#[derive(Debug, Clone, PartialEq)]
pub enum Correction {
    /// The column holds JSON text; parse it. `default_array` turns a missing result into `[]`.
    ParseJson { key: String, default_array: bool },
    /// The column holds JSON text or a bare scalar string; parse it when it parses.
    ParseJsonLenient { key: String },
    /// The column holds the whole document; evaluate `path` against it in memory.
    Evaluate { key: String, path: JsonPath },
}

impl Correction {
    pub fn key(&self) -> &str {
        match self {
            Correction::ParseJson { key, .. } | Correction::ParseJsonLenient { key } | Correction::Evaluate { key, .. } => key,
        }
    }

    pub fn apply(&self, row: &mut Row) {
        let Some(value) = row.get_mut(self.key()) else { return };

        match self {
            Correction::ParseJson { key, default_array } => {
                if let Value::String(text) = value {
                    *value = match serde_json::from_str(text) {
                        Ok(parsed) => parsed,
                        Err(err) => {
                            warn!("could not parse {} as JSON: {}", key, err);
                            Value::Null
                        }
                    };
                }
                if *default_array && value.is_null() {
                    *value = Value::Array(Vec::new());
                }
            }
            Correction::ParseJsonLenient { .. } => {
                if let Value::String(text) = value {
                    if let Ok(parsed) = serde_json::from_str::<Value>(text) {
                        *value = parsed;
                    }
                }
            }
            Correction::Evaluate { key, path } => {
                let document = match value.take() {
                    Value::String(text) => match serde_json::from_str(&text) {
                        Ok(parsed) => parsed,
                        Err(err) => {
                            warn!("could not parse {} as JSON, skipping {}: {}", key, path, err);
                            return;
                        }
                    },
                    other => other,
                };
                *value = path.evaluate(&document);
            }
        }
    }
}

/// Apply every correction, in registration order, to every row.
pub fn apply_all(corrections: &[Correction], mut rows: Vec<Row>) -> Vec<Row> {
    if corrections.is_empty() {
        return rows;
    }
    for row in rows.iter_mut() {
        for correction in corrections {
            correction.apply(row);
        }
    }
    rows
}
