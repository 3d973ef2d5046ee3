//! Telemetry samples handed over by the acquisition engine

use chrono::{DateTime, Utc};
use rustc_hash::FxHashMap;
use serde::Deserialize;

use crate::value::Value;

/// Field carrying the sample timestamp (UNIX epoch seconds)
pub const TIMESTAMP_FIELD: &str = "dateTime";

/// One acquisition cycle worth of observations.
///
/// Owned by value once submitted; the worker never sees later mutation
/// by the producer.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct Sample {
    fields: FxHashMap<String, Value>,
}

impl Sample {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert, mostly for hosts and tests
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Sample time from the `dateTime` field, if present and numeric.
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        match self.fields.get(TIMESTAMP_FIELD)? {
            Value::Int(secs) => DateTime::from_timestamp(*secs, 0),
            Value::Float(secs) if secs.is_finite() => {
                DateTime::from_timestamp_millis((secs * 1000.0) as i64)
            }
            _ => None,
        }
    }

    /// Parse one JSON object into a sample.
    pub fn from_json(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Sample {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            fields: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}
