//! Field projection: sample → output document via compiled filter expressions

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::expr::{self, EvalError, Expr, ParseError};
use crate::sample::Sample;
use crate::value::Value;

/// What to do when a filter fails for a reason other than a missing field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvalErrorPolicy {
    /// Fail the whole projection; the sample is abandoned
    #[default]
    Abandon,
    /// Leave the field out of the document, log at warn
    Skip,
}

/// Filter source that failed to compile
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectorError {
    pub field: String,
    pub expression: String,
    pub error: ParseError,
}

impl std::fmt::Display for ProjectorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "invalid filter for '{}' ({:?}): {}",
            self.field, self.expression, self.error
        )
    }
}

impl std::error::Error for ProjectorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

/// A filter that failed while projecting one sample
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: String,
    pub error: EvalError,
}

impl std::fmt::Display for FieldError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "filter '{}': {}", self.field, self.error)
    }
}

impl std::error::Error for FieldError {}

/// Evaluated output fields, keyed (and serialized) in sorted order.
///
/// Only successfully evaluated fields are present; an empty document is
/// still a valid document.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct OutputDocument(BTreeMap<String, Value>);

impl OutputDocument {
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Canonical JSON body
    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

impl FromIterator<(String, Value)> for OutputDocument {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[derive(Debug)]
struct Filter {
    field: String,
    source: String,
    expr: Expr,
}

/// Compiled set of output-field filters.
#[derive(Debug)]
pub struct FieldProjector {
    filters: Vec<Filter>,
    on_error: EvalErrorPolicy,
}

impl FieldProjector {
    /// Compile every filter up front; the first malformed source is returned
    /// as an error.
    pub fn compile<'a, I>(filters: I, on_error: EvalErrorPolicy) -> Result<Self, ProjectorError>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let filters = filters
            .into_iter()
            .map(|(field, source)| {
                expr::parse(source)
                    .map(|expr| Filter {
                        field: field.to_string(),
                        source: source.to_string(),
                        expr,
                    })
                    .map_err(|error| ProjectorError {
                        field: field.to_string(),
                        expression: source.to_string(),
                        error,
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        log::debug!("compiled {} filters", filters.len());
        Ok(Self { filters, on_error })
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// (output field, filter source, referenced sample fields) per filter
    pub fn describe(&self) -> impl Iterator<Item = (&str, &str, Vec<&str>)> {
        self.filters
            .iter()
            .map(|f| (f.field.as_str(), f.source.as_str(), f.expr.fields()))
    }

    /// Build the output document for one sample.
    ///
    /// Filters referencing fields the sample lacks are omitted silently. Other
    /// evaluation errors follow the configured [`EvalErrorPolicy`].
    pub fn project(&self, sample: &Sample) -> Result<OutputDocument, FieldError> {
        let mut out = BTreeMap::new();
        for filter in &self.filters {
            match filter.expr.eval(sample) {
                Ok(value) => {
                    out.insert(filter.field.clone(), value);
                }
                Err(e) if e.is_undefined_name() => {
                    log::trace!("{}: {e}, skipped", filter.field);
                }
                Err(e) if self.on_error == EvalErrorPolicy::Skip => {
                    log::warn!("{}: {e}, skipped", filter.field);
                }
                Err(error) => {
                    return Err(FieldError {
                        field: filter.field.clone(),
                        error,
                    });
                }
            }
        }
        Ok(OutputDocument(out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn projector(filters: &[(&str, &str)], on_error: EvalErrorPolicy) -> FieldProjector {
        FieldProjector::compile(filters.iter().copied(), on_error).unwrap()
    }

    #[test]
    fn missing_field_omitted_others_kept() {
        let p = projector(
            &[
                ("last-updated", "dateTime"),
                ("current.outTemp", "outTemp"),
                ("current.UV", "UV"),
            ],
            EvalErrorPolicy::Abandon,
        );
        let sample = Sample::new()
            .with("dateTime", 1_700_000_000i64)
            .with("outTemp", 72.5);

        let doc = p.project(&sample).unwrap();
        assert_eq!(doc.len(), 2);
        assert_eq!(doc.get("last-updated"), Some(&Value::Int(1_700_000_000)));
        assert_eq!(doc.get("current.outTemp"), Some(&Value::Float(72.5)));
        assert!(doc.get("current.UV").is_none());
    }

    #[test]
    fn all_fields_missing_gives_empty_document() {
        let p = projector(&[("a", "x"), ("b", "y + 1")], EvalErrorPolicy::Abandon);
        let doc = p.project(&Sample::new()).unwrap();
        assert!(doc.is_empty());
        assert_eq!(doc.to_json().unwrap(), b"{}");
    }

    #[test]
    fn type_error_abandons_by_default() {
        let p = projector(
            &[("ok", "outTemp"), ("bad", "windDir * 2")],
            EvalErrorPolicy::Abandon,
        );
        let sample = Sample::new().with("outTemp", 1.0).with("windDir", Value::Null);
        let err = p.project(&sample).unwrap_err();
        assert_eq!(err.field, "bad");
        assert!(matches!(err.error, EvalError::Type(_)));
    }

    #[test]
    fn type_error_skipped_when_configured() {
        let p = projector(
            &[("ok", "outTemp"), ("bad", "outTemp / 0")],
            EvalErrorPolicy::Skip,
        );
        let doc = p.project(&Sample::new().with("outTemp", 1.0)).unwrap();
        assert_eq!(doc.len(), 1);
        assert!(doc.get("ok").is_some());
    }

    #[test]
    fn compile_error_names_field() {
        let err = FieldProjector::compile(
            [("good", "outTemp"), ("broken", "outTemp +")],
            EvalErrorPolicy::Abandon,
        )
        .unwrap_err();
        assert_eq!(err.field, "broken");
        assert!(err.to_string().contains("invalid filter for 'broken'"));
    }

    #[test]
    fn projection_does_not_touch_sample() {
        let p = projector(&[("t", "outTemp * 2")], EvalErrorPolicy::Abandon);
        let sample = Sample::new().with("outTemp", 10i64);
        let before = sample.clone();
        p.project(&sample).unwrap();
        p.project(&sample).unwrap();
        assert_eq!(sample, before);
    }

    #[test]
    fn serializes_numbers_natively() {
        let p = projector(
            &[("outTemp", "outTemp"), ("last-updated", "dateTime")],
            EvalErrorPolicy::Abandon,
        );
        let sample = Sample::new()
            .with("outTemp", 72.5)
            .with("dateTime", 1_700_000_000i64);
        let body = p.project(&sample).unwrap().to_json().unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        let obj = json.as_object().unwrap();
        assert_eq!(obj.len(), 2);
        assert_eq!(obj["outTemp"], serde_json::json!(72.5));
        assert_eq!(obj["last-updated"], serde_json::json!(1_700_000_000));
        assert!(obj["last-updated"].is_i64());
    }

    #[test]
    fn iterates_in_key_order() {
        let p = projector(
            &[("z.last", "outTemp"), ("a.first", "dateTime"), ("m.gone", "UV")],
            EvalErrorPolicy::Abandon,
        );
        let sample = Sample::new().with("outTemp", 1.5).with("dateTime", 7i64);
        let doc = p.project(&sample).unwrap();
        let fields: Vec<_> = doc.iter().collect();
        assert_eq!(
            fields,
            vec![("a.first", &Value::Int(7)), ("z.last", &Value::Float(1.5))]
        );
    }

    #[test]
    fn collected_document_matches_projection() {
        let built: OutputDocument = [
            ("outTemp".to_string(), Value::Float(72.5)),
            ("last-updated".to_string(), Value::Int(1_700_000_000)),
        ]
        .into_iter()
        .collect();
        assert_eq!(
            built.to_json().unwrap(),
            br#"{"last-updated":1700000000,"outTemp":72.5}"#
        );

        let p = projector(
            &[("outTemp", "outTemp"), ("last-updated", "dateTime")],
            EvalErrorPolicy::Abandon,
        );
        let sample: Sample = [
            ("outTemp", Value::Float(72.5)),
            ("dateTime", Value::Int(1_700_000_000)),
        ]
        .into_iter()
        .collect();
        assert_eq!(p.project(&sample).unwrap(), built);
    }

    #[test]
    fn describe_lists_referenced_fields() {
        let p = projector(&[("dew", "dewpoint - outTemp")], EvalErrorPolicy::Abandon);
        let rows: Vec<_> = p.describe().collect();
        assert_eq!(rows, vec![("dew", "dewpoint - outTemp", vec!["dewpoint", "outTemp"])]);
    }
}
