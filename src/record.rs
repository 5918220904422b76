//! Per-document records and the aggregate batch result.
//!
//! An [`ExtractionRecord`] is created once per input PDF and never mutated
//! afterwards. It serialises to one of three shapes:
//!
//! ```text
//! Extracted    {"invoice_number": "INV-1", "MAWB": null, ..., "filename": "a.pdf"}
//! ParseFailed  {"error": "Failed to parse JSON", "filename": "a.pdf"}
//! Failed       {"error": "<fatal error message>", "filename": "a.pdf"}   (continue_on_error only)
//! ```

use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::{Map, Value};
use std::path::Path;

/// Error message stored when the model reply is not a JSON object.
pub const PARSE_FAILURE_MESSAGE: &str = "Failed to parse JSON";

/// The per-document result.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractionRecord {
    /// The model produced a JSON object. `fields` never contains `filename`.
    Extracted {
        filename: String,
        fields: Map<String, Value>,
    },
    /// The model reply was not a JSON object.
    ParseFailed { filename: String },
    /// A fatal error was captured because `continue_on_error` was set.
    Failed { filename: String, error: String },
}

impl ExtractionRecord {
    /// Build a success record; a `filename` key from the model is overwritten.
    pub fn extracted(filename: impl Into<String>, mut fields: Map<String, Value>) -> Self {
        fields.shift_remove("filename");
        ExtractionRecord::Extracted {
            filename: filename.into(),
            fields,
        }
    }

    pub fn filename(&self) -> &str {
        match self {
            ExtractionRecord::Extracted { filename, .. }
            | ExtractionRecord::ParseFailed { filename }
            | ExtractionRecord::Failed { filename, .. } => filename,
        }
    }

    /// The `error` string, if this is a failure record.
    pub fn error(&self) -> Option<&str> {
        match self {
            ExtractionRecord::Extracted { .. } => None,
            ExtractionRecord::ParseFailed { .. } => Some(PARSE_FAILURE_MESSAGE),
            ExtractionRecord::Failed { error, .. } => Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ExtractionRecord::Extracted { .. })
    }

    /// The record as the JSON object written to the output file.
    pub fn to_json(&self) -> Value {
        let mut obj = Map::new();
        match self {
            ExtractionRecord::Extracted { filename, fields } => {
                obj.extend(fields.iter().map(|(k, v)| (k.clone(), v.clone())));
                obj.insert("filename".into(), Value::String(filename.clone()));
            }
            _ => {
                obj.insert("error".into(), Value::String(self.error().unwrap_or_default().into()));
                obj.insert("filename".into(), Value::String(self.filename().into()));
            }
        }
        Value::Object(obj)
    }
}

impl Serialize for ExtractionRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ExtractionRecord::Extracted { filename, fields } => {
                let mut map = serializer.serialize_map(Some(fields.len() + 1))?;
                for (k, v) in fields {
                    map.serialize_entry(k, v)?;
                }
                map.serialize_entry("filename", filename)?;
                map.end()
            }
            _ => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry("error", self.error().unwrap_or_default())?;
                map.serialize_entry("filename", self.filename())?;
                map.end()
            }
        }
    }
}

/// Make every value a string or `null`.
///
/// Numbers and booleans become their text; arrays and objects become compact
/// JSON text. Strings and `null` are left alone.
pub fn coerce_to_strings(fields: &mut Map<String, Value>) {
    for value in fields.values_mut() {
        let text = match value {
            Value::Null | Value::String(_) => continue,
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => n.to_string(),
            Value::Array(_) | Value::Object(_) => value.to_string(),
        };
        *value = Value::String(text);
    }
}

/// Counters for one batch run.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct BatchStats {
    /// Entries that passed the `.pdf` filter.
    pub total_files: usize,
    pub extracted: usize,
    pub parse_failures: usize,
    /// Fatal errors captured under `continue_on_error`.
    pub errors: usize,
    /// Files whose layout analysis degraded to empty content.
    pub empty_content: usize,
    pub total_prompt_tokens: u64,
    pub total_completion_tokens: u64,
    pub total_duration_ms: u64,
}

/// The Batch Result plus run statistics.
#[derive(Debug, Clone, serde::Serialize)]
pub struct BatchOutput {
    /// One record per input PDF, in directory-listing order.
    pub records: Vec<ExtractionRecord>,
    pub stats: BatchStats,
}

/// Render records as a JSON array indented by four spaces.
pub fn render_records(records: &[ExtractionRecord]) -> Result<Vec<u8>, serde_json::Error> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    records.serialize(&mut ser)?;
    Ok(buf)
}

/// File name component used in records and prompts.
pub fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(v: Value) -> Map<String, Value> {
        match v {
            Value::Object(m) => m,
            other => panic!("not an object: {other}"),
        }
    }

    #[test]
    fn extracted_record_appends_filename() {
        let rec = ExtractionRecord::extracted(
            "a.pdf",
            object(json!({"invoice_number": "INV-1", "MAWB": null})),
        );
        assert_eq!(
            rec.to_json(),
            json!({"invoice_number": "INV-1", "MAWB": null, "filename": "a.pdf"})
        );
        assert!(rec.is_success());
        assert_eq!(rec.error(), None);
    }

    #[test]
    fn model_filename_is_overwritten() {
        let rec = ExtractionRecord::extracted(
            "real.pdf",
            object(json!({"filename": "hallucinated.pdf", "Name": "ACME"})),
        );
        assert_eq!(rec.to_json(), json!({"Name": "ACME", "filename": "real.pdf"}));
    }

    #[test]
    fn parse_failure_shape() {
        let rec = ExtractionRecord::ParseFailed {
            filename: "b.pdf".into(),
        };
        assert_eq!(
            rec.to_json(),
            json!({"error": "Failed to parse JSON", "filename": "b.pdf"})
        );
        assert!(!rec.is_success());
    }

    #[test]
    fn serialize_matches_to_json_and_keeps_key_order() {
        let rec = ExtractionRecord::extracted(
            "a.pdf",
            object(json!({"zeta": "1", "alpha": "2"})),
        );
        let text = serde_json::to_string(&rec).unwrap();
        assert_eq!(text, r#"{"zeta":"1","alpha":"2","filename":"a.pdf"}"#);
        assert_eq!(serde_json::from_str::<Value>(&text).unwrap(), rec.to_json());
    }

    #[test]
    fn coerce_scalars_and_containers() {
        let mut fields = object(json!({
            "s": "x", "n": 42, "f": 1.5, "b": true, "z": null, "a": [1, 2], "o": {"k": "v"}
        }));
        coerce_to_strings(&mut fields);
        assert_eq!(
            Value::Object(fields),
            json!({
                "s": "x", "n": "42", "f": "1.5", "b": "true", "z": null,
                "a": "[1,2]", "o": "{\"k\":\"v\"}"
            })
        );
    }

    #[test]
    fn render_uses_four_space_indent() {
        let records = vec![ExtractionRecord::ParseFailed {
            filename: "a.pdf".into(),
        }];
        let text = String::from_utf8(render_records(&records).unwrap()).unwrap();
        assert!(text.starts_with("[\n    {\n        \"error\""), "got: {text}");
    }

    #[test]
    fn render_empty_batch() {
        let text = String::from_utf8(render_records(&[]).unwrap()).unwrap();
        assert_eq!(text, "[]");
    }

    #[test]
    fn display_name_strips_directory() {
        assert_eq!(display_name(Path::new("/tmp/in/a.pdf")), "a.pdf");
    }
}
