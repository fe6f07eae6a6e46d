//! Turns the downloaded JSON document into newline-delimited JSON.
//!
//! The records live in an array under a configurable root key. Each record
//! must be an object; its top-level keys are rewritten so that every run of
//! non-word characters becomes a single underscore.

use regex::Regex;
use serde_json::{Map, Value};
use std::borrow::Cow;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::LazyLock;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

static NON_WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\W+").expect("valid regex"));

#[derive(thiserror::Error, Debug)]
pub enum ReshapeError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("response is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("response is not a JSON object")]
    NotAnObject,

    #[error("root element '{0}' not found in response")]
    MissingRootElement(String),

    #[error("root element '{0}' is not an array")]
    RootNotArray(String),

    #[error("record {0} is not a JSON object")]
    RecordNotObject(usize),
}

pub fn sanitize_key(key: &str) -> Cow<'_, str> {
    NON_WORD.replace_all(key, "_")
}

/// Sanitizes the keys of one record. On collisions the later value wins and
/// the key keeps the position it was first seen at.
pub fn sanitize_record(record: Map<String, Value>) -> Map<String, Value> {
    let mut out = Map::with_capacity(record.len());
    for (key, value) in record {
        out.insert(sanitize_key(&key).into_owned(), value);
    }
    out
}

/// Extracts and sanitizes the records under `root_element`.
pub fn extract_records(raw: &[u8], root_element: &str) -> Result<Vec<Map<String, Value>>, ReshapeError> {
    let raw = raw.strip_prefix(UTF8_BOM).unwrap_or(raw);

    let Value::Object(mut document) = serde_json::from_slice::<Value>(raw)? else {
        return Err(ReshapeError::NotAnObject);
    };
    let root = document
        .remove(root_element)
        .ok_or_else(|| ReshapeError::MissingRootElement(root_element.to_string()))?;
    let Value::Array(records) = root else {
        return Err(ReshapeError::RootNotArray(root_element.to_string()));
    };

    records
        .into_iter()
        .enumerate()
        .map(|(index, record)| match record {
            Value::Object(map) => Ok(sanitize_record(map)),
            _ => Err(ReshapeError::RecordNotObject(index)),
        })
        .collect()
}

pub fn write_ndjson<W: Write>(writer: W, records: &[Map<String, Value>]) -> Result<(), ReshapeError> {
    let mut writer = BufWriter::new(writer);
    for record in records {
        serde_json::to_writer(&mut writer, record)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    Ok(())
}

/// Reads `raw_path`, writes one record per line to `output_path` and returns
/// the record count.
pub fn convert_to_ndjson(
    raw_path: &Path,
    output_path: &Path,
    root_element: &str,
) -> Result<usize, ReshapeError> {
    let raw = std::fs::read(raw_path)?;
    let records = extract_records(&raw, root_element)?;
    write_ndjson(File::create(output_path)?, &records)?;
    Ok(records.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_sanitize_key() {
        assert_eq!(sanitize_key("plain_key"), "plain_key");
        assert_eq!(sanitize_key("Cost (USD)"), "Cost_USD_");
        assert_eq!(sanitize_key("a.b-c  d"), "a_b_c_d");
        assert_eq!(sanitize_key("--lead"), "_lead");
        // unicode letters are word characters
        assert_eq!(sanitize_key("Größe €"), "Größe_");
        assert!(matches!(sanitize_key("unchanged"), Cow::Borrowed(_)));
    }

    #[test]
    fn test_extract_records() {
        let raw = br#"{"meta":{"n":2},"data":[{"Ad Name":"x","clicks":1},{"Ad Name":"y","nested":{"a b":1}}]}"#;
        let records = extract_records(raw, "data").unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(Value::Object(records[0].clone()), json!({"Ad_Name": "x", "clicks": 1}));
        // nested keys are left alone
        assert_eq!(records[1]["nested"], json!({"a b": 1}));
    }

    #[test]
    fn test_collision_keeps_first_position_last_value() {
        let raw = br#"{"data":[{"a b":1,"z":0,"a-b":2}]}"#;
        let records = extract_records(raw, "data").unwrap();
        let keys: Vec<&str> = records[0].keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["a_b", "z"]);
        assert_eq!(records[0]["a_b"], json!(2));
    }

    #[test]
    fn test_bom_is_skipped() {
        let mut raw = UTF8_BOM.to_vec();
        raw.extend_from_slice(br#"{"data":[{"k":true}]}"#);
        assert_eq!(extract_records(&raw, "data").unwrap().len(), 1);
    }

    #[test]
    fn test_shape_errors() {
        assert!(matches!(
            extract_records(b"[1,2]", "data"),
            Err(ReshapeError::NotAnObject)
        ));
        assert!(matches!(
            extract_records(br#"{"rows":[]}"#, "data"),
            Err(ReshapeError::MissingRootElement(_))
        ));
        assert!(matches!(
            extract_records(br#"{"data":{"a":1}}"#, "data"),
            Err(ReshapeError::RootNotArray(_))
        ));
        assert!(matches!(
            extract_records(br#"{"data":[{"a":1},2]}"#, "data"),
            Err(ReshapeError::RecordNotObject(1))
        ));
        assert!(matches!(
            extract_records(b"{not json", "data"),
            Err(ReshapeError::Json(_))
        ));
    }

    #[test]
    fn test_convert_to_ndjson() {
        let dir = tempfile::tempdir().unwrap();
        let raw_path = dir.path().join("raw.json");
        let output_path = dir.path().join("out.json");
        std::fs::write(
            &raw_path,
            r#"{"data":[{"first name":"Ada","id":1},{"first name":"Alan","id":2}]}"#,
        )
        .unwrap();

        let count = convert_to_ndjson(&raw_path, &output_path, "data").unwrap();
        assert_eq!(count, 2);
        assert_eq!(
            std::fs::read_to_string(&output_path).unwrap(),
            "{\"first_name\":\"Ada\",\"id\":1}\n{\"first_name\":\"Alan\",\"id\":2}\n"
        );
    }

    #[test]
    fn test_numbers_keep_their_digits() {
        let raw = br#"{"data":[{"id":123456789012345678901234567890,"n":-9223372036854775809,"rate":0.10000000000000000001}]}"#;
        let records = extract_records(raw, "data").unwrap();

        let mut out = Vec::new();
        write_ndjson(&mut out, &records).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "{\"id\":123456789012345678901234567890,\"n\":-9223372036854775809,\"rate\":0.10000000000000000001}\n"
        );
    }

    #[test]
    fn test_empty_array_writes_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let raw_path = dir.path().join("raw.json");
        let output_path = dir.path().join("out.json");
        std::fs::write(&raw_path, r#"{"data":[]}"#).unwrap();

        assert_eq!(convert_to_ndjson(&raw_path, &output_path, "data").unwrap(), 0);
        assert_eq!(std::fs::read_to_string(&output_path).unwrap(), "");
    }
}
