//! Record sources
//!
//! Input is either a single JSON document (an object, or an array of
//! records) or newline-delimited JSON. Whole documents go through simd-json.
//! simd-json rejects integers wider than 64 bits, so a rejected document is
//! retried with serde_json, which keeps their digits, and then as NDJSON.

use anyhow::{Context, Result};
use serde_json::Value;
use std::io::{BufRead, BufReader, Read};

/// Read every record from `reader`.
///
/// A top-level array is treated as a stream of records.
pub fn read_records<R: Read>(reader: R) -> Result<Vec<Value>> {
    let mut content = Vec::new();
    BufReader::new(reader)
        .read_to_end(&mut content)
        .context("Failed to read input")?;

    // simd-json parses in place, so keep the original bytes for the fallback
    let mut scratch = content.clone();
    match simd_json::serde::from_slice::<Value>(&mut scratch) {
        Ok(document) => Ok(into_records(document)),
        Err(_) => match serde_json::from_slice::<Value>(&content) {
            Ok(document) => Ok(into_records(document)),
            Err(_) => parse_ndjson(&content),
        },
    }
}

fn into_records(document: Value) -> Vec<Value> {
    match document {
        Value::Array(records) => records,
        record => vec![record],
    }
}

fn parse_ndjson(content: &[u8]) -> Result<Vec<Value>> {
    let mut records = Vec::new();
    for (number, line) in content.split(|b| *b == b'\n').enumerate() {
        let line = line.trim_ascii();
        if line.is_empty() {
            continue;
        }
        let value: Value = serde_json::from_slice(line)
            .with_context(|| format!("Failed to parse JSON on line {}", number + 1))?;
        records.push(value);
    }
    Ok(records)
}

/// Lazily read flat rows from a newline-delimited JSON stream
pub fn ndjson_rows<R: BufRead>(reader: R) -> impl Iterator<Item = Result<serde_json::Map<String, Value>>> {
    serde_json::Deserializer::from_reader(reader)
        .into_iter::<serde_json::Map<String, Value>>()
        .map(|row| row.context("Failed to parse row"))
}
