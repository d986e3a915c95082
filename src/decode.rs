//! Export file decoding
//!
//! Vendor exports arrive as plain UTF-8, gzip-compressed JSON, UTF-8 with a
//! byte-order mark, or occasionally with stray invalid bytes. Each encoding is a
//! strategy; strategies are tried in order and the first one that yields a
//! non-empty JSON array wins.

use flate2::read::GzDecoder;
use serde_json::Value;
use std::io::Read;

const UTF8_BOM: char = '\u{feff}';

/// One way of turning raw bytes into JSON text
pub type DecodeStrategy = fn(&[u8]) -> Option<String>;

/// Ordered decode strategies, first success wins
pub const DECODE_STRATEGIES: &[(&str, DecodeStrategy)] = &[
    ("utf8", strict_utf8),
    ("gzip", gzip_json),
    ("utf8_bom", utf8_with_bom),
    ("lossy", lossy_utf8),
];

/// Records decoded from an export file
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedRecords {
    /// Name of the strategy that produced the records
    pub strategy: &'static str,
    pub records: Vec<Value>,
}

/// Decode raw file bytes into a non-empty list of JSON records.
///
/// Returns `None` when no strategy produces a non-empty JSON array.
pub fn decode_records(bytes: &[u8]) -> Option<DecodedRecords> {
    DECODE_STRATEGIES.iter().find_map(|&(name, strategy)| {
        strategy(bytes)
            .and_then(|text| parse_record_array(&text))
            .map(|records| DecodedRecords {
                strategy: name,
                records,
            })
    })
}

fn parse_record_array(text: &str) -> Option<Vec<Value>> {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Array(records)) if !records.is_empty() => Some(records),
        _ => None,
    }
}

fn strict_utf8(bytes: &[u8]) -> Option<String> {
    std::str::from_utf8(bytes).ok().map(str::to_owned)
}

fn gzip_json(bytes: &[u8]) -> Option<String> {
    let mut decoder = GzDecoder::new(bytes);
    let mut inflated = Vec::new();
    decoder.read_to_end(&mut inflated).ok()?;
    let text = String::from_utf8(inflated).ok()?;
    Some(text.trim_start_matches(UTF8_BOM).to_owned())
}

fn utf8_with_bom(bytes: &[u8]) -> Option<String> {
    let text = std::str::from_utf8(bytes).ok()?;
    text.strip_prefix(UTF8_BOM).map(str::to_owned)
}

fn lossy_utf8(bytes: &[u8]) -> Option<String> {
    let text: String = String::from_utf8_lossy(bytes)
        .chars()
        .filter(|c| *c != char::REPLACEMENT_CHARACTER)
        .collect();
    Some(text.trim_start_matches(UTF8_BOM).to_owned())
}
