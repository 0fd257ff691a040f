// src/review/extraction.rs
//! Extraction results as returned by the backend's upload-and-extract endpoint.
//!
//! Two response shapes exist in the wild:
//!
//! - **Structured**: `grid_structure` plus `row1`, `row2`, … objects mapping
//!   position keys (`"1"`, `"2"`, …) to `{ "number", "confidence": "95%" }`.
//! - **Legacy text**: an `extractedText` block (`Row row1:` / `Position 1: X (95%)`)
//!   with a flat `containerNumbers` list, at the top level or nested under `data`.
//!
//! Decoding is lenient: missing or malformed fields fall back to defaults and
//! never fail the image. Shape selection happens once, here, so the normalizer
//! only ever sees an [`ExtractionPayload`].

use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// One position as reported by the structured response.
#[derive(Debug, Clone, PartialEq)]
pub struct RawPosition {
    pub number: String,
    /// Confidence text as received (`"95%"`), parsed later by the normalizer.
    pub confidence: String,
}

/// A container from the legacy flat list.
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerNumber {
    pub number: String,
    pub confidence: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExtractionPayload {
    Structured {
        rows: u32,
        columns: u32,
        cells: BTreeMap<u32, BTreeMap<u32, RawPosition>>,
    },
    LegacyText {
        text: String,
        containers: Vec<ContainerNumber>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionResult {
    /// Backend-assigned image id; required for edits and commits.
    pub remote_image_id: Option<String>,
    pub image_name: Option<String>,
    pub total_containers: u32,
    pub average_confidence: f32,
    pub payload: ExtractionPayload,
}

impl ExtractionResult {
    pub fn from_json(value: &Value) -> Self {
        let empty = Map::new();
        let root = value.as_object().unwrap_or(&empty);
        let nested = root.get("data").and_then(Value::as_object);

        let remote_image_id = string_field(root, "imageId")
            .or_else(|| nested.and_then(|data| string_field(data, "imageId")));
        let image_name = string_field(root, "imageName");

        let payload = if is_structured(root) {
            structured_payload(root)
        } else {
            legacy_payload(root, nested)
        };

        let total_containers = root
            .get("totalContainers")
            .and_then(number_value)
            .map(|n| n.max(0.0) as u32)
            .unwrap_or_else(|| payload.populated_count() as u32);
        let average_confidence = root
            .get("averageConfidence")
            .and_then(number_value)
            .or_else(|| nested.and_then(|data| data.get("confidence")).and_then(number_value))
            .map(|n| n as f32)
            .unwrap_or(0.0);

        Self {
            remote_image_id,
            image_name,
            total_containers,
            average_confidence,
            payload,
        }
    }
}

impl ExtractionPayload {
    fn populated_count(&self) -> usize {
        match self {
            ExtractionPayload::Structured { cells, .. } => cells
                .values()
                .flat_map(|row| row.values())
                .filter(|p| !p.number.trim().is_empty())
                .count(),
            ExtractionPayload::LegacyText { containers, .. } => containers.len(),
        }
    }
}

fn is_structured(root: &Map<String, Value>) -> bool {
    root.get("grid_structure").map_or(false, Value::is_object)
        || root
            .iter()
            .any(|(key, value)| row_index(key).is_some() && value.is_object())
}

fn structured_payload(root: &Map<String, Value>) -> ExtractionPayload {
    let grid = root.get("grid_structure").and_then(Value::as_object);
    let declared = |key: &str| {
        grid.and_then(|g| g.get(key))
            .and_then(number_value)
            .map(|n| n.max(0.0) as u32)
            .unwrap_or(0)
    };

    let mut cells: BTreeMap<u32, BTreeMap<u32, RawPosition>> = BTreeMap::new();
    for (key, value) in root {
        let (Some(row), Some(positions)) = (row_index(key), value.as_object()) else {
            continue;
        };
        let row_cells = cells.entry(row).or_default();
        for (position_key, entry) in positions {
            let Ok(position) = position_key.trim().parse::<u32>() else {
                continue;
            };
            if position == 0 {
                continue;
            }
            row_cells.insert(position, raw_position(entry));
        }
    }

    ExtractionPayload::Structured {
        rows: declared("rows"),
        columns: declared("columns"),
        cells,
    }
}

fn legacy_payload(
    root: &Map<String, Value>,
    nested: Option<&Map<String, Value>>,
) -> ExtractionPayload {
    let text = string_field(root, "extractedText")
        .or_else(|| nested.and_then(|data| string_field(data, "extractedText")))
        .unwrap_or_default();
    let containers = root
        .get("containerNumbers")
        .or_else(|| nested.and_then(|data| data.get("containerNumbers")))
        .and_then(Value::as_array)
        .map(|list| list.iter().filter_map(container_number).collect())
        .unwrap_or_default();
    ExtractionPayload::LegacyText { text, containers }
}

/// `"row12"` → `Some(12)`; row 0 is not a valid row.
fn row_index(key: &str) -> Option<u32> {
    let digits = key.strip_prefix("row")?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse::<u32>().ok().filter(|&n| n > 0)
}

fn raw_position(entry: &Value) -> RawPosition {
    match entry {
        Value::Object(map) => RawPosition {
            number: map.get("number").map(text_value).unwrap_or_default(),
            confidence: map.get("confidence").map(text_value).unwrap_or_default(),
        },
        // A bare string is a serial without a confidence.
        Value::String(s) => RawPosition {
            number: s.clone(),
            confidence: String::new(),
        },
        _ => RawPosition {
            number: String::new(),
            confidence: String::new(),
        },
    }
}

fn container_number(entry: &Value) -> Option<ContainerNumber> {
    let map = entry.as_object()?;
    let number = map.get("number").map(text_value)?;
    let confidence = map
        .get("confidence")
        .map(|c| match c {
            Value::String(s) => super::grid::parse_confidence(s),
            other => number_value(other).unwrap_or(0.0) as f32,
        })
        .unwrap_or(0.0);
    Some(ContainerNumber { number, confidence })
}

fn string_field(map: &Map<String, Value>, key: &str) -> Option<String> {
    match map.get(key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn text_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn number_value(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().trim_end_matches('%').trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|n| n.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_structured_response() {
        let value = json!({
            "imageId": "img-1",
            "imageName": "pallet.jpg",
            "success": true,
            "grid_structure": { "rows": 2, "columns": 3, "total_products": 5 },
            "totalContainers": 5,
            "averageConfidence": 91.5,
            "row2": { "1": { "number": "C", "confidence": "80%" } },
            "row1": {
                "3": { "number": "B", "confidence": "95%" },
                "1": { "number": "A", "confidence": "90%" }
            }
        });
        let result = ExtractionResult::from_json(&value);
        assert_eq!(result.remote_image_id.as_deref(), Some("img-1"));
        assert_eq!(result.total_containers, 5);
        assert_eq!(result.average_confidence, 91.5);
        let ExtractionPayload::Structured { rows, columns, cells } = result.payload else {
            panic!("expected structured payload");
        };
        assert_eq!((rows, columns), (2, 3));
        assert_eq!(cells[&1][&3].number, "B");
        assert_eq!(cells[&2][&1].confidence, "80%");
    }

    #[test]
    fn decodes_nested_legacy_response() {
        let value = json!({
            "data": {
                "imageId": "legacy-7",
                "extractedText": "Row row1:\nPosition 1: X-1 (93%)",
                "containerNumbers": [{ "number": "X-1", "confidence": 93 }],
                "confidence": 93
            }
        });
        let result = ExtractionResult::from_json(&value);
        assert_eq!(result.remote_image_id.as_deref(), Some("legacy-7"));
        assert_eq!(result.total_containers, 1);
        match result.payload {
            ExtractionPayload::LegacyText { text, containers } => {
                assert!(text.starts_with("Row row1:"));
                assert_eq!(containers[0].confidence, 93.0);
            }
            other => panic!("expected legacy payload, got {:?}", other),
        }
    }

    #[test]
    fn garbage_degrades_to_empty_legacy_payload() {
        let result = ExtractionResult::from_json(&json!(["not", "an", "object"]));
        assert_eq!(result.remote_image_id, None);
        assert_eq!(
            result.payload,
            ExtractionPayload::LegacyText {
                text: String::new(),
                containers: Vec::new()
            }
        );
    }

    #[test]
    fn row_keys_must_be_numbered() {
        assert_eq!(row_index("row1"), Some(1));
        assert_eq!(row_index("row10"), Some(10));
        assert_eq!(row_index("row0"), None);
        assert_eq!(row_index("rowx"), None);
        assert_eq!(row_index("rows"), None);
    }
}
