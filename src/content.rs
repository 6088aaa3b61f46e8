//! The tagged-union message payload and the codec that round-trips it
//! through storage.
//!
//! Every message body is exactly one `ContentUnit` variant, and the variant
//! tag survives the full write/read cycle. Decoding an unknown or missing
//! tag is a hard `MalformedContent` error — unrecognized payloads are never
//! quietly treated as text, because a table mis-rendered as its debug string
//! is worse than a surfaced failure.

use crate::error::{LedgerError, Result};
use serde::{Deserialize, Serialize};

/// Payload of a single message: plain text, a result table, or a chart
/// specification ready for a charting library to render without re-querying.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentUnit {
    Text {
        text: String,
    },
    Table {
        columns: Vec<String>,
        rows: Vec<Vec<Scalar>>,
    },
    ChartSpec {
        chart_type: ChartType,
        title: String,
        series: Vec<Series>,
    },
}

impl ContentUnit {
    pub fn text(text: impl Into<String>) -> Self {
        ContentUnit::Text { text: text.into() }
    }

    /// Variant tag as stored in the serialized form.
    pub fn tag(&self) -> &'static str {
        match self {
            ContentUnit::Text { .. } => "text",
            ContentUnit::Table { .. } => "table",
            ContentUnit::ChartSpec { .. } => "chart_spec",
        }
    }
}

/// A single table cell. Untagged: cells serialize as natural JSON scalars.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartType {
    Line,
    Bar,
    Pie,
}

impl ChartType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChartType::Line => "line",
            ChartType::Bar => "bar",
            ChartType::Pie => "pie",
        }
    }
}

impl std::fmt::Display for ChartType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One named series of labeled points — enough for the front end to render
/// the chart without going back to the data engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Series {
    pub name: String,
    pub points: Vec<SeriesPoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesPoint {
    pub label: String,
    pub value: f64,
}

const KNOWN_TAGS: &[&str] = &["text", "table", "chart_spec"];

/// Serialize a content unit to its storage form (tagged JSON).
///
/// Total for well-formed units. Panics only if serde_json fails on these
/// derive-only types, which it cannot for any constructible value — callers
/// never see an error from the write-side codec.
pub fn encode(unit: &ContentUnit) -> String {
    serde_json::to_string(unit).expect("content units serialize infallibly")
}

/// Deserialize a stored payload back into a content unit.
///
/// Fails with `MalformedContent` when the tag is missing, unrecognized, or
/// the body doesn't match the tag. There is deliberately no text fallback.
pub fn decode(raw: &str) -> Result<ContentUnit> {
    let value: serde_json::Value = serde_json::from_str(raw)
        .map_err(|error| LedgerError::MalformedContent(format!("invalid payload JSON: {error}")))?;

    let object = value
        .as_object()
        .ok_or_else(|| LedgerError::MalformedContent("payload is not an object".into()))?;

    let tag = object
        .get("type")
        .and_then(|t| t.as_str())
        .ok_or_else(|| LedgerError::MalformedContent("payload has no 'type' tag".into()))?
        .to_string();

    if !KNOWN_TAGS.contains(&tag.as_str()) {
        return Err(LedgerError::MalformedContent(format!(
            "unrecognized content tag '{tag}'"
        )));
    }

    serde_json::from_value(value).map_err(|error| {
        LedgerError::MalformedContent(format!("invalid '{tag}' payload: {error}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_table() -> ContentUnit {
        ContentUnit::Table {
            columns: vec!["region".into(), "price_usd_per_watt".into(), "yoy".into()],
            rows: vec![
                vec![
                    Scalar::Text("China".into()),
                    Scalar::Float(0.11),
                    Scalar::Float(-0.18),
                ],
                vec![Scalar::Text("EU".into()), Scalar::Float(0.15), Scalar::Null],
                vec![Scalar::Text("US".into()), Scalar::Float(0.27), Scalar::Bool(true)],
            ],
        }
    }

    fn sample_chart() -> ContentUnit {
        ContentUnit::ChartSpec {
            chart_type: ChartType::Line,
            title: "Module spot price, 12 months".into(),
            series: vec![Series {
                name: "mono PERC".into(),
                points: vec![
                    SeriesPoint {
                        label: "2025-07".into(),
                        value: 0.12,
                    },
                    SeriesPoint {
                        label: "2025-08".into(),
                        value: 0.11,
                    },
                ],
            }],
        }
    }

    /// Round-trip law: decode(encode(u)) == u for every variant.
    #[test]
    fn round_trips_every_variant() {
        for unit in [
            ContentUnit::text("module prices fell again this quarter"),
            sample_table(),
            sample_chart(),
        ] {
            let decoded = decode(&encode(&unit)).expect("well-formed unit should decode");
            assert_eq!(decoded, unit);
        }
    }

    /// Table scalars keep their types through the codec — ints stay ints,
    /// nulls stay nulls, nothing is stringified.
    #[test]
    fn table_scalars_keep_their_types() {
        let unit = ContentUnit::Table {
            columns: vec!["c".into()],
            rows: vec![vec![
                Scalar::Null,
                Scalar::Bool(false),
                Scalar::Int(42),
                Scalar::Float(0.5),
                Scalar::Text("42".into()),
            ]],
        };
        let decoded = decode(&encode(&unit)).expect("table should decode");
        assert_eq!(decoded, unit);
    }

    /// A payload with no tag is malformed, not text.
    #[test]
    fn missing_tag_is_rejected() {
        let error = decode(r#"{"text": "hello"}"#).expect_err("untagged payload must not decode");
        assert!(
            matches!(error, LedgerError::MalformedContent(_)),
            "unexpected error: {error}"
        );
    }

    /// An unknown tag is malformed, not text. This is the read-path defect
    /// the codec exists to prevent: a structured payload silently rendered
    /// as its string form.
    #[test]
    fn unknown_tag_is_rejected() {
        let error = decode(r#"{"type": "dataframe", "rows": []}"#)
            .expect_err("unknown tag must not decode");
        let message = error.to_string();
        assert!(message.contains("dataframe"), "unexpected error: {message}");
    }

    /// A bare string payload (the legacy storage form) is malformed.
    #[test]
    fn bare_string_is_rejected() {
        let error = decode(r#""just some text""#).expect_err("bare string must not decode");
        assert!(
            matches!(error, LedgerError::MalformedContent(_)),
            "unexpected error: {error}"
        );
    }

    /// A known tag with a mismatched body fails rather than decoding to a
    /// half-empty unit, and the error names the offending tag.
    #[test]
    fn tag_body_mismatch_is_rejected() {
        let error = decode(r#"{"type": "table", "text": "oops"}"#)
            .expect_err("tag/body mismatch must not decode");
        assert!(
            matches!(error, LedgerError::MalformedContent(_)),
            "unexpected error: {error}"
        );
        assert!(
            error.to_string().contains("'table'"),
            "error should name the tag: {error}"
        );
    }

    #[test]
    fn tag_matches_serialized_form() {
        for unit in [ContentUnit::text("x"), sample_table(), sample_chart()] {
            let encoded = encode(&unit);
            assert!(
                encoded.contains(&format!("\"type\":\"{}\"", unit.tag())),
                "encoded form should carry the unit's tag: {encoded}"
            );
        }
    }
}
