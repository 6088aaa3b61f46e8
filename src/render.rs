//! Projection from stored content units to display-ready payloads.
//!
//! One pure function, used identically for just-produced units in a live
//! turn and for replayed history — which is the property that keeps "renders
//! live but shows as raw text on reload" defects impossible.

use crate::content::{ContentUnit, Scalar, Series};

use serde::Serialize;

/// Display-ready form of a content unit, one case per variant. Serialized
/// as-is to the web layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DisplayForm {
    /// Inline rich-text chat bubble.
    Text { text: String },
    /// Structured table payload: raw scalars for sorting/export plus
    /// pre-formatted cell strings for direct rendering.
    Table {
        columns: Vec<String>,
        rows: Vec<Vec<Scalar>>,
        display_rows: Vec<Vec<String>>,
    },
    /// Chart-library-ready payload; nothing needs re-querying.
    Chart {
        chart_type: String,
        title: String,
        series: Vec<Series>,
    },
}

impl DisplayForm {
    pub fn kind(&self) -> &'static str {
        match self {
            DisplayForm::Text { .. } => "text",
            DisplayForm::Table { .. } => "table",
            DisplayForm::Chart { .. } => "chart",
        }
    }
}

/// Project a stored content unit to its display form. Pure: no IO, no
/// engine calls, no dependence on whether the unit is live or replayed.
pub fn project(unit: &ContentUnit) -> DisplayForm {
    match unit {
        ContentUnit::Text { text } => DisplayForm::Text { text: text.clone() },
        ContentUnit::Table { columns, rows } => DisplayForm::Table {
            columns: columns.clone(),
            display_rows: rows
                .iter()
                .map(|row| row.iter().map(display_scalar).collect())
                .collect(),
            rows: rows.clone(),
        },
        ContentUnit::ChartSpec {
            chart_type,
            title,
            series,
        } => DisplayForm::Chart {
            chart_type: chart_type.as_str().to_string(),
            title: title.clone(),
            series: series.clone(),
        },
    }
}

fn display_scalar(scalar: &Scalar) -> String {
    match scalar {
        Scalar::Null => String::new(),
        Scalar::Bool(b) => b.to_string(),
        Scalar::Int(i) => i.to_string(),
        Scalar::Float(f) => f.to_string(),
        Scalar::Text(s) => s.clone(),
    }
}
