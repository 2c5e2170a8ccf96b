use anyhow::{anyhow, Context, Result};
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::Value;

use crate::report::{Cell, Row};

/// One flattened section or line of the aggregate report, keyed by the
/// normalized label. Serializes as `{key: {"Lines": [...], "Total": n}}`,
/// with nested lines repeating the same shape.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryLine {
    pub key: String,
    pub lines: Vec<SummaryLine>,
    pub total: f64,
}

impl SummaryLine {
    /// The `{"Lines": [...], "Total": n}` body, without the key wrapper.
    /// Used when merging sibling lines into a single keyed mapping.
    pub fn body(&self) -> Value {
        serde_json::json!({
            "Lines": self.lines,
            "Total": self.total,
        })
    }
}

impl Serialize for SummaryLine {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        #[derive(serde::Serialize)]
        struct Body<'a> {
            #[serde(rename = "Lines")]
            lines: &'a [SummaryLine],
            #[serde(rename = "Total")]
            total: f64,
        }
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(
            &self.key,
            &Body {
                lines: &self.lines,
                total: self.total,
            },
        )?;
        map.end()
    }
}

/// Flatten the row tree for one data column. Walks every row under `rows`:
/// sections recurse into `Lines` and take their `Total` from the closing
/// summary, summary-only and plain leaf rows become childless lines. The
/// value at `column_index` within each row's cells is the one extracted,
/// so callers pass the Money-column ordinal offset by the label column.
pub fn flatten_rows(rows: &[Row], column_index: usize) -> Result<Vec<SummaryLine>> {
    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        if row.row_type.as_deref() == Some("Section") && row.rows.is_some() {
            let header = row
                .header
                .as_ref()
                .ok_or_else(|| anyhow!("section row has no header"))?;
            let summary = row
                .summary
                .as_ref()
                .ok_or_else(|| anyhow!("section row has no closing summary"))?;
            let key = section_key(cell_value(&header.col_data, 0)?);
            let total = money_value(cell_value(&summary.col_data, column_index)?)
                .with_context(|| format!("section `{key}` total"))?;
            let children = row.rows.as_ref().map(|r| r.rows()).unwrap_or_default();
            let lines = flatten_rows(children, column_index)?;
            out.push(SummaryLine { key, lines, total });
        } else if let Some(summary) = &row.summary {
            let key = section_key(cell_value(&summary.col_data, 0)?);
            let total = money_value(cell_value(&summary.col_data, column_index)?)
                .with_context(|| format!("summary `{key}` total"))?;
            out.push(SummaryLine {
                key,
                lines: Vec::new(),
                total,
            });
        } else {
            let cells = row.col_data.as_deref().unwrap_or_default();
            let key = section_key(cell_value(cells, 0)?);
            let total = money_value(cell_value(cells, column_index)?)
                .with_context(|| format!("line `{key}` value"))?;
            out.push(SummaryLine {
                key,
                lines: Vec::new(),
                total,
            });
        }
    }
    Ok(out)
}

fn cell_value(cells: &[Cell], index: usize) -> Result<&str> {
    cells
        .get(index)
        .and_then(|c| c.value.as_deref())
        .ok_or_else(|| anyhow!("row has no value at column {index}"))
}

/// Title-case a report label and strip its spaces: "Total Income" becomes
/// "TotalIncome", "GROSS PROFIT" becomes "GrossProfit". Every alphabetic
/// run restarts capitalization, matching how the report labels are keyed
/// downstream.
pub fn section_key(label: &str) -> String {
    let mut out = String::with_capacity(label.len());
    let mut prev_alphabetic = false;
    for ch in label.chars() {
        if ch.is_alphabetic() {
            if prev_alphabetic {
                out.extend(ch.to_lowercase());
            } else {
                out.extend(ch.to_uppercase());
            }
            prev_alphabetic = true;
        } else {
            if ch != ' ' {
                out.push(ch);
            }
            prev_alphabetic = false;
        }
    }
    out
}

/// Monetary cells arrive as strings; an empty cell means zero, never an
/// error.
pub fn money_value(raw: &str) -> Result<f64> {
    if raw.is_empty() {
        return Ok(0.0);
    }
    let value = raw
        .trim()
        .parse::<f64>()
        .with_context(|| format!("`{raw}` is not a monetary value"))?;
    if !value.is_finite() {
        anyhow::bail!("`{raw}` is not a finite monetary value");
    }
    Ok(value)
}
