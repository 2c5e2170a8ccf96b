use anyhow::{anyhow, Context, Result};
use serde_json::{Map, Number, Value};

use crate::report::{Report, Row};

/// Synthetic trailing column pairing with the categories snapshot each
/// flattened row carries.
pub const CATEGORIES_COLUMN: &str = "Categories";

/// Field names for the detail report: column titles with spaces stripped,
/// "Memo/Description" shortened to "Memo", plus the trailing categories
/// column.
pub fn column_names(report: &Report) -> Vec<String> {
    let mut names: Vec<String> = report
        .columns
        .iter()
        .flat_map(|c| &c.column)
        .map(|column| {
            let title = column.col_title.as_deref().unwrap_or_default();
            if title == "Memo/Description" {
                "Memo".to_string()
            } else {
                title.replace(' ', "")
            }
        })
        .collect();
    names.push(CATEGORIES_COLUMN.to_string());
    names
}

/// Walk one row of the detail tree. A row carrying cell data emits a
/// value tuple (cells plus a snapshot of the current categories stack) and
/// recurses no further. A row with an absent or empty group emits nothing.
/// Otherwise the row's header label is pushed, every child is walked, and
/// the label is popped again, so `categories` always reflects exactly the
/// enclosing-section chain at the moment a leaf is emitted.
pub fn flatten_row(row: &Row, categories: &mut Vec<String>, out: &mut Vec<Vec<Value>>) {
    if let Some(cells) = &row.col_data {
        let mut values: Vec<Value> = cells
            .iter()
            .map(|cell| {
                cell.value
                    .clone()
                    .map(Value::String)
                    .unwrap_or(Value::Null)
            })
            .collect();
        values.push(Value::Array(
            categories.iter().cloned().map(Value::String).collect(),
        ));
        out.push(values);
        return;
    }

    let children = match &row.rows {
        Some(group) if !group.rows().is_empty() => group.rows(),
        _ => return,
    };

    let pushed = if let Some(header) = &row.header {
        let label = header
            .col_data
            .first()
            .and_then(|c| c.value.clone())
            .unwrap_or_default();
        categories.push(label);
        true
    } else {
        false
    };

    for child in children {
        flatten_row(child, categories, out);
    }

    if pushed {
        categories.pop();
    }
}

/// Zip column names with one flattened value tuple and cleanse the result:
/// empty-string fields are dropped, `Amount` and `Balance` are coerced to
/// floats. A row without a parseable `Amount` or `Balance` is an error.
pub fn cleanse_row(columns: &[String], values: &[Value]) -> Result<Map<String, Value>> {
    let zipped: Vec<(&String, &Value)> = columns.iter().zip(values.iter()).collect();

    let mut cleansed = Map::new();
    for (name, value) in &zipped {
        if value.as_str() == Some("") {
            continue;
        }
        cleansed.insert((*name).clone(), (*value).clone());
    }

    for field in ["Amount", "Balance"] {
        let raw = zipped
            .iter()
            .find(|(name, _)| name.as_str() == field)
            .map(|(_, value)| *value)
            .ok_or_else(|| anyhow!("detail row has no `{field}` column"))?;
        let parsed = match raw {
            Value::String(s) => s
                .trim()
                .parse::<f64>()
                .with_context(|| format!("`{field}` value `{s}` is not numeric"))?,
            other => anyhow::bail!("`{field}` value is not a string: {other}"),
        };
        let number = Number::from_f64(parsed)
            .ok_or_else(|| anyhow!("`{field}` value `{parsed}` is not a finite number"))?;
        cleansed.insert(field.to_string(), Value::Number(number));
    }

    Ok(cleansed)
}
