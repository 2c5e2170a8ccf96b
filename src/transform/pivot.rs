use serde_json::{Map, Value};

use crate::report::Report;

/// Pivot the report's "Money" columns into base records, one per column in
/// the order received. Each record is seeded with that column's metadata
/// pairs verbatim (e.g. `StartDate`, `EndDate`). Label columns and other
/// non-Money types carry no period data and yield nothing.
pub fn pivot_money_columns(report: &Report) -> Vec<Map<String, Value>> {
    let Some(columns) = &report.columns else {
        return Vec::new();
    };
    columns
        .column
        .iter()
        .filter(|c| c.col_type.as_deref() == Some("Money"))
        .map(|c| {
            c.metadata
                .iter()
                .map(|m| (m.name.clone(), Value::String(m.value.clone())))
                .collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn report(value: serde_json::Value) -> Report {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn one_record_per_money_column_in_order() {
        let report = report(json!({
            "Columns": {
                "Column": [
                    {"ColTitle": "", "ColType": "Account"},
                    {"ColType": "Money", "MetaData": [
                        {"Name": "StartDate", "Value": "2020-01-01"},
                        {"Name": "EndDate", "Value": "2020-01-31"}
                    ]},
                    {"ColType": "Money", "MetaData": [
                        {"Name": "StartDate", "Value": "2020-02-01"}
                    ]}
                ]
            }
        }));

        let records = pivot_money_columns(&report);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["StartDate"], json!("2020-01-01"));
        assert_eq!(records[0]["EndDate"], json!("2020-01-31"));
        assert_eq!(records[1]["StartDate"], json!("2020-02-01"));
    }

    #[test]
    fn label_columns_yield_nothing() {
        let report = report(json!({
            "Columns": {"Column": [{"ColTitle": "Label", "ColType": "Label"}]}
        }));
        assert!(pivot_money_columns(&report).is_empty());
    }

    #[test]
    fn single_money_column_with_one_metadata_pair() {
        let report = report(json!({
            "Columns": {
                "Column": [
                    {"ColType": "Label"},
                    {"ColType": "Money", "MetaData": [{"Name": "StartDate", "Value": "2020-01-01"}]}
                ]
            }
        }));

        let records = pivot_money_columns(&report);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].len(), 1);
        assert_eq!(records[0]["StartDate"], json!("2020-01-01"));
    }

    #[test]
    fn missing_columns_yield_nothing() {
        let report = report(json!({"Rows": {"Row": []}}));
        assert!(pivot_money_columns(&report).is_empty());
    }
}
