use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use reqwest::Client;
use serde_json::{Map, Value};
use tracing::info;

use crate::auth;
use crate::config::Config;
use crate::fetch::ReportClient;
use crate::report::Report;
use crate::singer::{self, RecordSink};
use crate::transform::{assemble, detail, pivot, summary};

/// Reports are always pulled from this date forward.
pub const REPORT_START_DATE: &str = "2014-01-01";
const ACCOUNTING_METHOD: &str = "Accrual";

/// The two report streams this tap replicates, both FULL_TABLE.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReportKind {
    ProfitAndLoss,
    ProfitAndLossDetail,
}

impl ReportKind {
    pub const ALL: [ReportKind; 2] = [ReportKind::ProfitAndLoss, ReportKind::ProfitAndLossDetail];

    pub fn stream_id(&self) -> &'static str {
        match self {
            ReportKind::ProfitAndLoss => "profit_and_loss",
            ReportKind::ProfitAndLossDetail => "profit_and_loss_detail",
        }
    }

    pub fn report_entity(&self) -> &'static str {
        match self {
            ReportKind::ProfitAndLoss => "ProfitAndLoss",
            ReportKind::ProfitAndLossDetail => "ProfitAndLossDetail",
        }
    }

    pub fn key_properties(&self) -> &'static [&'static str] {
        match self {
            ReportKind::ProfitAndLoss => &["StartDate"],
            ReportKind::ProfitAndLossDetail => &[],
        }
    }

    fn params(&self) -> &'static [(&'static str, &'static str)] {
        match self {
            ReportKind::ProfitAndLoss => &[
                ("start_date", REPORT_START_DATE),
                ("accounting_method", ACCOUNTING_METHOD),
                ("summarize_column_by", "Month"),
            ],
            ReportKind::ProfitAndLossDetail => &[
                ("start_date", REPORT_START_DATE),
                ("accounting_method", ACCOUNTING_METHOD),
            ],
        }
    }
}

/// Sync every stream, strictly sequentially.
pub async fn sync_all<S: RecordSink>(
    http: &Client,
    config: &mut Config,
    config_path: &Path,
    schema_dir: &Path,
    sink: &mut S,
) -> Result<()> {
    for kind in ReportKind::ALL {
        sync_stream(kind, http, config, config_path, schema_dir, sink).await?;
    }
    Ok(())
}

/// One stream: emit the schema, refresh credentials, fetch the report and
/// drive the matching flattener. Token refresh happens before the fetch,
/// and any rotated token is persisted before the fetch as well.
pub async fn sync_stream<S: RecordSink>(
    kind: ReportKind,
    http: &Client,
    config: &mut Config,
    config_path: &Path,
    schema_dir: &Path,
    sink: &mut S,
) -> Result<()> {
    let started = Instant::now();
    info!(stream = kind.stream_id(), "starting sync");

    let schema = singer::load_schema(schema_dir, kind.stream_id())?;
    sink.write_schema(kind.stream_id(), &schema, kind.key_properties())?;

    // Version tag for the detail stream's atomic view replacement, taken
    // at sync start.
    let version = Utc::now().timestamp();

    let credentials = auth::obtain_credentials(http, config, config_path).await?;
    let client = ReportClient::new(http, config.base_url(), credentials);
    let report = client
        .get_report(kind.report_entity(), kind.params())
        .await?;

    let records = match kind {
        ReportKind::ProfitAndLoss => emit_summary(&report, &schema, sink)?,
        ReportKind::ProfitAndLossDetail => {
            match emit_detail(&report, &schema, version, sink)? {
                Some(count) => {
                    sink.write_version(kind.stream_id(), version)?;
                    count
                }
                None => 0,
            }
        }
    };

    info!(
        stream = kind.stream_id(),
        records,
        elapsed = ?started.elapsed(),
        "sync complete"
    );
    Ok(())
}

/// Aggregate stream: one record per Money column. Each base record gets
/// the whole row tree flattened at its column position, merged into a
/// keyed `ReportData` mapping. Duplicate keys at the same level are
/// last-wins.
fn emit_summary<S: RecordSink>(report: &Report, schema: &Value, sink: &mut S) -> Result<usize> {
    let stream = ReportKind::ProfitAndLoss.stream_id();
    let rows = report
        .rows
        .as_ref()
        .map(|group| group.rows())
        .unwrap_or_default();

    let mut count = 0;
    for (ordinal, mut record) in pivot::pivot_money_columns(report).into_iter().enumerate() {
        if record.get("StartDate").map_or(true, Value::is_null) {
            continue;
        }

        // Money-column values sit one past the leading label column.
        let lines = summary::flatten_rows(rows, ordinal + 1)
            .with_context(|| format!("flattening report rows for column {ordinal}"))?;
        let mut report_data = Map::new();
        for line in &lines {
            report_data.insert(line.key.clone(), line.body());
        }

        record.insert("ReportData".to_string(), Value::Object(report_data));
        record.insert(
            assemble::SYNC_TIMESTAMP_FIELD.to_string(),
            Value::String(assemble::sync_timestamp()),
        );

        let record = assemble::conform(record, schema, stream)?;
        sink.write_record(stream, &record, &time_extracted(), None)?;
        count += 1;
    }
    Ok(count)
}

/// Detail stream: a single traversal of the row tree, one record per leaf
/// transaction row. Returns `None` when the report has no row array at
/// all, in which case no version is activated.
fn emit_detail<S: RecordSink>(
    report: &Report,
    schema: &Value,
    version: i64,
    sink: &mut S,
) -> Result<Option<usize>> {
    let stream = ReportKind::ProfitAndLossDetail.stream_id();
    let columns = detail::column_names(report);

    let Some(rows) = report.rows.as_ref().and_then(|group| group.row.as_deref()) else {
        info!(stream, "report has no rows");
        return Ok(None);
    };

    let mut flattened = Vec::new();
    let mut categories = Vec::new();
    for row in rows {
        detail::flatten_row(row, &mut categories, &mut flattened);
    }

    let mut count = 0;
    for values in &flattened {
        let mut record = detail::cleanse_row(&columns, values)?;
        record.insert(
            assemble::SYNC_TIMESTAMP_FIELD.to_string(),
            Value::String(assemble::sync_timestamp()),
        );

        let record = assemble::conform(record, schema, stream)?;
        sink.write_record(stream, &record, &time_extracted(), Some(version))?;
        count += 1;
    }
    Ok(Some(count))
}

fn time_extracted() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, PartialEq)]
    enum Written {
        Record {
            stream: String,
            record: Value,
            version: Option<i64>,
        },
        Version {
            stream: String,
            version: i64,
        },
    }

    #[derive(Default)]
    struct CollectingSink {
        written: Vec<Written>,
    }

    impl RecordSink for CollectingSink {
        fn write_schema(&mut self, _: &str, _: &Value, _: &[&str]) -> Result<()> {
            Ok(())
        }

        fn write_record(
            &mut self,
            stream: &str,
            record: &Map<String, Value>,
            _time_extracted: &str,
            version: Option<i64>,
        ) -> Result<()> {
            self.written.push(Written::Record {
                stream: stream.to_string(),
                record: Value::Object(record.clone()),
                version,
            });
            Ok(())
        }

        fn write_version(&mut self, stream: &str, version: i64) -> Result<()> {
            self.written.push(Written::Version {
                stream: stream.to_string(),
                version,
            });
            Ok(())
        }

        fn write_state(&mut self, _: &Value) -> Result<()> {
            Ok(())
        }
    }

    fn report(value: Value) -> Report {
        serde_json::from_value(value).unwrap()
    }

    fn summary_schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "StartDate": {"type": ["string"]},
                "EndDate": {"type": ["string"]},
                "ReportData": {"type": ["object"]},
                "SyncTimestampUtc": {"type": ["string"], "format": "date-time"}
            }
        })
    }

    fn detail_schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "Account": {"type": ["null", "string"]},
                "Date": {"type": ["null", "string"]},
                "Amount": {"type": ["null", "number"]},
                "Balance": {"type": ["null", "number"]},
                "Memo": {"type": ["null", "string"]},
                "Categories": {"type": ["array"], "items": {"type": ["string"]}},
                "SyncTimestampUtc": {"type": ["string"], "format": "date-time"}
            }
        })
    }

    #[test]
    fn summary_emits_one_record_per_period() {
        let report = report(json!({
            "Columns": {"Column": [
                {"ColTitle": "", "ColType": "Account"},
                {"ColType": "Money", "MetaData": [
                    {"Name": "StartDate", "Value": "2020-01-01"},
                    {"Name": "EndDate", "Value": "2020-01-31"}
                ]},
                {"ColType": "Money", "MetaData": [
                    {"Name": "ColKey", "Value": "total"}
                ]}
            ]},
            "Rows": {"Row": [
                {
                    "type": "Section",
                    "Header": {"ColData": [{"value": "Income"}, {"value": ""}, {"value": ""}]},
                    "Rows": {"Row": [
                        {"ColData": [{"value": "Sales"}, {"value": "100.00"}, {"value": "100.00"}]}
                    ]},
                    "Summary": {"ColData": [
                        {"value": "Total Income"}, {"value": "100.00"}, {"value": "100.00"}
                    ]}
                }
            ]}
        }));

        let mut sink = CollectingSink::default();
        let count = emit_summary(&report, &summary_schema(), &mut sink).unwrap();

        // The totals column has no StartDate and is skipped.
        assert_eq!(count, 1);
        assert_eq!(sink.written.len(), 1);
        let Written::Record { stream, record, version } = &sink.written[0] else {
            panic!("expected a record");
        };
        assert_eq!(stream, "profit_and_loss");
        assert_eq!(version, &None);
        assert_eq!(record["StartDate"], json!("2020-01-01"));
        assert_eq!(
            record["ReportData"],
            json!({"Income": {
                "Lines": [{"Sales": {"Lines": [], "Total": 100.0}}],
                "Total": 100.0
            }})
        );
        assert!(record.get("SyncTimestampUtc").is_some());
    }

    #[test]
    fn summary_merges_duplicate_keys_last_wins() {
        let report = report(json!({
            "Columns": {"Column": [
                {"ColType": "Account"},
                {"ColType": "Money", "MetaData": [{"Name": "StartDate", "Value": "2020-01-01"}]}
            ]},
            "Rows": {"Row": [
                {"ColData": [{"value": "Other"}, {"value": "1.00"}]},
                {"ColData": [{"value": "Other"}, {"value": "2.00"}]}
            ]}
        }));

        let mut sink = CollectingSink::default();
        emit_summary(&report, &summary_schema(), &mut sink).unwrap();

        let Written::Record { record, .. } = &sink.written[0] else {
            panic!("expected a record");
        };
        assert_eq!(
            record["ReportData"],
            json!({"Other": {"Lines": [], "Total": 2.0}})
        );
    }

    #[test]
    fn detail_emits_versioned_records_and_activates() {
        let report = report(json!({
            "Columns": {"Column": [
                {"ColTitle": "Account", "ColType": "String"},
                {"ColTitle": "Date", "ColType": "Date"},
                {"ColTitle": "Amount", "ColType": "Money"},
                {"ColTitle": "Memo/Description", "ColType": "String"},
                {"ColTitle": "Balance", "ColType": "Money"}
            ]},
            "Rows": {"Row": [
                {
                    "Header": {"ColData": [{"value": "Expenses"}]},
                    "Rows": {"Row": [
                        {
                            "Header": {"ColData": [{"value": "Rent"}]},
                            "Rows": {"Row": [
                                {"ColData": [
                                    {"value": "Checking"},
                                    {"value": "2020-01-05"},
                                    {"value": "100.00"},
                                    {"value": ""},
                                    {"value": "500.00"}
                                ]}
                            ]}
                        }
                    ]}
                }
            ]}
        }));

        let mut sink = CollectingSink::default();
        let count = emit_detail(&report, &detail_schema(), 1577836800, &mut sink).unwrap();
        assert_eq!(count, Some(1));

        // write_version is the orchestrator's job; emit only records.
        let Written::Record { stream, record, version } = &sink.written[0] else {
            panic!("expected a record");
        };
        assert_eq!(stream, "profit_and_loss_detail");
        assert_eq!(version, &Some(1577836800));
        assert_eq!(record["Account"], json!("Checking"));
        assert_eq!(record["Amount"], json!(100.0));
        assert_eq!(record["Balance"], json!(500.0));
        assert_eq!(record["Categories"], json!(["Expenses", "Rent"]));
        assert!(record.get("Memo").is_none());
    }

    #[test]
    fn detail_without_rows_skips_activation() {
        let report = report(json!({
            "Columns": {"Column": [{"ColTitle": "Amount", "ColType": "Money"}]},
            "Rows": {}
        }));

        let mut sink = CollectingSink::default();
        let count = emit_detail(&report, &detail_schema(), 7, &mut sink).unwrap();
        assert_eq!(count, None);
        assert!(sink.written.is_empty());
    }

    #[test]
    fn detail_with_empty_row_array_still_activates() {
        let report = report(json!({
            "Columns": {"Column": [{"ColTitle": "Amount", "ColType": "Money"}]},
            "Rows": {"Row": []}
        }));

        let mut sink = CollectingSink::default();
        let count = emit_detail(&report, &detail_schema(), 7, &mut sink).unwrap();
        assert_eq!(count, Some(0));
    }

    #[test]
    fn shipped_schemas_load_and_declare_properties() {
        let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("schemas");
        for kind in ReportKind::ALL {
            let schema = singer::load_schema(&dir, kind.stream_id()).unwrap();
            assert!(
                schema.get("properties").is_some(),
                "schema for {} has no properties",
                kind.stream_id()
            );
        }
    }

    #[test]
    fn stream_identities() {
        assert_eq!(ReportKind::ProfitAndLoss.stream_id(), "profit_and_loss");
        assert_eq!(
            ReportKind::ProfitAndLossDetail.report_entity(),
            "ProfitAndLossDetail"
        );
        assert_eq!(ReportKind::ProfitAndLoss.key_properties(), &["StartDate"]);
        assert!(ReportKind::ProfitAndLossDetail.key_properties().is_empty());
    }
}
