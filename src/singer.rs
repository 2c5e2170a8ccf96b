use std::fs;
use std::io::{self, Write};
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::{Map, Value};

/// Singer message envelopes, one JSON object per output line.
#[derive(Debug, Serialize)]
#[serde(tag = "type")]
pub enum Message<'a> {
    #[serde(rename = "SCHEMA")]
    Schema {
        stream: &'a str,
        schema: &'a Value,
        key_properties: &'a [&'a str],
    },
    #[serde(rename = "RECORD")]
    Record {
        stream: &'a str,
        record: &'a Map<String, Value>,
        time_extracted: &'a str,
        #[serde(skip_serializing_if = "Option::is_none")]
        version: Option<i64>,
    },
    #[serde(rename = "ACTIVATE_VERSION")]
    ActivateVersion { stream: &'a str, version: i64 },
    #[serde(rename = "STATE")]
    State { value: &'a Value },
}

/// Where assembled records go. The orchestrators only ever talk to this
/// seam, so tests can swap in a collecting sink.
pub trait RecordSink {
    fn write_schema(&mut self, stream: &str, schema: &Value, key_properties: &[&str])
        -> Result<()>;

    fn write_record(
        &mut self,
        stream: &str,
        record: &Map<String, Value>,
        time_extracted: &str,
        version: Option<i64>,
    ) -> Result<()>;

    fn write_version(&mut self, stream: &str, version: i64) -> Result<()>;

    fn write_state(&mut self, value: &Value) -> Result<()>;
}

/// Emits Singer messages on stdout, flushed per message. Writes are
/// immediate and unbuffered across messages, so records already emitted
/// stay emitted if a later one fails.
pub struct StdoutSink {
    out: io::Stdout,
}

impl StdoutSink {
    pub fn new() -> Self {
        Self { out: io::stdout() }
    }

    fn write_message(&mut self, message: &Message<'_>) -> Result<()> {
        let line = serde_json::to_string(message).context("serializing singer message")?;
        let mut handle = self.out.lock();
        handle
            .write_all(line.as_bytes())
            .and_then(|_| handle.write_all(b"\n"))
            .and_then(|_| handle.flush())
            .context("writing singer message to stdout")
    }
}

impl Default for StdoutSink {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordSink for StdoutSink {
    fn write_schema(
        &mut self,
        stream: &str,
        schema: &Value,
        key_properties: &[&str],
    ) -> Result<()> {
        self.write_message(&Message::Schema {
            stream,
            schema,
            key_properties,
        })
    }

    fn write_record(
        &mut self,
        stream: &str,
        record: &Map<String, Value>,
        time_extracted: &str,
        version: Option<i64>,
    ) -> Result<()> {
        self.write_message(&Message::Record {
            stream,
            record,
            time_extracted,
            version,
        })
    }

    fn write_version(&mut self, stream: &str, version: i64) -> Result<()> {
        self.write_message(&Message::ActivateVersion { stream, version })
    }

    fn write_state(&mut self, value: &Value) -> Result<()> {
        self.write_message(&Message::State { value })
    }
}

/// Load the JSON Schema document for one stream from the schema directory.
pub fn load_schema(schema_dir: &Path, stream_id: &str) -> Result<Value> {
    let path = schema_dir.join(format!("{stream_id}.json"));
    let text = fs::read_to_string(&path)
        .with_context(|| format!("reading schema `{}`", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing schema `{}`", path.display()))
}
