use anyhow::{anyhow, bail, Context, Result};
use chrono::Utc;
use serde_json::{Map, Number, Value};
use tracing::debug;

/// Every emitted record carries the moment it was assembled, UTC at second
/// precision.
pub const SYNC_TIMESTAMP_FIELD: &str = "SyncTimestampUtc";

pub fn sync_timestamp() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// Conform a record to the stream's JSON schema before it reaches the
/// sink. Fields the schema does not declare are dropped; declared fields
/// are checked against the schema `type` list, with strings coerced to
/// numbers where the schema asks for one. Any mismatch fails the whole
/// sync.
pub fn conform(
    record: Map<String, Value>,
    schema: &Value,
    stream: &str,
) -> Result<Map<String, Value>> {
    let properties = schema
        .get("properties")
        .and_then(Value::as_object)
        .ok_or_else(|| anyhow!("schema for `{stream}` declares no properties"))?;

    let mut out = Map::new();
    for (name, value) in record {
        let Some(field_schema) = properties.get(&name) else {
            debug!(stream, field = %name, "dropping field not declared in schema");
            continue;
        };
        let conformed = conform_value(value, field_schema)
            .with_context(|| format!("field `{name}` failed schema validation for `{stream}`"))?;
        out.insert(name, conformed);
    }
    Ok(out)
}

fn conform_value(value: Value, field_schema: &Value) -> Result<Value> {
    let types = declared_types(field_schema);
    if types.is_empty() {
        return Ok(value);
    }

    match &value {
        Value::Null => {
            if types.contains(&"null") {
                return Ok(value);
            }
        }
        Value::String(s) => {
            if types.contains(&"string") {
                return Ok(value);
            }
            // The report API hands numbers over as strings.
            if types.contains(&"number") {
                let parsed = s
                    .trim()
                    .parse::<f64>()
                    .with_context(|| format!("`{s}` cannot be read as a number"))?;
                let number = Number::from_f64(parsed)
                    .ok_or_else(|| anyhow!("`{s}` is not a finite number"))?;
                return Ok(Value::Number(number));
            }
            if types.contains(&"integer") {
                let parsed = s
                    .trim()
                    .parse::<i64>()
                    .with_context(|| format!("`{s}` cannot be read as an integer"))?;
                return Ok(Value::Number(parsed.into()));
            }
        }
        Value::Number(n) => {
            if types.contains(&"number") {
                return Ok(value);
            }
            if types.contains(&"integer") && n.is_i64() {
                return Ok(value);
            }
        }
        Value::Bool(_) => {
            if types.contains(&"boolean") {
                return Ok(value);
            }
        }
        Value::Object(_) => {
            if types.contains(&"object") {
                return Ok(value);
            }
        }
        Value::Array(items) => {
            if types.contains(&"array") {
                let Some(item_schema) = field_schema.get("items") else {
                    return Ok(value);
                };
                let conformed = items
                    .iter()
                    .cloned()
                    .map(|item| conform_value(item, item_schema))
                    .collect::<Result<Vec<_>>>()?;
                return Ok(Value::Array(conformed));
            }
        }
    }

    bail!("value {value} does not match schema types {types:?}");
}

fn declared_types(field_schema: &Value) -> Vec<&str> {
    match field_schema.get("type") {
        Some(Value::String(t)) => vec![t.as_str()],
        Some(Value::Array(ts)) => ts.iter().filter_map(Value::as_str).collect(),
        _ => Vec::new(),
    }
}
