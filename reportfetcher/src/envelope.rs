//! Decoding of the grid endpoint's JSON envelope.

use reportcache::errors::{FetchError, FetchResult};
use reportcache::models::{RawPage, RawRow};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

#[derive(Debug, Deserialize)]
struct GridEnvelope {
    #[serde(
        rename = "iTotalRecords",
        alias = "recordsTotal",
        default,
        deserialize_with = "deserialize_optional_count"
    )]
    total_records: Option<u64>,
    #[serde(rename = "aaData", alias = "data")]
    rows: Vec<Vec<Value>>,
}

/// True when the body is markup rather than JSON, which is what the upstream
/// serves after redirecting an unauthenticated request to its login page.
pub fn looks_like_html(body: &str) -> bool {
    body.trim_start_matches('\u{feff}').trim_start().starts_with('<')
}

pub fn decode_page(body: &str) -> FetchResult<RawPage> {
    if looks_like_html(body) {
        return Err(FetchError::Unauthorized(
            "upstream answered with an HTML page, the session is probably not logged in".into(),
        ));
    }

    let envelope: GridEnvelope = serde_json::from_str(body.trim_start_matches('\u{feff}'))
        .map_err(|err| FetchError::malformed(err.to_string(), body))?;

    Ok(RawPage {
        total_records: envelope.total_records,
        rows: envelope
            .rows
            .into_iter()
            .map(|cells| RawRow(cells.into_iter().map(cell_text).collect()))
            .collect(),
    })
}

fn cell_text(value: Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text,
        other => other.to_string(),
    }
}

/// Row counts arrive as numbers or, from PHP backends, as numeric strings.
fn deserialize_optional_count<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Value = Deserialize::deserialize(deserializer)?;

    match value {
        Value::Number(n) => Ok(n.as_u64()),
        Value::String(s) if s.trim().is_empty() => Ok(None),
        Value::String(s) => s
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("Cannot parse '{}' as a row count", s))),
        Value::Null => Ok(None),
        _ => Err(serde::de::Error::custom(
            "Expected number or string for row count",
        )),
    }
}
