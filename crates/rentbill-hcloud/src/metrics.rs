//! Parsing of `/servers/{id}/metrics?type=network` responses

use serde_json::Value;

/// Keys under `metrics.time_series` that carry the outbound series
const OUT_SERIES_KEYS: [&str; 2] = ["network.out", "network_out"];

/// Sum the outbound network series in bytes.
///
/// Accepts `network.out` / `network_out` series, or a nested
/// `network: { out: ... }` object. Sample values may be numbers or numeric
/// strings; null and unparsable samples are ignored. Returns `None` when no
/// outbound series is present.
pub fn sum_network_out(body: &Value) -> Option<u64> {
    let series = body.get("metrics")?.get("time_series")?;

    let out = OUT_SERIES_KEYS
        .iter()
        .find_map(|key| series.get(*key))
        .or_else(|| series.get("network").and_then(|n| n.get("out")))?;

    let values = out.get("values")?.as_array()?;
    let total: f64 = values
        .iter()
        .filter_map(|sample| sample.as_array()?.get(1).and_then(sample_value))
        .sum();

    Some(total.max(0.0).round() as u64)
}

fn sample_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
