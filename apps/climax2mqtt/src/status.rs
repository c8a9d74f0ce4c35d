//! Parsers for the free-text `status` column the panel reports per device.
//!
//! Both parsers are total: malformed input degrades to zero values.

use serde::Serialize;

const POWER_SUFFIX: &str = "W";
const ENERGY_SUFFIX: &str = "kWh";
const ON_TOKEN: &str = "On";

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct PowerReading {
    pub on: bool,
    pub power_w: f64,
    pub energy_kwh: f64,
}

/// Extracts the leading number of a reading such as `"6.68 °C"`.
pub fn parse_temperature(status: &str) -> f64 {
    parse_leading_float(status).unwrap_or(0.0)
}

/// Parses `"On, 12.3W, 4.5kWh"` style power meter statuses.
pub fn parse_power_switch_meter_status(status: &str) -> PowerReading {
    let parts: Vec<&str> = status.split(',').collect();
    if parts.len() < 3 {
        return PowerReading::default();
    }

    PowerReading {
        on: parts[0].trim() == ON_TOKEN,
        power_w: parse_with_suffix(parts[1], POWER_SUFFIX),
        energy_kwh: parse_with_suffix(parts[2], ENERGY_SUFFIX),
    }
}

fn parse_with_suffix(field: &str, suffix: &str) -> f64 {
    let trimmed = field.trim();
    let number = trimmed.strip_suffix(suffix).unwrap_or(trimmed).trim();
    number
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
        .unwrap_or(0.0)
}

/// Longest numeric prefix of `raw` (after leading whitespace) that parses as a
/// finite float.
pub fn parse_leading_float(raw: &str) -> Option<f64> {
    let trimmed = raw.trim_start();
    let candidate_len = trimmed
        .char_indices()
        .find(|(_, c)| !(c.is_ascii_digit() || matches!(c, '.' | '-' | '+' | 'e' | 'E')))
        .map(|(idx, _)| idx)
        .unwrap_or(trimmed.len());

    // the candidate is pure ASCII, so every byte offset is a char boundary
    let candidate = &trimmed[..candidate_len];
    (1..=candidate.len())
        .rev()
        .find_map(|end| candidate[..end].parse::<f64>().ok())
        .filter(|value| value.is_finite())
}
