/// Numeric parsing for vendor string fields
///
/// KIS encodes every number as a string, sometimes empty or space padded.

/// Empty or malformed values read as `0.0`
pub fn lenient_f64(s: &str) -> f64 {
    s.trim().replace(',', "").parse().unwrap_or(0.0)
}

/// Empty or malformed values read as `0`; decimal strings are truncated
pub fn lenient_i64(s: &str) -> i64 {
    let cleaned = s.trim().replace(',', "");
    cleaned
        .parse::<i64>()
        .or_else(|_| cleaned.parse::<f64>().map(|v| v as i64))
        .unwrap_or(0)
}

/// Strict variant for positional feed fields
pub fn strict_f64(s: &str) -> Option<f64> {
    s.trim().parse().ok()
}

pub fn strict_i64(s: &str) -> Option<i64> {
    s.trim().parse().ok()
}
