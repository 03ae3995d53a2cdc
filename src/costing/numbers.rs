//! Permissive numeric coercion
//!
//! Form values arrive as numbers, numeric strings, blanks or garbage. All of
//! them become a finite `f64`, with anything unusable collapsing to zero.

use serde::{Deserialize, Deserializer};

/// Parse a numeric string, returning 0 for blank, malformed or non-finite input
pub fn parse_number(text: &str) -> f64 {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return 0.0;
    }
    match trimmed.parse::<f64>() {
        Ok(v) if v.is_finite() => v,
        _ => 0.0,
    }
}

/// Clamp to a finite, non-negative value
pub fn non_negative(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        0.0
    }
}

/// Convert a whole-percent value (100 = unity) to a fraction
pub fn percent_fraction(percent: f64) -> f64 {
    non_negative(percent) / 100.0
}

/// Round to two decimal places (currency)
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Lenient {
    Number(f64),
    Text(String),
    Flag(bool),
}

impl Lenient {
    fn into_f64(self) -> f64 {
        match self {
            Lenient::Number(v) if v.is_finite() => v,
            Lenient::Number(_) => 0.0,
            Lenient::Text(s) => parse_number(&s),
            Lenient::Flag(b) => {
                if b {
                    1.0
                } else {
                    0.0
                }
            }
        }
    }
}

/// Deserialize a number that may also be sent as a string; null becomes 0
pub fn lenient_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<Lenient> = Option::deserialize(deserializer)?;
    Ok(value.map(Lenient::into_f64).unwrap_or(0.0))
}

/// Like [`lenient_f64`] but keeps absence distinct from zero
pub fn lenient_opt_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<Lenient> = Option::deserialize(deserializer)?;
    Ok(value.map(Lenient::into_f64))
}
