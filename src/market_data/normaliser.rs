// Convert wire decimal text into f64.
// Unparsable text never fails a decode: it becomes NaN and each consumer
// applies its own fallback.

use serde::de::IgnoredAny;
use serde::{Deserialize, Deserializer};

pub fn parse_decimal(s: &str) -> f64 {
    s.trim().parse::<f64>().unwrap_or(f64::NAN)
}

/// Returns `value` when it is finite, otherwise `fallback`.
pub fn finite_or(value: f64, fallback: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        fallback
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum DecimalRepr {
    Text(String),
    Number(f64),
    Other(IgnoredAny),
}

/// Serde adapter for decimal fields sent as text (`"63012.40"`).
/// Plain JSON numbers are accepted too; anything else becomes NaN.
pub fn de_decimal<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match DecimalRepr::deserialize(deserializer)? {
        DecimalRepr::Text(s) => parse_decimal(&s),
        DecimalRepr::Number(n) => n,
        DecimalRepr::Other(IgnoredAny) => f64::NAN,
    })
}

pub(crate) fn nan() -> f64 {
    f64::NAN
}
