//! Download rate codec: human-readable text form of a bytes/second value.
//!
//! # Format
//! - Infinite rates encode to the fixed sentinel `"+Inf bps"`.
//! - Finite rates are scaled by base-1024 units (`B`, `KiB`, `MiB`, …),
//!   rendered with two fractional digits (trailing zeros dropped) and
//!   suffixed with `"ps"`: `2048.0` → `"2KiBps"`, `1536.0` → `"1.5KiBps"`.
//!
//! Encoding is lossy: decoding returns a value within the rounding error of
//! the two fractional digits, never the original bit pattern.

use std::fmt;
use std::str::FromStr;

use serde::de::Error as _;
use serde::ser::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Text emitted for an infinite rate.
pub const INFINITE_RATE: &str = "+Inf bps";

const RATE_SUFFIX: &str = "ps";
const UNIT_BASE: f64 = 1024.0;
const UNITS: [&str; 9] = ["B", "KiB", "MiB", "GiB", "TiB", "PiB", "EiB", "ZiB", "YiB"];
const UNIT_PREFIXES: &str = "kmgtpezy";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RateParseError {
    #[error("download rate {input:?} has no numeric part")]
    MissingNumber { input: String },

    #[error("invalid number {segment:?} in download rate")]
    InvalidNumber { segment: String },

    #[error("unknown size unit {segment:?} in download rate")]
    UnknownUnit { segment: String },
}

/// Encode a bytes/second rate, e.g. `"1.5KiBps"` or `"+Inf bps"`.
pub fn encode(rate: f64) -> String {
    if rate.is_infinite() {
        return INFINITE_RATE.to_string();
    }
    format!("{}{}", human_size(rate), RATE_SUFFIX)
}

/// Decode text produced by [`encode`] back into bytes/second.
pub fn decode(text: &str) -> Result<f64, RateParseError> {
    if text == INFINITE_RATE {
        return Ok(f64::INFINITY);
    }
    let size = text.strip_suffix(RATE_SUFFIX).unwrap_or(text);
    parse_human_size(size)
}

fn human_size(bytes: f64) -> String {
    let mut size = bytes;
    let mut unit = 0;
    while size.abs() >= UNIT_BASE && unit < UNITS.len() - 1 {
        size /= UNIT_BASE;
        unit += 1;
    }

    let mut digits = format!("{size:.2}");
    if digits.contains('.') {
        let trimmed = digits.trim_end_matches('0').trim_end_matches('.').len();
        digits.truncate(trimmed);
    }
    format!("{digits}{}", UNITS[unit])
}

fn parse_human_size(size: &str) -> Result<f64, RateParseError> {
    let trimmed = size.trim();
    let split = trimmed
        .find(|c: char| !(c.is_ascii_digit() || matches!(c, '.' | '-' | '+')))
        .unwrap_or(trimmed.len());
    let (number, unit) = trimmed.split_at(split);

    if number.is_empty() {
        return Err(RateParseError::MissingNumber {
            input: size.to_string(),
        });
    }

    let value: f64 = number.parse().map_err(|_| RateParseError::InvalidNumber {
        segment: number.to_string(),
    })?;

    let unit = unit.trim();
    let exponent = unit_exponent(unit).ok_or_else(|| RateParseError::UnknownUnit {
        segment: unit.to_string(),
    })?;

    Ok(value * UNIT_BASE.powi(exponent))
}

/// Power of 1024 for a unit string. Accepts `B`, `K`, `KB`, `KiB` and the
/// same forms for larger prefixes, case-insensitively.
fn unit_exponent(unit: &str) -> Option<i32> {
    let lower = unit.to_ascii_lowercase();
    if lower.is_empty() || lower == "b" {
        return Some(0);
    }

    let mut chars = lower.chars();
    let prefix = chars.next()?;
    if !matches!(chars.as_str(), "" | "b" | "ib") {
        return None;
    }

    UNIT_PREFIXES
        .find(prefix)
        .and_then(|idx| i32::try_from(idx + 1).ok())
}

// ---------------------------------------------------------------------------
// DownloadRate
// ---------------------------------------------------------------------------

/// Bytes/second rate that serializes through the rate codec.
///
/// `+Inf` is a legal value (the rate of a download that finished within a
/// single clock tick) and round-trips exactly.
#[derive(Debug, Clone, Copy, Default, PartialEq, PartialOrd)]
pub struct DownloadRate(pub f64);

impl DownloadRate {
    pub fn bytes_per_second(self) -> f64 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0.0
    }
}

impl From<f64> for DownloadRate {
    fn from(rate: f64) -> Self {
        Self(rate)
    }
}

impl fmt::Display for DownloadRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&encode(self.0))
    }
}

impl FromStr for DownloadRate {
    type Err = RateParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        decode(s).map(Self)
    }
}

impl Serialize for DownloadRate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if self.0.is_nan() {
            return Err(S::Error::custom("download rate is NaN"));
        }
        serializer.serialize_str(&encode(self.0))
    }
}

impl<'de> Deserialize<'de> for DownloadRate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        decode(&text).map(Self).map_err(D::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(expected: f64, actual: f64) {
        if expected == 0.0 {
            assert_eq!(actual, 0.0);
            return;
        }
        let error = ((actual - expected) / expected).abs();
        assert!(error < 0.01, "expected ~{expected}, got {actual}");
    }

    #[test]
    fn whole_units_drop_fraction() {
        assert_eq!(encode(2048.0), "2KiBps");
        assert_eq!(encode(1_048_576.0), "1MiBps");
        assert_eq!(encode(0.0), "0Bps");
    }

    #[test]
    fn fractions_keep_two_digits() {
        assert_eq!(encode(1536.0), "1.5KiBps");
        assert_eq!(encode(123_456_789.5), "117.74MiBps");
        assert_eq!(encode(1234.0), "1.21KiBps");
    }

    #[test]
    fn sub_kib_rates_stay_in_bytes() {
        assert_eq!(encode(512.0), "512Bps");
        assert_eq!(encode(12.25), "12.25Bps");
    }

    #[test]
    fn infinite_rate_uses_sentinel() {
        assert_eq!(encode(f64::INFINITY), INFINITE_RATE);
        assert_eq!(encode(f64::NEG_INFINITY), INFINITE_RATE);
        assert_eq!(decode(INFINITE_RATE), Ok(f64::INFINITY));
    }

    #[test]
    fn round_trip_within_precision() {
        for rate in [0.0, 1536.0, 1_048_576.0, 123_456_789.5] {
            let decoded = decode(&encode(rate)).unwrap();
            assert_close(rate, decoded);
        }
    }

    #[test]
    fn decode_accepts_loose_units() {
        assert_eq!(decode("2KiBps"), Ok(2048.0));
        assert_eq!(decode("2kb"), Ok(2048.0));
        assert_eq!(decode("2 K"), Ok(2048.0));
        assert_eq!(decode("3mib"), Ok(3.0 * 1024.0 * 1024.0));
        assert_eq!(decode("10"), Ok(10.0));
    }

    #[test]
    fn decode_without_number_fails() {
        assert_eq!(
            decode("KiBps"),
            Err(RateParseError::MissingNumber {
                input: "KiB".to_string()
            })
        );
        assert!(matches!(decode(""), Err(RateParseError::MissingNumber { .. })));
        assert!(matches!(decode("NaNBps"), Err(RateParseError::MissingNumber { .. })));
    }

    #[test]
    fn decode_reports_bad_segment() {
        assert_eq!(
            decode("1.2.3KiBps"),
            Err(RateParseError::InvalidNumber {
                segment: "1.2.3".to_string()
            })
        );
        assert_eq!(
            decode("5 furlongsps"),
            Err(RateParseError::UnknownUnit {
                segment: "furlongs".to_string()
            })
        );
        assert!(matches!(decode("+Infbps"), Err(RateParseError::InvalidNumber { .. })));
    }

    #[test]
    fn download_rate_serializes_as_text() {
        let json = serde_json::to_string(&DownloadRate(1536.0)).unwrap();
        assert_eq!(json, r#""1.5KiBps""#);

        let inf: DownloadRate = serde_json::from_str(r#""+Inf bps""#).unwrap();
        assert!(inf.bytes_per_second().is_infinite());

        let err = serde_json::from_str::<DownloadRate>(r#""fast""#).unwrap_err();
        assert!(err.to_string().contains("download rate"));
    }

    #[test]
    fn download_rate_parses_and_displays() {
        let rate: DownloadRate = "1.5KiBps".parse().unwrap();
        assert_eq!(rate, DownloadRate::from(1536.0));
        assert_eq!(rate.to_string(), "1.5KiBps");
        assert!("fastps".parse::<DownloadRate>().is_err());
    }

    #[test]
    fn nan_rate_refuses_to_serialize() {
        assert!(serde_json::to_string(&DownloadRate(f64::NAN)).is_err());
    }
}
