//! Normalization of free-text set targets and user input.
//!
//! Planned reps are authored as text ("8", "8-12", "AMRAP") and intensity as
//! "N/10". Reps always resolve to a number (falling back to
//! [`REPS_FALLBACK`]); intensity has no fallback because it gates whether a
//! set can be used for 1RM and volume at all.

use crate::{PerformedSet, SetValue};

/// Reps used when the text is not a positive number or range
pub const REPS_FALLBACK: f64 = 10.0;

/// Highest valid intensity rating
pub const MAX_INTENSITY: u8 = 10;

/// Parse a rep target ("N" or "N-M") into a number
///
/// A range yields its arithmetic mean. Anything else, including AMRAP or
/// failure markers and non-positive values, yields [`REPS_FALLBACK`].
/// Callers that need to tell "no data" apart from the fallback must inspect
/// the raw text first.
pub fn parse_reps(text: &str) -> f64 {
    let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();

    let value = match compact.split_once('-') {
        Some((low, high)) => match (parse_positive(low), parse_positive(high)) {
            (Some(low), Some(high)) => Some((low + high) / 2.0),
            _ => None,
        },
        None => parse_positive(&compact),
    };

    value.unwrap_or(REPS_FALLBACK)
}

/// Parse an intensity rating of the exact form `D+/10`
///
/// Returns the leading integer when it lies in `1..=10`, otherwise None.
pub fn parse_intensity(text: &str) -> Option<u8> {
    let (value, scale) = text.split_once('/')?;
    if scale != "10" || value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let value: u32 = value.parse().ok()?;
    if (1..=u32::from(MAX_INTENSITY)).contains(&value) {
        u8::try_from(value).ok()
    } else {
        None
    }
}

/// Round to one decimal place
pub fn round_to_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn parse_positive(text: &str) -> Option<f64> {
    text.parse::<f64>()
        .ok()
        .filter(|value| value.is_finite() && *value > 0.0)
}

impl SetValue {
    /// Strict numeric reading: finite and greater than zero
    pub fn as_positive_number(&self) -> Option<f64> {
        match self {
            SetValue::Number(value) => Some(*value).filter(|v| v.is_finite() && *v > 0.0),
            SetValue::Text(text) => parse_positive(text.trim()),
        }
    }
}

impl PerformedSet {
    pub fn reps_value(&self) -> Option<f64> {
        self.reps.as_ref().and_then(SetValue::as_positive_number)
    }

    pub fn weight_value(&self) -> Option<f64> {
        self.weight.as_ref().and_then(SetValue::as_positive_number)
    }

    pub fn intensity_value(&self) -> Option<u8> {
        self.intensity.as_deref().and_then(parse_intensity)
    }

    /// True when reps or weight carries a usable number
    pub fn has_data(&self) -> bool {
        self.reps_value().is_some() || self.weight_value().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_reps_single_and_range() {
        assert_eq!(parse_reps("10"), 10.0);
        assert_eq!(parse_reps("8-12"), 10.0);
        assert_eq!(parse_reps(" 6 - 9 "), 7.5);
        assert_eq!(parse_reps("5"), 5.0);
    }

    #[test]
    fn test_parse_reps_fallback() {
        assert_eq!(parse_reps("AMRAP"), REPS_FALLBACK);
        assert_eq!(parse_reps(""), REPS_FALLBACK);
        assert_eq!(parse_reps("0"), REPS_FALLBACK);
        assert_eq!(parse_reps("-5"), REPS_FALLBACK);
        assert_eq!(parse_reps("8-x"), REPS_FALLBACK);
        assert_eq!(parse_reps("fallo"), REPS_FALLBACK);
    }

    #[test]
    fn test_parse_intensity() {
        assert_eq!(parse_intensity("8/10"), Some(8));
        assert_eq!(parse_intensity("10/10"), Some(10));
        assert_eq!(parse_intensity("1/10"), Some(1));
        assert_eq!(parse_intensity("11/10"), None);
        assert_eq!(parse_intensity("0/10"), None);
        assert_eq!(parse_intensity("8"), None);
        assert_eq!(parse_intensity("8/5"), None);
        assert_eq!(parse_intensity("/10"), None);
        assert_eq!(parse_intensity("-8/10"), None);
        assert_eq!(parse_intensity("99999999999/10"), None);
    }

    #[test]
    fn test_round_to_tenth() {
        assert_eq!(round_to_tenth(122.789), 122.8);
        assert_eq!(round_to_tenth(0.04), 0.0);
        assert_eq!(round_to_tenth(2.25 + 1.05), 3.3);
    }

    #[test]
    fn test_set_value_positive_number() {
        assert_eq!(SetValue::Number(80.0).as_positive_number(), Some(80.0));
        assert_eq!(SetValue::Text(" 62.5 ".into()).as_positive_number(), Some(62.5));
        assert_eq!(SetValue::Text("".into()).as_positive_number(), None);
        assert_eq!(SetValue::Number(0.0).as_positive_number(), None);
        assert_eq!(SetValue::Text("heavy".into()).as_positive_number(), None);
    }

    #[test]
    fn test_performed_set_has_data() {
        let empty = PerformedSet::default();
        assert!(!empty.has_data());

        let reps_only = PerformedSet {
            reps: Some(SetValue::Text("12".into())),
            ..Default::default()
        };
        assert!(reps_only.has_data());
        assert_eq!(reps_only.intensity_value(), None);
    }
}
