//! Decoding of filter operands.
//!
//! Numbers and booleans pass through untouched. A string containing `NOW`
//! becomes a Unix timestamp (seconds), optionally shifted by a whole number of
//! days given in parentheses: `NOW(-1)` is one day ago, `NOW(7)` a week ahead.
//! Offsets too large for an `i64` timestamp clamp to its bounds. Any other
//! string is returned verbatim.

use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

pub const NOW_TOKEN: &str = "NOW";
pub const SECONDS_PER_DAY: i64 = 86_400;

static DAY_OFFSET: Lazy<Regex> = Lazy::new(|| Regex::new(r"\((.*?)\)").expect("valid day offset pattern"));

/// Decodes a filter operand against the current clock.
pub fn decode_filter_value(value: &Value) -> Value {
    decode_filter_value_at(value, Utc::now().timestamp())
}

/// Decodes a filter operand against a fixed `now` (seconds since the epoch).
pub fn decode_filter_value_at(value: &Value, now: i64) -> Value {
    match value {
        Value::String(text) if text.contains(NOW_TOKEN) => {
            Value::from(now.saturating_add(day_offset(text).saturating_mul(SECONDS_PER_DAY)))
        }
        Value::Array(items) => Value::Array(items.iter().map(|item| decode_filter_value_at(item, now)).collect()),
        other => other.clone(),
    }
}

/// Day offset inside the first parenthesised group; anything unparsable counts as zero.
fn day_offset(text: &str) -> i64 {
    let Some(captures) = DAY_OFFSET.captures(text) else {
        return 0;
    };
    let inner = captures.get(1).map(|group| group.as_str().trim()).unwrap_or_default();
    leading_integer(inner)
}

fn leading_integer(text: &str) -> i64 {
    let mut end = 0;
    for (index, character) in text.char_indices() {
        let is_sign = index == 0 && (character == '-' || character == '+');
        if character.is_ascii_digit() || is_sign {
            end = index + character.len_utf8();
        } else {
            break;
        }
    }
    text[..end].parse().unwrap_or(0)
}
