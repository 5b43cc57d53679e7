use std::{cmp::Ordering, iter::Peekable, str::Chars};

use serde_json::Value;

/// Compares strings so embedded digit runs order numerically: `item2 < item10`.
pub fn natural_cmp(left: &str, right: &str) -> Ordering {
    let mut left_chars = left.chars().peekable();
    let mut right_chars = right.chars().peekable();
    loop {
        match (left_chars.peek().copied(), right_chars.peek().copied()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(l), Some(r)) if l.is_ascii_digit() && r.is_ascii_digit() => {
                let left_run = take_digits(&mut left_chars);
                let right_run = take_digits(&mut right_chars);
                let ordering = compare_digit_runs(&left_run, &right_run);
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            (Some(l), Some(r)) => {
                if l != r {
                    return l.cmp(&r);
                }
                left_chars.next();
                right_chars.next();
            }
        }
    }
}

fn take_digits(chars: &mut Peekable<Chars<'_>>) -> String {
    let mut run = String::new();
    while let Some(character) = chars.peek().copied()
        && character.is_ascii_digit()
    {
        run.push(character);
        chars.next();
    }
    run
}

fn compare_digit_runs(left: &str, right: &str) -> Ordering {
    let left = left.trim_start_matches('0');
    let right = right.trim_start_matches('0');
    left.len().cmp(&right.len()).then_with(|| left.cmp(right))
}

/// Orders two record values; an absent or null value sorts before anything present.
pub fn compare_values(left: Option<&Value>, right: Option<&Value>) -> Ordering {
    let left = left.filter(|value| !value.is_null());
    let right = right.filter(|value| !value.is_null());
    match (left, right) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(left), Some(right)) => compare_present(left, right),
    }
}

/// Values that both read as numbers compare numerically, whatever their JSON
/// type; everything else falls back to natural order of the rendered text.
fn compare_present(left: &Value, right: &Value) -> Ordering {
    if let (Value::Bool(l), Value::Bool(r)) = (left, right) {
        return l.cmp(r);
    }
    match (as_number(left), as_number(right)) {
        (Some(l), Some(r)) => l.total_cmp(&r),
        _ => natural_cmp(&render(left), &render(right)),
    }
}

/// Scalar equality that treats numeric strings and numbers as interchangeable.
pub fn loosely_equal(left: &Value, right: &Value) -> bool {
    if left == right {
        return true;
    }
    match (left, right) {
        (Value::Null, _) | (_, Value::Null) => false,
        (Value::Bool(flag), other) | (other, Value::Bool(flag)) => truthy(other) == *flag,
        (Value::Array(_) | Value::Object(_), _) | (_, Value::Array(_) | Value::Object(_)) => false,
        _ => match (as_number(left), as_number(right)) {
            (Some(l), Some(r)) => l == r,
            _ => false,
        },
    }
}

pub(crate) fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0),
        Value::String(text) => !text.is_empty() && text != "0",
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

pub(crate) fn render(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn natural_order_handles_digit_runs() {
        assert_eq!(natural_cmp("item2", "item10"), Ordering::Less);
        assert_eq!(natural_cmp("item010", "item10"), Ordering::Equal);
        assert_eq!(natural_cmp("alpha", "beta"), Ordering::Less);
        assert_eq!(natural_cmp("a", "ab"), Ordering::Less);
    }

    #[test]
    fn missing_values_sort_first() {
        assert_eq!(compare_values(None, Some(&json!(1))), Ordering::Less);
        assert_eq!(compare_values(Some(&Value::Null), None), Ordering::Equal);
        assert_eq!(compare_values(Some(&json!(10)), Some(&json!(9.5))), Ordering::Greater);
    }

    #[test]
    fn loose_equality_bridges_strings_and_numbers() {
        assert!(loosely_equal(&json!("1"), &json!(1)));
        assert!(loosely_equal(&json!(2.0), &json!(2)));
        assert!(loosely_equal(&json!(true), &json!("yes")));
        assert!(!loosely_equal(&json!("a"), &json!("b")));
        assert!(!loosely_equal(&Value::Null, &json!(0)));
    }

    #[test]
    fn null_never_equals_a_boolean() {
        assert!(!loosely_equal(&json!(false), &Value::Null));
        assert!(!loosely_equal(&Value::Null, &json!(false)));
        assert!(!loosely_equal(&json!(true), &Value::Null));
    }

    #[test]
    fn numeric_strings_order_with_numbers() {
        let mut values = vec![json!("1.10"), json!(1.2), json!("1.5"), json!("item10"), json!("item2"), json!(3)];
        values.sort_by(|left, right| compare_values(Some(left), Some(right)));
        assert_eq!(values, vec![json!("1.10"), json!(1.2), json!("1.5"), json!(3), json!("item2"), json!("item10")]);
        assert_eq!(compare_values(Some(&json!("1.10")), Some(&json!("1.5"))), Ordering::Less);
    }
}
