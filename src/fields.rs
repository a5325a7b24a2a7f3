//! Loose JSON field access shared by the normalizer, aggregator and mapper.
//!
//! Bus producers disagree on key names and on whether numbers arrive as JSON
//! numbers or numeric strings. These helpers resolve a field through an
//! ordered alias list and coerce it without failing.

use serde_json::{Map, Value};

/// First non-null value among `keys`, tried in order
pub fn first_present<'a>(fields: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().filter_map(|key| fields.get(*key)).find(|value| !value.is_null())
}

/// Coerce a JSON value to `f64`; numeric strings are accepted
pub fn coerce_f64(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    number.is_finite().then_some(number)
}

/// Coerce a JSON value to `i64`.
///
/// Integral numbers and decimal strings are accepted; fractional numbers are
/// truncated toward zero.
pub fn coerce_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            let f = n.as_f64()?;
            (f.is_finite() && f.abs() < i64::MAX as f64).then(|| f.trunc() as i64)
        }),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

/// Coerce a JSON value to `bool`; numbers and common strings are accepted
pub fn coerce_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_f64().map(|f| f != 0.0),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Some(true),
            "0" | "false" | "no" | "off" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// First alias that resolves and coerces to `f64`
pub fn float_field(fields: &Map<String, Value>, keys: &[&str]) -> Option<f64> {
    first_present(fields, keys).and_then(coerce_f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn skips_nulls_and_keeps_alias_order() {
        let fields = object(json!({"lat": null, "latitude": 1.5, "y": 9.0}));
        assert_eq!(first_present(&fields, &["lat", "latitude", "y"]), Some(&json!(1.5)));
        assert_eq!(first_present(&fields, &["missing"]), None);
    }

    #[test]
    fn coerces_numbers_and_numeric_strings() {
        assert_eq!(coerce_f64(&json!(" 12.5 ")), Some(12.5));
        assert_eq!(coerce_f64(&json!(3)), Some(3.0));
        assert_eq!(coerce_f64(&json!("abc")), None);
        assert_eq!(coerce_f64(&json!(true)), None);

        assert_eq!(coerce_i64(&json!("1002")), Some(1002));
        assert_eq!(coerce_i64(&json!(1036.9)), Some(1036));
        assert_eq!(coerce_i64(&json!("10.5")), None);
        assert_eq!(coerce_i64(&json!([1])), None);
    }

    #[test]
    fn coerces_booleans() {
        assert_eq!(coerce_bool(&json!(true)), Some(true));
        assert_eq!(coerce_bool(&json!(0)), Some(false));
        assert_eq!(coerce_bool(&json!("Yes")), Some(true));
        assert_eq!(coerce_bool(&json!("maybe")), None);
    }
}
