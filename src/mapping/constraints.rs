//! Column value constraints

use crate::catalog::{ConstraintType, DataColumnConstraint};
use crate::errors::{GpkgError, GpkgResult};
use crate::store::Store;
use crate::value::Value;

/// Checks `value` against the rows of one named constraint.
///
/// Returns the violation reason, `None` when the value passes. Null always
/// passes.
pub fn violation(
    store: &Store,
    constraint: &[DataColumnConstraint],
    value: &Value,
) -> GpkgResult<Option<String>> {
    let Some(first) = constraint.first() else {
        return Ok(None);
    };
    if value.is_null() {
        return Ok(None);
    }
    match first.constraint_type {
        ConstraintType::Range => Ok(range_violation(first, value)),
        ConstraintType::Enum => {
            let text = as_text(value);
            let allowed = constraint
                .iter()
                .any(|c| c.value.as_deref() == Some(text.as_str()));
            Ok((!allowed).then(|| format!("'{}' is not an allowed value", text)))
        }
        ConstraintType::Glob => {
            let Some(pattern) = first.value.as_deref() else {
                return Err(GpkgError::validation(format!(
                    "Glob constraint '{}' has no pattern",
                    first.constraint_name
                )));
            };
            let text = as_text(value);
            let matched = store.query_i64(
                "SELECT ? GLOB ?",
                &[Value::from(text.as_str()), Value::from(pattern)],
            )?;
            Ok((matched != Some(1)).then(|| format!("'{}' does not match '{}'", text, pattern)))
        }
    }
}

fn range_violation(c: &DataColumnConstraint, value: &Value) -> Option<String> {
    let Some(v) = value.as_f64() else {
        return Some(format!("{} value is not numeric", value.type_name()));
    };
    if let Some(min) = c.min {
        let inclusive = c.min_is_inclusive.unwrap_or(true);
        if v < min || (!inclusive && v == min) {
            return Some(format!("{} is below {}{}", v, if inclusive { "" } else { "or at " }, min));
        }
    }
    if let Some(max) = c.max {
        let inclusive = c.max_is_inclusive.unwrap_or(true);
        if v > max || (!inclusive && v == max) {
            return Some(format!("{} is above {}{}", v, if inclusive { "" } else { "or at " }, max));
        }
    }
    None
}

fn as_text(value: &Value) -> String {
    match value {
        Value::Text(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_bounds() {
        let store = Store::open_in_memory().unwrap();
        let c = [DataColumnConstraint::range("pct", Some((0.0, true)), Some((100.0, false)))];

        assert!(violation(&store, &c, &Value::Integer(0)).unwrap().is_none());
        assert!(violation(&store, &c, &Value::Real(99.9)).unwrap().is_none());
        assert!(violation(&store, &c, &Value::Integer(100)).unwrap().is_some());
        assert!(violation(&store, &c, &Value::Real(-0.1)).unwrap().is_some());
        assert!(violation(&store, &c, &Value::from("ten")).unwrap().is_some());
        assert!(violation(&store, &c, &Value::Null).unwrap().is_none());
    }

    #[test]
    fn test_enum_values() {
        let store = Store::open_in_memory().unwrap();
        let c = [
            DataColumnConstraint::enum_value("kind", "cafe"),
            DataColumnConstraint::enum_value("kind", "museum"),
        ];
        assert!(violation(&store, &c, &Value::from("museum")).unwrap().is_none());
        assert!(violation(&store, &c, &Value::from("zoo")).unwrap().is_some());
    }

    #[test]
    fn test_glob_pattern() {
        let store = Store::open_in_memory().unwrap();
        let c = [DataColumnConstraint::glob("code", "[A-Z][A-Z]-[0-9]*")];
        assert!(violation(&store, &c, &Value::from("AB-12")).unwrap().is_none());
        assert!(violation(&store, &c, &Value::from("ab-12")).unwrap().is_some());
        assert!(violation(&store, &[], &Value::from("anything")).unwrap().is_none());
    }
}
