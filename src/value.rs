//! The value type threaded through the VM and function registry.

use std::cmp::Ordering;
use std::rc::Rc;

use serde_json::Value;

/// A reference-counted handle around a JSON value. Cloning an `Rcvar` is a
/// cheap refcount bump, which matters since the VM clones values constantly
/// while pushing/popping the value stack and building multi-select containers.
pub type Rcvar = Rc<Value>;

/// Wraps a `Value` in a fresh `Rcvar`.
pub fn rcvar(value: Value) -> Rcvar {
    Rc::new(value)
}

/// JMESPath truthiness: false, null, empty array, empty object, empty string
/// are falsy; everything else is truthy.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
        Value::Number(_) => true,
    }
}

/// The JMESPath type name of a value, used in error messages.
pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// JMESPath ordering comparison: only numbers are ordered; any other pairing
/// (including mismatched types) yields `None`, which the VM's comparison
/// opcodes translate to a `null` result.
pub fn compare_ordered(lhs: &Value, rhs: &Value) -> Option<Ordering> {
    match (lhs, rhs) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        _ => None,
    }
}

/// Negative-index-aware element access into an array.
pub fn array_index(arr: &[Value], index: i32) -> Option<Value> {
    let len = arr.len() as i64;
    let idx = if index < 0 {
        len + index as i64
    } else {
        index as i64
    };
    if idx < 0 || idx >= len {
        None
    } else {
        arr.get(idx as usize).cloned()
    }
}

/// Python-semantics slice of an array: `start`/`stop` default per `step`'s
/// sign, `step` defaults to 1. Out-of-range bounds are clamped, never an error.
pub fn slice(arr: &[Value], start: Option<i32>, stop: Option<i32>, step: Option<i32>) -> Vec<Value> {
    let len = arr.len() as i64;
    let step = step.unwrap_or(1) as i64;
    if step == 0 {
        return Vec::new();
    }
    let adjust = |value: Option<i32>, default_forward: i64, default_backward: i64| -> i64 {
        match value {
            None => {
                if step < 0 {
                    default_backward
                } else {
                    default_forward
                }
            }
            Some(v) => {
                let v = v as i64;
                let v = if v < 0 { (v + len).max(if step < 0 { -1 } else { 0 }) } else { v.min(len) };
                v
            }
        }
    };
    let start_idx = adjust(start, 0, len - 1);
    let stop_idx = adjust(stop, len, -1);

    let mut out = Vec::new();
    if step > 0 {
        let mut i = start_idx;
        while i < stop_idx && i < len {
            if i >= 0 {
                out.push(arr[i as usize].clone());
            }
            i += step;
        }
    } else {
        let mut i = start_idx;
        while i > stop_idx && i >= 0 {
            if i < len {
                out.push(arr[i as usize].clone());
            }
            i += step;
        }
    }
    out
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    #[test]
    fn truthiness_matches_jmespath() {
        assert!(!is_truthy(&json!(null)));
        assert!(!is_truthy(&json!(false)));
        assert!(!is_truthy(&json!([])));
        assert!(!is_truthy(&json!({})));
        assert!(!is_truthy(&json!("")));
        assert!(is_truthy(&json!(0)));
        assert!(is_truthy(&json!("x")));
        assert!(is_truthy(&json!([1])));
    }

    #[test]
    fn negative_index_counts_from_end() {
        let arr = vec![json!(1), json!(2), json!(3)];
        assert_eq!(array_index(&arr, -1), Some(json!(3)));
        assert_eq!(array_index(&arr, -3), Some(json!(1)));
        assert_eq!(array_index(&arr, 3), None);
        assert_eq!(array_index(&arr, -4), None);
    }

    #[test]
    fn slice_basic_and_reversed() {
        let arr = vec![json!(10), json!(20), json!(30), json!(40)];
        assert_eq!(slice(&arr, Some(1), None, None), vec![json!(20), json!(30), json!(40)]);
        assert_eq!(slice(&arr, Some(0), Some(0), None), Vec::<Value>::new());
        assert_eq!(
            slice(&arr, None, None, Some(-1)),
            vec![json!(40), json!(30), json!(20), json!(10)]
        );
    }
}
