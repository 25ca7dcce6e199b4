use crate::{
    log::{error_type, error_undefined, Error, ErrorKind},
    value::Value,
};
use std::cmp::Ordering;

/// Return true if the given [`Value`] is truthy.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Undefined(_) | Value::None => false,
        Value::Bool(bool) => *bool,
        Value::Int(int) => *int != 0,
        Value::Float(float) => *float != 0.0,
        Value::Str(string) => !string.is_empty(),
        Value::TimeDelta(delta) => !delta.is_zero(),
        Value::MonthDelta(months) => *months != 0,
        Value::List(list) => !list.lock().is_empty(),
        Value::Set(set) => !set.lock().is_empty(),
        Value::Dict(dict) => !dict.lock().is_empty(),
        _ => true,
    }
}

/// Return true if the two values are equal.
///
/// Numbers compare by value across bool, int and float. Containers compare
/// by content.
pub fn equals(left: &Value, right: &Value) -> bool {
    if let (Some(left), Some(right)) = (left.address(), right.address()) {
        if left == right {
            return true;
        }
    }

    match (left, right) {
        (Value::Undefined(_), Value::Undefined(_)) | (Value::None, Value::None) => true,
        (Value::Int(left), Value::Int(right)) => left == right,
        (Value::Str(left), Value::Str(right)) => left == right,
        (Value::Date(left), Value::Date(right)) => left == right,
        (Value::DateTime(left), Value::DateTime(right)) => left == right,
        (Value::TimeDelta(left), Value::TimeDelta(right)) => left == right,
        (Value::MonthDelta(left), Value::MonthDelta(right)) => left == right,
        (Value::Slice(a, b), Value::Slice(c, d)) => (a, b) == (c, d),
        (Value::Color(left), Value::Color(right)) => left == right,
        (Value::List(left), Value::List(right)) => {
            let (left, right) = (left.snapshot(), right.snapshot());
            left.len() == right.len() && left.iter().zip(&right).all(|(l, r)| equals(l, r))
        }
        (Value::Set(left), Value::Set(right)) => {
            let left = left.snapshot();
            let right = right.lock();
            left.len() == right.len() && left.iter().all(|item| right.contains(item))
        }
        (Value::Dict(left), Value::Dict(right)) => {
            let (left, right) = (left.snapshot(), right.snapshot());
            left.len() == right.len()
                && left
                    .iter()
                    .all(|(key, value)| right.get(key).is_some_and(|other| equals(value, other)))
        }
        (left, right) => match (left.as_float(), right.as_float()) {
            (Some(left), Some(right)) => left == right,
            _ => false,
        },
    }
}

/// Return true if both values are the same object.
///
/// Shared values compare by identity, everything else by type and value.
pub fn identical(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Str(_), Value::Str(_)) => equals(left, right),
        _ => match (left.address(), right.address()) {
            (Some(left), Some(right)) => left == right,
            (None, None) => left.type_name() == right.type_name() && equals(left, right),
            _ => false,
        },
    }
}

/// Return the ordering of the two values.
///
/// # Errors
///
/// Returns an [`Error`] if the values have no ordering between them.
pub fn compare(left: &Value, right: &Value) -> Result<Ordering, Error> {
    let ordering = match (left, right) {
        (Value::Undefined(name), _) | (_, Value::Undefined(name)) => {
            return Err(error_undefined(name))
        }
        (Value::Int(left), Value::Int(right)) => Some(left.cmp(right)),
        (Value::Str(left), Value::Str(right)) => Some(left.cmp(right)),
        (Value::Date(left), Value::Date(right)) => Some(left.cmp(right)),
        (Value::DateTime(left), Value::DateTime(right)) => Some(left.cmp(right)),
        (Value::TimeDelta(left), Value::TimeDelta(right)) => Some(left.cmp(right)),
        (Value::MonthDelta(left), Value::MonthDelta(right)) => Some(left.cmp(right)),
        (Value::List(left), Value::List(right)) => {
            let (left, right) = (left.snapshot(), right.snapshot());
            for (l, r) in left.iter().zip(&right) {
                match compare(l, r)? {
                    Ordering::Equal => continue,
                    ordering => return Ok(ordering),
                }
            }
            Some(left.len().cmp(&right.len()))
        }
        (left, right) => match (left.as_float(), right.as_float()) {
            (Some(l), Some(r)) => l.partial_cmp(&r),
            _ => None,
        },
    };

    ordering.ok_or_else(|| {
        Error::build("unorderable types")
            .with_kind(ErrorKind::Unorderable)
            .with_help(format!(
                "`{}` and `{}` cannot be ordered",
                left.type_name(),
                right.type_name()
            ))
    })
}

/// Return true if the container holds the item, as done by `in`.
///
/// # Errors
///
/// Returns an [`Error`] if the container does not support containment
/// tests.
pub fn contains(container: &Value, item: &Value) -> Result<bool, Error> {
    match (container, item) {
        (Value::Str(string), Value::Str(part)) => Ok(string.contains(&**part)),
        (Value::Str(_), other) => Err(error_type(format!(
            "`in <str>` requires a string on the left, not `{}`",
            other.type_name()
        ))),
        (Value::List(list), item) => Ok(list.snapshot().iter().any(|i| equals(i, item))),
        (Value::Set(set), item) => Ok(item.is_hashable() && set.lock().contains(item)),
        (Value::Dict(dict), item) => Ok(item.is_hashable() && dict.lock().contains_key(item)),
        (Value::Undefined(name), _) => Err(error_undefined(name)),
        (other, _) => Err(error_type(format!(
            "`{}` object does not support `in`",
            other.type_name()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{compile, Arguments, Store};
    use serde_json::{json, Value as Json};

    #[test]
    fn test_truthy() {
        let template = compile("<?if value?>a<?else?>b<?end if?>").unwrap();
        let true_values = vec![
            json!("lorem"),
            json!(12),
            json!(114.4),
            json!(-12),
            json!(true),
            json!(["lorem", "ipsum"]),
            json!({"lorem": "ipsum"}),
        ];
        let false_values = vec![
            json!(""),
            json!(0),
            json!(0.0),
            json!(null),
            json!(false),
            json!([]),
            json!({}),
        ];
        for (left, right) in true_values.into_iter().zip(false_values) {
            let store = Store::new().with("value", left).unwrap();
            assert_eq!(template.renders(Arguments::from(&store)).unwrap(), "a");
            let store = Store::new().with("value", right).unwrap();
            assert_eq!(template.renders(Arguments::from(&store)).unwrap(), "b");
        }
        assert_eq!(template.renders(Arguments::new()).unwrap(), "b");
    }

    #[test]
    fn test_incompatible_types() {
        let template = compile("<?if 'hello' > True?>a<?end if?>").unwrap();
        let error = template.renders(Arguments::new()).unwrap_err();

        assert_eq!(error.kind(), ErrorKind::Unorderable);
        assert_eq!(error.location().map(|l| l.column()), Some(1));
    }

    #[test]
    fn test_equal() {
        let left = vec![json!(10), json!("a"), json!(true), json!(["one"]), json!({"a": "b"})];
        let right = vec![json!(10.0), json!("a"), json!(1), json!(["one"]), json!({"a": "b"})];
        compare_all(left, right, "==");
    }

    #[test]
    fn test_not_equal() {
        let left = vec![json!(10), json!("a"), json!(true), json!(["one"]), json!({"a": "b"})];
        let right = vec![
            json!(20),
            json!("b"),
            json!(false),
            json!(["one", "two"]),
            json!({"a": "b", "c": "d"}),
        ];
        compare_all(left, right, "!=");
    }

    #[test]
    fn test_lesser() {
        let left = vec![json!(50), json!("a"), json!(false), json!([1, 2]), json!([1])];
        let right = vec![json!(5100), json!("b"), json!(true), json!([1, 3]), json!([1, 0])];
        compare_all(left, right, "<");
    }

    #[test]
    fn test_greater_equal() {
        let left = vec![json!(10), json!(11), json!("b"), json!(2.5)];
        let right = vec![json!(10), json!(10), json!("a"), json!(2)];
        compare_all(left, right, ">=");
    }

    #[test]
    fn test_contains() {
        let left = vec![json!("ell"), json!(2), json!("k")];
        let right = vec![json!("hello"), json!([1, 2]), json!({"k": null})];
        compare_all(left, right, "in");

        let left = vec![json!("z"), json!(3), json!("v")];
        compare_all(left, right_again(), "not in");
    }

    #[test]
    fn test_identity() {
        let list = Value::list(vec![]);

        assert!(identical(&list, &list.clone()));
        assert!(!identical(&list, &Value::list(vec![])));
        assert!(equals(&list, &Value::list(vec![])));
        assert!(identical(&Value::None, &Value::None));
        assert!(!identical(&Value::Int(1), &Value::Bool(true)));
    }

    fn right_again() -> Vec<Json> {
        vec![json!("hello"), json!([1, 2]), json!({"k": null})]
    }

    // Zip the two lists together and compare each pair in a template with
    // the given operator.
    fn compare_all(left: Vec<Json>, right: Vec<Json>, operator: &str) {
        let source = format!("<?if left {operator} right?>a<?end if?>");
        let template = compile(&source).unwrap();

        for (left, right) in left.into_iter().zip(right) {
            let store = Store::new()
                .with("left", left)
                .and_then(|store| store.with("right", right))
                .unwrap();
            let result = template.renders(Arguments::from(&store)).unwrap();
            assert_eq!(result, "a", "{source}");
        }
    }
}
