//! Attribute, item and slice access, for reading and for assignment.
use crate::{
    builtin,
    log::{error_type, error_undefined, Error, ErrorKind},
    value::{Method, Value},
};
use std::sync::Arc;

/// Return the attribute of the value, as done by `x.name`.
///
/// # Errors
///
/// Returns an [`Error`] if the value does not support attributes.
pub fn attribute(object: &Value, name: &str) -> Result<Value, Error> {
    let value = match object {
        Value::Undefined(_) => Value::undefined(name),
        Value::Dict(dict) => {
            let found = dict.lock().get(&Value::from(name)).cloned();
            match found {
                Some(value) => value,
                None if builtin::has_method(object, name) => method(object, name),
                None => Value::undefined(name),
            }
        }
        Value::Template(closure) => {
            let template = closure.template();
            match name {
                "name" => template.name().into(),
                "doc" => template.doc().into(),
                "whitespace" => template.whitespace().to_string().into(),
                "signature" => match closure.signature() {
                    Some(signature) => signature.to_string().into(),
                    None => Value::None,
                },
                "render" | "renders" => method(object, name),
                _ => Value::undefined(name),
            }
        }
        Value::Object(provider) => provider
            .get(name)
            .unwrap_or_else(|| Value::undefined(name)),
        other if builtin::has_method(other, name) => method(other, name),
        other => {
            return Err(error_type(format!(
                "`{}` object has no attribute `{name}`",
                other.type_name()
            )))
        }
    };

    Ok(value)
}

/// Return the item of the value, as done by `x[key]`.
///
/// # Errors
///
/// Returns an [`Error`] if the value is not subscriptable, or the index is
/// out of range.
pub fn item(object: &Value, key: &Value) -> Result<Value, Error> {
    match (object, key) {
        (Value::Undefined(name), _) | (_, Value::Undefined(name)) => Err(error_undefined(name)),
        (_, Value::Slice(start, stop)) => slice(
            object,
            start.map(Value::Int).as_ref(),
            stop.map(Value::Int).as_ref(),
        ),
        (Value::List(list), key) => {
            let list = list.lock();
            let index = index(key, list.len())?;
            Ok(list[index].clone())
        }
        (Value::Str(string), key) => {
            let chars: Vec<char> = string.chars().collect();
            let index = index(key, chars.len())?;
            Ok(chars[index].to_string().into())
        }
        (Value::Dict(dict), key) => {
            if !key.is_hashable() {
                return Ok(Value::undefined(&crate::format::repr(key)));
            }
            let found = dict.lock().get(key).cloned();
            Ok(found.unwrap_or_else(|| Value::undefined(&crate::format::repr(key))))
        }
        (Value::Object(provider), Value::Str(name)) => Ok(provider
            .get(name)
            .unwrap_or_else(|| Value::undefined(name))),
        (other, _) => Err(error_type(format!(
            "`{}` object is not subscriptable",
            other.type_name()
        ))),
    }
}

/// Return the slice of a list or string, as done by `x[start:stop]`.
///
/// Bounds are clamped to the sequence like Python does.
///
/// # Errors
///
/// Returns an [`Error`] if the value cannot be sliced, or a bound is not an
/// integer.
pub fn slice(object: &Value, start: Option<&Value>, stop: Option<&Value>) -> Result<Value, Error> {
    let bounds = |length: usize| -> Result<(usize, usize), Error> {
        let start = bound(start, length, 0)?;
        let stop = bound(stop, length, length)?;
        Ok((start, stop.max(start)))
    };

    match object {
        Value::List(list) => {
            let list = list.lock();
            let (start, stop) = bounds(list.len())?;
            Ok(Value::list(list[start..stop].iter().cloned()))
        }
        Value::Str(string) => {
            let chars: Vec<char> = string.chars().collect();
            let (start, stop) = bounds(chars.len())?;
            Ok(chars[start..stop].iter().collect::<String>().into())
        }
        Value::Undefined(name) => Err(error_undefined(name)),
        other => Err(error_type(format!(
            "`{}` object cannot be sliced",
            other.type_name()
        ))),
    }
}

/// Assign the attribute of the value, as done by `<?code x.name = v?>`.
///
/// # Errors
///
/// Returns an [`Error`] if the value does not accept attribute assignment.
pub fn set_attribute(object: &Value, name: &str, value: Value) -> Result<(), Error> {
    match object {
        Value::Dict(dict) => {
            dict.lock().insert(Value::from(name), value);
            Ok(())
        }
        Value::Object(provider) => provider.set(name, value),
        Value::Undefined(undefined) => Err(error_undefined(undefined)),
        other => Err(error_type(format!(
            "cannot set attribute `{name}` of `{}` object",
            other.type_name()
        ))),
    }
}

/// Assign the item of the value, as done by `<?code x[key] = v?>`.
///
/// # Errors
///
/// Returns an [`Error`] if the value does not accept item assignment, the
/// key cannot be hashed, or the index is out of range.
pub fn set_item(object: &Value, key: &Value, value: Value) -> Result<(), Error> {
    match object {
        Value::List(list) => {
            let mut list = list.lock();
            let index = index(key, list.len())?;
            list[index] = value;
            Ok(())
        }
        Value::Dict(dict) => {
            let key = key.clone().into_key()?;
            dict.lock().insert(key, value);
            Ok(())
        }
        Value::Object(provider) => match key.as_str() {
            Some(name) => provider.set(name, value),
            None => Err(error_type("object items must be set by string name")),
        },
        Value::Undefined(name) => Err(error_undefined(name)),
        other => Err(error_type(format!(
            "`{}` object does not support item assignment",
            other.type_name()
        ))),
    }
}

fn method(receiver: &Value, name: &str) -> Value {
    Value::Method(Arc::new(Method {
        receiver: receiver.clone(),
        name: name.into(),
    }))
}

/// Resolve a possibly negative index into a position within the length.
fn index(key: &Value, length: usize) -> Result<usize, Error> {
    let position = key.as_int().ok_or_else(|| {
        error_type(format!(
            "indices must be integers, not `{}`",
            key.type_name()
        ))
    })?;
    let resolved = if position < 0 {
        position + length as i64
    } else {
        position
    };

    if resolved < 0 || resolved >= length as i64 {
        return Err(Error::build("index out of range")
            .with_kind(ErrorKind::IndexOutOfRange)
            .with_help(format!(
                "index {position} is out of range for a sequence of length {length}"
            )));
    }

    Ok(resolved as usize)
}

fn bound(value: Option<&Value>, length: usize, default: usize) -> Result<usize, Error> {
    let position = match value {
        None | Some(Value::None) => return Ok(default),
        Some(Value::Undefined(name)) => return Err(error_undefined(name)),
        Some(value) => value.as_int().ok_or_else(|| {
            error_type(format!(
                "slice indices must be integers, not `{}`",
                value.type_name()
            ))
        })?,
    };
    let length = length as i64;
    let position = if position < 0 { position + length } else { position };

    Ok(position.clamp(0, length) as usize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{compile, Arguments, Store};
    use serde_json::json;

    #[test]
    fn test_item_negative_index() {
        let list = Value::list(vec![Value::Int(1), Value::Int(2), Value::Int(3)]);

        assert_eq!(item(&list, &Value::Int(-1)).unwrap(), Value::Int(3));
        assert_eq!(item(&Value::from("abc"), &Value::Int(1)).unwrap(), Value::from("b"));
        assert_eq!(
            item(&list, &Value::Int(3)).unwrap_err().kind(),
            ErrorKind::IndexOutOfRange
        );
    }

    #[test]
    fn test_slice_clamps() {
        let template = compile("<?print s[1:]?>|<?print s[-2:]?>|<?print s[:99]?>|<?print s[3:1]?>").unwrap();
        let store = Store::new().with("s", "hello").unwrap();

        assert_eq!(
            template.renders(Arguments::from(&store)).unwrap(),
            "ello|lo|hello|"
        );
    }

    #[test]
    fn test_item_with_slice_value() {
        let text = Value::from("hello");

        assert_eq!(item(&text, &Value::Slice(Some(1), Some(-1))).unwrap(), Value::from("ell"));
        assert_eq!(item(&text, &Value::Slice(None, Some(2))).unwrap(), Value::from("he"));
    }

    #[test]
    fn test_dict_attributes() {
        let template = compile("<?print d.a?>|<?print d.missing?>|<?print len(d.items())?>").unwrap();
        let store = Store::new().with("d", json!({"a": 1})).unwrap();

        assert_eq!(template.renders(Arguments::from(&store)).unwrap(), "1||1");
    }

    #[test]
    fn test_attribute_on_plain_value() {
        let error = attribute(&Value::Int(1), "nope").unwrap_err();

        assert_eq!(error.kind(), ErrorKind::Type);
        assert!(attribute(&Value::undefined("x"), "y").unwrap().is_undefined());
    }

    #[test]
    fn test_assignment_targets() {
        let template = compile(
            "<?code l = [1, 2]?><?code l[-1] = 5?><?code d = {}?><?code d.x = 1?><?code d['y'] = 2?>\
             <?print l?> <?print d?>",
        )
        .unwrap();

        assert_eq!(
            template.renders(Arguments::new()).unwrap(),
            "[1, 5] {'x': 1, 'y': 2}"
        );
    }
}
