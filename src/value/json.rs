use super::{Shared, Value};
use indexmap::IndexMap;
use serde_json::Value as Json;

impl From<Json> for Value {
    /// Convert data produced by `serde_json`.
    ///
    /// Objects become dicts with string keys, in their original order when
    /// `serde_json` preserves it.
    fn from(value: Json) -> Self {
        match value {
            Json::Null => Value::None,
            Json::Bool(bool) => Value::Bool(bool),
            Json::Number(number) => match number.as_i64() {
                Some(int) => Value::Int(int),
                None => Value::Float(number.as_f64().unwrap_or(f64::NAN)),
            },
            Json::String(string) => Value::Str(string.into()),
            Json::Array(array) => Value::list(array.into_iter().map(Value::from)),
            Json::Object(object) => Value::Dict(Shared::new(
                object
                    .into_iter()
                    .map(|(key, value)| (Value::Str(key.into()), Value::from(value)))
                    .collect::<IndexMap<_, _>>(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_json() {
        let value = Value::from(json!({"name": "taylor", "tags": [1, 2.5, null, true]}));
        let Value::Dict(dict) = value else {
            unreachable!()
        };
        let dict = dict.snapshot();

        assert_eq!(dict.get(&Value::from("name")), Some(&Value::from("taylor")));
        assert_eq!(
            dict.get(&Value::from("tags")),
            Some(&Value::list(vec![
                Value::Int(1),
                Value::Float(2.5),
                Value::None,
                Value::Bool(true)
            ]))
        );
    }
}
