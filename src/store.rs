use crate::{log::Error, value::Value};
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::to_value;

/// Provides storage for data that templates can be rendered against.
///
/// A `Store` may be turned into keyword [`Arguments`][`crate::Arguments`],
/// or passed as globals, which every template of a render can see.
#[derive(Debug, Clone, Default)]
pub struct Store {
    data: IndexMap<String, Value>,
}

impl Store {
    /// Create a new Store.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert the value into the Store.
    ///
    /// # Errors
    ///
    /// Returns an error if the serialization fails.
    pub fn insert<S, T>(&mut self, key: S, value: T) -> Result<(), Error>
    where
        S: Into<String>,
        T: Serialize,
    {
        let key = key.into();
        let serialized = to_value(&value).map_err(|error| {
            Error::build(format!("value for `{key}` is unserializable"))
                .with_help(error.to_string())
        })?;
        self.data.insert(key, Value::from(serialized));

        Ok(())
    }

    /// Insert the value into the Store.
    ///
    /// Returns the Store, so additional methods may be chained.
    ///
    /// # Errors
    ///
    /// Returns an error if the serialization fails.
    pub fn with<S, T>(mut self, key: S, value: T) -> Result<Self, Error>
    where
        S: Into<String>,
        T: Serialize,
    {
        self.insert(key, value)?;

        Ok(self)
    }

    /// Insert a [`Value`] into the Store as it is.
    ///
    /// Use this for values that have no serialized form, like templates or
    /// host objects.
    #[inline]
    pub fn insert_value<S>(&mut self, key: S, value: Value)
    where
        S: Into<String>,
    {
        self.data.insert(key.into(), value);
    }

    /// Insert a [`Value`] into the Store as it is.
    ///
    /// Returns the Store, so additional methods may be chained.
    #[inline]
    pub fn with_value<S>(mut self, key: S, value: Value) -> Self
    where
        S: Into<String>,
    {
        self.insert_value(key, value);

        self
    }

    /// Get the value of the given key, if any.
    #[inline]
    pub fn get(&self, index: &str) -> Option<&Value> {
        self.data.get(index)
    }

    /// Return an iterator over the names and values, in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.data.iter().map(|(key, value)| (key.as_str(), value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;

    #[derive(Serialize)]
    struct Person {
        name: String,
        age: u8,
    }

    #[test]
    fn test_insert() {
        let mut store = Store::new();
        store.insert("one", "two").unwrap();

        assert!(store
            .get("one")
            .is_some_and(|t| t.as_str() == Some("two")));
    }

    #[test]
    fn test_insert_fluent() {
        let store = Store::new()
            .with("three", "four")
            .unwrap()
            .with_value("five", Value::Int(5));

        assert_eq!(store.get("three"), Some(&Value::from("four")));
        assert_eq!(
            store.iter().map(|(key, _)| key).collect::<Vec<_>>(),
            vec!["three", "five"]
        );
    }

    #[test]
    fn test_insert_struct() {
        let store = Store::new()
            .with(
                "person",
                Person {
                    name: "taylor".to_string(),
                    age: 30,
                },
            )
            .unwrap();
        let template = crate::compile("<?print person.name?> <?print person.age + 1?>").unwrap();

        assert_eq!(
            template.renders(crate::Arguments::from(&store)).unwrap(),
            "taylor 31"
        );
    }
}
