//! Matching call site arguments to a [`Signature`].
//!
//! The same algorithm serves template calls, native function calls and
//! method calls.
use crate::{
    format,
    log::{error_type, Error, ErrorKind},
    value::Value,
    Store,
};
use indexmap::IndexMap;
use std::fmt::{Display, Formatter, Result as FmtResult};

/// A parameter of a [`Signature`].
#[derive(Debug, Clone)]
pub struct Parameter {
    pub name: String,
    /// The default value, evaluated once and shared by every call that
    /// uses it.
    pub default: Option<Value>,
}

/// The parameters accepted by a callable.
///
/// # Examples
///
/// ```
/// use ul4::{Arguments, Signature, Value};
///
/// let signature = Signature::new()
///     .with_default("x", 17)
///     .with_default("y", 23);
///
/// let bound = signature.bind("f", Arguments::new().arg(1)).unwrap();
/// assert_eq!(bound.value("x"), Value::Int(1));
/// assert_eq!(bound.value("y"), Value::Int(23));
/// ```
#[derive(Debug, Clone, Default)]
pub struct Signature {
    parameters: Vec<Parameter>,
    rest: Option<String>,
    kwrest: Option<String>,
}

impl Signature {
    /// Create a new [`Signature`] without parameters.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a required parameter.
    pub fn with_parameter<T>(mut self, name: T) -> Self
    where
        T: Into<String>,
    {
        self.parameters.push(Parameter {
            name: name.into(),
            default: None,
        });

        self
    }

    /// Add a parameter with a default value.
    pub fn with_default<T, V>(mut self, name: T, default: V) -> Self
    where
        T: Into<String>,
        V: Into<Value>,
    {
        self.parameters.push(Parameter {
            name: name.into(),
            default: Some(default.into()),
        });

        self
    }

    /// Set the parameter collecting extra positional arguments.
    pub fn with_rest<T>(mut self, name: T) -> Self
    where
        T: Into<String>,
    {
        self.rest = Some(name.into());

        self
    }

    /// Set the parameter collecting extra keyword arguments.
    pub fn with_kwrest<T>(mut self, name: T) -> Self
    where
        T: Into<String>,
    {
        self.kwrest = Some(name.into());

        self
    }

    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    pub fn rest(&self) -> Option<&str> {
        self.rest.as_deref()
    }

    pub fn kwrest(&self) -> Option<&str> {
        self.kwrest.as_deref()
    }

    /// Bind the arguments to the parameters.
    ///
    /// `callee` names the callable in error messages.
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] when a parameter is bound twice, a required
    /// parameter is left unbound, or an argument has nowhere to go.
    pub fn bind(&self, callee: &str, arguments: Arguments) -> Result<Bound, Error> {
        let (positional, mut keywords) = arguments.expand(callee)?;
        let mut values: IndexMap<String, Option<Value>> = self
            .parameters
            .iter()
            .map(|parameter| (parameter.name.clone(), None))
            .collect();

        let mut positional = positional.into_iter();
        for slot in values.values_mut() {
            match positional.next() {
                Some(value) => *slot = Some(value),
                None => break,
            }
        }
        let leftover: Vec<Value> = positional.collect();

        for parameter in &self.parameters {
            if let Some(value) = keywords.shift_remove(&parameter.name) {
                match values.get_mut(&parameter.name) {
                    Some(slot) if slot.is_none() => *slot = Some(value),
                    _ => return Err(error_duplicate(callee, &parameter.name)),
                }
            }
        }

        let mut bound = IndexMap::with_capacity(values.len() + 2);
        for (parameter, (name, value)) in self.parameters.iter().zip(values) {
            let value = match (value, &parameter.default) {
                (Some(value), _) => value,
                (None, Some(default)) => default.clone(),
                (None, None) => {
                    return Err(Error::build("missing argument")
                        .with_kind(ErrorKind::MissingArgument)
                        .with_help(format!("`{callee}()` requires an argument for `{name}`")))
                }
            };
            bound.insert(name, value);
        }

        match &self.rest {
            Some(rest) => {
                bound.insert(rest.clone(), Value::list(leftover));
            }
            None if !leftover.is_empty() => {
                return Err(Error::build("too many arguments")
                    .with_kind(ErrorKind::TooManyArguments)
                    .with_help(format!(
                        "`{callee}()` expects at most {} positional arguments, got {}",
                        self.parameters.len(),
                        self.parameters.len() + leftover.len()
                    )))
            }
            None => (),
        }

        match &self.kwrest {
            Some(kwrest) => {
                let pairs = keywords
                    .into_iter()
                    .map(|(name, value)| (Value::from(name), value));
                bound.insert(kwrest.clone(), Value::dict(pairs)?);
            }
            None => {
                if let Some(name) = keywords.keys().next() {
                    return Err(error_unsupported(callee, name));
                }
            }
        }

        Ok(Bound { values: bound })
    }

    /// Bind the arguments of a call to a template without a signature.
    ///
    /// Only keyword arguments are accepted, each becomes a variable.
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] if any positional argument is given.
    pub fn bind_keywords(callee: &str, arguments: Arguments) -> Result<Bound, Error> {
        let (positional, keywords) = arguments.expand(callee)?;
        if !positional.is_empty() {
            return Err(Error::build("too many arguments")
                .with_kind(ErrorKind::TooManyArguments)
                .with_help(format!(
                    "`{callee}()` has no signature and accepts keyword arguments only"
                )));
        }

        Ok(Bound { values: keywords })
    }
}

impl Display for Signature {
    /// Format the signature like it is written in a template, parentheses
    /// included.
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let mut parts: Vec<String> = self
            .parameters
            .iter()
            .map(|parameter| match &parameter.default {
                Some(default) => format!("{}={}", parameter.name, format::repr(default)),
                None => parameter.name.clone(),
            })
            .collect();
        parts.extend(self.rest.iter().map(|rest| format!("*{rest}")));
        parts.extend(self.kwrest.iter().map(|kwrest| format!("**{kwrest}")));

        write!(f, "({})", parts.join(", "))
    }
}

/// A single argument at a call site.
#[derive(Debug, Clone)]
pub enum Argument {
    Positional(Value),
    Keyword(String, Value),
    /// `*value`, spread into positional arguments.
    Unpack(Value),
    /// `**value`, spread into keyword arguments.
    UnpackMap(Value),
}

/// The arguments of a call, in call site order.
///
/// # Examples
///
/// ```
/// use ul4::{Arguments, Value};
///
/// let arguments = Arguments::new()
///     .arg(1)
///     .kwarg("name", "taylor")
///     .unpack(Value::list(vec![Value::Int(2), Value::Int(3)]));
/// assert_eq!(arguments.len(), 3);
/// ```
#[derive(Debug, Clone, Default)]
pub struct Arguments {
    items: Vec<Argument>,
}

impl Arguments {
    /// Create a new, empty [`Arguments`].
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a positional argument.
    pub fn arg<T>(mut self, value: T) -> Self
    where
        T: Into<Value>,
    {
        self.push(Argument::Positional(value.into()));

        self
    }

    /// Add a keyword argument.
    pub fn kwarg<S, T>(mut self, name: S, value: T) -> Self
    where
        S: Into<String>,
        T: Into<Value>,
    {
        self.push(Argument::Keyword(name.into(), value.into()));

        self
    }

    /// Add an iterable whose items become positional arguments.
    pub fn unpack<T>(mut self, value: T) -> Self
    where
        T: Into<Value>,
    {
        self.push(Argument::Unpack(value.into()));

        self
    }

    /// Add a dict whose items become keyword arguments.
    pub fn unpack_map<T>(mut self, value: T) -> Self
    where
        T: Into<Value>,
    {
        self.push(Argument::UnpackMap(value.into()));

        self
    }

    /// Add an [`Argument`].
    #[inline]
    pub fn push(&mut self, argument: Argument) {
        self.items.push(argument);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Spread the unpacking arguments, returning the positional values and
    /// the keyword values.
    fn expand(self, callee: &str) -> Result<(Vec<Value>, IndexMap<String, Value>), Error> {
        let mut positional = vec![];
        let mut keywords = IndexMap::new();

        let mut keyword = |name: String, value: Value| -> Result<(), Error> {
            if keywords.contains_key(&name) {
                return Err(error_duplicate(callee, &name));
            }
            keywords.insert(name, value);

            Ok(())
        };

        for argument in self.items {
            match argument {
                Argument::Positional(value) => positional.push(value),
                Argument::Unpack(value) => positional.extend(value.iterate()?),
                Argument::Keyword(name, value) => keyword(name, value)?,
                Argument::UnpackMap(Value::Dict(dict)) => {
                    for (key, value) in dict.snapshot() {
                        let name = key.as_str().ok_or_else(|| {
                            error_type(format!(
                                "keywords for `{callee}()` must be strings, not `{}`",
                                key.type_name()
                            ))
                        })?;
                        keyword(name.to_string(), value)?;
                    }
                }
                Argument::UnpackMap(other) => {
                    return Err(error_type(format!(
                        "argument after `**` must be a dict, not `{}`",
                        other.type_name()
                    )))
                }
            }
        }

        Ok((positional, keywords))
    }
}

impl From<&Store> for Arguments {
    /// Pass every value in the [`Store`] as a keyword argument.
    fn from(store: &Store) -> Self {
        let mut arguments = Arguments::new();
        for (name, value) in store.iter() {
            arguments.push(Argument::Keyword(name.to_string(), value.clone()));
        }

        arguments
    }
}

impl From<Store> for Arguments {
    fn from(store: Store) -> Self {
        Arguments::from(&store)
    }
}

/// Arguments bound to parameter names.
#[derive(Debug, Clone, Default)]
pub struct Bound {
    values: IndexMap<String, Value>,
}

impl Bound {
    /// Return the value bound to the given name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Return the value bound to the given name, or an undefined value.
    pub fn value(&self, name: &str) -> Value {
        self.get(name)
            .cloned()
            .unwrap_or_else(|| Value::undefined(name))
    }

    /// Return the number of bound names.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl IntoIterator for Bound {
    type Item = (String, Value);
    type IntoIter = indexmap::map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.into_iter()
    }
}

fn error_duplicate(callee: &str, name: &str) -> Error {
    Error::build("duplicate argument")
        .with_kind(ErrorKind::DuplicateArgument)
        .with_help(format!("`{callee}()` got multiple values for `{name}`"))
}

fn error_unsupported(callee: &str, name: &str) -> Error {
    Error::build("unsupported argument")
        .with_kind(ErrorKind::UnsupportedArgument)
        .with_help(format!("`{callee}()` has no parameter named `{name}`"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defaults() -> Signature {
        Signature::new().with_default("x", 17).with_default("y", 23)
    }

    #[test]
    fn test_bind_defaults() {
        let bound = defaults().bind("f", Arguments::new()).unwrap();

        assert_eq!(bound.value("x"), Value::Int(17));
        assert_eq!(bound.value("y"), Value::Int(23));
    }

    #[test]
    fn test_bind_positional() {
        let bound = defaults().bind("f", Arguments::new().arg(42)).unwrap();

        assert_eq!(bound.value("x"), Value::Int(42));
        assert_eq!(bound.value("y"), Value::Int(23));
    }

    #[test]
    fn test_bind_too_many() {
        let error = defaults()
            .bind("f", Arguments::new().arg(1).arg(2).arg(3))
            .unwrap_err();

        assert_eq!(error.kind(), ErrorKind::TooManyArguments);
    }

    #[test]
    fn test_bind_duplicate_keyword() {
        let error = defaults()
            .bind("f", Arguments::new().kwarg("x", 1).kwarg("x", 2))
            .unwrap_err();
        assert_eq!(error.kind(), ErrorKind::DuplicateArgument);

        let first = Value::dict(vec![(Value::from("x"), Value::Int(1))]).unwrap();
        let second = Value::dict(vec![(Value::from("x"), Value::Int(2))]).unwrap();
        let error = defaults()
            .bind("f", Arguments::new().unpack_map(first).unpack_map(second))
            .unwrap_err();
        assert_eq!(error.kind(), ErrorKind::DuplicateArgument);
    }

    #[test]
    fn test_bind_keyword_after_positional() {
        let error = defaults()
            .bind("f", Arguments::new().arg(1).kwarg("x", 2))
            .unwrap_err();

        assert_eq!(error.kind(), ErrorKind::DuplicateArgument);
    }

    #[test]
    fn test_bind_missing() {
        let signature = Signature::new().with_parameter("a");
        let error = signature.bind("f", Arguments::new()).unwrap_err();

        assert_eq!(error.kind(), ErrorKind::MissingArgument);
    }

    #[test]
    fn test_bind_unsupported() {
        let error = defaults()
            .bind("f", Arguments::new().kwarg("z", 1))
            .unwrap_err();

        assert_eq!(error.kind(), ErrorKind::UnsupportedArgument);
    }

    #[test]
    fn test_bind_rest() {
        let signature = Signature::new()
            .with_parameter("a")
            .with_rest("args")
            .with_kwrest("kwargs");
        let bound = signature
            .bind(
                "f",
                Arguments::new()
                    .unpack(Value::list(vec![Value::Int(1), Value::Int(2)]))
                    .kwarg("k", "v"),
            )
            .unwrap();

        assert_eq!(bound.value("a"), Value::Int(1));
        assert_eq!(bound.value("args"), Value::list(vec![Value::Int(2)]));
        assert_eq!(
            bound.value("kwargs"),
            Value::dict(vec![(Value::from("k"), Value::from("v"))]).unwrap()
        );
    }

    #[test]
    fn test_bind_shared_default() {
        let signature = Signature::new().with_default("x", Value::list(vec![]));
        let first = signature.bind("f", Arguments::new()).unwrap().value("x");
        let second = signature.bind("f", Arguments::new()).unwrap().value("x");

        assert_eq!(first.address(), second.address());
    }

    #[test]
    fn test_bind_keywords_only() {
        let bound = Signature::bind_keywords("t", Arguments::new().kwarg("a", 1)).unwrap();
        assert_eq!(bound.value("a"), Value::Int(1));

        let error = Signature::bind_keywords("t", Arguments::new().arg(1)).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::TooManyArguments);
    }

    #[test]
    fn test_signature_display() {
        let signature = defaults().with_rest("args").with_kwrest("kwargs");

        assert_eq!(signature.to_string(), "(x=17, y=23, *args, **kwargs)");
    }
}
