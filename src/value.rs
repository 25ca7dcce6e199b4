//! Runtime values produced and consumed by templates.
//!
//! Scalars are plain data. Lists, sets and dicts are shared and mutable:
//! cloning a [`Value`] holding one of them clones the handle, so every clone
//! observes the same contents. This is what makes aliasing in the object
//! serialization format, and shared default arguments, behave as expected.
mod color;
mod json;

pub use color::Color;

use crate::{
    format,
    function::Native,
    log::{error_type, error_undefined, Error},
    render::{compare, Closure},
    ul4on::Persistent,
};
use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use indexmap::{IndexMap, IndexSet};
use std::{
    fmt::{Debug, Formatter, Result as FmtResult},
    hash::{Hash, Hasher},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

/// A mutable value that may be referenced from many places at once.
pub struct Shared<T>(Arc<Mutex<T>>);

impl<T> Shared<T> {
    /// Create a new [`Shared`] holding the given value.
    pub fn new(value: T) -> Self {
        Self(Arc::new(Mutex::new(value)))
    }

    /// Lock the contents.
    ///
    /// The guard must not be held while evaluating template code, which may
    /// try to lock the same value again.
    pub fn lock(&self) -> MutexGuard<'_, T> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Return true if both handles point at the same value.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Return a number identifying the shared value for as long as it lives.
    pub fn address(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }
}

impl<T: Clone> Shared<T> {
    /// Return a copy of the current contents.
    pub fn snapshot(&self) -> T {
        self.lock().clone()
    }
}

impl<T> Clone for Shared<T> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<T> Debug for Shared<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "Shared({:#x})", self.address())
    }
}

impl<T: Default> Default for Shared<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

pub type List = Shared<Vec<Value>>;
pub type Set = Shared<IndexSet<Value>>;
pub type Dict = Shared<IndexMap<Value, Value>>;

/// Dynamic attribute access for host objects.
///
/// Implement this to expose a Rust type to templates. `x.name` calls
/// [`get`][`AttributeProvider::get`], `<?code x.name = v?>` calls
/// [`set`][`AttributeProvider::set`].
pub trait AttributeProvider: Send + Sync {
    /// Name of the type, shown by `type()` and in error messages.
    fn type_name(&self) -> &str;

    /// Return the attribute with the given name, if there is one.
    fn get(&self, name: &str) -> Option<Value>;

    /// Set the attribute with the given name.
    ///
    /// # Errors
    ///
    /// The default implementation rejects every assignment.
    fn set(&self, name: &str, value: Value) -> Result<(), Error> {
        let _ = value;
        Err(error_type(format!(
            "attribute `{name}` of `{}` is read only",
            self.type_name()
        )))
    }

    /// Return true if the attribute with the given name exists.
    fn has(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Return the names of all attributes.
    fn enumerate(&self) -> Vec<String> {
        Vec::new()
    }

    /// Return the object-serialization view of this object, if it has one.
    fn persistent(&self) -> Option<&dyn Persistent> {
        None
    }
}

/// A method looked up on a value but not called yet, as in `s.upper`.
#[derive(Debug, Clone)]
pub struct Method {
    /// The value the method was looked up on.
    pub receiver: Value,
    /// The name of the method.
    pub name: Arc<str>,
}

/// A value handled by templates.
#[derive(Clone)]
pub enum Value {
    /// The result of looking up a name that is not bound, carrying that name.
    Undefined(Arc<str>),
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Arc<str>),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    TimeDelta(TimeDelta),
    /// A number of calendar months.
    MonthDelta(i64),
    /// The bounds of `x[start:stop]`, as a value of its own.
    Slice(Option<i64>, Option<i64>),
    Color(Color),
    List(List),
    Set(Set),
    Dict(Dict),
    /// A template bound to the scope it was defined in.
    Template(Arc<Closure>),
    Function(Arc<Native>),
    Method(Arc<Method>),
    Object(Arc<dyn AttributeProvider>),
}

impl Value {
    /// Create a new list from the given items.
    pub fn list<I>(items: I) -> Self
    where
        I: IntoIterator<Item = Value>,
    {
        Value::List(Shared::new(items.into_iter().collect()))
    }

    /// Create a new dict from the given pairs.
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] if a key cannot be hashed.
    pub fn dict<I>(pairs: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = (Value, Value)>,
    {
        let mut map = IndexMap::new();
        for (key, value) in pairs {
            map.insert(key.into_key()?, value);
        }

        Ok(Value::Dict(Shared::new(map)))
    }

    /// Create a new set from the given items.
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] if an item cannot be hashed.
    pub fn set<I>(items: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = Value>,
    {
        let mut set = IndexSet::new();
        for item in items {
            set.insert(item.into_key()?);
        }

        Ok(Value::Set(Shared::new(set)))
    }

    /// Create an undefined value for the given name.
    pub fn undefined(name: &str) -> Self {
        Value::Undefined(name.into())
    }

    /// Return the name of the type of this value.
    pub fn type_name(&self) -> &str {
        match self {
            Value::Undefined(_) => "undefined",
            Value::None => "none",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::Date(_) => "date",
            Value::DateTime(_) => "datetime",
            Value::TimeDelta(_) => "timedelta",
            Value::MonthDelta(_) => "monthdelta",
            Value::Slice(..) => "slice",
            Value::Color(_) => "color",
            Value::List(_) => "list",
            Value::Set(_) => "set",
            Value::Dict(_) => "dict",
            Value::Template(_) => "template",
            Value::Function(_) => "function",
            Value::Method(_) => "method",
            Value::Object(object) => object.type_name(),
        }
    }

    /// Return true if this value is [`Value::Undefined`].
    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined(_))
    }

    /// Return true if the value may be used as a dict key or set member.
    pub fn is_hashable(&self) -> bool {
        !matches!(self, Value::List(_) | Value::Set(_) | Value::Dict(_))
    }

    /// Return the value back if it can be used as a dict key or set member.
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] for lists, sets and dicts.
    pub fn into_key(self) -> Result<Self, Error> {
        if self.is_hashable() {
            Ok(self)
        } else {
            Err(error_type(format!(
                "unhashable type `{}`",
                self.type_name()
            )))
        }
    }

    /// Return the text of a string value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(string) => Some(string),
            _ => None,
        }
    }

    /// Return the value as an integer, accepting bools.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Bool(bool) => Some(*bool as i64),
            Value::Int(int) => Some(*int),
            _ => None,
        }
    }

    /// Return the value as a float, accepting bools and integers.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Bool(bool) => Some(*bool as i64 as f64),
            Value::Int(int) => Some(*int as f64),
            Value::Float(float) => Some(*float),
            _ => None,
        }
    }

    /// Return the items of an iterable value.
    ///
    /// Strings yield their characters, dicts their keys. The items are a copy
    /// taken at the time of the call, so the loop body may change the
    /// container freely.
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] if the value cannot be iterated.
    pub fn iterate(&self) -> Result<Vec<Value>, Error> {
        match self {
            Value::Str(string) => Ok(string
                .chars()
                .map(|c| Value::Str(c.to_string().into()))
                .collect()),
            Value::List(list) => Ok(list.snapshot()),
            Value::Set(set) => Ok(set.lock().iter().cloned().collect()),
            Value::Dict(dict) => Ok(dict.lock().keys().cloned().collect()),
            Value::Undefined(name) => Err(error_undefined(name)),
            other => Err(error_type(format!(
                "`{}` object is not iterable",
                other.type_name()
            ))),
        }
    }

    /// Return the number of items in a container or characters in a string.
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] if the value has no length.
    pub fn len(&self) -> Result<usize, Error> {
        match self {
            Value::Str(string) => Ok(string.chars().count()),
            Value::List(list) => Ok(list.lock().len()),
            Value::Set(set) => Ok(set.lock().len()),
            Value::Dict(dict) => Ok(dict.lock().len()),
            Value::Undefined(name) => Err(error_undefined(name)),
            other => Err(error_type(format!(
                "`{}` object has no len()",
                other.type_name()
            ))),
        }
    }

    /// Return a number identifying shared values, used for identity checks.
    pub fn address(&self) -> Option<usize> {
        match self {
            Value::Str(string) => Some(Arc::as_ptr(string) as *const u8 as usize),
            Value::List(list) => Some(list.address()),
            Value::Set(set) => Some(set.address()),
            Value::Dict(dict) => Some(dict.address()),
            Value::Template(closure) => Some(Arc::as_ptr(closure) as *const () as usize),
            Value::Function(function) => Some(Arc::as_ptr(function) as *const () as usize),
            Value::Method(method) => Some(Arc::as_ptr(method) as *const () as usize),
            Value::Object(object) => Some(Arc::as_ptr(object) as *const () as usize),
            _ => None,
        }
    }
}

impl Debug for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(&format::repr(self))
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        compare::equals(self, other)
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Value::Undefined(_) => 0u8.hash(state),
            Value::None => 1u8.hash(state),
            Value::Bool(bool) => hash_number(*bool as i64 as f64, state),
            Value::Int(int) => hash_number(*int as f64, state),
            Value::Float(float) => hash_number(*float, state),
            Value::Str(string) => {
                3u8.hash(state);
                string.hash(state);
            }
            Value::Date(date) => {
                4u8.hash(state);
                date.hash(state);
            }
            Value::DateTime(datetime) => {
                5u8.hash(state);
                datetime.hash(state);
            }
            Value::TimeDelta(delta) => {
                6u8.hash(state);
                delta.hash(state);
            }
            Value::Color(color) => {
                7u8.hash(state);
                color.hash(state);
            }
            Value::MonthDelta(months) => {
                9u8.hash(state);
                months.hash(state);
            }
            Value::Slice(start, stop) => {
                10u8.hash(state);
                (start, stop).hash(state);
            }
            other => {
                8u8.hash(state);
                other.address().hash(state);
            }
        }
    }
}

/// Hash a number so that equal bools, integers and floats collide.
fn hash_number<H: Hasher>(number: f64, state: &mut H) {
    2u8.hash(state);
    if number.fract() == 0.0 && number.abs() < 9.0e15 {
        (number as i64).hash(state);
    } else {
        number.to_bits().hash(state);
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(value as i64)
    }
}

impl From<usize> for Value {
    fn from(value: usize) -> Self {
        Value::Int(value as i64)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(value.into())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Str(value.into())
    }
}

impl From<Color> for Value {
    fn from(value: Color) -> Self {
        Value::Color(value)
    }
}

impl From<NaiveDate> for Value {
    fn from(value: NaiveDate) -> Self {
        Value::Date(value)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(value: NaiveDateTime) -> Self {
        Value::DateTime(value)
    }
}

impl From<TimeDelta> for Value {
    fn from(value: TimeDelta) -> Self {
        Value::TimeDelta(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(value: Vec<Value>) -> Self {
        Value::List(Shared::new(value))
    }
}

impl<T> From<Option<T>> for Value
where
    T: Into<Value>,
{
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::None, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clone_shares_list() {
        let list = Value::list(vec![Value::Int(1)]);
        let alias = list.clone();
        if let Value::List(inner) = &alias {
            inner.lock().push(Value::Int(2));
        }

        assert_eq!(list.len().unwrap(), 2);
    }

    #[test]
    fn test_numeric_keys_collide() {
        let dict = Value::dict(vec![(Value::Int(1), Value::from("one"))]).unwrap();
        let Value::Dict(dict) = dict else {
            unreachable!()
        };

        assert_eq!(dict.lock().get(&Value::Float(1.0)), Some(&Value::from("one")));
        assert_eq!(dict.lock().get(&Value::Bool(true)), Some(&Value::from("one")));
    }

    #[test]
    fn test_unhashable_key() {
        let error = Value::set(vec![Value::list(vec![])]).unwrap_err();

        assert_eq!(error.kind(), crate::ErrorKind::Type);
    }

    #[test]
    fn test_iterate_string_and_dict() {
        let string = Value::from("ab");
        let dict = Value::dict(vec![(Value::from("k"), Value::Int(1))]).unwrap();

        assert_eq!(string.iterate().unwrap(), vec![Value::from("a"), Value::from("b")]);
        assert_eq!(dict.iterate().unwrap(), vec![Value::from("k")]);
        assert!(Value::Int(3).iterate().is_err());
    }
}
