//! Object serialization in the UL4ON text format.
//!
//! Every value is written as a one letter typecode followed by its payload.
//! Strings, containers, templates and host objects are remembered in the
//! order they are written, and written again as a backreference `^<index>`,
//! so shared and cyclic structures keep their shape when read back.
//!
//! An [`Encoder`] or [`Decoder`] keeps its table between calls, which allows
//! a stream of values to reference values sent earlier.
//!
//! # Examples
//!
//! ```
//! use ul4::{ul4on, Value};
//!
//! let list = Value::list(vec![Value::Int(1), Value::from("two")]);
//! let outer = Value::list(vec![list.clone(), list]);
//!
//! let text = ul4on::dumps(&outer).unwrap();
//! assert_eq!(text, "L L i1 S'two' ] ^1 ]");
//!
//! let back = ul4on::loads(&text).unwrap();
//! assert_eq!(back, outer);
//! ```
use crate::{
    compile::Whitespace,
    engine::Engine,
    format,
    log::{Error, ErrorKind},
    render::Closure,
    value::{Color, Shared, Value},
};
use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, Timelike};
use indexmap::{IndexMap, IndexSet};
use std::{collections::HashMap, fmt::Write, sync::Arc};

/// Type name used for templates.
pub const TEMPLATE_TYPE: &str = "de.livinglogic.ul4.template";

/// Version written with every template.
const TEMPLATE_VERSION: &str = "1";

/// Describes a host object that can be written by an [`Encoder`].
///
/// The object is written as `O`, its type name, whatever
/// [`dump`][`Persistent::dump`] writes, and `)`. Reading it back requires
/// a factory for the type name in the [`Registry`] of the [`Decoder`].
pub trait Persistent {
    /// Name identifying the type in the serialized form.
    fn type_name(&self) -> &str;

    /// Write the content of the object.
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] if a value cannot be encoded.
    fn dump(&self, encoder: &mut Encoder) -> Result<(), Error>;
}

type Factory = Arc<dyn Fn(&mut Decoder) -> Result<Value, Error> + Send + Sync>;

/// Maps type names to the factories that read host objects.
#[derive(Clone, Default)]
pub struct Registry {
    factories: IndexMap<String, Factory>,
}

impl Registry {
    /// Create a new, empty Registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory for the given type name.
    ///
    /// The factory is called after the type name has been read, and reads
    /// the content of the object with [`Decoder::load`]. The closing `)` is
    /// consumed by the decoder.
    pub fn register<F>(&mut self, name: &str, factory: F)
    where
        F: Fn(&mut Decoder) -> Result<Value, Error> + Send + Sync + 'static,
    {
        self.factories.insert(name.to_string(), Arc::new(factory));
    }

    /// Register a factory for the given type name.
    ///
    /// Returns the Registry, so additional methods may be chained.
    pub fn with_type<F>(mut self, name: &str, factory: F) -> Self
    where
        F: Fn(&mut Decoder) -> Result<Value, Error> + Send + Sync + 'static,
    {
        self.register(name, factory);

        self
    }

    fn get(&self, name: &str) -> Option<Factory> {
        self.factories.get(name).cloned()
    }
}

/// Writes values in the UL4ON format.
#[derive(Default)]
pub struct Encoder {
    buffer: String,
    /// Written in front of each item, repeated once per nesting level.
    indent: Option<String>,
    level: usize,
    first: bool,
    /// Index of each remembered value, by address.
    table: HashMap<usize, usize>,
    /// Values in the table, held so their addresses stay unique.
    kept: Vec<Value>,
    /// Number of entries in the table, including values never referenced
    /// twice.
    count: usize,
}

impl Encoder {
    /// Create a new Encoder writing everything on one line.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new Encoder writing each item on its own line, indented by
    /// the given text per nesting level.
    pub fn indented(indent: &str) -> Self {
        Self {
            indent: Some(indent.to_string()),
            ..Self::default()
        }
    }

    /// Encode the value and return the text.
    ///
    /// Values encoded by earlier calls are written as backreferences.
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] if the value contains something that has no
    /// serialized form, such as an undefined value or a function. The table
    /// is then left as it was before the call.
    pub fn encode(&mut self, value: &Value) -> Result<String, Error> {
        self.first = true;
        self.level = 0;
        let (count, kept) = (self.count, self.kept.len());
        let result = self.dump(value);
        let text = std::mem::take(&mut self.buffer);
        if let Err(error) = result {
            for value in self.kept.drain(kept..) {
                if let Some(address) = value.address() {
                    self.table.remove(&address);
                }
            }
            self.count = count;
            return Err(error);
        }
        tracing::trace!(length = text.len(), objects = self.count, "encoded value");

        Ok(text)
    }

    /// Write a single value.
    ///
    /// Used by [`Persistent::dump`] to write the content of host objects.
    ///
    /// # Errors
    ///
    /// See [`Encoder::encode`].
    pub fn dump(&mut self, value: &Value) -> Result<(), Error> {
        if let Some(index) = value.address().and_then(|address| self.table.get(&address)) {
            let line = format!("^{index}");
            self.line(&line);
            return Ok(());
        }

        match value {
            Value::None => self.line("n"),
            Value::Bool(true) => self.line("bT"),
            Value::Bool(false) => self.line("bF"),
            Value::Int(int) => self.line(&format!("i{int}")),
            Value::Float(float) => self.line(&format!("f{}", format::float_text(*float))),
            Value::Str(string) => {
                self.record(value);
                self.line(&format!("S{}", format::quote(string)));
            }
            Value::Color(color) => {
                self.record(value);
                self.items(
                    "C",
                    &[color.r, color.g, color.b, color.a].map(i64::from),
                );
            }
            Value::Date(date) => {
                self.record(value);
                self.items(
                    "X",
                    &[i64::from(date.year()), i64::from(date.month()), i64::from(date.day())],
                );
            }
            Value::DateTime(datetime) => {
                self.record(value);
                self.items(
                    "Z",
                    &[
                        i64::from(datetime.year()),
                        i64::from(datetime.month()),
                        i64::from(datetime.day()),
                        i64::from(datetime.hour()),
                        i64::from(datetime.minute()),
                        i64::from(datetime.second()),
                        i64::from(datetime.nanosecond() / 1000),
                    ],
                );
            }
            Value::TimeDelta(delta) => {
                let (days, seconds, microseconds) = format::delta_parts(delta);
                self.record(value);
                self.items("T", &[days, seconds, microseconds]);
            }
            Value::MonthDelta(months) => {
                self.record(value);
                self.items("M", &[*months]);
            }
            Value::Slice(start, stop) => {
                self.record(value);
                let mut line = "R".to_string();
                for bound in [start, stop] {
                    match bound {
                        Some(bound) => {
                            let _ = write!(line, " i{bound}");
                        }
                        None => line.push_str(" n"),
                    }
                }
                self.line(&line);
            }
            Value::List(list) => {
                self.record(value);
                let items = list.snapshot();
                self.open("L");
                for item in &items {
                    self.dump(item)?;
                }
                self.close("]");
            }
            Value::Set(set) => {
                self.record(value);
                let items = set.snapshot();
                self.open("Y");
                for item in &items {
                    self.dump(item)?;
                }
                self.close("}");
            }
            Value::Dict(dict) => {
                self.record(value);
                let pairs = dict.snapshot();
                self.open("D");
                for (key, item) in &pairs {
                    self.dump(key)?;
                    self.dump(item)?;
                }
                self.close("}");
            }
            Value::Template(closure) => {
                self.record(value);
                let template = closure.template();
                let signature = match template.signature_text() {
                    Some(text) => Value::from(text),
                    None => Value::None,
                };
                let (start, end) = template.delimiters();
                self.open("O");
                self.inline(&Value::from(TEMPLATE_TYPE))?;
                self.dump(&Value::from(TEMPLATE_VERSION))?;
                self.dump(&template.name().map_or(Value::None, Value::from))?;
                self.dump(&Value::from(template.code()))?;
                self.dump(&signature)?;
                self.dump(&Value::from(template.whitespace().to_string()))?;
                self.dump(&Value::from(start))?;
                self.dump(&Value::from(end))?;
                self.close(")");
            }
            Value::Object(provider) => {
                let persistent = provider.persistent().ok_or_else(|| {
                    error_codec(format!(
                        "`{}` object cannot be encoded",
                        provider.type_name()
                    ))
                })?;
                self.record(value);
                self.open("O");
                self.inline(&Value::from(persistent.type_name()))?;
                persistent.dump(self)?;
                self.close(")");
            }
            Value::Undefined(_) | Value::Function(_) | Value::Method(_) => {
                return Err(error_codec(format!(
                    "`{}` object cannot be encoded",
                    value.type_name()
                )))
            }
        }

        Ok(())
    }

    /// Remember the value, so that writing it again produces a
    /// backreference.
    fn record(&mut self, value: &Value) {
        if let Some(address) = value.address() {
            self.table.insert(address, self.count);
            self.kept.push(value.clone());
        }
        self.count += 1;
    }

    fn line(&mut self, text: &str) {
        match &self.indent {
            Some(indent) => {
                for _ in 0..self.level {
                    self.buffer.push_str(indent);
                }
                self.buffer.push_str(text);
                self.buffer.push('\n');
            }
            None => {
                if !self.first {
                    self.buffer.push(' ');
                }
                self.buffer.push_str(text);
            }
        }
        self.first = false;
    }

    /// Write the typecode followed by integer items on the same line.
    fn items(&mut self, code: &str, items: &[i64]) {
        let mut line = code.to_string();
        for item in items {
            let _ = write!(line, " i{item}");
        }
        self.line(&line);
    }

    /// Write the opening typecode of a nested structure.
    fn open(&mut self, code: &str) {
        self.line(code);
        self.level += 1;
    }

    fn close(&mut self, code: &str) {
        self.level -= 1;
        self.line(code);
    }

    /// Write a value on the line of the typecode written last.
    fn inline(&mut self, value: &Value) -> Result<(), Error> {
        match self.indent.take() {
            Some(indent) => {
                if self.buffer.ends_with('\n') {
                    self.buffer.pop();
                }
                self.first = false;
                let result = self.dump(value);
                self.buffer.push('\n');
                self.indent = Some(indent);
                result
            }
            None => self.dump(value),
        }
    }
}

/// Reads values in the UL4ON format.
#[derive(Default)]
pub struct Decoder {
    registry: Registry,
    /// Values read so far that may be referenced, `None` while one is still
    /// being read.
    table: Vec<Option<Value>>,
    text: String,
    position: usize,
}

impl Decoder {
    /// Create a new Decoder that knows no host object types.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new Decoder that reads host objects with the factories in
    /// the given [`Registry`].
    pub fn with_registry(registry: Registry) -> Self {
        Self {
            registry,
            ..Self::default()
        }
    }

    /// Decode one value from the text.
    ///
    /// Backreferences may point to values decoded by earlier calls.
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] if the text is malformed, holds more than one
    /// value, or names a type that is not registered. Entries added to the
    /// table by the failed call are dropped again.
    pub fn decode(&mut self, text: &str) -> Result<Value, Error> {
        self.text = text.to_string();
        self.position = 0;
        let size = self.table.len();
        let value = self.load().and_then(|value| match self.next_char() {
            Some(_) => Err(self.broken("end of input")),
            None => Ok(value),
        });
        let value = value.inspect_err(|_| self.table.truncate(size))?;
        tracing::trace!(length = text.len(), objects = self.table.len(), "decoded value");

        Ok(value)
    }

    /// Read the next value.
    ///
    /// Used by factories in the [`Registry`] to read the content of host
    /// objects.
    ///
    /// # Errors
    ///
    /// See [`Decoder::decode`].
    pub fn load(&mut self) -> Result<Value, Error> {
        let code = self
            .next_char()
            .ok_or_else(|| self.broken("a typecode"))?;

        self.load_code(code)
    }

    fn load_code(&mut self, code: char) -> Result<Value, Error> {
        let registered = code.is_ascii_uppercase();
        let value = match code.to_ascii_lowercase() {
            '^' => {
                let index = self.read_token();
                let index: usize = index
                    .parse()
                    .map_err(|_| self.broken("a backreference index"))?;
                return match self.table.get(index) {
                    Some(Some(value)) => Ok(value.clone()),
                    Some(None) => Err(error_codec(format!(
                        "backreference ^{index} points to an object that is not complete"
                    ))),
                    None => Err(error_codec(format!("unknown backreference ^{index}"))),
                };
            }
            'n' => self.register(registered, Value::None),
            'b' => {
                let flag = self.take_char();
                let value = match flag {
                    Some('T') => Value::Bool(true),
                    Some('F') => Value::Bool(false),
                    _ => return Err(self.broken("`T` or `F` for a bool")),
                };
                self.register(registered, value)
            }
            'i' => {
                let token = self.read_token();
                let value = token
                    .parse::<i64>()
                    .map(Value::Int)
                    .map_err(|_| self.broken("an integer"))?;
                self.register(registered, value)
            }
            'f' => {
                let token = self.read_token();
                let value = token
                    .parse::<f64>()
                    .map(Value::Float)
                    .map_err(|_| self.broken("a float"))?;
                self.register(registered, value)
            }
            's' => {
                let value = Value::from(self.read_string()?);
                self.register(registered, value)
            }
            'c' => {
                let slot = self.reserve(registered);
                let [r, g, b, a] = [self.load_byte()?, self.load_byte()?, self.load_byte()?, self.load_byte()?];
                self.fill(slot, Value::Color(Color::new(r, g, b, a)))
            }
            'x' => {
                let slot = self.reserve(registered);
                let (year, month, day) = (self.load_int()?, self.load_int()?, self.load_int()?);
                let date = date(year, month, day)?;
                self.fill(slot, Value::Date(date))
            }
            'z' => {
                let slot = self.reserve(registered);
                let mut parts = [0; 7];
                for part in &mut parts {
                    *part = self.load_int()?;
                }
                let [year, month, day, hour, minute, second, microsecond] = parts;
                let time = u32::try_from(hour)
                    .ok()
                    .zip(u32::try_from(minute).ok())
                    .zip(u32::try_from(second).ok())
                    .zip(u32::try_from(microsecond).ok())
                    .and_then(|(((h, mi), s), us)| NaiveTime::from_hms_micro_opt(h, mi, s, us))
                    .ok_or_else(|| error_codec("invalid time in datetime"))?;
                let datetime = NaiveDateTime::new(date(year, month, day)?, time);
                self.fill(slot, Value::DateTime(datetime))
            }
            't' => {
                let slot = self.reserve(registered);
                let (days, seconds, microseconds) = (self.load_int()?, self.load_int()?, self.load_int()?);
                let delta = TimeDelta::try_days(days)
                    .zip(TimeDelta::try_seconds(seconds))
                    .and_then(|(days, seconds)| days.checked_add(&seconds))
                    .and_then(|delta| delta.checked_add(&TimeDelta::microseconds(microseconds)))
                    .ok_or_else(|| error_codec("timedelta out of range"))?;
                self.fill(slot, Value::TimeDelta(delta))
            }
            'm' => {
                let slot = self.reserve(registered);
                let months = self.load_int()?;
                self.fill(slot, Value::MonthDelta(months))
            }
            'r' => {
                let slot = self.reserve(registered);
                let (start, stop) = (self.load_bound()?, self.load_bound()?);
                self.fill(slot, Value::Slice(start, stop))
            }
            'l' => {
                let list = Shared::new(Vec::new());
                let value = self.register(registered, Value::List(list.clone()));
                while let Some(code) = self.next_item("]")? {
                    let item = self.load_code(code)?;
                    list.lock().push(item);
                }
                value
            }
            'y' => {
                let set = Shared::new(IndexSet::new());
                let value = self.register(registered, Value::Set(set.clone()));
                while let Some(code) = self.next_item("}")? {
                    let item = self.load_code(code)?.into_key()?;
                    set.lock().insert(item);
                }
                value
            }
            'd' => {
                let dict = Shared::new(IndexMap::new());
                let value = self.register(registered, Value::Dict(dict.clone()));
                while let Some(code) = self.next_item("}")? {
                    let key = self.load_code(code)?.into_key()?;
                    let item = self.load()?;
                    dict.lock().insert(key, item);
                }
                value
            }
            'o' => {
                let slot = self.reserve(registered);
                let name = self.load()?;
                let name = name
                    .as_str()
                    .ok_or_else(|| error_codec("object type name must be a string"))?
                    .to_string();
                let value = if name == TEMPLATE_TYPE {
                    self.load_template()?
                } else {
                    let factory = self.registry.get(&name).ok_or_else(|| {
                        error_codec(format!("cannot decode object of type `{name}`"))
                            .with_help("register a factory for the type in the `Registry`")
                    })?;
                    factory(self)?
                };
                if self.next_char() != Some(')') {
                    return Err(self.broken("`)` closing an object"));
                }
                self.fill(slot, value)
            }
            other => {
                return Err(error_codec(format!("unknown typecode `{other}`"))
                    .with_help(format!("at position {}", self.position)))
            }
        };

        Ok(value)
    }

    fn load_template(&mut self) -> Result<Value, Error> {
        let version = self.load()?;
        if version.as_str() != Some(TEMPLATE_VERSION) {
            return Err(error_codec(format!(
                "unsupported template version {}",
                format::repr(&version)
            )));
        }
        let name = self.load_optional_str()?;
        let source = self.load_str("template source")?;
        let signature = self.load_optional_str()?;
        let whitespace: Whitespace = self.load_str("whitespace mode")?.parse()?;
        let start = self.load_str("start delimiter")?;
        let end = self.load_str("end delimiter")?;

        let template = Engine::shared().load_template(
            name.as_deref(),
            &source,
            signature.as_deref(),
            whitespace,
            (&start, &end),
        )?;

        Ok(Value::Template(Arc::new(Closure::from_template(Arc::new(
            template,
        )))))
    }

    fn load_str(&mut self, what: &str) -> Result<String, Error> {
        match self.load()? {
            Value::Str(string) => Ok(string.to_string()),
            other => Err(error_codec(format!(
                "expected a string for the {what}, found `{}`",
                other.type_name()
            ))),
        }
    }

    fn load_optional_str(&mut self) -> Result<Option<String>, Error> {
        match self.load()? {
            Value::None => Ok(None),
            Value::Str(string) => Ok(Some(string.to_string())),
            other => Err(error_codec(format!(
                "expected a string or none, found `{}`",
                other.type_name()
            ))),
        }
    }

    fn load_int(&mut self) -> Result<i64, Error> {
        match self.load()? {
            Value::Int(int) => Ok(int),
            other => Err(error_codec(format!(
                "expected an integer, found `{}`",
                other.type_name()
            ))),
        }
    }

    fn load_bound(&mut self) -> Result<Option<i64>, Error> {
        match self.load()? {
            Value::None => Ok(None),
            Value::Int(int) => Ok(Some(int)),
            other => Err(error_codec(format!(
                "expected an integer or none for a slice bound, found `{}`",
                other.type_name()
            ))),
        }
    }

    fn load_byte(&mut self) -> Result<u8, Error> {
        let int = self.load_int()?;
        u8::try_from(int).map_err(|_| error_codec(format!("colour component {int} is out of range")))
    }

    fn register(&mut self, registered: bool, value: Value) -> Value {
        if registered {
            self.table.push(Some(value.clone()));
        }

        value
    }

    /// Reserve a table entry for a value whose parts are read first.
    fn reserve(&mut self, registered: bool) -> Option<usize> {
        registered.then(|| {
            self.table.push(None);
            self.table.len() - 1
        })
    }

    fn fill(&mut self, slot: Option<usize>, value: Value) -> Value {
        if let Some(slot) = slot {
            self.table[slot] = Some(value.clone());
        }

        value
    }

    /// Return the typecode of the next item, or `None` once the terminator
    /// has been consumed.
    fn next_item(&mut self, terminator: &str) -> Result<Option<char>, Error> {
        match self.next_char() {
            Some(c) if terminator.contains(c) => Ok(None),
            Some(c) => Ok(Some(c)),
            None => Err(self.broken(&format!("an item or `{terminator}`"))),
        }
    }

    /// Return the next character that is not whitespace.
    fn next_char(&mut self) -> Option<char> {
        loop {
            let c = self.take_char()?;
            if !c.is_whitespace() {
                return Some(c);
            }
        }
    }

    fn take_char(&mut self) -> Option<char> {
        let c = self.text[self.position..].chars().next()?;
        self.position += c.len_utf8();

        Some(c)
    }

    /// Read up to the next whitespace or terminator.
    fn read_token(&mut self) -> String {
        let rest = &self.text[self.position..];
        let length = rest
            .find(|c: char| c.is_whitespace() || matches!(c, ']' | '}' | ')'))
            .unwrap_or(rest.len());
        let token = rest[..length].to_string();
        self.position += length;

        token
    }

    fn read_string(&mut self) -> Result<String, Error> {
        let delimiter = self
            .take_char()
            .ok_or_else(|| self.broken("a string delimiter"))?;
        let mut value = String::new();
        loop {
            match self.take_char() {
                None => return Err(self.broken("the end of the string")),
                Some(c) if c == delimiter => return Ok(value),
                Some('\\') => {
                    let escaped = self
                        .take_char()
                        .ok_or_else(|| self.broken("an escape sequence"))?;
                    match escaped {
                        'n' => value.push('\n'),
                        'r' => value.push('\r'),
                        't' => value.push('\t'),
                        '0' => value.push('\0'),
                        'x' => value.push(self.read_code_point(2)?),
                        'u' => value.push(self.read_code_point(4)?),
                        'U' => value.push(self.read_code_point(8)?),
                        other => value.push(other),
                    }
                }
                Some(c) => value.push(c),
            }
        }
    }

    fn read_code_point(&mut self, digits: usize) -> Result<char, Error> {
        let rest = &self.text[self.position..];
        let hex = rest
            .get(..digits)
            .ok_or_else(|| self.broken("hexadecimal digits"))?;
        let c = u32::from_str_radix(hex, 16)
            .ok()
            .and_then(char::from_u32)
            .ok_or_else(|| self.broken("a valid code point"))?;
        self.position += digits;

        Ok(c)
    }

    fn broken(&self, expected: &str) -> Error {
        error_codec("broken UL4ON stream")
            .with_help(format!("expected {expected} at position {}", self.position))
    }
}

fn date(year: i64, month: i64, day: i64) -> Result<NaiveDate, Error> {
    i32::try_from(year)
        .ok()
        .zip(u32::try_from(month).ok())
        .zip(u32::try_from(day).ok())
        .and_then(|((year, month), day)| NaiveDate::from_ymd_opt(year, month, day))
        .ok_or_else(|| error_codec(format!("invalid date {year}-{month}-{day}")))
}

fn error_codec<T>(reason: T) -> Error
where
    T: Into<String>,
{
    Error::build(reason).with_kind(ErrorKind::Codec)
}

/// Encode the value on one line.
///
/// # Errors
///
/// See [`Encoder::encode`].
pub fn dumps(value: &Value) -> Result<String, Error> {
    Encoder::new().encode(value)
}

/// Encode the value with each item on its own line.
///
/// # Errors
///
/// See [`Encoder::encode`].
pub fn dumps_indented(value: &Value, indent: &str) -> Result<String, Error> {
    Encoder::indented(indent).encode(value)
}

/// Decode a value.
///
/// # Errors
///
/// See [`Decoder::decode`].
pub fn loads(text: &str) -> Result<Value, Error> {
    Decoder::new().decode(text)
}

/// Decode a value, reading host objects with the given [`Registry`].
///
/// # Errors
///
/// See [`Decoder::decode`].
pub fn loads_with(text: &str, registry: &Registry) -> Result<Value, Error> {
    Decoder::with_registry(registry.clone()).decode(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{compile, value::AttributeProvider, Arguments};

    #[test]
    fn test_scalars() {
        assert_eq!(dumps(&Value::Int(42)).unwrap(), "i42");
        assert_eq!(dumps(&Value::None).unwrap(), "n");
        assert_eq!(dumps(&Value::Bool(true)).unwrap(), "bT");
        assert_eq!(dumps(&Value::Float(0.5)).unwrap(), "f0.5");
        assert_eq!(dumps(&Value::from("it's")).unwrap(), "S\"it's\"");
    }

    #[test]
    fn test_round_trip() {
        let date = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        let datetime = date.and_hms_micro_opt(12, 30, 1, 250).unwrap();
        let value = Value::dict(vec![
            (Value::from("none"), Value::None),
            (Value::from("float"), Value::Float(-1.25)),
            (Value::from("text"), Value::from("a\nb\t'\"\\ü")),
            (Value::from("color"), Value::Color(Color::new(1, 2, 3, 4))),
            (Value::from("date"), Value::Date(date)),
            (Value::from("datetime"), Value::DateTime(datetime)),
            (Value::from("delta"), Value::TimeDelta(TimeDelta::seconds(-90))),
            (
                Value::from("set"),
                Value::set(vec![Value::Int(1), Value::from("x")]).unwrap(),
            ),
            (Value::Int(7), Value::list(vec![Value::Bool(false)])),
        ])
        .unwrap();

        let text = dumps(&value).unwrap();
        assert_eq!(loads(&text).unwrap(), value);
    }

    #[test]
    fn test_special_floats() {
        let value = Value::list(vec![Value::Float(f64::INFINITY), Value::Float(f64::NEG_INFINITY)]);

        assert_eq!(dumps(&value).unwrap(), "L finf f-inf ]");
        assert_eq!(loads("L finf f-inf ]").unwrap(), value);
        assert!(matches!(loads("fnan").unwrap(), Value::Float(f) if f.is_nan()));
    }

    #[test]
    fn test_aliasing() {
        let shared = Value::list(vec![Value::Int(1)]);
        let outer = Value::list(vec![shared.clone(), shared]);
        let back = loads(&dumps(&outer).unwrap()).unwrap();

        let Value::List(list) = back else {
            panic!("expected a list");
        };
        let items = list.snapshot();
        let (Value::List(first), Value::List(second)) = (&items[0], &items[1]) else {
            panic!("expected lists");
        };
        assert!(first.ptr_eq(second));
        first.lock().push(Value::Int(2));
        assert_eq!(second.lock().len(), 2);
    }

    #[test]
    fn test_cycle() {
        let dict = Value::dict(Vec::new()).unwrap();
        if let Value::Dict(inner) = &dict {
            inner.lock().insert(Value::from("self"), dict.clone());
        }

        let text = dumps(&dict).unwrap();
        assert_eq!(text, "D S'self' ^0 }");

        let Value::Dict(back) = loads(&text).unwrap() else {
            panic!("expected a dict");
        };
        let inner = back.lock().get(&Value::from("self")).cloned();
        assert!(matches!(inner, Some(Value::Dict(inner)) if inner.ptr_eq(&back)));
    }

    #[test]
    fn test_lowercase_codes_are_not_registered() {
        assert_eq!(
            loads("L l i1 ] S'a' ^1 ]").unwrap(),
            Value::list(vec![Value::list(vec![Value::Int(1)]), Value::from("a"), Value::from("a")])
        );
        assert_eq!(loads(" N ").unwrap(), Value::None);
    }

    #[test]
    fn test_indent() {
        let value = Value::list(vec![Value::Int(1), Value::list(vec![Value::None])]);
        let text = dumps_indented(&value, "\t").unwrap();

        assert_eq!(text, "L\n\ti1\n\tL\n\t\tn\n\t]\n]\n");
        assert_eq!(loads(&text).unwrap(), value);
    }

    #[test]
    fn test_chunked() {
        let shared = Value::from("shared");
        let mut encoder = Encoder::new();
        let first = encoder.encode(&shared).unwrap();
        let second = encoder.encode(&Value::list(vec![shared.clone()])).unwrap();
        assert_eq!(first, "S'shared'");
        assert_eq!(second, "L ^0 ]");

        let mut decoder = Decoder::new();
        assert_eq!(decoder.decode(&first).unwrap(), shared);
        assert_eq!(
            decoder.decode(&second).unwrap(),
            Value::list(vec![Value::from("shared")])
        );
    }

    #[test]
    fn test_unencodable() {
        let error = dumps(&Value::list(vec![Value::undefined("x")])).unwrap_err();

        assert_eq!(error.kind(), ErrorKind::Codec);
    }

    #[test]
    fn test_chunked_after_failure() {
        let good = Value::list(vec![Value::Int(1)]);
        let mut encoder = Encoder::new();
        assert!(encoder
            .encode(&Value::list(vec![Value::from("lost"), Value::undefined("x")]))
            .is_err());
        let first = encoder.encode(&good).unwrap();
        let second = encoder.encode(&good).unwrap();
        assert_eq!(first, "L i1 ]");
        assert_eq!(second, "^0");

        let mut decoder = Decoder::new();
        assert!(decoder.decode("L S'half' i1").is_err());
        assert_eq!(decoder.decode(&first).unwrap(), good);
        assert_eq!(decoder.decode(&second).unwrap(), good);
    }

    #[test]
    fn test_month_delta_and_slice() {
        let value = Value::list(vec![Value::MonthDelta(-3), Value::Slice(None, Some(2))]);
        let text = dumps(&value).unwrap();

        assert_eq!(text, "L M i-3 R n i2 ]");
        assert_eq!(loads(&text).unwrap(), value);
        assert_eq!(loads("m i1").unwrap(), Value::MonthDelta(1));
        assert_eq!(
            loads("L R i1 i2 ^1 ]").unwrap(),
            Value::list(vec![Value::Slice(Some(1), Some(2)), Value::Slice(Some(1), Some(2))])
        );
    }

    #[test]
    fn test_broken() {
        assert_eq!(loads("L i1").unwrap_err().kind(), ErrorKind::Codec);
        assert_eq!(loads("^3").unwrap_err().kind(), ErrorKind::Codec);
        assert_eq!(loads("q").unwrap_err().kind(), ErrorKind::Codec);
        assert_eq!(loads("i1 i2").unwrap_err().kind(), ErrorKind::Codec);
        assert_eq!(
            loads("O S'unknown' )").unwrap_err().kind(),
            ErrorKind::Codec
        );
    }

    #[test]
    fn test_template_round_trip() {
        let template = compile("<?ul4 greet(name, punct='!')?><?print name?><?print punct?>").unwrap();
        let value = Value::Template(Arc::new(Closure::from_template(Arc::new(template))));

        let text = dumps(&value).unwrap();
        assert!(text.starts_with("O S'de.livinglogic.ul4.template' S'1' S'greet'"));

        let Value::Template(closure) = loads(&text).unwrap() else {
            panic!("expected a template");
        };
        let template = closure.template();
        assert_eq!(template.name(), Some("greet"));
        assert_eq!(
            template
                .renders(Arguments::new().arg("taylor"))
                .unwrap(),
            "taylor!"
        );
    }

    #[derive(Debug)]
    struct Point {
        x: i64,
        y: i64,
    }

    impl AttributeProvider for Point {
        fn type_name(&self) -> &str {
            "point"
        }

        fn get(&self, name: &str) -> Option<Value> {
            match name {
                "x" => Some(Value::Int(self.x)),
                "y" => Some(Value::Int(self.y)),
                _ => None,
            }
        }

        fn persistent(&self) -> Option<&dyn Persistent> {
            Some(self)
        }
    }

    impl Persistent for Point {
        fn type_name(&self) -> &str {
            "com.example.point"
        }

        fn dump(&self, encoder: &mut Encoder) -> Result<(), Error> {
            encoder.dump(&Value::Int(self.x))?;
            encoder.dump(&Value::Int(self.y))
        }
    }

    #[test]
    fn test_custom_object() {
        let point = Value::Object(Arc::new(Point { x: 1, y: 2 }));
        let value = Value::list(vec![point.clone(), point]);
        let text = dumps(&value).unwrap();
        assert_eq!(text, "L O S'com.example.point' i1 i2 ) ^1 ]");

        let registry = Registry::new().with_type("com.example.point", |decoder: &mut Decoder| {
            let x = decoder.load()?.as_int().unwrap_or_default();
            let y = decoder.load()?.as_int().unwrap_or_default();
            Ok(Value::Object(Arc::new(Point { x, y })))
        });
        let back = loads_with(&text, &registry).unwrap();
        let template = compile("<?print p[0].x + p[1].y?>").unwrap();

        assert_eq!(
            template.renders(Arguments::new().kwarg("p", back)).unwrap(),
            "3"
        );
    }
}
