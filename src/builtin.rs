//! Functions and methods available to every template.
use crate::{
    format,
    function::Native,
    log::{error_too_large, error_type, error_undefined, Error, ErrorKind, LENGTH_LIMIT},
    render::{compare, Arguments, Bound, Signature},
    value::{Color, Value},
};
use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, Timelike};
use indexmap::IndexMap;
use std::{
    cmp::Ordering,
    sync::{Arc, OnceLock},
};

/// Return the builtin function with the given name.
pub fn function(name: &str) -> Option<Value> {
    static FUNCTIONS: OnceLock<IndexMap<String, Value>> = OnceLock::new();

    FUNCTIONS.get_or_init(functions).get(name).cloned()
}

fn functions() -> IndexMap<String, Value> {
    let object = || Signature::new().with_parameter("obj");
    let iterable = || Signature::new().with_parameter("iterable");
    let natives = vec![
        native("range", Signature::new().with_rest("args"), range),
        native("len", Signature::new().with_parameter("sequence"), len),
        native("str", Signature::new().with_default("obj", ""), string),
        native("repr", object(), |a: &Bound| Ok(format::repr(&a.value("obj")).into())),
        native(
            "int",
            Signature::new()
                .with_default("obj", 0)
                .with_default("base", Value::None),
            int,
        ),
        native("float", Signature::new().with_default("obj", 0.0), float),
        native("bool", Signature::new().with_default("obj", false), |a: &Bound| {
            Ok(compare::is_truthy(&a.value("obj")).into())
        }),
        native(
            "list",
            Signature::new().with_default("iterable", Value::None),
            |a: &Bound| Ok(Value::list(items_or_empty(&a.value("iterable"))?)),
        ),
        native(
            "set",
            Signature::new().with_default("iterable", Value::None),
            |a: &Bound| Value::set(items_or_empty(&a.value("iterable"))?),
        ),
        native(
            "enumerate",
            iterable().with_default("start", 0),
            enumerate,
        ),
        native(
            "sorted",
            iterable().with_default("reverse", false),
            sorted,
        ),
        native("reversed", Signature::new().with_parameter("sequence"), |a: &Bound| {
            let mut items = a.value("sequence").iterate()?;
            items.reverse();
            Ok(Value::list(items))
        }),
        native("abs", Signature::new().with_parameter("number"), abs),
        native("min", Signature::new().with_rest("args"), |a: &Bound| {
            extreme("min", a, Ordering::Less)
        }),
        native("max", Signature::new().with_rest("args"), |a: &Bound| {
            extreme("max", a, Ordering::Greater)
        }),
        native("any", iterable(), |a: &Bound| {
            Ok(a.value("iterable").iterate()?.iter().any(compare::is_truthy).into())
        }),
        native("all", iterable(), |a: &Bound| {
            Ok(a.value("iterable").iterate()?.iter().all(compare::is_truthy).into())
        }),
        native("isundefined", object(), |a: &Bound| {
            Ok(a.value("obj").is_undefined().into())
        }),
        native("isdefined", object(), |a: &Bound| {
            Ok((!a.value("obj").is_undefined()).into())
        }),
        native("isnone", object(), |a: &Bound| {
            Ok(matches!(a.value("obj"), Value::None).into())
        }),
        native("istemplate", object(), |a: &Bound| {
            Ok(matches!(a.value("obj"), Value::Template(_)).into())
        }),
        native("type", object(), |a: &Bound| {
            Ok(a.value("obj").type_name().into())
        }),
        native(
            "date",
            Signature::new()
                .with_parameter("year")
                .with_parameter("month")
                .with_parameter("day"),
            date,
        ),
        native(
            "datetime",
            Signature::new()
                .with_parameter("year")
                .with_parameter("month")
                .with_parameter("day")
                .with_default("hour", 0)
                .with_default("minute", 0)
                .with_default("second", 0)
                .with_default("microsecond", 0),
            datetime,
        ),
        native(
            "rgb",
            Signature::new()
                .with_parameter("r")
                .with_parameter("g")
                .with_parameter("b")
                .with_default("a", 1.0),
            rgb,
        ),
        native(
            "timedelta",
            Signature::new()
                .with_default("days", 0)
                .with_default("seconds", 0)
                .with_default("microseconds", 0),
            timedelta,
        ),
        native(
            "monthdelta",
            Signature::new().with_default("months", 0),
            |a: &Bound| Ok(Value::MonthDelta(expect_int("monthdelta", &a.value("months"))?)),
        ),
    ];

    natives
        .into_iter()
        .map(|native| (native.name().to_string(), Value::Function(Arc::new(native))))
        .collect()
}

fn native<F>(name: &str, signature: Signature, function: F) -> Native
where
    F: Fn(&Bound) -> Result<Value, Error> + Send + Sync + 'static,
{
    Native::new(name, signature, function)
}

fn range(arguments: &Bound) -> Result<Value, Error> {
    let args = arguments.value("args").iterate()?;
    let ints = args
        .iter()
        .map(|arg| expect_int("range", arg))
        .collect::<Result<Vec<_>, _>>()?;
    let (start, stop, step) = match ints.as_slice() {
        [stop] => (0, *stop, 1),
        [start, stop] => (*start, *stop, 1),
        [start, stop, step] => (*start, *stop, *step),
        _ => {
            return Err(error_type(format!(
                "`range()` expects 1 to 3 arguments, got {}",
                ints.len()
            )))
        }
    };
    if step == 0 {
        return Err(error_value("`range()` step must not be zero"));
    }

    let (start, stop, step) = (i128::from(start), i128::from(stop), i128::from(step));
    let span = if step > 0 { stop - start } else { start - stop };
    let count = if span > 0 { (span - 1) / step.abs() + 1 } else { 0 };
    if count > LENGTH_LIMIT as i128 {
        return Err(error_too_large("range"));
    }

    let items = (0..count).filter_map(|i| i64::try_from(start + i * step).ok());

    Ok(Value::list(items.map(Value::Int)))
}

fn len(arguments: &Bound) -> Result<Value, Error> {
    Ok(Value::from(arguments.value("sequence").len()?))
}

fn string(arguments: &Bound) -> Result<Value, Error> {
    match arguments.value("obj") {
        Value::Undefined(name) => Err(error_undefined(&name)),
        value => Ok(format::display(&value).into()),
    }
}

fn int(arguments: &Bound) -> Result<Value, Error> {
    let base = match arguments.value("base") {
        Value::None => None,
        base => Some(expect_int("int", &base)?),
    };

    match (arguments.value("obj"), base) {
        (Value::Str(text), base) => {
            let base = base.unwrap_or(10);
            let radix = u32::try_from(base)
                .ok()
                .filter(|radix| (2..=36).contains(radix))
                .ok_or_else(|| error_value(format!("invalid base {base} for `int()`")))?;
            let digits = text.trim().replace('_', "");
            i64::from_str_radix(&digits, radix)
                .map(Value::Int)
                .map_err(|_| error_value(format!("invalid literal for `int()`: {}", format::quote(&text))))
        }
        (_, Some(_)) => Err(error_type("`int()` accepts a base only for strings")),
        (Value::Float(float), None) => {
            if float.is_finite() && float.abs() < 9.2e18 {
                Ok(Value::Int(float.trunc() as i64))
            } else {
                Err(error_value(format!("cannot convert {} to an integer", format::float_text(float))))
            }
        }
        (Value::Undefined(name), None) => Err(error_undefined(&name)),
        (value, None) => value
            .as_int()
            .map(Value::Int)
            .ok_or_else(|| error_type(format!("`int()` does not accept `{}`", value.type_name()))),
    }
}

fn float(arguments: &Bound) -> Result<Value, Error> {
    match arguments.value("obj") {
        Value::Str(text) => text
            .trim()
            .parse::<f64>()
            .map(Value::Float)
            .map_err(|_| error_value(format!("invalid literal for `float()`: {}", format::quote(&text)))),
        Value::Undefined(name) => Err(error_undefined(&name)),
        value => value
            .as_float()
            .map(Value::Float)
            .ok_or_else(|| error_type(format!("`float()` does not accept `{}`", value.type_name()))),
    }
}

fn enumerate(arguments: &Bound) -> Result<Value, Error> {
    let start = expect_int("enumerate", &arguments.value("start"))?;
    let items = arguments.value("iterable").iterate()?;

    Ok(Value::list(items.into_iter().enumerate().map(|(i, item)| {
        Value::list(vec![Value::Int(start.saturating_add(i as i64)), item])
    })))
}

fn sorted(arguments: &Bound) -> Result<Value, Error> {
    let mut items = arguments.value("iterable").iterate()?;
    sort(&mut items)?;
    if compare::is_truthy(&arguments.value("reverse")) {
        items.reverse();
    }

    Ok(Value::list(items))
}

/// Sort the values, failing if any two of them cannot be ordered.
pub(crate) fn sort(items: &mut [Value]) -> Result<(), Error> {
    let mut failure = None;
    items.sort_by(|left, right| {
        compare::compare(left, right).unwrap_or_else(|error| {
            failure.get_or_insert(error);
            Ordering::Equal
        })
    });

    match failure {
        Some(error) => Err(error),
        None => Ok(()),
    }
}

fn abs(arguments: &Bound) -> Result<Value, Error> {
    match arguments.value("number") {
        Value::Bool(bool) => Ok(Value::Int(bool as i64)),
        Value::Int(int) => int
            .checked_abs()
            .map(Value::Int)
            .ok_or_else(|| error_value("integer overflow in `abs()`")),
        Value::Float(float) => Ok(Value::Float(float.abs())),
        Value::TimeDelta(delta) => Ok(Value::TimeDelta(delta.abs())),
        Value::MonthDelta(months) => months
            .checked_abs()
            .map(Value::MonthDelta)
            .ok_or_else(|| error_value("integer overflow in `abs()`")),
        Value::Undefined(name) => Err(error_undefined(&name)),
        other => Err(error_type(format!("`abs()` does not accept `{}`", other.type_name()))),
    }
}

/// Return the smallest or largest argument, or item of a single iterable
/// argument.
fn extreme(name: &str, arguments: &Bound, wanted: Ordering) -> Result<Value, Error> {
    let mut args = arguments.value("args").iterate()?;
    if args.len() == 1 {
        args = args.remove(0).iterate()?;
    }

    let mut items = args.into_iter();
    let mut best = items
        .next()
        .ok_or_else(|| error_value(format!("`{name}()` needs at least one item")))?;
    for item in items {
        if compare::compare(&item, &best)? == wanted {
            best = item;
        }
    }

    Ok(best)
}

fn date(arguments: &Bound) -> Result<Value, Error> {
    let [year, month, day] = ints("date", arguments, ["year", "month", "day"])?;

    make_date(year, month, day).map(Value::Date)
}

fn datetime(arguments: &Bound) -> Result<Value, Error> {
    let [year, month, day, hour, minute, second, microsecond] = ints(
        "datetime",
        arguments,
        ["year", "month", "day", "hour", "minute", "second", "microsecond"],
    )?;

    make_datetime([year, month, day, hour, minute, second, microsecond]).map(Value::DateTime)
}

/// Build a date, failing with a value error on impossible dates.
pub(crate) fn make_date(year: i64, month: i64, day: i64) -> Result<NaiveDate, Error> {
    let date = i32::try_from(year).ok().and_then(|year| {
        NaiveDate::from_ymd_opt(year, u32::try_from(month).ok()?, u32::try_from(day).ok()?)
    });

    date.ok_or_else(|| error_value(format!("{year}-{month}-{day} is not a valid date")))
}

/// Build a datetime from year, month, day, hour, minute, second and
/// microsecond.
pub(crate) fn make_datetime(parts: [i64; 7]) -> Result<NaiveDateTime, Error> {
    let [year, month, day, hour, minute, second, microsecond] = parts;
    let time = |value: i64| u32::try_from(value).ok();
    let datetime = make_date(year, month, day)?.and_hms_micro_opt(
        time(hour).unwrap_or(u32::MAX),
        time(minute).unwrap_or(u32::MAX),
        time(second).unwrap_or(u32::MAX),
        time(microsecond).unwrap_or(u32::MAX),
    );

    datetime.ok_or_else(|| {
        error_value(format!(
            "{hour}:{minute}:{second}.{microsecond} is not a valid time"
        ))
    })
}

fn rgb(arguments: &Bound) -> Result<Value, Error> {
    let mut channels = [0u8; 4];
    for (channel, name) in channels.iter_mut().zip(["r", "g", "b", "a"]) {
        let value = arguments.value(name);
        let value = value
            .as_float()
            .ok_or_else(|| error_type(format!("`rgb()` expects numbers, got `{}`", value.type_name())))?;
        *channel = (value.clamp(0.0, 1.0) * 255.0).round() as u8;
    }
    let [r, g, b, a] = channels;

    Ok(Value::Color(Color::new(r, g, b, a)))
}

fn timedelta(arguments: &Bound) -> Result<Value, Error> {
    let [days, seconds, microseconds] =
        ints("timedelta", arguments, ["days", "seconds", "microseconds"])?;

    make_timedelta(days, seconds, microseconds).map(Value::TimeDelta)
}

/// Build a timedelta, failing with a value error when it is out of range.
pub(crate) fn make_timedelta(days: i64, seconds: i64, microseconds: i64) -> Result<TimeDelta, Error> {
    let delta = TimeDelta::try_days(days)
        .zip(TimeDelta::try_seconds(seconds))
        .and_then(|(days, seconds)| days.checked_add(&seconds))
        .and_then(|delta| delta.checked_add(&TimeDelta::microseconds(microseconds)));

    delta.ok_or_else(|| error_value("timedelta out of range"))
}

/// Return true if values of this kind have a builtin method with the given
/// name.
pub fn has_method(receiver: &Value, name: &str) -> bool {
    let names: &[&str] = match receiver {
        Value::Str(_) => &[
            "upper", "lower", "strip", "lstrip", "rstrip", "split", "join", "replace",
            "startswith", "endswith", "find",
        ],
        Value::List(_) => &["append", "insert", "pop"],
        Value::Dict(_) => &["get", "items", "keys", "values", "update"],
        Value::Set(_) => &["add"],
        Value::Color(_) => &["r", "g", "b", "a"],
        Value::Date(_) => &["year", "month", "day", "isoformat"],
        Value::DateTime(_) => &[
            "year", "month", "day", "hour", "minute", "second", "microsecond", "isoformat",
        ],
        Value::Template(_) => &["render", "renders"],
        _ => &[],
    };

    names.contains(&name)
}

/// Call a builtin method of a value that is not a template.
///
/// # Errors
///
/// Returns an [`Error`] if the method does not exist, the arguments do not
/// match, or the method fails.
pub fn call_method(receiver: &Value, name: &str, arguments: Arguments) -> Result<Value, Error> {
    let (signature, method) = method(receiver, name).ok_or_else(|| {
        error_type(format!(
            "`{}` object has no method `{name}`",
            receiver.type_name()
        ))
    })?;
    let bound = signature.bind(name, arguments)?;

    method(receiver, &bound)
}

type Method = fn(&Value, &Bound) -> Result<Value, Error>;

fn method(receiver: &Value, name: &str) -> Option<(Signature, Method)> {
    let none = Signature::new;
    let chars = || Signature::new().with_default("chars", Value::None);
    let method: (Signature, Method) = match (receiver, name) {
        (Value::Str(_), "upper") => (none(), |r, _| Ok(text(r).to_uppercase().into())),
        (Value::Str(_), "lower") => (none(), |r, _| Ok(text(r).to_lowercase().into())),
        (Value::Str(_), "strip") => (chars(), |r, a| strip(r, a, true, true)),
        (Value::Str(_), "lstrip") => (chars(), |r, a| strip(r, a, true, false)),
        (Value::Str(_), "rstrip") => (chars(), |r, a| strip(r, a, false, true)),
        (Value::Str(_), "split") => (
            Signature::new()
                .with_default("sep", Value::None)
                .with_default("count", Value::None),
            split,
        ),
        (Value::Str(_), "join") => (Signature::new().with_parameter("iterable"), join),
        (Value::Str(_), "replace") => (
            Signature::new()
                .with_parameter("old")
                .with_parameter("new")
                .with_default("count", Value::None),
            replace,
        ),
        (Value::Str(_), "startswith") => (Signature::new().with_parameter("prefix"), |r, a| {
            Ok(text(r).starts_with(expect_str("startswith", &a.value("prefix"))?).into())
        }),
        (Value::Str(_), "endswith") => (Signature::new().with_parameter("suffix"), |r, a| {
            Ok(text(r).ends_with(expect_str("endswith", &a.value("suffix"))?).into())
        }),
        (Value::Str(_), "find") => (Signature::new().with_parameter("sub"), find),
        (Value::List(_), "append") => (Signature::new().with_rest("items"), |r, a| {
            if let Value::List(list) = r {
                let items = a.value("items").iterate()?;
                list.lock().extend(items);
            }
            Ok(Value::None)
        }),
        (Value::List(_), "insert") => (
            Signature::new().with_parameter("pos").with_rest("items"),
            insert,
        ),
        (Value::List(_), "pop") => (Signature::new().with_default("pos", -1), pop),
        (Value::Dict(_), "get") => (
            Signature::new()
                .with_parameter("key")
                .with_default("default", Value::None),
            |r, a| {
                let Value::Dict(dict) = r else {
                    return Ok(Value::None);
                };
                let key = a.value("key");
                let found = key
                    .is_hashable()
                    .then(|| dict.lock().get(&key).cloned())
                    .flatten();
                Ok(found.unwrap_or_else(|| a.value("default")))
            },
        ),
        (Value::Dict(_), "items") => (none(), |r, _| {
            let pairs = dict_pairs(r);
            Ok(Value::list(pairs.into_iter().map(|(k, v)| Value::list(vec![k, v]))))
        }),
        (Value::Dict(_), "keys") => (none(), |r, _| {
            Ok(Value::list(dict_pairs(r).into_iter().map(|(k, _)| k)))
        }),
        (Value::Dict(_), "values") => (none(), |r, _| {
            Ok(Value::list(dict_pairs(r).into_iter().map(|(_, v)| v)))
        }),
        (Value::Dict(_), "update") => (
            Signature::new().with_rest("others").with_kwrest("kwargs"),
            update,
        ),
        (Value::Set(_), "add") => (Signature::new().with_rest("items"), |r, a| {
            if let Value::Set(set) = r {
                for item in a.value("items").iterate()? {
                    let item = item.into_key()?;
                    set.lock().insert(item);
                }
            }
            Ok(Value::None)
        }),
        (Value::Color(_), "r" | "g" | "b" | "a") => (none(), channel_method(name)?),
        (Value::Date(_) | Value::DateTime(_), "isoformat") => (none(), |r, _| {
            let text = match r {
                Value::Date(date) => format::date_text(date),
                Value::DateTime(datetime) => format::datetime_text(datetime, 'T'),
                _ => String::new(),
            };
            Ok(text.into())
        }),
        (Value::Date(_) | Value::DateTime(_), _) => (none(), date_method(receiver, name)?),
        _ => return None,
    };

    Some(method)
}

fn channel_method(name: &str) -> Option<Method> {
    let method: Method = match name {
        "r" => |r, _| Ok(Value::Int(i64::from(color(r).map_or(0, |c| c.r)))),
        "g" => |r, _| Ok(Value::Int(i64::from(color(r).map_or(0, |c| c.g)))),
        "b" => |r, _| Ok(Value::Int(i64::from(color(r).map_or(0, |c| c.b)))),
        "a" => |r, _| Ok(Value::Int(i64::from(color(r).map_or(0, |c| c.a)))),
        _ => return None,
    };

    Some(method)
}

fn date_method(receiver: &Value, name: &str) -> Option<Method> {
    let is_datetime = matches!(receiver, Value::DateTime(_));
    let method: Method = match name {
        "year" => |r, _| Ok(datetime_of(r).year().into()),
        "month" => |r, _| Ok(i64::from(datetime_of(r).month()).into()),
        "day" => |r, _| Ok(i64::from(datetime_of(r).day()).into()),
        "hour" if is_datetime => |r, _| Ok(i64::from(datetime_of(r).hour()).into()),
        "minute" if is_datetime => |r, _| Ok(i64::from(datetime_of(r).minute()).into()),
        "second" if is_datetime => |r, _| Ok(i64::from(datetime_of(r).second()).into()),
        "microsecond" if is_datetime => {
            |r, _| Ok(i64::from(datetime_of(r).nanosecond() / 1000).into())
        }
        _ => return None,
    };

    Some(method)
}

fn strip(receiver: &Value, arguments: &Bound, left: bool, right: bool) -> Result<Value, Error> {
    let text = text(receiver);
    let chars = match arguments.value("chars") {
        Value::None => None,
        chars => Some(expect_str("strip", &chars)?.to_string()),
    };
    let strip = |c: char| match &chars {
        Some(chars) => chars.contains(c),
        None => c.is_whitespace(),
    };
    let mut result = text;
    if left {
        result = result.trim_start_matches(strip);
    }
    if right {
        result = result.trim_end_matches(strip);
    }

    Ok(result.into())
}

fn split(receiver: &Value, arguments: &Bound) -> Result<Value, Error> {
    let text = text(receiver);
    let count = match arguments.value("count") {
        Value::None => None,
        count => Some(expect_int("split", &count)?.max(0) as usize),
    };
    let parts: Vec<Value> = match (arguments.value("sep"), count) {
        (Value::None, None) => text.split_whitespace().map(Value::from).collect(),
        (Value::None, Some(count)) => {
            let mut parts = vec![];
            let mut rest = text.trim_start();
            while !rest.is_empty() && parts.len() < count {
                let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
                parts.push(Value::from(&rest[..end]));
                rest = rest[end..].trim_start();
            }
            if !rest.is_empty() {
                parts.push(Value::from(rest));
            }
            parts
        }
        (sep, count) => {
            let sep = expect_str("split", &sep)?;
            if sep.is_empty() {
                return Err(error_value("empty separator for `split()`"));
            }
            match count {
                Some(count) => text.splitn(count + 1, sep).map(Value::from).collect(),
                None => text.split(sep).map(Value::from).collect(),
            }
        }
    };

    Ok(Value::list(parts))
}

fn join(receiver: &Value, arguments: &Bound) -> Result<Value, Error> {
    let items = arguments.value("iterable").iterate()?;
    let parts = items
        .iter()
        .map(|item| expect_str("join", item).map(str::to_string))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(parts.join(text(receiver)).into())
}

fn replace(receiver: &Value, arguments: &Bound) -> Result<Value, Error> {
    let old = arguments.value("old");
    let new = arguments.value("new");
    let (old, new) = (expect_str("replace", &old)?, expect_str("replace", &new)?);
    let result = match arguments.value("count") {
        Value::None => text(receiver).replace(old, new),
        count => {
            let count = expect_int("replace", &count)?.max(0) as usize;
            text(receiver).replacen(old, new, count)
        }
    };

    Ok(result.into())
}

fn find(receiver: &Value, arguments: &Bound) -> Result<Value, Error> {
    let sub = arguments.value("sub");
    let text = text(receiver);
    let position = text
        .find(expect_str("find", &sub)?)
        .map_or(-1, |byte| text[..byte].chars().count() as i64);

    Ok(Value::Int(position))
}

fn insert(receiver: &Value, arguments: &Bound) -> Result<Value, Error> {
    let Value::List(list) = receiver else {
        return Ok(Value::None);
    };
    let position = expect_int("insert", &arguments.value("pos"))?;
    let items = arguments.value("items").iterate()?;
    let mut list = list.lock();
    let length = list.len() as i64;
    let index = if position < 0 { position + length } else { position }.clamp(0, length) as usize;
    for (offset, item) in items.into_iter().enumerate() {
        list.insert(index + offset, item);
    }

    Ok(Value::None)
}

fn pop(receiver: &Value, arguments: &Bound) -> Result<Value, Error> {
    let Value::List(list) = receiver else {
        return Ok(Value::None);
    };
    let position = expect_int("pop", &arguments.value("pos"))?;
    let mut list = list.lock();
    let length = list.len() as i64;
    let index = if position < 0 { position + length } else { position };
    if index < 0 || index >= length {
        return Err(Error::build("index out of range")
            .with_kind(ErrorKind::IndexOutOfRange)
            .with_help(format!("cannot pop index {position} from a list of {length} items")));
    }

    Ok(list.remove(index as usize))
}

fn update(receiver: &Value, arguments: &Bound) -> Result<Value, Error> {
    let Value::Dict(dict) = receiver else {
        return Ok(Value::None);
    };
    let mut pairs = vec![];
    for other in arguments.value("others").iterate()? {
        match other {
            Value::Dict(other) => pairs.extend(other.snapshot()),
            other => {
                return Err(error_type(format!(
                    "`update()` expects dicts, got `{}`",
                    other.type_name()
                )))
            }
        }
    }
    if let Value::Dict(kwargs) = arguments.value("kwargs") {
        pairs.extend(kwargs.snapshot());
    }
    dict.lock().extend(pairs);

    Ok(Value::None)
}

fn items_or_empty(value: &Value) -> Result<Vec<Value>, Error> {
    match value {
        Value::None => Ok(vec![]),
        value => value.iterate(),
    }
}

fn dict_pairs(receiver: &Value) -> Vec<(Value, Value)> {
    match receiver {
        Value::Dict(dict) => dict.snapshot().into_iter().collect(),
        _ => vec![],
    }
}

fn ints<const N: usize>(callee: &str, arguments: &Bound, names: [&str; N]) -> Result<[i64; N], Error> {
    let mut values = [0; N];
    for (slot, name) in values.iter_mut().zip(names) {
        *slot = expect_int(callee, &arguments.value(name))?;
    }

    Ok(values)
}

fn text(receiver: &Value) -> &str {
    receiver.as_str().unwrap_or_default()
}

fn color(receiver: &Value) -> Option<Color> {
    match receiver {
        Value::Color(color) => Some(*color),
        _ => None,
    }
}

fn datetime_of(receiver: &Value) -> NaiveDateTime {
    match receiver {
        Value::DateTime(datetime) => *datetime,
        Value::Date(date) => date.and_time(NaiveTime::MIN),
        _ => NaiveDateTime::default(),
    }
}

fn expect_int(callee: &str, value: &Value) -> Result<i64, Error> {
    match value {
        Value::Undefined(name) => Err(error_undefined(name)),
        value => value.as_int().ok_or_else(|| {
            error_type(format!(
                "`{callee}()` expects an integer, got `{}`",
                value.type_name()
            ))
        }),
    }
}

fn expect_str<'a>(callee: &str, value: &'a Value) -> Result<&'a str, Error> {
    match value {
        Value::Undefined(name) => Err(error_undefined(name)),
        value => value.as_str().ok_or_else(|| {
            error_type(format!(
                "`{callee}()` expects a string, got `{}`",
                value.type_name()
            ))
        }),
    }
}

fn error_value<T>(reason: T) -> Error
where
    T: Into<String>,
{
    Error::build(reason).with_kind(ErrorKind::Value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(name: &str, arguments: Arguments) -> Result<Value, Error> {
        match function(name) {
            Some(Value::Function(native)) => native.call(arguments),
            _ => panic!("no builtin `{name}`"),
        }
    }

    fn ints(values: &[i64]) -> Value {
        Value::list(values.iter().copied().map(Value::Int))
    }

    #[test]
    fn test_range() {
        assert_eq!(call("range", Arguments::new().arg(3)).unwrap(), ints(&[0, 1, 2]));
        assert_eq!(
            call("range", Arguments::new().arg(5).arg(0).arg(-2)).unwrap(),
            ints(&[5, 3, 1])
        );
        assert!(call("range", Arguments::new().arg(1).arg(2).arg(0)).is_err());
        assert_eq!(call("range", Arguments::new().arg(3).arg(1)).unwrap(), ints(&[]));
        assert_eq!(
            call("range", Arguments::new().arg(Value::Int(i64::MAX - 1)).arg(Value::Int(i64::MAX)))
                .unwrap(),
            ints(&[i64::MAX - 1])
        );

        let error = call("range", Arguments::new().arg(Value::Int(i64::MAX))).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Value);
    }

    #[test]
    fn test_color_channels() {
        let source = "<?code c = #1234?><?print c.r()?> <?print c.g()?> <?print c.b()?> <?print c.a()?>";
        let template = crate::compile(source).unwrap();

        assert_eq!(template.renders(Arguments::new()).unwrap(), "17 34 51 68");
    }

    #[test]
    fn test_conversions() {
        assert_eq!(call("int", Arguments::new().arg("ff").arg(16)).unwrap(), Value::Int(255));
        assert_eq!(call("int", Arguments::new().arg(-2.7)).unwrap(), Value::Int(-2));
        assert_eq!(call("float", Arguments::new().arg("1.5")).unwrap(), Value::Float(1.5));
        assert_eq!(call("str", Arguments::new().arg(Value::None)).unwrap(), Value::from(""));
        assert_eq!(call("repr", Arguments::new().arg("a")).unwrap(), Value::from("'a'"));
        assert_eq!(
            call("str", Arguments::new().arg(Value::undefined("x")))
                .unwrap_err()
                .kind(),
            ErrorKind::Undefined
        );
    }

    #[test]
    fn test_sorted_and_extremes() {
        let values = ints(&[3, 1, 2]);

        assert_eq!(call("sorted", Arguments::new().arg(values.clone())).unwrap(), ints(&[1, 2, 3]));
        assert_eq!(call("max", Arguments::new().arg(values.clone())).unwrap(), Value::Int(3));
        assert_eq!(call("min", Arguments::new().arg(4).arg(2)).unwrap(), Value::Int(2));

        let mixed = Value::list(vec![Value::Int(1), Value::from("a")]);
        let error = call("sorted", Arguments::new().arg(mixed)).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Unorderable);
    }

    #[test]
    fn test_dates_and_colors() {
        assert!(call("date", Arguments::new().arg(2000).arg(2).arg(30)).is_err());
        assert_eq!(
            call("rgb", Arguments::new().arg(1.0).arg(0.0).arg(0.0)).unwrap(),
            Value::Color(Color::new(255, 0, 0, 255))
        );
        assert_eq!(
            call("timedelta", Arguments::new().arg(1).arg(30)).unwrap(),
            Value::TimeDelta(TimeDelta::seconds(86_430))
        );
        assert_eq!(
            call("monthdelta", Arguments::new().arg(-2)).unwrap(),
            Value::MonthDelta(-2)
        );
        assert_eq!(
            call("abs", Arguments::new().arg(Value::MonthDelta(-2))).unwrap(),
            Value::MonthDelta(2)
        );
    }

    #[test]
    fn test_string_methods() {
        let text = Value::from("  a,b,,c ");

        assert_eq!(call_method(&text, "strip", Arguments::new()).unwrap(), Value::from("a,b,,c"));
        assert_eq!(
            call_method(&Value::from("a,b,,c"), "split", Arguments::new().arg(",")).unwrap(),
            Value::list(vec!["a".into(), "b".into(), "".into(), "c".into()])
        );
        assert_eq!(
            call_method(&Value::from("-"), "join", Arguments::new().arg("abc")).unwrap(),
            Value::from("a-b-c")
        );
        assert_eq!(
            call_method(&Value::from("äbc"), "find", Arguments::new().arg("c")).unwrap(),
            Value::Int(2)
        );
        assert!(call_method(&text, "nope", Arguments::new()).is_err());
    }

    #[test]
    fn test_container_methods() {
        let list = ints(&[1]);
        call_method(&list, "append", Arguments::new().arg(2).arg(3)).unwrap();
        call_method(&list, "insert", Arguments::new().arg(0).arg(0)).unwrap();
        assert_eq!(list, ints(&[0, 1, 2, 3]));
        assert_eq!(call_method(&list, "pop", Arguments::new()).unwrap(), Value::Int(3));

        let dict = Value::dict(vec![]).unwrap();
        call_method(&dict, "update", Arguments::new().kwarg("a", 1)).unwrap();
        assert_eq!(
            call_method(&dict, "get", Arguments::new().arg("a")).unwrap(),
            Value::Int(1)
        );
        assert_eq!(
            call_method(&dict, "get", Arguments::new().arg("b").arg(2)).unwrap(),
            Value::Int(2)
        );
        assert!(has_method(&dict, "items"));
        assert!(!has_method(&Value::Int(1), "items"));
    }
}
