//! Text conversion of values, as done by `<?print?>` and `repr()`.
use crate::value::Value;
use chrono::{NaiveDate, NaiveDateTime, TimeDelta, Timelike};
use std::fmt::Write;

/// Return the printed form of a value.
///
/// `None` and undefined values print as nothing; strings print as they are.
/// Everything else prints like [`repr`].
pub fn display(value: &Value) -> String {
    match value {
        Value::Undefined(_) | Value::None => String::new(),
        Value::Str(string) => string.to_string(),
        Value::Date(date) => date_text(date),
        Value::DateTime(datetime) => datetime_text(datetime, ' '),
        Value::TimeDelta(delta) => delta_text(delta),
        Value::MonthDelta(months) => {
            let plural = if matches!(months, 1 | -1) { "" } else { "s" };
            format!("{months} month{plural}")
        }
        Value::Color(color) => color.to_string(),
        other => repr(other),
    }
}

/// Return the literal form of a value, as it would be written in a template.
///
/// Containers that contain themselves are cut short with `...`.
pub fn repr(value: &Value) -> String {
    let mut buffer = String::new();
    write_repr(&mut buffer, value, &mut vec![]);

    buffer
}

fn write_repr(buffer: &mut String, value: &Value, seen: &mut Vec<usize>) {
    let address = value.address();
    let container = matches!(value, Value::List(_) | Value::Set(_) | Value::Dict(_));
    if container && address.is_some_and(|a| seen.contains(&a)) {
        buffer.push_str(match value {
            Value::List(_) => "[...]",
            _ => "{...}",
        });
        return;
    }

    match value {
        Value::Undefined(_) => buffer.push_str("undefined"),
        Value::None => buffer.push_str("None"),
        Value::Bool(true) => buffer.push_str("True"),
        Value::Bool(false) => buffer.push_str("False"),
        Value::Int(int) => {
            let _ = write!(buffer, "{int}");
        }
        Value::Float(float) => buffer.push_str(&float_text(*float)),
        Value::Str(string) => buffer.push_str(&quote(string)),
        Value::Date(date) => {
            let _ = write!(buffer, "@({})", date_text(date));
        }
        Value::DateTime(datetime) => {
            let _ = write!(buffer, "@({})", datetime_text(datetime, 'T'));
        }
        Value::TimeDelta(delta) => {
            let (days, seconds, microseconds) = delta_parts(delta);
            let _ = write!(buffer, "timedelta({days}, {seconds}, {microseconds})");
        }
        Value::MonthDelta(months) => {
            let _ = write!(buffer, "monthdelta({months})");
        }
        Value::Slice(start, stop) => {
            let bound = |bound: &Option<i64>| bound.map_or("None".to_string(), |b| b.to_string());
            let _ = write!(buffer, "slice({}, {})", bound(start), bound(stop));
        }
        Value::Color(color) => {
            let _ = write!(
                buffer,
                "#{:02x}{:02x}{:02x}{:02x}",
                color.r, color.g, color.b, color.a
            );
        }
        Value::List(list) => {
            let items = list.snapshot();
            seen.extend(address);
            buffer.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    buffer.push_str(", ");
                }
                write_repr(buffer, item, seen);
            }
            buffer.push(']');
            seen.pop();
        }
        Value::Set(set) => {
            let items: Vec<_> = set.lock().iter().cloned().collect();
            if items.is_empty() {
                buffer.push_str("{/}");
                return;
            }
            seen.extend(address);
            buffer.push('{');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    buffer.push_str(", ");
                }
                write_repr(buffer, item, seen);
            }
            buffer.push('}');
            seen.pop();
        }
        Value::Dict(dict) => {
            let pairs: Vec<_> = dict
                .lock()
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            seen.extend(address);
            buffer.push('{');
            for (i, (key, value)) in pairs.iter().enumerate() {
                if i > 0 {
                    buffer.push_str(", ");
                }
                write_repr(buffer, key, seen);
                buffer.push_str(": ");
                write_repr(buffer, value, seen);
            }
            buffer.push('}');
            seen.pop();
        }
        Value::Template(closure) => match closure.template().name() {
            Some(name) => {
                let _ = write!(buffer, "<template {name}>");
            }
            None => buffer.push_str("<template>"),
        },
        Value::Function(function) => {
            let _ = write!(buffer, "<function {}>", function.name());
        }
        Value::Method(method) => {
            let _ = write!(
                buffer,
                "<method {}.{}>",
                method.receiver.type_name(),
                method.name
            );
        }
        Value::Object(object) => {
            let _ = write!(buffer, "<{}>", object.type_name());
        }
    }
}

/// Return the shortest text that reads back as the same float.
///
/// Integral floats keep a trailing `.0` so they stay floats.
pub fn float_text(float: f64) -> String {
    if float.is_nan() {
        "nan".to_string()
    } else if float.is_infinite() {
        let text = if float > 0.0 { "inf" } else { "-inf" };
        text.to_string()
    } else {
        format!("{float:?}")
    }
}

/// Quote a string, escaping it so it reads back as the same string.
///
/// Single quotes are preferred unless the text contains a single quote and
/// no double quote.
pub fn quote(string: &str) -> String {
    let delimiter = if string.contains('\'') && !string.contains('"') {
        '"'
    } else {
        '\''
    };
    let mut buffer = String::with_capacity(string.len() + 2);
    buffer.push(delimiter);
    for c in string.chars() {
        match c {
            '\\' => buffer.push_str("\\\\"),
            '\n' => buffer.push_str("\\n"),
            '\r' => buffer.push_str("\\r"),
            '\t' => buffer.push_str("\\t"),
            c if c == delimiter => {
                buffer.push('\\');
                buffer.push(c);
            }
            c if (c as u32) < 0x20 || c as u32 == 0x7f => {
                let _ = write!(buffer, "\\x{:02x}", c as u32);
            }
            c => buffer.push(c),
        }
    }
    buffer.push(delimiter);

    buffer
}

/// Return a date as `YYYY-MM-DD`.
pub fn date_text(date: &NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Return a datetime as `YYYY-MM-DD<separator>hh:mm:ss`, followed by the
/// microseconds when there are any.
pub fn datetime_text(datetime: &NaiveDateTime, separator: char) -> String {
    let mut text = format!(
        "{}{separator}{}",
        date_text(&datetime.date()),
        datetime.format("%H:%M:%S")
    );
    let microseconds = datetime.nanosecond() / 1000;
    if microseconds != 0 {
        let _ = write!(text, ".{microseconds:06}");
    }

    text
}

/// Split a timedelta into days, seconds and microseconds, with seconds and
/// microseconds never negative.
pub fn delta_parts(delta: &TimeDelta) -> (i64, i64, i64) {
    let total = delta
        .num_microseconds()
        .unwrap_or_else(|| delta.num_seconds().saturating_mul(1_000_000));
    let day = 86_400_000_000;
    let days = total.div_euclid(day);
    let rest = total.rem_euclid(day);

    (days, rest / 1_000_000, rest % 1_000_000)
}

/// Return a timedelta in the `1 day, 2:03:04` form.
fn delta_text(delta: &TimeDelta) -> String {
    let (days, seconds, microseconds) = delta_parts(delta);
    let mut text = String::new();
    if days != 0 {
        let plural = if days.abs() == 1 { "" } else { "s" };
        let _ = write!(text, "{days} day{plural}, ");
    }
    let _ = write!(
        text,
        "{}:{:02}:{:02}",
        seconds / 3600,
        seconds % 3600 / 60,
        seconds % 60
    );
    if microseconds != 0 {
        let _ = write!(text, ".{microseconds:06}");
    }

    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Color;

    #[test]
    fn test_display_scalars() {
        assert_eq!(display(&Value::None), "");
        assert_eq!(display(&Value::undefined("x")), "");
        assert_eq!(display(&Value::Bool(true)), "True");
        assert_eq!(display(&Value::Bool(false)), "False");
        assert_eq!(display(&Value::Float(1.0)), "1.0");
        assert_eq!(display(&Value::Float(0.5)), "0.5");
        assert_eq!(display(&Value::from("it's")), "it's");
        assert_eq!(display(&Value::Color(Color::new(0, 0, 255, 255))), "#0000ff");
    }

    #[test]
    fn test_repr_containers() {
        let list = Value::list(vec![Value::Int(1), Value::from("a"), Value::None]);
        let empty = Value::set(vec![]).unwrap();
        let dict = Value::dict(vec![(Value::from("k"), Value::Bool(false))]).unwrap();

        assert_eq!(repr(&list), "[1, 'a', None]");
        assert_eq!(repr(&empty), "{/}");
        assert_eq!(repr(&dict), "{'k': False}");
    }

    #[test]
    fn test_repr_cycle() {
        let list = Value::list(vec![]);
        if let Value::List(inner) = &list {
            inner.lock().push(list.clone());
        }

        assert_eq!(repr(&list), "[[...]]");
    }

    #[test]
    fn test_quote() {
        assert_eq!(quote("a\nb"), "'a\\nb'");
        assert_eq!(quote("it's"), "\"it's\"");
        assert_eq!(quote("'\""), "'\\'\"'");
    }

    #[test]
    fn test_datetime_text() {
        let datetime = NaiveDate::from_ymd_opt(2000, 2, 29)
            .and_then(|d| d.and_hms_micro_opt(12, 34, 56, 123))
            .unwrap();

        assert_eq!(datetime_text(&datetime, 'T'), "2000-02-29T12:34:56.000123");
        assert_eq!(display(&Value::DateTime(datetime)), "2000-02-29 12:34:56.000123");
    }

    #[test]
    fn test_delta_parts_negative() {
        let delta = TimeDelta::seconds(-1);

        assert_eq!(delta_parts(&delta), (-1, 86399, 0));
        assert_eq!(display(&Value::TimeDelta(TimeDelta::days(2))), "2 days, 0:00:00");
    }

    #[test]
    fn test_monthdelta_and_slice_text() {
        assert_eq!(display(&Value::MonthDelta(1)), "1 month");
        assert_eq!(display(&Value::MonthDelta(-3)), "-3 months");
        assert_eq!(repr(&Value::MonthDelta(2)), "monthdelta(2)");
        assert_eq!(display(&Value::Slice(None, Some(2))), "slice(None, 2)");
    }
}
