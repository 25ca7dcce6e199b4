//! Arithmetic and bitwise operators.
use crate::{
    compile::Operator,
    log::{
        error_operand, error_operands, error_too_large, error_undefined, error_zero_division,
        Error, ErrorKind, LENGTH_LIMIT,
    },
    value::Value,
};
use chrono::{Months, NaiveDate, NaiveDateTime, TimeDelta};

/// Apply a binary operator to two values.
///
/// # Errors
///
/// Returns an [`Error`] if the operator does not support the operands,
/// on division by zero, and on integer overflow.
pub fn apply(operator: Operator, left: &Value, right: &Value) -> Result<Value, Error> {
    if let Some(name) = undefined(left).or_else(|| undefined(right)) {
        return Err(error_undefined(name));
    }

    let result = match operator {
        Operator::Add => add(left, right),
        Operator::Subtract => subtract(left, right),
        Operator::Multiply => multiply(left, right),
        Operator::TrueDivide => true_divide(left, right),
        Operator::FloorDivide => floor_divide(left, right),
        Operator::Modulo => modulo(left, right),
        Operator::ShiftLeft | Operator::ShiftRight => shift(operator, left, right),
        Operator::BitAnd | Operator::BitXor | Operator::BitOr => bitwise(operator, left, right),
        _ => None,
    };

    result.unwrap_or_else(|| {
        Err(error_operands(
            operator,
            left.type_name(),
            right.type_name(),
        ))
    })
}

/// Apply the operator of an augmented assignment.
///
/// `+=` on a list extends the list in place, every other operator behaves
/// like [`apply`].
///
/// # Errors
///
/// See [`apply`].
pub fn augment(operator: Operator, left: &Value, right: &Value) -> Result<Value, Error> {
    if let (Operator::Add, Value::List(list)) = (operator, left) {
        let items = right.iterate()?;
        list.lock().extend(items);

        return Ok(left.clone());
    }

    apply(operator, left, right)
}

/// Negate a number.
pub fn negate(operand: &Value) -> Result<Value, Error> {
    match operand {
        Value::Bool(_) | Value::Int(_) => {
            let int = operand.as_int().unwrap_or_default();
            int.checked_neg().map(Value::Int).ok_or_else(error_overflow)
        }
        Value::Float(float) => Ok(Value::Float(-float)),
        Value::TimeDelta(delta) => Ok(Value::TimeDelta(-*delta)),
        Value::MonthDelta(months) => months
            .checked_neg()
            .map(Value::MonthDelta)
            .ok_or_else(error_overflow),
        Value::Undefined(name) => Err(error_undefined(name)),
        other => Err(error_operand("-", other.type_name())),
    }
}

/// Invert the bits of an integer.
pub fn invert(operand: &Value) -> Result<Value, Error> {
    match operand.as_int() {
        Some(int) => Ok(Value::Int(!int)),
        None => match operand {
            Value::Undefined(name) => Err(error_undefined(name)),
            other => Err(error_operand("~", other.type_name())),
        },
    }
}

type Outcome = Option<Result<Value, Error>>;

fn add(left: &Value, right: &Value) -> Outcome {
    let value = match (left, right) {
        (Value::Str(left), Value::Str(right)) => Value::from(format!("{left}{right}")),
        (Value::List(left), Value::List(right)) => {
            let mut items = left.snapshot();
            items.extend(right.snapshot());
            Value::list(items)
        }
        (Value::DateTime(datetime), Value::TimeDelta(delta))
        | (Value::TimeDelta(delta), Value::DateTime(datetime)) => {
            return Some(shift_datetime(*datetime, *delta, true).map(Value::DateTime))
        }
        (Value::Date(date), Value::TimeDelta(delta))
        | (Value::TimeDelta(delta), Value::Date(date)) => {
            let datetime = date.and_time(Default::default());
            return Some(shift_datetime(datetime, *delta, true).map(|d| Value::Date(d.date())));
        }
        (Value::TimeDelta(left), Value::TimeDelta(right)) => {
            return Some(left.checked_add(right).map(Value::TimeDelta).ok_or_else(error_overflow))
        }
        (Value::Date(date), Value::MonthDelta(months))
        | (Value::MonthDelta(months), Value::Date(date)) => {
            return Some(shift_months(*date, *months).map(Value::Date))
        }
        (Value::DateTime(datetime), Value::MonthDelta(months))
        | (Value::MonthDelta(months), Value::DateTime(datetime)) => {
            let shifted = shift_months(datetime.date(), *months);
            return Some(shifted.map(|date| Value::DateTime(date.and_time(datetime.time()))));
        }
        (Value::MonthDelta(left), Value::MonthDelta(right)) => {
            return Some(left.checked_add(*right).map(Value::MonthDelta).ok_or_else(error_overflow))
        }
        _ => return numeric(left, right, i64::checked_add, |l, r| l + r),
    };

    Some(Ok(value))
}

fn subtract(left: &Value, right: &Value) -> Outcome {
    match (left, right) {
        (Value::DateTime(datetime), Value::TimeDelta(delta)) => {
            Some(shift_datetime(*datetime, *delta, false).map(Value::DateTime))
        }
        (Value::Date(date), Value::TimeDelta(delta)) => {
            let datetime = date.and_time(Default::default());
            Some(shift_datetime(datetime, *delta, false).map(|d| Value::Date(d.date())))
        }
        (Value::DateTime(left), Value::DateTime(right)) => {
            Some(Ok(Value::TimeDelta(left.signed_duration_since(*right))))
        }
        (Value::Date(left), Value::Date(right)) => {
            Some(Ok(Value::TimeDelta(left.signed_duration_since(*right))))
        }
        (Value::TimeDelta(left), Value::TimeDelta(right)) => Some(
            left.checked_sub(right)
                .map(Value::TimeDelta)
                .ok_or_else(error_overflow),
        ),
        (Value::Date(_) | Value::DateTime(_), Value::MonthDelta(months)) => {
            let negated = months
                .checked_neg()
                .map(Value::MonthDelta)
                .ok_or_else(error_overflow);
            Some(negated.and_then(|negated| apply(Operator::Add, left, &negated)))
        }
        (Value::MonthDelta(left), Value::MonthDelta(right)) => Some(
            left.checked_sub(*right)
                .map(Value::MonthDelta)
                .ok_or_else(error_overflow),
        ),
        _ => numeric(left, right, i64::checked_sub, |l, r| l - r),
    }
}

fn multiply(left: &Value, right: &Value) -> Outcome {
    match (left, right) {
        (Value::Str(string), count) | (count, Value::Str(string))
            if matches!(count, Value::Int(_) | Value::Bool(_)) =>
        {
            let count = repeat_count(count, string.len());
            Some(count.map(|count| Value::from(string.repeat(count))))
        }
        (Value::List(list), count) | (count, Value::List(list))
            if matches!(count, Value::Int(_) | Value::Bool(_)) =>
        {
            let items = list.snapshot();
            Some(repeat_count(count, items.len()).map(|count| {
                let total = items.len() * count;
                Value::list(items.iter().cycle().take(total).cloned().collect())
            }))
        }
        (Value::TimeDelta(delta), Value::Int(count))
        | (Value::Int(count), Value::TimeDelta(delta)) => {
            let factor = i32::try_from(*count).ok();
            Some(
                factor
                    .and_then(|factor| delta.checked_mul(factor))
                    .map(Value::TimeDelta)
                    .ok_or_else(error_overflow),
            )
        }
        (Value::MonthDelta(months), count) | (count, Value::MonthDelta(months))
            if matches!(count, Value::Int(_) | Value::Bool(_)) =>
        {
            let count = count.as_int().unwrap_or_default();
            Some(months.checked_mul(count).map(Value::MonthDelta).ok_or_else(error_overflow))
        }
        _ => numeric(left, right, i64::checked_mul, |l, r| l * r),
    }
}

/// Return how often a sequence of the given length may be repeated.
///
/// Negative counts repeat zero times.
fn repeat_count(count: &Value, length: usize) -> Result<usize, Error> {
    let count = usize::try_from(count.as_int().unwrap_or_default().max(0))
        .map_err(|_| error_too_large("repeated sequence"))?;
    match length.checked_mul(count) {
        Some(total) if total <= LENGTH_LIMIT => Ok(count),
        _ => Err(error_too_large("repeated sequence")),
    }
}

fn true_divide(left: &Value, right: &Value) -> Outcome {
    let (left, right) = (left.as_float()?, right.as_float()?);
    if right == 0.0 {
        return Some(Err(error_zero_division()));
    }

    Some(Ok(Value::Float(left / right)))
}

fn floor_divide(left: &Value, right: &Value) -> Outcome {
    if let (Some(l), Some(r)) = (left.as_int(), right.as_int()) {
        if r == 0 {
            return Some(Err(error_zero_division()));
        }
        let quotient = l.checked_div(r).ok_or_else(error_overflow);
        return Some(quotient.map(|q| {
            let floor = if (l % r != 0) && ((l < 0) != (r < 0)) { q - 1 } else { q };
            Value::Int(floor)
        }));
    }

    let (l, r) = (left.as_float()?, right.as_float()?);
    if r == 0.0 {
        return Some(Err(error_zero_division()));
    }

    Some(Ok(Value::Float((l / r).floor())))
}

fn modulo(left: &Value, right: &Value) -> Outcome {
    if let (Some(l), Some(r)) = (left.as_int(), right.as_int()) {
        if r == 0 {
            return Some(Err(error_zero_division()));
        }
        let remainder = l.checked_rem(r).ok_or_else(error_overflow);
        return Some(remainder.map(|m| {
            let m = if m != 0 && ((m < 0) != (r < 0)) { m + r } else { m };
            Value::Int(m)
        }));
    }

    let (l, r) = (left.as_float()?, right.as_float()?);
    if r == 0.0 {
        return Some(Err(error_zero_division()));
    }
    let m = l % r;
    let m = if m != 0.0 && ((m < 0.0) != (r < 0.0)) { m + r } else { m };

    Some(Ok(Value::Float(m)))
}

fn shift(operator: Operator, left: &Value, right: &Value) -> Outcome {
    let (value, by) = (left.as_int()?, right.as_int()?);
    let (value, by) = match (operator, by < 0) {
        (Operator::ShiftLeft, false) | (Operator::ShiftRight, true) => (value, by.unsigned_abs()),
        _ => {
            let by = by.unsigned_abs().min(63) as u32;
            return Some(Ok(Value::Int(value >> by)));
        }
    };
    let shifted = u32::try_from(by)
        .ok()
        .and_then(|by| value.checked_shl(by))
        .filter(|shifted| by < 64 && shifted >> by == value);

    Some(shifted.map(Value::Int).ok_or_else(error_overflow))
}

fn bitwise(operator: Operator, left: &Value, right: &Value) -> Outcome {
    if let (Value::Bool(l), Value::Bool(r)) = (left, right) {
        let value = match operator {
            Operator::BitAnd => l & r,
            Operator::BitXor => l ^ r,
            _ => l | r,
        };
        return Some(Ok(Value::Bool(value)));
    }

    let (l, r) = (left.as_int()?, right.as_int()?);
    let value = match operator {
        Operator::BitAnd => l & r,
        Operator::BitXor => l ^ r,
        _ => l | r,
    };

    Some(Ok(Value::Int(value)))
}

/// Apply an operation to two numbers, with integers kept as integers.
fn numeric(
    left: &Value,
    right: &Value,
    int: fn(i64, i64) -> Option<i64>,
    float: fn(f64, f64) -> f64,
) -> Outcome {
    if let (Some(l), Some(r)) = (left.as_int(), right.as_int()) {
        return Some(int(l, r).map(Value::Int).ok_or_else(error_overflow));
    }
    let (l, r) = (left.as_float()?, right.as_float()?);

    Some(Ok(Value::Float(float(l, r))))
}

fn shift_datetime(datetime: NaiveDateTime, delta: TimeDelta, forward: bool) -> Result<NaiveDateTime, Error> {
    let shifted = if forward {
        datetime.checked_add_signed(delta)
    } else {
        datetime.checked_sub_signed(delta)
    };

    shifted.ok_or_else(error_overflow)
}

/// Move a date by whole months, keeping the day where the target month
/// allows and using its last day otherwise.
fn shift_months(date: NaiveDate, months: i64) -> Result<NaiveDate, Error> {
    let count = u32::try_from(months.unsigned_abs()).map_err(|_| error_overflow())?;
    let shifted = if months >= 0 {
        date.checked_add_months(Months::new(count))
    } else {
        date.checked_sub_months(Months::new(count))
    };

    shifted.ok_or_else(error_overflow)
}

fn undefined(value: &Value) -> Option<&str> {
    match value {
        Value::Undefined(name) => Some(name),
        _ => None,
    }
}

fn error_overflow() -> Error {
    Error::build("integer overflow")
        .with_kind(ErrorKind::Value)
        .with_help("the result does not fit into a 64 bit integer")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int(value: i64) -> Value {
        Value::Int(value)
    }

    #[test]
    fn test_numbers() {
        assert_eq!(apply(Operator::Add, &int(1), &int(2)).unwrap(), int(3));
        assert_eq!(apply(Operator::Add, &int(1), &Value::Float(0.5)).unwrap(), Value::Float(1.5));
        assert_eq!(apply(Operator::TrueDivide, &int(1), &int(2)).unwrap(), Value::Float(0.5));
        assert_eq!(apply(Operator::FloorDivide, &int(-7), &int(2)).unwrap(), int(-4));
        assert_eq!(apply(Operator::Modulo, &int(-7), &int(2)).unwrap(), int(1));
        assert_eq!(apply(Operator::Modulo, &int(7), &int(-2)).unwrap(), int(-1));
        assert_eq!(apply(Operator::Multiply, &Value::Bool(true), &int(3)).unwrap(), int(3));
    }

    #[test]
    fn test_zero_division() {
        for operator in [Operator::TrueDivide, Operator::FloorDivide, Operator::Modulo] {
            let error = apply(operator, &int(1), &int(0)).unwrap_err();
            assert_eq!(error.kind(), ErrorKind::ZeroDivision);
        }
    }

    #[test]
    fn test_overflow() {
        let error = apply(Operator::Add, &int(i64::MAX), &int(1)).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Value);

        let error = apply(Operator::ShiftLeft, &int(1), &int(64)).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Value);
    }

    #[test]
    fn test_sequences() {
        let list = Value::list(vec![int(1)]);

        assert_eq!(
            apply(Operator::Add, &Value::from("ab"), &Value::from("c")).unwrap(),
            Value::from("abc")
        );
        assert_eq!(
            apply(Operator::Multiply, &int(2), &Value::from("ab")).unwrap(),
            Value::from("abab")
        );
        assert_eq!(
            apply(Operator::Multiply, &list, &int(2)).unwrap(),
            Value::list(vec![int(1), int(1)])
        );
    }

    #[test]
    fn test_repeat_too_large() {
        let huge = int(i64::MAX);
        for sequence in [Value::from("ab"), Value::list(vec![int(1)])] {
            let error = apply(Operator::Multiply, &sequence, &huge).unwrap_err();
            assert_eq!(error.kind(), ErrorKind::Value);
        }

        let empty = apply(Operator::Multiply, &huge, &Value::list(vec![])).unwrap();
        assert_eq!(empty.len().unwrap(), 0);
        assert_eq!(apply(Operator::Multiply, &Value::from(""), &huge).unwrap(), Value::from(""));
    }

    #[test]
    fn test_augment_extends_in_place() {
        let list = Value::list(vec![int(1)]);
        let result = augment(Operator::Add, &list, &Value::list(vec![int(2)])).unwrap();

        assert_eq!(result.address(), list.address());
        assert_eq!(list.len().unwrap(), 2);
    }

    #[test]
    fn test_bits() {
        assert_eq!(apply(Operator::BitAnd, &int(6), &int(3)).unwrap(), int(2));
        assert_eq!(apply(Operator::ShiftRight, &int(-8), &int(1)).unwrap(), int(-4));
        assert_eq!(
            apply(Operator::BitOr, &Value::Bool(false), &Value::Bool(true)).unwrap(),
            Value::Bool(true)
        );
        assert!(matches!(
            apply(Operator::BitXor, &Value::Bool(true), &Value::Bool(true)).unwrap(),
            Value::Bool(false)
        ));
        assert_eq!(invert(&int(0)).unwrap(), int(-1));
    }

    #[test]
    fn test_dates() {
        let date = chrono::NaiveDate::from_ymd_opt(2000, 2, 28).unwrap();
        let next = apply(Operator::Add, &Value::Date(date), &Value::TimeDelta(TimeDelta::days(1)));

        assert_eq!(
            next.unwrap(),
            Value::Date(chrono::NaiveDate::from_ymd_opt(2000, 2, 29).unwrap())
        );
    }

    #[test]
    fn test_month_deltas() {
        let date = |y, m, d| Value::Date(NaiveDate::from_ymd_opt(y, m, d).unwrap());
        let month = Value::MonthDelta(1);

        assert_eq!(apply(Operator::Add, &date(2000, 1, 31), &month).unwrap(), date(2000, 2, 29));
        assert_eq!(apply(Operator::Subtract, &date(2000, 3, 31), &month).unwrap(), date(2000, 2, 29));
        assert_eq!(
            apply(Operator::Multiply, &int(12), &month).unwrap(),
            Value::MonthDelta(12)
        );
        assert_eq!(
            apply(Operator::Subtract, &month, &Value::MonthDelta(3)).unwrap(),
            Value::MonthDelta(-2)
        );
        assert_eq!(negate(&month).unwrap(), Value::MonthDelta(-1));
    }

    #[test]
    fn test_incompatible() {
        let error = apply(Operator::Subtract, &Value::from("a"), &int(1)).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Type);

        let error = apply(Operator::Add, &Value::undefined("x"), &int(1)).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Undefined);
    }
}
