//! Math and aggregate functions

use super::flatten;
use crate::error::FormulaResult;
use crate::evaluator::FormulaValue;
use nlsheet_core::CellError;

/// Numbers among the arguments; text, booleans and blanks are skipped.
/// The first error value wins.
fn collect_numbers(args: &[FormulaValue]) -> Result<Vec<f64>, CellError> {
    let mut numbers = Vec::new();
    for value in flatten(args) {
        match value {
            FormulaValue::Number(n) => numbers.push(*n),
            FormulaValue::Error(e) => return Err(*e),
            _ => {}
        }
    }
    Ok(numbers)
}

/// Scalar numeric argument; empty counts as zero
fn number_arg(value: Option<&FormulaValue>, default: f64) -> Result<f64, CellError> {
    match value {
        None | Some(FormulaValue::Empty) => Ok(default),
        Some(FormulaValue::Error(e)) => Err(*e),
        Some(FormulaValue::Array(_)) => Err(CellError::Value),
        Some(other) => other.as_number().ok_or(CellError::Value),
    }
}

fn aggregate(args: &[FormulaValue], f: impl FnOnce(&[f64]) -> FormulaValue) -> FormulaValue {
    match collect_numbers(args) {
        Ok(numbers) => f(&numbers),
        Err(e) => FormulaValue::Error(e),
    }
}

/// SUM function
pub fn fn_sum(args: &[FormulaValue]) -> FormulaResult<FormulaValue> {
    Ok(aggregate(args, |numbers| {
        FormulaValue::Number(numbers.iter().sum())
    }))
}

/// AVERAGE function; no numbers at all is `#DIV/0!`
pub fn fn_average(args: &[FormulaValue]) -> FormulaResult<FormulaValue> {
    Ok(aggregate(args, |numbers| {
        if numbers.is_empty() {
            FormulaValue::Error(CellError::Div0)
        } else {
            FormulaValue::Number(numbers.iter().sum::<f64>() / numbers.len() as f64)
        }
    }))
}

/// MIN function
pub fn fn_min(args: &[FormulaValue]) -> FormulaResult<FormulaValue> {
    Ok(aggregate(args, |numbers| {
        FormulaValue::Number(numbers.iter().copied().reduce(f64::min).unwrap_or(0.0))
    }))
}

/// MAX function
pub fn fn_max(args: &[FormulaValue]) -> FormulaResult<FormulaValue> {
    Ok(aggregate(args, |numbers| {
        FormulaValue::Number(numbers.iter().copied().reduce(f64::max).unwrap_or(0.0))
    }))
}

/// COUNT function (counts numbers only; errors are not counted)
pub fn fn_count(args: &[FormulaValue]) -> FormulaResult<FormulaValue> {
    let count = flatten(args)
        .filter(|v| matches!(v, FormulaValue::Number(_)))
        .count();
    Ok(FormulaValue::Number(count as f64))
}

/// ABS function
pub fn fn_abs(args: &[FormulaValue]) -> FormulaResult<FormulaValue> {
    Ok(match number_arg(args.first(), 0.0) {
        Ok(n) => FormulaValue::Number(n.abs()),
        Err(e) => FormulaValue::Error(e),
    })
}

/// ROUND(number, [num_digits])
///
/// Rounds half away from zero, so `ROUND(2.5)` is 3 and `ROUND(-2.5)` is -3.
pub fn fn_round(args: &[FormulaValue]) -> FormulaResult<FormulaValue> {
    let number = match number_arg(args.first(), 0.0) {
        Ok(n) => n,
        Err(e) => return Ok(FormulaValue::Error(e)),
    };
    let num_digits = match number_arg(args.get(1), 0.0) {
        Ok(n) => n.trunc() as i32,
        Err(e) => return Ok(FormulaValue::Error(e)),
    };

    let multiplier = 10_f64.powi(num_digits.clamp(-308, 308));
    let scaled = number * multiplier;
    if !scaled.is_finite() {
        // More digits than an f64 carries
        return Ok(FormulaValue::Number(number));
    }

    let rounded = if scaled >= 0.0 {
        (scaled + 0.5).floor()
    } else {
        (scaled - 0.5).ceil()
    };
    let result = rounded / multiplier;

    Ok(if result.is_finite() {
        FormulaValue::Number(result)
    } else {
        FormulaValue::Error(CellError::Num)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn n(v: f64) -> FormulaValue {
        FormulaValue::Number(v)
    }

    fn column(values: &[FormulaValue]) -> FormulaValue {
        FormulaValue::Array(values.iter().map(|v| vec![v.clone()]).collect())
    }

    #[test]
    fn test_sum_skips_text_and_blanks() {
        let range = column(&[n(1.0), FormulaValue::from("x"), FormulaValue::Empty, n(2.0)]);
        assert_eq!(fn_sum(&[range, n(3.0)]).unwrap(), n(6.0));
    }

    #[test]
    fn test_sum_propagates_errors() {
        let range = column(&[n(1.0), FormulaValue::Error(CellError::Na)]);
        assert_eq!(
            fn_sum(&[range]).unwrap(),
            FormulaValue::Error(CellError::Na)
        );
    }

    #[test]
    fn test_average() {
        assert_eq!(fn_average(&[n(2.0), n(4.0)]).unwrap(), n(3.0));
        assert_eq!(
            fn_average(&[FormulaValue::Empty]).unwrap(),
            FormulaValue::Error(CellError::Div0)
        );
    }

    #[test]
    fn test_min_max() {
        let range = column(&[n(5.0), n(-1.0), n(9.0)]);
        assert_eq!(fn_min(&[range.clone()]).unwrap(), n(-1.0));
        assert_eq!(fn_max(&[range]).unwrap(), n(9.0));
        assert_eq!(fn_max(&[FormulaValue::from("a")]).unwrap(), n(0.0));
    }

    #[test]
    fn test_count() {
        let range = column(&[n(1.0), FormulaValue::from("a"), FormulaValue::Error(CellError::Ref)]);
        assert_eq!(fn_count(&[range, n(2.0)]).unwrap(), n(2.0));
    }

    #[test]
    fn test_round_half_away_from_zero() {
        assert_eq!(fn_round(&[n(2.5)]).unwrap(), n(3.0));
        assert_eq!(fn_round(&[n(-2.5)]).unwrap(), n(-3.0));
        assert_eq!(fn_round(&[n(3.14159), n(2.0)]).unwrap(), n(3.14));
        assert_eq!(fn_round(&[n(1234.0), n(-2.0)]).unwrap(), n(1200.0));
    }

    #[test]
    fn test_round_extreme_digits_stay_finite() {
        assert_eq!(fn_round(&[n(1.0), n(400.0)]).unwrap(), n(1.0));
        assert_eq!(fn_round(&[n(1.0), n(-400.0)]).unwrap(), n(0.0));
        assert_eq!(fn_round(&[n(5e300), n(308.0)]).unwrap(), n(5e300));
        assert_eq!(fn_round(&[n(-7.25), n(1e12)]).unwrap(), n(-7.25));
    }

    #[test]
    fn test_abs() {
        assert_eq!(fn_abs(&[n(-4.0)]).unwrap(), n(4.0));
        assert_eq!(
            fn_abs(&[FormulaValue::from("abc")]).unwrap(),
            FormulaValue::Error(CellError::Value)
        );
    }
}
