//! Logical functions

use super::flatten;
use crate::error::{FormulaError, FormulaResult};
use crate::evaluator::FormulaValue;
use nlsheet_core::CellError;

/// IF function
pub fn fn_if(args: &[FormulaValue]) -> FormulaResult<FormulaValue> {
    let condition = args
        .first()
        .ok_or_else(|| FormulaError::Argument("IF requires at least 2 arguments".into()))?;

    let if_true = args
        .get(1)
        .ok_or_else(|| FormulaError::Argument("IF requires at least 2 arguments".into()))?;

    let if_false = args.get(2);

    let condition_bool = match condition {
        FormulaValue::Error(e) => return Ok(FormulaValue::Error(*e)),
        FormulaValue::Array(_) => return Ok(FormulaValue::Error(CellError::Value)),
        other => match other.as_bool() {
            Some(b) => b,
            None => return Ok(FormulaValue::Error(CellError::Value)),
        },
    };

    if condition_bool {
        Ok(if_true.clone())
    } else {
        Ok(if_false.cloned().unwrap_or(FormulaValue::Boolean(false)))
    }
}

/// Fold the truthy values of the arguments; text and blanks are ignored
fn fold_truth(args: &[FormulaValue], short_circuit_on: bool) -> FormulaValue {
    for value in flatten(args) {
        match value {
            FormulaValue::Error(e) => return FormulaValue::Error(*e),
            FormulaValue::Boolean(b) if *b == short_circuit_on => {
                return FormulaValue::Boolean(short_circuit_on)
            }
            FormulaValue::Number(n) if (*n != 0.0) == short_circuit_on => {
                return FormulaValue::Boolean(short_circuit_on)
            }
            _ => {}
        }
    }
    FormulaValue::Boolean(!short_circuit_on)
}

/// AND function
pub fn fn_and(args: &[FormulaValue]) -> FormulaResult<FormulaValue> {
    Ok(fold_truth(args, false))
}

/// OR function
pub fn fn_or(args: &[FormulaValue]) -> FormulaResult<FormulaValue> {
    Ok(fold_truth(args, true))
}

/// NOT function
pub fn fn_not(args: &[FormulaValue]) -> FormulaResult<FormulaValue> {
    Ok(match args.first() {
        Some(FormulaValue::Error(e)) => FormulaValue::Error(*e),
        Some(FormulaValue::Array(_)) | None => FormulaValue::Error(CellError::Value),
        Some(value) => match value.as_bool() {
            Some(b) => FormulaValue::Boolean(!b),
            None => FormulaValue::Error(CellError::Value),
        },
    })
}

/// IFERROR(value, value_if_error)
pub fn fn_iferror(args: &[FormulaValue]) -> FormulaResult<FormulaValue> {
    match args.first() {
        Some(FormulaValue::Error(_)) => Ok(args.get(1).cloned().unwrap_or(FormulaValue::Empty)),
        Some(value) => Ok(value.clone()),
        None => Err(FormulaError::Argument(
            "IFERROR requires 2 arguments".into(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn b(v: bool) -> FormulaValue {
        FormulaValue::Boolean(v)
    }

    #[test]
    fn test_if() {
        let yes = FormulaValue::from("Đạt");
        let no = FormulaValue::from("Không đạt");
        assert_eq!(fn_if(&[b(true), yes.clone(), no.clone()]).unwrap(), yes);
        assert_eq!(
            fn_if(&[FormulaValue::Number(0.0), yes.clone(), no.clone()]).unwrap(),
            no
        );
        assert_eq!(fn_if(&[b(false), yes]).unwrap(), b(false));
    }

    #[test]
    fn test_if_rejects_text_condition() {
        assert_eq!(
            fn_if(&[FormulaValue::from("maybe"), b(true)]).unwrap(),
            FormulaValue::Error(CellError::Value)
        );
    }

    #[test]
    fn test_and_or() {
        assert_eq!(fn_and(&[b(true), FormulaValue::Number(1.0)]).unwrap(), b(true));
        assert_eq!(fn_and(&[b(true), b(false)]).unwrap(), b(false));
        assert_eq!(fn_or(&[b(false), FormulaValue::Number(2.0)]).unwrap(), b(true));
        assert_eq!(fn_or(&[b(false)]).unwrap(), b(false));
        assert_eq!(
            fn_or(&[FormulaValue::Error(CellError::Ref)]).unwrap(),
            FormulaValue::Error(CellError::Ref)
        );
    }

    #[test]
    fn test_not() {
        assert_eq!(fn_not(&[b(true)]).unwrap(), b(false));
        assert_eq!(fn_not(&[FormulaValue::Number(0.0)]).unwrap(), b(true));
    }

    #[test]
    fn test_iferror() {
        let fallback = FormulaValue::Number(0.0);
        assert_eq!(
            fn_iferror(&[FormulaValue::Error(CellError::Div0), fallback.clone()]).unwrap(),
            fallback
        );
        assert_eq!(
            fn_iferror(&[FormulaValue::Number(5.0), fallback]).unwrap(),
            FormulaValue::Number(5.0)
        );
    }
}
