//! Lookup functions

use crate::error::FormulaResult;
use crate::evaluator::FormulaValue;
use nlsheet_core::CellError;

fn values_equal(a: &FormulaValue, b: &FormulaValue) -> bool {
    match (a, b) {
        (FormulaValue::Number(x), FormulaValue::Number(y)) => x == y,
        (FormulaValue::Boolean(x), FormulaValue::Boolean(y)) => x == y,
        (FormulaValue::String(x), FormulaValue::String(y)) => x.to_lowercase() == y.to_lowercase(),

        // SKUs are often typed as text in one place and numbers in another
        (FormulaValue::Number(x), FormulaValue::String(s))
        | (FormulaValue::String(s), FormulaValue::Number(x)) => {
            s.trim().parse::<f64>().map_or(false, |n| n == *x)
        }

        (FormulaValue::Empty, FormulaValue::Empty) => true,
        _ => false,
    }
}

/// VLOOKUP(lookup_value, table, col_index, [range_lookup])
///
/// Exact match only; the fourth argument is accepted and ignored.
pub fn fn_vlookup(args: &[FormulaValue]) -> FormulaResult<FormulaValue> {
    if let Some(e) = args.iter().find_map(FormulaValue::get_error) {
        return Ok(FormulaValue::Error(e));
    }

    let (Some(lookup_value), Some(table), Some(col_index)) = (args.first(), args.get(1), args.get(2))
    else {
        return Ok(FormulaValue::Error(CellError::Value));
    };

    if matches!(lookup_value, FormulaValue::Array(_)) {
        return Ok(FormulaValue::Error(CellError::Value));
    }

    let table = match table {
        FormulaValue::Array(rows) => rows.as_slice(),
        _ => return Ok(FormulaValue::Error(CellError::Value)),
    };
    let cols = table.first().map_or(0, Vec::len);
    if table.is_empty() || cols == 0 {
        return Ok(FormulaValue::Error(CellError::Na));
    }

    let col_index = col_index.as_number().map_or(0, |n| n.trunc() as i64);
    if col_index < 1 {
        return Ok(FormulaValue::Error(CellError::Value));
    }
    let col_index0 = (col_index - 1) as usize;
    if col_index0 >= cols {
        return Ok(FormulaValue::Error(CellError::Ref));
    }

    let found = table
        .iter()
        .find(|row| row.first().is_some_and(|key| values_equal(lookup_value, key)));

    Ok(match found {
        Some(row) => row.get(col_index0).cloned().unwrap_or(FormulaValue::Empty),
        None => FormulaValue::Error(CellError::Na),
    })
}
