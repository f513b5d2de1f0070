//! Row context integration
//!
//! Spreadsheet ingestion hands rows over as ordered column → value maps in
//! which some cells hold formulas (`"=quantity*price"`). This module turns
//! such a row into an [`EvaluationContext`] and resolves its formula cells.
//!
//! Resolution is forward-only: plain cells first, then formula cells in
//! column order, each seeing the results of the formulas before it. There
//! is no dependency ordering and no cycle detection.
//!
//! # Example
//!
//! ```rust
//! use nlsheet::row::{process_row, Row};
//! use nlsheet::{EvaluationContext, FormulaValue};
//!
//! let mut row = Row::new();
//! row.insert("quantity".into(), 10.0.into());
//! row.insert("price".into(), 50.0.into());
//! row.insert("total".into(), "=quantity*price".into());
//!
//! let out = process_row(&row, &EvaluationContext::new());
//! assert_eq!(out["total"], FormulaValue::Number(500.0));
//! ```

use crate::{evaluate, parse_formula, EvaluationContext, FormulaValue};
use indexmap::IndexMap;
use lazy_regex::regex_is_match;
use nlsheet_nlp::normalize::normalize_key;
use once_cell::sync::Lazy;
use std::collections::HashMap;
use tracing::debug;

/// One spreadsheet row, column order preserved
pub type Row = IndexMap<String, FormulaValue>;

/// Column headers recognized as the canonical pricing fields, in
/// [`normalize_key`] form
const COLUMN_ALIASES: &[(&str, &[&str])] = &[
    (
        "retailPrice",
        &[
            "retailprice",
            "price",
            "sellingprice",
            "saleprice",
            "gia",
            "giaban",
            "giabanle",
            "dongia",
        ],
    ),
    (
        "costPrice",
        &["costprice", "cost", "giavon", "von", "gianhap", "giagoc"],
    ),
    ("quantity", &["quantity", "qty", "soluong", "sl"]),
    (
        "margin",
        &["margin", "bienloinhuan", "tysuatloinhuan", "tisuatloinhuan"],
    ),
];

static ALIAS_INDEX: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    COLUMN_ALIASES
        .iter()
        .flat_map(|(canonical, aliases)| aliases.iter().map(move |alias| (*alias, *canonical)))
        .collect()
});

const CURRENCY_SYMBOLS: &[char] = &['$', '€', '£', '¥', '₫'];

/// Canonical field for a column header, if it is a known alias
pub fn canonical_column(header: &str) -> Option<&'static str> {
    ALIAS_INDEX.get(normalize_key(header).as_str()).copied()
}

/// Whether a cell holds a formula
pub fn is_formula(value: &FormulaValue) -> bool {
    matches!(value, FormulaValue::String(s) if s.trim_start().starts_with('='))
}

/// Numeric value of a currency-formatted amount (`"$1,250.00"`, `"150.000đ"`,
/// `"2.500.000 VND"`), or `None` if the text is not an amount
pub fn parse_amount(text: &str) -> Option<f64> {
    let mut s = text.trim();
    let mut vnd = false;

    for suffix in ["VND", "vnd", "Vnd", "đ", "₫"] {
        if let Some(rest) = s.strip_suffix(suffix) {
            s = rest.trim_end();
            vnd = true;
            break;
        }
    }
    if s.contains('₫') {
        vnd = true;
    }

    let digits: String = s
        .chars()
        .filter(|c| !CURRENCY_SYMBOLS.contains(c) && !c.is_whitespace())
        .collect();
    if digits.is_empty() {
        return None;
    }

    // `1.500.000` and VND amounts group thousands with dots
    let dotted_thousands = regex_is_match!(r"^-?[0-9]{1,3}(\.[0-9]{3})+$", &digits)
        && (vnd || digits.matches('.').count() > 1);

    let plain = if dotted_thousands {
        digits.replace('.', "")
    } else {
        digits.replace(',', "")
    };

    if !regex_is_match!(r"^-?([0-9]+(\.[0-9]*)?|\.[0-9]+)$", &plain) {
        return None;
    }
    plain.parse().ok()
}

/// A raw cell value with currency formatting removed
fn clean_value(value: &FormulaValue) -> FormulaValue {
    match value {
        FormulaValue::String(s) => match parse_amount(s) {
            Some(n) => FormulaValue::Number(n),
            None => FormulaValue::String(s.trim().to_string()),
        },
        other => other.clone(),
    }
}

/// Plain numeric coercion used for the processed row
fn coerce_value(value: &FormulaValue) -> FormulaValue {
    match value {
        FormulaValue::String(s) => match s.trim().parse::<f64>() {
            Ok(n) if n.is_finite() => FormulaValue::Number(n),
            _ => value.clone(),
        },
        other => other.clone(),
    }
}

/// Build an evaluation context from a row.
///
/// Every column is exposed under its own header with its cleaned value.
/// Headers that are aliases of a pricing field (`"Giá bán"`, `"Retail
/// Price"`) are also exposed under the canonical name (`retailPrice`).
pub fn create_context(row: &Row) -> EvaluationContext {
    let mut ctx = EvaluationContext::new();
    add_row_values(&mut ctx, row.iter());
    ctx
}

fn add_row_values<'a>(
    ctx: &mut EvaluationContext,
    cells: impl Iterator<Item = (&'a String, &'a FormulaValue)>,
) {
    for (header, value) in cells {
        let cleaned = clean_value(value);
        if let Some(canonical) = canonical_column(header) {
            ctx.set(canonical, cleaned.clone());
        }
        ctx.set(header.as_str(), cleaned);
    }
}

/// Resolve the formula cells of a row.
///
/// `extra_context` supplies values the row does not carry. Formulas that
/// fail to parse or evaluate to an error become [`FormulaValue::Empty`].
pub fn process_row(row: &Row, extra_context: &EvaluationContext) -> Row {
    let mut ctx = extra_context.clone();
    add_row_values(&mut ctx, row.iter().filter(|(_, v)| !is_formula(v)));

    // Placeholders fix the column order; later inserts keep positions
    let mut output: Row = row.keys().map(|k| (k.clone(), FormulaValue::Empty)).collect();

    for (key, value) in row.iter().filter(|(_, v)| !is_formula(v)) {
        let value = coerce_value(value);
        ctx.set(key.as_str(), value.clone());
        output.insert(key.clone(), value);
    }

    for (key, value) in row.iter() {
        let FormulaValue::String(formula) = value else {
            continue;
        };
        if !is_formula(value) {
            continue;
        }

        let result = match parse_formula(formula) {
            Ok(ast) => evaluate(&ast, &ctx),
            Err(e) => {
                debug!(column = %key, error = %e, "formula failed to parse");
                continue;
            }
        };

        if let FormulaValue::Error(e) = &result {
            debug!(column = %key, error = %e, "formula evaluated to an error");
            continue;
        }

        debug!(column = %key, value = %result, "formula resolved");
        ctx.set(key.as_str(), result.clone());
        output.insert(key.clone(), result);
    }

    output
}

/// [`process_row`] over many rows, each independent of the others
pub fn process_rows(rows: &[Row], extra_context: &EvaluationContext) -> Vec<Row> {
    rows.iter().map(|row| process_row(row, extra_context)).collect()
}
