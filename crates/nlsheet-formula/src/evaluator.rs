//! Formula evaluator
//!
//! Evaluates formula ASTs against a flat name → value context.

use crate::ast::{BinaryOperator, FormulaExpr, UnaryOperator};
use crate::error::{FormulaError, FormulaResult};
use crate::functions::FunctionRegistry;
use ahash::AHashMap;
use nlsheet_core::{CellAddress, CellError, CellRange};
use std::fmt;
use std::sync::OnceLock;

/// Global function registry (lazily initialized)
static FUNCTION_REGISTRY: OnceLock<FunctionRegistry> = OnceLock::new();

fn get_function_registry() -> &'static FunctionRegistry {
    FUNCTION_REGISTRY.get_or_init(FunctionRegistry::new)
}

/// Ranges larger than this evaluate to `#REF!` instead of being materialized
pub const MAX_RANGE_CELLS: u64 = 100_000;

/// Value types during formula evaluation
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(untagged))]
pub enum FormulaValue {
    Number(f64),
    Boolean(bool),
    String(String),
    #[cfg_attr(feature = "serde", serde(skip_deserializing))]
    Error(CellError),
    Array(Vec<Vec<FormulaValue>>),
    /// No value (`null`)
    Empty,
}

impl FormulaValue {
    /// Convert to number, if possible
    pub fn as_number(&self) -> Option<f64> {
        match self {
            FormulaValue::Number(n) => Some(*n),
            FormulaValue::Boolean(true) => Some(1.0),
            FormulaValue::Boolean(false) => Some(0.0),
            FormulaValue::String(s) => s.trim().parse().ok(),
            FormulaValue::Empty => Some(0.0),
            _ => None,
        }
    }

    /// Force conversion to number for arithmetic
    pub fn to_number(&self) -> FormulaResult<f64> {
        self.as_number()
            .ok_or_else(|| FormulaError::Evaluation(format!("Cannot convert {} to number", self)))
    }

    /// Convert to boolean
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FormulaValue::Boolean(b) => Some(*b),
            FormulaValue::Number(n) => Some(*n != 0.0),
            FormulaValue::String(s) if s.eq_ignore_ascii_case("TRUE") => Some(true),
            FormulaValue::String(s) if s.eq_ignore_ascii_case("FALSE") => Some(false),
            FormulaValue::Empty => Some(false),
            _ => None,
        }
    }

    /// Convert to string
    pub fn as_string(&self) -> String {
        match self {
            FormulaValue::Number(n) => format_number(*n),
            FormulaValue::String(s) => s.clone(),
            FormulaValue::Boolean(true) => "TRUE".to_string(),
            FormulaValue::Boolean(false) => "FALSE".to_string(),
            FormulaValue::Error(e) => e.to_string(),
            FormulaValue::Empty => String::new(),
            FormulaValue::Array(_) => CellError::Value.to_string(),
        }
    }

    /// Check if this is an error
    pub fn is_error(&self) -> bool {
        matches!(self, FormulaValue::Error(_))
    }

    /// Get the error if this is one
    pub fn get_error(&self) -> Option<CellError> {
        match self {
            FormulaValue::Error(e) => Some(*e),
            _ => None,
        }
    }

    /// Check if this is the empty (`null`) value
    pub fn is_empty(&self) -> bool {
        matches!(self, FormulaValue::Empty)
    }
}

/// Formats like a spreadsheet: integral values print without a fraction
pub fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

impl fmt::Display for FormulaValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormulaValue::String(s) => write!(f, "\"{}\"", s),
            FormulaValue::Array(rows) => write!(f, "{{{} rows}}", rows.len()),
            FormulaValue::Empty => write!(f, "null"),
            other => write!(f, "{}", other.as_string()),
        }
    }
}

impl From<f64> for FormulaValue {
    fn from(n: f64) -> Self {
        FormulaValue::Number(n)
    }
}

impl From<bool> for FormulaValue {
    fn from(b: bool) -> Self {
        FormulaValue::Boolean(b)
    }
}

impl From<&str> for FormulaValue {
    fn from(s: &str) -> Self {
        FormulaValue::String(s.to_string())
    }
}

impl From<String> for FormulaValue {
    fn from(s: String) -> Self {
        FormulaValue::String(s)
    }
}

impl From<CellError> for FormulaValue {
    fn from(e: CellError) -> Self {
        FormulaValue::Error(e)
    }
}

impl<T: Into<FormulaValue>> From<Option<T>> for FormulaValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(FormulaValue::Empty, Into::into)
    }
}

/// Context for formula evaluation
///
/// A flat map from names (`retailPrice`) and cell keys (`A1`) to values.
/// It is owned by the caller for the duration of one request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvaluationContext {
    values: AHashMap<String, FormulaValue>,
}

impl EvaluationContext {
    /// Create an empty context
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a named value, replacing any previous one
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<FormulaValue>) {
        self.values.insert(name.into(), value.into());
    }

    /// Set the value of a cell (`"b2"` is stored as `B2`)
    pub fn set_cell(&mut self, cell: &str, value: impl Into<FormulaValue>) -> FormulaResult<()> {
        let address = CellAddress::parse(cell)
            .map_err(|e| FormulaError::InvalidReference(e.to_string()))?;
        self.values.insert(address.key(), value.into());
        Ok(())
    }

    /// Look up a name: exact match first, then case-insensitive. Among
    /// several case-insensitive matches the lexicographically smallest key
    /// wins.
    pub fn get(&self, name: &str) -> Option<&FormulaValue> {
        self.values.get(name).or_else(|| {
            self.values
                .iter()
                .filter(|(key, _)| key.eq_ignore_ascii_case(name))
                .min_by(|(a, _), (b, _)| a.cmp(b))
                .map(|(_, value)| value)
        })
    }

    /// Whether the name resolves (with the same rules as [`Self::get`])
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Get a cell value
    pub fn get_cell(&self, address: &CellAddress) -> Option<&FormulaValue> {
        self.values.get(&address.key())
    }

    /// Get a range of cell values as an array; missing cells are empty
    pub fn get_range_values(&self, range: &CellRange) -> FormulaValue {
        if range.cell_count() > MAX_RANGE_CELLS {
            return FormulaValue::Error(CellError::Ref);
        }

        let cells: Vec<FormulaValue> = range
            .cells()
            .map(|address| self.get_cell(&address).cloned().unwrap_or(FormulaValue::Empty))
            .collect();
        let rows = cells
            .chunks(range.col_count() as usize)
            .map(<[FormulaValue]>::to_vec)
            .collect();

        FormulaValue::Array(rows)
    }

    /// Iterate over all entries
    pub fn iter(&self) -> impl Iterator<Item = (&String, &FormulaValue)> {
        self.values.iter()
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the context has no entries
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<K: Into<String>, V: Into<FormulaValue>> FromIterator<(K, V)> for EvaluationContext {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut ctx = EvaluationContext::new();
        ctx.extend(iter);
        ctx
    }
}

impl<K: Into<String>, V: Into<FormulaValue>> Extend<(K, V)> for EvaluationContext {
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (name, value) in iter {
            self.set(name, value);
        }
    }
}

/// Evaluate a formula expression
///
/// Never fails: anything that goes wrong is reported as a
/// [`FormulaValue::Error`].
pub fn evaluate(expr: &FormulaExpr, ctx: &EvaluationContext) -> FormulaValue {
    match eval_expr(expr, ctx) {
        Ok(value) => value,
        Err(e) => FormulaValue::Error(e.to_cell_error()),
    }
}

fn eval_expr(expr: &FormulaExpr, ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    match expr {
        // === Literals ===
        FormulaExpr::Number(n) => Ok(FormulaValue::Number(*n)),
        FormulaExpr::String(s) => Ok(FormulaValue::String(s.clone())),
        FormulaExpr::Boolean(b) => Ok(FormulaValue::Boolean(*b)),
        FormulaExpr::Error(e) => Ok(FormulaValue::Error(*e)),

        // === References ===
        FormulaExpr::CellRef(address) => Ok(ctx
            .get_cell(address)
            .cloned()
            .unwrap_or(FormulaValue::Error(CellError::Ref))),

        FormulaExpr::RangeRef(range) => Ok(ctx.get_range_values(range)),

        FormulaExpr::NameRef(name) => Ok(ctx
            .get(name)
            .cloned()
            .unwrap_or(FormulaValue::Error(CellError::Name))),

        // === Operators ===
        FormulaExpr::BinaryOp {
            op: BinaryOperator::Range,
            left,
            right,
        } => evaluate_name_range(left, right, ctx),

        FormulaExpr::BinaryOp { op, left, right } => evaluate_binary_op(*op, left, right, ctx),

        FormulaExpr::UnaryOp { op, operand } => evaluate_unary_op(*op, operand, ctx),

        // === Functions ===
        FormulaExpr::Function { name, args } => Ok(evaluate_function(name, args, ctx)
            .unwrap_or_else(|e| FormulaValue::Error(e.to_cell_error()))),

        // === Arrays ===
        FormulaExpr::Array(rows) => {
            let rows = rows
                .iter()
                .map(|row| row.iter().map(|e| evaluate(e, ctx)).collect::<Vec<_>>())
                .collect();
            Ok(FormulaValue::Array(rows))
        }
    }
}

/// `price:price` names a whole column of the current row, which is just
/// the value of `price`
fn evaluate_name_range(
    left: &FormulaExpr,
    right: &FormulaExpr,
    ctx: &EvaluationContext,
) -> FormulaResult<FormulaValue> {
    match (left, right) {
        (FormulaExpr::NameRef(a), FormulaExpr::NameRef(b)) if a.eq_ignore_ascii_case(b) => {
            eval_expr(left, ctx)
        }
        _ => Ok(FormulaValue::Error(CellError::Ref)),
    }
}

/// Evaluate a binary operation
fn evaluate_binary_op(
    op: BinaryOperator,
    left: &FormulaExpr,
    right: &FormulaExpr,
    ctx: &EvaluationContext,
) -> FormulaResult<FormulaValue> {
    let left_val = evaluate(left, ctx);
    let right_val = evaluate(right, ctx);

    // Propagate errors
    if let Some(e) = left_val.get_error() {
        return Ok(FormulaValue::Error(e));
    }
    if let Some(e) = right_val.get_error() {
        return Ok(FormulaValue::Error(e));
    }

    let result = match op {
        BinaryOperator::Add
        | BinaryOperator::Subtract
        | BinaryOperator::Multiply
        | BinaryOperator::Divide
        | BinaryOperator::Power => {
            let (Some(l), Some(r)) = (scalar_number(&left_val), scalar_number(&right_val)) else {
                return Ok(FormulaValue::Error(CellError::Value));
            };
            arithmetic(op, l, r)
        }

        BinaryOperator::Equal => FormulaValue::Boolean(compare_values(&left_val, &right_val) == 0),
        BinaryOperator::NotEqual => {
            FormulaValue::Boolean(compare_values(&left_val, &right_val) != 0)
        }
        BinaryOperator::LessThan => {
            FormulaValue::Boolean(compare_values(&left_val, &right_val) < 0)
        }
        BinaryOperator::LessEqual => {
            FormulaValue::Boolean(compare_values(&left_val, &right_val) <= 0)
        }
        BinaryOperator::GreaterThan => {
            FormulaValue::Boolean(compare_values(&left_val, &right_val) > 0)
        }
        BinaryOperator::GreaterEqual => {
            FormulaValue::Boolean(compare_values(&left_val, &right_val) >= 0)
        }

        BinaryOperator::Concat => {
            FormulaValue::String(left_val.as_string() + &right_val.as_string())
        }

        BinaryOperator::Range => {
            return Err(FormulaError::Evaluation(
                "Range operator reached arithmetic evaluation".into(),
            ))
        }
    };

    Ok(result)
}

/// Arrays never take part in scalar arithmetic
fn scalar_number(value: &FormulaValue) -> Option<f64> {
    match value {
        FormulaValue::Array(_) => None,
        other => other.as_number(),
    }
}

fn arithmetic(op: BinaryOperator, l: f64, r: f64) -> FormulaValue {
    let result = match op {
        BinaryOperator::Add => l + r,
        BinaryOperator::Subtract => l - r,
        BinaryOperator::Multiply => l * r,
        BinaryOperator::Divide if r == 0.0 => return FormulaValue::Error(CellError::Div0),
        BinaryOperator::Divide => l / r,
        BinaryOperator::Power => l.powf(r),
        _ => return FormulaValue::Error(CellError::Value),
    };

    if result.is_finite() {
        FormulaValue::Number(result)
    } else {
        FormulaValue::Error(CellError::Num)
    }
}

/// Compare two values for ordering (Excel-style comparison)
pub(crate) fn compare_values(left: &FormulaValue, right: &FormulaValue) -> i32 {
    let left = match left {
        FormulaValue::Empty => &FormulaValue::Number(0.0),
        v => v,
    };
    let right = match right {
        FormulaValue::Empty => &FormulaValue::Number(0.0),
        v => v,
    };

    match (left, right) {
        (FormulaValue::Number(l), FormulaValue::Number(r)) => {
            l.partial_cmp(r).map_or(0, |ord| ord as i32)
        }

        // Strings compare case-insensitively
        (FormulaValue::String(l), FormulaValue::String(r)) => {
            l.to_lowercase().cmp(&r.to_lowercase()) as i32
        }

        // FALSE < TRUE
        (FormulaValue::Boolean(l), FormulaValue::Boolean(r)) => (*l as i32) - (*r as i32),

        // Mixed types: number < string < boolean
        (FormulaValue::Number(_), FormulaValue::String(_)) => -1,
        (FormulaValue::String(_), FormulaValue::Number(_)) => 1,
        (FormulaValue::Number(_), FormulaValue::Boolean(_)) => -1,
        (FormulaValue::Boolean(_), FormulaValue::Number(_)) => 1,
        (FormulaValue::String(_), FormulaValue::Boolean(_)) => -1,
        (FormulaValue::Boolean(_), FormulaValue::String(_)) => 1,

        (FormulaValue::Error(l), FormulaValue::Error(r)) => (l.code() as i32) - (r.code() as i32),

        _ => 0,
    }
}

/// Evaluate a unary operation
fn evaluate_unary_op(
    op: UnaryOperator,
    operand: &FormulaExpr,
    ctx: &EvaluationContext,
) -> FormulaResult<FormulaValue> {
    let val = evaluate(operand, ctx);

    if let Some(e) = val.get_error() {
        return Ok(FormulaValue::Error(e));
    }

    let Some(n) = scalar_number(&val) else {
        return Ok(FormulaValue::Error(CellError::Value));
    };

    Ok(match op {
        UnaryOperator::Negate => FormulaValue::Number(-n),
        UnaryOperator::Percent => FormulaValue::Number(n / 100.0),
    })
}

/// Evaluate a function call
fn evaluate_function(
    name: &str,
    args: &[FormulaExpr],
    ctx: &EvaluationContext,
) -> FormulaResult<FormulaValue> {
    let registry = get_function_registry();

    let func = registry
        .get(name)
        .ok_or_else(|| FormulaError::UnknownFunction(name.to_string()))?;

    if args.len() < func.min_args {
        return Err(FormulaError::ArgumentCount {
            function: name.to_string(),
            expected: format!("at least {}", func.min_args),
            actual: args.len(),
        });
    }

    if let Some(max) = func.max_args {
        if args.len() > max {
            return Err(FormulaError::ArgumentCount {
                function: name.to_string(),
                expected: format!("at most {}", max),
                actual: args.len(),
            });
        }
    }

    // Failures inside an argument become error values so IF and IFERROR
    // can inspect them
    let evaluated_args: Vec<FormulaValue> = args.iter().map(|arg| evaluate(arg, ctx)).collect();

    (func.implementation)(&evaluated_args)
}
