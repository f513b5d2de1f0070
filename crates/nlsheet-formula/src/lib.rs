//! # nlsheet-formula
//!
//! Formula parser and evaluator for nlsheet.
//!
//! This crate provides:
//! - Formula parsing (text → AST)
//! - Formula evaluation (AST × context → value)
//! - A small registry of built-in functions (SUM, AVERAGE, COUNT, IF, VLOOKUP, ...)
//!
//! Evaluation never fails: invalid operations produce a typed
//! [`FormulaValue::Error`] such as `#DIV/0!`. Only [`parse_formula`] returns
//! a Rust error, for text that is not a formula at all.
//!
//! ## Example
//!
//! ```rust
//! use nlsheet_formula::{evaluate, parse_formula, EvaluationContext, FormulaValue};
//!
//! let ast = parse_formula("=(retailPrice-costPrice)/retailPrice*100").unwrap();
//! let mut ctx = EvaluationContext::new();
//! ctx.set("retailPrice", 100.0);
//! ctx.set("costPrice", 40.0);
//! assert_eq!(evaluate(&ast, &ctx), FormulaValue::Number(60.0));
//! ```

pub mod ast;
pub mod error;
pub mod evaluator;
pub mod functions;
pub mod parser;

pub use ast::{BinaryOperator, FormulaExpr, UnaryOperator};
pub use error::{FormulaError, FormulaResult};
pub use evaluator::{evaluate, EvaluationContext, FormulaValue};
pub use nlsheet_core::CellError;
pub use parser::parse_formula;
