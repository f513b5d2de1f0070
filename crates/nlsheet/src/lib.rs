//! # nlsheet
//!
//! Natural-language formulas for spreadsheet data.
//!
//! nlsheet turns Vietnamese requests such as *"tính margin từ giá bán và giá
//! vốn"* into spreadsheet formulas, and evaluates those formulas against
//! rows of product data.
//!
//! ## Features
//!
//! - Diacritic-insensitive Vietnamese tokenizer with field and keyword
//!   dictionaries
//! - Pattern-based intent detection with confidence scores
//! - Template-driven formula building with syntax checks
//! - Formula parser and evaluator with Excel-style error values
//! - Row processing: formula columns resolved against the row's own values
//!
//! ## Example
//!
//! ```rust
//! use nlsheet::prelude::*;
//!
//! let converter = FormulaConverter::new();
//! let result = converter.convert("tính margin từ giá bán và giá vốn", &ConvertOptions::default());
//! let formula = result.formula.unwrap();
//!
//! let mut row = Row::new();
//! row.insert("Giá bán".into(), "200.000đ".into());
//! row.insert("Giá vốn".into(), 150000.0.into());
//! row.insert("margin".into(), formula.into());
//!
//! let out = process_row(&row, &EvaluationContext::new());
//! assert_eq!(out["margin"], FormulaValue::Number(25.0));
//! ```

pub mod prelude;
pub mod row;

pub use row::{create_context, is_formula, process_row, process_rows, Row};

// Re-export core types
pub use nlsheet_core::{CellAddress, CellError, CellRange, Error, Result, MAX_COLS, MAX_ROWS};

// Re-export formula types
pub use nlsheet_formula::{
    evaluate, parse_formula, EvaluationContext, FormulaError, FormulaExpr, FormulaResult,
    FormulaValue,
};

// Re-export the natural-language pipeline
pub use nlsheet_nlp::{
    BuildOptions, BuiltFormula, ConversionResult, ConvertCheck, ConvertOptions, DetectedIntent,
    Evaluation, FormulaBuilder, FormulaConverter, IntentDetector, IntentType, NlpError,
    Suggestion, TemplateInfo, Token, TokenKind, TokenType, TokenizeResult, Tokenizer,
};
