//! # nlsheet-nlp
//!
//! Translates Vietnamese (and some English) requests into spreadsheet
//! formulas.
//!
//! The pipeline has four stages:
//! - [`tokenizer`]: diacritic-insensitive tokenization with field,
//!   operation, number and range recognition
//! - [`intent`]: scoring against a catalog of intent patterns, with a
//!   fallback that composes a formula directly from the tokens
//! - [`builder`]: template filling and syntax checks
//! - [`converter`]: the end-to-end entry point, optionally evaluating the
//!   result against sample values
//!
//! ## Example
//!
//! ```rust
//! use nlsheet_nlp::{ConvertOptions, FormulaConverter};
//!
//! let converter = FormulaConverter::new();
//! let result = converter.convert("tính margin từ giá bán và giá vốn", &ConvertOptions::default());
//! assert!(result.success);
//! assert_eq!(result.formula.as_deref(), Some("=(retailPrice-costPrice)/retailPrice*100"));
//! ```

pub mod builder;
pub mod converter;
pub mod error;
pub mod intent;
pub mod lexicon;
pub mod normalize;
pub mod scoring;
pub mod template;
pub mod token;
pub mod tokenizer;

pub use builder::{BuildOptions, BuiltFormula, FormulaBuilder};
pub use converter::{
    ConversionResult, ConvertCheck, ConvertOptions, Evaluation, FormulaConverter, Suggestion,
    TemplateInfo,
};
pub use error::{NlpError, Result};
pub use intent::{DetectedIntent, IntentDetector, IntentType};
pub use token::{ComparisonOp, LogicalOp, Operation, Token, TokenKind, TokenType};
pub use tokenizer::{TokenizeResult, Tokenizer};
