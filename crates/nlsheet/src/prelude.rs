//! Prelude module - common imports for nlsheet users
//!
//! ```rust
//! use nlsheet::prelude::*;
//! ```

pub use crate::{
    // Natural-language pipeline
    BuildOptions,
    BuiltFormula,
    ConversionResult,
    ConvertOptions,
    DetectedIntent,
    FormulaBuilder,
    FormulaConverter,
    IntentDetector,
    IntentType,
    Tokenizer,

    // Formula types
    evaluate,
    parse_formula,
    CellError,
    EvaluationContext,
    FormulaValue,

    // Rows
    create_context,
    is_formula,
    process_row,
    process_rows,
    Row,
};
