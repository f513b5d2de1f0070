//! Token types produced by the tokenizer

use serde::Serialize;
use std::fmt;

/// An arithmetic or aggregate operation named in the text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Operation {
    Sum,
    Average,
    Add,
    Subtract,
    Multiply,
    Divide,
    Min,
    Max,
    Count,
    Percent,
    Round,
}

impl Operation {
    /// Upper-case name, also the spreadsheet function name where one exists
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Sum => "SUM",
            Operation::Average => "AVERAGE",
            Operation::Add => "ADD",
            Operation::Subtract => "SUBTRACT",
            Operation::Multiply => "MULTIPLY",
            Operation::Divide => "DIVIDE",
            Operation::Min => "MIN",
            Operation::Max => "MAX",
            Operation::Count => "COUNT",
            Operation::Percent => "PERCENT",
            Operation::Round => "ROUND",
        }
    }

    /// Infix operator for the four arithmetic operations
    pub fn infix(&self) -> Option<char> {
        match self {
            Operation::Add => Some('+'),
            Operation::Subtract => Some('-'),
            Operation::Multiply => Some('*'),
            Operation::Divide => Some('/'),
            _ => None,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A comparison operator, serialized as its formula symbol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ComparisonOp {
    #[serde(rename = ">")]
    Greater,
    #[serde(rename = ">=")]
    GreaterEqual,
    #[serde(rename = "<")]
    Less,
    #[serde(rename = "<=")]
    LessEqual,
    #[serde(rename = "=")]
    Equal,
    #[serde(rename = "<>")]
    NotEqual,
}

impl ComparisonOp {
    /// Formula symbol
    pub fn symbol(&self) -> &'static str {
        match self {
            ComparisonOp::Greater => ">",
            ComparisonOp::GreaterEqual => ">=",
            ComparisonOp::Less => "<",
            ComparisonOp::LessEqual => "<=",
            ComparisonOp::Equal => "=",
            ComparisonOp::NotEqual => "<>",
        }
    }
}

impl fmt::Display for ComparisonOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LogicalOp {
    And,
    Or,
    Not,
}

/// Classification of a token together with its payload
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TokenKind {
    Operation(Operation),
    Field {
        canonical: &'static str,
    },
    Number {
        value: f64,
        percent: bool,
    },
    Comparison(ComparisonOp),
    Logical(LogicalOp),
    /// An A1 range such as `A1:B10`; both ends upper-cased
    Range {
        start: String,
        end: String,
    },
    Text,
    Punctuation,
}

/// Payload-free projection of [`TokenKind`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TokenType {
    Operation,
    Field,
    Number,
    Comparison,
    Logical,
    Range,
    Text,
    Punctuation,
}

/// A classified slice of the input text
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Token {
    pub kind: TokenKind,
    /// The original slice, diacritics and case preserved
    pub value: String,
    /// Folded form used for dictionary matching
    pub normalized: String,
    /// Byte offset into the original text
    pub position: usize,
    /// Byte length of `value`
    pub length: usize,
}

impl Token {
    pub fn token_type(&self) -> TokenType {
        match self.kind {
            TokenKind::Operation(_) => TokenType::Operation,
            TokenKind::Field { .. } => TokenType::Field,
            TokenKind::Number { .. } => TokenType::Number,
            TokenKind::Comparison(_) => TokenType::Comparison,
            TokenKind::Logical(_) => TokenType::Logical,
            TokenKind::Range { .. } => TokenType::Range,
            TokenKind::Text => TokenType::Text,
            TokenKind::Punctuation => TokenType::Punctuation,
        }
    }

    /// Byte offset one past the end of the token
    pub fn end(&self) -> usize {
        self.position + self.length
    }

    /// Canonical field name if this is a field token
    pub fn field(&self) -> Option<&'static str> {
        match self.kind {
            TokenKind::Field { canonical } => Some(canonical),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_serializes_with_tagged_kind() {
        let token = Token {
            kind: TokenKind::Field {
                canonical: "retailPrice",
            },
            value: "giá bán".into(),
            normalized: "gia ban".into(),
            position: 0,
            length: "giá bán".len(),
        };
        let json = serde_json::to_value(&token).unwrap();
        assert_eq!(json["kind"]["type"], "FIELD");
        assert_eq!(json["kind"]["payload"]["canonical"], "retailPrice");
        assert_eq!(json["length"], 9);
    }

    #[test]
    fn test_comparison_serializes_as_symbol() {
        assert_eq!(
            serde_json::to_string(&ComparisonOp::GreaterEqual).unwrap(),
            "\">=\""
        );
        assert_eq!(serde_json::to_string(&Operation::Sum).unwrap(), "\"SUM\"");
    }
}
