//! Formula parser
//!
//! A recursive descent parser for spreadsheet formulas with standard operator
//! precedence. Besides A1 cell references it accepts bare identifiers such as
//! `retailPrice`, which the evaluator resolves against its context.

use crate::ast::{BinaryOperator, FormulaExpr, UnaryOperator};
use crate::error::{FormulaError, FormulaResult};
use nlsheet_core::{CellAddress, CellError, CellRange};

/// Parse a formula string into an AST
///
/// The leading `=` is optional: `"1+2"` and `"=1+2"` parse identically.
///
/// # Example
/// ```rust
/// use nlsheet_formula::parse_formula;
///
/// let ast = parse_formula("=1+2").unwrap();
/// let ast = parse_formula("=SUM(A1:A10)").unwrap();
/// let ast = parse_formula("quantity*price").unwrap();
/// assert!(parse_formula("=(1+2").is_err());
/// ```
pub fn parse_formula(formula: &str) -> FormulaResult<FormulaExpr> {
    let formula = formula.trim();
    let body = formula.strip_prefix('=').unwrap_or(formula);

    if body.trim().is_empty() {
        return Err(FormulaError::Parse("Empty formula".into()));
    }

    let mut parser = FormulaParser::new(body);
    let expr = parser.parse_expression()?;

    if !matches!(parser.current_token(), Token::Eof) {
        return Err(FormulaError::Parse(format!(
            "Unexpected {:?} after expression",
            parser.current_token()
        )));
    }

    Ok(expr)
}

/// Token types
#[derive(Debug, Clone, PartialEq)]
enum Token {
    // Literals
    Number(f64),
    String(String),
    Boolean(bool),
    Error(CellError),

    // Identifiers and references
    Identifier(String),
    CellRef(CellAddress),

    // Operators
    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    Percent,
    Ampersand,
    Equal,
    NotEqual,
    LessThan,
    LessEqual,
    GreaterThan,
    GreaterEqual,
    Colon,
    Comma,
    Semicolon,

    // Delimiters
    LeftParen,
    RightParen,
    LeftBrace,
    RightBrace,

    /// A character or literal the scanner cannot make sense of
    Invalid(String),

    Eof,
}

/// Formula parser
/// Deepest parenthesis, argument, or sign nesting accepted
const MAX_NESTING_DEPTH: usize = 128;

struct FormulaParser<'a> {
    input: &'a str,
    pos: usize,
    current_token: Token,
    depth: usize,
}

impl<'a> FormulaParser<'a> {
    fn new(input: &'a str) -> Self {
        let mut parser = Self {
            input,
            pos: 0,
            current_token: Token::Eof,
            depth: 0,
        };
        parser.advance_token();
        parser
    }

    // === Token scanning ===

    fn advance_token(&mut self) {
        self.current_token = self.scan_token();
    }

    fn scan_token(&mut self) -> Token {
        self.skip_whitespace();

        let Some(c) = self.peek_char() else {
            return Token::Eof;
        };

        let single = match c {
            '+' => Some(Token::Plus),
            '-' => Some(Token::Minus),
            '*' => Some(Token::Star),
            '/' => Some(Token::Slash),
            '^' => Some(Token::Caret),
            '%' => Some(Token::Percent),
            '&' => Some(Token::Ampersand),
            ':' => Some(Token::Colon),
            ',' => Some(Token::Comma),
            ';' => Some(Token::Semicolon),
            '(' => Some(Token::LeftParen),
            ')' => Some(Token::RightParen),
            '{' => Some(Token::LeftBrace),
            '}' => Some(Token::RightBrace),
            '=' => Some(Token::Equal),
            _ => None,
        };
        if let Some(token) = single {
            self.advance();
            return token;
        }

        if c == '<' {
            self.advance();
            return match self.peek_char() {
                Some('=') => {
                    self.advance();
                    Token::LessEqual
                }
                Some('>') => {
                    self.advance();
                    Token::NotEqual
                }
                _ => Token::LessThan,
            };
        }

        if c == '>' {
            self.advance();
            if self.peek_char() == Some('=') {
                self.advance();
                return Token::GreaterEqual;
            }
            return Token::GreaterThan;
        }

        if c == '"' {
            return self.scan_string();
        }

        if c.is_ascii_digit() || (c == '.' && self.peek_char_at(1).is_some_and(|c| c.is_ascii_digit()))
        {
            return self.scan_number();
        }

        if c == '#' {
            return self.scan_error();
        }

        if c.is_alphabetic() || c == '_' || c == '$' {
            return self.scan_identifier_or_ref();
        }

        self.advance();
        Token::Invalid(c.to_string())
    }

    fn scan_string(&mut self) -> Token {
        self.advance(); // opening quote

        let mut s = String::new();
        loop {
            match self.peek_char() {
                Some('"') if self.peek_char_at(1) == Some('"') => {
                    s.push('"');
                    self.advance();
                    self.advance();
                }
                Some('"') => {
                    self.advance();
                    return Token::String(s);
                }
                Some(c) => {
                    s.push(c);
                    self.advance();
                }
                None => return Token::Invalid(format!("unterminated string \"{}", s)),
            }
        }
    }

    fn scan_number(&mut self) -> Token {
        let start = self.pos;

        self.skip_digits();
        if self.peek_char() == Some('.') {
            self.advance();
            self.skip_digits();
        }

        // Exponent only when digits follow, so `2E` stays a number and a name
        if self.peek_char().is_some_and(|c| c == 'e' || c == 'E') {
            let signed = self.peek_char_at(1).is_some_and(|c| c == '+' || c == '-');
            let digit_at = if signed { 2 } else { 1 };
            if self.peek_char_at(digit_at).is_some_and(|c| c.is_ascii_digit()) {
                self.advance();
                if signed {
                    self.advance();
                }
                self.skip_digits();
            }
        }

        let text = &self.input[start..self.pos];
        match text.parse::<f64>() {
            Ok(n) => Token::Number(n),
            Err(_) => Token::Invalid(text.to_string()),
        }
    }

    fn scan_error(&mut self) -> Token {
        let start = self.pos;
        self.advance();
        while self
            .peek_char()
            .is_some_and(|c| c.is_ascii_alphanumeric() || matches!(c, '!' | '/' | '?'))
        {
            self.advance();
        }
        let text = &self.input[start..self.pos];
        match CellError::from_str(text) {
            Some(err) => Token::Error(err),
            None => Token::Invalid(text.to_string()),
        }
    }

    fn scan_identifier_or_ref(&mut self) -> Token {
        let start = self.pos;

        while self
            .peek_char()
            .is_some_and(|c| c.is_alphanumeric() || c == '_' || c == '$' || c == '.')
        {
            self.advance();
        }

        let text = &self.input[start..self.pos];
        let is_call = self.peek_char_after_whitespace() == Some('(');

        // TRUE(), LOG10() and friends are function calls, not literals or cells
        if !is_call {
            if text.eq_ignore_ascii_case("TRUE") {
                return Token::Boolean(true);
            }
            if text.eq_ignore_ascii_case("FALSE") {
                return Token::Boolean(false);
            }
            if Self::looks_like_cell_reference(text) {
                if let Ok(address) = CellAddress::parse(text) {
                    return Token::CellRef(address);
                }
            }
        }

        Token::Identifier(text.to_string())
    }

    /// `[$]LETTERS[$]DIGITS` with ASCII letters only
    fn looks_like_cell_reference(text: &str) -> bool {
        let body = text.strip_prefix('$').unwrap_or(text);
        let letters = body.chars().take_while(|c| c.is_ascii_alphabetic()).count();
        if letters == 0 {
            return false;
        }
        let rest = &body[letters..];
        let rest = rest.strip_prefix('$').unwrap_or(rest);
        !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit())
    }

    // === Helper methods ===

    fn peek_char(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn peek_char_at(&self, offset: usize) -> Option<char> {
        self.input[self.pos..].chars().nth(offset)
    }

    fn peek_char_after_whitespace(&self) -> Option<char> {
        self.input[self.pos..].chars().find(|c| !c.is_whitespace())
    }

    fn advance(&mut self) {
        if let Some(c) = self.peek_char() {
            self.pos += c.len_utf8();
        }
    }

    fn skip_digits(&mut self) {
        while self.peek_char().is_some_and(|c| c.is_ascii_digit()) {
            self.advance();
        }
    }

    fn skip_whitespace(&mut self) {
        while self.peek_char().is_some_and(|c| c.is_whitespace()) {
            self.advance();
        }
    }

    fn current_token(&self) -> &Token {
        &self.current_token
    }

    fn consume(&mut self) -> Token {
        let token = std::mem::replace(&mut self.current_token, Token::Eof);
        self.advance_token();
        token
    }

    fn expect(&mut self, expected: &Token) -> FormulaResult<()> {
        if self.current_token() == expected {
            self.consume();
            Ok(())
        } else {
            Err(FormulaError::Parse(format!(
                "Expected {:?}, got {:?}",
                expected,
                self.current_token()
            )))
        }
    }

    // === Expression parsing with precedence ===
    // Precedence (lowest to highest):
    // 1. Comparison: =, <>, <, <=, >, >=
    // 2. Concatenation: &
    // 3. Addition/Subtraction: +, -
    // 4. Multiplication/Division: *, /
    // 5. Exponentiation: ^
    // 6. Unary: -, +, postfix %
    // 7. Range: :
    // 8. Primary: literals, references, function calls, parentheses

    fn parse_expression(&mut self) -> FormulaResult<FormulaExpr> {
        self.parse_comparison()
    }

    fn parse_binary_level(
        &mut self,
        next: fn(&mut Self) -> FormulaResult<FormulaExpr>,
        operator_for: fn(&Token) -> Option<BinaryOperator>,
    ) -> FormulaResult<FormulaExpr> {
        let mut left = next(self)?;

        while let Some(op) = operator_for(self.current_token()) {
            self.consume();
            let right = next(self)?;
            left = FormulaExpr::BinaryOp {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }

        Ok(left)
    }

    fn parse_comparison(&mut self) -> FormulaResult<FormulaExpr> {
        self.parse_binary_level(Self::parse_concatenation, |token| match token {
            Token::Equal => Some(BinaryOperator::Equal),
            Token::NotEqual => Some(BinaryOperator::NotEqual),
            Token::LessThan => Some(BinaryOperator::LessThan),
            Token::LessEqual => Some(BinaryOperator::LessEqual),
            Token::GreaterThan => Some(BinaryOperator::GreaterThan),
            Token::GreaterEqual => Some(BinaryOperator::GreaterEqual),
            _ => None,
        })
    }

    fn parse_concatenation(&mut self) -> FormulaResult<FormulaExpr> {
        self.parse_binary_level(Self::parse_additive, |token| match token {
            Token::Ampersand => Some(BinaryOperator::Concat),
            _ => None,
        })
    }

    fn parse_additive(&mut self) -> FormulaResult<FormulaExpr> {
        self.parse_binary_level(Self::parse_multiplicative, |token| match token {
            Token::Plus => Some(BinaryOperator::Add),
            Token::Minus => Some(BinaryOperator::Subtract),
            _ => None,
        })
    }

    fn parse_multiplicative(&mut self) -> FormulaResult<FormulaExpr> {
        self.parse_binary_level(Self::parse_exponent, |token| match token {
            Token::Star => Some(BinaryOperator::Multiply),
            Token::Slash => Some(BinaryOperator::Divide),
            _ => None,
        })
    }

    fn parse_exponent(&mut self) -> FormulaResult<FormulaExpr> {
        let left = self.parse_unary()?;

        if matches!(self.current_token(), Token::Caret) {
            self.consume();
            let right = self.nested(Self::parse_exponent)?; // right associative
            return Ok(FormulaExpr::BinaryOp {
                op: BinaryOperator::Power,
                left: Box::new(left),
                right: Box::new(right),
            });
        }

        Ok(left)
    }

    /// Run `parse` one nesting level deeper
    fn nested(
        &mut self,
        parse: fn(&mut Self) -> FormulaResult<FormulaExpr>,
    ) -> FormulaResult<FormulaExpr> {
        if self.depth >= MAX_NESTING_DEPTH {
            return Err(FormulaError::Parse("formula nested too deeply".into()));
        }
        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    // Parentheses, arguments, and array elements all recurse through here
    fn parse_unary(&mut self) -> FormulaResult<FormulaExpr> {
        self.nested(Self::parse_unary_inner)
    }

    fn parse_unary_inner(&mut self) -> FormulaResult<FormulaExpr> {
        match self.current_token() {
            Token::Minus => {
                self.consume();
                let operand = self.parse_unary()?;
                return Ok(FormulaExpr::UnaryOp {
                    op: UnaryOperator::Negate,
                    operand: Box::new(operand),
                });
            }
            Token::Plus => {
                self.consume();
                return self.parse_unary();
            }
            _ => {}
        }

        let mut expr = self.parse_range()?;

        while matches!(self.current_token(), Token::Percent) {
            self.consume();
            expr = FormulaExpr::UnaryOp {
                op: UnaryOperator::Percent,
                operand: Box::new(expr),
            };
        }

        Ok(expr)
    }

    fn parse_range(&mut self) -> FormulaResult<FormulaExpr> {
        let left = self.parse_primary()?;

        if !matches!(self.current_token(), Token::Colon) {
            return Ok(left);
        }
        self.consume();
        let right = self.parse_primary()?;

        if let (FormulaExpr::CellRef(start), FormulaExpr::CellRef(end)) = (&left, &right) {
            return Ok(FormulaExpr::RangeRef(CellRange::new(*start, *end)));
        }

        Ok(FormulaExpr::BinaryOp {
            op: BinaryOperator::Range,
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    fn parse_primary(&mut self) -> FormulaResult<FormulaExpr> {
        match self.consume() {
            Token::Number(n) => Ok(FormulaExpr::Number(n)),
            Token::String(s) => Ok(FormulaExpr::String(s)),
            Token::Boolean(b) => Ok(FormulaExpr::Boolean(b)),
            Token::Error(e) => Ok(FormulaExpr::Error(e)),
            Token::CellRef(address) => Ok(FormulaExpr::CellRef(address)),

            Token::LeftParen => {
                let expr = self.parse_expression()?;
                self.expect(&Token::RightParen)?;
                Ok(expr)
            }

            Token::LeftBrace => self.parse_array(),

            Token::Identifier(name) => {
                if matches!(self.current_token(), Token::LeftParen) {
                    self.parse_function_call(name)
                } else {
                    Ok(FormulaExpr::NameRef(name))
                }
            }

            Token::Invalid(text) => Err(FormulaError::Parse(format!(
                "Unexpected character(s) '{}'",
                text
            ))),
            Token::Eof => Err(FormulaError::Parse("Unexpected end of formula".into())),
            other => Err(FormulaError::Parse(format!("Unexpected token: {:?}", other))),
        }
    }

    /// Parses the rest of `{1,2;3,4}` after the opening brace
    fn parse_array(&mut self) -> FormulaResult<FormulaExpr> {
        let mut rows = Vec::new();
        let mut current_row = Vec::new();

        if !matches!(self.current_token(), Token::RightBrace) {
            current_row.push(self.parse_expression()?);

            loop {
                match self.current_token() {
                    Token::Comma => {
                        self.consume();
                        current_row.push(self.parse_expression()?);
                    }
                    Token::Semicolon => {
                        self.consume();
                        rows.push(std::mem::take(&mut current_row));
                        current_row.push(self.parse_expression()?);
                    }
                    Token::RightBrace => break,
                    _ => {
                        return Err(FormulaError::Parse(
                            "Expected ',' ';' or '}' in array".into(),
                        ))
                    }
                }
            }
        }

        if !current_row.is_empty() {
            rows.push(current_row);
        }

        self.expect(&Token::RightBrace)?;
        Ok(FormulaExpr::Array(rows))
    }

    fn parse_function_call(&mut self, name: String) -> FormulaResult<FormulaExpr> {
        self.expect(&Token::LeftParen)?;

        let mut args = Vec::new();

        if !matches!(self.current_token(), Token::RightParen) {
            args.push(self.parse_expression()?);

            while matches!(self.current_token(), Token::Comma) {
                self.consume();
                args.push(self.parse_expression()?);
            }
        }

        self.expect(&Token::RightParen)?;

        Ok(FormulaExpr::Function {
            name: name.to_uppercase(),
            args,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_number() {
        assert_eq!(parse_formula("=42").unwrap(), FormulaExpr::Number(42.0));
        assert_eq!(parse_formula("=3.25").unwrap(), FormulaExpr::Number(3.25));
        assert_eq!(parse_formula("=1e3").unwrap(), FormulaExpr::Number(1000.0));
    }

    #[test]
    fn test_leading_equals_is_optional() {
        assert_eq!(parse_formula("1+2").unwrap(), parse_formula("=1+2").unwrap());
        assert_eq!(
            parse_formula("  =quantity*price  ").unwrap(),
            parse_formula("quantity*price").unwrap()
        );
    }

    #[test]
    fn test_parse_string() {
        assert_eq!(
            parse_formula("=\"Hello \"\"World\"\"\"").unwrap(),
            FormulaExpr::String("Hello \"World\"".into())
        );
    }

    #[test]
    fn test_parse_precedence() {
        let ast = parse_formula("=1+2*3").unwrap();
        if let FormulaExpr::BinaryOp { op, left, right } = ast {
            assert_eq!(op, BinaryOperator::Add);
            assert_eq!(*left, FormulaExpr::Number(1.0));
            assert!(matches!(
                *right,
                FormulaExpr::BinaryOp {
                    op: BinaryOperator::Multiply,
                    ..
                }
            ));
        } else {
            panic!("Expected BinaryOp");
        }
    }

    #[test]
    fn test_parse_identifiers_and_cells() {
        let ast = parse_formula("=(retailPrice-costPrice)/retailPrice*100").unwrap();
        if let FormulaExpr::BinaryOp { op, right, .. } = ast {
            assert_eq!(op, BinaryOperator::Multiply);
            assert_eq!(*right, FormulaExpr::Number(100.0));
        } else {
            panic!("Expected BinaryOp");
        }

        assert_eq!(
            parse_formula("=$B$2").unwrap(),
            FormulaExpr::CellRef(CellAddress::parse("$B$2").unwrap())
        );

        // Letters+digits beyond the column limit are names, not cells
        assert_eq!(
            parse_formula("=total2024").unwrap(),
            FormulaExpr::NameRef("total2024".into())
        );
    }

    #[test]
    fn test_deep_nesting_is_rejected() {
        let deep = format!("={}1{}", "(".repeat(100_000), ")".repeat(100_000));
        match parse_formula(&deep) {
            Err(FormulaError::Parse(msg)) => assert_eq!(msg, "formula nested too deeply"),
            other => panic!("Expected parse error, got {:?}", other),
        }

        let signs = format!("={}1", "-".repeat(100_000));
        assert!(matches!(parse_formula(&signs), Err(FormulaError::Parse(_))));

        let powers = format!("=2{}", "^2".repeat(100_000));
        assert!(matches!(parse_formula(&powers), Err(FormulaError::Parse(_))));

        let signs = format!("={}1", "+".repeat(100_000));
        assert!(matches!(parse_formula(&signs), Err(FormulaError::Parse(_))));

        let calls = format!("={}1{}", "ABS(".repeat(10_000), ")".repeat(10_000));
        assert!(matches!(parse_formula(&calls), Err(FormulaError::Parse(_))));

        let moderate = format!("={}1{}", "(".repeat(50), ")".repeat(50));
        assert_eq!(parse_formula(&moderate).unwrap(), FormulaExpr::Number(1.0));
    }

    #[test]
    fn test_parse_vietnamese_identifier() {
        if let FormulaExpr::BinaryOp { left, .. } = parse_formula("=giá_bán*2").unwrap() {
            assert_eq!(*left, FormulaExpr::NameRef("giá_bán".into()));
        } else {
            panic!("Expected BinaryOp");
        }
    }

    #[test]
    fn test_parse_range_reference() {
        let ast = parse_formula("=A1:B10").unwrap();
        assert_eq!(ast, FormulaExpr::RangeRef(CellRange::parse("A1:B10").unwrap()));

        let ast = parse_formula("=SUM(price:price)").unwrap();
        if let FormulaExpr::Function { args, .. } = ast {
            assert!(matches!(
                args[0],
                FormulaExpr::BinaryOp {
                    op: BinaryOperator::Range,
                    ..
                }
            ));
        } else {
            panic!("Expected Function");
        }
    }

    #[test]
    fn test_parse_function() {
        let ast = parse_formula("=if(A1>0,SUM(B1:B10),0)").unwrap();
        if let FormulaExpr::Function { name, args } = ast {
            assert_eq!(name, "IF");
            assert_eq!(args.len(), 3);
        } else {
            panic!("Expected Function");
        }
    }

    #[test]
    fn test_parse_array() {
        let ast = parse_formula("={1,2;3,4}").unwrap();
        if let FormulaExpr::Array(rows) = ast {
            assert_eq!(rows.len(), 2);
            assert_eq!(rows[1].len(), 2);
        } else {
            panic!("Expected Array");
        }
    }

    #[test]
    fn test_parse_error_literal() {
        assert_eq!(
            parse_formula("=#DIV/0!").unwrap(),
            FormulaExpr::Error(CellError::Div0)
        );
    }

    #[test]
    fn test_malformed_formulas_are_errors() {
        for text in ["", "=", "=(1+2", "=1+", "=1 @ 2", "=\"open", "=SUM(1,", "=1)", "=#BOGUS"] {
            assert!(
                matches!(parse_formula(text), Err(FormulaError::Parse(_))),
                "{text:?} should not parse"
            );
        }
    }
}
