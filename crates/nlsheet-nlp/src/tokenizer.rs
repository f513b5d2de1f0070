//! Vietnamese-aware tokenizer
//!
//! Splits raw text into words, classifies each word against the lexicon,
//! then merges 3- and 2-word windows that spell a multi-word alias
//! (`"giá bán"` → one `retailPrice` field token).

use crate::lexicon;
use crate::normalize::normalize_text;
use crate::token::{ComparisonOp, Operation, Token, TokenKind};
use lazy_regex::{lazy_regex, Lazy, Regex};
use serde::Serialize;
use tracing::debug;
use unicode_normalization::UnicodeNormalization;

/// Word splitter: A1 ranges, multi-character comparison symbols, word runs
/// with inner `.`/`,` (so `1.000.000` and `10,5` stay whole), and single
/// punctuation or symbol characters.
static WORD: Lazy<Regex> = lazy_regex!(
    r"[A-Za-z]+[0-9]+:[A-Za-z]+[0-9]+|>=|<=|<>|!=|==|[\p{L}\p{M}\p{N}_]+(?:[.,][\p{L}\p{M}\p{N}_]+)*%?|[^\s\p{L}\p{M}\p{N}_]"
);

static NUMERIC_LITERAL: Lazy<Regex> = lazy_regex!(r"^([0-9]+(?:[.,][0-9]+)*)(%|k|tr)?$");

static RANGE: Lazy<Regex> = lazy_regex!(r"^([A-Za-z]+[0-9]+):([A-Za-z]+[0-9]+)$");

/// Longest phrase the merge pass will join
const MAX_PHRASE_WORDS: usize = 3;

/// Output of [`Tokenizer::tokenize`]
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenizeResult {
    pub tokens: Vec<Token>,
    pub original_text: String,
    pub normalized_text: String,
}

/// Stateless tokenizer; all dictionaries are static
#[derive(Debug, Clone, Copy, Default)]
pub struct Tokenizer;

impl Tokenizer {
    pub fn new() -> Self {
        Tokenizer
    }

    /// Tokenize `text`. Never fails; unknown words become `Text` tokens.
    pub fn tokenize(&self, text: &str) -> TokenizeResult {
        let words: Vec<Token> = WORD
            .find_iter(text)
            .map(|m| classify(m.as_str(), m.start()))
            .collect();

        let tokens = merge_phrases(text, words);
        debug!(tokens = tokens.len(), "tokenized input");

        TokenizeResult {
            tokens,
            original_text: text.to_string(),
            normalized_text: normalize_text(text),
        }
    }
}

fn classify(word: &str, position: usize) -> Token {
    let normalized = normalize_text(word);

    let kind = if let Some(kind) = classify_number(word) {
        kind
    } else if let Some(op) = lexicon::lookup_operation(&normalized) {
        TokenKind::Operation(op)
    } else if let Some(canonical) = lexicon::lookup_field(&normalized) {
        TokenKind::Field { canonical }
    } else if let Some(op) = lexicon::lookup_comparison(&normalized) {
        TokenKind::Comparison(op)
    } else if let Some(op) = lexicon::lookup_logical(&normalized) {
        TokenKind::Logical(op)
    } else if let Some(caps) = RANGE.captures(word) {
        TokenKind::Range {
            start: caps[1].to_uppercase(),
            end: caps[2].to_uppercase(),
        }
    } else if word.chars().all(|c| !c.is_alphanumeric() && !c.is_whitespace()) {
        TokenKind::Punctuation
    } else {
        TokenKind::Text
    };

    Token {
        kind,
        value: word.to_string(),
        normalized,
        position,
        length: word.len(),
    }
}

fn classify_number(word: &str) -> Option<TokenKind> {
    let lower: String = word.nfc().collect::<String>().to_lowercase();

    if let Some(value) = lexicon::lookup_number_word(&lower) {
        return Some(TokenKind::Number {
            value,
            percent: false,
        });
    }

    let caps = NUMERIC_LITERAL.captures(&lower)?;
    let mut value = parse_numeric_literal(&caps[1])?;
    let suffix = caps.get(2).map(|m| m.as_str());
    match suffix {
        Some("k") => value *= 1_000.0,
        Some("tr") => value *= 1_000_000.0,
        _ => {}
    }

    Some(TokenKind::Number {
        value,
        percent: suffix == Some("%"),
    })
}

/// Parse digits with `.`/`,` separators.
///
/// When both separators appear the last one is the decimal point. A single
/// separator kind that repeats is a thousands separator. A lone separator
/// followed by exactly three digits is a thousands separator (`1.000`,
/// `1,000`); otherwise it is the decimal point (`10.5`, `10,5`).
pub fn parse_numeric_literal(literal: &str) -> Option<f64> {
    let dots = literal.matches('.').count();
    let commas = literal.matches(',').count();

    let canonical = match (dots, commas) {
        (0, 0) => literal.to_string(),
        (_, 0) | (0, _) => {
            let sep = if dots > 0 { '.' } else { ',' };
            let (_, tail) = literal.rsplit_once(sep)?;
            if dots + commas > 1 || tail.len() == 3 {
                literal.replace(sep, "")
            } else {
                literal.replace(sep, ".")
            }
        }
        _ => {
            let last_dot = literal.rfind('.')?;
            let last_comma = literal.rfind(',')?;
            let (decimal, thousands) = if last_dot > last_comma {
                ('.', ',')
            } else {
                (',', '.')
            };
            literal.replace(thousands, "").replace(decimal, ".")
        }
    };

    canonical.parse().ok()
}

/// Greedy left-to-right merge of multi-word aliases. Longer windows win; a
/// merged window is consumed and never revisited.
fn merge_phrases(text: &str, words: Vec<Token>) -> Vec<Token> {
    let mut merged = Vec::with_capacity(words.len());
    let mut i = 0;

    while i < words.len() {
        let phrase = (2..=MAX_PHRASE_WORDS)
            .rev()
            .filter(|size| i + size <= words.len())
            .find_map(|size| {
                let window = &words[i..i + size];
                let key = window
                    .iter()
                    .map(|t| t.normalized.as_str())
                    .collect::<Vec<_>>()
                    .join(" ");
                lexicon::lookup_phrase(&key).map(|kind| (size, key, kind))
            });

        match phrase {
            Some((size, normalized, kind)) => {
                let start = words[i].position;
                let end = words[i + size - 1].end();
                merged.push(Token {
                    kind,
                    value: text[start..end].to_string(),
                    normalized,
                    position: start,
                    length: end - start,
                });
                i += size;
            }
            None => {
                merged.push(words[i].clone());
                i += 1;
            }
        }
    }

    merged
}

/// Canonical field names in order of appearance (duplicates kept)
pub fn fields(tokens: &[Token]) -> Vec<&'static str> {
    tokens.iter().filter_map(Token::field).collect()
}

pub fn operations(tokens: &[Token]) -> Vec<Operation> {
    tokens
        .iter()
        .filter_map(|t| match t.kind {
            TokenKind::Operation(op) => Some(op),
            _ => None,
        })
        .collect()
}

/// Numeric values in order; `10%` yields `10`
pub fn numbers(tokens: &[Token]) -> Vec<f64> {
    tokens
        .iter()
        .filter_map(|t| match t.kind {
            TokenKind::Number { value, .. } => Some(value),
            _ => None,
        })
        .collect()
}

/// Ranges in `A1:B10` form
pub fn ranges(tokens: &[Token]) -> Vec<String> {
    tokens
        .iter()
        .filter_map(|t| match &t.kind {
            TokenKind::Range { start, end } => Some(format!("{}:{}", start, end)),
            _ => None,
        })
        .collect()
}

pub fn comparisons(tokens: &[Token]) -> Vec<ComparisonOp> {
    tokens
        .iter()
        .filter_map(|t| match t.kind {
            TokenKind::Comparison(op) => Some(op),
            _ => None,
        })
        .collect()
}
