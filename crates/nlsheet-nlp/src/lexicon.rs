//! Alias and keyword dictionaries
//!
//! Keys are in normalized form (see [`crate::normalize::normalize_text`]):
//! no diacritics, lower case, single spaces. Multi-word keys are matched by
//! the tokenizer's merge pass over 2- and 3-word windows.

use crate::token::{ComparisonOp, LogicalOp, Operation, TokenKind};
use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Canonical field names known to the pipeline
pub const CANONICAL_FIELDS: &[&str] = &[
    "retailPrice",
    "costPrice",
    "quantity",
    "margin",
    "profit",
    "revenue",
    "discount",
    "tax",
    "stock",
    "sku",
    "productName",
    "category",
];

/// Spelling variants per canonical field
pub const FIELD_ALIASES: &[(&str, &[&str])] = &[
    (
        "retailPrice",
        &[
            "gia", "gia ban", "gia ban le", "gia le", "don gia", "retail", "retail price",
            "price", "selling price", "sale price",
        ],
    ),
    (
        "costPrice",
        &[
            "von", "gia von", "gia nhap", "gia goc", "gia mua", "cost", "cost price",
            "purchase price",
        ],
    ),
    (
        "quantity",
        &["so luong", "sl", "so luong ban", "quantity", "qty", "amount"],
    ),
    (
        "margin",
        &[
            "margin", "bien loi nhuan", "bien lai", "ty suat", "ti suat", "ty suat lai",
            "profit margin",
        ],
    ),
    (
        "profit",
        &["loi nhuan", "lai", "tien lai", "loi nhuan gop", "profit"],
    ),
    ("revenue", &["doanh thu", "doanh so", "revenue", "sales"]),
    (
        "discount",
        &["giam gia", "chiet khau", "khuyen mai", "discount"],
    ),
    ("tax", &["thue", "thue vat", "vat", "tax"]),
    ("stock", &["ton kho", "hang ton", "stock", "inventory"]),
    (
        "sku",
        &["sku", "ma sp", "ma hang", "ma san pham", "product code"],
    ),
    (
        "productName",
        &["ten sp", "ten hang", "ten san pham", "product name", "product"],
    ),
    (
        "category",
        &["loai", "danh muc", "nhom hang", "loai san pham", "category"],
    ),
];

/// Keywords and symbols per operation
pub const OPERATION_KEYWORDS: &[(Operation, &[&str])] = &[
    (Operation::Sum, &["tong", "tong cong", "sum", "total"]),
    (
        Operation::Average,
        &["trung binh", "binh quan", "average", "avg", "mean"],
    ),
    (
        Operation::Add,
        &["cong", "cong voi", "cong them", "add", "plus", "+"],
    ),
    (
        Operation::Subtract,
        &["tru", "tru di", "subtract", "minus", "-"],
    ),
    (
        Operation::Multiply,
        &["nhan", "nhan voi", "multiply", "times", "*", "x", "×"],
    ),
    (
        Operation::Divide,
        &["chia", "chia cho", "divide", "divided by", "/", "÷"],
    ),
    (
        Operation::Min,
        &["nho nhat", "thap nhat", "re nhat", "min", "minimum"],
    ),
    (
        Operation::Max,
        &["lon nhat", "cao nhat", "dat nhat", "max", "maximum"],
    ),
    (Operation::Count, &["dem", "dem so", "count"]),
    (
        Operation::Percent,
        &["phan tram", "ty le", "ti le", "percent", "percentage"],
    ),
    (Operation::Round, &["lam tron", "round"]),
];

/// Words and symbols per comparison operator
pub const COMPARISON_KEYWORDS: &[(ComparisonOp, &[&str])] = &[
    (
        ComparisonOp::GreaterEqual,
        &[">=", "it nhat", "toi thieu", "at least", "khong duoi"],
    ),
    (
        ComparisonOp::LessEqual,
        &["<=", "toi da", "at most", "khong qua", "khong vuot"],
    ),
    (ComparisonOp::NotEqual, &["<>", "!=", "khac", "khac voi"]),
    (
        ComparisonOp::Greater,
        &[">", "lon hon", "cao hon", "nhieu hon", "vuot", "tren", "greater than"],
    ),
    (
        ComparisonOp::Less,
        &["<", "nho hon", "thap hon", "it hon", "duoi", "less than"],
    ),
    (ComparisonOp::Equal, &["=", "==", "bang", "equals"]),
];

pub const LOGICAL_KEYWORDS: &[(LogicalOp, &[&str])] = &[
    (LogicalOp::And, &["va", "and"]),
    (LogicalOp::Or, &["hoac", "or"]),
    (LogicalOp::Not, &["khong", "not"]),
];

/// Vietnamese number words, keyed by lower-case text with diacritics kept
/// (`"sáu"` is six, `"sau"` is "after")
pub const NUMBER_WORDS: &[(&str, f64)] = &[
    ("một", 1.0),
    ("hai", 2.0),
    ("ba", 3.0),
    ("bốn", 4.0),
    ("năm", 5.0),
    ("sáu", 6.0),
    ("bảy", 7.0),
    ("bẩy", 7.0),
    ("tám", 8.0),
    ("chín", 9.0),
    ("mười", 10.0),
    ("trăm", 100.0),
    ("nghìn", 1_000.0),
    ("ngàn", 1_000.0),
    ("triệu", 1_000_000.0),
    ("tỷ", 1_000_000_000.0),
    ("tỉ", 1_000_000_000.0),
];

static FIELD_LOOKUP: Lazy<HashMap<String, &'static str>> = Lazy::new(|| {
    let mut map = HashMap::new();
    for (canonical, aliases) in FIELD_ALIASES {
        map.insert(canonical.to_lowercase(), *canonical);
        for alias in *aliases {
            map.insert((*alias).to_string(), *canonical);
        }
    }
    map
});

static OPERATION_LOOKUP: Lazy<HashMap<&'static str, Operation>> =
    Lazy::new(|| invert(OPERATION_KEYWORDS));

static COMPARISON_LOOKUP: Lazy<HashMap<&'static str, ComparisonOp>> =
    Lazy::new(|| invert(COMPARISON_KEYWORDS));

static LOGICAL_LOOKUP: Lazy<HashMap<&'static str, LogicalOp>> =
    Lazy::new(|| invert(LOGICAL_KEYWORDS));

static NUMBER_WORD_LOOKUP: Lazy<HashMap<&'static str, f64>> =
    Lazy::new(|| NUMBER_WORDS.iter().copied().collect());

fn invert<T: Copy>(table: &'static [(T, &'static [&'static str])]) -> HashMap<&'static str, T> {
    table
        .iter()
        .flat_map(|(value, words)| words.iter().map(move |w| (*w, *value)))
        .collect()
}

/// Canonical field for a normalized word or phrase
pub fn lookup_field(normalized: &str) -> Option<&'static str> {
    FIELD_LOOKUP.get(normalized).copied()
}

pub fn lookup_operation(normalized: &str) -> Option<Operation> {
    OPERATION_LOOKUP.get(normalized).copied()
}

pub fn lookup_comparison(normalized: &str) -> Option<ComparisonOp> {
    COMPARISON_LOOKUP.get(normalized).copied()
}

pub fn lookup_logical(normalized: &str) -> Option<LogicalOp> {
    LOGICAL_LOOKUP.get(normalized).copied()
}

/// Value of a Vietnamese number word (`lower` is lower-case, NFC)
pub fn lookup_number_word(lower: &str) -> Option<f64> {
    NUMBER_WORD_LOOKUP.get(lower).copied()
}

/// Classify a multi-word phrase for the merge pass: field aliases first,
/// then operation phrases, then comparison phrases
pub fn lookup_phrase(normalized: &str) -> Option<TokenKind> {
    if let Some(canonical) = lookup_field(normalized) {
        return Some(TokenKind::Field { canonical });
    }
    if let Some(op) = lookup_operation(normalized) {
        return Some(TokenKind::Operation(op));
    }
    lookup_comparison(normalized).map(TokenKind::Comparison)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::normalize_text;

    #[test]
    fn test_every_alias_is_normalized() {
        let all_keys = FIELD_ALIASES
            .iter()
            .flat_map(|(_, aliases)| aliases.iter())
            .chain(OPERATION_KEYWORDS.iter().flat_map(|(_, w)| w.iter()))
            .chain(COMPARISON_KEYWORDS.iter().flat_map(|(_, w)| w.iter()))
            .chain(LOGICAL_KEYWORDS.iter().flat_map(|(_, w)| w.iter()));
        for key in all_keys {
            assert_eq!(normalize_text(key), *key, "alias '{}' is not normalized", key);
            assert!(key.split(' ').count() <= 3, "alias '{}' is too long", key);
        }
    }

    #[test]
    fn test_aliases_are_unambiguous() {
        let mut seen = HashMap::new();
        for (canonical, aliases) in FIELD_ALIASES {
            for alias in *aliases {
                if let Some(other) = seen.insert(*alias, *canonical) {
                    panic!("'{}' maps to both {} and {}", alias, other, canonical);
                }
            }
        }
    }

    #[test]
    fn test_every_canonical_field_has_aliases() {
        for field in CANONICAL_FIELDS {
            assert!(
                FIELD_ALIASES.iter().any(|(c, _)| c == field),
                "{} has no aliases",
                field
            );
            assert_eq!(lookup_field(&field.to_lowercase()), Some(*field));
        }
    }

    #[test]
    fn test_lookups() {
        assert_eq!(lookup_field("gia von"), Some("costPrice"));
        assert_eq!(lookup_field("retailprice"), Some("retailPrice"));
        assert_eq!(lookup_operation("trung binh"), Some(Operation::Average));
        assert_eq!(lookup_operation("×"), Some(Operation::Multiply));
        assert_eq!(lookup_comparison("lon hon"), Some(ComparisonOp::Greater));
        assert_eq!(lookup_logical("hoac"), Some(LogicalOp::Or));
        assert_eq!(lookup_number_word("sáu"), Some(6.0));
        assert_eq!(lookup_number_word("sau"), None);
    }

    #[test]
    fn test_phrase_prefers_fields() {
        assert_eq!(
            lookup_phrase("gia ban"),
            Some(TokenKind::Field {
                canonical: "retailPrice"
            })
        );
        assert_eq!(
            lookup_phrase("nho nhat"),
            Some(TokenKind::Operation(Operation::Min))
        );
        assert_eq!(
            lookup_phrase("it nhat"),
            Some(TokenKind::Comparison(ComparisonOp::GreaterEqual))
        );
        assert_eq!(lookup_phrase("hom nay"), None);
    }
}
