//! Text normalization for dictionary matching
//!
//! Vietnamese text is folded to a diacritic-free, lower-case form so that
//! `"Giá Bán"`, `"giá bán"` and `"gia ban"` all hit the same dictionary key.
//! The original text is never replaced; normalized forms are used only for
//! lookups and regex matching.

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Fold text for matching.
///
/// Performs:
/// - Unicode NFD decomposition with combining marks removed
/// - `đ`/`Đ` → `d`
/// - Lowercase conversion
/// - Whitespace collapsing
///
/// # Examples
///
/// ```
/// use nlsheet_nlp::normalize::normalize_text;
///
/// assert_eq!(normalize_text("Tính  Giá Bán"), "tinh gia ban");
/// assert_eq!(normalize_text("Đơn giá"), "don gia");
/// ```
pub fn normalize_text(s: &str) -> String {
    let folded: String = s
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .map(|c| match c {
            'đ' | 'Đ' => 'd',
            other => other,
        })
        .flat_map(char::to_lowercase)
        .collect();

    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Fold a column header into a compact key: [`normalize_text`] with every
/// non-alphanumeric character removed.
///
/// ```
/// use nlsheet_nlp::normalize::normalize_key;
///
/// assert_eq!(normalize_key("Retail Price"), "retailprice");
/// assert_eq!(normalize_key("giá_bán"), "giaban");
/// ```
pub fn normalize_key(s: &str) -> String {
    normalize_text(s)
        .chars()
        .filter(|c| c.is_alphanumeric())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_vietnamese_diacritics() {
        assert_eq!(normalize_text("lợi nhuận"), "loi nhuan");
        assert_eq!(normalize_text("SỐ LƯỢNG"), "so luong");
        assert_eq!(normalize_text("tỷ suất"), "ty suat");
    }

    #[test]
    fn test_precomposed_and_decomposed_agree() {
        let precomposed = "gi\u{00E1} b\u{00E1}n";
        let decomposed = "gia\u{0301} ba\u{0301}n";
        assert_eq!(normalize_text(precomposed), normalize_text(decomposed));
    }

    #[test]
    fn test_collapses_whitespace() {
        assert_eq!(normalize_text("  a \t b\n c  "), "a b c");
        assert_eq!(normalize_text(""), "");
    }

    #[test]
    fn test_normalize_key() {
        assert_eq!(normalize_key("Cost-Price (VND)"), "costpricevnd");
        assert_eq!(normalize_key("Số lượng"), "soluong");
        assert_eq!(normalize_key("retailPrice"), "retailprice");
    }
}
