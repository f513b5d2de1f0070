//! Intent detection
//!
//! Scores the input against a static catalog of regex patterns and picks the
//! best one. When nothing in the catalog is confident enough, a formula is
//! composed directly from the operations and fields found in the text.

use crate::builder::{BuildOptions, FormulaBuilder};
use crate::error::NlpError;
use crate::scoring;
use crate::token::{ComparisonOp, Operation, Token, TokenKind};
use crate::tokenizer::{self, TokenizeResult, Tokenizer};
use nlsheet_formula::evaluator::format_number;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::fmt;
use tracing::{debug, warn};

/// What the user asked for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IntentType {
    CalculateMargin,
    CalculateMarkup,
    CalculateProfit,
    CalculateRevenue,
    CalculateDiscount,
    CalculateTax,
    SumRange,
    AverageRange,
    CountItems,
    MinValue,
    MaxValue,
    Conditional,
    Lookup,
    CustomFormula,
    Unknown,
}

impl IntentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntentType::CalculateMargin => "CALCULATE_MARGIN",
            IntentType::CalculateMarkup => "CALCULATE_MARKUP",
            IntentType::CalculateProfit => "CALCULATE_PROFIT",
            IntentType::CalculateRevenue => "CALCULATE_REVENUE",
            IntentType::CalculateDiscount => "CALCULATE_DISCOUNT",
            IntentType::CalculateTax => "CALCULATE_TAX",
            IntentType::SumRange => "SUM_RANGE",
            IntentType::AverageRange => "AVERAGE_RANGE",
            IntentType::CountItems => "COUNT_ITEMS",
            IntentType::MinValue => "MIN_VALUE",
            IntentType::MaxValue => "MAX_VALUE",
            IntentType::Conditional => "CONDITIONAL",
            IntentType::Lookup => "LOOKUP",
            IntentType::CustomFormula => "CUSTOM_FORMULA",
            IntentType::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for IntentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified request together with everything extracted from it
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectedIntent {
    #[serde(rename = "type")]
    pub kind: IntentType,
    pub confidence: f64,
    /// Canonical field names, deduplicated, in order of first appearance
    pub fields: Vec<String>,
    pub operations: Vec<Operation>,
    pub numbers: Vec<f64>,
    pub ranges: Vec<String>,
    pub comparisons: Vec<ComparisonOp>,
    pub raw_input: String,
    pub suggested_formula: Option<String>,
    pub description: String,
}

/// Predicate over the token stream
pub type TokenPredicate = fn(&[Token]) -> bool;

/// A compiled catalog entry
#[derive(Debug)]
pub struct IntentPattern {
    pub kind: IntentType,
    pub regexes: Vec<Regex>,
    pub required_tokens: Option<TokenPredicate>,
    pub description: &'static str,
}

impl IntentPattern {
    fn compile(spec: &PatternSpec) -> Result<Self, NlpError> {
        let regexes = spec
            .regexes
            .iter()
            .map(|source| Regex::new(source))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|source| NlpError::Pattern {
                intent: spec.kind,
                source,
            })?;

        Ok(Self {
            kind: spec.kind,
            regexes,
            required_tokens: spec.required_tokens,
            description: spec.description,
        })
    }

    /// Score against tokenized input; `None` when no regex matches
    fn score(&self, input: &TokenizeResult) -> Option<f64> {
        let matched = self
            .regexes
            .iter()
            .filter(|re| re.is_match(&input.original_text) || re.is_match(&input.normalized_text))
            .count();
        let required_ok = self
            .required_tokens
            .is_some_and(|predicate| predicate(&input.tokens));
        let has_field = input.tokens.iter().any(|t| t.field().is_some());

        scoring::score_pattern(matched, required_ok, has_field)
    }
}

struct PatternSpec {
    kind: IntentType,
    regexes: &'static [&'static str],
    required_tokens: Option<TokenPredicate>,
    description: &'static str,
}

const RANGE_WORDS: &str = r"\b[a-z]+[0-9]+:[a-z]+[0-9]+\b|\b(tat ca|toan bo|cot|column|all)\b";

const PERCENT_WORDS: &str = r"[0-9]+\s*%|\b(phan tram|percent)\b";

const PATTERN_SPECS: &[PatternSpec] = &[
    PatternSpec {
        kind: IntentType::CalculateMargin,
        regexes: &[
            r"\b(margin|bien loi nhuan|bien lai|ty suat loi nhuan|ti suat loi nhuan)\b",
            r"\b(phan tram|ty le|ti le|percent)\b",
        ],
        required_tokens: Some(has_price_pair_or_margin),
        description: "Tính biên lợi nhuận",
    },
    PatternSpec {
        kind: IntentType::CalculateMarkup,
        regexes: &[
            r"\b(markup|mark up|lai tren von|loi nhuan tren von)\b",
            r"\btren (gia )?von\b",
        ],
        required_tokens: Some(has_price_pair),
        description: "Tính tỷ lệ lãi trên giá vốn",
    },
    PatternSpec {
        kind: IntentType::CalculateProfit,
        regexes: &[
            r"\b(loi nhuan|profit|tien lai|lai)\b",
            r"\b(so luong|quantity|qty|tong)\b",
        ],
        required_tokens: Some(has_profit_inputs),
        description: "Tính lợi nhuận",
    },
    PatternSpec {
        kind: IntentType::CalculateRevenue,
        regexes: &[
            r"\b(doanh thu|doanh so|revenue|sales)\b",
            r"\b(gia ban|gia|price)\b.*\b(so luong|quantity|qty)\b|\b(so luong|quantity|qty)\b.*\b(gia ban|gia|price)\b",
        ],
        required_tokens: Some(has_revenue_inputs),
        description: "Tính doanh thu",
    },
    PatternSpec {
        kind: IntentType::CalculateDiscount,
        regexes: &[
            r"\b(giam gia|chiet khau|khuyen mai|discount|sale off)\b",
            PERCENT_WORDS,
        ],
        required_tokens: Some(has_number),
        description: "Tính giá sau giảm giá",
    },
    PatternSpec {
        kind: IntentType::CalculateTax,
        regexes: &[r"\b(thue|tax|vat)\b", PERCENT_WORDS],
        required_tokens: Some(has_number),
        description: "Tính thuế",
    },
    PatternSpec {
        kind: IntentType::SumRange,
        regexes: &[r"\b(tong|tong cong|sum|total|cong tat ca|cong het)\b", RANGE_WORDS],
        required_tokens: Some(has_range_or_field),
        description: "Tính tổng",
    },
    PatternSpec {
        kind: IntentType::AverageRange,
        regexes: &[r"\b(trung binh|binh quan|average|avg|mean)\b", RANGE_WORDS],
        required_tokens: Some(has_range_or_field),
        description: "Tính trung bình",
    },
    PatternSpec {
        kind: IntentType::CountItems,
        regexes: &[
            r"\b(dem|count|so luong (san pham|mat hang|dong))\b",
            r"\b(bao nhieu|how many|tat ca)\b",
        ],
        required_tokens: None,
        description: "Đếm số mục",
    },
    PatternSpec {
        kind: IntentType::MinValue,
        regexes: &[r"\b(nho nhat|thap nhat|re nhat|min|minimum)\b", RANGE_WORDS],
        required_tokens: Some(has_range_or_field),
        description: "Tìm giá trị nhỏ nhất",
    },
    PatternSpec {
        kind: IntentType::MaxValue,
        regexes: &[r"\b(lon nhat|cao nhat|dat nhat|max|maximum)\b", RANGE_WORDS],
        required_tokens: Some(has_range_or_field),
        description: "Tìm giá trị lớn nhất",
    },
    PatternSpec {
        kind: IntentType::Conditional,
        regexes: &[
            r"\b(neu|if|khi|truong hop)\b",
            r">=|<=|<>|!=|>|<|=|\b(lon hon|nho hon|bang|it nhat|toi da|toi thieu|vuot|duoi)\b",
        ],
        required_tokens: Some(has_comparison),
        description: "Công thức điều kiện",
    },
    PatternSpec {
        kind: IntentType::Lookup,
        regexes: &[
            r"\b(tim|tra cuu|tim kiem|lookup|vlookup)\b",
            r"\b(sku|ma sp|ma hang|ma san pham)\b",
        ],
        required_tokens: Some(has_sku),
        description: "Tra cứu thông tin sản phẩm",
    },
];

fn has_field(tokens: &[Token], name: &str) -> bool {
    tokens.iter().any(|t| t.field() == Some(name))
}

fn has_price_pair(tokens: &[Token]) -> bool {
    has_field(tokens, "retailPrice") && has_field(tokens, "costPrice")
}

fn has_price_pair_or_margin(tokens: &[Token]) -> bool {
    has_price_pair(tokens) || has_field(tokens, "margin")
}

fn has_profit_inputs(tokens: &[Token]) -> bool {
    ["profit", "retailPrice", "costPrice", "quantity"]
        .iter()
        .any(|name| has_field(tokens, name))
}

fn has_revenue_inputs(tokens: &[Token]) -> bool {
    has_field(tokens, "revenue") || (has_field(tokens, "retailPrice") && has_field(tokens, "quantity"))
}

fn has_number(tokens: &[Token]) -> bool {
    tokens
        .iter()
        .any(|t| matches!(t.kind, TokenKind::Number { .. }))
}

fn has_range_or_field(tokens: &[Token]) -> bool {
    tokens
        .iter()
        .any(|t| matches!(t.kind, TokenKind::Range { .. } | TokenKind::Field { .. }))
}

fn has_comparison(tokens: &[Token]) -> bool {
    tokens
        .iter()
        .any(|t| matches!(t.kind, TokenKind::Comparison(_)))
}

fn has_sku(tokens: &[Token]) -> bool {
    has_field(tokens, "sku")
}

static PATTERNS: Lazy<Vec<IntentPattern>> = Lazy::new(|| {
    PATTERN_SPECS
        .iter()
        .filter_map(|spec| match IntentPattern::compile(spec) {
            Ok(pattern) => Some(pattern),
            Err(e) => {
                warn!(error = %e, "skipping intent pattern");
                None
            }
        })
        .collect()
});

/// The compiled catalog, in priority order
pub fn patterns() -> &'static [IntentPattern] {
    &PATTERNS
}

/// What was pulled out of the text, independent of any pattern
struct Extraction {
    fields: Vec<String>,
    operations: Vec<Operation>,
    numbers: Vec<f64>,
    ranges: Vec<String>,
    comparisons: Vec<ComparisonOp>,
}

impl Extraction {
    fn from_tokens(tokens: &[Token]) -> Self {
        let mut fields: Vec<String> = Vec::new();
        for field in tokenizer::fields(tokens) {
            if !fields.iter().any(|f| f == field) {
                fields.push(field.to_string());
            }
        }

        Self {
            fields,
            operations: tokenizer::operations(tokens),
            numbers: tokenizer::numbers(tokens),
            ranges: tokenizer::ranges(tokens),
            comparisons: tokenizer::comparisons(tokens),
        }
    }

    fn into_intent(
        self,
        kind: IntentType,
        confidence: f64,
        raw_input: &str,
        description: String,
    ) -> DetectedIntent {
        DetectedIntent {
            kind,
            confidence,
            fields: self.fields,
            operations: self.operations,
            numbers: self.numbers,
            ranges: self.ranges,
            comparisons: self.comparisons,
            raw_input: raw_input.to_string(),
            suggested_formula: None,
            description,
        }
    }
}

/// Classifies natural-language requests
#[derive(Debug, Clone, Default)]
pub struct IntentDetector {
    tokenizer: Tokenizer,
    builder: FormulaBuilder,
}

impl IntentDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Detect the single best intent. Never fails; text that cannot be
    /// understood yields [`IntentType::Unknown`].
    pub fn detect(&self, text: &str) -> DetectedIntent {
        let input = self.tokenizer.tokenize(text);

        let mut best: Option<(&IntentPattern, f64)> = None;
        for pattern in patterns() {
            if let Some(confidence) = pattern.score(&input) {
                if best.map_or(true, |(_, top)| confidence > top) {
                    best = Some((pattern, confidence));
                }
            }
        }

        match best {
            Some((pattern, confidence)) if confidence >= scoring::MIN_INTENT_CONFIDENCE => {
                debug!(intent = %pattern.kind, confidence, "matched catalog pattern");
                self.catalog_intent(pattern, confidence, &input)
            }
            _ => self.custom_intent(&input),
        }
    }

    /// Score the whole catalog; candidates above the suggestion floor,
    /// highest confidence first
    pub fn detect_all(&self, text: &str) -> Vec<DetectedIntent> {
        let input = self.tokenizer.tokenize(text);

        let mut intents: Vec<DetectedIntent> = patterns()
            .iter()
            .filter_map(|pattern| {
                let confidence = pattern.score(&input)?;
                (confidence > scoring::SUGGESTION_FLOOR)
                    .then(|| self.catalog_intent(pattern, confidence, &input))
            })
            .collect();

        scoring::sort_by_confidence(&mut intents);
        intents
    }

    fn catalog_intent(
        &self,
        pattern: &IntentPattern,
        confidence: f64,
        input: &TokenizeResult,
    ) -> DetectedIntent {
        let mut intent = Extraction::from_tokens(&input.tokens).into_intent(
            pattern.kind,
            confidence,
            &input.original_text,
            pattern.description.to_string(),
        );

        let built = self.builder.build(&intent, &BuildOptions::default());
        if built.is_valid {
            intent.suggested_formula = Some(built.formula);
        }
        intent
    }

    /// Compose a formula from the first operation and the extracted operands
    fn custom_intent(&self, input: &TokenizeResult) -> DetectedIntent {
        let extraction = Extraction::from_tokens(&input.tokens);

        let operands: Vec<String> = if extraction.fields.is_empty() {
            extraction.numbers.iter().map(|n| format_number(*n)).collect()
        } else {
            extraction.fields.clone()
        };

        let composed = match (extraction.operations.first(), operands.is_empty()) {
            (Some(op), false) => Some(compose(*op, &operands)),
            _ => None,
        };

        match composed {
            Some((formula, confidence)) => {
                debug!(formula = %formula, confidence, "composed custom formula");
                let description = format!("Công thức tùy chỉnh: {}", formula);
                let mut intent = extraction.into_intent(
                    IntentType::CustomFormula,
                    confidence,
                    &input.original_text,
                    description,
                );
                intent.suggested_formula = Some(formula);
                intent
            }
            None => {
                debug!("no usable operation or operands");
                extraction.into_intent(
                    IntentType::Unknown,
                    scoring::UNKNOWN_CONFIDENCE,
                    &input.original_text,
                    "Không xác định được yêu cầu".to_string(),
                )
            }
        }
    }
}

fn compose(op: Operation, operands: &[String]) -> (String, f64) {
    match op {
        Operation::Sum | Operation::Average => (
            format!("={}({})", op.as_str(), operands.join(",")),
            scoring::CUSTOM_CALL_CONFIDENCE,
        ),
        _ => match op.infix() {
            Some(symbol) => (
                format!("={}", operands.join(&symbol.to_string())),
                scoring::CUSTOM_INFIX_CONFIDENCE,
            ),
            None => (
                format!("={}({})", op.as_str(), operands.join(",")),
                scoring::CUSTOM_GENERIC_CONFIDENCE,
            ),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn detect(text: &str) -> DetectedIntent {
        IntentDetector::new().detect(text)
    }

    #[test]
    fn test_catalog_compiles() {
        assert_eq!(patterns().len(), PATTERN_SPECS.len());
    }

    #[test]
    fn test_margin() {
        let intent = detect("tính margin từ giá bán và giá vốn");
        assert_eq!(intent.kind, IntentType::CalculateMargin);
        assert!(intent.confidence > 0.3);
        assert_eq!(intent.fields, vec!["margin", "retailPrice", "costPrice"]);
        assert_eq!(
            intent.suggested_formula.as_deref(),
            Some("=(retailPrice-costPrice)/retailPrice*100")
        );
    }

    #[test]
    fn test_profit() {
        let intent = detect("tính lợi nhuận từ giá bán, giá vốn và số lượng");
        assert_eq!(intent.kind, IntentType::CalculateProfit);
        assert_eq!(
            intent.suggested_formula.as_deref(),
            Some("=(retailPrice-costPrice)*quantity")
        );
    }

    #[test]
    fn test_revenue() {
        let intent = detect("doanh thu bằng giá bán nhân số lượng");
        assert_eq!(intent.kind, IntentType::CalculateRevenue);
        assert_eq!(intent.suggested_formula.as_deref(), Some("=retailPrice*quantity"));
    }

    #[test]
    fn test_discount_uses_number() {
        let intent = detect("giảm giá 15% cho giá bán");
        assert_eq!(intent.kind, IntentType::CalculateDiscount);
        assert_eq!(intent.numbers, vec![15.0]);
        assert_eq!(
            intent.suggested_formula.as_deref(),
            Some("=retailPrice*(1-15/100)")
        );
    }

    #[test]
    fn test_sum_range() {
        let intent = detect("tổng cột A1:A10");
        assert_eq!(intent.kind, IntentType::SumRange);
        assert_eq!(intent.suggested_formula.as_deref(), Some("=SUM(A1:A10)"));
    }

    #[test]
    fn test_conditional() {
        let intent = detect("nếu số lượng lớn hơn 100 thì đạt");
        assert_eq!(intent.kind, IntentType::Conditional);
        assert_eq!(
            intent.suggested_formula.as_deref(),
            Some("=IF(quantity>100,\"Đạt\",\"Không đạt\")")
        );
    }

    #[test]
    fn test_gibberish_is_unknown() {
        let intent = detect("asdkjfh 293u4");
        assert_eq!(intent.kind, IntentType::Unknown);
        assert!(intent.confidence < 0.3);
        assert_eq!(intent.suggested_formula, None);
    }

    #[test]
    fn test_custom_infix() {
        let intent = detect("giá bán trừ giá vốn");
        assert_eq!(intent.kind, IntentType::CustomFormula);
        assert_eq!(intent.confidence, scoring::CUSTOM_INFIX_CONFIDENCE);
        assert_eq!(
            intent.suggested_formula.as_deref(),
            Some("=retailPrice-costPrice")
        );
    }

    #[test]
    fn test_custom_uses_numbers_without_fields() {
        let intent = detect("nhân 3 với 4");
        assert_eq!(intent.kind, IntentType::CustomFormula);
        assert_eq!(intent.suggested_formula.as_deref(), Some("=3*4"));
    }

    #[test]
    fn test_custom_generic_operation() {
        let intent = detect("làm tròn giá vốn");
        assert_eq!(intent.kind, IntentType::CustomFormula);
        assert_eq!(intent.confidence, scoring::CUSTOM_GENERIC_CONFIDENCE);
        assert_eq!(intent.suggested_formula.as_deref(), Some("=ROUND(costPrice)"));
    }

    #[test]
    fn test_detect_all_ordering() {
        let all = IntentDetector::new().detect_all("tính margin từ giá bán và giá vốn");
        assert_eq!(all[0].kind, IntentType::CalculateMargin);
        assert!(all.windows(2).all(|w| w[0].confidence >= w[1].confidence));
    }

    #[test]
    fn test_serializes_camel_case() {
        let json = serde_json::to_value(detect("tổng A1:A3")).unwrap();
        assert_eq!(json["type"], "SUM_RANGE");
        assert_eq!(json["suggestedFormula"], "=SUM(A1:A3)");
        assert!(json.get("rawInput").is_some());
    }

    proptest! {
        #[test]
        fn prop_detect_all_sorted_above_floor(text in "\\PC{0,60}") {
            let all = IntentDetector::new().detect_all(&text);
            prop_assert!(all.iter().all(|i| i.confidence > scoring::SUGGESTION_FLOOR));
            prop_assert!(all.windows(2).all(|w| w[0].confidence >= w[1].confidence));
        }

        #[test]
        fn prop_confident_formulas_are_well_formed(text in "(tổng|trung bình|giá bán|giá vốn|số lượng|margin|lợi nhuận|nếu|>|10|A1:A5| )+") {
            let intent = IntentDetector::new().detect(&text);
            if intent.confidence >= scoring::MIN_INTENT_CONFIDENCE {
                if let Some(formula) = intent.suggested_formula {
                    prop_assert!(formula.starts_with('='));
                    prop_assert_eq!(formula.matches('(').count(), formula.matches(')').count());
                }
            }
        }
    }
}
