//! End-to-end tests: Vietnamese text in, evaluated formula out

use nlsheet::prelude::*;
use nlsheet::TokenType;
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use std::collections::HashMap;

/// Margin request converts and evaluates
#[test]
fn test_margin_request() {
    let converter = FormulaConverter::new();
    let mut options = ConvertOptions::default();
    options.test_context = Some(
        [("retailPrice", 100.0), ("costPrice", 40.0)]
            .into_iter()
            .collect(),
    );

    let result = converter.convert("tính margin từ giá bán và giá vốn", &options);

    assert!(result.success);
    assert_eq!(result.intent.kind, IntentType::CalculateMargin);
    assert!(result.intent.confidence > 0.3);
    assert_eq!(
        result.formula.as_deref(),
        Some("=(retailPrice-costPrice)/retailPrice*100")
    );
    assert_eq!(
        result.evaluation.and_then(|e| e.value),
        Some(FormulaValue::Number(60.0))
    );
}

/// Unaccented input is recognized the same way
#[test]
fn test_unaccented_request() {
    let converter = FormulaConverter::new();
    let accented = converter.convert("tính lợi nhuận từ giá bán, giá vốn và số lượng", &ConvertOptions::default());
    let plain = converter.convert("tinh loi nhuan tu gia ban, gia von va so luong", &ConvertOptions::default());

    assert_eq!(accented.intent.kind, IntentType::CalculateProfit);
    assert_eq!(plain.intent.kind, IntentType::CalculateProfit);
    assert_eq!(accented.formula, plain.formula);
}

/// Gibberish is refused
#[test]
fn test_gibberish_is_refused() {
    let converter = FormulaConverter::new();

    let intent = IntentDetector::new().detect("asdkjfh 293u4");
    assert!(matches!(intent.kind, IntentType::Unknown | IntentType::CustomFormula));
    assert!(intent.confidence < 0.3);

    assert!(!converter.can_convert("asdkjfh 293u4").can_convert);
    assert!(!converter.convert("asdkjfh 293u4", &ConvertOptions::default()).success);
}

/// Tokens carry byte positions into the original text
#[test]
fn test_token_positions() {
    let text = "tổng giá bán A1:A10";
    let result = Tokenizer::new().tokenize(text);
    let types: Vec<_> = result.tokens.iter().map(|t| t.token_type()).collect();
    assert_eq!(types, vec![TokenType::Operation, TokenType::Field, TokenType::Range]);

    for token in &result.tokens {
        assert_eq!(&text[token.position..token.end()], token.value);
    }
}

/// Formulas built from names can be rewritten onto sheet cells
#[test]
fn test_cell_reference_rewrite() {
    let intent = IntentDetector::new().detect("doanh thu bằng giá bán nhân số lượng");
    let refs: HashMap<String, String> = [
        ("retailPrice".to_string(), "C2".to_string()),
        ("quantity".to_string(), "D2".to_string()),
    ]
    .into();

    let built = FormulaBuilder::new().build_with_cell_references(&intent, &refs, &BuildOptions::default());
    assert_eq!(built.formula, "=C2*D2");

    let mut ctx = EvaluationContext::new();
    ctx.set_cell("C2", 20.0).unwrap();
    ctx.set_cell("D2", 7.0).unwrap();
    let ast = parse_formula(&built.formula).unwrap();
    assert_eq!(evaluate(&ast, &ctx), FormulaValue::Number(140.0));
}

/// A converted formula drives row processing
#[test]
fn test_converted_formula_in_rows() {
    let converter = FormulaConverter::new();
    let formula = converter
        .convert("tính doanh thu từ giá bán và số lượng", &ConvertOptions::default())
        .formula
        .unwrap();

    let rows: Vec<Row> = [(12.0, 3.0), (5.5, 2.0)]
        .into_iter()
        .map(|(price, qty)| {
            let mut row = Row::new();
            row.insert("Giá bán".into(), price.into());
            row.insert("Số lượng".into(), qty.into());
            row.insert("Doanh thu".into(), formula.clone().into());
            row
        })
        .collect();

    let out = process_rows(&rows, &EvaluationContext::new());
    assert_eq!(out[0]["Doanh thu"], FormulaValue::Number(36.0));
    assert_eq!(out[1]["Doanh thu"], FormulaValue::Number(11.0));
}

/// Conversion results serialize for JSON callers
#[test]
fn test_conversion_result_json() {
    let result = FormulaConverter::new().convert("trung bình A1:A9", &ConvertOptions::default());
    let json = serde_json::to_value(&result).unwrap();

    assert_eq!(json["success"], true);
    assert_eq!(json["formula"], "=AVERAGE(A1:A9)");
    assert_eq!(json["intent"]["type"], "AVERAGE_RANGE");
    assert_eq!(json["intent"]["ranges"][0], "A1:A9");
}

proptest! {
    #[test]
    fn prop_conversion_never_panics(text in "\\PC{0,80}") {
        let converter = FormulaConverter::new();
        let result = converter.convert(&text, &ConvertOptions::default());
        if result.success {
            let formula = result.formula.unwrap_or_default();
            prop_assert!(formula.starts_with('='));
        }
        let _ = converter.suggest(&text, 5);
        let _ = converter.can_convert(&text);
    }

    #[test]
    fn prop_tokenizing_is_pure(text in "\\PC{0,80}") {
        let tokenizer = Tokenizer::new();
        prop_assert_eq!(tokenizer.tokenize(&text), tokenizer.tokenize(&text));
    }
}
