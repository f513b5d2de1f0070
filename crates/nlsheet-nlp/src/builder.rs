//! Formula builder
//!
//! Fills a template's slots from the detected intent and the caller's
//! context, then checks the result for obvious syntax problems.

use crate::intent::{DetectedIntent, IntentType};
use crate::template::{self, FormulaTemplate, Segment, Slot, SlotKind};
use nlsheet_formula::evaluator::format_number;
use nlsheet_formula::{EvaluationContext, FormulaValue};
use serde::Serialize;
use std::collections::HashMap;
use std::ops::Range;
use tracing::debug;

const DEFAULT_TRUE_VALUE: &str = "\"Đạt\"";
const DEFAULT_FALSE_VALUE: &str = "\"Không đạt\"";
const DEFAULT_COMPARISON: &str = ">=";

/// Options for formula building
#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    /// Known values. Field slots take their value from here first; the
    /// synthetic names `range`, `condition`, `trueValue`, `falseValue` and
    /// `number` fill the matching slots.
    pub context: EvaluationContext,
    /// Keep identifiers in the formula even when `context` has a value,
    /// so the formula can be evaluated later against other rows
    pub prefer_cell_references: bool,
}

/// A built formula
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuiltFormula {
    pub formula: String,
    pub is_valid: bool,
    pub description: String,
    /// Identifiers the formula reads (field names and cell references)
    pub variables: Vec<String>,
    pub warnings: Vec<String>,
}

impl BuiltFormula {
    fn invalid(description: String, warning: &str) -> Self {
        Self {
            formula: String::new(),
            is_valid: false,
            description,
            variables: Vec::new(),
            warnings: vec![warning.to_string()],
        }
    }

    fn finish(formula: String, description: String, mut warnings: Vec<String>) -> Self {
        let problems = validate_syntax(&formula);
        let is_valid = problems.is_empty() && !formula.contains("${");
        warnings.extend(problems);

        Self {
            variables: variables(&formula),
            formula,
            is_valid,
            description,
            warnings,
        }
    }
}

/// Builds formulas from detected intents
#[derive(Debug, Clone, Copy, Default)]
pub struct FormulaBuilder;

impl FormulaBuilder {
    pub fn new() -> Self {
        FormulaBuilder
    }

    /// Build the formula for `intent`
    pub fn build(&self, intent: &DetectedIntent, options: &BuildOptions) -> BuiltFormula {
        let description = intent.description.clone();

        match intent.kind {
            IntentType::Unknown => BuiltFormula::invalid(
                description,
                "Không xác định được yêu cầu, không thể tạo công thức",
            ),
            IntentType::CustomFormula => match &intent.suggested_formula {
                Some(formula) => BuiltFormula::finish(formula.clone(), description, Vec::new()),
                None => BuiltFormula::invalid(description, "Không có công thức tùy chỉnh"),
            },
            kind => match template::template_for(kind) {
                Some(template) => self.build_from_template(template, intent, options),
                None => BuiltFormula::invalid(description, "Không có mẫu công thức cho yêu cầu này"),
            },
        }
    }

    /// Build, then replace identifiers with the given cell references
    /// (`retailPrice` → `B2`). Matching is by whole identifier, outside
    /// string literals.
    pub fn build_with_cell_references(
        &self,
        intent: &DetectedIntent,
        cell_refs: &HashMap<String, String>,
        options: &BuildOptions,
    ) -> BuiltFormula {
        let mut built = self.build(intent, options);
        if built.formula.is_empty() {
            return built;
        }

        let rewritten = rewrite_identifiers(&built.formula, |name| cell_refs.get(name).cloned());
        built.variables = variables(&rewritten);
        built.formula = rewritten;
        built
    }

    fn build_from_template(
        &self,
        template: &FormulaTemplate,
        intent: &DetectedIntent,
        options: &BuildOptions,
    ) -> BuiltFormula {
        let ctx = &options.context;
        let mut warnings: Vec<String> = template
            .required_fields
            .iter()
            .filter(|name| SlotKind::for_name(name) == SlotKind::Field)
            .filter(|name| !intent.fields.iter().any(|f| f == *name) && !ctx.contains(name))
            .map(|name| format!("Thiếu trường: {}", name))
            .collect();

        let segments = template.template.segments();
        let mut resolved: Vec<Option<String>> = vec![None; segments.len()];

        for (i, slot) in slots_of(segments, SlotKind::Field) {
            resolved[i] = Some(field_value(slot, options));
        }

        let range = range_value(intent, ctx);
        for (i, _) in slots_of(segments, SlotKind::Range) {
            resolved[i] = range.clone();
        }

        if intent.kind == IntentType::Conditional {
            for (i, slot) in slots_of(segments, SlotKind::Conditional) {
                resolved[i] = conditional_value(slot, intent, ctx);
            }
        }

        let number = ctx
            .get("number")
            .and_then(render_literal)
            .or_else(|| intent.numbers.first().map(|n| format_number(*n)));
        for (i, _) in slots_of(segments, SlotKind::Number) {
            resolved[i] = number.clone();
        }

        let mut formula = String::new();
        let mut unresolved: Vec<&str> = Vec::new();
        for (segment, value) in segments.iter().zip(&resolved) {
            match (segment, value) {
                (Segment::Literal(text), _) => formula.push_str(text),
                (Segment::Slot(_), Some(value)) => formula.push_str(value),
                (Segment::Slot(slot), None) => {
                    formula.push_str(&format!("${{{}}}", slot.name));
                    if !unresolved.contains(&slot.name.as_str()) {
                        unresolved.push(&slot.name);
                    }
                }
            }
        }
        warnings.extend(
            unresolved
                .iter()
                .map(|name| format!("Chưa có giá trị cho ${{{}}}", name)),
        );

        debug!(intent = %intent.kind, formula = %formula, "built formula");
        BuiltFormula::finish(formula, template.description.to_string(), warnings)
    }
}

fn slots_of(segments: &[Segment], kind: SlotKind) -> impl Iterator<Item = (usize, &Slot)> {
    segments
        .iter()
        .enumerate()
        .filter_map(move |(i, segment)| match segment {
            Segment::Slot(slot) if slot.kind == kind => Some((i, slot)),
            _ => None,
        })
}

/// Context literal, else the bare identifier. A missing field was already
/// reported by the required-field check.
fn field_value(slot: &Slot, options: &BuildOptions) -> String {
    match options.context.get(&slot.name) {
        Some(value) if !options.prefer_cell_references => {
            render_literal(value).unwrap_or_else(|| slot.name.clone())
        }
        _ => slot.name.clone(),
    }
}

fn range_value(intent: &DetectedIntent, ctx: &EvaluationContext) -> Option<String> {
    // A single-column range is no lookup table
    let column = (intent.kind != IntentType::Lookup)
        .then(|| intent.fields.first().map(|f| format!("{}:{}", f, f)))
        .flatten();

    intent
        .ranges
        .first()
        .cloned()
        .or(column)
        .or_else(|| ctx.get("range").and_then(raw_text))
}

fn conditional_value(slot: &Slot, intent: &DetectedIntent, ctx: &EvaluationContext) -> Option<String> {
    match slot.name.as_str() {
        "condition" => ctx.get("condition").and_then(raw_text).or_else(|| {
            let field = intent.fields.first()?;
            let number = intent.numbers.first()?;
            let op = intent
                .comparisons
                .first()
                .map_or(DEFAULT_COMPARISON, |c| c.symbol());
            Some(format!("{}{}{}", field, op, format_number(*number)))
        }),
        "trueValue" => ctx
            .get("trueValue")
            .and_then(render_literal)
            .or_else(|| Some(DEFAULT_TRUE_VALUE.to_string())),
        "falseValue" => ctx
            .get("falseValue")
            .and_then(render_literal)
            .or_else(|| Some(DEFAULT_FALSE_VALUE.to_string())),
        _ => None,
    }
}

/// A value as it would be written in a formula (`12`, `"abc"`, `TRUE`)
fn render_literal(value: &FormulaValue) -> Option<String> {
    match value {
        FormulaValue::Number(n) => Some(format_number(*n)),
        FormulaValue::String(s) => Some(format!("\"{}\"", s.replace('"', "\"\""))),
        FormulaValue::Boolean(b) => Some(if *b { "TRUE" } else { "FALSE" }.to_string()),
        _ => None,
    }
}

/// A value spliced into the formula verbatim (ranges, conditions)
fn raw_text(value: &FormulaValue) -> Option<String> {
    match value {
        FormulaValue::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        FormulaValue::Number(n) => Some(format_number(*n)),
        _ => None,
    }
}

/// Problems that make a formula unusable; empty means the syntax looks fine
pub fn validate_syntax(formula: &str) -> Vec<String> {
    let mut problems = Vec::new();

    if !formula.starts_with('=') {
        problems.push("Công thức phải bắt đầu bằng '='".to_string());
    }

    let mut depth: i64 = 0;
    let mut balanced = true;
    let mut in_string = false;
    for c in formula.chars() {
        match c {
            '"' => in_string = !in_string,
            '(' if !in_string => depth += 1,
            ')' if !in_string => {
                depth -= 1;
                if depth < 0 {
                    balanced = false;
                }
            }
            _ => {}
        }
    }
    if !balanced || depth != 0 {
        problems.push("Dấu ngoặc không cân bằng".to_string());
    }

    if formula.contains("//") || formula.contains("**") {
        problems.push("Toán tử lặp không hợp lệ".to_string());
    }

    if formula.trim_end().ends_with(&['+', '-', '*', '/'][..]) {
        problems.push("Công thức kết thúc bằng toán tử".to_string());
    }

    problems
}

/// Byte ranges of identifiers (names and cell references) outside string
/// literals, skipping function names, booleans and error literals
fn identifier_spans(formula: &str) -> Vec<Range<usize>> {
    let chars: Vec<(usize, char)> = formula.char_indices().collect();
    let end_of = |i: usize| chars.get(i).map_or(formula.len(), |(pos, _)| *pos);
    let mut spans = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i].1;
        if c == '"' {
            i += 1;
            while i < chars.len() {
                if chars[i].1 == '"' {
                    if chars.get(i + 1).map(|(_, c)| *c) == Some('"') {
                        i += 2;
                        continue;
                    }
                    break;
                }
                i += 1;
            }
            i += 1;
        } else if c == '#' {
            i += 1;
            while i < chars.len() && (chars[i].1.is_alphanumeric() || chars[i].1 == '/') {
                i += 1;
            }
            if i < chars.len() && matches!(chars[i].1, '!' | '?') {
                i += 1;
            }
        } else if c.is_ascii_digit() || c == '.' {
            while i < chars.len() && (chars[i].1.is_alphanumeric() || chars[i].1 == '.') {
                i += 1;
            }
        } else if c.is_alphabetic() || c == '_' || c == '$' {
            let start = i;
            while i < chars.len()
                && (chars[i].1.is_alphanumeric() || chars[i].1 == '_' || chars[i].1 == '$')
            {
                i += 1;
            }
            let span = chars[start].0..end_of(i);
            let name = &formula[span.clone()];
            let next = chars[i..].iter().map(|(_, c)| *c).find(|c| !c.is_whitespace());
            let is_function = next == Some('(');
            let is_boolean = name.eq_ignore_ascii_case("TRUE") || name.eq_ignore_ascii_case("FALSE");
            if !is_function && !is_boolean {
                spans.push(span);
            }
        } else {
            i += 1;
        }
    }

    spans
}

/// Identifiers read by the formula, deduplicated, in order of appearance
pub fn variables(formula: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for span in identifier_spans(formula) {
        let name = &formula[span];
        if !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
    }
    names
}

/// Replace whole identifiers for which `replace` returns a value
pub fn rewrite_identifiers(formula: &str, replace: impl Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(formula.len());
    let mut last = 0;
    for span in identifier_spans(formula) {
        if let Some(replacement) = replace(&formula[span.clone()]) {
            out.push_str(&formula[last..span.start]);
            out.push_str(&replacement);
            last = span.end;
        }
    }
    out.push_str(&formula[last..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::ComparisonOp;
    use pretty_assertions::assert_eq;

    fn intent(kind: IntentType, fields: &[&str], numbers: &[f64]) -> DetectedIntent {
        DetectedIntent {
            kind,
            confidence: 0.8,
            fields: fields.iter().map(|f| f.to_string()).collect(),
            operations: Vec::new(),
            numbers: numbers.to_vec(),
            ranges: Vec::new(),
            comparisons: Vec::new(),
            raw_input: String::new(),
            suggested_formula: None,
            description: String::new(),
        }
    }

    fn build(intent: &DetectedIntent) -> BuiltFormula {
        FormulaBuilder::new().build(intent, &BuildOptions::default())
    }

    #[test]
    fn test_margin_from_fields() {
        let built = build(&intent(IntentType::CalculateMargin, &["retailPrice", "costPrice"], &[]));
        assert_eq!(built.formula, "=(retailPrice-costPrice)/retailPrice*100");
        assert!(built.is_valid);
        assert_eq!(built.variables, vec!["retailPrice", "costPrice"]);
        assert!(built.warnings.is_empty());
    }

    #[test]
    fn test_fallback_fields_fill_but_warn() {
        let built = build(&intent(IntentType::CalculateProfit, &[], &[]));
        assert_eq!(built.formula, "=(retailPrice-costPrice)*quantity");
        assert!(built.is_valid);
        assert_eq!(
            built.warnings,
            vec![
                "Thiếu trường: retailPrice",
                "Thiếu trường: costPrice",
                "Thiếu trường: quantity"
            ]
        );
    }

    #[test]
    fn test_context_values_are_literals() {
        let mut options = BuildOptions::default();
        options.context.set("retailPrice", 200.0);
        options.context.set("costPrice", 150.0);
        let i = intent(IntentType::CalculateMargin, &[], &[]);

        let built = FormulaBuilder::new().build(&i, &options);
        assert_eq!(built.formula, "=(200-150)/200*100");
        assert!(built.variables.is_empty());

        options.prefer_cell_references = true;
        let built = FormulaBuilder::new().build(&i, &options);
        assert_eq!(built.formula, "=(retailPrice-costPrice)/retailPrice*100");
    }

    #[test]
    fn test_unresolved_slots_stay_visible() {
        let built = build(&intent(IntentType::CalculateDiscount, &["retailPrice"], &[]));
        assert_eq!(built.formula, "=retailPrice*(1-${number}/100)");
        assert!(!built.is_valid);
        assert!(built.warnings.iter().any(|w| w.contains("${number}")));
    }

    #[test]
    fn test_number_from_context() {
        let mut options = BuildOptions::default();
        options.context.set("number", 8.0);
        let built = FormulaBuilder::new().build(&intent(IntentType::CalculateTax, &["retailPrice"], &[]), &options);
        assert_eq!(built.formula, "=retailPrice*8/100");
    }

    #[test]
    fn test_range_resolution_order() {
        let mut i = intent(IntentType::SumRange, &["quantity"], &[]);
        assert_eq!(build(&i).formula, "=SUM(quantity:quantity)");

        i.ranges = vec!["B2:B9".into()];
        assert_eq!(build(&i).formula, "=SUM(B2:B9)");

        let mut options = BuildOptions::default();
        options.context.set("range", "C1:C4");
        let bare = intent(IntentType::MaxValue, &[], &[]);
        assert_eq!(FormulaBuilder::new().build(&bare, &options).formula, "=MAX(C1:C4)");
        assert!(!build(&bare).is_valid);
    }

    #[test]
    fn test_lookup_needs_a_real_table() {
        let mut i = intent(IntentType::Lookup, &["sku"], &[]);
        let built = build(&i);
        assert_eq!(built.formula, "=VLOOKUP(sku,${range},2,FALSE)");
        assert!(!built.is_valid);
        assert!(built.warnings.iter().any(|w| w.contains("${range}")));

        i.ranges = vec!["A2:C50".into()];
        let built = build(&i);
        assert_eq!(built.formula, "=VLOOKUP(sku,A2:C50,2,FALSE)");
        assert!(built.is_valid);
    }

    #[test]
    fn test_missing_fields_stay_bare_identifiers() {
        let mut i = intent(IntentType::Lookup, &[], &[]);
        i.ranges = vec!["A2:C50".into()];
        let built = build(&i);
        assert_eq!(built.formula, "=VLOOKUP(sku,A2:C50,2,FALSE)");
        assert!(built.is_valid);
        assert_eq!(built.warnings, vec!["Thiếu trường: sku"]);
    }

    #[test]
    fn test_conditional_uses_detected_comparison() {
        let mut i = intent(IntentType::Conditional, &["stock"], &[5.0]);
        i.comparisons = vec![ComparisonOp::Less];
        assert_eq!(build(&i).formula, "=IF(stock<5,\"Đạt\",\"Không đạt\")");

        i.comparisons.clear();
        assert_eq!(build(&i).formula, "=IF(stock>=5,\"Đạt\",\"Không đạt\")");
    }

    #[test]
    fn test_conditional_branches_from_context() {
        let mut options = BuildOptions::default();
        options.context.set("condition", "margin>30");
        options.context.set("trueValue", "Tốt");
        options.context.set("falseValue", 0.0);
        let built = FormulaBuilder::new().build(&intent(IntentType::Conditional, &[], &[]), &options);
        assert_eq!(built.formula, "=IF(margin>30,\"Tốt\",0)");
    }

    #[test]
    fn test_unknown_and_custom() {
        let unknown = build(&intent(IntentType::Unknown, &[], &[]));
        assert!(!unknown.is_valid);
        assert_eq!(unknown.formula, "");
        assert_eq!(unknown.warnings.len(), 1);

        let mut custom = intent(IntentType::CustomFormula, &[], &[]);
        custom.suggested_formula = Some("=SUM(retailPrice,costPrice)".into());
        let built = build(&custom);
        assert!(built.is_valid);
        assert_eq!(built.variables, vec!["retailPrice", "costPrice"]);
    }

    #[test]
    fn test_cell_reference_rewrite_respects_boundaries() {
        let mut custom = intent(IntentType::CustomFormula, &[], &[]);
        custom.suggested_formula = Some("=price+priceTotal&\"price\"".into());
        let refs: HashMap<String, String> = [("price".to_string(), "B2".to_string())].into();

        let built = FormulaBuilder::new().build_with_cell_references(&custom, &refs, &BuildOptions::default());
        assert_eq!(built.formula, "=B2+priceTotal&\"price\"");
        assert_eq!(built.variables, vec!["B2", "priceTotal"]);
    }

    #[test]
    fn test_validate_syntax() {
        assert!(validate_syntax("=(1+2)*3").is_empty());
        assert_eq!(validate_syntax("1+2").len(), 1);
        assert_eq!(validate_syntax("=(1+2").len(), 1);
        assert_eq!(validate_syntax("=)1+2(").len(), 1);
        assert_eq!(validate_syntax("=1//2").len(), 1);
        assert_eq!(validate_syntax("=1+").len(), 1);
        assert!(validate_syntax("=IF(a>1,\"(\",\")\")").is_empty());
    }

    #[test]
    fn test_variables_skip_functions_and_literals() {
        assert_eq!(
            variables("=IF(ISBLANK(A1), #N/A, SUM($B$2:B9)*1.5e3) & TRUE"),
            vec!["A1", "$B$2", "B9"]
        );
    }
}
