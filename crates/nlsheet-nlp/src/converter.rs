//! End-to-end natural language → formula conversion

use crate::builder::{BuildOptions, BuiltFormula, FormulaBuilder};
use crate::intent::{DetectedIntent, IntentDetector, IntentType};
use crate::scoring;
use crate::template;
use nlsheet_formula::{evaluate, parse_formula, EvaluationContext, FormulaValue};
use serde::Serialize;
use std::time::Instant;
use tracing::debug;

/// Options for [`FormulaConverter::convert`]
#[derive(Debug, Clone)]
pub struct ConvertOptions {
    /// Detections below this are refused
    pub min_confidence: f64,
    /// Attach other plausible intents to the result
    pub include_alternatives: bool,
    pub max_alternatives: usize,
    pub build: BuildOptions,
    /// When set, the built formula is evaluated against this context
    pub test_context: Option<EvaluationContext>,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            min_confidence: scoring::MIN_INTENT_CONFIDENCE,
            include_alternatives: true,
            max_alternatives: 3,
            build: BuildOptions::default(),
            test_context: None,
        }
    }
}

/// Result of evaluating a converted formula against a test context
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Evaluation {
    pub value: Option<FormulaValue>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionResult {
    pub success: bool,
    pub formula: Option<String>,
    pub intent: DetectedIntent,
    pub formula_result: Option<BuiltFormula>,
    pub alternative_intents: Vec<DetectedIntent>,
    pub evaluation: Option<Evaluation>,
    pub error: Option<String>,
    pub execution_time_ms: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConvertCheck {
    pub can_convert: bool,
    pub confidence: f64,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Suggestion {
    pub formula: String,
    pub description: String,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateInfo {
    pub intent: IntentType,
    pub template: String,
    pub description: String,
    pub required_fields: Vec<String>,
}

/// Runs the whole pipeline: detect, build, optionally evaluate
#[derive(Debug, Clone, Default)]
pub struct FormulaConverter {
    detector: IntentDetector,
    builder: FormulaBuilder,
}

impl FormulaConverter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn convert(&self, text: &str, options: &ConvertOptions) -> ConversionResult {
        let started = Instant::now();
        let intent = self.detector.detect(text);

        let alternative_intents = if options.include_alternatives {
            self.detector
                .detect_all(text)
                .into_iter()
                .filter(|alt| alt.kind != intent.kind)
                .take(options.max_alternatives)
                .collect()
        } else {
            Vec::new()
        };

        if intent.confidence < options.min_confidence {
            debug!(confidence = intent.confidence, "confidence below threshold");
            let error = format!(
                "Không đủ tin cậy để tạo công thức (độ tin cậy {:.2} < {:.2})",
                intent.confidence, options.min_confidence
            );
            return ConversionResult {
                success: false,
                formula: None,
                intent,
                formula_result: None,
                alternative_intents,
                evaluation: None,
                error: Some(error),
                execution_time_ms: elapsed_ms(started),
            };
        }

        let built = self.builder.build(&intent, &options.build);
        let success = built.is_valid;
        let formula = (!built.formula.is_empty()).then(|| built.formula.clone());
        let error = (!success).then(|| {
            if built.warnings.is_empty() {
                "Công thức không hợp lệ".to_string()
            } else {
                built.warnings.join("; ")
            }
        });

        let evaluation = match (&options.test_context, success) {
            (Some(ctx), true) => Some(evaluate_formula(&built.formula, ctx)),
            _ => None,
        };

        debug!(intent = %intent.kind, success, formula = %built.formula, "converted");
        ConversionResult {
            success,
            formula,
            intent,
            formula_result: Some(built),
            alternative_intents,
            evaluation,
            error,
            execution_time_ms: elapsed_ms(started),
        }
    }

    /// Quick check whether `text` would convert
    pub fn can_convert(&self, text: &str) -> ConvertCheck {
        let intent = self.detector.detect(text);
        let can_convert = intent.kind != IntentType::Unknown
            && intent.confidence >= scoring::MIN_INTENT_CONFIDENCE;

        let reason = if can_convert {
            format!("Nhận diện: {}", intent.description)
        } else if intent.kind == IntentType::Unknown {
            "Không nhận diện được phép tính hoặc trường dữ liệu".to_string()
        } else {
            format!("Độ tin cậy thấp ({:.2})", intent.confidence)
        };

        ConvertCheck {
            can_convert,
            confidence: intent.confidence,
            reason,
        }
    }

    /// Formula suggestions for partially typed text. Empty input lists the
    /// built-in templates.
    pub fn suggest(&self, partial: &str, limit: usize) -> Vec<Suggestion> {
        if partial.trim().is_empty() {
            return template::templates()
                .iter()
                .take(limit)
                .map(|t| Suggestion {
                    formula: t.template.to_string(),
                    description: t.description.to_string(),
                    confidence: 0.0,
                })
                .collect();
        }

        let mut suggestions: Vec<Suggestion> = self
            .detector
            .detect_all(partial)
            .into_iter()
            .filter_map(to_suggestion)
            .collect();

        if suggestions.is_empty() {
            suggestions.extend(to_suggestion(self.detector.detect(partial)));
        }

        suggestions.truncate(limit);
        suggestions
    }

    /// The built-in template catalog
    pub fn templates(&self) -> Vec<TemplateInfo> {
        template::templates()
            .iter()
            .map(|t| TemplateInfo {
                intent: t.kind,
                template: t.template.to_string(),
                description: t.description.to_string(),
                required_fields: t.required_fields.iter().map(|f| f.to_string()).collect(),
            })
            .collect()
    }

    pub fn convert_batch<S: AsRef<str>>(
        &self,
        texts: &[S],
        options: &ConvertOptions,
    ) -> Vec<ConversionResult> {
        texts
            .iter()
            .map(|text| self.convert(text.as_ref(), options))
            .collect()
    }
}

fn to_suggestion(intent: DetectedIntent) -> Option<Suggestion> {
    let formula = intent.suggested_formula?;
    Some(Suggestion {
        formula,
        description: intent.description,
        confidence: intent.confidence,
    })
}

fn evaluate_formula(formula: &str, ctx: &EvaluationContext) -> Evaluation {
    match parse_formula(formula) {
        Ok(ast) => match evaluate(&ast, ctx) {
            FormulaValue::Error(e) => Evaluation {
                value: Some(FormulaValue::Error(e)),
                error: Some(e.to_string()),
            },
            value => Evaluation {
                value: Some(value),
                error: None,
            },
        },
        Err(e) => Evaluation {
            value: None,
            error: Some(e.to_string()),
        },
    }
}

fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use nlsheet_formula::CellError;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_convert_margin_and_evaluate() {
        let mut options = ConvertOptions::default();
        options.test_context = Some(
            [("retailPrice", 100.0), ("costPrice", 40.0)]
                .into_iter()
                .collect(),
        );

        let result = FormulaConverter::new().convert("tính margin từ giá bán và giá vốn", &options);
        assert!(result.success);
        assert_eq!(
            result.formula.as_deref(),
            Some("=(retailPrice-costPrice)/retailPrice*100")
        );
        assert_eq!(
            result.evaluation,
            Some(Evaluation {
                value: Some(FormulaValue::Number(60.0)),
                error: None
            })
        );
        assert_eq!(result.error, None);
    }

    #[test]
    fn test_evaluation_errors_are_reported() {
        let mut options = ConvertOptions::default();
        options.test_context = Some([("retailPrice", 0.0), ("costPrice", 40.0)].into_iter().collect());

        let result = FormulaConverter::new().convert("tính margin từ giá bán và giá vốn", &options);
        let evaluation = result.evaluation.unwrap();
        assert_eq!(evaluation.value, Some(FormulaValue::Error(CellError::Div0)));
        assert_eq!(evaluation.error.as_deref(), Some("#DIV/0!"));
    }

    #[test]
    fn test_low_confidence_is_refused() {
        let result = FormulaConverter::new().convert("asdkjfh 293u4", &ConvertOptions::default());
        assert!(!result.success);
        assert_eq!(result.formula, None);
        assert!(result.error.is_some());
        assert!(result.intent.confidence < 0.3);
    }

    #[test]
    fn test_invalid_build_reports_warnings() {
        let result = FormulaConverter::new().convert("tính thuế vat", &ConvertOptions::default());
        assert_eq!(result.intent.kind, IntentType::CalculateTax);
        assert!(!result.success);
        assert!(result.error.unwrap().contains("${number}"));
    }

    #[test]
    fn test_alternatives_exclude_winner() {
        let result = FormulaConverter::new().convert(
            "tính lợi nhuận từ giá bán, giá vốn và số lượng",
            &ConvertOptions::default(),
        );
        assert_eq!(result.intent.kind, IntentType::CalculateProfit);
        assert!(result
            .alternative_intents
            .iter()
            .all(|alt| alt.kind != IntentType::CalculateProfit));
        assert!(result
            .alternative_intents
            .iter()
            .any(|alt| alt.kind == IntentType::CalculateRevenue));

        let mut options = ConvertOptions::default();
        options.include_alternatives = false;
        let result = FormulaConverter::new().convert("tính lợi nhuận từ giá bán", &options);
        assert!(result.alternative_intents.is_empty());
    }

    #[test]
    fn test_can_convert() {
        let converter = FormulaConverter::new();
        assert!(converter.can_convert("tổng A1:A10").can_convert);
        let check = converter.can_convert("asdkjfh 293u4");
        assert!(!check.can_convert);
        assert!(check.confidence < 0.3);
    }

    #[test]
    fn test_suggest() {
        let converter = FormulaConverter::new();

        let listed = converter.suggest("", 3);
        assert_eq!(listed.len(), 3);
        assert_eq!(listed[0].formula, "=(${retailPrice}-${costPrice})/${retailPrice}*100");
        assert!(listed.iter().all(|s| s.confidence == 0.0));

        let suggestions = converter.suggest("trung bình A1:A9", 5);
        assert_eq!(suggestions[0].formula, "=AVERAGE(A1:A9)");

        let custom = converter.suggest("giá bán trừ giá vốn", 5);
        assert_eq!(custom.len(), 1);
        assert_eq!(custom[0].formula, "=retailPrice-costPrice");

        assert!(converter.suggest("asdkjfh", 5).is_empty());
    }

    #[test]
    fn test_templates() {
        let templates = FormulaConverter::new().templates();
        assert_eq!(templates.len(), 13);
        let lookup = templates
            .iter()
            .find(|t| t.intent == IntentType::Lookup)
            .unwrap();
        assert_eq!(lookup.template, "=VLOOKUP(${sku},${range},2,FALSE)");
        assert_eq!(lookup.required_fields, vec!["sku"]);
    }

    #[test]
    fn test_convert_batch() {
        let results = FormulaConverter::new().convert_batch(
            &["tổng A1:A3", "asdkjfh"],
            &ConvertOptions::default(),
        );
        assert_eq!(results.len(), 2);
        assert!(results[0].success);
        assert!(!results[1].success);
    }

    #[test]
    fn test_result_serializes_camel_case() {
        let result = FormulaConverter::new().convert("tổng A1:A3", &ConvertOptions::default());
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["formula"], "=SUM(A1:A3)");
        assert_eq!(json["formulaResult"]["isValid"], true);
        assert!(json["executionTimeMs"].is_number());
    }
}
