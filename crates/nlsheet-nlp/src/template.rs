//! Formula templates
//!
//! Templates are formula text with `${name}` placeholders. Each one is parsed
//! once into literal and slot segments so the builder substitutes by slot
//! identity instead of searching the text.

use crate::error::{NlpError, Result};
use crate::intent::IntentType;
use once_cell::sync::Lazy;
use std::fmt;
use tracing::warn;

/// What fills a slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotKind {
    /// A field identifier such as `retailPrice`
    Field,
    /// `range`
    Range,
    /// `condition`, `trueValue`, `falseValue`
    Conditional,
    /// `number`
    Number,
}

impl SlotKind {
    pub fn for_name(name: &str) -> Self {
        match name {
            "range" => SlotKind::Range,
            "condition" | "trueValue" | "falseValue" => SlotKind::Conditional,
            "number" => SlotKind::Number,
            _ => SlotKind::Field,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slot {
    pub name: String,
    pub kind: SlotKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    Slot(Slot),
}

/// A parsed template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    segments: Vec<Segment>,
}

impl Template {
    /// Parse template text.
    ///
    /// ```
    /// use nlsheet_nlp::template::{Segment, Template};
    ///
    /// let t = Template::parse("=SUM(${range})").unwrap();
    /// assert_eq!(t.segments().len(), 3);
    /// assert!(matches!(&t.segments()[1], Segment::Slot(s) if s.name == "range"));
    /// ```
    pub fn parse(text: &str) -> Result<Self> {
        let mut segments = Vec::new();
        let mut rest = text;

        while let Some(open) = rest.find("${") {
            if open > 0 {
                segments.push(Segment::Literal(rest[..open].to_string()));
            }
            let after = &rest[open + 2..];
            let close = after.find('}').ok_or_else(|| NlpError::Template {
                template: text.to_string(),
                message: "unterminated placeholder".into(),
            })?;
            let name = &after[..close];
            if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                return Err(NlpError::Template {
                    template: text.to_string(),
                    message: format!("invalid placeholder name '{}'", name),
                });
            }
            segments.push(Segment::Slot(Slot {
                name: name.to_string(),
                kind: SlotKind::for_name(name),
            }));
            rest = &after[close + 1..];
        }

        if !rest.is_empty() {
            segments.push(Segment::Literal(rest.to_string()));
        }

        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn slots(&self) -> impl Iterator<Item = &Slot> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Slot(slot) => Some(slot),
            Segment::Literal(_) => None,
        })
    }
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => f.write_str(text)?,
                Segment::Slot(slot) => write!(f, "${{{}}}", slot.name)?,
            }
        }
        Ok(())
    }
}

/// Template for one intent type
#[derive(Debug, Clone)]
pub struct FormulaTemplate {
    pub kind: IntentType,
    pub template: Template,
    /// Fields the text (or the build context) should mention
    pub required_fields: &'static [&'static str],
    pub description: &'static str,
}

struct TemplateSpec {
    kind: IntentType,
    text: &'static str,
    required_fields: &'static [&'static str],
    description: &'static str,
}

const TEMPLATE_SPECS: &[TemplateSpec] = &[
    TemplateSpec {
        kind: IntentType::CalculateMargin,
        text: "=(${retailPrice}-${costPrice})/${retailPrice}*100",
        required_fields: &["retailPrice", "costPrice"],
        description: "Biên lợi nhuận (%) = (giá bán - giá vốn) / giá bán × 100",
    },
    TemplateSpec {
        kind: IntentType::CalculateMarkup,
        text: "=(${retailPrice}-${costPrice})/${costPrice}*100",
        required_fields: &["retailPrice", "costPrice"],
        description: "Tỷ lệ lãi trên vốn (%) = (giá bán - giá vốn) / giá vốn × 100",
    },
    TemplateSpec {
        kind: IntentType::CalculateProfit,
        text: "=(${retailPrice}-${costPrice})*${quantity}",
        required_fields: &["retailPrice", "costPrice", "quantity"],
        description: "Lợi nhuận = (giá bán - giá vốn) × số lượng",
    },
    TemplateSpec {
        kind: IntentType::CalculateRevenue,
        text: "=${retailPrice}*${quantity}",
        required_fields: &["retailPrice", "quantity"],
        description: "Doanh thu = giá bán × số lượng",
    },
    TemplateSpec {
        kind: IntentType::CalculateDiscount,
        text: "=${retailPrice}*(1-${number}/100)",
        required_fields: &["retailPrice"],
        description: "Giá sau giảm = giá bán × (1 - phần trăm giảm / 100)",
    },
    TemplateSpec {
        kind: IntentType::CalculateTax,
        text: "=${retailPrice}*${number}/100",
        required_fields: &["retailPrice"],
        description: "Tiền thuế = giá bán × thuế suất / 100",
    },
    TemplateSpec {
        kind: IntentType::SumRange,
        text: "=SUM(${range})",
        required_fields: &[],
        description: "Tổng các giá trị trong vùng",
    },
    TemplateSpec {
        kind: IntentType::AverageRange,
        text: "=AVERAGE(${range})",
        required_fields: &[],
        description: "Trung bình các giá trị trong vùng",
    },
    TemplateSpec {
        kind: IntentType::CountItems,
        text: "=COUNT(${range})",
        required_fields: &[],
        description: "Đếm số ô có giá trị số trong vùng",
    },
    TemplateSpec {
        kind: IntentType::MinValue,
        text: "=MIN(${range})",
        required_fields: &[],
        description: "Giá trị nhỏ nhất trong vùng",
    },
    TemplateSpec {
        kind: IntentType::MaxValue,
        text: "=MAX(${range})",
        required_fields: &[],
        description: "Giá trị lớn nhất trong vùng",
    },
    TemplateSpec {
        kind: IntentType::Conditional,
        text: "=IF(${condition},${trueValue},${falseValue})",
        required_fields: &[],
        description: "Trả về giá trị theo điều kiện",
    },
    TemplateSpec {
        kind: IntentType::Lookup,
        text: "=VLOOKUP(${sku},${range},2,FALSE)",
        required_fields: &["sku"],
        description: "Tra cứu theo mã sản phẩm",
    },
];

static TEMPLATES: Lazy<Vec<FormulaTemplate>> = Lazy::new(|| {
    TEMPLATE_SPECS
        .iter()
        .filter_map(|spec| match Template::parse(spec.text) {
            Ok(template) => Some(FormulaTemplate {
                kind: spec.kind,
                template,
                required_fields: spec.required_fields,
                description: spec.description,
            }),
            Err(e) => {
                warn!(intent = %spec.kind, error = %e, "skipping formula template");
                None
            }
        })
        .collect()
});

/// All built-in templates, in catalog order
pub fn templates() -> &'static [FormulaTemplate] {
    &TEMPLATES
}

/// Template for an intent type, if it has one
pub fn template_for(kind: IntentType) -> Option<&'static FormulaTemplate> {
    TEMPLATES.iter().find(|t| t.kind == kind)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_segments() {
        let t = Template::parse("=(${retailPrice}-${costPrice})/${retailPrice}*100").unwrap();
        let slots: Vec<_> = t.slots().map(|s| s.name.as_str()).collect();
        assert_eq!(slots, vec!["retailPrice", "costPrice", "retailPrice"]);
        assert_eq!(
            t.segments()[0],
            Segment::Literal("=(".to_string())
        );
    }

    #[test]
    fn test_slot_kinds() {
        assert_eq!(SlotKind::for_name("range"), SlotKind::Range);
        assert_eq!(SlotKind::for_name("trueValue"), SlotKind::Conditional);
        assert_eq!(SlotKind::for_name("number"), SlotKind::Number);
        assert_eq!(SlotKind::for_name("sku"), SlotKind::Field);
    }

    #[test]
    fn test_display_round_trips_text() {
        let text = "=IF(${condition},${trueValue},${falseValue})";
        assert_eq!(Template::parse(text).unwrap().to_string(), text);
    }

    #[test]
    fn test_malformed_templates() {
        assert!(Template::parse("=SUM(${range)").is_err());
        assert!(Template::parse("=${}").is_err());
        assert!(Template::parse("=${a b}").is_err());
        assert_eq!(Template::parse("=1+2").unwrap().slots().count(), 0);
    }

    #[test]
    fn test_every_catalog_template_parses() {
        assert_eq!(templates().len(), TEMPLATE_SPECS.len());
        assert!(template_for(IntentType::Unknown).is_none());
        assert!(template_for(IntentType::CustomFormula).is_none());
    }
}
