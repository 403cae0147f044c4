//! Mapping suggestions from extracted PDF fields onto a target schema.
//!
//! The rule pass is deterministic and always runs; the generative-model
//! pass is best-effort and merged in by confidence. Low-confidence
//! suggestions are flagged for human review, never rejected.

pub mod patterns;

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::extract::ExtractedField;
use crate::form::FieldType;
use crate::normalize::normalize;

/// Confidence assigned to a direct pattern-table hit
pub const RULE_CONFIDENCE: f64 = 0.9;
/// Cap for overlap-scored matches
const OVERLAP_CAP: f64 = 0.95;
/// Bonus when source and target declared types are compatible
const TYPE_BONUS: f64 = 0.1;

/// How a suggestion was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SuggestionMethod {
    RuleBased,
    Ai,
    AiEnhanced,
}

/// One proposed `pdfField -> schemaField` mapping
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MappingSuggestion {
    pub pdf_field: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pdf_field_id: Option<String>,
    /// Dot path into the target schema; `None` when nothing matched
    pub suggested_mapping: Option<String>,
    /// Always within [0, 1]
    pub confidence: f64,
    pub method: SuggestionMethod,
    pub reasoning: String,
    /// Set by validation when the confidence falls below the review
    /// threshold
    #[serde(default)]
    pub needs_review: bool,
}

/// One target field in the schema the PDF is being mapped onto
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaField {
    #[serde(rename = "type", default)]
    pub field_type: FieldType,
    #[serde(default)]
    pub description: String,
}

/// Target schema: field name (dot path) -> declared type and description
pub type TargetSchema = BTreeMap<String, SchemaField>;

/// The built-in resale-certificate target schema, used when the caller
/// does not provide one.
pub fn default_target_schema() -> TargetSchema {
    let mut schema = TargetSchema::new();
    let mut insert = |name: &str, field_type: FieldType, description: &str| {
        schema.insert(
            name.to_string(),
            SchemaField {
                field_type,
                description: description.to_string(),
            },
        );
    };

    insert("buyerName", FieldType::Text, "Full name of the buyer");
    insert("buyerEmail", FieldType::Email, "Buyer email address");
    insert("buyerPhone", FieldType::Tel, "Buyer phone number");
    insert("sellerName", FieldType::Text, "Full name of the seller");
    insert("sellerEmail", FieldType::Email, "Seller email address");
    insert("sellerPhone", FieldType::Tel, "Seller phone number");
    insert("propertyAddress", FieldType::Text, "Street address of the property");
    insert("unitNumber", FieldType::Text, "Unit number within the community");
    insert("lotNumber", FieldType::Text, "Lot number within the community");
    insert("closingDate", FieldType::Date, "Expected closing or settlement date");
    insert("purchasePrice", FieldType::Number, "Agreed purchase price");
    insert("assessmentAmount", FieldType::Number, "Periodic assessment amount");
    insert("transferFee", FieldType::Number, "One-time transfer fee");
    insert("associationName", FieldType::Text, "Name of the homeowners association");
    insert("managementCompany", FieldType::Text, "Management company of record");
    insert("titleCompany", FieldType::Text, "Title company handling the closing");
    insert("escrowNumber", FieldType::Text, "Escrow or file number");

    schema
}

/// Deterministic rule pass: pattern table first, word overlap second.
/// Every input field yields exactly one suggestion (possibly unmatched).
pub fn rule_suggestions(
    fields: &[ExtractedField],
    schema: &TargetSchema,
) -> Vec<MappingSuggestion> {
    fields
        .iter()
        .map(|field| {
            if let Some(target) = patterns::rule_target(&field.name) {
                // only propose targets the schema actually declares
                if schema.contains_key(target) {
                    return MappingSuggestion {
                        pdf_field: field.name.clone(),
                        pdf_field_id: Some(field.id.clone()),
                        suggested_mapping: Some(target.to_string()),
                        confidence: RULE_CONFIDENCE,
                        method: SuggestionMethod::RuleBased,
                        reasoning: format!("Pattern match on field name for {}", target),
                        needs_review: false,
                    };
                }
            }

            best_overlap_suggestion(field, schema)
        })
        .collect()
}

fn best_overlap_suggestion(field: &ExtractedField, schema: &TargetSchema) -> MappingSuggestion {
    let mut best: Option<(&str, f64, f64)> = None;

    for (target, spec) in schema {
        let ratio = word_overlap_ratio(target, &field.name);
        if ratio <= 0.0 {
            continue;
        }
        let bonus = if types_compatible(field.field_type, spec.field_type) {
            TYPE_BONUS
        } else {
            0.0
        };
        let confidence = (ratio * 0.8 + bonus).min(OVERLAP_CAP);
        if best.map(|(_, c, _)| confidence > c).unwrap_or(true) {
            best = Some((target.as_str(), confidence, ratio));
        }
    }

    match best {
        Some((target, confidence, ratio)) => MappingSuggestion {
            pdf_field: field.name.clone(),
            pdf_field_id: Some(field.id.clone()),
            suggested_mapping: Some(target.to_string()),
            confidence,
            method: SuggestionMethod::RuleBased,
            reasoning: format!(
                "Word overlap {:.0}% with {}",
                ratio * 100.0,
                target
            ),
            needs_review: false,
        },
        None => MappingSuggestion {
            pdf_field: field.name.clone(),
            pdf_field_id: Some(field.id.clone()),
            suggested_mapping: None,
            confidence: 0.0,
            method: SuggestionMethod::RuleBased,
            reasoning: "No pattern or word overlap with the target schema".to_string(),
            needs_review: false,
        },
    }
}

/// Jaccard overlap of the normalized word sets of two field names.
fn word_overlap_ratio(a: &str, b: &str) -> f64 {
    let words_a = name_words(a);
    let words_b = name_words(b);
    if words_a.is_empty() || words_b.is_empty() {
        return 0.0;
    }

    let shared = words_a.intersection(&words_b).count();
    let union = words_a.union(&words_b).count();
    shared as f64 / union as f64
}

fn name_words(name: &str) -> HashSet<String> {
    normalize(name)
        .split_whitespace()
        .map(|w| w.to_lowercase())
        .collect()
}

/// Declared-type compatibility for the overlap bonus.
fn types_compatible(a: FieldType, b: FieldType) -> bool {
    use FieldType::*;
    if a == b {
        return true;
    }
    let text_family = |t: FieldType| matches!(t, Text | Textarea | Email | Tel | Date);
    let choice_family = |t: FieldType| matches!(t, Select | Radio | Checkbox);
    (text_family(a) && text_family(b)) || (choice_family(a) && choice_family(b))
}

/// Merge the AI pass into the rule pass.
///
/// Same `pdf_field` in both: the higher-confidence entry survives, tagged
/// `ai-enhanced`. AI-only entries are appended tagged `ai`. The result is
/// sorted by descending confidence.
pub fn merge_suggestions(
    rule: Vec<MappingSuggestion>,
    ai: Vec<MappingSuggestion>,
) -> Vec<MappingSuggestion> {
    let mut merged = rule;

    for ai_suggestion in ai {
        match merged
            .iter_mut()
            .find(|s| s.pdf_field == ai_suggestion.pdf_field)
        {
            Some(existing) => {
                if ai_suggestion.confidence > existing.confidence {
                    let pdf_field_id = existing.pdf_field_id.take();
                    *existing = ai_suggestion;
                    if existing.pdf_field_id.is_none() {
                        existing.pdf_field_id = pdf_field_id;
                    }
                }
                existing.method = SuggestionMethod::AiEnhanced;
            }
            None => {
                let mut appended = ai_suggestion;
                appended.method = SuggestionMethod::Ai;
                merged.push(appended);
            }
        }
    }

    merged.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    merged
}

/// Clamp confidences into [0, 1] and flag entries below the review
/// threshold. Flagging never removes a suggestion.
pub fn validate_suggestions(suggestions: &mut [MappingSuggestion], review_threshold: f64) {
    let mut flagged = 0usize;
    for suggestion in suggestions.iter_mut() {
        suggestion.confidence = suggestion.confidence.clamp(0.0, 1.0);
        suggestion.needs_review = suggestion.confidence < review_threshold;
        if suggestion.needs_review {
            flagged += 1;
        }
    }
    if flagged > 0 {
        debug!(flagged, "Mapping suggestions flagged for human review");
    }
}

// ── AI pass plumbing ─────────────────────────────────────────────────

/// Prompt asking the text model for strict-JSON mapping suggestions.
pub fn build_mapping_prompt(fields: &[ExtractedField], schema: &TargetSchema) -> String {
    let field_lines: Vec<String> = fields
        .iter()
        .map(|f| format!("- \"{}\" (type: {})", f.name, f.field_type))
        .collect();
    let schema_lines: Vec<String> = schema
        .iter()
        .map(|(name, spec)| format!("- {} ({}): {}", name, spec.field_type, spec.description))
        .collect();

    format!(
        "You are mapping fields extracted from a fillable PDF onto a fixed target schema.\n\
         \n\
         PDF fields:\n{}\n\
         \n\
         Target schema fields:\n{}\n\
         \n\
         For each PDF field, propose the best target schema field or null if none fits.\n\
         Respond with strict JSON only, no prose, in the shape:\n\
         {{\"mappings\": [{{\"pdfField\": \"...\", \"suggestedMapping\": \"...\" or null, \
         \"confidence\": 0.0, \"reasoning\": \"...\"}}]}}\n\
         Confidence must be between 0 and 1.",
        field_lines.join("\n"),
        schema_lines.join("\n"),
    )
}

#[derive(Debug, Deserialize)]
struct AiMappingEnvelope {
    #[serde(default)]
    mappings: Vec<AiMappingRow>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AiMappingRow {
    pdf_field: String,
    #[serde(default)]
    suggested_mapping: Option<String>,
    #[serde(default)]
    confidence: f64,
    #[serde(default)]
    reasoning: String,
}

/// Parse the model's JSON into suggestions. Unknown schema targets are
/// dropped; a malformed response yields `None` and the caller keeps the
/// rule-pass result.
pub fn parse_ai_response(text: &str, schema: &TargetSchema) -> Option<Vec<MappingSuggestion>> {
    let json = extract_json_object(text)?;
    let envelope: AiMappingEnvelope = serde_json::from_str(json).ok()?;

    let suggestions = envelope
        .mappings
        .into_iter()
        .filter(|row| {
            row.suggested_mapping
                .as_ref()
                .map(|target| schema.contains_key(target))
                .unwrap_or(true)
        })
        .map(|row| MappingSuggestion {
            pdf_field: row.pdf_field,
            pdf_field_id: None,
            suggested_mapping: row.suggested_mapping,
            confidence: row.confidence.clamp(0.0, 1.0),
            method: SuggestionMethod::Ai,
            reasoning: row.reasoning,
            needs_review: false,
        })
        .collect();

    Some(suggestions)
}

/// Models often wrap JSON in prose or code fences; take the outermost
/// object.
pub(crate) fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    Some(&text[start..=end])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extracted(name: &str, field_type: FieldType) -> ExtractedField {
        ExtractedField {
            id: format!("pdf_{}", name),
            name: name.to_string(),
            formatted_name: None,
            original_pdf_name: None,
            field_type,
            required: false,
            value: None,
            page: 1,
        }
    }

    #[test]
    fn test_buyername_rule_hit() {
        let fields = vec![extracted("BUYERNAME", FieldType::Text)];
        let suggestions = rule_suggestions(&fields, &default_target_schema());

        assert_eq!(suggestions.len(), 1);
        assert_eq!(suggestions[0].suggested_mapping.as_deref(), Some("buyerName"));
        assert_eq!(suggestions[0].confidence, RULE_CONFIDENCE);
        assert_eq!(suggestions[0].method, SuggestionMethod::RuleBased);
    }

    #[test]
    fn test_confidence_always_in_range() {
        let schema = default_target_schema();
        let fields = vec![
            extracted("BUYERNAME", FieldType::Text),
            extracted("escrow_file_number", FieldType::Text),
            extracted("notary_stamp", FieldType::Text),
            extracted("price_total_amount", FieldType::Number),
        ];
        let mut suggestions = rule_suggestions(&fields, &schema);
        validate_suggestions(&mut suggestions, 0.5);

        for s in &suggestions {
            assert!((0.0..=1.0).contains(&s.confidence), "{:?}", s.confidence);
        }
    }

    #[test]
    fn test_unmatched_field_flagged_for_review() {
        let fields = vec![extracted("notary_stamp", FieldType::Text)];
        let mut suggestions = rule_suggestions(&fields, &default_target_schema());
        validate_suggestions(&mut suggestions, 0.5);

        assert_eq!(suggestions[0].suggested_mapping, None);
        assert!(suggestions[0].needs_review);
    }

    #[test]
    fn test_type_bonus_applies_to_overlap() {
        let mut schema = TargetSchema::new();
        schema.insert(
            "inspectionDate".to_string(),
            SchemaField {
                field_type: FieldType::Date,
                description: String::new(),
            },
        );

        let date_field = vec![extracted("inspection_date", FieldType::Date)];
        let with_bonus = rule_suggestions(&date_field, &schema);

        let number_field = vec![extracted("inspection_date", FieldType::Number)];
        let without_bonus = rule_suggestions(&number_field, &schema);

        assert!(with_bonus[0].confidence > without_bonus[0].confidence);
        assert!((with_bonus[0].confidence - without_bonus[0].confidence - TYPE_BONUS).abs() < 1e-9);
    }

    #[test]
    fn test_merge_keeps_higher_confidence() {
        let rule = vec![MappingSuggestion {
            pdf_field: "closing".to_string(),
            pdf_field_id: Some("pdf_1".to_string()),
            suggested_mapping: Some("closingDate".to_string()),
            confidence: 0.9,
            method: SuggestionMethod::RuleBased,
            reasoning: "rule".to_string(),
            needs_review: false,
        }];
        let ai = vec![MappingSuggestion {
            pdf_field: "closing".to_string(),
            pdf_field_id: None,
            suggested_mapping: Some("settlementDate".to_string()),
            confidence: 0.6,
            method: SuggestionMethod::Ai,
            reasoning: "ai".to_string(),
            needs_review: false,
        }];

        let merged = merge_suggestions(rule, ai);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].suggested_mapping.as_deref(), Some("closingDate"));
        assert_eq!(merged[0].confidence, 0.9);
        assert_eq!(merged[0].method, SuggestionMethod::AiEnhanced);
    }

    #[test]
    fn test_merge_ai_override_and_append() {
        let rule = vec![MappingSuggestion {
            pdf_field: "mystery".to_string(),
            pdf_field_id: Some("pdf_9".to_string()),
            suggested_mapping: None,
            confidence: 0.0,
            method: SuggestionMethod::RuleBased,
            reasoning: "none".to_string(),
            needs_review: false,
        }];
        let ai = vec![
            MappingSuggestion {
                pdf_field: "mystery".to_string(),
                pdf_field_id: None,
                suggested_mapping: Some("escrowNumber".to_string()),
                confidence: 0.7,
                method: SuggestionMethod::Ai,
                reasoning: "context".to_string(),
                needs_review: false,
            },
            MappingSuggestion {
                pdf_field: "extra".to_string(),
                pdf_field_id: None,
                suggested_mapping: Some("unitNumber".to_string()),
                confidence: 0.55,
                method: SuggestionMethod::Ai,
                reasoning: "ai only".to_string(),
                needs_review: false,
            },
        ];

        let merged = merge_suggestions(rule, ai);
        assert_eq!(merged.len(), 2);

        let mystery = merged.iter().find(|s| s.pdf_field == "mystery").unwrap();
        assert_eq!(mystery.method, SuggestionMethod::AiEnhanced);
        assert_eq!(mystery.confidence, 0.7);
        // the rule pass's field id survives the override
        assert_eq!(mystery.pdf_field_id.as_deref(), Some("pdf_9"));

        let extra = merged.iter().find(|s| s.pdf_field == "extra").unwrap();
        assert_eq!(extra.method, SuggestionMethod::Ai);

        // sorted by descending confidence
        assert!(merged[0].confidence >= merged[1].confidence);
    }

    #[test]
    fn test_parse_ai_response_with_fences() {
        let schema = default_target_schema();
        let text = "Here you go:\n```json\n{\"mappings\": [{\"pdfField\": \"X\", \
                    \"suggestedMapping\": \"buyerName\", \"confidence\": 0.8, \
                    \"reasoning\": \"looks like a name\"}]}\n```";
        let parsed = parse_ai_response(text, &schema).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].suggested_mapping.as_deref(), Some("buyerName"));
    }

    #[test]
    fn test_parse_ai_response_malformed_is_none() {
        let schema = default_target_schema();
        assert!(parse_ai_response("no json here", &schema).is_none());
        assert!(parse_ai_response("{not valid", &schema).is_none());
    }

    #[test]
    fn test_parse_ai_response_drops_unknown_targets() {
        let schema = default_target_schema();
        let text = "{\"mappings\": [{\"pdfField\": \"X\", \"suggestedMapping\": \
                    \"notARealTarget\", \"confidence\": 0.9, \"reasoning\": \"\"}]}";
        let parsed = parse_ai_response(text, &schema).unwrap();
        assert!(parsed.is_empty());
    }
}
