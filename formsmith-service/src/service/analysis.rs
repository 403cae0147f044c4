//! The extraction → vision fallback → mapping pipeline.
//!
//! Runs on the background worker against a copy of the uploaded bytes;
//! nothing here touches a live editing session. Vision and AI-mapping
//! failures degrade to the best deterministic result; only a total absence
//! of usable fields after every fallback surfaces as a failure.

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::db::AnalysisResults;
use crate::error::{JobError, ServiceResult};
use crate::extract::{self, ExtractedField};
use crate::form::{FieldPatch, FieldType, FieldWidth, FormBuilder, FormStructure};
use crate::mapping::{self, MappingSuggestion, TargetSchema};
use crate::normalize::normalize;
use crate::service::FormsmithService;
use crate::vision::VisionInference;

impl FormsmithService {
    /// Run the full analysis pipeline over an uploaded PDF.
    pub(crate) async fn run_analysis_pipeline(
        &self,
        pdf_bytes: &[u8],
        target_schema: Option<TargetSchema>,
        cancel_token: &CancellationToken,
    ) -> ServiceResult<AnalysisResults> {
        // 1. Structural extraction. An unparseable document is fatal.
        let extraction = extract::extract_fields(pdf_bytes)?;

        let needs_vision = extraction.fields.is_empty() || extract::is_generic(&extraction);
        info!(
            fields = extraction.fields.len(),
            needs_vision, "Structural extraction finished"
        );

        if cancel_token.is_cancelled() {
            return Err(JobError::Cancelled.into());
        }

        // 2. Vision fallback when extraction yielded nothing usable.
        let mut form_title = extraction.title.clone();
        let mut fields = extraction.fields;
        let mut used_vision = false;

        if needs_vision {
            let context = vision_context(&fields, form_title.as_deref());
            match self.vision.infer_fields(pdf_bytes, &context).await {
                Ok(Some(inference)) => {
                    fields = fold_vision_fields(&fields, &inference);
                    if inference.form_title.is_some() {
                        form_title = inference.form_title;
                    }
                    used_vision = true;
                }
                Ok(None) => {
                    // unusable model response: keep the extracted set
                }
                Err(e) => {
                    warn!(error = %e, "Vision fallback unavailable, using normalized extracted names");
                }
            }
        }

        if fields.is_empty() {
            return Err(JobError::NoFieldsFound.into());
        }

        if cancel_token.is_cancelled() {
            return Err(JobError::Cancelled.into());
        }

        // 3. Mapping suggestions: rule pass always, AI pass best-effort.
        let schema = target_schema.unwrap_or_else(mapping::default_target_schema);
        let mut suggestions = mapping::rule_suggestions(&fields, &schema);

        if self.config.mapping.ai_pass {
            match self.ai_mapping_pass(&fields, &schema).await {
                Some(ai_suggestions) => {
                    suggestions = mapping::merge_suggestions(suggestions, ai_suggestions);
                }
                None => {
                    warn!("AI mapping pass unavailable, keeping rule-based suggestions");
                }
            }
        }

        mapping::validate_suggestions(&mut suggestions, self.config.mapping.review_threshold);

        // 4. Fold everything into a draft structure for the builder.
        let draft_structure = build_draft_structure(form_title.as_deref(), &fields, &suggestions);

        Ok(AnalysisResults {
            form_title,
            fields,
            suggestions,
            draft_structure,
            used_vision,
        })
    }

    /// Query the text model for mapping suggestions. Any failure is
    /// swallowed; the rule pass already produced a usable answer.
    async fn ai_mapping_pass(
        &self,
        fields: &[ExtractedField],
        schema: &TargetSchema,
    ) -> Option<Vec<MappingSuggestion>> {
        let prompt = mapping::build_mapping_prompt(fields, schema);

        let response = match self
            .vision
            .generate_text(&self.config.mapping.model, &prompt)
            .await
        {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "AI mapping generation failed");
                return None;
            }
        };

        mapping::parse_ai_response(&response, schema)
    }
}

/// Context string passed to the vision prompt: whatever structural
/// extraction did manage to find.
fn vision_context(fields: &[ExtractedField], title: Option<&str>) -> String {
    let mut lines = Vec::new();
    if let Some(title) = title {
        lines.push(format!("Document title: {}", title));
    }
    if !fields.is_empty() {
        let names: Vec<&str> = fields.iter().map(|f| f.name.as_str()).collect();
        lines.push(format!("Raw field names: {}", names.join(", ")));
    }
    lines.join("\n")
}

/// Replace the extracted set with the vision inference, preserving the
/// original PDF names when the counts line up.
fn fold_vision_fields(extracted: &[ExtractedField], inference: &VisionInference) -> Vec<ExtractedField> {
    let aligned = extracted.len() == inference.fields.len();

    inference
        .fields
        .iter()
        .enumerate()
        .map(|(i, vision_field)| {
            let original = aligned.then(|| extracted[i].clone());
            ExtractedField {
                id: original
                    .as_ref()
                    .map(|o| o.id.clone())
                    .unwrap_or_else(|| format!("vision_{}", i)),
                name: vision_field.label.clone(),
                formatted_name: Some(normalize(&vision_field.label)),
                original_pdf_name: original.as_ref().map(|o| o.name.clone()),
                field_type: vision_field.field_type,
                required: vision_field.required || original.as_ref().is_some_and(|o| o.required),
                value: original.and_then(|o| o.value),
                page: 1,
            }
        })
        .collect()
}

/// Build the draft `FormStructure` an editing session starts from.
///
/// Goes through the builder so the draft obeys the same id and default
/// rules as hand-built forms.
pub(crate) fn build_draft_structure(
    title: Option<&str>,
    fields: &[ExtractedField],
    suggestions: &[MappingSuggestion],
) -> FormStructure {
    let title = title.unwrap_or("Imported Form");
    let form_id = format!("form_{}", &uuid::Uuid::new_v4().simple().to_string()[..12]);
    let mut builder = FormBuilder::new(FormStructure::new(form_id, title));
    builder.add_section();

    for field in fields {
        let field_id = builder.add_field(field.field_type, None).id.clone();

        let label = field
            .formatted_name
            .clone()
            .unwrap_or_else(|| normalize(&field.name));
        let mapping = suggestions
            .iter()
            .find(|s| s.pdf_field == field.name)
            .and_then(|s| s.suggested_mapping.clone());
        let key = mapping
            .clone()
            .unwrap_or_else(|| snake_key(&label));

        builder.update_field(
            &field_id,
            FieldPatch {
                key: Some(key),
                label: Some(label),
                required: Some(field.required),
                width: Some(default_width(field.field_type)),
                default_value: Some(field.value.clone()),
                data_source: Some(mapping),
                pdf_mapping: Some(Some(
                    field
                        .original_pdf_name
                        .clone()
                        .unwrap_or_else(|| field.name.clone()),
                )),
                ..Default::default()
            },
        );
    }

    let structure = builder.into_structure();
    if let Some(section) = structure.sections.first() {
        info!(
            section_id = %section.id,
            fields = section.fields.len(),
            "Draft structure assembled"
        );
    }
    structure
}

fn default_width(field_type: FieldType) -> FieldWidth {
    if field_type.defaults_to_full_width() {
        FieldWidth::Full
    } else {
        FieldWidth::Half
    }
}

fn snake_key(label: &str) -> String {
    label
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect::<String>()
        .split('_')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("_")
}
