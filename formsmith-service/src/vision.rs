//! Vision fallback: recover field labels from a page image when
//! structural extraction fails or is low-quality.
//!
//! Page 1 is rasterized at a fixed scale for legibility and sent to a
//! vision-capable model with a structured prompt. Every failure mode here
//! is recoverable: the pipeline degrades to the extracted names instead of
//! failing the analysis.

pub mod provider;

use base64::Engine;
use image::DynamicImage;
use pdfium_render::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::VisionConfig;
use crate::error::VisionError;
use crate::form::FieldType;
use crate::mapping::extract_json_object;
use provider::ModelBackend;

/// A field inferred from the page image
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisionField {
    pub label: String,
    #[serde(rename = "type", default)]
    pub field_type: FieldType,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub description: String,
}

/// Fields and title inferred by the vision model
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisionInference {
    #[serde(default)]
    pub form_title: Option<String>,
    #[serde(default)]
    pub fields: Vec<VisionField>,
}

/// Vision service over the configured provider chain
pub struct VisionService {
    config: VisionConfig,
    primary: ModelBackend,
    fallback: Option<ModelBackend>,
}

impl VisionService {
    pub fn new(config: VisionConfig) -> Result<Self, VisionError> {
        let timeout = config.request_timeout();
        let primary = ModelBackend::from_config(&config.primary, timeout)?;
        let fallback = config
            .fallback
            .as_ref()
            .map(|c| ModelBackend::from_config(c, timeout))
            .transpose()?;

        Ok(Self {
            config,
            primary,
            fallback,
        })
    }

    /// Availability of the primary backend, advisory only.
    pub async fn health_check(&self) -> bool {
        self.primary.health_check().await
    }

    /// Infer labeled fields from page 1 of the document.
    ///
    /// `Err` means the rasterizer or every configured backend failed;
    /// `Ok(None)` means a backend answered but the response was unusable.
    /// Callers treat both as "keep the extracted field set".
    pub async fn infer_fields(
        &self,
        pdf_bytes: &[u8],
        context: &str,
    ) -> Result<Option<VisionInference>, VisionError> {
        let image_base64 = rasterize_first_page(pdf_bytes, self.config.render_scale)?;
        let prompt = build_vision_prompt(context);

        let response = self.analyze_with_fallback(&prompt, &image_base64).await?;

        match parse_vision_response(&response) {
            Some(inference) => {
                info!(
                    fields = inference.fields.len(),
                    title = inference.form_title.as_deref().unwrap_or("<none>"),
                    "Vision inference complete"
                );
                Ok(Some(inference))
            }
            None => {
                warn!("Vision response unusable, keeping extracted field set");
                Ok(None)
            }
        }
    }

    /// Plain text generation against the same provider chain (no image),
    /// used by the AI mapping pass.
    pub async fn generate_text(&self, model: &str, prompt: &str) -> Result<String, VisionError> {
        let backend = self.primary.with_model(model);
        backend.analyze(prompt, None).await
    }

    async fn analyze_with_fallback(
        &self,
        prompt: &str,
        image_base64: &str,
    ) -> Result<String, VisionError> {
        match self.primary.analyze(prompt, Some(image_base64)).await {
            Ok(text) => Ok(text),
            Err(primary_err) => {
                warn!(
                    backend = %self.primary.describe(),
                    error = %primary_err,
                    "Primary vision backend failed"
                );
                match &self.fallback {
                    Some(fallback) => {
                        info!(backend = %fallback.describe(), "Trying fallback vision backend");
                        fallback.analyze(prompt, Some(image_base64)).await
                    }
                    None => Err(primary_err),
                }
            }
        }
    }
}

/// Render page 1 to a base64 PNG at the configured scale.
pub fn rasterize_first_page(pdf_bytes: &[u8], scale: f32) -> Result<String, VisionError> {
    let pdfium = create_pdfium()?;

    let document = pdfium
        .load_pdf_from_byte_slice(pdf_bytes, None)
        .map_err(|e| VisionError::Rasterize {
            page: 1,
            message: format!("Failed to load PDF for rendering: {:?}", e),
        })?;

    let pages = document.pages();
    let page = pages.get(0).map_err(|e| VisionError::Rasterize {
        page: 1,
        message: format!("Failed to get page 1: {:?}", e),
    })?;

    let target_width = (page.width().value * scale).ceil() as i32;
    let target_height = (page.height().value * scale).ceil() as i32;

    let config = PdfRenderConfig::new()
        .set_target_width(target_width)
        .set_target_height(target_height);

    let bitmap = page
        .render_with_config(&config)
        .map_err(|e| VisionError::Rasterize {
            page: 1,
            message: format!("Failed to render page: {:?}", e),
        })?;

    let image: DynamicImage = bitmap.as_image();

    let mut png = Vec::new();
    image
        .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
        .map_err(|e| VisionError::Rasterize {
            page: 1,
            message: format!("Failed to encode PNG: {}", e),
        })?;

    debug!(
        width = target_width,
        height = target_height,
        bytes = png.len(),
        "Rasterized page 1 for vision inference"
    );

    Ok(base64::engine::general_purpose::STANDARD.encode(&png))
}

/// Create a Pdfium instance (dynamically linked).
///
/// Searches for libpdfium in the current directory, vendor/pdfium/lib/,
/// then the system library paths. An unloadable library is the
/// `RenderUnavailable` degradation path, not a fatal error.
fn create_pdfium() -> Result<Pdfium, VisionError> {
    let bindings = Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
        .or_else(|_| {
            Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(
                "./vendor/pdfium/lib/",
            ))
        })
        .or_else(|_| Pdfium::bind_to_system_library())
        .map_err(|e| VisionError::RenderUnavailable {
            message: format!("Failed to load PDFium library: {:?}", e),
        })?;

    Ok(Pdfium::new(bindings))
}

/// Structured prompt enumerating the allowed type vocabulary and the
/// label formatting rules.
pub fn build_vision_prompt(context: &str) -> String {
    let context_block = if context.trim().is_empty() {
        String::new()
    } else {
        format!("\nContext from structural extraction:\n{}\n", context)
    };

    format!(
        "This is page 1 of a fillable form document. Identify the form's title and \
         every labeled input field a person would fill in.\n\
         {}\n\
         Allowed field types: text, textarea, email, tel, date, number, select, checkbox, \
         radio, signature.\n\
         Label formatting rules:\n\
         - No ALL-CAPS labels; use proper title case.\n\
         - Split concatenated words (\"BUYERNAME\" becomes \"Buyer Name\").\n\
         - Keep labels short; put qualifiers in the description.\n\
         \n\
         Respond with strict JSON only, no prose, in the shape:\n\
         {{\"formTitle\": \"...\", \"fields\": [{{\"label\": \"...\", \"type\": \"text\", \
         \"required\": false, \"description\": \"...\"}}]}}",
        context_block
    )
}

/// Parse the model response; `None` when the JSON is malformed or the
/// model signaled it could not read the document.
pub fn parse_vision_response(text: &str) -> Option<VisionInference> {
    let json = extract_json_object(text)?;
    let value: serde_json::Value = serde_json::from_str(json).ok()?;

    // a model echoing an internal error is not an inference
    if value.get("error").is_some() {
        return None;
    }

    let inference: VisionInference = serde_json::from_value(value).ok()?;

    let unreadable = inference
        .form_title
        .as_deref()
        .map(|t| {
            let lower = t.to_lowercase();
            lower.contains("unable to read") || lower.contains("cannot read") || lower == "error"
        })
        .unwrap_or(false);
    if unreadable {
        return None;
    }

    if inference.fields.is_empty() && inference.form_title.is_none() {
        return None;
    }

    Some(inference)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_response() {
        let text = r#"{"formTitle": "Resale Certificate",
            "fields": [{"label": "Buyer Name", "type": "text", "required": true,
                        "description": "Full legal name"}]}"#;
        let inference = parse_vision_response(text).unwrap();
        assert_eq!(inference.form_title.as_deref(), Some("Resale Certificate"));
        assert_eq!(inference.fields.len(), 1);
        assert_eq!(inference.fields[0].field_type, FieldType::Text);
    }

    #[test]
    fn test_parse_response_wrapped_in_prose() {
        let text = "Sure! Here is the JSON:\n{\"formTitle\": \"T\", \"fields\": []}";
        assert!(parse_vision_response(text).is_some());
    }

    #[test]
    fn test_error_echo_rejected() {
        assert!(parse_vision_response(r#"{"error": "something broke"}"#).is_none());
        assert!(
            parse_vision_response(r#"{"formTitle": "unable to read document", "fields": []}"#)
                .is_none()
        );
    }

    #[test]
    fn test_malformed_rejected() {
        assert!(parse_vision_response("not json at all").is_none());
        assert!(parse_vision_response("{\"formTitle\": ").is_none());
    }

    #[test]
    fn test_empty_inference_rejected() {
        assert!(parse_vision_response(r#"{"fields": []}"#).is_none());
    }

    #[test]
    fn test_prompt_lists_type_vocabulary() {
        let prompt = build_vision_prompt("");
        for ty in ["text", "checkbox", "radio", "signature", "select"] {
            assert!(prompt.contains(ty), "prompt missing type {}", ty);
        }
        assert!(prompt.contains("strict JSON"));
    }
}
