//! Interactive renderer: the data-entry surface.
//!
//! Produces a serializable input tree the editing client consumes.
//! Re-rendering after a value change is just calling `render_interactive`
//! again with the updated value store; the function is pure.

use serde::{Deserialize, Serialize};

use crate::form::structure::{FieldType, FieldWidth, FormStructure, SectionLayout};
use crate::render::{RenderInputs, display_text, format_currency, is_truthy, visibility};

/// What control an input node renders as
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum ControlKind {
    /// Static text, no input
    Static,
    /// Single-line input; `input_type` is the HTML-style type hint
    Input { input_type: String },
    TextArea,
    Select { options: Vec<String> },
    Checkbox { checked: bool },
    RadioGroup {
        options: Vec<String>,
        selected: Option<String>,
    },
    /// Currency-formatted number entry; `display` carries the formatted
    /// text shown on blur
    Currency { display: String },
    Signature { mode: SignatureMode },
}

/// How a signature field is captured
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SignatureMode {
    /// Empty prompt with a drawable canvas
    #[default]
    Draw,
    /// Name typed and rendered in a cursive font
    Typed,
    /// Uploaded image (background removed client-side)
    Image,
}

/// One rendered input
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputNode {
    pub field_id: String,
    pub key: String,
    pub label: String,
    pub required: bool,
    pub width: FieldWidth,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    /// Raw value as stored
    pub value: String,
    #[serde(flatten)]
    pub control: ControlKind,
}

/// One rendered section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderedSection {
    pub section_id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub layout: SectionLayout,
    pub collapsible: bool,
    pub fields: Vec<InputNode>,
}

/// The full interactive form tree
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractiveForm {
    pub form_id: String,
    pub title: String,
    pub sections: Vec<RenderedSection>,
    /// Completion over the canonical required-field set, in [0, 1]
    pub completion: f64,
}

/// Render the interactive surface for the current values.
pub fn render_interactive(structure: &FormStructure, inputs: &RenderInputs<'_>) -> InteractiveForm {
    let hidden = visibility::resolve_hidden(structure, inputs);

    let sections = structure
        .sections
        .iter()
        .filter(|section| !hidden.contains(&section.id))
        .map(|section| RenderedSection {
            section_id: section.id.clone(),
            title: section.title.clone(),
            description: section.description.clone(),
            layout: section.layout,
            collapsible: section.collapsible,
            fields: section
                .fields
                .iter()
                .filter(|field| !hidden.contains(&field.id))
                .map(|field| {
                    let value = inputs.resolve(field);
                    let text = display_text(&value);

                    let control = match field.field_type {
                        FieldType::Label => ControlKind::Static,
                        FieldType::Text => ControlKind::Input {
                            input_type: "text".to_string(),
                        },
                        FieldType::Email => ControlKind::Input {
                            input_type: "email".to_string(),
                        },
                        FieldType::Tel => ControlKind::Input {
                            input_type: "tel".to_string(),
                        },
                        FieldType::Date => ControlKind::Input {
                            input_type: "date".to_string(),
                        },
                        FieldType::Textarea => ControlKind::TextArea,
                        FieldType::Number if field.currency => ControlKind::Currency {
                            display: if text.is_empty() {
                                String::new()
                            } else {
                                format_currency(&text)
                            },
                        },
                        FieldType::Number => ControlKind::Input {
                            input_type: "number".to_string(),
                        },
                        FieldType::Select => ControlKind::Select {
                            options: field.options.clone(),
                        },
                        FieldType::Checkbox => ControlKind::Checkbox {
                            checked: is_truthy(&value),
                        },
                        FieldType::Radio => ControlKind::RadioGroup {
                            options: field.options.clone(),
                            selected: if text.is_empty() { None } else { Some(text.clone()) },
                        },
                        FieldType::Signature => ControlKind::Signature {
                            mode: signature_mode(&text),
                        },
                    };

                    InputNode {
                        field_id: field.id.clone(),
                        key: field.key.clone(),
                        label: field.label.clone(),
                        required: field.required,
                        width: field.width,
                        placeholder: field.placeholder.clone(),
                        value: text,
                        control,
                    }
                })
                .collect(),
        })
        .collect();

    InteractiveForm {
        form_id: structure.id.clone(),
        title: structure.title.clone(),
        sections,
        completion: structure.completion_fraction(inputs.values),
    }
}

/// Capture mode from the stored value: image data renders the image,
/// plain text renders in a cursive font, empty shows the drawing prompt.
fn signature_mode(value: &str) -> SignatureMode {
    if value.is_empty() {
        SignatureMode::Draw
    } else if value.starts_with("data:image") || value.ends_with(".png") || value.ends_with(".webp")
    {
        SignatureMode::Image
    } else {
        SignatureMode::Typed
    }
}
