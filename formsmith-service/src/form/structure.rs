//! Form structure data model.
//!
//! This is the wire format exchanged with the persistence layer and both
//! renderers: `{ sections: [{ id, title, layout, fields: [...] }] }` with
//! camelCase keys. Section order and field order are display order.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Input/output unit vocabulary for a form field
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, Default,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum FieldType {
    /// Static text, no input
    Label,
    #[default]
    Text,
    Textarea,
    Email,
    Tel,
    Date,
    Number,
    Select,
    Checkbox,
    Radio,
    Signature,
}

impl FieldType {
    /// Types that render as a choice among options
    pub fn has_options(&self) -> bool {
        matches!(self, FieldType::Select | FieldType::Radio)
    }

    /// Types that default to spanning the full row
    pub fn defaults_to_full_width(&self) -> bool {
        matches!(
            self,
            FieldType::Textarea | FieldType::Label | FieldType::Signature
        )
    }
}

/// Horizontal span of a field within its section's column grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FieldWidth {
    #[default]
    Half,
    Full,
}

/// Column layout of a section
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum SectionLayout {
    SingleColumn,
    #[default]
    TwoColumn,
    ThreeColumn,
}

impl SectionLayout {
    pub fn column_count(&self) -> usize {
        match self {
            SectionLayout::SingleColumn => 1,
            SectionLayout::TwoColumn => 2,
            SectionLayout::ThreeColumn => 3,
        }
    }
}

/// Whether a matching visibility condition shows or hides its target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VisibilityAction {
    Show,
    Hide,
}

/// Conditional show/hide coupling between a source field and a target
/// field or section.
///
/// A rule is inert until its target id resolves to something in the
/// structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisibilityRule {
    pub action: VisibilityAction,
    pub target_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_field_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

/// One input/output unit in a form
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Field {
    pub id: String,
    pub key: String,
    pub label: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub width: FieldWidth,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
    /// Choice list, meaningful for select/radio only
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
    /// Number fields only: format as currency
    #[serde(default)]
    pub currency: bool,
    /// Formula over other field ids, e.g. `assessment + transfer_fee`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub computation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conditional_logic: Option<VisibilityRule>,
    /// Dot path into the external data bag, e.g. `application.buyer_name`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_source: Option<String>,
    /// Name of the source PDF field this field was imported from
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pdf_mapping: Option<String>,
}

impl Field {
    /// Create a field with sensible per-type defaults.
    pub fn new(id: impl Into<String>, field_type: FieldType) -> Self {
        let id = id.into();
        let width = if field_type.defaults_to_full_width() {
            FieldWidth::Full
        } else {
            FieldWidth::Half
        };
        let options = if field_type.has_options() {
            vec!["Option 1".to_string(), "Option 2".to_string()]
        } else {
            Vec::new()
        };
        let label = match field_type {
            FieldType::Label => "Label".to_string(),
            FieldType::Signature => "Signature".to_string(),
            other => format!("New {} Field", other),
        };

        Self {
            key: id.clone(),
            id,
            label,
            field_type,
            required: false,
            width,
            placeholder: None,
            default_value: None,
            options,
            currency: false,
            computation: None,
            conditional_logic: None,
            data_source: None,
            pdf_mapping: None,
        }
    }
}

/// Partial update for a field, applied replace-by-id.
///
/// `None` members leave the current value untouched; option-of-option
/// members can clear a value by carrying `Some(None)`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldPatch {
    pub key: Option<String>,
    pub label: Option<String>,
    #[serde(rename = "type")]
    pub field_type: Option<FieldType>,
    pub required: Option<bool>,
    pub width: Option<FieldWidth>,
    #[serde(default, with = "double_option")]
    pub placeholder: Option<Option<String>>,
    #[serde(default, with = "double_option")]
    pub default_value: Option<Option<String>>,
    pub options: Option<Vec<String>>,
    pub currency: Option<bool>,
    #[serde(default, with = "double_option")]
    pub computation: Option<Option<String>>,
    #[serde(default, with = "double_option")]
    pub conditional_logic: Option<Option<VisibilityRule>>,
    #[serde(default, with = "double_option")]
    pub data_source: Option<Option<String>>,
    #[serde(default, with = "double_option")]
    pub pdf_mapping: Option<Option<String>>,
}

/// Partial update for a section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionPatch {
    pub title: Option<String>,
    #[serde(default, with = "double_option")]
    pub description: Option<Option<String>>,
    pub layout: Option<SectionLayout>,
    pub collapsible: Option<bool>,
    pub initially_hidden: Option<bool>,
    pub required: Option<bool>,
    #[serde(default, with = "double_option")]
    pub conditional_visibility: Option<Option<VisibilityRule>>,
}

/// Distinguishes "absent" from "present but null" in patch bodies.
mod double_option {
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
    where
        T: Deserialize<'de>,
        D: Deserializer<'de>,
    {
        Option::<T>::deserialize(deserializer).map(Some)
    }
}

/// A named, orderable group of fields sharing a column layout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Section {
    pub id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub layout: SectionLayout,
    #[serde(default)]
    pub collapsible: bool,
    #[serde(default)]
    pub initially_hidden: bool,
    #[serde(default)]
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conditional_visibility: Option<VisibilityRule>,
    #[serde(default)]
    pub fields: Vec<Field>,
}

impl Section {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: None,
            layout: SectionLayout::default(),
            collapsible: false,
            initially_hidden: false,
            required: false,
            conditional_visibility: None,
            fields: Vec::new(),
        }
    }
}

/// Root aggregate: an ordered list of sections
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormStructure {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub sections: Vec<Section>,
}

impl FormStructure {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            sections: Vec::new(),
        }
    }

    /// Validate the construction-time invariants: unique section ids,
    /// unique field ids across the whole structure, non-empty options for
    /// choice fields, and computations referencing only existing fields.
    pub fn validate(&self) -> Result<(), String> {
        let mut section_ids = HashSet::new();
        for section in &self.sections {
            if !section_ids.insert(section.id.as_str()) {
                return Err(format!("duplicate section id: {}", section.id));
            }
        }

        let mut field_ids = HashSet::new();
        for field in self.sections.iter().flat_map(|s| &s.fields) {
            if !field_ids.insert(field.id.as_str()) {
                return Err(format!("duplicate field id: {}", field.id));
            }
            if field.field_type.has_options() && field.options.is_empty() {
                return Err(format!(
                    "field {} is {} but has no options",
                    field.id, field.field_type
                ));
            }
        }

        for field in self.sections.iter().flat_map(|s| &s.fields) {
            if let Some(formula) = &field.computation {
                for reference in formula_references(formula) {
                    if !field_ids.contains(reference.as_str()) {
                        return Err(format!(
                            "field {} computation references unknown field {}",
                            field.id, reference
                        ));
                    }
                }
            }
        }

        Ok(())
    }

    pub fn find_field(&self, field_id: &str) -> Option<&Field> {
        self.sections
            .iter()
            .flat_map(|s| &s.fields)
            .find(|f| f.id == field_id)
    }

    pub fn find_section(&self, section_id: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.id == section_id)
    }

    /// The id of the section containing a field, if any.
    pub fn section_of_field(&self, field_id: &str) -> Option<&str> {
        self.sections
            .iter()
            .find(|s| s.fields.iter().any(|f| f.id == field_id))
            .map(|s| s.id.as_str())
    }

    /// Canonical required-field set. Both the completeness check and the
    /// completion percentage are driven by this one list.
    pub fn required_field_ids(&self) -> Vec<&str> {
        self.sections
            .iter()
            .flat_map(|s| &s.fields)
            .filter(|f| f.required && f.field_type != FieldType::Label)
            .map(|f| f.id.as_str())
            .collect()
    }

    /// Fraction of required fields with a non-empty value, in [0, 1].
    pub fn completion_fraction(
        &self,
        values: &std::collections::HashMap<String, serde_json::Value>,
    ) -> f64 {
        let required = self.required_field_ids();
        if required.is_empty() {
            return 1.0;
        }
        let filled = required
            .iter()
            .filter(|id| {
                values
                    .get(**id)
                    .map(|v| !value_is_empty(v))
                    .unwrap_or(false)
            })
            .count();
        filled as f64 / required.len() as f64
    }

    pub fn is_complete(
        &self,
        values: &std::collections::HashMap<String, serde_json::Value>,
    ) -> bool {
        self.completion_fraction(values) >= 1.0
    }
}

fn value_is_empty(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Null => true,
        serde_json::Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

/// Identifiers referenced by a computation formula. Numeric literals and
/// operators are skipped.
pub fn formula_references(formula: &str) -> Vec<String> {
    let mut refs = Vec::new();
    let mut current = String::new();

    for c in formula.chars() {
        if c.is_alphanumeric() || c == '_' {
            current.push(c);
        } else {
            push_reference(&mut refs, &mut current);
        }
    }
    push_reference(&mut refs, &mut current);

    refs
}

fn push_reference(refs: &mut Vec<String>, current: &mut String) {
    if !current.is_empty() {
        if current.chars().next().map(|c| c.is_alphabetic() || c == '_') == Some(true)
            && !refs.contains(current)
        {
            refs.push(current.clone());
        }
        current.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(id: &str, field_type: FieldType) -> Field {
        Field::new(id, field_type)
    }

    #[test]
    fn test_duplicate_field_ids_rejected() {
        let mut structure = FormStructure::new("f1", "Test");
        let mut section = Section::new("s1", "One");
        section.fields.push(field("a", FieldType::Text));
        section.fields.push(field("a", FieldType::Text));
        structure.sections.push(section);

        assert!(structure.validate().is_err());
    }

    #[test]
    fn test_duplicate_field_ids_across_sections_rejected() {
        let mut structure = FormStructure::new("f1", "Test");
        let mut s1 = Section::new("s1", "One");
        s1.fields.push(field("a", FieldType::Text));
        let mut s2 = Section::new("s2", "Two");
        s2.fields.push(field("a", FieldType::Text));
        structure.sections.push(s1);
        structure.sections.push(s2);

        assert!(structure.validate().is_err());
    }

    #[test]
    fn test_choice_field_requires_options() {
        let mut structure = FormStructure::new("f1", "Test");
        let mut section = Section::new("s1", "One");
        let mut select = field("a", FieldType::Select);
        select.options.clear();
        section.fields.push(select);
        structure.sections.push(section);

        assert!(structure.validate().is_err());
    }

    #[test]
    fn test_computation_must_reference_known_fields() {
        let mut structure = FormStructure::new("f1", "Test");
        let mut section = Section::new("s1", "One");
        section.fields.push(field("assessment", FieldType::Number));
        let mut total = field("total", FieldType::Number);
        total.computation = Some("assessment + transfer_fee".to_string());
        section.fields.push(total);
        structure.sections.push(section);

        assert!(structure.validate().is_err());

        structure.sections[0]
            .fields
            .push(field("transfer_fee", FieldType::Number));
        assert!(structure.validate().is_ok());
    }

    #[test]
    fn test_formula_references_skip_literals() {
        let refs = formula_references("a_1 * 0.25 + fee - 100");
        assert_eq!(refs, vec!["a_1".to_string(), "fee".to_string()]);
    }

    #[test]
    fn test_per_type_defaults() {
        let textarea = field("t", FieldType::Textarea);
        assert_eq!(textarea.width, FieldWidth::Full);

        let select = field("s", FieldType::Select);
        assert_eq!(select.width, FieldWidth::Half);
        assert_eq!(select.options.len(), 2);

        let text = field("x", FieldType::Text);
        assert_eq!(text.width, FieldWidth::Half);
        assert!(text.options.is_empty());
    }

    #[test]
    fn test_required_field_ids_single_source() {
        let mut structure = FormStructure::new("f1", "Test");
        let mut section = Section::new("s1", "One");
        let mut a = field("a", FieldType::Text);
        a.required = true;
        let mut b = field("b", FieldType::Label);
        b.required = true; // labels never count as required inputs
        section.fields.push(a);
        section.fields.push(b);
        section.fields.push(field("c", FieldType::Text));
        structure.sections.push(section);

        assert_eq!(structure.required_field_ids(), vec!["a"]);

        let mut values = std::collections::HashMap::new();
        assert!(!structure.is_complete(&values));
        assert_eq!(structure.completion_fraction(&values), 0.0);

        values.insert("a".to_string(), serde_json::json!("filled"));
        assert!(structure.is_complete(&values));
    }

    #[test]
    fn test_wire_format_round_trip() {
        let mut structure = FormStructure::new("f1", "Resale Certificate");
        let mut section = Section::new("s1", "Parties");
        let mut f = field("buyer_name", FieldType::Text);
        f.data_source = Some("application.buyer_name".to_string());
        f.pdf_mapping = Some("BUYERNAME".to_string());
        section.fields.push(f);
        structure.sections.push(section);

        let json = serde_json::to_value(&structure).unwrap();
        assert_eq!(json["sections"][0]["fields"][0]["type"], "text");
        assert_eq!(
            json["sections"][0]["fields"][0]["dataSource"],
            "application.buyer_name"
        );
        assert_eq!(json["sections"][0]["fields"][0]["pdfMapping"], "BUYERNAME");

        let back: FormStructure = serde_json::from_value(json).unwrap();
        assert_eq!(back, structure);
    }
}
