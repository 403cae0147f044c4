//! Stateful editor over a single `FormStructure`.
//!
//! The builder exclusively owns the live structure for the duration of an
//! editing session. Every mutation is synchronous and atomic: callers never
//! observe a partially applied state. Structurally invalid operations
//! (unknown ids, cross-section reorders, out-of-range indexes) are no-ops
//! rather than errors.

use uuid::Uuid;

use super::structure::{
    Field, FieldPatch, FieldType, FormStructure, Section, SectionPatch,
};

/// Editing session over one form structure
#[derive(Debug, Clone)]
pub struct FormBuilder {
    structure: FormStructure,
    active_section: Option<String>,
    selected_field: Option<String>,
}

impl FormBuilder {
    pub fn new(structure: FormStructure) -> Self {
        let active_section = structure.sections.first().map(|s| s.id.clone());
        Self {
            structure,
            active_section,
            selected_field: None,
        }
    }

    pub fn structure(&self) -> &FormStructure {
        &self.structure
    }

    pub fn into_structure(self) -> FormStructure {
        self.structure
    }

    pub fn active_section(&self) -> Option<&str> {
        self.active_section.as_deref()
    }

    pub fn selected_field(&self) -> Option<&str> {
        self.selected_field.as_deref()
    }

    /// Append a new empty section and make it active.
    pub fn add_section(&mut self) -> &Section {
        let id = new_id("section");
        let number = self.structure.sections.len() + 1;
        let section = Section::new(id.clone(), format!("Section {}", number));
        self.structure.sections.push(section);
        self.active_section = Some(id);
        self.structure
            .sections
            .last()
            .expect("section was just pushed")
    }

    /// Append a field with per-type defaults.
    ///
    /// Target resolution: explicit section id, else the active section,
    /// else the first section, else a brand-new section. The new field
    /// becomes the selected field.
    pub fn add_field(&mut self, field_type: FieldType, target_section_id: Option<&str>) -> &Field {
        let section_index = self.resolve_target_section(target_section_id);

        let field = Field::new(new_id("field"), field_type);
        let field_id = field.id.clone();
        self.structure.sections[section_index].fields.push(field);
        self.selected_field = Some(field_id);

        self.structure.sections[section_index]
            .fields
            .last()
            .expect("field was just pushed")
    }

    fn resolve_target_section(&mut self, target_section_id: Option<&str>) -> usize {
        if let Some(target) = target_section_id {
            if let Some(index) = self.structure.sections.iter().position(|s| s.id == target) {
                return index;
            }
        }

        if let Some(active) = &self.active_section {
            if let Some(index) = self.structure.sections.iter().position(|s| &s.id == active) {
                return index;
            }
        }

        if self.structure.sections.is_empty() {
            self.add_section();
        }

        // first section as the final fallback
        self.active_section = Some(self.structure.sections[0].id.clone());
        0
    }

    /// Apply a patch to a field, located by id across all sections.
    /// Unknown ids are a no-op.
    pub fn update_field(&mut self, field_id: &str, patch: FieldPatch) {
        let Some(field) = self
            .structure
            .sections
            .iter_mut()
            .flat_map(|s| s.fields.iter_mut())
            .find(|f| f.id == field_id)
        else {
            return;
        };

        if let Some(key) = patch.key {
            field.key = key;
        }
        if let Some(label) = patch.label {
            field.label = label;
        }
        if let Some(field_type) = patch.field_type {
            field.field_type = field_type;
            // switching to a choice type must leave options usable
            if field_type.has_options() && field.options.is_empty() {
                field.options = vec!["Option 1".to_string(), "Option 2".to_string()];
            }
        }
        if let Some(required) = patch.required {
            field.required = required;
        }
        if let Some(width) = patch.width {
            field.width = width;
        }
        if let Some(placeholder) = patch.placeholder {
            field.placeholder = placeholder;
        }
        if let Some(default_value) = patch.default_value {
            field.default_value = default_value;
        }
        if let Some(options) = patch.options {
            field.options = options;
        }
        if let Some(currency) = patch.currency {
            field.currency = currency;
        }
        if let Some(computation) = patch.computation {
            field.computation = computation;
        }
        if let Some(conditional_logic) = patch.conditional_logic {
            field.conditional_logic = conditional_logic;
        }
        if let Some(data_source) = patch.data_source {
            field.data_source = data_source;
        }
        if let Some(pdf_mapping) = patch.pdf_mapping {
            field.pdf_mapping = pdf_mapping;
        }
    }

    /// Delete a field by id. Deleting the selected field clears selection.
    pub fn delete_field(&mut self, field_id: &str) {
        for section in &mut self.structure.sections {
            section.fields.retain(|f| f.id != field_id);
        }
        if self.selected_field.as_deref() == Some(field_id) {
            self.selected_field = None;
        }
    }

    /// Stable move of a field within one section. Cross-section moves and
    /// out-of-range indexes are no-ops; a field belongs to exactly one
    /// section.
    pub fn reorder_field(&mut self, section_id: &str, from_index: usize, to_index: usize) {
        let Some(section) = self
            .structure
            .sections
            .iter_mut()
            .find(|s| s.id == section_id)
        else {
            return;
        };

        if from_index >= section.fields.len() || to_index >= section.fields.len() {
            return;
        }
        if from_index == to_index {
            return;
        }

        let field = section.fields.remove(from_index);
        section.fields.insert(to_index, field);
    }

    /// Apply a patch to a section by id. Unknown ids are a no-op.
    pub fn update_section(&mut self, section_id: &str, patch: SectionPatch) {
        let Some(section) = self
            .structure
            .sections
            .iter_mut()
            .find(|s| s.id == section_id)
        else {
            return;
        };

        if let Some(title) = patch.title {
            section.title = title;
        }
        if let Some(description) = patch.description {
            section.description = description;
        }
        if let Some(layout) = patch.layout {
            section.layout = layout;
        }
        if let Some(collapsible) = patch.collapsible {
            section.collapsible = collapsible;
        }
        if let Some(initially_hidden) = patch.initially_hidden {
            section.initially_hidden = initially_hidden;
        }
        if let Some(required) = patch.required {
            section.required = required;
        }
        if let Some(conditional_visibility) = patch.conditional_visibility {
            section.conditional_visibility = conditional_visibility;
        }
    }

    /// Delete a section and all its fields. Deleting the active section
    /// promotes the first remaining section, or clears the active state.
    pub fn delete_section(&mut self, section_id: &str) {
        let selected_in_section = self
            .structure
            .sections
            .iter()
            .find(|s| s.id == section_id)
            .map(|s| {
                s.fields
                    .iter()
                    .any(|f| Some(f.id.as_str()) == self.selected_field.as_deref())
            })
            .unwrap_or(false);

        self.structure.sections.retain(|s| s.id != section_id);

        if selected_in_section {
            self.selected_field = None;
        }

        if self.active_section.as_deref() == Some(section_id) {
            self.active_section = self.structure.sections.first().map(|s| s.id.clone());
        }
    }

    /// Make a section active for subsequent `add_field` calls.
    pub fn set_active_section(&mut self, section_id: &str) {
        if self.structure.sections.iter().any(|s| s.id == section_id) {
            self.active_section = Some(section_id.to_string());
        }
    }

    /// Select a field for configuration.
    pub fn select_field(&mut self, field_id: &str) {
        if self.structure.find_field(field_id).is_some() {
            self.selected_field = Some(field_id.to_string());
        }
    }
}

fn new_id(prefix: &str) -> String {
    let uuid = Uuid::new_v4().simple().to_string();
    format!("{}_{}", prefix, &uuid[..8])
}
