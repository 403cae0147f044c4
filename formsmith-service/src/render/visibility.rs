//! Single visibility-resolution pass shared by both renderers.
//!
//! All `VisibilityRule`s in the structure are evaluated against the
//! current values before either renderer runs. Hidden means "not
//! rendered", never "rendered disabled". A rule whose target id resolves
//! to nothing in the structure is inert.

use std::collections::HashSet;

use crate::form::structure::{FormStructure, VisibilityAction, VisibilityRule};
use crate::render::{RenderInputs, display_text, is_truthy};

/// Ids (section or field) hidden under the current values.
pub fn resolve_hidden(structure: &FormStructure, inputs: &RenderInputs<'_>) -> HashSet<String> {
    let mut hidden = HashSet::new();

    // initially-hidden sections start hidden; a show rule can reveal them
    for section in &structure.sections {
        if section.initially_hidden {
            hidden.insert(section.id.clone());
        }
    }

    let rules = structure
        .sections
        .iter()
        .filter_map(|s| s.conditional_visibility.as_ref())
        .chain(
            structure
                .sections
                .iter()
                .flat_map(|s| &s.fields)
                .filter_map(|f| f.conditional_logic.as_ref()),
        );

    for rule in rules {
        apply_rule(structure, rule, inputs, &mut hidden);
    }

    hidden
}

fn apply_rule(
    structure: &FormStructure,
    rule: &VisibilityRule,
    inputs: &RenderInputs<'_>,
    hidden: &mut HashSet<String>,
) {
    // inert until the target resolves
    let target_exists = structure.find_section(&rule.target_id).is_some()
        || structure.find_field(&rule.target_id).is_some();
    if !target_exists {
        return;
    }

    let condition = evaluate_condition(structure, rule, inputs);

    let hide = match rule.action {
        VisibilityAction::Show => !condition,
        VisibilityAction::Hide => condition,
    };

    if hide {
        hidden.insert(rule.target_id.clone());
    } else {
        hidden.remove(&rule.target_id);
    }
}

/// A rule's condition: the source field's current value equals the rule
/// value, or is truthy/non-empty when no value is specified. A rule with
/// no source field is unconditionally true.
fn evaluate_condition(
    structure: &FormStructure,
    rule: &VisibilityRule,
    inputs: &RenderInputs<'_>,
) -> bool {
    let Some(source_id) = &rule.source_field_id else {
        return true;
    };
    let Some(source_field) = structure.find_field(source_id) else {
        return false;
    };

    let current = inputs.resolve(source_field);

    match &rule.value {
        Some(expected) => display_text(&current) == *expected,
        None => is_truthy(&current) || !display_text(&current).trim().is_empty(),
    }
}

/// True when the field itself or its enclosing section is hidden.
pub fn is_field_hidden(
    structure: &FormStructure,
    hidden: &HashSet<String>,
    field_id: &str,
) -> bool {
    if hidden.contains(field_id) {
        return true;
    }
    structure
        .section_of_field(field_id)
        .map(|section_id| hidden.contains(section_id))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::form::structure::{Field, FieldType, FormStructure, Section};
    use serde_json::json;
    use std::collections::HashMap;

    fn structure_with_rule(rule: VisibilityRule) -> FormStructure {
        let mut structure = FormStructure::new("f1", "Test");
        let mut section = Section::new("s1", "Main");
        section.fields.push(Field::new("toggle", FieldType::Checkbox));
        let mut dependent = Field::new("details", FieldType::Textarea);
        dependent.conditional_logic = Some(rule);
        section.fields.push(dependent);
        structure.sections.push(section);
        structure
    }

    #[test]
    fn test_show_rule_hides_when_condition_false() {
        let structure = structure_with_rule(VisibilityRule {
            action: VisibilityAction::Show,
            target_id: "details".to_string(),
            source_field_id: Some("toggle".to_string()),
            value: Some("true".to_string()),
        });

        let data_bag = json!({});
        let values = HashMap::new();
        let inputs = RenderInputs {
            data_bag: &data_bag,
            values: &values,
        };
        let hidden = resolve_hidden(&structure, &inputs);
        assert!(hidden.contains("details"));

        let mut values = HashMap::new();
        values.insert("toggle".to_string(), json!(true));
        let inputs = RenderInputs {
            data_bag: &data_bag,
            values: &values,
        };
        let hidden = resolve_hidden(&structure, &inputs);
        assert!(!hidden.contains("details"));
    }

    #[test]
    fn test_hide_rule_hides_when_condition_true() {
        let structure = structure_with_rule(VisibilityRule {
            action: VisibilityAction::Hide,
            target_id: "details".to_string(),
            source_field_id: Some("toggle".to_string()),
            value: None,
        });

        let data_bag = json!({});
        let mut values = HashMap::new();
        values.insert("toggle".to_string(), json!(true));
        let inputs = RenderInputs {
            data_bag: &data_bag,
            values: &values,
        };
        let hidden = resolve_hidden(&structure, &inputs);
        assert!(hidden.contains("details"));
    }

    #[test]
    fn test_unresolvable_target_is_inert() {
        let structure = structure_with_rule(VisibilityRule {
            action: VisibilityAction::Hide,
            target_id: "no_such_id".to_string(),
            source_field_id: Some("toggle".to_string()),
            value: None,
        });

        let data_bag = json!({});
        let mut values = HashMap::new();
        values.insert("toggle".to_string(), json!(true));
        let inputs = RenderInputs {
            data_bag: &data_bag,
            values: &values,
        };
        let hidden = resolve_hidden(&structure, &inputs);
        assert!(hidden.is_empty());
    }

    #[test]
    fn test_initially_hidden_section() {
        let mut structure = FormStructure::new("f1", "Test");
        let mut section = Section::new("s1", "Hidden by default");
        section.initially_hidden = true;
        section.fields.push(Field::new("a", FieldType::Text));
        structure.sections.push(section);

        let data_bag = json!({});
        let values = HashMap::new();
        let inputs = RenderInputs {
            data_bag: &data_bag,
            values: &values,
        };
        let hidden = resolve_hidden(&structure, &inputs);
        assert!(hidden.contains("s1"));
        assert!(is_field_hidden(&structure, &hidden, "a"));
    }
}
