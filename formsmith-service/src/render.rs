//! Dual renderer over the form structure model.
//!
//! Two independent consumers of the same `FormStructure`: the interactive
//! renderer emits a serializable input tree for data entry, the document
//! renderer emits a paginated print layout and PDF bytes. Both share one
//! visibility-resolution pass and one value-resolution order, so a field
//! hidden in one is hidden in the other by construction.

pub mod document;
pub mod interactive;
pub mod visibility;

use std::collections::HashMap;

use serde_json::Value;

use crate::form::path;
use crate::form::structure::Field;

/// Everything a render pass needs besides the structure itself.
pub struct RenderInputs<'a> {
    /// External values keyed by dot path, e.g. `application.buyer_name`
    pub data_bag: &'a Value,
    /// Current user-entered values keyed by field id
    pub values: &'a HashMap<String, Value>,
}

impl RenderInputs<'_> {
    /// Value resolution order: user-entered value, then the data bag at
    /// the field's `data_source`, then the field default, then empty.
    pub fn resolve(&self, field: &Field) -> Value {
        if let Some(value) = self.values.get(&field.id) {
            if !matches!(value, Value::Null) {
                return value.clone();
            }
        }

        if let Some(source) = &field.data_source {
            if let Some(value) = path::lookup(self.data_bag, source) {
                if !matches!(value, Value::Null) {
                    return value.clone();
                }
            }
        }

        if let Some(default) = &field.default_value {
            return Value::String(default.clone());
        }

        Value::Null
    }
}

/// Checkbox truthiness: boolean `true`, string `"true"`, or numeric `1`.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::String(s) => s == "true",
        Value::Number(n) => n.as_i64() == Some(1) || n.as_f64() == Some(1.0),
        _ => false,
    }
}

/// Plain display text for a resolved value.
pub fn display_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

/// Strip everything but digits, one decimal point and a leading minus.
/// Applied to currency-typed number input before storing.
pub fn strip_non_numeric(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut seen_point = false;

    for (i, c) in input.chars().enumerate() {
        match c {
            '0'..='9' => out.push(c),
            '.' if !seen_point => {
                seen_point = true;
                out.push(c);
            }
            '-' if i == 0 => out.push(c),
            _ => {}
        }
    }

    out
}

/// Format a currency amount: exactly two decimal places and thousands
/// separators. Unparseable input comes back unchanged.
pub fn format_currency(input: &str) -> String {
    let cleaned = strip_non_numeric(input);
    let Ok(amount) = cleaned.parse::<f64>() else {
        return input.to_string();
    };

    let negative = amount < 0.0;
    let cents = (amount.abs() * 100.0).round() as u64;
    let whole = cents / 100;
    let fraction = cents % 100;

    let digits = whole.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }

    let sign = if negative { "-" } else { "" };
    format!("{}{}.{:02}", sign, grouped, fraction)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::form::structure::{Field, FieldType};
    use serde_json::json;

    #[test]
    fn test_value_resolution_order() {
        let mut field = Field::new("buyer", FieldType::Text);
        field.data_source = Some("application.buyer_name".to_string());
        field.default_value = Some("Unknown Buyer".to_string());

        let data_bag = json!({"application": {"buyer_name": "Ada"}});

        // user-entered value wins
        let mut values = HashMap::new();
        values.insert("buyer".to_string(), json!("Grace"));
        let inputs = RenderInputs {
            data_bag: &data_bag,
            values: &values,
        };
        assert_eq!(inputs.resolve(&field), json!("Grace"));

        // then the data bag
        let values = HashMap::new();
        let inputs = RenderInputs {
            data_bag: &data_bag,
            values: &values,
        };
        assert_eq!(inputs.resolve(&field), json!("Ada"));

        // then the default
        let empty_bag = json!({});
        let inputs = RenderInputs {
            data_bag: &empty_bag,
            values: &values,
        };
        assert_eq!(inputs.resolve(&field), json!("Unknown Buyer"));

        // then empty
        field.default_value = None;
        assert_eq!(inputs.resolve(&field), Value::Null);
    }

    #[test]
    fn test_checkbox_truthiness() {
        assert!(is_truthy(&json!(true)));
        assert!(is_truthy(&json!("true")));
        assert!(is_truthy(&json!(1)));
        assert!(!is_truthy(&json!(false)));
        assert!(!is_truthy(&json!("yes")));
        assert!(!is_truthy(&json!(0)));
        assert!(!is_truthy(&json!(null)));
    }

    #[test]
    fn test_strip_non_numeric() {
        assert_eq!(strip_non_numeric("$1,234.56"), "1234.56");
        assert_eq!(strip_non_numeric("12a.3.4"), "12.34");
        assert_eq!(strip_non_numeric("-42"), "-42");
        assert_eq!(strip_non_numeric("abc"), "");
    }

    #[test]
    fn test_format_currency() {
        assert_eq!(format_currency("1234.5"), "1,234.50");
        assert_eq!(format_currency("$1,000,000"), "1,000,000.00");
        assert_eq!(format_currency("0.999"), "1.00");
        assert_eq!(format_currency("75"), "75.00");
        assert_eq!(format_currency("not a number"), "not a number");
    }
}
