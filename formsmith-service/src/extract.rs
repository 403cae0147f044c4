//! Structural form-field extraction from PDF byte streams.
//!
//! Walks the AcroForm field tree (including `Kids` hierarchies), classifies
//! each terminal field by its `/FT` widget kind, and reads current values
//! best-effort. Only an unparseable byte stream is an error; everything
//! else degrades to fewer or partially filled fields.

use std::collections::HashMap;

use lopdf::{Dictionary, Document, Object, ObjectId};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::ExtractionError;
use crate::form::FieldType;
use crate::normalize::normalize;

/// Required flag, common to all field types (PDF 32000-1 table 221)
const FF_REQUIRED: i64 = 1 << 1;
/// Radio flag on button fields
const FF_RADIO: i64 = 1 << 15;
/// Pushbutton flag on button fields
const FF_PUSHBUTTON: i64 = 1 << 16;

/// A form field recovered from a PDF. Transient: consumed by the mapping
/// engine and folded into `Field`s, never persisted directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedField {
    pub id: String,
    /// Raw field name as it appears in the document
    pub name: String,
    /// Human-readable label derived from the raw name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub formatted_name: Option<String>,
    /// Original name preserved when vision inference replaces `name`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_pdf_name: Option<String>,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    /// 1-based page number; 0 when the widget could not be located
    pub page: u32,
}

/// Result of structural extraction
#[derive(Debug, Clone)]
pub struct Extraction {
    pub fields: Vec<ExtractedField>,
    /// Document title from the Info dictionary
    pub title: Option<String>,
    pub page_count: u32,
}

/// Extract interactive form fields from a PDF byte stream.
pub fn extract_fields(pdf_bytes: &[u8]) -> Result<Extraction, ExtractionError> {
    let doc = Document::load_mem(pdf_bytes)
        .map_err(|source| ExtractionError::UnparseableDocument { source })?;

    let title = document_title(&doc);
    let pages = doc.get_pages();
    let page_count = pages.len() as u32;

    // widget object id -> 1-based page number, for locating fields
    let page_of_annotation = annotation_page_index(&doc);

    let mut fields = Vec::new();
    for field_id in acroform_root_fields(&doc) {
        collect_fields(&doc, field_id, &page_of_annotation, &mut fields);
    }

    debug!(
        field_count = fields.len(),
        pages = page_count,
        title = title.as_deref().unwrap_or("<none>"),
        "Structural extraction complete"
    );

    Ok(Extraction {
        fields,
        title,
        page_count,
    })
}

/// Quality gate: extraction is "generic" when the document needs the
/// vision fallback even if structural fields were found.
pub fn is_generic(extraction: &Extraction) -> bool {
    if extraction.title.as_deref().map(str::trim).unwrap_or("").is_empty() {
        return true;
    }
    extraction
        .fields
        .iter()
        .any(|f| f.name.trim().len() < 4 || is_placeholder_name(&f.name))
}

/// Authoring-tool default names carry no semantic content.
fn is_placeholder_name(name: &str) -> bool {
    let lower: String = name
        .to_lowercase()
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();

    if lower.starts_with("untitled") {
        return true;
    }

    for prefix in ["field", "text", "textfield", "checkbox", "button", "radio", "combobox"] {
        if let Some(rest) = lower.strip_prefix(prefix) {
            let rest = rest.trim_start_matches(['_', '-']);
            if rest.chars().all(|c| c.is_ascii_digit()) {
                return true;
            }
        }
    }

    false
}

// ── AcroForm traversal ───────────────────────────────────────────────

fn acroform_root_fields(doc: &Document) -> Vec<ObjectId> {
    let Ok(catalog) = doc.catalog() else {
        return Vec::new();
    };

    let Some(acroform) = catalog
        .get(b"AcroForm")
        .ok()
        .and_then(|obj| resolve_dict(doc, obj))
    else {
        return Vec::new(); // no interactive form at all
    };

    let Some(fields_array) = acroform
        .get(b"Fields")
        .ok()
        .and_then(|obj| resolve_array(doc, obj))
    else {
        return Vec::new();
    };

    fields_array
        .iter()
        .filter_map(|entry| match entry {
            Object::Reference(id) => Some(*id),
            _ => None,
        })
        .collect()
}

/// Recursively collect terminal fields, traversing `Kids` arrays.
fn collect_fields(
    doc: &Document,
    field_id: ObjectId,
    page_of_annotation: &HashMap<ObjectId, u32>,
    out: &mut Vec<ExtractedField>,
) {
    let Some(dict) = doc
        .get_object(field_id)
        .ok()
        .and_then(|obj| obj.as_dict().ok())
    else {
        return;
    };

    let kids: Vec<ObjectId> = dict
        .get(b"Kids")
        .ok()
        .and_then(|obj| resolve_array(doc, obj))
        .map(|arr| {
            arr.iter()
                .filter_map(|entry| match entry {
                    Object::Reference(id) => Some(*id),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default();

    let name = dict_string(doc, dict, b"T").unwrap_or_default();
    let has_type = dict.get(b"FT").is_ok();

    // A node with kids and no field type is a pure container; a node with
    // kids and a type is a radio group whose kids are the widgets.
    if !has_type && !kids.is_empty() {
        for kid in kids {
            collect_fields(doc, kid, page_of_annotation, out);
        }
        return;
    }

    if name.is_empty() && !has_type {
        return;
    }

    let flags = field_flags(doc, dict);
    let Some(field_type) = classify_field(doc, dict, flags) else {
        // pushbuttons carry no data
        return;
    };

    let value = dict_string(doc, dict, b"V").or_else(|| inherited_value(doc, dict));

    let page = page_of_annotation
        .get(&field_id)
        .copied()
        .or_else(|| {
            kids.iter()
                .find_map(|kid| page_of_annotation.get(kid).copied())
        })
        .unwrap_or(0);

    let formatted = normalize(&name);
    out.push(ExtractedField {
        id: format!("pdf_{}_{}", field_id.0, field_id.1),
        formatted_name: if formatted.is_empty() || formatted == name {
            None
        } else {
            Some(formatted)
        },
        original_pdf_name: None,
        name,
        field_type,
        required: flags & FF_REQUIRED != 0,
        value,
        page,
    });
}

fn classify_field(doc: &Document, dict: &Dictionary, flags: i64) -> Option<FieldType> {
    let ft = dict_name(dict, b"FT").or_else(|| {
        // inherit the type from the parent (radio-group kids)
        parent_dict(doc, dict).and_then(|parent| dict_name(parent, b"FT"))
    })?;

    match ft.as_str() {
        "Tx" => Some(FieldType::Text),
        "Ch" => Some(FieldType::Select),
        "Sig" => Some(FieldType::Signature),
        "Btn" => {
            if flags & FF_PUSHBUTTON != 0 {
                None
            } else if flags & FF_RADIO != 0 {
                Some(FieldType::Radio)
            } else {
                Some(FieldType::Checkbox)
            }
        }
        other => {
            warn!(field_type = other, "Unknown /FT value, treating as text");
            Some(FieldType::Text)
        }
    }
}

fn field_flags(doc: &Document, dict: &Dictionary) -> i64 {
    if let Some(flags) = dict.get(b"Ff").ok().and_then(|obj| obj.as_i64().ok()) {
        return flags;
    }
    parent_dict(doc, dict)
        .and_then(|parent| parent.get(b"Ff").ok())
        .and_then(|obj| obj.as_i64().ok())
        .unwrap_or(0)
}

fn inherited_value(doc: &Document, dict: &Dictionary) -> Option<String> {
    parent_dict(doc, dict).and_then(|parent| dict_string(doc, parent, b"V"))
}

fn parent_dict<'a>(doc: &'a Document, dict: &Dictionary) -> Option<&'a Dictionary> {
    match dict.get(b"Parent").ok()? {
        Object::Reference(id) => doc.get_object(*id).ok()?.as_dict().ok(),
        _ => None,
    }
}

// ── Page lookup ──────────────────────────────────────────────────────

/// Map every page annotation's object id to its 1-based page number.
fn annotation_page_index(doc: &Document) -> HashMap<ObjectId, u32> {
    let mut index = HashMap::new();

    for (page_number, page_id) in doc.get_pages() {
        let Some(page_dict) = doc
            .get_object(page_id)
            .ok()
            .and_then(|obj| obj.as_dict().ok())
        else {
            continue;
        };

        let Some(annots) = page_dict
            .get(b"Annots")
            .ok()
            .and_then(|obj| resolve_array(doc, obj))
        else {
            continue;
        };

        for annot in annots {
            if let Object::Reference(id) = annot {
                index.insert(*id, page_number);
            }
        }
    }

    index
}

// ── Metadata ─────────────────────────────────────────────────────────

fn document_title(doc: &Document) -> Option<String> {
    let info = doc.trailer.get(b"Info").ok()?;
    let info_dict = resolve_dict(doc, info)?;
    let title = dict_string(doc, info_dict, b"Title")?;
    let trimmed = title.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

// ── Dictionary helpers ───────────────────────────────────────────────

fn resolve_dict<'a>(doc: &'a Document, obj: &'a Object) -> Option<&'a Dictionary> {
    match obj {
        Object::Reference(id) => doc.get_object(*id).ok()?.as_dict().ok(),
        other => other.as_dict().ok(),
    }
}

fn resolve_array<'a>(doc: &'a Document, obj: &'a Object) -> Option<&'a Vec<Object>> {
    match obj {
        Object::Reference(id) => doc.get_object(*id).ok()?.as_array().ok(),
        other => other.as_array().ok(),
    }
}

fn dict_string(doc: &Document, dict: &Dictionary, key: &[u8]) -> Option<String> {
    let obj = dict.get(key).ok()?;
    let obj = match obj {
        Object::Reference(id) => doc.get_object(*id).ok()?,
        other => other,
    };
    match obj {
        Object::String(bytes, _) => {
            let s = decode_pdf_string(bytes);
            if s.is_empty() { None } else { Some(s) }
        }
        Object::Name(bytes) => {
            let s = decode_pdf_string(bytes);
            if s.is_empty() { None } else { Some(s) }
        }
        Object::Integer(n) => Some(n.to_string()),
        Object::Real(n) => Some(n.to_string()),
        _ => None,
    }
}

fn dict_name(dict: &Dictionary, key: &[u8]) -> Option<String> {
    match dict.get(key).ok()? {
        Object::Name(bytes) => Some(String::from_utf8_lossy(bytes).into_owned()),
        _ => None,
    }
}

/// Decode a PDF string: UTF-16 (with or without BOM) or byte text.
pub(crate) fn decode_pdf_string(bytes: &[u8]) -> String {
    if bytes.is_empty() {
        return String::new();
    }

    if bytes.starts_with(&[0xFE, 0xFF]) {
        return decode_utf16be(&bytes[2..]);
    }
    if bytes.starts_with(&[0xFF, 0xFE]) {
        let values: Vec<u16> = bytes[2..]
            .chunks(2)
            .filter(|c| c.len() == 2)
            .map(|c| u16::from_le_bytes([c[0], c[1]]))
            .collect();
        return clean_decoded(&String::from_utf16_lossy(&values));
    }

    String::from_utf8(bytes.to_vec())
        .unwrap_or_else(|_| String::from_utf8_lossy(bytes).into_owned())
}

fn decode_utf16be(bytes: &[u8]) -> String {
    let values: Vec<u16> = bytes
        .chunks(2)
        .filter(|c| c.len() == 2)
        .map(|c| u16::from_be_bytes([c[0], c[1]]))
        .collect();
    clean_decoded(&String::from_utf16_lossy(&values))
}

fn clean_decoded(s: &str) -> String {
    s.chars()
        .filter(|&c| c != '\0' && (c >= ' ' || c == '\t' || c == '\n'))
        .collect::<String>()
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_garbage_bytes_are_unparseable() {
        let result = extract_fields(b"definitely not a pdf");
        assert!(matches!(
            result,
            Err(ExtractionError::UnparseableDocument { .. })
        ));
    }

    #[test]
    fn test_placeholder_names() {
        assert!(is_placeholder_name("Text1"));
        assert!(is_placeholder_name("Check Box3"));
        assert!(is_placeholder_name("untitled2"));
        assert!(is_placeholder_name("field_12"));
        assert!(is_placeholder_name("Button4"));
        assert!(!is_placeholder_name("BuyerName"));
        assert!(!is_placeholder_name("text_color"));
    }

    #[test]
    fn test_generic_when_title_missing() {
        let extraction = Extraction {
            fields: vec![named_field("BuyerName")],
            title: None,
            page_count: 1,
        };
        assert!(is_generic(&extraction));
    }

    #[test]
    fn test_generic_when_short_names_present() {
        let extraction = Extraction {
            fields: vec![named_field("BuyerName"), named_field("f1")],
            title: Some("Resale Certificate".to_string()),
            page_count: 1,
        };
        assert!(is_generic(&extraction));
    }

    #[test]
    fn test_not_generic_with_good_names_and_title() {
        let extraction = Extraction {
            fields: vec![named_field("BuyerName"), named_field("SellerName")],
            title: Some("Resale Certificate".to_string()),
            page_count: 1,
        };
        assert!(!is_generic(&extraction));
    }

    #[test]
    fn test_decode_utf16be_string() {
        // "Hi" with UTF-16BE BOM
        let bytes = [0xFE, 0xFF, 0x00, b'H', 0x00, b'i'];
        assert_eq!(decode_pdf_string(&bytes), "Hi");
    }

    #[test]
    fn test_minimal_acroform_extraction() {
        let pdf = minimal_form_pdf();
        let extraction = extract_fields(&pdf).unwrap();

        assert_eq!(extraction.fields.len(), 2);
        assert_eq!(extraction.title.as_deref(), Some("Sample Form"));

        let text = &extraction.fields[0];
        assert_eq!(text.name, "BuyerName");
        assert_eq!(text.field_type, FieldType::Text);
        assert_eq!(text.formatted_name.as_deref(), Some("Buyer Name"));
        assert!(text.required);
        assert_eq!(text.value.as_deref(), Some("Ada"));
        assert_eq!(text.page, 1);

        let checkbox = &extraction.fields[1];
        assert_eq!(checkbox.name, "IsOwnerOccupied");
        assert_eq!(checkbox.field_type, FieldType::Checkbox);
        assert!(!checkbox.required);
    }

    fn named_field(name: &str) -> ExtractedField {
        ExtractedField {
            id: format!("pdf_{}", name),
            name: name.to_string(),
            formatted_name: None,
            original_pdf_name: None,
            field_type: FieldType::Text,
            required: false,
            value: None,
            page: 1,
        }
    }

    /// Build a one-page PDF with two AcroForm fields using lopdf itself.
    fn minimal_form_pdf() -> Vec<u8> {
        use lopdf::dictionary;

        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();

        let text_field_id = doc.add_object(dictionary! {
            "Type" => "Annot",
            "Subtype" => "Widget",
            "FT" => "Tx",
            "T" => Object::string_literal("BuyerName"),
            "V" => Object::string_literal("Ada"),
            "Ff" => 2,
            "Rect" => vec![50.into(), 700.into(), 250.into(), 720.into()],
        });
        let checkbox_field_id = doc.add_object(dictionary! {
            "Type" => "Annot",
            "Subtype" => "Widget",
            "FT" => "Btn",
            "T" => Object::string_literal("IsOwnerOccupied"),
            "Rect" => vec![50.into(), 660.into(), 70.into(), 680.into()],
        });

        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            "Annots" => vec![
                Object::Reference(text_field_id),
                Object::Reference(checkbox_field_id),
            ],
        });

        let pages = dictionary! {
            "Type" => "Pages",
            "Kids" => vec![Object::Reference(page_id)],
            "Count" => 1,
        };
        doc.objects.insert(pages_id, Object::Dictionary(pages));

        let acroform_id = doc.add_object(dictionary! {
            "Fields" => vec![
                Object::Reference(text_field_id),
                Object::Reference(checkbox_field_id),
            ],
        });
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
            "AcroForm" => Object::Reference(acroform_id),
        });
        let info_id = doc.add_object(dictionary! {
            "Title" => Object::string_literal("Sample Form"),
        });

        doc.trailer.set("Root", catalog_id);
        doc.trailer.set("Info", info_id);

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).expect("in-memory save");
        bytes
    }
}
