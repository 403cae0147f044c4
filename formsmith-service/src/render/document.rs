//! Document renderer: print-ready output of the same structure.
//!
//! Lays every visible section out on its declared column grid, paginates
//! into US Letter pages, and emits PDF bytes. Empty visible fields render
//! an explicit "Not provided" placeholder; a visible field is never
//! silently dropped. Every page carries the brand header and contact
//! footer block.

use lopdf::content::{Content, Operation};
use lopdf::{Document, Object, Stream, dictionary};
use serde::Serialize;
use tracing::debug;

use crate::config::DocumentConfig;
use crate::error::ServiceError;
use crate::form::structure::{FieldType, FieldWidth, FormStructure};
use crate::render::{RenderInputs, display_text, format_currency, is_truthy, visibility};

/// Placeholder for empty visible fields
const NOT_PROVIDED: &str = "Not provided";

// US Letter geometry, in points
const PAGE_WIDTH: f64 = 612.0;
const PAGE_HEIGHT: f64 = 792.0;
const MARGIN: f64 = 54.0;
const HEADER_Y: f64 = PAGE_HEIGHT - 40.0;
const FOOTER_Y: f64 = 28.0;
const CONTENT_TOP: f64 = PAGE_HEIGHT - 78.0;
const CONTENT_BOTTOM: f64 = 60.0;

const SECTION_HEADER_HEIGHT: f64 = 30.0;
const FIELD_BLOCK_HEIGHT: f64 = 34.0;
const TEXTAREA_BLOCK_HEIGHT: f64 = 52.0;

/// One laid-out block on a page
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum Block {
    SectionHeader {
        title: String,
    },
    FieldBlock {
        label: String,
        value: String,
        /// Column index the block starts at
        column: usize,
        /// Number of grid columns the block spans
        span: usize,
        /// Total columns in the section grid
        columns: usize,
    },
}

/// A paginated page of positioned blocks
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentPage {
    pub blocks: Vec<PositionedBlock>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionedBlock {
    #[serde(flatten)]
    pub block: Block,
    /// Top of the block, in points from the page bottom
    pub y: f64,
}

/// The laid-out document before PDF emission
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentLayout {
    pub title: String,
    pub pages: Vec<DocumentPage>,
}

impl DocumentLayout {
    /// Count of field blocks across all pages. Matches the visible field
    /// count of the source structure.
    pub fn field_block_count(&self) -> usize {
        self.pages
            .iter()
            .flat_map(|p| &p.blocks)
            .filter(|b| matches!(b.block, Block::FieldBlock { .. }))
            .count()
    }
}

/// Lay out the visible fields into paginated blocks.
pub fn layout_document(structure: &FormStructure, inputs: &RenderInputs<'_>) -> DocumentLayout {
    let hidden = visibility::resolve_hidden(structure, inputs);

    let mut pages: Vec<DocumentPage> = Vec::new();
    let mut current: Vec<PositionedBlock> = Vec::new();
    let mut y = CONTENT_TOP;

    fn place(
        blocks: &mut Vec<PositionedBlock>,
        pages: &mut Vec<DocumentPage>,
        y: &mut f64,
        height: f64,
        block: Block,
    ) {
        if *y - height < CONTENT_BOTTOM {
            pages.push(DocumentPage {
                blocks: std::mem::take(blocks),
            });
            *y = CONTENT_TOP;
        }
        *y -= height;
        blocks.push(PositionedBlock { block, y: *y });
    }

    for section in &structure.sections {
        if hidden.contains(&section.id) {
            continue;
        }

        let visible_fields: Vec<_> = section
            .fields
            .iter()
            .filter(|f| !hidden.contains(&f.id))
            .collect();
        if visible_fields.is_empty() {
            continue;
        }

        place(
            &mut current,
            &mut pages,
            &mut y,
            SECTION_HEADER_HEIGHT,
            Block::SectionHeader {
                title: section.title.clone(),
            },
        );

        let columns = section.layout.column_count();
        let mut column = 0usize;
        let mut row_height = 0f64;

        for field in visible_fields {
            let span = match field.width {
                FieldWidth::Full => columns,
                FieldWidth::Half => 1,
            };
            let height = if field.field_type == FieldType::Textarea {
                TEXTAREA_BLOCK_HEIGHT
            } else {
                FIELD_BLOCK_HEIGHT
            };

            // wrap to a new row when the field does not fit
            if column + span > columns {
                column = 0;
                row_height = 0.0;
            }

            // a new row consumes vertical space; blocks sharing a row
            // share the row's y
            if column == 0 {
                place(
                    &mut current,
                    &mut pages,
                    &mut y,
                    height,
                    field_block(field, inputs, column, span, columns),
                );
                row_height = height;
            } else {
                // continue the current row at the same y
                let block = field_block(field, inputs, column, span, columns);
                if height > row_height {
                    y -= height - row_height;
                    row_height = height;
                }
                current.push(PositionedBlock { block, y });
            }

            column += span;
            if column >= columns {
                column = 0;
            }
        }
    }

    if !current.is_empty() || pages.is_empty() {
        pages.push(DocumentPage { blocks: current });
    }

    debug!(
        pages = pages.len(),
        fields = pages
            .iter()
            .flat_map(|p| &p.blocks)
            .filter(|b| matches!(b.block, Block::FieldBlock { .. }))
            .count(),
        "Document layout complete"
    );

    DocumentLayout {
        title: structure.title.clone(),
        pages,
    }
}

fn field_block(
    field: &crate::form::structure::Field,
    inputs: &RenderInputs<'_>,
    column: usize,
    span: usize,
    columns: usize,
) -> Block {
    let value = inputs.resolve(field);
    let text = match field.field_type {
        FieldType::Checkbox => {
            if is_truthy(&value) { "Yes" } else { "No" }.to_string()
        }
        FieldType::Label => field.label.clone(),
        FieldType::Number if field.currency => {
            let raw = display_text(&value);
            if raw.is_empty() {
                String::new()
            } else {
                format!("${}", format_currency(&raw))
            }
        }
        _ => display_text(&value),
    };

    let rendered_value = if text.trim().is_empty() {
        NOT_PROVIDED.to_string()
    } else {
        text
    };

    Block::FieldBlock {
        label: field.label.clone(),
        value: rendered_value,
        column,
        span,
        columns,
    }
}

/// Emit the laid-out document as PDF bytes with the brand header/footer
/// on every page.
pub fn render_pdf(layout: &DocumentLayout, branding: &DocumentConfig) -> Result<Vec<u8>, ServiceError> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let regular_font = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let bold_font = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica-Bold",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => regular_font,
            "F2" => bold_font,
        },
    });

    let page_total = layout.pages.len();
    let mut page_ids: Vec<Object> = Vec::with_capacity(page_total);

    for (index, page) in layout.pages.iter().enumerate() {
        let operations = page_operations(layout, page, branding, index + 1, page_total);
        let content = Content { operations };
        let encoded = content.encode().map_err(|e| ServiceError::Render {
            message: format!("Failed to encode page content: {}", e),
        })?;
        let content_id = doc.add_object(Stream::new(dictionary! {}, encoded));

        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        page_ids.push(Object::Reference(page_id));
    }

    let pages_dict = dictionary! {
        "Type" => "Pages",
        "Kids" => page_ids,
        "Count" => page_total as i64,
        "Resources" => resources_id,
        "MediaBox" => vec![
            0.into(),
            0.into(),
            Object::Real(PAGE_WIDTH as f32),
            Object::Real(PAGE_HEIGHT as f32),
        ],
    };
    doc.objects.insert(pages_id, Object::Dictionary(pages_dict));

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    let info_id = doc.add_object(dictionary! {
        "Title" => Object::string_literal(layout.title.as_str()),
        "Producer" => Object::string_literal(branding.brand_name.as_str()),
    });
    doc.trailer.set("Root", catalog_id);
    doc.trailer.set("Info", info_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).map_err(|e| ServiceError::Render {
        message: format!("Failed to serialize PDF: {}", e),
    })?;

    Ok(bytes)
}

fn page_operations(
    layout: &DocumentLayout,
    page: &DocumentPage,
    branding: &DocumentConfig,
    page_number: usize,
    page_total: usize,
) -> Vec<Operation> {
    let mut ops = Vec::new();

    // header block: brand name and document title
    text_op(&mut ops, "F2", 12.0, MARGIN, HEADER_Y, &branding.brand_name);
    text_op(&mut ops, "F1", 10.0, MARGIN, HEADER_Y - 14.0, &layout.title);

    // header rule
    ops.push(Operation::new("q", vec![]));
    ops.push(Operation::new("w", vec![Object::Real(0.5)]));
    ops.push(Operation::new(
        "m",
        vec![Object::Real(MARGIN as f32), Object::Real((HEADER_Y - 22.0) as f32)],
    ));
    ops.push(Operation::new(
        "l",
        vec![
            Object::Real((PAGE_WIDTH - MARGIN) as f32),
            Object::Real((HEADER_Y - 22.0) as f32),
        ],
    ));
    ops.push(Operation::new("S", vec![]));
    ops.push(Operation::new("Q", vec![]));

    let content_width = PAGE_WIDTH - 2.0 * MARGIN;

    for positioned in &page.blocks {
        match &positioned.block {
            Block::SectionHeader { title } => {
                text_op(&mut ops, "F2", 11.0, MARGIN, positioned.y + 8.0, title);
            }
            Block::FieldBlock {
                label,
                value,
                column,
                span,
                columns,
            } => {
                let column_width = content_width / *columns as f64;
                let x = MARGIN + column_width * *column as f64;
                let width = column_width * *span as f64;

                text_op(&mut ops, "F1", 8.0, x, positioned.y + 18.0, label);
                text_op(
                    &mut ops,
                    "F1",
                    10.0,
                    x,
                    positioned.y + 5.0,
                    &truncate_to_width(value, width),
                );
            }
        }
    }

    // footer block: contact line and page number
    text_op(&mut ops, "F1", 8.0, MARGIN, FOOTER_Y, &branding.contact_line);
    let page_label = format!("Page {} of {}", page_number, page_total);
    text_op(
        &mut ops,
        "F1",
        8.0,
        PAGE_WIDTH - MARGIN - 70.0,
        FOOTER_Y,
        &page_label,
    );

    ops
}

fn text_op(ops: &mut Vec<Operation>, font: &str, size: f64, x: f64, y: f64, text: &str) {
    ops.push(Operation::new("BT", vec![]));
    ops.push(Operation::new(
        "Tf",
        vec![font.into(), Object::Real(size as f32)],
    ));
    ops.push(Operation::new(
        "Td",
        vec![Object::Real(x as f32), Object::Real(y as f32)],
    ));
    ops.push(Operation::new(
        "Tj",
        vec![Object::string_literal(text)],
    ));
    ops.push(Operation::new("ET", vec![]));
}

/// Rough character budget for a column; Helvetica averages ~0.5em.
fn truncate_to_width(text: &str, width_points: f64) -> String {
    let budget = (width_points / 5.0) as usize;
    if text.chars().count() <= budget {
        return text.to_string();
    }
    let truncated: String = text.chars().take(budget.saturating_sub(1)).collect();
    format!("{}…", truncated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_document;
    use crate::form::structure::{
        Field, FormStructure, Section, SectionLayout, VisibilityAction, VisibilityRule,
    };
    use serde_json::json;
    use std::collections::HashMap;

    fn inputs_for<'a>(
        data_bag: &'a serde_json::Value,
        values: &'a HashMap<String, serde_json::Value>,
    ) -> RenderInputs<'a> {
        RenderInputs { data_bag, values }
    }

    fn structure_with_fields(count: usize) -> FormStructure {
        let mut structure = FormStructure::new("f1", "Resale Certificate");
        let mut section = Section::new("s1", "Details");
        section.layout = SectionLayout::TwoColumn;
        for i in 0..count {
            section.fields.push(Field::new(format!("field{}", i), FieldType::Text));
        }
        structure.sections.push(section);
        structure
    }

    #[test]
    fn test_never_drops_a_visible_field() {
        let structure = structure_with_fields(37);
        let data_bag = json!({});
        let values = HashMap::new();
        let layout = layout_document(&structure, &inputs_for(&data_bag, &values));

        assert_eq!(layout.field_block_count(), 37);
    }

    #[test]
    fn test_hidden_fields_excluded_identically_to_interactive() {
        let mut structure = structure_with_fields(3);
        structure.sections[0].fields[2].conditional_logic = Some(VisibilityRule {
            action: VisibilityAction::Show,
            target_id: "field2".to_string(),
            source_field_id: Some("field0".to_string()),
            value: Some("yes".to_string()),
        });

        let data_bag = json!({});
        let values = HashMap::new();
        let layout = layout_document(&structure, &inputs_for(&data_bag, &values));
        assert_eq!(layout.field_block_count(), 2);
    }

    #[test]
    fn test_empty_fields_render_placeholder() {
        let structure = structure_with_fields(1);
        let data_bag = json!({});
        let values = HashMap::new();
        let layout = layout_document(&structure, &inputs_for(&data_bag, &values));

        let block = &layout.pages[0].blocks[1];
        match &block.block {
            Block::FieldBlock { value, .. } => assert_eq!(value, NOT_PROVIDED),
            other => panic!("expected field block, got {:?}", other),
        }
    }

    #[test]
    fn test_full_width_spans_all_columns() {
        let mut structure = structure_with_fields(1);
        structure.sections[0].layout = SectionLayout::ThreeColumn;
        structure.sections[0].fields[0].width = FieldWidth::Full;

        let data_bag = json!({});
        let values = HashMap::new();
        let layout = layout_document(&structure, &inputs_for(&data_bag, &values));

        match &layout.pages[0].blocks[1].block {
            Block::FieldBlock { span, columns, .. } => {
                assert_eq!(*span, 3);
                assert_eq!(*columns, 3);
            }
            other => panic!("expected field block, got {:?}", other),
        }
    }

    #[test]
    fn test_long_form_paginates() {
        let structure = structure_with_fields(80);
        let data_bag = json!({});
        let values = HashMap::new();
        let layout = layout_document(&structure, &inputs_for(&data_bag, &values));

        assert!(layout.pages.len() > 1);
        assert_eq!(layout.field_block_count(), 80);
    }

    #[test]
    fn test_currency_field_renders_formatted() {
        let mut structure = structure_with_fields(0);
        let mut fee = Field::new("fee", FieldType::Number);
        fee.currency = true;
        structure.sections[0].fields.push(fee);

        let data_bag = json!({});
        let mut values = HashMap::new();
        values.insert("fee".to_string(), json!("2500"));
        let layout = layout_document(&structure, &inputs_for(&data_bag, &values));

        match &layout.pages[0].blocks[1].block {
            Block::FieldBlock { value, .. } => assert_eq!(value, "$2,500.00"),
            other => panic!("expected field block, got {:?}", other),
        }
    }

    #[test]
    fn test_pdf_bytes_have_header_on_every_page() {
        let structure = structure_with_fields(80);
        let data_bag = json!({});
        let values = HashMap::new();
        let layout = layout_document(&structure, &inputs_for(&data_bag, &values));
        let branding = default_document();

        let bytes = render_pdf(&layout, &branding).unwrap();
        assert!(bytes.starts_with(b"%PDF"));

        // the brand name appears once per page in the content streams
        let parsed = Document::load_mem(&bytes).unwrap();
        assert_eq!(parsed.get_pages().len(), layout.pages.len());
    }
}
