//! Canonical form structure model and its editor.
//!
//! The `FormStructure` aggregate is the single source of truth consumed by
//! both renderers, the mapping engine and the persistence layer. The
//! `FormBuilder` is the only writer during an editing session.

pub mod builder;
pub mod path;
pub mod structure;

pub use builder::FormBuilder;
pub use structure::{
    Field, FieldPatch, FieldType, FieldWidth, FormStructure, Section, SectionLayout, SectionPatch,
    VisibilityAction, VisibilityRule,
};
