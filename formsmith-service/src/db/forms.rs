//! Form structure CRUD operations.

use chrono::Utc;
use rusqlite::{OptionalExtension, params};

use super::Database;
use super::models::FormRecord;
use crate::error::{DatabaseError, ServiceResult};
use crate::form::FormStructure;

impl Database {
    /// Insert a new form
    pub fn insert_form(&self, record: &FormRecord) -> ServiceResult<()> {
        let conn = self.conn.lock().unwrap();

        let structure_json =
            serde_json::to_string(&record.structure).map_err(DatabaseError::Serialization)?;

        conn.execute(
            r#"
            INSERT INTO forms (id, title, structure, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                record.id,
                record.title,
                structure_json,
                record.created_at.to_rfc3339(),
                record.updated_at.to_rfc3339(),
            ],
        )
        .map_err(DatabaseError::Query)?;

        Ok(())
    }

    /// Get a form by ID
    pub fn get_form(&self, id: &str) -> ServiceResult<Option<FormRecord>> {
        let conn = self.conn.lock().unwrap();

        conn.query_row(
            "SELECT id, title, structure, created_at, updated_at FROM forms WHERE id = ?1",
            params![id],
            FormRecord::from_row,
        )
        .optional()
        .map_err(DatabaseError::Query)
        .map_err(Into::into)
    }

    /// List all forms, most recently updated first
    pub fn list_forms(&self) -> ServiceResult<Vec<FormRecord>> {
        let conn = self.conn.lock().unwrap();

        let mut stmt = conn
            .prepare(
                "SELECT id, title, structure, created_at, updated_at FROM forms \
                 ORDER BY updated_at DESC",
            )
            .map_err(DatabaseError::Query)?;

        let forms = stmt
            .query_map([], FormRecord::from_row)
            .map_err(DatabaseError::Query)?
            .filter_map(|r| r.ok())
            .collect();

        Ok(forms)
    }

    /// Replace a form's structure and title. Returns false when the id is
    /// unknown.
    pub fn update_form(&self, id: &str, structure: &FormStructure) -> ServiceResult<bool> {
        let conn = self.conn.lock().unwrap();

        let structure_json =
            serde_json::to_string(structure).map_err(DatabaseError::Serialization)?;

        let rows = conn
            .execute(
                "UPDATE forms SET title = ?2, structure = ?3, updated_at = ?4 WHERE id = ?1",
                params![id, structure.title, structure_json, Utc::now().to_rfc3339()],
            )
            .map_err(DatabaseError::Query)?;

        Ok(rows > 0)
    }

    /// Delete a form
    pub fn delete_form(&self, id: &str) -> ServiceResult<bool> {
        let conn = self.conn.lock().unwrap();

        let rows = conn
            .execute("DELETE FROM forms WHERE id = ?1", params![id])
            .map_err(DatabaseError::Query)?;

        Ok(rows > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::form::{FieldType, FormBuilder};

    fn sample_record() -> FormRecord {
        let mut builder = FormBuilder::new(FormStructure::new("form_1", "Resale Certificate"));
        builder.add_section();
        builder.add_field(FieldType::Text, None);
        let now = Utc::now();
        FormRecord {
            id: "form_1".to_string(),
            title: "Resale Certificate".to_string(),
            structure: builder.into_structure(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_form_round_trip() {
        let db = Database::open_in_memory().unwrap();
        let record = sample_record();

        db.insert_form(&record).unwrap();
        let loaded = db.get_form("form_1").unwrap().unwrap();

        assert_eq!(loaded.title, "Resale Certificate");
        assert_eq!(loaded.structure, record.structure);
    }

    #[test]
    fn test_update_and_delete_form() {
        let db = Database::open_in_memory().unwrap();
        let record = sample_record();
        db.insert_form(&record).unwrap();

        let mut structure = record.structure.clone();
        structure.title = "Updated".to_string();
        assert!(db.update_form("form_1", &structure).unwrap());
        assert!(!db.update_form("missing", &structure).unwrap());

        let loaded = db.get_form("form_1").unwrap().unwrap();
        assert_eq!(loaded.title, "Updated");

        assert!(db.delete_form("form_1").unwrap());
        assert!(db.get_form("form_1").unwrap().is_none());
    }

    #[test]
    fn test_list_forms() {
        let db = Database::open_in_memory().unwrap();
        db.insert_form(&sample_record()).unwrap();
        assert_eq!(db.list_forms().unwrap().len(), 1);
    }
}
