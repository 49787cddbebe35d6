use super::Db;
use crate::error::StorageError;
use crate::models::{ChangeOperation, EntityChange};
use rusqlite::{Connection, params};

impl Db {
    /// Appends one `EntityChange` row in the caller's transaction (spec §4.3a).
    /// Callers commit alongside the entity write so the append is atomic with it.
    pub(super) fn record_change(
        conn: &Connection,
        table_name: &str,
        operation: ChangeOperation,
        entity_id: &str,
        entity_type: &str,
        old_data: Option<&serde_json::Value>,
        new_data: Option<&serde_json::Value>,
        metadata: &serde_json::Value,
    ) -> Result<String, StorageError> {
        let change_id = uuid::Uuid::new_v4().to_string();
        let now = chrono::Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO entity_changes (change_id, table_name, operation, entity_id, entity_type,
                old_data, new_data, metadata, changed_at, processed, error_count)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 0, 0)",
            params![
                change_id,
                table_name,
                operation.as_str(),
                entity_id,
                entity_type,
                old_data.map(|v| v.to_string()),
                new_data.map(|v| v.to_string()),
                metadata.to_string(),
                now,
            ],
        )?;
        Ok(change_id)
    }

    pub fn list_pending_changes(&self, limit: i64) -> Result<Vec<EntityChange>, StorageError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT change_id, table_name, operation, entity_id, entity_type, old_data, new_data,
                    metadata, changed_at, processed, processed_at, error_count, last_error
             FROM entity_changes WHERE processed = 0 ORDER BY changed_at ASC LIMIT ?1",
        )?;
        let rows = stmt
            .query_map(params![limit], row_to_change)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    pub fn mark_change_processed(&self, change_id: &str) -> Result<(), StorageError> {
        let now = chrono::Utc::now().to_rfc3339();
        self.conn().execute(
            "UPDATE entity_changes SET processed = 1, processed_at = ?1 WHERE change_id = ?2",
            params![now, change_id],
        )?;
        Ok(())
    }

    pub fn mark_change_error(&self, change_id: &str, error: &str) -> Result<(), StorageError> {
        self.conn().execute(
            "UPDATE entity_changes SET error_count = error_count + 1, last_error = ?1 WHERE change_id = ?2",
            params![error, change_id],
        )?;
        Ok(())
    }
}

fn row_to_change(row: &rusqlite::Row) -> rusqlite::Result<EntityChange> {
    let old_data: Option<String> = row.get(5)?;
    let new_data: Option<String> = row.get(6)?;
    let metadata: String = row.get(7)?;
    Ok(EntityChange {
        change_id: row.get(0)?,
        table_name: row.get(1)?,
        operation: row.get(2)?,
        entity_id: row.get(3)?,
        entity_type: row.get(4)?,
        old_data: old_data.and_then(|s| serde_json::from_str(&s).ok()),
        new_data: new_data.and_then(|s| serde_json::from_str(&s).ok()),
        metadata: serde_json::from_str(&metadata).unwrap_or_default(),
        changed_at: row.get(8)?,
        processed: row.get::<_, i64>(9)? != 0,
        processed_at: row.get(10)?,
        error_count: row.get(11)?,
        last_error: row.get(12)?,
    })
}
