use super::Db;
use crate::error::StorageError;
use crate::models::{ActionExecutionLog, CreatedEntityRef};
use rusqlite::params;

impl Db {
    /// Append-only (spec §3 ActionExecutionLog). Written once per queue-item
    /// execution attempt, whatever the outcome.
    pub fn insert_execution_log(
        &self,
        rule_id: &str,
        queue_item_id: &str,
        status: &str,
        execution_time_ms: i64,
        error_message: Option<&str>,
        created_entity_refs: &[CreatedEntityRef],
    ) -> Result<ActionExecutionLog, StorageError> {
        let conn = self.conn();
        let execution_id = uuid::Uuid::new_v4().to_string();
        let now = chrono::Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO action_execution_log (execution_id, rule_id, queue_item_id, status,
                execution_time_ms, error_message, created_entity_refs, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                execution_id,
                rule_id,
                queue_item_id,
                status,
                execution_time_ms,
                error_message,
                serde_json::to_string(created_entity_refs).unwrap_or_default(),
                now,
            ],
        )?;
        Ok(ActionExecutionLog {
            execution_id,
            rule_id: rule_id.to_string(),
            queue_item_id: queue_item_id.to_string(),
            status: status.to_string(),
            execution_time_ms,
            error_message: error_message.map(|s| s.to_string()),
            created_entity_refs: created_entity_refs.to_vec(),
            created_at: now,
        })
    }

    pub fn list_execution_logs_for_rule(
        &self,
        rule_id: &str,
        limit: i64,
    ) -> Result<Vec<ActionExecutionLog>, StorageError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT execution_id, rule_id, queue_item_id, status, execution_time_ms, error_message,
                    created_entity_refs, created_at
             FROM action_execution_log WHERE rule_id = ?1 ORDER BY created_at DESC LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![rule_id, limit], row_to_log)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    /// Rolling error rate over the last `window` completions, for `/health`
    /// (SPEC_FULL §10).
    pub fn recent_error_rate(&self, window: i64) -> Result<f64, StorageError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT status FROM action_execution_log ORDER BY created_at DESC LIMIT ?1",
        )?;
        let statuses: Vec<String> = stmt
            .query_map(params![window], |r| r.get::<_, String>(0))?
            .filter_map(|r| r.ok())
            .collect();
        if statuses.is_empty() {
            return Ok(0.0);
        }
        let errors = statuses.iter().filter(|s| s.as_str() != "success").count();
        Ok(errors as f64 / statuses.len() as f64)
    }
}

fn row_to_log(row: &rusqlite::Row) -> rusqlite::Result<ActionExecutionLog> {
    let refs: String = row.get(6)?;
    Ok(ActionExecutionLog {
        execution_id: row.get(0)?,
        rule_id: row.get(1)?,
        queue_item_id: row.get(2)?,
        status: row.get(3)?,
        execution_time_ms: row.get(4)?,
        error_message: row.get(5)?,
        created_entity_refs: serde_json::from_str(&refs).unwrap_or_default(),
        created_at: row.get(7)?,
    })
}
