use super::Db;
use crate::error::StorageError;
use rusqlite::params;

/// The failed-message bucket (spec §4.8, §9 `Recovery Subsystem`): webhook
/// events that could not be translated, kept with their raw payload and a
/// retry counter for a background sweep to retry with capped backoff.
#[derive(Debug, Clone, serde::Serialize)]
pub struct FailedEvent {
    pub failed_event_id: String,
    pub instance_id: Option<String>,
    pub raw_payload: serde_json::Value,
    pub reason: String,
    pub retry_count: i64,
    pub next_retry_at: String,
    pub created_at: String,
    pub resolved: bool,
}

impl Db {
    pub fn insert_failed_event(
        &self,
        instance_id: Option<&str>,
        raw_payload: &serde_json::Value,
        reason: &str,
    ) -> Result<FailedEvent, StorageError> {
        let conn = self.conn();
        let id = uuid::Uuid::new_v4().to_string();
        let now = chrono::Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO failed_events (failed_event_id, instance_id, raw_payload, reason,
                retry_count, next_retry_at, created_at, resolved)
             VALUES (?1, ?2, ?3, ?4, 0, ?5, ?5, 0)",
            params![id, instance_id, raw_payload.to_string(), reason, now],
        )?;
        Ok(FailedEvent {
            failed_event_id: id,
            instance_id: instance_id.map(|s| s.to_string()),
            raw_payload: raw_payload.clone(),
            reason: reason.to_string(),
            retry_count: 0,
            next_retry_at: now.clone(),
            created_at: now,
            resolved: false,
        })
    }

    pub fn due_failed_events(&self, limit: i64) -> Result<Vec<FailedEvent>, StorageError> {
        let conn = self.conn();
        let now = chrono::Utc::now().to_rfc3339();
        let mut stmt = conn.prepare(
            "SELECT failed_event_id, instance_id, raw_payload, reason, retry_count, next_retry_at,
                    created_at, resolved
             FROM failed_events WHERE resolved = 0 AND next_retry_at <= ?1
             ORDER BY next_retry_at ASC LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![now, limit], row_to_failed)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    pub fn mark_failed_event_resolved(&self, failed_event_id: &str) -> Result<(), StorageError> {
        self.conn().execute(
            "UPDATE failed_events SET resolved = 1 WHERE failed_event_id = ?1",
            params![failed_event_id],
        )?;
        Ok(())
    }

    /// Capped exponential backoff on each retry (same shape as the action
    /// queue's backoff, spec §4.8 "capped exponential backoff").
    pub fn reschedule_failed_event(
        &self,
        failed_event_id: &str,
        backoff_cap: std::time::Duration,
    ) -> Result<(), StorageError> {
        let conn = self.conn();
        let retry_count: i64 = conn.query_row(
            "SELECT retry_count FROM failed_events WHERE failed_event_id = ?1",
            params![failed_event_id],
            |r| r.get(0),
        )?;
        let new_count = retry_count + 1;
        let delay = (2i64.saturating_pow(new_count as u32)).min(backoff_cap.as_secs() as i64);
        let next_retry = chrono::Utc::now() + chrono::Duration::seconds(delay);
        conn.execute(
            "UPDATE failed_events SET retry_count = ?2, next_retry_at = ?3 WHERE failed_event_id = ?1",
            params![failed_event_id, new_count, next_retry.to_rfc3339()],
        )?;
        Ok(())
    }
}

fn row_to_failed(row: &rusqlite::Row) -> rusqlite::Result<FailedEvent> {
    let raw: String = row.get(2)?;
    Ok(FailedEvent {
        failed_event_id: row.get(0)?,
        instance_id: row.get(1)?,
        raw_payload: serde_json::from_str(&raw).unwrap_or_default(),
        reason: row.get(3)?,
        retry_count: row.get(4)?,
        next_retry_at: row.get(5)?,
        created_at: row.get(6)?,
        resolved: row.get::<_, i64>(7)? != 0,
    })
}
