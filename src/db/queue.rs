use super::Db;
use crate::error::StorageError;
use crate::models::{ActionQueueItem, QueuePriority, QueueStatus};
use rusqlite::{OptionalExtension, params};

/// One item handed to a queue worker by `lease_queue_batch` (spec §4.1
/// `leaseQueueBatch`). Mirrors the teacher's pattern of returning a narrow,
/// purpose-built struct from a batch operation rather than the full row.
pub struct LeasedItem {
    pub item: ActionQueueItem,
}

impl Db {
    /// Deterministic idempotency key = event_type + source_id (+ rule_id
    /// where applicable) (spec §4.3b). Duplicate enqueues within the
    /// dedupe window are suppressed via `INSERT OR IGNORE` against the
    /// `idempotency_key` unique index; the caller gets back `None` when the
    /// insert was suppressed.
    pub fn enqueue_action(
        &self,
        event_type: &str,
        event_data: &serde_json::Value,
        priority: QueuePriority,
        idempotency_key: &str,
    ) -> Result<Option<ActionQueueItem>, StorageError> {
        let conn = self.conn();
        let queue_id = uuid::Uuid::new_v4().to_string();
        let now = chrono::Utc::now().to_rfc3339();
        let changed = conn.execute(
            "INSERT OR IGNORE INTO action_queue
                (queue_id, event_type, event_data, status, priority, attempts, max_attempts,
                 retry_after_ts, created_at, idempotency_key)
             VALUES (?1, ?2, ?3, 'pending', ?4, 0, 3, ?5, ?5, ?6)",
            params![
                queue_id,
                event_type,
                event_data.to_string(),
                priority.as_str(),
                now,
                idempotency_key,
            ],
        )?;
        if changed == 0 {
            return Ok(None);
        }
        drop(conn);
        Ok(Some(self.get_queue_item(&queue_id)?))
    }

    pub fn get_queue_item(&self, queue_id: &str) -> Result<ActionQueueItem, StorageError> {
        self.conn()
            .query_row(
                "SELECT queue_id, event_type, event_data, status, priority, attempts, max_attempts,
                        retry_after_ts, last_error, created_at, processed_at, completed_at,
                        idempotency_key, substatus
                 FROM action_queue WHERE queue_id = ?1",
                params![queue_id],
                row_to_queue_item,
            )
            .map_err(StorageError::from)
    }

    /// Atomically selects up to `limit` pending items in priority-then-age
    /// order where `retry_after_ts <= now` and `attempts < max_attempts`,
    /// flips them to `processing`, and returns them (spec §4.1
    /// `leaseQueueBatch`). SQLite has no `SKIP LOCKED`; the single
    /// `Mutex<Connection>` already serializes writers, so an immediate
    /// transaction gives the same "two workers never see the same row"
    /// guarantee the teacher's storage model relies on for SQLite.
    pub fn lease_queue_batch(&self, limit: i64) -> Result<Vec<LeasedItem>, StorageError> {
        let mut conn = self.conn();
        let now = chrono::Utc::now().to_rfc3339();
        let tx = conn.transaction()?;

        let ids: Vec<String> = {
            let mut stmt = tx.prepare(
                "SELECT queue_id FROM action_queue
                 WHERE status = 'pending' AND retry_after_ts <= ?1 AND attempts < max_attempts
                 ORDER BY
                    CASE priority WHEN 'high' THEN 0 WHEN 'normal' THEN 1 ELSE 2 END ASC,
                    created_at ASC
                 LIMIT ?2",
            )?;
            stmt.query_map(params![now, limit], |r| r.get::<_, String>(0))?
                .filter_map(|r| r.ok())
                .collect()
        };

        let mut leased = Vec::with_capacity(ids.len());
        for id in &ids {
            tx.execute(
                "UPDATE action_queue SET status = 'processing', processed_at = ?2 WHERE queue_id = ?1",
                params![id, now],
            )?;
        }
        for id in &ids {
            let item: ActionQueueItem = tx.query_row(
                "SELECT queue_id, event_type, event_data, status, priority, attempts, max_attempts,
                        retry_after_ts, last_error, created_at, processed_at, completed_at,
                        idempotency_key, substatus
                 FROM action_queue WHERE queue_id = ?1",
                params![id],
                row_to_queue_item,
            )?;
            leased.push(LeasedItem { item });
        }
        tx.commit()?;
        Ok(leased)
    }

    pub fn complete_queue_item(
        &self,
        queue_id: &str,
        substatus: Option<&str>,
    ) -> Result<(), StorageError> {
        let now = chrono::Utc::now().to_rfc3339();
        self.conn().execute(
            "UPDATE action_queue SET status = 'completed', completed_at = ?2, substatus = ?3
             WHERE queue_id = ?1",
            params![queue_id, now, substatus],
        )?;
        Ok(())
    }

    /// Increments `attempts`, sets `retry_after_ts = now + min(2^attempts
    /// seconds, cap)`, and flips status back to `pending` if under
    /// `max_attempts`, else to `failed` (spec §4.3 retry/backoff). Backoff is
    /// computed from the attempt count *after* increment, so the first
    /// retry is scheduled ~2s out, matching testable-property S6's 2,4,8
    /// sequence.
    pub fn fail_queue_item(
        &self,
        queue_id: &str,
        error: &str,
        backoff_cap: std::time::Duration,
    ) -> Result<QueueStatus, StorageError> {
        let conn = self.conn();
        let (attempts, max_attempts): (i64, i64) = conn.query_row(
            "SELECT attempts, max_attempts FROM action_queue WHERE queue_id = ?1",
            params![queue_id],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )?;
        let new_attempts = attempts + 1;
        let status = if new_attempts < max_attempts {
            QueueStatus::Pending
        } else {
            QueueStatus::Failed
        };
        let delay_secs = (2i64.saturating_pow(new_attempts as u32)).min(backoff_cap.as_secs() as i64);
        let retry_after = chrono::Utc::now() + chrono::Duration::seconds(delay_secs);
        conn.execute(
            "UPDATE action_queue SET attempts = ?2, status = ?3, retry_after_ts = ?4, last_error = ?5
             WHERE queue_id = ?1",
            params![queue_id, new_attempts, status.as_str(), retry_after.to_rfc3339(), error],
        )?;
        Ok(status)
    }

    /// Manual reprocess hook (spec §4.8 dead-letter queue): resets failed
    /// items back to pending, filtered by event_type (entity_type) and/or a
    /// `since` timestamp.
    pub fn reprocess_failed_queue_items(
        &self,
        event_type: Option<&str>,
        since: Option<&str>,
    ) -> Result<i64, StorageError> {
        let conn = self.conn();
        let now = chrono::Utc::now().to_rfc3339();
        let sql = "UPDATE action_queue SET status = 'pending', attempts = 0, retry_after_ts = ?1, last_error = NULL
             WHERE status = 'failed'
               AND (?2 IS NULL OR event_type = ?2)
               AND (?3 IS NULL OR created_at >= ?3)";
        let changed = conn.execute(sql, params![now, event_type, since])?;
        Ok(changed as i64)
    }

    pub fn dead_letter_items(&self, limit: i64) -> Result<Vec<ActionQueueItem>, StorageError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT queue_id, event_type, event_data, status, priority, attempts, max_attempts,
                    retry_after_ts, last_error, created_at, processed_at, completed_at,
                    idempotency_key, substatus
             FROM action_queue WHERE status = 'failed' ORDER BY created_at DESC LIMIT ?1",
        )?;
        let rows = stmt
            .query_map(params![limit], row_to_queue_item)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    pub fn queue_depth_by_status(&self) -> Result<Vec<(String, i64)>, StorageError> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT status, COUNT(*) FROM action_queue GROUP BY status")?;
        let rows = stmt
            .query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)?)))?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    /// Used by the executor's idempotency check (spec §4.3): has an
    /// equivalent queue item already completed successfully for this key?
    pub fn queue_item_by_idempotency_key(
        &self,
        idempotency_key: &str,
    ) -> Result<Option<ActionQueueItem>, StorageError> {
        self.conn()
            .query_row(
                "SELECT queue_id, event_type, event_data, status, priority, attempts, max_attempts,
                        retry_after_ts, last_error, created_at, processed_at, completed_at,
                        idempotency_key, substatus
                 FROM action_queue WHERE idempotency_key = ?1",
                params![idempotency_key],
                row_to_queue_item,
            )
            .optional()
            .map_err(StorageError::from)
    }
}

fn row_to_queue_item(row: &rusqlite::Row) -> rusqlite::Result<ActionQueueItem> {
    let event_data: String = row.get(2)?;
    Ok(ActionQueueItem {
        queue_id: row.get(0)?,
        event_type: row.get(1)?,
        event_data: serde_json::from_str(&event_data).unwrap_or_default(),
        status: row.get(3)?,
        priority: row.get(4)?,
        attempts: row.get(5)?,
        max_attempts: row.get(6)?,
        retry_after_ts: row.get(7)?,
        last_error: row.get(8)?,
        created_at: row.get(9)?,
        processed_at: row.get(10)?,
        completed_at: row.get(11)?,
        idempotency_key: row.get(12)?,
        substatus: row.get(13)?,
    })
}
