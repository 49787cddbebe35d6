use super::Db;
use crate::error::StorageError;
use crate::models::CallLogRow;
use rusqlite::params;

impl Db {
    /// Call logs are append/overwrite by `call_log_id` (the provider does not
    /// send incremental call updates in this adapter's scope) (spec §4.2 `call`).
    pub fn upsert_call_log(&self, call: &CallLogRow) -> Result<CallLogRow, StorageError> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO call_logs (call_log_id, instance_id, chat_id, from_jid, from_me,
                start_ts, is_video, duration_seconds, outcome)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(call_log_id, instance_id) DO UPDATE SET
                duration_seconds = excluded.duration_seconds,
                outcome = excluded.outcome",
            params![
                call.call_log_id,
                call.instance_id,
                call.chat_id,
                call.from_jid,
                call.from_me,
                call.start_ts,
                call.is_video,
                call.duration_seconds,
                call.outcome,
            ],
        )?;
        self.get_call_log(&call.call_log_id, &call.instance_id)
    }

    pub fn get_call_log(&self, call_log_id: &str, instance_id: &str) -> Result<CallLogRow, StorageError> {
        self.conn()
            .query_row(
                "SELECT call_log_id, instance_id, chat_id, from_jid, from_me, start_ts,
                        is_video, duration_seconds, outcome
                 FROM call_logs WHERE call_log_id = ?1 AND instance_id = ?2",
                params![call_log_id, instance_id],
                row_to_call,
            )
            .map_err(StorageError::from)
    }
}

fn row_to_call(row: &rusqlite::Row) -> rusqlite::Result<CallLogRow> {
    Ok(CallLogRow {
        call_log_id: row.get(0)?,
        instance_id: row.get(1)?,
        chat_id: row.get(2)?,
        from_jid: row.get(3)?,
        from_me: row.get::<_, i64>(4)? != 0,
        start_ts: row.get(5)?,
        is_video: row.get::<_, i64>(6)? != 0,
        duration_seconds: row.get(7)?,
        outcome: row.get(8)?,
    })
}
