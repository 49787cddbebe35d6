use super::Db;
use crate::error::StorageError;
use crate::models::{ChangeOperation, Message, MessageStatus, MessageStatusUpdate};
use rusqlite::{OptionalExtension, params};

impl Db {
    /// A message row is inserted only after its sender and chat dependency
    /// rows exist (spec §3 Message invariant); callers run dependency
    /// materialization (webhook::normalize) before calling this. Key
    /// collision updates content/is_edited/last_edited_at only (spec §4.1).
    pub fn upsert_message(&self, message: &Message) -> Result<Message, StorageError> {
        let mut conn = self.conn();
        if !self.chat_exists(&message.chat_id, &message.instance_id) {
            return Err(StorageError::FkViolation(format!(
                "chat {} not materialized for instance {}",
                message.chat_id, message.instance_id
            )));
        }
        if !self.contact_exists(&message.sender_jid, &message.instance_id) {
            return Err(StorageError::FkViolation(format!(
                "sender {} not materialized for instance {}",
                message.sender_jid, message.instance_id
            )));
        }

        let tx = conn.transaction()?;
        let existed = tx
            .query_row(
                "SELECT 1 FROM messages WHERE message_id = ?1 AND instance_id = ?2",
                params![message.message_id, message.instance_id],
                |_| Ok(()),
            )
            .optional()?
            .is_some();

        tx.execute(
            "INSERT INTO messages (message_id, instance_id, chat_id, sender_jid, from_me,
                message_type, content, timestamp, quoted_message_id, is_forwarded,
                forwarding_score, is_starred, is_edited, last_edited_at, source_platform, raw_payload)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
             ON CONFLICT(message_id, instance_id) DO UPDATE SET
                content = excluded.content,
                is_edited = excluded.is_edited,
                last_edited_at = excluded.last_edited_at",
            params![
                message.message_id,
                message.instance_id,
                message.chat_id,
                message.sender_jid,
                message.from_me,
                message.message_type,
                message.content,
                message.timestamp,
                message.quoted_message_id,
                message.is_forwarded,
                message.forwarding_score,
                message.is_starred,
                message.is_edited,
                message.last_edited_at,
                message.source_platform,
                message.raw_payload.to_string(),
            ],
        )?;

        let op = if existed { ChangeOperation::Update } else { ChangeOperation::Insert };
        Db::record_change(
            &tx,
            "messages",
            op,
            &message.message_id,
            "message",
            None,
            Some(&serde_json::json!({"chat_id": message.chat_id, "sender_jid": message.sender_jid})),
            &serde_json::json!({"instance_id": message.instance_id, "timestamp": message.timestamp}),
        )?;
        tx.commit()?;

        self.get_message(&message.message_id, &message.instance_id)
    }

    pub fn get_message(&self, message_id: &str, instance_id: &str) -> Result<Message, StorageError> {
        self.conn()
            .query_row(
                "SELECT message_id, instance_id, chat_id, sender_jid, from_me, message_type, content,
                        timestamp, quoted_message_id, is_forwarded, forwarding_score, is_starred,
                        is_edited, last_edited_at, source_platform, raw_payload
                 FROM messages WHERE message_id = ?1 AND instance_id = ?2",
                params![message_id, instance_id],
                row_to_message,
            )
            .map_err(StorageError::from)
    }

    pub fn message_exists(&self, message_id: &str, instance_id: &str) -> bool {
        self.conn()
            .query_row(
                "SELECT 1 FROM messages WHERE message_id = ?1 AND instance_id = ?2",
                params![message_id, instance_id],
                |_| Ok(()),
            )
            .optional()
            .unwrap_or(None)
            .is_some()
    }

    /// Pure append, preserving arrival order (spec §3 MessageStatusUpdate).
    pub fn append_message_status_update(
        &self,
        message_id: &str,
        instance_id: &str,
        status: MessageStatus,
    ) -> Result<MessageStatusUpdate, StorageError> {
        let conn = self.conn();
        let id = uuid::Uuid::new_v4().to_string();
        let now = chrono::Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO message_status_updates (id, message_id, instance_id, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![id, message_id, instance_id, status.as_str(), now],
        )?;
        Ok(MessageStatusUpdate {
            message_id: message_id.to_string(),
            instance_id: instance_id.to_string(),
            status: status.as_str().to_string(),
            created_at: now,
        })
    }

    /// Soft-delete: marks the message revoked rather than removing the row
    /// (spec §4.2 messages.delete — preserve audit).
    pub fn mark_message_revoked(&self, message_id: &str, instance_id: &str) -> Result<(), StorageError> {
        self.conn().execute(
            "UPDATE messages SET message_type = 'revoked' WHERE message_id = ?1 AND instance_id = ?2",
            params![message_id, instance_id],
        )?;
        Ok(())
    }
}

fn row_to_message(row: &rusqlite::Row) -> rusqlite::Result<Message> {
    let raw_payload: String = row.get(15)?;
    Ok(Message {
        message_id: row.get(0)?,
        instance_id: row.get(1)?,
        chat_id: row.get(2)?,
        sender_jid: row.get(3)?,
        from_me: row.get::<_, i64>(4)? != 0,
        message_type: row.get(5)?,
        content: row.get(6)?,
        timestamp: row.get(7)?,
        quoted_message_id: row.get(8)?,
        is_forwarded: row.get::<_, i64>(9)? != 0,
        forwarding_score: row.get(10)?,
        is_starred: row.get::<_, i64>(11)? != 0,
        is_edited: row.get::<_, i64>(12)? != 0,
        last_edited_at: row.get(13)?,
        source_platform: row.get(14)?,
        raw_payload: serde_json::from_str(&raw_payload).unwrap_or_default(),
    })
}
