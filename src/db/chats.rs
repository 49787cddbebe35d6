use super::Db;
use crate::error::StorageError;
use crate::models::Chat;
use rusqlite::{OptionalExtension, params};

impl Db {
    /// `last_message_ts` is monotonically non-decreasing; `unread_count` is
    /// overwritten as given (spec §4.1).
    pub fn upsert_chat(&self, chat: &Chat) -> Result<Chat, StorageError> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO chats (chat_id, instance_id, chat_type, unread_count, archived,
                pinned, muted, mute_end_ts, last_message_ts)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(chat_id, instance_id) DO UPDATE SET
                chat_type = excluded.chat_type,
                unread_count = excluded.unread_count,
                archived = excluded.archived,
                pinned = excluded.pinned,
                muted = excluded.muted,
                mute_end_ts = excluded.mute_end_ts,
                last_message_ts = CASE
                    WHEN excluded.last_message_ts IS NULL THEN chats.last_message_ts
                    WHEN chats.last_message_ts IS NULL THEN excluded.last_message_ts
                    WHEN excluded.last_message_ts > chats.last_message_ts THEN excluded.last_message_ts
                    ELSE chats.last_message_ts
                END",
            params![
                chat.chat_id,
                chat.instance_id,
                chat.chat_type,
                chat.unread_count,
                chat.archived,
                chat.pinned,
                chat.muted,
                chat.mute_end_ts,
                chat.last_message_ts,
            ],
        )?;

        self.get_chat(&chat.chat_id, &chat.instance_id)
    }

    pub fn get_chat(&self, chat_id: &str, instance_id: &str) -> Result<Chat, StorageError> {
        let conn = self.conn();
        conn.query_row(
            "SELECT chat_id, instance_id, chat_type, unread_count, archived, pinned, muted,
                    mute_end_ts, last_message_ts
             FROM chats WHERE chat_id = ?1 AND instance_id = ?2",
            params![chat_id, instance_id],
            row_to_chat,
        )
        .map_err(StorageError::from)
    }

    pub fn chat_exists(&self, chat_id: &str, instance_id: &str) -> bool {
        self.conn()
            .query_row(
                "SELECT 1 FROM chats WHERE chat_id = ?1 AND instance_id = ?2",
                params![chat_id, instance_id],
                |_| Ok(()),
            )
            .optional()
            .unwrap_or(None)
            .is_some()
    }
}

fn row_to_chat(row: &rusqlite::Row) -> rusqlite::Result<Chat> {
    let chat_type: String = row.get(2)?;
    Ok(Chat {
        chat_id: row.get(0)?,
        instance_id: row.get(1)?,
        chat_type,
        unread_count: row.get(3)?,
        archived: row.get::<_, i64>(4)? != 0,
        pinned: row.get::<_, i64>(5)? != 0,
        muted: row.get::<_, i64>(6)? != 0,
        mute_end_ts: row.get(7)?,
        last_message_ts: row.get(8)?,
    })
}
