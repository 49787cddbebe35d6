use super::Db;
use crate::error::StorageError;
use crate::models::{ChangeOperation, MessageReaction};
use rusqlite::params;

impl Db {
    /// Collision on (message_id, instance_id, reactor_jid) overwrites emoji
    /// and timestamp; an empty emoji is retained as-is, denoting removal
    /// (spec §4.1 `upsertReaction`). Appends an `entity_changes` row so the
    /// change-capture layer can enqueue the follow-on action (spec §4.3a).
    pub fn upsert_reaction(&self, reaction: &MessageReaction) -> Result<MessageReaction, StorageError> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO message_reactions (message_id, instance_id, reactor_jid, reaction_emoji, from_me, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(message_id, instance_id, reactor_jid) DO UPDATE SET
                reaction_emoji = excluded.reaction_emoji,
                from_me = excluded.from_me,
                timestamp = excluded.timestamp",
            params![
                reaction.message_id,
                reaction.instance_id,
                reaction.reactor_jid,
                reaction.reaction_emoji,
                reaction.from_me,
                reaction.timestamp,
            ],
        )?;

        Db::record_change(
            &tx,
            "message_reactions",
            ChangeOperation::Update,
            &reaction.message_id,
            "reaction",
            None,
            Some(&serde_json::json!({
                "reactor_jid": reaction.reactor_jid,
                "reaction_emoji": reaction.reaction_emoji,
            })),
            &serde_json::json!({"instance_id": reaction.instance_id, "timestamp": reaction.timestamp}),
        )?;
        tx.commit()?;

        self.get_reaction(&reaction.message_id, &reaction.instance_id, &reaction.reactor_jid)
    }

    pub fn get_reaction(
        &self,
        message_id: &str,
        instance_id: &str,
        reactor_jid: &str,
    ) -> Result<MessageReaction, StorageError> {
        self.conn()
            .query_row(
                "SELECT message_id, instance_id, reactor_jid, reaction_emoji, from_me, timestamp
                 FROM message_reactions WHERE message_id = ?1 AND instance_id = ?2 AND reactor_jid = ?3",
                params![message_id, instance_id, reactor_jid],
                row_to_reaction,
            )
            .map_err(StorageError::from)
    }

    pub fn list_reactions_for_message(
        &self,
        message_id: &str,
        instance_id: &str,
    ) -> Result<Vec<MessageReaction>, StorageError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT message_id, instance_id, reactor_jid, reaction_emoji, from_me, timestamp
             FROM message_reactions WHERE message_id = ?1 AND instance_id = ?2",
        )?;
        let rows = stmt
            .query_map(params![message_id, instance_id], row_to_reaction)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }
}

fn row_to_reaction(row: &rusqlite::Row) -> rusqlite::Result<MessageReaction> {
    Ok(MessageReaction {
        message_id: row.get(0)?,
        instance_id: row.get(1)?,
        reactor_jid: row.get(2)?,
        reaction_emoji: row.get(3)?,
        from_me: row.get::<_, i64>(4)? != 0,
        timestamp: row.get(5)?,
    })
}
