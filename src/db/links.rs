use super::Db;
use crate::error::StorageError;
use crate::models::{LinkType, MessageBillLink, MessageEventLink, MessageNoteLink, MessageTaskLink};
use rusqlite::{OptionalExtension, params};

impl Db {
    /// The idempotency anchor (spec §9 "Trigger link"): a `trigger`-typed
    /// link proves an entity was already produced from this (message, rule)
    /// pair, so the executor treats a repeat reaction as an update instead
    /// of a re-create (spec §3 MessageTaskLink, testable property 5).
    pub fn find_task_trigger_link(
        &self,
        message_id: &str,
        instance_id: &str,
    ) -> Result<Option<MessageTaskLink>, StorageError> {
        self.conn()
            .query_row(
                "SELECT link_id, message_id, instance_id, task_id, link_type, created_at
                 FROM message_task_links
                 WHERE message_id = ?1 AND instance_id = ?2 AND link_type = 'trigger'",
                params![message_id, instance_id],
                row_to_task_link,
            )
            .optional()
            .map_err(StorageError::from)
    }

    pub fn insert_task_link(
        &self,
        message_id: &str,
        instance_id: &str,
        task_id: &str,
        link_type: LinkType,
    ) -> Result<MessageTaskLink, StorageError> {
        let conn = self.conn();
        let link_id = uuid::Uuid::new_v4().to_string();
        let now = chrono::Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO message_task_links (link_id, message_id, instance_id, task_id, link_type, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(message_id, instance_id, task_id, link_type) DO NOTHING",
            params![link_id, message_id, instance_id, task_id, link_type.as_str(), now],
        )?;
        Ok(MessageTaskLink {
            link_id,
            message_id: message_id.to_string(),
            instance_id: instance_id.to_string(),
            task_id: task_id.to_string(),
            link_type: link_type.as_str().to_string(),
            created_at: now,
        })
    }

    pub fn find_event_trigger_link(
        &self,
        message_id: &str,
        instance_id: &str,
    ) -> Result<Option<MessageEventLink>, StorageError> {
        self.conn()
            .query_row(
                "SELECT link_id, message_id, instance_id, event_id, link_type, created_at
                 FROM message_event_links
                 WHERE message_id = ?1 AND instance_id = ?2 AND link_type = 'trigger'",
                params![message_id, instance_id],
                row_to_event_link,
            )
            .optional()
            .map_err(StorageError::from)
    }

    pub fn insert_event_link(
        &self,
        message_id: &str,
        instance_id: &str,
        event_id: &str,
        link_type: LinkType,
    ) -> Result<MessageEventLink, StorageError> {
        let conn = self.conn();
        let link_id = uuid::Uuid::new_v4().to_string();
        let now = chrono::Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO message_event_links (link_id, message_id, instance_id, event_id, link_type, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(message_id, instance_id, event_id, link_type) DO NOTHING",
            params![link_id, message_id, instance_id, event_id, link_type.as_str(), now],
        )?;
        Ok(MessageEventLink {
            link_id,
            message_id: message_id.to_string(),
            instance_id: instance_id.to_string(),
            event_id: event_id.to_string(),
            link_type: link_type.as_str().to_string(),
            created_at: now,
        })
    }

    /// Same idempotency-anchor role as `find_task_trigger_link`, for bills
    /// (spec §9 "model these as separate link tables per (source, target)
    /// pair" — bills get their own table rather than reusing task links).
    pub fn find_bill_trigger_link(
        &self,
        message_id: &str,
        instance_id: &str,
    ) -> Result<Option<MessageBillLink>, StorageError> {
        self.conn()
            .query_row(
                "SELECT link_id, message_id, instance_id, bill_id, link_type, created_at
                 FROM message_bill_links
                 WHERE message_id = ?1 AND instance_id = ?2 AND link_type = 'trigger'",
                params![message_id, instance_id],
                row_to_bill_link,
            )
            .optional()
            .map_err(StorageError::from)
    }

    pub fn insert_bill_link(
        &self,
        message_id: &str,
        instance_id: &str,
        bill_id: &str,
        link_type: LinkType,
    ) -> Result<MessageBillLink, StorageError> {
        let conn = self.conn();
        let link_id = uuid::Uuid::new_v4().to_string();
        let now = chrono::Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO message_bill_links (link_id, message_id, instance_id, bill_id, link_type, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(message_id, instance_id, bill_id, link_type) DO NOTHING",
            params![link_id, message_id, instance_id, bill_id, link_type.as_str(), now],
        )?;
        Ok(MessageBillLink {
            link_id,
            message_id: message_id.to_string(),
            instance_id: instance_id.to_string(),
            bill_id: bill_id.to_string(),
            link_type: link_type.as_str().to_string(),
            created_at: now,
        })
    }

    /// Same idempotency-anchor role as `find_task_trigger_link`, for notes.
    pub fn find_note_trigger_link(
        &self,
        message_id: &str,
        instance_id: &str,
    ) -> Result<Option<MessageNoteLink>, StorageError> {
        self.conn()
            .query_row(
                "SELECT link_id, message_id, instance_id, note_id, link_type, created_at
                 FROM message_note_links
                 WHERE message_id = ?1 AND instance_id = ?2 AND link_type = 'trigger'",
                params![message_id, instance_id],
                row_to_note_link,
            )
            .optional()
            .map_err(StorageError::from)
    }

    pub fn insert_note_link(
        &self,
        message_id: &str,
        instance_id: &str,
        note_id: &str,
        link_type: LinkType,
    ) -> Result<MessageNoteLink, StorageError> {
        let conn = self.conn();
        let link_id = uuid::Uuid::new_v4().to_string();
        let now = chrono::Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO message_note_links (link_id, message_id, instance_id, note_id, link_type, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(message_id, instance_id, note_id, link_type) DO NOTHING",
            params![link_id, message_id, instance_id, note_id, link_type.as_str(), now],
        )?;
        Ok(MessageNoteLink {
            link_id,
            message_id: message_id.to_string(),
            instance_id: instance_id.to_string(),
            note_id: note_id.to_string(),
            link_type: link_type.as_str().to_string(),
            created_at: now,
        })
    }
}

fn row_to_task_link(row: &rusqlite::Row) -> rusqlite::Result<MessageTaskLink> {
    Ok(MessageTaskLink {
        link_id: row.get(0)?,
        message_id: row.get(1)?,
        instance_id: row.get(2)?,
        task_id: row.get(3)?,
        link_type: row.get(4)?,
        created_at: row.get(5)?,
    })
}

fn row_to_event_link(row: &rusqlite::Row) -> rusqlite::Result<MessageEventLink> {
    Ok(MessageEventLink {
        link_id: row.get(0)?,
        message_id: row.get(1)?,
        instance_id: row.get(2)?,
        event_id: row.get(3)?,
        link_type: row.get(4)?,
        created_at: row.get(5)?,
    })
}

fn row_to_bill_link(row: &rusqlite::Row) -> rusqlite::Result<MessageBillLink> {
    Ok(MessageBillLink {
        link_id: row.get(0)?,
        message_id: row.get(1)?,
        instance_id: row.get(2)?,
        bill_id: row.get(3)?,
        link_type: row.get(4)?,
        created_at: row.get(5)?,
    })
}

fn row_to_note_link(row: &rusqlite::Row) -> rusqlite::Result<MessageNoteLink> {
    Ok(MessageNoteLink {
        link_id: row.get(0)?,
        message_id: row.get(1)?,
        instance_id: row.get(2)?,
        note_id: row.get(3)?,
        link_type: row.get(4)?,
        created_at: row.get(5)?,
    })
}
