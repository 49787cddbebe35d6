use super::Db;
use crate::error::StorageError;
use crate::models::Contact;
use rusqlite::{OptionalExtension, params};

impl Db {
    /// Merges push_name/profile_picture on update; never clears `is_me` once true
    /// (spec §4.1).
    pub fn upsert_contact(&self, contact: &Contact) -> Result<Contact, StorageError> {
        let conn = self.conn();
        let existing: Option<(bool, bool)> = conn
            .query_row(
                "SELECT is_me, is_blocked FROM contacts WHERE jid = ?1 AND instance_id = ?2",
                params![contact.jid, contact.instance_id],
                |r| Ok((r.get::<_, i64>(0)? != 0, r.get::<_, i64>(1)? != 0)),
            )
            .optional()?;

        let is_me = contact.is_me || existing.map(|(m, _)| m).unwrap_or(false);

        conn.execute(
            "INSERT INTO contacts (jid, instance_id, push_name, verified_name, profile_picture_url,
                is_business, is_me, is_blocked, first_seen_at, last_updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)
             ON CONFLICT(jid, instance_id) DO UPDATE SET
                push_name = COALESCE(excluded.push_name, contacts.push_name),
                verified_name = COALESCE(excluded.verified_name, contacts.verified_name),
                profile_picture_url = COALESCE(excluded.profile_picture_url, contacts.profile_picture_url),
                is_business = excluded.is_business,
                is_me = ?7,
                is_blocked = excluded.is_blocked,
                last_updated_at = excluded.last_updated_at",
            params![
                contact.jid,
                contact.instance_id,
                contact.push_name,
                contact.verified_name,
                contact.profile_picture_url,
                contact.is_business,
                is_me,
                contact.is_blocked,
                contact.last_updated_at,
            ],
        )?;

        self.get_contact(&contact.jid, &contact.instance_id)
    }

    pub fn get_contact(&self, jid: &str, instance_id: &str) -> Result<Contact, StorageError> {
        let conn = self.conn();
        conn.query_row(
            "SELECT jid, instance_id, push_name, verified_name, profile_picture_url,
                    is_business, is_me, is_blocked, first_seen_at, last_updated_at
             FROM contacts WHERE jid = ?1 AND instance_id = ?2",
            params![jid, instance_id],
            row_to_contact,
        )
        .map_err(StorageError::from)
    }

    pub fn contact_exists(&self, jid: &str, instance_id: &str) -> bool {
        self.conn()
            .query_row(
                "SELECT 1 FROM contacts WHERE jid = ?1 AND instance_id = ?2",
                params![jid, instance_id],
                |_| Ok(()),
            )
            .optional()
            .unwrap_or(None)
            .is_some()
    }
}

fn row_to_contact(row: &rusqlite::Row) -> rusqlite::Result<Contact> {
    Ok(Contact {
        jid: row.get(0)?,
        instance_id: row.get(1)?,
        push_name: row.get(2)?,
        verified_name: row.get(3)?,
        profile_picture_url: row.get(4)?,
        is_business: row.get::<_, i64>(5)? != 0,
        is_me: row.get::<_, i64>(6)? != 0,
        is_blocked: row.get::<_, i64>(7)? != 0,
        first_seen_at: row.get(8)?,
        last_updated_at: row.get(9)?,
    })
}
