use super::Db;
use crate::error::StorageError;
use crate::models::{Group, GroupParticipant, ParticipantAction};
use rusqlite::{OptionalExtension, params};

impl Db {
    /// INSERTs a row with `subject = NULL` if absent. Never updates subject —
    /// only `upsert_group` may write one (spec §4.1, §3 Group invariant).
    pub fn create_group_placeholder_if_needed(
        &self,
        group_jid: &str,
        instance_id: &str,
    ) -> Result<(), StorageError> {
        self.conn().execute(
            "INSERT INTO groups (group_jid, instance_id, subject, owner_jid, description, creation_ts, is_locked)
             VALUES (?1, ?2, NULL, NULL, NULL, NULL, 0)
             ON CONFLICT(group_jid, instance_id) DO NOTHING",
            params![group_jid, instance_id],
        )?;
        Ok(())
    }

    /// Only this operation may write a non-null subject; it writes
    /// authoritative fields from a `groups.upsert` event.
    pub fn upsert_group(&self, group: &Group) -> Result<Group, StorageError> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO groups (group_jid, instance_id, subject, owner_jid, description, creation_ts, is_locked)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(group_jid, instance_id) DO UPDATE SET
                subject = excluded.subject,
                owner_jid = COALESCE(excluded.owner_jid, groups.owner_jid),
                description = COALESCE(excluded.description, groups.description),
                creation_ts = COALESCE(groups.creation_ts, excluded.creation_ts),
                is_locked = excluded.is_locked",
            params![
                group.group_jid,
                group.instance_id,
                group.subject,
                group.owner_jid,
                group.description,
                group.creation_ts,
                group.is_locked,
            ],
        )?;
        self.get_group(&group.group_jid, &group.instance_id)
    }

    pub fn get_group(&self, group_jid: &str, instance_id: &str) -> Result<Group, StorageError> {
        self.conn()
            .query_row(
                "SELECT group_jid, instance_id, subject, owner_jid, description, creation_ts, is_locked
                 FROM groups WHERE group_jid = ?1 AND instance_id = ?2",
                params![group_jid, instance_id],
                row_to_group,
            )
            .map_err(StorageError::from)
    }

    pub fn group_exists(&self, group_jid: &str, instance_id: &str) -> bool {
        self.conn()
            .query_row(
                "SELECT 1 FROM groups WHERE group_jid = ?1 AND instance_id = ?2",
                params![group_jid, instance_id],
                |_| Ok(()),
            )
            .optional()
            .unwrap_or(None)
            .is_some()
    }

    pub fn apply_participant_action(
        &self,
        group_jid: &str,
        participant_jid: &str,
        instance_id: &str,
        action: ParticipantAction,
    ) -> Result<(), StorageError> {
        let conn = self.conn();
        match action {
            ParticipantAction::Add => {
                conn.execute(
                    "INSERT INTO group_participants (group_jid, participant_jid, instance_id, is_admin, is_super_admin)
                     VALUES (?1, ?2, ?3, 0, 0)
                     ON CONFLICT(group_jid, participant_jid, instance_id) DO NOTHING",
                    params![group_jid, participant_jid, instance_id],
                )?;
            }
            ParticipantAction::Remove => {
                conn.execute(
                    "DELETE FROM group_participants WHERE group_jid = ?1 AND participant_jid = ?2 AND instance_id = ?3",
                    params![group_jid, participant_jid, instance_id],
                )?;
            }
            ParticipantAction::Promote => {
                conn.execute(
                    "UPDATE group_participants SET is_admin = 1 WHERE group_jid = ?1 AND participant_jid = ?2 AND instance_id = ?3",
                    params![group_jid, participant_jid, instance_id],
                )?;
            }
            ParticipantAction::Demote => {
                conn.execute(
                    "UPDATE group_participants SET is_admin = 0, is_super_admin = 0 WHERE group_jid = ?1 AND participant_jid = ?2 AND instance_id = ?3",
                    params![group_jid, participant_jid, instance_id],
                )?;
            }
        }
        Ok(())
    }

    pub fn list_group_participants(
        &self,
        group_jid: &str,
        instance_id: &str,
    ) -> Result<Vec<GroupParticipant>, StorageError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT group_jid, participant_jid, instance_id, is_admin, is_super_admin
             FROM group_participants WHERE group_jid = ?1 AND instance_id = ?2",
        )?;
        let rows = stmt
            .query_map(params![group_jid, instance_id], |row| {
                Ok(GroupParticipant {
                    group_jid: row.get(0)?,
                    participant_jid: row.get(1)?,
                    instance_id: row.get(2)?,
                    is_admin: row.get::<_, i64>(3)? != 0,
                    is_super_admin: row.get::<_, i64>(4)? != 0,
                })
            })?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }
}

fn row_to_group(row: &rusqlite::Row) -> rusqlite::Result<Group> {
    Ok(Group {
        group_jid: row.get(0)?,
        instance_id: row.get(1)?,
        subject: row.get(2)?,
        owner_jid: row.get(3)?,
        description: row.get(4)?,
        creation_ts: row.get(5)?,
        is_locked: row.get::<_, i64>(6)? != 0,
    })
}
