use super::Db;
use crate::error::StorageError;
use crate::models::Instance;
use rusqlite::params;

/// Instances are created by an external collaborator (spec §3 Instance
/// lifecycle: "read-only to the core"); `upsert_instance` exists only so
/// tests and local deployments can seed one without a separate provisioning
/// service. The core otherwise only reads instance rows and updates
/// `connection_state` from `connection.update` events (spec §4.2).
impl Db {
    pub fn upsert_instance(&self, instance: &Instance) -> Result<Instance, StorageError> {
        self.conn().execute(
            "INSERT INTO instances (instance_id, owner_jid, creator_user_id, api_base_url, api_key, connection_state)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(instance_id) DO UPDATE SET
                owner_jid = COALESCE(excluded.owner_jid, instances.owner_jid),
                api_base_url = excluded.api_base_url,
                api_key = excluded.api_key",
            params![
                instance.instance_id,
                instance.owner_jid,
                instance.creator_user_id,
                instance.api_base_url,
                instance.api_key,
                instance.connection_state,
            ],
        )?;
        self.get_instance(&instance.instance_id)
    }

    pub fn get_instance(&self, instance_id: &str) -> Result<Instance, StorageError> {
        self.conn()
            .query_row(
                "SELECT instance_id, owner_jid, creator_user_id, api_base_url, api_key, connection_state
                 FROM instances WHERE instance_id = ?1",
                params![instance_id],
                row_to_instance,
            )
            .map_err(StorageError::from)
    }

    pub fn update_connection_state(&self, instance_id: &str, state: &str) -> Result<(), StorageError> {
        let changed = self.conn().execute(
            "UPDATE instances SET connection_state = ?2 WHERE instance_id = ?1",
            params![instance_id, state],
        )?;
        if changed == 0 {
            return Err(StorageError::NotFound(format!("instance {instance_id}")));
        }
        Ok(())
    }
}

fn row_to_instance(row: &rusqlite::Row) -> rusqlite::Result<Instance> {
    Ok(Instance {
        instance_id: row.get(0)?,
        owner_jid: row.get(1)?,
        creator_user_id: row.get(2)?,
        api_base_url: row.get(3)?,
        api_key: row.get(4)?,
        connection_state: row.get(5)?,
    })
}
