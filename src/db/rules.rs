use super::Db;
use crate::error::StorageError;
use crate::models::{ActionRule, RuleConditions, RuleConfig};
use rusqlite::{OptionalExtension, params};

/// Whether `rule_type` (spec §3 ActionRule: `simple_action`/`nlp_action`,
/// gating whether the NLP Service runs at all per spec §2's data flow) is
/// consistent with `action_type`. The NLP-backed actions require text
/// extraction to populate their entity; the non-NLP actions run off rule
/// config/context alone.
fn rule_type_matches_action(rule_type: &str, action_type: &str) -> bool {
    let is_nlp_action_type = matches!(
        action_type,
        "create_task" | "create_calendar_event" | "create_bill" | "create_note"
    );
    match rule_type {
        "nlp_action" => is_nlp_action_type,
        "simple_action" => !is_nlp_action_type,
        _ => false,
    }
}

impl Db {
    /// At most one active rule per (trigger_type, trigger_value) — enforced
    /// by the partial unique index `idx_rules_trigger_active` (spec §3, §4.4
    /// conflict check). A write that would violate it surfaces as
    /// `StorageError::Conflict` via the `rusqlite::Error` -> `StorageError`
    /// mapping (UNIQUE violation, not FOREIGN KEY).
    pub fn create_rule(&self, rule: &ActionRule) -> Result<ActionRule, StorageError> {
        if !rule_type_matches_action(&rule.rule_type, &rule.action_type) {
            return Err(StorageError::Validation(format!(
                "rule_type {} is not valid for action_type {}",
                rule.rule_type, rule.action_type
            )));
        }
        let conn = self.conn();
        if rule.active && self.active_rule_conflict(&conn, rule, None)? {
            return Err(StorageError::Conflict(format!(
                "an active rule already exists for {}:{}",
                rule.trigger_type, rule.trigger_value
            )));
        }
        conn.execute(
            "INSERT INTO action_rules (rule_id, rule_name, rule_type, trigger_type, trigger_value,
                action_type, config, conditions, active, cooldown_minutes, max_executions_per_day,
                total_executions, last_executed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, 0, NULL)",
            params![
                rule.rule_id,
                rule.rule_name,
                rule.rule_type,
                rule.trigger_type,
                rule.trigger_value,
                rule.action_type,
                serde_json::to_string(&rule.config).unwrap_or_default(),
                serde_json::to_string(&rule.conditions).unwrap_or_default(),
                rule.active,
                rule.cooldown_minutes,
                rule.max_executions_per_day,
            ],
        )?;
        drop(conn);
        self.get_rule(&rule.rule_id)
    }

    pub fn update_rule(&self, rule: &ActionRule) -> Result<ActionRule, StorageError> {
        if !rule_type_matches_action(&rule.rule_type, &rule.action_type) {
            return Err(StorageError::Validation(format!(
                "rule_type {} is not valid for action_type {}",
                rule.rule_type, rule.action_type
            )));
        }
        let conn = self.conn();
        if rule.active && self.active_rule_conflict(&conn, rule, Some(&rule.rule_id))? {
            return Err(StorageError::Conflict(format!(
                "an active rule already exists for {}:{}",
                rule.trigger_type, rule.trigger_value
            )));
        }
        let changed = conn.execute(
            "UPDATE action_rules SET rule_name = ?2, rule_type = ?3, trigger_type = ?4,
                trigger_value = ?5, action_type = ?6, config = ?7, conditions = ?8, active = ?9,
                cooldown_minutes = ?10, max_executions_per_day = ?11
             WHERE rule_id = ?1",
            params![
                rule.rule_id,
                rule.rule_name,
                rule.rule_type,
                rule.trigger_type,
                rule.trigger_value,
                rule.action_type,
                serde_json::to_string(&rule.config).unwrap_or_default(),
                serde_json::to_string(&rule.conditions).unwrap_or_default(),
                rule.active,
                rule.cooldown_minutes,
                rule.max_executions_per_day,
            ],
        )?;
        if changed == 0 {
            return Err(StorageError::NotFound(format!("rule {}", rule.rule_id)));
        }
        drop(conn);
        self.get_rule(&rule.rule_id)
    }

    /// Soft-delete: flips `active` off rather than removing the row, so
    /// execution history (`action_execution_log.rule_id`) keeps resolving.
    pub fn soft_delete_rule(&self, rule_id: &str) -> Result<(), StorageError> {
        let changed = self.conn().execute(
            "UPDATE action_rules SET active = 0 WHERE rule_id = ?1",
            params![rule_id],
        )?;
        if changed == 0 {
            return Err(StorageError::NotFound(format!("rule {}", rule_id)));
        }
        Ok(())
    }

    pub fn get_rule(&self, rule_id: &str) -> Result<ActionRule, StorageError> {
        self.conn()
            .query_row(
                "SELECT rule_id, rule_name, rule_type, trigger_type, trigger_value, action_type,
                        config, conditions, active, cooldown_minutes, max_executions_per_day,
                        total_executions, last_executed_at
                 FROM action_rules WHERE rule_id = ?1",
                params![rule_id],
                row_to_rule,
            )
            .map_err(StorageError::from)
    }

    pub fn list_rules(&self) -> Result<Vec<ActionRule>, StorageError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT rule_id, rule_name, rule_type, trigger_type, trigger_value, action_type,
                    config, conditions, active, cooldown_minutes, max_executions_per_day,
                    total_executions, last_executed_at
             FROM action_rules ORDER BY rule_name",
        )?;
        let rows = stmt.query_map([], row_to_rule)?.filter_map(|r| r.ok()).collect();
        Ok(rows)
    }

    /// All *active* rules matching `trigger_type`/`trigger_value` exactly
    /// (hashtag case-folding and condition filtering happen in the rule
    /// engine layer on top of this — spec §4.4). This is the raw storage
    /// lookup; `rules::RuleEngine::find_matching` applies the rest.
    pub fn find_rules_by_trigger(
        &self,
        trigger_type: &str,
        trigger_value: &str,
    ) -> Result<Vec<ActionRule>, StorageError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT rule_id, rule_name, rule_type, trigger_type, trigger_value, action_type,
                    config, conditions, active, cooldown_minutes, max_executions_per_day,
                    total_executions, last_executed_at
             FROM action_rules WHERE trigger_type = ?1 AND trigger_value = ?2 AND active = 1",
        )?;
        let rows = stmt
            .query_map(params![trigger_type, trigger_value], row_to_rule)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    /// Increments `total_executions` and stamps `last_executed_at` (spec §4.4
    /// cooldown/day-cap accounting).
    pub fn record_rule_execution(&self, rule_id: &str) -> Result<(), StorageError> {
        let now = chrono::Utc::now().to_rfc3339();
        self.conn().execute(
            "UPDATE action_rules SET total_executions = total_executions + 1, last_executed_at = ?2
             WHERE rule_id = ?1",
            params![rule_id, now],
        )?;
        Ok(())
    }

    /// Count of executions since local midnight, for `max_executions_per_day`
    /// (spec §4.4). Uses `action_execution_log.created_at` rather than the
    /// rule's running counter, since the counter is lifetime-total.
    pub fn executions_today(&self, rule_id: &str) -> Result<i64, StorageError> {
        let today = chrono::Utc::now().format("%Y-%m-%d").to_string();
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM action_execution_log
             WHERE rule_id = ?1 AND substr(created_at, 1, 10) = ?2 AND status = 'success'",
            params![rule_id, today],
            |r| r.get(0),
        )?;
        Ok(count)
    }

    fn active_rule_conflict(
        &self,
        conn: &rusqlite::Connection,
        rule: &ActionRule,
        exclude_rule_id: Option<&str>,
    ) -> Result<bool, StorageError> {
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM action_rules
             WHERE trigger_type = ?1 AND trigger_value = ?2 AND active = 1 AND rule_id != ?3",
            params![rule.trigger_type, rule.trigger_value, exclude_rule_id.unwrap_or("")],
            |r| r.get(0),
        )?;
        Ok(count > 0)
    }
}

fn row_to_rule(row: &rusqlite::Row) -> rusqlite::Result<ActionRule> {
    let config: String = row.get(6)?;
    let conditions: String = row.get(7)?;
    Ok(ActionRule {
        rule_id: row.get(0)?,
        rule_name: row.get(1)?,
        rule_type: row.get(2)?,
        trigger_type: row.get(3)?,
        trigger_value: row.get(4)?,
        action_type: row.get(5)?,
        config: serde_json::from_str::<RuleConfig>(&config).unwrap_or_default(),
        conditions: serde_json::from_str::<RuleConditions>(&conditions).unwrap_or_default(),
        active: row.get::<_, i64>(8)? != 0,
        cooldown_minutes: row.get(9)?,
        max_executions_per_day: row.get(10)?,
        total_executions: row.get(11)?,
        last_executed_at: row.get(12)?,
    })
}
