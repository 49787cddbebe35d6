//! Rule Engine (spec §4.4, component C4). Matches a trigger (emoji reaction
//! or hashtag) against active `ActionRule`s, applying condition filters,
//! cooldown, and daily execution caps. Results are cached per
//! (trigger_type, trigger_value, user_context) for up to 5 minutes and
//! invalidated on any rule write.
//!
//! Passed through explicit configuration rather than a hidden module-level
//! static (spec §9 "Global singletons avoided") — callers hold a `RuleCache`
//! in Rocket managed state alongside `Db`.

use crate::db::Db;
use crate::error::StorageError;
use crate::models::{ActionRule, TriggerType};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

const CACHE_TTL: Duration = Duration::from_secs(5 * 60);

#[derive(Clone)]
struct CacheEntry {
    rules: Vec<ActionRule>,
    expires_at: Instant,
}

#[derive(Default)]
pub struct RuleCache {
    entries: Mutex<HashMap<(String, String, String), CacheEntry>>,
}

impl RuleCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Explicit bust, called after any rule create/update/delete (spec §4.4
    /// "the cache is invalidated on any rule write"). In a multi-process
    /// deployment this is also where an invalidation notification would be
    /// published (spec §5) — single-process here, so a local clear suffices.
    pub fn invalidate_all(&self) {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }
}

/// Everything the rule engine needs about the triggering context beyond the
/// trigger itself — kept as a struct rather than a long parameter list since
/// every field feeds a distinct condition filter (spec §4.4).
pub struct MatchContext<'a> {
    pub instance_id: &'a str,
    pub reactor_jid: Option<&'a str>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// `findMatchingRules` (spec §4.4). Emoji triggers match exactly; hashtag
/// triggers match case-insensitively.
pub fn find_matching_rules(
    db: &Db,
    cache: &RuleCache,
    trigger_type: TriggerType,
    trigger_value: &str,
    ctx: &MatchContext,
) -> Result<Vec<ActionRule>, StorageError> {
    let normalized_value = match trigger_type {
        TriggerType::Reaction => trigger_value.to_string(),
        TriggerType::Hashtag => trigger_value.to_ascii_lowercase(),
    };
    let cache_key = (
        trigger_type.as_str().to_string(),
        normalized_value.clone(),
        ctx.reactor_jid.unwrap_or("").to_string(),
    );

    {
        let guard = cache.entries.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(entry) = guard.get(&cache_key) {
            if entry.expires_at > Instant::now() {
                return Ok(entry.rules.clone());
            }
        }
    }

    let candidates = db.find_rules_by_trigger(trigger_type.as_str(), &normalized_value)?;
    let mut matched = Vec::new();
    for rule in candidates {
        if admits(db, &rule, ctx)? {
            matched.push(rule);
        }
    }

    cache.entries.lock().unwrap_or_else(|e| e.into_inner()).insert(
        cache_key,
        CacheEntry { rules: matched.clone(), expires_at: Instant::now() + CACHE_TTL },
    );

    Ok(matched)
}

fn admits(db: &Db, rule: &ActionRule, ctx: &MatchContext) -> Result<bool, StorageError> {
    let c = &rule.conditions;

    if !c.instance_include.is_empty() && !c.instance_include.iter().any(|i| i == ctx.instance_id) {
        return Ok(false);
    }
    if c.instance_exclude.iter().any(|i| i == ctx.instance_id) {
        return Ok(false);
    }

    if let Some(reactor) = ctx.reactor_jid {
        if !c.contact_include.is_empty() && !c.contact_include.iter().any(|j| j == reactor) {
            return Ok(false);
        }
        if c.contact_exclude.iter().any(|j| j == reactor) {
            return Ok(false);
        }
    }

    if let Some((start_hour, end_hour)) = c.time_window {
        let hour = ctx.timestamp.format("%H").to_string().parse::<u32>().unwrap_or(0);
        let in_window = if start_hour <= end_hour {
            hour >= start_hour && hour <= end_hour
        } else {
            // Wrapping window, e.g. 22..6.
            hour >= start_hour || hour <= end_hour
        };
        if !in_window {
            return Ok(false);
        }
    }

    if rule.cooldown_minutes > 0 {
        if let Some(last) = &rule.last_executed_at {
            if let Ok(last_ts) = chrono::DateTime::parse_from_rfc3339(last) {
                let elapsed = ctx.timestamp.signed_duration_since(last_ts.with_timezone(&chrono::Utc));
                if elapsed < chrono::Duration::minutes(rule.cooldown_minutes) {
                    return Ok(false);
                }
            }
        }
    }

    if rule.max_executions_per_day > 0 {
        let today = db.executions_today(&rule.rule_id)?;
        if today >= rule.max_executions_per_day {
            return Ok(false);
        }
    }

    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RuleConditions, RuleConfig};

    fn rule(trigger_value: &str) -> ActionRule {
        ActionRule {
            rule_id: "r1".into(),
            rule_name: "test".into(),
            rule_type: "nlp_action".into(),
            trigger_type: "reaction".into(),
            trigger_value: trigger_value.into(),
            action_type: "create_task".into(),
            config: RuleConfig::default(),
            conditions: RuleConditions::default(),
            active: true,
            cooldown_minutes: 0,
            max_executions_per_day: 1000,
            total_executions: 0,
            last_executed_at: None,
        }
    }

    #[test]
    fn instance_exclude_filters_out() {
        let db = Db::new(":memory:");
        let mut r = rule("✅");
        r.conditions.instance_exclude = vec!["inst-1".into()];
        let ctx = MatchContext { instance_id: "inst-1", reactor_jid: None, timestamp: chrono::Utc::now() };
        assert!(!admits(&db, &r, &ctx).unwrap());
    }

    #[test]
    fn instance_include_requires_membership() {
        let db = Db::new(":memory:");
        let mut r = rule("✅");
        r.conditions.instance_include = vec!["inst-2".into()];
        let ctx = MatchContext { instance_id: "inst-1", reactor_jid: None, timestamp: chrono::Utc::now() };
        assert!(!admits(&db, &r, &ctx).unwrap());
    }

    #[test]
    fn cooldown_blocks_rapid_refire() {
        let db = Db::new(":memory:");
        let mut r = rule("✅");
        r.cooldown_minutes = 10;
        r.last_executed_at = Some(chrono::Utc::now().to_rfc3339());
        let ctx = MatchContext { instance_id: "inst-1", reactor_jid: None, timestamp: chrono::Utc::now() };
        assert!(!admits(&db, &r, &ctx).unwrap());
    }
}
