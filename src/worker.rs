//! Queue worker pool (spec §5, §7): `config.worker_count` tasks independently
//! poll `lease_queue_batch`, resolve the triggering rule(s) via the Rule
//! Engine (C4), and hand matches to the Action Executor (C6). Each worker
//! opens its own `Db` connection onto the same SQLite file rather than
//! sharing the HTTP-facing one — the teacher's background tasks do the same
//! (`webhooks::spawn_dispatcher`, `retention::spawn_retention_task` both take
//! a `db_path` and open their own connection) and SQLite's WAL mode makes
//! that safe without a shared connection pool.

use crate::config::AppConfig;
use crate::db::Db;
use crate::events::EventBus;
use crate::executor::{execute_rule, ExecutorContext};
use crate::models::{ActionQueueItem, TriggerType};
use crate::nlp;
use crate::provider::{ConferencingProvider, ProviderClient};
use crate::rule_engine::{find_matching_rules, MatchContext, RuleCache};
use std::sync::Arc;

const QUEUE_BATCH_SIZE: i64 = 20;

/// Spawns the worker pool as detached tokio tasks (spec §5 "webhook intake /
/// queue workers / recovery sweepers" — this is the queue-worker pool).
/// Returns immediately; workers run until the process exits.
pub fn spawn_workers(
    db_path: String,
    config: AppConfig,
    cache: Arc<RuleCache>,
    events: Arc<EventBus>,
    provider: ProviderClient,
    conferencing: Arc<dyn ConferencingProvider>,
) {
    for worker_id in 0..config.worker_count.max(1) {
        let db_path = db_path.clone();
        let config = config.clone();
        let cache = cache.clone();
        let events = events.clone();
        let provider = provider.clone();
        let conferencing = conferencing.clone();
        tokio::spawn(async move {
            run_worker(worker_id, db_path, config, cache, events, provider, conferencing).await;
        });
    }
}

async fn run_worker(
    worker_id: usize,
    db_path: String,
    config: AppConfig,
    cache: Arc<RuleCache>,
    events: Arc<EventBus>,
    provider: ProviderClient,
    conferencing: Arc<dyn ConferencingProvider>,
) {
    let db = Db::new(&db_path);
    tracing::info!(worker_id, "queue worker started");
    let mut ticker = tokio::time::interval(config.poll_interval);

    loop {
        ticker.tick().await;
        let batch = match db.lease_queue_batch(QUEUE_BATCH_SIZE) {
            Ok(batch) => batch,
            Err(e) => {
                tracing::warn!(worker_id, error = %e, "failed to lease queue batch");
                continue;
            }
        };
        for leased in batch {
            let ctx = ExecutorContext {
                db: &db,
                events: &events,
                provider: &provider,
                conferencing: conferencing.as_ref(),
                config: &config,
            };
            process_item(&ctx, &cache, leased.item).await;
        }
    }
}

/// Resolves the matching rule(s) for one leased item and runs the executor,
/// then records the outcome back onto the queue row (spec §4.3b, §7).
async fn process_item(ctx: &ExecutorContext<'_>, cache: &RuleCache, item: ActionQueueItem) {
    let now = chrono::Utc::now();
    let result: Result<&'static str, String> = match item.event_type.as_str() {
        "reaction" => process_reaction_item(ctx, cache, &item, now).await,
        "message" => process_message_item(ctx, cache, &item, now).await,
        // Nothing currently enqueues `entity_change` action items — the
        // change-capture append itself (spec §4.3a) already happened in the
        // same transaction as the write. Reserved for a future rule type
        // that triggers off raw entity changes rather than reaction/hashtag.
        "entity_change" => Ok("no_update"),
        other => Err(format!("unknown queue event_type: {other}")),
    };

    match result {
        Ok(substatus) => {
            ctx.db.complete_queue_item(&item.queue_id, Some(substatus)).ok();
        }
        Err(error) => {
            match ctx.db.fail_queue_item(&item.queue_id, &error, ctx.config.retry_backoff_cap) {
                Ok(_) => {}
                Err(e) => tracing::error!(queue_id = %item.queue_id, error = %e, "failed to record queue failure"),
            }
        }
    }
}

async fn process_reaction_item(
    ctx: &ExecutorContext<'_>,
    cache: &RuleCache,
    item: &ActionQueueItem,
    now: chrono::DateTime<chrono::Utc>,
) -> Result<&'static str, String> {
    let message_id = item.event_data["message_id"].as_str().ok_or("reaction item missing message_id")?;
    let instance_id = item.event_data["instance_id"].as_str().ok_or("reaction item missing instance_id")?;
    let reactor_jid = item.event_data["reactor_jid"].as_str().ok_or("reaction item missing reactor_jid")?;
    let reaction_emoji = item.event_data["reaction_emoji"].as_str().ok_or("reaction item missing reaction_emoji")?;

    let trigger_message = ctx.db.get_message(message_id, instance_id).map_err(|e| e.to_string())?;

    let match_ctx = MatchContext { instance_id, reactor_jid: Some(reactor_jid), timestamp: now };
    let matched = find_matching_rules(ctx.db, cache, TriggerType::Reaction, reaction_emoji, &match_ctx)
        .map_err(|e| e.to_string())?;

    let Some(rule) = matched.into_iter().next() else {
        return Ok("no_rules");
    };

    match execute_rule(ctx, &rule, &trigger_message, reactor_jid, reaction_emoji).await {
        Ok(outcome) => Ok(outcome.substatus),
        Err(e) => {
            tracing::warn!(rule_id = %rule.rule_id, error = %e, "rule execution failed");
            Ok("parse_failed")
        }
    }
}

/// Hashtag triggers (spec §4.3b "optionally inbound messages"). Every
/// hashtag in the message is matched independently; `scan_all_messages`
/// restricts a rule to the instance owner's own messages unless the rule
/// opts into scanning everyone's (spec §9 open question, resolved as a
/// per-rule flag — see `RuleConditions::scan_all_messages`).
async fn process_message_item(
    ctx: &ExecutorContext<'_>,
    cache: &RuleCache,
    item: &ActionQueueItem,
    now: chrono::DateTime<chrono::Utc>,
) -> Result<&'static str, String> {
    let message_id = item.event_data["message_id"].as_str().ok_or("message item missing message_id")?;
    let instance_id = item.event_data["instance_id"].as_str().ok_or("message item missing instance_id")?;

    let trigger_message = ctx.db.get_message(message_id, instance_id).map_err(|e| e.to_string())?;
    let hashtags = nlp::extract_hashtags(&trigger_message.content);
    if hashtags.is_empty() {
        return Ok("no_rules");
    }

    let match_ctx = MatchContext {
        instance_id,
        reactor_jid: Some(&trigger_message.sender_jid),
        timestamp: now,
    };

    let mut any_matched = false;
    let mut any_success = false;
    for tag in &hashtags {
        let matched = find_matching_rules(ctx.db, cache, TriggerType::Hashtag, tag, &match_ctx)
            .map_err(|e| e.to_string())?;
        for rule in matched {
            if !rule.conditions.scan_all_messages && !trigger_message.from_me {
                continue;
            }
            any_matched = true;
            match execute_rule(ctx, &rule, &trigger_message, &trigger_message.sender_jid, tag).await {
                Ok(_) => any_success = true,
                Err(e) => tracing::warn!(rule_id = %rule.rule_id, error = %e, "hashtag rule execution failed"),
            }
        }
    }

    if !any_matched {
        Ok("no_rules")
    } else if any_success {
        Ok("success")
    } else {
        Ok("parse_failed")
    }
}
