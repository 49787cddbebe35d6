//! HTTP surface (spec §6): inbound webhook intake, the real-time SSE
//! channel, and the minimal admin surface (rule CRUD, group sync, dead-letter
//! reprocess, health). Route handler bodies stay thin — dependency
//! materialization lives in `webhook`, rule matching in `rule_engine`,
//! entity creation in `executor`; this module only wires HTTP in and out.

use crate::config::AppConfig;
use crate::db::Db;
use crate::error::ApiError;
use crate::events::{EventBus, FanoutEvent};
use crate::models::{ActionRule, QueuePriority, RuleConditions, RuleConfig};
use crate::nlp;
use crate::provider::ProviderClient;
use crate::rule_engine::RuleCache;
use crate::webhook::{self, InboundEnvelope};
use hmac::{Hmac, Mac};
use rocket::data::{Data, ToByteUnit};
use rocket::http::Status;
use rocket::request::{FromRequest, Outcome, Request};
use rocket::response::stream::{Event, EventStream};
use rocket::serde::json::Json;
use rocket::{delete, get, post, put, State};
use serde::Deserialize;
use sha2::Sha256;
use std::sync::Arc;

type HmacSha256 = Hmac<Sha256>;

// --- Raw body capture (HMAC must be verified over the exact bytes received,
// before any JSON parsing consumes them) ---

pub struct RawBody(pub Vec<u8>);

#[rocket::async_trait]
impl<'r> rocket::data::FromData<'r> for RawBody {
    type Error = std::io::Error;

    async fn from_data(req: &'r Request<'_>, data: Data<'r>) -> rocket::data::Outcome<'r, Self> {
        let limit = req.limits().get("json").unwrap_or_else(|| 2.mebibytes());
        match data.open(limit).into_bytes().await {
            Ok(bytes) if bytes.is_complete() => {
                rocket::data::Outcome::Success(RawBody(bytes.into_inner()))
            }
            Ok(_) => rocket::data::Outcome::Error((
                Status::PayloadTooLarge,
                std::io::Error::new(std::io::ErrorKind::Other, "payload too large"),
            )),
            Err(e) => rocket::data::Outcome::Error((Status::InternalServerError, e)),
        }
    }
}

pub struct SignatureHeader(pub Option<String>);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for SignatureHeader {
    type Error = ();

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        Outcome::Success(SignatureHeader(req.headers().get_one("X-Signature").map(|s| s.to_string())))
    }
}

/// HMAC-SHA256 over the raw body (spec §6 "Signature header ... MUST be
/// validated; a mismatch returns 401"), mirroring the teacher's outbound
/// `X-Chat-Signature: sha256=<hex>` convention for inbound verification. No
/// secret configured means verification is skipped (dev mode).
fn verify_signature(secret: Option<&str>, body: &[u8], provided: Option<&str>) -> bool {
    let Some(secret) = secret else { return true };
    let Some(provided) = provided else { return false };
    let Some(hex_sig) = provided.strip_prefix("sha256=") else { return false };
    let Ok(expected) = hex::decode(hex_sig) else { return false };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else { return false };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

#[post("/webhook/<instance_name>", data = "<body>")]
pub fn webhook_receive(
    db: &State<Db>,
    events: &State<Arc<EventBus>>,
    config: &State<AppConfig>,
    instance_name: &str,
    sig: SignatureHeader,
    body: RawBody,
) -> Status {
    handle_webhook(db, events, config, instance_name, None, sig.0.as_deref(), &body.0)
}

#[post("/webhook/<instance_name>/<event_type>", data = "<body>")]
pub fn webhook_receive_typed(
    db: &State<Db>,
    events: &State<Arc<EventBus>>,
    config: &State<AppConfig>,
    instance_name: &str,
    event_type: &str,
    sig: SignatureHeader,
    body: RawBody,
) -> Status {
    handle_webhook(db, events, config, instance_name, Some(event_type), sig.0.as_deref(), &body.0)
}

/// Common path for both webhook routes (spec §6 "MUST be validated", "still
/// returns 200 to prevent upstream retry storms"). Internal failures always
/// persist to the recovery bucket and still answer 200; only a signature
/// mismatch earns a 401.
fn handle_webhook(
    db: &Db,
    events: &EventBus,
    config: &AppConfig,
    instance_name: &str,
    path_event_type: Option<&str>,
    sig: Option<&str>,
    raw: &[u8],
) -> Status {
    if !verify_signature(config.webhook_secret.as_deref(), raw, sig) {
        return Status::Unauthorized;
    }

    let mut value: serde_json::Value = match serde_json::from_slice(raw) {
        Ok(v) => v,
        Err(e) => {
            db.insert_failed_event(
                Some(instance_name),
                &serde_json::json!({"raw_len": raw.len()}),
                &format!("invalid json body: {e}"),
            )
            .ok();
            return Status::Ok;
        }
    };
    if value.get("event").is_none() {
        if let Some(event_type) = path_event_type {
            value["event"] = serde_json::Value::String(event_type.to_string());
        }
    }
    if value.get("instance").is_none() {
        value["instance"] = serde_json::Value::String(instance_name.to_string());
    }

    let envelope: InboundEnvelope = match serde_json::from_value(value.clone()) {
        Ok(e) => e,
        Err(e) => {
            db.insert_failed_event(Some(instance_name), &value, &format!("malformed envelope: {e}")).ok();
            return Status::Ok;
        }
    };

    match webhook::process_incoming_event(db, &envelope) {
        Ok(outcome) => {
            for msg in &outcome.stored_messages {
                events.publish(FanoutEvent::NewMessage(msg.clone()));
                if !nlp::extract_hashtags(&msg.content).is_empty() {
                    let idem = format!("message:{}:{}", msg.instance_id, msg.message_id);
                    db.enqueue_action(
                        "message",
                        &serde_json::json!({"message_id": msg.message_id, "instance_id": msg.instance_id}),
                        QueuePriority::Normal,
                        &idem,
                    )
                    .ok();
                }
            }
            for reaction in &outcome.stored_reactions {
                events.publish(FanoutEvent::NewReaction(reaction.clone()));
                if !reaction.is_removal() {
                    let idem =
                        format!("reaction:{}:{}:{}", reaction.instance_id, reaction.message_id, reaction.reactor_jid);
                    let priority = webhook::derive_reaction_priority(&reaction.reaction_emoji);
                    db.enqueue_action(
                        "reaction",
                        &serde_json::json!({
                            "message_id": reaction.message_id,
                            "instance_id": reaction.instance_id,
                            "reactor_jid": reaction.reactor_jid,
                            "reaction_emoji": reaction.reaction_emoji,
                        }),
                        priority,
                        &idem,
                    )
                    .ok();
                }
            }
        }
        Err(e) => {
            db.insert_failed_event(Some(instance_name), &value, &e.to_string()).ok();
        }
    }

    Status::Ok
}

// --- Real-time fan-out (spec §4.7) ---

#[get("/events")]
pub fn events_stream(events: &State<Arc<EventBus>>) -> EventStream![] {
    let (_id, mut rx) = events.subscribe();
    EventStream! {
        yield Event::json(&serde_json::json!({"type": "connected"}));

        let mut heartbeat = tokio::time::interval(std::time::Duration::from_secs(15));
        loop {
            tokio::select! {
                msg = rx.recv() => {
                    match msg {
                        Ok(event) => yield Event::json(&event),
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {}
                    }
                }
                _ = heartbeat.tick() => {
                    yield Event::json(&serde_json::json!({"type": "heartbeat"}));
                }
            }
        }
    }
}

// --- Rules admin (spec §6 "minimal surface") ---

#[derive(Debug, Deserialize)]
pub struct RuleInput {
    pub rule_name: String,
    pub rule_type: String,
    pub trigger_type: String,
    pub trigger_value: String,
    pub action_type: String,
    #[serde(default)]
    pub config: RuleConfig,
    #[serde(default)]
    pub conditions: RuleConditions,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default)]
    pub cooldown_minutes: i64,
    #[serde(default = "default_max_per_day")]
    pub max_executions_per_day: i64,
}

fn default_active() -> bool {
    true
}

fn default_max_per_day() -> i64 {
    1_000_000
}

#[get("/rules")]
pub fn list_rules(db: &State<Db>) -> Result<Json<Vec<ActionRule>>, ApiError> {
    Ok(Json(db.list_rules()?))
}

#[post("/rules", format = "json", data = "<body>")]
pub fn create_rule(
    db: &State<Db>,
    cache: &State<Arc<RuleCache>>,
    body: Json<RuleInput>,
) -> Result<Json<ActionRule>, ApiError> {
    let rule = ActionRule {
        rule_id: uuid::Uuid::new_v4().to_string(),
        rule_name: body.rule_name.clone(),
        rule_type: body.rule_type.clone(),
        trigger_type: body.trigger_type.clone(),
        trigger_value: body.trigger_value.clone(),
        action_type: body.action_type.clone(),
        config: body.config.clone(),
        conditions: body.conditions.clone(),
        active: body.active,
        cooldown_minutes: body.cooldown_minutes,
        max_executions_per_day: body.max_executions_per_day,
        total_executions: 0,
        last_executed_at: None,
    };
    let stored = db.create_rule(&rule)?;
    cache.invalidate_all();
    Ok(Json(stored))
}

#[put("/rules/<rule_id>", format = "json", data = "<body>")]
pub fn update_rule(
    db: &State<Db>,
    cache: &State<Arc<RuleCache>>,
    rule_id: &str,
    body: Json<RuleInput>,
) -> Result<Json<ActionRule>, ApiError> {
    let existing = db.get_rule(rule_id)?;
    let rule = ActionRule {
        rule_id: rule_id.to_string(),
        rule_name: body.rule_name.clone(),
        rule_type: body.rule_type.clone(),
        trigger_type: body.trigger_type.clone(),
        trigger_value: body.trigger_value.clone(),
        action_type: body.action_type.clone(),
        config: body.config.clone(),
        conditions: body.conditions.clone(),
        active: body.active,
        cooldown_minutes: body.cooldown_minutes,
        max_executions_per_day: body.max_executions_per_day,
        total_executions: existing.total_executions,
        last_executed_at: existing.last_executed_at,
    };
    let stored = db.update_rule(&rule)?;
    cache.invalidate_all();
    Ok(Json(stored))
}

#[delete("/rules/<rule_id>")]
pub fn delete_rule(db: &State<Db>, cache: &State<Arc<RuleCache>>, rule_id: &str) -> Result<Status, ApiError> {
    db.soft_delete_rule(rule_id)?;
    cache.invalidate_all();
    Ok(Status::NoContent)
}

// --- Group sync (spec §6 "one-shot group-subject reconciliation") ---

#[post("/admin/sync-groups/<instance>")]
pub async fn sync_groups(
    db: &State<Db>,
    provider: &State<ProviderClient>,
    instance: &str,
) -> Result<Json<serde_json::Value>, ApiError> {
    let inst = db.get_instance(instance)?;
    let groups = provider
        .fetch_groups(&inst)
        .await
        .map_err(|e| ApiError::new(Status::BadGateway, e.to_string()))?;

    let mut synced = 0;
    let mut failed = 0;
    for item in &groups {
        match webhook::process_group_item(db, instance, item) {
            Ok(_) => synced += 1,
            Err(_) => failed += 1,
        }
    }
    Ok(Json(serde_json::json!({"synced": synced, "failed": failed})))
}

// --- Dead-letter reprocess (spec §4.8) ---

#[derive(Debug, Deserialize, Default)]
pub struct ReprocessFilter {
    pub entity_type: Option<String>,
    pub since: Option<String>,
}

#[post("/admin/reprocess", format = "json", data = "<body>")]
pub fn reprocess(db: &State<Db>, body: Json<ReprocessFilter>) -> Result<Json<serde_json::Value>, ApiError> {
    let requeued = db.reprocess_failed_queue_items(body.entity_type.as_deref(), body.since.as_deref())?;
    Ok(Json(serde_json::json!({"requeued": requeued})))
}

// --- Health (spec §6 "queue depth, processing rate, error rate") ---

#[get("/health")]
pub fn health(db: &State<Db>) -> Json<serde_json::Value> {
    let queue_depth: std::collections::HashMap<String, i64> =
        db.queue_depth_by_status().unwrap_or_default().into_iter().collect();
    let recent_error_rate = db.recent_error_rate(100).unwrap_or(0.0);
    Json(serde_json::json!({
        "status": "ok",
        "queue_depth": queue_depth,
        "recent_error_rate": recent_error_rate,
    }))
}

#[rocket::catch(404)]
pub fn not_found() -> Json<serde_json::Value> {
    Json(serde_json::json!({"error": "not found"}))
}

#[rocket::catch(500)]
pub fn internal_error() -> Json<serde_json::Value> {
    Json(serde_json::json!({"error": "internal server error"}))
}
