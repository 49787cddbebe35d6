//! Action Executor (spec §4.6, component C6). Dispatches on `action_type`,
//! running the NLP parse for `nlp_action` rules and materializing the
//! resulting entity plus its trigger link. Confirmation messages are
//! best-effort: their failure never rolls back the already-committed entity
//! (spec §4.6 "Confirmation side-effects", §5 ordering guarantee that
//! outbound side-effects happen after commit).

use crate::config::AppConfig;
use crate::db::Db;
use crate::error::{ActionError, StorageError};
use crate::events::{EventBus, FanoutEvent};
use crate::models::{
    ActionRule, Bill, CalendarEvent, CreatedEntityRef, LinkType, Message, Note, Task,
};
use crate::nlp::{self, keywords, LanguageSelector, ParseResult};
use crate::provider::{ConferencingProvider, ProviderClient};
use std::time::Instant;

pub struct ExecutorContext<'a> {
    pub db: &'a Db,
    pub events: &'a EventBus,
    pub provider: &'a ProviderClient,
    pub conferencing: &'a dyn ConferencingProvider,
    pub config: &'a AppConfig,
}

/// What the queue worker records as the queue item's substatus (spec §4.3b,
/// §7): `success`, `no_update` (idempotency short-circuit), `parse_failed`,
/// `no_rules`.
pub struct ExecutionOutcome {
    pub substatus: &'static str,
    pub created_entity_refs: Vec<CreatedEntityRef>,
}

/// Runs one rule against one triggering message (spec §4.6). `reactor_jid`
/// and `trigger_emoji`/`trigger_value` come from the reaction or hashtag
/// that matched the rule in the Rule Engine (C4).
pub async fn execute_rule(
    ctx: &ExecutorContext<'_>,
    rule: &ActionRule,
    trigger_message: &Message,
    reactor_jid: &str,
    trigger_value: &str,
) -> Result<ExecutionOutcome, ActionError> {
    let started = Instant::now();

    let outcome = match rule.action_type.as_str() {
        "create_task" => create_task_action(ctx, rule, trigger_message, reactor_jid, trigger_value).await,
        "create_calendar_event" => {
            create_calendar_action(ctx, rule, trigger_message, reactor_jid, trigger_value).await
        }
        "create_bill" => create_bill_action(ctx, rule, trigger_message, reactor_jid, trigger_value).await,
        "create_note" => create_note_action(ctx, rule, trigger_message, reactor_jid, trigger_value).await,
        "update_task_status" => update_task_status_action(ctx, rule, trigger_message).await,
        "send_message" => send_message_action(ctx, rule, trigger_message, reactor_jid, trigger_value).await,
        other => Err(ActionError::UnknownParser(other.to_string())),
    };

    let (status, error_message, refs) = match &outcome {
        Ok(o) => ("success", None, o.created_entity_refs.clone()),
        Err(ActionError::ParseFailed(msg)) => ("parse_failed", Some(msg.clone()), Vec::new()),
        Err(e) => ("failed", Some(e.to_string()), Vec::new()),
    };
    ctx.db
        .insert_execution_log(
            &rule.rule_id,
            trigger_message.message_id.as_str(),
            status,
            started.elapsed().as_millis() as i64,
            error_message.as_deref(),
            &refs,
        )
        .ok();
    if matches!(outcome, Ok(_)) {
        ctx.db.record_rule_execution(&rule.rule_id).ok();
    }

    outcome
}

fn combined_text(ctx: &ExecutorContext, trigger_message: &Message) -> String {
    let mut text = trigger_message.content.clone();
    if let Some(quoted_id) = &trigger_message.quoted_message_id {
        if let Ok(quoted) = ctx.db.get_message(quoted_id, &trigger_message.instance_id) {
            text = format!("{}\n{}", quoted.content, text);
        }
    }
    text
}

fn parse_with_rule(ctx: &ExecutorContext, rule: &ActionRule, text: &str, parser_type: &str) -> ParseResult {
    let lang = rule
        .config
        .language
        .as_deref()
        .map(LanguageSelector::parse)
        .unwrap_or(LanguageSelector::Auto);
    nlp::parse(text, parser_type, lang, &rule.config)
}

fn parse_failure_template(error: &str) -> String {
    format!("Sorry, I couldn't understand that request: {error}. Please try rephrasing.")
}

async fn send_best_effort(ctx: &ExecutorContext<'_>, instance_id: &str, reactor_jid: &str, text: &str) {
    let Ok(instance) = ctx.db.get_instance(instance_id) else { return };
    if let Err(e) = ctx.provider.send_text(&instance, reactor_jid, text, None).await {
        tracing::warn!(error = %e, "confirmation/help message delivery failed");
    }
}

fn substitute_template(
    template: &str,
    sender: &str,
    content: &str,
    reaction: &str,
    chat: &str,
    date: &str,
    rule_name: &str,
) -> String {
    template
        .replace("{{sender}}", sender)
        .replace("{{content}}", content)
        .replace("{{reaction}}", reaction)
        .replace("{{chat}}", chat)
        .replace("{{date}}", date)
        .replace("{{rule_name}}", rule_name)
}

async fn create_task_action(
    ctx: &ExecutorContext<'_>,
    rule: &ActionRule,
    trigger_message: &Message,
    reactor_jid: &str,
    trigger_value: &str,
) -> Result<ExecutionOutcome, ActionError> {
    if let Some(existing) = ctx
        .db
        .find_task_trigger_link(&trigger_message.message_id, &trigger_message.instance_id)
        .map_err(ActionError::from)?
    {
        return Ok(ExecutionOutcome {
            substatus: "no_update",
            created_entity_refs: vec![CreatedEntityRef { entity_type: "task".to_string(), entity_id: existing.task_id }],
        });
    }

    let text = combined_text(ctx, trigger_message);
    let result = parse_with_rule(ctx, rule, &text, "task");
    if !result.success {
        let error = result.error.clone().unwrap_or_else(|| "no extractable task".to_string());
        send_best_effort(ctx, &trigger_message.instance_id, reactor_jid, &parse_failure_template(&error)).await;
        return Err(ActionError::ParseFailed(error));
    }

    let now = chrono::Utc::now().to_rfc3339();
    let title = result.data["title"].as_str().unwrap_or("Untitled task").to_string();
    let description = result.data["description"].as_str().filter(|d| !d.is_empty())
        .map(|d| d.to_string())
        .unwrap_or_else(|| format!("source=whatsapp_reaction emoji={trigger_value} rule_id={} message_id={}", rule.rule_id, trigger_message.message_id));
    let tags: Vec<String> = result.data["tags"]
        .as_array()
        .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .filter(|t: &Vec<String>| !t.is_empty())
        .unwrap_or_else(|| rule.config.default_tags.clone());
    let assignee = result.data["assignee"].as_str().map(|s| s.to_string());
    let task = Task {
        task_id: uuid::Uuid::new_v4().to_string(),
        instance_id: trigger_message.instance_id.clone(),
        space_id: rule.config.space_id.clone(),
        title: title.clone(),
        description,
        priority: result.data["priority"].as_str().unwrap_or("medium").to_string(),
        due_date: result.data["due_date"].as_str().map(|s| s.to_string()),
        tags,
        assignee,
        status: "open".to_string(),
        created_at: now,
        updated_at: String::new(),
    };
    let stored = ctx.db.insert_task(&task).map_err(ActionError::from)?;

    ctx.db
        .insert_task_link(&trigger_message.message_id, &trigger_message.instance_id, &stored.task_id, LinkType::Trigger)
        .map_err(ActionError::from)?;
    if let Some(quoted_id) = &trigger_message.quoted_message_id {
        ctx.db
            .insert_task_link(quoted_id, &trigger_message.instance_id, &stored.task_id, LinkType::Context)
            .map_err(ActionError::from)?;
    }

    ctx.events.publish(FanoutEvent::task_created(&stored));
    ctx.events.publish(FanoutEvent::rule_executed(&rule.rule_id, serde_json::json!({"action": "create_task", "task_id": stored.task_id})));

    if let Some(template) = &rule.config.confirmation_template {
        let text = substitute_template(template, reactor_jid, &stored.title, trigger_value, &trigger_message.chat_id, stored.due_date.as_deref().unwrap_or(""), &rule.rule_name);
        send_best_effort(ctx, &trigger_message.instance_id, reactor_jid, &text).await;
    }

    Ok(ExecutionOutcome {
        substatus: "success",
        created_entity_refs: vec![CreatedEntityRef { entity_type: "task".to_string(), entity_id: stored.task_id }],
    })
}

async fn create_calendar_action(
    ctx: &ExecutorContext<'_>,
    rule: &ActionRule,
    trigger_message: &Message,
    reactor_jid: &str,
    trigger_value: &str,
) -> Result<ExecutionOutcome, ActionError> {
    if let Some(existing) = ctx
        .db
        .find_event_trigger_link(&trigger_message.message_id, &trigger_message.instance_id)
        .map_err(ActionError::from)?
    {
        return Ok(ExecutionOutcome {
            substatus: "no_update",
            created_entity_refs: vec![CreatedEntityRef { entity_type: "calendar_event".to_string(), entity_id: existing.event_id }],
        });
    }

    let text = combined_text(ctx, trigger_message);
    let result = parse_with_rule(ctx, rule, &text, "calendar");
    if !result.success {
        let error = result.error.clone().unwrap_or_else(|| "no extractable event".to_string());
        send_best_effort(ctx, &trigger_message.instance_id, reactor_jid, &parse_failure_template(&error)).await;
        return Err(ActionError::ParseFailed(error));
    }

    let start_ts = result.data["date_time"].as_str().unwrap_or_default().to_string();
    let duration_minutes = result.data["duration_minutes"].as_i64().unwrap_or(30);
    let end_ts = (chrono::DateTime::parse_from_rfc3339(&start_ts)
        .map(|dt| dt + chrono::Duration::minutes(duration_minutes))
        .map(|dt| dt.to_rfc3339()))
    .unwrap_or_else(|_| start_ts.clone());

    let location = match result.data["location"].as_str() {
        Some(loc) if loc == keywords::VIDEOCALL_SENTINEL => Some(ctx.conferencing.generate_meeting_url(&rule.rule_id)),
        Some(loc) => Some(loc.to_string()),
        None => None,
    };

    let mut attendees: Vec<String> = result.data["attendees"]
        .as_array()
        .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default();
    if !attendees.iter().any(|a| a == reactor_jid) {
        attendees.push(reactor_jid.to_string());
    }
    let recurrence = result.data["recurrence"].as_str().map(|s| s.to_string());

    let event = CalendarEvent {
        event_id: uuid::Uuid::new_v4().to_string(),
        instance_id: trigger_message.instance_id.clone(),
        space_id: rule.config.space_id.clone(),
        title: result.data["title"].as_str().unwrap_or("Untitled event").to_string(),
        start_ts,
        end_ts,
        location,
        attendees,
        recurrence,
        created_at: chrono::Utc::now().to_rfc3339(),
    };
    let stored = ctx.db.insert_calendar_event(&event).map_err(ActionError::from)?;

    ctx.db
        .insert_event_link(&trigger_message.message_id, &trigger_message.instance_id, &stored.event_id, LinkType::Trigger)
        .map_err(ActionError::from)?;

    ctx.events.publish(FanoutEvent::calendar_event_created(&stored));
    ctx.events.publish(FanoutEvent::rule_executed(&rule.rule_id, serde_json::json!({"action": "create_calendar_event", "event_id": stored.event_id})));

    if let Some(template) = &rule.config.confirmation_template {
        let text = substitute_template(template, reactor_jid, &stored.title, trigger_value, &trigger_message.chat_id, &stored.start_ts, &rule.rule_name);
        send_best_effort(ctx, &trigger_message.instance_id, reactor_jid, &text).await;
    }

    Ok(ExecutionOutcome {
        substatus: "success",
        created_entity_refs: vec![CreatedEntityRef { entity_type: "calendar_event".to_string(), entity_id: stored.event_id }],
    })
}

async fn create_bill_action(
    ctx: &ExecutorContext<'_>,
    rule: &ActionRule,
    trigger_message: &Message,
    reactor_jid: &str,
    trigger_value: &str,
) -> Result<ExecutionOutcome, ActionError> {
    if let Some(existing) = ctx
        .db
        .find_bill_trigger_link(&trigger_message.message_id, &trigger_message.instance_id)
        .map_err(ActionError::from)?
    {
        return Ok(ExecutionOutcome {
            substatus: "no_update",
            created_entity_refs: vec![CreatedEntityRef { entity_type: "bill".to_string(), entity_id: existing.bill_id }],
        });
    }

    let text = combined_text(ctx, trigger_message);
    let result = parse_with_rule(ctx, rule, &text, "bill");
    if !result.success {
        let error = result.error.clone().unwrap_or_else(|| "no extractable bill".to_string());
        send_best_effort(ctx, &trigger_message.instance_id, reactor_jid, &parse_failure_template(&error)).await;
        return Err(ActionError::ParseFailed(error));
    }

    let now = chrono::Utc::now().to_rfc3339();
    let mut refs = Vec::new();
    let bill_payloads: Vec<serde_json::Value> = if result.parse_type == "multiple_bills" {
        result.data["bills"].as_array().cloned().unwrap_or_default()
    } else {
        vec![result.data.clone()]
    };

    for payload in &bill_payloads {
        let bill = Bill {
            bill_id: uuid::Uuid::new_v4().to_string(),
            instance_id: trigger_message.instance_id.clone(),
            space_id: rule.config.space_id.clone(),
            vendor: payload["vendor"].as_str().unwrap_or("unknown").to_string(),
            amount: payload["amount"].as_str().unwrap_or("0.00").to_string(),
            currency: payload["currency"]
                .as_str()
                .or(rule.config.default_currency.as_deref())
                .unwrap_or("USD")
                .to_string(),
            due_date: result.data["due_date"].as_str().map(|s| s.to_string()),
            category: payload["category"].as_str().map(|s| s.to_string()),
            is_recurring: rule.config.is_recurring,
            recurrence_type: rule.config.recurrence_type.clone(),
            recurrence_interval: rule.config.recurrence_interval,
            recurrence_end_date: rule.config.recurrence_end_date.clone(),
            next_due_date: None,
            auto_pay_enabled: rule.config.auto_pay_enabled,
            created_at: now.clone(),
        };
        let stored = ctx.db.insert_bill(&bill).map_err(ActionError::from)?;
        ctx.db
            .insert_bill_link(&trigger_message.message_id, &trigger_message.instance_id, &stored.bill_id, LinkType::Trigger)
            .map_err(ActionError::from)?;
        ctx.events.publish(FanoutEvent::bill_created(&stored));
        refs.push(CreatedEntityRef { entity_type: "bill".to_string(), entity_id: stored.bill_id });
    }

    ctx.events.publish(FanoutEvent::rule_executed(&rule.rule_id, serde_json::json!({"action": "create_bill", "count": refs.len()})));

    if let Some(template) = &rule.config.confirmation_template {
        let text = substitute_template(template, reactor_jid, "bill recorded", trigger_value, &trigger_message.chat_id, "", &rule.rule_name);
        send_best_effort(ctx, &trigger_message.instance_id, reactor_jid, &text).await;
    }

    Ok(ExecutionOutcome { substatus: "success", created_entity_refs: refs })
}

async fn create_note_action(
    ctx: &ExecutorContext<'_>,
    rule: &ActionRule,
    trigger_message: &Message,
    reactor_jid: &str,
    trigger_value: &str,
) -> Result<ExecutionOutcome, ActionError> {
    if let Some(existing) = ctx
        .db
        .find_note_trigger_link(&trigger_message.message_id, &trigger_message.instance_id)
        .map_err(ActionError::from)?
    {
        return Ok(ExecutionOutcome {
            substatus: "no_update",
            created_entity_refs: vec![CreatedEntityRef { entity_type: "note".to_string(), entity_id: existing.note_id }],
        });
    }

    let text = combined_text(ctx, trigger_message);
    let result = parse_with_rule(ctx, rule, &text, "note");
    if !result.success {
        let error = result.error.clone().unwrap_or_else(|| "empty note content".to_string());
        send_best_effort(ctx, &trigger_message.instance_id, reactor_jid, &parse_failure_template(&error)).await;
        return Err(ActionError::ParseFailed(error));
    }

    let note = Note {
        note_id: uuid::Uuid::new_v4().to_string(),
        instance_id: trigger_message.instance_id.clone(),
        space_id: rule.config.space_id.clone(),
        title: result.data["title"].as_str().unwrap_or("Untitled note").to_string(),
        content: result.data["content"].as_str().unwrap_or_default().to_string(),
        tags: rule.config.default_tags.clone(),
        created_at: chrono::Utc::now().to_rfc3339(),
    };
    let stored = ctx.db.insert_note(&note).map_err(ActionError::from)?;
    ctx.db
        .insert_note_link(&trigger_message.message_id, &trigger_message.instance_id, &stored.note_id, LinkType::Trigger)
        .map_err(ActionError::from)?;

    ctx.events.publish(FanoutEvent::note_created(&stored));
    ctx.events.publish(FanoutEvent::rule_executed(&rule.rule_id, serde_json::json!({"action": "create_note", "note_id": stored.note_id})));

    if let Some(template) = &rule.config.confirmation_template {
        let text = substitute_template(template, reactor_jid, &stored.title, trigger_value, &trigger_message.chat_id, "", &rule.rule_name);
        send_best_effort(ctx, &trigger_message.instance_id, reactor_jid, &text).await;
    }

    Ok(ExecutionOutcome {
        substatus: "success",
        created_entity_refs: vec![CreatedEntityRef { entity_type: "note".to_string(), entity_id: stored.note_id }],
    })
}

async fn update_task_status_action(
    ctx: &ExecutorContext<'_>,
    rule: &ActionRule,
    trigger_message: &Message,
) -> Result<ExecutionOutcome, ActionError> {
    let link = ctx
        .db
        .find_task_trigger_link(&trigger_message.message_id, &trigger_message.instance_id)
        .map_err(ActionError::from)?
        .ok_or(ActionError::MissingTriggerLink)?;

    let new_status = rule.config.new_status.as_deref().unwrap_or("done");
    let stored = ctx.db.update_task_status(&link.task_id, new_status).map_err(ActionError::from)?;

    ctx.events.publish(FanoutEvent::rule_executed(&rule.rule_id, serde_json::json!({"action": "update_task_status", "task_id": stored.task_id, "status": stored.status})));

    Ok(ExecutionOutcome {
        substatus: "success",
        created_entity_refs: vec![CreatedEntityRef { entity_type: "task".to_string(), entity_id: stored.task_id }],
    })
}

/// `simple_action` rule: send a templated message back to the reactor
/// without any NLP parse or entity creation (spec §3 ActionRule action_type
/// enum includes `send_message`). Unlike the create_* handlers' confirmation
/// text, this send IS the action, so a provider failure fails the rule
/// rather than being swallowed as best-effort.
async fn send_message_action(
    ctx: &ExecutorContext<'_>,
    rule: &ActionRule,
    trigger_message: &Message,
    reactor_jid: &str,
    trigger_value: &str,
) -> Result<ExecutionOutcome, ActionError> {
    let template = rule.config.confirmation_template.as_deref().unwrap_or("{{content}}");
    let text = substitute_template(
        template,
        reactor_jid,
        &trigger_message.content,
        trigger_value,
        &trigger_message.chat_id,
        "",
        &rule.rule_name,
    );
    let instance = ctx.db.get_instance(&trigger_message.instance_id).map_err(ActionError::from)?;
    ctx.provider
        .send_text(&instance, reactor_jid, &text, Some(&trigger_message.message_id))
        .await
        .map_err(|e| ActionError::Provider(e.to_string()))?;

    ctx.events.publish(FanoutEvent::rule_executed(&rule.rule_id, serde_json::json!({"action": "send_message"})));

    Ok(ExecutionOutcome { substatus: "success", created_entity_refs: Vec::new() })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_substitution_leaves_unknown_placeholders_literal() {
        let out = substitute_template("hi {{sender}}, {{unknown}}", "Fer", "", "", "", "", "");
        assert_eq!(out, "hi Fer, {{unknown}}");
    }
}
