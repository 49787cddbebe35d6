//! Webhook Adapter (spec §4.2, component C2). Single entry point
//! `process_incoming_event` parses a raw provider payload, normalizes IDs
//! and timestamps, materializes dependency rows in order, and routes
//! reactions vs. regular messages — then (for reactions) enqueues the
//! follow-on action queue item, closing the loop into Change Capture (C3).

pub mod normalize;
pub mod payload;

use crate::db::Db;
use crate::error::WebhookError;
use crate::models::{
    CallLogRow, CallOutcome, Chat, ChatType, Contact, Group, GroupParticipant, Message,
    MessageReaction, ParticipantAction, QueuePriority,
};
use normalize::{extract_reactor_jid, is_canonical_jid, is_from_me, normalize_timestamp, push_name_or_synthetic};
use serde::Deserialize;
use serde_json::Value;

/// The inbound event envelope (spec §6). `sender`/`destination`/`server_url`/
/// `apikey` are accepted but unused by the core beyond forensic storage —
/// auth/workspace concerns live with the external collaborator (spec §1).
#[derive(Debug, Deserialize)]
pub struct InboundEnvelope {
    pub event: String,
    pub instance: String,
    pub data: Value,
    #[serde(default)]
    pub destination: Option<String>,
    #[serde(default)]
    pub date_time: Option<String>,
    #[serde(default)]
    pub sender: Option<String>,
    #[serde(default)]
    pub server_url: Option<String>,
    #[serde(default)]
    pub apikey: Option<String>,
}

/// Recognized event types, both dot- and dash-separated spellings accepted
/// (spec §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    MessagesUpsert,
    MessagesUpdate,
    MessagesDelete,
    ContactsUpsert,
    ContactsUpdate,
    ChatsUpsert,
    ChatsUpdate,
    GroupsUpsert,
    GroupsUpdate,
    GroupParticipantsUpdate,
    Call,
    ConnectionUpdate,
}

impl EventKind {
    pub fn parse(raw: &str) -> Option<Self> {
        let norm = raw.replace('-', ".").to_ascii_lowercase();
        Some(match norm.as_str() {
            "messages.upsert" => EventKind::MessagesUpsert,
            "messages.update" => EventKind::MessagesUpdate,
            "messages.delete" => EventKind::MessagesDelete,
            "contacts.upsert" => EventKind::ContactsUpsert,
            "contacts.update" => EventKind::ContactsUpdate,
            "chats.upsert" => EventKind::ChatsUpsert,
            "chats.update" => EventKind::ChatsUpdate,
            "groups.upsert" => EventKind::GroupsUpsert,
            "groups.update" => EventKind::GroupsUpdate,
            "group.participants.update" => EventKind::GroupParticipantsUpdate,
            "call" => EventKind::Call,
            "connection.update" => EventKind::ConnectionUpdate,
            _ => return None,
        })
    }
}

/// Outcome of processing one envelope, used by the HTTP route to decide
/// whether to also notify the real-time fan-out / queue a reaction action.
pub struct ProcessOutcome {
    pub stored_messages: Vec<Message>,
    pub stored_reactions: Vec<MessageReaction>,
    pub queued_reaction_action: bool,
}

impl Default for ProcessOutcome {
    fn default() -> Self {
        Self { stored_messages: Vec::new(), stored_reactions: Vec::new(), queued_reaction_action: false }
    }
}

/// Dispatches on event type (spec §4.2). Validation/unresolvable-id failures
/// are surfaced as `WebhookError` so the HTTP route can persist them to the
/// recovery bucket while still answering 200 (spec §6, §7).
pub fn process_incoming_event(db: &Db, envelope: &InboundEnvelope) -> Result<ProcessOutcome, WebhookError> {
    let instance_id = &envelope.instance;
    let kind = EventKind::parse(&envelope.event)
        .ok_or_else(|| WebhookError::UnknownEventType(envelope.event.clone()))?;

    let mut outcome = ProcessOutcome::default();

    match kind {
        EventKind::MessagesUpsert | EventKind::MessagesUpdate => {
            for item in data_items(&envelope.data) {
                process_message_item(db, instance_id, item, envelope.sender.as_deref(), &mut outcome)?;
            }
        }
        EventKind::MessagesDelete => {
            for item in data_items(&envelope.data) {
                if let Some(id) = item.get("key").and_then(|k| k.get("id")).and_then(|v| v.as_str()) {
                    db.mark_message_revoked(id, instance_id).map_err(WebhookError::from)?;
                }
            }
        }
        EventKind::ContactsUpsert | EventKind::ContactsUpdate => {
            for item in data_items(&envelope.data) {
                upsert_contact_from_payload(db, instance_id, item)?;
            }
        }
        EventKind::ChatsUpsert | EventKind::ChatsUpdate => {
            for item in data_items(&envelope.data) {
                process_chat_item(db, instance_id, item)?;
            }
        }
        EventKind::GroupsUpsert | EventKind::GroupsUpdate => {
            for item in data_items(&envelope.data) {
                process_group_item(db, instance_id, item)?;
            }
        }
        EventKind::GroupParticipantsUpdate => {
            process_participants_item(db, instance_id, &envelope.data)?;
        }
        EventKind::Call => {
            for item in data_items(&envelope.data) {
                process_call_item(db, instance_id, item)?;
            }
        }
        EventKind::ConnectionUpdate => {
            if let Some(state) = envelope.data.get("state").and_then(|v| v.as_str()) {
                db.update_connection_state(instance_id, state).map_err(WebhookError::from)?;
            }
        }
    }

    Ok(outcome)
}

/// The provider sends either a single object or an array under `data`;
/// normalize to a slice either way.
fn data_items(data: &Value) -> Vec<&Value> {
    match data {
        Value::Array(items) => items.iter().collect(),
        Value::Null => Vec::new(),
        other => vec![other],
    }
}

fn upsert_contact_from_payload(db: &Db, instance_id: &str, item: &Value) -> Result<Contact, WebhookError> {
    let jid = item
        .get("id")
        .or_else(|| item.get("jid"))
        .and_then(|v| v.as_str())
        .ok_or_else(|| WebhookError::Malformed("contact payload missing id/jid".into()))?;
    if !is_canonical_jid(jid) {
        return Err(WebhookError::UnresolvableId(jid.to_string()));
    }
    let now = chrono::Utc::now().to_rfc3339();
    let contact = Contact {
        jid: jid.to_string(),
        instance_id: instance_id.to_string(),
        push_name: item.get("pushName").and_then(|v| v.as_str()).map(|s| s.to_string()),
        verified_name: item.get("verifiedName").and_then(|v| v.as_str()).map(|s| s.to_string()),
        profile_picture_url: item.get("profilePicUrl").and_then(|v| v.as_str()).map(|s| s.to_string()),
        is_business: item.get("isBusiness").and_then(|v| v.as_bool()).unwrap_or(false),
        is_me: item.get("isMe").and_then(|v| v.as_bool()).unwrap_or(false),
        is_blocked: item.get("isBlocked").and_then(|v| v.as_bool()).unwrap_or(false),
        first_seen_at: now.clone(),
        last_updated_at: now,
    };
    db.upsert_contact(&contact).map_err(WebhookError::from)
}

fn process_chat_item(db: &Db, instance_id: &str, item: &Value) -> Result<Chat, WebhookError> {
    let chat_id = item
        .get("id")
        .or_else(|| item.get("remoteJid"))
        .and_then(|v| v.as_str())
        .ok_or_else(|| WebhookError::Malformed("chat payload missing id".into()))?;
    if !is_canonical_jid(chat_id) {
        return Err(WebhookError::UnresolvableId(chat_id.to_string()));
    }

    ensure_contact_placeholder(db, instance_id, chat_id)?;
    let chat_type = ChatType::from_jid(chat_id);
    if chat_type == ChatType::Group {
        db.create_group_placeholder_if_needed(chat_id, instance_id).map_err(WebhookError::from)?;
    }

    let chat = Chat {
        chat_id: chat_id.to_string(),
        instance_id: instance_id.to_string(),
        chat_type: chat_type.as_str().to_string(),
        unread_count: item.get("unreadCount").and_then(|v| v.as_i64()).unwrap_or(0),
        archived: item.get("archived").and_then(|v| v.as_bool()).unwrap_or(false),
        pinned: item.get("pinned").and_then(|v| v.as_bool()).unwrap_or(false),
        muted: item.get("muted").and_then(|v| v.as_bool()).unwrap_or(false),
        mute_end_ts: item.get("muteEndTime").map(|v| normalize_timestamp(Some(v))),
        last_message_ts: item.get("lastMessageTimestamp").map(|v| normalize_timestamp(Some(v))),
    };
    db.upsert_chat(&chat).map_err(WebhookError::from)
}

pub(crate) fn process_group_item(db: &Db, instance_id: &str, item: &Value) -> Result<Group, WebhookError> {
    let group_jid = item
        .get("id")
        .and_then(|v| v.as_str())
        .ok_or_else(|| WebhookError::Malformed("group payload missing id".into()))?;
    if !is_canonical_jid(group_jid) {
        return Err(WebhookError::UnresolvableId(group_jid.to_string()));
    }
    let group = Group {
        group_jid: group_jid.to_string(),
        instance_id: instance_id.to_string(),
        subject: item.get("subject").and_then(|v| v.as_str()).map(|s| s.to_string()),
        owner_jid: item.get("owner").and_then(|v| v.as_str()).map(|s| s.to_string()),
        description: item.get("desc").and_then(|v| v.as_str()).map(|s| s.to_string()),
        creation_ts: item.get("creation").map(|v| normalize_timestamp(Some(v))),
        is_locked: item.get("announce").and_then(|v| v.as_bool()).unwrap_or(false),
    };
    db.upsert_group(&group).map_err(WebhookError::from)
}

fn process_participants_item(db: &Db, instance_id: &str, data: &Value) -> Result<(), WebhookError> {
    let group_jid = data
        .get("id")
        .and_then(|v| v.as_str())
        .ok_or_else(|| WebhookError::Malformed("participants payload missing group id".into()))?;
    let action = data.get("action").and_then(|v| v.as_str()).unwrap_or("add");
    let action = match action {
        "add" => ParticipantAction::Add,
        "remove" => ParticipantAction::Remove,
        "promote" => ParticipantAction::Promote,
        "demote" => ParticipantAction::Demote,
        other => return Err(WebhookError::Malformed(format!("unknown participant action {other}"))),
    };
    let participants = data
        .get("participants")
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default();
    for p in participants {
        if let Some(jid) = p.as_str() {
            db.apply_participant_action(group_jid, jid, instance_id, action).map_err(WebhookError::from)?;
        }
    }
    Ok(())
}

fn process_call_item(db: &Db, instance_id: &str, item: &Value) -> Result<CallLogRow, WebhookError> {
    let from_jid = item
        .get("from")
        .and_then(|v| v.as_str())
        .ok_or_else(|| WebhookError::Malformed("call payload missing from".into()))?;
    if !is_canonical_jid(from_jid) {
        return Err(WebhookError::UnresolvableId(from_jid.to_string()));
    }
    let call_log_id = item
        .get("id")
        .or_else(|| item.get("callId"))
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let outcome = match item.get("status").and_then(|v| v.as_str()) {
        Some("accept") | Some("answered") => CallOutcome::Answered,
        Some("decline") | Some("declined") | Some("reject") => CallOutcome::Declined,
        _ => CallOutcome::Missed,
    };
    let call = CallLogRow {
        call_log_id,
        instance_id: instance_id.to_string(),
        chat_id: from_jid.to_string(),
        from_jid: from_jid.to_string(),
        from_me: item.get("fromMe").and_then(|v| v.as_bool()).unwrap_or(false),
        start_ts: normalize_timestamp(item.get("date")),
        is_video: item.get("isVideo").and_then(|v| v.as_bool()).unwrap_or(false),
        duration_seconds: item.get("duration").and_then(|v| v.as_i64()).unwrap_or(0),
        outcome: outcome.as_str().to_string(),
    };
    db.upsert_call_log(&call).map_err(WebhookError::from)
}

/// Ensures a Contact row exists for an id that is only known as a chat/group
/// endpoint (not necessarily a message sender) — used by chat/group
/// materialization so the FK to `contacts` holds (spec §3 Chat invariant).
fn ensure_contact_placeholder(db: &Db, instance_id: &str, jid: &str) -> Result<(), WebhookError> {
    if db.contact_exists(jid, instance_id) {
        return Ok(());
    }
    let now = chrono::Utc::now().to_rfc3339();
    db.upsert_contact(&Contact {
        jid: jid.to_string(),
        instance_id: instance_id.to_string(),
        push_name: Some(push_name_or_synthetic(None, jid)),
        verified_name: None,
        profile_picture_url: None,
        is_business: false,
        is_me: false,
        is_blocked: false,
        first_seen_at: now.clone(),
        last_updated_at: now,
    })
    .map_err(WebhookError::from)?;
    Ok(())
}

/// Dependency materialization (spec §4.2, critical path): contact(sender),
/// contact(chat), chat row, group placeholder — strictly in that order,
/// before the message itself is upserted. Then routes to reaction handling
/// if a `reactionMessage` container is present.
fn process_message_item(
    db: &Db,
    instance_id: &str,
    item: &Value,
    envelope_sender: Option<&str>,
    outcome: &mut ProcessOutcome,
) -> Result<(), WebhookError> {
    let parsed = payload::parse_message_item(item);

    let chat_id = parsed
        .remote_jid
        .clone()
        .ok_or_else(|| WebhookError::Malformed("message payload missing key.remoteJid".into()))?;
    if !is_canonical_jid(&chat_id) {
        return Err(WebhookError::UnresolvableId(chat_id));
    }

    let is_group = chat_id.ends_with(normalize::GROUP_SUFFIX);
    let sender_jid = if parsed.from_me {
        db.get_instance(instance_id).ok().and_then(|i| i.owner_jid).unwrap_or_else(|| chat_id.clone())
    } else if is_group {
        parsed.participant.clone().unwrap_or_else(|| chat_id.clone())
    } else {
        chat_id.clone()
    };
    if !is_canonical_jid(&sender_jid) {
        return Err(WebhookError::UnresolvableId(sender_jid));
    }

    // 1. contact(sender)
    let now = chrono::Utc::now().to_rfc3339();
    db.upsert_contact(&Contact {
        jid: sender_jid.clone(),
        instance_id: instance_id.to_string(),
        push_name: Some(push_name_or_synthetic(parsed.push_name.as_deref(), &sender_jid)),
        verified_name: None,
        profile_picture_url: None,
        is_business: false,
        is_me: parsed.from_me,
        is_blocked: false,
        first_seen_at: now.clone(),
        last_updated_at: now.clone(),
    })
    .map_err(WebhookError::from)?;

    // 2. contact(chat) — for groups this differs from the sender.
    if chat_id != sender_jid {
        ensure_contact_placeholder(db, instance_id, &chat_id)?;
    }

    // 3. chat row
    db.upsert_chat(&Chat {
        chat_id: chat_id.clone(),
        instance_id: instance_id.to_string(),
        chat_type: ChatType::from_jid(&chat_id).as_str().to_string(),
        unread_count: 0,
        archived: false,
        pinned: false,
        muted: false,
        mute_end_ts: None,
        last_message_ts: Some(normalize_timestamp(parsed.timestamp_raw.as_ref())),
    })
    .map_err(WebhookError::from)?;

    // 4. group placeholder
    if is_group {
        db.create_group_placeholder_if_needed(&chat_id, instance_id).map_err(WebhookError::from)?;
    }

    if let Some(reaction) = &parsed.reaction {
        let reactor_jid = extract_reactor_jid(
            parsed.participant.as_deref(),
            envelope_sender,
            parsed.remote_jid.as_deref(),
        )
        .unwrap_or(&sender_jid)
        .to_string();
        let target_message_id = reaction
            .target_message_id
            .clone()
            .ok_or_else(|| WebhookError::Malformed("reaction missing target message id".into()))?;

        let stored = db
            .upsert_reaction(&MessageReaction {
                message_id: target_message_id,
                instance_id: instance_id.to_string(),
                reactor_jid,
                reaction_emoji: reaction.text.clone(),
                from_me: parsed.from_me,
                timestamp: normalize_timestamp(parsed.timestamp_raw.as_ref()),
            })
            .map_err(WebhookError::from)?;
        outcome.queued_reaction_action = !stored.is_removal();
        outcome.stored_reactions.push(stored);
        return Ok(());
    }

    let message_id = parsed
        .message_id
        .ok_or_else(|| WebhookError::Malformed("message payload missing key.id".into()))?;
    let stored = db
        .upsert_message(&Message {
            message_id,
            instance_id: instance_id.to_string(),
            chat_id,
            sender_jid: sender_jid.clone(),
            from_me: is_from_me(parsed.from_me, &sender_jid, None),
            message_type: parsed.message_type.as_str().to_string(),
            content: parsed.content,
            timestamp: normalize_timestamp(parsed.timestamp_raw.as_ref()),
            quoted_message_id: parsed.quoted_message_id,
            is_forwarded: parsed.is_forwarded,
            forwarding_score: parsed.forwarding_score,
            is_starred: false,
            is_edited: false,
            last_edited_at: None,
            source_platform: "whatsapp".to_string(),
            raw_payload: item.clone(),
        })
        .map_err(WebhookError::from)?;
    outcome.stored_messages.push(stored);
    Ok(())
}

/// Priority derived from the trigger emoji (spec §4.3b): a fixed "urgent"
/// set maps to `high`, everything else to `normal`. Rule config can further
/// override via its own hints, applied by the caller.
pub fn derive_reaction_priority(emoji: &str) -> QueuePriority {
    const URGENT: &[&str] = &["🔴", "🚨", "‼️", "❗", "🆘"];
    if URGENT.contains(&emoji) {
        QueuePriority::High
    } else {
        QueuePriority::Normal
    }
}
