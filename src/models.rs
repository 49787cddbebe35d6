//! The normalized relational data model (spec §3). Structs here mirror the
//! SQLite schema created in `db::migrate` one-to-one; DTOs used only at the
//! HTTP boundary live alongside their routes.

use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Open,
    Close,
    Connecting,
    Qr,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Open => "open",
            ConnectionState::Close => "close",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Qr => "qr",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "open" => ConnectionState::Open,
            "connecting" => ConnectionState::Connecting,
            "qr" => ConnectionState::Qr,
            _ => ConnectionState::Close,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Instance {
    pub instance_id: String,
    pub owner_jid: Option<String>,
    pub creator_user_id: String,
    pub api_base_url: String,
    #[serde(skip_serializing)]
    pub api_key: String,
    pub connection_state: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Contact {
    pub jid: String,
    pub instance_id: String,
    pub push_name: Option<String>,
    pub verified_name: Option<String>,
    pub profile_picture_url: Option<String>,
    pub is_business: bool,
    pub is_me: bool,
    pub is_blocked: bool,
    pub first_seen_at: String,
    pub last_updated_at: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChatType {
    Individual,
    Group,
}

impl ChatType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatType::Individual => "individual",
            ChatType::Group => "group",
        }
    }

    /// Derive chat type from JID suffix (spec §3 Chat invariant).
    pub fn from_jid(jid: &str) -> Self {
        if jid.ends_with(crate::webhook::normalize::GROUP_SUFFIX) {
            ChatType::Group
        } else {
            ChatType::Individual
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Chat {
    pub chat_id: String,
    pub instance_id: String,
    pub chat_type: String,
    pub unread_count: i64,
    pub archived: bool,
    pub pinned: bool,
    pub muted: bool,
    pub mute_end_ts: Option<String>,
    pub last_message_ts: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Group {
    pub group_jid: String,
    pub instance_id: String,
    pub subject: Option<String>,
    pub owner_jid: Option<String>,
    pub description: Option<String>,
    pub creation_ts: Option<String>,
    pub is_locked: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GroupParticipant {
    pub group_jid: String,
    pub participant_jid: String,
    pub instance_id: String,
    pub is_admin: bool,
    pub is_super_admin: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantAction {
    Add,
    Remove,
    Promote,
    Demote,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Text,
    Image,
    Video,
    Audio,
    Document,
    Sticker,
    Location,
    ContactCard,
    ContactCardMulti,
    Order,
    Revoked,
    Unsupported,
    Reaction,
    CallLog,
    EditedMessage,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Text => "text",
            MessageType::Image => "image",
            MessageType::Video => "video",
            MessageType::Audio => "audio",
            MessageType::Document => "document",
            MessageType::Sticker => "sticker",
            MessageType::Location => "location",
            MessageType::ContactCard => "contact_card",
            MessageType::ContactCardMulti => "contact_card_multi",
            MessageType::Order => "order",
            MessageType::Revoked => "revoked",
            MessageType::Unsupported => "unsupported",
            MessageType::Reaction => "reaction",
            MessageType::CallLog => "call_log",
            MessageType::EditedMessage => "edited_message",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Message {
    pub message_id: String,
    pub instance_id: String,
    pub chat_id: String,
    pub sender_jid: String,
    pub from_me: bool,
    pub message_type: String,
    pub content: String,
    pub timestamp: String,
    pub quoted_message_id: Option<String>,
    pub is_forwarded: bool,
    pub forwarding_score: i64,
    pub is_starred: bool,
    pub is_edited: bool,
    pub last_edited_at: Option<String>,
    pub source_platform: String,
    pub raw_payload: serde_json::Value,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    Error,
    Pending,
    Sent,
    Delivered,
    Read,
    Played,
}

impl MessageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageStatus::Error => "error",
            MessageStatus::Pending => "pending",
            MessageStatus::Sent => "sent",
            MessageStatus::Delivered => "delivered",
            MessageStatus::Read => "read",
            MessageStatus::Played => "played",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MessageStatusUpdate {
    pub message_id: String,
    pub instance_id: String,
    pub status: String,
    pub created_at: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MessageReaction {
    pub message_id: String,
    pub instance_id: String,
    pub reactor_jid: String,
    pub reaction_emoji: String,
    pub from_me: bool,
    pub timestamp: String,
}

impl MessageReaction {
    /// An empty emoji denotes removal of a previously-applied reaction (spec §3).
    pub fn is_removal(&self) -> bool {
        self.reaction_emoji.is_empty()
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CallOutcome {
    Answered,
    Missed,
    Declined,
}

impl CallOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallOutcome::Answered => "answered",
            CallOutcome::Missed => "missed",
            CallOutcome::Declined => "declined",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CallLogRow {
    pub call_log_id: String,
    pub instance_id: String,
    pub chat_id: String,
    pub from_jid: String,
    pub from_me: bool,
    pub start_ts: String,
    pub is_video: bool,
    pub duration_seconds: i64,
    pub outcome: String,
}

// --- Action rules ---

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RuleType {
    SimpleAction,
    NlpAction,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    Reaction,
    Hashtag,
}

impl TriggerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerType::Reaction => "reaction",
            TriggerType::Hashtag => "hashtag",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "reaction" => Some(TriggerType::Reaction),
            "hashtag" => Some(TriggerType::Hashtag),
            _ => None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    CreateTask,
    CreateCalendarEvent,
    CreateBill,
    CreateNote,
    UpdateTaskStatus,
    SendMessage,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::CreateTask => "create_task",
            ActionType::CreateCalendarEvent => "create_calendar_event",
            ActionType::CreateBill => "create_bill",
            ActionType::CreateNote => "create_note",
            ActionType::UpdateTaskStatus => "update_task_status",
            ActionType::SendMessage => "send_message",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "create_task" => ActionType::CreateTask,
            "create_calendar_event" => ActionType::CreateCalendarEvent,
            "create_bill" => ActionType::CreateBill,
            "create_note" => ActionType::CreateNote,
            "update_task_status" => ActionType::UpdateTaskStatus,
            "send_message" => ActionType::SendMessage,
            _ => return None,
        })
    }
}

/// Per-rule conditions (spec §3 ActionRule). Stored as JSON; parsed on read.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct RuleConditions {
    #[serde(default)]
    pub instance_include: Vec<String>,
    #[serde(default)]
    pub instance_exclude: Vec<String>,
    #[serde(default)]
    pub contact_include: Vec<String>,
    #[serde(default)]
    pub contact_exclude: Vec<String>,
    /// Hours of day (0-23, inclusive range) during which the rule is active.
    #[serde(default)]
    pub time_window: Option<(u32, u32)>,
    /// Whether hashtag triggers scan every incoming message or only the
    /// instance owner's messages (spec §9 open question — resolved as a
    /// per-rule flag rather than a hardcoded default).
    #[serde(default)]
    pub scan_all_messages: bool,
}

/// Per-rule action configuration (spec §3 ActionRule.config).
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct RuleConfig {
    #[serde(default)]
    pub default_title: Option<String>,
    #[serde(default)]
    pub default_priority: Option<String>,
    #[serde(default)]
    pub default_tags: Vec<String>,
    #[serde(default)]
    pub default_duration_minutes: Option<i64>,
    #[serde(default)]
    pub force_today: bool,
    #[serde(default)]
    pub nlp_parser: Option<String>,
    /// Pins the NLP Service's language argument (spec §4.5
    /// `parse(text, parser_type, language|"auto", rule_config)`) instead of
    /// auto-detecting. One of `"en"`/`"es"`/`"pt"`; anything else (including
    /// absent) falls back to auto-detection.
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub default_currency: Option<String>,
    #[serde(default)]
    pub space_id: Option<String>,
    #[serde(default)]
    pub entity_target: Option<String>,
    #[serde(default)]
    pub auto_pay_enabled: bool,
    #[serde(default)]
    pub is_recurring: bool,
    #[serde(default)]
    pub recurrence_type: Option<String>,
    #[serde(default)]
    pub recurrence_interval: Option<i64>,
    #[serde(default)]
    pub recurrence_end_date: Option<String>,
    #[serde(default)]
    pub confirmation_template: Option<String>,
    #[serde(default)]
    pub new_status: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ActionRule {
    pub rule_id: String,
    pub rule_name: String,
    pub rule_type: String,
    pub trigger_type: String,
    pub trigger_value: String,
    pub action_type: String,
    pub config: RuleConfig,
    pub conditions: RuleConditions,
    pub active: bool,
    pub cooldown_minutes: i64,
    pub max_executions_per_day: i64,
    pub total_executions: i64,
    pub last_executed_at: Option<String>,
}

// --- Queue ---

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum QueueEventType {
    Reaction,
    Message,
    EntityChange,
}

impl QueueEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueEventType::Reaction => "reaction",
            QueueEventType::Message => "message",
            QueueEventType::EntityChange => "entity_change",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl QueueStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueStatus::Pending => "pending",
            QueueStatus::Processing => "processing",
            QueueStatus::Completed => "completed",
            QueueStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum QueuePriority {
    High,
    Normal,
    Low,
}

impl QueuePriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueuePriority::High => "high",
            QueuePriority::Normal => "normal",
            QueuePriority::Low => "low",
        }
    }

    /// Lower sorts first (highest priority first) in `ORDER BY`.
    pub fn sort_rank(&self) -> i64 {
        match self {
            QueuePriority::High => 0,
            QueuePriority::Normal => 1,
            QueuePriority::Low => 2,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ActionQueueItem {
    pub queue_id: String,
    pub event_type: String,
    pub event_data: serde_json::Value,
    pub status: String,
    pub priority: String,
    pub attempts: i64,
    pub max_attempts: i64,
    pub retry_after_ts: String,
    pub last_error: Option<String>,
    pub created_at: String,
    pub processed_at: Option<String>,
    pub completed_at: Option<String>,
    pub idempotency_key: String,
    pub substatus: Option<String>,
}

// --- Change capture ---

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeOperation {
    Insert,
    Update,
    Delete,
}

impl ChangeOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeOperation::Insert => "INSERT",
            ChangeOperation::Update => "UPDATE",
            ChangeOperation::Delete => "DELETE",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct EntityChange {
    pub change_id: String,
    pub table_name: String,
    pub operation: String,
    pub entity_id: String,
    pub entity_type: String,
    pub old_data: Option<serde_json::Value>,
    pub new_data: Option<serde_json::Value>,
    pub metadata: serde_json::Value,
    pub changed_at: String,
    pub processed: bool,
    pub processed_at: Option<String>,
    pub error_count: i64,
    pub last_error: Option<String>,
}

// --- Execution log ---

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CreatedEntityRef {
    pub entity_type: String,
    pub entity_id: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ActionExecutionLog {
    pub execution_id: String,
    pub rule_id: String,
    pub queue_item_id: String,
    pub status: String,
    pub execution_time_ms: i64,
    pub error_message: Option<String>,
    pub created_entity_refs: Vec<CreatedEntityRef>,
    pub created_at: String,
}

// --- Polymorphic link tables ---

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LinkType {
    Trigger,
    Context,
    Reply,
    ForwardFromTask,
    MessageFromTask,
}

impl LinkType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkType::Trigger => "trigger",
            LinkType::Context => "context",
            LinkType::Reply => "reply",
            LinkType::ForwardFromTask => "forward_from_task",
            LinkType::MessageFromTask => "message_from_task",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MessageTaskLink {
    pub link_id: String,
    pub message_id: String,
    pub instance_id: String,
    pub task_id: String,
    pub link_type: String,
    pub created_at: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MessageEventLink {
    pub link_id: String,
    pub message_id: String,
    pub instance_id: String,
    pub event_id: String,
    pub link_type: String,
    pub created_at: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MessageBillLink {
    pub link_id: String,
    pub message_id: String,
    pub instance_id: String,
    pub bill_id: String,
    pub link_type: String,
    pub created_at: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MessageNoteLink {
    pub link_id: String,
    pub message_id: String,
    pub instance_id: String,
    pub note_id: String,
    pub link_type: String,
    pub created_at: String,
}

// --- Action-produced business entities ---
// Full CRM/financial schemas are out of scope (spec §1); these are the
// minimal shapes the executor writes to and the NLP parsers target.

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Task {
    pub task_id: String,
    pub instance_id: String,
    pub space_id: Option<String>,
    pub title: String,
    pub description: String,
    pub priority: String,
    pub due_date: Option<String>,
    pub tags: Vec<String>,
    pub assignee: Option<String>,
    pub status: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CalendarEvent {
    pub event_id: String,
    pub instance_id: String,
    pub space_id: Option<String>,
    pub title: String,
    pub start_ts: String,
    pub end_ts: String,
    pub location: Option<String>,
    pub attendees: Vec<String>,
    pub recurrence: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Bill {
    pub bill_id: String,
    pub instance_id: String,
    pub space_id: Option<String>,
    pub vendor: String,
    pub amount: String,
    pub currency: String,
    pub due_date: Option<String>,
    pub category: Option<String>,
    pub is_recurring: bool,
    pub recurrence_type: Option<String>,
    pub recurrence_interval: Option<i64>,
    pub recurrence_end_date: Option<String>,
    pub next_due_date: Option<String>,
    pub auto_pay_enabled: bool,
    pub created_at: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Note {
    pub note_id: String,
    pub instance_id: String,
    pub space_id: Option<String>,
    pub title: String,
    pub content: String,
    pub tags: Vec<String>,
    pub created_at: String,
}
