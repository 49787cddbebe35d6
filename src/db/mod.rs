//! Storage Gateway (single-writer SQLite, one `Mutex<Connection>`, same
//! reasoning as the teacher: SQLite serializes writers regardless of a
//! pool, so a pool buys nothing here). Each submodule owns one entity
//! family's upsert/read operations as an `impl Db` block.

mod calls;
mod changes;
mod chats;
mod contacts;
mod entities;
mod execution_log;
mod failed_events;
mod groups;
mod instances;
mod links;
mod messages;
mod queue;
mod reactions;
mod rules;

pub use failed_events::FailedEvent;
pub use queue::LeasedItem;

use rusqlite::Connection;
use std::sync::Mutex;

pub struct Db {
    pub conn: Mutex<Connection>,
}

impl Db {
    pub fn new(path: &str) -> Self {
        let conn = Connection::open(path).expect("Failed to open database");
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")
            .expect("Failed to set pragmas");
        let db = Db { conn: Mutex::new(conn) };
        db.migrate();
        db
    }

    pub fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn migrate(&self) {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(SCHEMA).expect("Failed to run migrations");
    }
}

/// Base schema. Additive changes land as idempotent `ALTER TABLE` statements
/// appended below (teacher's convention), not rewrites of this literal.
const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS instances (
    instance_id TEXT PRIMARY KEY,
    owner_jid TEXT,
    creator_user_id TEXT NOT NULL,
    api_base_url TEXT NOT NULL,
    api_key TEXT NOT NULL,
    connection_state TEXT NOT NULL DEFAULT 'close'
);

CREATE TABLE IF NOT EXISTS contacts (
    jid TEXT NOT NULL,
    instance_id TEXT NOT NULL,
    push_name TEXT,
    verified_name TEXT,
    profile_picture_url TEXT,
    is_business INTEGER NOT NULL DEFAULT 0,
    is_me INTEGER NOT NULL DEFAULT 0,
    is_blocked INTEGER NOT NULL DEFAULT 0,
    first_seen_at TEXT NOT NULL,
    last_updated_at TEXT NOT NULL,
    PRIMARY KEY (jid, instance_id)
);

CREATE TABLE IF NOT EXISTS chats (
    chat_id TEXT NOT NULL,
    instance_id TEXT NOT NULL,
    chat_type TEXT NOT NULL,
    unread_count INTEGER NOT NULL DEFAULT 0,
    archived INTEGER NOT NULL DEFAULT 0,
    pinned INTEGER NOT NULL DEFAULT 0,
    muted INTEGER NOT NULL DEFAULT 0,
    mute_end_ts TEXT,
    last_message_ts TEXT,
    PRIMARY KEY (chat_id, instance_id),
    FOREIGN KEY (chat_id, instance_id) REFERENCES contacts(jid, instance_id)
);

CREATE TABLE IF NOT EXISTS groups (
    group_jid TEXT NOT NULL,
    instance_id TEXT NOT NULL,
    subject TEXT,
    owner_jid TEXT,
    description TEXT,
    creation_ts TEXT,
    is_locked INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (group_jid, instance_id)
);

CREATE TABLE IF NOT EXISTS group_participants (
    group_jid TEXT NOT NULL,
    participant_jid TEXT NOT NULL,
    instance_id TEXT NOT NULL,
    is_admin INTEGER NOT NULL DEFAULT 0,
    is_super_admin INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (group_jid, participant_jid, instance_id)
);

CREATE TABLE IF NOT EXISTS messages (
    message_id TEXT NOT NULL,
    instance_id TEXT NOT NULL,
    chat_id TEXT NOT NULL,
    sender_jid TEXT NOT NULL,
    from_me INTEGER NOT NULL DEFAULT 0,
    message_type TEXT NOT NULL,
    content TEXT NOT NULL DEFAULT '',
    timestamp TEXT NOT NULL,
    quoted_message_id TEXT,
    is_forwarded INTEGER NOT NULL DEFAULT 0,
    forwarding_score INTEGER NOT NULL DEFAULT 0,
    is_starred INTEGER NOT NULL DEFAULT 0,
    is_edited INTEGER NOT NULL DEFAULT 0,
    last_edited_at TEXT,
    source_platform TEXT NOT NULL DEFAULT 'whatsapp',
    raw_payload TEXT NOT NULL DEFAULT '{}',
    PRIMARY KEY (message_id, instance_id),
    FOREIGN KEY (chat_id, instance_id) REFERENCES chats(chat_id, instance_id),
    FOREIGN KEY (sender_jid, instance_id) REFERENCES contacts(jid, instance_id)
);
CREATE INDEX IF NOT EXISTS idx_messages_chat_ts ON messages(chat_id, instance_id, timestamp DESC);

CREATE TABLE IF NOT EXISTS message_status_updates (
    id TEXT PRIMARY KEY,
    message_id TEXT NOT NULL,
    instance_id TEXT NOT NULL,
    status TEXT NOT NULL,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_status_updates_message ON message_status_updates(message_id, instance_id);

CREATE TABLE IF NOT EXISTS message_reactions (
    message_id TEXT NOT NULL,
    instance_id TEXT NOT NULL,
    reactor_jid TEXT NOT NULL,
    reaction_emoji TEXT NOT NULL,
    from_me INTEGER NOT NULL DEFAULT 0,
    timestamp TEXT NOT NULL,
    PRIMARY KEY (message_id, instance_id, reactor_jid)
);

CREATE TABLE IF NOT EXISTS call_logs (
    call_log_id TEXT NOT NULL,
    instance_id TEXT NOT NULL,
    chat_id TEXT NOT NULL,
    from_jid TEXT NOT NULL,
    from_me INTEGER NOT NULL DEFAULT 0,
    start_ts TEXT NOT NULL,
    is_video INTEGER NOT NULL DEFAULT 0,
    duration_seconds INTEGER NOT NULL DEFAULT 0,
    outcome TEXT NOT NULL,
    PRIMARY KEY (call_log_id, instance_id)
);

CREATE TABLE IF NOT EXISTS action_rules (
    rule_id TEXT PRIMARY KEY,
    rule_name TEXT NOT NULL,
    rule_type TEXT NOT NULL,
    trigger_type TEXT NOT NULL,
    trigger_value TEXT NOT NULL,
    action_type TEXT NOT NULL,
    config TEXT NOT NULL DEFAULT '{}',
    conditions TEXT NOT NULL DEFAULT '{}',
    active INTEGER NOT NULL DEFAULT 1,
    cooldown_minutes INTEGER NOT NULL DEFAULT 0,
    max_executions_per_day INTEGER NOT NULL DEFAULT 1000000,
    total_executions INTEGER NOT NULL DEFAULT 0,
    last_executed_at TEXT
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_rules_trigger_active
    ON action_rules(trigger_type, trigger_value) WHERE active = 1;

CREATE TABLE IF NOT EXISTS action_queue (
    queue_id TEXT PRIMARY KEY,
    event_type TEXT NOT NULL,
    event_data TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending',
    priority TEXT NOT NULL DEFAULT 'normal',
    attempts INTEGER NOT NULL DEFAULT 0,
    max_attempts INTEGER NOT NULL DEFAULT 3,
    retry_after_ts TEXT NOT NULL,
    last_error TEXT,
    created_at TEXT NOT NULL,
    processed_at TEXT,
    completed_at TEXT,
    idempotency_key TEXT NOT NULL UNIQUE,
    substatus TEXT
);
CREATE INDEX IF NOT EXISTS idx_queue_pending
    ON action_queue(status, priority, created_at) WHERE status = 'pending';

CREATE TABLE IF NOT EXISTS entity_changes (
    change_id TEXT PRIMARY KEY,
    table_name TEXT NOT NULL,
    operation TEXT NOT NULL,
    entity_id TEXT NOT NULL,
    entity_type TEXT NOT NULL,
    old_data TEXT,
    new_data TEXT,
    metadata TEXT NOT NULL DEFAULT '{}',
    changed_at TEXT NOT NULL,
    processed INTEGER NOT NULL DEFAULT 0,
    processed_at TEXT,
    error_count INTEGER NOT NULL DEFAULT 0,
    last_error TEXT
);
CREATE INDEX IF NOT EXISTS idx_changes_pending
    ON entity_changes(processed, changed_at) WHERE processed = 0;

CREATE TABLE IF NOT EXISTS action_execution_log (
    execution_id TEXT PRIMARY KEY,
    rule_id TEXT NOT NULL,
    queue_item_id TEXT NOT NULL,
    status TEXT NOT NULL,
    execution_time_ms INTEGER NOT NULL DEFAULT 0,
    error_message TEXT,
    created_entity_refs TEXT NOT NULL DEFAULT '[]',
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS message_task_links (
    link_id TEXT PRIMARY KEY,
    message_id TEXT NOT NULL,
    instance_id TEXT NOT NULL,
    task_id TEXT NOT NULL,
    link_type TEXT NOT NULL,
    created_at TEXT NOT NULL,
    UNIQUE(message_id, instance_id, task_id, link_type)
);
CREATE INDEX IF NOT EXISTS idx_task_links_message ON message_task_links(message_id, instance_id, link_type);

CREATE TABLE IF NOT EXISTS message_event_links (
    link_id TEXT PRIMARY KEY,
    message_id TEXT NOT NULL,
    instance_id TEXT NOT NULL,
    event_id TEXT NOT NULL,
    link_type TEXT NOT NULL,
    created_at TEXT NOT NULL,
    UNIQUE(message_id, instance_id, event_id, link_type)
);
CREATE INDEX IF NOT EXISTS idx_event_links_message ON message_event_links(message_id, instance_id, link_type);

CREATE TABLE IF NOT EXISTS message_bill_links (
    link_id TEXT PRIMARY KEY,
    message_id TEXT NOT NULL,
    instance_id TEXT NOT NULL,
    bill_id TEXT NOT NULL,
    link_type TEXT NOT NULL,
    created_at TEXT NOT NULL,
    UNIQUE(message_id, instance_id, bill_id, link_type)
);
CREATE INDEX IF NOT EXISTS idx_bill_links_message ON message_bill_links(message_id, instance_id, link_type);

CREATE TABLE IF NOT EXISTS message_note_links (
    link_id TEXT PRIMARY KEY,
    message_id TEXT NOT NULL,
    instance_id TEXT NOT NULL,
    note_id TEXT NOT NULL,
    link_type TEXT NOT NULL,
    created_at TEXT NOT NULL,
    UNIQUE(message_id, instance_id, note_id, link_type)
);
CREATE INDEX IF NOT EXISTS idx_note_links_message ON message_note_links(message_id, instance_id, link_type);

CREATE TABLE IF NOT EXISTS tasks (
    task_id TEXT PRIMARY KEY,
    instance_id TEXT NOT NULL,
    space_id TEXT,
    title TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    priority TEXT NOT NULL DEFAULT 'medium',
    due_date TEXT,
    tags TEXT NOT NULL DEFAULT '[]',
    assignee TEXT,
    status TEXT NOT NULL DEFAULT 'open',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS calendar_events (
    event_id TEXT PRIMARY KEY,
    instance_id TEXT NOT NULL,
    space_id TEXT,
    title TEXT NOT NULL,
    start_ts TEXT NOT NULL,
    end_ts TEXT NOT NULL,
    location TEXT,
    attendees TEXT NOT NULL DEFAULT '[]',
    recurrence TEXT,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS bills (
    bill_id TEXT PRIMARY KEY,
    instance_id TEXT NOT NULL,
    space_id TEXT,
    vendor TEXT NOT NULL,
    amount TEXT NOT NULL,
    currency TEXT NOT NULL,
    due_date TEXT,
    category TEXT,
    is_recurring INTEGER NOT NULL DEFAULT 0,
    recurrence_type TEXT,
    recurrence_interval INTEGER,
    recurrence_end_date TEXT,
    next_due_date TEXT,
    auto_pay_enabled INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS notes (
    note_id TEXT PRIMARY KEY,
    instance_id TEXT NOT NULL,
    space_id TEXT,
    title TEXT NOT NULL,
    content TEXT NOT NULL DEFAULT '',
    tags TEXT NOT NULL DEFAULT '[]',
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS failed_events (
    failed_event_id TEXT PRIMARY KEY,
    instance_id TEXT,
    raw_payload TEXT NOT NULL,
    reason TEXT NOT NULL,
    retry_count INTEGER NOT NULL DEFAULT 0,
    next_retry_at TEXT NOT NULL,
    created_at TEXT NOT NULL,
    resolved INTEGER NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS idx_failed_events_pending ON failed_events(resolved, next_retry_at);
";

#[cfg(test)]
mod tests {
    use super::*;

    fn mem() -> Db {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys=ON;").unwrap();
        let db = Db { conn: Mutex::new(conn) };
        db.migrate();
        db
    }

    #[test]
    fn migrate_is_idempotent() {
        let db = mem();
        db.migrate();
        db.migrate();
    }
}
