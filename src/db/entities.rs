use super::Db;
use crate::error::StorageError;
use crate::models::{Bill, CalendarEvent, ChangeOperation, Note, Task};
use rusqlite::params;

/// CRUD for the business entities the executor produces (spec §3, §4.6).
/// The rich financial/CRM schemas are explicitly out of scope (spec §1);
/// these are the minimal shapes NLP parsers target and the executor writes.
/// `tasks`/`calendar_events`/`bills`/`notes` are subscribed tables (spec §3
/// EntityChange invariant), so every write here appends a change row in the
/// same transaction, same as `messages`/`message_reactions`.
impl Db {
    pub fn insert_task(&self, task: &Task) -> Result<Task, StorageError> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO tasks (task_id, instance_id, space_id, title, description, priority,
                due_date, tags, assignee, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)",
            params![
                task.task_id,
                task.instance_id,
                task.space_id,
                task.title,
                task.description,
                task.priority,
                task.due_date,
                serde_json::to_string(&task.tags).unwrap_or_default(),
                task.assignee,
                task.status,
                task.created_at,
            ],
        )?;
        Db::record_change(
            &tx,
            "tasks",
            ChangeOperation::Insert,
            &task.task_id,
            "task",
            None,
            Some(&serde_json::json!({"title": task.title, "status": task.status})),
            &serde_json::json!({"instance_id": task.instance_id}),
        )?;
        tx.commit()?;
        drop(conn);
        self.get_task(&task.task_id)
    }

    pub fn get_task(&self, task_id: &str) -> Result<Task, StorageError> {
        self.conn()
            .query_row(
                "SELECT task_id, instance_id, space_id, title, description, priority, due_date,
                        tags, assignee, status, created_at, updated_at
                 FROM tasks WHERE task_id = ?1",
                params![task_id],
                row_to_task,
            )
            .map_err(StorageError::from)
    }

    /// Applied by `update_task_status` actions (spec §4.6); requires the
    /// caller to have already resolved an existing `MessageTaskLink(trigger)`.
    pub fn update_task_status(&self, task_id: &str, new_status: &str) -> Result<Task, StorageError> {
        let now = chrono::Utc::now().to_rfc3339();
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let changed = tx.execute(
            "UPDATE tasks SET status = ?2, updated_at = ?3 WHERE task_id = ?1",
            params![task_id, new_status, now],
        )?;
        if changed == 0 {
            return Err(StorageError::NotFound(format!("task {task_id}")));
        }
        Db::record_change(
            &tx,
            "tasks",
            ChangeOperation::Update,
            task_id,
            "task",
            None,
            Some(&serde_json::json!({"status": new_status})),
            &serde_json::json!({}),
        )?;
        tx.commit()?;
        drop(conn);
        self.get_task(task_id)
    }

    pub fn insert_calendar_event(&self, event: &CalendarEvent) -> Result<CalendarEvent, StorageError> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO calendar_events (event_id, instance_id, space_id, title, start_ts, end_ts,
                location, attendees, recurrence, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                event.event_id,
                event.instance_id,
                event.space_id,
                event.title,
                event.start_ts,
                event.end_ts,
                event.location,
                serde_json::to_string(&event.attendees).unwrap_or_default(),
                event.recurrence,
                event.created_at,
            ],
        )?;
        Db::record_change(
            &tx,
            "calendar_events",
            ChangeOperation::Insert,
            &event.event_id,
            "calendar_event",
            None,
            Some(&serde_json::json!({"title": event.title, "start_ts": event.start_ts})),
            &serde_json::json!({"instance_id": event.instance_id}),
        )?;
        tx.commit()?;
        drop(conn);
        self.get_calendar_event(&event.event_id)
    }

    pub fn get_calendar_event(&self, event_id: &str) -> Result<CalendarEvent, StorageError> {
        self.conn()
            .query_row(
                "SELECT event_id, instance_id, space_id, title, start_ts, end_ts, location,
                        attendees, recurrence, created_at
                 FROM calendar_events WHERE event_id = ?1",
                params![event_id],
                row_to_event,
            )
            .map_err(StorageError::from)
    }

    pub fn insert_bill(&self, bill: &Bill) -> Result<Bill, StorageError> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO bills (bill_id, instance_id, space_id, vendor, amount, currency, due_date,
                category, is_recurring, recurrence_type, recurrence_interval, recurrence_end_date,
                next_due_date, auto_pay_enabled, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            params![
                bill.bill_id,
                bill.instance_id,
                bill.space_id,
                bill.vendor,
                bill.amount,
                bill.currency,
                bill.due_date,
                bill.category,
                bill.is_recurring,
                bill.recurrence_type,
                bill.recurrence_interval,
                bill.recurrence_end_date,
                bill.next_due_date,
                bill.auto_pay_enabled,
                bill.created_at,
            ],
        )?;
        Db::record_change(
            &tx,
            "bills",
            ChangeOperation::Insert,
            &bill.bill_id,
            "bill",
            None,
            Some(&serde_json::json!({"vendor": bill.vendor, "amount": bill.amount})),
            &serde_json::json!({"instance_id": bill.instance_id}),
        )?;
        tx.commit()?;
        drop(conn);
        self.get_bill(&bill.bill_id)
    }

    pub fn get_bill(&self, bill_id: &str) -> Result<Bill, StorageError> {
        self.conn()
            .query_row(
                "SELECT bill_id, instance_id, space_id, vendor, amount, currency, due_date, category,
                        is_recurring, recurrence_type, recurrence_interval, recurrence_end_date,
                        next_due_date, auto_pay_enabled, created_at
                 FROM bills WHERE bill_id = ?1",
                params![bill_id],
                row_to_bill,
            )
            .map_err(StorageError::from)
    }

    pub fn insert_note(&self, note: &Note) -> Result<Note, StorageError> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO notes (note_id, instance_id, space_id, title, content, tags, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                note.note_id,
                note.instance_id,
                note.space_id,
                note.title,
                note.content,
                serde_json::to_string(&note.tags).unwrap_or_default(),
                note.created_at,
            ],
        )?;
        Db::record_change(
            &tx,
            "notes",
            ChangeOperation::Insert,
            &note.note_id,
            "note",
            None,
            Some(&serde_json::json!({"title": note.title})),
            &serde_json::json!({"instance_id": note.instance_id}),
        )?;
        tx.commit()?;
        drop(conn);
        self.get_note(&note.note_id)
    }

    pub fn get_note(&self, note_id: &str) -> Result<Note, StorageError> {
        self.conn()
            .query_row(
                "SELECT note_id, instance_id, space_id, title, content, tags, created_at
                 FROM notes WHERE note_id = ?1",
                params![note_id],
                row_to_note,
            )
            .map_err(StorageError::from)
    }
}

fn row_to_task(row: &rusqlite::Row) -> rusqlite::Result<Task> {
    let tags: String = row.get(7)?;
    Ok(Task {
        task_id: row.get(0)?,
        instance_id: row.get(1)?,
        space_id: row.get(2)?,
        title: row.get(3)?,
        description: row.get(4)?,
        priority: row.get(5)?,
        due_date: row.get(6)?,
        tags: serde_json::from_str(&tags).unwrap_or_default(),
        assignee: row.get(8)?,
        status: row.get(9)?,
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
    })
}

fn row_to_event(row: &rusqlite::Row) -> rusqlite::Result<CalendarEvent> {
    let attendees: String = row.get(7)?;
    Ok(CalendarEvent {
        event_id: row.get(0)?,
        instance_id: row.get(1)?,
        space_id: row.get(2)?,
        title: row.get(3)?,
        start_ts: row.get(4)?,
        end_ts: row.get(5)?,
        location: row.get(6)?,
        attendees: serde_json::from_str(&attendees).unwrap_or_default(),
        recurrence: row.get(8)?,
        created_at: row.get(9)?,
    })
}

fn row_to_bill(row: &rusqlite::Row) -> rusqlite::Result<Bill> {
    Ok(Bill {
        bill_id: row.get(0)?,
        instance_id: row.get(1)?,
        space_id: row.get(2)?,
        vendor: row.get(3)?,
        amount: row.get(4)?,
        currency: row.get(5)?,
        due_date: row.get(6)?,
        category: row.get(7)?,
        is_recurring: row.get::<_, i64>(8)? != 0,
        recurrence_type: row.get(9)?,
        recurrence_interval: row.get(10)?,
        recurrence_end_date: row.get(11)?,
        next_due_date: row.get(12)?,
        auto_pay_enabled: row.get::<_, i64>(13)? != 0,
        created_at: row.get(14)?,
    })
}

fn row_to_note(row: &rusqlite::Row) -> rusqlite::Result<Note> {
    let tags: String = row.get(5)?;
    Ok(Note {
        note_id: row.get(0)?,
        instance_id: row.get(1)?,
        space_id: row.get(2)?,
        title: row.get(3)?,
        content: row.get(4)?,
        tags: serde_json::from_str(&tags).unwrap_or_default(),
        created_at: row.get(6)?,
    })
}
