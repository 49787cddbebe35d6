use chat_action_engine::config::AppConfig;
use chat_action_engine::db::Db;
use rocket::http::{ContentType, Status};
use rocket::local::blocking::Client;
use std::time::Duration;

/// Each test gets its own on-disk SQLite file (avoids cross-test contention)
/// and a fast queue-worker poll interval so reaction-triggered actions land
/// well within a test's patience.
fn test_client() -> (Client, String) {
    let db_path = format!("/tmp/chat_action_engine_test_{}.db", uuid::Uuid::new_v4());
    let config = AppConfig { database_path: db_path.clone(), poll_interval: Duration::from_millis(20), ..Default::default() };
    let rocket = chat_action_engine::rocket_with_config(config);
    (Client::tracked(rocket).expect("valid rocket instance"), db_path)
}

fn wait_for<F: Fn() -> bool>(f: F) {
    for _ in 0..100 {
        if f() {
            return;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    panic!("condition not met within timeout");
}

fn post_webhook(client: &Client, instance: &str, body: serde_json::Value) -> Status {
    client
        .post(format!("/webhook/{instance}"))
        .header(ContentType::JSON)
        .body(body.to_string())
        .dispatch()
        .status()
}

// --- S1: plain message ingestion materializes contact + chat + message ---

#[test]
fn s1_message_ingestion_materializes_dependencies() {
    let (client, db_path) = test_client();
    let status = post_webhook(
        &client,
        "inst-1",
        serde_json::json!({
            "event": "messages.upsert",
            "instance": "inst-1",
            "data": {
                "key": {"id": "M1", "remoteJid": "52155000@s.whatsapp.net", "fromMe": false},
                "pushName": "Fer",
                "message": {"conversation": "Buy milk"},
                "messageTimestamp": 1_700_000_000i64,
            },
        }),
    );
    assert_eq!(status, Status::Ok);

    let db = Db::new(&db_path);
    let contact = db.get_contact("52155000@s.whatsapp.net", "inst-1").unwrap();
    assert_eq!(contact.push_name.as_deref(), Some("Fer"));
    let chat = db.get_chat("52155000@s.whatsapp.net", "inst-1").unwrap();
    assert_eq!(chat.chat_type, "individual");
    let message = db.get_message("M1", "inst-1").unwrap();
    assert_eq!(message.content, "Buy milk");
    assert!(!message.from_me);
}

// --- S2 / S3: reaction trigger creates a task once, idempotently ---

fn create_task_rule(client: &Client) -> String {
    let res = client
        .post("/rules")
        .header(ContentType::JSON)
        .body(
            serde_json::json!({
                "rule_name": "checkmark-to-task",
                "rule_type": "nlp_action",
                "trigger_type": "reaction",
                "trigger_value": "✅",
                "action_type": "create_task",
            })
            .to_string(),
        )
        .dispatch();
    assert_eq!(res.status(), Status::Ok);
    let body: serde_json::Value = res.into_json().unwrap();
    body["rule_id"].as_str().unwrap().to_string()
}

#[test]
fn s2_reaction_creates_task_with_trigger_link() {
    let (client, db_path) = test_client();
    create_task_rule(&client);

    assert_eq!(
        post_webhook(
            &client,
            "inst-1",
            serde_json::json!({
                "event": "messages.upsert",
                "instance": "inst-1",
                "data": {
                    "key": {"id": "M1", "remoteJid": "52155000@s.whatsapp.net", "fromMe": false},
                    "pushName": "Fer",
                    "message": {"conversation": "Buy milk"},
                    "messageTimestamp": 1_700_000_000i64,
                },
            }),
        ),
        Status::Ok
    );

    assert_eq!(
        post_webhook(
            &client,
            "inst-1",
            serde_json::json!({
                "event": "messages.upsert",
                "instance": "inst-1",
                "data": {
                    "key": {"id": "M2", "remoteJid": "52155000@s.whatsapp.net", "fromMe": false, "participant": "52155000@s.whatsapp.net"},
                    "message": {"reactionMessage": {"key": {"id": "M1"}, "text": "✅"}},
                    "messageTimestamp": 1_700_000_010i64,
                },
            }),
        ),
        Status::Ok
    );

    let db = Db::new(&db_path);
    wait_for(|| db.find_task_trigger_link("M1", "inst-1").unwrap().is_some());

    let link = db.find_task_trigger_link("M1", "inst-1").unwrap().unwrap();
    let task = db.get_task(&link.task_id).unwrap();
    assert_eq!(task.title, "Buy milk");
    assert_eq!(task.priority, "medium");
}

#[test]
fn s3_second_identical_reaction_does_not_duplicate_task() {
    let (client, db_path) = test_client();
    create_task_rule(&client);

    post_webhook(
        &client,
        "inst-1",
        serde_json::json!({
            "event": "messages.upsert",
            "instance": "inst-1",
            "data": {
                "key": {"id": "M1", "remoteJid": "52155000@s.whatsapp.net", "fromMe": false},
                "pushName": "Fer",
                "message": {"conversation": "Buy milk"},
                "messageTimestamp": 1_700_000_000i64,
            },
        }),
    );

    let reaction = |ts: i64| {
        serde_json::json!({
            "event": "messages.upsert",
            "instance": "inst-1",
            "data": {
                "key": {"id": format!("M-react-{ts}"), "remoteJid": "52155000@s.whatsapp.net", "fromMe": false, "participant": "52155000@s.whatsapp.net"},
                "message": {"reactionMessage": {"key": {"id": "M1"}, "text": "✅"}},
                "messageTimestamp": ts,
            },
        })
    };
    post_webhook(&client, "inst-1", reaction(1_700_000_010));

    let db = Db::new(&db_path);
    wait_for(|| db.find_task_trigger_link("M1", "inst-1").unwrap().is_some());
    let first_task_id = db.find_task_trigger_link("M1", "inst-1").unwrap().unwrap().task_id;

    // Same reactor, same emoji, same message — reaction row is a key
    // collision (message_id, instance_id, reactor_jid), so this is a no-op
    // update, not a second trigger.
    post_webhook(&client, "inst-1", reaction(1_700_000_020));
    std::thread::sleep(Duration::from_millis(100));

    let link = db.find_task_trigger_link("M1", "inst-1").unwrap().unwrap();
    assert_eq!(link.task_id, first_task_id);
}

// --- S5: group subject is authoritative only from groups.upsert ---

#[test]
fn s5_group_subject_set_only_by_groups_event() {
    let (client, db_path) = test_client();

    post_webhook(
        &client,
        "inst-1",
        serde_json::json!({
            "event": "chats.upsert",
            "instance": "inst-1",
            "data": {"id": "120@g.us"},
        }),
    );

    let db = Db::new(&db_path);
    let group = db.get_group("120@g.us", "inst-1").unwrap();
    assert!(group.subject.is_none());

    post_webhook(
        &client,
        "inst-1",
        serde_json::json!({
            "event": "groups.upsert",
            "instance": "inst-1",
            "data": {"id": "120@g.us", "subject": "Design Team", "owner": "52155000@s.whatsapp.net"},
        }),
    );

    let group = db.get_group("120@g.us", "inst-1").unwrap();
    assert_eq!(group.subject.as_deref(), Some("Design Team"));

    // A later chat event must not clobber the authoritative subject.
    post_webhook(
        &client,
        "inst-1",
        serde_json::json!({
            "event": "chats.upsert",
            "instance": "inst-1",
            "data": {"id": "120@g.us", "unreadCount": 3},
        }),
    );
    let group = db.get_group("120@g.us", "inst-1").unwrap();
    assert_eq!(group.subject.as_deref(), Some("Design Team"));
}

// --- Boundaries ---

#[test]
fn unknown_event_type_returns_200_with_no_db_change() {
    let (client, db_path) = test_client();
    let status = post_webhook(
        &client,
        "inst-1",
        serde_json::json!({"event": "something.unknown", "instance": "inst-1", "data": {}}),
    );
    assert_eq!(status, Status::Ok);

    let db = Db::new(&db_path);
    assert!(!db.message_exists("anything", "inst-1"));
}

#[test]
fn chat_id_without_at_sign_is_not_inserted_and_lands_in_recovery() {
    let (client, db_path) = test_client();
    let status = post_webhook(
        &client,
        "inst-1",
        serde_json::json!({
            "event": "messages.upsert",
            "instance": "inst-1",
            "data": {
                "key": {"id": "M1", "remoteJid": "not-a-jid", "fromMe": false},
                "message": {"conversation": "hi"},
            },
        }),
    );
    assert_eq!(status, Status::Ok);

    let db = Db::new(&db_path);
    assert!(!db.message_exists("M1", "inst-1"));
    let failed = db.due_failed_events(10).unwrap();
    assert_eq!(failed.len(), 1);
}

// --- Admin / rule surface ---

#[test]
fn conflicting_active_rules_on_same_trigger_are_rejected() {
    let (client, _db_path) = test_client();
    create_task_rule(&client);

    let res = client
        .post("/rules")
        .header(ContentType::JSON)
        .body(
            serde_json::json!({
                "rule_name": "duplicate",
                "rule_type": "nlp_action",
                "trigger_type": "reaction",
                "trigger_value": "✅",
                "action_type": "create_note",
            })
            .to_string(),
        )
        .dispatch();
    assert_eq!(res.status(), Status::Conflict);
}

#[test]
fn webhook_signature_mismatch_is_rejected() {
    let db_path = format!("/tmp/chat_action_engine_test_{}.db", uuid::Uuid::new_v4());
    let config = AppConfig {
        database_path: db_path,
        webhook_secret: Some("topsecret".to_string()),
        poll_interval: Duration::from_millis(20),
        ..Default::default()
    };
    let client = Client::tracked(chat_action_engine::rocket_with_config(config)).unwrap();

    let res = client
        .post("/webhook/inst-1")
        .header(ContentType::JSON)
        .header(rocket::http::Header::new("X-Signature", "sha256=deadbeef"))
        .body(serde_json::json!({"event": "messages.upsert", "instance": "inst-1", "data": {}}).to_string())
        .dispatch();
    assert_eq!(res.status(), Status::Unauthorized);
}

#[test]
fn health_endpoint_reports_queue_depth() {
    let (client, _db_path) = test_client();
    let res = client.get("/health").dispatch();
    assert_eq!(res.status(), Status::Ok);
    let body: serde_json::Value = res.into_json().unwrap();
    assert_eq!(body["status"], "ok");
    assert!(body["queue_depth"].is_object());
}

#[test]
fn reprocess_requeues_failed_items() {
    let (client, db_path) = test_client();
    let db = Db::new(&db_path);
    let queued = db
        .enqueue_action(
            "reaction",
            &serde_json::json!({"message_id": "m", "instance_id": "i", "reactor_jid": "r", "reaction_emoji": "x"}),
            chat_action_engine::models::QueuePriority::Normal,
            "reaction:i:m:r",
        )
        .unwrap()
        .unwrap();
    // Exhaust attempts so the item lands in the dead-letter bucket.
    for _ in 0..3 {
        db.fail_queue_item(&queued.queue_id, "boom", Duration::from_secs(60)).unwrap();
    }
    let dead = db.dead_letter_items(10).unwrap();
    assert_eq!(dead.len(), 1);

    let res = client
        .post("/admin/reprocess")
        .header(ContentType::JSON)
        .body("{}")
        .dispatch();
    assert_eq!(res.status(), Status::Ok);
    let body: serde_json::Value = res.into_json().unwrap();
    assert_eq!(body["requeued"], 1);

    let dead = db.dead_letter_items(10).unwrap();
    assert!(dead.is_empty());
}
