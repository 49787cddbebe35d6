//! Recovery Subsystem (spec §4.8, component C8). A background sweep retries
//! payloads parked in the failed-message bucket (spec §4.2 "internal
//! failures persist to recovery and still answer 200") by re-running them
//! through `webhook::process_incoming_event`. The dead-letter side of
//! recovery (exhausted `action_queue` items) is reset on demand via
//! `Db::reprocess_failed_queue_items`, exposed through the admin route
//! rather than this sweep — operator-triggered, not time-triggered (spec
//! §4.8 "dead-letter queue ... manual reprocess").
//!
//! Mirrors the teacher's retention task shape: an initial startup delay,
//! then a periodic sweep loop, opening its own `Db` connection rather than
//! sharing the HTTP-facing one (spec §9 "Global singletons avoided").

use crate::config::AppConfig;
use crate::db::Db;
use crate::webhook::{self, InboundEnvelope};

const STARTUP_DELAY_SECS: u64 = 10;
const SWEEP_BATCH: i64 = 20;

pub fn spawn_recovery_task(db_path: String, config: AppConfig) {
    tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_secs(STARTUP_DELAY_SECS)).await;

        let db = Db::new(&db_path);
        tracing::info!("recovery sweep started");
        let mut ticker = tokio::time::interval(config.recovery_sweep_interval);

        loop {
            ticker.tick().await;
            run_sweep(&db, &config);
        }
    });
}

fn run_sweep(db: &Db, config: &AppConfig) {
    let due = match db.due_failed_events(SWEEP_BATCH) {
        Ok(due) => due,
        Err(e) => {
            tracing::warn!(error = %e, "recovery sweep failed to list due failed events");
            return;
        }
    };

    for failed in due {
        let envelope: InboundEnvelope = match serde_json::from_value(failed.raw_payload.clone()) {
            Ok(envelope) => envelope,
            Err(e) => {
                // The raw payload was never a valid envelope to begin with;
                // no amount of retrying will fix that, so treat it as
                // permanently resolved rather than retry it forever.
                tracing::error!(failed_event_id = %failed.failed_event_id, error = %e, "unrecoverable failed event, giving up");
                db.mark_failed_event_resolved(&failed.failed_event_id).ok();
                continue;
            }
        };

        match webhook::process_incoming_event(db, &envelope) {
            Ok(_) => {
                db.mark_failed_event_resolved(&failed.failed_event_id).ok();
                tracing::info!(failed_event_id = %failed.failed_event_id, "recovered failed event");
            }
            Err(e) => {
                tracing::warn!(failed_event_id = %failed.failed_event_id, error = %e, "retry failed, rescheduling");
                db.reschedule_failed_event(&failed.failed_event_id, config.retry_backoff_cap).ok();
            }
        }
    }
}
