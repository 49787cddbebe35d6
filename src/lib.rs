pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod executor;
pub mod models;
pub mod nlp;
pub mod provider;
pub mod recovery;
pub mod routes;
pub mod rule_engine;
pub mod webhook;
pub mod worker;

use config::AppConfig;
use db::Db;
use events::EventBus;
use provider::{ConferencingProvider, ProviderClient, StubConferencingProvider};
use rocket_cors::CorsOptions;
use rule_engine::RuleCache;
use std::sync::Arc;

pub fn rocket() -> rocket::Rocket<rocket::Build> {
    let config = AppConfig::from_env();
    build_rocket(config)
}

pub fn rocket_with_config(config: AppConfig) -> rocket::Rocket<rocket::Build> {
    build_rocket(config)
}

fn build_rocket(config: AppConfig) -> rocket::Rocket<rocket::Build> {
    if let Some(parent) = std::path::Path::new(&config.database_path).parent() {
        std::fs::create_dir_all(parent).ok();
    }

    let db = Db::new(&config.database_path);
    let events = Arc::new(EventBus::new());
    let rule_cache = Arc::new(RuleCache::new());
    let provider = ProviderClient::new(&config);
    let conferencing: Arc<dyn ConferencingProvider> = Arc::new(StubConferencingProvider);

    let worker_db_path = config.database_path.clone();
    let worker_config = config.clone();
    let worker_cache = rule_cache.clone();
    let worker_events = events.clone();
    let worker_provider = provider.clone();
    let worker_conferencing = conferencing.clone();

    let recovery_db_path = config.database_path.clone();
    let recovery_config = config.clone();

    let cors = CorsOptions::default().to_cors().expect("failed to build CORS policy");

    rocket::build()
        .manage(db)
        .manage(events)
        .manage(rule_cache)
        .manage(provider)
        .manage(conferencing)
        .manage(config)
        .attach(cors)
        .register("/", rocket::catchers![routes::not_found, routes::internal_error])
        .mount(
            "/",
            rocket::routes![
                routes::webhook_receive,
                routes::webhook_receive_typed,
                routes::events_stream,
                routes::list_rules,
                routes::create_rule,
                routes::update_rule,
                routes::delete_rule,
                routes::sync_groups,
                routes::reprocess,
                routes::health,
            ],
        )
        .attach(rocket::fairing::AdHoc::on_liftoff("Queue Workers", move |_rocket| {
            Box::pin(async move {
                worker::spawn_workers(
                    worker_db_path,
                    worker_config,
                    worker_cache,
                    worker_events,
                    worker_provider,
                    worker_conferencing,
                );
                tracing::info!("queue worker pool started");
            })
        }))
        .attach(rocket::fairing::AdHoc::on_liftoff("Recovery Sweep", move |_rocket| {
            Box::pin(async move {
                recovery::spawn_recovery_task(recovery_db_path, recovery_config);
                tracing::info!("recovery sweep started");
            })
        }))
}
