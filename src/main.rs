use chat_action_engine::config::AppConfig;

#[rocket::main]
async fn main() {
    let config = AppConfig::from_env();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_level.clone().into()),
        )
        .init();

    if let Err(e) = chat_action_engine::rocket_with_config(config).launch().await {
        tracing::error!(error = %e, "server terminated with error");
        std::process::exit(1);
    }
}
