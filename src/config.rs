use std::env;
use std::time::Duration;

/// Process-wide configuration, read once at startup from the environment.
///
/// Every field has a sane default so the server boots in a dev environment
/// with nothing set; production deployments override via env vars.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_path: String,
    /// Shared secret used to validate the inbound webhook HMAC signature.
    pub webhook_secret: Option<String>,
    /// Base URL of the upstream chat-platform provider API.
    pub provider_base_url: String,
    /// Global API key used when an instance doesn't carry its own.
    pub provider_api_key: Option<String>,
    /// Number of queue worker tasks to spawn.
    pub worker_count: usize,
    /// How often each queue worker polls for a new batch.
    pub poll_interval: Duration,
    /// Cap on the retry backoff delay.
    pub retry_backoff_cap: Duration,
    /// Interval between recovery sweeps (failed-message bucket + dead-letter).
    pub recovery_sweep_interval: Duration,
    /// Per-call timeout for outbound provider/conferencing calls.
    pub outbound_timeout: Duration,
    pub log_level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_path: "data/chat_action_engine.db".to_string(),
            webhook_secret: None,
            provider_base_url: "http://localhost:8080".to_string(),
            provider_api_key: None,
            worker_count: 2,
            poll_interval: Duration::from_millis(500),
            retry_backoff_cap: Duration::from_secs(60),
            recovery_sweep_interval: Duration::from_secs(30),
            outbound_timeout: Duration::from_secs(10),
            log_level: "info".to_string(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = env::var("DATABASE_PATH") {
            config.database_path = val;
        }
        if let Ok(val) = env::var("WEBHOOK_SECRET") {
            config.webhook_secret = Some(val);
        }
        if let Ok(val) = env::var("PROVIDER_BASE_URL") {
            config.provider_base_url = val;
        }
        if let Ok(val) = env::var("PROVIDER_API_KEY") {
            config.provider_api_key = Some(val);
        }
        if let Ok(val) = env::var("WORKER_COUNT")
            && let Ok(n) = val.parse::<usize>()
        {
            config.worker_count = n.max(1);
        }
        if let Ok(val) = env::var("POLL_INTERVAL_MS")
            && let Ok(n) = val.parse::<u64>()
        {
            config.poll_interval = Duration::from_millis(n);
        }
        if let Ok(val) = env::var("RETRY_BACKOFF_CAP_SECS")
            && let Ok(n) = val.parse::<u64>()
        {
            config.retry_backoff_cap = Duration::from_secs(n);
        }
        if let Ok(val) = env::var("RECOVERY_SWEEP_INTERVAL_SECS")
            && let Ok(n) = val.parse::<u64>()
        {
            config.recovery_sweep_interval = Duration::from_secs(n);
        }
        if let Ok(val) = env::var("OUTBOUND_TIMEOUT_SECS")
            && let Ok(n) = val.parse::<u64>()
        {
            config.outbound_timeout = Duration::from_secs(n);
        }
        if let Ok(val) = env::var("LOG_LEVEL") {
            config.log_level = val;
        }

        config
    }
}
