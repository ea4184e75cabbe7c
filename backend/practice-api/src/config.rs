use serde::Deserialize;
use std::env;
use url::Url;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub learning_api_url: String,
    pub bind_addr: String,
    pub learning_api_timeout_ms: u64,
    /// Tries per idempotent learning API call (episode fetch, case finish).
    pub learning_api_retry_attempts: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            learning_api_url: "http://localhost:8080".to_string(),
            bind_addr: "0.0.0.0:8081".to_string(),
            learning_api_timeout_ms: 5000,
            learning_api_retry_attempts: 3,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        // Root .env first, then a local one
        let skip_root_env = env::var("SKIP_ROOT_ENV").is_ok();
        if skip_root_env {
            dotenvy::dotenv().ok();
        } else if dotenvy::from_path("../../.env").is_err() {
            dotenvy::dotenv().ok();
        }

        let app_env = env::var("APP_ENV").unwrap_or_else(|_| "dev".to_string());

        // config/*.toml, overridden by APP__SECTION__KEY variables
        let settings = config::Config::builder()
            .add_source(config::File::with_name(&format!("config/{}", app_env)).required(false))
            .add_source(config::Environment::with_prefix("APP").separator("__"))
            .build()?;

        let defaults = Config::default();

        let learning_api_url = settings
            .get_string("learning_api.url")
            .or_else(|_| env::var("LEARNING_API_URL"))
            .unwrap_or(defaults.learning_api_url);

        let bind_addr = settings
            .get_string("server.bind_addr")
            .or_else(|_| env::var("BIND_ADDR"))
            .unwrap_or(defaults.bind_addr);

        let learning_api_timeout_ms = settings
            .get_int("learning_api.timeout_ms")
            .ok()
            .map(|v| v as u64)
            .or_else(|| parse_env("LEARNING_API_TIMEOUT_MS"))
            .unwrap_or(defaults.learning_api_timeout_ms);

        let learning_api_retry_attempts = settings
            .get_int("learning_api.retry_attempts")
            .ok()
            .map(|v| v as usize)
            .or_else(|| parse_env("LEARNING_API_RETRY_ATTEMPTS"))
            .unwrap_or(defaults.learning_api_retry_attempts);

        let config = Config {
            learning_api_url,
            bind_addr,
            learning_api_timeout_ms,
            learning_api_retry_attempts,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), config::ConfigError> {
        let url = Url::parse(&self.learning_api_url).map_err(|e| {
            config::ConfigError::Message(format!(
                "invalid learning API url {:?}: {}",
                self.learning_api_url, e
            ))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(config::ConfigError::Message(format!(
                "learning API url must be http(s), got {}",
                url.scheme()
            )));
        }
        if self.learning_api_timeout_ms == 0 {
            return Err(config::ConfigError::Message(
                "learning API timeout must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.parse().ok())
}
