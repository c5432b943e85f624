use std::env;
use std::time::Duration;

/// Limit for one named rate-limit scope: `max_requests` per `window_secs`.
#[derive(Debug, Clone, Copy, serde::Deserialize)]
pub struct RateLimitPreset {
    pub max_requests: u32,
    pub window_secs: u64,
}

impl RateLimitPreset {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

/// The `auth` and `register` presets cover surfaces served elsewhere; they
/// are loaded here so every scope's limits live in one place.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct Config {
    pub server_host: String,
    pub server_port: u16,
    /// Monthly price of a recurring lesson slot, in whole currency units.
    pub lesson_monthly_price: u32,
    pub rate_limit_auth: RateLimitPreset,
    pub rate_limit_register: RateLimitPreset,
    pub rate_limit_booking: RateLimitPreset,
    pub rate_limit_api: RateLimitPreset,
}

fn preset_from_env(name: &str, default_requests: u32) -> RateLimitPreset {
    let max_requests = env::var(format!("RATE_LIMIT_{}_REQUESTS", name))
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default_requests);
    let window_secs = env::var(format!("RATE_LIMIT_{}_WINDOW", name))
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(60);
    RateLimitPreset {
        max_requests,
        window_secs,
    }
}

impl Config {
    pub fn from_env() -> Result<Self, env::VarError> {
        dotenv::dotenv().ok();

        Ok(Config {
            server_host: env::var("SERVER_HOST")?,
            server_port: env::var("SERVER_PORT")?.parse().unwrap_or(3000),
            lesson_monthly_price: env::var("LESSON_MONTHLY_PRICE")?.parse().unwrap_or(50),
            rate_limit_auth: preset_from_env("AUTH", 5),
            rate_limit_register: preset_from_env("REGISTER", 3),
            rate_limit_booking: preset_from_env("BOOKING", 30),
            rate_limit_api: preset_from_env("API", 60),
        })
    }
}
