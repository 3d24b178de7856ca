use std::{fmt::Display, str::FromStr, time::Duration};

use tracing::{info, warn};

pub const MIN_RATING: u8 = 1;
pub const MAX_RATING: u8 = 5;
pub const MAX_COMMENT_LENGTH: usize = 1000;
pub const MAX_TITLE_LENGTH: usize = 200;
pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;

pub const DEFAULT_API_URL: &str = "http://localhost:8080";
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
pub const DEFAULT_HOME_PATH: &str = "/home";
pub const DEFAULT_API_TIMEOUT_SECS: u64 = 10;

#[derive(Clone, Debug)]
pub struct Config {
    /// Origin of the content API, without trailing slash. Post image paths are
    /// resolved against it too.
    pub api_url: String,
    pub bind_addr: String,
    pub home_path: String,
    pub api_timeout: Duration,
}

impl Config {
    pub fn load() -> Self {
        let api_url: String = env_or("REVIEWBOARD_API_URL", DEFAULT_API_URL);
        let timeout_secs: u64 = env_or("REVIEWBOARD_API_TIMEOUT_SECS", DEFAULT_API_TIMEOUT_SECS);

        Self {
            api_url: api_url.trim_end_matches('/').to_string(),
            bind_addr: env_or("REVIEWBOARD_BIND_ADDR", DEFAULT_BIND_ADDR),
            home_path: env_or("REVIEWBOARD_HOME_PATH", DEFAULT_HOME_PATH),
            api_timeout: Duration::from_secs(timeout_secs),
        }
    }

    pub fn with_api_url(api_url: &str) -> Self {
        Self {
            api_url: api_url.trim_end_matches('/').to_string(),
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            home_path: DEFAULT_HOME_PATH.to_string(),
            api_timeout: Duration::from_secs(DEFAULT_API_TIMEOUT_SECS),
        }
    }
}

fn env_or<T, D>(key: &str, default: D) -> T
where
    T: FromStr,
    T::Err: Display,
    D: Display + Into<T>,
{
    match std::env::var(key) {
        Ok(raw) => raw.parse::<T>().unwrap_or_else(|e| {
            warn!("Invalid {key} value {raw:?}: {e}, using default {default}");
            default.into()
        }),
        Err(_) => {
            info!("{key} not set, using default: {default}");
            default.into()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_api_url_strips_trailing_slash() {
        let config = Config::with_api_url("http://api.local:8080/");
        assert_eq!(config.api_url, "http://api.local:8080");
        assert_eq!(config.home_path, DEFAULT_HOME_PATH);
    }

    #[test]
    fn test_env_or_falls_back_on_unparsable_value() {
        std::env::set_var("REVIEWBOARD_TEST_TIMEOUT", "soon");
        let value: u64 = env_or("REVIEWBOARD_TEST_TIMEOUT", 7u64);
        assert_eq!(value, 7);
        std::env::remove_var("REVIEWBOARD_TEST_TIMEOUT");
    }
}
