use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::ogp::{FetchConfig, CACHE_TTL, FETCH_TIMEOUT};

const DEV_JWT_SECRET: &str = "dev_secret_change_in_production";

#[derive(Clone, Debug)]
pub struct Config {
    pub jwt_secret: String,
    pub server_host: String,
    pub server_port: u16,
    pub is_dev: bool,
    pub ogp_fetch_timeout: Duration,
    pub ogp_cache_ttl: Duration,
    pub ogp_user_agent: String,
    pub ogp_allow_private_hosts: bool,
}

impl Config {
    pub fn from_env() -> Result<Self, env::VarError> {
        dotenvy::dotenv().ok();

        let is_dev = env::var("APP_ENV").as_deref() != Ok("production");

        let jwt_secret = match env::var("JWT_SECRET") {
            Ok(secret) => secret,
            Err(env::VarError::NotPresent) if is_dev => DEV_JWT_SECRET.to_string(),
            Err(e) => return Err(e),
        };

        Ok(Config {
            jwt_secret,
            server_host: env::var("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            server_port: parse_or("SERVER_PORT", 8080),
            is_dev,
            ogp_fetch_timeout: Duration::from_millis(parse_or(
                "OGP_FETCH_TIMEOUT_MS",
                FETCH_TIMEOUT.as_millis() as u64,
            )),
            ogp_cache_ttl: Duration::from_secs(parse_or("OGP_CACHE_TTL_SECS", CACHE_TTL.as_secs())),
            ogp_user_agent: env::var("OGP_USER_AGENT")
                .unwrap_or_else(|_| crate::ogp::fetch::USER_AGENT.to_string()),
            ogp_allow_private_hosts: parse_or("OGP_ALLOW_PRIVATE_HOSTS", false),
        })
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }

    pub fn fetch_config(&self) -> FetchConfig {
        FetchConfig {
            timeout: self.ogp_fetch_timeout,
            user_agent: self.ogp_user_agent.clone(),
            allow_private_hosts: self.ogp_allow_private_hosts,
        }
    }
}

/// Read `key` and parse it, falling back to `default` when unset or malformed.
fn parse_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}
