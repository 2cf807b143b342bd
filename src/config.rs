use std::{env, fs, net::SocketAddr, path::PathBuf};

use anyhow::Result;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub database_path: PathBuf,
    pub jwt_secret: String,
    pub jwt_secret_is_fallback: bool,
    pub token_ttl_days: i64,
    pub default_page_limit: u32,
    pub max_page_limit: u32,
    pub scrape_base_url: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let bind_raw =
            env::var("CASESYNC_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3001".to_string());
        let bind_normalized = bind_raw
            .trim()
            .trim_matches('"')
            .trim_matches('\'')
            .to_string();
        let bind_addr = bind_normalized
            .parse::<SocketAddr>()
            .unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], 3001)));

        let (jwt_secret, jwt_secret_is_fallback) = resolve_jwt_secret();

        let database_path = PathBuf::from(
            env::var("CASESYNC_DATABASE_PATH").unwrap_or_else(|_| "/data/casesync.db".to_string()),
        );

        let token_ttl_days = env::var("CASESYNC_TOKEN_TTL_DAYS")
            .ok()
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(30);

        let default_page_limit = env::var("CASESYNC_DEFAULT_PAGE_LIMIT")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(10);

        let max_page_limit = env::var("CASESYNC_MAX_PAGE_LIMIT")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(100);

        let scrape_base_url = env::var("CASESYNC_SCRAPE_BASE_URL")
            .unwrap_or_else(|_| "https://www.findhelp.org".to_string())
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            bind_addr,
            database_path,
            jwt_secret,
            jwt_secret_is_fallback,
            token_ttl_days,
            default_page_limit,
            max_page_limit,
            scrape_base_url,
        })
    }
}

fn resolve_jwt_secret() -> (String, bool) {
    if let Ok(value) = env::var("CASESYNC_JWT_SECRET") {
        let trimmed = value.trim();
        if !trimmed.is_empty() {
            return (trimmed.to_string(), false);
        }
    }

    if let Ok(secret_file) = env::var("CASESYNC_JWT_SECRET_FILE") {
        match fs::read_to_string(&secret_file) {
            Ok(raw) => {
                let trimmed = raw.trim();
                if !trimmed.is_empty() {
                    return (trimmed.to_string(), false);
                }
                eprintln!(
                    "[casesync-api] CASESYNC_JWT_SECRET_FILE is empty: {}. Falling back to generated secret.",
                    secret_file
                );
            }
            Err(err) => {
                eprintln!(
                    "[casesync-api] Failed reading CASESYNC_JWT_SECRET_FILE at {}: {}. Falling back to generated secret.",
                    secret_file, err
                );
            }
        }
    } else {
        eprintln!(
            "[casesync-api] CASESYNC_JWT_SECRET not set. Falling back to generated secret; tokens will not survive a restart."
        );
    }

    let generated = format!("fallback-{}", Uuid::new_v4());
    (generated, true)
}
