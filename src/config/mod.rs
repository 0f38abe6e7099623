//! Runtime settings for the forum backend, read from `FORUM_*` environment variables.
//!
//! A `.env` file in the working directory is honoured when present.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Environment variable names.
pub mod keys {
    pub const API_PSK: &str = "FORUM_API_PSK";
    pub const DB_PATH: &str = "FORUM_DB_PATH";
    pub const DB_MAX_CONNECTIONS: &str = "FORUM_DB_MAX_CONNECTIONS";
    pub const BIND_ADDR: &str = "FORUM_BIND_ADDR";
    pub const LOG_LEVEL: &str = "FORUM_LOG_LEVEL";
}

const DEFAULT_DB_PATH: &str = "./data/forum.sqlite";
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 5;
const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8080";
const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Debug, Clone)]
pub struct Config {
    /// Key the API gateway must present; `None` disables the check
    pub api_psk: Option<String>,
    pub db_path: PathBuf,
    /// Upper bound on pooled SQLite connections
    pub db_max_connections: u32,
    pub bind_addr: SocketAddr,
    /// Fallback filter when `RUST_LOG` is unset
    pub log_level: String,
}

impl Config {
    /// Read settings from the environment, rejecting values that do not parse.
    pub fn from_env() -> Result<Self, String> {
        dotenvy::dotenv().ok();

        let bind_addr = var_or(keys::BIND_ADDR, DEFAULT_BIND_ADDR);
        let bind_addr = bind_addr
            .parse()
            .map_err(|e| format!("{} {:?} is not a socket address: {}", keys::BIND_ADDR, bind_addr, e))?;

        let db_max_connections = match env::var(keys::DB_MAX_CONNECTIONS) {
            Ok(raw) => match raw.parse::<u32>() {
                Ok(n) if n > 0 => n,
                _ => {
                    return Err(format!(
                        "{} must be a positive integer, got {:?}",
                        keys::DB_MAX_CONNECTIONS,
                        raw
                    ))
                }
            },
            Err(_) => DEFAULT_DB_MAX_CONNECTIONS,
        };

        Ok(Self {
            api_psk: env::var(keys::API_PSK).ok().filter(|k| !k.is_empty()),
            db_path: var_or(keys::DB_PATH, DEFAULT_DB_PATH).into(),
            db_max_connections,
            bind_addr,
            log_level: var_or(keys::LOG_LEVEL, DEFAULT_LOG_LEVEL),
        })
    }
}

fn var_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}
