use anyhow::{Context, anyhow, bail};
use dotenvy::dotenv;
use std::env;
use std::str::FromStr;
use strum_macros::{Display, EnumString};

use crate::accounting::{DayBoundary, HoursPolicy};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum StoreBackend {
    MySql,
    Memory,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server_addr: String,
    pub store_backend: StoreBackend,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub jwt_secret: String,
    pub access_token_ttl: usize,
    pub refresh_token_ttl: usize,

    // Rate limiting
    pub rate_login_per_min: u32,
    pub rate_register_per_min: u32,
    pub rate_refresh_per_min: u32,
    pub rate_protected_per_min: u32,

    pub api_prefix: String,

    pub day_boundary: DayBoundary,
    pub hours_policy: HoursPolicy,
    pub log_dir: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from any key lookup, so tests need not touch the
    /// process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let required = |key: &str| lookup(key).with_context(|| format!("{key} must be set"));

        let store_backend: StoreBackend = parse_or(&lookup, "STORE_BACKEND", StoreBackend::MySql)?;
        let database_url = lookup("DATABASE_URL");
        if store_backend == StoreBackend::MySql && database_url.is_none() {
            bail!("DATABASE_URL must be set when STORE_BACKEND is mysql");
        }

        let offset_minutes: i32 = parse_or(&lookup, "DAY_BOUNDARY_UTC_OFFSET", 0)?;
        let day_boundary = DayBoundary::from_offset_minutes(offset_minutes)
            .ok_or_else(|| anyhow!("DAY_BOUNDARY_UTC_OFFSET out of range: {offset_minutes}"))?;

        let standard_hours: f64 = parse_or(&lookup, "STANDARD_DAILY_HOURS", 8.0)?;
        if !standard_hours.is_finite() || standard_hours < 0.0 {
            bail!("STANDARD_DAILY_HOURS must be a non-negative number");
        }

        let access_token_ttl = token_ttl(&lookup, "ACCESS_TOKEN_TTL", 900)?; // 15 min
        let refresh_token_ttl = token_ttl(&lookup, "REFRESH_TOKEN_TTL", 604_800)?; // 7 days

        Ok(Self {
            server_addr: required("SERVER_ADDR")?,
            store_backend,
            database_url,
            database_max_connections: parse_or(&lookup, "DATABASE_MAX_CONNECTIONS", 10)?,
            jwt_secret: required("JWT_SECRET")?,
            access_token_ttl,
            refresh_token_ttl,

            rate_login_per_min: parse_or(&lookup, "RATE_LOGIN_PER_MIN", 60)?,
            rate_register_per_min: parse_or(&lookup, "RATE_REGISTER_PER_MIN", 30)?,
            rate_refresh_per_min: parse_or(&lookup, "RATE_REFRESH_PER_MIN", 30)?,
            rate_protected_per_min: parse_or(&lookup, "RATE_PROTECTED_PER_MIN", 1000)?,

            api_prefix: lookup("API_PREFIX").unwrap_or_else(|| "/api".to_string()),

            day_boundary,
            hours_policy: HoursPolicy { standard_hours },
            log_dir: lookup("LOG_DIR").unwrap_or_else(|| "logs".to_string()),
        })
    }
}

/// One year, in seconds.
const MAX_TOKEN_TTL: usize = 366 * 24 * 60 * 60;

fn token_ttl(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: usize,
) -> anyhow::Result<usize> {
    let ttl = parse_or(lookup, key, default)?;
    if !(1..=MAX_TOKEN_TTL).contains(&ttl) {
        bail!("{key} must be between 1 and {MAX_TOKEN_TTL} seconds");
    }
    Ok(ttl)
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow!("{key}: invalid value '{raw}': {e}")),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(&[
            ("SERVER_ADDR", "127.0.0.1:8080"),
            ("JWT_SECRET", "secret"),
            ("DATABASE_URL", "mysql://localhost/fleet"),
        ]))
        .unwrap();

        assert_eq!(config.store_backend, StoreBackend::MySql);
        assert_eq!(config.database_max_connections, 10);
        assert_eq!(config.access_token_ttl, 900);
        assert_eq!(config.refresh_token_ttl, 604_800);
        assert_eq!(config.rate_protected_per_min, 1000);
        assert_eq!(config.api_prefix, "/api");
        assert_eq!(config.day_boundary, DayBoundary::utc());
        assert_eq!(config.hours_policy.standard_hours, 8.0);
        assert_eq!(config.log_dir, "logs");
    }

    #[test]
    fn test_memory_backend_needs_no_database() {
        let config = Config::from_lookup(lookup(&[
            ("SERVER_ADDR", "127.0.0.1:8080"),
            ("JWT_SECRET", "secret"),
            ("STORE_BACKEND", "Memory"),
            ("DAY_BOUNDARY_UTC_OFFSET", "-300"),
            ("STANDARD_DAILY_HOURS", "7.5"),
        ]))
        .unwrap();

        assert_eq!(config.store_backend, StoreBackend::Memory);
        assert!(config.database_url.is_none());
        assert_eq!(config.day_boundary.offset_minutes(), -300);
        assert_eq!(config.hours_policy.standard_hours, 7.5);
    }

    #[test]
    fn test_missing_and_malformed_values() {
        let no_db = Config::from_lookup(lookup(&[
            ("SERVER_ADDR", "127.0.0.1:8080"),
            ("JWT_SECRET", "secret"),
        ]));
        assert!(no_db.is_err());

        let no_secret = Config::from_lookup(lookup(&[
            ("SERVER_ADDR", "127.0.0.1:8080"),
            ("STORE_BACKEND", "memory"),
        ]));
        assert!(no_secret.unwrap_err().to_string().contains("JWT_SECRET"));

        let bad_rate = Config::from_lookup(lookup(&[
            ("SERVER_ADDR", "127.0.0.1:8080"),
            ("JWT_SECRET", "secret"),
            ("STORE_BACKEND", "memory"),
            ("RATE_LOGIN_PER_MIN", "lots"),
        ]));
        assert!(bad_rate.unwrap_err().to_string().contains("RATE_LOGIN_PER_MIN"));

        let bad_offset = Config::from_lookup(lookup(&[
            ("SERVER_ADDR", "127.0.0.1:8080"),
            ("JWT_SECRET", "secret"),
            ("STORE_BACKEND", "memory"),
            ("DAY_BOUNDARY_UTC_OFFSET", "1500"),
        ]));
        assert!(bad_offset.is_err());
    }

    #[test]
    fn test_token_ttl_is_bounded() {
        let with_ttl = |key, value| {
            Config::from_lookup(lookup(&[
                ("SERVER_ADDR", "127.0.0.1:8080"),
                ("JWT_SECRET", "secret"),
                ("STORE_BACKEND", "memory"),
                (key, value),
            ]))
        };

        let huge = with_ttl("ACCESS_TOKEN_TTL", "18446744073709551615");
        assert!(huge.unwrap_err().to_string().contains("ACCESS_TOKEN_TTL"));
        assert!(with_ttl("REFRESH_TOKEN_TTL", "0").is_err());

        let month = with_ttl("REFRESH_TOKEN_TTL", "2592000").unwrap();
        assert_eq!(month.refresh_token_ttl, 2_592_000);
    }
}
