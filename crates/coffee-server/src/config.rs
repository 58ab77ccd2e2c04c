use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Result, anyhow};
use chrono::Weekday;

/// Process settings, read from `COFFEE_*` environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: PathBuf,
    pub host: String,
    pub port: u16,
    pub admin_handle: Option<String>,

    /// Day of the week (UTC) the matching round runs at midnight.
    pub match_weekday: Weekday,
    /// Delay between the round and the announcements going out.
    pub announce_after: chrono::Duration,
    pub notify_before: chrono::Duration,
    /// How late a reminder missed during downtime may still be delivered.
    pub reminder_grace: chrono::Duration,

    /// Webhook for fired reminders. Reminders are only logged without one.
    pub delivery_url: Option<String>,
    pub delivery_retries: u32,
    pub delivery_retry_delay: Duration,
    pub delivery_timeout: Duration,
    pub delivery_queue: usize,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let text = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        Ok(Self {
            db_path: text("COFFEE_DB_PATH").unwrap_or_else(|| "coffee.db".into()).into(),
            host: text("COFFEE_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port: parse_or(&lookup, "COFFEE_PORT", 3000)?,
            admin_handle: text("COFFEE_ADMIN_HANDLE"),
            match_weekday: parse_or(&lookup, "COFFEE_MATCH_WEEKDAY", Weekday::Mon)?,
            announce_after: chrono::Duration::hours(parse_or(&lookup, "COFFEE_ANNOUNCE_AFTER_HOURS", 9)?),
            notify_before: chrono::Duration::minutes(parse_or(&lookup, "COFFEE_NOTIFY_BEFORE_MINUTES", 60)?),
            reminder_grace: chrono::Duration::seconds(parse_or(&lookup, "COFFEE_REMINDER_GRACE_SECS", 3600)?),
            delivery_url: text("COFFEE_DELIVERY_URL"),
            delivery_retries: parse_or(&lookup, "COFFEE_DELIVERY_RETRIES", 5)?,
            delivery_retry_delay: Duration::from_millis(parse_or(&lookup, "COFFEE_DELIVERY_RETRY_DELAY_MS", 3000)?),
            delivery_timeout: Duration::from_secs(parse_or(&lookup, "COFFEE_DELIVERY_TIMEOUT_SECS", 60)?),
            delivery_queue: parse_or(&lookup, "COFFEE_DELIVERY_QUEUE", 64)?,
        })
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|e| anyhow!("{} has an invalid value {:?}: {}", key, raw, e)),
        _ => Ok(default),
    }
}
