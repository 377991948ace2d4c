use chrono::NaiveTime;
use std::env;
use std::ops::RangeInclusive;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

// Главная структура конфигурации - контейнер для всех настроек
#[derive(Debug, Clone)]
pub struct Config {
    pub app: AppConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub jwt: JwtConfig,
    pub security: SecurityConfig,
    pub booking: BookingConfig,
    pub reminders: ReminderConfig,
}

// Настройки приложения
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub environment: String,
    pub rust_log: String,
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" | "pretty" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            _ => Err(()),
        }
    }
}

// Настройки базы данных
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub pool_size: u32,
}

// Настройки Redis. Без REDIS_URL кеш поиска отключён
#[derive(Debug, Clone)]
pub struct RedisConfig {
    pub url: Option<String>,
    pub search_ttl_seconds: u64,
}

// Настройки JWT
#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub secret: String,
    pub expires_in_hours: i64,
}

#[derive(Debug, Clone)]
pub struct SecurityConfig {
    pub bcrypt_cost: u32,
}

// Настройки бронирования
#[derive(Debug, Clone)]
pub struct BookingConfig {
    pub timeout_ms: u64,
}

impl BookingConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

// Настройки ежедневных напоминаний
#[derive(Debug, Clone)]
pub struct ReminderConfig {
    pub enabled: bool,
    /// Время запуска (UTC)
    pub run_at: NaiveTime,
    /// За сколько дней до события отправлять напоминание
    pub lead_days: i64,
}

/// Срок жизни токена: от часа до года.
pub const JWT_EXPIRES_IN_HOURS_RANGE: RangeInclusive<i64> = 1..=8760;
pub const REMINDER_LEAD_DAYS_RANGE: RangeInclusive<i64> = 0..=365;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{key} has invalid value {value:?}")]
    Invalid { key: &'static str, value: String },
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Собирает конфигурацию из произвольного источника ключей (env, map в тестах).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &'static str| lookup(key).ok_or(ConfigError::Missing(key));
        let or_default = |key: &'static str, default: &str| {
            lookup(key).unwrap_or_else(|| default.to_string())
        };

        Ok(Config {
            app: AppConfig {
                host: or_default("HOST", "0.0.0.0"),
                port: parse("PORT", or_default("PORT", "8000"))?,
                environment: or_default("ENVIRONMENT", "development"),
                rust_log: or_default("RUST_LOG", "ticket_booking=debug,tower_http=debug"),
                log_format: parse("LOG_FORMAT", or_default("LOG_FORMAT", "text"))?,
            },
            database: DatabaseConfig {
                url: required("DATABASE_URL")?,
                pool_size: parse("DB_POOL_SIZE", or_default("DB_POOL_SIZE", "20"))?,
            },
            redis: RedisConfig {
                url: lookup("REDIS_URL").filter(|url| !url.trim().is_empty()),
                search_ttl_seconds: parse(
                    "SEARCH_CACHE_TTL_SECONDS",
                    or_default("SEARCH_CACHE_TTL_SECONDS", "60"),
                )?,
            },
            jwt: JwtConfig {
                secret: required("JWT_SECRET")?,
                expires_in_hours: parse_in_range(
                    "JWT_EXPIRES_IN_HOURS",
                    or_default("JWT_EXPIRES_IN_HOURS", "1"),
                    JWT_EXPIRES_IN_HOURS_RANGE,
                )?,
            },
            security: SecurityConfig {
                bcrypt_cost: parse("BCRYPT_COST", or_default("BCRYPT_COST", "10"))?,
            },
            booking: BookingConfig {
                timeout_ms: parse("BOOKING_TIMEOUT_MS", or_default("BOOKING_TIMEOUT_MS", "5000"))?,
            },
            reminders: ReminderConfig {
                enabled: parse("ENABLE_REMINDERS", or_default("ENABLE_REMINDERS", "true"))?,
                run_at: parse_time("REMINDER_RUN_AT", or_default("REMINDER_RUN_AT", "00:00"))?,
                lead_days: parse_in_range(
                    "REMINDER_LEAD_DAYS",
                    or_default("REMINDER_LEAD_DAYS", "1"),
                    REMINDER_LEAD_DAYS_RANGE,
                )?,
            },
        })
    }
}

fn parse<T: FromStr>(key: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Invalid { key, value })
}

// Значения вне диапазона отвергаются здесь, до chrono::Duration
fn parse_in_range<T>(key: &'static str, value: String, range: RangeInclusive<T>) -> Result<T, ConfigError>
where
    T: FromStr + PartialOrd,
{
    let parsed: T = parse(key, value.clone())?;
    if range.contains(&parsed) {
        Ok(parsed)
    } else {
        Err(ConfigError::Invalid { key, value })
    }
}

fn parse_time(key: &'static str, value: String) -> Result<NaiveTime, ConfigError> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(value.trim(), "%H:%M:%S"))
        .map_err(|_| ConfigError::Invalid { key, value })
}
