use figment::{
    providers::{Env, Format, Json, Serialized, Toml},
    Figment,
};
use log::LevelFilter;
use serde::{Deserialize, Deserializer, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;
use crate::executor::HealthWait;
use crate::selector::LabelSelector;

/// Raw settings as read from files and the environment.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub interval: String,
    pub cleanup: bool,
    pub label_enable: bool,
    pub label: String,
    pub rolling_label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub docker_config: Option<PathBuf>,
    pub health_timeout: String,
    pub log_level: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub telegram_api_token: Option<String>,
    /// Chat ids are numeric, and the env provider hands them over as
    /// integers.
    #[serde(
        default,
        deserialize_with = "string_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub telegram_chat_id: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            interval: "30s".into(),
            cleanup: false,
            label_enable: false,
            label: "devem.tech/up-to-date.enabled=true".into(),
            rolling_label: "devem.tech/up-to-date.rolling=true".into(),
            docker_config: None,
            health_timeout: "30s".into(),
            log_level: "info".into(),
            telegram_api_token: None,
            telegram_chat_id: None,
        }
    }
}

impl Config {
    /// Defaults, then `up-to-date.toml`, `up-to-date.json`, then
    /// `UP_TO_DATE_*` environment variables.
    pub fn figment() -> Figment {
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file("up-to-date.toml"))
            .merge(Json::file("up-to-date.json"))
            .merge(Env::prefixed("UP_TO_DATE_"))
    }

    pub fn load() -> Result<Self, ConfigError> {
        Self::from_figment(Self::figment())
    }

    pub fn from_figment(figment: Figment) -> Result<Self, ConfigError> {
        let mut config: Config = figment
            .extract()
            .map_err(|e| ConfigError::Load(Box::new(e)))?;

        // The conventional Telegram variables are honoured too.
        if config.telegram_api_token.is_none() {
            config.telegram_api_token = non_empty_env("TELEGRAM_API_TOKEN");
        }
        if config.telegram_chat_id.is_none() {
            config.telegram_chat_id = non_empty_env("TELEGRAM_CHAT_ID");
        }
        Ok(config)
    }

    pub fn validate(&self) -> Result<Settings, ConfigError> {
        let interval = parse_duration(&self.interval)?;
        if interval.is_zero() {
            return Err(ConfigError::NonPositive("interval"));
        }
        let health_timeout = parse_duration(&self.health_timeout)?;
        if health_timeout.is_zero() {
            return Err(ConfigError::NonPositive("health_timeout"));
        }

        Ok(Settings {
            interval,
            cleanup: self.cleanup,
            label_enable: self.label_enable,
            label: self.label.parse()?,
            rolling_label: self.rolling_label.parse()?,
            docker_config: self.docker_config.clone(),
            health: HealthWait {
                timeout: health_timeout,
                ..HealthWait::default()
            },
            log_level: parse_log_level(&self.log_level)?,
            telegram_api_token: self.telegram_api_token.clone().filter(|t| !t.trim().is_empty()),
            telegram_chat_id: self.telegram_chat_id.clone(),
        })
    }
}

/// Validated settings, threaded explicitly through the scheduler.
#[derive(Debug, Clone)]
pub struct Settings {
    pub interval: Duration,
    pub cleanup: bool,
    pub label_enable: bool,
    pub label: LabelSelector,
    pub rolling_label: LabelSelector,
    pub docker_config: Option<PathBuf>,
    pub health: HealthWait,
    pub log_level: LevelFilter,
    pub telegram_api_token: Option<String>,
    pub telegram_chat_id: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            cleanup: false,
            label_enable: false,
            label: LabelSelector::new("devem.tech/up-to-date.enabled", Some("true".into())),
            rolling_label: LabelSelector::new("devem.tech/up-to-date.rolling", Some("true".into())),
            docker_config: None,
            health: HealthWait::default(),
            log_level: LevelFilter::Info,
            telegram_api_token: None,
            telegram_chat_id: None,
        }
    }
}

fn string_or_number<'de, D>(de: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Signed(i64),
        Unsigned(u64),
    }

    Ok(Option::<Raw>::deserialize(de)?.map(|raw| match raw {
        Raw::Text(s) => s,
        Raw::Signed(n) => n.to_string(),
        Raw::Unsigned(n) => n.to_string(),
    }))
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Longest accepted duration: one year.
pub const MAX_DURATION: Duration = Duration::from_secs(365 * 24 * 3600);

/// Accepts `<n>ms`, `<n>s`, `<n>m` and `<n>h`, up to [`MAX_DURATION`].
pub fn parse_duration(s: &str) -> Result<Duration, ConfigError> {
    let s = s.trim();
    let invalid = || ConfigError::InvalidDuration(s.to_string());
    let (digits, unit) = s
        .find(|c: char| !c.is_ascii_digit())
        .map(|i| s.split_at(i))
        .ok_or_else(invalid)?;
    let n: u64 = digits.parse().map_err(|_| invalid())?;
    let duration = match unit {
        "ms" => Duration::from_millis(n),
        "s" => Duration::from_secs(n),
        "m" => Duration::from_secs(n.checked_mul(60).ok_or_else(invalid)?),
        "h" => Duration::from_secs(n.checked_mul(3600).ok_or_else(invalid)?),
        _ => return Err(invalid()),
    };
    if duration > MAX_DURATION {
        return Err(invalid());
    }
    Ok(duration)
}

pub fn parse_log_level(s: &str) -> Result<LevelFilter, ConfigError> {
    match s.trim().to_lowercase().as_str() {
        "debug" => Ok(LevelFilter::Debug),
        "info" => Ok(LevelFilter::Info),
        "warn" | "warning" => Ok(LevelFilter::Warn),
        "error" => Ok(LevelFilter::Error),
        _ => Err(ConfigError::InvalidLogLevel(s.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Figment {
        Figment::from(Serialized::defaults(Config::default()))
    }

    #[test]
    fn defaults_validate() {
        let settings = Config::default().validate().unwrap();
        assert_eq!(settings.interval, Duration::from_secs(30));
        assert_eq!(settings.health, HealthWait::default());
        assert_eq!(settings.label.to_string(), "devem.tech/up-to-date.enabled=true");
        assert!(!settings.cleanup);
        assert_eq!(settings.log_level, LevelFilter::Info);
    }

    #[test]
    fn toml_overrides_defaults() {
        let config = Config::from_figment(base().merge(Toml::string(
            r#"
            interval = "5m"
            cleanup = true
            label_enable = true
            label = "updates"
            rolling_label = "updates.rolling=yes"
            docker_config = "/config.json"
            log_level = "debug"
            "#,
        )))
        .unwrap();
        let settings = config.validate().unwrap();
        assert_eq!(settings.interval, Duration::from_secs(300));
        assert!(settings.cleanup && settings.label_enable);
        assert_eq!(settings.label.to_string(), "updates");
        assert_eq!(settings.rolling_label.to_string(), "updates.rolling=yes");
        assert_eq!(settings.docker_config, Some(PathBuf::from("/config.json")));
        assert_eq!(settings.log_level, LevelFilter::Debug);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let bad = |toml: &str| {
            Config::from_figment(base().merge(Toml::string(toml)))
                .and_then(|c| c.validate())
                .unwrap_err()
        };
        assert!(matches!(bad(r#"interval = "0s""#), ConfigError::NonPositive("interval")));
        assert!(matches!(bad(r#"interval = "soon""#), ConfigError::InvalidDuration(_)));
        assert!(matches!(bad(r#"label = "=x""#), ConfigError::InvalidSelector(_)));
        assert!(matches!(bad(r#"log_level = "loud""#), ConfigError::InvalidLogLevel(_)));
        assert!(matches!(bad(r#"cleanup = "maybe""#), ConfigError::Load(_)));
    }

    #[test]
    fn duration_units() {
        assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
        assert_eq!(parse_duration(" 45s ").unwrap(), Duration::from_secs(45));
        assert_eq!(parse_duration("2h").unwrap(), Duration::from_secs(7200));
        assert!(parse_duration("30").is_err());
        assert!(parse_duration("s").is_err());
        assert!(parse_duration("1.5m").is_err());
    }

    #[test]
    fn oversized_durations_are_rejected() {
        assert_eq!(parse_duration("8760h").unwrap(), MAX_DURATION);
        for s in ["8761h", "6000000000000000h", "400000000000000000m", "99999999999999999999s"] {
            assert!(
                matches!(parse_duration(s), Err(ConfigError::InvalidDuration(_))),
                "{s} should be rejected"
            );
        }
        let config = Config {
            interval: "6000000000000000h".into(),
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::InvalidDuration(_))));
    }

    #[test]
    fn numeric_chat_id_from_env() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("UP_TO_DATE_TELEGRAM_API_TOKEN", "123:abc");
            jail.set_env("UP_TO_DATE_TELEGRAM_CHAT_ID", "-1001234567890");
            let settings = Config::load()
                .and_then(|c| c.validate())
                .map_err(|e| e.to_string())?;
            assert_eq!(settings.telegram_chat_id.as_deref(), Some("-1001234567890"));
            assert_eq!(settings.telegram_api_token.as_deref(), Some("123:abc"));
            Ok(())
        });
    }

    #[test]
    fn chat_id_accepts_string_and_integer_in_files() {
        let config = Config::from_figment(base().merge(Toml::string("telegram_chat_id = 42")))
            .unwrap();
        assert_eq!(config.telegram_chat_id.as_deref(), Some("42"));

        let config =
            Config::from_figment(base().merge(Json::string(r#"{"telegram_chat_id": "@channel"}"#)))
                .unwrap();
        assert_eq!(config.telegram_chat_id.as_deref(), Some("@channel"));
    }
}
