use std::{env, net::SocketAddr};

use thiserror::Error;

use crate::models::{token::MAX_EMAIL_VERIFICATION_EXPIRES_HOURS, TokenSettings};

pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:3000";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{name} is invalid: {reason}")]
    Invalid { name: &'static str, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: SocketAddr,
    pub tokens: TokenSettings,
    pub log_format: LogFormat,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok(); // Load .env file
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the config from any variable source; `from_env` passes the
    /// process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let database_url = lookup("DATABASE_URL")
            .filter(|url| !url.trim().is_empty())
            .ok_or(ConfigError::Missing("DATABASE_URL"))?;

        let bind_addr = lookup("BIND_ADDR")
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string())
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::Invalid {
                name: "BIND_ADDR",
                reason: e.to_string(),
            })?;

        let mut tokens = TokenSettings::default();
        if let Some(raw) = lookup("EMAIL_VERIFICATION_TOKEN_EXPIRES_HOURS") {
            tokens.email_verification_expires_hours = parse_positive_hours(&raw)?;
        }

        let log_format = match lookup("LOG_FORMAT").as_deref().map(str::trim) {
            None | Some("") | Some("pretty") => LogFormat::Pretty,
            Some("json") => LogFormat::Json,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    name: "LOG_FORMAT",
                    reason: format!("expected `pretty` or `json`, got `{other}`"),
                })
            }
        };

        Ok(Config {
            database_url,
            bind_addr,
            tokens,
            log_format,
        })
    }
}

fn parse_positive_hours(raw: &str) -> Result<i64, ConfigError> {
    let invalid = |reason: String| ConfigError::Invalid {
        name: "EMAIL_VERIFICATION_TOKEN_EXPIRES_HOURS",
        reason,
    };
    let hours: i64 = raw
        .trim()
        .parse()
        .map_err(|_| invalid(format!("`{raw}` is not a whole number of hours")))?;
    if hours <= 0 {
        return Err(invalid("must be at least 1 hour".into()));
    }
    if hours > MAX_EMAIL_VERIFICATION_EXPIRES_HOURS {
        return Err(invalid(format!(
            "must be at most {MAX_EMAIL_VERIFICATION_EXPIRES_HOURS} hours"
        )));
    }
    Ok(hours)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults() {
        let config = load(&[("DATABASE_URL", "postgres://localhost/accounts")]).unwrap();
        assert_eq!(config.bind_addr, DEFAULT_BIND_ADDR.parse().unwrap());
        assert_eq!(config.tokens.email_verification_expires_hours, 24);
        assert_eq!(config.log_format, LogFormat::Pretty);
    }

    #[test]
    fn database_url_is_required() {
        assert_eq!(load(&[]).unwrap_err(), ConfigError::Missing("DATABASE_URL"));
        assert_eq!(
            load(&[("DATABASE_URL", "  ")]).unwrap_err(),
            ConfigError::Missing("DATABASE_URL")
        );
    }

    #[test]
    fn email_verification_window_is_configurable() {
        let config = load(&[
            ("DATABASE_URL", "postgres://localhost/accounts"),
            ("EMAIL_VERIFICATION_TOKEN_EXPIRES_HOURS", "48"),
        ])
        .unwrap();
        assert_eq!(config.tokens.email_verification_expires_hours, 48);
    }

    #[test]
    fn bad_values_are_reported() {
        for (name, value) in [
            ("EMAIL_VERIFICATION_TOKEN_EXPIRES_HOURS", "0"),
            ("EMAIL_VERIFICATION_TOKEN_EXPIRES_HOURS", "-3"),
            ("EMAIL_VERIFICATION_TOKEN_EXPIRES_HOURS", "a day"),
            ("EMAIL_VERIFICATION_TOKEN_EXPIRES_HOURS", "100000000"),
            ("BIND_ADDR", "localhost"),
            ("LOG_FORMAT", "xml"),
        ] {
            let err = load(&[("DATABASE_URL", "postgres://localhost/accounts"), (name, value)])
                .unwrap_err();
            assert!(matches!(err, ConfigError::Invalid { name: n, .. } if n == name));
        }
    }

    #[test]
    fn email_verification_window_upper_bound() {
        let at_max = MAX_EMAIL_VERIFICATION_EXPIRES_HOURS.to_string();
        let config = load(&[
            ("DATABASE_URL", "postgres://localhost/accounts"),
            ("EMAIL_VERIFICATION_TOKEN_EXPIRES_HOURS", at_max.as_str()),
        ])
        .unwrap();
        assert_eq!(
            config.tokens.email_verification_expires_hours,
            MAX_EMAIL_VERIFICATION_EXPIRES_HOURS
        );

        let past_max = (MAX_EMAIL_VERIFICATION_EXPIRES_HOURS + 1).to_string();
        let err = load(&[
            ("DATABASE_URL", "postgres://localhost/accounts"),
            ("EMAIL_VERIFICATION_TOKEN_EXPIRES_HOURS", past_max.as_str()),
        ])
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid { name: "EMAIL_VERIFICATION_TOKEN_EXPIRES_HOURS", .. }
        ));
    }

    #[test]
    fn json_logs() {
        let config = load(&[
            ("DATABASE_URL", "postgres://localhost/accounts"),
            ("LOG_FORMAT", "json"),
        ])
        .unwrap();
        assert_eq!(config.log_format, LogFormat::Json);
    }
}
