use std::{env::var, fmt};
use thiserror::Error;

pub const REQUIRED_SMTP_VARS: [&str; 5] = [
    "SMTP_HOST",
    "SMTP_USER",
    "SMTP_PASSWORD",
    "SMTP_PORT",
    "SMTP_ENCRYPT",
];
pub const DEFAULT_HTTP_PORT: u16 = 8080;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("Missing required environment variables: {}", .0.join(", "))]
    Missing(Vec<String>),

    #[error("invalid {var} value: {value}")]
    InvalidPort { var: &'static str, value: String },
}

#[derive(Clone, PartialEq)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    /// Raw `SMTP_ENCRYPT` value, checked on every send.
    pub encrypt: String,
}

impl fmt::Debug for SmtpConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmtpConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("encrypt", &self.encrypt)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub smtp: SmtpConfig,
    pub http_port: u16,
    pub validate_addresses: bool,
}

impl Config {
    /// Reads the process environment, falling back to a `.env` file when any
    /// SMTP variable is absent.
    pub fn from_env() -> Result<Self, ConfigError> {
        let lookup = |key: &str| var(key).ok().filter(|value| !value.is_empty());

        if missing_vars(&lookup).is_empty() {
            return Self::from_lookup(lookup);
        }

        if let Err(error) = dotenv::dotenv() {
            tracing::warn!("Error loading .env file: {}", error);
        }

        Self::from_lookup(lookup)
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let present = |key: &str| lookup(key).filter(|value| !value.is_empty());

        let missing = missing_vars(&present);
        if !missing.is_empty() {
            return Err(ConfigError::Missing(missing));
        }

        let required = |key: &str| present(key).unwrap_or_default();

        let smtp = SmtpConfig {
            host: required("SMTP_HOST"),
            port: parse_port("SMTP_PORT", required("SMTP_PORT"))?,
            username: required("SMTP_USER"),
            password: required("SMTP_PASSWORD"),
            encrypt: required("SMTP_ENCRYPT"),
        };

        let http_port = match present("PORT") {
            Some(value) => parse_port("PORT", value)?,
            None => DEFAULT_HTTP_PORT,
        };

        let validate_addresses = present("VALIDATE_ADDRESSES")
            .map(|value| value.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        Ok(Self {
            smtp,
            http_port,
            validate_addresses,
        })
    }
}

fn missing_vars<F>(lookup: &F) -> Vec<String>
where
    F: Fn(&str) -> Option<String>,
{
    REQUIRED_SMTP_VARS
        .iter()
        .filter(|key| lookup(**key).is_none())
        .map(|key| key.to_string())
        .collect()
}

fn parse_port(key: &'static str, value: String) -> Result<u16, ConfigError> {
    value
        .trim()
        .parse::<u16>()
        .map_err(|_| ConfigError::InvalidPort { var: key, value })
}
