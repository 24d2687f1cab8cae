//! Connection configuration
//!
//! One [`ConnectionConfig`] describes one server endpoint plus how to
//! secure and authenticate against it. It is built up front and moved
//! into a session, after which it never changes.

use crate::auth::Credential;
use crate::error::{Error, Result};
use crate::security::{CertificatePolicy, SecurityMode, TransportSecurityNegotiator};
use std::env;
use std::time::Duration;

/// Per-command and per-connect timeout when none is configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Settings for a single SMTP or IMAP connection.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub host: String,
    pub port: u16,
    /// Login name; also the default sender address for SMTP.
    pub username: String,
    pub security_mode: SecurityMode,
    pub certificate_policy: CertificatePolicy,
    /// `None` skips authentication.
    pub credential: Option<Credential>,
    pub timeout: Duration,
    /// Name announced in EHLO; defaults to `localhost`.
    pub ehlo_hostname: Option<String>,
    /// Whether `Auto` may continue in plain text when STARTTLS is missing.
    pub allow_plaintext_fallback: bool,
    pub reply_to: Option<String>,
}

impl ConnectionConfig {
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16, username: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            username: username.into(),
            security_mode: SecurityMode::Auto,
            certificate_policy: CertificatePolicy::Strict,
            credential: None,
            timeout: DEFAULT_TIMEOUT,
            ehlo_hostname: None,
            allow_plaintext_fallback: true,
            reply_to: None,
        }
    }

    #[must_use]
    pub fn with_password(mut self, secret: impl Into<String>) -> Self {
        self.credential = Some(Credential::password(secret));
        self
    }

    #[must_use]
    pub fn with_token(mut self, bearer_token: impl Into<String>) -> Self {
        self.credential = Some(Credential::token(bearer_token));
        self
    }

    #[must_use]
    pub fn with_credential(mut self, credential: Option<Credential>) -> Self {
        self.credential = credential;
        self
    }

    /// Derive a config with a different security mode.
    #[must_use]
    pub const fn with_security_mode(mut self, mode: SecurityMode) -> Self {
        self.security_mode = mode;
        self
    }

    #[must_use]
    pub const fn with_allow_invalid_certs(mut self, allow: bool) -> Self {
        self.certificate_policy = CertificatePolicy::from_allow_invalid(allow);
        self
    }

    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_ehlo_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.ehlo_hostname = Some(hostname.into());
        self
    }

    #[must_use]
    pub const fn with_plaintext_fallback(mut self, allow: bool) -> Self {
        self.allow_plaintext_fallback = allow;
        self
    }

    #[must_use]
    pub fn with_reply_to(mut self, reply_to: impl Into<String>) -> Self {
        self.reply_to = Some(reply_to.into());
        self
    }

    /// The negotiator this config asks for.
    #[must_use]
    pub const fn negotiator(&self) -> TransportSecurityNegotiator {
        TransportSecurityNegotiator::new(self.security_mode, self.certificate_policy)
            .with_plaintext_fallback(self.allow_plaintext_fallback)
    }

    /// Gmail SMTP over implicit TLS.
    #[must_use]
    pub fn gmail_smtp(username: impl Into<String>) -> Self {
        Self::new("smtp.gmail.com", 465, username).with_security_mode(SecurityMode::Ssl)
    }

    /// Office 365 SMTP submission with mandatory STARTTLS.
    #[must_use]
    pub fn exchange_smtp(username: impl Into<String>) -> Self {
        Self::new("smtp.office365.com", 587, username).with_security_mode(SecurityMode::StartTls)
    }

    /// Gmail IMAP over implicit TLS.
    #[must_use]
    pub fn gmail_imap(username: impl Into<String>) -> Self {
        Self::new("imap.gmail.com", 993, username).with_security_mode(SecurityMode::Ssl)
    }

    /// Load SMTP settings from the environment.
    ///
    /// Reads from `.env` file if present. Required variables:
    /// - `EMAIL`
    /// - `SMTP_SERVER`
    ///
    /// Optional (with defaults):
    /// - `EMAIL_PASSWORD` or `EMAIL_OAUTH2_TOKEN` (not both)
    /// - `SMTP_PORT` (default: `587`)
    /// - `EMAIL_SECURITY` (default: `auto`)
    /// - `EMAIL_ALLOW_INVALID_CERTS` (default: `false`)
    /// - `EMAIL_EHLO`, `EMAIL_REPLY_TO`
    /// - `SMTP_TIMEOUT` in seconds (default: `30`)
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for missing or malformed variables and
    /// [`Error::Credential`] when both a password and a token are set.
    pub fn smtp_from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::smtp_from_lookup(|key| env::var(key).ok())
    }

    /// Load IMAP settings from the environment.
    ///
    /// Reads from `.env` file if present. Required variables:
    /// - `IMAP_EMAIL`
    /// - `IMAP_SERVER`
    ///
    /// Optional (with defaults):
    /// - `IMAP_PASSWORD` or `IMAP_OAUTH2_TOKEN` (not both)
    /// - `IMAP_PORT` (default: `993`)
    /// - `IMAP_SECURITY` (default: `auto`)
    /// - `IMAP_ALLOW_INVALID_CERTS` (default: `false`)
    /// - `IMAP_TIMEOUT` in seconds (default: `30`)
    ///
    /// # Errors
    ///
    /// Same as [`ConnectionConfig::smtp_from_env`].
    pub fn imap_from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::imap_from_lookup(|key| env::var(key).ok())
    }

    /// [`ConnectionConfig::smtp_from_env`] over an arbitrary key/value
    /// source.
    ///
    /// # Errors
    ///
    /// Same as [`ConnectionConfig::smtp_from_env`].
    pub fn smtp_from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let keys = EnvKeys {
            user: "EMAIL",
            host: "SMTP_SERVER",
            port: "SMTP_PORT",
            default_port: 587,
            password: "EMAIL_PASSWORD",
            token: "EMAIL_OAUTH2_TOKEN",
            security: "EMAIL_SECURITY",
            allow_invalid: "EMAIL_ALLOW_INVALID_CERTS",
            timeout: "SMTP_TIMEOUT",
        };
        let mut config = keys.load(&lookup)?;
        config.ehlo_hostname = lookup("EMAIL_EHLO").filter(|v| !v.is_empty());
        config.reply_to = lookup("EMAIL_REPLY_TO").filter(|v| !v.is_empty());
        Ok(config)
    }

    /// [`ConnectionConfig::imap_from_env`] over an arbitrary key/value
    /// source.
    ///
    /// # Errors
    ///
    /// Same as [`ConnectionConfig::smtp_from_env`].
    pub fn imap_from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        EnvKeys {
            user: "IMAP_EMAIL",
            host: "IMAP_SERVER",
            port: "IMAP_PORT",
            default_port: 993,
            password: "IMAP_PASSWORD",
            token: "IMAP_OAUTH2_TOKEN",
            security: "IMAP_SECURITY",
            allow_invalid: "IMAP_ALLOW_INVALID_CERTS",
            timeout: "IMAP_TIMEOUT",
        }
        .load(&lookup)
    }
}

struct EnvKeys {
    user: &'static str,
    host: &'static str,
    port: &'static str,
    default_port: u16,
    password: &'static str,
    token: &'static str,
    security: &'static str,
    allow_invalid: &'static str,
    timeout: &'static str,
}

impl EnvKeys {
    fn load<F>(&self, lookup: &F) -> Result<ConnectionConfig>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.is_empty())
                .ok_or_else(|| Error::Config(format!("{key} not set")))
        };

        let username = required(self.user)?;
        let host = required(self.host)?;
        let port = match lookup(self.port).filter(|v| !v.is_empty()) {
            Some(v) => v
                .parse()
                .map_err(|e| Error::Config(format!("Invalid {}: {e}", self.port)))?,
            None => self.default_port,
        };
        let security_mode = match lookup(self.security).filter(|v| !v.is_empty()) {
            Some(v) => v.parse()?,
            None => SecurityMode::Auto,
        };
        let timeout = match lookup(self.timeout).filter(|v| !v.is_empty()) {
            Some(v) => Duration::from_secs(
                v.parse()
                    .map_err(|e| Error::Config(format!("Invalid {}: {e}", self.timeout)))?,
            ),
            None => DEFAULT_TIMEOUT,
        };
        let allow_invalid = lookup(self.allow_invalid).is_some_and(|v| parse_bool(&v));
        let credential = Credential::from_parts(lookup(self.password), lookup(self.token))?;

        Ok(ConnectionConfig::new(host, port, username)
            .with_security_mode(security_mode)
            .with_allow_invalid_certs(allow_invalid)
            .with_timeout(timeout)
            .with_credential(credential))
    }
}

fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
