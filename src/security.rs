//! Transport security negotiation
//!
//! Decides, once per connection attempt, how a transport is secured:
//! implicit TLS at connect time, an in-band STARTTLS upgrade, or plain
//! text. The decision has two steps because `AUTO` and `STARTTLS` depend
//! on what the server advertises after the greeting:
//!
//! 1. [`TransportSecurityNegotiator::resolve`] picks the planned scheme
//!    from the port and mode before connecting.
//! 2. [`TransportSecurityNegotiator::settle`] confirms or downgrades the
//!    plan once the server's capabilities are known.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::warn;

/// Well-known ports that speak TLS from the first byte (SMTPS, IMAPS).
pub const IMPLICIT_TLS_PORTS: [u16; 2] = [465, 993];

/// Requested security behavior for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecurityMode {
    /// Implicit TLS on 465/993, otherwise STARTTLS when advertised,
    /// otherwise plain text (see [`ConnectionConfig::with_plaintext_fallback`](crate::ConnectionConfig::with_plaintext_fallback)).
    #[default]
    Auto,
    /// Require an in-band upgrade.
    StartTls,
    /// Implicit TLS on connect.
    Ssl,
    /// Plain text, only for trusted networks.
    None,
}

impl SecurityMode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::StartTls => "starttls",
            Self::Ssl => "ssl",
            Self::None => "none",
        }
    }
}

impl fmt::Display for SecurityMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SecurityMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "starttls" | "tls" => Ok(Self::StartTls),
            "ssl" | "implicit" => Ok(Self::Ssl),
            "none" | "plain" => Ok(Self::None),
            other => Err(Error::Config(format!("Unknown security mode: {other}"))),
        }
    }
}

/// How the bytes on the wire are protected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Scheme {
    Plain,
    ImplicitTls,
    UpgradedTls,
}

impl Scheme {
    #[must_use]
    pub const fn is_encrypted(self) -> bool {
        !matches!(self, Self::Plain)
    }
}

/// Peer certificate validation policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CertificatePolicy {
    /// Validate the chain against the web PKI roots and check the hostname.
    #[default]
    Strict,
    /// Accept any certificate. Only set through `allow_invalid_certs`.
    Permissive,
}

impl CertificatePolicy {
    #[must_use]
    pub const fn from_allow_invalid(allow_invalid_certs: bool) -> Self {
        if allow_invalid_certs {
            Self::Permissive
        } else {
            Self::Strict
        }
    }
}

/// The concrete security of one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct EffectiveSecurity {
    pub scheme: Scheme,
    pub certificate_policy: CertificatePolicy,
}

/// Resolve the planned security for `port` under `mode` with the default
/// strict certificate policy.
///
/// `Auto` on a non-implicit port plans an upgrade; whether it happens is
/// decided by [`TransportSecurityNegotiator::settle`].
#[must_use]
pub fn resolve(port: u16, mode: SecurityMode) -> EffectiveSecurity {
    TransportSecurityNegotiator::new(mode, CertificatePolicy::Strict).resolve(port)
}

/// Per-connection security decision maker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportSecurityNegotiator {
    mode: SecurityMode,
    certificate_policy: CertificatePolicy,
    allow_plaintext_fallback: bool,
}

impl TransportSecurityNegotiator {
    /// A negotiator with the plaintext fallback enabled for `Auto`.
    #[must_use]
    pub const fn new(mode: SecurityMode, certificate_policy: CertificatePolicy) -> Self {
        Self {
            mode,
            certificate_policy,
            allow_plaintext_fallback: true,
        }
    }

    /// Toggle the `Auto` downgrade to plain text when the server does not
    /// offer STARTTLS. Disabled, `Auto` fails like `StartTls` does.
    #[must_use]
    pub const fn with_plaintext_fallback(mut self, allow: bool) -> Self {
        self.allow_plaintext_fallback = allow;
        self
    }

    #[must_use]
    pub const fn mode(&self) -> SecurityMode {
        self.mode
    }

    /// Plan the scheme for a connection to `port`.
    #[must_use]
    pub fn resolve(&self, port: u16) -> EffectiveSecurity {
        let scheme = match self.mode {
            SecurityMode::Ssl => Scheme::ImplicitTls,
            SecurityMode::StartTls => Scheme::UpgradedTls,
            SecurityMode::None => Scheme::Plain,
            SecurityMode::Auto if IMPLICIT_TLS_PORTS.contains(&port) => Scheme::ImplicitTls,
            SecurityMode::Auto => Scheme::UpgradedTls,
        };
        EffectiveSecurity {
            scheme,
            certificate_policy: self.certificate_policy,
        }
    }

    /// Confirm a planned scheme once the server's upgrade capability is
    /// known.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SecurityUnavailable`] when an upgrade is required
    /// but not advertised.
    pub fn settle(
        &self,
        planned: EffectiveSecurity,
        upgrade_advertised: bool,
    ) -> Result<EffectiveSecurity> {
        if planned.scheme != Scheme::UpgradedTls || upgrade_advertised {
            return Ok(planned);
        }

        if self.mode == SecurityMode::Auto && self.allow_plaintext_fallback {
            warn!("Server does not offer STARTTLS, continuing in plain text");
            return Ok(EffectiveSecurity {
                scheme: Scheme::Plain,
                ..planned
            });
        }

        Err(Error::SecurityUnavailable(format!(
            "server does not advertise STARTTLS (mode {})",
            self.mode
        )))
    }
}
