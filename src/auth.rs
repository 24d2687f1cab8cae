//! Credential resolution for SMTP AUTH and IMAP login
//!
//! A [`Credential`] is either a password or an OAuth2 bearer token, never
//! both. [`materialize`] turns it into the protocol-specific
//! [`AuthPayload`] once the server's mechanisms are known.

use crate::error::{Error, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use std::fmt;

/// Secret used to authenticate a session.
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    Password { secret: String },
    Token { bearer_token: String },
}

impl Credential {
    #[must_use]
    pub fn password(secret: impl Into<String>) -> Self {
        Self::Password {
            secret: secret.into(),
        }
    }

    #[must_use]
    pub fn token(bearer_token: impl Into<String>) -> Self {
        Self::Token {
            bearer_token: bearer_token.into(),
        }
    }

    /// Build a credential from optional loose parts, as found in
    /// environment variables or CLI flags.
    ///
    /// Empty strings count as unset.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Credential`] when both a password and a token are
    /// supplied.
    pub fn from_parts(password: Option<String>, token: Option<String>) -> Result<Option<Self>> {
        let password = password.filter(|p| !p.is_empty());
        let token = token.filter(|t| !t.is_empty());
        match (password, token) {
            (Some(_), Some(_)) => Err(Error::Credential(
                "both a password and an OAuth2 token are configured".into(),
            )),
            (Some(secret), None) => Ok(Some(Self::Password { secret })),
            (None, Some(bearer_token)) => Ok(Some(Self::Token { bearer_token })),
            (None, None) => Ok(None),
        }
    }

    #[must_use]
    pub const fn is_token(&self) -> bool {
        matches!(self, Self::Token { .. })
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Password { .. } => f.write_str("Password { secret: <redacted> }"),
            Self::Token { .. } => f.write_str("Token { bearer_token: <redacted> }"),
        }
    }
}

/// The protocol a payload is materialized for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Smtp,
    Imap,
}

/// SASL mechanisms the server advertised.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Mechanisms {
    pub plain: bool,
    pub login: bool,
    pub xoauth2: bool,
}

impl Mechanisms {
    /// Collect mechanisms from capability words such as `AUTH=PLAIN`
    /// (IMAP) or the arguments of an EHLO `AUTH` line (SMTP).
    pub fn from_words<'a>(words: impl IntoIterator<Item = &'a str>) -> Self {
        let mut mechs = Self::default();
        for word in words {
            let name = word.trim();
            let name = name
                .get(..5)
                .filter(|p| p.eq_ignore_ascii_case("AUTH="))
                .map_or(name, |_| &name[5..]);
            if name.eq_ignore_ascii_case("PLAIN") {
                mechs.plain = true;
            } else if name.eq_ignore_ascii_case("LOGIN") {
                mechs.login = true;
            } else if name.eq_ignore_ascii_case("XOAUTH2") {
                mechs.xoauth2 = true;
            }
        }
        mechs
    }
}

/// What a session sends to authenticate.
#[derive(Clone, PartialEq, Eq)]
pub enum AuthPayload {
    /// SMTP `AUTH PLAIN` initial response.
    SmtpPlain { user: String, secret: String },
    /// SMTP `AUTH LOGIN` two-step exchange.
    SmtpLogin { user: String, secret: String },
    /// IMAP `LOGIN user password`.
    ImapLogin { user: String, secret: String },
    /// XOAUTH2 for either protocol; only the command wrapper differs.
    XOAuth2 { user: String, bearer_token: String },
}

impl AuthPayload {
    /// Check that this payload can authenticate a `protocol` session.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] for an SMTP payload offered to IMAP
    /// or the reverse.
    pub fn ensure_for(&self, protocol: Protocol) -> Result<()> {
        let fits = match self {
            Self::SmtpPlain { .. } | Self::SmtpLogin { .. } => protocol == Protocol::Smtp,
            Self::ImapLogin { .. } => protocol == Protocol::Imap,
            Self::XOAuth2 { .. } => true,
        };
        if fits {
            Ok(())
        } else {
            Err(Error::InvalidState(format!(
                "{self:?} cannot authenticate a {protocol:?} session"
            )))
        }
    }

    /// SASL mechanism name, `None` for IMAP LOGIN.
    #[must_use]
    pub const fn mechanism(&self) -> Option<&'static str> {
        match self {
            Self::SmtpPlain { .. } => Some("PLAIN"),
            Self::SmtpLogin { .. } => Some("LOGIN"),
            Self::ImapLogin { .. } => None,
            Self::XOAuth2 { .. } => Some("XOAUTH2"),
        }
    }
}

impl fmt::Debug for AuthPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let user = match self {
            Self::SmtpPlain { user, .. }
            | Self::SmtpLogin { user, .. }
            | Self::ImapLogin { user, .. }
            | Self::XOAuth2 { user, .. } => user,
        };
        f.debug_struct("AuthPayload")
            .field("mechanism", &self.mechanism().unwrap_or("LOGIN"))
            .field("user", user)
            .finish_non_exhaustive()
    }
}

/// Resolve `credential` into the payload a `protocol` session sends.
///
/// # Errors
///
/// Returns [`Error::Credential`] when a token is supplied but the server
/// does not advertise XOAUTH2.
pub fn materialize(
    credential: &Credential,
    user: &str,
    protocol: Protocol,
    advertised: &Mechanisms,
) -> Result<AuthPayload> {
    let user = user.to_string();
    match (credential, protocol) {
        (Credential::Token { bearer_token }, _) => {
            if !advertised.xoauth2 {
                return Err(Error::Credential(
                    "server does not advertise XOAUTH2".into(),
                ));
            }
            Ok(AuthPayload::XOAuth2 {
                user,
                bearer_token: bearer_token.clone(),
            })
        }
        (Credential::Password { secret }, Protocol::Smtp) => {
            let secret = secret.clone();
            // PLAIN is the default; LOGIN only when it is all the server offers.
            if advertised.login && !advertised.plain {
                Ok(AuthPayload::SmtpLogin { user, secret })
            } else {
                Ok(AuthPayload::SmtpPlain { user, secret })
            }
        }
        (Credential::Password { secret }, Protocol::Imap) => Ok(AuthPayload::ImapLogin {
            user,
            secret: secret.clone(),
        }),
    }
}

/// The XOAUTH2 initial client response before base64 encoding.
#[must_use]
pub fn xoauth2_string(user: &str, bearer_token: &str) -> String {
    format!("user={user}\x01auth=Bearer {bearer_token}\x01\x01")
}

/// Base64 of [`xoauth2_string`], the form SMTP puts on the wire.
#[must_use]
pub fn xoauth2_base64(user: &str, bearer_token: &str) -> String {
    STANDARD.encode(xoauth2_string(user, bearer_token))
}

/// Base64 `\0user\0secret` for `AUTH PLAIN`.
#[must_use]
pub fn plain_base64(user: &str, secret: &str) -> String {
    STANDARD.encode(format!("\0{user}\0{secret}"))
}

#[must_use]
pub fn base64(value: &str) -> String {
    STANDARD.encode(value)
}
