//! Error types for mailtoolbox

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// The requested transport security cannot be established.
    #[error("Security unavailable: {0}")]
    SecurityUnavailable(String),

    /// Bad, ambiguous or unsupported authentication.
    #[error("Credential error: {0}")]
    Credential(String),

    #[error("Mailbox not found: {0}")]
    MailboxNotFound(String),

    #[error("Message UID {0} not found")]
    MessageNotFound(u32),

    /// Every envelope recipient of a submission was refused.
    #[error("Recipient {recipient} rejected ({code}): {message}")]
    RecipientRejected {
        recipient: String,
        code: u16,
        message: String,
    },

    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    #[error("Template error: {0}")]
    Template(String),

    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    #[error("Invalid session state: {0}")]
    InvalidState(String),

    #[error("SMTP error {code}: {message}")]
    Smtp { code: u16, message: String },

    #[error("IMAP error: {0}")]
    Imap(String),

    #[error("Email parsing error: {0}")]
    Parse(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("Dispatch error: {0}")]
    Dispatch(String),
}

impl Error {
    /// Errors after which the session that produced them is closed.
    #[must_use]
    pub const fn is_session_fatal(&self) -> bool {
        matches!(
            self,
            Self::SecurityUnavailable(_)
                | Self::Credential(_)
                | Self::Timeout { .. }
                | Self::Io(_)
                | Self::Tls(_)
        )
    }

    /// Errors a caller may retry by opening a new session.
    ///
    /// Security and credential failures need reconfiguration first.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::Io(_) => true,
            Self::Smtp { code, .. } => *code >= 400 && *code < 500,
            _ => false,
        }
    }
}

impl Error {
    /// An equivalent error for reporting the same failure more than once.
    ///
    /// I/O errors keep their kind and message but lose their source.
    #[must_use]
    pub fn duplicate(&self) -> Self {
        match self {
            Self::SecurityUnavailable(m) => Self::SecurityUnavailable(m.clone()),
            Self::Credential(m) => Self::Credential(m.clone()),
            Self::MailboxNotFound(m) => Self::MailboxNotFound(m.clone()),
            Self::MessageNotFound(uid) => Self::MessageNotFound(*uid),
            Self::RecipientRejected {
                recipient,
                code,
                message,
            } => Self::RecipientRejected {
                recipient: recipient.clone(),
                code: *code,
                message: message.clone(),
            },
            Self::Timeout { operation, after } => Self::Timeout {
                operation: *operation,
                after: *after,
            },
            Self::Template(m) => Self::Template(m.clone()),
            Self::InvalidAddress(m) => Self::InvalidAddress(m.clone()),
            Self::InvalidMessage(m) => Self::InvalidMessage(m.clone()),
            Self::InvalidState(m) => Self::InvalidState(m.clone()),
            Self::Smtp { code, message } => Self::Smtp {
                code: *code,
                message: message.clone(),
            },
            Self::Imap(m) => Self::Imap(m.clone()),
            Self::Parse(m) => Self::Parse(m.clone()),
            Self::Config(m) => Self::Config(m.clone()),
            Self::Io(e) => Self::Io(std::io::Error::new(e.kind(), e.to_string())),
            Self::Tls(m) => Self::Tls(m.clone()),
            Self::Dispatch(m) => Self::Dispatch(m.clone()),
        }
    }
}

impl From<async_imap::error::Error> for Error {
    fn from(err: async_imap::error::Error) -> Self {
        match err {
            async_imap::error::Error::Io(e) => Self::Io(e),
            other => Self::Imap(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
