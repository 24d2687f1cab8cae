//! SMTP and IMAP mail client toolkit
//!
//! Sends mail over SMTP and reads or manages mailboxes over IMAP. Both
//! protocols share the same connection setup: pick a transport security
//! scheme ([`TransportSecurityNegotiator`]), then authenticate with a
//! password or an OAuth2 bearer token ([`Credential`]).
//!
//! - [`SmtpSession`] and [`ImapSession`] are explicit state machines over
//!   one connection each.
//! - [`MessageBuilder`] turns a [`Message`] into RFC 5322 bytes plus an
//!   envelope; Bcc addresses never reach a header.
//! - [`DispatchCoordinator`] sends single, templated and bulk mail over a
//!   bounded pool of sessions.
//! - [`export`] writes fetched messages as text, JSON or `.eml` files.

pub mod address;
pub mod auth;
mod config;
pub mod dispatch;
mod error;
pub mod export;
pub mod imap;
pub mod message;
pub mod security;
pub mod smtp;
pub mod template;
pub mod transport;

pub use address::{AddressValidator, SharedValidator, StrictValidator};
pub use auth::{AuthPayload, Credential, Protocol};
pub use config::{ConnectionConfig, DEFAULT_TIMEOUT};
pub use dispatch::{BodyTemplate, DispatchCoordinator, Outcome, PerRecipientResult};
pub use error::{Error, Result};
pub use imap::{Flag, ImapSession, ImapState, MailItem, MailboxInfo, MailboxStatus};
pub use message::{Attachment, Message, MessageBuilder, WireMessage};
pub use security::{
    CertificatePolicy, EffectiveSecurity, Scheme, SecurityMode, TransportSecurityNegotiator,
};
pub use smtp::{SmtpSession, SmtpState, SubmissionReport};
pub use template::{TemplateEngine, TemplateRenderer};
