//! SMTP submission
//!
//! [`SmtpSession`] drives one connection through security negotiation,
//! authentication and any number of message submissions.

pub mod protocol;
mod session;

pub use session::{RecipientRejection, SmtpSession, SmtpState, SubmissionReport};
