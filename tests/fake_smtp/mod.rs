//! Fake SMTP server for integration testing
//!
//! An in-process ESMTP server that records what it accepts, so tests can
//! assert on envelopes and the exact DATA a client transmitted:
//!
//! TCP -> 220 greeting -> EHLO -> STARTTLS -> TLS -> EHLO -> AUTH -> MAIL/RCPT/DATA -> QUIT
//!
//! ## Module layout
//!
//! - `server` -- TCP listener, TLS setup, options and command loop

#![allow(dead_code)]

mod server;

pub use server::{Delivery, FakeSmtpServer, SmtpOptions};
