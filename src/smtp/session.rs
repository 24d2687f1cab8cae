//! SMTP session state machine

use super::protocol::{Extensions, Reply, encode_data, read_reply};
use crate::address::SharedValidator;
use crate::auth::{self, AuthPayload, Protocol};
use crate::config::ConnectionConfig;
use crate::error::{Error, Result};
use crate::message::{Message, MessageBuilder};
use crate::security::{EffectiveSecurity, Scheme, TransportSecurityNegotiator};
use crate::transport::{LineStream, MailStream};
use serde::Serialize;
use std::fmt;
use tracing::{debug, info, warn};

/// Where an [`SmtpSession`] is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SmtpState {
    Disconnected,
    Connected,
    Secured,
    Authenticated,
    Closed,
}

impl fmt::Display for SmtpState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connected => "connected",
            Self::Secured => "secured",
            Self::Authenticated => "authenticated",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// A recipient the server refused during RCPT TO.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecipientRejection {
    pub recipient: String,
    pub code: u16,
    pub message: String,
}

/// Outcome of one accepted submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmissionReport {
    pub message_id: String,
    pub accepted: Vec<String>,
    /// Recipients refused while others were accepted.
    pub rejected: Vec<RecipientRejection>,
}

impl SubmissionReport {
    #[must_use]
    pub fn is_partial(&self) -> bool {
        !self.rejected.is_empty()
    }
}

/// One SMTP connection, driven through
/// `Disconnected -> Connected -> Secured -> Authenticated -> Closed`.
///
/// Not shareable between tasks; run several sessions for parallelism.
#[derive(Debug)]
pub struct SmtpSession {
    config: ConnectionConfig,
    negotiator: TransportSecurityNegotiator,
    builder: MessageBuilder,
    state: SmtpState,
    stream: Option<LineStream>,
    planned: Option<EffectiveSecurity>,
    security: Option<EffectiveSecurity>,
    extensions: Extensions,
}

impl SmtpSession {
    #[must_use]
    pub fn new(config: ConnectionConfig) -> Self {
        let builder =
            MessageBuilder::new(config.username.clone()).with_reply_to(config.reply_to.clone());
        Self {
            negotiator: config.negotiator(),
            config,
            builder,
            state: SmtpState::Disconnected,
            stream: None,
            planned: None,
            security: None,
            extensions: Extensions::default(),
        }
    }

    /// Use an external address validator instead of the syntax check.
    #[must_use]
    pub fn with_validator(mut self, validator: Option<SharedValidator>) -> Self {
        self.builder = self.builder.with_validator(validator);
        self
    }

    /// Connect, secure and authenticate in one go.
    ///
    /// # Errors
    ///
    /// Any error from the three steps; the session is closed afterwards.
    pub async fn open(config: ConnectionConfig) -> Result<Self> {
        let mut session = Self::new(config);
        session.connect().await?;
        session.secure().await?;
        session.authenticate().await?;
        Ok(session)
    }

    #[must_use]
    pub const fn state(&self) -> SmtpState {
        self.state
    }

    /// The security in effect, once [`SmtpSession::secure`] has run.
    #[must_use]
    pub const fn security(&self) -> Option<EffectiveSecurity> {
        self.security
    }

    #[must_use]
    pub const fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    #[must_use]
    pub const fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Open the TCP connection, read the greeting and send EHLO.
    ///
    /// Implicit TLS is established here, before any dialogue.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] outside `Disconnected`; on any other
    /// failure the session moves to `Closed`.
    pub async fn connect(&mut self) -> Result<()> {
        self.expect_state(SmtpState::Disconnected, "connect")?;
        let result = self.connect_inner().await;
        self.settle_setup(result)
    }

    async fn connect_inner(&mut self) -> Result<()> {
        let planned = self.negotiator.resolve(self.config.port);
        info!(
            "Connecting to SMTP server {}:{} ({:?})",
            self.config.host, self.config.port, planned.scheme
        );

        let mut stream =
            MailStream::connect(&self.config.host, self.config.port, self.config.timeout).await?;
        if planned.scheme == Scheme::ImplicitTls {
            stream = stream
                .into_tls(
                    &self.config.host,
                    planned.certificate_policy,
                    self.config.timeout,
                )
                .await?;
        }
        self.stream = Some(LineStream::new(stream, self.config.timeout));

        let greeting = read_reply(self.line_stream()?, "greeting").await?;
        if greeting.code != 220 {
            return Err(greeting.into_error());
        }
        debug!("SMTP greeting: {}", greeting.text());

        self.ehlo().await?;
        self.planned = Some(planned);
        self.state = SmtpState::Connected;
        Ok(())
    }

    /// Settle transport security: upgrade with STARTTLS when planned and
    /// advertised, or fall back as the negotiator allows.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SecurityUnavailable`] when the required upgrade is
    /// not offered; the session moves to `Closed`.
    pub async fn secure(&mut self) -> Result<()> {
        self.expect_state(SmtpState::Connected, "secure")?;
        let result = self.secure_inner().await;
        self.settle_setup(result)
    }

    async fn secure_inner(&mut self) -> Result<()> {
        let planned = self
            .planned
            .ok_or_else(|| Error::InvalidState("no planned security".into()))?;
        let effective = self.negotiator.settle(planned, self.extensions.starttls)?;

        if effective.scheme == Scheme::UpgradedTls {
            let reply = self.command("STARTTLS", "STARTTLS").await?;
            if reply.code != 220 {
                return Err(Error::SecurityUnavailable(format!(
                    "STARTTLS refused: {} {}",
                    reply.code,
                    reply.text()
                )));
            }
            let stream = self
                .stream
                .take()
                .ok_or_else(|| Error::InvalidState("no stream".into()))?;
            self.stream = Some(
                stream
                    .upgrade(&self.config.host, effective.certificate_policy)
                    .await?,
            );
            debug!("STARTTLS upgrade complete");
            self.ehlo().await?;
        }

        self.security = Some(effective);
        self.state = SmtpState::Secured;
        Ok(())
    }

    /// Authenticate with the configured credential.
    ///
    /// Without a credential the session goes straight to
    /// `Authenticated`, for relays that accept anonymous submission.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Credential`] when the server refuses or cannot
    /// accept the credential; the session moves to `Closed`.
    pub async fn authenticate(&mut self) -> Result<()> {
        self.expect_state(SmtpState::Secured, "authenticate")?;
        let result = self.authenticate_inner().await;
        self.settle_setup(result)
    }

    async fn authenticate_inner(&mut self) -> Result<()> {
        let Some(credential) = self.config.credential.clone() else {
            debug!("No credential configured, skipping AUTH");
            self.state = SmtpState::Authenticated;
            return Ok(());
        };

        let payload = auth::materialize(
            &credential,
            &self.config.username,
            Protocol::Smtp,
            &self.extensions.auth,
        )?;
        payload.ensure_for(Protocol::Smtp)?;
        debug!("Authenticating with {:?}", payload.mechanism());

        let reply = match &payload {
            AuthPayload::ImapLogin { .. } => {
                return Err(Error::InvalidState(
                    "IMAP LOGIN payload cannot authenticate an SMTP session".into(),
                ));
            }
            AuthPayload::SmtpPlain { user, secret } => {
                let line = format!("AUTH PLAIN {}", auth::plain_base64(user, secret));
                self.command("AUTH", &line).await?
            }
            AuthPayload::SmtpLogin { user, secret } => {
                let reply = self.command("AUTH", "AUTH LOGIN").await?;
                if reply.code != 334 {
                    return Err(auth_error(&reply));
                }
                let reply = self.command("AUTH", &auth::base64(user)).await?;
                if reply.code != 334 {
                    return Err(auth_error(&reply));
                }
                self.command("AUTH", &auth::base64(secret)).await?
            }
            AuthPayload::XOAuth2 { user, bearer_token } => {
                let encoded = auth::xoauth2_base64(user, bearer_token);
                let reply = self
                    .command("AUTH", &format!("AUTH XOAUTH2 {encoded}"))
                    .await?;
                if reply.code == 334 {
                    // Some servers only take the token as a continuation line.
                    self.command("AUTH", &encoded).await?
                } else {
                    reply
                }
            }
        };

        match reply.code {
            235 => info!("Authenticated as {}", self.config.username),
            503 => debug!("Server reports session already authenticated"),
            _ => return Err(auth_error(&reply)),
        }
        self.state = SmtpState::Authenticated;
        Ok(())
    }

    /// Submit one message.
    ///
    /// Recipients the server refuses are listed in the report while the
    /// rest still receive the message. The session stays `Authenticated`.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidAddress`] / [`Error::InvalidMessage`] before
    ///   anything is sent
    /// - [`Error::RecipientRejected`] when every recipient is refused
    /// - [`Error::Smtp`] when MAIL FROM or DATA is refused
    /// - session-fatal errors (timeouts, I/O), which close the session
    pub async fn submit(&mut self, message: &Message) -> Result<SubmissionReport> {
        self.expect_state(SmtpState::Authenticated, "submit")?;
        let wire = self.builder.build(message)?;
        let result = self.transaction(&wire).await;
        self.settle(result)
    }

    async fn transaction(&mut self, wire: &crate::message::WireMessage) -> Result<SubmissionReport> {
        let reply = self
            .command("MAIL FROM", &format!("MAIL FROM:<{}>", wire.envelope.from))
            .await?;
        if !reply.is_success() {
            self.reset().await?;
            return Err(reply.into_error());
        }

        let mut accepted = Vec::new();
        let mut rejected = Vec::new();
        for recipient in &wire.envelope.recipients {
            let reply = self
                .command("RCPT TO", &format!("RCPT TO:<{recipient}>"))
                .await?;
            if reply.is_success() {
                accepted.push(recipient.clone());
            } else {
                warn!("Recipient {} rejected: {} {}", recipient, reply.code, reply.text());
                rejected.push(RecipientRejection {
                    recipient: recipient.clone(),
                    code: reply.code,
                    message: reply.text(),
                });
            }
        }

        if accepted.is_empty() {
            self.reset().await?;
            let first = rejected.into_iter().next().ok_or_else(|| {
                Error::InvalidMessage("message has no envelope recipients".into())
            })?;
            return Err(Error::RecipientRejected {
                recipient: first.recipient,
                code: first.code,
                message: first.message,
            });
        }

        let reply = self.command("DATA", "DATA").await?;
        if reply.code != 354 {
            self.reset().await?;
            return Err(reply.into_error());
        }

        let data = encode_data(wire.as_bytes());
        let stream = self.line_stream()?;
        stream.write_all("DATA", &data).await?;
        let reply = read_reply(stream, "DATA").await?;
        if !reply.is_success() {
            return Err(reply.into_error());
        }

        info!(
            "Message {} accepted for {} recipient(s)",
            wire.message_id,
            accepted.len()
        );
        Ok(SubmissionReport {
            message_id: wire.message_id.clone(),
            accepted,
            rejected,
        })
    }

    /// Send QUIT and release the connection.
    ///
    /// Valid in every state; calling it again is a no-op.
    pub async fn close(&mut self) {
        if self.state == SmtpState::Closed {
            return;
        }
        if let Some(stream) = self.stream.as_mut() {
            let quit = async {
                stream.write_all("QUIT", b"QUIT\r\n").await?;
                read_reply(stream, "QUIT").await
            };
            if let Err(e) = quit.await {
                debug!("QUIT failed: {}", e);
            }
        }
        self.stream = None;
        self.state = SmtpState::Closed;
        debug!("SMTP session closed");
    }

    async fn ehlo(&mut self) -> Result<()> {
        let name = self
            .config
            .ehlo_hostname
            .clone()
            .unwrap_or_else(|| "localhost".to_string());
        let reply = self.command("EHLO", &format!("EHLO {name}")).await?;
        if !reply.is_success() {
            return Err(reply.into_error());
        }
        self.extensions = Extensions::from_ehlo(&reply);
        debug!("Server extensions: {:?}", self.extensions);
        Ok(())
    }

    async fn reset(&mut self) -> Result<()> {
        let reply = self.command("RSET", "RSET").await?;
        if !reply.is_success() {
            debug!("RSET refused: {} {}", reply.code, reply.text());
        }
        Ok(())
    }

    async fn command(&mut self, operation: &'static str, line: &str) -> Result<Reply> {
        let stream = self.line_stream()?;
        stream
            .write_all(operation, format!("{line}\r\n").as_bytes())
            .await?;
        let reply = read_reply(stream, operation).await?;
        if reply.code == 421 {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionAborted,
                format!("server closing connection: {}", reply.text()),
            )));
        }
        Ok(reply)
    }

    fn line_stream(&mut self) -> Result<&mut LineStream> {
        self.stream
            .as_mut()
            .ok_or_else(|| Error::InvalidState("SMTP session has no connection".into()))
    }

    fn expect_state(&self, expected: SmtpState, operation: &str) -> Result<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(Error::InvalidState(format!(
                "{operation} requires {expected}, session is {}",
                self.state
            )))
        }
    }

    /// Any failure while setting up leaves the session closed.
    fn settle_setup<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            self.abort(e);
        }
        result
    }

    fn settle<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result
            && e.is_session_fatal()
        {
            self.abort(e);
        }
        result
    }

    fn abort(&mut self, error: &Error) {
        warn!("Closing SMTP session after error: {}", error);
        self.stream = None;
        self.state = SmtpState::Closed;
    }
}

fn auth_error(reply: &Reply) -> Error {
    Error::Credential(format!("AUTH failed: {} {}", reply.code, reply.text()))
}
