//! IMAP session state machine
//!
//! The pre-authentication phase (greeting, CAPABILITY, STARTTLS) runs on
//! the raw line stream so the negotiator can see what the server offers.
//! The stream is then handed to `async-imap` for LOGIN / AUTHENTICATE and
//! every mailbox command.

use super::flag::Flag;
use super::mail::MailItem;
use super::mailbox::{MailboxInfo, MailboxStatus};
use crate::auth::{self, AuthPayload, Mechanisms, Protocol};
use crate::config::ConnectionConfig;
use crate::error::{Error, Result};
use crate::security::{EffectiveSecurity, Scheme, TransportSecurityNegotiator};
use crate::transport::{LineStream, MailStream, deadline};
use async_imap::types::{Fetch, NameAttribute};
use futures::TryStreamExt;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use tokio_util::compat::{Compat, TokioAsyncReadCompatExt};
use tracing::{debug, info, warn};

type Client = async_imap::Client<Compat<MailStream>>;
type Session = async_imap::Session<Compat<MailStream>>;

/// Where an [`ImapSession`] is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ImapState {
    Disconnected,
    Connected,
    Secured,
    Authenticated,
    MailboxSelected,
    Closed,
}

impl fmt::Display for ImapState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connected => "connected",
            Self::Secured => "secured",
            Self::Authenticated => "authenticated",
            Self::MailboxSelected => "mailbox selected",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Capabilities the session acts on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub starttls: bool,
    pub auth: Mechanisms,
    pub move_ext: bool,
    pub raw: Vec<String>,
}

impl Capabilities {
    fn from_words(words: Vec<String>) -> Self {
        let has = |name: &str| words.iter().any(|w| w.eq_ignore_ascii_case(name));
        let starttls = has("STARTTLS");
        let move_ext = has("MOVE");
        let auth = Mechanisms::from_words(words.iter().map(String::as_str));
        Self {
            starttls,
            auth,
            move_ext,
            raw: words,
        }
    }
}

enum Link {
    None,
    PreAuth(LineStream),
    Ready(Box<Session>),
}

impl fmt::Debug for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::PreAuth(_) => f.write_str("PreAuth"),
            Self::Ready(_) => f.write_str("Ready"),
        }
    }
}

struct XOAuth2 {
    response: Vec<u8>,
    sent: bool,
}

impl async_imap::Authenticator for XOAuth2 {
    type Response = Vec<u8>;

    fn process(&mut self, _challenge: &[u8]) -> Self::Response {
        if self.sent {
            // An error challenge; an empty reply lets the server finish with NO.
            Vec::new()
        } else {
            self.sent = true;
            self.response.clone()
        }
    }
}

/// One IMAP connection, driven through `Disconnected -> Connected ->
/// Secured -> Authenticated -> MailboxSelected -> Closed`.
///
/// Deletion is two-phase: [`ImapSession::delete`] only sets `\Deleted`;
/// messages disappear on [`ImapSession::expunge`]. Closing the session
/// sends LOGOUT, never CLOSE, so nothing is expunged implicitly.
#[derive(Debug)]
pub struct ImapSession {
    config: ConnectionConfig,
    negotiator: TransportSecurityNegotiator,
    state: ImapState,
    link: Link,
    planned: Option<EffectiveSecurity>,
    security: Option<EffectiveSecurity>,
    capabilities: Capabilities,
    selected: Option<MailboxStatus>,
    tag: u32,
}

impl ImapSession {
    #[must_use]
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            negotiator: config.negotiator(),
            config,
            state: ImapState::Disconnected,
            link: Link::None,
            planned: None,
            security: None,
            capabilities: Capabilities::default(),
            selected: None,
            tag: 0,
        }
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
    pub const fn state(&self) -> ImapState {
        self.state
    }

    #[must_use]
    pub const fn security(&self) -> Option<EffectiveSecurity> {
        self.security
    }

    #[must_use]
    pub const fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    /// Name of the selected mailbox; set only in `MailboxSelected`.
    #[must_use]
    pub fn selected_mailbox(&self) -> Option<&str> {
        self.selected.as_ref().map(|s| s.name.as_str())
    }

    #[must_use]
    pub const fn mailbox_status(&self) -> Option<&MailboxStatus> {
        self.selected.as_ref()
    }

    /// Open the TCP connection, read the greeting and probe capabilities.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] outside `Disconnected`; on any other
    /// failure the session moves to `Closed`.
    pub async fn connect(&mut self) -> Result<()> {
        self.expect_state(&[ImapState::Disconnected], "connect")?;
        let result = self.connect_inner().await;
        self.settle_setup(result)
    }

    async fn connect_inner(&mut self) -> Result<()> {
        let planned = self.negotiator.resolve(self.config.port);
        info!(
            "Connecting to IMAP server {}:{} ({:?})",
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
        let mut lines = LineStream::new(stream, self.config.timeout);

        let greeting = lines.read_line("greeting").await?;
        debug!("IMAP greeting: {}", greeting);
        if !greeting.starts_with("* OK") && !greeting.starts_with("* PREAUTH") {
            return Err(Error::Imap(format!("unexpected greeting: {greeting}")));
        }

        self.capabilities = self.probe_capabilities(&mut lines).await?;
        self.link = Link::PreAuth(lines);
        self.planned = Some(planned);
        self.state = ImapState::Connected;
        Ok(())
    }

    /// Settle transport security, issuing STARTTLS when planned and
    /// advertised.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SecurityUnavailable`] when the required upgrade is
    /// not offered; the session moves to `Closed`.
    pub async fn secure(&mut self) -> Result<()> {
        self.expect_state(&[ImapState::Connected], "secure")?;
        let result = self.secure_inner().await;
        self.settle_setup(result)
    }

    async fn secure_inner(&mut self) -> Result<()> {
        let planned = self
            .planned
            .ok_or_else(|| Error::InvalidState("no planned security".into()))?;
        let effective = self.negotiator.settle(planned, self.capabilities.starttls)?;

        if effective.scheme == Scheme::UpgradedTls {
            let Link::PreAuth(mut lines) = std::mem::replace(&mut self.link, Link::None) else {
                return Err(Error::InvalidState("no pre-auth stream".into()));
            };
            let tag = self.next_tag();
            lines
                .write_all("STARTTLS", format!("{tag} STARTTLS\r\n").as_bytes())
                .await?;
            let (status, _) = read_tagged(&mut lines, &tag, "STARTTLS").await?;
            if !status.starts_with("OK") {
                return Err(Error::SecurityUnavailable(format!(
                    "STARTTLS refused: {status}"
                )));
            }

            let mut lines = lines
                .upgrade(&self.config.host, effective.certificate_policy)
                .await?;
            debug!("STARTTLS upgrade complete");
            self.capabilities = self.probe_capabilities(&mut lines).await?;
            self.link = Link::PreAuth(lines);
        }

        self.security = Some(effective);
        self.state = ImapState::Secured;
        Ok(())
    }

    /// Log in with the configured credential: LOGIN for a password,
    /// AUTHENTICATE XOAUTH2 for a token.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Credential`] when no credential is configured, the
    /// server lacks XOAUTH2 for a token, or the server refuses the login.
    pub async fn authenticate(&mut self) -> Result<()> {
        self.expect_state(&[ImapState::Secured], "authenticate")?;
        let result = self.authenticate_inner().await;
        self.settle_setup(result)
    }

    async fn authenticate_inner(&mut self) -> Result<()> {
        let credential = self
            .config
            .credential
            .clone()
            .ok_or_else(|| Error::Credential("IMAP requires a password or token".into()))?;
        let payload = auth::materialize(
            &credential,
            &self.config.username,
            Protocol::Imap,
            &self.capabilities.auth,
        )?;
        payload.ensure_for(Protocol::Imap)?;

        let Link::PreAuth(lines) = std::mem::replace(&mut self.link, Link::None) else {
            return Err(Error::InvalidState("no pre-auth stream".into()));
        };
        let client = Client::new(lines.into_inner().compat());
        let timeout = self.config.timeout;

        let session = match payload {
            AuthPayload::XOAuth2 { user, bearer_token } => {
                let authenticator = XOAuth2 {
                    response: auth::xoauth2_string(&user, &bearer_token).into_bytes(),
                    sent: false,
                };
                deadline("AUTHENTICATE", timeout, async move {
                    client
                        .authenticate("XOAUTH2", authenticator)
                        .await
                        .map_err(|(e, _)| login_error(e))
                })
                .await?
            }
            AuthPayload::SmtpPlain { .. } | AuthPayload::SmtpLogin { .. } => {
                return Err(Error::InvalidState(
                    "SMTP AUTH payload cannot authenticate an IMAP session".into(),
                ));
            }
            AuthPayload::ImapLogin { user, secret } => {
                deadline("LOGIN", timeout, async move {
                    client
                        .login(&user, &secret)
                        .await
                        .map_err(|(e, _)| login_error(e))
                })
                .await?
            }
        };
        self.link = Link::Ready(Box::new(session));

        let session = self.session()?;
        let caps = deadline("CAPABILITY", timeout, async {
            Ok::<_, Error>(session.capabilities().await?)
        })
        .await?;
        self.capabilities.move_ext = caps.has_str("MOVE");

        info!("Logged in to IMAP as {}", self.config.username);
        self.state = ImapState::Authenticated;
        Ok(())
    }

    /// List every mailbox on the server.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] before authentication.
    pub async fn list_mailboxes(&mut self) -> Result<Vec<MailboxInfo>> {
        self.expect_state(
            &[ImapState::Authenticated, ImapState::MailboxSelected],
            "list",
        )?;
        let timeout = self.config.timeout;
        let session = self.session()?;
        let result = deadline("LIST", timeout, async {
            let names: Vec<_> = session.list(Some(""), Some("*")).await?.try_collect().await?;
            Ok::<_, Error>(
                names
                    .iter()
                    .map(|n| {
                        MailboxInfo::new(
                            n.name().to_string(),
                            n.delimiter().map(ToString::to_string),
                            n.attributes().iter().map(attribute_name).collect(),
                        )
                    })
                    .collect(),
            )
        })
        .await;
        self.settle(result)
    }

    /// Select `mailbox` read-write.
    ///
    /// Re-entrant: selecting another mailbox replaces the current one.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MailboxNotFound`] if the server refuses the name;
    /// the session then has no mailbox selected.
    pub async fn select(&mut self, mailbox: &str) -> Result<MailboxStatus> {
        self.open_mailbox(mailbox, false).await
    }

    /// Select `mailbox` read-only (EXAMINE).
    ///
    /// # Errors
    ///
    /// Same as [`ImapSession::select`].
    pub async fn examine(&mut self, mailbox: &str) -> Result<MailboxStatus> {
        self.open_mailbox(mailbox, true).await
    }

    async fn open_mailbox(&mut self, mailbox: &str, read_only: bool) -> Result<MailboxStatus> {
        self.expect_state(
            &[ImapState::Authenticated, ImapState::MailboxSelected],
            "select",
        )?;
        self.selected = None;
        self.state = ImapState::Authenticated;

        let timeout = self.config.timeout;
        let session = self.session()?;
        let result = deadline("SELECT", timeout, async {
            let opened = if read_only {
                session.examine(mailbox).await
            } else {
                session.select(mailbox).await
            };
            opened.map_err(|e| match e {
                async_imap::error::Error::No(_) | async_imap::error::Error::Bad(_) => {
                    Error::MailboxNotFound(mailbox.to_string())
                }
                other => Error::from(other),
            })
        })
        .await;
        let mailbox_state = self.settle(result)?;

        let status = MailboxStatus {
            name: mailbox.to_string(),
            exists: mailbox_state.exists,
            recent: mailbox_state.recent,
            unseen: mailbox_state.unseen,
            uid_validity: mailbox_state.uid_validity,
            uid_next: mailbox_state.uid_next,
            read_only,
        };
        debug!("Selected {} ({} messages)", mailbox, status.exists);
        self.selected = Some(status.clone());
        self.state = ImapState::MailboxSelected;
        Ok(status)
    }

    /// UIDs matching an IMAP SEARCH `criteria` such as `UNSEEN` or
    /// `FROM "alice"`.
    ///
    /// Returned in ascending UID order. The server's own ordering is not
    /// available here because the response is collected into a set.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] without a selected mailbox.
    pub async fn search(&mut self, criteria: &str) -> Result<Vec<u32>> {
        self.expect_selected("search")?;
        let criteria = if criteria.trim().is_empty() {
            "ALL"
        } else {
            criteria
        };
        let timeout = self.config.timeout;
        let session = self.session()?;
        let result = deadline("SEARCH", timeout, async {
            Ok::<_, Error>(session.uid_search(criteria).await?)
        })
        .await;
        let mut uids: Vec<u32> = self.settle(result)?.into_iter().collect();
        uids.sort_unstable();
        debug!("SEARCH {} matched {} messages", criteria, uids.len());
        Ok(uids)
    }

    /// Fetch one message without marking it seen.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MessageNotFound`] if no message has `uid`.
    pub async fn fetch(&mut self, uid: u32) -> Result<MailItem> {
        self.fetch_many(&[uid])
            .await?
            .pop()
            .unwrap_or(Err(Error::MessageNotFound(uid)))
    }

    /// Fetch several messages in one round trip.
    ///
    /// The result has one entry per requested UID, in request order. A UID
    /// that no longer exists yields [`Error::MessageNotFound`] in its slot
    /// without failing the others.
    ///
    /// # Errors
    ///
    /// The outer error is reserved for failures of the whole command.
    pub async fn fetch_many(&mut self, uids: &[u32]) -> Result<Vec<Result<MailItem>>> {
        self.expect_selected("fetch")?;
        if uids.is_empty() {
            return Ok(Vec::new());
        }
        let set = uid_set(uids);
        let timeout = self.config.timeout;
        let session = self.session()?;
        let result = deadline("FETCH", timeout, async {
            let fetches: Vec<Fetch> = session
                .uid_fetch(&set, "(UID FLAGS BODY.PEEK[])")
                .await?
                .try_collect()
                .await?;
            Ok::<_, Error>(fetches)
        })
        .await;
        let fetches = self.settle(result)?;

        let mut by_uid: HashMap<u32, &Fetch> = HashMap::new();
        for fetch in &fetches {
            if let Some(uid) = fetch.uid
                && fetch.body().is_some()
            {
                by_uid.insert(uid, fetch);
            }
        }

        let items = uids
            .iter()
            .map(|&uid| {
                let fetch = by_uid.get(&uid).ok_or(Error::MessageNotFound(uid))?;
                let flags = fetch.flags().map(|f| Flag::from(&f)).collect();
                let body = fetch.body().unwrap_or_default();
                MailItem::parse(uid, flags, body)
            })
            .collect::<Vec<_>>();
        debug!(
            "Fetched {} of {} requested messages",
            items.iter().filter(|r| r.is_ok()).count(),
            uids.len()
        );
        Ok(items)
    }

    /// Add and remove flags on `uids`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] without a selected mailbox.
    pub async fn mutate_flags(&mut self, uids: &[u32], add: &[Flag], remove: &[Flag]) -> Result<()> {
        self.expect_selected("store")?;
        if uids.is_empty() {
            return Ok(());
        }
        if !add.is_empty() {
            self.store(uids, &format!("+FLAGS.SILENT {}", Flag::store_list(add)))
                .await?;
        }
        if !remove.is_empty() {
            self.store(uids, &format!("-FLAGS.SILENT {}", Flag::store_list(remove)))
                .await?;
        }
        Ok(())
    }

    /// # Errors
    ///
    /// Same as [`ImapSession::mutate_flags`].
    pub async fn add_flags(&mut self, uids: &[u32], flags: &[Flag]) -> Result<()> {
        self.mutate_flags(uids, flags, &[]).await
    }

    /// # Errors
    ///
    /// Same as [`ImapSession::mutate_flags`].
    pub async fn remove_flags(&mut self, uids: &[u32], flags: &[Flag]) -> Result<()> {
        self.mutate_flags(uids, &[], flags).await
    }

    /// # Errors
    ///
    /// Same as [`ImapSession::mutate_flags`].
    pub async fn mark_seen(&mut self, uids: &[u32]) -> Result<()> {
        self.add_flags(uids, &[Flag::Seen]).await
    }

    /// Mark `uids` `\Deleted`. They stay fetchable until
    /// [`ImapSession::expunge`].
    ///
    /// # Errors
    ///
    /// Same as [`ImapSession::mutate_flags`].
    pub async fn delete(&mut self, uids: &[u32]) -> Result<()> {
        self.add_flags(uids, &[Flag::Deleted]).await?;
        info!("Marked {} message(s) deleted", uids.len());
        Ok(())
    }

    /// Permanently remove every `\Deleted` message in the selected
    /// mailbox. Returns the expunged sequence numbers.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] without a selected mailbox.
    pub async fn expunge(&mut self) -> Result<Vec<u32>> {
        self.expect_selected("expunge")?;
        let timeout = self.config.timeout;
        let session = self.session()?;
        let result = deadline("EXPUNGE", timeout, async {
            let removed: Vec<u32> = session.expunge().await?.try_collect().await?;
            Ok::<_, Error>(removed)
        })
        .await;
        let removed = self.settle(result)?;
        info!("Expunged {} message(s)", removed.len());
        Ok(removed)
    }

    /// Move `uids` to `target`.
    ///
    /// Uses UID MOVE when the server supports it. Otherwise the messages
    /// are copied and marked `\Deleted` in the source; expunging stays the
    /// caller's decision.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MailboxNotFound`] if `target` does not exist.
    pub async fn move_messages(&mut self, uids: &[u32], target: &str) -> Result<()> {
        self.expect_selected("move")?;
        if uids.is_empty() {
            return Ok(());
        }
        let set = uid_set(uids);
        let use_move = self.capabilities.move_ext;
        let timeout = self.config.timeout;
        let session = self.session()?;
        let result = deadline("MOVE", timeout, async {
            let moved = if use_move {
                session.uid_mv(&set, target).await
            } else {
                session.uid_copy(&set, target).await
            };
            moved.map_err(|e| match e {
                async_imap::error::Error::No(_) => Error::MailboxNotFound(target.to_string()),
                other => Error::from(other),
            })
        })
        .await;
        self.settle(result)?;

        if !use_move {
            self.add_flags(uids, &[Flag::Deleted]).await?;
        }
        info!("Moved {} message(s) to {}", uids.len(), target);
        Ok(())
    }

    /// Log out and release the connection.
    ///
    /// Valid in every state; calling it again is a no-op. Never expunges.
    pub async fn close(&mut self) {
        if self.state == ImapState::Closed {
            return;
        }
        let timeout = self.config.timeout;
        match std::mem::replace(&mut self.link, Link::None) {
            Link::Ready(mut session) => {
                let logout = deadline("LOGOUT", timeout, async {
                    Ok::<_, Error>(session.logout().await?)
                });
                if let Err(e) = logout.await {
                    debug!("LOGOUT failed: {}", e);
                }
            }
            Link::PreAuth(mut lines) => {
                let tag = self.next_tag();
                let logout = async {
                    lines
                        .write_all("LOGOUT", format!("{tag} LOGOUT\r\n").as_bytes())
                        .await?;
                    read_tagged(&mut lines, &tag, "LOGOUT").await
                };
                if let Err(e) = logout.await {
                    debug!("LOGOUT failed: {}", e);
                }
            }
            Link::None => {}
        }
        self.selected = None;
        self.state = ImapState::Closed;
        debug!("IMAP session closed");
    }

    async fn store(&mut self, uids: &[u32], query: &str) -> Result<()> {
        let set = uid_set(uids);
        let timeout = self.config.timeout;
        let session = self.session()?;
        let result = deadline("STORE", timeout, async {
            let _: Vec<Fetch> = session.uid_store(&set, query).await?.try_collect().await?;
            Ok::<_, Error>(())
        })
        .await;
        self.settle(result)
    }

    async fn probe_capabilities(&mut self, lines: &mut LineStream) -> Result<Capabilities> {
        let tag = self.next_tag();
        lines
            .write_all("CAPABILITY", format!("{tag} CAPABILITY\r\n").as_bytes())
            .await?;
        let (status, untagged) = read_tagged(lines, &tag, "CAPABILITY").await?;
        if !status.starts_with("OK") {
            return Err(Error::Imap(format!("CAPABILITY failed: {status}")));
        }
        let words = untagged
            .iter()
            .filter_map(|l| l.strip_prefix("* CAPABILITY "))
            .flat_map(str::split_whitespace)
            .map(ToString::to_string)
            .collect();
        let caps = Capabilities::from_words(words);
        debug!("IMAP capabilities: {:?}", caps.raw);
        Ok(caps)
    }

    fn next_tag(&mut self) -> String {
        self.tag += 1;
        format!("m{}", self.tag)
    }

    fn session(&mut self) -> Result<&mut Session> {
        match &mut self.link {
            Link::Ready(session) => Ok(session),
            _ => Err(Error::InvalidState("IMAP session is not authenticated".into())),
        }
    }

    fn expect_state(&self, allowed: &[ImapState], operation: &str) -> Result<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(Error::InvalidState(format!(
                "{operation} is not valid while {}",
                self.state
            )))
        }
    }

    fn expect_selected(&self, operation: &str) -> Result<()> {
        self.expect_state(&[ImapState::MailboxSelected], operation)
    }

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
        warn!("Closing IMAP session after error: {}", error);
        self.link = Link::None;
        self.selected = None;
        self.state = ImapState::Closed;
    }
}

/// Read until the tagged completion, returning its status text and the
/// untagged lines before it.
async fn read_tagged(
    lines: &mut LineStream,
    tag: &str,
    operation: &'static str,
) -> Result<(String, Vec<String>)> {
    let prefix = format!("{tag} ");
    let mut untagged = Vec::new();
    loop {
        let line = lines.read_line(operation).await?;
        if let Some(status) = line.strip_prefix(&prefix) {
            return Ok((status.to_string(), untagged));
        }
        untagged.push(line);
    }
}

/// Wire form of a LIST attribute, e.g. `\Sent`.
fn attribute_name(attr: &NameAttribute<'_>) -> String {
    match attr {
        NameAttribute::Extension(name) => name.to_string(),
        known => format!("\\{known:?}"),
    }
}

fn login_error(err: async_imap::error::Error) -> Error {
    match err {
        async_imap::error::Error::Io(e) => Error::Io(e),
        other => Error::Credential(format!("login refused: {other}")),
    }
}

/// Comma-separated UID set.
fn uid_set(uids: &[u32]) -> String {
    uids.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",")
}
