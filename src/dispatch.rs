//! Sending facade: single, templated, background and bulk delivery
//!
//! Bulk sends go through a bounded pool of workers. Each worker owns one
//! [`SmtpSession`] for its whole life and pulls recipients off a shared
//! queue, so a session is never used by two sends at once. Every
//! recipient gets its own message; results come back in input order.
//! Setup failures that need reconfiguration stop the batch instead of
//! being retried per recipient.

use crate::address::SharedValidator;
use crate::config::ConnectionConfig;
use crate::error::{Error, Result};
use crate::message::{Attachment, Message};
use crate::smtp::{SmtpSession, SmtpState, SubmissionReport};
use crate::template::{TemplateEngine, TemplateRenderer};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Concurrent sessions used by bulk sends unless configured otherwise.
pub const DEFAULT_MAX_IN_FLIGHT: usize = 4;

/// Body of a bulk message, rendered once per recipient.
#[derive(Debug, Clone)]
pub enum BodyTemplate {
    Text(String),
    Html(String),
    /// A named template; the context gains a `recipient` key per send.
    Template {
        name: String,
        context: serde_json::Value,
    },
}

/// What happened to one recipient of a bulk send.
#[derive(Debug)]
pub enum Outcome {
    Sent { message_id: String },
    Rejected { code: u16, message: String },
    Failed(Error),
    /// The batch was cancelled before this recipient was attempted.
    Cancelled,
}

impl Outcome {
    #[must_use]
    pub const fn is_sent(&self) -> bool {
        matches!(self, Self::Sent { .. })
    }
}

#[derive(Debug)]
pub struct PerRecipientResult {
    pub recipient: String,
    pub outcome: Outcome,
}

/// Summary line for a batch, suitable for `--json` output.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub sent: usize,
    pub rejected: usize,
    pub failed: usize,
    pub cancelled: usize,
}

impl BatchSummary {
    #[must_use]
    pub fn of(results: &[PerRecipientResult]) -> Self {
        let mut summary = Self::default();
        for result in results {
            match result.outcome {
                Outcome::Sent { .. } => summary.sent += 1,
                Outcome::Rejected { .. } => summary.rejected += 1,
                Outcome::Failed(_) => summary.failed += 1,
                Outcome::Cancelled => summary.cancelled += 1,
            }
        }
        summary
    }
}

/// Sends mail through short-lived or pooled [`SmtpSession`]s.
#[derive(Clone)]
pub struct DispatchCoordinator {
    config: ConnectionConfig,
    templates: Arc<dyn TemplateEngine>,
    validator: Option<SharedValidator>,
    max_in_flight: usize,
}

impl std::fmt::Debug for DispatchCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchCoordinator")
            .field("host", &self.config.host)
            .field("port", &self.config.port)
            .field("max_in_flight", &self.max_in_flight)
            .finish_non_exhaustive()
    }
}

impl DispatchCoordinator {
    #[must_use]
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            config,
            templates: Arc::new(TemplateRenderer::new()),
            validator: None,
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
        }
    }

    #[must_use]
    pub fn with_templates(mut self, templates: impl TemplateEngine + 'static) -> Self {
        self.templates = Arc::new(templates);
        self
    }

    #[must_use]
    pub fn with_validator(mut self, validator: Option<SharedValidator>) -> Self {
        self.validator = validator;
        self
    }

    /// Upper bound on concurrent sessions during bulk sends (at least 1).
    #[must_use]
    pub fn with_max_in_flight(mut self, max: usize) -> Self {
        self.max_in_flight = max.max(1);
        self
    }

    #[must_use]
    pub const fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Send one message over a fresh session.
    ///
    /// # Errors
    ///
    /// Any session or submission error. The session is closed either way.
    pub async fn send(&self, message: &Message) -> Result<SubmissionReport> {
        let mut session = self.session();
        let result = async {
            session.connect().await?;
            session.secure().await?;
            session.authenticate().await?;
            session.submit(message).await
        }
        .await;
        session.close().await;
        result
    }

    /// Render the HTML template `name` with `context` and send it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Template`] before connecting if rendering fails;
    /// otherwise as [`DispatchCoordinator::send`].
    pub async fn send_template(
        &self,
        recipient: &str,
        subject: &str,
        name: &str,
        context: &serde_json::Value,
        attachments: Vec<Attachment>,
    ) -> Result<SubmissionReport> {
        let html = self.templates.render(name, context)?;
        let mut message = Message::new(subject).to(recipient).html(html);
        message.attachments = attachments;
        self.send(&message).await
    }

    /// Send on a background task.
    ///
    /// # Errors
    ///
    /// As [`DispatchCoordinator::send`], or [`Error::Dispatch`] if the task
    /// panicked or was aborted.
    pub async fn send_async(&self, message: Message) -> Result<SubmissionReport> {
        let coordinator = self.clone();
        tokio::spawn(async move { coordinator.send(&message).await })
            .await
            .map_err(|e| Error::Dispatch(e.to_string()))?
    }

    /// Send an individual message to each recipient.
    ///
    /// Never fails as a whole; every recipient gets a result, in input
    /// order.
    pub async fn send_bulk(
        &self,
        recipients: &[String],
        subject: &str,
        body: &BodyTemplate,
    ) -> Vec<PerRecipientResult> {
        self.send_bulk_with_cancel(recipients, subject, body, &CancellationToken::new())
            .await
    }

    /// [`DispatchCoordinator::send_bulk`] that stops taking new recipients
    /// once `cancel` fires. Sends already under way finish; the rest are
    /// reported as [`Outcome::Cancelled`].
    ///
    /// A session that fails to open with a non-retryable error, such as a
    /// refused login, halts the batch: no further sessions are opened and
    /// every recipient not yet attempted fails with the same error.
    pub async fn send_bulk_with_cancel(
        &self,
        recipients: &[String],
        subject: &str,
        body: &BodyTemplate,
        cancel: &CancellationToken,
    ) -> Vec<PerRecipientResult> {
        let batch = Arc::new(Batch::new(recipients));
        let workers = self.max_in_flight.min(recipients.len());
        info!(
            "Bulk send to {} recipient(s) with {} worker(s)",
            recipients.len(),
            workers
        );

        let mut tasks = JoinSet::new();
        for worker in 0..workers {
            let job = Worker {
                id: worker,
                coordinator: self.clone(),
                batch: Arc::clone(&batch),
                subject: subject.to_string(),
                body: body.clone(),
                cancel: cancel.clone(),
            };
            tasks.spawn(job.run());
        }
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                warn!("Bulk worker ended abnormally: {}", e);
            }
        }

        let slots = std::mem::take(&mut *batch.slots.lock().await);
        let results: Vec<PerRecipientResult> = recipients
            .iter()
            .zip(slots)
            .map(|(recipient, outcome)| PerRecipientResult {
                recipient: recipient.clone(),
                outcome: outcome.unwrap_or(Outcome::Cancelled),
            })
            .collect();
        let summary = BatchSummary::of(&results);
        info!(
            "Bulk send finished: {} sent, {} rejected, {} failed, {} cancelled",
            summary.sent, summary.rejected, summary.failed, summary.cancelled
        );
        results
    }

    fn session(&self) -> SmtpSession {
        SmtpSession::new(self.config.clone()).with_validator(self.validator.clone())
    }

    fn render(&self, body: &BodyTemplate, subject: &str, recipient: &str) -> Result<Message> {
        let message = Message::new(subject).to(recipient);
        Ok(match body {
            BodyTemplate::Text(text) => message.text(text.clone()),
            BodyTemplate::Html(html) => message.html(html.clone()),
            BodyTemplate::Template { name, context } => {
                let mut context = context.clone();
                if let Some(map) = context.as_object_mut() {
                    map.insert("recipient".into(), recipient.into());
                } else {
                    context = serde_json::json!({ "recipient": recipient });
                }
                message.html(self.templates.render(name, &context)?)
            }
        })
    }
}

/// State shared by the workers of one bulk send.
struct Batch {
    queue: Mutex<VecDeque<(usize, String)>>,
    /// One outcome per recipient, filled in as each send completes.
    slots: Mutex<Vec<Option<Outcome>>>,
    /// Set when a session cannot be opened for a reason a reconnect
    /// would not fix; later recipients fail with a copy of it.
    halted: Mutex<Option<Error>>,
}

impl Batch {
    fn new(recipients: &[String]) -> Self {
        Self {
            queue: Mutex::new(recipients.iter().cloned().enumerate().collect()),
            slots: Mutex::new(recipients.iter().map(|_| None).collect()),
            halted: Mutex::new(None),
        }
    }

    async fn record(&self, index: usize, outcome: Outcome) {
        if let Some(slot) = self.slots.lock().await.get_mut(index) {
            *slot = Some(outcome);
        }
    }
}

struct Worker {
    id: usize,
    coordinator: DispatchCoordinator,
    batch: Arc<Batch>,
    subject: String,
    body: BodyTemplate,
    cancel: CancellationToken,
}

impl Worker {
    async fn run(self) {
        let mut session: Option<SmtpSession> = None;

        loop {
            if self.cancel.is_cancelled() {
                debug!("Worker {} stopping on cancellation", self.id);
                break;
            }
            let Some((index, recipient)) = self.batch.queue.lock().await.pop_front() else {
                break;
            };
            let halted = self.batch.halted.lock().await.as_ref().map(Error::duplicate);
            if let Some(e) = halted {
                self.batch.record(index, Outcome::Failed(e)).await;
                continue;
            }

            // Stands in if this worker dies before reporting.
            self.batch
                .record(
                    index,
                    Outcome::Failed(Error::Dispatch("worker stopped mid-send".into())),
                )
                .await;
            let outcome = self.deliver(&mut session, &recipient).await;
            self.batch.record(index, outcome).await;
        }

        if let Some(mut session) = session {
            session.close().await;
        }
    }

    async fn deliver(&self, slot: &mut Option<SmtpSession>, recipient: &str) -> Outcome {
        let message = match self.coordinator.render(&self.body, &self.subject, recipient) {
            Ok(message) => message,
            Err(e) => return Outcome::Failed(e),
        };

        if slot.as_ref().is_none_or(|s| s.state() != SmtpState::Authenticated) {
            let mut fresh = self.coordinator.session();
            let opened = async {
                fresh.connect().await?;
                fresh.secure().await?;
                fresh.authenticate().await
            }
            .await;
            if let Err(e) = opened {
                fresh.close().await;
                if !e.is_retryable() {
                    warn!("Halting bulk send, session setup failed: {}", e);
                    let mut halted = self.batch.halted.lock().await;
                    if halted.is_none() {
                        *halted = Some(e.duplicate());
                    }
                }
                return Outcome::Failed(e);
            }
            *slot = Some(fresh);
        }
        let Some(session) = slot.as_mut() else {
            return Outcome::Failed(Error::Dispatch("no session available".into()));
        };

        match session.submit(&message).await {
            Ok(report) => Outcome::Sent {
                message_id: report.message_id,
            },
            Err(Error::RecipientRejected { code, message, .. }) => {
                Outcome::Rejected { code, message }
            }
            Err(e) => {
                warn!("Send to {} failed: {}", recipient, e);
                Outcome::Failed(e)
            }
        }
    }
}
