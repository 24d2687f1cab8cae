//! Outgoing message assembly
//!
//! [`MessageBuilder`] turns a [`Message`] into a [`WireMessage`]: the RFC
//! 5322 bytes plus the SMTP envelope. Bcc addresses only ever reach the
//! envelope.
//!
//! Output is deterministic for a given message apart from the `Date` and
//! `Message-ID` headers, which are regenerated on every build. MIME
//! boundaries are derived from the message content.

use crate::address::{SharedValidator, validate_with};
use crate::error::{Error, Result};
use lettre::message::header::ContentType;
use lettre::message::{Mailbox, MultiPart, SinglePart};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::Path;
use tracing::{debug, warn};

/// A file attached to an outgoing message.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Attachment {
    pub filename: String,
    pub content: Vec<u8>,
    /// Explicit MIME type; guessed from the filename when `None`.
    pub mime_type: Option<String>,
}

impl Attachment {
    #[must_use]
    pub fn new(filename: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            filename: filename.into(),
            content: content.into(),
            mime_type: None,
        }
    }

    #[must_use]
    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    /// Read an attachment from disk, named after the file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the file cannot be read.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read(path).await?;
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("attachment")
            .to_string();
        Ok(Self::new(filename, content))
    }

    /// Resolved MIME type, falling back to `application/octet-stream`.
    #[must_use]
    pub fn content_type(&self) -> String {
        self.mime_type.clone().unwrap_or_else(|| {
            mime_guess::from_path(&self.filename)
                .first_or_octet_stream()
                .to_string()
        })
    }
}

/// Load every readable file in `paths`; unreadable ones are logged and
/// skipped.
pub async fn load_attachments<P: AsRef<Path>>(paths: &[P]) -> Vec<Attachment> {
    let mut attachments = Vec::with_capacity(paths.len());
    for path in paths {
        match Attachment::from_path(path).await {
            Ok(a) => attachments.push(a),
            Err(e) => warn!("Skipping attachment {}: {}", path.as_ref().display(), e),
        }
    }
    attachments
}

/// A message as the caller describes it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Message {
    /// Overrides the session's address as sender and envelope-from.
    pub from: Option<String>,
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub bcc: Vec<String>,
    pub subject: String,
    pub text_body: Option<String>,
    pub html_body: Option<String>,
    pub attachments: Vec<Attachment>,
    pub reply_to: Option<String>,
}

impl Message {
    #[must_use]
    pub fn new(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn sender(mut self, address: impl Into<String>) -> Self {
        self.from = Some(address.into());
        self
    }

    #[must_use]
    pub fn to(mut self, address: impl Into<String>) -> Self {
        self.to.push(address.into());
        self
    }

    #[must_use]
    pub fn cc(mut self, address: impl Into<String>) -> Self {
        self.cc.push(address.into());
        self
    }

    #[must_use]
    pub fn bcc(mut self, address: impl Into<String>) -> Self {
        self.bcc.push(address.into());
        self
    }

    #[must_use]
    pub fn text(mut self, body: impl Into<String>) -> Self {
        self.text_body = Some(body.into());
        self
    }

    #[must_use]
    pub fn html(mut self, body: impl Into<String>) -> Self {
        self.html_body = Some(body.into());
        self
    }

    #[must_use]
    pub fn attach(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    #[must_use]
    pub fn reply_to(mut self, address: impl Into<String>) -> Self {
        self.reply_to = Some(address.into());
        self
    }

    /// Check the structural invariants: some body, some recipient.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidMessage`] when either is missing.
    pub fn check(&self) -> Result<()> {
        if self.text_body.is_none() && self.html_body.is_none() {
            return Err(Error::InvalidMessage("message has no body".into()));
        }
        if self.to.is_empty() && self.cc.is_empty() && self.bcc.is_empty() {
            return Err(Error::InvalidMessage("message has no recipients".into()));
        }
        Ok(())
    }
}

/// SMTP envelope: who the transport delivers for and to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub from: String,
    /// `to`, `cc` and `bcc`, deduplicated in that order.
    pub recipients: Vec<String>,
}

/// A built message ready for DATA.
#[derive(Debug, Clone)]
pub struct WireMessage {
    pub envelope: Envelope,
    pub message_id: String,
    bytes: Vec<u8>,
}

impl WireMessage {
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// The header section, up to the first empty line.
    #[must_use]
    pub fn headers(&self) -> &[u8] {
        self.bytes
            .windows(4)
            .position(|w| w == b"\r\n\r\n")
            .map_or(&self.bytes[..], |end| &self.bytes[..end + 2])
    }
}

/// Builds [`WireMessage`]s on behalf of one sender.
#[derive(Debug, Clone)]
pub struct MessageBuilder {
    default_from: String,
    reply_to: Option<String>,
    validator: Option<SharedValidator>,
}

impl MessageBuilder {
    #[must_use]
    pub fn new(default_from: impl Into<String>) -> Self {
        Self {
            default_from: default_from.into(),
            reply_to: None,
            validator: None,
        }
    }

    /// Reply-To used when the message does not set its own.
    #[must_use]
    pub fn with_reply_to(mut self, reply_to: Option<String>) -> Self {
        self.reply_to = reply_to;
        self
    }

    #[must_use]
    pub fn with_validator(mut self, validator: Option<SharedValidator>) -> Self {
        self.validator = validator;
        self
    }

    /// Assemble `message` into wire bytes and envelope.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidMessage`] for a message without body or
    /// recipients and [`Error::InvalidAddress`] for any unusable address.
    pub fn build(&self, message: &Message) -> Result<WireMessage> {
        message.check()?;

        let from = self.mailbox(message.from.as_deref().unwrap_or(&self.default_from))?;
        let to = self.mailboxes(&message.to)?;
        let cc = self.mailboxes(&message.cc)?;
        let bcc = self.mailboxes(&message.bcc)?;

        let mut recipients: Vec<String> = Vec::new();
        for mailbox in to.iter().chain(&cc).chain(&bcc) {
            let addr = mailbox.email.to_string();
            if !recipients.iter().any(|r| r.eq_ignore_ascii_case(&addr)) {
                recipients.push(addr);
            }
        }

        let envelope = lettre::address::Envelope::new(
            Some(from.email.clone()),
            recipients
                .iter()
                .map(|r| r.parse())
                .collect::<std::result::Result<Vec<lettre::Address>, _>>()
                .map_err(|e| Error::InvalidAddress(e.to_string()))?,
        )
        .map_err(|e| Error::InvalidMessage(e.to_string()))?;

        let mut builder = lettre::Message::builder()
            .from(from.clone())
            .subject(message.subject.clone())
            .date_now()
            .message_id(None)
            .envelope(envelope);
        for mailbox in to {
            builder = builder.to(mailbox);
        }
        for mailbox in cc {
            builder = builder.cc(mailbox);
        }
        if let Some(reply_to) = message.reply_to.as_ref().or(self.reply_to.as_ref()) {
            builder = builder.reply_to(self.mailbox(reply_to)?);
        }

        let boundary_seed = content_hash(message);
        let body = body_part(message, boundary_seed);
        let email = (if message.attachments.is_empty() {
            match body {
                Body::Single(part) => builder.singlepart(part),
                Body::Alternative(alt) => builder.multipart(alt),
            }
        } else {
            let mixed = MultiPart::mixed().boundary(boundary("mixed", boundary_seed));
            let mut mixed = match body {
                Body::Single(part) => mixed.singlepart(part),
                Body::Alternative(alt) => mixed.multipart(alt),
            };
            for attachment in &message.attachments {
                mixed = mixed.singlepart(attachment_part(attachment)?);
            }
            builder.multipart(mixed)
        })
        .map_err(|e| Error::InvalidMessage(e.to_string()))?;

        let message_id = email
            .headers()
            .get_raw("Message-ID")
            .unwrap_or_default()
            .to_string();
        debug!(
            "Built message {} for {} envelope recipients",
            message_id,
            recipients.len()
        );
        Ok(WireMessage {
            envelope: Envelope {
                from: from.email.to_string(),
                recipients,
            },
            message_id,
            bytes: email.formatted(),
        })
    }

    fn mailbox(&self, input: &str) -> Result<Mailbox> {
        let parsed: Mailbox = input
            .trim()
            .parse()
            .map_err(|e| Error::InvalidAddress(format!("{input}: {e}")))?;
        let normalized = validate_with(self.validator.as_deref(), &parsed.email.to_string())?;
        let email = normalized
            .parse()
            .map_err(|e| Error::InvalidAddress(format!("{normalized}: {e}")))?;
        Ok(Mailbox::new(parsed.name, email))
    }

    fn mailboxes(&self, inputs: &[String]) -> Result<Vec<Mailbox>> {
        inputs.iter().map(|a| self.mailbox(a)).collect()
    }
}

enum Body {
    Single(SinglePart),
    Alternative(MultiPart),
}

/// Text first, HTML second; HTML alone gets a derived text part.
fn body_part(message: &Message, seed: u64) -> Body {
    match (&message.text_body, &message.html_body) {
        (Some(text), None) => Body::Single(SinglePart::plain(text.clone())),
        (text, Some(html)) => {
            let text = text.clone().unwrap_or_else(|| html_to_text(html));
            Body::Alternative(
                MultiPart::alternative()
                    .boundary(boundary("alt", seed))
                    .singlepart(SinglePart::plain(text))
                    .singlepart(SinglePart::html(html.clone())),
            )
        }
        (None, None) => Body::Single(SinglePart::plain(String::new())),
    }
}

fn attachment_part(attachment: &Attachment) -> Result<SinglePart> {
    let content_type = ContentType::parse(&attachment.content_type())
        .or_else(|_| ContentType::parse("application/octet-stream"))
        .map_err(|e| Error::InvalidMessage(format!("{}: {e}", attachment.filename)))?;
    Ok(lettre::message::Attachment::new(attachment.filename.clone())
        .body(attachment.content.clone(), content_type))
}

fn content_hash(message: &Message) -> u64 {
    let mut hasher = DefaultHasher::new();
    message.hash(&mut hasher);
    hasher.finish()
}

fn boundary(kind: &str, seed: u64) -> String {
    format!("=_{kind}_{seed:016x}")
}

/// Plain-text rendition of an HTML body.
///
/// Tags are stripped, block elements become line breaks and the common
/// entities are decoded. Never returns an empty string.
#[must_use]
pub fn html_to_text(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut chars = html.chars().peekable();
    let mut skip_depth = 0usize;

    while let Some(c) = chars.next() {
        if c == '<' {
            let mut tag = String::new();
            for t in chars.by_ref() {
                if t == '>' {
                    break;
                }
                tag.push(t);
            }
            let name: String = tag
                .trim_start()
                .chars()
                .take_while(|c| c.is_ascii_alphanumeric() || *c == '/')
                .collect::<String>()
                .to_ascii_lowercase();
            match name.as_str() {
                "script" | "style" => skip_depth += 1,
                "/script" | "/style" => skip_depth = skip_depth.saturating_sub(1),
                "br" | "p" | "/p" | "div" | "/div" | "tr" | "/tr" | "li" | "/li" | "h1"
                | "/h1" | "h2" | "/h2" | "h3" | "/h3" | "/blockquote" => {
                    if !out.ends_with('\n') {
                        out.push('\n');
                    }
                }
                _ => {}
            }
        } else if skip_depth == 0 {
            out.push(c);
        }
    }

    let decoded = out
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&");

    let text = decoded
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n");

    if text.is_empty() {
        "(This message has no plain-text content.)".to_string()
    } else {
        text
    }
}
