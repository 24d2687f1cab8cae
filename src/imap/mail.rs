//! Parsed messages fetched over IMAP

use super::flag::Flag;
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use mailparse::{DispositionType, MailAddr, ParsedMail};
use serde::Serialize;

/// A mailbox address from a header.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MailAddress {
    pub name: Option<String>,
    pub email: String,
}

impl std::fmt::Display for MailAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{name} <{}>", self.email),
            None => f.write_str(&self.email),
        }
    }
}

/// A non-body MIME part.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MailAttachment {
    pub filename: Option<String>,
    pub content_type: String,
    pub size: usize,
    #[serde(skip)]
    pub content: Vec<u8>,
}

/// One message read from a mailbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MailItem {
    pub uid: u32,
    pub subject: String,
    pub from: Vec<MailAddress>,
    pub to: Vec<MailAddress>,
    pub cc: Vec<MailAddress>,
    pub date: Option<DateTime<Utc>>,
    pub message_id: Option<String>,
    pub flags: Vec<Flag>,
    pub headers: Vec<(String, String)>,
    pub text: Option<String>,
    pub html: Option<String>,
    pub attachments: Vec<MailAttachment>,
    /// The RFC 5322 source as fetched.
    #[serde(skip)]
    pub raw: Vec<u8>,
}

impl MailItem {
    /// Parse a fetched RFC 5322 body.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] if the MIME structure cannot be read.
    pub fn parse(uid: u32, flags: Vec<Flag>, raw: &[u8]) -> Result<Self> {
        let parsed = mailparse::parse_mail(raw).map_err(|e| Error::Parse(e.to_string()))?;

        let header = |name: &str| {
            parsed
                .headers
                .iter()
                .find(|h| h.get_key().eq_ignore_ascii_case(name))
                .map(mailparse::MailHeader::get_value)
        };

        let date = header("Date")
            .and_then(|d| mailparse::dateparse(&d).ok())
            .and_then(|ts| DateTime::<Utc>::from_timestamp(ts, 0));

        let mut item = Self {
            uid,
            subject: header("Subject").unwrap_or_default(),
            from: addresses(header("From").as_deref()),
            to: addresses(header("To").as_deref()),
            cc: addresses(header("Cc").as_deref()),
            date,
            message_id: header("Message-ID"),
            flags,
            headers: parsed
                .headers
                .iter()
                .map(|h| (h.get_key(), h.get_value()))
                .collect(),
            text: None,
            html: None,
            attachments: Vec::new(),
            raw: raw.to_vec(),
        };
        collect_parts(&parsed, &mut item);
        Ok(item)
    }

    #[must_use]
    pub fn is_seen(&self) -> bool {
        self.flags.contains(&Flag::Seen)
    }

    /// Plain text, or the HTML body when there is no text part.
    #[must_use]
    pub fn best_text(&self) -> &str {
        self.text
            .as_deref()
            .or(self.html.as_deref())
            .unwrap_or_default()
    }
}

fn addresses(value: Option<&str>) -> Vec<MailAddress> {
    let Some(value) = value.filter(|v| !v.trim().is_empty()) else {
        return Vec::new();
    };
    let Ok(list) = mailparse::addrparse(value) else {
        return vec![MailAddress {
            name: None,
            email: value.trim().to_string(),
        }];
    };
    list.iter()
        .flat_map(|addr| match addr {
            MailAddr::Single(info) => vec![info.clone()],
            MailAddr::Group(group) => group.addrs.clone(),
        })
        .map(|info| MailAddress {
            name: info.display_name,
            email: info.addr,
        })
        .collect()
}

fn collect_parts(part: &ParsedMail<'_>, item: &mut MailItem) {
    if !part.subparts.is_empty() {
        for sub in &part.subparts {
            collect_parts(sub, item);
        }
        return;
    }

    let content_type = part.ctype.mimetype.to_ascii_lowercase();
    let disposition = part.get_content_disposition();
    let is_attachment = disposition.disposition == DispositionType::Attachment
        || (disposition.disposition == DispositionType::Inline
            && !content_type.starts_with("text/"));

    if is_attachment {
        let content = part.get_body_raw().unwrap_or_default();
        let filename = disposition
            .params
            .get("filename")
            .or_else(|| part.ctype.params.get("name"))
            .cloned();
        item.attachments.push(MailAttachment {
            filename,
            content_type,
            size: content.len(),
            content,
        });
    } else if content_type == "text/plain" && item.text.is_none() {
        item.text = part.get_body().ok();
    } else if content_type == "text/html" && item.html.is_none() {
        item.html = part.get_body().ok();
    }
}
