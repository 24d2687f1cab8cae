//! SMTP reply parsing and DATA encoding

use crate::auth::Mechanisms;
use crate::error::{Error, Result};
use crate::transport::LineStream;

/// A complete, possibly multi-line, server reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub code: u16,
    pub lines: Vec<String>,
}

impl Reply {
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.code >= 200 && self.code < 300
    }

    #[must_use]
    pub const fn is_intermediate(&self) -> bool {
        self.code >= 300 && self.code < 400
    }

    #[must_use]
    pub const fn is_transient(&self) -> bool {
        self.code >= 400 && self.code < 500
    }

    #[must_use]
    pub const fn is_permanent(&self) -> bool {
        self.code >= 500
    }

    #[must_use]
    pub fn text(&self) -> String {
        self.lines.join(" ")
    }

    /// Turn an unexpected reply into an [`Error::Smtp`].
    #[must_use]
    pub fn into_error(self) -> Error {
        Error::Smtp {
            code: self.code,
            message: self.text(),
        }
    }
}

/// Parse reply lines such as `250-First` / `250 Last`.
///
/// # Errors
///
/// Returns [`Error::Parse`] for empty input or a malformed code.
pub fn parse_reply(lines: &[String]) -> Result<Reply> {
    let first = lines
        .first()
        .ok_or_else(|| Error::Parse("empty SMTP reply".into()))?;
    let code = first
        .get(..3)
        .and_then(|c| c.parse::<u16>().ok())
        .ok_or_else(|| Error::Parse(format!("invalid SMTP reply: {first}")))?;

    let lines = lines
        .iter()
        .map(|l| l.get(4..).unwrap_or_default().to_string())
        .collect();
    Ok(Reply { code, lines })
}

/// Whether `line` ends a reply (`250 ` rather than `250-`).
#[must_use]
pub fn is_last_line(line: &str) -> bool {
    line.len() == 3 || line.as_bytes().get(3) == Some(&b' ')
}

/// Read one complete reply.
///
/// # Errors
///
/// Propagates I/O errors and timeouts from the stream.
pub async fn read_reply(stream: &mut LineStream, operation: &'static str) -> Result<Reply> {
    let mut lines = Vec::new();
    loop {
        let line = stream.read_line(operation).await?;
        if line.is_empty() {
            continue;
        }
        let last = is_last_line(&line);
        lines.push(line);
        if last {
            break;
        }
    }
    parse_reply(&lines)
}

/// Capabilities from an EHLO reply.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extensions {
    pub starttls: bool,
    pub auth: Mechanisms,
    pub size: Option<usize>,
    pub pipelining: bool,
    pub eight_bit_mime: bool,
}

impl Extensions {
    /// Parse the EHLO reply; the first line is the server greeting.
    #[must_use]
    pub fn from_ehlo(reply: &Reply) -> Self {
        let mut ext = Self::default();
        for line in reply.lines.iter().skip(1) {
            let mut words = line.split(|c: char| c.is_whitespace() || c == '=');
            let Some(keyword) = words.next() else {
                continue;
            };
            match keyword.to_ascii_uppercase().as_str() {
                "STARTTLS" => ext.starttls = true,
                "AUTH" => {
                    let more = Mechanisms::from_words(words);
                    ext.auth.plain |= more.plain;
                    ext.auth.login |= more.login;
                    ext.auth.xoauth2 |= more.xoauth2;
                }
                "SIZE" => ext.size = words.next().and_then(|s| s.parse().ok()),
                "PIPELINING" => ext.pipelining = true,
                "8BITMIME" => ext.eight_bit_mime = true,
                _ => {}
            }
        }
        ext
    }
}

/// Normalize line endings to CRLF, escape leading dots and append the
/// terminating `.` line.
#[must_use]
pub fn encode_data(message: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(message.len() + 64);
    let body = message.strip_suffix(b"\n").unwrap_or(message);
    for line in body.split(|&b| b == b'\n') {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        if line.first() == Some(&b'.') {
            out.push(b'.');
        }
        out.extend_from_slice(line);
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(b".\r\n");
    out
}
