//! Exporting fetched messages
//!
//! The formatters work on any slice of [`MailItem`]; the `download_*`
//! helpers pair them with an authenticated [`ImapSession`], opening the
//! mailbox read-only so exporting never marks anything seen.

use crate::error::{Error, Result};
use crate::imap::{ImapSession, MailAddress, MailItem};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Default file name for [`download_mail_text`].
pub const TEXT_FILE_NAME: &str = "email.txt";

const SEPARATOR_WIDTH: usize = 60;

/// Render messages as a readable text dump.
#[must_use]
pub fn format_text(items: &[MailItem]) -> String {
    let mut out = String::new();
    for item in items {
        let date = item
            .date
            .map(|d| d.format("%a, %d %b %Y %H:%M:%S").to_string())
            .unwrap_or_default();
        // Writing to a String cannot fail.
        let _ = write!(
            out,
            "From: {}\nTo: {}\nDate: {}\nSubject: {}\n\n{}\n\n{}\n",
            join_addresses(&item.from),
            join_addresses(&item.to),
            date,
            item.subject,
            item.best_text(),
            "-".repeat(SEPARATOR_WIDTH),
        );
    }
    out
}

/// Render messages as a pretty-printed JSON array.
///
/// # Errors
///
/// Returns [`Error::Parse`] if serialization fails.
pub fn format_json(items: &[MailItem]) -> Result<String> {
    serde_json::to_string_pretty(items).map_err(|e| Error::Parse(e.to_string()))
}

/// Write the raw RFC 5322 source of `item` to `path`.
///
/// # Errors
///
/// Returns [`Error::Io`] if the file cannot be written.
pub async fn save_eml(item: &MailItem, path: impl AsRef<Path>) -> Result<PathBuf> {
    let path = path.as_ref();
    tokio::fs::write(path, &item.raw).await?;
    debug!("Saved UID {} to {}", item.uid, path.display());
    Ok(path.to_path_buf())
}

/// Write every named attachment of `item` into `dir`, creating it if
/// needed. Unnamed parts are skipped. Only the final path component of an
/// attachment name is used.
///
/// # Errors
///
/// Returns [`Error::Io`] if the directory or a file cannot be written.
pub async fn save_attachments(item: &MailItem, dir: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
    let dir = dir.as_ref();
    tokio::fs::create_dir_all(dir).await?;

    let mut saved = Vec::new();
    for attachment in &item.attachments {
        let Some(name) = attachment
            .filename
            .as_deref()
            .and_then(|f| Path::new(f).file_name())
        else {
            continue;
        };
        let target = dir.join(name);
        tokio::fs::write(&target, &attachment.content).await?;
        saved.push(target);
    }
    debug!("Saved {} attachment(s) of UID {}", saved.len(), item.uid);
    Ok(saved)
}

/// Dump every message in `mailbox` into `dir/email.txt`.
///
/// # Errors
///
/// Any error from selecting, searching or fetching, or from writing the
/// file.
pub async fn download_mail_text(
    session: &mut ImapSession,
    mailbox: &str,
    dir: impl AsRef<Path>,
) -> Result<PathBuf> {
    let items = collect(session, mailbox, "ALL").await?;
    let out = dir.as_ref().join(TEXT_FILE_NAME);
    tokio::fs::write(&out, format_text(&items)).await?;
    info!("Exported {} message(s) to {}", items.len(), out.display());
    Ok(out)
}

/// JSON for the messages in `mailbox` matching `criteria`, also written to
/// `save_to` when given.
///
/// # Errors
///
/// Any error from selecting, searching or fetching, or from writing the
/// file.
pub async fn download_mail_json(
    session: &mut ImapSession,
    mailbox: &str,
    criteria: &str,
    save_to: Option<&Path>,
) -> Result<String> {
    let items = collect(session, mailbox, criteria).await?;
    let json = format_json(&items)?;
    if let Some(path) = save_to {
        tokio::fs::write(path, &json).await?;
        info!("Exported {} message(s) to {}", items.len(), path.display());
    }
    Ok(json)
}

/// Save each message in `mailbox` matching `criteria` as
/// `email_<index>_<uid>.eml` under `dir`.
///
/// # Errors
///
/// Any error from selecting, searching or fetching, or from writing the
/// files.
pub async fn download_mail_eml(
    session: &mut ImapSession,
    mailbox: &str,
    criteria: &str,
    dir: impl AsRef<Path>,
) -> Result<Vec<PathBuf>> {
    let dir = dir.as_ref();
    tokio::fs::create_dir_all(dir).await?;

    let items = collect(session, mailbox, criteria).await?;
    let mut paths = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        let path = dir.join(format!("email_{i}_{}.eml", item.uid));
        paths.push(save_eml(item, path).await?);
    }
    info!("Exported {} message(s) to {}", paths.len(), dir.display());
    Ok(paths)
}

async fn collect(session: &mut ImapSession, mailbox: &str, criteria: &str) -> Result<Vec<MailItem>> {
    session.examine(mailbox).await?;
    let uids = session.search(criteria).await?;
    let fetched = session.fetch_many(&uids).await?;
    Ok(fetched
        .into_iter()
        .filter_map(|r| r.map_err(|e| warn!("Skipping message: {}", e)).ok())
        .collect())
}

fn join_addresses(addrs: &[MailAddress]) -> String {
    addrs
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
