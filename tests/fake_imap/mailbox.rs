//! Test data model for the fake IMAP server
//!
//! Provides a builder-style API for constructing mailbox state:
//!
//! ```ignore
//! let mailbox = MailboxBuilder::new()
//!     .folder("INBOX")
//!         .email(1, false, raw_rfc5322_bytes)
//!         .email(2, true, raw_rfc5322_bytes)
//!     .special_folder("Trash", "\\Trash")
//!     .build();
//! ```
//!
//! The server shares the `Mailbox` behind a mutex, so STORE, COPY,
//! MOVE and EXPUNGE change what later commands (and test assertions)
//! see.

use std::collections::BTreeSet;

/// A complete mailbox: a collection of named folders.
#[derive(Debug, Clone, Default)]
pub struct Mailbox {
    pub folders: Vec<Folder>,
}

impl Mailbox {
    /// Look up a folder by name. `INBOX` is case-insensitive, every
    /// other name is matched exactly.
    pub fn get_folder(&self, name: &str) -> Option<&Folder> {
        self.folders.iter().find(|f| same_folder(&f.name, name))
    }

    pub fn get_folder_mut(&mut self, name: &str) -> Option<&mut Folder> {
        self.folders.iter_mut().find(|f| same_folder(&f.name, name))
    }
}

fn same_folder(a: &str, b: &str) -> bool {
    if a.eq_ignore_ascii_case("INBOX") {
        b.eq_ignore_ascii_case("INBOX")
    } else {
        a == b
    }
}

/// A single IMAP folder (e.g. "INBOX", "Sent", "Trash").
#[derive(Debug, Clone)]
pub struct Folder {
    pub name: String,
    /// Extra LIST attributes such as `\Trash`.
    pub attributes: Vec<String>,
    pub emails: Vec<TestEmail>,
    /// Next UID to assign. Never goes backwards, so expunged UIDs are
    /// not reused.
    pub uid_next: u32,
}

impl Folder {
    /// Append a copy of `raw` with a fresh UID.
    pub fn append(&mut self, flags: BTreeSet<String>, raw: Vec<u8>) -> u32 {
        let uid = self.uid_next;
        self.uid_next += 1;
        self.emails.push(TestEmail { uid, flags, raw });
        uid
    }

    pub fn position(&self, uid: u32) -> Option<usize> {
        self.emails.iter().position(|e| e.uid == uid)
    }
}

/// A test email stored in a folder.
///
/// - `uid`: IMAP UID, unique per folder and never reused.
/// - `flags`: system flags and keywords in wire form (`\Seen`).
/// - `raw`: the complete RFC 5322 message, returned by FETCH BODY[].
#[derive(Debug, Clone)]
pub struct TestEmail {
    pub uid: u32,
    pub flags: BTreeSet<String>,
    pub raw: Vec<u8>,
}

impl TestEmail {
    pub fn has_flag(&self, flag: &str) -> bool {
        self.flags.iter().any(|f| f.eq_ignore_ascii_case(flag))
    }

    pub fn seen(&self) -> bool {
        self.has_flag("\\Seen")
    }

    pub fn deleted(&self) -> bool {
        self.has_flag("\\Deleted")
    }

    /// Flags as a parenthesized IMAP list.
    pub fn flag_list(&self) -> String {
        let flags: Vec<&str> = self.flags.iter().map(String::as_str).collect();
        format!("({})", flags.join(" "))
    }
}

/// Builder for constructing a `Mailbox` step by step.
///
/// Call `.folder(name)` to start a new folder, then chain
/// `.email(uid, seen, raw)` calls to add messages to it.
pub struct MailboxBuilder {
    folders: Vec<Folder>,
}

impl MailboxBuilder {
    pub fn new() -> Self {
        Self {
            folders: Vec::new(),
        }
    }

    /// Add a new folder. Subsequent `.email()` calls add to this folder.
    pub fn folder(self, name: &str) -> Self {
        self.special_folder(name, "")
    }

    /// Add a folder carrying a special-use attribute such as `\Sent`.
    pub fn special_folder(mut self, name: &str, attribute: &str) -> Self {
        let attributes = if attribute.is_empty() {
            Vec::new()
        } else {
            vec![attribute.to_string()]
        };
        self.folders.push(Folder {
            name: name.to_string(),
            attributes,
            emails: Vec::new(),
            uid_next: 1,
        });
        self
    }

    /// Add an email to the most recently added folder.
    ///
    /// # Panics
    ///
    /// Panics if called before any `.folder()` call.
    pub fn email(self, uid: u32, seen: bool, raw: &[u8]) -> Self {
        let flags: &[&str] = if seen { &["\\Seen"] } else { &[] };
        self.email_with_flags(uid, flags, raw)
    }

    /// Add an email with an explicit flag set.
    pub fn email_with_flags(mut self, uid: u32, flags: &[&str], raw: &[u8]) -> Self {
        let folder = self
            .folders
            .last_mut()
            .expect("call .folder() before .email()");
        folder.emails.push(TestEmail {
            uid,
            flags: flags.iter().map(ToString::to_string).collect(),
            raw: raw.to_vec(),
        });
        folder.uid_next = folder.uid_next.max(uid + 1);
        self
    }

    /// Consume the builder and return the finished `Mailbox`.
    pub fn build(self) -> Mailbox {
        Mailbox {
            folders: self.folders,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uid_next_follows_highest_uid() {
        let mailbox = MailboxBuilder::new()
            .folder("INBOX")
            .email(5, false, b"x")
            .email(9, true, b"y")
            .build();
        let inbox = mailbox.get_folder("inbox").unwrap();
        assert_eq!(inbox.uid_next, 10);
        assert!(inbox.emails[1].seen());
        assert_eq!(inbox.emails[1].flag_list(), "(\\Seen)");
    }

    #[test]
    fn append_never_reuses_uids() {
        let mut mailbox = MailboxBuilder::new().folder("Archive").email(3, false, b"x").build();
        let archive = mailbox.get_folder_mut("Archive").unwrap();
        archive.emails.clear();
        assert_eq!(archive.append(BTreeSet::new(), b"y".to_vec()), 4);
        assert!(mailbox.get_folder("archive").is_none());
    }
}
