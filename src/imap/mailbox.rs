//! Mailbox listing and status types

use serde::Serialize;
use std::fmt;

/// The well-known role of a mailbox, from RFC 6154 attributes or, failing
/// that, its name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Inbox,
    Sent,
    Drafts,
    Trash,
    Junk,
    Archive,
}

impl Role {
    /// Guess the role from LIST attributes and the mailbox path.
    #[must_use]
    pub fn detect(attributes: &[String], path: &str) -> Option<Self> {
        if path.eq_ignore_ascii_case("INBOX") {
            return Some(Self::Inbox);
        }
        for attr in attributes {
            let attr = attr.trim_start_matches('\\').to_ascii_lowercase();
            let role = match attr.as_str() {
                "sent" => Self::Sent,
                "drafts" => Self::Drafts,
                "trash" => Self::Trash,
                "junk" => Self::Junk,
                "archive" | "all" => Self::Archive,
                _ => continue,
            };
            return Some(role);
        }

        let leaf = path.rsplit(['/', '.']).next().unwrap_or(path);
        match leaf.to_ascii_lowercase().as_str() {
            "sent" | "sent items" | "sent mail" => Some(Self::Sent),
            "drafts" => Some(Self::Drafts),
            "trash" | "deleted" | "deleted items" | "bin" => Some(Self::Trash),
            "spam" | "junk" | "junk e-mail" => Some(Self::Junk),
            "archive" | "all mail" => Some(Self::Archive),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Inbox => "inbox",
            Self::Sent => "sent",
            Self::Drafts => "drafts",
            Self::Trash => "trash",
            Self::Junk => "junk",
            Self::Archive => "archive",
        };
        f.write_str(name)
    }
}

/// One entry of a LIST response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MailboxInfo {
    /// Full path, as passed to SELECT.
    pub name: String,
    pub delimiter: Option<String>,
    pub attributes: Vec<String>,
    pub role: Option<Role>,
}

impl MailboxInfo {
    #[must_use]
    pub fn new(name: String, delimiter: Option<String>, attributes: Vec<String>) -> Self {
        let role = Role::detect(&attributes, &name);
        Self {
            name,
            delimiter,
            attributes,
            role,
        }
    }

    /// Whether the mailbox can be selected.
    #[must_use]
    pub fn is_selectable(&self) -> bool {
        !self
            .attributes
            .iter()
            .any(|a| a.to_ascii_lowercase().contains("noselect"))
    }
}

/// State of the selected mailbox as reported by SELECT / EXAMINE.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MailboxStatus {
    pub name: String,
    pub exists: u32,
    pub recent: u32,
    pub unseen: Option<u32>,
    pub uid_validity: Option<u32>,
    pub uid_next: Option<u32>,
    pub read_only: bool,
}

/// Find the first mailbox with `role` in a listing.
#[must_use]
pub fn find_role(mailboxes: &[MailboxInfo], role: Role) -> Option<&MailboxInfo> {
    mailboxes.iter().find(|m| m.role == Some(role))
}
