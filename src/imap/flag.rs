//! IMAP message flags
//!
//! System flags have dedicated variants; anything else is a
//! [`Flag::Keyword`]. Flags serialize to their wire form (`\Seen`).

use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// An IMAP message flag.
///
/// # Examples
///
/// ```
/// use mailtoolbox::Flag;
///
/// assert_eq!(Flag::Seen.as_imap_str(), "\\Seen");
/// assert_eq!("\\seen".parse::<Flag>().unwrap(), Flag::Seen);
/// assert_eq!(Flag::from("$Important"), Flag::Keyword("$Important".into()));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Flag {
    Seen,
    Answered,
    Flagged,
    /// Marked for removal by the next EXPUNGE.
    Deleted,
    Draft,
    /// Session-scoped; servers ignore attempts to set it.
    Recent,
    Keyword(String),
}

impl Flag {
    /// The IMAP wire representation of this flag.
    #[must_use]
    pub fn as_imap_str(&self) -> &str {
        match self {
            Self::Seen => "\\Seen",
            Self::Answered => "\\Answered",
            Self::Flagged => "\\Flagged",
            Self::Deleted => "\\Deleted",
            Self::Draft => "\\Draft",
            Self::Recent => "\\Recent",
            Self::Keyword(kw) => kw,
        }
    }

    /// Parenthesized list for STORE, e.g. `(\Seen \Flagged)`.
    #[must_use]
    pub fn store_list<'a>(flags: impl IntoIterator<Item = &'a Self>) -> String {
        let joined = flags
            .into_iter()
            .map(Self::as_imap_str)
            .collect::<Vec<_>>()
            .join(" ");
        format!("({joined})")
    }
}

impl From<&str> for Flag {
    fn from(s: &str) -> Self {
        let name = s.trim();
        match name.to_ascii_lowercase().as_str() {
            "\\seen" | "seen" => Self::Seen,
            "\\answered" | "answered" => Self::Answered,
            "\\flagged" | "flagged" => Self::Flagged,
            "\\deleted" | "deleted" => Self::Deleted,
            "\\draft" | "draft" => Self::Draft,
            "\\recent" => Self::Recent,
            _ => Self::Keyword(name.to_string()),
        }
    }
}

impl FromStr for Flag {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from(s))
    }
}

impl From<&async_imap::types::Flag<'_>> for Flag {
    fn from(flag: &async_imap::types::Flag<'_>) -> Self {
        use async_imap::types::Flag as Wire;
        match flag {
            Wire::Seen => Self::Seen,
            Wire::Answered => Self::Answered,
            Wire::Flagged => Self::Flagged,
            Wire::Deleted => Self::Deleted,
            Wire::Draft => Self::Draft,
            Wire::Recent => Self::Recent,
            Wire::Custom(c) => Self::Keyword(c.to_string()),
            other => Self::Keyword(format!("{other:?}")),
        }
    }
}

impl fmt::Display for Flag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_imap_str())
    }
}

impl Serialize for Flag {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_imap_str())
    }
}
