//! IMAP mailbox access
//!
//! [`ImapSession`] wraps one authenticated connection. Messages come back
//! as parsed [`MailItem`]s.

mod flag;
mod mail;
mod mailbox;
mod session;

pub use flag::Flag;
pub use mail::{MailAddress, MailAttachment, MailItem};
pub use mailbox::{MailboxInfo, MailboxStatus, Role, find_role};
pub use session::{Capabilities, ImapSession, ImapState};
