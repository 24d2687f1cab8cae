//! UID FETCH command handler.
//!
//! Message bodies travel as IMAP **counted literals**:
//!
//! ```text
//! * <seq> FETCH (UID <uid> FLAGS (<flags>) BODY[] {<length>}
//! <exactly length bytes of raw RFC 5322 message>
//! )
//! ```
//!
//! The fake server always answers with UID, FLAGS and BODY[] whatever
//! items were requested, and never sets `\Seen` (clients use
//! BODY.PEEK[]). UIDs that do not exist are silently skipped, as real
//! servers do.

use crate::fake_imap::handlers::extract_uids;
use crate::fake_imap::io::{write_bytes, write_line};
use crate::fake_imap::mailbox::Mailbox;
use imap_codec::imap_types::sequence::SequenceSet;
use tokio::io::{AsyncRead, AsyncWrite, BufReader};

/// Handle the UID FETCH command.
pub async fn handle_uid_fetch<S: AsyncRead + AsyncWrite + Unpin>(
    tag: &str,
    sequence_set: &SequenceSet,
    mailbox: &Mailbox,
    selected_folder: Option<&str>,
    stream: &mut BufReader<S>,
) {
    let Some(folder) = selected_folder.and_then(|name| mailbox.get_folder(name)) else {
        let resp = format!("{tag} BAD No folder selected\r\n");
        let _ = write_line(stream, &resp).await;
        return;
    };

    let max_uid = folder.emails.iter().map(|e| e.uid).max().unwrap_or(0);
    for uid in extract_uids(sequence_set, max_uid) {
        let Some(seq) = folder.position(uid).map(|i| i + 1) else {
            continue;
        };
        let email = &folder.emails[seq - 1];
        let header = format!(
            "* {seq} FETCH (UID {uid} FLAGS {} BODY[] {{{}}}\r\n",
            email.flag_list(),
            email.raw.len()
        );
        if write_line(stream, &header).await.is_err()
            || write_bytes(stream, &email.raw).await.is_err()
            || write_line(stream, ")\r\n").await.is_err()
        {
            return;
        }
    }

    let resp = format!("{tag} OK FETCH completed\r\n");
    let _ = write_line(stream, &resp).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake_imap::handlers::testing::{drain, pipe};
    use crate::fake_imap::mailbox::MailboxBuilder;
    use imap_codec::imap_types::sequence::{SeqOrUid, Sequence};
    use std::num::NonZeroU32;

    const RAW: &[u8] = b"From: a@b.com\r\nSubject: Test\r\n\r\nBody";

    fn uid_set(uids: &[u32]) -> SequenceSet {
        let seqs: Vec<Sequence> = uids
            .iter()
            .map(|&uid| Sequence::Single(SeqOrUid::Value(NonZeroU32::new(uid).unwrap())))
            .collect();
        SequenceSet(seqs.try_into().unwrap())
    }

    async fn run(uids: &[u32], mailbox: &Mailbox, selected: Option<&str>) -> String {
        let (client, mut stream) = pipe();
        handle_uid_fetch("A1", &uid_set(uids), mailbox, selected, &mut stream).await;
        drop(stream);
        drain(client).await
    }

    #[tokio::test]
    async fn fetches_body_and_flags_by_uid() {
        let mailbox = MailboxBuilder::new()
            .folder("INBOX")
            .email(40, false, RAW)
            .email_with_flags(42, &["\\Flagged", "\\Seen"], RAW)
            .build();

        let output = run(&[42], &mailbox, Some("INBOX")).await;

        let expected = format!("* 2 FETCH (UID 42 FLAGS (\\Flagged \\Seen) BODY[] {{{}}}\r\n", RAW.len());
        assert!(output.starts_with(&expected));
        assert!(output.contains("From: a@b.com"));
        assert!(output.ends_with(")\r\nA1 OK FETCH completed\r\n"));
    }

    #[tokio::test]
    async fn missing_uids_are_skipped() {
        let mailbox = MailboxBuilder::new().folder("INBOX").email(1, true, RAW).build();

        let output = run(&[99, 1], &mailbox, Some("INBOX")).await;

        assert!(!output.contains("UID 99"));
        assert!(output.contains("* 1 FETCH (UID 1 FLAGS (\\Seen)"));
    }

    #[tokio::test]
    async fn no_folder_selected_returns_bad() {
        let mailbox = MailboxBuilder::new().folder("INBOX").build();
        let output = run(&[1], &mailbox, None).await;
        assert_eq!(output, "A1 BAD No folder selected\r\n");
    }
}
