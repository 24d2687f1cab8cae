//! LIST command handler.
//!
//! Responds with one `* LIST` line per folder, followed by the tagged
//! OK (RFC 3501 Section 7.2.2). Special-use attributes (RFC 6154) are
//! included when the folder has them:
//!
//! ```text
//! * LIST (\HasNoChildren) "/" "INBOX"
//! * LIST (\HasNoChildren \Trash) "/" "Trash"
//! A0002 OK LIST completed
//! ```

use crate::fake_imap::io::write_line;
use crate::fake_imap::mailbox::Mailbox;
use tokio::io::{AsyncRead, AsyncWrite, BufReader};

/// Handle the LIST command. Every folder matches; patterns are ignored.
pub async fn handle_list<S: AsyncRead + AsyncWrite + Unpin>(
    tag: &str,
    mailbox: &Mailbox,
    stream: &mut BufReader<S>,
) {
    for folder in &mailbox.folders {
        let mut attributes = vec!["\\HasNoChildren".to_string()];
        attributes.extend(folder.attributes.iter().cloned());
        let line = format!(
            "* LIST ({}) \"/\" \"{}\"\r\n",
            attributes.join(" "),
            folder.name
        );
        if write_line(stream, &line).await.is_err() {
            return;
        }
    }
    let resp = format!("{tag} OK LIST completed\r\n");
    let _ = write_line(stream, &resp).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake_imap::handlers::testing::{drain, pipe};
    use crate::fake_imap::mailbox::MailboxBuilder;

    async fn run(tag: &str, mailbox: &Mailbox) -> String {
        let (client, mut stream) = pipe();
        handle_list(tag, mailbox, &mut stream).await;
        drop(stream);
        drain(client).await
    }

    #[tokio::test]
    async fn lists_all_folders_with_attributes() {
        let mailbox = MailboxBuilder::new()
            .folder("INBOX")
            .special_folder("Sent", "\\Sent")
            .special_folder("Trash", "\\Trash")
            .build();

        let output = run("A1", &mailbox).await;

        assert!(output.contains("* LIST (\\HasNoChildren) \"/\" \"INBOX\""));
        assert!(output.contains("(\\HasNoChildren \\Sent) \"/\" \"Sent\""));
        assert!(output.contains("(\\HasNoChildren \\Trash) \"/\" \"Trash\""));
        assert!(output.ends_with("A1 OK LIST completed\r\n"));
    }

    #[tokio::test]
    async fn empty_mailbox_returns_only_ok() {
        let output = run("T2", &MailboxBuilder::new().build()).await;
        assert_eq!(output, "T2 OK LIST completed\r\n");
    }
}
