//! CAPABILITY command handler.
//!
//! What the server advertises depends on its options and on whether the
//! connection is already encrypted: STARTTLS disappears after the
//! upgrade, as RFC 3501 requires.

use crate::fake_imap::io::write_line;
use crate::fake_imap::server::ServerOptions;
use tokio::io::{AsyncRead, AsyncWrite, BufReader};

/// The capability words for the current connection state.
pub fn capabilities(options: &ServerOptions, encrypted: bool) -> String {
    let mut caps = vec!["IMAP4rev1"];
    if options.advertise_starttls && !encrypted {
        caps.push("STARTTLS");
    }
    caps.push("AUTH=PLAIN");
    if options.xoauth2_token.is_some() {
        caps.push("AUTH=XOAUTH2");
    }
    if options.move_ext {
        caps.push("MOVE");
    }
    caps.join(" ")
}

/// Handle the CAPABILITY command.
pub async fn handle_capability<S: AsyncRead + AsyncWrite + Unpin>(
    tag: &str,
    options: &ServerOptions,
    encrypted: bool,
    stream: &mut BufReader<S>,
) {
    let line = format!("* CAPABILITY {}\r\n", capabilities(options, encrypted));
    let _ = write_line(stream, &line).await;
    let resp = format!("{tag} OK CAPABILITY completed\r\n");
    let _ = write_line(stream, &resp).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake_imap::handlers::testing::{drain, pipe};

    async fn run(tag: &str, options: &ServerOptions, encrypted: bool) -> String {
        let (client, mut stream) = pipe();
        handle_capability(tag, options, encrypted, &mut stream).await;
        drop(stream);
        drain(client).await
    }

    #[tokio::test]
    async fn advertises_starttls_before_upgrade_only() {
        let options = ServerOptions::default();
        let before = run("A1", &options, false).await;
        assert!(before.contains("* CAPABILITY IMAP4rev1 STARTTLS AUTH=PLAIN"));
        assert!(before.contains("A1 OK CAPABILITY completed"));

        let after = run("A2", &options, true).await;
        assert!(!after.contains("STARTTLS"));
    }

    #[test]
    fn optional_extensions() {
        let options = ServerOptions {
            xoauth2_token: Some("tok".into()),
            move_ext: true,
            ..ServerOptions::default()
        };
        let caps = capabilities(&options, true);
        assert!(caps.contains("AUTH=XOAUTH2"));
        assert!(caps.ends_with("MOVE"));
    }
}
