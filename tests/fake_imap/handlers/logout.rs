//! LOGOUT command handler.
//!
//! The server sends an untagged BYE, then the tagged OK, then closes
//! the connection. LOGOUT never expunges anything.

use crate::fake_imap::io::write_line;
use tokio::io::{AsyncRead, AsyncWrite, BufReader};

pub async fn handle_logout<S: AsyncRead + AsyncWrite + Unpin>(
    tag: &str,
    stream: &mut BufReader<S>,
) {
    let _ = write_line(stream, "* BYE Logging out\r\n").await;
    let resp = format!("{tag} OK LOGOUT completed\r\n");
    let _ = write_line(stream, &resp).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake_imap::handlers::testing::{drain, pipe};

    #[tokio::test]
    async fn bye_comes_before_tagged_ok() {
        let (client, mut stream) = pipe();
        handle_logout("X1", &mut stream).await;
        drop(stream);
        let output = drain(client).await;

        let bye = output.find("* BYE").unwrap();
        let ok = output.find("X1 OK LOGOUT completed").unwrap();
        assert!(bye < ok);
    }
}
