//! In-process fake IMAP server for integration testing
//!
//! # Connection lifecycle
//!
//! ```text
//!   Client connects via TCP (or straight into TLS on an implicit port)
//!       |
//!   Server sends greeting: "* OK IMAP4rev1 ready\r\n"
//!       |
//!   CAPABILITY, then optionally STARTTLS and a TLS handshake
//!       |
//!   LOGIN or AUTHENTICATE XOAUTH2
//!       |
//!   LIST, SELECT/EXAMINE, UID SEARCH/FETCH/STORE/COPY/MOVE, EXPUNGE
//!       |
//!   LOGOUT
//! ```
//!
//! Every client command starts with a **tag** the server echoes in its
//! completion line. Lines prefixed with `*` are untagged data sent
//! before the final tagged OK/NO/BAD.
//!
//! Most commands are parsed with `imap-codec`. STARTTLS, LOGIN,
//! AUTHENTICATE and UID MOVE are split by hand because the codec either
//! gates them behind features or needs a continuation round trip.

use super::handlers::{
    StoreArgs, extract_uids, handle_authenticate, handle_capability, handle_expunge, handle_list,
    handle_login, handle_logout, handle_select, handle_uid_copy, handle_uid_fetch,
    handle_uid_search, handle_uid_store, parse_uid_list, unquote,
};
use super::io::write_line;
use super::mailbox::Mailbox;
use imap_codec::CommandCodec;
use imap_codec::decode::Decoder;
use imap_codec::imap_types::command::CommandBody;
use imap_codec::imap_types::mailbox::Mailbox as ImapMailbox;
use rcgen::generate_simple_self_signed;
use rustls::pki_types::PrivatePkcs8KeyDer;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::TlsAcceptor;

/// How a fake server behaves on the wire.
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Start TLS right after accept, as on port 993.
    pub implicit_tls: bool,
    /// Offer and accept STARTTLS on the cleartext connection.
    pub advertise_starttls: bool,
    /// Accept AUTHENTICATE XOAUTH2 with this bearer token.
    pub xoauth2_token: Option<String>,
    /// Reject LOGIN unless the password matches.
    pub password: Option<String>,
    /// Advertise and serve the MOVE extension.
    pub move_ext: bool,
    /// Stop answering once a mailbox is selected.
    pub stall_after_select: bool,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            implicit_tls: false,
            advertise_starttls: true,
            xoauth2_token: None,
            password: None,
            move_ext: false,
            stall_after_select: false,
        }
    }
}

/// A fake IMAP server on localhost with an OS-assigned port.
///
/// The server generates a self-signed certificate at startup with
/// `rcgen`, so clients must run with invalid certificates allowed
/// unless a test is checking that they are refused.
pub struct FakeImapServer {
    port: u16,
    mailbox: Arc<Mutex<Mailbox>>,
    _handle: tokio::task::JoinHandle<()>,
}

impl FakeImapServer {
    /// Start a STARTTLS server with default options.
    pub async fn start(mailbox: Mailbox) -> Self {
        Self::with_options(mailbox, ServerOptions::default()).await
    }

    /// Start a server with explicit options. It runs until dropped.
    pub async fn with_options(mailbox: Mailbox, options: ServerOptions) -> Self {
        // Several tests may race to install the provider; losing is fine.
        let _ = rustls::crypto::ring::default_provider().install_default();

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind to ephemeral port");
        let port = listener.local_addr().unwrap().port();

        let cert = generate_simple_self_signed(vec!["127.0.0.1".to_string()])
            .expect("generate self-signed cert");
        let cert_der = cert.cert.der().clone();
        let key_der = PrivatePkcs8KeyDer::from(cert.key_pair.serialize_der());
        let tls_config = rustls::ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(vec![cert_der], key_der.into())
            .expect("build server TLS config");

        let acceptor = TlsAcceptor::from(Arc::new(tls_config));
        let mailbox = Arc::new(Mutex::new(mailbox));
        let options = Arc::new(options);

        let shared = mailbox.clone();
        let handle = tokio::spawn(async move {
            loop {
                let Ok((stream, _addr)) = listener.accept().await else {
                    break;
                };
                let acceptor = acceptor.clone();
                let mailbox = shared.clone();
                let options = options.clone();
                tokio::spawn(async move {
                    handle_connection(stream, acceptor, &mailbox, &options).await;
                });
            }
        });

        Self {
            port,
            mailbox,
            _handle: handle,
        }
    }

    /// The port the server is listening on.
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// A copy of the current mailbox state.
    pub fn snapshot(&self) -> Mailbox {
        self.mailbox.lock().unwrap().clone()
    }
}

/// Result of a command loop: the client left, or asked for STARTTLS.
enum Exit<S> {
    Closed,
    StartTls(BufReader<S>),
}

async fn handle_connection(
    stream: TcpStream,
    acceptor: TlsAcceptor,
    mailbox: &Mutex<Mailbox>,
    options: &ServerOptions,
) {
    if options.implicit_tls {
        let Ok(tls) = acceptor.accept(stream).await else {
            return;
        };
        let mut reader = BufReader::new(tls);
        if greet(&mut reader).await {
            run_session(reader, true, mailbox, options).await;
        }
        return;
    }

    let mut reader = BufReader::new(stream);
    if !greet(&mut reader).await {
        return;
    }
    let Exit::StartTls(reader) = run_session(reader, false, mailbox, options).await else {
        return;
    };
    let Ok(tls) = acceptor.accept(reader.into_inner()).await else {
        return;
    };
    run_session(BufReader::new(tls), true, mailbox, options).await;
}

async fn greet<S: AsyncRead + AsyncWrite + Unpin>(reader: &mut BufReader<S>) -> bool {
    write_line(reader, "* OK IMAP4rev1 Fake server ready\r\n")
        .await
        .is_ok()
}

/// Extract the folder name from a parsed `imap_types::Mailbox`.
fn mailbox_name(mb: &ImapMailbox<'_>) -> String {
    match mb {
        ImapMailbox::Inbox => "INBOX".to_string(),
        ImapMailbox::Other(other) => {
            let bytes: &[u8] = other.as_ref();
            String::from_utf8_lossy(bytes).into_owned()
        }
    }
}

/// Run the IMAP command loop over one stream.
///
/// Read handlers get a `Mailbox` clone taken under the lock; write
/// handlers get `&Mutex<Mailbox>` and lock briefly to mutate.
#[allow(clippy::too_many_lines)]
async fn run_session<S: AsyncRead + AsyncWrite + Unpin>(
    mut reader: BufReader<S>,
    encrypted: bool,
    mailbox: &Mutex<Mailbox>,
    options: &ServerOptions,
) -> Exit<S> {
    let mut authenticated = false;
    let mut selected_folder: Option<String> = None;
    let codec = CommandCodec::default();

    loop {
        let mut line = String::new();
        match reader.read_line(&mut line).await {
            Ok(0) | Err(_) => return Exit::Closed,
            Ok(_) => {}
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if options.stall_after_select && selected_folder.is_some() {
            // Read and drop commands until the client hangs up.
            continue;
        }
        let (tag, rest) = trimmed.split_once(' ').unwrap_or((trimmed, ""));
        let (word, args) = rest.split_once(' ').unwrap_or((rest, ""));
        let word = word.to_ascii_uppercase();

        match word.as_str() {
            "STARTTLS" => {
                if encrypted || !options.advertise_starttls {
                    let resp = format!("{tag} BAD STARTTLS not available\r\n");
                    if write_line(&mut reader, &resp).await.is_err() {
                        return Exit::Closed;
                    }
                    continue;
                }
                let resp = format!("{tag} OK Begin TLS negotiation now\r\n");
                if write_line(&mut reader, &resp).await.is_err() {
                    return Exit::Closed;
                }
                return Exit::StartTls(reader);
            }
            "LOGIN" => {
                authenticated = handle_login(tag, args, options, &mut reader).await;
                continue;
            }
            "AUTHENTICATE" => {
                authenticated = handle_authenticate(tag, args, options, &mut reader).await;
                continue;
            }
            "CAPABILITY" | "LOGOUT" | "NOOP" => {}
            _ if !authenticated => {
                let resp = format!("{tag} NO Not authenticated\r\n");
                if write_line(&mut reader, &resp).await.is_err() {
                    return Exit::Closed;
                }
                continue;
            }
            _ => {}
        }

        if word == "UID" && args.to_ascii_uppercase().starts_with("MOVE ") {
            let (set, dest) = args[5..].split_once(' ').unwrap_or((&args[5..], ""));
            if options.move_ext {
                handle_uid_copy(
                    tag,
                    &parse_uid_list(set),
                    &unquote(dest),
                    true,
                    mailbox,
                    selected_folder.as_deref(),
                    &mut reader,
                )
                .await;
            } else {
                let resp = format!("{tag} BAD MOVE not supported\r\n");
                let _ = write_line(&mut reader, &resp).await;
            }
            continue;
        }

        let Ok((_, command)) = codec.decode(line.as_bytes()) else {
            let resp = format!("{tag} BAD Parse error\r\n");
            if write_line(&mut reader, &resp).await.is_err() {
                return Exit::Closed;
            }
            continue;
        };

        // Snapshot for read-only handlers.
        let snap = mailbox.lock().unwrap().clone();

        match command.body {
            CommandBody::Capability => {
                handle_capability(tag, options, encrypted, &mut reader).await;
            }
            CommandBody::Noop => {
                let resp = format!("{tag} OK NOOP completed\r\n");
                let _ = write_line(&mut reader, &resp).await;
            }
            CommandBody::List { .. } => {
                handle_list(tag, &snap, &mut reader).await;
            }
            CommandBody::Select { mailbox: mb, .. } => {
                let name = mailbox_name(&mb);
                selected_folder = handle_select(tag, &name, false, &snap, &mut reader).await;
            }
            CommandBody::Examine { mailbox: mb, .. } => {
                let name = mailbox_name(&mb);
                selected_folder = handle_select(tag, &name, true, &snap, &mut reader).await;
            }
            CommandBody::Search {
                criteria,
                uid: true,
                ..
            } => {
                handle_uid_search(
                    tag,
                    criteria.as_ref(),
                    &snap,
                    selected_folder.as_deref(),
                    &mut reader,
                )
                .await;
            }
            CommandBody::Fetch {
                sequence_set,
                uid: true,
                ..
            } => {
                handle_uid_fetch(
                    tag,
                    &sequence_set,
                    &snap,
                    selected_folder.as_deref(),
                    &mut reader,
                )
                .await;
            }
            CommandBody::Store {
                ref sequence_set,
                uid: true,
                ref kind,
                ref response,
                ref flags,
                ..
            } => {
                let args = StoreArgs {
                    sequence_set,
                    kind,
                    response,
                    flags,
                };
                handle_uid_store(
                    tag,
                    &args,
                    mailbox,
                    selected_folder.as_deref(),
                    &mut reader,
                )
                .await;
            }
            CommandBody::Copy {
                ref sequence_set,
                mailbox: ref dest_mb,
                uid: true,
            } => {
                let max_uid = selected_folder
                    .as_deref()
                    .and_then(|name| snap.get_folder(name))
                    .and_then(|f| f.emails.iter().map(|e| e.uid).max())
                    .unwrap_or(0);
                handle_uid_copy(
                    tag,
                    &extract_uids(sequence_set, max_uid),
                    &mailbox_name(dest_mb),
                    false,
                    mailbox,
                    selected_folder.as_deref(),
                    &mut reader,
                )
                .await;
            }
            CommandBody::Expunge => {
                handle_expunge(tag, mailbox, selected_folder.as_deref(), &mut reader).await;
            }
            CommandBody::Logout => {
                handle_logout(tag, &mut reader).await;
                return Exit::Closed;
            }
            _ => {
                let resp = format!("{tag} BAD Unknown command\r\n");
                if write_line(&mut reader, &resp).await.is_err() {
                    return Exit::Closed;
                }
            }
        }
    }
}
