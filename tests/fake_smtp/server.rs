//! In-process fake SMTP server.
//!
//! Replies follow RFC 5321: a three digit code, then `-` on every line
//! but the last of a multi-line reply. The message body arrives after
//! `354` as dot-stuffed lines ending with a lone `.`; the server undoes
//! the stuffing before recording it.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use rcgen::generate_simple_self_signed;
use rustls::pki_types::PrivatePkcs8KeyDer;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::TlsAcceptor;
use tokio_util::sync::CancellationToken;

const HOSTNAME: &str = "fake.test";

/// How a fake server behaves on the wire.
#[derive(Debug, Clone)]
pub struct SmtpOptions {
    /// Start TLS right after accept, as on port 465.
    pub implicit_tls: bool,
    /// Offer and accept STARTTLS on the cleartext connection.
    pub advertise_starttls: bool,
    /// Reject AUTH unless the password matches.
    pub password: Option<String>,
    /// Offer XOAUTH2 and accept this bearer token.
    pub xoauth2_token: Option<String>,
    /// Recipients refused at RCPT TO with 550.
    pub reject: Vec<String>,
    /// Accept connections but never say anything.
    pub silent: bool,
    /// Cancelled when a message is accepted, before the final `250`
    /// reply reaches the client.
    pub on_delivery: Option<CancellationToken>,
}

impl Default for SmtpOptions {
    fn default() -> Self {
        Self {
            implicit_tls: false,
            advertise_starttls: true,
            password: None,
            xoauth2_token: None,
            reject: Vec::new(),
            silent: false,
            on_delivery: None,
        }
    }
}

impl SmtpOptions {
    pub fn reject(mut self, address: &str) -> Self {
        self.reject.push(address.to_string());
        self
    }

    fn rejects(&self, address: &str) -> bool {
        self.reject.iter().any(|r| r.eq_ignore_ascii_case(address))
    }
}

/// One accepted message: envelope plus the unstuffed DATA.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub from: String,
    pub recipients: Vec<String>,
    pub data: String,
}

/// A fake SMTP server on localhost with an OS-assigned port and a
/// self-signed certificate.
pub struct FakeSmtpServer {
    port: u16,
    deliveries: Arc<Mutex<Vec<Delivery>>>,
    connections: Arc<AtomicUsize>,
    _handle: tokio::task::JoinHandle<()>,
}

impl FakeSmtpServer {
    /// Start a STARTTLS server with default options.
    pub async fn start() -> Self {
        Self::with_options(SmtpOptions::default()).await
    }

    /// Start a server with explicit options. It runs until dropped.
    pub async fn with_options(options: SmtpOptions) -> Self {
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

        let deliveries = Arc::new(Mutex::new(Vec::new()));
        let connections = Arc::new(AtomicUsize::new(0));
        let options = Arc::new(options);

        let (store, counter) = (deliveries.clone(), connections.clone());
        let handle = tokio::spawn(async move {
            loop {
                let Ok((stream, _addr)) = listener.accept().await else {
                    break;
                };
                counter.fetch_add(1, Ordering::SeqCst);
                let acceptor = acceptor.clone();
                let store = store.clone();
                let options = options.clone();
                tokio::spawn(async move {
                    handle_connection(stream, acceptor, &store, &options).await;
                });
            }
        });

        Self {
            port,
            deliveries,
            connections,
            _handle: handle,
        }
    }

    /// The port the server is listening on.
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Every message accepted so far, in arrival order.
    pub fn deliveries(&self) -> Vec<Delivery> {
        self.deliveries.lock().unwrap().clone()
    }

    /// Number of TCP connections accepted so far.
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

enum Exit<S> {
    Closed,
    StartTls(BufReader<S>),
}

async fn handle_connection(
    mut stream: TcpStream,
    acceptor: TlsAcceptor,
    store: &Mutex<Vec<Delivery>>,
    options: &SmtpOptions,
) {
    if options.silent {
        // Hold the socket open until the client gives up.
        let mut sink = Vec::new();
        let _ = stream.read_to_end(&mut sink).await;
        return;
    }

    if options.implicit_tls {
        let Ok(tls) = acceptor.accept(stream).await else {
            return;
        };
        run_session(BufReader::new(tls), true, store, options).await;
        return;
    }

    let Exit::StartTls(reader) = run_session(BufReader::new(stream), false, store, options).await
    else {
        return;
    };
    let Ok(tls) = acceptor.accept(reader.into_inner()).await else {
        return;
    };
    run_session(BufReader::new(tls), true, store, options).await;
}

async fn reply<S: AsyncRead + AsyncWrite + Unpin>(
    reader: &mut BufReader<S>,
    text: &str,
) -> std::io::Result<()> {
    reader.get_mut().write_all(text.as_bytes()).await?;
    reader.get_mut().write_all(b"\r\n").await?;
    reader.get_mut().flush().await
}

async fn read_line<S: AsyncRead + AsyncWrite + Unpin>(reader: &mut BufReader<S>) -> Option<String> {
    let mut line = String::new();
    match reader.read_line(&mut line).await {
        Ok(0) | Err(_) => None,
        Ok(_) => Some(line.trim_end_matches(['\r', '\n']).to_string()),
    }
}

fn ehlo_reply(options: &SmtpOptions, encrypted: bool) -> String {
    let mut lines = vec![format!("{HOSTNAME} greets you")];
    if options.advertise_starttls && !encrypted {
        lines.push("STARTTLS".to_string());
    }
    let mut auth = String::from("AUTH PLAIN LOGIN");
    if options.xoauth2_token.is_some() {
        auth.push_str(" XOAUTH2");
    }
    lines.push(auth);
    lines.push("8BITMIME".to_string());

    let last = lines.len() - 1;
    lines
        .iter()
        .enumerate()
        .map(|(i, l)| format!("250{}{l}", if i == last { ' ' } else { '-' }))
        .collect::<Vec<_>>()
        .join("\r\n")
}

fn decode(text: &str) -> String {
    STANDARD
        .decode(text.trim())
        .ok()
        .and_then(|b| String::from_utf8(b).ok())
        .unwrap_or_default()
}

fn password_ok(options: &SmtpOptions, password: &str) -> bool {
    options.password.as_deref().is_none_or(|p| p == password)
}

fn angle(arg: &str) -> String {
    let start = arg.find('<').map_or(0, |i| i + 1);
    let end = arg.rfind('>').unwrap_or(arg.len());
    arg.get(start..end).unwrap_or_default().to_string()
}

#[allow(clippy::too_many_lines)]
async fn run_session<S: AsyncRead + AsyncWrite + Unpin>(
    mut reader: BufReader<S>,
    encrypted: bool,
    store: &Mutex<Vec<Delivery>>,
    options: &SmtpOptions,
) -> Exit<S> {
    // After STARTTLS the client speaks first (EHLO), no new greeting.
    if !encrypted || options.implicit_tls {
        if reply(&mut reader, &format!("220 {HOSTNAME} ESMTP ready")).await.is_err() {
            return Exit::Closed;
        }
    }

    let mut from: Option<String> = None;
    let mut recipients: Vec<String> = Vec::new();

    while let Some(line) = read_line(&mut reader).await {
        let (verb, arg) = line.split_once(' ').unwrap_or((&line, ""));
        let response = match verb.to_ascii_uppercase().as_str() {
            "EHLO" => ehlo_reply(options, encrypted),
            "HELO" => format!("250 {HOSTNAME}"),
            "STARTTLS" => {
                if encrypted || !options.advertise_starttls {
                    "502 5.5.1 STARTTLS not available".to_string()
                } else {
                    if reply(&mut reader, "220 2.0.0 Ready to start TLS").await.is_err() {
                        return Exit::Closed;
                    }
                    return Exit::StartTls(reader);
                }
            }
            "AUTH" => {
                let (mechanism, initial) = arg.split_once(' ').unwrap_or((arg, ""));
                let accepted = match mechanism.to_ascii_uppercase().as_str() {
                    "PLAIN" => {
                        let decoded = decode(initial);
                        let password = decoded.split('\0').nth(2).unwrap_or_default();
                        password_ok(options, password)
                    }
                    "LOGIN" => {
                        if reply(&mut reader, "334 VXNlcm5hbWU6").await.is_err()
                            || read_line(&mut reader).await.is_none()
                            || reply(&mut reader, "334 UGFzc3dvcmQ6").await.is_err()
                        {
                            return Exit::Closed;
                        }
                        let Some(password) = read_line(&mut reader).await else {
                            return Exit::Closed;
                        };
                        password_ok(options, &decode(&password))
                    }
                    "XOAUTH2" => {
                        let decoded = decode(initial);
                        let token = decoded
                            .split('\x01')
                            .find_map(|part| part.strip_prefix("auth=Bearer "));
                        options.xoauth2_token.is_some() && token == options.xoauth2_token.as_deref()
                    }
                    _ => false,
                };
                if accepted {
                    "235 2.7.0 Authentication successful".to_string()
                } else {
                    "535 5.7.8 Authentication credentials invalid".to_string()
                }
            }
            "MAIL" => {
                from = Some(angle(arg));
                recipients.clear();
                "250 2.1.0 Ok".to_string()
            }
            "RCPT" => {
                let address = angle(arg);
                if from.is_none() {
                    "503 5.5.1 Need MAIL command".to_string()
                } else if options.rejects(&address) {
                    format!("550 5.1.1 <{address}>: Recipient address rejected")
                } else {
                    recipients.push(address);
                    "250 2.1.5 Ok".to_string()
                }
            }
            "DATA" => {
                if recipients.is_empty() {
                    "554 5.5.1 No valid recipients".to_string()
                } else {
                    if reply(&mut reader, "354 End data with <CR><LF>.<CR><LF>")
                        .await
                        .is_err()
                    {
                        return Exit::Closed;
                    }
                    let mut data = String::new();
                    loop {
                        let Some(line) = read_line(&mut reader).await else {
                            return Exit::Closed;
                        };
                        if line == "." {
                            break;
                        }
                        data.push_str(line.strip_prefix('.').unwrap_or(&line));
                        data.push_str("\r\n");
                    }
                    store.lock().unwrap().push(Delivery {
                        from: from.take().unwrap_or_default(),
                        recipients: std::mem::take(&mut recipients),
                        data,
                    });
                    if let Some(token) = &options.on_delivery {
                        token.cancel();
                    }
                    "250 2.0.0 Ok: queued".to_string()
                }
            }
            "RSET" => {
                from = None;
                recipients.clear();
                "250 2.0.0 Ok".to_string()
            }
            "NOOP" => "250 2.0.0 Ok".to_string(),
            "QUIT" => {
                let _ = reply(&mut reader, "221 2.0.0 Bye").await;
                return Exit::Closed;
            }
            _ => "502 5.5.2 Command not recognized".to_string(),
        };
        if reply(&mut reader, &response).await.is_err() {
            return Exit::Closed;
        }
    }
    Exit::Closed
}
