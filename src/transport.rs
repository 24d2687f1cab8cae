//! Byte-stream transport shared by the SMTP and IMAP sessions
//!
//! Provides TCP connect, implicit TLS, in-place STARTTLS upgrade and a
//! CRLF line reader. The certificate policy decides which rustls verifier
//! is installed.

use crate::error::{Error, Result};
use crate::security::CertificatePolicy;
use rustls::RootCertStore;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{CryptoProvider, verify_tls12_signature, verify_tls13_signature};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{
    AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader, ReadBuf,
};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;
use tracing::debug;

/// Longest protocol line accepted from a peer, terminator included.
pub const MAX_LINE_LEN: usize = 64 * 1024;

/// A plain or TLS-wrapped TCP stream.
#[derive(Debug)]
pub enum MailStream {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

impl MailStream {
    /// Open a plain TCP connection.
    pub async fn connect(host: &str, port: u16, timeout: Duration) -> Result<Self> {
        let addr = format!("{host}:{port}");
        debug!("Connecting to {}", addr);
        let tcp = deadline("connect", timeout, async {
            Ok::<_, Error>(TcpStream::connect(&addr).await?)
        })
        .await?;
        Ok(Self::Plain(tcp))
    }

    /// Perform a TLS handshake over this stream.
    ///
    /// Used both for implicit TLS right after connecting and for the
    /// STARTTLS upgrade once the server has agreed.
    pub async fn into_tls(
        self,
        host: &str,
        policy: CertificatePolicy,
        timeout: Duration,
    ) -> Result<Self> {
        let Self::Plain(tcp) = self else {
            return Err(Error::Tls("stream is already encrypted".into()));
        };

        let connector = tls_connector(policy)?;
        let server_name = ServerName::try_from(host.to_string())
            .map_err(|e| Error::Tls(format!("Invalid server name: {e}")))?;

        let tls = deadline("TLS handshake", timeout, async {
            connector
                .connect(server_name, tcp)
                .await
                .map_err(|e| Error::Tls(e.to_string()))
        })
        .await?;
        debug!("TLS established with {}", host);
        Ok(Self::Tls(Box::new(tls)))
    }

    #[must_use]
    pub const fn is_encrypted(&self) -> bool {
        matches!(self, Self::Tls(_))
    }
}

impl AsyncRead for MailStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(s) => Pin::new(s).poll_read(cx, buf),
            Self::Tls(s) => Pin::new(s.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for MailStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Self::Plain(s) => Pin::new(s).poll_write(cx, buf),
            Self::Tls(s) => Pin::new(s.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(s) => Pin::new(s).poll_flush(cx),
            Self::Tls(s) => Pin::new(s.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(s) => Pin::new(s).poll_shutdown(cx),
            Self::Tls(s) => Pin::new(s.as_mut()).poll_shutdown(cx),
        }
    }
}

/// Line-oriented view of a [`MailStream`] for CRLF protocols.
///
/// The buffer is always drained at protocol turn boundaries, so the
/// inner stream can be taken back for a TLS upgrade or handed to another
/// protocol driver.
#[derive(Debug)]
pub struct LineStream {
    inner: BufReader<MailStream>,
    timeout: Duration,
}

impl LineStream {
    #[must_use]
    pub fn new(stream: MailStream, timeout: Duration) -> Self {
        Self {
            inner: BufReader::new(stream),
            timeout,
        }
    }

    /// Read one line without its trailing CRLF.
    ///
    /// A line longer than [`MAX_LINE_LEN`] leaves the stream out of step
    /// with the peer and fails with an [`io::ErrorKind::InvalidData`] I/O
    /// error, which closes the session.
    pub async fn read_line(&mut self, operation: &'static str) -> Result<String> {
        let mut line = String::new();
        let mut reader = (&mut self.inner).take(MAX_LINE_LEN as u64);
        let read = deadline(operation, self.timeout, async {
            Ok::<_, Error>(reader.read_line(&mut line).await?)
        })
        .await?;
        if read == 0 {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed by server",
            )));
        }
        if read >= MAX_LINE_LEN && !line.ends_with('\n') {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("{operation} line exceeds {MAX_LINE_LEN} bytes"),
            )));
        }
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }

    /// Write and flush.
    pub async fn write_all(&mut self, operation: &'static str, data: &[u8]) -> Result<()> {
        let writer = self.inner.get_mut();
        deadline(operation, self.timeout, async {
            writer.write_all(data).await?;
            writer.flush().await?;
            Ok::<_, Error>(())
        })
        .await
    }

    /// Upgrade the underlying stream to TLS in place.
    pub async fn upgrade(self, host: &str, policy: CertificatePolicy) -> Result<Self> {
        let timeout = self.timeout;
        let stream = self.inner.into_inner().into_tls(host, policy, timeout).await?;
        Ok(Self::new(stream, timeout))
    }

    #[must_use]
    pub fn is_encrypted(&self) -> bool {
        self.inner.get_ref().is_encrypted()
    }

    #[must_use]
    pub fn into_inner(self) -> MailStream {
        self.inner.into_inner()
    }
}

/// Bound `fut` by `after`, mapping expiry to [`Error::Timeout`].
pub async fn deadline<T, F>(operation: &'static str, after: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::time::timeout(after, fut)
        .await
        .map_err(|_| Error::Timeout { operation, after })?
}

/// Build a TLS connector honoring the certificate policy.
fn tls_connector(policy: CertificatePolicy) -> Result<TlsConnector> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let builder = rustls::ClientConfig::builder_with_provider(provider.clone())
        .with_safe_default_protocol_versions()
        .map_err(|e| Error::Tls(e.to_string()))?;

    let config = match policy {
        CertificatePolicy::Strict => {
            let roots = RootCertStore {
                roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
            };
            builder.with_root_certificates(roots).with_no_client_auth()
        }
        CertificatePolicy::Permissive => builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AcceptAnyCertificate(provider)))
            .with_no_client_auth(),
    };
    Ok(TlsConnector::from(Arc::new(config)))
}

/// Verifier that skips chain and hostname checks but still verifies the
/// handshake signatures. Only installed for `allow_invalid_certs`.
#[derive(Debug)]
struct AcceptAnyCertificate(Arc<CryptoProvider>);

impl ServerCertVerifier for AcceptAnyCertificate {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}
