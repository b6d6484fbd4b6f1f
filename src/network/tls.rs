//! TLS presence detection
//!
//! The handshake only tests whether the peer speaks TLS: certificate and
//! hostname verification are disabled and no SNI is sent. Bytes the peer
//! sends during a failed handshake are kept so the banner fallback can still
//! report them.

use openssl::ssl::{SslConnector, SslMethod, SslVerifyMode};
use std::io;
use std::pin::Pin;
use std::task::{ready, Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::time::timeout;
use tokio_openssl::SslStream;

/// Handshake-only TLS client
#[derive(Clone)]
pub struct TlsDetector {
    connector: SslConnector,
}

impl TlsDetector {
    pub fn new() -> crate::Result<Self> {
        let mut builder = SslConnector::builder(SslMethod::tls())?;
        builder.set_verify(SslVerifyMode::NONE);

        Ok(Self {
            connector: builder.build(),
        })
    }

    /// Attempt a client handshake over `stream`, giving up after `deadline`
    pub async fn handshake<S>(&self, stream: S, deadline: Duration) -> bool
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let ssl = match self.connector.configure().and_then(|config| {
            config
                .verify_hostname(false)
                .use_server_name_indication(false)
                .into_ssl("")
        }) {
            Ok(ssl) => ssl,
            Err(e) => {
                log::debug!("Could not prepare TLS session: {}", e);
                return false;
            }
        };

        let mut tls = match SslStream::new(ssl, stream) {
            Ok(tls) => tls,
            Err(e) => {
                log::debug!("Could not wrap stream for TLS: {}", e);
                return false;
            }
        };

        match timeout(deadline, Pin::new(&mut tls).connect()).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                log::trace!("TLS handshake failed: {}", e);
                false
            }
            Err(_) => {
                log::trace!("TLS handshake timed out after {:?}", deadline);
                false
            }
        }
    }
}

/// Stream adapter that keeps a copy of the first `limit` bytes read through it
pub struct Recorder<S> {
    inner: S,
    seen: Vec<u8>,
    limit: usize,
}

impl<S> Recorder<S> {
    pub fn new(inner: S, limit: usize) -> Self {
        Self {
            inner,
            seen: Vec::new(),
            limit,
        }
    }

    /// Bytes read so far, up to the recording limit
    pub fn into_recorded(self) -> Vec<u8> {
        self.seen
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for Recorder<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let before = buf.filled().len();
        ready!(Pin::new(&mut this.inner).poll_read(cx, buf))?;

        let fresh = &buf.filled()[before..];
        let room = this.limit.saturating_sub(this.seen.len());
        this.seen.extend_from_slice(&fresh[..fresh.len().min(room)]);
        Poll::Ready(Ok(()))
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for Recorder<S> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().inner).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}
