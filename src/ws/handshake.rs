//! WebSocket upgrade handshake.
//!
//! One HTTP/1.1 Upgrade exchange per connection attempt, bounded by an
//! overall timeout, producing an established byte stream or a typed failure.
//!
//! A correctness detail that is easy to get wrong: the read that finds the
//! `\r\n\r\n` header terminator routinely also contains the first WebSocket
//! frames (the relay sends its `welcome` immediately). Those bytes belong to
//! the frame stream and are returned in [`Established::leftover`]; they must
//! be fed to the assembler, never discarded.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use thiserror::Error;
use tokio::io::{self, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadBuf};
use tokio::net::TcpStream;
use tokio::net::lookup_host;
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::rustls::{ClientConfig, RootCertStore};
use tracing::{debug, info};

use crate::core::LinkConfig;
use crate::core::constants::{HANDSHAKE_KEY_SIZE, MAX_HANDSHAKE_RESPONSE, WS_VERSION};

/// Errors that can occur during the upgrade handshake.
#[derive(Debug, Error)]
pub enum HandshakeError {
    /// Hostname resolution failed.
    #[error("dns resolution failed: {0}")]
    Dns(String),

    /// TLS setup or negotiation failed.
    #[error("tls failure: {0}")]
    Tls(String),

    /// The overall connect timeout elapsed.
    #[error("handshake timed out")]
    Timeout,

    /// The server answered, but not with `101 Switching Protocols`.
    #[error("server did not switch protocols: {0}")]
    NonSwitchingResponse(String),

    /// Socket-level failure during the exchange.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// The byte stream under an established WebSocket connection.
///
/// Either direction of TLS; both variants are `Unpin`, so the delegating
/// poll impls stay free of projection.
pub enum RelayStream {
    /// Plain TCP (local test relays).
    Plain(TcpStream),
    /// TLS over TCP.
    Tls(Box<TlsStream<TcpStream>>),
}

impl AsyncRead for RelayStream {
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

impl AsyncWrite for RelayStream {
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

/// An upgraded connection ready for frame traffic.
pub struct Established {
    /// The underlying byte stream.
    pub stream: RelayStream,
    /// Bytes received after the response head in the same reads.
    /// Already part of the WebSocket stream; feed to the assembler.
    pub leftover: Vec<u8>,
}

impl std::fmt::Debug for Established {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Established")
            .field("leftover", &self.leftover)
            .finish_non_exhaustive()
    }
}

/// Perform the upgrade handshake against the configured relay.
///
/// The whole exchange (DNS, TCP connect, TLS, request, response head) runs
/// under `config.connect_timeout`.
pub async fn connect(config: &LinkConfig) -> Result<Established, HandshakeError> {
    match tokio::time::timeout(config.connect_timeout, connect_inner(config)).await {
        Ok(result) => result,
        Err(_) => Err(HandshakeError::Timeout),
    }
}

async fn connect_inner(config: &LinkConfig) -> Result<Established, HandshakeError> {
    let addr = lookup_host((config.host.as_str(), config.port))
        .await
        .map_err(|e| HandshakeError::Dns(e.to_string()))?
        .next()
        .ok_or_else(|| HandshakeError::Dns(format!("no addresses for {}", config.host)))?;

    debug!(%addr, host = %config.host, "connecting");
    let tcp = TcpStream::connect(addr).await?;

    let mut stream = if config.tls {
        let connector = tls_connector();
        let server_name = ServerName::try_from(config.host.clone())
            .map_err(|e| HandshakeError::Tls(e.to_string()))?;
        let tls = connector
            .connect(server_name, tcp)
            .await
            .map_err(|e| HandshakeError::Tls(e.to_string()))?;
        RelayStream::Tls(Box::new(tls))
    } else {
        RelayStream::Plain(tcp)
    };

    let key = BASE64.encode(rand::random::<[u8; HANDSHAKE_KEY_SIZE]>());
    let request = format!(
        "GET {path} HTTP/1.1\r\n\
         Host: {host}\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Key: {key}\r\n\
         Sec-WebSocket-Version: {version}\r\n\
         Origin: {origin}\r\n\
         \r\n",
        path = config.path,
        host = config.host,
        key = key,
        version = WS_VERSION,
        origin = config.origin,
    );
    stream.write_all(request.as_bytes()).await?;

    // Read until the header terminator; anything past it is frame data.
    let mut response = Vec::new();
    let mut chunk = [0u8; 512];
    let head_end = loop {
        if let Some(pos) = find_terminator(&response) {
            break pos;
        }
        if response.len() > MAX_HANDSHAKE_RESPONSE {
            return Err(HandshakeError::NonSwitchingResponse(
                "response head too large".to_string(),
            ));
        }
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Err(HandshakeError::NonSwitchingResponse(
                "connection closed before response completed".to_string(),
            ));
        }
        response.extend_from_slice(&chunk[..n]);
    };

    let head = String::from_utf8_lossy(&response[..head_end]);
    let status_line = head.lines().next().unwrap_or_default();
    if !status_line.contains("101") {
        return Err(HandshakeError::NonSwitchingResponse(
            status_line.to_string(),
        ));
    }

    let leftover = response[head_end + 4..].to_vec();
    info!(
        host = %config.host,
        path = %config.path,
        leftover = leftover.len(),
        "websocket established"
    );

    Ok(Established { stream, leftover })
}

/// Offset of `\r\n\r\n` in `buf`, if present.
fn find_terminator(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

fn tls_connector() -> TlsConnector {
    let mut roots = RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    let config = ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();
    TlsConnector::from(Arc::new(config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Role;
    use tokio::net::TcpListener;

    fn local_config(port: u16) -> LinkConfig {
        let mut config = LinkConfig::for_role(Role::Controller);
        config.host = "127.0.0.1".to_string();
        config.port = port;
        config.tls = false;
        config.connect_timeout = std::time::Duration::from_secs(2);
        config
    }

    #[test]
    fn test_find_terminator() {
        assert_eq!(find_terminator(b"HTTP/1.1 101\r\n\r\nrest"), Some(12));
        assert_eq!(find_terminator(b"HTTP/1.1 101\r\n"), None);
        assert_eq!(find_terminator(b""), None);
    }

    #[tokio::test]
    async fn test_upgrade_and_leftover_preserved() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 2048];
            let n = sock.read(&mut buf).await.unwrap();
            let request = String::from_utf8_lossy(&buf[..n]).to_string();

            // Respond 101 with frame bytes glued into the same write.
            let mut reply =
                b"HTTP/1.1 101 Switching Protocols\r\nUpgrade: websocket\r\n\r\n".to_vec();
            reply.extend_from_slice(&[0x81, 0x02, b'h', b'i']);
            sock.write_all(&reply).await.unwrap();
            request
        });

        let established = connect(&local_config(port)).await.unwrap();
        assert_eq!(established.leftover, &[0x81, 0x02, b'h', b'i']);

        let request = server.await.unwrap();
        assert!(request.starts_with("GET /api/channels/default HTTP/1.1\r\n"));
        assert!(request.contains("Upgrade: websocket\r\n"));
        assert!(request.contains("Sec-WebSocket-Version: 13\r\n"));
        assert!(request.contains("Sec-WebSocket-Key: "));
        assert!(request.contains("Origin: "));
    }

    #[tokio::test]
    async fn test_non_switching_response() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 2048];
            let _ = sock.read(&mut buf).await.unwrap();
            sock.write_all(b"HTTP/1.1 404 Not Found\r\n\r\n").await.unwrap();
        });

        let err = connect(&local_config(port)).await.unwrap_err();
        match err {
            HandshakeError::NonSwitchingResponse(line) => assert!(line.contains("404")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_timeout_when_server_stalls() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        tokio::spawn(async move {
            // Accept and never answer.
            let (_sock, _) = listener.accept().await.unwrap();
            tokio::time::sleep(std::time::Duration::from_secs(10)).await;
        });

        let mut config = local_config(port);
        config.connect_timeout = std::time::Duration::from_millis(100);
        let err = connect(&config).await.unwrap_err();
        assert!(matches!(err, HandshakeError::Timeout));
    }

    #[tokio::test]
    async fn test_dns_failure() {
        let mut config = local_config(1);
        config.host = "host.invalid".to_string();
        let err = connect(&config).await.unwrap_err();
        assert!(matches!(err, HandshakeError::Dns(_) | HandshakeError::Io(_)));
    }
}
