use rustls::crypto::ring::default_provider;
use rustls::pki_types::ServerName;
use rustls::{ClientConfig, RootCertStore};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_rustls::{client::TlsStream, TlsConnector};

use crate::types::FetchError;
use crate::utils::timeout_result;

const ALPN_HTTP11: &[u8] = b"http/1.1";

/// The connection a request travels over: plain TCP for `http` targets,
/// rustls over TCP for `https`. SOCKS-tunneled connections use the same two
/// shapes, the tunnel only changes who dialed the TCP leg.
pub enum Transport {
    Tcp(TcpStream),
    Tls(TlsStream<TcpStream>),
}

fn build_tls_connector() -> TlsConnector {
    // rustls >= 0.23 needs a process-level crypto provider.
    let _ = default_provider().install_default();

    let mut roots = RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    let mut config = ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();
    config.alpn_protocols = vec![ALPN_HTTP11.to_vec()];

    TlsConnector::from(Arc::new(config))
}

fn server_name_from_str(host: &str) -> Result<ServerName<'static>, FetchError> {
    ServerName::try_from(host.to_string())
        .map_err(|_| FetchError::ConnectionFailed(format!("invalid server name: {}", host)))
}

async fn connect_tcp(
    host: &str,
    port: u16,
    connect_timeout: Option<Duration>,
) -> Result<TcpStream, FetchError> {
    timeout_result(connect_timeout, async {
        TcpStream::connect((host, port)).await.map_err(|e| {
            FetchError::ConnectionFailed(format!("failed to connect to {}:{}: {}", host, port, e))
        })
    })
    .await
}

/// Upgrades an established TCP stream to TLS with SNI for `host`,
/// verifying the peer against the webpki root store.
pub(crate) async fn tls_handshake(
    tcp: TcpStream,
    host: &str,
    handshake_timeout: Option<Duration>,
) -> Result<TlsStream<TcpStream>, FetchError> {
    let connector = build_tls_connector();
    let server_name = server_name_from_str(host)?;

    timeout_result(handshake_timeout, async {
        connector.connect(server_name, tcp).await.map_err(|e| {
            FetchError::ConnectionFailed(format!("TLS handshake with {} failed: {}", host, e))
        })
    })
    .await
}

/// Dials `host:port` directly, picking the transport from the URL scheme.
pub async fn connect(
    scheme: &str,
    host: &str,
    port: u16,
    connect_timeout: Option<Duration>,
) -> Result<Transport, FetchError> {
    match scheme {
        "http" => {
            let tcp = connect_tcp(host, port, connect_timeout).await?;
            Ok(Transport::Tcp(tcp))
        }
        "https" => {
            let tcp = connect_tcp(host, port, connect_timeout).await?;
            let tls = tls_handshake(tcp, host, connect_timeout).await?;
            Ok(Transport::Tls(tls))
        }
        other => Err(FetchError::InvalidTarget(format!(
            "unsupported scheme '{}'",
            other
        ))),
    }
}
