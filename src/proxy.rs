use std::net::IpAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::stream::{tls_handshake, Transport};
use crate::types::{FetchError, SocksProxy};
use crate::utils::timeout_result;

const SOCKS_VERSION: u8 = 0x05;
const METHOD_NO_AUTH: u8 = 0x00;
const METHOD_NO_ACCEPTABLE: u8 = 0xff;
const CMD_CONNECT: u8 = 0x01;
const ATYP_IPV4: u8 = 0x01;
const ATYP_DOMAIN: u8 = 0x03;
const ATYP_IPV6: u8 = 0x04;
const REPLY_SUCCEEDED: u8 = 0x00;

/// Dials `target_host:target_port` through the SOCKS5 proxy and returns the
/// tunneled stream as a plain TCP transport. Hostnames are sent to the
/// proxy unresolved, so name resolution happens on the proxy's side.
pub async fn connect_via_socks(
    proxy: &SocksProxy,
    target_host: &str,
    target_port: u16,
    connect_timeout: Option<Duration>,
) -> Result<Transport, FetchError> {
    let stream = socks5_tunnel(proxy, target_host, target_port, connect_timeout).await?;
    Ok(Transport::Tcp(stream))
}

/// Same as [`connect_via_socks`], then upgrades the tunnel to TLS for an
/// `https` target. The TLS handshake authenticates the target host, not
/// the proxy.
pub async fn connect_via_socks_tls(
    proxy: &SocksProxy,
    target_host: &str,
    target_port: u16,
    connect_timeout: Option<Duration>,
) -> Result<Transport, FetchError> {
    let stream = socks5_tunnel(proxy, target_host, target_port, connect_timeout).await?;
    let tls = tls_handshake(stream, target_host, connect_timeout).await?;
    Ok(Transport::Tls(tls))
}

async fn socks5_tunnel(
    proxy: &SocksProxy,
    target_host: &str,
    target_port: u16,
    connect_timeout: Option<Duration>,
) -> Result<TcpStream, FetchError> {
    let mut stream = timeout_result(connect_timeout, async {
        TcpStream::connect((proxy.host(), proxy.port()))
            .await
            .map_err(|e| {
                FetchError::ConnectionFailed(format!(
                    "failed to connect to proxy {}:{}: {}",
                    proxy.host(),
                    proxy.port(),
                    e
                ))
            })
    })
    .await?;

    log::debug!(
        "connected to socks5 proxy {}:{}, tunneling to {}:{}",
        proxy.host(),
        proxy.port(),
        target_host,
        target_port
    );

    negotiate_no_auth(&mut stream).await?;
    send_connect(&mut stream, target_host, target_port).await?;
    read_connect_reply(&mut stream).await?;

    Ok(stream)
}

/// Offers the single NO AUTHENTICATION method and checks the proxy picked it.
async fn negotiate_no_auth(stream: &mut TcpStream) -> Result<(), FetchError> {
    stream
        .write_all(&[SOCKS_VERSION, 1, METHOD_NO_AUTH])
        .await
        .map_err(|e| FetchError::ConnectionFailed(format!("SOCKS5 greeting failed: {}", e)))?;

    let mut choice = [0u8; 2];
    stream.read_exact(&mut choice).await.map_err(|e| {
        FetchError::ConnectionFailed(format!("SOCKS5 greeting response failed: {}", e))
    })?;

    if choice[0] != SOCKS_VERSION {
        return Err(FetchError::ConnectionFailed(
            "proxy did not answer as a SOCKS5 server".to_string(),
        ));
    }

    match choice[1] {
        METHOD_NO_AUTH => Ok(()),
        METHOD_NO_ACCEPTABLE => Err(FetchError::ConnectionFailed(
            "proxy rejected the no-authentication method".to_string(),
        )),
        other => Err(FetchError::ConnectionFailed(format!(
            "proxy selected unsupported method 0x{:02x}",
            other
        ))),
    }
}

async fn send_connect(
    stream: &mut TcpStream,
    target_host: &str,
    target_port: u16,
) -> Result<(), FetchError> {
    let mut request = vec![SOCKS_VERSION, CMD_CONNECT, 0x00];

    // url::Url keeps IPv6 hosts bracketed.
    let bare_host = target_host.trim_start_matches('[').trim_end_matches(']');
    match bare_host.parse::<IpAddr>() {
        Ok(IpAddr::V4(v4)) => {
            request.push(ATYP_IPV4);
            request.extend_from_slice(&v4.octets());
        }
        Ok(IpAddr::V6(v6)) => {
            request.push(ATYP_IPV6);
            request.extend_from_slice(&v6.octets());
        }
        Err(_) => {
            if target_host.len() > 255 {
                return Err(FetchError::InvalidTarget(format!(
                    "host '{}' is too long for a SOCKS5 domain address",
                    target_host
                )));
            }
            request.push(ATYP_DOMAIN);
            request.push(target_host.len() as u8);
            request.extend_from_slice(target_host.as_bytes());
        }
    }
    request.extend_from_slice(&target_port.to_be_bytes());

    stream
        .write_all(&request)
        .await
        .map_err(|e| FetchError::ConnectionFailed(format!("SOCKS5 connect request failed: {}", e)))
}

async fn read_connect_reply(stream: &mut TcpStream) -> Result<(), FetchError> {
    let mut reply = [0u8; 4];
    stream.read_exact(&mut reply).await.map_err(|e| {
        FetchError::ConnectionFailed(format!("SOCKS5 connect response failed: {}", e))
    })?;

    if reply[0] != SOCKS_VERSION {
        return Err(FetchError::ConnectionFailed(
            "invalid SOCKS5 connect response".to_string(),
        ));
    }
    if reply[1] != REPLY_SUCCEEDED {
        return Err(FetchError::ConnectionFailed(format!(
            "SOCKS5 connect failed: {}",
            reply_message(reply[1])
        )));
    }

    // The reply carries the bound address; it is not used but must be
    // drained so the HTTP exchange starts at the right offset.
    match reply[3] {
        ATYP_IPV4 => {
            let mut rest = [0u8; 6];
            stream.read_exact(&mut rest).await?;
        }
        ATYP_DOMAIN => {
            let mut len = [0u8; 1];
            stream.read_exact(&mut len).await?;
            let mut rest = vec![0u8; len[0] as usize + 2];
            stream.read_exact(&mut rest).await?;
        }
        ATYP_IPV6 => {
            let mut rest = [0u8; 18];
            stream.read_exact(&mut rest).await?;
        }
        other => {
            return Err(FetchError::ConnectionFailed(format!(
                "SOCKS5 reply carries unsupported address type 0x{:02x}",
                other
            )));
        }
    }

    Ok(())
}

fn reply_message(code: u8) -> &'static str {
    match code {
        0x01 => "general SOCKS server failure",
        0x02 => "connection not allowed by ruleset",
        0x03 => "network unreachable",
        0x04 => "host unreachable",
        0x05 => "connection refused",
        0x06 => "TTL expired",
        0x07 => "command not supported",
        0x08 => "address type not supported",
        _ => "unknown SOCKS5 error",
    }
}
