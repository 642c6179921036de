use bytes::Bytes;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use url::Url;

use crate::proxy;
use crate::stream::{self, Transport};
use crate::types::{FetchError, Header, Response, SocksProxy, Target, Timeouts};
use crate::utils::{
    header_value, parse_header, parse_target, timeout_result, CHUNKED_ENCODING, CONNECTION_HEADER,
    CONTENT_LENGTH_HEADER, CRLF, HOST_HEADER, HTTP_VERSION_1_1, LOCATION_HEADER,
    TRANSFER_ENCODING_HEADER, USER_AGENT, USER_AGENT_HEADER,
};

const MAX_REDIRECTS: u32 = 10;

/// Single-shot HTTP/1.1 GET client. Every fetch opens a fresh connection,
/// sends `Connection: close` and reads the body to completion; there is no
/// pooling and no keep-alive. With a [`SocksProxy`] installed, every
/// connection (including redirect hops) is dialed through the proxy.
pub struct Client {
    proxy: Option<SocksProxy>,
    timeouts: Timeouts,
}

impl Client {
    pub fn new() -> Self {
        Self {
            proxy: None,
            timeouts: Timeouts::default(),
        }
    }

    pub fn with_proxy(proxy: SocksProxy) -> Self {
        Self {
            proxy: Some(proxy),
            timeouts: Timeouts::default(),
        }
    }

    pub fn timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn proxy(&self) -> Option<&SocksProxy> {
        self.proxy.as_ref()
    }

    /// Issues a GET against `target`, following redirects. The status code
    /// is otherwise not interpreted: a 503 with a body comes back as a
    /// normal response.
    pub async fn get(&self, target: &str) -> Result<Response, FetchError> {
        let mut target = parse_target(target)?;
        let mut redirects = 0u32;

        loop {
            let response = self.perform(&target).await?;

            match redirect_location(&target, &response) {
                None => return Ok(response),
                Some(_) if redirects >= MAX_REDIRECTS => {
                    return Err(FetchError::RequestFailed("too many redirects".to_string()));
                }
                Some(next) => {
                    redirects += 1;
                    log::debug!("following {} redirect to {}", response.status, next);
                    target = parse_target(next.as_str())?;
                }
            }
        }
    }

    async fn perform(&self, target: &Target) -> Result<Response, FetchError> {
        let mut transport = self.open_transport(target).await?;
        self.write_request(&mut transport, target).await?;
        self.read_response(&mut transport).await
    }

    async fn open_transport(&self, target: &Target) -> Result<Transport, FetchError> {
        let host = target
            .host()
            .ok_or_else(|| FetchError::InvalidTarget("target missing host".to_string()))?;
        let port = target
            .port()
            .ok_or_else(|| FetchError::InvalidTarget("target missing port".to_string()))?;

        if let Some(socks_proxy) = &self.proxy {
            return if target.scheme() == "https" {
                proxy::connect_via_socks_tls(socks_proxy, host, port, self.timeouts.connect).await
            } else {
                proxy::connect_via_socks(socks_proxy, host, port, self.timeouts.connect).await
            };
        }

        log::debug!("connecting to {}:{}", host, port);
        stream::connect(target.scheme(), host, port, self.timeouts.connect).await
    }

    async fn write_request(
        &self,
        transport: &mut Transport,
        target: &Target,
    ) -> Result<(), FetchError> {
        let authority = target.authority().unwrap_or_default();

        let mut req = Vec::new();
        req.extend_from_slice(
            format!(
                "GET {} {}{}",
                target.path_query(),
                HTTP_VERSION_1_1,
                CRLF
            )
            .as_bytes(),
        );
        for (name, value) in [
            (HOST_HEADER, authority.as_str()),
            (USER_AGENT_HEADER, USER_AGENT),
            (CONNECTION_HEADER, "close"),
        ] {
            req.extend_from_slice(format!("{}: {}{}", name, value, CRLF).as_bytes());
        }
        req.extend_from_slice(CRLF.as_bytes());

        timeout_result(self.timeouts.write, async {
            match transport {
                Transport::Tcp(tcp) => tcp.write_all(&req).await.map_err(FetchError::Io),
                Transport::Tls(tls) => tls.write_all(&req).await.map_err(FetchError::Io),
            }
        })
        .await
    }

    async fn read_response(&self, transport: &mut Transport) -> Result<Response, FetchError> {
        match transport {
            Transport::Tcp(tcp) => {
                let mut reader = BufReader::new(tcp);
                self.read_from(&mut reader).await
            }
            Transport::Tls(tls) => {
                let mut reader = BufReader::new(tls);
                self.read_from(&mut reader).await
            }
        }
    }

    async fn read_from<R: AsyncBufRead + Unpin>(
        &self,
        reader: &mut R,
    ) -> Result<Response, FetchError> {
        loop {
            let mut status_line = String::new();
            let bytes =
                timeout_result(self.timeouts.read, read_line_lenient(reader, &mut status_line))
                    .await?;

            if bytes == 0 {
                return Err(FetchError::ConnectionFailed(
                    "connection closed by server before receiving a response".to_string(),
                ));
            }
            if status_line.trim().is_empty() {
                continue;
            }

            let (status, protocol) = Self::parse_status_line(&status_line)?;
            let headers = self.read_header_block(reader).await?;

            // 1xx interim responses precede the real one; 101 is final.
            if status < 200 && status != 101 {
                continue;
            }

            let body = self.read_body(reader, &headers, status).await?;
            return Ok(Response {
                status,
                protocol,
                headers,
                body,
            });
        }
    }

    async fn read_header_block<R: AsyncBufRead + Unpin>(
        &self,
        reader: &mut R,
    ) -> Result<Vec<Header>, FetchError> {
        let mut headers = Vec::new();
        loop {
            let mut line = String::new();
            let bytes =
                timeout_result(self.timeouts.read, read_line_lenient(reader, &mut line)).await?;
            if bytes == 0 || line.trim().is_empty() {
                break;
            }
            if let Some(header) = parse_header(line.trim()) {
                headers.push(header);
            }
        }
        Ok(headers)
    }

    async fn read_body<R: AsyncBufRead + Unpin>(
        &self,
        reader: &mut R,
        headers: &[Header],
        status: u16,
    ) -> Result<Bytes, FetchError> {
        if !response_has_body(status) {
            return Ok(Bytes::new());
        }

        let is_chunked = header_value(headers, TRANSFER_ENCODING_HEADER)
            .map_or(false, |v| v.to_lowercase().contains(CHUNKED_ENCODING));
        if is_chunked {
            return self.read_chunked_body(reader).await;
        }

        let content_length = header_value(headers, CONTENT_LENGTH_HEADER)
            .and_then(|v| v.trim().parse::<usize>().ok());

        if let Some(length) = content_length {
            let mut body = vec![0u8; length];
            timeout_result(self.timeouts.read, async {
                reader.read_exact(&mut body).await.map_err(FetchError::Io)
            })
            .await?;
            Ok(Bytes::from(body))
        } else {
            // No framing: the server signals the end by closing (the request
            // always carries `Connection: close`).
            let mut body = Vec::new();
            timeout_result(self.timeouts.read, async {
                loop {
                    let mut buffer = [0u8; 8192];
                    match reader.read(&mut buffer).await {
                        Ok(0) => break,
                        Ok(n) => body.extend_from_slice(&buffer[..n]),
                        Err(e) if is_benign_close(&e) => break,
                        Err(e) => return Err(FetchError::Io(e)),
                    }
                }
                Ok(())
            })
            .await?;
            Ok(Bytes::from(body))
        }
    }

    async fn read_chunked_body<R: AsyncBufRead + Unpin>(
        &self,
        reader: &mut R,
    ) -> Result<Bytes, FetchError> {
        let mut body = Vec::new();

        loop {
            let mut size_line = String::new();
            timeout_result(self.timeouts.read, read_line_lenient(reader, &mut size_line)).await?;

            let size_str = size_line.trim().split(';').next().unwrap_or("").trim();
            let chunk_size = usize::from_str_radix(size_str, 16)
                .map_err(|_| FetchError::InvalidResponse("invalid chunk size".to_string()))?;

            if chunk_size == 0 {
                // Trailer section, discarded.
                loop {
                    let mut line = String::new();
                    let bytes =
                        timeout_result(self.timeouts.read, read_line_lenient(reader, &mut line))
                            .await?;
                    if bytes == 0 || line.trim().is_empty() {
                        break;
                    }
                }
                break;
            }

            let mut chunk = vec![0u8; chunk_size];
            timeout_result(self.timeouts.read, async {
                reader.read_exact(&mut chunk).await.map_err(FetchError::Io)
            })
            .await?;
            body.extend_from_slice(&chunk);

            let mut crlf = [0u8; 2];
            timeout_result(self.timeouts.read, async {
                reader.read_exact(&mut crlf).await.map_err(FetchError::Io)
            })
            .await?;
        }

        Ok(Bytes::from(body))
    }

    pub fn parse_status_line(status_line: &str) -> Result<(u16, String), FetchError> {
        let parts: Vec<&str> = status_line.trim().split_whitespace().collect();
        if parts.len() < 2 {
            return Err(FetchError::InvalidResponse("invalid status line".to_string()));
        }

        let protocol = parts[0].to_string();
        let status = parts[1]
            .parse::<u16>()
            .map_err(|_| FetchError::InvalidResponse("invalid status code".to_string()))?;

        Ok((status, protocol))
    }
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

async fn read_line_lenient<R: AsyncBufRead + Unpin>(
    reader: &mut R,
    line: &mut String,
) -> Result<usize, FetchError> {
    match reader.read_line(line).await {
        Ok(bytes) => Ok(bytes),
        Err(e) if is_benign_close(&e) => Ok(0),
        Err(e) => Err(FetchError::Io(e)),
    }
}

/// Servers routinely drop the connection without a TLS close_notify, and a
/// torn final line can surface as InvalidData; both are end-of-stream here,
/// not failures.
fn is_benign_close(e: &std::io::Error) -> bool {
    if e.kind() == std::io::ErrorKind::InvalidData {
        return true;
    }
    e.get_ref()
        .map_or(false, |inner| inner.to_string().contains("close_notify"))
}

fn response_has_body(status: u16) -> bool {
    if (100..200).contains(&status) {
        return false;
    }
    !matches!(status, 204 | 304)
}

fn redirect_location(target: &Target, response: &Response) -> Option<Url> {
    if !(300..400).contains(&response.status) {
        return None;
    }
    let location = header_value(&response.headers, LOCATION_HEADER)?;
    if location.starts_with("http://") || location.starts_with("https://") {
        Url::parse(location).ok()
    } else {
        target.url.join(location).ok()
    }
}
