use crate::types::{FetchError, Header, Target};
use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;
use url::Url;

pub const USER_AGENT: &str = concat!("torcheck/", env!("CARGO_PKG_VERSION"));
pub const CRLF: &str = "\r\n";
pub const HTTP_VERSION_1_1: &str = "HTTP/1.1";
pub const HOST_HEADER: &str = "host";
pub const USER_AGENT_HEADER: &str = "user-agent";
pub const CONNECTION_HEADER: &str = "connection";
pub const CONTENT_LENGTH_HEADER: &str = "content-length";
pub const TRANSFER_ENCODING_HEADER: &str = "transfer-encoding";
pub const LOCATION_HEADER: &str = "location";
pub const CHUNKED_ENCODING: &str = "chunked";

pub fn parse_target(target: &str) -> Result<Target, FetchError> {
    let url = Url::parse(target)
        .map_err(|e| FetchError::InvalidTarget(format!("{} ({})", target, e)))?;

    if url.host_str().is_none() {
        return Err(FetchError::InvalidTarget(format!(
            "target '{}' is missing a host",
            target
        )));
    }

    if url.port_or_known_default().is_none() {
        return Err(FetchError::InvalidTarget(format!(
            "target '{}' has no known port",
            target
        )));
    }

    Ok(Target::new(url))
}

/// Splits a `name: value` header line. Lines without a colon or with an
/// empty name are dropped rather than failing the whole response.
pub fn parse_header(line: &str) -> Option<Header> {
    let (name, value) = line.split_once(':')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    Some(Header::new(name, value.trim()))
}

pub fn header_value<'a>(headers: &'a [Header], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|h| h.name.eq_ignore_ascii_case(name))
        .map(|h| h.value.as_str())
}

/// Runs `future` under an optional deadline. `None` waits forever, which is
/// the crate default.
pub async fn timeout_result<F, T>(duration: Option<Duration>, future: F) -> Result<T, FetchError>
where
    F: Future<Output = Result<T, FetchError>>,
{
    if let Some(dur) = duration {
        match timeout(dur, future).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout),
        }
    } else {
        future.await
    }
}
