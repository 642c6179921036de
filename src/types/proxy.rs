use url::Url;

use super::error::FetchError;

/// A validated SOCKS5 proxy endpoint. Only the `socks5` and `socks` URL
/// schemes are accepted; credentials in the URL are rejected because the
/// dialer only offers the no-authentication method.
#[derive(Debug, Clone)]
pub struct SocksProxy {
    url: Url,
    host: String,
    port: u16,
}

impl SocksProxy {
    pub fn new(proxy: &str) -> Result<Self, FetchError> {
        let url = Url::parse(proxy)
            .map_err(|e| FetchError::InvalidProxy(format!("{} ({})", proxy, e)))?;
        Self::from_url(url)
    }

    pub fn from_url(url: Url) -> Result<Self, FetchError> {
        match url.scheme() {
            "socks" | "socks5" => {}
            other => {
                return Err(FetchError::InvalidProxy(format!(
                    "unsupported proxy scheme '{}'",
                    other
                )));
            }
        }

        if !url.username().is_empty() || url.password().is_some() {
            return Err(FetchError::InvalidProxy(
                "proxy authentication is not supported".to_string(),
            ));
        }

        let host = url
            .host_str()
            .ok_or_else(|| FetchError::InvalidProxy("proxy URL is missing a host".to_string()))?
            .to_string();
        let port = url
            .port()
            .ok_or_else(|| FetchError::InvalidProxy("proxy URL is missing a port".to_string()))?;

        Ok(Self { url, host, port })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

impl std::fmt::Display for SocksProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.url.as_str())
    }
}
