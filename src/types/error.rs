#[derive(Debug)]
pub enum FetchError {
    /// Target URL could not be parsed or lacks a usable host/port.
    InvalidTarget(String),
    /// Proxy address could not be parsed or is not a SOCKS5 endpoint.
    InvalidProxy(String),
    /// TCP, TLS or SOCKS connection establishment failed.
    ConnectionFailed(String),
    RequestFailed(String),
    InvalidResponse(String),
    Timeout,
    Io(std::io::Error),
}

impl std::fmt::Display for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchError::InvalidTarget(msg) => write!(f, "Invalid target: {}", msg),
            FetchError::InvalidProxy(msg) => write!(f, "Invalid proxy: {}", msg),
            FetchError::ConnectionFailed(msg) => write!(f, "Connection failed: {}", msg),
            FetchError::RequestFailed(msg) => write!(f, "Request failed: {}", msg),
            FetchError::InvalidResponse(msg) => write!(f, "Invalid response: {}", msg),
            FetchError::Timeout => write!(f, "Request timeout"),
            FetchError::Io(err) => write!(f, "IO error: {}", err),
        }
    }
}

impl std::error::Error for FetchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FetchError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for FetchError {
    fn from(err: std::io::Error) -> Self {
        FetchError::Io(err)
    }
}
