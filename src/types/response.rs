use bytes::Bytes;
use serde_json::Value;

use super::Header;
use crate::utils::header_value;

/// A fully buffered HTTP response. The body is read to completion before
/// this is handed back, so dropping it releases the connection.
#[derive(Debug, Clone)]
pub struct Response {
    pub status: u16,
    pub protocol: String,
    pub headers: Vec<Header>,
    pub body: Bytes,
}

impl Response {
    /// Body decoded as text, replacing invalid UTF-8.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).to_string()
    }

    pub fn json(&self) -> Result<Value, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        header_value(&self.headers, name)
    }
}
