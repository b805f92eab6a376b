//! HTTP response and status codes.
use std::fmt;
use std::io::Read;

use crate::header::{Headers, CONTENT_LENGTH, CONTENT_TYPE};

pub mod status;

/// Response body: nothing, bytes in memory, or a reader streamed out by
/// the server (with a length if it is known up front).
pub enum Payload {
    Empty,
    Bytes(Vec<u8>),
    Stream {
        reader: Box<dyn Read + Send>,
        length: Option<u64>,
    },
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "Empty"),
            Self::Bytes(b) => write!(f, "Bytes({} bytes)", b.len()),
            Self::Stream { length, .. } => write!(f, "Stream({:?})", length),
        }
    }
}

impl Default for Payload {
    fn default() -> Self {
        Self::Empty
    }
}

/// An HTTP response.
///
/// # Example
/// ```
/// # use resthttp::response::Response;
///
/// let response = Response::new(200)
///     .with_header("Content-Type", "text/plain")
///     .with_payload(b"Hello!".to_vec());
///
/// # assert_eq!(response.content_length(), Some(6));
/// ```
#[derive(Debug)]
pub struct Response {
    pub status_code: u16,
    pub status: String,
    pub version: String,
    pub headers: Headers,
    payload: Payload,
}

impl Response {
    /// Create a new Response. Status is automatically set to the default
    /// status for the given code (200 -> "OK", etc.)
    pub fn new(status_code: u16) -> Self {
        Self {
            status_code,
            status: status::default(status_code),
            version: "HTTP/1.1".to_string(),
            headers: Headers::new(),
            payload: Payload::Empty,
        }
    }
    /// Change status code and reset the status text to its default.
    pub fn set_status(&mut self, status_code: u16) {
        self.status_code = status_code;
        self.status = status::default(status_code);
    }
    /// Change status.
    pub fn with_status(mut self, status: &str) -> Self {
        self.status = status.to_string();
        self
    }
    /// Add header.
    pub fn with_header(mut self, header: &str, value: &str) -> Self {
        self.headers.add(header, value);
        self
    }
    /// Sets response payload.
    pub fn with_payload(mut self, payload: Vec<u8>) -> Self {
        self.set_payload(payload);
        self
    }
    pub fn set_payload(&mut self, payload: Vec<u8>) {
        self.payload = Payload::Bytes(payload);
    }
    pub fn set_text(&mut self, content_type: &str, text: &str) {
        self.headers.set(CONTENT_TYPE, content_type);
        self.set_payload(text.as_bytes().to_vec());
    }
    /// Stream the body from `reader`. Without a length the body goes out
    /// chunked.
    pub fn set_stream(&mut self, reader: Box<dyn Read + Send>, length: Option<u64>) {
        self.payload = Payload::Stream { reader, length };
    }
    pub fn payload(&self) -> &Payload {
        &self.payload
    }
    pub fn take_payload(&mut self) -> Payload {
        std::mem::take(&mut self.payload)
    }
    pub fn has_payload(&self) -> bool {
        !matches!(self.payload, Payload::Empty)
    }
    /// Body bytes, if the body is held in memory.
    pub fn body(&self) -> Option<&[u8]> {
        match &self.payload {
            Payload::Bytes(b) => Some(b),
            _ => None,
        }
    }
    /// Body length if known.
    pub fn content_length(&self) -> Option<u64> {
        match &self.payload {
            Payload::Empty => Some(0),
            Payload::Bytes(b) => Some(b.len() as u64),
            Payload::Stream { length, .. } => *length,
        }
    }
    /// Set `Content-Length` from the payload unless the body goes out
    /// chunked.
    pub fn set_content_length(&mut self) {
        if !self.allows_body() {
            self.headers.remove(CONTENT_LENGTH);
            self.headers.remove(crate::header::TRANSFER_ENCODING);
            return;
        }
        if self.headers.is_chunked() {
            self.headers.remove(CONTENT_LENGTH);
            return;
        }
        match self.content_length() {
            Some(len) => self.headers.set(CONTENT_LENGTH, &len.to_string()),
            None => {
                self.headers.remove(CONTENT_LENGTH);
                self.headers
                    .set(crate::header::TRANSFER_ENCODING, "chunked");
            }
        }
    }
    /// 1xx, 204 and 304 responses never carry a body or its framing
    /// headers.
    pub fn allows_body(&self) -> bool {
        !(self.status_code < 200 || self.status_code == 204 || self.status_code == 304)
    }
    /// Status line, headers and the terminating empty line.
    pub fn head_bytes(&self) -> Vec<u8> {
        let mut bytes: Vec<u8> = vec![];
        let status_line = format!("{} {} {}\r\n", self.version, self.status_code, self.status);
        bytes.extend(status_line.into_bytes());
        self.headers.write_to(&mut bytes);
        bytes.extend(b"\r\n");
        bytes
    }
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }
}

impl Default for Response {
    fn default() -> Self {
        Self::new(200)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_response_head_bytes() {
        let mut response = Response::new(500)
            .with_header("Connection", "closed")
            .with_payload(b"foobar!".to_vec());
        response.set_content_length();

        let actual = response.head_bytes();
        let expected =
            b"HTTP/1.1 500 Internal Server Error\r\nConnection: closed\r\nContent-Length: 7\r\n\r\n";
        assert_eq!(expected[..], actual[..]);
    }

    #[test]
    fn test_unknown_length_goes_chunked() {
        let mut response = Response::new(200).with_header("Content-Length", "10");
        response.set_stream(Box::new(std::io::empty()), None);
        response.set_content_length();
        assert!(!response.headers.contains("content-length"));
        assert!(response.headers.is_chunked());
    }

    #[test]
    fn test_no_framing_for_bodiless_status() {
        for code in [101u16, 204, 304].iter() {
            let mut response = Response::new(*code).with_header("Transfer-Encoding", "chunked");
            response.set_content_length();
            assert!(!response.allows_body());
            assert!(!response.headers.contains("content-length"));
            assert!(!response.headers.contains("transfer-encoding"));
        }
        assert!(Response::new(200).allows_body());
    }

    #[test]
    fn test_status_line_reason() {
        assert!(Response::new(418).head_bytes().starts_with(b"HTTP/1.1 418 I'm a teapot\r\n"));
        assert!(Response::new(299).head_bytes().starts_with(b"HTTP/1.1 299 \r\n"));
    }
}
