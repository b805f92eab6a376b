//! Ordered, case-insensitive HTTP header storage.
use std::fmt;
use std::hash;

use crate::io::Compression;

pub const HOST: &str = "Host";
pub const CONTENT_LENGTH: &str = "Content-Length";
pub const CONTENT_TYPE: &str = "Content-Type";
pub const CONTENT_ENCODING: &str = "Content-Encoding";
pub const TRANSFER_ENCODING: &str = "Transfer-Encoding";
pub const ACCEPT_ENCODING: &str = "Accept-Encoding";
pub const CONNECTION: &str = "Connection";
pub const LOCATION: &str = "Location";
pub const COOKIE: &str = "Cookie";
pub const SET_COOKIE: &str = "Set-Cookie";
pub const UPGRADE: &str = "Upgrade";
pub const SERVER: &str = "Server";
pub const USER_AGENT: &str = "User-Agent";

/// A header name. Comparison and hashing ignore ASCII case, the original
/// spelling is kept for serialization.
#[derive(Debug, Clone)]
pub struct Header(String);

impl Header {
    pub fn new(s: &str) -> Self {
        Self(s.to_string())
    }
    pub fn as_str(&self) -> &str {
        &self.0
    }
    pub fn is(&self, name: &str) -> bool {
        self.0.eq_ignore_ascii_case(name)
    }
}

impl PartialEq for Header {
    fn eq(&self, other: &Self) -> bool {
        self.0.eq_ignore_ascii_case(&other.0)
    }
}

impl Eq for Header {}

impl hash::Hash for Header {
    fn hash<H: hash::Hasher>(&self, state: &mut H) {
        self.0.to_ascii_lowercase().hash(state);
    }
}

impl From<String> for Header {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<Header> for String {
    fn from(s: Header) -> Self {
        s.0
    }
}

impl fmt::Display for Header {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Header table. Keeps insertion order and repeated names, which matters
/// for headers like `Set-Cookie`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Headers(Vec<(Header, String)>);

impl Headers {
    pub fn new() -> Self {
        Self(vec![])
    }
    /// Append a header, keeping any previous value of the same name.
    pub fn add(&mut self, name: &str, value: &str) {
        self.0.push((Header::new(name), value.to_string()));
    }
    /// Replace all values of `name` by a single value.
    pub fn set(&mut self, name: &str, value: &str) {
        match self.0.iter().position(|(h, _)| h.is(name)) {
            Some(pos) => {
                self.0[pos].1 = value.to_string();
                let mut i = 0;
                self.0.retain(|(h, _)| {
                    i += 1;
                    i - 1 == pos || !h.is(name)
                });
            }
            None => self.add(name, value),
        }
    }
    /// First value of `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(h, _)| h.is(name))
            .map(|(_, v)| v.as_str())
    }
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.0
            .iter()
            .filter(move |(h, _)| h.is(name))
            .map(|(_, v)| v.as_str())
    }
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }
    /// Remove all values of `name`, returns true if any were present.
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.0.len();
        self.0.retain(|(h, _)| !h.is(name));
        before != self.0.len()
    }
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(h, v)| (h.as_str(), v.as_str()))
    }
    pub fn len(&self) -> usize {
        self.0.len()
    }
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
    pub fn clear(&mut self) {
        self.0.clear()
    }

    /// Numeric `Content-Length`, or None if missing or not a number.
    pub fn content_length(&self) -> Option<u64> {
        self.get(CONTENT_LENGTH)
            .and_then(|v| v.trim().parse::<u64>().ok())
    }
    pub fn is_chunked(&self) -> bool {
        self.get_all(TRANSFER_ENCODING)
            .flat_map(|v| v.split(','))
            .any(|v| v.trim().eq_ignore_ascii_case("chunked"))
    }
    fn connection_has(&self, token: &str) -> bool {
        self.get_all(CONNECTION)
            .flat_map(|v| v.split(','))
            .any(|v| v.trim().eq_ignore_ascii_case(token))
    }
    pub fn connection_close(&self) -> bool {
        self.connection_has("close")
    }
    pub fn connection_keep_alive(&self) -> bool {
        self.connection_has("keep-alive")
    }
    pub fn is_websocket_upgrade(&self) -> bool {
        self.get(UPGRADE)
            .map_or(false, |v| v.trim().eq_ignore_ascii_case("websocket"))
    }

    /// Pick a response compression from `Accept-Encoding`, honoring the
    /// order of `permitted` as preference and skipping tokens with `q=0`.
    pub fn supported_compression(&self, permitted: &[Compression]) -> Option<Compression> {
        let mut accepted = vec![];
        for value in self.get_all(ACCEPT_ENCODING) {
            for token in value.split(',') {
                let mut parts = token.split(';');
                let name = parts.next().unwrap_or("").trim();
                let refused = parts.any(|p| {
                    let p = p.trim();
                    p.starts_with("q=") && p[2..].trim().parse::<f32>().map_or(false, |q| q <= 0.0)
                });
                if refused {
                    continue;
                }
                if let Some(comp) = Compression::from_token(name) {
                    accepted.push(comp);
                }
            }
        }
        permitted.iter().copied().find(|p| accepted.contains(p))
    }

    /// Serialize as `Name: value\r\n` lines.
    pub fn write_to(&self, out: &mut Vec<u8>) {
        for (name, value) in self.iter() {
            out.extend_from_slice(name.as_bytes());
            out.extend_from_slice(b": ");
            out.extend_from_slice(value.as_bytes());
            out.extend_from_slice(b"\r\n");
        }
    }
}

impl<'a> IntoIterator for &'a Headers {
    type Item = &'a (Header, String);
    type IntoIter = std::slice::Iter<'a, (Header, String)>;
    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl std::iter::FromIterator<(Header, String)> for Headers {
    fn from_iter<I: IntoIterator<Item = (Header, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_case_insensitive_lookup() {
        let mut headers = Headers::new();
        headers.add("Content-Type", "text/plain");
        assert_eq!(headers.get("content-type"), Some("text/plain"));
        assert_eq!(Header::new("HOST"), Header::new("host"));
    }

    #[test]
    fn test_repeated_headers_keep_order() {
        let mut headers = Headers::new();
        headers.add("Set-Cookie", "a=1");
        headers.add("Host", "localhost");
        headers.add("set-cookie", "b=2");
        let cookies: Vec<&str> = headers.get_all("SET-COOKIE").collect();
        assert_eq!(cookies, vec!["a=1", "b=2"]);

        let mut out = vec![];
        headers.write_to(&mut out);
        assert_eq!(
            &out[..],
            &b"Set-Cookie: a=1\r\nHost: localhost\r\nset-cookie: b=2\r\n"[..]
        );
    }

    #[test]
    fn test_set_replaces_all() {
        let mut headers = Headers::new();
        headers.add("X-A", "1");
        headers.add("X-B", "2");
        headers.add("x-a", "3");
        headers.set("X-A", "4");
        let names: Vec<(&str, &str)> = headers.iter().collect();
        assert_eq!(names, vec![("X-A", "4"), ("X-B", "2")]);
        assert!(headers.remove("x-b"));
        assert!(!headers.remove("x-b"));
    }

    #[test]
    fn test_framing_helpers() {
        let mut headers = Headers::new();
        headers.add("Content-Length", " 12 ");
        headers.add("Transfer-Encoding", "gzip, chunked");
        assert_eq!(headers.content_length(), Some(12));
        assert!(headers.is_chunked());
        headers.set("Content-Length", "twelve");
        assert_eq!(headers.content_length(), None);
    }

    #[test]
    fn test_supported_compression() {
        let permitted = [Compression::Gzip, Compression::Deflate];
        let mut headers = Headers::new();
        assert_eq!(headers.supported_compression(&permitted), None);
        headers.add("Accept-Encoding", "br, deflate;q=0.5, gzip;q=0");
        assert_eq!(
            headers.supported_compression(&permitted),
            Some(Compression::Deflate)
        );
        headers.set("Accept-Encoding", "deflate, x-gzip");
        assert_eq!(
            headers.supported_compression(&permitted),
            Some(Compression::Gzip)
        );
    }
}
