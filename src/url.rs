//! URLs, resources and query strings.
use std::cell::OnceCell;
use std::fmt;

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};

/// Characters escaped when a path is written onto the request line.
const PATH: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Percent-decode a path, leaving invalid UTF-8 sequences lossy-replaced.
pub fn decode_path(path: &str) -> String {
    percent_decode_str(path).decode_utf8_lossy().into_owned()
}

pub fn encode_path(path: &str) -> String {
    utf8_percent_encode(path, PATH).to_string()
}

/// Ordered list of query (or www-form) parameters. The encoded form is
/// computed on first use and dropped whenever the list changes.
#[derive(Default)]
pub struct Query {
    pairs: Vec<(String, String)>,
    encoded: OnceCell<String>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse an encoded `a=1&b=2` string (without leading `?`).
    pub fn parse(s: &str) -> Self {
        let pairs = url::form_urlencoded::parse(s.as_bytes())
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        Self {
            pairs,
            encoded: OnceCell::new(),
        }
    }

    pub fn add(&mut self, key: &str, value: &str) {
        self.encoded.take();
        self.pairs.push((key.to_string(), value.to_string()));
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn clear(&mut self) {
        self.encoded.take();
        self.pairs.clear();
    }

    /// Encoded form, without leading `?`.
    pub fn encoded(&self) -> &str {
        self.encoded.get_or_init(|| {
            url::form_urlencoded::Serializer::new(String::new())
                .extend_pairs(self.pairs.iter())
                .finish()
        })
    }
}

impl Clone for Query {
    fn clone(&self) -> Self {
        Self {
            pairs: self.pairs.clone(),
            encoded: OnceCell::new(),
        }
    }
}

impl PartialEq for Query {
    fn eq(&self, other: &Self) -> bool {
        self.pairs == other.pairs
    }
}

impl fmt::Debug for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.pairs.iter()).finish()
    }
}

#[derive(Debug)]
pub struct UrlError(String);

impl fmt::Display for UrlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid url: {}", self.0)
    }
}

impl std::error::Error for UrlError {}

/// A URL as used by the client. Absolute URLs carry scheme and host; a
/// bare resource (`/path?query#fragment`) leaves them empty.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Url {
    pub scheme: String,
    pub host: String,
    pub port: Option<u16>,
    pub path: String,
    pub query: Query,
    pub fragment: String,
}

impl Url {
    pub fn parse(s: &str) -> Result<Self, UrlError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(UrlError("empty".to_string()));
        }
        if s.contains("://") {
            let parsed = url::Url::parse(s).map_err(|e| UrlError(format!("{}: {}", s, e)))?;
            let host = parsed
                .host_str()
                .ok_or_else(|| UrlError(format!("{}: no host", s)))?;
            return Ok(Self {
                scheme: parsed.scheme().to_string(),
                host: host.to_string(),
                port: parsed.port(),
                path: decode_path(parsed.path()),
                query: Query::parse(parsed.query().unwrap_or("")),
                fragment: parsed.fragment().unwrap_or("").to_string(),
            });
        }
        Ok(Self::resource(s))
    }

    /// Split a bare resource string into path, query and fragment.
    pub fn resource(s: &str) -> Self {
        let (rest, fragment) = match s.find('#') {
            Some(i) => (&s[..i], &s[i + 1..]),
            None => (s, ""),
        };
        let (path, query) = match rest.find('?') {
            Some(i) => (&rest[..i], &rest[i + 1..]),
            None => (rest, ""),
        };
        Self {
            path: decode_path(path),
            query: Query::parse(query),
            fragment: fragment.to_string(),
            ..Self::default()
        }
    }

    pub fn is_https(&self) -> bool {
        self.scheme.eq_ignore_ascii_case("https")
    }

    pub fn default_port(&self) -> u16 {
        if self.is_https() {
            443
        } else {
            80
        }
    }

    /// Port to connect to.
    pub fn effective_port(&self) -> u16 {
        self.port.unwrap_or_else(|| self.default_port())
    }

    /// Value for the `Host` header: the port is only added when it differs
    /// from the scheme default.
    pub fn authority(&self) -> String {
        match self.port {
            Some(port) if port != self.default_port() => format!("{}:{}", self.host, port),
            _ => self.host.clone(),
        }
    }

    /// Path, query and fragment as written on the request line.
    pub fn request_target(&self) -> String {
        let mut target = if self.path.is_empty() {
            "/".to_string()
        } else {
            encode_path(&self.path)
        };
        if !self.query.is_empty() {
            target.push('?');
            target.push_str(self.query.encoded());
        }
        target
    }

    /// Fill the parts a redirect location left out from the URL that
    /// produced it.
    pub fn resolve_from(mut self, base: &Url) -> Self {
        if self.query.is_empty() {
            self.query = base.query.clone();
        }
        if self.scheme.is_empty() {
            self.scheme = base.scheme.clone();
        }
        if self.host.is_empty() {
            self.host = base.host.clone();
            if self.port.is_none() {
                self.port = base.port;
            }
        }
        if !self.path.starts_with('/') {
            let dir = match base.path.rfind('/') {
                Some(i) => &base.path[..=i],
                None => "/",
            };
            self.path = format!("{}{}", dir, self.path);
        }
        self
    }

    /// Whether two URLs can share one transport connection.
    pub fn same_endpoint(&self, other: &Url) -> bool {
        self.scheme.eq_ignore_ascii_case(&other.scheme)
            && self.host.eq_ignore_ascii_case(&other.host)
            && self.effective_port() == other.effective_port()
    }
}

impl fmt::Display for Url {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.host.is_empty() {
            write!(f, "{}://{}", self.scheme, self.authority())?;
        }
        write!(f, "{}", self.request_target())?;
        if !self.fragment.is_empty() {
            write!(f, "#{}", self.fragment)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_parse_absolute() {
        let url = Url::parse("http://example.com:8080/a%20b/c?x=1&y=two#frag").unwrap();
        assert_eq!(url.scheme, "http");
        assert_eq!(url.host, "example.com");
        assert_eq!(url.port, Some(8080));
        assert_eq!(url.path, "/a b/c");
        assert_eq!(url.query.get("y"), Some("two"));
        assert_eq!(url.fragment, "frag");
        assert_eq!(url.authority(), "example.com:8080");
        assert_eq!(url.request_target(), "/a%20b/c?x=1&y=two");
    }

    #[test]
    fn test_authority_omits_default_port() {
        let url = Url::parse("https://example.com:443/").unwrap();
        assert_eq!(url.authority(), "example.com");
        assert_eq!(url.effective_port(), 443);
    }

    #[test]
    fn test_resolve_relative_redirect() {
        let base = Url::parse("http://example.com:81/dir/page?q=1").unwrap();
        let next = Url::parse("/other").unwrap().resolve_from(&base);
        assert_eq!(next.to_string(), "http://example.com:81/other?q=1");
        let sibling = Url::parse("file.txt").unwrap().resolve_from(&base);
        assert_eq!(sibling.path, "/dir/file.txt");
    }

    #[test]
    fn test_query_cache_invalidation() {
        let mut query = Query::parse("a=1&b=x+y");
        assert_eq!(query.get("b"), Some("x y"));
        assert_eq!(query.encoded(), "a=1&b=x+y");
        query.add("c", "&");
        assert_eq!(query.encoded(), "a=1&b=x+y&c=%26");
        query.clear();
        assert_eq!(query.encoded(), "");
    }
}
