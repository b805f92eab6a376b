//! Start-line and header-line parsing.
use std::fmt;
use std::str::Utf8Error;

use crate::header::Header;
use crate::method::Method;

const WHITESPACE: [u8; 2] = *b" \t";
const TOKEN: [u8; 15] = *b"!#$%&'*+-.^_`|~";

fn one_of(chars: &'static [u8]) -> impl Fn(u8) -> bool {
    move |c: u8| chars.contains(&c)
}

fn whitespace() -> impl Fn(u8) -> bool {
    one_of(&WHITESPACE[..])
}

fn in_range(min: u8, max: u8) -> impl Fn(u8) -> bool {
    move |c: u8| c >= min && c <= max
}

fn token() -> impl Fn(u8) -> bool {
    |c: u8| c.is_ascii_alphanumeric() || TOKEN.contains(&c)
}

fn visible() -> impl Fn(u8) -> bool {
    |c: u8| c > b' ' && c != 0x7f
}

/// Parsed `METHOD target HTTP/1.x` line.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestLine {
    pub method: Method,
    pub target: String,
    pub version: String,
}

/// Parsed `HTTP/1.x code reason` line.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusLine {
    pub version: String,
    pub status_code: u16,
    pub status: String,
}

/// Cursor over a single line, without its line ending.
struct LineParser<'a> {
    line: &'a [u8],
    position: usize,
}

impl<'a> LineParser<'a> {
    fn new(line: &'a [u8]) -> Self {
        let mut end = line.len();
        while end > 0 && (line[end - 1] == b'\n' || line[end - 1] == b'\r') {
            end -= 1;
        }
        Self {
            line: &line[..end],
            position: 0,
        }
    }
    fn error(&self, reason: &str) -> ParseError {
        ParseError::new(self.position, reason)
    }
    fn peek(&self) -> Option<u8> {
        self.line.get(self.position).copied()
    }
    fn expect(&mut self, b: u8) -> Result<()> {
        if self.peek() == Some(b) {
            self.position += 1;
            Ok(())
        } else {
            Err(self.error(&format!("expected '{}'", b as char)))
        }
    }
    fn expects(&mut self, bs: &[u8]) -> Result<()> {
        for b in bs {
            self.expect(*b)?;
        }
        Ok(())
    }
    fn one<F>(&mut self, predicate: &F) -> Result<&'a [u8]>
    where
        F: Fn(u8) -> bool,
    {
        match self.peek() {
            Some(peek) if predicate(peek) => {
                self.position += 1;
                Ok(&self.line[self.position - 1..self.position])
            }
            _ => Err(self.error("unexpected character")),
        }
    }
    fn star<F>(&mut self, predicate: &F) -> &'a [u8]
    where
        F: Fn(u8) -> bool,
    {
        let start = self.position;
        while let Some(peek) = self.peek() {
            if !predicate(peek) {
                break;
            }
            self.position += 1;
        }
        &self.line[start..self.position]
    }
    fn plus<F>(&mut self, predicate: &F) -> Result<&'a [u8]>
    where
        F: Fn(u8) -> bool,
    {
        let start = self.position;
        self.one(predicate)?;
        self.star(predicate);
        Ok(&self.line[start..self.position])
    }
    fn rest(&mut self) -> &'a [u8] {
        let rest = &self.line[self.position..];
        self.position = self.line.len();
        rest
    }
    fn end(&self) -> Result<()> {
        if self.position == self.line.len() {
            Ok(())
        } else {
            Err(self.error("trailing characters"))
        }
    }
    fn version(&mut self) -> Result<String> {
        let start = self.position;
        self.expects(b"HTTP/1.")?;
        self.one(&one_of(&b"01"[..]))?;
        Ok(std::str::from_utf8(&self.line[start..self.position])?.to_string())
    }
}

/// Parse a request line. Unknown methods are accepted as `Method::INVALID`.
pub fn parse_request_line(line: &[u8]) -> Result<RequestLine> {
    let mut parser = LineParser::new(line);
    let method = parser.plus(&in_range(b'A', b'Z'))?;
    let method = Method::from(std::str::from_utf8(method)?);
    parser.plus(&whitespace())?;
    let target = parser.plus(&visible())?;
    let target = std::str::from_utf8(target)?.to_string();
    parser.plus(&whitespace())?;
    let version = parser.version()?;
    parser.end()?;
    Ok(RequestLine {
        method,
        target,
        version,
    })
}

/// Parse a status line. The reason phrase may be empty.
pub fn parse_status_line(line: &[u8]) -> Result<StatusLine> {
    let mut parser = LineParser::new(line);
    let version = parser.version()?;
    parser.plus(&whitespace())?;
    let code = parser.plus(&in_range(b'0', b'9'))?;
    if code.len() != 3 {
        return Err(parser.error("invalid status code"));
    }
    let status_code = std::str::from_utf8(code)?
        .parse::<u16>()
        .map_err(|_| parser.error("invalid status code"))?;
    parser.star(&whitespace());
    let status = String::from_utf8_lossy(parser.rest()).trim().to_string();
    Ok(StatusLine {
        version,
        status_code,
        status,
    })
}

/// Parse a `Name: value` header line.
pub fn parse_header_line(line: &[u8]) -> Result<(Header, String)> {
    let mut parser = LineParser::new(line);
    let name = parser.plus(&token())?;
    let name = std::str::from_utf8(name)?;
    parser.expect(b':')?;
    parser.star(&whitespace());
    let value = String::from_utf8_lossy(parser.rest()).trim_end().to_string();
    Ok((Header::new(name), value))
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    position: usize,
    reason: String,
}

impl ParseError {
    pub fn new(position: usize, reason: &str) -> Self {
        Self {
            position,
            reason: reason.to_string(),
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "error parsing line at position {}: {}",
            self.position, self.reason
        )
    }
}

impl std::error::Error for ParseError {}

impl From<Utf8Error> for ParseError {
    fn from(err: Utf8Error) -> Self {
        ParseError::new(err.valid_up_to(), &err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ParseError>;

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_request_line() {
        let line = parse_request_line(b"GET /path?p1=v1&p2=v2#fragment HTTP/1.1\r\n").unwrap();
        assert_eq!(line.method, Method::GET);
        assert_eq!(line.target, "/path?p1=v1&p2=v2#fragment");
        assert_eq!(line.version, "HTTP/1.1");
    }

    #[test]
    fn test_request_line_unknown_method() {
        let line = parse_request_line(b"BREW /pot HTTP/1.0").unwrap();
        assert_eq!(line.method, Method::INVALID);
    }

    #[test]
    fn test_request_line_nonsense() {
        assert_eq!(
            parse_request_line(b"FOO"),
            Err(ParseError::new(3, "unexpected character"))
        );
        assert!(parse_request_line(b"GET / HTTP/2.0").is_err());
        assert!(parse_request_line(b"GET / HTTP/1.1 extra").is_err());
    }

    #[test]
    fn test_status_line() {
        let line = parse_status_line(b"HTTP/1.1 404 Not Found\r\n").unwrap();
        assert_eq!(line.status_code, 404);
        assert_eq!(line.status, "Not Found");
        let line = parse_status_line(b"HTTP/1.0 204").unwrap();
        assert_eq!(line.status, "");
        assert!(parse_status_line(b"HTTP/1.1 20 OK").is_err());
    }

    #[test]
    fn test_header_line() {
        let (name, value) = parse_header_line(b"Content-Length:15  \r\n").unwrap();
        assert!(name.is("content-length"));
        assert_eq!(value, "15");
        assert!(parse_header_line(b"no colon here").is_err());
        assert!(parse_header_line(b": empty name").is_err());
    }
}
