//! HTTP/1.1 message codec over a byte stream.
//!
//! One [`HttpCodec`] drives one connection, either as a client (writes
//! requests, reads responses) or as a server (reads requests, writes
//! responses). Every operation returns a success flag; on failure the
//! reason is left in [`HttpCodec::error`]. Transport failures move the
//! codec to [`State::Closed`] for good, calls made in the wrong state are
//! logged and ignored.
use std::fmt;
use std::io;
use std::io::prelude::*;

use log::{debug, warn};

use crate::header::{Headers, CONTENT_LENGTH, CONTENT_TYPE, HOST};
use crate::io::{Compression, OutputFilter, Stream};
use crate::method::Method;
use crate::request::parser::{parse_header_line, parse_request_line, parse_status_line};
use crate::request::{ParseError, RequestLine, StatusLine};
use crate::response::Response;
use crate::url::Url;

pub use chunked::{BodyReader, BodyWriter};

pub mod chunked;

const MAX_HEAD_LINE: usize = 8192;
const MAX_HEADERS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Init,
    /// Request line written (client).
    ResourceSet,
    /// At least one header written (client).
    HeaderSet,
    /// Outgoing message head is on the wire: a request for a client, a
    /// response for a server.
    RequestSent,
    /// Peer head parsed, the body can be read.
    HeaderParsed,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Client,
    Server,
}

/// Start line of the last message read from the peer.
#[derive(Debug, Clone, PartialEq)]
pub enum Head {
    None,
    Request(RequestLine),
    Status(StatusLine),
}

enum HeadError {
    Io(io::Error),
    Closed,
    Protocol(String),
}

impl From<io::Error> for HeadError {
    fn from(err: io::Error) -> Self {
        HeadError::Io(err)
    }
}

impl From<ParseError> for HeadError {
    fn from(err: ParseError) -> Self {
        HeadError::Protocol(err.to_string())
    }
}

fn is_blank(line: &[u8]) -> bool {
    line == b"\r\n" || line == b"\n"
}

pub struct HttpCodec<S> {
    stream: Stream<S>,
    side: Side,
    state: State,
    method: Method,
    sent: Headers,
    head: Head,
    headers: Headers,
    reader: BodyReader,
    writer: Option<BodyWriter>,
    error: String,
    peer_closed: bool,
}

impl<S> fmt::Debug for HttpCodec<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpCodec")
            .field("side", &self.side)
            .field("state", &self.state)
            .field("head", &self.head)
            .field("error", &self.error)
            .finish()
    }
}

impl<S: Read + Write> HttpCodec<S> {
    pub fn new(inner: S, side: Side) -> Self {
        Self {
            stream: Stream::new(inner),
            side,
            state: State::Init,
            method: Method::GET,
            sent: Headers::new(),
            head: Head::None,
            headers: Headers::new(),
            reader: BodyReader::default(),
            writer: None,
            error: String::new(),
            peer_closed: false,
        }
    }
    pub fn client(inner: S) -> Self {
        Self::new(inner, Side::Client)
    }
    pub fn server(inner: S) -> Self {
        Self::new(inner, Side::Server)
    }

    pub fn state(&self) -> State {
        self.state
    }
    pub fn side(&self) -> Side {
        self.side
    }
    pub fn is_closed(&self) -> bool {
        self.state == State::Closed
    }
    /// Reason of the last failure, empty if none.
    pub fn error(&self) -> &str {
        &self.error
    }
    /// True when the peer closed the connection before sending anything
    /// back.
    pub fn peer_closed(&self) -> bool {
        self.peer_closed
    }

    fn check(&self, op: &str, side: Side, allowed: &[State]) -> bool {
        if self.side != side {
            warn!("{}: not available on the {:?} side", op, self.side);
            return false;
        }
        if !allowed.contains(&self.state) {
            warn!("{}: not allowed in state {:?}", op, self.state);
            return false;
        }
        true
    }

    fn io_failed(&mut self, op: &str, err: io::Error) -> bool {
        if let io::ErrorKind::BrokenPipe
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted = err.kind()
        {
            self.peer_closed = true;
        }
        debug!("{}: {}", op, err);
        self.error = format!("{}: {}", op, err);
        self.state = State::Closed;
        false
    }

    fn write_line(&mut self, op: &str, line: &str) -> bool {
        match self.stream.write_line(line) {
            Ok(()) => true,
            Err(e) => self.io_failed(op, e),
        }
    }

    /// Start a request: writes the request line, and a `Host` header when
    /// the URL names a host. Allowed on a fresh connection or after a
    /// previous response head was parsed.
    pub fn set_resource(&mut self, method: Method, url: &Url) -> bool {
        if !self.check(
            "set_resource",
            Side::Client,
            &[State::Init, State::HeaderParsed],
        ) {
            return false;
        }
        self.method = method;
        self.sent.clear();
        self.error.clear();
        self.peer_closed = false;
        let line = format!("{} {} HTTP/1.1", method, url.request_target());
        if !self.write_line("set_resource", &line) {
            return false;
        }
        self.state = State::ResourceSet;
        if !url.host.is_empty() {
            return self.add_header(HOST, &url.authority());
        }
        true
    }

    pub fn add_header(&mut self, name: &str, value: &str) -> bool {
        if !self.check(
            "add_header",
            Side::Client,
            &[State::ResourceSet, State::HeaderSet],
        ) {
            return false;
        }
        if !self.write_line("add_header", &format!("{}: {}", name, value)) {
            return false;
        }
        self.sent.add(name, value);
        self.state = State::HeaderSet;
        true
    }

    /// Finish the request head, write `body` and read the response head.
    /// `Content-Length` (and `Content-Type` for a non-empty body) are added
    /// when the method allows a body.
    pub fn send(&mut self, body: &[u8], content_type: &str) -> bool {
        if !self.check("send", Side::Client, &[State::ResourceSet, State::HeaderSet]) {
            return false;
        }
        let mut body = body;
        if self.method.has_body() {
            if !self.sent.contains(CONTENT_LENGTH) && (!body.is_empty() || self.method != Method::GET) {
                let length = body.len().to_string();
                if !self.add_header(CONTENT_LENGTH, &length) {
                    return false;
                }
            }
            if !body.is_empty() && !content_type.is_empty() && !self.sent.contains(CONTENT_TYPE) {
                if !self.add_header(CONTENT_TYPE, content_type) {
                    return false;
                }
            }
        } else if !body.is_empty() {
            warn!("{} request cannot carry a body, {} bytes dropped", self.method, body.len());
            body = &[];
        }
        let result = self
            .stream
            .write(b"\r\n")
            .and_then(|_| self.stream.write(body))
            .and_then(|_| self.stream.flush());
        if let Err(e) = result {
            return self.io_failed("send", e);
        }
        self.state = State::RequestSent;
        self.parse_header_block()
    }

    /// Read the peer's start line and header block and select the body
    /// framing. A client reads a status line after [`send`](Self::send), a
    /// server reads a request line on an idle connection.
    pub fn parse_header_block(&mut self) -> bool {
        let expected = match self.side {
            Side::Client => State::RequestSent,
            Side::Server => State::Init,
        };
        if !self.check("parse_header_block", self.side, &[expected]) {
            return false;
        }
        self.head = Head::None;
        self.headers.clear();
        self.reader = BodyReader::default();
        self.peer_closed = false;
        loop {
            match self.read_head() {
                Ok(()) => {}
                Err(HeadError::Io(e)) => return self.io_failed("parse_header_block", e),
                Err(HeadError::Closed) => {
                    self.peer_closed = true;
                    self.error = "connection closed by peer".to_string();
                    self.state = State::Closed;
                    return false;
                }
                Err(HeadError::Protocol(reason)) => {
                    debug!("protocol error: {}", reason);
                    self.error = reason;
                    if self.side == Side::Client {
                        self.state = State::Closed;
                    }
                    return false;
                }
            }
            // interim responses carry no body, the real one follows
            if self.status_code() / 100 == 1 && self.status_code() != 101 {
                debug!("skipping interim response {}", self.status_code());
                continue;
            }
            break;
        }
        self.reader = self.select_framing();
        self.state = State::HeaderParsed;
        true
    }

    fn read_head_line(&mut self, line: &mut Vec<u8>) -> Result<usize, HeadError> {
        line.clear();
        let n = self.stream.read_line(line, MAX_HEAD_LINE)?;
        if n == MAX_HEAD_LINE && line.last() != Some(&b'\n') {
            return Err(HeadError::Protocol("header line too long".to_string()));
        }
        Ok(n)
    }

    fn read_head(&mut self) -> Result<(), HeadError> {
        let mut line = vec![];
        loop {
            if self.read_head_line(&mut line)? == 0 {
                return Err(HeadError::Closed);
            }
            if !is_blank(&line) {
                break;
            }
        }
        self.head = match self.side {
            Side::Client => Head::Status(parse_status_line(&line)?),
            Side::Server => Head::Request(parse_request_line(&line)?),
        };
        self.headers.clear();
        loop {
            if self.read_head_line(&mut line)? == 0 {
                return Err(HeadError::Protocol("header block ended early".to_string()));
            }
            if is_blank(&line) {
                return Ok(());
            }
            if self.headers.len() >= MAX_HEADERS {
                return Err(HeadError::Protocol("too many headers".to_string()));
            }
            let (name, value) = parse_header_line(&line)?;
            self.headers.add(name.as_str(), &value);
        }
    }

    fn select_framing(&self) -> BodyReader {
        if self.side == Side::Client {
            let code = self.status_code();
            if self.method == Method::HEAD || code == 204 || code == 304 || code / 100 == 1 {
                return BodyReader::fixed(0);
            }
        }
        if let Some(length) = self.headers.content_length() {
            return BodyReader::fixed(length);
        }
        if self.headers.is_chunked() {
            return BodyReader::chunked();
        }
        if self.side == Side::Client {
            let http10 = matches!(&self.head, Head::Status(s) if s.version == "HTTP/1.0");
            if self.headers.connection_close() || http10 {
                return BodyReader::until_close();
            }
        }
        BodyReader::fixed(0)
    }

    pub fn head(&self) -> &Head {
        &self.head
    }
    /// Header block of the last message read from the peer.
    pub fn headers(&self) -> &Headers {
        &self.headers
    }
    pub fn request_line(&self) -> Option<&RequestLine> {
        match &self.head {
            Head::Request(line) => Some(line),
            _ => None,
        }
    }
    pub fn status_line(&self) -> Option<&StatusLine> {
        match &self.head {
            Head::Status(line) => Some(line),
            _ => None,
        }
    }
    /// Status code of the last response read, 0 if none.
    pub fn status_code(&self) -> u16 {
        self.status_line().map_or(0, |s| s.status_code)
    }

    /// Read body bytes. Returns 0 at the end of the body or on failure.
    pub fn read(&mut self, buf: &mut [u8]) -> usize {
        if self.state != State::HeaderParsed {
            warn!("read: not allowed in state {:?}", self.state);
            return 0;
        }
        match self.reader.read(&mut self.stream, buf) {
            Ok(n) => {
                if let Some(err) = self.reader.error() {
                    self.error = err.to_string();
                }
                n
            }
            Err(e) => {
                self.io_failed("read", e);
                0
            }
        }
    }

    /// Append one body line to `out`, see [`BodyReader::read_line`].
    pub fn read_line(&mut self, out: &mut Vec<u8>) -> bool {
        if self.state != State::HeaderParsed {
            warn!("read_line: not allowed in state {:?}", self.state);
            return false;
        }
        match self.reader.read_line(&mut self.stream, out) {
            Ok(more) => more,
            Err(e) => self.io_failed("read_line", e),
        }
    }

    /// Read the rest of the body into `out`. False if the body could not be
    /// read completely.
    pub fn read_body(&mut self, out: &mut Vec<u8>) -> bool {
        let mut buf = [0; 4096];
        loop {
            let n = self.read(&mut buf);
            if n == 0 {
                break;
            }
            out.extend_from_slice(&buf[..n]);
        }
        self.state == State::HeaderParsed && self.reader.error().is_none()
    }

    /// Discard whatever is left of the body.
    pub fn drain(&mut self) -> bool {
        let mut buf = [0; 4096];
        while self.read(&mut buf) > 0 {}
        self.state == State::HeaderParsed && self.reader.is_finished()
    }

    /// Bytes left in the current framing unit, see [`BodyReader::size`].
    pub fn size(&self) -> u64 {
        self.reader.size()
    }
    /// Remaining length counter, -1 when the body is not length-delimited.
    pub fn content_length(&self) -> i64 {
        self.reader.content_length()
    }
    pub fn body_finished(&self) -> bool {
        self.reader.is_finished()
    }
    pub fn body_is_chunked(&self) -> bool {
        self.reader.is_chunked()
    }

    /// Write a response head. The body framing follows the response
    /// headers; `compression` puts a compressor in front of it.
    pub fn write_head(&mut self, response: &Response, compression: Option<Compression>) -> bool {
        if !self.check("write_head", Side::Server, &[State::Init, State::HeaderParsed]) {
            return false;
        }
        if let Err(e) = self.stream.write(&response.head_bytes()) {
            return self.io_failed("write_head", e);
        }
        self.writer = Some(BodyWriter::new(
            response.headers.is_chunked(),
            OutputFilter::new(compression),
        ));
        self.state = State::RequestSent;
        true
    }

    pub fn write_body(&mut self, data: &[u8]) -> bool {
        let writer = match self.writer.as_mut() {
            Some(writer) if self.state == State::RequestSent => writer,
            _ => {
                warn!("write_body: not allowed in state {:?}", self.state);
                return false;
            }
        };
        if let Err(e) = writer.write(&mut self.stream, data) {
            return self.io_failed("write_body", e);
        }
        true
    }

    /// Complete the outgoing message and flush it. With `body` false
    /// (responses to HEAD) nothing but the head goes out.
    pub fn finish(&mut self, body: bool) -> bool {
        if !self.check("finish", Side::Server, &[State::RequestSent]) {
            return false;
        }
        let result = match self.writer.take() {
            Some(writer) if body => writer.finish(&mut self.stream),
            _ => self.stream.flush(),
        };
        if let Err(e) = result {
            return self.io_failed("finish", e);
        }
        self.state = State::Init;
        true
    }

    /// Bytes received on the transport since the last reset.
    pub fn rx_bytes(&self) -> u64 {
        self.stream.rx_bytes()
    }
    /// Bytes sent on the transport since the last reset.
    pub fn tx_bytes(&self) -> u64 {
        self.stream.tx_bytes()
    }
    pub fn reset_counters(&mut self) {
        self.stream.reset_counters()
    }
    /// Whether the transport reported end of stream.
    pub fn is_eof(&self) -> bool {
        self.stream.is_eof()
    }
    pub fn get_ref(&self) -> &S {
        self.stream.get_ref()
    }
    pub fn get_mut(&mut self) -> &mut S {
        self.stream.get_mut()
    }
    pub fn into_inner(self) -> S {
        self.stream.into_inner()
    }
}

/// Body reader handed to handlers that consume the request body
/// themselves.
pub struct BodyRead<'a, S> {
    codec: &'a mut HttpCodec<S>,
}

impl<'a, S: Read + Write> BodyRead<'a, S> {
    pub fn new(codec: &'a mut HttpCodec<S>) -> Self {
        Self { codec }
    }
}

impl<'a, S: Read + Write> Read for BodyRead<'a, S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.codec.read(buf);
        if n == 0 && self.codec.is_closed() {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                self.codec.error().to_string(),
            ));
        }
        Ok(n)
    }
}
