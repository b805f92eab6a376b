//! Blocking HTTP/1.1 client.
//!
//! The client keeps one connection open while requests go to the same
//! endpoint, follows redirects up to a limit and can keep session cookies.
//!
//! ```no_run
//! use resthttp::client::HttpClient;
//!
//! let mut client = HttpClient::new();
//! let body = client.get("http://localhost:8080/user/42");
//! if client.http_success() {
//!     println!("{}", body);
//! } else {
//!     eprintln!("{} {}", client.status_code(), client.error());
//! }
//! ```
use std::io::{self, prelude::*};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use log::{debug, trace, warn};

use crate::codec::HttpCodec;
use crate::config::ClientOptions;
use crate::header::{
    Headers, ACCEPT_ENCODING, CONNECTION, CONTENT_ENCODING, COOKIE, LOCATION, SET_COOKIE,
    USER_AGENT,
};
use crate::io::{decode_body, Compression};
use crate::method::Method;
use crate::url::Url;

pub mod cookie;

pub use cookie::{Cookie, CookieJar};

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Opens transport connections for the client.
pub trait Connector {
    type Stream: Read + Write;
    fn connect(&mut self, url: &Url, timeout: Option<Duration>) -> io::Result<Self::Stream>;
}

/// Plain TCP connections. There is no TLS support, https URLs need another
/// connector.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector;

impl Connector for TcpConnector {
    type Stream = TcpStream;

    fn connect(&mut self, url: &Url, timeout: Option<Duration>) -> io::Result<TcpStream> {
        if url.is_https() {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                "https needs a TLS capable connector",
            ));
        }
        let mut last_error = None;
        for addr in (url.host.as_str(), url.effective_port()).to_socket_addrs()? {
            let connected = match timeout {
                Some(timeout) => TcpStream::connect_timeout(&addr, timeout),
                None => TcpStream::connect(addr),
            };
            match connected {
                Ok(stream) => {
                    stream.set_read_timeout(timeout)?;
                    stream.set_write_timeout(timeout)?;
                    return Ok(stream);
                }
                Err(e) => last_error = Some(e),
            }
        }
        Err(last_error.unwrap_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("cannot resolve {}", url.host))
        }))
    }
}

struct Connection<S> {
    endpoint: Url,
    codec: HttpCodec<S>,
    reusable: bool,
}

/// Client side of HTTP. Convenience calls never fail: inspect
/// [`http_success`](Self::http_success), [`status_code`](Self::status_code)
/// and [`error`](Self::error) afterwards.
pub struct HttpClient<C: Connector = TcpConnector> {
    connector: C,
    options: ClientOptions,
    connection: Option<Connection<C::Stream>>,
    cookies: CookieJar,
    headers: Headers,
    url: Url,
    status_code: u16,
    status: String,
    response_headers: Headers,
    error: String,
}

impl HttpClient<TcpConnector> {
    pub fn new() -> Self {
        Self::with_options(ClientOptions::default())
    }
    pub fn with_options(options: ClientOptions) -> Self {
        Self::with_connector(TcpConnector, options)
    }
}

impl Default for HttpClient<TcpConnector> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Connector> HttpClient<C> {
    pub fn with_connector(connector: C, options: ClientOptions) -> Self {
        Self {
            connector,
            options,
            connection: None,
            cookies: CookieJar::new(),
            headers: Headers::new(),
            url: Url::default(),
            status_code: 0,
            status: String::new(),
            response_headers: Headers::new(),
            error: String::new(),
        }
    }

    pub fn client_options(&self) -> &ClientOptions {
        &self.options
    }
    pub fn client_options_mut(&mut self) -> &mut ClientOptions {
        &mut self.options
    }
    /// Send `name: value` with every following request.
    pub fn set_header(&mut self, name: &str, value: &str) {
        self.headers.set(name, value);
    }
    pub fn clear_headers(&mut self) {
        self.headers.clear();
    }
    pub fn cookies(&self) -> &CookieJar {
        &self.cookies
    }
    pub fn cookies_mut(&mut self) -> &mut CookieJar {
        &mut self.cookies
    }
    /// Drop the kept-alive connection.
    pub fn disconnect(&mut self) {
        self.connection = None;
    }
    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    /// URL of the last response, after redirects.
    pub fn url(&self) -> &Url {
        &self.url
    }
    /// Status code of the last response, 0 if there was none.
    pub fn status_code(&self) -> u16 {
        self.status_code
    }
    pub fn status(&self) -> &str {
        &self.status
    }
    pub fn response_headers(&self) -> &Headers {
        &self.response_headers
    }
    /// Transport or protocol error of the last request, empty if none.
    pub fn error(&self) -> &str {
        &self.error
    }
    pub fn http_success(&self) -> bool {
        self.error.is_empty() && (200..300).contains(&self.status_code)
    }
    pub fn http_failure(&self) -> bool {
        !self.http_success()
    }

    pub fn get(&mut self, url: &str) -> String {
        self.request_text(Method::GET, url, b"", "")
    }
    pub fn head(&mut self, url: &str) -> bool {
        self.request(Method::HEAD, url, b"", "");
        self.http_success()
    }
    pub fn post(&mut self, url: &str, body: &str, content_type: &str) -> String {
        self.request_text(Method::POST, url, body.as_bytes(), content_type)
    }
    pub fn put(&mut self, url: &str, body: &str, content_type: &str) -> String {
        self.request_text(Method::PUT, url, body.as_bytes(), content_type)
    }
    pub fn patch(&mut self, url: &str, body: &str, content_type: &str) -> String {
        self.request_text(Method::PATCH, url, body.as_bytes(), content_type)
    }
    pub fn delete(&mut self, url: &str) -> String {
        self.request_text(Method::DELETE, url, b"", "")
    }
    pub fn options(&mut self, url: &str) -> String {
        self.request_text(Method::OPTIONS, url, b"", "")
    }

    fn request_text(&mut self, method: Method, url: &str, body: &[u8], content_type: &str) -> String {
        String::from_utf8_lossy(&self.request(method, url, body, content_type)).into_owned()
    }

    fn reset_response(&mut self) {
        self.status_code = 0;
        self.status.clear();
        self.response_headers.clear();
        self.error.clear();
    }

    /// Send a request and return the response body, empty on failure.
    pub fn request(&mut self, method: Method, url: &str, body: &[u8], content_type: &str) -> Vec<u8> {
        match Url::parse(url) {
            Ok(url) => self.request_url(method, url, body, content_type),
            Err(e) => {
                self.reset_response();
                self.error = format!("invalid url: {}", e);
                vec![]
            }
        }
    }

    pub fn request_url(&mut self, method: Method, url: Url, body: &[u8], content_type: &str) -> Vec<u8> {
        self.reset_response();
        let mut url = url;
        let mut method = method;
        if url.host.is_empty() {
            self.error = format!("no host in url: {}", url);
            return vec![];
        }
        if url.scheme.is_empty() {
            url.scheme = "http".to_string();
        }

        let form;
        let mut body = body;
        let mut content_type = content_type;
        if body.is_empty() && !url.query.is_empty() && method.has_body() && method != Method::GET {
            form = url.query.encoded().to_string();
            url.query.clear();
            body = form.as_bytes();
            content_type = FORM_CONTENT_TYPE;
        }

        let mut hops = 0;
        loop {
            self.url = url.clone();
            let response = match self.exchange(method, &url, body, content_type) {
                Some(response) => response,
                None => return vec![],
            };
            let next = match self.redirect_target(&url) {
                Some(next) => next,
                None => return response,
            };
            if hops >= self.options.max_redirects {
                debug!(
                    "not following redirect {} to {}, limit of {} reached",
                    hops + 1,
                    next,
                    self.options.max_redirects
                );
                return response;
            }
            hops += 1;
            if self.status_code == 303 && method != Method::GET {
                debug!("303 redirect changes method from {} to GET", method);
                method = Method::GET;
                body = b"";
                content_type = "";
            }
            debug!("{} redirect from {} to {}", self.status_code, url, next);
            url = next;
        }
    }

    fn redirect_target(&mut self, url: &Url) -> Option<Url> {
        match self.status_code {
            301 | 302 | 303 | 307 | 308 => {}
            _ => return None,
        }
        let location = self.response_headers.get(LOCATION).unwrap_or("").trim();
        match Url::parse(location) {
            Ok(next) => Some(next.resolve_from(url)),
            Err(_) => {
                self.error = format!(
                    "invalid {} header in {} redirection: {}",
                    LOCATION, self.status_code, location
                );
                None
            }
        }
    }

    /// One request and response on a fresh or kept-alive connection. A
    /// kept-alive connection the peer closed in the meantime is replaced
    /// once.
    fn exchange(&mut self, method: Method, url: &Url, body: &[u8], content_type: &str) -> Option<Vec<u8>> {
        self.reset_response();
        let mut attempt = 0;
        loop {
            attempt += 1;
            let reused = match &self.connection {
                Some(conn) => conn.reusable && conn.endpoint.same_endpoint(url),
                None => false,
            };
            if !reused {
                self.connection = None;
                match self.connector.connect(url, self.options.timeout()) {
                    Ok(stream) => {
                        debug!("connected to {}", url.authority());
                        self.connection = Some(Connection {
                            endpoint: url.clone(),
                            codec: HttpCodec::client(stream),
                            reusable: false,
                        });
                    }
                    Err(e) => {
                        self.error = format!("cannot connect to {}: {}", url.authority(), e);
                        return None;
                    }
                }
            }
            if self.send_request(method, url, body, content_type) {
                break;
            }
            let peer_closed = self
                .connection
                .as_ref()
                .map_or(false, |conn| conn.codec.peer_closed());
            if reused && peer_closed && attempt == 1 {
                debug!("kept-alive connection to {} was closed, reconnecting", url.authority());
                self.connection = None;
                continue;
            }
            self.error = self
                .connection
                .take()
                .map(|conn| conn.codec.error().to_string())
                .unwrap_or_default();
            return None;
        }
        self.read_response(method, url)
    }

    fn send_request(&mut self, method: Method, url: &Url, body: &[u8], content_type: &str) -> bool {
        let cookies = if self.options.accept_cookies {
            self.cookies.serialize(url)
        } else {
            String::new()
        };
        let options = &self.options;
        let headers = &self.headers;
        let codec = match self.connection.as_mut() {
            Some(conn) => &mut conn.codec,
            None => return false,
        };
        if !codec.set_resource(method, url) {
            return false;
        }
        let mut ok = true;
        if !options.user_agent.is_empty() && !headers.contains(USER_AGENT) {
            ok = ok && codec.add_header(USER_AGENT, &options.user_agent);
        }
        if options.request_compression && Compression::available() && !headers.contains(ACCEPT_ENCODING) {
            ok = ok && codec.add_header(ACCEPT_ENCODING, "gzip, deflate");
        }
        if !options.keep_alive && !headers.contains(CONNECTION) {
            ok = ok && codec.add_header(CONNECTION, "close");
        }
        if !cookies.is_empty() {
            ok = ok && codec.add_header(COOKIE, &cookies);
        }
        for (name, value) in headers.iter() {
            ok = ok && codec.add_header(name, value);
        }
        trace!("{} {} ({} bytes)", method, url, body.len());
        ok && codec.send(body, content_type)
    }

    fn read_response(&mut self, method: Method, url: &Url) -> Option<Vec<u8>> {
        let conn = self.connection.as_mut()?;
        let codec = &mut conn.codec;
        self.status_code = codec.status_code();
        if let Some(line) = codec.status_line() {
            self.status = line.status.clone();
        }
        self.response_headers = codec.headers().clone();
        let http10 = codec.status_line().map_or(false, |l| l.version == "HTTP/1.0");

        let mut body = vec![];
        if !codec.read_body(&mut body) {
            self.error = codec.error().to_string();
            self.connection = None;
            return None;
        }
        conn.reusable = self.options.keep_alive
            && !codec.is_closed()
            && !codec.is_eof()
            && !self.response_headers.connection_close()
            && (!http10 || self.response_headers.connection_keep_alive());
        if !conn.reusable {
            self.connection = None;
        }

        if self.options.accept_cookies {
            for value in self.response_headers.get_all(SET_COOKIE) {
                if !self.cookies.parse(url, value) {
                    debug!("ignoring cookie: {}", value);
                }
            }
        }
        debug!(
            "{} {} -> {} {} ({} bytes)",
            method,
            url,
            self.status_code,
            self.status,
            body.len()
        );

        if let Some(encoding) = self.response_headers.get(CONTENT_ENCODING) {
            if let Some(compression) = Compression::from_token(encoding) {
                match decode_body(compression, &body) {
                    Ok(decoded) => body = decoded,
                    Err(e) => {
                        warn!("cannot decode {} response: {}", encoding, e);
                        self.error = format!("cannot decode {} response: {}", encoding, e);
                    }
                }
            }
        }
        Some(body)
    }
}
