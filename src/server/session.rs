//! One server connection: parse, dispatch, serialize, repeat while the
//! connection is kept alive.
use std::fs::OpenOptions;
use std::io::prelude::*;
use std::path::Path;

use log::{debug, trace, warn};
use serde_json::{json, Value};

use crate::codec::{BodyRead, HttpCodec};
use crate::config::ServerOptions;
use crate::error::HttpError;
use crate::handler::Context;
use crate::header::{CONNECTION, CONTENT_ENCODING, CONTENT_LENGTH, CONTENT_TYPE, LOCATION, SERVER, TRANSFER_ENCODING};
use crate::io::Compression;
use crate::method::Method;
use crate::request::{Param, Request};
use crate::response::{Payload, Response};
use crate::router::stats::Stopwatch;
use crate::router::{ParserType, RequestPath, Route, RouteOptions, Routes};
use crate::url::Query;

const COPY_BUFFER_SIZE: usize = 8192;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Accepted,
    Parsed,
    ParseFailed,
    Dispatched,
    Sent,
    Closed,
}

/// Error response body in the format of a route's parser type.
pub fn error_response(error: &HttpError, parser: ParserType, pretty: bool) -> Response {
    let mut response = Response::new(error.status_code());
    match parser {
        ParserType::Plain => {
            response.set_text("text/plain; charset=UTF-8", &format!("{}\n", error.message()));
        }
        _ => {
            let body = json!({ "message": error.message(), "status": error.status_code() });
            let text = if pretty {
                serde_json::to_string_pretty(&body)
            } else {
                serde_json::to_string(&body)
            };
            response.set_text("application/json", &text.unwrap_or_default());
        }
    }
    response
}

/// Append `request` and its pre-read body to `file` as one JSON line.
fn record_request(file: &Path, request: &Request, body: &[u8]) -> std::io::Result<()> {
    let headers: Vec<(&str, &str)> = request.headers.iter().collect();
    let line = json!({
        "method": request.method.as_str(),
        "target": request.target,
        "version": request.version,
        "headers": headers,
        "body": String::from_utf8_lossy(body),
    });
    let mut out = OpenOptions::new().create(true).append(true).open(file)?;
    writeln!(out, "{}", line)
}

/// Binds one byte stream to the routing table.
///
/// # Example
/// ```
/// use resthttp::config::ServerOptions;
/// use resthttp::handler::{Context, HandlerResult};
/// use resthttp::io::ReadWriteAdapter;
/// use resthttp::router::Routes;
/// use resthttp::server::ServerSession;
///
/// fn get_user(ctx: &mut Context<'_>) -> HandlerResult {
///     let id = ctx.param("id").unwrap_or("").to_string();
///     ctx.set_json(serde_json::json!({ "id": id }));
///     Ok(())
/// }
///
/// let mut routes = Routes::new();
/// routes.route("/user/:id").get(get_user);
/// let options = ServerOptions::default();
///
/// let input = b"GET /user/42 HTTP/1.1\r\nConnection: close\r\n\r\n";
/// let mut session = ServerSession::new(ReadWriteAdapter::new(&input[..], vec![]), &routes, &options);
/// assert!(!session.serve_one());
/// assert_eq!(session.response().status_code, 200);
/// let output = session.into_inner().into_parts().1;
/// assert!(output.ends_with(br#"{"id":"42"}"#));
/// ```
pub struct ServerSession<'r, S> {
    codec: HttpCodec<S>,
    routes: &'r Routes,
    options: &'r ServerOptions,
    state: SessionState,
    request: Option<Request>,
    route: Option<&'r Route>,
    response: Response,
    error: String,
    compression: Option<Compression>,
    compression_decided: bool,
    keep_alive: bool,
    served: usize,
    stopwatch: Stopwatch,
}

impl<'r, S: Read + Write> ServerSession<'r, S> {
    pub fn new(stream: S, routes: &'r Routes, options: &'r ServerOptions) -> Self {
        Self::from_codec(HttpCodec::server(stream), routes, options)
    }

    /// Continue serving a connection whose codec outlived a previous session.
    pub fn from_codec(codec: HttpCodec<S>, routes: &'r Routes, options: &'r ServerOptions) -> Self {
        Self {
            codec,
            routes,
            options,
            state: SessionState::Accepted,
            request: None,
            route: None,
            response: Response::new(200),
            error: String::new(),
            compression: None,
            compression_decided: false,
            keep_alive: false,
            served: 0,
            stopwatch: Stopwatch::new(),
        }
    }

    /// Count `served` requests as already served on this connection.
    pub fn with_served(mut self, served: usize) -> Self {
        self.served = served;
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }
    pub fn error(&self) -> &str {
        &self.error
    }
    pub fn request(&self) -> Option<&Request> {
        self.request.as_ref()
    }
    pub fn response(&self) -> &Response {
        &self.response
    }
    pub fn response_mut(&mut self) -> &mut Response {
        &mut self.response
    }
    pub fn route(&self) -> Option<&'r Route> {
        self.route
    }
    /// Requests served on this connection.
    pub fn served(&self) -> usize {
        self.served
    }
    pub fn rx_bytes(&self) -> u64 {
        self.codec.rx_bytes()
    }
    pub fn tx_bytes(&self) -> u64 {
        self.codec.tx_bytes()
    }
    pub fn stopwatch(&self) -> &Stopwatch {
        &self.stopwatch
    }
    pub fn codec(&self) -> &HttpCodec<S> {
        &self.codec
    }
    pub fn into_codec(self) -> HttpCodec<S> {
        self.codec
    }
    pub fn into_inner(self) -> S {
        self.codec.into_inner()
    }

    fn reset(&mut self) {
        self.state = SessionState::Accepted;
        self.request = None;
        self.route = None;
        self.response = Response::new(200);
        self.error.clear();
        self.compression = None;
        self.compression_decided = false;
        self.keep_alive = false;
        self.stopwatch = Stopwatch::new();
        self.codec.reset_counters();
    }

    /// Read the next request head.
    pub fn parse(&mut self) -> bool {
        if self.state != SessionState::Accepted {
            warn!("parse: not allowed in state {:?}", self.state);
            return false;
        }
        if !self.codec.parse_header_block() {
            self.error = self.codec.error().to_string();
            self.state = if self.codec.is_closed() {
                SessionState::Closed
            } else {
                SessionState::ParseFailed
            };
            return false;
        }
        let line = match self.codec.request_line() {
            Some(line) => line.clone(),
            None => {
                self.error = "no request line".to_string();
                self.state = SessionState::ParseFailed;
                return false;
            }
        };
        let request = Request::from_line(line, self.codec.headers().clone());
        trace!("REQUEST {:?}", &request);
        self.request = Some(request);
        self.stopwatch.lap("parse");
        self.state = SessionState::Parsed;
        true
    }

    /// Route the parsed request and run its handler. Routing and handler
    /// failures come back as typed errors.
    pub fn dispatch(&mut self) -> Result<(), HttpError> {
        if self.state != SessionState::Parsed {
            warn!("dispatch: not allowed in state {:?}", self.state);
            return Err(HttpError::internal("request not parsed"));
        }
        self.state = SessionState::Dispatched;
        let mut request = match self.request.take() {
            Some(request) => request,
            None => return Err(HttpError::internal("request not parsed")),
        };
        let result = self.dispatch_request(&mut request);
        self.request = Some(request);
        self.stopwatch.lap("handle");
        result
    }

    fn dispatch_request(&mut self, request: &mut Request) -> Result<(), HttpError> {
        let routes = self.routes;
        let options = self.options;

        if let Some(target) = routes.redirect(&request.path) {
            debug!("redirecting {} to {}", request.path, target);
            self.response = Response::new(301);
            self.response.headers.set(LOCATION, &target);
            return Ok(());
        }

        let mut path = request.path.clone();
        routes.rewrite(&mut path);

        if !options.base_route.is_empty() {
            let base = options.base_route.as_str();
            match path.strip_prefix(base) {
                Some(rest) if rest.is_empty() || rest.starts_with('/') => path = rest.to_string(),
                _ => {
                    self.route = Some(routes.default_route());
                    return Err(HttpError::NotFound(format!(
                        "invalid path: {} {}",
                        request.method, request.path
                    )));
                }
            }
        }

        let request_path = RequestPath::new(request.method, &path).with_websocket(request.is_websocket());
        self.stopwatch.lap("route");
        let (route, captures) = match routes.find_route(&request_path, true) {
            Ok(found) => found,
            Err(e) => {
                self.route = Some(routes.default_route());
                return Err(e);
            }
        };
        self.route = Some(route);
        for (name, value) in captures {
            request.params.add(Param::Path(name), value);
        }

        if route.options().contains(RouteOptions::GENERIC_AUTH) {
            match routes.authenticator() {
                Some(auth) => auth.authenticate(request)?,
                None => warn!("route {} wants authentication, no authenticator set", route.pattern()),
            }
        }

        let mut body = vec![];
        let mut json_in = Value::Null;
        match route.parser() {
            ParserType::NoRead => {}
            parser => {
                if !self.codec.read_body(&mut body) {
                    return Err(HttpError::bad_request(&format!(
                        "cannot read request body: {}",
                        self.codec.error()
                    )));
                }
                match parser {
                    ParserType::Json if !body.is_empty() => {
                        json_in = serde_json::from_slice(&body)?;
                    }
                    ParserType::WwwForm => {
                        let form = Query::parse(&String::from_utf8_lossy(&body));
                        for (name, value) in form.iter() {
                            request.params.add(Param::Body(name.to_string()), Some(value.to_string()));
                        }
                    }
                    _ => {}
                }
            }
        }
        self.stopwatch.lap("receive");
        if let Some(file) = options.recording() {
            if let Err(e) = record_request(file, request, &body) {
                warn!("cannot record request into {:?}: {}", file, e);
            }
        }

        let handler = match route.handler() {
            Some(handler) => handler,
            None => return Err(HttpError::internal("route has no handler")),
        };
        let mut input = BodyRead::new(&mut self.codec);
        let mut ctx = Context::new(std::mem::take(request), route, routes, &request_path, &mut input);
        ctx.body = body;
        ctx.json_in = json_in;
        let result = handler.handle(&mut ctx);
        let (handled, mut response, json_out) = ctx.into_parts();
        *request = handled;
        result?;

        if !response.has_payload() && !json_out.is_null() {
            let text = if options.json_pretty {
                serde_json::to_string_pretty(&json_out)
            } else {
                serde_json::to_string(&json_out)
            }?;
            response.set_text("application/json", &text);
        }
        self.response = response;
        Ok(())
    }

    /// Replace the response by the error response for `error`.
    pub fn set_error(&mut self, error: &HttpError) {
        debug!("{}", error);
        let parser = self
            .route
            .map_or_else(|| self.routes.default_route().parser(), |r| r.parser());
        self.error = error.to_string();
        self.response = error_response(error, parser, self.options.json_pretty);
    }

    /// Decide once whether the response body goes out compressed. A
    /// compressed body is always chunked and never has a Content-Length.
    pub fn enable_compression_if_possible(&mut self) -> bool {
        if self.compression_decided {
            return self.compression.is_some();
        }
        self.compression_decided = true;
        if !self.options.compression || !Compression::available() {
            return false;
        }
        let request = match &self.request {
            Some(request) => request,
            None => return false,
        };
        if request.method == Method::HEAD
            || !self.response.allows_body()
            || !self.response.has_payload()
            || self.response.content_length() == Some(0)
            || self.response.headers.contains(CONTENT_ENCODING)
        {
            return false;
        }
        let compression = match request
            .headers
            .supported_compression(&self.options.permitted_compression)
        {
            Some(compression) => compression,
            None => return false,
        };
        debug!("compressing response with {}", compression.as_str());
        self.response.headers.set(CONTENT_ENCODING, compression.as_str());
        self.response.headers.remove(CONTENT_LENGTH);
        self.response.headers.set(TRANSFER_ENCODING, "chunked");
        self.compression = Some(compression);
        true
    }

    fn finalize_headers(&mut self) {
        let options = self.options;
        if !options.server_name.is_empty() {
            self.response.headers.set(SERVER, &options.server_name);
        }
        for (name, value) in &options.response_headers {
            self.response.headers.set(name, value);
        }
        if let Some(name) = &options.timer_header {
            if let Some(elapsed) = self.stopwatch.lap_time("handle") {
                self.response.headers.set(name, &elapsed.as_micros().to_string());
            }
        }
        let http10 = self.request.as_ref().map_or(false, |r| r.version == "HTTP/1.0");
        if !self.keep_alive {
            self.response.headers.set(CONNECTION, "close");
        } else if http10 {
            self.response.headers.set(CONNECTION, "keep-alive");
        }
        self.enable_compression_if_possible();
        self.response.set_content_length();
        if self.response.allows_body()
            && !self.response.headers.contains(CONTENT_TYPE)
            && self.response.content_length() != Some(0)
        {
            self.response.headers.set(CONTENT_TYPE, "application/octet-stream");
        }
    }

    /// Write the response: headers first, then the body unless the request
    /// was HEAD.
    pub fn serialize(&mut self) -> bool {
        match self.state {
            SessionState::Parsed | SessionState::ParseFailed | SessionState::Dispatched => {}
            state => {
                warn!("serialize: not allowed in state {:?}", state);
                return false;
            }
        }
        self.finalize_headers();
        trace!("RESPONSE {:?}", &self.response);
        let send_body = self.response.allows_body()
            && self.request.as_ref().map_or(true, |r| r.method != Method::HEAD);
        if !self.codec.write_head(&self.response, self.compression) {
            return self.failed();
        }
        if send_body {
            match self.response.take_payload() {
                Payload::Empty => {}
                Payload::Bytes(bytes) => {
                    if !self.codec.write_body(&bytes) {
                        return self.failed();
                    }
                }
                Payload::Stream { mut reader, .. } => {
                    let mut buf = vec![0; COPY_BUFFER_SIZE];
                    loop {
                        let n = match reader.read(&mut buf) {
                            Ok(0) => break,
                            Ok(n) => n,
                            Err(e) => {
                                // the head is out, all we can do is cut the body short
                                warn!("error reading response body: {}", e);
                                self.codec.finish(false);
                                self.error = e.to_string();
                                self.state = SessionState::Closed;
                                return false;
                            }
                        };
                        if !self.codec.write_body(&buf[..n]) {
                            return self.failed();
                        }
                    }
                }
            }
        }
        if !self.codec.finish(send_body) {
            return self.failed();
        }
        self.stopwatch.lap("send");
        if self.options.record_statistics {
            if let Some(route) = self.route {
                route.statistics().record(self.codec.rx_bytes(), self.codec.tx_bytes());
                self.stopwatch.record_into(route.statistics());
            }
        }
        self.state = SessionState::Sent;
        true
    }

    fn failed(&mut self) -> bool {
        self.error = self.codec.error().to_string();
        self.state = SessionState::Closed;
        false
    }

    /// Serve one request. Returns true if the connection stays open for
    /// another one.
    pub fn serve_one(&mut self) -> bool {
        if self.state == SessionState::Closed {
            return false;
        }
        self.reset();
        if !self.parse() {
            if self.state == SessionState::Closed {
                debug!("connection closed: {}", self.error);
                return false;
            }
            let error = HttpError::BadRequest(self.error.clone());
            self.set_error(&error);
            self.keep_alive = false;
            self.serialize();
            self.state = SessionState::Closed;
            return false;
        }
        if let Err(e) = self.dispatch() {
            self.set_error(&e);
        }
        self.served += 1;
        self.keep_alive = self.request.as_ref().map_or(false, |r| r.keep_alive())
            && self.served < self.options.max_keepalive_requests;
        if !self.codec.drain() {
            self.keep_alive = false;
        }
        if !self.serialize() {
            return false;
        }
        if !self.keep_alive {
            self.state = SessionState::Closed;
        }
        self.keep_alive
    }

    /// Serve requests until the connection closes.
    pub fn run(&mut self) {
        while self.serve_one() {}
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::handler::HandlerResult;
    use crate::io::{decode_body, ReadWriteAdapter};

    type Session<'a> = ServerSession<'a, ReadWriteAdapter<&'a [u8], Vec<u8>>>;

    fn user_routes() -> Routes {
        let mut routes = Routes::new();
        routes.route("/user/:id").get(|ctx| {
            let id = ctx.param("id").unwrap_or("").to_string();
            ctx.set_json(json!({ "id": id }));
            Ok(())
        });
        routes.route("/user").post(|ctx| {
            let name = ctx.json_in["name"].as_str().unwrap_or("").to_string();
            ctx.response.set_status(201);
            ctx.set_json(json!({ "created": name }));
            Ok(())
        });
        routes
            .route("/text")
            .with_parser(ParserType::Plain)
            .post(|ctx| {
                let body = String::from_utf8_lossy(&ctx.body).to_uppercase();
                ctx.response.set_text("text/plain", &body);
                Ok(())
            });
        routes
            .route("/form")
            .with_parser(ParserType::WwwForm)
            .post(|ctx| {
                let a = ctx.param("a").unwrap_or("").to_string();
                ctx.response.set_text("text/plain", &a);
                Ok(())
            });
        routes
            .route("/fail")
            .with_parser(ParserType::Plain)
            .get(|_| Err(HttpError::Status(418, "teapot".to_string())));
        routes
    }

    fn session<'a>(input: &'a [u8], routes: &'a Routes, options: &'a ServerOptions) -> Session<'a> {
        ServerSession::new(ReadWriteAdapter::new(input, vec![]), routes, options)
    }

    fn output(session: Session<'_>) -> String {
        String::from_utf8(session.into_inner().into_parts().1).unwrap()
    }

    #[test]
    fn test_end_to_end_dispatch() {
        let routes = user_routes();
        let options = ServerOptions::default();
        let input = b"GET /user/42 HTTP/1.1\r\nHost: x\r\n\r\n\
                      DELETE /user/42 HTTP/1.1\r\n\r\n\
                      GET /nope HTTP/1.1\r\nConnection: close\r\n\r\n";
        let mut s = session(input, &routes, &options);

        assert!(s.serve_one());
        assert_eq!(s.response().status_code, 200);
        assert_eq!(s.request().unwrap().params.get_any("id"), Some("42"));

        assert!(s.serve_one());
        assert_eq!(s.response().status_code, 405);

        assert!(!s.serve_one());
        assert_eq!(s.response().status_code, 404);
        assert_eq!(s.served(), 3);

        let out = output(s);
        assert!(out.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(out.contains("{\"id\":\"42\"}"));
        assert!(out.contains("HTTP/1.1 405 Method Not Allowed\r\n"));
        assert!(out.contains(
            "{\"message\":\"request method DELETE not supported for path: /user/42\",\"status\":405}"
        ));
        assert!(out.contains("HTTP/1.1 404 Not Found\r\n"));
        assert!(out.contains("Connection: close\r\n"));
    }

    #[test]
    fn test_json_and_form_bodies() {
        let routes = user_routes();
        let options = ServerOptions::default();
        let input = b"POST /user HTTP/1.1\r\nContent-Length: 16\r\n\r\n{\"name\":\"alice\"}\
                      POST /form HTTP/1.1\r\nContent-Length: 7\r\n\r\na=1&b=2\
                      POST /text HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n2\r\nhi\r\n0\r\n\r\n\
                      POST /user HTTP/1.1\r\nContent-Length: 5\r\n\r\n{bad}";
        let mut s = session(input, &routes, &options);
        assert!(s.serve_one());
        assert_eq!(s.response().status_code, 201);
        assert!(s.serve_one());
        assert_eq!(s.request().unwrap().params.get_first(&Param::Body("b".into())), Some("2"));
        assert!(s.serve_one());
        assert!(s.serve_one());
        assert_eq!(s.response().status_code, 400);

        let out = output(s);
        assert!(out.contains("HTTP/1.1 201 Created\r\n"));
        assert!(out.contains("Content-Length: 19\r\n\r\n{\"created\":\"alice\"}"));
        assert!(out.contains("Content-Length: 1\r\n\r\n1HTTP/1.1"));
        assert!(out.contains("Content-Length: 2\r\n\r\nHIHTTP/1.1"));
        assert!(out.contains("HTTP/1.1 400 Bad Request\r\n"));
    }

    #[test]
    fn test_plain_error_and_unread_body_is_drained() {
        let routes = user_routes();
        let options = ServerOptions::default();
        let input = b"GET /fail HTTP/1.1\r\nContent-Length: 3\r\n\r\nxyz\
                      GET /user/7 HTTP/1.1\r\n\r\n";
        let mut s = session(input, &routes, &options);
        assert!(s.serve_one());
        assert_eq!(s.response().status_code, 418);
        assert!(s.serve_one());
        assert_eq!(s.response().status_code, 200);

        let out = output(s);
        assert!(out.starts_with("HTTP/1.1 418 I'm a teapot\r\n"));
        assert!(out.contains("Content-Type: text/plain; charset=UTF-8\r\n"));
        assert!(out.contains("Content-Length: 7\r\n\r\nteapot\nHTTP/1.1 200 OK\r\n"));
        assert!(out.ends_with("Content-Length: 10\r\n\r\n{\"id\":\"7\"}"));
    }

    #[test]
    fn test_bodiless_status_has_no_framing() {
        let mut routes = Routes::new();
        routes.route("/gone").delete(|ctx| {
            ctx.response.set_status(204);
            Ok(())
        });
        routes.route("/cached").get(|ctx| {
            ctx.response.set_status(304);
            ctx.response.set_text("text/plain", "stale");
            Ok(())
        });
        let options = ServerOptions::default();
        let input = b"DELETE /gone HTTP/1.1\r\n\r\nGET /cached HTTP/1.1\r\nAccept-Encoding: gzip\r\n\r\n";
        let mut s = session(input, &routes, &options);
        assert!(s.serve_one());
        assert!(s.serve_one());
        assert!(!s.response().headers.contains("content-encoding"));
        let out = output(s);
        assert!(out.starts_with("HTTP/1.1 204 No Content\r\n"));
        assert!(out.contains("HTTP/1.1 304 Not Modified\r\n"));
        assert!(!out.contains("Content-Length"));
        assert!(!out.contains("Transfer-Encoding"));
        assert!(!out.contains("stale"));
        assert!(out.ends_with("\r\n\r\n"));
    }

    #[test]
    fn test_handler_changes_to_request_are_kept() {
        let mut routes = Routes::new();
        routes.route("/tag/:id").get(|ctx| {
            ctx.request.params.add(Param::Path("seen".into()), Some("yes".into()));
            Ok(())
        });
        routes.route("/tag-fail").get(|ctx| {
            ctx.request.params.add(Param::Path("seen".into()), Some("no".into()));
            Err(HttpError::bad_request("rejected"))
        });
        let options = ServerOptions::default();
        let input = b"GET /tag/3 HTTP/1.1\r\n\r\nGET /tag-fail HTTP/1.1\r\n\r\n";
        let mut s = session(input, &routes, &options);
        assert!(s.serve_one());
        let request = s.request().unwrap();
        assert_eq!(request.params.get_any("id"), Some("3"));
        assert_eq!(request.params.get_any("seen"), Some("yes"));
        assert!(s.serve_one());
        assert_eq!(s.response().status_code, 400);
        assert_eq!(s.request().unwrap().params.get_any("seen"), Some("no"));
    }

    #[test]
    fn test_requests_recorded_as_json_lines() {
        let file = std::env::temp_dir().join(format!("resthttp-record-{}.jsonl", std::process::id()));
        let _ = std::fs::remove_file(&file);
        let routes = user_routes();
        let options = ServerOptions::default().with_record_file(&file);
        let input = b"POST /user HTTP/1.1\r\nContent-Length: 16\r\n\r\n{\"name\":\"alice\"}\
                      GET /user/5?x=1 HTTP/1.1\r\nConnection: close\r\n\r\n";
        let mut s = session(input, &routes, &options);
        s.run();
        assert_eq!(s.served(), 2);

        let text = std::fs::read_to_string(&file).unwrap();
        let lines: Vec<Value> = text.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
        let _ = std::fs::remove_file(&file);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["method"], "POST");
        assert_eq!(lines[0]["body"], "{\"name\":\"alice\"}");
        assert_eq!(lines[0]["headers"][0], json!(["Content-Length", "16"]));
        assert_eq!(lines[1]["target"], "/user/5?x=1");
        assert_eq!(lines[1]["body"], "");
    }

    #[test]
    fn test_head_sends_no_body() {
        let routes = user_routes();
        let options = ServerOptions::default();
        let mut s = session(b"HEAD /user/1 HTTP/1.1\r\nConnection: close\r\n\r\n", &routes, &options);
        assert!(!s.serve_one());
        let out = output(s);
        assert!(out.contains("Content-Length: 10\r\n"));
        assert!(out.ends_with("\r\n\r\n"));
    }

    #[cfg(feature = "compression")]
    #[test]
    fn test_compression_never_mixes_length_and_chunked() {
        let routes = user_routes();
        let options = ServerOptions::default();
        let input = b"GET /user/99 HTTP/1.1\r\nAccept-Encoding: br, gzip\r\nConnection: close\r\n\r\n";
        let mut s = session(input, &routes, &options);
        assert!(!s.serve_one());
        let headers = &s.response().headers;
        assert_eq!(headers.get("content-encoding"), Some("gzip"));
        assert!(headers.is_chunked());
        assert!(!headers.contains("content-length"));

        let out = s.into_inner().into_parts().1;
        let mut client = HttpCodec::client(ReadWriteAdapter::new(&out[..], vec![]));
        assert!(client.set_resource(Method::GET, &crate::url::Url::resource("/user/99")));
        assert!(client.send(b"", ""));
        assert!(client.body_is_chunked());
        let mut body = vec![];
        assert!(client.read_body(&mut body));
        assert_eq!(decode_body(Compression::Gzip, &body).unwrap(), b"{\"id\":\"99\"}");
    }

    #[test]
    fn test_compression_decided_once() {
        let routes = user_routes();
        let options = ServerOptions::default().with_compression(false);
        let input = b"GET /user/1 HTTP/1.1\r\nAccept-Encoding: gzip\r\n\r\n";
        let mut s = session(input, &routes, &options);
        assert!(s.parse());
        s.dispatch().unwrap();
        assert!(!s.enable_compression_if_possible());
        assert!(!s.enable_compression_if_possible());
        assert!(s.response().headers.get("content-encoding").is_none());
    }

    #[test]
    fn test_bad_request_line() {
        let routes = user_routes();
        let options = ServerOptions::default();
        let mut s = session(b"garbage\r\n\r\n", &routes, &options);
        assert!(!s.serve_one());
        assert_eq!(s.response().status_code, 400);
        assert_eq!(s.state(), SessionState::Closed);
        assert!(output(s).starts_with("HTTP/1.1 400 Bad Request\r\n"));
    }

    #[test]
    fn test_redirect_rewrite_and_base_route() {
        let mut routes = user_routes();
        routes.add_redirect("^/api/old/(.*)$", "/api/user/$1").unwrap();
        routes.add_rewrite("^/api/u/(.*)$", "/api/user/$1").unwrap();
        let options = ServerOptions::default().with_base_route("/api");
        let input = b"GET /api/old/5 HTTP/1.1\r\n\r\n\
                      GET /api/u/6 HTTP/1.1\r\n\r\n\
                      GET /user/6 HTTP/1.1\r\n\r\n";
        let mut s = session(input, &routes, &options);
        assert!(s.serve_one());
        assert_eq!(s.response().status_code, 301);
        assert_eq!(s.response().headers.get("location"), Some("/api/user/5"));
        assert!(s.serve_one());
        assert_eq!(s.response().status_code, 200);
        assert_eq!(s.request().unwrap().params.get_any("id"), Some("6"));
        assert!(s.serve_one());
        assert_eq!(s.response().status_code, 404);
    }

    #[test]
    fn test_keepalive_limit_and_extra_headers() {
        let routes = user_routes();
        let options = ServerOptions::default()
            .with_max_keepalive_requests(1)
            .with_response_header("X-Frame-Options", "DENY")
            .with_timer_header("X-Handler-Time");
        let mut s = session(b"GET /user/1 HTTP/1.1\r\n\r\nGET /user/2 HTTP/1.1\r\n\r\n", &routes, &options);
        assert!(!s.serve_one());
        let headers = &s.response().headers;
        assert_eq!(headers.get("connection"), Some("close"));
        assert_eq!(headers.get("x-frame-options"), Some("DENY"));
        assert!(headers.contains("x-handler-time"));
    }

    #[test]
    fn test_statistics_recorded() {
        let routes = user_routes();
        let options = ServerOptions::default();
        let mut s = session(b"GET /user/1 HTTP/1.1\r\nConnection: close\r\n\r\n", &routes, &options);
        s.run();
        let stats = routes.iter().next().unwrap().statistics().snapshot();
        assert_eq!(stats.requests, 1);
        assert!(stats.tx_bytes > 0);
        assert!(stats.timers_us.contains_key("handle"));
    }

    fn generic_auth_ok(ctx: &mut Context<'_>) -> HandlerResult {
        ctx.response.set_text("text/plain", "in");
        Ok(())
    }

    #[test]
    fn test_generic_auth_route_option() {
        let mut routes = Routes::new();
        routes
            .route("/private")
            .with_options(RouteOptions::GENERIC_AUTH)
            .get(generic_auth_ok);
        routes.set_authenticator(crate::auth::bearer_token("t"));
        let options = ServerOptions::default();
        let input = b"GET /private HTTP/1.1\r\n\r\nGET /private HTTP/1.1\r\nAuthorization: Bearer t\r\n\r\n";
        let mut s = session(input, &routes, &options);
        assert!(s.serve_one());
        assert_eq!(s.response().status_code, 401);
        assert!(s.serve_one());
        assert_eq!(s.response().status_code, 200);
    }
}
