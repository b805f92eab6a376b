//! Generic IO Stream HTTP server.
use std::io::prelude::*;

use log::debug;

use crate::codec::HttpCodec;
use crate::config::ServerOptions;
use crate::router::Routes;
use crate::server::{Server, ServerError, ServerSession};

/// Serve HTTP requests over a generic stream, one request per call to
/// `serve_one`. The stream stays open between calls until the client asks
/// to close it.
///
/// # Example
/// ```
/// use resthttp::prelude::*;
/// use resthttp::io::ReadWriteAdapter;
/// use resthttp::server::StreamServer;
///
/// fn handle_hello(ctx: &mut Context<'_>) -> HandlerResult {
///     ctx.response.set_text("text/plain", "Hello!");
///     Ok(())
/// }
///
/// let mut routes = Routes::new();
/// routes.route("/").get(handle_hello);
///
/// let read_buf = b"GET / HTTP/1.1\r\nHost: localhost\r\n\r\n";
/// let stream = ReadWriteAdapter::new(&read_buf[..], vec![]);
/// let mut server = StreamServer::new(stream, routes, ServerOptions::default());
/// server.serve_one().unwrap();
///
/// let written = server.into_inner().unwrap().into_parts().1;
/// assert_eq!(
///     std::str::from_utf8(&written[..]).unwrap(),
///     &format!(
///       "HTTP/1.1 200 OK\r\n\
///        Content-Type: text/plain\r\n\
///        Server: resthttp/{}\r\n\
///        Content-Length: 6\r\n\
///        \r\n\
///        Hello!", resthttp::VERSION
///     )
/// );
/// ```
pub struct StreamServer<S> {
    routes: Routes,
    options: ServerOptions,
    codec: Option<HttpCodec<S>>,
    served: usize,
    closed: bool,
}

impl<S: Read + Write> StreamServer<S> {
    pub fn new(stream: S, routes: Routes, options: ServerOptions) -> Self {
        Self {
            routes,
            options,
            codec: Some(HttpCodec::server(stream)),
            served: 0,
            closed: false,
        }
    }
    pub fn routes(&self) -> &Routes {
        &self.routes
    }
    pub fn options(&self) -> &ServerOptions {
        &self.options
    }
    /// Requests served so far.
    pub fn served(&self) -> usize {
        self.served
    }
    /// Whether the connection was closed by either side.
    pub fn is_closed(&self) -> bool {
        self.closed
    }
    pub fn into_inner(self) -> Option<S> {
        self.codec.map(HttpCodec::into_inner)
    }
}

impl<S: Read + Write> Server for StreamServer<S> {
    fn serve_one(&mut self) -> Result<(), ServerError> {
        if self.closed {
            return Err(ServerError::new("connection closed"));
        }
        let codec = match self.codec.take() {
            Some(codec) => codec,
            None => return Err(ServerError::new("connection closed")),
        };
        let mut session =
            ServerSession::from_codec(codec, &self.routes, &self.options).with_served(self.served);
        let keep_alive = session.serve_one();
        let served = session.served() - self.served;
        let error = session.error().to_string();
        self.served = session.served();
        self.codec = Some(session.into_codec());
        if !keep_alive {
            debug!("closing stream after {} requests", self.served);
            self.closed = true;
        }
        if served == 0 {
            return Err(ServerError::new(&error));
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::handler::{Context, HandlerResult};
    use crate::io::ReadWriteAdapter;

    fn echo(ctx: &mut Context<'_>) -> HandlerResult {
        let body = ctx.body.clone();
        ctx.response.set_payload(body);
        Ok(())
    }

    fn routes() -> Routes {
        let mut routes = Routes::new();
        routes
            .route("/echo")
            .with_parser(crate::router::ParserType::Plain)
            .post(echo);
        routes
    }

    #[test]
    fn test_serves_until_close() {
        let input = b"POST /echo HTTP/1.1\r\nContent-Length: 3\r\n\r\nabc\
                      POST /echo HTTP/1.1\r\nContent-Length: 2\r\nConnection: close\r\n\r\nde";
        let stream = ReadWriteAdapter::new(&input[..], vec![]);
        let mut server = StreamServer::new(stream, routes(), ServerOptions::default());
        server.serve_one().unwrap();
        assert!(!server.is_closed());
        server.serve_one().unwrap();
        assert_eq!(server.served(), 2);
        assert!(server.serve_one().is_err());
    }

    #[test]
    fn test_eof_is_an_error() {
        let stream = ReadWriteAdapter::new(&b""[..], vec![]);
        let mut server = StreamServer::new(stream, routes(), ServerOptions::default());
        assert!(server.serve_one().is_err());
        assert!(server.is_closed());
    }
}
