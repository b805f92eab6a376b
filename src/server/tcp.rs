//! TCP HTTP server.
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::time::Instant;

use log::*;

use crate::{
    config::ServerOptions,
    router::Routes,
    runner::Runner,
    server::{Server, ServerError, ServerSession},
};

/// A single or multi-threaded TCP server. Each accepted connection is
/// served by one runner job until the connection closes.
pub struct TcpServer {
    listener: TcpListener,
    runner: Runner,
    routes: Arc<Routes>,
    options: Arc<ServerOptions>,
}

impl TcpServer {
    /// Create a new TCP server
    ///
    /// # Arguments
    /// * `bind_addr`: Address to listen on, such as "0.0.0.0:8080"
    /// * `routes`: routing table, read-only once the server runs
    /// * `options`: `options.threads` picks the runner:
    ///   - 0: create a new thread for each connection (not recommended)
    ///   - 1: single-threaded
    ///   - 2+: threadpool with n threads
    pub fn new(bind_addr: &str, routes: Routes, options: ServerOptions) -> Result<Self, std::io::Error> {
        Ok(Self {
            listener: TcpListener::bind(bind_addr)?,
            runner: Runner::new(options.threads),
            routes: Arc::new(routes),
            options: Arc::new(options),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, std::io::Error> {
        self.listener.local_addr()
    }

    pub fn routes(&self) -> &Routes {
        &self.routes
    }
}

/// Serve requests on one connection, logging one access line per request.
fn serve_connection(stream: TcpStream, addr: SocketAddr, routes: &Routes, options: &ServerOptions) {
    let mut session = ServerSession::new(stream, routes, options);
    loop {
        let start = Instant::now();
        let keep_alive = session.serve_one();
        if let Some(request) = session.request() {
            let response = session.response();
            info!(
                "{:?} - {}ms - {} {} {} ({} bytes) -> {} {} ({} bytes)",
                std::thread::current().id(),
                start.elapsed().as_millis(),
                addr,
                request.method,
                request.path,
                session.rx_bytes(),
                response.status_code,
                &response.status,
                session.tx_bytes(),
            );
        } else if !session.error().is_empty() {
            debug!("{}: {}", addr, session.error());
        }
        if !keep_alive {
            break;
        }
    }
    debug!("closed connection from {:?}", addr);
}

impl Server for TcpServer {
    /// Accept one connection and hand it to the runner.
    fn serve_one(&mut self) -> Result<(), ServerError> {
        let (stream, addr) = self.listener.accept()?;
        debug!("accepted connection from {:?}", addr);
        stream.set_read_timeout(self.options.timeout())?;
        stream.set_write_timeout(self.options.timeout())?;
        let routes = self.routes.clone();
        let options = self.options.clone();
        self.runner.run(move || {
            serve_connection(stream, addr, &routes, &options);
        });
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::handler::{Context, HandlerResult};
    use std::io::prelude::*;

    fn hello(ctx: &mut Context<'_>) -> HandlerResult {
        ctx.response.set_text("text/plain", "hello");
        Ok(())
    }

    #[test]
    fn test_serves_keepalive_connection() {
        let mut routes = Routes::new();
        routes.route("/hello").get(hello);
        let mut server = TcpServer::new("127.0.0.1:0", routes, ServerOptions::default()).unwrap();
        let addr = server.local_addr().unwrap();

        let client = std::thread::spawn(move || {
            let mut stream = TcpStream::connect(addr).unwrap();
            stream
                .write_all(
                    b"GET /hello HTTP/1.1\r\nHost: x\r\n\r\n\
                      GET /hello HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n",
                )
                .unwrap();
            let mut out = String::new();
            stream.read_to_string(&mut out).unwrap();
            out
        });
        server.serve_one().unwrap();
        let out = client.join().unwrap();
        assert_eq!(out.matches("HTTP/1.1 200 OK\r\n").count(), 2);
        assert!(out.ends_with("Connection: close\r\nContent-Length: 5\r\n\r\nhello"));
    }
}
