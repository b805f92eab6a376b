//! Components for building HTTP/1.1 REST services and clients on blocking
//! streams. This is a learning project, use at your own risk.
//! * Client and server side [message codec](crate::codec::HttpCodec) with
//!   chunked framing and gzip/deflate bodies
//! * Path-based [request routing](crate::router::Routes) with parameters,
//!   wildcards, rewrites, redirects and per-route statistics
//! * Multi-threaded [TCP server](crate::server::tcp::TcpServer) with
//!   keep-alive, and a [stream server](crate::server::StreamServer) for any
//!   `Read + Write`
//! * [Static files](crate::handler::directory::DirectoryHandler)
//! * [HTTP client](crate::client::HttpClient) following redirects, with a
//!   cookie jar
//!
//! # Example
//! ```
//! use resthttp::io::ReadWriteAdapter;
//! use resthttp::prelude::*;
//! use resthttp::server::StreamServer;
//!
//! #[derive(Debug, serde::Serialize, serde::Deserialize)]
//! struct Person {
//!     name: String,
//! }
//!
//! fn get_person(ctx: &mut Context<'_>) -> HandlerResult {
//!     let name = ctx.param("name").unwrap_or("John").to_string();
//!     ctx.set_json(serde_json::to_value(Person { name })?);
//!     Ok(())
//! }
//!
//! fn add_person(ctx: &mut Context<'_>) -> HandlerResult {
//!     let person: Person = serde_json::from_value(ctx.json_in.take())?;
//!     ctx.response.set_status(201);
//!     ctx.set_json(serde_json::json!({ "created": person.name }));
//!     Ok(())
//! }
//!
//! fn api() -> Routes {
//!     let mut routes = Routes::new();
//!     routes.route("/person/:name").get(get_person);
//!     routes.route("/person").post(add_person);
//!     routes
//! }
//!
//! fn main() {
//!     let request = b"GET /person/Bob HTTP/1.0\r\nAccept: */*\r\n\r\n";
//!     let stream = ReadWriteAdapter::new(&request[..], vec![]);
//!     let mut server = StreamServer::new(stream, api(), ServerOptions::default());
//!     server.serve_one().unwrap();
//!     let written = server.into_inner().unwrap().into_parts().1;
//!     let response = std::str::from_utf8(&written).unwrap();
//!     assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
//!     assert!(response.ends_with(r#"{"name":"Bob"}"#));
//! }
//! ```
pub mod auth;
pub mod client;
pub mod codec;
pub mod config;
pub mod error;
pub mod handler;
pub mod header;
pub mod io;
pub mod method;
pub mod prelude;
pub mod request;
pub mod response;
pub mod router;
pub mod runner;
pub mod server;
pub mod url;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
