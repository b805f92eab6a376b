//! Server and client options.
//!
//! Both option sets can be built in code with the `with_*` methods or read
//! from a JSON document; missing keys keep their defaults.
//!
//! ```
//! use resthttp::config::ServerOptions;
//!
//! let options = ServerOptions::from_json(r#"{ "timeout_secs": 5, "base_route": "/api" }"#).unwrap();
//! assert_eq!(options.timeout_secs, 5);
//! assert_eq!(options.max_keepalive_requests, 100);
//! ```
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::io::Compression;
use crate::VERSION;

fn timeout(seconds: u64) -> Option<Duration> {
    if seconds == 0 {
        None
    } else {
        Some(Duration::from_secs(seconds))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerOptions {
    /// Socket read/write timeout, 0 for none.
    pub timeout_secs: u64,
    /// Requests served on one connection before it is closed.
    pub max_keepalive_requests: usize,
    pub compression: bool,
    /// Response codings in order of preference.
    pub permitted_compression: Vec<Compression>,
    pub server_name: String,
    /// Path prefix stripped before routing. Requests outside of it are not
    /// found.
    pub base_route: String,
    /// Added to every response.
    pub response_headers: BTreeMap<String, String>,
    /// Header carrying the handler time in microseconds.
    pub timer_header: Option<String>,
    pub json_pretty: bool,
    pub record_statistics: bool,
    /// 0 spawns a thread per connection, 1 serves inline, more uses a pool.
    pub threads: usize,
    /// Append every routed request to `record_file` as one JSON line.
    pub record_requests: bool,
    pub record_file: Option<PathBuf>,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            max_keepalive_requests: 100,
            compression: true,
            permitted_compression: vec![Compression::Gzip, Compression::Deflate],
            server_name: format!("resthttp/{}", VERSION),
            base_route: String::new(),
            response_headers: BTreeMap::new(),
            timer_header: None,
            json_pretty: false,
            record_statistics: true,
            threads: 1,
            record_requests: false,
            record_file: None,
        }
    }
}

impl ServerOptions {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
    pub fn timeout(&self) -> Option<Duration> {
        timeout(self.timeout_secs)
    }
    pub fn with_timeout_secs(mut self, seconds: u64) -> Self {
        self.timeout_secs = seconds;
        self
    }
    pub fn with_max_keepalive_requests(mut self, n: usize) -> Self {
        self.max_keepalive_requests = n;
        self
    }
    pub fn with_compression(mut self, compression: bool) -> Self {
        self.compression = compression;
        self
    }
    pub fn with_permitted_compression(mut self, permitted: &[Compression]) -> Self {
        self.permitted_compression = permitted.to_vec();
        self
    }
    pub fn with_server_name(mut self, name: &str) -> Self {
        self.server_name = name.to_string();
        self
    }
    pub fn with_base_route(mut self, base_route: &str) -> Self {
        self.base_route = base_route.trim_end_matches('/').to_string();
        self
    }
    pub fn with_response_header(mut self, name: &str, value: &str) -> Self {
        self.response_headers.insert(name.to_string(), value.to_string());
        self
    }
    pub fn with_timer_header(mut self, name: &str) -> Self {
        self.timer_header = Some(name.to_string());
        self
    }
    pub fn with_json_pretty(mut self, pretty: bool) -> Self {
        self.json_pretty = pretty;
        self
    }
    pub fn with_record_statistics(mut self, record: bool) -> Self {
        self.record_statistics = record;
        self
    }
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }
    /// Record requests into `file`.
    pub fn with_record_file(mut self, file: &Path) -> Self {
        self.record_file = Some(file.to_path_buf());
        self.record_requests = true;
        self
    }
    /// The file to record into, when recording is on.
    pub fn recording(&self) -> Option<&Path> {
        if self.record_requests {
            self.record_file.as_deref()
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientOptions {
    /// Connect/read/write timeout, 0 for none.
    pub timeout_secs: u64,
    /// Redirects followed before the last response is returned as is.
    pub max_redirects: usize,
    pub accept_cookies: bool,
    /// Ask for gzip compressed responses.
    pub request_compression: bool,
    pub keep_alive: bool,
    pub user_agent: String,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            max_redirects: 3,
            accept_cookies: false,
            request_compression: true,
            keep_alive: true,
            user_agent: format!("resthttp/{}", VERSION),
        }
    }
}

impl ClientOptions {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
    pub fn timeout(&self) -> Option<Duration> {
        timeout(self.timeout_secs)
    }
    pub fn with_timeout_secs(mut self, seconds: u64) -> Self {
        self.timeout_secs = seconds;
        self
    }
    pub fn with_max_redirects(mut self, n: usize) -> Self {
        self.max_redirects = n;
        self
    }
    pub fn with_accept_cookies(mut self, accept: bool) -> Self {
        self.accept_cookies = accept;
        self
    }
    pub fn with_request_compression(mut self, compression: bool) -> Self {
        self.request_compression = compression;
        self
    }
    pub fn with_keep_alive(mut self, keep_alive: bool) -> Self {
        self.keep_alive = keep_alive;
        self
    }
    pub fn with_user_agent(mut self, user_agent: &str) -> Self {
        self.user_agent = user_agent.to_string();
        self
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = ServerOptions::default();
        assert_eq!(options.timeout(), Some(Duration::from_secs(30)));
        assert_eq!(options.permitted_compression, vec![Compression::Gzip, Compression::Deflate]);
        let client = ClientOptions::default();
        assert_eq!(client.max_redirects, 3);
        assert!(!client.accept_cookies);
    }

    #[test]
    fn test_from_json() {
        let options = ServerOptions::from_json(
            r#"{"permitted_compression": ["deflate"], "timeout_secs": 0, "response_headers": {"X-Frame-Options": "DENY"}}"#,
        )
        .unwrap();
        assert_eq!(options.permitted_compression, vec![Compression::Deflate]);
        assert_eq!(options.timeout(), None);
        assert_eq!(options.response_headers.get("X-Frame-Options").map(|s| s.as_str()), Some("DENY"));
        assert!(ServerOptions::from_json(r#"{"permitted_compression": ["br"]}"#).is_err());

        let client = ClientOptions::from_json(r#"{"max_redirects": 10}"#).unwrap();
        assert_eq!(client.max_redirects, 10);
        assert!(client.keep_alive);
    }

    #[test]
    fn test_builders() {
        let options = ServerOptions::new().with_base_route("/api/").with_threads(4);
        assert_eq!(options.base_route, "/api");
        assert_eq!(options.threads, 4);
        assert_eq!(options.recording(), None);

        let options = options.with_record_file(Path::new("/tmp/requests.jsonl"));
        assert_eq!(options.recording(), Some(Path::new("/tmp/requests.jsonl")));
        let paused = ServerOptions::from_json(r#"{"record_file": "/tmp/r.jsonl"}"#).unwrap();
        assert_eq!(paused.recording(), None);
    }
}
