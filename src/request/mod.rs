//! HTTP request head and request parameters.
use crate::header::{Headers, HOST};
use crate::method::Method;
use crate::url::{Query, Url};

pub use parser::{ParseError, RequestLine, StatusLine};

pub mod parser;

/// An HTTP request head. The body stays on the wire until someone reads it.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub method: Method,
    pub target: String,
    pub path: String,
    pub query: Query,
    pub fragment: String,
    pub version: String,
    pub headers: Headers,
    pub params: Params,
}

impl Default for Request {
    fn default() -> Self {
        let mut headers = Headers::new();
        headers.add(HOST, "localhost");
        Self {
            method: Method::GET,
            target: "/".to_string(),
            path: "/".to_string(),
            query: Query::new(),
            fragment: "".to_string(),
            version: "HTTP/1.1".to_string(),
            headers,
            params: Params::new(),
        }
    }
}

impl Request {
    pub fn new(method: Method, target: &str) -> Self {
        Self::from_line(
            RequestLine {
                method,
                target: target.to_string(),
                version: "HTTP/1.1".to_string(),
            },
            Headers::new(),
        )
    }

    /// Build a request from its parsed start line and header block. Query
    /// parameters are copied into `params`.
    pub fn from_line(line: RequestLine, headers: Headers) -> Self {
        let resource = if line.target.contains("://") {
            Url::parse(&line.target).unwrap_or_else(|_| Url::resource(&line.target))
        } else {
            Url::resource(&line.target)
        };
        let mut params = Params::new();
        for (name, value) in resource.query.iter() {
            params.add(Param::Query(name.to_string()), Some(value.to_string()));
        }
        Self {
            method: line.method,
            target: line.target,
            path: if resource.path.is_empty() {
                "/".to_string()
            } else {
                resource.path
            },
            query: resource.query,
            fragment: resource.fragment,
            version: line.version,
            headers,
            params,
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.add(name, value);
        self
    }

    /// Whether the client wants the connection kept open after this request.
    pub fn keep_alive(&self) -> bool {
        if self.version == "HTTP/1.0" {
            self.headers.connection_keep_alive()
        } else {
            !self.headers.connection_close()
        }
    }

    pub fn is_websocket(&self) -> bool {
        self.headers.is_websocket_upgrade()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Param {
    Path(String),
    Query(String),
    Body(String),
}

impl Param {
    pub fn name(&self) -> &str {
        match self {
            Self::Path(s) | Self::Query(s) | Self::Body(s) => s,
        }
    }
}

/// Request parameters from the route path, the query string and form
/// bodies, in the order they were found. Path parameters may have no value
/// when the request path ended before their segment.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Params(Vec<(Param, Option<String>)>);

impl Params {
    pub fn new() -> Self {
        Params(vec![])
    }
    pub fn add(&mut self, p: Param, value: Option<String>) {
        self.0.push((p, value));
    }
    /// Get all values of one named param of a specific kind.
    pub fn get_all<'a, 'p>(&'a self, p: &'p Param) -> impl Iterator<Item = &'a str> + 'p
    where
        'a: 'p,
    {
        self.0
            .iter()
            .filter(move |(q, _)| q == p)
            .filter_map(|(_, v)| v.as_deref())
    }
    /// Get first value of one named param of a specific kind.
    pub fn get_first(&self, p: &Param) -> Option<&str> {
        self.get_all(p).next()
    }
    /// Whether the param was captured at all, even without value.
    pub fn contains(&self, p: &Param) -> bool {
        self.0.iter().any(|(q, _)| q == p)
    }
    /// Get named param from anywhere, first found from (in order): path, query, body.
    pub fn get_any(&self, name: &str) -> Option<&str> {
        let try_params = [
            Param::Path(name.to_string()),
            Param::Query(name.to_string()),
            Param::Body(name.to_string()),
        ];
        try_params.iter().find_map(|p| self.get_first(p))
    }
    pub fn iter(&self) -> impl Iterator<Item = (&Param, Option<&str>)> {
        self.0.iter().map(|(p, v)| (p, v.as_deref()))
    }
    pub fn len(&self) -> usize {
        self.0.len()
    }
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
