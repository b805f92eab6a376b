//! HTTP request methods.
use std::fmt;
use std::str::FromStr;

/// An HTTP request method. Any method name we do not know parses to
/// `INVALID` instead of failing, so the request can still be answered.
#[allow(clippy::upper_case_acronyms)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    GET,
    HEAD,
    POST,
    PUT,
    DELETE,
    OPTIONS,
    PATCH,
    CONNECT,
    TRACE,
    INVALID,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GET => "GET",
            Self::HEAD => "HEAD",
            Self::POST => "POST",
            Self::PUT => "PUT",
            Self::DELETE => "DELETE",
            Self::OPTIONS => "OPTIONS",
            Self::PATCH => "PATCH",
            Self::CONNECT => "CONNECT",
            Self::TRACE => "TRACE",
            Self::INVALID => "INVALID",
        }
    }

    /// Whether a request with this method may carry a body.
    pub fn has_body(&self) -> bool {
        !matches!(
            self,
            Self::HEAD | Self::OPTIONS | Self::CONNECT | Self::TRACE | Self::INVALID
        )
    }

    pub fn is_valid(&self) -> bool {
        *self != Self::INVALID
    }
}

impl FromStr for Method {
    type Err = std::convert::Infallible;
    fn from_str(s: &str) -> Result<Method, Self::Err> {
        Ok(match s {
            "GET" => Method::GET,
            "HEAD" => Method::HEAD,
            "POST" => Method::POST,
            "PUT" => Method::PUT,
            "DELETE" => Method::DELETE,
            "OPTIONS" => Method::OPTIONS,
            "PATCH" => Method::PATCH,
            "CONNECT" => Method::CONNECT,
            "TRACE" => Method::TRACE,
            _ => Method::INVALID,
        })
    }
}

impl From<&str> for Method {
    fn from(s: &str) -> Self {
        match s.parse() {
            Ok(method) => method,
            Err(never) => match never {},
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Default for Method {
    fn default() -> Self {
        Method::GET
    }
}
