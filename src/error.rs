//! Errors raised by route handlers and turned into responses by the server.
use std::fmt;
use std::io;

/// A typed HTTP error. Handlers and the router return it; the server
/// session converts it into an error response.
#[derive(Debug, Clone, PartialEq)]
pub enum HttpError {
    BadRequest(String),
    Unauthorized(String),
    NotFound(String),
    MethodNotAllowed(String),
    Internal(String),
    /// Any other status code.
    Status(u16, String),
}

impl HttpError {
    pub fn bad_request(message: &str) -> Self {
        Self::BadRequest(message.to_string())
    }
    pub fn not_found(message: &str) -> Self {
        Self::NotFound(message.to_string())
    }
    pub fn internal(message: &str) -> Self {
        Self::Internal(message.to_string())
    }

    pub fn status_code(&self) -> u16 {
        match self {
            Self::BadRequest(_) => 400,
            Self::Unauthorized(_) => 401,
            Self::NotFound(_) => 404,
            Self::MethodNotAllowed(_) => 405,
            Self::Internal(_) => 500,
            Self::Status(code, _) => *code,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::BadRequest(m)
            | Self::Unauthorized(m)
            | Self::NotFound(m)
            | Self::MethodNotAllowed(m)
            | Self::Internal(m)
            | Self::Status(_, m) => m,
        }
    }
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.status_code(), self.message())
    }
}

impl std::error::Error for HttpError {}

impl From<serde_json::Error> for HttpError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_io() {
            Self::Internal(err.to_string())
        } else {
            Self::BadRequest(format!("invalid JSON: {}", err))
        }
    }
}

impl From<io::Error> for HttpError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => Self::NotFound(err.to_string()),
            io::ErrorKind::PermissionDenied => Self::Status(403, err.to_string()),
            io::ErrorKind::InvalidData | io::ErrorKind::InvalidInput => {
                Self::BadRequest(err.to_string())
            }
            _ => Self::Internal(err.to_string()),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(HttpError::not_found("x").status_code(), 404);
        assert_eq!(HttpError::MethodNotAllowed("x".into()).status_code(), 405);
        assert_eq!(HttpError::Status(418, "teapot".into()).to_string(), "418 teapot");
    }

    #[test]
    fn test_conversions() {
        let err: HttpError = serde_json::from_str::<serde_json::Value>("{oops")
            .unwrap_err()
            .into();
        assert_eq!(err.status_code(), 400);
        let err: HttpError = io::Error::new(io::ErrorKind::NotFound, "gone").into();
        assert_eq!(err.status_code(), 404);
        let err: HttpError = io::Error::new(io::ErrorKind::Other, "disk").into();
        assert_eq!(err.status_code(), 500);
    }
}
