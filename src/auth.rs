//! Request authentication hooks.
use std::fmt;

use crate::error::HttpError;
use crate::handler::{Context, Handler, HandlerResult};
use crate::request::Request;

#[derive(Debug, Clone, PartialEq)]
pub struct AuthError {
    reason: String,
}

impl AuthError {
    pub fn new(reason: &str) -> Self {
        Self {
            reason: reason.to_string(),
        }
    }
    pub fn reason(&self) -> &str {
        &self.reason
    }
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "authentication failed: {}", self.reason)
    }
}

impl From<AuthError> for HttpError {
    fn from(err: AuthError) -> Self {
        HttpError::Unauthorized(err.to_string())
    }
}

/// Checks a request before its handler runs. Used for routes carrying the
/// `GENERIC_AUTH` option and by [`Handler::authenticated`].
pub trait Authenticate: Send + Sync {
    fn authenticate(&self, request: &Request) -> Result<(), AuthError>;
}

impl<F> Authenticate for F
where
    F: Fn(&Request) -> Result<(), AuthError> + Send + Sync,
{
    fn authenticate(&self, request: &Request) -> Result<(), AuthError> {
        (self)(request)
    }
}

pub struct Authenticated<F, H> {
    handler: H,
    fauth: F,
}

impl<F, H> Authenticated<F, H> {
    pub fn new(fauth: F, handler: H) -> Self {
        Self { handler, fauth }
    }
}

impl<F, H> Handler for Authenticated<F, H>
where
    F: Authenticate,
    H: Handler,
{
    fn handle(&self, ctx: &mut Context<'_>) -> HandlerResult {
        self.fauth.authenticate(&ctx.request)?;
        self.handler.handle(ctx)
    }
}

/// Accept requests carrying `Authorization: Bearer <token>` for one fixed
/// token.
pub fn bearer_token(token: &str) -> impl Fn(&Request) -> Result<(), AuthError> + Send + Sync {
    let expected = format!("Bearer {}", token);
    move |request: &Request| match request.headers.get("Authorization") {
        Some(value) if value.trim() == expected => Ok(()),
        Some(_) => Err(AuthError::new("invalid token")),
        None => Err(AuthError::new("missing Authorization header")),
    }
}
