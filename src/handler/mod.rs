//! Base for all route handlers.
use std::fmt;
use std::io::{self, Read};

use serde_json::Value;

use crate::auth::{Authenticate, Authenticated};
use crate::error::HttpError;
use crate::request::Request;
use crate::response::Response;
use crate::router::{RequestPath, Route, Routes};

pub mod directory;

pub type HandlerResult = Result<(), HttpError>;

/// A Handler implements an HTTP endpoint: it reads the request from the
/// [`Context`] and fills in its response. Failures are reported as
/// [`HttpError`] and turned into error responses by the server.
pub trait Handler: Send + Sync {
    fn handle(&self, ctx: &mut Context<'_>) -> HandlerResult;

    /// Run `f` before the handler, answer 401 when it fails.
    fn authenticated<F>(self, f: F) -> Authenticated<F, Self>
    where
        F: Authenticate,
        Self: Sized,
    {
        Authenticated::new(f, self)
    }
}

impl<F> Handler for F
where
    F: Fn(&mut Context<'_>) -> HandlerResult + Send + Sync,
{
    fn handle(&self, ctx: &mut Context<'_>) -> HandlerResult {
        (self)(ctx)
    }
}

/// Per-request state handed to a route handler.
pub struct Context<'a> {
    /// The request, with path, query and form parameters merged into
    /// `request.params`.
    pub request: Request,
    pub response: Response,
    /// Raw request body for PLAIN and XML routes.
    pub body: Vec<u8>,
    /// Parsed request body for JSON routes, `Null` when the body was empty.
    pub json_in: Value,
    /// Serialized as the response body when the handler leaves the payload
    /// empty.
    pub json_out: Value,
    route: &'a Route,
    routes: &'a Routes,
    path: &'a RequestPath,
    input: &'a mut dyn Read,
}

impl<'a> fmt::Debug for Context<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("request", &self.request)
            .field("response", &self.response)
            .field("route", &self.route.pattern())
            .finish()
    }
}

impl<'a> Context<'a> {
    pub fn new(
        request: Request,
        route: &'a Route,
        routes: &'a Routes,
        path: &'a RequestPath,
        input: &'a mut dyn Read,
    ) -> Self {
        Self {
            request,
            response: Response::new(200),
            body: vec![],
            json_in: Value::Null,
            json_out: Value::Null,
            route,
            routes,
            path,
            input,
        }
    }

    /// The route that matched.
    pub fn route(&self) -> &'a Route {
        self.route
    }
    pub fn routes(&self) -> &'a Routes {
        self.routes
    }
    /// The normalized path the route was matched against.
    pub fn path(&self) -> &'a RequestPath {
        self.path
    }
    /// Parameter from the path, the query or a form body, in that order.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.request.params.get_any(name)
    }
    /// Unread request body, for NOREAD routes.
    pub fn input(&mut self) -> &mut dyn Read {
        &mut *self.input
    }
    /// Read the remaining request body.
    pub fn read_input(&mut self) -> io::Result<Vec<u8>> {
        let mut out = vec![];
        self.input.read_to_end(&mut out)?;
        Ok(out)
    }
    pub fn set_json(&mut self, value: Value) {
        self.json_out = value;
    }
    /// Whether the request path would match a registered route with another
    /// method.
    pub fn other_method_matches(&self) -> bool {
        self.routes.matches_other_method(self.path)
    }
    /// The request as the handler left it, the response and the JSON
    /// output value.
    pub fn into_parts(self) -> (Request, Response, Value) {
        (self.request, self.response, self.json_out)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::method::Method;
    use crate::request::Param;

    fn hello(ctx: &mut Context<'_>) -> HandlerResult {
        let name = ctx.param("name").unwrap_or("world").to_string();
        ctx.response.set_text("text/plain", &format!("Hello {}!", name));
        Ok(())
    }

    #[test]
    fn test_fn_handler() {
        let routes = Routes::new();
        let route = Route::new(Some(Method::GET), "/hello/:name", hello);
        let path = RequestPath::new(Method::GET, "/hello/bob");
        let mut request = Request::new(Method::GET, "/hello/bob");
        request.params.add(Param::Path("name".into()), Some("bob".into()));
        let mut input = io::empty();
        let mut ctx = Context::new(request, &route, &routes, &path, &mut input);
        route.handler().unwrap().handle(&mut ctx).unwrap();
        let (request, response, json) = ctx.into_parts();
        assert_eq!(request.path, "/hello/bob");
        assert_eq!(response.body(), Some(&b"Hello bob!"[..]));
        assert_eq!(json, Value::Null);
    }

    #[test]
    fn test_closure_reads_input() {
        let handler = |ctx: &mut Context<'_>| -> HandlerResult {
            let input = ctx.read_input()?;
            ctx.set_json(serde_json::json!({ "length": input.len() }));
            Ok(())
        };
        let routes = Routes::new();
        let route = Route::new(Some(Method::POST), "/upload", handler);
        let path = RequestPath::new(Method::POST, "/upload");
        let mut input = &b"12345"[..];
        let mut ctx = Context::new(
            Request::new(Method::POST, "/upload"),
            &route,
            &routes,
            &path,
            &mut input,
        );
        route.handler().unwrap().handle(&mut ctx).unwrap();
        assert_eq!(ctx.json_out["length"], 5);
    }
}
