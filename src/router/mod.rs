//! Method and path based request routing.
//!
//! # Route patterns
//! * `/foo`: matches exactly /foo
//! * `/foo/*/bar`: matches /foo/anything/bar
//! * `/foo/*`: matches /foo and everything below it (only at end of route)
//! * `/foo/:name` or `/foo/=name`: matches /foo/bar, captures name="bar";
//!   a trailing parameter may also be missing (/foo captures name without
//!   a value)
//!
//! Routes are tried in registration order and the first match wins, so
//! register specific patterns before general ones.
use std::cell::OnceCell;
use std::fmt;
use std::ops::BitOr;
use std::path::{Path, PathBuf};

use log::{debug, trace};
use serde_json::Value;

use crate::auth::Authenticate;
use crate::error::HttpError;
use crate::handler::directory::DirectoryHandler;
use crate::handler::{Context, Handler, HandlerResult};
use crate::method::Method;

pub mod rewrite;
pub mod stats;

pub use rewrite::{Rewrite, Rewrites};
pub use stats::{RouteStatistics, Statistics};

/// Path parameters captured by a match, in pattern order.
pub type Captures = Vec<(String, Option<String>)>;

/// How the server pre-reads the request body for a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParserType {
    /// Raw bytes in [`Context::body`].
    Plain,
    /// Parsed into [`Context::json_in`].
    Json,
    /// Raw bytes in [`Context::body`].
    Xml,
    /// Decoded into the request parameters.
    WwwForm,
    /// Left on the wire for the handler.
    NoRead,
}

impl Default for ParserType {
    fn default() -> Self {
        Self::Json
    }
}

impl ParserType {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_uppercase().as_str() {
            "PLAIN" => Some(Self::Plain),
            "JSON" => Some(Self::Json),
            "XML" => Some(Self::Xml),
            "WWWFORM" | "WWW-FORM" => Some(Self::WwwForm),
            "NOREAD" => Some(Self::NoRead),
            _ => None,
        }
    }
    /// Parser named by the `parser` (or `Parser`) key of a route config.
    pub fn from_config(config: &Value) -> Option<Self> {
        config
            .get("parser")
            .or_else(|| config.get("Parser"))
            .and_then(Value::as_str)
            .and_then(Self::from_name)
    }
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Plain => "PLAIN",
            Self::Json => "JSON",
            Self::Xml => "XML",
            Self::WwwForm => "WWWFORM",
            Self::NoRead => "NOREAD",
        }
    }
}

/// Route option bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct RouteOptions(u16);

impl RouteOptions {
    pub const NONE: Self = Self(0);
    /// Run the authenticator set with [`Routes::set_authenticator`].
    pub const GENERIC_AUTH: Self = Self(1);
    /// Only match `Upgrade: websocket` requests.
    pub const WEBSOCKET: Self = Self(1 << 1);

    pub fn contains(self, other: Self) -> bool {
        other.0 != 0 && self.0 & other.0 == other.0
    }
    pub fn bits(self) -> u16 {
        self.0
    }
}

impl BitOr for RouteOptions {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Strip a trailing `/` (except for the root) and make sure the path
/// starts with one.
pub fn normalize(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    }
}

fn split(path: &str) -> Vec<String> {
    path.split('/')
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

/// A request as seen by the router: method and normalized path. The path
/// is only split into segments if a route needs them.
#[derive(Debug, Clone)]
pub struct RequestPath {
    pub method: Method,
    pub route: String,
    pub websocket: bool,
    segments: OnceCell<Vec<String>>,
}

impl RequestPath {
    pub fn new(method: Method, path: &str) -> Self {
        Self {
            method,
            route: normalize(path),
            websocket: false,
            segments: OnceCell::new(),
        }
    }
    pub fn with_websocket(mut self, websocket: bool) -> Self {
        self.websocket = websocket;
        self
    }
    pub fn segments(&self) -> &[String] {
        self.segments.get_or_init(|| split(&self.route))
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Literal(String),
    Param(String),
    Any,
}

impl Segment {
    fn parse(s: &str) -> Self {
        if s == "*" {
            Self::Any
        } else if s.len() > 1 && (s.starts_with(':') || s.starts_with('=')) {
            Self::Param(s[1..].to_string())
        } else {
            Self::Literal(s.to_string())
        }
    }
}

/// A (method, pattern) → handler binding.
pub struct Route {
    method: Option<Method>,
    pattern: String,
    /// Pattern without a trailing `/*`; what the fast path compares.
    prefix: String,
    segments: Vec<Segment>,
    has_parameters: bool,
    wildcard_at_end: bool,
    wildcard_fragment: bool,
    document_root: Option<PathBuf>,
    callback: Option<Box<dyn Handler>>,
    parser: ParserType,
    options: RouteOptions,
    config: Value,
    stats: Statistics,
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("method", &self.method)
            .field("pattern", &self.pattern)
            .field("parser", &self.parser)
            .field("options", &self.options)
            .field("document_root", &self.document_root)
            .finish()
    }
}

impl Route {
    fn build(method: Option<Method>, pattern: &str, callback: Option<Box<dyn Handler>>) -> Self {
        let pattern = normalize(pattern);
        let segments: Vec<Segment> = split(&pattern).iter().map(|s| Segment::parse(s)).collect();
        let has_parameters = segments.iter().any(|s| matches!(s, Segment::Param(_)));
        let mut wildcard_at_end = false;
        let mut wildcard_fragment = false;
        let mut prefix = pattern.clone();
        if let Some(pos) = segments.iter().position(|s| *s == Segment::Any) {
            if pos + 1 == segments.len() {
                wildcard_at_end = true;
                prefix.truncate(prefix.len() - 2);
            } else {
                wildcard_fragment = true;
            }
        }
        Self {
            method,
            pattern,
            prefix,
            segments,
            has_parameters,
            wildcard_at_end,
            wildcard_fragment,
            document_root: None,
            callback,
            parser: ParserType::default(),
            options: RouteOptions::NONE,
            config: Value::Null,
            stats: Statistics::new(),
        }
    }

    /// New route for `method` (`None` matches any method).
    pub fn new<H>(method: Option<Method>, pattern: &str, handler: H) -> Self
    where
        H: Handler + 'static,
    {
        Self::build(method, pattern, Some(Box::new(handler)))
    }

    /// New route serving files from `document_root`.
    pub fn web_server(method: Option<Method>, pattern: &str, document_root: &Path) -> Self {
        Self::build(method, pattern, None).with_document_root(document_root)
    }

    /// Set the document root. A route without a handler serves static
    /// files from it.
    pub fn with_document_root(mut self, document_root: &Path) -> Self {
        self.document_root = Some(document_root.to_path_buf());
        if self.callback.is_none() {
            self.callback = Some(Box::new(DirectoryHandler::from_document_root(document_root)));
        }
        self
    }
    pub fn with_parser(mut self, parser: ParserType) -> Self {
        self.parser = parser;
        self
    }
    pub fn with_options(mut self, options: RouteOptions) -> Self {
        self.options = self.options | options;
        self
    }
    /// Attach a config document. A `parser` key selects the parser type,
    /// everything else is left for the handler.
    pub fn with_config(mut self, config: Value) -> Self {
        if let Some(parser) = ParserType::from_config(&config) {
            self.parser = parser;
        }
        self.config = config;
        self
    }

    pub fn method(&self) -> Option<Method> {
        self.method
    }
    pub fn method_str(&self) -> &'static str {
        self.method.map_or("", |m| m.as_str())
    }
    pub fn pattern(&self) -> &str {
        &self.pattern
    }
    /// Literal part of a pattern ending in `/*`, or the whole pattern.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }
    pub fn parser(&self) -> ParserType {
        self.parser
    }
    pub fn options(&self) -> RouteOptions {
        self.options
    }
    pub fn config(&self) -> &Value {
        &self.config
    }
    pub fn document_root(&self) -> Option<&Path> {
        self.document_root.as_deref()
    }
    pub fn handler(&self) -> Option<&dyn Handler> {
        self.callback.as_deref()
    }
    pub fn statistics(&self) -> &Statistics {
        &self.stats
    }
    pub fn has_parameters(&self) -> bool {
        self.has_parameters
    }
    pub fn has_wildcard_at_end(&self) -> bool {
        self.wildcard_at_end
    }
    pub fn has_wildcard_fragment(&self) -> bool {
        self.wildcard_fragment
    }

    fn method_matches(&self, method: Method) -> bool {
        match self.method {
            None => true,
            Some(m) => m == method || (m == Method::GET && method == Method::HEAD),
        }
    }

    /// Match `path` against this route. Captured parameters replace the
    /// content of `captures`. Method and websocket checks are skipped
    /// without `compare_methods`.
    pub fn matches(&self, path: &RequestPath, captures: &mut Captures, compare_methods: bool) -> bool {
        if compare_methods {
            if !self.method_matches(path.method) {
                return false;
            }
            if self.options.contains(RouteOptions::WEBSOCKET) != path.websocket {
                return false;
            }
        }

        if !self.has_parameters && !self.wildcard_fragment {
            if self.wildcard_at_end {
                let candidate = &path.route;
                return candidate.starts_with(&self.prefix)
                    && (candidate.len() == self.prefix.len()
                        || candidate.as_bytes()[self.prefix.len()] == b'/');
            }
            return path.route == self.prefix;
        }

        let candidate = path.segments();
        if self.segments.len() < candidate.len() {
            return false;
        }
        captures.clear();
        for (i, segment) in self.segments.iter().enumerate() {
            let matched = match (segment, candidate.get(i)) {
                (Segment::Param(name), value) => {
                    captures.push((name.clone(), value.cloned()));
                    true
                }
                (_, None) => false,
                (Segment::Any, Some(_)) => true,
                (Segment::Literal(literal), Some(value)) => literal == value,
            };
            if !matched {
                captures.clear();
                return false;
            }
        }
        true
    }

    fn export_statistics(&self) -> RouteStatistics {
        RouteStatistics {
            method: self.method_str().to_string(),
            route: self.pattern.clone(),
            stats: self.stats.snapshot(),
        }
    }
}

/// The routing table: routes in priority order, an optional default route,
/// and the rewrite and redirect rules applied before lookup.
pub struct Routes {
    routes: Vec<Route>,
    default_route: Route,
    rewrites: Rewrites,
    redirects: Rewrites,
    authenticator: Option<Box<dyn Authenticate>>,
}

impl fmt::Debug for Routes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Routes")
            .field("routes", &self.routes)
            .field("default_route", &self.default_route)
            .field("rewrites", &self.rewrites)
            .field("redirects", &self.redirects)
            .finish()
    }
}

impl Default for Routes {
    fn default() -> Self {
        Self::new()
    }
}

impl Routes {
    pub fn new() -> Self {
        Self {
            routes: vec![],
            default_route: Route::build(None, "/", None),
            rewrites: Rewrites::new(),
            redirects: Rewrites::new(),
            authenticator: None,
        }
    }

    pub fn add_route(&mut self, route: Route) {
        debug!("adding route {} {}", route.method_str(), route.pattern());
        self.routes.push(route);
    }
    pub fn with_route(mut self, route: Route) -> Self {
        self.add_route(route);
        self
    }
    /// Start registering handlers for one pattern.
    ///
    /// # Example
    /// ```
    /// use resthttp::handler::{Context, HandlerResult};
    /// use resthttp::router::Routes;
    ///
    /// fn get_user(ctx: &mut Context<'_>) -> HandlerResult {
    ///     let id = ctx.param("id").unwrap_or("").to_string();
    ///     ctx.set_json(serde_json::json!({ "id": id }));
    ///     Ok(())
    /// }
    ///
    /// let mut routes = Routes::new();
    /// routes.route("/user/:id").get(get_user);
    /// routes.route("/user").post(|ctx| {
    ///     ctx.response.set_status(201);
    ///     Ok(())
    /// });
    /// # assert_eq!(routes.len(), 2);
    /// ```
    pub fn route(&mut self, pattern: &str) -> RouteBuilder<'_> {
        RouteBuilder {
            routes: self,
            pattern: pattern.to_string(),
            parser: None,
            options: RouteOptions::NONE,
            config: Value::Null,
        }
    }
    /// Serve files from `document_root` under `pattern`, for any method.
    pub fn add_web_server(&mut self, document_root: &Path, pattern: &str, config: Value) {
        let pattern = normalize(pattern);
        let pattern = if pattern.ends_with("/*") {
            pattern
        } else if pattern == "/" {
            "/*".to_string()
        } else {
            format!("{}/*", pattern)
        };
        let route = Route::web_server(None, &pattern, document_root)
            .with_parser(ParserType::NoRead)
            .with_config(config);
        self.add_route(route);
    }

    /// Handler for requests no route matches.
    pub fn set_default_route<H>(&mut self, handler: H, parser: ParserType)
    where
        H: Handler + 'static,
    {
        self.default_route.callback = Some(Box::new(handler));
        self.default_route.parser = parser;
    }
    pub fn with_default_route<H>(mut self, handler: H, parser: ParserType) -> Self
    where
        H: Handler + 'static,
    {
        self.set_default_route(handler, parser);
        self
    }
    /// Serve unmatched requests as static files from `document_root`.
    pub fn set_default_web_server(&mut self, document_root: &Path, config: Value) {
        self.default_route = Route::build(None, "/", None)
            .with_parser(ParserType::NoRead)
            .with_document_root(document_root)
            .with_config(config);
    }
    pub fn default_route(&self) -> &Route {
        &self.default_route
    }
    pub fn has_default_route(&self) -> bool {
        self.default_route.callback.is_some()
    }

    /// Check requests on routes with the `GENERIC_AUTH` option.
    pub fn set_authenticator<A>(&mut self, authenticator: A)
    where
        A: Authenticate + 'static,
    {
        self.authenticator = Some(Box::new(authenticator));
    }
    pub fn authenticator(&self) -> Option<&dyn Authenticate> {
        self.authenticator.as_deref()
    }

    pub fn add_rewrite(&mut self, pattern: &str, replacement: &str) -> Result<(), regex::Error> {
        self.rewrites.add(pattern, replacement)
    }
    /// Requests whose path matches `pattern` are answered with a 301 to the
    /// rewritten path.
    pub fn add_redirect(&mut self, pattern: &str, replacement: &str) -> Result<(), regex::Error> {
        self.redirects.add(pattern, replacement)
    }
    /// Apply the rewrite rules to `path`, returns how many matched.
    pub fn rewrite(&self, path: &mut String) -> usize {
        self.rewrites.apply(path)
    }
    /// Redirect target for `path`, if a redirect rule matches.
    pub fn redirect(&self, path: &str) -> Option<String> {
        let mut target = path.to_string();
        if self.redirects.apply(&mut target) > 0 {
            Some(target)
        } else {
            None
        }
    }
    pub fn rewrites(&self) -> &Rewrites {
        &self.rewrites
    }
    pub fn redirects(&self) -> &Rewrites {
        &self.redirects
    }

    /// Find the route for `path`. Falls back to the default route; without
    /// one, `check_wrong_method` tells a path served under another method
    /// (MethodNotAllowed) from an unknown path (NotFound).
    pub fn find_route(&self, path: &RequestPath, check_wrong_method: bool) -> Result<(&Route, Captures), HttpError> {
        debug!("looking up: {} {}", path.method, path.route);
        let mut captures = vec![];
        for route in &self.routes {
            trace!("evaluating: {} {}", route.method_str(), route.pattern());
            if route.matches(path, &mut captures, true) {
                debug!("     found: {} {}", route.method_str(), route.pattern());
                return Ok((route, captures));
            }
        }

        if self.has_default_route() {
            debug!("not found, returning default route");
            return Ok((&self.default_route, vec![]));
        }

        if check_wrong_method && self.matches_other_method(path) {
            debug!("request method {} not supported for path: {}", path.method, path.route);
            return Err(HttpError::MethodNotAllowed(format!(
                "request method {} not supported for path: {}",
                path.method, path.route
            )));
        }

        debug!("invalid path: {} {}", path.method, path.route);
        Err(HttpError::NotFound(format!(
            "invalid path: {} {}",
            path.method, path.route
        )))
    }

    /// Whether a route bound to a specific method (other than OPTIONS) would
    /// match `path` if methods were ignored.
    pub fn matches_other_method(&self, path: &RequestPath) -> bool {
        let mut captures = vec![];
        self.routes
            .iter()
            .filter(|r| r.method.is_some() && r.method != Some(Method::OPTIONS))
            .any(|r| r.matches(path, &mut captures, false))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Route> {
        self.routes.iter()
    }
    pub fn len(&self) -> usize {
        self.routes.len()
    }
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
    /// Drop all routes and the default handler.
    pub fn clear(&mut self) {
        self.routes.clear();
        self.default_route = Route::build(None, "/", None);
    }

    /// Per-route statistics, the default route last, as a JSON array.
    pub fn statistics(&self) -> Value {
        let exported: Vec<RouteStatistics> = self
            .routes
            .iter()
            .chain(std::iter::once(&self.default_route))
            .map(Route::export_statistics)
            .collect();
        serde_json::to_value(exported).unwrap_or(Value::Null)
    }
}

/// Registers handlers for one pattern, see [`Routes::route`].
pub struct RouteBuilder<'r> {
    routes: &'r mut Routes,
    pattern: String,
    parser: Option<ParserType>,
    options: RouteOptions,
    config: Value,
}

impl<'r> RouteBuilder<'r> {
    pub fn with_parser(mut self, parser: ParserType) -> Self {
        self.parser = Some(parser);
        self
    }
    pub fn with_options(mut self, options: RouteOptions) -> Self {
        self.options = self.options | options;
        self
    }
    pub fn with_config(mut self, config: Value) -> Self {
        self.config = config;
        self
    }

    /// Register `handler` for `method` (`None` for any method).
    pub fn handler<H>(self, method: Option<Method>, handler: H) -> Self
    where
        H: Handler + 'static,
    {
        let mut route = Route::new(method, &self.pattern, handler)
            .with_options(self.options)
            .with_config(self.config.clone());
        if let Some(parser) = self.parser {
            route = route.with_parser(parser);
        }
        self.routes.add_route(route);
        self
    }

    pub fn get<F>(self, f: F) -> Self
    where
        F: Fn(&mut Context<'_>) -> HandlerResult + Send + Sync + 'static,
    {
        self.handler(Some(Method::GET), f)
    }
    pub fn post<F>(self, f: F) -> Self
    where
        F: Fn(&mut Context<'_>) -> HandlerResult + Send + Sync + 'static,
    {
        self.handler(Some(Method::POST), f)
    }
    pub fn put<F>(self, f: F) -> Self
    where
        F: Fn(&mut Context<'_>) -> HandlerResult + Send + Sync + 'static,
    {
        self.handler(Some(Method::PUT), f)
    }
    pub fn patch<F>(self, f: F) -> Self
    where
        F: Fn(&mut Context<'_>) -> HandlerResult + Send + Sync + 'static,
    {
        self.handler(Some(Method::PATCH), f)
    }
    pub fn delete<F>(self, f: F) -> Self
    where
        F: Fn(&mut Context<'_>) -> HandlerResult + Send + Sync + 'static,
    {
        self.handler(Some(Method::DELETE), f)
    }
    pub fn options<F>(self, f: F) -> Self
    where
        F: Fn(&mut Context<'_>) -> HandlerResult + Send + Sync + 'static,
    {
        self.handler(Some(Method::OPTIONS), f)
    }
    pub fn any<F>(self, f: F) -> Self
    where
        F: Fn(&mut Context<'_>) -> HandlerResult + Send + Sync + 'static,
    {
        self.handler(None, f)
    }
    /// Register a GET route that only matches websocket upgrade requests.
    pub fn websocket<F>(self, f: F) -> Self
    where
        F: Fn(&mut Context<'_>) -> HandlerResult + Send + Sync + 'static,
    {
        self.with_options(RouteOptions::WEBSOCKET)
            .handler(Some(Method::GET), f)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn noop(_ctx: &mut Context<'_>) -> HandlerResult {
        Ok(())
    }

    fn find<'a>(routes: &'a Routes, method: Method, path: &str) -> Result<(&'a Route, Captures), HttpError> {
        routes.find_route(&RequestPath::new(method, path), true)
    }

    fn capture(name: &str, value: &str) -> (String, Option<String>) {
        (name.to_string(), Some(value.to_string()))
    }

    #[test]
    fn test_compiled_flags() {
        let route = Route::new(None, "/static/*", noop);
        assert!(route.has_wildcard_at_end());
        assert!(!route.has_wildcard_fragment());
        assert_eq!(route.prefix(), "/static");
        let route = Route::new(None, "/a/*/b/", noop);
        assert!(route.has_wildcard_fragment());
        assert_eq!(route.pattern(), "/a/*/b");
        let route = Route::new(None, "/user/=id", noop);
        assert!(route.has_parameters());
    }

    #[test]
    fn test_registration_order_wins() {
        let routes = Routes::new()
            .with_route(Route::new(Some(Method::GET), "/a/:id", noop))
            .with_route(Route::new(Some(Method::GET), "/a/fixed", noop));
        let (route, captures) = find(&routes, Method::GET, "/a/fixed").unwrap();
        assert_eq!(route.pattern(), "/a/:id");
        assert_eq!(captures, vec![capture("id", "fixed")]);

        let routes = Routes::new()
            .with_route(Route::new(Some(Method::GET), "/a/fixed", noop))
            .with_route(Route::new(Some(Method::GET), "/a/:id", noop));
        let (route, captures) = find(&routes, Method::GET, "/a/fixed").unwrap();
        assert_eq!(route.pattern(), "/a/fixed");
        assert!(captures.is_empty());
    }

    #[test]
    fn test_wildcard_at_end() {
        let routes = Routes::new().with_route(Route::new(None, "/static/*", noop));
        assert!(find(&routes, Method::GET, "/static/x/y.png").is_ok());
        assert!(find(&routes, Method::GET, "/static").is_ok());
        assert!(find(&routes, Method::GET, "/static/").is_ok());
        assert_eq!(find(&routes, Method::GET, "/staticfoo").unwrap_err().status_code(), 404);
    }

    #[test]
    fn test_wildcard_fragment() {
        let routes = Routes::new().with_route(Route::new(None, "/a/*/c", noop));
        assert!(find(&routes, Method::GET, "/a/b/c").is_ok());
        assert!(find(&routes, Method::GET, "/a/b/d").is_err());
        assert!(find(&routes, Method::GET, "/a/b/c/d").is_err());
    }

    #[test]
    fn test_head_matches_get() {
        let routes = Routes::new().with_route(Route::new(Some(Method::GET), "/page", noop));
        assert!(find(&routes, Method::HEAD, "/page").is_ok());
        assert!(find(&routes, Method::GET, "/page/").is_ok());
    }

    #[test]
    fn test_method_not_allowed_vs_not_found() {
        let mut routes = Routes::new();
        routes.route("/user/:id").get(noop);
        routes.route("/user").post(noop);
        routes.route("/cors").options(noop);

        let (_, captures) = find(&routes, Method::GET, "/user/42").unwrap();
        assert_eq!(captures, vec![capture("id", "42")]);
        assert_eq!(find(&routes, Method::DELETE, "/user/42").unwrap_err().status_code(), 405);
        assert_eq!(find(&routes, Method::GET, "/nope").unwrap_err().status_code(), 404);
        // OPTIONS-only routes do not turn a miss into 405
        assert_eq!(find(&routes, Method::GET, "/cors").unwrap_err().status_code(), 404);
        let path = RequestPath::new(Method::DELETE, "/user/42");
        assert_eq!(routes.find_route(&path, false).unwrap_err().status_code(), 404);
    }

    #[test]
    fn test_default_route_comes_before_wrong_method() {
        let mut routes = Routes::new().with_default_route(noop, ParserType::Plain);
        routes.route("/user").post(noop);
        let (route, captures) = find(&routes, Method::GET, "/user").unwrap();
        assert_eq!(route.parser(), ParserType::Plain);
        assert_eq!(route.pattern(), "/");
        assert!(captures.is_empty());
    }

    #[test]
    fn test_equals_params_and_missing_trailing_params() {
        let routes = Routes::new().with_route(Route::new(None, "/file/=name/:version", noop));
        let (_, captures) = find(&routes, Method::GET, "/file/a.txt/3").unwrap();
        assert_eq!(captures, vec![capture("name", "a.txt"), capture("version", "3")]);

        let (_, captures) = find(&routes, Method::GET, "/file/a.txt").unwrap();
        assert_eq!(
            captures,
            vec![capture("name", "a.txt"), ("version".to_string(), None)]
        );

        let (_, captures) = find(&routes, Method::GET, "/file").unwrap();
        assert_eq!(captures.len(), 2);
        assert!(captures.iter().all(|(_, v)| v.is_none()));

        let routes = Routes::new().with_route(Route::new(None, "/a/:id/edit", noop));
        assert!(find(&routes, Method::GET, "/a/1").is_err());
    }

    #[test]
    fn test_websocket_routes() {
        let mut routes = Routes::new();
        routes.route("/ws").websocket(noop);
        routes.route("/ws").get(noop);
        let upgrade = RequestPath::new(Method::GET, "/ws").with_websocket(true);
        let (route, _) = routes.find_route(&upgrade, true).unwrap();
        assert!(route.options().contains(RouteOptions::WEBSOCKET));
        let (route, _) = find(&routes, Method::GET, "/ws").unwrap();
        assert!(!route.options().contains(RouteOptions::WEBSOCKET));
    }

    #[test]
    fn test_parser_from_config() {
        let mut routes = Routes::new();
        routes
            .route("/form")
            .with_config(serde_json::json!({ "Parser": "wwwform", "other": 1 }))
            .post(noop);
        let route = routes.iter().next().unwrap();
        assert_eq!(route.parser(), ParserType::WwwForm);
        assert_eq!(route.config()["other"], 1);
        assert_eq!(ParserType::from_name("NoRead"), Some(ParserType::NoRead));
        assert_eq!(ParserType::from_name("yaml"), None);
    }

    #[test]
    fn test_rewrite_and_redirect() {
        let mut routes = Routes::new();
        routes.add_rewrite("^/v1/(.*)$", "/api/$1").unwrap();
        routes.add_redirect("^/old$", "/new").unwrap();
        let mut path = "/v1/users".to_string();
        assert_eq!(routes.rewrite(&mut path), 1);
        assert_eq!(path, "/api/users");
        assert_eq!(routes.redirect("/old"), Some("/new".to_string()));
        assert_eq!(routes.redirect("/older"), None);
        assert_eq!(routes.redirects().iter().next().unwrap().matched(), 1);
    }

    #[test]
    fn test_web_server_route() {
        let mut routes = Routes::new();
        routes.add_web_server(Path::new("/srv/www"), "/docs", Value::Null);
        let route = routes.iter().next().unwrap();
        assert_eq!(route.pattern(), "/docs/*");
        assert_eq!(route.document_root(), Some(Path::new("/srv/www")));
        assert!(route.handler().is_some());
        assert!(find(&routes, Method::GET, "/docs/index.html").is_ok());
    }

    #[test]
    fn test_statistics_export() {
        let mut routes = Routes::new();
        routes.route("/user/:id").get(noop);
        let (route, _) = find(&routes, Method::GET, "/user/1").unwrap();
        route.statistics().record(100, 2000);
        let stats = routes.statistics();
        let list = stats.as_array().unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0]["method"], "GET");
        assert_eq!(list[0]["route"], "/user/:id");
        assert_eq!(list[0]["requests"], 1);
        assert_eq!(list[0]["tx_bytes"], 2000);
        assert_eq!(list[1]["route"], "/");
    }
}
