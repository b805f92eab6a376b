pub use crate::auth::{AuthError, Authenticate};
pub use crate::client::HttpClient;
pub use crate::config::{ClientOptions, ServerOptions};
pub use crate::error::HttpError;
pub use crate::handler::{Context, Handler, HandlerResult};
pub use crate::header::Headers;
pub use crate::method::Method;
pub use crate::request::{Param, Request};
pub use crate::response::Response;
pub use crate::router::{ParserType, Route, RouteOptions, Routes};
pub use crate::server::Server;
