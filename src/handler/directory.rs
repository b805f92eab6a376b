//! Handler for serving static files.
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::{debug, warn};

use crate::error::HttpError;
use crate::handler::{Context, Handler, HandlerResult};
use crate::header::{CONTENT_TYPE, LOCATION};
use crate::method::Method;
use crate::response::Response;

const INDEX_FILE: &str = "index.html";

/// Handler which serves files under the given root directory. Routes
/// registered with a document root and no handler get one of these.
#[derive(Debug, Clone)]
pub struct DirectoryHandler {
    pub root: PathBuf,
    autoindex: bool,
}

impl DirectoryHandler {
    /// Create a new DirectoryHandler.
    ///
    /// # Arguments
    /// * `root`: serve files under this path
    pub fn new(root: &Path) -> Result<Self, io::Error> {
        Ok(Self {
            root: root.canonicalize()?,
            autoindex: false,
        })
    }
    /// Handler for a configured document root. The root is resolved on
    /// each request, so it may not exist yet.
    pub fn from_document_root(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            autoindex: false,
        }
    }
    /// List directories without an index file.
    pub fn with_autoindex(mut self, autoindex: bool) -> Self {
        self.autoindex = autoindex;
        self
    }
}

/// Check if root is parent of target. Make sure both are canonical
/// by calling `canonicalize()` first if you want it to work reliably.
fn is_parent(root: &Path, target: &Path) -> bool {
    let mut curr = target;
    loop {
        if curr == root {
            return true;
        }
        curr = match curr.parent() {
            Some(parent) => parent,
            None => return false,
        };
    }
}

pub fn mime_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("html") | Some("htm") => "text/html; charset=UTF-8",
        Some("css") => "text/css",
        Some("js") => "application/javascript",
        Some("json") => "application/json",
        Some("xml") => "application/xml",
        Some("txt") => "text/plain; charset=UTF-8",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("svg") => "image/svg+xml",
        Some("ico") => "image/x-icon",
        Some("pdf") => "application/pdf",
        Some("wasm") => "application/wasm",
        _ => "application/octet-stream",
    }
}

/// Serve `relative` below `root` into `response`.
///
/// Only GET and HEAD are served. For other methods `probe` tells whether
/// another route would take the path with a different method (405) or not
/// (400). A directory requested without trailing slash is redirected to
/// the slashed path.
pub fn serve_static(
    root: &Path,
    request_path: &str,
    relative: &str,
    method: Method,
    autoindex: bool,
    probe: &dyn Fn() -> bool,
    response: &mut Response,
) -> HandlerResult {
    if method != Method::GET && method != Method::HEAD {
        debug!("invalid method for static file: {}", method);
        let message = format!("request method {} not supported for path: {}", method, request_path);
        return Err(if probe() {
            HttpError::MethodNotAllowed(message)
        } else {
            HttpError::BadRequest(message)
        });
    }

    let relative = relative.trim_start_matches('/');
    let filepath = root
        .join(relative)
        .canonicalize()
        .map_err(|_| HttpError::not_found("file not found"))?;

    // Prevent serving files above root from path traversals like
    // ../../../etc/passwd
    if !is_parent(root, &filepath) {
        warn!("path traversal attempted: {:?}", &filepath);
        return Err(HttpError::not_found("file not found"));
    }

    if filepath.is_dir() {
        if !request_path.ends_with('/') {
            response.set_status(301);
            response.headers.set(LOCATION, &format!("{}/", request_path));
            return Ok(());
        }
        let index = filepath.join(INDEX_FILE);
        if index.is_file() {
            return serve_file(&index, response);
        }
        if !autoindex {
            return Err(HttpError::Status(403, "directory listing disabled".to_string()));
        }
        let mut entries = vec![];
        for entry in fs::read_dir(&filepath)? {
            let entry = entry?;
            let mut name = entry.file_name().to_string_lossy().into_owned();
            if entry.path().is_dir() {
                name.push('/');
            }
            entries.push(name);
        }
        entries.sort();
        entries.push("".to_string());
        response.set_text("text/plain; charset=UTF-8", &entries.join("\n"));
        return Ok(());
    }

    if filepath.is_file() {
        return serve_file(&filepath, response);
    }
    Err(HttpError::not_found("file not found"))
}

fn serve_file(path: &Path, response: &mut Response) -> HandlerResult {
    let file = fs::File::open(path)?;
    let length = file.metadata()?.len();
    response.headers.set(CONTENT_TYPE, mime_type(path));
    response.set_stream(Box::new(file), Some(length));
    Ok(())
}

impl Handler for DirectoryHandler {
    fn handle(&self, ctx: &mut Context<'_>) -> HandlerResult {
        let route = ctx.route();
        let autoindex = self.autoindex || route.config()["autoindex"].as_bool() == Some(true);
        let path = ctx.path();
        let relative = path.route.strip_prefix(route.prefix()).unwrap_or(&path.route).to_string();
        let request_path = ctx.request.path.clone();
        let method = ctx.request.method;
        let probe = || ctx.other_method_matches();
        let root = self
            .root
            .canonicalize()
            .map_err(|_| HttpError::not_found("document root not found"))?;
        let mut response = Response::new(200);
        let result = serve_static(
            &root,
            &request_path,
            &relative,
            method,
            autoindex,
            &probe,
            &mut response,
        );
        ctx.response = response;
        result
    }
}
