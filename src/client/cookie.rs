//! Session cookies for the client.
use log::debug;

use crate::url::Url;

fn is_token_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || "!#$%&*+-.'^_`|~".contains(c)
}

fn is_valid_name(name: &str) -> bool {
    name.chars().all(is_token_char)
}

fn is_valid_value(value: &str) -> bool {
    value
        .chars()
        .all(|c| is_token_char(c) || "()/:<=>?@[]{}".contains(c))
}

/// The registrable part of a host name, approximated by its last two labels.
fn base_domain(host: &str) -> &str {
    let host = host.trim_start_matches('.');
    match host.rmatch_indices('.').nth(1) {
        Some((i, _)) => &host[i + 1..],
        None => host,
    }
}

fn is_subdomain_of(domain: &str, host: &str) -> bool {
    let domain = domain.trim_start_matches('.');
    host.eq_ignore_ascii_case(domain)
        || (host.len() > domain.len()
            && host[host.len() - domain.len()..].eq_ignore_ascii_case(domain)
            && host[..host.len() - domain.len()].ends_with('.'))
}

/// One cookie received through `Set-Cookie`. Expiry attributes are
/// ignored, every cookie lives as long as its jar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie {
    name: String,
    value: String,
    domain: String,
    path: String,
    secure_only: bool,
    allow_subdomains: bool,
}

impl Cookie {
    /// Parse a `Set-Cookie` value received from `url`. Returns None for
    /// cookies the origin may not set.
    pub fn parse(url: &Url, input: &str) -> Option<Self> {
        let mut pairs = input.split(';').map(|pair| {
            let mut parts = pair.splitn(2, '=');
            let key = parts.next().unwrap_or("").trim();
            let value = parts.next().unwrap_or("").trim();
            (key, value)
        });
        let (name, value) = pairs.next()?;
        let mut need_secure = false;
        let mut must_not_have_domain = false;
        if name.starts_with("__Secure-") {
            need_secure = true;
        } else if name.starts_with("__Host-") {
            need_secure = true;
            must_not_have_domain = true;
        }
        if name.is_empty() || !is_valid_name(name) {
            debug!("invalid cookie name: {}", name);
            return None;
        }
        let value = value.trim_matches('"');
        if !is_valid_value(value) {
            debug!("invalid cookie value: {}", value);
            return None;
        }
        let mut cookie = Self {
            name: name.to_string(),
            value: value.to_string(),
            domain: url.host.to_ascii_lowercase(),
            path: String::new(),
            secure_only: false,
            allow_subdomains: false,
        };
        let mut had_domain = false;
        for (key, value) in pairs {
            if key.eq_ignore_ascii_case("Domain") {
                let domain = value.trim_start_matches('.').to_ascii_lowercase();
                if domain.is_empty() || base_domain(&domain) != base_domain(&cookie.domain) {
                    debug!("rejecting cookie for foreign domain: {}", value);
                    return None;
                }
                cookie.domain = domain;
                cookie.allow_subdomains = true;
                had_domain = true;
            } else if key.eq_ignore_ascii_case("Path") {
                if !value.starts_with('/') {
                    debug!("invalid cookie path: {}", value);
                    return None;
                }
                cookie.path = value.to_string();
            } else if key.eq_ignore_ascii_case("Secure") {
                if !url.is_https() {
                    debug!("rejecting Secure cookie set over http: {}", cookie.name);
                    return None;
                }
                need_secure = false;
                cookie.secure_only = true;
            }
        }
        if need_secure {
            debug!("cookie {} lacks the Secure attribute", cookie.name);
            return None;
        }
        if must_not_have_domain && had_domain {
            debug!("cookie {} may not carry a Domain", cookie.name);
            return None;
        }
        Some(cookie)
    }

    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn value(&self) -> &str {
        &self.value
    }
    pub fn domain(&self) -> &str {
        &self.domain
    }
    pub fn path(&self) -> &str {
        &self.path
    }
    pub fn is_secure(&self) -> bool {
        self.secure_only
    }

    /// Whether this cookie goes out with a request to `url`.
    pub fn matches(&self, url: &Url) -> bool {
        if self.secure_only && !url.is_https() {
            return false;
        }
        if !self.domain.is_empty() && !url.host.eq_ignore_ascii_case(&self.domain) {
            if !self.allow_subdomains || !is_subdomain_of(&self.domain, &url.host) {
                return false;
            }
        }
        let path = if url.path.is_empty() { "/" } else { url.path.as_str() };
        self.path.is_empty() || path.starts_with(&self.path)
    }

    /// `name=value` as sent in a `Cookie` header.
    pub fn serialize(&self) -> String {
        if self.value.is_empty() {
            self.name.clone()
        } else {
            format!("{}={}", self.name, self.value)
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CookieJar {
    cookies: Vec<Cookie>,
}

impl CookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the cookie from one `Set-Cookie` value, replacing an older one
    /// with the same name.
    pub fn parse(&mut self, url: &Url, input: &str) -> bool {
        match Cookie::parse(url, input) {
            Some(cookie) => {
                self.add(cookie);
                true
            }
            None => false,
        }
    }

    pub fn add(&mut self, cookie: Cookie) {
        self.cookies.retain(|c| c.name != cookie.name);
        self.cookies.push(cookie);
    }

    /// Value for the `Cookie` header of a request to `url`, empty if no
    /// cookie applies.
    pub fn serialize(&self, url: &Url) -> String {
        self.cookies
            .iter()
            .filter(|c| c.matches(url))
            .map(Cookie::serialize)
            .collect::<Vec<_>>()
            .join("; ")
    }

    pub fn iter(&self) -> impl Iterator<Item = &Cookie> {
        self.cookies.iter()
    }
    pub fn len(&self) -> usize {
        self.cookies.len()
    }
    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }
    pub fn clear(&mut self) {
        self.cookies.clear()
    }
}
