//! Transport capability consumed by the core.
//!
//! The orchestration core never parses HTTP itself. Hosting adapters hand it an
//! [`HttpExchange`] that answers request-side lookups and records response-side effects.
//! [`MemoryExchange`] is the buffered implementation used by the axum adapter and by tests.

use crate::attributes::AttributeMap;
use crate::error::AuthResult;
use crate::session::{SessionRegistry, SESSION_COOKIE};

/// A client certificate as presented by the TLS layer (DER encoded).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Certificate {
    pub der: Vec<u8>,
    /// Subject distinguished name when the TLS layer already parsed it.
    pub subject: Option<String>,
}

impl Certificate {
    pub fn new(der: Vec<u8>, subject: Option<String>) -> Self { Self { der, subject } }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    pub path: Option<String>,
    /// `None` means a browser-session cookie.
    pub max_age: Option<i64>,
    pub http_only: bool,
}

impl Cookie {
    pub fn session(name: &str, value: &str) -> Self {
        Self { name: name.to_string(), value: value.to_string(), path: Some("/".into()), max_age: None, http_only: true }
    }

    pub fn to_header_value(&self) -> String {
        let mut out = format!("{}={}", self.name, self.value);
        if let Some(p) = &self.path { out.push_str(&format!("; Path={}", p)); }
        if let Some(age) = self.max_age { out.push_str(&format!("; Max-Age={}", age)); }
        if self.http_only { out.push_str("; HttpOnly"); }
        out.push_str("; SameSite=Lax");
        out
    }
}

pub trait HttpExchange: Send {
    /// Full request path including the context path, without the query string.
    fn request_uri(&self) -> &str;
    fn query_string(&self) -> Option<&str>;
    fn parameter(&self, name: &str) -> Option<String>;
    /// All request parameters in arrival order.
    fn parameters(&self) -> Vec<(String, String)>;
    fn header(&self, name: &str) -> Option<String>;
    fn cookie(&self, name: &str) -> Option<String>;
    fn client_certificates(&self) -> Option<Vec<Certificate>>;
    /// The request-scoped attribute map.
    fn attributes(&self) -> AttributeMap;
    /// The session attribute map of this caller for the given application scope.
    fn session(&mut self, scope: &str, create: bool) -> Option<AttributeMap>;

    fn redirect(&mut self, location: &str) -> AuthResult<()>;
    fn set_status(&mut self, status: u16);
    fn set_header(&mut self, name: &str, value: &str);
    fn add_cookie(&mut self, cookie: Cookie);
}

/// Fully buffered request/response pair.
pub struct MemoryExchange {
    uri: String,
    query: Option<String>,
    params: Vec<(String, String)>,
    headers: Vec<(String, String)>,
    cookies: Vec<(String, String)>,
    certificates: Option<Vec<Certificate>>,
    attributes: AttributeMap,
    sessions: SessionRegistry,
    session_id: Option<String>,

    status: Option<u16>,
    location: Option<String>,
    response_headers: Vec<(String, String)>,
    set_cookies: Vec<Cookie>,
}

impl MemoryExchange {
    /// Build from a request target such as `/app/secret?x=1`. Query parameters become
    /// request parameters.
    pub fn new(target: &str, sessions: SessionRegistry) -> Self {
        let (uri, query) = match target.split_once('?') {
            Some((p, q)) => (p.to_string(), if q.is_empty() { None } else { Some(q.to_string()) }),
            None => (target.to_string(), None),
        };
        let params = query.as_deref().map(parse_urlencoded).unwrap_or_default();
        Self {
            uri,
            query,
            params,
            headers: Vec::new(),
            cookies: Vec::new(),
            certificates: None,
            attributes: AttributeMap::new(),
            sessions,
            session_id: None,
            status: None,
            location: None,
            response_headers: Vec::new(),
            set_cookies: Vec::new(),
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    /// Adds a `Cookie` header entry. The session cookie also selects the session.
    pub fn with_cookie(mut self, name: &str, value: &str) -> Self {
        if name == SESSION_COOKIE { self.session_id = Some(value.to_string()); }
        self.cookies.push((name.to_string(), value.to_string()));
        self
    }

    pub fn with_cookie_header(mut self, header: &str) -> Self {
        for (k, v) in parse_cookie_header(header) {
            self = self.with_cookie(&k, &v);
        }
        self
    }

    /// Adds a body parameter (form post).
    pub fn with_param(mut self, name: &str, value: &str) -> Self {
        self.params.push((name.to_string(), value.to_string()));
        self
    }

    pub fn with_form_body(mut self, body: &str) -> Self {
        self.params.extend(parse_urlencoded(body));
        self
    }

    pub fn with_certificates(mut self, certs: Vec<Certificate>) -> Self {
        self.certificates = Some(certs);
        self
    }

    pub fn session_id(&self) -> Option<&str> { self.session_id.as_deref() }
    pub fn status(&self) -> Option<u16> { self.status }
    pub fn location(&self) -> Option<&str> { self.location.as_deref() }
    pub fn response_headers(&self) -> &[(String, String)] { &self.response_headers }
    pub fn set_cookies(&self) -> &[Cookie] { &self.set_cookies }

    pub fn response_header(&self, name: &str) -> Option<&str> {
        self.response_headers.iter().find(|(k, _)| k.eq_ignore_ascii_case(name)).map(|(_, v)| v.as_str())
    }

    pub fn set_cookie_value(&self, name: &str) -> Option<&str> {
        self.set_cookies.iter().rev().find(|c| c.name == name).map(|c| c.value.as_str())
    }
}

impl HttpExchange for MemoryExchange {
    fn request_uri(&self) -> &str { &self.uri }

    fn query_string(&self) -> Option<&str> { self.query.as_deref() }

    fn parameter(&self, name: &str) -> Option<String> {
        self.params.iter().find(|(k, _)| k == name).map(|(_, v)| v.clone())
    }

    fn parameters(&self) -> Vec<(String, String)> { self.params.clone() }

    fn header(&self, name: &str) -> Option<String> {
        self.headers.iter().find(|(k, _)| k.eq_ignore_ascii_case(name)).map(|(_, v)| v.clone())
    }

    fn cookie(&self, name: &str) -> Option<String> {
        self.cookies.iter().rev().find(|(k, _)| k == name).map(|(_, v)| v.clone())
    }

    fn client_certificates(&self) -> Option<Vec<Certificate>> { self.certificates.clone() }

    fn attributes(&self) -> AttributeMap { self.attributes.clone() }

    fn session(&mut self, scope: &str, create: bool) -> Option<AttributeMap> {
        if let Some(sid) = self.session_id.clone() {
            if let Some(map) = self.sessions.lookup(&sid, scope, create) {
                return Some(map);
            }
        }
        if !create {
            return None;
        }
        // no session without a token; the failure is logged where it happens
        let sid = self.sessions.issue().ok()?;
        self.add_cookie(Cookie::session(SESSION_COOKIE, &sid));
        self.session_id = Some(sid.clone());
        self.sessions.lookup(&sid, scope, true)
    }

    fn redirect(&mut self, location: &str) -> AuthResult<()> {
        self.status = Some(302);
        self.location = Some(location.to_string());
        self.set_header("Location", location);
        Ok(())
    }

    fn set_status(&mut self, status: u16) { self.status = Some(status); }

    fn set_header(&mut self, name: &str, value: &str) {
        self.response_headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        self.response_headers.push((name.to_string(), value.to_string()));
    }

    fn add_cookie(&mut self, cookie: Cookie) { self.set_cookies.push(cookie); }
}

/// Parse `a=1&b=two+words` pairs. Malformed percent escapes are kept verbatim.
pub fn parse_urlencoded(s: &str) -> Vec<(String, String)> {
    s.split('&')
        .filter(|p| !p.is_empty())
        .map(|pair| {
            let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
            (decode_component(k), decode_component(v))
        })
        .collect()
}

fn decode_component(s: &str) -> String {
    let plus = s.replace('+', " ");
    match urlencoding::decode(&plus) {
        Ok(d) => d.into_owned(),
        Err(_) => plus,
    }
}

pub fn parse_cookie_header(header: &str) -> Vec<(String, String)> {
    let mut out = Vec::new();
    for part in header.split(';') {
        let p = part.trim();
        if let Some((k, v)) = p.split_once('=') {
            out.push((k.trim().to_string(), v.trim().to_string()));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_is_split_into_path_query_and_params() {
        let ex = MemoryExchange::new("/app/secret?x=1&name=a+b%21", SessionRegistry::default());
        assert_eq!(ex.request_uri(), "/app/secret");
        assert_eq!(ex.query_string(), Some("x=1&name=a+b%21"));
        assert_eq!(ex.parameter("x").as_deref(), Some("1"));
        assert_eq!(ex.parameter("name").as_deref(), Some("a b!"));
        assert_eq!(ex.parameter("missing"), None);

        let bare = MemoryExchange::new("/app/?", SessionRegistry::default());
        assert_eq!(bare.query_string(), None);
    }

    #[test]
    fn headers_are_case_insensitive() {
        let ex = MemoryExchange::new("/", SessionRegistry::default()).with_header("Authorization", "Basic x");
        assert_eq!(ex.header("authorization").as_deref(), Some("Basic x"));
    }

    #[test]
    fn session_is_created_once_and_cookie_issued() {
        let reg = SessionRegistry::default();
        let mut ex = MemoryExchange::new("/app/", reg.clone());
        assert!(ex.session("/app", false).is_none());
        let s1 = ex.session("/app", true).unwrap();
        let s2 = ex.session("/app", true).unwrap();
        assert!(s1.same_map(&s2));
        let sid = ex.session_id().unwrap().to_string();
        assert_eq!(ex.set_cookie_value(SESSION_COOKIE), Some(sid.as_str()));
        assert_eq!(ex.set_cookies().len(), 1);

        let mut next = MemoryExchange::new("/app/", reg).with_cookie(SESSION_COOKIE, &sid);
        assert!(next.session("/app", false).unwrap().same_map(&s1));
    }

    #[test]
    fn redirect_records_location() {
        let mut ex = MemoryExchange::new("/", SessionRegistry::default());
        ex.redirect("/app/login").unwrap();
        assert_eq!(ex.status(), Some(302));
        assert_eq!(ex.location(), Some("/app/login"));
        assert_eq!(ex.response_header("location"), Some("/app/login"));
    }

    #[test]
    fn cookie_header_parsing_and_rendering() {
        let pairs = parse_cookie_header("a=1; AUTHFLOW_XCTX=abc ;b=2");
        assert_eq!(pairs[1], ("AUTHFLOW_XCTX".to_string(), "abc".to_string()));
        let c = Cookie::session("AUTHFLOW_XCTX", "abc");
        assert_eq!(c.to_header_value(), "AUTHFLOW_XCTX=abc; Path=/; HttpOnly; SameSite=Lax");
    }
}
