//! axum hosting adapter.
//!
//! [`require_authentication`] is a `from_fn_with_state` middleware. It buffers the request into
//! a [`MemoryExchange`], runs one orchestration pass, and then either forwards to the inner
//! service with the [`Principal`] in the request extensions or answers with the rejection or
//! the response the strategy prepared. Cookies issued during the pass are always attached.

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::extract::{Request, State};
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::{debug, error, warn};

use crate::authorizer::RoutePolicy;
use crate::context::path_within;
use crate::exchange::{HttpExchange, MemoryExchange};
use crate::orchestrator::{Orchestrator, Outcome};
use crate::principal::Principal;
use crate::registry::Container;
use crate::session::SessionRegistry;

/// Largest url-encoded form body buffered for parameter lookup.
pub const MAX_FORM_BYTES: usize = 64 * 1024;

#[derive(Clone)]
pub struct AuthLayerState {
    pub container: Arc<Container>,
    pub context_path: String,
    pub policy: Arc<RoutePolicy>,
    pub sessions: SessionRegistry,
}

impl AuthLayerState {
    pub fn new(container: Arc<Container>, context_path: &str, policy: RoutePolicy, sessions: SessionRegistry) -> Self {
        Self {
            container,
            context_path: crate::registry::normalize_context_path(context_path),
            policy: Arc::new(policy),
            sessions,
        }
    }
}

fn is_form(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.trim_start().to_ascii_lowercase().starts_with("application/x-www-form-urlencoded"))
}

fn json_status(status: StatusCode, label: &str) -> Response {
    (status, Json(serde_json::json!({"status": label}))).into_response()
}

fn error_response(status: StatusCode, code: &str) -> Response {
    (status, Json(serde_json::json!({"status": "error", "error": code}))).into_response()
}

/// The response a strategy wrote during a detour.
fn detour_response(exchange: &MemoryExchange) -> Response {
    let default = if exchange.location().is_some() { 302 } else { 200 };
    let status = StatusCode::from_u16(exchange.status().unwrap_or(default)).unwrap_or(StatusCode::FOUND);
    let mut response = status.into_response();
    for (name, value) in exchange.response_headers() {
        let (Ok(n), Ok(v)) = (HeaderName::try_from(name.as_str()), HeaderValue::from_str(value)) else {
            warn!(target: "authflow::adapter", header = %name, "dropping unrepresentable header");
            continue;
        };
        response.headers_mut().insert(n, v);
    }
    response
}

fn append_cookies(headers: &mut HeaderMap, exchange: &MemoryExchange) {
    for cookie in exchange.set_cookies() {
        if let Ok(v) = HeaderValue::from_str(&cookie.to_header_value()) {
            headers.append(header::SET_COOKIE, v);
        }
    }
}

async fn buffer_exchange(state: &AuthLayerState, req: Request) -> Result<(Request, MemoryExchange), Response> {
    let (parts, body) = req.into_parts();
    let target = parts.uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
    let mut exchange = MemoryExchange::new(target, state.sessions.clone());
    for (name, value) in parts.headers.iter() {
        if let Ok(v) = value.to_str() {
            exchange = exchange.with_header(name.as_str(), v);
        }
    }
    // HTTP/2 clients may split cookies over several headers
    for cookies in parts.headers.get_all(header::COOKIE).iter().filter_map(|v| v.to_str().ok()) {
        exchange = exchange.with_cookie_header(cookies);
    }
    let body = if is_form(&parts.headers) {
        let bytes = to_bytes(body, MAX_FORM_BYTES).await.map_err(|e| {
            warn!(target: "authflow::adapter", error = %e, "form body rejected");
            error_response(StatusCode::PAYLOAD_TOO_LARGE, "body_too_large")
        })?;
        exchange = exchange.with_form_body(&String::from_utf8_lossy(&bytes));
        Body::from(bytes)
    } else {
        body
    };
    Ok((Request::from_parts(parts, body), exchange))
}

pub async fn require_authentication(State(state): State<AuthLayerState>, req: Request, next: Next) -> Response {
    let Some(scope) = state.container.scope(&state.context_path) else {
        error!(target: "authflow::adapter", context = %state.context_path, "no such scope");
        return error_response(StatusCode::INTERNAL_SERVER_ERROR, "unknown_scope");
    };
    let (mut req, mut exchange) = match buffer_exchange(&state, req).await {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let mandatory = path_within(scope.context_path(), exchange.request_uri())
        .map(|p| state.policy.is_mandatory(&p))
        .unwrap_or(true);
    let orchestrator = Orchestrator::new(scope).with_authorizer(state.policy.clone());
    let outcome = orchestrator.handle(&mut exchange, mandatory);

    let mut response = match outcome {
        Ok(Outcome::Authorized(principal)) => {
            if let Some(p) = principal {
                debug!(target: "authflow::adapter", principal = %p, "authorized");
                req.extensions_mut().insert::<Principal>(p);
            }
            next.run(req).await
        }
        Ok(Outcome::Rejected(hint)) => {
            let status = StatusCode::from_u16(hint.code()).unwrap_or(StatusCode::FORBIDDEN);
            let mut resp = json_status(status, &hint.to_string());
            // challenge headers written before a rejection still go out
            for (name, value) in exchange.response_headers() {
                if let (Ok(n), Ok(v)) = (HeaderName::try_from(name.as_str()), HeaderValue::from_str(value)) {
                    resp.headers_mut().insert(n, v);
                }
            }
            resp
        }
        Ok(Outcome::Detoured) => detour_response(&exchange),
        Err(e) => {
            error!(target: "authflow::adapter", error = %e, "authentication pass failed");
            let status = StatusCode::from_u16(e.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            error_response(status, e.code_str())
        }
    };
    append_cookies(response.headers_mut(), &exchange);
    response
}

#[cfg(test)]
#[path = "adapter_tests.rs"]
mod tests;
