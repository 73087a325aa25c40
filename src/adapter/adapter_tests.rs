use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request as HttpRequest, StatusCode};
use axum::routing::{get, post};
use axum::{middleware, Extension, Router};
use tower::ServiceExt;

use super::*;
use crate::authenticator::{Authenticator, CompositeAuthenticator, FormAuthenticator, LogoutAuthenticator, TicketAuthenticator};
use crate::config::{BridgeSettings, ScopeConfig};
use crate::directory::StaticDirectory;
use crate::session::SESSION_COOKIE;

fn app() -> Router {
    let directory = Arc::new(
        StaticDirectory::new()
            .with_user("alice", "wonderland", &["admin", "user"])
            .with_user("bob", "builder", &["user"])
            .with_ticket("t-bob", "bob"),
    );
    let container = Container::new(BridgeSettings::default());
    container.catalog().register_authenticator("form-and-ticket", move || {
        Arc::new(CompositeAuthenticator::new(vec![
            Arc::new(TicketAuthenticator::new(directory.clone())) as Arc<dyn Authenticator>,
            Arc::new(FormAuthenticator::new(directory.clone())),
            Arc::new(LogoutAuthenticator::new()),
        ]))
    });
    container.add_scope("", ScopeConfig::with_authenticator("form-and-ticket"));
    let policy = RoutePolicy::new(true).public("/").public("/login").any_group("/admin", &["admin"]);
    let state = AuthLayerState::new(container, "", policy, SessionRegistry::default());

    Router::new()
        .route("/", get(|| async { "home" }))
        .route("/login", get(|| async { "login form" }))
        .route("/secret", get(|Extension(p): Extension<Principal>| async move { format!("hello {}", p.name()) }))
        .route("/admin", get(|| async { "admin" }))
        .route("/j_security_check", post(|| async { StatusCode::NOT_FOUND }))
        .route("/j_security_exit", get(|| async { StatusCode::NOT_FOUND }))
        .layer(middleware::from_fn_with_state(state, require_authentication))
}

fn session_cookie(resp: &Response) -> Option<String> {
    resp.headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|v| v.starts_with(SESSION_COOKIE))
        .and_then(|v| v.split(';').next())
        .map(str::to_string)
}

async fn body_text(resp: Response) -> String {
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn get_req(uri: &str, cookie: Option<&str>) -> HttpRequest<Body> {
    let mut b = HttpRequest::builder().uri(uri);
    if let Some(c) = cookie {
        b = b.header(header::COOKIE, c);
    }
    b.body(Body::empty()).unwrap()
}

#[tokio::test]
async fn public_route_passes_anonymously() {
    let resp = app().oneshot(get_req("/", None)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_text(resp).await, "home");
}

#[tokio::test]
async fn form_login_round_trip() {
    let router = app();
    let resp = router.clone().oneshot(get_req("/secret?x=1", None)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::FOUND);
    assert_eq!(resp.headers().get(header::LOCATION).unwrap(), "/login");
    let cookie = session_cookie(&resp).expect("session cookie issued");

    let login = HttpRequest::builder()
        .method("POST")
        .uri("/j_security_check")
        .header(header::COOKIE, &cookie)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from("j_username=alice&j_password=wonderland"))
        .unwrap();
    let resp = router.clone().oneshot(login).await.unwrap();
    assert_eq!(resp.status(), StatusCode::FOUND);
    assert_eq!(resp.headers().get(header::LOCATION).unwrap(), "/secret?x=1");

    let resp = router.clone().oneshot(get_req("/secret?x=1", Some(&cookie))).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_text(resp).await, "hello alice");

    // session sticks for later requests
    let resp = router.oneshot(get_req("/admin", Some(&cookie))).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn bad_ticket_is_unauthorized_and_group_rules_forbid() {
    let router = app();
    let resp = router.clone().oneshot(get_req("/secret?j_security_ticket=forged", None)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let resp = router.clone().oneshot(get_req("/secret?j_security_ticket=t-bob", None)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_text(resp).await, "hello bob");

    let resp = router.oneshot(get_req("/admin?j_security_ticket=t-bob", None)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn logout_clears_and_redirects() {
    let router = app();
    let resp = router.clone().oneshot(get_req("/secret?j_security_ticket=t-bob", None)).await.unwrap();
    let cookie = session_cookie(&resp).unwrap();

    let resp = router.clone().oneshot(get_req("/j_security_exit?_to=/login", Some(&cookie))).await.unwrap();
    assert_eq!(resp.status(), StatusCode::FOUND);
    assert_eq!(resp.headers().get(header::LOCATION).unwrap(), "/login");

    let resp = router.oneshot(get_req("/secret", Some(&cookie))).await.unwrap();
    assert_eq!(resp.status(), StatusCode::FOUND);
    assert_eq!(resp.headers().get(header::LOCATION).unwrap(), "/login");
}

#[tokio::test]
async fn cookies_split_over_several_headers_are_all_read() {
    let router = app();
    let resp = router.clone().oneshot(get_req("/secret?j_security_ticket=t-bob", None)).await.unwrap();
    let cookie = session_cookie(&resp).unwrap();

    let split = HttpRequest::builder()
        .uri("/secret")
        .header(header::COOKIE, "theme=dark")
        .header(header::COOKIE, &cookie)
        .body(Body::empty())
        .unwrap();
    let resp = router.oneshot(split).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_text(resp).await, "hello bob");
}
