//!
//! authflow sample server
//! ----------------------
//! Serves a small site behind form + ticket + logout authentication. Configuration comes from
//! `AUTHFLOW_HTTP_PORT`, `AUTHFLOW_CONFIG` (container JSON) and `AUTHFLOW_USERS` (user
//! directory JSON), or the `--port` flag.

use std::env;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::extract::Request;
use axum::response::Html;
use axum::routing::{get, post};
use axum::{middleware, Extension, Router};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use authflow::adapter::{require_authentication, AuthLayerState};
use authflow::authenticator::{Authenticator, CompositeAuthenticator, FormAuthenticator, LogoutAuthenticator, TicketAuthenticator};
use authflow::authorizer::RoutePolicy;
use authflow::config::{ContainerConfig, ScopeConfig};
use authflow::directory::StaticDirectory;
use authflow::session::SessionRegistry;
use authflow::{Container, Principal};

const STRATEGY: &str = "form-and-ticket";

fn parse_port_env(name: &str) -> Option<u16> {
    match env::var(name) {
        Ok(val) => val.parse::<u16>().ok(),
        Err(_) => None,
    }
}

fn parse_port_arg(args: &[String], flag: &str) -> Option<u16> {
    let pos = args.iter().position(|a| a == flag)?;
    args.get(pos + 1)?.parse::<u16>().ok()
}

fn load_directory() -> Result<StaticDirectory> {
    match env::var("AUTHFLOW_USERS") {
        Ok(path) => StaticDirectory::from_json_file(path),
        Err(_) => Ok(StaticDirectory::new()
            .with_user("alice", "wonderland", &["admin", "user"])
            .with_user("bob", "builder", &["user"])
            .with_ticket("ticket-alice", "alice")),
    }
}

fn load_container(directory: Arc<StaticDirectory>) -> Result<Arc<Container>> {
    let mut cfg = match env::var("AUTHFLOW_CONFIG") {
        Ok(path) => ContainerConfig::from_json_file(path)?,
        Err(_) => ContainerConfig::default(),
    };
    let root = cfg.scopes.entry(String::new()).or_insert_with(|| ScopeConfig::with_authenticator(STRATEGY));
    root.apply_env("AUTHFLOW");
    let container = Container::from_config(&cfg);
    container.catalog().register_authenticator(STRATEGY, move || {
        let directory = directory.clone();
        Arc::new(CompositeAuthenticator::lazy(move || {
            vec![
                Arc::new(TicketAuthenticator::new(directory.clone())) as Arc<dyn Authenticator>,
                Arc::new(FormAuthenticator::new(directory.clone())),
                Arc::new(LogoutAuthenticator::new()),
            ]
        }))
    });
    Ok(container)
}

async fn home(req: Request) -> Html<String> {
    let who = match req.extensions().get::<Principal>() {
        Some(p) => format!("signed in as {} · <a href=\"/j_security_exit\">sign out</a>", p),
        None => "<a href=\"/secret\">sign in</a>".to_string(),
    };
    Html(format!("<h1>authflow</h1><p>{}</p>", who))
}

async fn secret(Extension(p): Extension<Principal>) -> Html<String> {
    Html(format!("<h1>secret</h1><p>hello {}</p>", p.name()))
}

async fn admin(Extension(p): Extension<Principal>) -> Html<String> {
    Html(format!("<h1>admin</h1><p>{} may administer</p>", p.name()))
}

async fn login_page() -> Html<&'static str> {
    Html(
        r#"<form method="post" action="/j_security_check">
<input name="j_username" placeholder="user"><input name="j_password" type="password">
<button>sign in</button></form>"#,
    )
}

async fn login_error() -> Html<&'static str> {
    Html(r#"<p>wrong user name or password</p><a href="/login">try again</a>"#)
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("info"))?;
    fmt().with_env_filter(filter).init();

    let args: Vec<String> = env::args().collect();
    let port = parse_port_arg(&args, "--port").or_else(|| parse_port_env("AUTHFLOW_HTTP_PORT")).unwrap_or(7878);

    let directory = Arc::new(load_directory()?);
    let container = load_container(directory)?;
    let policy = RoutePolicy::new(true)
        .public("/")
        .public("/login")
        .public("/login-error")
        .any_group("/admin", &["admin"]);
    let state = AuthLayerState::new(container, "", policy, SessionRegistry::default());

    let app = Router::new()
        .route("/", get(home))
        .route("/secret", get(secret))
        .route("/admin", get(admin))
        .route("/login", get(login_page))
        .route("/login-error", get(login_error))
        // only reached when no strategy claimed the request
        .route("/j_security_check", post(|| async { axum::http::StatusCode::NOT_FOUND }))
        .route("/j_security_exit", get(|| async { axum::response::Redirect::to("/") }))
        .layer(middleware::from_fn_with_state(state, require_authentication));

    let addr: SocketAddr = format!("0.0.0.0:{}", port).parse()?;
    info!(target: "authflow::server", "Starting authflow sample on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
