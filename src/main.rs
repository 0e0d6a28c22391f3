//! sharebox server binary.
//!
//! Serves a local directory tree over HTTP: browsing, uploads, deletion,
//! folder creation, and zip downloads, optionally gated behind one shared
//! password. The main entry point builds the Axum router, starts the
//! listener, and keeps the instance registry up to date.

mod archive;
mod auth;
mod config;
mod error;
mod html;
mod listing;
mod logging;
mod registry;
mod resolve;
mod serve;
mod session;
mod upload;

use axum::extract::{DefaultBodyLimit, Extension, connect_info::ConnectInfo};
use axum::http::Request;
use axum::routing::get;
use axum::{Router, middleware};
use chrono::Utc;
use clap::Parser;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tower_http::trace::{DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::{Level, info, info_span, warn};

use crate::config::{Args, Command, LOGIN_ROUTE, LOGOUT_ROUTE};
use crate::registry::{Registry, RegistryEntry};
use crate::session::SessionStore;

/// Everything the request handlers share. Constructed once per server
/// instance and passed by reference; the session table never lives in a
/// process-wide variable.
pub struct AppState {
    pub root: PathBuf,
    pub password: Option<String>,
    pub sessions: SessionStore,
}

/// Starts the sharebox server and blocks until shutdown.
#[tokio::main]
async fn main() -> Result<(), std::io::Error> {
    logging::init_logging();

    let args = Args::parse();
    let registry = Registry::open_default();

    if let Some(Command::List) = args.command {
        return list_instances(&registry);
    }

    let root = tokio::fs::canonicalize(&args.dir).await?;
    let state = Arc::new(AppState {
        root: root.clone(),
        password: args.password.clone(),
        sessions: SessionStore::new(Duration::from_secs(args.session_ttl_secs)),
    });

    let app = Router::new()
        .route(LOGIN_ROUTE, get(auth::login_form).post(auth::login_submit))
        .route(LOGOUT_ROUTE, get(auth::logout))
        .fallback(serve::handle_request)
        .layer(DefaultBodyLimit::disable())
        .layer(middleware::from_fn(auth::require_session))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &Request<_>| {
                    let client_ip = request
                        .extensions()
                        .get::<ConnectInfo<SocketAddr>>()
                        .map(|ConnectInfo(addr)| addr.to_string())
                        .unwrap_or_else(|| "unknown".to_string());

                    info_span!(
                        env!("CARGO_CRATE_NAME"),
                        client_ip,
                        method = ?request.method(),
                        path = ?request.uri().path(),
                    )
                })
                .on_request(DefaultOnRequest::new().level(Level::DEBUG))
                .on_response(DefaultOnResponse::new().level(Level::DEBUG)),
        )
        .layer(Extension(state));

    let host = args
        .bind
        .parse::<IpAddr>()
        .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidInput, err.to_string()))?;
    let addr = SocketAddr::new(host, args.port);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Started HTTP server on {addr}, serving {}", root.display());

    let own_pid = std::process::id();
    if let Err(err) = registry.register(RegistryEntry {
        pid: own_pid,
        interface: args.bind.clone(),
        port: args.port,
        cwd: root,
        started_at: Utc::now(),
    }) {
        warn!(error = %err, "could not record instance in registry");
    }

    let result = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await;

    if let Err(err) = registry.deregister(own_pid) {
        warn!(error = %err, "could not remove instance from registry");
    }
    result
}

fn list_instances(registry: &Registry) -> Result<(), std::io::Error> {
    let entries = registry.live_entries()?;
    if entries.is_empty() {
        println!("no running instances");
        return Ok(());
    }
    println!("{:<8} {:<22} {:<20} cwd", "pid", "address", "started");
    for entry in entries {
        println!(
            "{:<8} {:<22} {:<20} {}",
            entry.pid,
            format!("{}:{}", entry.interface, entry.port),
            entry.started_at.format("%Y-%m-%d %H:%M:%S"),
            entry.cwd.display()
        );
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Received termination signal shutting down");
}
