// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The HTTP control endpoint: liveness, on-demand reconciliation and log level.

use axum::extract::{Form, State};
use axum::http::StatusCode;
use axum::routing::{any, get};
use axum::Router;
use overlay::ReloadHandle;
use serde::Deserialize;
use std::net::SocketAddr;
use std::thread::JoinHandle;
use tracectl::{get_trace_ctl, parse_level};
use tracing::{debug, error, info};

/// Build the control endpoint's routes.
pub fn router(reload: ReloadHandle) -> Router {
    Router::new()
        .route("/ping", get(ping))
        .route("/v1/reload", any(reload_handler))
        .route("/v1/loglevel", get(get_loglevel).post(set_loglevel))
        .with_state(reload)
}

async fn ping() -> &'static str {
    debug!("Received ping request");
    "OK"
}

async fn reload_handler(State(reload): State<ReloadHandle>) -> (StatusCode, String) {
    debug!("Received reload request");
    match reload.reload().await {
        Ok(_) => (StatusCode::OK, "Reloaded Configuration\n".to_string()),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to reload configuration: {e}\n"),
        ),
    }
}

async fn get_loglevel() -> String {
    let level = get_trace_ctl().get_default_level();
    format!("loglevel: {}\n", level.to_string().to_lowercase())
}

#[derive(Debug, Deserialize)]
struct LevelForm {
    #[serde(default)]
    level: String,
}

async fn set_loglevel(Form(form): Form<LevelForm>) -> (StatusCode, String) {
    debug!("Received loglevel request");
    match parse_level(&form.level) {
        Ok(level) => {
            get_trace_ctl().set_global_level(level);
            (StatusCode::OK, "OK".to_string())
        }
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to parse loglevel: {e}\n"),
        ),
    }
}

/// Serve the control endpoint on `addr` from a thread of its own.
///
/// `on_exit` runs on that thread once serving stops.
///
/// # Errors
///
/// Fails if the thread cannot be spawned.
pub fn spawn_control_server(
    addr: SocketAddr,
    reload: ReloadHandle,
    on_exit: impl FnOnce() + Send + 'static,
) -> std::io::Result<JoinHandle<()>> {
    std::thread::Builder::new()
        .name("control-server".to_string())
        .spawn(move || {
            match tokio::runtime::Builder::new_current_thread()
                .enable_io()
                .enable_time()
                .build()
            {
                Ok(rt) => rt.block_on(serve(addr, reload)),
                Err(e) => error!("Failed to create the control server runtime: {e}"),
            }
            on_exit();
        })
}

async fn serve(addr: SocketAddr, reload: ReloadHandle) {
    info!("Listening on {addr}");
    if let Err(e) = axum_server::bind(addr)
        .serve(router(reload).into_make_service())
        .await
    {
        error!("Control server error: {e}");
    }
}
