use std::net::SocketAddr;

use axum::{routing::get, Router};
use snafu::ResultExt;
use tracing::info;

use crate::error::{BindHealthEndpointSnafu, Result, ServeHealthEndpointSnafu};

/// Serves `/healthz`, returning 200 once bound; runs until cancelled by the caller.
pub async fn serve(bind_address: SocketAddr) -> Result<()> {
    let app = Router::new().route("/healthz", get(|| async { "ok" }));
    let listener = tokio::net::TcpListener::bind(bind_address)
        .await
        .context(BindHealthEndpointSnafu {
            bind_address: bind_address.to_string(),
        })?;
    info!(%bind_address, "health probe endpoint listening");
    axum::serve(listener, app)
        .await
        .context(ServeHealthEndpointSnafu)
}
