use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::api::{create_router, AppState};
use crate::error::{FlexmonError, Result};

/// Start the API server; returns once `shutdown` fires and in-flight
/// requests have drained.
pub async fn start_api_server(
    state: AppState,
    port: u16,
    shutdown: CancellationToken,
) -> Result<()> {
    let app = create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("API server listening on http://{}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|e| FlexmonError::Internal(format!("API server error: {}", e)))?;

    info!("API server stopped");
    Ok(())
}
