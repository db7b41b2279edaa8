use crate::routes;
use axum::{
    routing::{get, post},
    Router,
};
use saai_orchestrator::Orchestrator;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

/// Shared application state.
pub struct AppState {
    /// The orchestrator every handler calls into.
    pub orchestrator: Arc<Orchestrator>,
}

/// The HTTP gateway in front of an [`Orchestrator`].
pub struct GatewayServer;

impl GatewayServer {
    /// Build the router. The orchestrator may still be uninitialized; handlers
    /// answer 503 until it is.
    pub fn build(orchestrator: Arc<Orchestrator>) -> Router {
        let state = Arc::new(AppState { orchestrator });

        Router::new()
            .route("/", get(routes::root))
            .route("/health", get(routes::health))
            .route("/agents", get(routes::list_agents))
            .route("/agents/{name}/command", post(routes::send_command))
            .layer(cors_layer())
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }

    /// Serve `app` on `listener` until `shutdown` resolves, then drain
    /// in-flight requests.
    pub async fn serve<F>(listener: TcpListener, app: Router, shutdown: F) -> std::io::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        info!(addr = %listener.local_addr()?, "Gateway listening");
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await?;
        info!("Gateway stopped");
        Ok(())
    }
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
}
