use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::handlers::{snapshot, ws};
use crate::state::AppState;

pub fn create_router(state: AppState) -> Router {
    let mut router = Router::new()
        .route("/health", get(snapshot::health))
        .route("/snapshot", get(snapshot::get_snapshot))
        .route("/detail/:code", get(snapshot::get_detail))
        .route("/refresh", post(snapshot::refresh))
        .route("/ws", get(ws::ws_handler));

    let static_dir = state.config.server.static_dir.clone();
    if static_dir.is_dir() {
        info!(dir = %static_dir.display(), "serving static files");
        router = router.fallback_service(ServeDir::new(static_dir).append_index_html_on_directories(true));
    } else {
        warn!(dir = %static_dir.display(), "static directory missing, not serving files");
    }

    router
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
