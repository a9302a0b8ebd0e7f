mod error;
mod extract;
mod response;
mod v1;

use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::controller::Core;

pub use error::ApiError;
pub use response::ApiResponse;

/// Builds the management API router, nesting the versioned surface under
/// `/api`.
pub fn router(core: Core) -> Router {
    Router::new()
        .nest("/api", v1::router())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(core)
}
