use axum::{routing::get, Router};

use crate::api::handlers::{self, AppState};

pub fn create_router() -> Router<AppState> {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Collections
        .route(
            "/:collection",
            get(handlers::list_resources).post(handlers::create_resource),
        )
        // Single resources
        .route(
            "/:collection/:id",
            get(handlers::get_resource)
                .patch(handlers::patch_resource)
                .delete(handlers::delete_resource),
        )
        // Relationships
        .route(
            "/:collection/:id/relationships/:relation",
            get(handlers::get_relationship),
        )
        .route("/:collection/:id/:relation", get(handlers::get_related))
}
