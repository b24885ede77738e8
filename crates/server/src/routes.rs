//! Route configuration.

use crate::auth::auth_middleware;
use crate::handlers;
use crate::metrics::metrics_handler;
use crate::state::AppState;
use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::get;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let api_routes = Router::new()
        // Health check (intentionally unauthenticated for load balancers/k8s probes)
        .route("/v1/health", get(handlers::health_check))
        .route("/v1/auth/whoami", get(handlers::whoami))
        // Packages
        .route(
            "/api/uploads",
            get(handlers::search_packages).post(handlers::create_package),
        )
        .route(
            "/api/uploads/{id}",
            get(handlers::get_package)
                .post(handlers::update_package)
                .delete(handlers::delete_package),
        )
        .route("/api/files/{id}", get(handlers::download_file))
        // Form helpers
        .route("/api/tags/suggest", get(handlers::suggest_tags))
        .route(
            "/api/packages/suggestions",
            get(handlers::package_suggestions),
        );

    let mut router = Router::new().merge(api_routes);

    // When enabled, restrict /metrics at the network level.
    if state.config.server.metrics_enabled {
        router = router.route("/metrics", get(metrics_handler));
    }

    // Uploads are unbounded unless a limit is configured.
    router = match state.config.server.max_request_bytes {
        Some(limit) => {
            let limit = usize::try_from(limit).unwrap_or(usize::MAX);
            router
                .layer(DefaultBodyLimit::disable())
                .layer(RequestBodyLimitLayer::new(limit))
        }
        None => router.layer(DefaultBodyLimit::disable()),
    };

    // Order of execution: TraceLayer -> Auth -> Handler
    router
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
