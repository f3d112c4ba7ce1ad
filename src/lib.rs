use axum::{
    http::{header, Method},
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub mod config;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod metrics;
pub mod middlewares;
pub mod models;
pub mod services;
pub mod utils;

pub use config::Config;
pub use error::EngineError;
pub use services::AppState;

pub fn create_router(app_state: std::sync::Arc<services::AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_origin(tower_http::cors::Any);

    Router::new()
        .route("/health", get(handlers::health_check))
        .route(
            "/metrics",
            get(handlers::metrics_handler)
                .layer(middleware::from_fn(handlers::metrics_auth_middleware)),
        )
        .nest("/api/v1/professions", profession_routes(app_state.clone()))
        .nest("/api/v1/tasks", task_routes(app_state.clone()))
        .nest("/api/v1/payments", payment_routes(app_state.clone()))
        .with_state(app_state)
        .layer(cors)
        .layer(middleware::from_fn(
            middlewares::metrics::metrics_middleware,
        ))
        .layer(TraceLayer::new_for_http())
}

fn profession_routes(
    app_state: std::sync::Arc<services::AppState>,
) -> Router<std::sync::Arc<services::AppState>> {
    // The catalog is browsable before login; everything touching attempts
    // requires a JWT.
    let public_routes = Router::new()
        .route("/", get(handlers::professions::list_professions))
        .route("/{id}", get(handlers::professions::get_profession));

    let protected_routes = Router::new()
        .route("/{id}/progress", get(handlers::professions::get_progress))
        .route("/{id}/attempts", get(handlers::professions::get_history))
        .route(
            "/{id}/attempts/{number}",
            get(handlers::professions::get_attempt),
        )
        .route("/{id}/restart", post(handlers::professions::restart_attempt))
        .route_layer(middleware::from_fn_with_state(
            app_state,
            middlewares::auth::auth_middleware,
        ));

    public_routes.merge(protected_routes)
}

fn task_routes(
    app_state: std::sync::Arc<services::AppState>,
) -> Router<std::sync::Arc<services::AppState>> {
    // Current and report are addressed by profession, submit by task; the
    // shared segment uses one parameter name so the routes can coexist.
    Router::new()
        .route("/{id}/current", get(handlers::tasks::get_current_task))
        .route("/{id}/submit", post(handlers::tasks::submit_answer))
        .route("/{id}/report", get(handlers::tasks::get_report))
        .route_layer(middleware::from_fn_with_state(
            app_state,
            middlewares::auth::auth_middleware,
        ))
}

fn payment_routes(
    app_state: std::sync::Arc<services::AppState>,
) -> Router<std::sync::Arc<services::AppState>> {
    // The provider webhook authenticates by payload, not JWT.
    let public_routes = Router::new().route("/webhook", post(handlers::payments::webhook));

    let protected_routes = Router::new()
        .route("/", post(handlers::payments::create_payment))
        .route("/packages", get(handlers::payments::list_packages))
        .route("/history", get(handlers::payments::payment_history))
        .route("/{id}/confirm", post(handlers::payments::confirm_payment))
        .route_layer(middleware::from_fn_with_state(
            app_state,
            middlewares::auth::auth_middleware,
        ));

    public_routes.merge(protected_routes)
}
