use axum::{
    Router,
    http::{Method, header},
    middleware as axum_middleware,
    routing::get,
};
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::db::entities::label::LabelKind;
use crate::server::config::ServerConfig;
use crate::web::{
    middleware::auth,
    routes::*,
};

pub mod error;
pub mod extract;
pub mod middleware;
pub mod models;
pub mod routes;

pub use error::AppError;

#[derive(Clone)]
pub struct AppState {
    pub db_pool: DatabaseConnection,
    pub config: Arc<ServerConfig>,
}

async fn health_check_handler() -> &'static str {
    "OK"
}

pub fn create_axum_router(db_pool: DatabaseConnection, config: Arc<ServerConfig>) -> Router {
    let app_state = Arc::new(AppState { db_pool, config });

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(vec![
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    let require_auth = || axum_middleware::from_fn_with_state(app_state.clone(), auth::auth);

    Router::new()
        .route("/api/health", get(health_check_handler))
        .nest(
            "/api/users",
            user_routes::create_public_router()
                .merge(user_routes::create_protected_router().route_layer(require_auth())),
        )
        .nest(
            "/api/recipes",
            recipe_routes::create_recipe_router().route_layer(require_auth()),
        )
        .nest(
            "/api/tags",
            label_routes::create_label_router(LabelKind::Tag).route_layer(require_auth()),
        )
        .nest(
            "/api/ingredients",
            label_routes::create_label_router(LabelKind::Ingredient).route_layer(require_auth()),
        )
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(app_state)
}
