//! Fixtures shared by the in-crate test modules: an in-memory database with
//! the production schema, seeded rows and a router wired to both.

use axum::{
    Router,
    body::Body,
    http::{Request, Response, header},
};
use http_body_util::BodyExt;
use rust_decimal::Decimal;
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use std::sync::Arc;
use tower::ServiceExt;

use crate::db::entities::{recipe, user};
use crate::db::schema;
use crate::db::services::{LabelNames, NewRecipe, create_recipe, create_user};
use crate::server::config::{MIN_BCRYPT_COST, ServerConfig};
use crate::services::auth_service;
use crate::web::create_axum_router;

pub const TEST_PASSWORD: &str = "testpass123";

pub async fn setup_db() -> DatabaseConnection {
    // One connection, kept open, so every query sees the same in-memory database.
    let mut opt = ConnectOptions::new("sqlite::memory:");
    opt.max_connections(1).min_connections(1).sqlx_logging(false);
    let db = Database::connect(opt).await.unwrap();
    schema::create_tables(&db).await.unwrap();
    db
}

pub fn test_config() -> ServerConfig {
    ServerConfig {
        database_url: "sqlite::memory:".to_string(),
        jwt_secret: "test-secret".to_string(),
        listen_addr: "127.0.0.1:0".to_string(),
        log_dir: "logs".to_string(),
        token_ttl_hours: 1,
        bcrypt_cost: MIN_BCRYPT_COST,
        max_db_connections: 1,
    }
}

pub async fn create_test_user(db: &DatabaseConnection, email: &str) -> user::Model {
    let hash = bcrypt::hash(TEST_PASSWORD, MIN_BCRYPT_COST).unwrap();
    create_user(db, email, &hash, "Test Name", false).await.unwrap()
}

pub async fn create_test_recipe(
    db: &DatabaseConnection,
    user_id: i32,
    title: &str,
) -> recipe::Model {
    let new_recipe = NewRecipe {
        title: title.to_string(),
        time_minutes: 22,
        price: Decimal::new(525, 2),
        link: Some("https://example.com/recipe.pdf".to_string()),
        description: Some("Sample description".to_string()),
    };
    create_recipe(db, user_id, new_recipe, LabelNames::default())
        .await
        .unwrap()
}

pub fn test_app(db: &DatabaseConnection) -> Router {
    create_axum_router(db.clone(), Arc::new(test_config()))
}

pub fn token_for(user: &user::Model) -> String {
    let config = test_config();
    auth_service::create_jwt_for_user(user, &config.jwt_secret, config.token_ttl_hours).unwrap()
}

/// Sends one request through the router. `token` becomes a Bearer header,
/// `body` is sent as JSON.
pub async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<serde_json::Value>,
) -> Response<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let request = match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    app.clone().oneshot(request).await.unwrap()
}

pub async fn json_body(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    if bytes.is_empty() {
        return serde_json::Value::Null;
    }
    serde_json::from_slice(&bytes).unwrap()
}
