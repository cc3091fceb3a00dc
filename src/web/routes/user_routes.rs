use axum::{
    Json, Router,
    extract::{Extension, State},
    http::StatusCode,
    routing::{get, post},
};
use std::sync::Arc;

use crate::services::auth_service;
use crate::web::extract::AppJson;
use crate::web::models::{
    AuthenticatedUser, RegisterRequest, TokenRequest, TokenResponse, UpdateProfileRequest,
    UserResponse,
};
use crate::web::{AppError, AppState};

pub fn create_public_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", post(register_handler))
        .route("/token", post(token_handler))
}

pub fn create_protected_router() -> Router<Arc<AppState>> {
    Router::new().route("/me", get(me_handler).patch(update_me_handler))
}

async fn register_handler(
    State(app_state): State<Arc<AppState>>,
    AppJson(payload): AppJson<RegisterRequest>,
) -> Result<(StatusCode, Json<UserResponse>), AppError> {
    let user = auth_service::register_user(
        &app_state.db_pool,
        payload,
        app_state.config.bcrypt_cost,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(UserResponse::from(&user))))
}

async fn token_handler(
    State(app_state): State<Arc<AppState>>,
    AppJson(payload): AppJson<TokenRequest>,
) -> Result<Json<TokenResponse>, AppError> {
    let response = auth_service::login_user(
        &app_state.db_pool,
        payload,
        &app_state.config.jwt_secret,
        app_state.config.token_ttl_hours,
    )
    .await?;
    Ok(Json(response))
}

async fn me_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
) -> Result<Json<UserResponse>, AppError> {
    let model = crate::db::services::get_user_by_id(&app_state.db_pool, user.id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;
    Ok(Json(UserResponse::from(&model)))
}

async fn update_me_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
    AppJson(payload): AppJson<UpdateProfileRequest>,
) -> Result<Json<UserResponse>, AppError> {
    let updated = auth_service::update_profile(
        &app_state.db_pool,
        user.id,
        payload,
        app_state.config.bcrypt_cost,
    )
    .await?;
    Ok(Json(UserResponse::from(&updated)))
}
