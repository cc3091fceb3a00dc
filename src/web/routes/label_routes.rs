//! Registry endpoints for one label kind. The same router serves
//! `/api/tags` and `/api/ingredients`; the kind arrives as an extension.

use axum::{
    Json, Router,
    extract::{Extension, Path, State},
    http::StatusCode,
    routing::{get, put},
};
use std::sync::Arc;

use crate::db::entities::label::LabelKind;
use crate::db::services as db_services;
use crate::web::extract::{AppJson, AppQuery};
use crate::web::models::AuthenticatedUser;
use crate::web::models::recipe_models::{LabelListQuery, LabelPayload, LabelResponse};
use crate::web::{AppError, AppState};

pub fn create_label_router(kind: LabelKind) -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_labels))
        .route("/{id}", put(rename_label).patch(rename_label).delete(delete_label))
        .layer(Extension(kind))
}

async fn list_labels(
    State(app_state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
    Extension(kind): Extension<LabelKind>,
    AppQuery(query): AppQuery<LabelListQuery>,
) -> Result<Json<Vec<LabelResponse>>, AppError> {
    let labels = db_services::list_labels(
        &app_state.db_pool,
        user.id,
        kind,
        query.assigned_only(),
    )
    .await?;
    Ok(Json(labels.iter().map(LabelResponse::from).collect()))
}

async fn rename_label(
    State(app_state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
    Extension(kind): Extension<LabelKind>,
    Path(id): Path<i32>,
    AppJson(payload): AppJson<LabelPayload>,
) -> Result<Json<LabelResponse>, AppError> {
    let name = payload.validated_name()?;
    let label = db_services::rename_label(&app_state.db_pool, user.id, kind, id, &name).await?;
    Ok(Json(LabelResponse::from(&label)))
}

async fn delete_label(
    State(app_state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
    Extension(kind): Extension<LabelKind>,
    Path(id): Path<i32>,
) -> Result<StatusCode, AppError> {
    db_services::delete_label(&app_state.db_pool, user.id, kind, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
