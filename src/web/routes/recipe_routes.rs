use axum::{
    Json, Router,
    extract::{Extension, Path, State},
    http::StatusCode,
    routing::get,
};
use std::sync::Arc;

use crate::db::services as db_services;
use crate::web::extract::{AppJson, AppQuery};
use crate::web::models::AuthenticatedUser;
use crate::web::models::recipe_models::{
    RecipeDetailResponse, RecipeListQuery, RecipePayload, RecipeResponse, WriteMode, project_recipe,
    project_recipe_detail,
};
use crate::web::{AppError, AppState};

pub fn create_recipe_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_recipes).post(create_recipe))
        .route(
            "/{id}",
            get(get_recipe)
                .put(replace_recipe)
                .patch(patch_recipe)
                .delete(delete_recipe),
        )
}

async fn detail(
    app_state: &AppState,
    recipe_id: i32,
    user_id: i32,
) -> Result<RecipeDetailResponse, AppError> {
    let recipe = db_services::get_recipe(&app_state.db_pool, recipe_id, user_id).await?;
    let labels = db_services::labels_for_recipes(&app_state.db_pool, &[recipe.id]).await?;
    let recipe_labels = labels.get(&recipe.id).map(Vec::as_slice).unwrap_or_default();
    Ok(project_recipe_detail(&recipe, recipe_labels))
}

async fn list_recipes(
    State(app_state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
    AppQuery(query): AppQuery<RecipeListQuery>,
) -> Result<Json<Vec<RecipeResponse>>, AppError> {
    let filter = query.into_filter()?;
    let recipes = db_services::list_recipes(&app_state.db_pool, user.id, &filter).await?;

    let ids: Vec<i32> = recipes.iter().map(|r| r.id).collect();
    let labels = db_services::labels_for_recipes(&app_state.db_pool, &ids).await?;

    let response = recipes
        .iter()
        .map(|recipe| {
            let recipe_labels = labels.get(&recipe.id).map(Vec::as_slice).unwrap_or_default();
            project_recipe(recipe, recipe_labels)
        })
        .collect();
    Ok(Json(response))
}

async fn create_recipe(
    State(app_state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
    AppJson(payload): AppJson<RecipePayload>,
) -> Result<(StatusCode, Json<RecipeDetailResponse>), AppError> {
    let (new_recipe, labels) = payload.into_new_recipe()?;
    let recipe = db_services::create_recipe(&app_state.db_pool, user.id, new_recipe, labels).await?;
    let response = detail(&app_state, recipe.id, user.id).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

async fn get_recipe(
    State(app_state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(id): Path<i32>,
) -> Result<Json<RecipeDetailResponse>, AppError> {
    Ok(Json(detail(&app_state, id, user.id).await?))
}

async fn write_recipe(
    app_state: &AppState,
    user_id: i32,
    recipe_id: i32,
    payload: RecipePayload,
    mode: WriteMode,
) -> Result<Json<RecipeDetailResponse>, AppError> {
    let write = payload.into_write(mode)?;
    db_services::update_recipe(
        &app_state.db_pool,
        recipe_id,
        user_id,
        write.changes,
        write.labels,
    )
    .await?;
    Ok(Json(detail(app_state, recipe_id, user_id).await?))
}

async fn replace_recipe(
    State(app_state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(id): Path<i32>,
    AppJson(payload): AppJson<RecipePayload>,
) -> Result<Json<RecipeDetailResponse>, AppError> {
    write_recipe(&app_state, user.id, id, payload, WriteMode::Replace).await
}

async fn patch_recipe(
    State(app_state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(id): Path<i32>,
    AppJson(payload): AppJson<RecipePayload>,
) -> Result<Json<RecipeDetailResponse>, AppError> {
    write_recipe(&app_state, user.id, id, payload, WriteMode::Partial).await
}

async fn delete_recipe(
    State(app_state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(id): Path<i32>,
) -> Result<StatusCode, AppError> {
    db_services::delete_recipe(&app_state.db_pool, id, user.id).await?;
    Ok(StatusCode::NO_CONTENT)
}
