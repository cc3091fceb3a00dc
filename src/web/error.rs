use axum::{
    Json,
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::error;
use validator::ValidationErrors;

use crate::db::services::{LabelServiceError, RecipeServiceError};

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Validation failed: {0}")]
    Validation(ValidationErrors),
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("Password hashing failed: {0}")]
    PasswordHashingError(String),
    #[error("JWT creation failed: {0}")]
    TokenCreationError(String),
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Internal server error: {0}")]
    InternalServerError(String),
    #[error("Not Found: {0}")]
    NotFound(String),
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
}

impl AppError {
    /// A validation failure on a single field.
    pub fn field(field: &'static str, code: &'static str, message: &'static str) -> Self {
        let mut error = validator::ValidationError::new(code);
        error.message = Some(message.into());
        let mut errors = ValidationErrors::new();
        errors.add(field, error);
        AppError::Validation(errors)
    }
}

fn field_messages(errors: &ValidationErrors) -> BTreeMap<String, Vec<String>> {
    errors
        .field_errors()
        .into_iter()
        .map(|(field, errs)| {
            let messages = errs
                .iter()
                .map(|e| match &e.message {
                    Some(message) => message.to_string(),
                    None => e.code.to_string(),
                })
                .collect();
            (field.to_string(), messages)
        })
        .collect()
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::Validation(errors) => {
                let body = serde_json::json!({
                    "error": "Validation failed",
                    "fields": field_messages(&errors),
                });
                return (StatusCode::BAD_REQUEST, Json(body)).into_response();
            }
            AppError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::InvalidCredentials => (
                StatusCode::BAD_REQUEST,
                "Unable to authenticate with provided credentials.".to_string(),
            ),
            AppError::PasswordHashingError(msg)
            | AppError::TokenCreationError(msg)
            | AppError::DatabaseError(msg)
            | AppError::InternalServerError(msg) => {
                error!(error = %msg, "Request failed with an internal error.");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
        };
        (status, Json(serde_json::json!({ "error": error_message }))).into_response()
    }
}

impl From<sea_orm::DbErr> for AppError {
    fn from(err: sea_orm::DbErr) -> Self {
        AppError::DatabaseError(err.to_string())
    }
}

impl From<ValidationErrors> for AppError {
    fn from(errors: ValidationErrors) -> Self {
        AppError::Validation(errors)
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::InvalidInput(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::InvalidInput(rejection.body_text())
    }
}

// Another owner's recipe or label is reported exactly like a missing one.
impl From<RecipeServiceError> for AppError {
    fn from(err: RecipeServiceError) -> Self {
        match err {
            RecipeServiceError::DbErr(e) => AppError::DatabaseError(e.to_string()),
            RecipeServiceError::NotFound(_) | RecipeServiceError::NotOwner(_) => {
                AppError::NotFound("Recipe not found".to_string())
            }
        }
    }
}

impl From<LabelServiceError> for AppError {
    fn from(err: LabelServiceError) -> Self {
        match err {
            LabelServiceError::DbErr(e) => AppError::DatabaseError(e.to_string()),
            LabelServiceError::NotFound(kind, _) => AppError::NotFound(format!("{kind} not found")),
            LabelServiceError::DuplicateName(_, _) => {
                AppError::field("name", "unique", "A label with this name already exists.")
            }
        }
    }
}
