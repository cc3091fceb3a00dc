use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::db::entities::user;

pub mod recipe_models;

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(email(message = "Enter a valid email address."), length(max = 255))]
    pub email: String,
    #[validate(length(min = 5, message = "Ensure this field has at least 5 characters."))]
    pub password: String,
    #[serde(default)]
    #[validate(length(max = 255))]
    pub name: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenRequest {
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub token: String,
}

/// PATCH body for `/api/users/me`; every field is optional.
#[derive(Debug, Default, Serialize, Deserialize, Validate)]
pub struct UpdateProfileRequest {
    #[validate(email(message = "Enter a valid email address."), length(max = 255))]
    pub email: Option<String>,
    #[validate(length(min = 5, message = "Ensure this field has at least 5 characters."))]
    pub password: Option<String>,
    #[validate(length(max = 255))]
    pub name: Option<String>,
}

/// Public view of a user. The password hash never leaves the server.
#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct UserResponse {
    pub email: String,
    pub name: String,
}

impl From<&user::Model> for UserResponse {
    fn from(user: &user::Model) -> Self {
        Self {
            email: user.email.clone(),
            name: user.name.clone(),
        }
    }
}

// JWT Claims structure
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // email
    pub user_id: i32,
    pub exp: usize,
}

/// Struct to hold authenticated user details, to be passed as a request extension.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub id: i32,
    pub email: String,
}
