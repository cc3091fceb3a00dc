use bcrypt::{hash, verify};
use chrono::{Duration, Utc};
use jsonwebtoken::{EncodingKey, Header, encode};
use sea_orm::{DatabaseConnection, DbErr, SqlErr};
use tracing::info;
use validator::Validate;

use crate::db::entities::user;
use crate::db::services::{UserChanges, user_service};
use crate::web::error::AppError;
use crate::web::models::{
    Claims, RegisterRequest, TokenRequest, TokenResponse, UpdateProfileRequest,
};

/// Lowercases the domain part of an email; the local part is kept as typed.
pub fn normalize_email(email: &str) -> String {
    let email = email.trim();
    match email.rsplit_once('@') {
        Some((local, domain)) => format!("{local}@{}", domain.to_lowercase()),
        None => email.to_string(),
    }
}

const MIN_PASSWORD_LENGTH: usize = 5;

fn email_taken() -> AppError {
    AppError::field("email", "unique", "A user with this email already exists.")
}

fn map_user_write_error(e: DbErr) -> AppError {
    match e.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(_)) => email_taken(),
        _ => AppError::DatabaseError(format!("Failed to save user: {e}")),
    }
}

fn hash_password(password: &str, cost: u32) -> Result<String, AppError> {
    hash(password, cost)
        .map_err(|e| AppError::PasswordHashingError(format!("Password hashing failed: {e}")))
}

pub async fn register_user(
    pool: &DatabaseConnection,
    req: RegisterRequest,
    bcrypt_cost: u32,
) -> Result<user::Model, AppError> {
    req.validate()?;
    let email = normalize_email(&req.email);

    if user_service::get_user_by_email(pool, &email).await?.is_some() {
        return Err(email_taken());
    }

    let password_hash = hash_password(&req.password, bcrypt_cost)?;
    let user = user_service::create_user(pool, &email, &password_hash, req.name.trim(), false)
        .await
        .map_err(map_user_write_error)?;

    info!(user_id = user.id, "User registered.");
    Ok(user)
}

/// Checks an email/password pair. Unknown emails, wrong passwords and
/// inactive accounts are indistinguishable to the caller.
pub async fn authenticate(
    pool: &DatabaseConnection,
    email: &str,
    password: &str,
) -> Result<user::Model, AppError> {
    if email.trim().is_empty() || password.is_empty() {
        return Err(AppError::InvalidCredentials);
    }

    let user = user_service::get_user_by_email(pool, &normalize_email(email))
        .await?
        .ok_or(AppError::InvalidCredentials)?;

    let valid_password = verify(password, &user.password_hash)
        .map_err(|e| AppError::InternalServerError(format!("Password verification failed: {e}")))?;

    if !valid_password || !user.is_active {
        return Err(AppError::InvalidCredentials);
    }
    Ok(user)
}

pub async fn login_user(
    pool: &DatabaseConnection,
    req: TokenRequest,
    jwt_secret: &str,
    token_ttl_hours: i64,
) -> Result<TokenResponse, AppError> {
    let user = authenticate(pool, &req.email, &req.password).await?;
    let token = create_jwt_for_user(&user, jwt_secret, token_ttl_hours)?;
    Ok(TokenResponse { token })
}

pub fn create_jwt_for_user(
    user: &user::Model,
    jwt_secret: &str,
    token_ttl_hours: i64,
) -> Result<String, AppError> {
    let expiration = Duration::try_hours(token_ttl_hours)
        .and_then(|ttl| Utc::now().checked_add_signed(ttl))
        .ok_or_else(|| {
            let message = format!("Token lifetime of {token_ttl_hours}h is out of range");
            AppError::TokenCreationError(message)
        })?
        .timestamp() as usize;

    let claims = Claims {
        sub: user.email.clone(),
        user_id: user.id,
        exp: expiration,
    };

    encode(&Header::default(), &claims, &EncodingKey::from_secret(jwt_secret.as_ref()))
        .map_err(|e| AppError::TokenCreationError(format!("Failed to sign token: {e}")))
}

pub async fn update_profile(
    pool: &DatabaseConnection,
    user_id: i32,
    req: UpdateProfileRequest,
    bcrypt_cost: u32,
) -> Result<user::Model, AppError> {
    req.validate()?;

    let current = user_service::get_user_by_id(pool, user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    let email = req.email.as_deref().map(normalize_email);
    if let Some(email) = email.as_deref() {
        if email != current.email {
            if user_service::get_user_by_email(pool, email).await?.is_some() {
                return Err(email_taken());
            }
        }
    }

    let password_hash = match req.password.as_deref() {
        Some(password) => Some(hash_password(password, bcrypt_cost)?),
        None => None,
    };

    let changes = UserChanges {
        email,
        name: req.name.map(|n| n.trim().to_string()),
        password_hash,
    };
    let updated = user_service::update_user(pool, current, changes)
        .await
        .map_err(map_user_write_error)?;

    info!(user_id, "Profile updated.");
    Ok(updated)
}

/// Creates an active staff account. Used by the `create-superuser` command.
pub async fn create_superuser(
    pool: &DatabaseConnection,
    email: &str,
    password: &str,
    bcrypt_cost: u32,
) -> Result<user::Model, AppError> {
    if email.trim().is_empty() {
        return Err(AppError::field("email", "required", "This field is required."));
    }
    if password.is_empty() {
        return Err(AppError::field("password", "required", "This field is required."));
    }
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(AppError::field(
            "password",
            "min_length",
            "Ensure this field has at least 5 characters.",
        ));
    }

    let email = normalize_email(email);
    if user_service::get_user_by_email(pool, &email).await?.is_some() {
        return Err(email_taken());
    }

    let password_hash = hash_password(password, bcrypt_cost)?;
    let user = user_service::create_user(pool, &email, &password_hash, "", true)
        .await
        .map_err(map_user_write_error)?;

    info!(user_id = user.id, "Superuser created.");
    Ok(user)
}
