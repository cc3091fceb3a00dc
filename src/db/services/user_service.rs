use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, IntoActiveModel,
    QueryFilter, Set,
};

use crate::db::entities::user;

/// Profile columns to overwrite; `None` keeps the stored value.
#[derive(Debug, Clone, Default)]
pub struct UserChanges {
    pub email: Option<String>,
    pub name: Option<String>,
    pub password_hash: Option<String>,
}

/// Creates a new user.
pub async fn create_user(
    db: &DatabaseConnection,
    email: &str,
    password_hash: &str,
    name: &str,
    is_staff: bool,
) -> Result<user::Model, DbErr> {
    let now = Utc::now();
    let new_user = user::ActiveModel {
        email: Set(email.to_owned()),
        password_hash: Set(password_hash.to_owned()),
        name: Set(name.to_owned()),
        is_active: Set(true),
        is_staff: Set(is_staff),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    };
    new_user.insert(db).await
}

/// Retrieves a user by their ID.
pub async fn get_user_by_id(
    db: &DatabaseConnection,
    user_id: i32,
) -> Result<Option<user::Model>, DbErr> {
    user::Entity::find_by_id(user_id).one(db).await
}

/// Retrieves a user by their email.
pub async fn get_user_by_email(
    db: &DatabaseConnection,
    email: &str,
) -> Result<Option<user::Model>, DbErr> {
    user::Entity::find()
        .filter(user::Column::Email.eq(email))
        .one(db)
        .await
}

pub async fn update_user(
    db: &DatabaseConnection,
    user_model: user::Model,
    changes: UserChanges,
) -> Result<user::Model, DbErr> {
    let mut active = user_model.into_active_model();
    if let Some(email) = changes.email {
        active.email = Set(email);
    }
    if let Some(name) = changes.name {
        active.name = Set(name);
    }
    if let Some(password_hash) = changes.password_hash {
        active.password_hash = Set(password_hash);
    }
    active.updated_at = Set(Utc::now());
    active.update(db).await
}
