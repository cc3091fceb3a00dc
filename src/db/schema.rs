//! Table bootstrap from the entity definitions.

use sea_orm::sea_query::Index;
use sea_orm::{ConnectionTrait, DbErr, EntityTrait, Schema};
use tracing::info;

use crate::db::entities::{label, recipe, recipe_label, user};

pub const LABEL_UNIQUE_INDEX: &str = "idx_labels_user_kind_name";

/// Creates every table and index the services rely on. Safe to run against an
/// already initialised database.
pub async fn create_tables<C: ConnectionTrait>(db: &C) -> Result<(), DbErr> {
    let backend = db.get_database_backend();
    let schema = Schema::new(backend);

    // Parents before children so foreign keys resolve on Postgres.
    create_table(db, &schema, user::Entity).await?;
    create_table(db, &schema, label::Entity).await?;
    create_table(db, &schema, recipe::Entity).await?;
    create_table(db, &schema, recipe_label::Entity).await?;

    let label_index = Index::create()
        .name(LABEL_UNIQUE_INDEX)
        .table(label::Entity)
        .col(label::Column::UserId)
        .col(label::Column::Kind)
        .col(label::Column::Name)
        .unique()
        .if_not_exists()
        .to_owned();
    db.execute(backend.build(&label_index)).await?;

    info!(backend = ?backend, "Database schema is up to date.");
    Ok(())
}

async fn create_table<C, E>(db: &C, schema: &Schema, entity: E) -> Result<(), DbErr>
where
    C: ConnectionTrait,
    E: EntityTrait,
{
    let mut stmt = schema.create_table_from_entity(entity);
    stmt.if_not_exists();
    db.execute(db.get_database_backend().build(&stmt)).await?;
    Ok(())
}
