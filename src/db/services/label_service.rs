use chrono::Utc;
use sea_orm::sea_query::{OnConflict, Query};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait,
    IntoActiveModel, QueryFilter, QueryOrder, QuerySelect, RelationTrait, Set, TransactionTrait,
};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

use crate::db::entities::label::{self, LabelKind};
use crate::db::entities::recipe_label;

#[derive(Debug, thiserror::Error)]
pub enum LabelServiceError {
    #[error("Database error: {0}")]
    DbErr(#[from] DbErr),
    #[error("{0} {1} not found")]
    NotFound(LabelKind, i32),
    #[error("A {0} named '{1}' already exists.")]
    DuplicateName(LabelKind, String),
}

/// What a single reconciliation did to one recipe's relation set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileOutcome {
    /// Distinct label ids the recipe is now linked to, in first-requested order.
    pub resolved: Vec<i32>,
    pub created: usize,
    pub linked: usize,
    pub unlinked: usize,
}

async fn find_label<C: ConnectionTrait>(
    db: &C,
    user_id: i32,
    kind: LabelKind,
    name: &str,
) -> Result<Option<label::Model>, DbErr> {
    label::Entity::find()
        .filter(label::Column::UserId.eq(user_id))
        .filter(label::Column::Kind.eq(kind))
        .filter(label::Column::Name.eq(name))
        .one(db)
        .await
}

/// Returns the owner's label with this name, inserting it first when missing.
/// The boolean is `true` when this call created the row.
///
/// The insert tolerates a concurrent writer: a conflict on the
/// `(user_id, kind, name)` index is ignored and the surviving row is re-read.
pub async fn get_or_create_label<C: ConnectionTrait>(
    db: &C,
    user_id: i32,
    kind: LabelKind,
    name: &str,
) -> Result<(label::Model, bool), DbErr> {
    if let Some(existing) = find_label(db, user_id, kind, name).await? {
        return Ok((existing, false));
    }

    let now = Utc::now();
    let new_label = label::ActiveModel {
        user_id: Set(user_id),
        kind: Set(kind),
        name: Set(name.to_owned()),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    };
    let rows_inserted = label::Entity::insert(new_label)
        .on_conflict(
            OnConflict::columns([
                label::Column::UserId,
                label::Column::Kind,
                label::Column::Name,
            ])
            .do_nothing()
            .to_owned(),
        )
        .exec_without_returning(db)
        .await?;

    match find_label(db, user_id, kind, name).await? {
        Some(label_model) => {
            if rows_inserted == 0 {
                debug!(user_id, %kind, name, "Label was created concurrently, reusing it.");
            }
            Ok((label_model, rows_inserted > 0))
        }
        None => Err(DbErr::RecordNotFound(format!(
            "{kind} '{name}' vanished right after insert"
        ))),
    }
}

/// Ids of the labels of `kind` currently linked to the recipe.
async fn linked_label_ids<C: ConnectionTrait>(
    db: &C,
    recipe_id: i32,
    kind: LabelKind,
) -> Result<HashSet<i32>, DbErr> {
    let links = recipe_label::Entity::find()
        .join(
            sea_orm::JoinType::InnerJoin,
            recipe_label::Relation::Label.def(),
        )
        .filter(recipe_label::Column::RecipeId.eq(recipe_id))
        .filter(label::Column::Kind.eq(kind))
        .all(db)
        .await?;
    Ok(links.into_iter().map(|link| link.label_id).collect())
}

/// Makes the recipe's `kind` relations exactly the labels named in
/// `requested_names`, resolved under `user_id`.
///
/// Names are resolved in order with get-or-create; duplicates collapse onto
/// one label. Links outside the resolved set are removed, missing ones are
/// added, and labels themselves are never deleted. Relations of the other
/// kind are not touched. Run this inside the caller's transaction.
pub async fn reconcile_labels<C: ConnectionTrait>(
    db: &C,
    user_id: i32,
    recipe_id: i32,
    kind: LabelKind,
    requested_names: &[String],
) -> Result<ReconcileOutcome, DbErr> {
    let mut outcome = ReconcileOutcome::default();

    for name in requested_names {
        let (label_model, created) = get_or_create_label(db, user_id, kind, name).await?;
        if created {
            outcome.created += 1;
        }
        if !outcome.resolved.contains(&label_model.id) {
            outcome.resolved.push(label_model.id);
        }
    }

    let current = linked_label_ids(db, recipe_id, kind).await?;
    let wanted: HashSet<i32> = outcome.resolved.iter().copied().collect();

    let stale: Vec<i32> = current.difference(&wanted).copied().collect();
    if !stale.is_empty() {
        let result = recipe_label::Entity::delete_many()
            .filter(recipe_label::Column::RecipeId.eq(recipe_id))
            .filter(recipe_label::Column::LabelId.is_in(stale))
            .exec(db)
            .await?;
        outcome.unlinked = result.rows_affected as usize;
    }

    let fresh: Vec<recipe_label::ActiveModel> = outcome
        .resolved
        .iter()
        .filter(|label_id| !current.contains(label_id))
        .map(|&label_id| recipe_label::ActiveModel {
            recipe_id: Set(recipe_id),
            label_id: Set(label_id),
        })
        .collect();
    if !fresh.is_empty() {
        outcome.linked = fresh.len();
        recipe_label::Entity::insert_many(fresh)
            .exec_without_returning(db)
            .await?;
    }

    Ok(outcome)
}

/// Labels linked to each of the given recipes, both kinds, ordered by id.
pub async fn labels_for_recipes<C: ConnectionTrait>(
    db: &C,
    recipe_ids: &[i32],
) -> Result<HashMap<i32, Vec<label::Model>>, DbErr> {
    let mut grouped: HashMap<i32, Vec<label::Model>> = HashMap::new();
    if recipe_ids.is_empty() {
        return Ok(grouped);
    }

    let rows = recipe_label::Entity::find()
        .filter(recipe_label::Column::RecipeId.is_in(recipe_ids.to_vec()))
        .find_also_related(label::Entity)
        .all(db)
        .await?;

    for (link, label_model) in rows {
        if let Some(label_model) = label_model {
            grouped.entry(link.recipe_id).or_default().push(label_model);
        }
    }
    for labels in grouped.values_mut() {
        labels.sort_by_key(|l| l.id);
    }
    Ok(grouped)
}

/// Lists the owner's labels of one kind, name descending. With
/// `assigned_only` only labels linked to at least one recipe are returned.
pub async fn list_labels(
    db: &DatabaseConnection,
    user_id: i32,
    kind: LabelKind,
    assigned_only: bool,
) -> Result<Vec<label::Model>, LabelServiceError> {
    let mut query = label::Entity::find()
        .filter(label::Column::UserId.eq(user_id))
        .filter(label::Column::Kind.eq(kind));

    if assigned_only {
        query = query.filter(
            label::Column::Id.in_subquery(
                Query::select()
                    .column(recipe_label::Column::LabelId)
                    .from(recipe_label::Entity)
                    .to_owned(),
            ),
        );
    }

    Ok(query
        .order_by_desc(label::Column::Name)
        .order_by_desc(label::Column::Id)
        .all(db)
        .await?)
}

async fn find_owned_label<C: ConnectionTrait>(
    db: &C,
    user_id: i32,
    kind: LabelKind,
    label_id: i32,
) -> Result<label::Model, LabelServiceError> {
    label::Entity::find_by_id(label_id)
        .filter(label::Column::UserId.eq(user_id))
        .filter(label::Column::Kind.eq(kind))
        .one(db)
        .await?
        .ok_or(LabelServiceError::NotFound(kind, label_id))
}

pub async fn rename_label(
    db: &DatabaseConnection,
    user_id: i32,
    kind: LabelKind,
    label_id: i32,
    name: &str,
) -> Result<label::Model, LabelServiceError> {
    let existing = find_owned_label(db, user_id, kind, label_id).await?;
    if existing.name == name {
        return Ok(existing);
    }

    if find_label(db, user_id, kind, name).await?.is_some() {
        return Err(LabelServiceError::DuplicateName(kind, name.to_owned()));
    }

    let mut active = existing.into_active_model();
    active.name = Set(name.to_owned());
    active.updated_at = Set(Utc::now());
    let updated = active.update(db).await.map_err(|e| match e.sql_err() {
        Some(sea_orm::SqlErr::UniqueConstraintViolation(_)) => {
            LabelServiceError::DuplicateName(kind, name.to_owned())
        }
        _ => LabelServiceError::DbErr(e),
    })?;

    info!(user_id, label_id, %kind, "Label renamed.");
    Ok(updated)
}

/// Unlinks the label from every recipe and removes it.
pub async fn delete_label(
    db: &DatabaseConnection,
    user_id: i32,
    kind: LabelKind,
    label_id: i32,
) -> Result<(), LabelServiceError> {
    let txn = db.begin().await?;
    let existing = find_owned_label(&txn, user_id, kind, label_id).await?;

    recipe_label::Entity::delete_many()
        .filter(recipe_label::Column::LabelId.eq(existing.id))
        .exec(&txn)
        .await?;
    label::Entity::delete_by_id(existing.id).exec(&txn).await?;
    txn.commit().await?;

    info!(user_id, label_id, %kind, "Label deleted.");
    Ok(())
}
