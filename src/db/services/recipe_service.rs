use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::sea_query::{Expr, Query, SelectStatement};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DatabaseTransaction, DbErr, EntityTrait,
    IntoActiveModel, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use tracing::{debug, info};

use crate::db::entities::label::{self, LabelKind};
use crate::db::entities::{recipe, recipe_label};
use crate::db::services::label_service;

#[derive(Debug, thiserror::Error)]
pub enum RecipeServiceError {
    #[error("Database error: {0}")]
    DbErr(#[from] DbErr),
    #[error("Recipe not found: {0}")]
    NotFound(i32),
    #[error("Recipe {0} belongs to another user")]
    NotOwner(i32),
}

/// Scalar fields of a recipe being created.
#[derive(Debug, Clone)]
pub struct NewRecipe {
    pub title: String,
    pub time_minutes: i32,
    pub price: Decimal,
    pub link: Option<String>,
    pub description: Option<String>,
}

/// Scalar fields to change on an existing recipe; `None` leaves a field as
/// it is.
#[derive(Debug, Clone, Default)]
pub struct RecipeChanges {
    pub title: Option<String>,
    pub time_minutes: Option<i32>,
    pub price: Option<Decimal>,
    pub link: Option<String>,
    pub description: Option<String>,
}

/// Label names embedded in a write. `None` means the field was absent and
/// the relations of that kind must stay untouched; `Some(vec![])` clears them.
#[derive(Debug, Clone, Default)]
pub struct LabelNames {
    pub tags: Option<Vec<String>>,
    pub ingredients: Option<Vec<String>>,
}

impl LabelNames {
    fn by_kind(self) -> [(LabelKind, Option<Vec<String>>); 2] {
        [
            (LabelKind::Tag, self.tags),
            (LabelKind::Ingredient, self.ingredients),
        ]
    }
}

/// Optional list filter: a recipe matches when it links at least one of the
/// given tag ids and at least one of the given ingredient ids.
#[derive(Debug, Clone, Default)]
pub struct RecipeFilter {
    pub tags: Option<Vec<i32>>,
    pub ingredients: Option<Vec<i32>>,
}

// Blank optional text is stored as NULL.
fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

async fn apply_label_names(
    txn: &DatabaseTransaction,
    user_id: i32,
    recipe_id: i32,
    labels: LabelNames,
) -> Result<(), DbErr> {
    for (kind, names) in labels.by_kind() {
        let Some(names) = names else { continue };
        let outcome = label_service::reconcile_labels(txn, user_id, recipe_id, kind, &names).await?;
        debug!(
            recipe_id,
            %kind,
            resolved = outcome.resolved.len(),
            created = outcome.created,
            linked = outcome.linked,
            unlinked = outcome.unlinked,
            "Reconciled recipe labels."
        );
    }
    Ok(())
}

/// Inserts the recipe and then links the embedded labels, all in one
/// transaction.
pub async fn create_recipe(
    db: &DatabaseConnection,
    user_id: i32,
    new_recipe: NewRecipe,
    labels: LabelNames,
) -> Result<recipe::Model, RecipeServiceError> {
    let txn = db.begin().await?;
    let now = Utc::now();

    let recipe_model = recipe::ActiveModel {
        user_id: Set(user_id),
        title: Set(new_recipe.title),
        time_minutes: Set(new_recipe.time_minutes),
        price: Set(new_recipe.price),
        link: Set(non_blank(new_recipe.link)),
        description: Set(non_blank(new_recipe.description)),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(&txn)
    .await?;

    apply_label_names(&txn, user_id, recipe_model.id, labels).await?;
    txn.commit().await?;

    info!(recipe_id = recipe_model.id, user_id, "Recipe created.");
    Ok(recipe_model)
}

/// Applies scalar changes and label lists to a recipe owned by `user_id`.
/// The owner itself is never changed.
pub async fn update_recipe(
    db: &DatabaseConnection,
    recipe_id: i32,
    user_id: i32,
    changes: RecipeChanges,
    labels: LabelNames,
) -> Result<recipe::Model, RecipeServiceError> {
    let txn = db.begin().await?;

    let existing = recipe::Entity::find_by_id(recipe_id)
        .one(&txn)
        .await?
        .ok_or(RecipeServiceError::NotFound(recipe_id))?;
    if existing.user_id != user_id {
        return Err(RecipeServiceError::NotOwner(recipe_id));
    }

    let mut active = existing.into_active_model();
    if let Some(title) = changes.title {
        active.title = Set(title);
    }
    if let Some(time_minutes) = changes.time_minutes {
        active.time_minutes = Set(time_minutes);
    }
    if let Some(price) = changes.price {
        active.price = Set(price);
    }
    if let Some(link) = changes.link {
        active.link = Set(non_blank(Some(link)));
    }
    if let Some(description) = changes.description {
        active.description = Set(non_blank(Some(description)));
    }
    active.updated_at = Set(Utc::now());
    let updated = active.update(&txn).await?;

    apply_label_names(&txn, user_id, recipe_id, labels).await?;
    txn.commit().await?;

    info!(recipe_id, user_id, "Recipe updated.");
    Ok(updated)
}

pub async fn delete_recipe(
    db: &DatabaseConnection,
    recipe_id: i32,
    user_id: i32,
) -> Result<(), RecipeServiceError> {
    let txn = db.begin().await?;

    let existing = recipe::Entity::find_by_id(recipe_id)
        .one(&txn)
        .await?
        .ok_or(RecipeServiceError::NotFound(recipe_id))?;
    if existing.user_id != user_id {
        return Err(RecipeServiceError::NotOwner(recipe_id));
    }

    recipe_label::Entity::delete_many()
        .filter(recipe_label::Column::RecipeId.eq(recipe_id))
        .exec(&txn)
        .await?;
    recipe::Entity::delete_by_id(recipe_id).exec(&txn).await?;
    txn.commit().await?;

    info!(recipe_id, user_id, "Recipe deleted.");
    Ok(())
}

pub async fn get_recipe(
    db: &DatabaseConnection,
    recipe_id: i32,
    user_id: i32,
) -> Result<recipe::Model, RecipeServiceError> {
    recipe::Entity::find_by_id(recipe_id)
        .filter(recipe::Column::UserId.eq(user_id))
        .one(db)
        .await?
        .ok_or(RecipeServiceError::NotFound(recipe_id))
}

// SELECT recipe_id of links to any of `label_ids` whose label is of `kind`.
fn recipes_linked_to(kind: LabelKind, label_ids: &[i32]) -> SelectStatement {
    Query::select()
        .column((recipe_label::Entity, recipe_label::Column::RecipeId))
        .from(recipe_label::Entity)
        .inner_join(
            label::Entity,
            Expr::col((label::Entity, label::Column::Id))
                .equals((recipe_label::Entity, recipe_label::Column::LabelId)),
        )
        .and_where(Expr::col((label::Entity, label::Column::Kind)).eq(kind))
        .and_where(
            Expr::col((recipe_label::Entity, recipe_label::Column::LabelId))
                .is_in(label_ids.iter().copied()),
        )
        .to_owned()
}

/// The owner's recipes, newest first.
pub async fn list_recipes(
    db: &DatabaseConnection,
    user_id: i32,
    filter: &RecipeFilter,
) -> Result<Vec<recipe::Model>, RecipeServiceError> {
    let mut query = recipe::Entity::find().filter(recipe::Column::UserId.eq(user_id));

    if let Some(tag_ids) = &filter.tags {
        query = query.filter(
            recipe::Column::Id.in_subquery(recipes_linked_to(LabelKind::Tag, tag_ids)),
        );
    }
    if let Some(ingredient_ids) = &filter.ingredients {
        query = query.filter(
            recipe::Column::Id.in_subquery(
                recipes_linked_to(LabelKind::Ingredient, ingredient_ids),
            ),
        );
    }

    Ok(query.order_by_desc(recipe::Column::Id).all(db).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::services::label_service::{get_or_create_label, labels_for_recipes};
    use crate::test_support::{create_test_recipe, create_test_user, setup_db};

    fn new_recipe(title: &str) -> NewRecipe {
        NewRecipe {
            title: title.to_string(),
            time_minutes: 30,
            price: Decimal::new(599, 2),
            link: None,
            description: None,
        }
    }

    fn names(values: &[&str]) -> Option<Vec<String>> {
        Some(values.iter().map(|v| v.to_string()).collect())
    }

    async fn label_names(db: &DatabaseConnection, recipe_id: i32, kind: LabelKind) -> Vec<String> {
        let mut found: Vec<String> = labels_for_recipes(db, &[recipe_id])
            .await
            .unwrap()
            .remove(&recipe_id)
            .unwrap_or_default()
            .into_iter()
            .filter(|l| l.kind == kind)
            .map(|l| l.name)
            .collect();
        found.sort();
        found
    }

    #[tokio::test]
    async fn test_create_recipe_with_tags_and_ingredients() {
        let db = setup_db().await;
        let user = create_test_user(&db, "cook@example.com").await;

        let created = create_recipe(
            &db,
            user.id,
            new_recipe("Cauliflower Tacos"),
            LabelNames {
                tags: names(&["Mexican"]),
                ingredients: names(&["Cauliflower", "Salt"]),
            },
        )
        .await
        .unwrap();

        assert_eq!(created.user_id, user.id);
        assert_eq!(created.price, Decimal::new(599, 2));
        assert_eq!(label_names(&db, created.id, LabelKind::Tag).await, vec!["Mexican"]);
        assert_eq!(
            label_names(&db, created.id, LabelKind::Ingredient).await,
            vec!["Cauliflower", "Salt"]
        );
    }

    #[tokio::test]
    async fn test_update_without_label_lists_keeps_relations() {
        let db = setup_db().await;
        let user = create_test_user(&db, "cook@example.com").await;
        let created = create_recipe(
            &db,
            user.id,
            new_recipe("Pancakes"),
            LabelNames { tags: names(&["Breakfast"]), ingredients: None },
        )
        .await
        .unwrap();

        let updated = update_recipe(
            &db,
            created.id,
            user.id,
            RecipeChanges { title: Some("Fluffy Pancakes".to_string()), ..Default::default() },
            LabelNames::default(),
        )
        .await
        .unwrap();

        assert_eq!(updated.title, "Fluffy Pancakes");
        assert_eq!(updated.time_minutes, 30);
        assert_eq!(label_names(&db, created.id, LabelKind::Tag).await, vec!["Breakfast"]);
    }

    #[tokio::test]
    async fn test_update_with_empty_tags_clears_them() {
        let db = setup_db().await;
        let user = create_test_user(&db, "cook@example.com").await;
        let created = create_recipe(
            &db,
            user.id,
            new_recipe("Sundae"),
            LabelNames { tags: names(&["Dessert"]), ingredients: names(&["Ice Cream"]) },
        )
        .await
        .unwrap();

        update_recipe(
            &db,
            created.id,
            user.id,
            RecipeChanges::default(),
            LabelNames { tags: Some(vec![]), ingredients: None },
        )
        .await
        .unwrap();

        assert!(label_names(&db, created.id, LabelKind::Tag).await.is_empty());
        assert_eq!(label_names(&db, created.id, LabelKind::Ingredient).await, vec!["Ice Cream"]);
        let dessert = get_or_create_label(&db, user.id, LabelKind::Tag, "Dessert").await.unwrap();
        assert!(!dessert.1, "label row must survive being unlinked");
    }

    #[tokio::test]
    async fn test_update_blank_link_clears_it() {
        let db = setup_db().await;
        let user = create_test_user(&db, "cook@example.com").await;
        let recipe = create_test_recipe(&db, user.id, "Toast").await;
        assert!(recipe.link.is_some());

        let updated = update_recipe(
            &db,
            recipe.id,
            user.id,
            RecipeChanges { link: Some(String::new()), ..Default::default() },
            LabelNames::default(),
        )
        .await
        .unwrap();

        assert_eq!(updated.link, None);
        assert_eq!(updated.description, recipe.description);
    }

    #[tokio::test]
    async fn test_update_and_delete_reject_other_owner() {
        let db = setup_db().await;
        let owner = create_test_user(&db, "owner@example.com").await;
        let intruder = create_test_user(&db, "intruder@example.com").await;
        let recipe = create_test_recipe(&db, owner.id, "Secret Sauce").await;

        let update = update_recipe(
            &db,
            recipe.id,
            intruder.id,
            RecipeChanges { title: Some("Stolen".to_string()), ..Default::default() },
            LabelNames::default(),
        )
        .await;
        assert!(matches!(update, Err(RecipeServiceError::NotOwner(id)) if id == recipe.id));

        let delete = delete_recipe(&db, recipe.id, intruder.id).await;
        assert!(matches!(delete, Err(RecipeServiceError::NotOwner(_))));

        let still_there = get_recipe(&db, recipe.id, owner.id).await.unwrap();
        assert_eq!(still_there.title, "Secret Sauce");
        assert!(matches!(
            get_recipe(&db, recipe.id, intruder.id).await,
            Err(RecipeServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_recipe_keeps_labels() {
        let db = setup_db().await;
        let user = create_test_user(&db, "cook@example.com").await;
        let created = create_recipe(
            &db,
            user.id,
            new_recipe("Curry"),
            LabelNames { tags: names(&["Indian"]), ingredients: None },
        )
        .await
        .unwrap();

        delete_recipe(&db, created.id, user.id).await.unwrap();

        assert!(matches!(
            get_recipe(&db, created.id, user.id).await,
            Err(RecipeServiceError::NotFound(_))
        ));
        assert!(labels_for_recipes(&db, &[created.id]).await.unwrap().is_empty());
        let (_, created_again) = get_or_create_label(&db, user.id, LabelKind::Tag, "Indian")
            .await
            .unwrap();
        assert!(!created_again);
    }

    #[tokio::test]
    async fn test_list_recipes_newest_first_and_scoped() {
        let db = setup_db().await;
        let user = create_test_user(&db, "cook@example.com").await;
        let other = create_test_user(&db, "other@example.com").await;
        let first = create_test_recipe(&db, user.id, "First").await;
        let second = create_test_recipe(&db, user.id, "Second").await;
        create_test_recipe(&db, other.id, "Foreign").await;

        let recipes = list_recipes(&db, user.id, &RecipeFilter::default()).await.unwrap();

        assert_eq!(recipes.iter().map(|r| r.id).collect::<Vec<_>>(), vec![second.id, first.id]);
    }

    #[tokio::test]
    async fn test_list_recipes_filtered_by_labels() {
        let db = setup_db().await;
        let user = create_test_user(&db, "cook@example.com").await;
        let curry = create_recipe(
            &db,
            user.id,
            new_recipe("Curry"),
            LabelNames { tags: names(&["Vegan"]), ingredients: names(&["Chickpeas"]) },
        )
        .await
        .unwrap();
        let tahini = create_recipe(
            &db,
            user.id,
            new_recipe("Aubergine with Tahini"),
            LabelNames { tags: names(&["Vegetarian"]), ingredients: names(&["Chickpeas"]) },
        )
        .await
        .unwrap();
        create_test_recipe(&db, user.id, "Fish and chips").await;

        let (vegan, _) = get_or_create_label(&db, user.id, LabelKind::Tag, "Vegan").await.unwrap();
        let (vegetarian, _) = get_or_create_label(&db, user.id, LabelKind::Tag, "Vegetarian")
            .await
            .unwrap();
        let (chickpeas, _) = get_or_create_label(&db, user.id, LabelKind::Ingredient, "Chickpeas")
            .await
            .unwrap();

        let by_tags = list_recipes(
            &db,
            user.id,
            &RecipeFilter { tags: Some(vec![vegan.id, vegetarian.id]), ingredients: None },
        )
        .await
        .unwrap();
        assert_eq!(by_tags.iter().map(|r| r.id).collect::<Vec<_>>(), vec![tahini.id, curry.id]);

        let combined = list_recipes(
            &db,
            user.id,
            &RecipeFilter { tags: Some(vec![vegan.id]), ingredients: Some(vec![chickpeas.id]) },
        )
        .await
        .unwrap();
        assert_eq!(combined.iter().map(|r| r.id).collect::<Vec<_>>(), vec![curry.id]);

        // An ingredient id passed as a tag filter matches nothing.
        let wrong_kind = list_recipes(
            &db,
            user.id,
            &RecipeFilter { tags: Some(vec![chickpeas.id]), ingredients: None },
        )
        .await
        .unwrap();
        assert!(wrong_kind.is_empty());
    }
}
