use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Discriminates the two label registries that share the `labels` table.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "lowercase")]
pub enum LabelKind {
    #[sea_orm(string_value = "tag")]
    Tag,
    #[sea_orm(string_value = "ingredient")]
    Ingredient,
}

impl fmt::Display for LabelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LabelKind::Tag => write!(f, "tag"),
            LabelKind::Ingredient => write!(f, "ingredient"),
        }
    }
}

// (user_id, kind, name) is unique, see `db::schema`.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "labels")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub user_id: i32,
    pub kind: LabelKind,
    pub name: String,
    pub created_at: ChronoDateTimeUtc,
    pub updated_at: ChronoDateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserId",
        to = "super::user::Column::Id",
        on_delete = "Cascade",
        on_update = "Cascade"
    )]
    User,
    #[sea_orm(has_many = "super::recipe_label::Entity")]
    RecipeLabels,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl Related<super::recipe_label::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::RecipeLabels.def()
    }
}

impl Related<super::recipe::Entity> for Entity {
    fn to() -> RelationDef {
        super::recipe_label::Relation::Recipe.def()
    }
    fn via() -> Option<RelationDef> {
        Some(super::recipe_label::Relation::Label.def().rev())
    }
}

impl ActiveModelBehavior for ActiveModel {}
