use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "recipes")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub user_id: i32,
    pub title: String,
    pub time_minutes: i32,
    #[sea_orm(column_type = "Decimal(Some((5, 2)))")]
    pub price: Decimal,
    pub link: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub description: Option<String>,
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

impl Related<super::label::Entity> for Entity {
    fn to() -> RelationDef {
        super::recipe_label::Relation::Label.def()
    }
    fn via() -> Option<RelationDef> {
        Some(super::recipe_label::Relation::Recipe.def().rev())
    }
}

impl ActiveModelBehavior for ActiveModel {}
