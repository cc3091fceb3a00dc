//! SeaORM entities for the recipe store.
//!
//! Tags and ingredients share the `labels` table and are told apart by
//! [`label::LabelKind`]. `recipe_labels` is the join table between recipes and
//! labels of either kind.

pub mod label;
pub mod recipe;
pub mod recipe_label;
pub mod user;

