//! Data access for users, labels and recipes.
//!
//! Each sub-module owns one area of the schema. The recipe service drives the
//! label reconciler inside its own transactions; the web layer only calls the
//! functions re-exported here.

pub mod label_service;
pub mod recipe_service;
pub mod user_service;

pub use label_service::*;
pub use recipe_service::*;
pub use user_service::*;
