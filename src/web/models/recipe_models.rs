use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use std::borrow::Cow;
use validator::{Validate, ValidationError, ValidationErrors};

use crate::db::entities::label::{self, LabelKind};
use crate::db::entities::recipe;
use crate::db::services::{LabelNames, NewRecipe, RecipeChanges, RecipeFilter};

const PRICE_MAX_DIGITS: u32 = 5;
const PRICE_DECIMAL_PLACES: u32 = 2;
const MAX_NAME_LENGTH: usize = 255;

fn field_error(code: &'static str, message: impl Into<Cow<'static, str>>) -> ValidationError {
    let mut error = ValidationError::new(code);
    error.message = Some(message.into());
    error
}

fn required() -> ValidationError {
    field_error("required", "This field is required.")
}

// --- Request Structs ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabelPayload {
    pub name: String,
}

impl LabelPayload {
    /// Trimmed, non-blank label name.
    pub fn validated_name(&self) -> Result<String, ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if let Some(error) = check_label_name(&self.name) {
            errors.add("name", error);
            return Err(errors);
        }
        Ok(self.name.trim().to_string())
    }
}

fn check_label_name(name: &str) -> Option<ValidationError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        Some(field_error("blank", "This field may not be blank."))
    } else if trimmed.chars().count() > MAX_NAME_LENGTH {
        Some(field_error("max_length", "Ensure this field has no more than 255 characters."))
    } else {
        None
    }
}

// `Some(None)` is an explicit JSON null, `None` an absent key.
fn nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Recipe write body shared by POST, PUT and PATCH. Unknown keys such as
/// `user` or `id` are dropped by serde. A `null` link or description clears
/// it, the same as an empty string.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct RecipePayload {
    #[validate(length(max = 255, message = "Ensure this field has no more than 255 characters."))]
    pub title: Option<String>,
    #[validate(range(min = 0, message = "Ensure this value is greater than or equal to 0."))]
    pub time_minutes: Option<i32>,
    pub price: Option<Decimal>,
    #[serde(default, deserialize_with = "nullable")]
    pub link: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub description: Option<Option<String>>,
    pub tags: Option<Vec<LabelPayload>>,
    pub ingredients: Option<Vec<LabelPayload>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// POST: the scalar fields a recipe cannot exist without must be present.
    Create,
    /// PUT: same required fields as `Create`.
    Replace,
    /// PATCH: nothing is required.
    Partial,
}

/// A validated write, ready for the recipe service.
#[derive(Debug, Clone, Default)]
pub struct RecipeWrite {
    pub changes: RecipeChanges,
    pub labels: LabelNames,
}

fn check_price(price: &Decimal) -> Option<ValidationError> {
    let normalized = price.normalize();
    let integer_limit = Decimal::new(10i64.pow(PRICE_MAX_DIGITS - PRICE_DECIMAL_PLACES), 0);
    if normalized.scale() > PRICE_DECIMAL_PLACES {
        Some(field_error(
            "max_decimal_places",
            "Ensure that there are no more than 2 decimal places.",
        ))
    } else if normalized.trunc().abs() >= integer_limit {
        Some(field_error(
            "max_digits",
            "Ensure that there are no more than 5 digits in total.",
        ))
    } else {
        None
    }
}

fn collect_label_names(
    field: &'static str,
    payload: Option<Vec<LabelPayload>>,
    errors: &mut ValidationErrors,
) -> Option<Vec<String>> {
    let payload = payload?;
    let mut names = Vec::with_capacity(payload.len());
    for item in payload {
        match check_label_name(&item.name) {
            Some(error) => errors.add(field, error),
            None => names.push(item.name.trim().to_string()),
        }
    }
    Some(names)
}

impl RecipePayload {
    pub fn into_write(self, mode: WriteMode) -> Result<RecipeWrite, ValidationErrors> {
        let mut errors = match self.validate() {
            Ok(()) => ValidationErrors::new(),
            Err(errors) => errors,
        };

        let title = self.title.map(|t| t.trim().to_string());
        if matches!(title.as_deref(), Some("")) {
            errors.add("title", field_error("blank", "This field may not be blank."));
        }
        if let Some(error) = self.price.as_ref().and_then(check_price) {
            errors.add("price", error);
        }
        let link = self.link.map(Option::unwrap_or_default);
        if link.as_ref().is_some_and(|l| l.chars().count() > MAX_NAME_LENGTH) {
            errors.add(
                "link",
                field_error("max_length", "Ensure this field has no more than 255 characters."),
            );
        }
        if mode != WriteMode::Partial {
            if title.is_none() {
                errors.add("title", required());
            }
            if self.time_minutes.is_none() {
                errors.add("time_minutes", required());
            }
            if self.price.is_none() {
                errors.add("price", required());
            }
        }

        let tags = collect_label_names("tags", self.tags, &mut errors);
        let ingredients = collect_label_names("ingredients", self.ingredients, &mut errors);

        if !errors.errors().is_empty() {
            return Err(errors);
        }

        Ok(RecipeWrite {
            changes: RecipeChanges {
                title,
                time_minutes: self.time_minutes,
                price: self.price,
                link,
                description: self.description.map(Option::unwrap_or_default),
            },
            labels: LabelNames { tags, ingredients },
        })
    }

    pub fn into_new_recipe(self) -> Result<(NewRecipe, LabelNames), ValidationErrors> {
        let RecipeWrite { changes, labels } = self.into_write(WriteMode::Create)?;
        match (changes.title, changes.time_minutes, changes.price) {
            (Some(title), Some(time_minutes), Some(price)) => Ok((
                NewRecipe {
                    title,
                    time_minutes,
                    price,
                    link: changes.link,
                    description: changes.description,
                },
                labels,
            )),
            _ => {
                let mut errors = ValidationErrors::new();
                errors.add("title", required());
                Err(errors)
            }
        }
    }
}

/// `GET /api/recipes?tags=1,2&ingredients=3`
#[derive(Debug, Default, Deserialize)]
pub struct RecipeListQuery {
    pub tags: Option<String>,
    pub ingredients: Option<String>,
}

fn parse_id_list(
    field: &'static str,
    raw: Option<&str>,
    errors: &mut ValidationErrors,
) -> Option<Vec<i32>> {
    let raw = raw?;
    let mut ids = Vec::new();
    let mut invalid = false;
    for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        match part.parse::<i32>() {
            Ok(id) => ids.push(id),
            Err(_) => {
                invalid = true;
                errors.add(field, field_error("invalid", format!("'{part}' is not a valid id.")));
            }
        }
    }
    // A blank parameter such as `?tags=` means no filter.
    if ids.is_empty() && !invalid {
        return None;
    }
    Some(ids)
}

impl RecipeListQuery {
    pub fn into_filter(self) -> Result<RecipeFilter, ValidationErrors> {
        let mut errors = ValidationErrors::new();
        let tags = parse_id_list("tags", self.tags.as_deref(), &mut errors);
        let ingredients = parse_id_list("ingredients", self.ingredients.as_deref(), &mut errors);
        if !errors.errors().is_empty() {
            return Err(errors);
        }
        Ok(RecipeFilter { tags, ingredients })
    }
}

/// `GET /api/tags?assigned_only=1`
#[derive(Debug, Default, Deserialize)]
pub struct LabelListQuery {
    pub assigned_only: Option<String>,
}

impl LabelListQuery {
    pub fn assigned_only(&self) -> bool {
        matches!(self.assigned_only.as_deref().map(str::trim), Some("1") | Some("true"))
    }
}

// --- Response Structs ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelResponse {
    pub id: i32,
    pub name: String,
}

impl From<&label::Model> for LabelResponse {
    fn from(label: &label::Model) -> Self {
        Self {
            id: label.id,
            name: label.name.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecipeResponse {
    pub id: i32,
    pub title: String,
    pub time_minutes: i32,
    pub price: Decimal,
    pub link: Option<String>,
    pub tags: Vec<LabelResponse>,
    pub ingredients: Vec<LabelResponse>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecipeDetailResponse {
    #[serde(flatten)]
    pub recipe: RecipeResponse,
    pub description: Option<String>,
}

/// Prices always carry exactly two fractional digits on the wire.
pub fn normalize_price(price: Decimal) -> Decimal {
    let mut rounded = price.round_dp(PRICE_DECIMAL_PLACES);
    rounded.rescale(PRICE_DECIMAL_PLACES);
    rounded
}

fn labels_of(kind: LabelKind, labels: &[label::Model]) -> Vec<LabelResponse> {
    labels
        .iter()
        .filter(|l| l.kind == kind)
        .map(LabelResponse::from)
        .collect()
}

pub fn project_recipe(recipe: &recipe::Model, labels: &[label::Model]) -> RecipeResponse {
    RecipeResponse {
        id: recipe.id,
        title: recipe.title.clone(),
        time_minutes: recipe.time_minutes,
        price: normalize_price(recipe.price),
        link: recipe.link.clone(),
        tags: labels_of(LabelKind::Tag, labels),
        ingredients: labels_of(LabelKind::Ingredient, labels),
    }
}

pub fn project_recipe_detail(
    recipe: &recipe::Model,
    labels: &[label::Model],
) -> RecipeDetailResponse {
    RecipeDetailResponse {
        recipe: project_recipe(recipe, labels),
        description: recipe.description.clone(),
    }
}
