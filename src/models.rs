use serde::Serialize;

use crate::error::StoreError;
use crate::params::{FromParams, Params};
use crate::schema::{category, ingredient, menu, recipe, recipe_ingredient};

#[derive(Debug, Clone, PartialEq, Serialize, Queryable)]
pub(crate) struct Category {
    pub id: i32,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Insertable, AsChangeset)]
#[table_name = "category"]
pub(crate) struct CategoryFields {
    pub name: String,
}

impl FromParams for CategoryFields {
    fn from_params(params: &Params) -> Result<Self, StoreError> {
        Ok(Self {
            name: params.required_str("name")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Queryable)]
pub(crate) struct Menu {
    pub id: i32,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Insertable, AsChangeset)]
#[table_name = "menu"]
pub(crate) struct MenuFields {
    pub name: String,
}

impl FromParams for MenuFields {
    fn from_params(params: &Params) -> Result<Self, StoreError> {
        Ok(Self {
            name: params.required_str("name")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Queryable)]
pub(crate) struct Recipe {
    pub id: i32,
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Insertable, AsChangeset)]
#[table_name = "recipe"]
pub(crate) struct RecipeFields {
    pub name: String,
    pub description: String,
}

impl FromParams for RecipeFields {
    fn from_params(params: &Params) -> Result<Self, StoreError> {
        Ok(Self {
            name: params.required_str("name")?,
            description: params.optional_str("description").unwrap_or_default(),
        })
    }
}

/// An ingredient as it is read back, with the name of its category joined in.
#[derive(Debug, Clone, PartialEq, Serialize, Queryable)]
pub(crate) struct Ingredient {
    pub id: i32,
    pub name: String,
    pub presentation: String,
    pub purchase_price: f64,
    pub category_id: Option<i32>,
    pub supplier_id: Option<i32>,
    pub image: Option<String>,
    pub category_name: Option<String>,
}

// Updates replace the whole row, so a missing optional field clears the column.
#[derive(Debug, Clone, PartialEq, Insertable, AsChangeset)]
#[table_name = "ingredient"]
#[changeset_options(treat_none_as_null = "true")]
pub(crate) struct IngredientFields {
    pub name: String,
    pub presentation: String,
    pub purchase_price: f64,
    pub category_id: Option<i32>,
    pub supplier_id: Option<i32>,
    pub image: Option<String>,
}

impl FromParams for IngredientFields {
    fn from_params(params: &Params) -> Result<Self, StoreError> {
        Ok(Self {
            name: params.required_str("name")?,
            presentation: params.optional_str("presentation").unwrap_or_default(),
            purchase_price: params.required_amount("purchase_price")?,
            category_id: params.optional_id("category_id")?,
            supplier_id: params.optional_id("supplier_id")?,
            image: params.optional_str("image"),
        })
    }
}

/// How much of an ingredient one recipe consumes.
#[derive(Debug, Clone, PartialEq, Insertable)]
#[table_name = "recipe_ingredient"]
pub(crate) struct RecipeIngredient {
    pub recipe_id: i32,
    pub ingredient_id: i32,
    pub quantity_used: f64,
    pub cost_of_use: f64,
}

impl RecipeIngredient {
    pub(crate) fn key_from_params(params: &Params) -> Result<(i32, i32), StoreError> {
        Ok((
            params.required_id("recipe_id")?,
            params.required_id("ingredient_id")?,
        ))
    }
}

impl FromParams for RecipeIngredient {
    fn from_params(params: &Params) -> Result<Self, StoreError> {
        let (recipe_id, ingredient_id) = Self::key_from_params(params)?;
        Ok(Self {
            recipe_id,
            ingredient_id,
            quantity_used: params.required_amount("quantity_used")?,
            cost_of_use: params.required_amount("cost_of_use")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, AsChangeset)]
#[table_name = "recipe_ingredient"]
pub(crate) struct UsageChange {
    pub quantity_used: f64,
    pub cost_of_use: f64,
}

impl From<&RecipeIngredient> for UsageChange {
    fn from(usage: &RecipeIngredient) -> Self {
        Self {
            quantity_used: usage.quantity_used,
            cost_of_use: usage.cost_of_use,
        }
    }
}
