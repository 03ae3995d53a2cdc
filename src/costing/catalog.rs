//! Id-keyed lookup tables consumed by the calculator
//!
//! Recipes reference each other by id only; the catalog is the arena the
//! calculator resolves those ids against.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::calculator::LineItem;
use super::units::Unit;

/// Pricing data for one ingredient
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogIngredient {
    pub id: i64,
    pub name: String,
    pub reference_weight: f64,
    pub reference_price: f64,
    pub unit: Unit,
}

/// A recipe as seen by the calculator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogRecipe {
    pub id: i64,
    pub name: String,
    pub items: Vec<LineItem>,
    /// Last persisted total; zero or `None` forces a recompute
    pub stored_cost: Option<f64>,
}

/// Ingredient and recipe catalogs of one restaurant
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    ingredients: HashMap<i64, CatalogIngredient>,
    recipes: HashMap<i64, CatalogRecipe>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_ingredient(&mut self, ingredient: CatalogIngredient) {
        self.ingredients.insert(ingredient.id, ingredient);
    }

    pub fn insert_recipe(&mut self, recipe: CatalogRecipe) {
        self.recipes.insert(recipe.id, recipe);
    }

    pub fn with_ingredient(mut self, ingredient: CatalogIngredient) -> Self {
        self.insert_ingredient(ingredient);
        self
    }

    pub fn with_recipe(mut self, recipe: CatalogRecipe) -> Self {
        self.insert_recipe(recipe);
        self
    }

    pub fn ingredient(&self, id: i64) -> Option<&CatalogIngredient> {
        self.ingredients.get(&id)
    }

    pub fn recipe(&self, id: i64) -> Option<&CatalogRecipe> {
        self.recipes.get(&id)
    }

    /// Replace the stored cost of a recipe after it has been recalculated
    pub fn set_stored_cost(&mut self, recipe_id: i64, cost: f64) {
        if let Some(recipe) = self.recipes.get_mut(&recipe_id) {
            recipe.stored_cost = Some(cost);
        }
    }

    pub fn ingredient_count(&self) -> usize {
        self.ingredients.len()
    }

    pub fn recipe_count(&self) -> usize {
        self.recipes.len()
    }
}
