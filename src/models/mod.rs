//! Data models
//!
//! Rust structs representing database entities.

mod activity;
mod costs;
mod ingredient;
mod ingredient_category;
pub mod line_item;
mod recipe;
mod restaurant;
mod technical_sheet;
mod user;

pub use activity::{ActivityAction, ActivityEntry, ActivityFilter, EntityKind, NewActivity};
pub use costs::{
    cascade_from_ingredient, cascade_from_recipe, compute_recipe_costs, compute_sheet_costs,
    load_catalog, recalculate_recipe_costs, recalculate_restaurant, recalculate_sheet_costs,
    CascadeResult,
};
pub use ingredient::{Ingredient, IngredientCreate, IngredientFilter, IngredientUpdate};
pub use ingredient_category::IngredientCategory;
pub use line_item::{ItemOwner, LineItemDetail};
pub use recipe::{Recipe, RecipeFields, StoredCosts};
pub use restaurant::{Restaurant, RestaurantCreate, RestaurantUpdate};
pub use technical_sheet::{SheetFields, TechnicalSheet};
pub use user::{GrantDetail, User, UserCreate, UserUpdate};
