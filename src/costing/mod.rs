//! Costing engine
//!
//! Adjusted weights, nested recipe costs, yields and suggested prices.
//! Nothing in here touches the database.

pub mod calculator;
pub mod catalog;
pub mod numbers;
pub mod pricing;
pub mod units;

pub use calculator::{
    adjusted_cost, adjusted_weight, breakdown, ingredient_cost, total_weight, totals,
    yield_portions, CostBreakdown, CostError, CostResult, ItemCost, ItemSource, LineItem, Totals,
    MAX_NESTING_DEPTH,
};
pub use catalog::{Catalog, CatalogIngredient, CatalogRecipe};
pub use pricing::{suggested_prices, SuggestedPrices, DELIVERY_FEE};
pub use units::{CookingDirection, Unit};
