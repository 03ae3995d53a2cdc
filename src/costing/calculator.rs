//! Cost and yield calculator
//!
//! Pure functions over line items and a [`Catalog`]. Malformed numbers count
//! as zero and unresolved references contribute nothing; the only failures
//! are recipe cycles and runaway nesting.
//!
//! Weight and cost treat the cooking direction in opposite ways: for weight
//! `mais` divides by the adjustment factor, for ingredient cost `mais`
//! multiplies by it. Both formulas are kept exactly as the kitchen sheets
//! define them.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::catalog::{Catalog, CatalogIngredient, CatalogRecipe};
use super::numbers::{lenient_f64, non_negative, percent_fraction};
use super::units::{CookingDirection, Unit};

/// Deepest chain of nested recipes the calculator will expand
pub const MAX_NESTING_DEPTH: usize = 32;

/// Default whole-percent index (no adjustment)
pub const NEUTRAL_INDEX: f64 = 100.0;

/// Largest IC or IPC a stored line item may carry
pub const MAX_INDEX: f64 = 999.99;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CostError {
    #[error("recipe {recipe_id} contains itself through its sub-recipes")]
    CycleDetected { recipe_id: i64 },

    #[error("recipe nesting exceeds {max} levels")]
    TooDeep { max: usize },
}

pub type CostResult<T> = Result<T, CostError>;

/// What a line item draws from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum ItemSource {
    Ingredient(i64),
    Recipe(i64),
}

impl ItemSource {
    pub fn kind(&self) -> &'static str {
        match self {
            ItemSource::Ingredient(_) => "ingredient",
            ItemSource::Recipe(_) => "recipe",
        }
    }

    pub fn id(&self) -> i64 {
        match self {
            ItemSource::Ingredient(id) | ItemSource::Recipe(id) => *id,
        }
    }
}

fn default_index() -> f64 {
    NEUTRAL_INDEX
}

fn default_true() -> bool {
    true
}

/// One ingredient or sub-recipe used by a recipe or technical sheet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub source: ItemSource,
    #[serde(deserialize_with = "lenient_f64", default)]
    pub quantity_used: f64,
    #[serde(default)]
    pub unit: Unit,
    /// Cooking index (IC), whole percent
    #[serde(deserialize_with = "lenient_f64", default = "default_index")]
    pub cooking_index: f64,
    #[serde(default)]
    pub cooking_direction: CookingDirection,
    /// Edible-parts index (IPC), whole percent
    #[serde(deserialize_with = "lenient_f64", default = "default_index")]
    pub edible_index: f64,
    #[serde(default = "default_true")]
    pub apply_adjustment: bool,
}

impl LineItem {
    fn new(source: ItemSource, quantity_used: f64) -> Self {
        Self {
            source,
            quantity_used,
            unit: Unit::default(),
            cooking_index: NEUTRAL_INDEX,
            cooking_direction: CookingDirection::default(),
            edible_index: NEUTRAL_INDEX,
            apply_adjustment: true,
        }
    }

    pub fn ingredient(ingredient_id: i64, quantity_used: f64) -> Self {
        Self::new(ItemSource::Ingredient(ingredient_id), quantity_used)
    }

    pub fn recipe(recipe_id: i64, quantity_used: f64) -> Self {
        Self::new(ItemSource::Recipe(recipe_id), quantity_used)
    }

    pub fn with_indices(mut self, ic: f64, ipc: f64, direction: CookingDirection) -> Self {
        self.cooking_index = ic;
        self.edible_index = ipc;
        self.cooking_direction = direction;
        self
    }

    pub fn with_unit(mut self, unit: Unit) -> Self {
        self.unit = unit;
        self
    }

    pub fn without_adjustment(mut self) -> Self {
        self.apply_adjustment = false;
        self
    }

    fn quantity(&self) -> f64 {
        non_negative(self.quantity_used)
    }

    /// Combined IC × IPC factor, or `None` when no adjustment applies
    pub fn adjustment_factor(&self) -> Option<f64> {
        if !self.apply_adjustment {
            return None;
        }
        let ic = percent_fraction(self.cooking_index);
        let ipc = percent_fraction(self.edible_index);
        if ic == 0.0 || ipc == 0.0 {
            return None;
        }
        Some(ic * ipc)
    }
}

fn or_one(value: f64) -> f64 {
    if value == 0.0 || !value.is_finite() {
        1.0
    } else {
        value
    }
}

/// Weight of a line item after cooking and trimming losses
pub fn adjusted_weight(item: &LineItem) -> f64 {
    let quantity = item.quantity();
    match item.adjustment_factor() {
        None => quantity,
        Some(factor) => match item.cooking_direction {
            CookingDirection::Mais => quantity / or_one(factor),
            CookingDirection::Menos => quantity * factor,
        },
    }
}

/// Cost of an ingredient-backed line item
pub fn ingredient_cost(item: &LineItem, ingredient: Option<&CatalogIngredient>) -> f64 {
    let Some(ingredient) = ingredient else {
        return 0.0;
    };
    let quantity = item.quantity();
    if quantity == 0.0 {
        return 0.0;
    }

    let unit_cost =
        non_negative(ingredient.reference_price) / or_one(non_negative(ingredient.reference_weight));
    let base = unit_cost * quantity;

    match item.adjustment_factor() {
        None => base,
        Some(factor) => match item.cooking_direction {
            CookingDirection::Mais => base * or_one(factor),
            CookingDirection::Menos => base / or_one(factor),
        },
    }
}

/// Sum of adjusted weights
pub fn total_weight(items: &[LineItem]) -> f64 {
    items.iter().map(adjusted_weight).sum()
}

/// Cost of any line item, resolving nested recipes through the catalog
pub fn adjusted_cost(item: &LineItem, catalog: &Catalog) -> CostResult<f64> {
    let mut chain = Vec::new();
    item_cost(item, catalog, &mut chain)
}

fn item_cost(item: &LineItem, catalog: &Catalog, chain: &mut Vec<i64>) -> CostResult<f64> {
    match item.source {
        ItemSource::Ingredient(id) => Ok(ingredient_cost(item, catalog.ingredient(id))),
        ItemSource::Recipe(id) => nested_recipe_cost(item, catalog.recipe(id), catalog, chain),
    }
}

fn nested_recipe_cost(
    item: &LineItem,
    recipe: Option<&CatalogRecipe>,
    catalog: &Catalog,
    chain: &mut Vec<i64>,
) -> CostResult<f64> {
    let Some(recipe) = recipe else {
        return Ok(0.0);
    };
    let quantity = item.quantity();
    if quantity == 0.0 {
        return Ok(0.0);
    }

    let recipe_cost = recipe_total_cost(recipe, catalog, chain)?;
    let recipe_weight = total_weight(&recipe.items);
    let proportion = if recipe_weight > 0.0 {
        quantity / recipe_weight
    } else {
        0.0
    };

    Ok(recipe_cost * proportion)
}

/// Stored total when usable, otherwise the recursive sum of the recipe's items
fn recipe_total_cost(
    recipe: &CatalogRecipe,
    catalog: &Catalog,
    chain: &mut Vec<i64>,
) -> CostResult<f64> {
    if let Some(stored) = recipe.stored_cost.map(non_negative).filter(|c| *c > 0.0) {
        return Ok(stored);
    }
    if chain.contains(&recipe.id) {
        return Err(CostError::CycleDetected {
            recipe_id: recipe.id,
        });
    }
    if chain.len() >= MAX_NESTING_DEPTH {
        return Err(CostError::TooDeep {
            max: MAX_NESTING_DEPTH,
        });
    }

    chain.push(recipe.id);
    let mut total = 0.0;
    for sub_item in &recipe.items {
        total += item_cost(sub_item, catalog, chain)?;
    }
    chain.pop();

    Ok(total)
}

/// Aggregate weight and cost of a list of line items
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Totals {
    pub total_weight: f64,
    pub total_cost: f64,
}

/// Per-item figures
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemCost {
    pub position: usize,
    pub source: ItemSource,
    pub adjusted_weight: f64,
    pub adjusted_cost: f64,
}

/// Per-item figures plus totals
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CostBreakdown {
    pub items: Vec<ItemCost>,
    pub totals: Totals,
}

/// Compute totals for items owned by `owner` (a recipe id, or `None` for a
/// technical sheet / unsaved form). The owner is seeded into the cycle guard.
pub fn breakdown(owner: Option<i64>, items: &[LineItem], catalog: &Catalog) -> CostResult<CostBreakdown> {
    let mut chain: Vec<i64> = owner.into_iter().collect();
    let mut rows = Vec::with_capacity(items.len());
    let mut totals = Totals::default();

    for (position, item) in items.iter().enumerate() {
        let weight = adjusted_weight(item);
        let cost = item_cost(item, catalog, &mut chain)?;
        totals.total_weight += weight;
        totals.total_cost += cost;
        rows.push(ItemCost {
            position,
            source: item.source,
            adjusted_weight: weight,
            adjusted_cost: cost,
        });
    }

    Ok(CostBreakdown {
        items: rows,
        totals,
    })
}

/// Totals for an unowned list of items
pub fn totals(items: &[LineItem], catalog: &Catalog) -> CostResult<Totals> {
    Ok(breakdown(None, items, catalog)?.totals)
}

/// Number of portions a batch yields
pub fn yield_portions(total_weight: f64, portion_size: f64) -> f64 {
    let portion = non_negative(portion_size);
    if portion > 0.0 {
        total_weight / portion
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    fn flour() -> CatalogIngredient {
        CatalogIngredient {
            id: 1,
            name: "Farinha".to_string(),
            reference_weight: 1000.0,
            reference_price: 10.0,
            unit: Unit::Grams,
        }
    }

    fn catalog() -> Catalog {
        Catalog::new().with_ingredient(flour())
    }

    #[test]
    fn test_no_adjustment_passes_quantity_and_cost_through() {
        let cat = catalog();
        for q in [0.0, 1.0, 37.5, 200.0] {
            let item = LineItem::ingredient(1, q)
                .with_indices(50.0, 80.0, CookingDirection::Mais)
                .without_adjustment();
            assert_eq!(adjusted_weight(&item), q);
            assert!(close(ingredient_cost(&item, cat.ingredient(1)), 0.01 * q));
        }
    }

    #[test]
    fn test_neutral_indices_are_unity() {
        let item = LineItem::ingredient(1, 200.0);
        assert_eq!(adjusted_weight(&item), 200.0);
    }

    #[test]
    fn test_weight_direction() {
        let menos = LineItem::ingredient(1, 100.0).with_indices(50.0, 100.0, CookingDirection::Menos);
        let mais = LineItem::ingredient(1, 100.0).with_indices(50.0, 100.0, CookingDirection::Mais);
        assert!(close(adjusted_weight(&menos), 50.0));
        assert!(close(adjusted_weight(&mais), 200.0));
    }

    #[test]
    fn test_zero_index_means_no_adjustment() {
        let item = LineItem::ingredient(1, 120.0).with_indices(0.0, 90.0, CookingDirection::Menos);
        assert_eq!(adjusted_weight(&item), 120.0);
        assert!(close(ingredient_cost(&item, Some(&flour())), 1.2));
    }

    #[test]
    fn test_malformed_numbers_count_as_zero() {
        let item = LineItem::ingredient(1, f64::NAN);
        assert_eq!(adjusted_weight(&item), 0.0);
        assert_eq!(ingredient_cost(&item, Some(&flour())), 0.0);

        let negative = LineItem::ingredient(1, -5.0);
        assert_eq!(adjusted_weight(&negative), 0.0);
    }

    #[test]
    fn test_plain_ingredient_scenario() {
        let item = LineItem::ingredient(1, 200.0);
        assert!(close(adjusted_weight(&item), 200.0));
        assert!(close(adjusted_cost(&item, &catalog()).unwrap(), 2.0));
    }

    #[test]
    fn test_mais_scenario() {
        let item = LineItem::ingredient(1, 200.0).with_indices(80.0, 90.0, CookingDirection::Mais);
        assert!(close(adjusted_cost(&item, &catalog()).unwrap(), 1.44));
        assert!((adjusted_weight(&item) - 277.777_777).abs() < 1e-3);
    }

    /// Weight divides by the factor in `mais` mode while cost multiplies by it.
    /// A change here must be deliberate.
    #[test]
    fn test_weight_and_cost_treat_direction_asymmetrically() {
        let cat = catalog();
        let mais = LineItem::ingredient(1, 100.0).with_indices(50.0, 100.0, CookingDirection::Mais);
        let menos = LineItem::ingredient(1, 100.0).with_indices(50.0, 100.0, CookingDirection::Menos);

        // weight: mais grows, menos shrinks
        assert!(close(adjusted_weight(&mais), 200.0));
        assert!(close(adjusted_weight(&menos), 50.0));
        // cost: mais shrinks, menos grows
        assert!(close(ingredient_cost(&mais, cat.ingredient(1)), 0.5));
        assert!(close(ingredient_cost(&menos, cat.ingredient(1)), 2.0));
    }

    #[test]
    fn test_unknown_ingredient_costs_nothing() {
        let item = LineItem::ingredient(99, 200.0);
        assert_eq!(adjusted_cost(&item, &catalog()).unwrap(), 0.0);
    }

    #[test]
    fn test_zero_reference_weight_uses_price_as_unit_cost() {
        let mut ing = flour();
        ing.reference_weight = 0.0;
        let item = LineItem::ingredient(1, 3.0);
        assert!(close(ingredient_cost(&item, Some(&ing)), 30.0));
    }

    #[test]
    fn test_nested_recipe_uses_stored_cost() {
        let sauce = CatalogRecipe {
            id: 10,
            name: "Molho".to_string(),
            items: vec![LineItem::ingredient(1, 500.0)],
            stored_cost: Some(20.0),
        };
        let cat = catalog().with_recipe(sauce);
        let item = LineItem::recipe(10, 250.0);
        assert!(close(adjusted_cost(&item, &cat).unwrap(), 10.0));
    }

    #[test]
    fn test_nested_recipe_recomputes_missing_cost() {
        let sauce = CatalogRecipe {
            id: 10,
            name: "Molho".to_string(),
            items: vec![LineItem::ingredient(1, 500.0)],
            stored_cost: Some(0.0),
        };
        let cat = catalog().with_recipe(sauce);
        // 500 g of flour costs 5.00; half the batch costs 2.50
        let item = LineItem::recipe(10, 250.0);
        assert!(close(adjusted_cost(&item, &cat).unwrap(), 2.5));
    }

    #[test]
    fn test_zero_weight_recipe_costs_nothing() {
        let empty = CatalogRecipe {
            id: 11,
            name: "Vazia".to_string(),
            items: vec![],
            stored_cost: Some(15.0),
        };
        let cat = catalog().with_recipe(empty);
        assert_eq!(adjusted_cost(&LineItem::recipe(11, 100.0), &cat).unwrap(), 0.0);
    }

    #[test]
    fn test_unknown_recipe_costs_nothing() {
        assert_eq!(adjusted_cost(&LineItem::recipe(404, 10.0), &catalog()).unwrap(), 0.0);
    }

    #[test]
    fn test_two_level_nesting() {
        let base = CatalogRecipe {
            id: 20,
            name: "Base".to_string(),
            items: vec![LineItem::ingredient(1, 1000.0)],
            stored_cost: None,
        };
        let mid = CatalogRecipe {
            id: 21,
            name: "Meio".to_string(),
            items: vec![LineItem::recipe(20, 500.0)],
            stored_cost: None,
        };
        let cat = catalog().with_recipe(base).with_recipe(mid);
        // base: 1000 g for 10.00; mid uses half -> 5.00 for 500 g; 100 g of mid -> 1.00
        assert!(close(adjusted_cost(&LineItem::recipe(21, 100.0), &cat).unwrap(), 1.0));
    }

    #[test]
    fn test_cycle_is_reported() {
        let a = CatalogRecipe {
            id: 1,
            name: "A".to_string(),
            items: vec![LineItem::recipe(2, 10.0)],
            stored_cost: None,
        };
        let b = CatalogRecipe {
            id: 2,
            name: "B".to_string(),
            items: vec![LineItem::recipe(1, 10.0)],
            stored_cost: None,
        };
        let cat = Catalog::new().with_recipe(a).with_recipe(b);
        let err = adjusted_cost(&LineItem::recipe(1, 5.0), &cat).unwrap_err();
        assert!(matches!(err, CostError::CycleDetected { .. }));
    }

    #[test]
    fn test_owner_is_part_of_cycle_guard() {
        let b = CatalogRecipe {
            id: 2,
            name: "B".to_string(),
            items: vec![LineItem::recipe(1, 10.0)],
            stored_cost: None,
        };
        let a = CatalogRecipe {
            id: 1,
            name: "A".to_string(),
            items: vec![LineItem::recipe(2, 10.0)],
            stored_cost: None,
        };
        let cat = Catalog::new().with_recipe(a).with_recipe(b);
        let err = breakdown(Some(1), &[LineItem::recipe(2, 10.0)], &cat).unwrap_err();
        assert_eq!(err, CostError::CycleDetected { recipe_id: 1 });
    }

    #[test]
    fn test_excessive_depth_is_reported() {
        let mut cat = catalog();
        for id in 100..(100 + MAX_NESTING_DEPTH as i64 + 2) {
            cat.insert_recipe(CatalogRecipe {
                id,
                name: format!("R{id}"),
                items: vec![LineItem::recipe(id + 1, 1.0)],
                stored_cost: None,
            });
        }
        let err = adjusted_cost(&LineItem::recipe(100, 1.0), &cat).unwrap_err();
        assert_eq!(err, CostError::TooDeep { max: MAX_NESTING_DEPTH });
    }

    #[test]
    fn test_totals_are_sum_of_items_in_any_order() {
        let sauce = CatalogRecipe {
            id: 10,
            name: "Molho".to_string(),
            items: vec![LineItem::ingredient(1, 500.0)],
            stored_cost: Some(20.0),
        };
        let cat = catalog().with_recipe(sauce);
        let items = vec![
            LineItem::ingredient(1, 200.0),
            LineItem::recipe(10, 250.0),
            LineItem::ingredient(1, 100.0).with_indices(80.0, 90.0, CookingDirection::Mais),
        ];

        let forward = totals(&items, &cat).unwrap();
        let mut reversed = items.clone();
        reversed.reverse();
        let backward = totals(&reversed, &cat).unwrap();

        let expected_cost: f64 = items.iter().map(|i| adjusted_cost(i, &cat).unwrap()).sum();
        let expected_weight: f64 = items.iter().map(adjusted_weight).sum();

        assert!(close(forward.total_cost, expected_cost));
        assert!(close(forward.total_weight, expected_weight));
        assert!(close(forward.total_cost, backward.total_cost));
        assert!(close(forward.total_weight, backward.total_weight));
    }

    #[test]
    fn test_removing_an_item_subtracts_exactly_its_share() {
        let cat = catalog();
        let mut items = vec![LineItem::ingredient(1, 200.0), LineItem::ingredient(1, 300.0)];
        let before = totals(&items, &cat).unwrap();
        let removed = items.pop().unwrap();
        let after = totals(&items, &cat).unwrap();
        assert!(close(before.total_cost - after.total_cost, adjusted_cost(&removed, &cat).unwrap()));
    }

    #[test]
    fn test_yield_portions() {
        assert!(close(yield_portions(1000.0, 250.0), 4.0));
        assert_eq!(yield_portions(1000.0, 0.0), 0.0);
        assert_eq!(yield_portions(1000.0, -1.0), 0.0);
    }

    #[test]
    fn test_line_item_json_shape() {
        let json = r#"{"source": {"kind": "recipe", "id": 7}, "quantity_used": 50}"#;
        let item: LineItem = serde_json::from_str(json).unwrap();
        assert_eq!(item.source, ItemSource::Recipe(7));
        assert_eq!(item.cooking_index, NEUTRAL_INDEX);
        assert_eq!(item.edible_index, NEUTRAL_INDEX);
        assert!(item.apply_adjustment);
        assert_eq!(item.cooking_direction, CookingDirection::Menos);
    }
}
