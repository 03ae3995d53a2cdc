//! Stored cost maintenance
//!
//! Loads a restaurant's catalog, runs the calculator and writes the
//! aggregates back. Changes to an ingredient or recipe cascade to every
//! recipe and technical sheet that depends on it, leaves first.

use std::collections::{HashMap, HashSet, VecDeque};

use rusqlite::Connection;
use serde::Serialize;

use crate::costing::{
    breakdown, suggested_prices, yield_portions, Catalog, CatalogRecipe, CostBreakdown, LineItem,
};
use crate::db::{DbError, DbResult};

use super::ingredient::Ingredient;
use super::line_item::{
    load_items, parent_recipe_ids, recipes_using_ingredient, sheets_using, ItemOwner,
};
use super::recipe::{Recipe, StoredCosts};
use super::restaurant::Restaurant;
use super::technical_sheet::TechnicalSheet;

/// Result of a cascading recalculation
#[derive(Debug, Clone, Default, Serialize)]
pub struct CascadeResult {
    pub recipes_recalculated: i64,
    pub sheets_recalculated: i64,
}

/// Build the calculator catalog for one restaurant
pub fn load_catalog(conn: &Connection, restaurant_id: i64) -> DbResult<Catalog> {
    let mut catalog = Catalog::new();

    for ingredient in Ingredient::list_for_restaurant(conn, restaurant_id)? {
        catalog.insert_ingredient(ingredient.to_catalog());
    }
    for recipe in Recipe::list_for_restaurant(conn, restaurant_id)? {
        let items = load_items(conn, ItemOwner::Recipe(recipe.id))?;
        catalog.insert_recipe(CatalogRecipe {
            id: recipe.id,
            name: recipe.name,
            items,
            stored_cost: recipe.total_cost,
        });
    }

    Ok(catalog)
}

fn markup_factor(conn: &Connection, restaurant_id: i64) -> DbResult<Option<f64>> {
    Ok(Restaurant::get_by_id(conn, restaurant_id)?.map(|r| r.markup_factor))
}

/// Aggregates for a recipe's items, without touching the database
pub fn compute_recipe_costs(
    recipe_id: Option<i64>,
    items: &[LineItem],
    portion_size: f64,
    markup: Option<f64>,
    catalog: &Catalog,
) -> DbResult<(CostBreakdown, StoredCosts)> {
    let result = breakdown(recipe_id, items, catalog)?;
    let prices = suggested_prices(result.totals.total_cost, markup);
    let costs = StoredCosts {
        final_weight: result.totals.total_weight,
        total_cost: result.totals.total_cost,
        yield_portions: Some(yield_portions(result.totals.total_weight, portion_size)),
        restaurant_price: prices.restaurant_price,
        delivery_price: prices.delivery_price,
    };
    Ok((result, costs))
}

/// Aggregates for a technical sheet's items
pub fn compute_sheet_costs(
    items: &[LineItem],
    markup: Option<f64>,
    catalog: &Catalog,
) -> DbResult<(CostBreakdown, StoredCosts)> {
    let result = breakdown(None, items, catalog)?;
    let prices = suggested_prices(result.totals.total_cost, markup);
    let costs = StoredCosts {
        final_weight: result.totals.total_weight,
        total_cost: result.totals.total_cost,
        yield_portions: None,
        restaurant_price: prices.restaurant_price,
        delivery_price: prices.delivery_price,
    };
    Ok((result, costs))
}

fn recalculate_recipe_with(
    conn: &Connection,
    recipe: &Recipe,
    markup: Option<f64>,
    catalog: &mut Catalog,
) -> DbResult<StoredCosts> {
    let items = load_items(conn, ItemOwner::Recipe(recipe.id))?;
    let (_, costs) = compute_recipe_costs(Some(recipe.id), &items, recipe.portion_size, markup, catalog)?;
    Recipe::store_costs(conn, recipe.id, &costs)?;
    catalog.set_stored_cost(recipe.id, costs.total_cost);
    Ok(costs)
}

fn recalculate_sheet_with(
    conn: &Connection,
    sheet_id: i64,
    markup: Option<f64>,
    catalog: &Catalog,
) -> DbResult<StoredCosts> {
    let items = load_items(conn, ItemOwner::Sheet(sheet_id))?;
    let (_, costs) = compute_sheet_costs(&items, markup, catalog)?;
    TechnicalSheet::store_costs(conn, sheet_id, &costs)?;
    Ok(costs)
}

/// Recompute and store the aggregates of one recipe
pub fn recalculate_recipe_costs(conn: &Connection, recipe_id: i64) -> DbResult<StoredCosts> {
    let recipe = Recipe::get_by_id(conn, recipe_id)?
        .ok_or_else(|| DbError::Sqlite(rusqlite::Error::QueryReturnedNoRows))?;
    let markup = markup_factor(conn, recipe.restaurant_id)?;
    let mut catalog = load_catalog(conn, recipe.restaurant_id)?;
    recalculate_recipe_with(conn, &recipe, markup, &mut catalog)
}

/// Recompute and store the aggregates of one technical sheet
pub fn recalculate_sheet_costs(conn: &Connection, sheet_id: i64) -> DbResult<StoredCosts> {
    let sheet = TechnicalSheet::get_by_id(conn, sheet_id)?
        .ok_or_else(|| DbError::Sqlite(rusqlite::Error::QueryReturnedNoRows))?;
    let markup = markup_factor(conn, sheet.restaurant_id)?;
    let catalog = load_catalog(conn, sheet.restaurant_id)?;
    recalculate_sheet_with(conn, sheet_id, markup, &catalog)
}

/// Collect `start` and every recipe that transitively uses one of them
fn with_ancestors(conn: &Connection, start: Vec<i64>) -> DbResult<HashSet<i64>> {
    let mut all_affected: HashSet<i64> = HashSet::new();
    let mut to_process = start;

    while let Some(recipe_id) = to_process.pop() {
        if all_affected.insert(recipe_id) {
            to_process.extend(parent_recipe_ids(conn, recipe_id)?);
        }
    }
    Ok(all_affected)
}

/// Recalculate the given recipes in dependency order, then the sheets using
/// them (and `ingredient_id`, when given)
fn recalculate_set(
    conn: &Connection,
    restaurant_id: i64,
    affected: &HashSet<i64>,
    ingredient_id: Option<i64>,
) -> DbResult<CascadeResult> {
    let mut result = CascadeResult::default();
    let markup = markup_factor(conn, restaurant_id)?;
    let mut catalog = load_catalog(conn, restaurant_id)?;

    let sorted = topological_sort_recipes(conn, affected)?;
    for recipe_id in &sorted {
        if let Some(recipe) = Recipe::get_by_id(conn, *recipe_id)? {
            recalculate_recipe_with(conn, &recipe, markup, &mut catalog)?;
            result.recipes_recalculated += 1;
        }
    }

    for sheet_id in sheets_using(conn, ingredient_id, &sorted)? {
        recalculate_sheet_with(conn, sheet_id, markup, &catalog)?;
        result.sheets_recalculated += 1;
    }

    Ok(result)
}

/// An ingredient changed: recalculate every recipe and sheet depending on it
pub fn cascade_from_ingredient(conn: &Connection, ingredient_id: i64) -> DbResult<CascadeResult> {
    let Some(ingredient) = Ingredient::get_by_id(conn, ingredient_id)? else {
        return Ok(CascadeResult::default());
    };

    let direct = recipes_using_ingredient(conn, ingredient_id)?;
    let affected = with_ancestors(conn, direct)?;
    let result = recalculate_set(conn, ingredient.restaurant_id, &affected, Some(ingredient_id))?;

    tracing::info!(
        ingredient_id,
        recipes = result.recipes_recalculated,
        sheets = result.sheets_recalculated,
        "Cascaded ingredient change"
    );
    Ok(result)
}

/// A recipe changed: recalculate the recipes above it and every sheet using
/// any of them. The recipe itself is expected to be up to date already.
pub fn cascade_from_recipe(conn: &Connection, recipe_id: i64) -> DbResult<CascadeResult> {
    let Some(recipe) = Recipe::get_by_id(conn, recipe_id)? else {
        return Ok(CascadeResult::default());
    };

    let parents = parent_recipe_ids(conn, recipe_id)?;
    let mut affected = with_ancestors(conn, parents)?;
    affected.remove(&recipe_id);

    let mut result = recalculate_set(conn, recipe.restaurant_id, &affected, None)?;

    // sheets using the recipe itself
    let markup = markup_factor(conn, recipe.restaurant_id)?;
    let catalog = load_catalog(conn, recipe.restaurant_id)?;
    let already: HashSet<i64> = sheets_using(conn, None, &affected.iter().copied().collect::<Vec<_>>())?
        .into_iter()
        .collect();
    for sheet_id in sheets_using(conn, None, &[recipe_id])? {
        if !already.contains(&sheet_id) {
            recalculate_sheet_with(conn, sheet_id, markup, &catalog)?;
            result.sheets_recalculated += 1;
        }
    }

    Ok(result)
}

/// Recalculate every recipe and sheet of a restaurant
pub fn recalculate_restaurant(conn: &Connection, restaurant_id: i64) -> DbResult<CascadeResult> {
    let all_recipes: HashSet<i64> = Recipe::list_for_restaurant(conn, restaurant_id)?
        .into_iter()
        .map(|r| r.id)
        .collect();

    let mut result = CascadeResult::default();
    let markup = markup_factor(conn, restaurant_id)?;
    let mut catalog = load_catalog(conn, restaurant_id)?;

    // Stored totals may be stale everywhere; recompute from scratch
    for id in &all_recipes {
        catalog.set_stored_cost(*id, 0.0);
    }

    for recipe_id in topological_sort_recipes(conn, &all_recipes)? {
        if let Some(recipe) = Recipe::get_by_id(conn, recipe_id)? {
            recalculate_recipe_with(conn, &recipe, markup, &mut catalog)?;
            result.recipes_recalculated += 1;
        }
    }
    for sheet_id in TechnicalSheet::ids_for_restaurant(conn, restaurant_id)? {
        recalculate_sheet_with(conn, sheet_id, markup, &catalog)?;
        result.sheets_recalculated += 1;
    }

    Ok(result)
}

/// Sort recipes so every recipe comes after the sub-recipes it uses
fn topological_sort_recipes(conn: &Connection, recipe_ids: &HashSet<i64>) -> DbResult<Vec<i64>> {
    if recipe_ids.is_empty() {
        return Ok(Vec::new());
    }

    // recipe_id -> sub-recipes it depends on, and the reverse
    let mut dependencies: HashMap<i64, HashSet<i64>> = HashMap::new();
    let mut dependents: HashMap<i64, HashSet<i64>> = HashMap::new();

    for &recipe_id in recipe_ids {
        dependencies.entry(recipe_id).or_default();
        dependents.entry(recipe_id).or_default();
    }

    let ids: Vec<i64> = recipe_ids.iter().copied().collect();
    let sql = format!(
        "SELECT recipe_id, sub_recipe_id FROM recipe_items WHERE {} AND {}",
        super::restaurant::id_filter("recipe_id", &ids),
        super::restaurant::id_filter("sub_recipe_id", &ids)
    );
    let mut stmt = conn.prepare(&sql)?;
    let edges: Vec<(i64, i64)> = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;

    for (parent_id, child_id) in edges {
        dependencies.entry(parent_id).or_default().insert(child_id);
        dependents.entry(child_id).or_default().insert(parent_id);
    }

    // Kahn's algorithm
    let mut result = Vec::with_capacity(recipe_ids.len());
    let mut queue: VecDeque<i64> = {
        let mut roots: Vec<i64> = recipe_ids
            .iter()
            .copied()
            .filter(|id| dependencies.get(id).map_or(true, |d| d.is_empty()))
            .collect();
        roots.sort_unstable();
        roots.into()
    };

    while let Some(recipe_id) = queue.pop_front() {
        result.push(recipe_id);

        if let Some(parents) = dependents.get(&recipe_id).cloned() {
            for parent_id in parents {
                if let Some(deps) = dependencies.get_mut(&parent_id) {
                    deps.remove(&recipe_id);
                    if deps.is_empty() {
                        queue.push_back(parent_id);
                    }
                }
            }
        }
    }

    if result.len() != recipe_ids.len() {
        // Only reachable with a cycle, which writes reject
        tracing::warn!("Recipe dependency cycle detected during recalculation");
        let missing: Vec<i64> = recipe_ids
            .iter()
            .copied()
            .filter(|id| !result.contains(id))
            .collect();
        result.extend(missing);
    }

    Ok(result)
}
