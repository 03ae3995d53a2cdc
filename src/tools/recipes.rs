//! Recipe MCP Tools
//!
//! Tools for managing recipes (receitas). A save replaces the full item list,
//! recalculates the recipe's stored costs and cascades the new total into
//! every recipe and technical sheet that uses it.

use rusqlite::Connection;
use serde::Serialize;

use crate::auth::Session;
use crate::costing::{breakdown, CostBreakdown, ItemSource, LineItem};
use crate::db::{Database, DbError, DbResult};
use crate::models::line_item::{load_item_details, replace_items, validate_items};
use crate::models::{
    cascade_from_recipe, compute_recipe_costs, load_catalog, recalculate_recipe_costs,
    ActivityAction, EntityKind, ItemOwner, LineItemDetail, Recipe, RecipeFields, Restaurant,
    StoredCosts,
};

use super::{log_activity, paging, visible_cost};

/// Recipe as returned by the tools; cost fields are null for roles that
/// cannot see costs
#[derive(Debug, Serialize)]
pub struct RecipeView {
    pub id: i64,
    pub restaurant_id: i64,
    pub name: String,
    pub prep_time_minutes: i64,
    pub portion_size: f64,
    pub method: String,
    pub yield_note: Option<String>,
    pub final_weight: Option<f64>,
    pub yield_portions: Option<f64>,
    pub total_cost: Option<f64>,
    pub restaurant_price: Option<f64>,
    pub delivery_price: Option<f64>,
    pub created_at: String,
    pub updated_at: String,
}

impl RecipeView {
    pub fn new(session: &Session, recipe: Recipe) -> Self {
        let rid = recipe.restaurant_id;
        Self {
            id: recipe.id,
            restaurant_id: rid,
            name: recipe.name,
            prep_time_minutes: recipe.prep_time_minutes,
            portion_size: recipe.portion_size,
            method: recipe.method,
            yield_note: recipe.yield_note,
            final_weight: recipe.final_weight,
            yield_portions: recipe.yield_portions,
            total_cost: visible_cost(session, rid, recipe.total_cost),
            restaurant_price: visible_cost(session, rid, recipe.restaurant_price),
            delivery_price: visible_cost(session, rid, recipe.delivery_price),
            created_at: recipe.created_at,
            updated_at: recipe.updated_at,
        }
    }
}

/// A stored line item with its calculated weight and cost
#[derive(Debug, Serialize)]
pub struct ItemView {
    #[serde(flatten)]
    pub detail: LineItemDetail,
    pub adjusted_weight: f64,
    pub adjusted_cost: Option<f64>,
}

/// Pair stored items with the calculator's per-item figures
pub(crate) fn item_views(
    session: &Session,
    restaurant_id: i64,
    details: Vec<LineItemDetail>,
    result: &CostBreakdown,
) -> Vec<ItemView> {
    details
        .into_iter()
        .zip(result.items.iter())
        .map(|(detail, cost)| ItemView {
            detail,
            adjusted_weight: cost.adjusted_weight,
            adjusted_cost: visible_cost(session, restaurant_id, Some(cost.adjusted_cost)),
        })
        .collect()
}

/// Full recipe with its items
#[derive(Debug, Serialize)]
pub struct RecipeDetail {
    #[serde(flatten)]
    pub recipe: RecipeView,
    pub items: Vec<ItemView>,
    /// Recipes and technical sheets using this recipe
    pub usage_count: i64,
}

/// Response for list_recipes
#[derive(Debug, Serialize)]
pub struct ListRecipesResponse {
    pub recipes: Vec<RecipeView>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

/// Response for save_recipe
#[derive(Debug, Serialize)]
pub struct SaveRecipeResponse {
    pub created: bool,
    pub recipe: RecipeDetail,
    pub recipes_recalculated: i64,
    pub sheets_recalculated: i64,
}

/// Response for recalculate_recipe
#[derive(Debug, Serialize)]
pub struct RecalculateRecipeResponse {
    pub recipe_id: i64,
    pub final_weight: f64,
    pub yield_portions: Option<f64>,
    pub total_cost: Option<f64>,
    pub restaurant_price: Option<f64>,
    pub delivery_price: Option<f64>,
    pub recipes_recalculated: i64,
    pub sheets_recalculated: i64,
}

/// Per-item figures of a preview
#[derive(Debug, Serialize)]
pub struct PreviewItem {
    pub position: usize,
    pub source: ItemSource,
    pub adjusted_weight: f64,
    pub adjusted_cost: Option<f64>,
}

/// Calculator output for an unsaved item list
#[derive(Debug, Serialize)]
pub struct CostPreview {
    pub items: Vec<PreviewItem>,
    pub final_weight: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub yield_portions: Option<f64>,
    pub total_cost: Option<f64>,
    pub restaurant_price: Option<f64>,
    pub delivery_price: Option<f64>,
}

impl CostPreview {
    pub(crate) fn new(session: &Session, restaurant_id: i64, result: CostBreakdown, costs: StoredCosts) -> Self {
        let items = result
            .items
            .into_iter()
            .map(|item| PreviewItem {
                position: item.position,
                source: item.source,
                adjusted_weight: item.adjusted_weight,
                adjusted_cost: visible_cost(session, restaurant_id, Some(item.adjusted_cost)),
            })
            .collect();
        Self {
            items,
            final_weight: costs.final_weight,
            yield_portions: costs.yield_portions,
            total_cost: visible_cost(session, restaurant_id, Some(costs.total_cost)),
            restaurant_price: visible_cost(session, restaurant_id, Some(costs.restaurant_price)),
            delivery_price: visible_cost(session, restaurant_id, Some(costs.delivery_price)),
        }
    }
}

/// Response for delete blocked
#[derive(Debug, Serialize)]
pub struct RecipeDeleteBlockedResponse {
    pub error: String,
    pub usage_count: i64,
}

/// Response for successful delete
#[derive(Debug, Serialize)]
pub struct RecipeDeleteSuccessResponse {
    pub success: bool,
    pub deleted_id: i64,
}

pub(crate) fn restaurant_markup(conn: &Connection, restaurant_id: i64) -> DbResult<Option<f64>> {
    Ok(Restaurant::get_by_id(conn, restaurant_id)?.map(|r| r.markup_factor))
}

fn validate_fields(fields: &mut RecipeFields) -> Result<(), String> {
    fields.name = fields.name.trim().to_string();
    if fields.name.is_empty() {
        return Err("Recipe name cannot be empty".to_string());
    }
    if !fields.portion_size.is_finite() || fields.portion_size < 0.0 {
        return Err("portion_size cannot be negative".to_string());
    }
    if fields.prep_time_minutes < 0 {
        return Err("prep_time_minutes cannot be negative".to_string());
    }
    Ok(())
}

fn recipe_detail(conn: &Connection, session: &Session, recipe: Recipe) -> DbResult<RecipeDetail> {
    let catalog = load_catalog(conn, recipe.restaurant_id)?;
    let details = load_item_details(conn, ItemOwner::Recipe(recipe.id))?;
    let items: Vec<LineItem> = details.iter().map(|d| d.item.clone()).collect();
    let result = breakdown(Some(recipe.id), &items, &catalog)?;
    let usage_count = Recipe::usage_count(conn, recipe.id)?;
    let restaurant_id = recipe.restaurant_id;

    Ok(RecipeDetail {
        recipe: RecipeView::new(session, recipe),
        items: item_views(session, restaurant_id, details, &result),
        usage_count,
    })
}

/// Create a recipe (`id` absent) or replace an existing one's fields and items
pub fn save_recipe(
    db: &Database,
    session: &Session,
    id: Option<i64>,
    restaurant_id: Option<i64>,
    mut fields: RecipeFields,
    items: Vec<LineItem>,
) -> Result<SaveRecipeResponse, String> {
    validate_fields(&mut fields)?;

    let restaurant_id = match id {
        Some(id) => {
            let conn = db.get_conn().map_err(|e| format!("Database error: {}", e))?;
            let existing = Recipe::get_by_id(&conn, id)
                .map_err(|e| format!("Database error: {}", e))?
                .ok_or_else(|| format!("Recipe not found with id: {}", id))?;
            if restaurant_id.is_some_and(|r| r != existing.restaurant_id) {
                return Err("A recipe cannot be moved to another restaurant".to_string());
            }
            existing.restaurant_id
        }
        None => restaurant_id.ok_or("restaurant_id is required to create a recipe")?,
    };
    session
        .require_edit_catalog(restaurant_id)
        .map_err(|e| e.to_string())?;

    let (recipe_id, cascade) = db
        .with_transaction(|tx| {
            let recipe = match id {
                Some(id) => Recipe::update_fields(tx, id, &fields)?
                    .ok_or_else(|| DbError::Constraint(format!("Recipe not found with id: {}", id)))?,
                None => Recipe::create(tx, restaurant_id, &fields)?,
            };
            let owner = ItemOwner::Recipe(recipe.id);
            validate_items(tx, owner, restaurant_id, &items)?;
            replace_items(tx, owner, &items)?;
            recalculate_recipe_costs(tx, recipe.id)?;

            let cascade = if id.is_some() {
                cascade_from_recipe(tx, recipe.id)?
            } else {
                Default::default()
            };

            log_activity(
                tx,
                session,
                Some(restaurant_id),
                EntityKind::Receita,
                if id.is_some() { ActivityAction::Editado } else { ActivityAction::Criado },
                &recipe.name,
                format!("{} item(s)", items.len()),
            )
            .map_err(DbError::Constraint)?;
            Ok((recipe.id, cascade))
        })
        .map_err(|e| format!("Failed to save recipe: {}", e))?;

    tracing::info!(recipe_id, created = id.is_none(), "Saved recipe");

    let conn = db.get_conn().map_err(|e| format!("Database error: {}", e))?;
    let recipe = Recipe::get_by_id(&conn, recipe_id)
        .map_err(|e| format!("Failed to get recipe: {}", e))?
        .ok_or_else(|| format!("Recipe not found with id: {}", recipe_id))?;
    let detail = recipe_detail(&conn, session, recipe).map_err(|e| format!("Failed to get recipe: {}", e))?;

    Ok(SaveRecipeResponse {
        created: id.is_none(),
        recipe: detail,
        recipes_recalculated: cascade.recipes_recalculated,
        sheets_recalculated: cascade.sheets_recalculated,
    })
}

/// Get a recipe with its items
pub fn get_recipe(db: &Database, session: &Session, id: i64) -> Result<Option<RecipeDetail>, String> {
    let conn = db.get_conn().map_err(|e| format!("Database error: {}", e))?;

    let recipe = Recipe::get_by_id(&conn, id).map_err(|e| format!("Failed to get recipe: {}", e))?;
    let Some(recipe) = recipe else {
        return Ok(None);
    };
    session.require_view(recipe.restaurant_id).map_err(|e| e.to_string())?;

    recipe_detail(&conn, session, recipe)
        .map(Some)
        .map_err(|e| format!("Failed to get recipe: {}", e))
}

/// List recipes
#[allow(clippy::too_many_arguments)]
pub fn list_recipes(
    db: &Database,
    session: &Session,
    restaurant_id: Option<i64>,
    query: Option<&str>,
    sort_by: &str,
    sort_order: &str,
    limit: i64,
    offset: i64,
) -> Result<ListRecipesResponse, String> {
    let (limit, offset) = paging(limit, offset);
    if let Some(restaurant_id) = restaurant_id {
        session.require_view(restaurant_id).map_err(|e| e.to_string())?;
    }
    let visible = session.visible_restaurants();

    let conn = db.get_conn().map_err(|e| format!("Database error: {}", e))?;

    let recipes = Recipe::list(
        &conn,
        restaurant_id,
        visible.as_deref(),
        query,
        sort_by,
        sort_order,
        limit,
        offset,
    )
    .map_err(|e| format!("Failed to list recipes: {}", e))?;
    let total = Recipe::count(&conn, restaurant_id, visible.as_deref(), query)
        .map_err(|e| format!("Failed to count recipes: {}", e))?;

    Ok(ListRecipesResponse {
        recipes: recipes.into_iter().map(|r| RecipeView::new(session, r)).collect(),
        total,
        limit,
        offset,
    })
}

/// Delete a recipe (blocked while other recipes or sheets use it)
pub fn delete_recipe(
    db: &Database,
    session: &Session,
    id: i64,
) -> Result<Result<RecipeDeleteSuccessResponse, RecipeDeleteBlockedResponse>, String> {
    let conn = db.get_conn().map_err(|e| format!("Database error: {}", e))?;

    let recipe = Recipe::get_by_id(&conn, id)
        .map_err(|e| format!("Database error: {}", e))?
        .ok_or_else(|| format!("Recipe not found with id: {}", id))?;
    session
        .require_edit_catalog(recipe.restaurant_id)
        .map_err(|e| e.to_string())?;

    let usage_count = Recipe::usage_count(&conn, id).map_err(|e| format!("Failed to check usage: {}", e))?;
    if usage_count > 0 {
        return Ok(Err(RecipeDeleteBlockedResponse {
            error: format!(
                "Cannot delete recipe: used by {} recipe or technical sheet item(s)",
                usage_count
            ),
            usage_count,
        }));
    }
    drop(conn);

    db.with_transaction(|tx| {
        Recipe::delete(tx, id)?;
        log_activity(
            tx,
            session,
            Some(recipe.restaurant_id),
            EntityKind::Receita,
            ActivityAction::Excluido,
            &recipe.name,
            String::new(),
        )
        .map_err(DbError::Constraint)?;
        Ok(())
    })
    .map_err(|e| format!("Failed to delete recipe: {}", e))?;

    Ok(Ok(RecipeDeleteSuccessResponse {
        success: true,
        deleted_id: id,
    }))
}

/// Recompute a recipe's stored costs and everything depending on it
pub fn recalculate_recipe(db: &Database, session: &Session, id: i64) -> Result<RecalculateRecipeResponse, String> {
    let conn = db.get_conn().map_err(|e| format!("Database error: {}", e))?;
    let recipe = Recipe::get_by_id(&conn, id)
        .map_err(|e| format!("Database error: {}", e))?
        .ok_or_else(|| format!("Recipe not found with id: {}", id))?;
    drop(conn);
    session
        .require_edit_catalog(recipe.restaurant_id)
        .map_err(|e| e.to_string())?;

    let (costs, cascade) = db
        .with_transaction(|tx| {
            let costs = recalculate_recipe_costs(tx, id)?;
            let cascade = cascade_from_recipe(tx, id)?;
            log_activity(
                tx,
                session,
                Some(recipe.restaurant_id),
                EntityKind::Receita,
                ActivityAction::Editado,
                &recipe.name,
                "custos recalculados".to_string(),
            )
            .map_err(DbError::Constraint)?;
            Ok((costs, cascade))
        })
        .map_err(|e| format!("Failed to recalculate recipe: {}", e))?;

    let rid = recipe.restaurant_id;
    Ok(RecalculateRecipeResponse {
        recipe_id: id,
        final_weight: costs.final_weight,
        yield_portions: costs.yield_portions,
        total_cost: visible_cost(session, rid, Some(costs.total_cost)),
        restaurant_price: visible_cost(session, rid, Some(costs.restaurant_price)),
        delivery_price: visible_cost(session, rid, Some(costs.delivery_price)),
        recipes_recalculated: cascade.recipes_recalculated,
        sheets_recalculated: cascade.sheets_recalculated,
    })
}

/// Run the calculator over an unsaved item list. Pass `recipe_id` when
/// previewing edits to an existing recipe so self references are caught.
pub fn preview_recipe_costs(
    db: &Database,
    session: &Session,
    restaurant_id: i64,
    recipe_id: Option<i64>,
    portion_size: f64,
    items: Vec<LineItem>,
) -> Result<CostPreview, String> {
    session.require_view(restaurant_id).map_err(|e| e.to_string())?;

    let conn = db.get_conn().map_err(|e| format!("Database error: {}", e))?;
    let markup = restaurant_markup(&conn, restaurant_id)
        .map_err(|e| format!("Database error: {}", e))?
        .ok_or_else(|| format!("Restaurant not found with id: {}", restaurant_id))?;
    let catalog = load_catalog(&conn, restaurant_id).map_err(|e| format!("Failed to load catalog: {}", e))?;

    let (result, costs) = compute_recipe_costs(recipe_id, &items, portion_size, Some(markup), &catalog)
        .map_err(|e| format!("Failed to preview costs: {}", e))?;

    Ok(CostPreview::new(session, restaurant_id, result, costs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;
    use crate::costing::{CookingDirection, Unit};
    use crate::models::{Ingredient, IngredientCreate, IngredientUpdate};
    use crate::tools::ingredients::update_ingredient;
    use crate::tools::test_support::{fixture, Fixture};

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 0.005
    }

    fn add_flour(fx: &Fixture) -> i64 {
        fx.db
            .with_conn(|conn| {
                Ingredient::create(
                    conn,
                    &IngredientCreate {
                        restaurant_id: fx.restaurant_id,
                        category_id: None,
                        name: "Farinha".to_string(),
                        reference_weight: 1000.0,
                        unit: Unit::Grams,
                        reference_price: 10.0,
                    },
                )
            })
            .unwrap()
            .id
    }

    fn fields(name: &str) -> RecipeFields {
        RecipeFields {
            name: name.to_string(),
            portion_size: 100.0,
            ..Default::default()
        }
    }

    fn save(fx: &Fixture, id: Option<i64>, name: &str, items: Vec<LineItem>) -> Result<SaveRecipeResponse, String> {
        save_recipe(&fx.db, &fx.admin, id, Some(fx.restaurant_id), fields(name), items)
    }

    #[test]
    fn test_save_stores_adjusted_totals_and_prices() {
        let fx = fixture();
        let flour = add_flour(&fx);
        let item = LineItem::ingredient(flour, 200.0).with_indices(80.0, 90.0, CookingDirection::Mais);

        let saved = save(&fx, None, "Massa", vec![item]).unwrap();
        assert!(saved.created);
        let recipe = &saved.recipe.recipe;
        assert!(approx(recipe.total_cost.unwrap(), 1.44));
        assert!(approx(recipe.final_weight.unwrap(), 277.78));
        assert!(approx(recipe.yield_portions.unwrap(), 2.7778));
        assert_eq!(recipe.restaurant_price, Some(2.16));
        assert_eq!(recipe.delivery_price, Some(2.42));
        assert_eq!(saved.recipe.items.len(), 1);
        assert_eq!(saved.recipe.items[0].detail.source_name.as_deref(), Some("Farinha"));
        assert_eq!(fx.activity_count(), 1);
    }

    #[test]
    fn test_resave_replaces_items() {
        let fx = fixture();
        let flour = add_flour(&fx);
        let first = save(&fx, None, "Massa", vec![LineItem::ingredient(flour, 100.0); 3]).unwrap();
        let id = first.recipe.recipe.id;

        let second = save(&fx, Some(id), "Massa fina", vec![LineItem::ingredient(flour, 500.0)]).unwrap();
        assert!(!second.created);
        assert_eq!(second.recipe.items.len(), 1);
        assert_eq!(second.recipe.recipe.name, "Massa fina");
        assert!(approx(second.recipe.recipe.total_cost.unwrap(), 5.0));
    }

    #[test]
    fn test_ingredient_price_change_cascades_through_nested_recipes() {
        let fx = fixture();
        let flour = add_flour(&fx);
        let base = save(&fx, None, "Base", vec![LineItem::ingredient(flour, 200.0)]).unwrap();
        let base_id = base.recipe.recipe.id;
        let top = save(&fx, None, "Topo", vec![LineItem::recipe(base_id, 100.0)]).unwrap();
        assert!(approx(top.recipe.recipe.total_cost.unwrap(), 1.0));

        let update = IngredientUpdate {
            reference_price: Some(20.0),
            ..Default::default()
        };
        let updated = update_ingredient(&fx.db, &fx.admin, flour, update).unwrap();
        assert_eq!(updated.recipes_recalculated, 2);

        let top = get_recipe(&fx.db, &fx.admin, top.recipe.recipe.id).unwrap().unwrap();
        assert!(approx(top.recipe.total_cost.unwrap(), 2.0));
    }

    #[test]
    fn test_cycles_are_rejected() {
        let fx = fixture();
        let flour = add_flour(&fx);
        let a = save(&fx, None, "A", vec![LineItem::ingredient(flour, 100.0)]).unwrap().recipe.recipe.id;
        let b = save(&fx, None, "B", vec![LineItem::recipe(a, 50.0)]).unwrap().recipe.recipe.id;

        let err = save(&fx, Some(a), "A", vec![LineItem::recipe(b, 10.0)]).unwrap_err();
        assert!(err.contains("contain itself"));
        let self_ref = save(&fx, Some(a), "A", vec![LineItem::recipe(a, 10.0)]).unwrap_err();
        assert!(self_ref.contains("contain itself"));

        // rolled back: A still has its flour item
        let a = get_recipe(&fx.db, &fx.admin, a).unwrap().unwrap();
        assert_eq!(a.items.len(), 1);
    }

    #[test]
    fn test_out_of_range_indices_are_not_saved() {
        let fx = fixture();
        let flour = add_flour(&fx);
        let item = LineItem::ingredient(flour, 100.0).with_indices(5000.0, -30.0, CookingDirection::Menos);

        let err = save(&fx, None, "Massa", vec![item]).unwrap_err();
        assert!(err.contains("IC"));
        assert!(save(&fx, None, "Massa", vec![LineItem::ingredient(flour, 0.0)]).is_err());
        assert_eq!(fx.activity_count(), 0);
    }

    #[test]
    fn test_redator_sees_weights_but_no_costs() {
        let fx = fixture();
        let flour = add_flour(&fx);
        let redator = fx.member("r", Role::Redator);
        let saved = save_recipe(
            &fx.db,
            &redator,
            None,
            Some(fx.restaurant_id),
            fields("Massa"),
            vec![LineItem::ingredient(flour, 200.0)],
        )
        .unwrap();

        let recipe = saved.recipe.recipe;
        assert_eq!(recipe.total_cost, None);
        assert_eq!(recipe.delivery_price, None);
        assert!(approx(recipe.final_weight.unwrap(), 200.0));
        assert_eq!(saved.recipe.items[0].adjusted_cost, None);

        let user = fx.member("u", Role::UsuarioComum);
        assert!(save_recipe(&fx.db, &user, None, Some(fx.restaurant_id), fields("X"), vec![]).is_err());
    }

    #[test]
    fn test_items_from_another_restaurant_are_rejected() {
        let fx = fixture();
        let flour = add_flour(&fx);
        let err = save_recipe(
            &fx.db,
            &fx.admin,
            None,
            Some(fx.other_restaurant_id),
            fields("Outra"),
            vec![LineItem::ingredient(flour, 10.0)],
        )
        .unwrap_err();
        assert!(err.contains("another restaurant"));
    }

    #[test]
    fn test_delete_blocked_while_used() {
        let fx = fixture();
        let flour = add_flour(&fx);
        let base = save(&fx, None, "Base", vec![LineItem::ingredient(flour, 200.0)]).unwrap().recipe.recipe.id;
        let top = save(&fx, None, "Topo", vec![LineItem::recipe(base, 100.0)]).unwrap().recipe.recipe.id;

        let blocked = delete_recipe(&fx.db, &fx.admin, base).unwrap();
        assert!(matches!(blocked, Err(ref b) if b.usage_count == 1));

        assert!(delete_recipe(&fx.db, &fx.admin, top).unwrap().is_ok());
        assert!(delete_recipe(&fx.db, &fx.admin, base).unwrap().is_ok());
    }

    #[test]
    fn test_preview_does_not_write() {
        let fx = fixture();
        let flour = add_flour(&fx);
        let items = vec![LineItem::ingredient(flour, 200.0).with_indices(80.0, 90.0, CookingDirection::Mais)];
        let preview = preview_recipe_costs(&fx.db, &fx.admin, fx.restaurant_id, None, 0.0, items).unwrap();
        assert!(approx(preview.total_cost.unwrap(), 1.44));
        assert_eq!(preview.yield_portions, Some(0.0));

        let listed = list_recipes(&fx.db, &fx.admin, Some(fx.restaurant_id), None, "name", "asc", 50, 0).unwrap();
        assert_eq!(listed.total, 0);
        assert_eq!(fx.activity_count(), 0);
    }

    #[test]
    fn test_recalculate_recipe() {
        let fx = fixture();
        let flour = add_flour(&fx);
        let id = save(&fx, None, "Base", vec![LineItem::ingredient(flour, 200.0)]).unwrap().recipe.recipe.id;
        let result = recalculate_recipe(&fx.db, &fx.admin, id).unwrap();
        assert!(approx(result.total_cost.unwrap(), 2.0));
        assert_eq!(result.restaurant_price, Some(3.0));
    }
}
