//! Dashboard tool
//!
//! Catalog sizes, average recipe cost and the latest activity for the
//! restaurants the session can see.

use serde::Serialize;

use crate::auth::Session;
use crate::db::Database;
use crate::models::{ActivityEntry, ActivityFilter, Ingredient, IngredientFilter, Recipe, Restaurant, TechnicalSheet};

const RECENT_ACTIVITY: i64 = 5;

/// Response for dashboard
#[derive(Debug, Serialize)]
pub struct DashboardResponse {
    pub restaurant_id: Option<i64>,
    pub restaurant_count: i64,
    pub ingredient_count: i64,
    pub recipe_count: i64,
    pub technical_sheet_count: i64,
    /// Mean stored cost of recipes with a cost, over restaurants whose costs
    /// the session may see
    pub average_recipe_cost: Option<f64>,
    pub recent_activity: Vec<ActivityEntry>,
}

/// Summary figures, optionally scoped to one restaurant
pub fn dashboard(db: &Database, session: &Session, restaurant_id: Option<i64>) -> Result<DashboardResponse, String> {
    let visible: Option<Vec<i64>> = match restaurant_id {
        Some(id) => {
            session.require_view(id).map_err(|e| e.to_string())?;
            Some(vec![id])
        }
        None => session.visible_restaurants(),
    };
    let cost_scope: Option<Vec<i64>> = match &visible {
        Some(ids) => Some(ids.iter().copied().filter(|id| session.can_see_costs(*id)).collect()),
        None => None,
    };

    let conn = db.get_conn().map_err(|e| format!("Database error: {}", e))?;

    let restaurant_count = Restaurant::count(&conn, visible.as_deref())
        .map_err(|e| format!("Failed to count restaurants: {}", e))?;
    let ingredient_count = Ingredient::count(
        &conn,
        &IngredientFilter {
            visible_restaurants: visible.clone(),
            ..Default::default()
        },
    )
    .map_err(|e| format!("Failed to count ingredients: {}", e))?;
    let recipe_count = Recipe::count(&conn, None, visible.as_deref(), None)
        .map_err(|e| format!("Failed to count recipes: {}", e))?;
    let technical_sheet_count = TechnicalSheet::count(&conn, None, visible.as_deref(), None)
        .map_err(|e| format!("Failed to count technical sheets: {}", e))?;

    let average_recipe_cost = match cost_scope.as_deref() {
        Some([]) => None,
        scope => Recipe::average_cost(&conn, scope)
            .map_err(|e| format!("Failed to average recipe costs: {}", e))?
            .map(crate::costing::numbers::round2),
    };

    let recent_activity = ActivityEntry::list(
        &conn,
        &ActivityFilter {
            visible_restaurants: visible.clone(),
            ..Default::default()
        },
        RECENT_ACTIVITY,
        0,
    )
    .map_err(|e| format!("Failed to list activity: {}", e))?;

    Ok(DashboardResponse {
        restaurant_id,
        restaurant_count,
        ingredient_count,
        recipe_count,
        technical_sheet_count,
        average_recipe_cost,
        recent_activity,
    })
}
