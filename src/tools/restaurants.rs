//! Restaurant MCP Tools
//!
//! Tenant management. Creating and deleting restaurants is reserved for
//! administrators; masters may edit their own restaurant's profile.

use serde::Serialize;

use crate::auth::Session;
use crate::db::Database;
use crate::models::{
    recalculate_restaurant, ActivityAction, EntityKind, Ingredient, IngredientFilter, Recipe,
    Restaurant, RestaurantCreate, RestaurantUpdate, TechnicalSheet,
};

use super::{log_activity, paging};

/// Restaurant with catalog sizes
#[derive(Debug, Serialize)]
pub struct RestaurantDetail {
    #[serde(flatten)]
    pub restaurant: Restaurant,
    pub ingredient_count: i64,
    pub recipe_count: i64,
    pub technical_sheet_count: i64,
}

/// Response for list_restaurants
#[derive(Debug, Serialize)]
pub struct ListRestaurantsResponse {
    pub restaurants: Vec<Restaurant>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

/// Response for update_restaurant
#[derive(Debug, Serialize)]
pub struct UpdateRestaurantResponse {
    pub restaurant: Restaurant,
    pub recipes_recalculated: i64,
    pub sheets_recalculated: i64,
}

/// Response for delete_restaurant
#[derive(Debug, Serialize)]
pub struct DeleteRestaurantResponse {
    pub success: bool,
    pub deleted_id: i64,
}

fn validate_markup(factor: Option<f64>) -> Result<(), String> {
    match factor {
        Some(f) if !f.is_finite() || f < 0.0 => {
            Err("markup_factor must be a non-negative number".to_string())
        }
        _ => Ok(()),
    }
}

/// Create a restaurant
pub fn create_restaurant(
    db: &Database,
    session: &Session,
    mut data: RestaurantCreate,
) -> Result<Restaurant, String> {
    session.require_admin().map_err(|e| e.to_string())?;

    data.name = data.name.trim().to_string();
    data.cnpj = data.cnpj.trim().to_string();
    if data.name.is_empty() {
        return Err("Restaurant name cannot be empty".to_string());
    }
    if data.cnpj.is_empty() {
        return Err("CNPJ cannot be empty".to_string());
    }
    validate_markup(data.markup_factor)?;

    db.with_transaction(|tx| {
        if Restaurant::cnpj_taken(tx, &data.cnpj, None)? {
            return Err(crate::db::DbError::Constraint(format!(
                "A restaurant with CNPJ {} already exists",
                data.cnpj
            )));
        }
        let restaurant = Restaurant::create(tx, &data)?;
        log_activity(
            tx,
            session,
            Some(restaurant.id),
            EntityKind::Restaurante,
            ActivityAction::Criado,
            &restaurant.name,
            format!("CNPJ {}", restaurant.cnpj),
        )
        .map_err(crate::db::DbError::Constraint)?;
        Ok(restaurant)
    })
    .map(|restaurant| {
        tracing::info!(id = restaurant.id, name = %restaurant.name, "Created restaurant");
        restaurant
    })
    .map_err(|e| format!("Failed to create restaurant: {}", e))
}

/// Get a restaurant with catalog counts
pub fn get_restaurant(db: &Database, session: &Session, id: i64) -> Result<Option<RestaurantDetail>, String> {
    session.require_view(id).map_err(|e| e.to_string())?;

    let conn = db.get_conn().map_err(|e| format!("Database error: {}", e))?;

    let restaurant = Restaurant::get_by_id(&conn, id)
        .map_err(|e| format!("Failed to get restaurant: {}", e))?;
    let Some(restaurant) = restaurant else {
        return Ok(None);
    };

    let ingredient_count = Ingredient::count(
        &conn,
        &IngredientFilter {
            restaurant_id: Some(id),
            ..Default::default()
        },
    )
    .map_err(|e| format!("Failed to count ingredients: {}", e))?;
    let recipe_count = Recipe::count(&conn, Some(id), None, None)
        .map_err(|e| format!("Failed to count recipes: {}", e))?;
    let technical_sheet_count = TechnicalSheet::count(&conn, Some(id), None, None)
        .map_err(|e| format!("Failed to count technical sheets: {}", e))?;

    Ok(Some(RestaurantDetail {
        restaurant,
        ingredient_count,
        recipe_count,
        technical_sheet_count,
    }))
}

/// List the restaurants visible to the session
pub fn list_restaurants(
    db: &Database,
    session: &Session,
    query: Option<&str>,
    limit: i64,
    offset: i64,
) -> Result<ListRestaurantsResponse, String> {
    let (limit, offset) = paging(limit, offset);
    let visible = session.visible_restaurants();

    let conn = db.get_conn().map_err(|e| format!("Database error: {}", e))?;

    let restaurants = Restaurant::list(&conn, visible.as_deref(), query, limit, offset)
        .map_err(|e| format!("Failed to list restaurants: {}", e))?;
    let total = Restaurant::count(&conn, visible.as_deref())
        .map_err(|e| format!("Failed to count restaurants: {}", e))?;

    Ok(ListRestaurantsResponse {
        restaurants,
        total,
        limit,
        offset,
    })
}

/// Update a restaurant; a new markup factor reprices every recipe and sheet
pub fn update_restaurant(
    db: &Database,
    session: &Session,
    id: i64,
    mut data: RestaurantUpdate,
) -> Result<UpdateRestaurantResponse, String> {
    session.require_edit_restaurant(id).map_err(|e| e.to_string())?;
    validate_markup(data.markup_factor)?;
    if let Some(name) = data.name.as_mut() {
        *name = name.trim().to_string();
        if name.is_empty() {
            return Err("Restaurant name cannot be empty".to_string());
        }
    }
    if let Some(cnpj) = data.cnpj.as_mut() {
        *cnpj = cnpj.trim().to_string();
        if cnpj.is_empty() {
            return Err("CNPJ cannot be empty".to_string());
        }
    }

    db.with_transaction(|tx| {
        let before = Restaurant::get_by_id(tx, id)?
            .ok_or_else(|| crate::db::DbError::Constraint(format!("Restaurant not found with id: {}", id)))?;

        if let Some(ref cnpj) = data.cnpj {
            if Restaurant::cnpj_taken(tx, cnpj, Some(id))? {
                return Err(crate::db::DbError::Constraint(format!(
                    "A restaurant with CNPJ {} already exists",
                    cnpj
                )));
            }
        }

        let restaurant = Restaurant::update(tx, id, &data)?
            .ok_or_else(|| crate::db::DbError::Constraint(format!("Restaurant not found with id: {}", id)))?;

        let cascade = if restaurant.markup_factor != before.markup_factor {
            recalculate_restaurant(tx, id)?
        } else {
            Default::default()
        };

        log_activity(
            tx,
            session,
            Some(id),
            EntityKind::Restaurante,
            ActivityAction::Editado,
            &restaurant.name,
            String::new(),
        )
        .map_err(crate::db::DbError::Constraint)?;

        Ok(UpdateRestaurantResponse {
            restaurant,
            recipes_recalculated: cascade.recipes_recalculated,
            sheets_recalculated: cascade.sheets_recalculated,
        })
    })
    .map_err(|e| format!("Failed to update restaurant: {}", e))
}

/// Delete a restaurant with its whole catalog
pub fn delete_restaurant(db: &Database, session: &Session, id: i64) -> Result<DeleteRestaurantResponse, String> {
    session.require_admin().map_err(|e| e.to_string())?;

    db.with_transaction(|tx| {
        let restaurant = Restaurant::get_by_id(tx, id)?
            .ok_or_else(|| crate::db::DbError::Constraint(format!("Restaurant not found with id: {}", id)))?;
        Restaurant::delete(tx, id)?;
        log_activity(
            tx,
            session,
            None,
            EntityKind::Restaurante,
            ActivityAction::Excluido,
            &restaurant.name,
            format!("CNPJ {}", restaurant.cnpj),
        )
        .map_err(crate::db::DbError::Constraint)?;
        Ok(())
    })
    .map_err(|e| format!("Failed to delete restaurant: {}", e))?;

    tracing::info!(id, "Deleted restaurant");
    Ok(DeleteRestaurantResponse {
        success: true,
        deleted_id: id,
    })
}
