//! FichaPro MCP Server Implementation
//!
//! Implements the MCP server with all FichaPro tools. The signed-in user is
//! held by the service and passed explicitly to every tool function.

use std::path::PathBuf;
use std::sync::Arc;

use rmcp::handler::server::router::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::{
    CallToolResult, Content, Implementation, ProtocolVersion, ServerCapabilities, ServerInfo,
};
use rmcp::{schemars, tool, tool_handler, tool_router, ErrorData as McpError, ServerHandler};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::auth::{require_session, Role, Session};
use crate::costing::calculator::NEUTRAL_INDEX;
use crate::costing::numbers::{lenient_f64, lenient_opt_f64};
use crate::costing::{CookingDirection, LineItem, Unit};
use crate::db::Database;
use crate::models::{
    IngredientCreate, IngredientFilter, IngredientUpdate, RecipeFields, RestaurantCreate,
    RestaurantUpdate, SheetFields, UserCreate, UserUpdate,
};
use crate::tools::activity::{self, ActivityQuery};
use crate::tools::status::{costing_instructions, StatusTracker};
use crate::tools::users::{self, RoleAssignment};
use crate::tools::{
    categories, dashboard, ingredients, recipes, restaurants, session, technical_sheets,
};

/// FichaPro MCP Service
#[derive(Clone)]
pub struct FichaproService {
    status_tracker: Arc<Mutex<StatusTracker>>,
    database: Database,
    session: Arc<std::sync::Mutex<Option<Session>>>,
    tool_router: ToolRouter<FichaproService>,
}

impl FichaproService {
    pub fn new(database_path: PathBuf, database: Database) -> Self {
        Self {
            status_tracker: Arc::new(Mutex::new(StatusTracker::new(database_path))),
            database,
            session: Arc::new(std::sync::Mutex::new(None)),
            tool_router: Self::tool_router(),
        }
    }

    /// Current session reloaded from the database, or an error when nobody
    /// is signed in. A deleted or deactivated account is signed out.
    fn current_session(&self) -> Result<Session, McpError> {
        let snapshot = {
            let guard = self
                .session
                .lock()
                .map_err(|_| McpError::internal_error("Session lock poisoned", None))?;
            require_session(guard.as_ref())
                .cloned()
                .map_err(|e| McpError::internal_error(e.to_string(), None))?
        };

        match session::refresh_session(&self.database, &snapshot) {
            Ok(fresh) => {
                self.set_session(Some(fresh.clone()))?;
                Ok(fresh)
            }
            Err(e) => {
                tracing::warn!(username = %snapshot.username, error = %e, "Session no longer valid");
                self.set_session(None)?;
                Err(tool_error(e))
            }
        }
    }

    fn set_session(&self, session: Option<Session>) -> Result<Option<Session>, McpError> {
        let mut guard = self
            .session
            .lock()
            .map_err(|_| McpError::internal_error("Session lock poisoned", None))?;
        Ok(std::mem::replace(&mut *guard, session))
    }
}

fn json_result<T: Serialize>(value: &T) -> Result<CallToolResult, McpError> {
    let json = serde_json::to_string_pretty(value).map_err(|e| McpError::internal_error(e.to_string(), None))?;
    Ok(CallToolResult::success(vec![Content::text(json)]))
}

fn not_found(what: &str, id: i64) -> Result<CallToolResult, McpError> {
    Ok(CallToolResult::success(vec![Content::text(format!(
        r#"{{"error": "{} not found", "id": {}}}"#,
        what, id
    ))]))
}

fn tool_error(e: String) -> McpError {
    McpError::internal_error(e, None)
}

fn default_sort_by() -> String { "name".to_string() }
fn default_sort_order() -> String { "asc".to_string() }
fn default_list_limit() -> i64 { 50 }
fn default_index() -> f64 { NEUTRAL_INDEX }

// ============================================================================
// Session Parameter Structs
// ============================================================================

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct SignInParams {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
struct SignOutResponse {
    success: bool,
    signed_out: Option<String>,
}

// ============================================================================
// Restaurant Parameter Structs
// ============================================================================

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct CreateRestaurantParams {
    pub name: String,
    /// Brazilian company registry number, unique per restaurant
    pub cnpj: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub cep: Option<String>,
    pub street: Option<String>,
    pub number: Option<String>,
    pub complement: Option<String>,
    pub district: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    /// Multiplier from cost to suggested price (default 1)
    #[serde(deserialize_with = "lenient_opt_f64", default)]
    #[schemars(with = "Option<f64>")]
    pub markup_factor: Option<f64>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct IdParams {
    pub id: i64,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct ListRestaurantsParams {
    /// Search by name or CNPJ
    pub query: Option<String>,
    #[serde(default = "default_list_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct UpdateRestaurantParams {
    pub id: i64,
    pub name: Option<String>,
    pub cnpj: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub cep: Option<String>,
    pub street: Option<String>,
    pub number: Option<String>,
    pub complement: Option<String>,
    pub district: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    /// Changing the factor reprices every recipe and technical sheet
    #[serde(deserialize_with = "lenient_opt_f64", default)]
    #[schemars(with = "Option<f64>")]
    pub markup_factor: Option<f64>,
}

// ============================================================================
// Category and Ingredient Parameter Structs
// ============================================================================

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct CreateCategoryParams {
    pub restaurant_id: i64,
    pub name: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct RestaurantIdParams {
    pub restaurant_id: i64,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct CreateIngredientParams {
    pub restaurant_id: i64,
    pub category_id: Option<i64>,
    pub name: String,
    /// Purchased amount, in `unit`
    #[serde(deserialize_with = "lenient_f64", default)]
    #[schemars(with = "f64")]
    pub reference_weight: f64,
    /// g, ml or un
    pub unit: String,
    /// Price paid for `reference_weight`
    #[serde(deserialize_with = "lenient_f64", default)]
    #[schemars(with = "f64")]
    pub reference_price: f64,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct ListIngredientsParams {
    pub restaurant_id: Option<i64>,
    pub category_id: Option<i64>,
    /// Search by name
    pub query: Option<String>,
    /// name, price, unit_cost, category or created_at
    #[serde(default = "default_sort_by")]
    pub sort_by: String,
    #[serde(default = "default_sort_order")]
    pub sort_order: String,
    #[serde(default = "default_list_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct UpdateIngredientParams {
    pub id: i64,
    pub category_id: Option<i64>,
    /// Remove the ingredient from its category
    #[serde(default)]
    pub clear_category: bool,
    pub name: Option<String>,
    #[serde(deserialize_with = "lenient_opt_f64", default)]
    #[schemars(with = "Option<f64>")]
    pub reference_weight: Option<f64>,
    pub unit: Option<String>,
    #[serde(deserialize_with = "lenient_opt_f64", default)]
    #[schemars(with = "Option<f64>")]
    pub reference_price: Option<f64>,
}

// ============================================================================
// Line Item Parameter Structs
// ============================================================================

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct ItemSourceParams {
    /// "ingredient" or "recipe"
    pub kind: String,
    pub id: i64,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct LineItemParams {
    pub source: ItemSourceParams,
    #[serde(deserialize_with = "lenient_f64", default)]
    #[schemars(with = "f64")]
    pub quantity_used: f64,
    /// g, ml or un (default g)
    pub unit: Option<String>,
    /// IC, whole percent (default 100; null means no adjustment)
    #[serde(deserialize_with = "lenient_f64", default = "default_index")]
    #[schemars(with = "f64")]
    pub cooking_index: f64,
    /// IPC, whole percent (default 100; null means no adjustment)
    #[serde(deserialize_with = "lenient_f64", default = "default_index")]
    #[schemars(with = "f64")]
    pub edible_index: f64,
    /// "menos" (default) or "mais"
    pub cooking_direction: Option<String>,
    /// Set false to ignore IC and IPC (default true)
    pub apply_adjustment: Option<bool>,
}

impl LineItemParams {
    fn into_line_item(self, position: usize) -> Result<LineItem, McpError> {
        let item = match self.source.kind.trim().to_lowercase().as_str() {
            "ingredient" | "insumo" => LineItem::ingredient(self.source.id, self.quantity_used),
            "recipe" | "receita" => LineItem::recipe(self.source.id, self.quantity_used),
            other => {
                return Err(McpError::invalid_params(
                    format!("item {}: unknown source kind '{}'", position + 1, other),
                    None,
                ))
            }
        };

        let unit = match self.unit.as_deref() {
            Some(u) => Unit::parse(u).ok_or_else(|| {
                McpError::invalid_params(format!("item {}: invalid unit '{}'", position + 1, u), None)
            })?,
            None => Unit::default(),
        };
        let direction = self
            .cooking_direction
            .as_deref()
            .map(CookingDirection::from_str)
            .unwrap_or_default();

        let item = item
            .with_unit(unit)
            .with_indices(self.cooking_index, self.edible_index, direction);
        Ok(if self.apply_adjustment == Some(false) {
            item.without_adjustment()
        } else {
            item
        })
    }
}

fn line_items(params: Vec<LineItemParams>) -> Result<Vec<LineItem>, McpError> {
    params
        .into_iter()
        .enumerate()
        .map(|(position, p)| p.into_line_item(position))
        .collect()
}

// ============================================================================
// Recipe and Technical Sheet Parameter Structs
// ============================================================================

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct SaveRecipeParams {
    /// Existing recipe to replace; omit to create
    pub id: Option<i64>,
    /// Required when creating
    pub restaurant_id: Option<i64>,
    pub name: String,
    #[serde(default)]
    pub prep_time_minutes: i64,
    /// Weight of one portion, used for the yield
    #[serde(deserialize_with = "lenient_f64", default)]
    #[schemars(with = "f64")]
    pub portion_size: f64,
    #[serde(default)]
    pub method: String,
    pub yield_note: Option<String>,
    /// Complete item list; replaces the stored one
    #[serde(default)]
    pub items: Vec<LineItemParams>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct ListRecipesParams {
    pub restaurant_id: Option<i64>,
    pub query: Option<String>,
    /// name, total_cost, created_at or updated_at
    #[serde(default = "default_sort_by")]
    pub sort_by: String,
    #[serde(default = "default_sort_order")]
    pub sort_order: String,
    #[serde(default = "default_list_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct PreviewRecipeParams {
    pub restaurant_id: i64,
    /// Recipe being edited, if any
    pub recipe_id: Option<i64>,
    #[serde(deserialize_with = "lenient_f64", default)]
    #[schemars(with = "f64")]
    pub portion_size: f64,
    #[serde(default)]
    pub items: Vec<LineItemParams>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct SaveTechnicalSheetParams {
    /// Existing sheet to replace; omit to create
    pub id: Option<i64>,
    /// Required when creating
    pub restaurant_id: Option<i64>,
    pub name: String,
    #[serde(default)]
    pub yield_description: String,
    #[serde(default)]
    pub method: String,
    #[serde(default)]
    pub items: Vec<LineItemParams>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct ListTechnicalSheetsParams {
    pub restaurant_id: Option<i64>,
    pub query: Option<String>,
    #[serde(default = "default_list_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct PreviewTechnicalSheetParams {
    pub restaurant_id: i64,
    #[serde(default)]
    pub items: Vec<LineItemParams>,
}

// ============================================================================
// User, Activity and Dashboard Parameter Structs
// ============================================================================

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct CreateUserParams {
    pub username: String,
    #[serde(default)]
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub is_admin: bool,
    /// administrador, master, redator or usuario_comum
    pub role: Option<String>,
    /// Only redatores may hold more than one restaurant
    #[serde(default)]
    pub restaurant_ids: Vec<i64>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct ListUsersParams {
    pub restaurant_id: Option<i64>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct UpdateUserParams {
    pub id: i64,
    pub email: Option<String>,
    pub password: Option<String>,
    pub is_admin: Option<bool>,
    pub is_active: Option<bool>,
    /// When given, replaces all of the user's roles
    pub role: Option<String>,
    #[serde(default)]
    pub restaurant_ids: Vec<i64>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct ListActivityParams {
    pub restaurant_id: Option<i64>,
    /// restaurante, insumo, categoria, receita, ficha_tecnica or usuario
    pub kind: Option<String>,
    /// criado, editado or excluido
    pub action: Option<String>,
    /// YYYY-MM-DD, inclusive
    pub date_from: Option<String>,
    /// YYYY-MM-DD, inclusive
    pub date_to: Option<String>,
    #[serde(default = "default_list_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct DashboardParams {
    pub restaurant_id: Option<i64>,
}

fn role_assignment(role: Option<String>, restaurant_ids: Vec<i64>) -> Result<Option<RoleAssignment>, McpError> {
    match role {
        Some(r) => {
            let role = Role::from_str(&r).ok_or_else(|| {
                McpError::invalid_params(
                    format!("Invalid role '{}'. Use administrador, master, redator or usuario_comum", r),
                    None,
                )
            })?;
            Ok(Some(RoleAssignment { role, restaurant_ids }))
        }
        None if !restaurant_ids.is_empty() => Err(McpError::invalid_params(
            "restaurant_ids requires a role",
            None,
        )),
        None => Ok(None),
    }
}

// ============================================================================
// Tool Implementations
// ============================================================================

#[tool_router]
impl FichaproService {
    // --- Status ---

    #[tool(description = "Get the current status of the FichaPro service including build info, database status, process information and the signed-in user")]
    async fn fichapro_status(&self) -> Result<CallToolResult, McpError> {
        let signed_in_as = self.current_session().ok().map(|s| s.username);
        let tracker = self.status_tracker.lock().await;
        let status = tracker.get_status(signed_in_as);
        let json = serde_json::to_string_pretty(&status)
            .map_err(|e| McpError::internal_error(format!("Serialization error: {}", e), None))?;
        Ok(CallToolResult::success(vec![Content::text(json)]))
    }

    #[tool(description = "Get instructions for costing: roles, ingredient registration, line items, IC/IPC adjustment, nested recipes and suggested prices. Call this before building recipes or technical sheets.")]
    fn costing_instructions(&self) -> Result<CallToolResult, McpError> {
        Ok(CallToolResult::success(vec![Content::text(costing_instructions())]))
    }

    // --- Session ---

    #[tool(description = "Sign in with username and password. Required before any other tool.")]
    fn sign_in(&self, Parameters(p): Parameters<SignInParams>) -> Result<CallToolResult, McpError> {
        let (new_session, info) = session::sign_in(&self.database, &p.username, &p.password).map_err(tool_error)?;
        self.set_session(Some(new_session))?;
        json_result(&info)
    }

    #[tool(description = "Sign out the current user")]
    fn sign_out(&self) -> Result<CallToolResult, McpError> {
        let previous = self.set_session(None)?;
        json_result(&SignOutResponse {
            success: true,
            signed_out: previous.map(|s| s.username),
        })
    }

    #[tool(description = "Show the signed-in user")]
    fn whoami(&self) -> Result<CallToolResult, McpError> {
        let current = self.current_session().ok();
        let result = session::whoami(current.as_ref()).map_err(tool_error)?;
        json_result(&result)
    }

    #[tool(description = "List the restaurants the signed-in user is linked to and the role held in each")]
    fn my_roles(&self) -> Result<CallToolResult, McpError> {
        let s = self.current_session()?;
        let result = session::my_roles(&self.database, &s).map_err(tool_error)?;
        json_result(&result)
    }

    // --- Restaurants ---

    #[tool(description = "Create a restaurant (administrators only)")]
    fn create_restaurant(&self, Parameters(p): Parameters<CreateRestaurantParams>) -> Result<CallToolResult, McpError> {
        let s = self.current_session()?;
        let data = RestaurantCreate {
            name: p.name,
            cnpj: p.cnpj,
            email: p.email.unwrap_or_default(),
            phone: p.phone.unwrap_or_default(),
            cep: p.cep.unwrap_or_default(),
            street: p.street.unwrap_or_default(),
            number: p.number.unwrap_or_default(),
            complement: p.complement.unwrap_or_default(),
            district: p.district.unwrap_or_default(),
            city: p.city.unwrap_or_default(),
            state: p.state.unwrap_or_default(),
            markup_factor: p.markup_factor,
        };
        let result = restaurants::create_restaurant(&self.database, &s, data).map_err(tool_error)?;
        json_result(&result)
    }

    #[tool(description = "Get a restaurant with its ingredient, recipe and technical sheet counts")]
    fn get_restaurant(&self, Parameters(p): Parameters<IdParams>) -> Result<CallToolResult, McpError> {
        let s = self.current_session()?;
        match restaurants::get_restaurant(&self.database, &s, p.id).map_err(tool_error)? {
            Some(detail) => json_result(&detail),
            None => not_found("Restaurant", p.id),
        }
    }

    #[tool(description = "List the restaurants visible to the signed-in user")]
    fn list_restaurants(&self, Parameters(p): Parameters<ListRestaurantsParams>) -> Result<CallToolResult, McpError> {
        let s = self.current_session()?;
        let result = restaurants::list_restaurants(&self.database, &s, p.query.as_deref(), p.limit, p.offset)
            .map_err(tool_error)?;
        json_result(&result)
    }

    #[tool(description = "Update a restaurant profile (administrators and masters). A new markup_factor reprices every recipe and technical sheet.")]
    fn update_restaurant(&self, Parameters(p): Parameters<UpdateRestaurantParams>) -> Result<CallToolResult, McpError> {
        let s = self.current_session()?;
        let data = RestaurantUpdate {
            name: p.name,
            cnpj: p.cnpj,
            email: p.email,
            phone: p.phone,
            cep: p.cep,
            street: p.street,
            number: p.number,
            complement: p.complement,
            district: p.district,
            city: p.city,
            state: p.state,
            markup_factor: p.markup_factor,
        };
        let result = restaurants::update_restaurant(&self.database, &s, p.id, data).map_err(tool_error)?;
        json_result(&result)
    }

    #[tool(description = "Delete a restaurant with all its ingredients, recipes and technical sheets (administrators only)")]
    fn delete_restaurant(&self, Parameters(p): Parameters<IdParams>) -> Result<CallToolResult, McpError> {
        let s = self.current_session()?;
        let result = restaurants::delete_restaurant(&self.database, &s, p.id).map_err(tool_error)?;
        json_result(&result)
    }

    // --- Ingredient Categories ---

    #[tool(description = "Create an ingredient category in a restaurant")]
    fn create_ingredient_category(&self, Parameters(p): Parameters<CreateCategoryParams>) -> Result<CallToolResult, McpError> {
        let s = self.current_session()?;
        let result = categories::create_ingredient_category(&self.database, &s, p.restaurant_id, &p.name)
            .map_err(tool_error)?;
        json_result(&result)
    }

    #[tool(description = "List a restaurant's ingredient categories with ingredient counts")]
    fn list_ingredient_categories(&self, Parameters(p): Parameters<RestaurantIdParams>) -> Result<CallToolResult, McpError> {
        let s = self.current_session()?;
        let result = categories::list_ingredient_categories(&self.database, &s, p.restaurant_id).map_err(tool_error)?;
        json_result(&result)
    }

    #[tool(description = "Delete an ingredient category. Its ingredients are kept without a category.")]
    fn delete_ingredient_category(&self, Parameters(p): Parameters<IdParams>) -> Result<CallToolResult, McpError> {
        let s = self.current_session()?;
        let result = categories::delete_ingredient_category(&self.database, &s, p.id).map_err(tool_error)?;
        json_result(&result)
    }

    // --- Ingredients ---

    #[tool(description = "Create an ingredient (insumo) with its purchase reference weight and price")]
    fn create_ingredient(&self, Parameters(p): Parameters<CreateIngredientParams>) -> Result<CallToolResult, McpError> {
        let s = self.current_session()?;
        let unit = ingredients::parse_unit(&p.unit).map_err(|e| McpError::invalid_params(e, None))?;
        let data = IngredientCreate {
            restaurant_id: p.restaurant_id,
            category_id: p.category_id,
            name: p.name,
            reference_weight: p.reference_weight,
            unit,
            reference_price: p.reference_price,
        };
        let result = ingredients::create_ingredient(&self.database, &s, data).map_err(tool_error)?;
        json_result(&result)
    }

    #[tool(description = "Get an ingredient with its unit cost and how many items use it")]
    fn get_ingredient(&self, Parameters(p): Parameters<IdParams>) -> Result<CallToolResult, McpError> {
        let s = self.current_session()?;
        match ingredients::get_ingredient(&self.database, &s, p.id).map_err(tool_error)? {
            Some(view) => json_result(&view),
            None => not_found("Ingredient", p.id),
        }
    }

    #[tool(description = "List ingredients with optional restaurant, category and name filters, sorting and pagination")]
    fn list_ingredients(&self, Parameters(p): Parameters<ListIngredientsParams>) -> Result<CallToolResult, McpError> {
        let s = self.current_session()?;
        let filter = IngredientFilter {
            restaurant_id: p.restaurant_id,
            visible_restaurants: None,
            category_id: p.category_id,
            query: p.query,
            sort_by: p.sort_by,
            sort_order: p.sort_order,
        };
        let result = ingredients::list_ingredients(&self.database, &s, filter, p.limit, p.offset).map_err(tool_error)?;
        json_result(&result)
    }

    #[tool(description = "Update an ingredient. A new price or reference weight is cascaded into every recipe and technical sheet using it.")]
    fn update_ingredient(&self, Parameters(p): Parameters<UpdateIngredientParams>) -> Result<CallToolResult, McpError> {
        let s = self.current_session()?;
        let unit = match p.unit.as_deref() {
            Some(u) => Some(ingredients::parse_unit(u).map_err(|e| McpError::invalid_params(e, None))?),
            None => None,
        };
        let category_id = if p.clear_category {
            Some(None)
        } else {
            p.category_id.map(Some)
        };
        let data = IngredientUpdate {
            category_id,
            name: p.name,
            reference_weight: p.reference_weight,
            unit,
            reference_price: p.reference_price,
        };
        let result = ingredients::update_ingredient(&self.database, &s, p.id, data).map_err(tool_error)?;
        json_result(&result)
    }

    #[tool(description = "Delete an ingredient. Blocked while any recipe or technical sheet uses it.")]
    fn delete_ingredient(&self, Parameters(p): Parameters<IdParams>) -> Result<CallToolResult, McpError> {
        let s = self.current_session()?;
        match ingredients::delete_ingredient(&self.database, &s, p.id).map_err(tool_error)? {
            Ok(success) => json_result(&success),
            Err(blocked) => json_result(&blocked),
        }
    }

    // --- Recipes ---

    #[tool(description = "Create or replace a recipe with its complete item list. Costs, yield and suggested prices are recalculated and cascaded to dependents.")]
    fn save_recipe(&self, Parameters(p): Parameters<SaveRecipeParams>) -> Result<CallToolResult, McpError> {
        let s = self.current_session()?;
        let items = line_items(p.items)?;
        let fields = RecipeFields {
            name: p.name,
            prep_time_minutes: p.prep_time_minutes,
            portion_size: p.portion_size,
            method: p.method,
            yield_note: p.yield_note,
        };
        let result = recipes::save_recipe(&self.database, &s, p.id, p.restaurant_id, fields, items)
            .map_err(tool_error)?;
        json_result(&result)
    }

    #[tool(description = "Get a recipe with its items and their adjusted weights and costs")]
    fn get_recipe(&self, Parameters(p): Parameters<IdParams>) -> Result<CallToolResult, McpError> {
        let s = self.current_session()?;
        match recipes::get_recipe(&self.database, &s, p.id).map_err(tool_error)? {
            Some(detail) => json_result(&detail),
            None => not_found("Recipe", p.id),
        }
    }

    #[tool(description = "List recipes with optional restaurant and name filters, sorting and pagination")]
    fn list_recipes(&self, Parameters(p): Parameters<ListRecipesParams>) -> Result<CallToolResult, McpError> {
        let s = self.current_session()?;
        let result = recipes::list_recipes(
            &self.database,
            &s,
            p.restaurant_id,
            p.query.as_deref(),
            &p.sort_by,
            &p.sort_order,
            p.limit,
            p.offset,
        )
        .map_err(tool_error)?;
        json_result(&result)
    }

    #[tool(description = "Delete a recipe. Blocked while another recipe or a technical sheet uses it.")]
    fn delete_recipe(&self, Parameters(p): Parameters<IdParams>) -> Result<CallToolResult, McpError> {
        let s = self.current_session()?;
        match recipes::delete_recipe(&self.database, &s, p.id).map_err(tool_error)? {
            Ok(success) => json_result(&success),
            Err(blocked) => json_result(&blocked),
        }
    }

    #[tool(description = "Recalculate a recipe's stored costs and everything that uses it")]
    fn recalculate_recipe(&self, Parameters(p): Parameters<IdParams>) -> Result<CallToolResult, McpError> {
        let s = self.current_session()?;
        let result = recipes::recalculate_recipe(&self.database, &s, p.id).map_err(tool_error)?;
        json_result(&result)
    }

    #[tool(description = "Calculate weights, costs, yield and prices for an unsaved recipe item list without storing anything")]
    fn preview_recipe_costs(&self, Parameters(p): Parameters<PreviewRecipeParams>) -> Result<CallToolResult, McpError> {
        let s = self.current_session()?;
        let items = line_items(p.items)?;
        let result = recipes::preview_recipe_costs(&self.database, &s, p.restaurant_id, p.recipe_id, p.portion_size, items)
            .map_err(tool_error)?;
        json_result(&result)
    }

    // --- Technical Sheets ---

    #[tool(description = "Create or replace a technical sheet (ficha técnica) with its complete item list")]
    fn save_technical_sheet(&self, Parameters(p): Parameters<SaveTechnicalSheetParams>) -> Result<CallToolResult, McpError> {
        let s = self.current_session()?;
        let items = line_items(p.items)?;
        let fields = SheetFields {
            name: p.name,
            yield_description: p.yield_description,
            method: p.method,
        };
        let result = technical_sheets::save_technical_sheet(&self.database, &s, p.id, p.restaurant_id, fields, items)
            .map_err(tool_error)?;
        json_result(&result)
    }

    #[tool(description = "Get a technical sheet with its items and their adjusted weights and costs")]
    fn get_technical_sheet(&self, Parameters(p): Parameters<IdParams>) -> Result<CallToolResult, McpError> {
        let s = self.current_session()?;
        match technical_sheets::get_technical_sheet(&self.database, &s, p.id).map_err(tool_error)? {
            Some(detail) => json_result(&detail),
            None => not_found("Technical sheet", p.id),
        }
    }

    #[tool(description = "List technical sheets with optional restaurant and name filters")]
    fn list_technical_sheets(&self, Parameters(p): Parameters<ListTechnicalSheetsParams>) -> Result<CallToolResult, McpError> {
        let s = self.current_session()?;
        let result = technical_sheets::list_technical_sheets(
            &self.database,
            &s,
            p.restaurant_id,
            p.query.as_deref(),
            p.limit,
            p.offset,
        )
        .map_err(tool_error)?;
        json_result(&result)
    }

    #[tool(description = "Delete a technical sheet and its items")]
    fn delete_technical_sheet(&self, Parameters(p): Parameters<IdParams>) -> Result<CallToolResult, McpError> {
        let s = self.current_session()?;
        let result = technical_sheets::delete_technical_sheet(&self.database, &s, p.id).map_err(tool_error)?;
        json_result(&result)
    }

    #[tool(description = "Calculate weights, costs and prices for an unsaved technical sheet item list without storing anything")]
    fn preview_technical_sheet_costs(&self, Parameters(p): Parameters<PreviewTechnicalSheetParams>) -> Result<CallToolResult, McpError> {
        let s = self.current_session()?;
        let items = line_items(p.items)?;
        let result = technical_sheets::preview_technical_sheet_costs(&self.database, &s, p.restaurant_id, items)
            .map_err(tool_error)?;
        json_result(&result)
    }

    // --- Users ---

    #[tool(description = "Create a user, optionally with a role on one or more restaurants (administrators only)")]
    fn create_user(&self, Parameters(p): Parameters<CreateUserParams>) -> Result<CallToolResult, McpError> {
        let s = self.current_session()?;
        let assignment = role_assignment(p.role, p.restaurant_ids)?;
        let data = UserCreate {
            username: p.username,
            email: p.email,
            password: p.password,
            is_admin: p.is_admin,
        };
        let result = users::create_user(&self.database, &s, data, assignment).map_err(tool_error)?;
        json_result(&result)
    }

    #[tool(description = "List users with their roles, optionally only those linked to a restaurant (administrators only)")]
    fn list_users(&self, Parameters(p): Parameters<ListUsersParams>) -> Result<CallToolResult, McpError> {
        let s = self.current_session()?;
        let result = users::list_users(&self.database, &s, p.restaurant_id).map_err(tool_error)?;
        json_result(&result)
    }

    #[tool(description = "Update a user's account and, when role is given, replace its restaurant roles (administrators only)")]
    fn update_user(&self, Parameters(p): Parameters<UpdateUserParams>) -> Result<CallToolResult, McpError> {
        let s = self.current_session()?;
        let assignment = role_assignment(p.role, p.restaurant_ids)?;
        let data = UserUpdate {
            email: p.email,
            password: p.password,
            is_admin: p.is_admin,
            is_active: p.is_active,
        };
        let result = users::update_user(&self.database, &s, p.id, data, assignment).map_err(tool_error)?;
        json_result(&result)
    }

    #[tool(description = "Delete a user (administrators only; you cannot delete yourself)")]
    fn delete_user(&self, Parameters(p): Parameters<IdParams>) -> Result<CallToolResult, McpError> {
        let s = self.current_session()?;
        let result = users::delete_user(&self.database, &s, p.id).map_err(tool_error)?;
        json_result(&result)
    }

    // --- Activity and Dashboard ---

    #[tool(description = "List activity log entries, newest first, filtered by restaurant, kind, action and date range")]
    fn list_activity(&self, Parameters(p): Parameters<ListActivityParams>) -> Result<CallToolResult, McpError> {
        let s = self.current_session()?;
        let query = ActivityQuery {
            restaurant_id: p.restaurant_id,
            kind: p.kind,
            action: p.action,
            date_from: p.date_from,
            date_to: p.date_to,
        };
        let result = activity::list_activity(&self.database, &s, query, p.limit, p.offset).map_err(tool_error)?;
        json_result(&result)
    }

    #[tool(description = "Summary counts, average recipe cost and recent activity, optionally for one restaurant")]
    fn dashboard(&self, Parameters(p): Parameters<DashboardParams>) -> Result<CallToolResult, McpError> {
        let s = self.current_session()?;
        let result = dashboard::dashboard(&self.database, &s, p.restaurant_id).map_err(tool_error)?;
        json_result(&result)
    }
}

// ============================================================================
// Server Handler
// ============================================================================

#[tool_handler]
impl ServerHandler for FichaproService {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "fichapro".into(),
                version: crate::build_info::VERSION.into(),
                title: Some("FichaPro".into()),
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "FichaPro - Restaurant costing: ingredients, recipes and technical sheets. \
                 IMPORTANT: call sign_in first, then costing_instructions before building recipes. \
                 Session: sign_in/sign_out/whoami/my_roles. \
                 Restaurants: create/get/list/update/delete_restaurant. \
                 Categories: create/list/delete_ingredient_category. \
                 Ingredients: create/get/list/update/delete_ingredient (price changes cascade). \
                 Recipes: save/get/list/delete_recipe, recalculate_recipe, preview_recipe_costs. \
                 Technical sheets: save/get/list/delete_technical_sheet, preview_technical_sheet_costs. \
                 Users (admin): create/list/update/delete_user. \
                 Reports: list_activity, dashboard, fichapro_status."
                    .into(),
            ),
        }
    }
}
