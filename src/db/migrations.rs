//! Database migrations
//!
//! Schema creation and migration logic.

use rusqlite::Connection;

use super::connection::DbResult;

/// Current schema version
const SCHEMA_VERSION: i32 = 2;

/// Run all migrations to bring the database up to the current schema version
pub fn run_migrations(conn: &Connection) -> DbResult<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        [],
    )?;

    let current_version = get_schema_version(conn)?;

    if current_version < 1 {
        migrate_v1(conn)?;
        conn.execute("INSERT INTO schema_migrations (version) VALUES (1)", [])?;
        tracing::info!("Applied schema migration v1");
    }

    if current_version < 2 {
        migrate_v2(conn)?;
        conn.execute("INSERT INTO schema_migrations (version) VALUES (2)", [])?;
        tracing::info!("Applied schema migration v2");
    }

    Ok(())
}

/// Migration v1: tenants, catalog and costing tables
fn migrate_v1(conn: &Connection) -> DbResult<()> {
    conn.execute_batch(
        r#"
        -- ============================================
        -- RESTAURANTS
        -- Tenants; everything else hangs off one
        -- ============================================
        CREATE TABLE restaurants (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            cnpj TEXT NOT NULL UNIQUE,
            email TEXT NOT NULL DEFAULT '',
            phone TEXT NOT NULL DEFAULT '',

            -- Address
            cep TEXT NOT NULL DEFAULT '',
            street TEXT NOT NULL DEFAULT '',
            number TEXT NOT NULL DEFAULT '',
            complement TEXT NOT NULL DEFAULT '',
            district TEXT NOT NULL DEFAULT '',
            city TEXT NOT NULL DEFAULT '',
            state TEXT NOT NULL DEFAULT '',

            -- Cost -> dine-in price multiplier
            markup_factor REAL NOT NULL DEFAULT 1.0,

            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX idx_restaurants_name ON restaurants(name);

        -- ============================================
        -- INGREDIENTS (insumos)
        -- Reference price for a reference weight
        -- ============================================
        CREATE TABLE ingredients (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            restaurant_id INTEGER NOT NULL REFERENCES restaurants(id) ON DELETE CASCADE,
            name TEXT NOT NULL,
            reference_weight REAL NOT NULL,
            unit TEXT NOT NULL CHECK(unit IN ('g', 'ml', 'un')),
            reference_price REAL NOT NULL,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX idx_ingredients_restaurant ON ingredients(restaurant_id);
        CREATE INDEX idx_ingredients_name ON ingredients(name);

        -- ============================================
        -- RECIPES
        -- Cached totals are rewritten on every save
        -- ============================================
        CREATE TABLE recipes (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            restaurant_id INTEGER NOT NULL REFERENCES restaurants(id) ON DELETE CASCADE,
            name TEXT NOT NULL,
            prep_time_minutes INTEGER NOT NULL DEFAULT 0,
            portion_size REAL NOT NULL DEFAULT 0,
            method TEXT NOT NULL DEFAULT '',
            yield_note TEXT,

            final_weight REAL,
            total_cost REAL,
            yield_portions REAL,
            restaurant_price REAL,
            delivery_price REAL,

            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX idx_recipes_restaurant ON recipes(restaurant_id);
        CREATE INDEX idx_recipes_name ON recipes(name);

        -- ============================================
        -- RECIPE ITEMS
        -- Either an ingredient or a nested recipe, never both
        -- ============================================
        CREATE TABLE recipe_items (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            recipe_id INTEGER NOT NULL REFERENCES recipes(id) ON DELETE CASCADE,
            position INTEGER NOT NULL DEFAULT 0,
            ingredient_id INTEGER REFERENCES ingredients(id) ON DELETE RESTRICT,
            sub_recipe_id INTEGER REFERENCES recipes(id) ON DELETE RESTRICT,
            quantity_used REAL NOT NULL CHECK(quantity_used > 0),
            unit TEXT NOT NULL DEFAULT 'g' CHECK(unit IN ('g', 'ml', 'un')),
            cooking_index REAL NOT NULL DEFAULT 100 CHECK(cooking_index BETWEEN 0 AND 999.99),
            cooking_direction TEXT NOT NULL DEFAULT 'menos' CHECK(cooking_direction IN ('menos', 'mais')),
            edible_index REAL NOT NULL DEFAULT 100 CHECK(edible_index BETWEEN 0 AND 999.99),
            apply_adjustment INTEGER NOT NULL DEFAULT 1,

            CHECK ((ingredient_id IS NOT NULL AND sub_recipe_id IS NULL) OR
                   (ingredient_id IS NULL AND sub_recipe_id IS NOT NULL))
        );

        CREATE INDEX idx_recipe_items_recipe ON recipe_items(recipe_id);
        CREATE INDEX idx_recipe_items_ingredient ON recipe_items(ingredient_id);
        CREATE INDEX idx_recipe_items_sub_recipe ON recipe_items(sub_recipe_id);

        -- ============================================
        -- TECHNICAL SHEETS (fichas tecnicas)
        -- ============================================
        CREATE TABLE technical_sheets (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            restaurant_id INTEGER NOT NULL REFERENCES restaurants(id) ON DELETE CASCADE,
            name TEXT NOT NULL,
            yield_description TEXT NOT NULL DEFAULT '',
            method TEXT NOT NULL DEFAULT '',

            final_weight REAL,
            total_cost REAL,
            restaurant_price REAL,
            delivery_price REAL,

            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX idx_technical_sheets_restaurant ON technical_sheets(restaurant_id);

        CREATE TABLE technical_sheet_items (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            sheet_id INTEGER NOT NULL REFERENCES technical_sheets(id) ON DELETE CASCADE,
            position INTEGER NOT NULL DEFAULT 0,
            ingredient_id INTEGER REFERENCES ingredients(id) ON DELETE RESTRICT,
            recipe_id INTEGER REFERENCES recipes(id) ON DELETE RESTRICT,
            quantity_used REAL NOT NULL CHECK(quantity_used > 0),
            unit TEXT NOT NULL DEFAULT 'g' CHECK(unit IN ('g', 'ml', 'un')),
            cooking_index REAL NOT NULL DEFAULT 100 CHECK(cooking_index BETWEEN 0 AND 999.99),
            cooking_direction TEXT NOT NULL DEFAULT 'menos' CHECK(cooking_direction IN ('menos', 'mais')),
            edible_index REAL NOT NULL DEFAULT 100 CHECK(edible_index BETWEEN 0 AND 999.99),
            apply_adjustment INTEGER NOT NULL DEFAULT 1,

            CHECK ((ingredient_id IS NOT NULL AND recipe_id IS NULL) OR
                   (ingredient_id IS NULL AND recipe_id IS NOT NULL))
        );

        CREATE INDEX idx_sheet_items_sheet ON technical_sheet_items(sheet_id);
        CREATE INDEX idx_sheet_items_ingredient ON technical_sheet_items(ingredient_id);
        CREATE INDEX idx_sheet_items_recipe ON technical_sheet_items(recipe_id);

        -- ============================================
        -- USERS AND ROLE GRANTS
        -- ============================================
        CREATE TABLE users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            username TEXT NOT NULL UNIQUE,
            email TEXT NOT NULL DEFAULT '',
            password_hash TEXT NOT NULL,
            is_admin INTEGER NOT NULL DEFAULT 0,
            is_active INTEGER NOT NULL DEFAULT 1,
            date_joined TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE role_grants (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            restaurant_id INTEGER NOT NULL REFERENCES restaurants(id) ON DELETE CASCADE,
            role TEXT NOT NULL CHECK(role IN ('administrador', 'master', 'redator', 'usuario_comum')),
            UNIQUE(user_id, restaurant_id)
        );

        CREATE INDEX idx_role_grants_user ON role_grants(user_id);

        -- ============================================
        -- ACTIVITY LOG
        -- One row per mutation
        -- ============================================
        CREATE TABLE activity_log (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER REFERENCES users(id) ON DELETE SET NULL,
            restaurant_id INTEGER REFERENCES restaurants(id) ON DELETE SET NULL,
            role TEXT NOT NULL DEFAULT '',
            kind TEXT NOT NULL,
            action TEXT NOT NULL CHECK(action IN ('criado', 'editado', 'excluido')),
            name TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            occurred_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX idx_activity_kind ON activity_log(kind);
        CREATE INDEX idx_activity_occurred ON activity_log(occurred_at);
        "#,
    )?;

    Ok(())
}

/// Migration v2: ingredient categories
fn migrate_v2(conn: &Connection) -> DbResult<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE ingredient_categories (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            restaurant_id INTEGER NOT NULL REFERENCES restaurants(id) ON DELETE CASCADE,
            name TEXT NOT NULL,
            UNIQUE(restaurant_id, name)
        );

        ALTER TABLE ingredients
            ADD COLUMN category_id INTEGER REFERENCES ingredient_categories(id) ON DELETE SET NULL;

        CREATE INDEX idx_ingredients_category ON ingredients(category_id);
        "#,
    )?;

    Ok(())
}

/// Get the current schema version
pub fn get_schema_version(conn: &Connection) -> DbResult<i32> {
    let version: i32 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);
    Ok(version)
}

/// Check if the database needs migration
pub fn needs_migration(conn: &Connection) -> DbResult<bool> {
    let current = get_schema_version(conn)?;
    Ok(current < SCHEMA_VERSION)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();
        assert_eq!(get_schema_version(&conn).unwrap(), SCHEMA_VERSION);
        assert!(!needs_migration(&conn).unwrap());
    }

    #[test]
    fn test_line_item_must_have_exactly_one_source() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys = ON;").unwrap();
        run_migrations(&conn).unwrap();
        conn.execute("INSERT INTO restaurants (name, cnpj) VALUES ('R', '1')", []).unwrap();
        conn.execute("INSERT INTO recipes (restaurant_id, name) VALUES (1, 'Base')", []).unwrap();

        let neither = conn.execute(
            "INSERT INTO recipe_items (recipe_id, quantity_used) VALUES (1, 10)",
            [],
        );
        assert!(neither.is_err());
    }
}
