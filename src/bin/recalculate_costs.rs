//! Recompute every stored cost and suggested price
//! Usage: cargo run --bin recalculate_costs -- [restaurant_id]

use fichapro::config::Settings;
use fichapro::db::{migrations, Database};
use fichapro::models::{recalculate_restaurant, Restaurant};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let only: Option<i64> = match std::env::args().nth(1) {
        Some(arg) => Some(arg.parse().map_err(|_| format!("Invalid restaurant id: {}", arg))?),
        None => None,
    };

    let settings = Settings::from_env();
    println!("Database: {}", settings.database_path.display());

    let database = Database::with_pool_size(&settings.database_path, settings.pool_size)?;
    database.with_conn(|conn| {
        migrations::run_migrations(conn)?;
        Ok(())
    })?;

    let only_ids = only.map(|id| vec![id]);
    let restaurants =
        database.with_conn(|conn| Restaurant::list(conn, only_ids.as_deref(), None, i64::MAX, 0))?;
    if restaurants.is_empty() {
        println!("No restaurants found");
        return Ok(());
    }

    for restaurant in restaurants {
        let result = database.with_transaction(|tx| recalculate_restaurant(tx, restaurant.id))?;
        println!(
            "{} (id {}): {} recipes, {} technical sheets recalculated",
            restaurant.name, restaurant.id, result.recipes_recalculated, result.sheets_recalculated
        );
    }

    Ok(())
}
