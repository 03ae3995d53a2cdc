//! FichaPro
//!
//! An MCP server for restaurant costing.

use rmcp::ServiceExt;
use tokio::io::{stdin, stdout};
use tracing_subscriber::EnvFilter;

use fichapro::build_info;
use fichapro::config::Settings;
use fichapro::db;
use fichapro::mcp::FichaproService;
use fichapro::models::User;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging (output to stderr to not interfere with MCP stdio)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("fichapro=info".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let settings = Settings::from_env();
    build_info::print_startup_banner(&settings);
    eprintln!("Starting MCP server on stdio...");

    let db_path = settings.database_path.clone();

    // Ensure data directory exists
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    eprintln!("Initializing database...");
    let database = db::Database::with_pool_size(&db_path, settings.pool_size)?;

    database.with_conn(|conn| {
        if db::migrations::needs_migration(conn)? {
            eprintln!("Applying schema migrations...");
        }
        db::migrations::run_migrations(conn)?;
        let version = db::migrations::get_schema_version(conn)?;
        eprintln!("Database schema version: {}", version);

        if User::count(conn)? == 0 {
            tracing::warn!("No users yet; run the create_admin binary to bootstrap an administrator");
        }
        Ok(())
    })?;

    let service = FichaproService::new(db_path, database);

    // Start the MCP server over stdio
    let server = service.serve((stdin(), stdout())).await?;
    server.waiting().await?;

    Ok(())
}
