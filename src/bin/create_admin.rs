//! Bootstrap an administrator account
//! Usage: cargo run --bin create_admin -- <username> <password> [email]
//! Falls back to FICHAPRO_ADMIN_USERNAME / FICHAPRO_ADMIN_PASSWORD.

use fichapro::config::Settings;
use fichapro::db::{migrations, Database};
use fichapro::models::{User, UserCreate, UserUpdate};

fn arg_or_env(index: usize, var: &str) -> Option<String> {
    std::env::args()
        .nth(index)
        .or_else(|| std::env::var(var).ok())
        .filter(|v| !v.trim().is_empty())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let username = arg_or_env(1, "FICHAPRO_ADMIN_USERNAME").ok_or("username is required")?;
    let password = arg_or_env(2, "FICHAPRO_ADMIN_PASSWORD").ok_or("password is required")?;
    let email = arg_or_env(3, "FICHAPRO_ADMIN_EMAIL").unwrap_or_default();

    let settings = Settings::from_env();
    if let Some(parent) = settings.database_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    println!("Database path: {}", settings.database_path.display());

    let database = Database::with_pool_size(&settings.database_path, settings.pool_size)?;
    database.with_conn(|conn| {
        migrations::run_migrations(conn)?;
        Ok(())
    })?;

    let user = database.with_transaction(|tx| match User::get_by_username(tx, username.trim())? {
        // Existing account: promote and reset the password
        Some(existing) => {
            let update = UserUpdate {
                email: (!email.is_empty()).then(|| email.clone()),
                password: Some(password.clone()),
                is_admin: Some(true),
                is_active: Some(true),
            };
            User::update(tx, existing.id, &update).map(|u| u.unwrap_or(existing))
        }
        None => User::create(
            tx,
            &UserCreate {
                username: username.trim().to_string(),
                email: email.clone(),
                password: password.clone(),
                is_admin: true,
            },
        ),
    })?;

    println!("Administrator ready:");
    println!("  Username: {}", user.username);
    println!("  Id: {}", user.id);

    Ok(())
}
