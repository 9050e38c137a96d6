use anyhow::Result;
use diesel_migrations::{EmbeddedMigrations, embed_migrations};
use printshop_orderservice::{app, app_state::AppState, bootstrap, config, db};

/// Migrations embedded into the binary which helps with streamlining image building process
const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

#[tokio::main]
async fn main() -> Result<()> {
    bootstrap::init_env();
    bootstrap::init_tracing();

    let config = config::load()?;

    tracing::info!("Running migrations...");
    let migrations_count = db::run_migrations_blocking(MIGRATIONS, &config.database.url).await?;
    tracing::info!("Run {} new migrations successfully", migrations_count);

    tracing::info!("Bootstrapping...");
    let db_pool = db::connect(&config.database).await?;
    let state = AppState::new(db_pool, &config)?;
    let app = app::build_router(state);

    bootstrap::serve("OrderService", app, &config.server).await
}
