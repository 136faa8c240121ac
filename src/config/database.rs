//! Database configuration module.
//!
//! Handles the `SQLite` connection behind the document store and creates the
//! `cabs`, `trips` and `expenses` tables from the entity definitions with
//! `SeaORM`'s `Schema::create_table_from_entity`, so the schema always matches
//! the Rust structs.

use crate::config::FleetConfig;
use crate::entities::{Cab, Expense, Trip};
use crate::errors::Result;
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, Schema};
use tracing::{debug, info, instrument};

/// Resolves the database URL: `DATABASE_URL` from the environment wins over
/// the configured value.
#[must_use]
pub fn get_database_url(config: &FleetConfig) -> String {
    std::env::var("DATABASE_URL").unwrap_or_else(|_| config.database_url.clone())
}

/// Opens a connection to the database at `database_url`.
#[instrument]
pub async fn create_connection(database_url: &str) -> Result<DatabaseConnection> {
    debug!("Connecting to document store");
    let db = Database::connect(database_url).await?;
    info!("Document store connection established");
    Ok(db)
}

/// Creates the three fleet tables if they do not exist yet.
pub async fn create_tables<C>(db: &C) -> Result<()>
where
    C: ConnectionTrait,
{
    let builder = db.get_database_backend();
    let schema = Schema::new(builder);

    let mut cab_table = schema.create_table_from_entity(Cab);
    let mut trip_table = schema.create_table_from_entity(Trip);
    let mut expense_table = schema.create_table_from_entity(Expense);

    cab_table.if_not_exists();
    trip_table.if_not_exists();
    expense_table.if_not_exists();

    db.execute(builder.build(&cab_table)).await?;
    db.execute(builder.build(&trip_table)).await?;
    db.execute(builder.build(&expense_table)).await?;

    debug!("Fleet tables ensured");
    Ok(())
}
