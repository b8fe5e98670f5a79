//! Metadata database adapters

mod migrations;
mod postgres;

pub use migrations::{metadata_migrations, Migration, PostgresMigrator};
pub use postgres::PostgresDataAccess;
