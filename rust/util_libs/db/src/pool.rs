use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::error::IndexError;

/// Connect a pooled Postgres client and bring the schema up to date. Called
/// once at process startup (mirrors the teacher's `setup_database`, which
/// resolves a connection string from config and hands back a ready client).
pub async fn connect_and_migrate(database_url: &str) -> Result<PgPool, IndexError> {
    let pool = PgPoolOptions::new()
        .max_connections(16)
        .connect(database_url)
        .await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    Ok(pool)
}
