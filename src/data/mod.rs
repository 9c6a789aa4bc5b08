//! SQLite persistence layer.

pub mod matches;
pub mod users;

use std::str::FromStr;

use anyhow::Context;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

/// Opens (creating if needed) the database and ensures the schema exists.
///
/// A single connection is enough for the synchronous pipeline, and it keeps
/// `sqlite::memory:` databases coherent in tests.
pub async fn connect(database_url: &str) -> anyhow::Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(database_url)
        .with_context(|| format!("invalid database url: {database_url}"))?
        .create_if_missing(true)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .context("failed to open the database")?;

    bootstrap(&pool).await.context("failed to apply schema")?;
    Ok(pool)
}

async fn bootstrap(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            uid INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            surname TEXT NOT NULL,
            sex INTEGER NOT NULL,
            age INTEGER NOT NULL,
            city INTEGER NOT NULL,
            interests TEXT NOT NULL,
            personal TEXT NOT NULL,
            group_ids TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS matches (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            uid INTEGER NOT NULL,
            user_uid INTEGER NOT NULL REFERENCES users(uid) ON DELETE CASCADE,
            name TEXT NOT NULL,
            surname TEXT NOT NULL,
            profile TEXT NOT NULL,
            total_score INTEGER NOT NULL,
            seen INTEGER NOT NULL DEFAULT 0,
            UNIQUE(uid, user_uid)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS photos (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            match_id INTEGER NOT NULL REFERENCES matches(id) ON DELETE CASCADE,
            link TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
