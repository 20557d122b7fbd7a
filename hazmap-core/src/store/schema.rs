//! Table layout of the SQLite store.

use rusqlite::{Connection, OptionalExtension, Transaction};

use crate::StoreError;

/// Version recorded in `store_schema_version`.
pub const SCHEMA_VERSION: i64 = 1;

/// Create the store tables inside `connection` and check the recorded schema
/// version. Existing databases with another version are rejected.
pub(super) fn initialise_schema(connection: &mut Connection) -> Result<(), StoreError> {
    let transaction = connection
        .transaction()
        .map_err(|source| StoreError::backend("begin schema transaction", source))?;

    create_catalog_tables(&transaction)?;
    create_point_tables(&transaction)?;
    ensure_schema_version(&transaction)?;

    transaction
        .commit()
        .map_err(|source| StoreError::backend("commit schema transaction", source))
}

fn create_catalog_tables(transaction: &Transaction<'_>) -> Result<(), StoreError> {
    run_migration_step(
        transaction,
        "create categories",
        "CREATE TABLE IF NOT EXISTS categories (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            url TEXT NOT NULL DEFAULT '',
            icon_url TEXT NOT NULL DEFAULT '',
            published INTEGER NOT NULL DEFAULT 1,
            active INTEGER NOT NULL DEFAULT 1
        )",
    )?;
    run_migration_step(
        transaction,
        "create disabilities",
        "CREATE TABLE IF NOT EXISTS disabilities (
            id INTEGER PRIMARY KEY,
            label TEXT NOT NULL,
            active INTEGER NOT NULL DEFAULT 1
        )",
    )?;
    run_migration_step(
        transaction,
        "create watermark",
        "CREATE TABLE IF NOT EXISTS watermark (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            timestamp INTEGER NOT NULL,
            lon REAL NOT NULL,
            lat REAL NOT NULL
        )",
    )
}

fn create_point_tables(transaction: &Transaction<'_>) -> Result<(), StoreError> {
    run_migration_step(
        transaction,
        "create points",
        "CREATE TABLE IF NOT EXISTS points (
            local_id INTEGER PRIMARY KEY AUTOINCREMENT,
            remote_id TEXT UNIQUE,
            category_id INTEGER NOT NULL,
            lon REAL NOT NULL,
            lat REAL NOT NULL,
            fields TEXT NOT NULL DEFAULT '{}',
            is_private INTEGER NOT NULL,
            is_pending INTEGER NOT NULL,
            CHECK (is_private = 1 OR is_pending = 0)
        )",
    )?;
    run_migration_step(
        transaction,
        "index points by category",
        "CREATE INDEX IF NOT EXISTS idx_points_category ON points(category_id, is_private)",
    )?;
    run_migration_step(
        transaction,
        "index pending points",
        "CREATE INDEX IF NOT EXISTS idx_points_pending ON points(is_pending, local_id)",
    )
}

fn ensure_schema_version(transaction: &Transaction<'_>) -> Result<(), StoreError> {
    run_migration_step(
        transaction,
        "create schema version table",
        "CREATE TABLE IF NOT EXISTS store_schema_version (
            version INTEGER PRIMARY KEY CHECK (version > 0)
        ) WITHOUT ROWID",
    )?;

    let existing_version: Option<i64> = transaction
        .query_row(
            "SELECT version FROM store_schema_version LIMIT 1",
            [],
            |row| row.get(0),
        )
        .optional()
        .map_err(|source| StoreError::backend("read schema version", source))?;

    match existing_version {
        Some(version) if version == SCHEMA_VERSION => Ok(()),
        Some(found) => Err(StoreError::SchemaMismatch {
            expected: SCHEMA_VERSION,
            found,
        }),
        None => transaction
            .execute(
                "INSERT INTO store_schema_version (version) VALUES (?1)",
                [SCHEMA_VERSION],
            )
            .map(|_| ())
            .map_err(|source| StoreError::backend("record schema version", source)),
    }
}

fn run_migration_step(
    transaction: &Transaction<'_>,
    step: &'static str,
    sql: &str,
) -> Result<(), StoreError> {
    transaction
        .execute(sql, [])
        .map(|_| ())
        .map_err(|source| StoreError::backend(step, source))
}
