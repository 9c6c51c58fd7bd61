//! Storage contracts against the backing store.
//!
//! Table layout mirrors the wide-column schema: pointer tables partitioned
//! by `(queue_name, region, shard_id)` and clustered by the time-UUID order
//! of `queue_message_id` (materialized as `message_ts`), a body table keyed
//! by `message_id`, shard and counter registries, and the audit log.

use std::time::Duration;

use sqlx::sqlite::{
    SqliteAutoVacuum, SqliteConnectOptions, SqliteJournalMode, SqliteLockingMode, SqlitePoolOptions,
};
use sqlx::SqlitePool;

use crate::error::Error;

pub mod audit;
pub mod message;
pub mod queue;
pub mod shard;

/// Open (creating if missing) the database at `path` and run migrations.
pub async fn connect(path: &str) -> Result<SqlitePool, Error> {
    let opts = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .locking_mode(SqliteLockingMode::Normal)
        .busy_timeout(Duration::from_secs(5))
        .optimize_on_close(true, None)
        .auto_vacuum(SqliteAutoVacuum::Full);

    let pool = SqlitePoolOptions::new().connect_with(opts).await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    Ok(pool)
}
