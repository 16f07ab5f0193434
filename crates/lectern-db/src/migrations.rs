//! Embedded database migrations.

/// Migrator embedding the SQL files under `migrations/`.
///
/// Run at startup by the host application:
///
/// ```ignore
/// lectern_db::MIGRATOR.run(&pool).await?;
/// ```
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");
