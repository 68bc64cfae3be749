pub mod models;
pub mod repository;
pub mod store;

pub use repository::*;
pub use store::SqliteStore;

#[cfg(test)]
pub(crate) async fn test_pool() -> sqlx::SqlitePool {
    // One connection: every `sqlite::memory:` connection is its own database.
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    pool
}
