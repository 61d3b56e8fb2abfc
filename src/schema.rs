//! Database schema management for `cropwise-advisor`.
//!
//! Ensures the secondary sensor document store exists before serving
//! requests. Applied once on startup from `main.rs` when `DATABASE_URL` is set.

use anyhow::Result;
use sqlx::PgPool;

// ---

/// Create the `sensor_documents` table (idempotent).
///
/// Each row holds the latest raw payload pushed for one sensor, in whatever
/// shape the device emits; the gateway's parser strategies normalize it on
/// read. Safe to call on every startup.
pub async fn create_schema(pool: &PgPool) -> Result<()> {
    // ---
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sensor_documents (
            sensor_id   TEXT        PRIMARY KEY,
            payload     JSONB       NOT NULL,
            updated_at  TIMESTAMPTZ NOT NULL DEFAULT now()
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    // Housekeeping queries look for devices that stopped reporting
    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_sensor_documents_updated_at
            ON sensor_documents (updated_at);
        "#,
    )
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}
