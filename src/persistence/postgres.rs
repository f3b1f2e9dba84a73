//! PostgreSQL gateway
//!
//! Implements [`AttendanceGateway`] on a pooled tokio-postgres connection.
//! Attendance rows are upserted on the `(student_id, attendance_date)`
//! natural key inside one transaction per batch; operation checkpoints are
//! stored as JSONB documents in `sync_operations`.

use crate::config::PostgresConfig;
use crate::domain::ids::OperationId;
use crate::domain::{AttendanceRecord, Result, RollcallError};
use crate::persistence::traits::AttendanceGateway;
use crate::sync::operation::SyncOperation;
use async_trait::async_trait;
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod};
use native_tls::TlsConnector;
use postgres_native_tls::MakeTlsConnector;
use std::time::Duration;
use tokio_postgres::NoTls;

const UPSERT_ATTENDANCE: &str = "\
INSERT INTO attendance_records \
    (student_id, school_code, attendance_date, status, minutes_absent, comment, synced_at) \
VALUES ($1, $2, $3, $4, $5, $6, now()) \
ON CONFLICT (student_id, attendance_date) DO UPDATE SET \
    school_code = EXCLUDED.school_code, \
    status = EXCLUDED.status, \
    minutes_absent = EXCLUDED.minutes_absent, \
    comment = EXCLUDED.comment, \
    synced_at = now()";

const UPSERT_CHECKPOINT: &str = "\
INSERT INTO sync_operations (operation_id, status, document, started_at, updated_at) \
VALUES ($1, $2, $3, $4, now()) \
ON CONFLICT (operation_id) DO UPDATE SET \
    status = EXCLUDED.status, \
    document = EXCLUDED.document, \
    updated_at = now()";

/// PostgreSQL implementation of the attendance gateway
pub struct PostgresGateway {
    pool: Pool,
    config: PostgresConfig,
}

impl PostgresGateway {
    /// Connect to PostgreSQL and build the connection pool
    ///
    /// # Errors
    ///
    /// Returns an error if the connection string is invalid or the pool
    /// cannot be created.
    pub async fn connect(config: PostgresConfig) -> Result<Self> {
        let pg_config: tokio_postgres::Config =
            config.connection_string.parse().map_err(|e| {
                RollcallError::Configuration(format!(
                    "Invalid PostgreSQL connection string: {e}"
                ))
            })?;

        let manager_config = ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        };

        // TLS when the connection string asks for it, plain TCP otherwise
        let manager = if config.connection_string.contains("sslmode=require") {
            let connector = TlsConnector::builder().build().map_err(|e| {
                RollcallError::Configuration(format!("Failed to build TLS connector: {e}"))
            })?;
            let tls = MakeTlsConnector::new(connector);
            Manager::from_config(pg_config, tls, manager_config)
        } else {
            Manager::from_config(pg_config, NoTls, manager_config)
        };

        let pool = Pool::builder(manager)
            .max_size(config.max_connections)
            .wait_timeout(Some(Duration::from_secs(config.connection_timeout_seconds)))
            .create_timeout(Some(Duration::from_secs(config.connection_timeout_seconds)))
            .recycle_timeout(Some(Duration::from_secs(config.connection_timeout_seconds)))
            .build()
            .map_err(|e| {
                RollcallError::Persistence(format!("Failed to create connection pool: {e}"))
            })?;

        Ok(Self { pool, config })
    }

    /// Test the connection with a trivial query
    pub async fn test_connection(&self) -> Result<()> {
        let client = self.connection().await?;
        client
            .query_one("SELECT 1", &[])
            .await
            .map_err(|e| RollcallError::Persistence(format!("Connection test failed: {e}")))?;
        tracing::info!("PostgreSQL connection test successful");
        Ok(())
    }

    /// Ensure the database schema exists
    ///
    /// Runs the migration SQL to create tables and indexes if they don't
    /// exist.
    pub async fn ensure_schema(&self) -> Result<()> {
        let client = self.connection().await?;
        let migration_sql = include_str!("../../migrations/001_initial_schema.sql");

        client
            .batch_execute(migration_sql)
            .await
            .map_err(|e| RollcallError::Persistence(format!("Failed to run migration: {e}")))?;

        tracing::info!("PostgreSQL schema initialized");
        Ok(())
    }

    async fn connection(&self) -> Result<deadpool_postgres::Object> {
        self.pool.get().await.map_err(|e| {
            RollcallError::Persistence(format!("Failed to get connection from pool: {e}"))
        })
    }

    async fn set_statement_timeout(&self, client: &deadpool_postgres::Object) -> Result<()> {
        let timeout_query = format!(
            "SET statement_timeout = {}",
            self.config.statement_timeout_seconds * 1000
        );
        client
            .execute(&timeout_query, &[])
            .await
            .map_err(|e| {
                RollcallError::Persistence(format!("Failed to set statement timeout: {e}"))
            })?;
        Ok(())
    }
}

#[async_trait]
impl AttendanceGateway for PostgresGateway {
    async fn upsert_batch(&self, records: &[AttendanceRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        let mut client = self.connection().await?;
        self.set_statement_timeout(&client).await?;

        let tx = client
            .transaction()
            .await
            .map_err(|e| RollcallError::Persistence(format!("Failed to begin transaction: {e}")))?;

        let statement = tx
            .prepare(UPSERT_ATTENDANCE)
            .await
            .map_err(|e| RollcallError::Persistence(format!("Failed to prepare upsert: {e}")))?;

        for record in records {
            let minutes: Option<i32> = record.minutes_absent.map(|m| m as i32);
            tx.execute(
                &statement,
                &[
                    &record.student_id.as_str(),
                    &record.school_code.as_str(),
                    &record.date,
                    &record.status.to_string(),
                    &minutes,
                    &record.comment,
                ],
            )
            .await
            .map_err(|e| {
                RollcallError::Persistence(format!(
                    "Upsert failed for student {} on {}: {e}",
                    record.student_id.as_str(),
                    record.date
                ))
            })?;
        }

        tx.commit()
            .await
            .map_err(|e| RollcallError::Persistence(format!("Failed to commit batch: {e}")))?;

        tracing::debug!(rows = records.len(), "Upserted attendance batch");
        Ok(())
    }

    async fn save_checkpoint(&self, operation: &SyncOperation) -> Result<()> {
        let client = self.connection().await?;
        let document = serde_json::to_value(operation)?;

        client
            .execute(
                UPSERT_CHECKPOINT,
                &[
                    &operation.id.as_str(),
                    &operation.status.to_string(),
                    &document,
                    &operation.started_at,
                ],
            )
            .await
            .map_err(|e| RollcallError::State(format!("Failed to save checkpoint: {e}")))?;

        tracing::debug!(operation_id = %operation.id, "Saved operation checkpoint");
        Ok(())
    }

    async fn load_checkpoint(&self, id: &OperationId) -> Result<Option<SyncOperation>> {
        let client = self.connection().await?;

        let row = client
            .query_opt(
                "SELECT document FROM sync_operations WHERE operation_id = $1",
                &[&id.as_str()],
            )
            .await
            .map_err(|e| RollcallError::State(format!("Failed to load checkpoint: {e}")))?;

        match row {
            Some(row) => {
                let document: serde_json::Value = row.get(0);
                let operation = serde_json::from_value(document)
                    .map_err(|e| RollcallError::State(format!("Corrupt checkpoint: {e}")))?;
                Ok(Some(operation))
            }
            None => Ok(None),
        }
    }

    async fn list_operations(&self) -> Result<Vec<SyncOperation>> {
        let client = self.connection().await?;

        let rows = client
            .query(
                "SELECT document FROM sync_operations ORDER BY started_at DESC",
                &[],
            )
            .await
            .map_err(|e| RollcallError::State(format!("Failed to list operations: {e}")))?;

        let mut operations = Vec::with_capacity(rows.len());
        for row in rows {
            let document: serde_json::Value = row.get(0);
            let operation = serde_json::from_value(document)
                .map_err(|e| RollcallError::State(format!("Corrupt checkpoint: {e}")))?;
            operations.push(operation);
        }
        Ok(operations)
    }
}
