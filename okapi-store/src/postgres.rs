use crate::store::Store;
use async_trait::async_trait;
use okapi_core::discovery::DeploymentDescriptor;
use okapi_core::error::OkapiError;
use okapi_core::module::ModuleDescriptor;
use okapi_core::tenant::Tenant;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use uuid::Uuid;

/// Postgres-backed `Store`. Each resource is a single JSONB column
/// keyed by id — the core's records are already serde-shaped, and
/// Postgres-side querying of individual fields is not part of the
/// gateway's value (spec.md §1, "persistent storage backends ... out
/// of scope" beyond this contract).
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub async fn connect(url: &str) -> Result<Self, OkapiError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(url)
            .await
            .map_err(|e| OkapiError::Internal(format!("postgres connect: {e}")))?;
        Ok(Self { pool })
    }

    /// Creates the tables this store needs if they don't already exist.
    /// Called once at startup; not a migration framework.
    pub async fn init_schema(&self) -> Result<(), OkapiError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS okapi_modules (id TEXT PRIMARY KEY, descriptor JSONB NOT NULL)",
        )
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS okapi_tenants (id TEXT PRIMARY KEY, descriptor JSONB NOT NULL)",
        )
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS okapi_deployments (inst_id UUID PRIMARY KEY, descriptor JSONB NOT NULL)",
        )
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS okapi_timestamps (key TEXT PRIMARY KEY, value BIGINT NOT NULL)",
        )
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }
}

fn db_err(e: sqlx::Error) -> OkapiError {
    OkapiError::Internal(format!("postgres: {e}"))
}

#[async_trait]
impl Store for PostgresStore {
    async fn list_modules(&self) -> Result<Vec<ModuleDescriptor>, OkapiError> {
        let rows = sqlx::query("SELECT descriptor FROM okapi_modules")
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        rows.iter()
            .map(|row| {
                let value: serde_json::Value = row.get("descriptor");
                serde_json::from_value(value).map_err(OkapiError::Serde)
            })
            .collect()
    }

    async fn put_module(&self, module: &ModuleDescriptor) -> Result<(), OkapiError> {
        let value = serde_json::to_value(module)?;
        sqlx::query(
            "INSERT INTO okapi_modules (id, descriptor) VALUES ($1, $2) \
             ON CONFLICT (id) DO UPDATE SET descriptor = EXCLUDED.descriptor",
        )
        .bind(&module.id)
        .bind(value)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn delete_module(&self, id: &str) -> Result<(), OkapiError> {
        sqlx::query("DELETE FROM okapi_modules WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn list_tenants(&self) -> Result<Vec<Tenant>, OkapiError> {
        let rows = sqlx::query("SELECT descriptor FROM okapi_tenants")
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        rows.iter()
            .map(|row| {
                let value: serde_json::Value = row.get("descriptor");
                serde_json::from_value(value).map_err(OkapiError::Serde)
            })
            .collect()
    }

    async fn put_tenant(&self, tenant: &Tenant) -> Result<(), OkapiError> {
        let value = serde_json::to_value(tenant)?;
        sqlx::query(
            "INSERT INTO okapi_tenants (id, descriptor) VALUES ($1, $2) \
             ON CONFLICT (id) DO UPDATE SET descriptor = EXCLUDED.descriptor",
        )
        .bind(&tenant.id)
        .bind(value)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn list_deployments(&self) -> Result<Vec<DeploymentDescriptor>, OkapiError> {
        let rows = sqlx::query("SELECT descriptor FROM okapi_deployments")
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        rows.iter()
            .map(|row| {
                let value: serde_json::Value = row.get("descriptor");
                serde_json::from_value(value).map_err(OkapiError::Serde)
            })
            .collect()
    }

    async fn put_deployment(&self, deployment: &DeploymentDescriptor) -> Result<(), OkapiError> {
        let value = serde_json::to_value(deployment)?;
        sqlx::query(
            "INSERT INTO okapi_deployments (inst_id, descriptor) VALUES ($1, $2) \
             ON CONFLICT (inst_id) DO UPDATE SET descriptor = EXCLUDED.descriptor",
        )
        .bind(deployment.inst_id)
        .bind(value)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn delete_deployment(&self, inst_id: Uuid) -> Result<(), OkapiError> {
        sqlx::query("DELETE FROM okapi_deployments WHERE inst_id = $1")
            .bind(inst_id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn current_timestamp(&self, key: &str) -> Result<i64, OkapiError> {
        let row = sqlx::query("SELECT value FROM okapi_timestamps WHERE key = $1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(row.map(|r| r.get::<i64, _>("value")).unwrap_or(-1))
    }

    /// `SELECT ... FOR UPDATE; UPDATE` cycle inside one transaction, per
    /// spec.md §6's named implementation strategy.
    async fn advance(&self, key: &str, current: i64) -> Result<i64, OkapiError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        let row = sqlx::query("SELECT value FROM okapi_timestamps WHERE key = $1 FOR UPDATE")
            .bind(key)
            .fetch_optional(&mut *tx)
            .await
            .map_err(db_err)?;
        let stored = row.map(|r| r.get::<i64, _>("value")).unwrap_or(-1);
        let new_ts = stored.max(current) + 1;
        sqlx::query(
            "INSERT INTO okapi_timestamps (key, value) VALUES ($1, $2) \
             ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value",
        )
        .bind(key)
        .bind(new_ts)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;
        tx.commit().await.map_err(db_err)?;
        Ok(new_ts)
    }
}
