use async_trait::async_trait;
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{
    Result, SagaId, SagaInstance, SagaQuery, SagaStatistics, SagaStatus, StoreError,
    store::{SagaStore, validate_update},
};

const SELECT_COLUMNS: &str = "SELECT id, saga_type, status, triggering_event, executed_steps, \
     compensations, failure, attempt, created_at, updated_at FROM saga_instances";

/// PostgreSQL-backed saga store.
///
/// Each instance is one row; the step logs and the triggering event are
/// stored as JSONB. `update` validates and replaces the row inside a
/// transaction holding a row lock.
#[derive(Clone)]
pub struct PostgresSagaStore {
    pool: PgPool,
}

impl PostgresSagaStore {
    /// Creates a new PostgreSQL saga store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects to `database_url` and returns a store.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPool::connect(database_url).await?;
        Ok(Self::new(pool))
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    fn row_to_instance(row: PgRow) -> Result<SagaInstance> {
        let id = SagaId::from_uuid(row.try_get::<Uuid, _>("id")?);
        let status: String = row.try_get("status")?;
        let failure: Option<serde_json::Value> = row.try_get("failure")?;
        let attempt: i32 = row.try_get("attempt")?;
        let attempt = u32::try_from(attempt)
            .ok()
            .filter(|n| *n > 0)
            .ok_or_else(|| StoreError::CorruptRecord {
                id,
                reason: format!("attempt must be positive, found {attempt}"),
            })?;

        Ok(SagaInstance::from_parts(
            id,
            row.try_get("saga_type")?,
            serde_json::from_value(row.try_get("triggering_event")?)?,
            status.parse::<SagaStatus>()?,
            serde_json::from_value(row.try_get("executed_steps")?)?,
            serde_json::from_value(row.try_get("compensations")?)?,
            failure.map(serde_json::from_value).transpose()?,
            attempt,
            row.try_get("created_at")?,
            row.try_get("updated_at")?,
        ))
    }
}

#[async_trait]
impl SagaStore for PostgresSagaStore {
    #[tracing::instrument(skip(self, instance), fields(saga_id = %instance.id()))]
    async fn save(&self, instance: &SagaInstance) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO saga_instances
                (id, saga_type, status, triggering_event, executed_steps, compensations, failure, attempt, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(instance.id().as_uuid())
        .bind(instance.saga_type())
        .bind(instance.status().as_str())
        .bind(serde_json::to_value(instance.triggering_event())?)
        .bind(serde_json::to_value(instance.executed_steps())?)
        .bind(serde_json::to_value(instance.compensations())?)
        .bind(instance.failure().map(serde_json::to_value).transpose()?)
        .bind(instance.attempt() as i32)
        .bind(instance.created_at())
        .bind(instance.updated_at())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.is_unique_violation()
            {
                return StoreError::AlreadyExists(instance.id());
            }
            StoreError::Database(e)
        })?;

        Ok(())
    }

    async fn load(&self, id: SagaId) -> Result<SagaInstance> {
        let row = sqlx::query(&format!("{SELECT_COLUMNS} WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::NotFound(id))?;

        Self::row_to_instance(row)
    }

    #[tracing::instrument(skip(self, instance), fields(saga_id = %instance.id(), status = %instance.status()))]
    async fn update(&self, instance: &SagaInstance) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(&format!("{SELECT_COLUMNS} WHERE id = $1 FOR UPDATE"))
            .bind(instance.id().as_uuid())
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(StoreError::NotFound(instance.id()))?;
        let current = Self::row_to_instance(row)?;
        validate_update(&current, instance)?;

        sqlx::query(
            r#"
            UPDATE saga_instances SET
                saga_type = $2,
                status = $3,
                triggering_event = $4,
                executed_steps = $5,
                compensations = $6,
                failure = $7,
                attempt = $8,
                updated_at = $9
            WHERE id = $1
            "#,
        )
        .bind(instance.id().as_uuid())
        .bind(instance.saga_type())
        .bind(instance.status().as_str())
        .bind(serde_json::to_value(instance.triggering_event())?)
        .bind(serde_json::to_value(instance.executed_steps())?)
        .bind(serde_json::to_value(instance.compensations())?)
        .bind(instance.failure().map(serde_json::to_value).transpose()?)
        .bind(instance.attempt() as i32)
        .bind(instance.updated_at())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn find(&self, query: SagaQuery) -> Result<Vec<SagaInstance>> {
        let mut sql = format!("{SELECT_COLUMNS} WHERE 1=1");
        let mut param_count = 0;

        // Build dynamic query
        if query.status.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND status = ${param_count}"));
        }
        if query.saga_type.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND saga_type = ${param_count}"));
        }
        if query.created_after.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND created_at >= ${param_count}"));
        }
        if query.created_before.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND created_at <= ${param_count}"));
        }

        sql.push_str(" ORDER BY created_at ASC, id ASC");

        if query.limit.is_some() {
            param_count += 1;
            sql.push_str(&format!(" LIMIT ${param_count}"));
        }
        if query.offset.is_some() {
            param_count += 1;
            sql.push_str(&format!(" OFFSET ${param_count}"));
        }

        let mut sqlx_query = sqlx::query(&sql);

        if let Some(status) = query.status {
            sqlx_query = sqlx_query.bind(status.as_str());
        }
        if let Some(saga_type) = query.saga_type {
            sqlx_query = sqlx_query.bind(saga_type);
        }
        if let Some(after) = query.created_after {
            sqlx_query = sqlx_query.bind(after);
        }
        if let Some(before) = query.created_before {
            sqlx_query = sqlx_query.bind(before);
        }
        if let Some(limit) = query.limit {
            sqlx_query = sqlx_query.bind(limit as i64);
        }
        if let Some(offset) = query.offset {
            sqlx_query = sqlx_query.bind(offset as i64);
        }

        let rows = sqlx_query.fetch_all(&self.pool).await?;
        rows.into_iter().map(Self::row_to_instance).collect()
    }

    async fn statistics(&self) -> Result<SagaStatistics> {
        let rows = sqlx::query("SELECT status, COUNT(*) AS count FROM saga_instances GROUP BY status")
            .fetch_all(&self.pool)
            .await?;

        let mut stats = SagaStatistics::default();
        for row in rows {
            let status: String = row.try_get("status")?;
            let count: i64 = row.try_get("count")?;
            stats.add(status.parse()?, count as u64);
        }
        Ok(stats)
    }
}
