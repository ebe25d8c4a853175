use async_trait::async_trait;
use snip_core::{
    BatchEntry, BatchItem, Context, Generator, OwnerId, RandomGenerator, Result, ShortId,
    ShortUrlRecord, Storage, StorageError,
};
use sqlx::error::ErrorKind;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::{debug, warn};

const SCHEMA: &str = include_str!("../ddl/postgres/short_urls.sql");

const PRIMARY_KEY: &str = "short_urls_pkey";
const ACTIVE_OWNER_URL_INDEX: &str = "short_urls_active_owner_url";

/// How many freshly generated ids a single insert tries before giving up.
const MAX_ID_ATTEMPTS: usize = 5;

/// PostgreSQL implementation of [`Storage`].
///
/// Uniqueness is delegated to the schema: the primary key guards ids and a
/// partial unique index guards one active `(original_url, owner_id)` pair
/// per single add. Losing the race on that index surfaces as
/// [`StorageError::Conflict`]; callers resolve it by looking the URL up.
/// Batch inserts are marked `batched` and bypass the index.
#[derive(Debug, Clone)]
pub struct PostgresStorage<G = RandomGenerator> {
    pool: PgPool,
    generator: G,
}

impl PostgresStorage<RandomGenerator> {
    /// Creates a storage from an existing connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self::with_generator(pool, RandomGenerator::new())
    }

    /// Creates a storage by opening a new connection pool.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPool::connect(database_url)
            .await
            .map_err(map_sqlx_error)?;
        Ok(Self::new(pool))
    }
}

impl<G: Generator> PostgresStorage<G> {
    pub fn with_generator(pool: PgPool, generator: G) -> Self {
        Self { pool, generator }
    }

    /// Returns a reference to the underlying pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Creates the table and indexes if they do not exist yet.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::raw_sql(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn find_active(&self, original_url: &str, owner: OwnerId) -> Result<Option<ShortId>> {
        let row = sqlx::query(
            r#"
            SELECT id
            FROM short_urls
            WHERE original_url = $1
              AND owner_id = $2
              AND NOT is_deleted
            LIMIT 1
            "#,
        )
        .bind(original_url)
        .bind(owner_column(owner))
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        row.map(|row| id_from_row(&row)).transpose()
    }

    async fn insert_one(&self, original_url: &str, owner: OwnerId) -> Result<ShortId> {
        if let Some(existing) = self.find_active(original_url, owner).await? {
            return Ok(existing);
        }

        for attempt in 1..=MAX_ID_ATTEMPTS {
            let id = self.generator.generate();
            let result = sqlx::query(
                r#"
                INSERT INTO short_urls (id, original_url, owner_id)
                VALUES ($1, $2, $3)
                "#,
            )
            .bind(id.as_str())
            .bind(original_url)
            .bind(owner_column(owner))
            .execute(&self.pool)
            .await;

            match result {
                Ok(_) => {
                    debug!(id = %id, owner = %owner, "inserted short url");
                    return Ok(id);
                }
                Err(err) => match classify(&err) {
                    Some(Violation::PrimaryKey) => {
                        debug!(id = %id, attempt, "generated id already taken, retrying");
                    }
                    Some(Violation::ActiveOwnerUrl) => {
                        return Err(StorageError::Conflict(original_url.to_string()));
                    }
                    _ => return Err(map_sqlx_error(err)),
                },
            }
        }

        Err(StorageError::Conflict(format!(
            "no free id after {MAX_ID_ATTEMPTS} attempts"
        )))
    }

    async fn insert_batch(&self, items: Vec<BatchItem>, owner: OwnerId) -> Result<Vec<BatchEntry>> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;
        let mut entries: Vec<BatchEntry> = Vec::with_capacity(items.len());

        for item in items {
            let id = loop {
                let candidate = self.generator.generate();
                if !entries.iter().any(|entry| entry.id == candidate) {
                    break candidate;
                }
            };

            // Same statement text on the same connection: sqlx prepares it
            // once and reuses it for every row.
            let result = sqlx::query(
                r#"
                INSERT INTO short_urls (id, original_url, owner_id, correlation_id, batched)
                VALUES ($1, $2, $3, $4, TRUE)
                "#,
            )
            .bind(id.as_str())
            .bind(item.original_url.as_str())
            .bind(owner_column(owner))
            .bind(item.correlation_id.as_deref())
            .execute(&mut *tx)
            .await;

            if let Err(err) = result {
                let mapped = map_write_error(err);
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(error = %rollback_err, "batch rollback failed");
                }
                return Err(mapped);
            }

            entries.push(BatchEntry {
                id,
                correlation_id: item.correlation_id,
            });
        }

        tx.commit().await.map_err(map_sqlx_error)?;
        debug!(count = entries.len(), owner = %owner, "inserted short url batch");
        Ok(entries)
    }

    async fn select_by_id(&self, id: &ShortId) -> Result<ShortUrlRecord> {
        let row = sqlx::query(
            r#"
            SELECT id, original_url, owner_id, correlation_id, is_deleted
            FROM short_urls
            WHERE id = $1
            "#,
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        match row {
            Some(row) => record_from_row(&row),
            None => Err(StorageError::NotFound(id.to_string())),
        }
    }

    async fn select_by_original_url(&self, original_url: &str) -> Result<ShortId> {
        let row = sqlx::query(
            r#"
            SELECT id
            FROM short_urls
            WHERE original_url = $1
            ORDER BY is_deleted ASC
            LIMIT 1
            "#,
        )
        .bind(original_url)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        match row {
            Some(row) => id_from_row(&row),
            None => Err(StorageError::NotFound(original_url.to_string())),
        }
    }

    async fn select_by_owner(&self, owner: OwnerId) -> Result<Vec<ShortUrlRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, original_url, owner_id, correlation_id, is_deleted
            FROM short_urls
            WHERE owner_id = $1
              AND NOT is_deleted
            "#,
        )
        .bind(owner_column(owner))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.iter().map(record_from_row).collect()
    }

    async fn mark_deleted(&self, ids: &[ShortId], owner: OwnerId) -> Result<()> {
        let ids: Vec<String> = ids.iter().map(|id| id.as_str().to_owned()).collect();

        let result = sqlx::query(
            r#"
            UPDATE short_urls
            SET is_deleted = TRUE
            WHERE id = ANY($1)
              AND owner_id = $2
              AND NOT is_deleted
            "#,
        )
        .bind(ids.as_slice())
        .bind(owner_column(owner))
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        debug!(
            requested = ids.len(),
            deleted = result.rows_affected(),
            owner = %owner,
            "soft-deleted short urls"
        );
        Ok(())
    }

    async fn select_one(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Violation {
    PrimaryKey,
    ActiveOwnerUrl,
    Check,
}

/// Recognizes the constraint violations this schema can raise.
///
/// This is the only place that looks at driver-specific error details.
fn classify(err: &sqlx::Error) -> Option<Violation> {
    let db_err = err.as_database_error()?;
    match db_err.kind() {
        ErrorKind::UniqueViolation => match db_err.constraint() {
            Some(PRIMARY_KEY) => Some(Violation::PrimaryKey),
            Some(ACTIVE_OWNER_URL_INDEX) => Some(Violation::ActiveOwnerUrl),
            _ => None,
        },
        ErrorKind::CheckViolation | ErrorKind::NotNullViolation => Some(Violation::Check),
        _ => None,
    }
}

fn map_write_error(err: sqlx::Error) -> StorageError {
    match classify(&err) {
        Some(Violation::Check) => StorageError::InvalidArgument(err.to_string()),
        Some(Violation::PrimaryKey) | Some(Violation::ActiveOwnerUrl) => {
            StorageError::Conflict(err.to_string())
        }
        None => map_sqlx_error(err),
    }
}

fn map_sqlx_error(err: sqlx::Error) -> StorageError {
    let message = err.to_string();

    match err {
        sqlx::Error::RowNotFound => StorageError::NotFound(message),
        sqlx::Error::ColumnIndexOutOfBounds { .. }
        | sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::TypeNotFound { .. }
        | sqlx::Error::Decode(_) => StorageError::Unavailable(format!("invalid stored data: {message}")),
        sqlx::Error::Database(_) => match classify(&err) {
            Some(Violation::Check) => StorageError::InvalidArgument(message),
            Some(_) => StorageError::Conflict(message),
            None => StorageError::Unavailable(message),
        },
        _ => StorageError::Unavailable(message),
    }
}

fn owner_column(owner: OwnerId) -> i64 {
    i64::from(owner.get())
}

fn owner_from_column(value: i64) -> Result<OwnerId> {
    u32::try_from(value)
        .map(OwnerId)
        .map_err(|_| StorageError::Unavailable(format!("owner id out of range: {value}")))
}

fn id_from_row(row: &PgRow) -> Result<ShortId> {
    let id: String = row.try_get("id").map_err(map_sqlx_error)?;
    Ok(ShortId::new_unchecked(id))
}

fn record_from_row(row: &PgRow) -> Result<ShortUrlRecord> {
    let owner_raw: i64 = row.try_get("owner_id").map_err(map_sqlx_error)?;
    Ok(ShortUrlRecord {
        id: id_from_row(row)?,
        original_url: row.try_get("original_url").map_err(map_sqlx_error)?,
        owner_id: owner_from_column(owner_raw)?,
        correlation_id: row.try_get("correlation_id").map_err(map_sqlx_error)?,
        deleted: row.try_get("is_deleted").map_err(map_sqlx_error)?,
    })
}

#[async_trait]
impl<G: Generator> Storage for PostgresStorage<G> {
    async fn add(&self, ctx: &Context, original_url: &str, owner: OwnerId) -> Result<ShortId> {
        ctx.run(self.insert_one(original_url, owner)).await
    }

    async fn add_batch(
        &self,
        ctx: &Context,
        items: Vec<BatchItem>,
        owner: OwnerId,
    ) -> Result<Vec<BatchEntry>> {
        ctx.run(self.insert_batch(items, owner)).await
    }

    async fn get_by_id(&self, ctx: &Context, id: &ShortId) -> Result<ShortUrlRecord> {
        ctx.run(self.select_by_id(id)).await
    }

    async fn get_by_original_url(&self, ctx: &Context, original_url: &str) -> Result<ShortId> {
        ctx.run(self.select_by_original_url(original_url)).await
    }

    async fn get_by_original_url_for_owner(
        &self,
        ctx: &Context,
        original_url: &str,
        owner: OwnerId,
    ) -> Result<ShortId> {
        ctx.run(async {
            match self.find_active(original_url, owner).await {
                Ok(Some(id)) => Ok(id),
                Ok(None) => Err(StorageError::NotFound(original_url.to_string())),
                Err(err) => Err(err),
            }
        })
        .await
    }

    async fn get_urls_by_owner(
        &self,
        ctx: &Context,
        owner: OwnerId,
    ) -> Result<Vec<ShortUrlRecord>> {
        ctx.run(self.select_by_owner(owner)).await
    }

    async fn delete_urls(&self, ctx: &Context, ids: &[ShortId], owner: OwnerId) -> Result<()> {
        if ids.is_empty() {
            return ctx.check();
        }
        ctx.run(self.mark_deleted(ids, owner)).await
    }

    async fn ping(&self, ctx: &Context) -> Result<()> {
        ctx.run(self.select_one()).await
    }
}
