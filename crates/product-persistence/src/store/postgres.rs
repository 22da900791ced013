//! PostgreSQL record store router.
//!
//! Two independent `deadpool-postgres` pools, one per member. A pooled
//! [`Object`] is the connection scope: dropping it returns the connection to
//! its pool, which also covers a request future cancelled mid-query. Writes
//! run inside a `tokio_postgres` transaction that rolls back when dropped
//! uncommitted.

use std::time::Duration;

use async_trait::async_trait;
use deadpool_postgres::{
    Config, ManagerConfig, Object, Pool, PoolConfig, RecyclingMethod, Runtime, Timeouts,
};
use product_domain::{Member, Product, ProductDraft, Role};
use tokio_postgres::{NoTls, Row};

use super::ProductStore;
use crate::error::{PersistenceError, Result, classify_pg};

const SELECT_BY_ID: &str = r"
    SELECT id::BIGINT, name::TEXT, price_cents::BIGINT, updated_at::TIMESTAMPTZ
    FROM products
    WHERE id = $1::BIGINT
";

const SELECT_ALL: &str = r"
    SELECT id::BIGINT, name::TEXT, price_cents::BIGINT, updated_at::TIMESTAMPTZ
    FROM products
    ORDER BY id
";

// GREATEST keeps updated_at strictly increasing even if two writes share a
// transaction timestamp or the primary's clock steps back.
const UPDATE_RETURNING: &str = r"
    UPDATE products
    SET name = $1::TEXT,
        price_cents = $2::BIGINT,
        updated_at = GREATEST(NOW(), updated_at + INTERVAL '1 microsecond')
    WHERE id = $3::BIGINT
    RETURNING id::BIGINT, name::TEXT, price_cents::BIGINT, updated_at::TIMESTAMPTZ
";

const INSERT_RETURNING: &str = r"
    INSERT INTO products (name, price_cents, updated_at)
    VALUES ($1::TEXT, $2::BIGINT, NOW())
    RETURNING id::BIGINT, name::TEXT, price_cents::BIGINT, updated_at::TIMESTAMPTZ
";

const ROLE_QUERY: &str = "SELECT pg_is_in_recovery()";

const SCHEMA: &str = include_str!("../../sql/001_products.sql");

// =============================================================================
// CONFIGURATION
// =============================================================================

/// Connection settings for one member.
#[derive(Debug, Clone)]
pub struct PgMemberConfig {
    pub host: String,
    pub port: u16,
}

/// Router configuration. Database, credentials, pool sizing and timeouts are
/// shared by both members.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub primary: PgMemberConfig,
    pub replica: PgMemberConfig,
    pub dbname: String,
    pub user: String,
    pub password: String,
    pub max_size: usize,
    /// TCP connect timeout for new connections.
    pub connect_timeout: Duration,
    /// How long a request waits for a free pooled connection before the
    /// member counts as unavailable.
    pub wait_timeout: Duration,
    /// Server-side `statement_timeout`.
    pub statement_timeout: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            primary: PgMemberConfig {
                host: "localhost".to_string(),
                port: 5439,
            },
            replica: PgMemberConfig {
                host: "localhost".to_string(),
                port: 5433,
            },
            dbname: "appdb".to_string(),
            user: "app".to_string(),
            password: "app_pwd".to_string(),
            max_size: 20,
            connect_timeout: Duration::from_secs(2),
            wait_timeout: Duration::from_secs(2),
            statement_timeout: Duration::from_secs(5),
        }
    }
}

impl StoreConfig {
    fn member(&self, member: Member) -> &PgMemberConfig {
        match member {
            Member::Primary => &self.primary,
            Member::Replica => &self.replica,
        }
    }

    fn create_pool(&self, member: Member) -> Result<Pool> {
        let endpoint = self.member(member);

        let mut cfg = Config::new();
        cfg.host = Some(endpoint.host.clone());
        cfg.port = Some(endpoint.port);
        cfg.dbname = Some(self.dbname.clone());
        cfg.user = Some(self.user.clone());
        cfg.password = Some(self.password.clone());
        cfg.application_name = Some(format!("product-catalog-{member}"));
        cfg.connect_timeout = Some(self.connect_timeout);
        cfg.options = Some(format!(
            "-c statement_timeout={}",
            self.statement_timeout.as_millis()
        ));

        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });

        let mut pool = PoolConfig::new(self.max_size);
        pool.timeouts = Timeouts {
            wait: Some(self.wait_timeout),
            create: Some(self.connect_timeout),
            recycle: Some(self.connect_timeout),
        };
        cfg.pool = Some(pool);

        cfg.create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| PersistenceError::unavailable(member, format!("cannot create pool: {e}")))
    }
}

// =============================================================================
// ROUTER
// =============================================================================

/// Primary/replica connection router.
///
/// Built once at startup and shared; [`PgRouter::close`] is called once at
/// shutdown.
pub struct PgRouter {
    primary: Pool,
    replica: Pool,
}

impl PgRouter {
    /// Build both pools. Connections are opened lazily on first acquisition.
    pub fn new(config: &StoreConfig) -> Result<Self> {
        Ok(Self {
            primary: config.create_pool(Member::Primary)?,
            replica: config.create_pool(Member::Replica)?,
        })
    }

    fn pool(&self, member: Member) -> &Pool {
        match member {
            Member::Primary => &self.primary,
            Member::Replica => &self.replica,
        }
    }

    /// Acquire a connection scope from `member`'s pool.
    ///
    /// Pool exhaustion past the wait timeout is reported as
    /// `StoreUnavailable`, never as an indefinite wait.
    pub async fn acquire(&self, member: Member) -> Result<Object> {
        self.pool(member)
            .get()
            .await
            .map_err(|e| PersistenceError::from_pool(member, &e))
    }

    /// Create the `products` table on the primary if it does not exist.
    pub async fn ensure_schema(&self) -> Result<()> {
        let conn = self.acquire(Member::Primary).await?;
        conn.batch_execute(SCHEMA)
            .await
            .map_err(|e| classify_pg(Member::Primary, &e))?;
        tracing::info!("Schema ensured on primary");
        Ok(())
    }

    /// Current pool size for `member`, for observability.
    pub fn pool_size(&self, member: Member) -> usize {
        self.pool(member).status().size
    }

    /// Close both pools. Checked-out connections are dropped when returned.
    pub fn close(&self) {
        self.primary.close();
        self.replica.close();
        tracing::info!("All connection pools closed");
    }
}

fn product_from_row(row: &Row) -> Result<Product> {
    let decode = |e: tokio_postgres::Error| PersistenceError::Serialization(e.to_string());
    Ok(Product {
        id: row.try_get(0).map_err(decode)?,
        name: row.try_get(1).map_err(decode)?,
        price_cents: row.try_get(2).map_err(decode)?,
        updated_at: row.try_get(3).map_err(decode)?,
    })
}

#[async_trait]
impl ProductStore for PgRouter {
    async fn fetch(&self, member: Member, id: i64) -> Result<Option<Product>> {
        let conn = self.acquire(member).await?;
        let row = conn
            .query_opt(SELECT_BY_ID, &[&id])
            .await
            .map_err(|e| classify_pg(member, &e))?;

        row.as_ref().map(product_from_row).transpose()
    }

    async fn list(&self, member: Member) -> Result<Vec<Product>> {
        let conn = self.acquire(member).await?;
        let rows = conn
            .query(SELECT_ALL, &[])
            .await
            .map_err(|e| classify_pg(member, &e))?;

        rows.iter().map(product_from_row).collect()
    }

    async fn update(&self, id: i64, draft: &ProductDraft) -> Result<Option<Product>> {
        let member = Member::Primary;
        let mut conn = self.acquire(member).await?;
        let client: &mut tokio_postgres::Client = &mut conn;

        let tx = client
            .transaction()
            .await
            .map_err(|e| classify_pg(member, &e))?;

        let row = tx
            .query_opt(UPDATE_RETURNING, &[&draft.name, &draft.price_cents, &id])
            .await
            .map_err(|e| classify_pg(member, &e))?;
        let product = row.as_ref().map(product_from_row).transpose()?;

        // Zero rows still commits: there is nothing to roll back.
        tx.commit().await.map_err(|e| classify_pg(member, &e))?;
        Ok(product)
    }

    async fn insert(&self, draft: &ProductDraft) -> Result<Product> {
        let member = Member::Primary;
        let mut conn = self.acquire(member).await?;
        let client: &mut tokio_postgres::Client = &mut conn;

        let tx = client
            .transaction()
            .await
            .map_err(|e| classify_pg(member, &e))?;

        let row = tx
            .query_one(INSERT_RETURNING, &[&draft.name, &draft.price_cents])
            .await
            .map_err(|e| classify_pg(member, &e))?;
        let product = product_from_row(&row)?;

        tx.commit().await.map_err(|e| classify_pg(member, &e))?;
        Ok(product)
    }

    async fn role(&self, member: Member) -> Result<Role> {
        let conn = self.acquire(member).await?;
        let row = conn
            .query_one(ROLE_QUERY, &[])
            .await
            .map_err(|e| classify_pg(member, &e))?;
        let in_recovery: bool = row
            .try_get(0)
            .map_err(|e| PersistenceError::Serialization(e.to_string()))?;

        Ok(Role::from_in_recovery(in_recovery))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_router_builds_without_connecting() {
        let router = PgRouter::new(&StoreConfig::default()).unwrap();
        assert_eq!(router.pool_size(Member::Primary), 0);
        assert_eq!(router.pool_size(Member::Replica), 0);
    }

    #[test]
    fn test_members_have_distinct_endpoints() {
        let config = StoreConfig::default();
        assert_ne!(
            config.member(Member::Primary).port,
            config.member(Member::Replica).port
        );
    }

    #[tokio::test]
    async fn test_closed_pool_is_unavailable() {
        let router = PgRouter::new(&StoreConfig::default()).unwrap();
        router.close();

        let err = router.fetch(Member::Replica, 1).await.unwrap_err();
        assert!(err.is_unavailable());
    }
}
