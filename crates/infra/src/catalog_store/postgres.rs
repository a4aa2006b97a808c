//! Postgres-backed catalog store.
//!
//! Every invariant has a database-level backstop so that two engine instances
//! racing on the same product cannot break it:
//!
//! | Invariant | Enforced by |
//! |-----------|-------------|
//! | option key unique per product | `catalog_options_key_unique` |
//! | value unique per option (case-insensitive) | `catalog_option_values_value_unique` on `lower(value)` |
//! | variant name unique among live variants | partial index `catalog_variants_name_unique` |
//! | combination unique among live variants | partial index `catalog_variants_combination_unique` on `combination_key` |
//! | value belongs to option | composite FK `catalog_variant_options_value_fk` |
//! | one value per option per variant | primary key of `catalog_variant_options` |
//! | referential closure | named FKs, plus row locks in the delete transactions |
//!
//! ## Error Mapping
//!
//! | PostgreSQL Error Code | Constraint | CatalogError |
//! |----------------------|------------|--------------|
//! | `23505` | `*_key_unique` / `*_value_unique` / `*_name_unique` | `Conflict` with the matching code |
//! | `23505` | `catalog_variants_combination_unique` | `InvalidCombination(DUPLICATE_COMBINATION)` |
//! | `23505` | `catalog_variant_options_pkey` | `InvalidCombination(INVALID_OPTION_COMBINATION)` |
//! | `23503` | `catalog_options_product_fk` | `Conflict(HAS_OPTIONS)` on delete |
//! | `23503` | `catalog_variants_product_fk` | `Conflict(HAS_VARIANTS)` on delete |
//! | `23503` | `catalog_option_values_option_fk` | `Conflict(HAS_OPTION_VALUES)` on delete |
//! | `23503` | `catalog_variant_options_value_fk` | `Conflict(OPTION_VALUE_IN_USE)` / `InvalidCombination` |
//! | any other | | `Store` |
//!
//! ## Locking
//!
//! - `insert_option` locks the product row `FOR UPDATE`; `insert_variant` takes
//!   `FOR SHARE` on it, so an option can never appear under a live variant.
//! - `delete_value` locks the value row `FOR UPDATE`; `insert_assignment` takes
//!   `FOR SHARE` on it, so the usage check and the delete are atomic.
//! - `insert_assignment` locks the variant row `FOR UPDATE`, which serializes
//!   assignment inserts per variant.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{FromRow, PgConnection, Row};
use tracing::instrument;

use storefront_catalog::rules::{self, AssignmentCandidate};
use storefront_catalog::normalize;
use storefront_catalog::{
    OptionValue, Product, ProductOption, SelectionEntry, Variant, VariantOptionAssignment, VariantPatch,
};
use storefront_core::{
    CatalogError, CatalogResult, ErrorCode, OptionId, OptionValueId, ProductId, TenantId,
    VariantId,
};

use super::r#trait::CatalogStore;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS catalog_products (
    tenant_id UUID NOT NULL,
    id UUID NOT NULL,
    position BIGSERIAL,
    name TEXT NOT NULL,
    active BOOLEAN NOT NULL,
    created_at TIMESTAMPTZ NOT NULL,
    PRIMARY KEY (tenant_id, id)
);

CREATE TABLE IF NOT EXISTS catalog_options (
    tenant_id UUID NOT NULL,
    id UUID NOT NULL,
    product_id UUID NOT NULL,
    position BIGSERIAL,
    key TEXT NOT NULL,
    created_at TIMESTAMPTZ NOT NULL,
    PRIMARY KEY (tenant_id, id),
    CONSTRAINT catalog_options_key_unique UNIQUE (tenant_id, product_id, key),
    CONSTRAINT catalog_options_product_fk FOREIGN KEY (tenant_id, product_id)
        REFERENCES catalog_products (tenant_id, id)
);

CREATE TABLE IF NOT EXISTS catalog_option_values (
    tenant_id UUID NOT NULL,
    id UUID NOT NULL,
    option_id UUID NOT NULL,
    position BIGSERIAL,
    value TEXT NOT NULL,
    created_at TIMESTAMPTZ NOT NULL,
    PRIMARY KEY (tenant_id, id),
    CONSTRAINT catalog_option_values_owner_unique UNIQUE (tenant_id, option_id, id),
    CONSTRAINT catalog_option_values_option_fk FOREIGN KEY (tenant_id, option_id)
        REFERENCES catalog_options (tenant_id, id)
);

CREATE UNIQUE INDEX IF NOT EXISTS catalog_option_values_value_unique
    ON catalog_option_values (tenant_id, option_id, lower(value));

CREATE TABLE IF NOT EXISTS catalog_variants (
    tenant_id UUID NOT NULL,
    id UUID NOT NULL,
    product_id UUID NOT NULL,
    position BIGSERIAL,
    name TEXT NOT NULL,
    price BIGINT NOT NULL CHECK (price >= 0),
    stock BIGINT NOT NULL CHECK (stock >= 0),
    active BOOLEAN NOT NULL,
    is_subscription BOOLEAN NOT NULL,
    created_at TIMESTAMPTZ NOT NULL,
    archived_at TIMESTAMPTZ NULL,
    combination_key TEXT NULL,
    PRIMARY KEY (tenant_id, id),
    CONSTRAINT catalog_variants_product_fk FOREIGN KEY (tenant_id, product_id)
        REFERENCES catalog_products (tenant_id, id)
);

CREATE UNIQUE INDEX IF NOT EXISTS catalog_variants_name_unique
    ON catalog_variants (tenant_id, product_id, lower(name))
    WHERE archived_at IS NULL;

CREATE UNIQUE INDEX IF NOT EXISTS catalog_variants_combination_unique
    ON catalog_variants (tenant_id, product_id, combination_key)
    WHERE archived_at IS NULL AND combination_key IS NOT NULL;

CREATE TABLE IF NOT EXISTS catalog_variant_options (
    tenant_id UUID NOT NULL,
    variant_id UUID NOT NULL,
    option_id UUID NOT NULL,
    option_value_id UUID NOT NULL,
    position BIGSERIAL,
    CONSTRAINT catalog_variant_options_pkey PRIMARY KEY (tenant_id, variant_id, option_id),
    CONSTRAINT catalog_variant_options_variant_fk FOREIGN KEY (tenant_id, variant_id)
        REFERENCES catalog_variants (tenant_id, id),
    CONSTRAINT catalog_variant_options_value_fk FOREIGN KEY (tenant_id, option_id, option_value_id)
        REFERENCES catalog_option_values (tenant_id, option_id, id)
);

CREATE INDEX IF NOT EXISTS catalog_variant_options_value_idx
    ON catalog_variant_options (tenant_id, option_value_id);
"#;

const PRODUCT_COLUMNS: &str = "id, name, active, created_at";
const OPTION_COLUMNS: &str = "id, product_id, key, created_at";
const VALUE_COLUMNS: &str = "id, option_id, value, created_at";
const VARIANT_COLUMNS: &str =
    "id, product_id, name, price, stock, active, is_subscription, created_at, archived_at";

/// Postgres-backed catalog store.
///
/// Every query includes `tenant_id` in its WHERE clause and every key starts
/// with it, so rows of another tenant are unreachable.
#[derive(Debug, Clone)]
pub struct PostgresCatalogStore {
    pool: Arc<PgPool>,
}

impl PostgresCatalogStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Open a pool against `database_url`.
    pub async fn connect(database_url: &str, max_connections: u32) -> CatalogResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Create tables and indexes if they do not exist.
    #[instrument(skip(self), err)]
    pub async fn ensure_schema(&self) -> CatalogResult<()> {
        sqlx::raw_sql(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        Ok(())
    }

    async fn begin(&self) -> CatalogResult<sqlx::Transaction<'static, sqlx::Postgres>> {
        self.pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))
    }
}

// Row helpers shared by transactional and pool-level paths.

async fn lock_product(
    conn: &mut PgConnection,
    tenant_id: TenantId,
    id: ProductId,
    mode: &str,
) -> CatalogResult<()> {
    let sql = format!("SELECT id FROM catalog_products WHERE tenant_id = $1 AND id = $2 FOR {mode}");
    sqlx::query(&sql)
        .bind(tenant_id.as_uuid())
        .bind(id.as_uuid())
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("lock_product", e))?
        .map(|_| ())
        .ok_or_else(|| product_not_found(id))
}

async fn fetch_variant(
    conn: &mut PgConnection,
    tenant_id: TenantId,
    id: VariantId,
    lock: bool,
) -> CatalogResult<Option<Variant>> {
    let sql = format!(
        "SELECT {VARIANT_COLUMNS} FROM catalog_variants WHERE tenant_id = $1 AND id = $2{}",
        if lock { " FOR UPDATE" } else { "" }
    );
    let row = sqlx::query(&sql)
        .bind(tenant_id.as_uuid())
        .bind(id.as_uuid())
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("fetch_variant", e))?;
    row.map(|r| decode::<VariantRow>(&r).map(|v| v.0)).transpose()
}

async fn fetch_variants(
    conn: &mut PgConnection,
    tenant_id: TenantId,
    product_id: ProductId,
) -> CatalogResult<Vec<Variant>> {
    let sql = format!(
        "SELECT {VARIANT_COLUMNS} FROM catalog_variants \
         WHERE tenant_id = $1 AND product_id = $2 ORDER BY position ASC"
    );
    let rows = sqlx::query(&sql)
        .bind(tenant_id.as_uuid())
        .bind(product_id.as_uuid())
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("fetch_variants", e))?;
    rows.iter()
        .map(|r| decode::<VariantRow>(r).map(|v| v.0))
        .collect()
}

async fn fetch_assignments(
    conn: &mut PgConnection,
    tenant_id: TenantId,
    variant_id: VariantId,
) -> CatalogResult<Vec<VariantOptionAssignment>> {
    let rows = sqlx::query(
        r#"
        SELECT variant_id, option_id, option_value_id
        FROM catalog_variant_options
        WHERE tenant_id = $1 AND variant_id = $2
        ORDER BY position ASC
        "#,
    )
    .bind(tenant_id.as_uuid())
    .bind(variant_id.as_uuid())
    .fetch_all(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error("fetch_assignments", e))?;
    rows.iter()
        .map(|r| decode::<AssignmentRow>(r).map(|a| a.0))
        .collect()
}

async fn count(conn: &mut PgConnection, operation: &str, sql: &str, tenant_id: TenantId, id: &uuid::Uuid) -> CatalogResult<u64> {
    let n: i64 = sqlx::query_scalar(sql)
        .bind(tenant_id.as_uuid())
        .bind(id)
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error(operation, e))?;
    Ok(n.max(0) as u64)
}

const COUNT_LIVE_USAGE: &str = r#"
    SELECT COUNT(*) FROM catalog_variant_options a
    JOIN catalog_variants v ON v.tenant_id = a.tenant_id AND v.id = a.variant_id
    WHERE a.tenant_id = $1 AND a.option_value_id = $2 AND v.archived_at IS NULL
"#;

#[async_trait::async_trait]
impl CatalogStore for PostgresCatalogStore {
    #[instrument(skip(self, product), fields(tenant_id = %tenant_id, product_id = %product.id), err)]
    async fn insert_product(&self, tenant_id: TenantId, product: Product) -> CatalogResult<Product> {
        sqlx::query(
            r#"
            INSERT INTO catalog_products (tenant_id, id, name, active, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(product.id.as_uuid())
        .bind(&product.name)
        .bind(product.active)
        .bind(product.created_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_product", e))?;
        Ok(product)
    }

    async fn get_product(&self, tenant_id: TenantId, id: ProductId) -> CatalogResult<Option<Product>> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM catalog_products WHERE tenant_id = $1 AND id = $2");
        let row = sqlx::query(&sql)
            .bind(tenant_id.as_uuid())
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_product", e))?;
        row.map(|r| decode::<ProductRow>(&r).map(|p| p.0)).transpose()
    }

    #[instrument(skip(self, product), fields(tenant_id = %tenant_id, product_id = %product.id), err)]
    async fn update_product(&self, tenant_id: TenantId, product: Product) -> CatalogResult<Product> {
        let sql = format!(
            "UPDATE catalog_products SET name = $3, active = $4 \
             WHERE tenant_id = $1 AND id = $2 RETURNING {PRODUCT_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(tenant_id.as_uuid())
            .bind(product.id.as_uuid())
            .bind(&product.name)
            .bind(product.active)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("update_product", e))?
            .ok_or_else(|| product_not_found(product.id))?;
        decode::<ProductRow>(&row).map(|p| p.0)
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, product_id = %id), err)]
    async fn delete_product(&self, tenant_id: TenantId, id: ProductId) -> CatalogResult<()> {
        let mut tx = self.begin().await?;
        lock_product(&mut tx, tenant_id, id, "UPDATE").await?;

        let variants = count(
            &mut tx,
            "delete_product",
            "SELECT COUNT(*) FROM catalog_variants WHERE tenant_id = $1 AND product_id = $2",
            tenant_id,
            id.as_uuid(),
        )
        .await?;
        if variants > 0 {
            return Err(CatalogError::conflict(
                ErrorCode::HasVariants,
                format!("product {id} still has {variants} variant(s)"),
            ));
        }
        let options = count(
            &mut tx,
            "delete_product",
            "SELECT COUNT(*) FROM catalog_options WHERE tenant_id = $1 AND product_id = $2",
            tenant_id,
            id.as_uuid(),
        )
        .await?;
        if options > 0 {
            return Err(CatalogError::conflict(
                ErrorCode::HasOptions,
                format!("product {id} still has {options} option(s)"),
            ));
        }

        sqlx::query("DELETE FROM catalog_products WHERE tenant_id = $1 AND id = $2")
            .bind(tenant_id.as_uuid())
            .bind(id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("delete_product", e))?;
        tx.commit().await.map_err(|e| map_sqlx_error("commit", e))
    }

    #[instrument(skip(self, option), fields(tenant_id = %tenant_id, product_id = %option.product_id), err)]
    async fn insert_option(
        &self,
        tenant_id: TenantId,
        option: ProductOption,
    ) -> CatalogResult<ProductOption> {
        let mut tx = self.begin().await?;
        lock_product(&mut tx, tenant_id, option.product_id, "UPDATE").await?;
        let variants = fetch_variants(&mut tx, tenant_id, option.product_id).await?;
        rules::ensure_option_can_be_added(option.product_id, &variants)?;

        sqlx::query(
            r#"
            INSERT INTO catalog_options (tenant_id, id, product_id, key, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(option.id.as_uuid())
        .bind(option.product_id.as_uuid())
        .bind(&option.key)
        .bind(option.created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("insert_option", e))?;

        tx.commit().await.map_err(|e| map_sqlx_error("commit", e))?;
        Ok(option)
    }

    async fn get_option(&self, tenant_id: TenantId, id: OptionId) -> CatalogResult<Option<ProductOption>> {
        let sql = format!("SELECT {OPTION_COLUMNS} FROM catalog_options WHERE tenant_id = $1 AND id = $2");
        let row = sqlx::query(&sql)
            .bind(tenant_id.as_uuid())
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_option", e))?;
        row.map(|r| decode::<OptionRow>(&r).map(|o| o.0)).transpose()
    }

    async fn list_options(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
    ) -> CatalogResult<Vec<ProductOption>> {
        let sql = format!(
            "SELECT {OPTION_COLUMNS} FROM catalog_options \
             WHERE tenant_id = $1 AND product_id = $2 ORDER BY position ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(tenant_id.as_uuid())
            .bind(product_id.as_uuid())
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_options", e))?;
        rows.iter().map(|r| decode::<OptionRow>(r).map(|o| o.0)).collect()
    }

    #[instrument(skip(self, option), fields(tenant_id = %tenant_id, option_id = %option.id), err)]
    async fn update_option(
        &self,
        tenant_id: TenantId,
        option: ProductOption,
    ) -> CatalogResult<ProductOption> {
        let sql = format!(
            "UPDATE catalog_options SET key = $3 \
             WHERE tenant_id = $1 AND id = $2 RETURNING {OPTION_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(tenant_id.as_uuid())
            .bind(option.id.as_uuid())
            .bind(&option.key)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("update_option", e))?
            .ok_or_else(|| option_not_found(option.id))?;
        decode::<OptionRow>(&row).map(|o| o.0)
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, option_id = %id), err)]
    async fn delete_option(&self, tenant_id: TenantId, id: OptionId) -> CatalogResult<()> {
        let mut tx = self.begin().await?;
        sqlx::query("SELECT id FROM catalog_options WHERE tenant_id = $1 AND id = $2 FOR UPDATE")
            .bind(tenant_id.as_uuid())
            .bind(id.as_uuid())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("delete_option", e))?
            .ok_or_else(|| option_not_found(id))?;

        let values = count(
            &mut tx,
            "delete_option",
            "SELECT COUNT(*) FROM catalog_option_values WHERE tenant_id = $1 AND option_id = $2",
            tenant_id,
            id.as_uuid(),
        )
        .await?;
        if values > 0 {
            return Err(CatalogError::conflict(
                ErrorCode::HasOptionValues,
                format!("option {id} still has {values} value(s)"),
            ));
        }

        sqlx::query("DELETE FROM catalog_options WHERE tenant_id = $1 AND id = $2")
            .bind(tenant_id.as_uuid())
            .bind(id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("delete_option", e))?;
        tx.commit().await.map_err(|e| map_sqlx_error("commit", e))
    }

    #[instrument(skip(self, value), fields(tenant_id = %tenant_id, option_id = %value.option_id), err)]
    async fn insert_value(&self, tenant_id: TenantId, value: OptionValue) -> CatalogResult<OptionValue> {
        let inserted = sqlx::query(
            r#"
            INSERT INTO catalog_option_values (tenant_id, id, option_id, value, created_at)
            SELECT $1, $2, o.id, $4, $5
            FROM catalog_options o
            WHERE o.tenant_id = $1 AND o.id = $3
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(value.id.as_uuid())
        .bind(value.option_id.as_uuid())
        .bind(&value.value)
        .bind(value.created_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_value", e))?;

        if inserted.rows_affected() == 0 {
            return Err(option_not_found(value.option_id));
        }
        Ok(value)
    }

    async fn get_value(
        &self,
        tenant_id: TenantId,
        id: OptionValueId,
    ) -> CatalogResult<Option<OptionValue>> {
        let sql = format!("SELECT {VALUE_COLUMNS} FROM catalog_option_values WHERE tenant_id = $1 AND id = $2");
        let row = sqlx::query(&sql)
            .bind(tenant_id.as_uuid())
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_value", e))?;
        row.map(|r| decode::<ValueRow>(&r).map(|v| v.0)).transpose()
    }

    async fn list_values(&self, tenant_id: TenantId, option_id: OptionId) -> CatalogResult<Vec<OptionValue>> {
        let sql = format!(
            "SELECT {VALUE_COLUMNS} FROM catalog_option_values \
             WHERE tenant_id = $1 AND option_id = $2 ORDER BY position ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(tenant_id.as_uuid())
            .bind(option_id.as_uuid())
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_values", e))?;
        rows.iter().map(|r| decode::<ValueRow>(r).map(|v| v.0)).collect()
    }

    async fn list_product_values(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
    ) -> CatalogResult<Vec<OptionValue>> {
        let rows = sqlx::query(
            r#"
            SELECT v.id, v.option_id, v.value, v.created_at
            FROM catalog_option_values v
            JOIN catalog_options o ON o.tenant_id = v.tenant_id AND o.id = v.option_id
            WHERE v.tenant_id = $1 AND o.product_id = $2
            ORDER BY o.position ASC, v.position ASC
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(product_id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_product_values", e))?;
        rows.iter().map(|r| decode::<ValueRow>(r).map(|v| v.0)).collect()
    }

    #[instrument(skip(self, value), fields(tenant_id = %tenant_id, option_value_id = %value.id), err)]
    async fn update_value(&self, tenant_id: TenantId, value: OptionValue) -> CatalogResult<OptionValue> {
        let sql = format!(
            "UPDATE catalog_option_values SET value = $3 \
             WHERE tenant_id = $1 AND id = $2 RETURNING {VALUE_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(tenant_id.as_uuid())
            .bind(value.id.as_uuid())
            .bind(&value.value)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("update_value", e))?
            .ok_or_else(|| value_not_found(value.id))?;
        decode::<ValueRow>(&row).map(|v| v.0)
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, option_value_id = %id), err)]
    async fn delete_value(&self, tenant_id: TenantId, id: OptionValueId) -> CatalogResult<()> {
        let mut tx = self.begin().await?;
        sqlx::query("SELECT id FROM catalog_option_values WHERE tenant_id = $1 AND id = $2 FOR UPDATE")
            .bind(tenant_id.as_uuid())
            .bind(id.as_uuid())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("delete_value", e))?
            .ok_or_else(|| value_not_found(id))?;

        let usage = count(&mut tx, "delete_value", COUNT_LIVE_USAGE, tenant_id, id.as_uuid()).await?;
        if usage > 0 {
            return Err(CatalogError::conflict(
                ErrorCode::OptionValueInUse,
                format!("option value {id} is used by {usage} variant(s)"),
            ));
        }

        // Only archived variants can still reference the value here.
        sqlx::query("DELETE FROM catalog_variant_options WHERE tenant_id = $1 AND option_value_id = $2")
            .bind(tenant_id.as_uuid())
            .bind(id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("delete_value", e))?;
        sqlx::query("DELETE FROM catalog_option_values WHERE tenant_id = $1 AND id = $2")
            .bind(tenant_id.as_uuid())
            .bind(id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("delete_value", e))?;
        tx.commit().await.map_err(|e| map_sqlx_error("commit", e))
    }

    async fn count_option_values(&self, tenant_id: TenantId, option_id: OptionId) -> CatalogResult<u64> {
        let mut conn = self.pool.acquire().await.map_err(|e| map_sqlx_error("acquire", e))?;
        count(
            &mut conn,
            "count_option_values",
            "SELECT COUNT(*) FROM catalog_option_values WHERE tenant_id = $1 AND option_id = $2",
            tenant_id,
            option_id.as_uuid(),
        )
        .await
    }

    async fn count_value_usage(&self, tenant_id: TenantId, value_id: OptionValueId) -> CatalogResult<u64> {
        let mut conn = self.pool.acquire().await.map_err(|e| map_sqlx_error("acquire", e))?;
        count(&mut conn, "count_value_usage", COUNT_LIVE_USAGE, tenant_id, value_id.as_uuid()).await
    }

    async fn count_options(&self, tenant_id: TenantId, product_id: ProductId) -> CatalogResult<u64> {
        let mut conn = self.pool.acquire().await.map_err(|e| map_sqlx_error("acquire", e))?;
        count(
            &mut conn,
            "count_options",
            "SELECT COUNT(*) FROM catalog_options WHERE tenant_id = $1 AND product_id = $2",
            tenant_id,
            product_id.as_uuid(),
        )
        .await
    }

    async fn count_variants(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
        include_archived: bool,
    ) -> CatalogResult<u64> {
        let sql = if include_archived {
            "SELECT COUNT(*) FROM catalog_variants WHERE tenant_id = $1 AND product_id = $2"
        } else {
            "SELECT COUNT(*) FROM catalog_variants \
             WHERE tenant_id = $1 AND product_id = $2 AND archived_at IS NULL"
        };
        let mut conn = self.pool.acquire().await.map_err(|e| map_sqlx_error("acquire", e))?;
        count(&mut conn, "count_variants", sql, tenant_id, product_id.as_uuid()).await
    }

    #[instrument(skip(self, variant), fields(tenant_id = %tenant_id, product_id = %variant.product_id, variant_id = %variant.id), err)]
    async fn insert_variant(&self, tenant_id: TenantId, variant: Variant) -> CatalogResult<Variant> {
        let price = price_column(variant.price)?;
        let mut tx = self.begin().await?;
        lock_product(&mut tx, tenant_id, variant.product_id, "SHARE").await?;

        let options = count(
            &mut tx,
            "insert_variant",
            "SELECT COUNT(*) FROM catalog_options WHERE tenant_id = $1 AND product_id = $2",
            tenant_id,
            variant.product_id.as_uuid(),
        )
        .await?;
        // Zero options: the empty set is complete on insert.
        let combination_key = (options == 0).then(String::new);

        sqlx::query(
            r#"
            INSERT INTO catalog_variants (
                tenant_id, id, product_id, name, price, stock, active,
                is_subscription, created_at, archived_at, combination_key
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, NULL, $10)
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(variant.id.as_uuid())
        .bind(variant.product_id.as_uuid())
        .bind(&variant.name)
        .bind(price)
        .bind(i64::from(variant.stock))
        .bind(variant.active)
        .bind(variant.is_subscription)
        .bind(variant.created_at)
        .bind(combination_key)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("insert_variant", e))?;

        tx.commit().await.map_err(|e| map_sqlx_error("commit", e))?;
        Ok(variant)
    }

    async fn get_variant(&self, tenant_id: TenantId, id: VariantId) -> CatalogResult<Option<Variant>> {
        let mut conn = self.pool.acquire().await.map_err(|e| map_sqlx_error("acquire", e))?;
        fetch_variant(&mut conn, tenant_id, id, false).await
    }

    async fn list_variants(&self, tenant_id: TenantId, product_id: ProductId) -> CatalogResult<Vec<Variant>> {
        let mut conn = self.pool.acquire().await.map_err(|e| map_sqlx_error("acquire", e))?;
        fetch_variants(&mut conn, tenant_id, product_id).await
    }

    #[instrument(skip(self, patch), fields(tenant_id = %tenant_id, variant_id = %id), err)]
    async fn update_variant(
        &self,
        tenant_id: TenantId,
        id: VariantId,
        patch: VariantPatch,
    ) -> CatalogResult<Variant> {
        let name = patch.name.as_deref().map(normalize::variant_name).transpose()?;
        let price = patch.price.map(price_column).transpose()?;
        // Unset fields read the row's current value inside the UPDATE itself.
        let sql = format!(
            "UPDATE catalog_variants \
             SET name = COALESCE($3, name), price = COALESCE($4, price), stock = COALESCE($5, stock), \
                 active = COALESCE($6, active), is_subscription = COALESCE($7, is_subscription) \
             WHERE tenant_id = $1 AND id = $2 AND archived_at IS NULL \
             RETURNING {VARIANT_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(tenant_id.as_uuid())
            .bind(id.as_uuid())
            .bind(name)
            .bind(price)
            .bind(patch.stock.map(i64::from))
            .bind(patch.active)
            .bind(patch.is_subscription)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("update_variant", e))?;

        match row {
            Some(row) => decode::<VariantRow>(&row).map(|v| v.0),
            None => match self.get_variant(tenant_id, id).await? {
                Some(_) => Err(CatalogError::conflict(
                    ErrorCode::VariantArchived,
                    format!("variant {id} is archived and cannot be updated"),
                )),
                None => Err(variant_not_found(id)),
            },
        }
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, variant_id = %id), err)]
    async fn archive_variant(
        &self,
        tenant_id: TenantId,
        id: VariantId,
        at: DateTime<Utc>,
    ) -> CatalogResult<Variant> {
        let sql = format!(
            "UPDATE catalog_variants SET archived_at = $3 \
             WHERE tenant_id = $1 AND id = $2 AND archived_at IS NULL \
             RETURNING {VARIANT_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(tenant_id.as_uuid())
            .bind(id.as_uuid())
            .bind(at)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("archive_variant", e))?;

        match row {
            Some(row) => decode::<VariantRow>(&row).map(|v| v.0),
            None => match self.get_variant(tenant_id, id).await? {
                Some(_) => Err(CatalogError::conflict(
                    ErrorCode::AlreadyArchived,
                    format!("variant {id} is already archived"),
                )),
                None => Err(variant_not_found(id)),
            },
        }
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, variant_id = %id), err)]
    async fn discard_variant(
        &self,
        tenant_id: TenantId,
        id: VariantId,
        at: DateTime<Utc>,
    ) -> CatalogResult<()> {
        let mut tx = self.begin().await?;
        sqlx::query(
            r#"
            UPDATE catalog_variants SET archived_at = COALESCE(archived_at, $3)
            WHERE tenant_id = $1 AND id = $2
            RETURNING id
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(id.as_uuid())
        .bind(at)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("discard_variant", e))?
        .ok_or_else(|| variant_not_found(id))?;

        sqlx::query("DELETE FROM catalog_variant_options WHERE tenant_id = $1 AND variant_id = $2")
            .bind(tenant_id.as_uuid())
            .bind(id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("discard_variant", e))?;
        tx.commit().await.map_err(|e| map_sqlx_error("commit", e))
    }

    #[instrument(
        skip(self, assignment),
        fields(
            tenant_id = %tenant_id,
            variant_id = %assignment.variant_id,
            option_id = %assignment.option_id,
            option_value_id = %assignment.option_value_id
        ),
        err
    )]
    async fn insert_assignment(
        &self,
        tenant_id: TenantId,
        assignment: VariantOptionAssignment,
    ) -> CatalogResult<VariantOptionAssignment> {
        let mut tx = self.begin().await?;

        let variant = fetch_variant(&mut tx, tenant_id, assignment.variant_id, true)
            .await?
            .ok_or_else(|| variant_not_found(assignment.variant_id))?;

        let sql = format!(
            "SELECT {VALUE_COLUMNS} FROM catalog_option_values \
             WHERE tenant_id = $1 AND id = $2 FOR SHARE"
        );
        let value_row = sqlx::query(&sql)
            .bind(tenant_id.as_uuid())
            .bind(assignment.option_value_id.as_uuid())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("insert_assignment", e))?
            .ok_or_else(|| value_not_found(assignment.option_value_id))?;
        let value = decode::<ValueRow>(&value_row)?.0;

        let sql = format!("SELECT {OPTION_COLUMNS} FROM catalog_options WHERE tenant_id = $1 AND id = $2");
        let option = sqlx::query(&sql)
            .bind(tenant_id.as_uuid())
            .bind(assignment.option_id.as_uuid())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("insert_assignment", e))?
            .map(|r| decode::<OptionRow>(&r).map(|o| o.0))
            .transpose()?;

        let existing = fetch_assignments(&mut tx, tenant_id, variant.id).await?;
        let option_count = count(
            &mut tx,
            "insert_assignment",
            "SELECT COUNT(*) FROM catalog_options WHERE tenant_id = $1 AND product_id = $2",
            tenant_id,
            variant.product_id.as_uuid(),
        )
        .await? as usize;

        rules::validate_assignment(AssignmentCandidate {
            variant: &variant,
            option: option.as_ref(),
            stated_option_id: assignment.option_id,
            value: &value,
            existing: &existing,
            option_count,
        })?;

        sqlx::query(
            r#"
            INSERT INTO catalog_variant_options (tenant_id, variant_id, option_id, option_value_id)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(assignment.variant_id.as_uuid())
        .bind(assignment.option_id.as_uuid())
        .bind(assignment.option_value_id.as_uuid())
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("insert_assignment", e))?;

        let mut next = existing;
        next.push(assignment);
        if let Some(key) = rules::completed_key(&next, option_count) {
            // The partial unique index rejects a live duplicate.
            sqlx::query(
                "UPDATE catalog_variants SET combination_key = $3 WHERE tenant_id = $1 AND id = $2",
            )
            .bind(tenant_id.as_uuid())
            .bind(variant.id.as_uuid())
            .bind(key.encode())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("insert_assignment", e))?;
        }

        tx.commit().await.map_err(|e| map_sqlx_error("commit", e))?;
        Ok(assignment)
    }

    async fn list_assignments(
        &self,
        tenant_id: TenantId,
        variant_id: VariantId,
    ) -> CatalogResult<Vec<VariantOptionAssignment>> {
        let mut conn = self.pool.acquire().await.map_err(|e| map_sqlx_error("acquire", e))?;
        fetch_assignments(&mut conn, tenant_id, variant_id).await
    }

    async fn list_product_assignments(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
    ) -> CatalogResult<Vec<VariantOptionAssignment>> {
        let rows = sqlx::query(
            r#"
            SELECT a.variant_id, a.option_id, a.option_value_id
            FROM catalog_variant_options a
            JOIN catalog_variants v ON v.tenant_id = a.tenant_id AND v.id = a.variant_id
            WHERE a.tenant_id = $1 AND v.product_id = $2
            ORDER BY v.position ASC, a.position ASC
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(product_id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_product_assignments", e))?;
        rows.iter()
            .map(|r| decode::<AssignmentRow>(r).map(|a| a.0))
            .collect()
    }
}

fn product_not_found(id: ProductId) -> CatalogError {
    CatalogError::not_found(ErrorCode::ProductNotFound, format!("product {id} not found"))
}

fn option_not_found(id: OptionId) -> CatalogError {
    CatalogError::not_found(ErrorCode::OptionNotFound, format!("option {id} not found"))
}

fn value_not_found(id: OptionValueId) -> CatalogError {
    CatalogError::not_found(
        ErrorCode::OptionValueNotFound,
        format!("option value {id} not found"),
    )
}

fn variant_not_found(id: VariantId) -> CatalogError {
    CatalogError::not_found(ErrorCode::VariantNotFound, format!("variant {id} not found"))
}

fn price_column(price: u64) -> CatalogResult<i64> {
    i64::try_from(price).map_err(|_| CatalogError::invalid_input(format!("price {price} is out of range")))
}

/// Map a SQLx error to a catalog error, using the violated constraint's name
/// to recover the domain code.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> CatalogError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            let constraint = db_err.constraint().unwrap_or_default();

            match db_err.code().as_deref() {
                Some("23505") => match constraint {
                    "catalog_options_key_unique" => {
                        CatalogError::conflict(ErrorCode::OptionKeyConflict, "option key already exists for this product")
                    }
                    "catalog_option_values_value_unique" => {
                        CatalogError::conflict(ErrorCode::OptionValueConflict, "value already exists for this option")
                    }
                    "catalog_variants_name_unique" => CatalogError::conflict(
                        ErrorCode::VariantNameConflict,
                        "a variant with this name already exists for this product",
                    ),
                    "catalog_variants_combination_unique" => CatalogError::invalid_combination(
                        ErrorCode::DuplicateCombination,
                        "another variant already uses this combination",
                    ),
                    "catalog_variant_options_pkey" => CatalogError::invalid_combination(
                        ErrorCode::InvalidOptionCombination,
                        "variant already has a value for this option",
                    ),
                    _ => CatalogError::store(msg),
                },
                Some("23503") => match constraint {
                    "catalog_options_product_fk" if operation == "delete_product" => {
                        CatalogError::conflict(ErrorCode::HasOptions, "product still has options")
                    }
                    "catalog_variants_product_fk" if operation == "delete_product" => {
                        CatalogError::conflict(ErrorCode::HasVariants, "product still has variants")
                    }
                    "catalog_options_product_fk" | "catalog_variants_product_fk" => {
                        CatalogError::not_found(ErrorCode::ProductNotFound, "product not found")
                    }
                    "catalog_option_values_option_fk" if operation == "delete_option" => {
                        CatalogError::conflict(ErrorCode::HasOptionValues, "option still has values")
                    }
                    "catalog_variant_options_value_fk" if operation == "delete_value" => {
                        CatalogError::conflict(ErrorCode::OptionValueInUse, "option value is in use")
                    }
                    "catalog_variant_options_value_fk" => CatalogError::invalid_combination(
                        ErrorCode::InvalidOptionCombination,
                        "value does not belong to the stated option",
                    ),
                    _ => CatalogError::store(msg),
                },
                _ => CatalogError::store(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            CatalogError::store(format!("connection pool closed in {}", operation))
        }
        _ => CatalogError::store(format!("sqlx error in {}: {}", operation, err)),
    }
}

fn decode<'r, T: FromRow<'r, PgRow>>(row: &'r PgRow) -> CatalogResult<T> {
    T::from_row(row).map_err(|e| CatalogError::store(format!("failed to decode row: {e}")))
}

// SQLx row types

struct ProductRow(Product);

impl<'r> FromRow<'r, PgRow> for ProductRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(ProductRow(Product {
            id: ProductId::from_uuid(row.try_get("id")?),
            name: row.try_get("name")?,
            active: row.try_get("active")?,
            created_at: row.try_get("created_at")?,
        }))
    }
}

struct OptionRow(ProductOption);

impl<'r> FromRow<'r, PgRow> for OptionRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(OptionRow(ProductOption {
            id: OptionId::from_uuid(row.try_get("id")?),
            product_id: ProductId::from_uuid(row.try_get("product_id")?),
            key: row.try_get("key")?,
            created_at: row.try_get("created_at")?,
        }))
    }
}

struct ValueRow(OptionValue);

impl<'r> FromRow<'r, PgRow> for ValueRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(ValueRow(OptionValue {
            id: OptionValueId::from_uuid(row.try_get("id")?),
            option_id: OptionId::from_uuid(row.try_get("option_id")?),
            value: row.try_get("value")?,
            created_at: row.try_get("created_at")?,
        }))
    }
}

struct VariantRow(Variant);

impl<'r> FromRow<'r, PgRow> for VariantRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let price: i64 = row.try_get("price")?;
        let stock: i64 = row.try_get("stock")?;
        Ok(VariantRow(Variant {
            id: VariantId::from_uuid(row.try_get("id")?),
            product_id: ProductId::from_uuid(row.try_get("product_id")?),
            name: row.try_get("name")?,
            price: u64::try_from(price).map_err(|e| sqlx::Error::Decode(Box::new(e)))?,
            stock: u32::try_from(stock).map_err(|e| sqlx::Error::Decode(Box::new(e)))?,
            active: row.try_get("active")?,
            is_subscription: row.try_get("is_subscription")?,
            created_at: row.try_get("created_at")?,
            archived_at: row.try_get("archived_at")?,
        }))
    }
}

struct AssignmentRow(VariantOptionAssignment);

impl<'r> FromRow<'r, PgRow> for AssignmentRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let variant_id = VariantId::from_uuid(row.try_get("variant_id")?);
        let entry = SelectionEntry::new(
            OptionId::from_uuid(row.try_get("option_id")?),
            OptionValueId::from_uuid(row.try_get("option_value_id")?),
        );
        Ok(AssignmentRow(VariantOptionAssignment::new(variant_id, entry)))
    }
}
