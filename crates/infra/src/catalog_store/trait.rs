use std::sync::Arc;

use chrono::{DateTime, Utc};

use storefront_catalog::{
    OptionValue, Product, ProductOption, Variant, VariantOptionAssignment, VariantPatch,
};
use storefront_core::{
    CatalogResult, OptionId, OptionValueId, ProductId, TenantId, VariantId,
};

/// Transactional, tenant-scoped catalog store.
///
/// The store is the **authority** for every catalog invariant. The engine runs
/// friendlier pre-checks, but two concurrent requests can both pass those; the
/// store must then reject the loser with a typed error rather than let an
/// invariant break.
///
/// ## Implementation Requirements
///
/// Implementations must:
/// - scope every read and write to `tenant_id` (rows of another tenant are
///   invisible: reads return `None`/empty, writes return `NotFound`)
/// - return listings in creation order
/// - enforce, atomically with the write that could break them:
///   - option key uniqueness per product and value uniqueness per option
///   - variant name uniqueness among non-archived variants of a product
///   - assignment validity, exclusivity and combination uniqueness
///     (see `storefront_catalog::rules`)
///   - referential closure on every delete
///   - archival as a one-way compare-and-set
#[async_trait::async_trait]
pub trait CatalogStore: Send + Sync {
    // Products

    async fn insert_product(&self, tenant_id: TenantId, product: Product) -> CatalogResult<Product>;

    async fn get_product(&self, tenant_id: TenantId, id: ProductId) -> CatalogResult<Option<Product>>;

    async fn update_product(&self, tenant_id: TenantId, product: Product) -> CatalogResult<Product>;

    /// Fails `HAS_VARIANTS` while any variant (archived included) exists, then
    /// `HAS_OPTIONS` while any option exists.
    async fn delete_product(&self, tenant_id: TenantId, id: ProductId) -> CatalogResult<()>;

    // Options

    /// Fails `OPTION_KEY_CONFLICT` on a duplicate key and `HAS_VARIANTS` while
    /// the product has non-archived variants.
    async fn insert_option(
        &self,
        tenant_id: TenantId,
        option: ProductOption,
    ) -> CatalogResult<ProductOption>;

    async fn get_option(&self, tenant_id: TenantId, id: OptionId) -> CatalogResult<Option<ProductOption>>;

    async fn list_options(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
    ) -> CatalogResult<Vec<ProductOption>>;

    async fn update_option(
        &self,
        tenant_id: TenantId,
        option: ProductOption,
    ) -> CatalogResult<ProductOption>;

    /// Fails `HAS_OPTION_VALUES` while the option owns values.
    async fn delete_option(&self, tenant_id: TenantId, id: OptionId) -> CatalogResult<()>;

    // Option values

    async fn insert_value(&self, tenant_id: TenantId, value: OptionValue) -> CatalogResult<OptionValue>;

    async fn get_value(
        &self,
        tenant_id: TenantId,
        id: OptionValueId,
    ) -> CatalogResult<Option<OptionValue>>;

    async fn list_values(&self, tenant_id: TenantId, option_id: OptionId) -> CatalogResult<Vec<OptionValue>>;

    /// Values of every option of the product, grouped by option creation order.
    async fn list_product_values(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
    ) -> CatalogResult<Vec<OptionValue>>;

    async fn update_value(&self, tenant_id: TenantId, value: OptionValue) -> CatalogResult<OptionValue>;

    /// Fails `OPTION_VALUE_IN_USE` while a non-archived variant references the
    /// value. Assignment rows of archived variants are removed with it.
    async fn delete_value(&self, tenant_id: TenantId, id: OptionValueId) -> CatalogResult<()>;

    // Counts (referential guard)

    async fn count_option_values(&self, tenant_id: TenantId, option_id: OptionId) -> CatalogResult<u64>;

    /// Assignments of non-archived variants referencing the value.
    async fn count_value_usage(&self, tenant_id: TenantId, value_id: OptionValueId) -> CatalogResult<u64>;

    async fn count_options(&self, tenant_id: TenantId, product_id: ProductId) -> CatalogResult<u64>;

    async fn count_variants(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
        include_archived: bool,
    ) -> CatalogResult<u64>;

    // Variants

    /// Fails `VARIANT_NAME_CONFLICT` on a live duplicate name. For a product
    /// with zero options the new variant is already complete, so this also
    /// enforces combination uniqueness of the empty selection.
    async fn insert_variant(&self, tenant_id: TenantId, variant: Variant) -> CatalogResult<Variant>;

    async fn get_variant(&self, tenant_id: TenantId, id: VariantId) -> CatalogResult<Option<Variant>>;

    /// All variants of the product, archived included, in creation order.
    async fn list_variants(&self, tenant_id: TenantId, product_id: ProductId) -> CatalogResult<Vec<Variant>>;

    /// Apply the `Some` fields of `patch` to the current row in one atomic
    /// step; unset fields keep whatever the row holds at write time. Never
    /// touches `archived_at` or assignments. `VARIANT_ARCHIVED` when archived.
    async fn update_variant(
        &self,
        tenant_id: TenantId,
        id: VariantId,
        patch: VariantPatch,
    ) -> CatalogResult<Variant>;

    /// Set `archived_at` if unset; `ALREADY_ARCHIVED` otherwise.
    async fn archive_variant(
        &self,
        tenant_id: TenantId,
        id: VariantId,
        at: DateTime<Utc>,
    ) -> CatalogResult<Variant>;

    /// Compensation for a failed creation: archive (if not already) and drop
    /// every assignment row of the variant in one atomic step.
    async fn discard_variant(
        &self,
        tenant_id: TenantId,
        id: VariantId,
        at: DateTime<Utc>,
    ) -> CatalogResult<()>;

    // Assignments

    /// Validate and insert one assignment; when it completes the variant's
    /// set, also claim the combination (`DUPLICATE_COMBINATION` if taken).
    async fn insert_assignment(
        &self,
        tenant_id: TenantId,
        assignment: VariantOptionAssignment,
    ) -> CatalogResult<VariantOptionAssignment>;

    async fn list_assignments(
        &self,
        tenant_id: TenantId,
        variant_id: VariantId,
    ) -> CatalogResult<Vec<VariantOptionAssignment>>;

    /// Assignments of every variant (archived included) of the product.
    async fn list_product_assignments(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
    ) -> CatalogResult<Vec<VariantOptionAssignment>>;
}

#[async_trait::async_trait]
impl<S> CatalogStore for Arc<S>
where
    S: CatalogStore + ?Sized,
{
    async fn insert_product(&self, tenant_id: TenantId, product: Product) -> CatalogResult<Product> {
        (**self).insert_product(tenant_id, product).await
    }

    async fn get_product(&self, tenant_id: TenantId, id: ProductId) -> CatalogResult<Option<Product>> {
        (**self).get_product(tenant_id, id).await
    }

    async fn update_product(&self, tenant_id: TenantId, product: Product) -> CatalogResult<Product> {
        (**self).update_product(tenant_id, product).await
    }

    async fn delete_product(&self, tenant_id: TenantId, id: ProductId) -> CatalogResult<()> {
        (**self).delete_product(tenant_id, id).await
    }

    async fn insert_option(
        &self,
        tenant_id: TenantId,
        option: ProductOption,
    ) -> CatalogResult<ProductOption> {
        (**self).insert_option(tenant_id, option).await
    }

    async fn get_option(&self, tenant_id: TenantId, id: OptionId) -> CatalogResult<Option<ProductOption>> {
        (**self).get_option(tenant_id, id).await
    }

    async fn list_options(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
    ) -> CatalogResult<Vec<ProductOption>> {
        (**self).list_options(tenant_id, product_id).await
    }

    async fn update_option(
        &self,
        tenant_id: TenantId,
        option: ProductOption,
    ) -> CatalogResult<ProductOption> {
        (**self).update_option(tenant_id, option).await
    }

    async fn delete_option(&self, tenant_id: TenantId, id: OptionId) -> CatalogResult<()> {
        (**self).delete_option(tenant_id, id).await
    }

    async fn insert_value(&self, tenant_id: TenantId, value: OptionValue) -> CatalogResult<OptionValue> {
        (**self).insert_value(tenant_id, value).await
    }

    async fn get_value(
        &self,
        tenant_id: TenantId,
        id: OptionValueId,
    ) -> CatalogResult<Option<OptionValue>> {
        (**self).get_value(tenant_id, id).await
    }

    async fn list_values(&self, tenant_id: TenantId, option_id: OptionId) -> CatalogResult<Vec<OptionValue>> {
        (**self).list_values(tenant_id, option_id).await
    }

    async fn list_product_values(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
    ) -> CatalogResult<Vec<OptionValue>> {
        (**self).list_product_values(tenant_id, product_id).await
    }

    async fn update_value(&self, tenant_id: TenantId, value: OptionValue) -> CatalogResult<OptionValue> {
        (**self).update_value(tenant_id, value).await
    }

    async fn delete_value(&self, tenant_id: TenantId, id: OptionValueId) -> CatalogResult<()> {
        (**self).delete_value(tenant_id, id).await
    }

    async fn count_option_values(&self, tenant_id: TenantId, option_id: OptionId) -> CatalogResult<u64> {
        (**self).count_option_values(tenant_id, option_id).await
    }

    async fn count_value_usage(&self, tenant_id: TenantId, value_id: OptionValueId) -> CatalogResult<u64> {
        (**self).count_value_usage(tenant_id, value_id).await
    }

    async fn count_options(&self, tenant_id: TenantId, product_id: ProductId) -> CatalogResult<u64> {
        (**self).count_options(tenant_id, product_id).await
    }

    async fn count_variants(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
        include_archived: bool,
    ) -> CatalogResult<u64> {
        (**self)
            .count_variants(tenant_id, product_id, include_archived)
            .await
    }

    async fn insert_variant(&self, tenant_id: TenantId, variant: Variant) -> CatalogResult<Variant> {
        (**self).insert_variant(tenant_id, variant).await
    }

    async fn get_variant(&self, tenant_id: TenantId, id: VariantId) -> CatalogResult<Option<Variant>> {
        (**self).get_variant(tenant_id, id).await
    }

    async fn list_variants(&self, tenant_id: TenantId, product_id: ProductId) -> CatalogResult<Vec<Variant>> {
        (**self).list_variants(tenant_id, product_id).await
    }

    async fn update_variant(
        &self,
        tenant_id: TenantId,
        id: VariantId,
        patch: VariantPatch,
    ) -> CatalogResult<Variant> {
        (**self).update_variant(tenant_id, id, patch).await
    }

    async fn archive_variant(
        &self,
        tenant_id: TenantId,
        id: VariantId,
        at: DateTime<Utc>,
    ) -> CatalogResult<Variant> {
        (**self).archive_variant(tenant_id, id, at).await
    }

    async fn discard_variant(
        &self,
        tenant_id: TenantId,
        id: VariantId,
        at: DateTime<Utc>,
    ) -> CatalogResult<()> {
        (**self).discard_variant(tenant_id, id, at).await
    }

    async fn insert_assignment(
        &self,
        tenant_id: TenantId,
        assignment: VariantOptionAssignment,
    ) -> CatalogResult<VariantOptionAssignment> {
        (**self).insert_assignment(tenant_id, assignment).await
    }

    async fn list_assignments(
        &self,
        tenant_id: TenantId,
        variant_id: VariantId,
    ) -> CatalogResult<Vec<VariantOptionAssignment>> {
        (**self).list_assignments(tenant_id, variant_id).await
    }

    async fn list_product_assignments(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
    ) -> CatalogResult<Vec<VariantOptionAssignment>> {
        (**self).list_product_assignments(tenant_id, product_id).await
    }
}
