//! Referential checks run before deletes.
//!
//! The `*_has_*` / `value_in_use` queries answer yes or no; the `ensure_*`
//! forms turn a yes into the `Conflict` the delete would fail with. Both are
//! advisory: the store repeats the check atomically with the delete.

use storefront_core::{CatalogError, CatalogResult, ErrorCode, OptionId, OptionValueId, ProductId};

use super::CatalogEngine;
use crate::catalog_store::CatalogStore;
use crate::context::CallContext;

impl<S: CatalogStore> CatalogEngine<S> {
    /// Any option or any variant (archived included).
    pub async fn product_has_children(&self, ctx: &CallContext, product_id: ProductId) -> CatalogResult<bool> {
        Ok(self.product_has_variants(ctx, product_id).await?
            || self.product_has_options(ctx, product_id).await?)
    }

    /// Any variant, archived included: archived variants are kept for history
    /// and still pin their product.
    pub async fn product_has_variants(&self, ctx: &CallContext, product_id: ProductId) -> CatalogResult<bool> {
        let n = ctx
            .run("count_variants", self.store.count_variants(ctx.tenant_id(), product_id, true))
            .await?;
        Ok(n > 0)
    }

    pub async fn product_has_options(&self, ctx: &CallContext, product_id: ProductId) -> CatalogResult<bool> {
        let n = ctx
            .run("count_options", self.store.count_options(ctx.tenant_id(), product_id))
            .await?;
        Ok(n > 0)
    }

    pub async fn option_has_values(&self, ctx: &CallContext, option_id: OptionId) -> CatalogResult<bool> {
        let n = ctx
            .run("count_option_values", self.store.count_option_values(ctx.tenant_id(), option_id))
            .await?;
        Ok(n > 0)
    }

    /// Referenced by at least one non-archived variant.
    pub async fn value_in_use(&self, ctx: &CallContext, value_id: OptionValueId) -> CatalogResult<bool> {
        let n = ctx
            .run("count_value_usage", self.store.count_value_usage(ctx.tenant_id(), value_id))
            .await?;
        Ok(n > 0)
    }

    pub(crate) async fn ensure_product_deletable(&self, ctx: &CallContext, product_id: ProductId) -> CatalogResult<()> {
        if self.product_has_variants(ctx, product_id).await? {
            return Err(CatalogError::conflict(
                ErrorCode::HasVariants,
                format!("product {product_id} still has variants"),
            ));
        }
        if self.product_has_options(ctx, product_id).await? {
            return Err(CatalogError::conflict(
                ErrorCode::HasOptions,
                format!("product {product_id} still has options"),
            ));
        }
        Ok(())
    }

    pub(crate) async fn ensure_option_deletable(&self, ctx: &CallContext, option_id: OptionId) -> CatalogResult<()> {
        if self.option_has_values(ctx, option_id).await? {
            return Err(CatalogError::conflict(
                ErrorCode::HasOptionValues,
                format!("option {option_id} still has values"),
            ));
        }
        Ok(())
    }

    pub(crate) async fn ensure_value_deletable(&self, ctx: &CallContext, value_id: OptionValueId) -> CatalogResult<()> {
        if self.value_in_use(ctx, value_id).await? {
            return Err(CatalogError::conflict(
                ErrorCode::OptionValueInUse,
                format!("option value {value_id} is used by a live variant"),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use storefront_catalog::{NewProduct, NewVariant, Selection};
    use storefront_core::TenantId;

    use crate::catalog_store::InMemoryCatalogStore;
    use crate::config::EngineConfig;

    use super::*;

    #[tokio::test]
    async fn product_delete_reports_variants_before_options() {
        let engine = CatalogEngine::new(InMemoryCatalogStore::new(), EngineConfig::default());
        let ctx = engine.context(TenantId::new());
        let product = engine.create_product(&ctx, NewProduct::new("Coffee")).await.unwrap().id;
        assert!(!engine.product_has_children(&ctx, product).await.unwrap());

        let size = engine.create_option(&ctx, product, "size").await.unwrap().option.id;
        let oz = engine.create_value(&ctx, size, "12oz").await.unwrap().id;
        let variant = engine
            .create_variant(
                &ctx,
                product,
                NewVariant::new("12oz", 100, 1).with_selection(Selection::new().with(size, oz)),
            )
            .await
            .unwrap();
        engine.archive_variant(&ctx, variant.variant.id).await.unwrap();

        assert!(engine.product_has_children(&ctx, product).await.unwrap());
        assert!(engine.product_has_variants(&ctx, product).await.unwrap());
        assert!(!engine.value_in_use(&ctx, oz).await.unwrap());
        assert!(engine.option_has_values(&ctx, size).await.unwrap());

        let err = engine.delete_product(&ctx, product).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::HasVariants);
    }

    #[tokio::test]
    async fn product_with_only_options_reports_has_options() {
        let engine = CatalogEngine::new(InMemoryCatalogStore::new(), EngineConfig::default());
        let ctx = engine.context(TenantId::new());
        let product = engine.create_product(&ctx, NewProduct::new("Coffee")).await.unwrap().id;
        engine.create_option(&ctx, product, "size").await.unwrap();

        let err = engine.delete_product(&ctx, product).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::HasOptions);
    }
}
