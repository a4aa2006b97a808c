use tracing::{debug, instrument};

use storefront_catalog::ProductSummary;
use storefront_core::{CatalogResult, ProductId};

use super::CatalogEngine;
use crate::catalog_store::CatalogStore;
use crate::context::CallContext;

impl<S: CatalogStore> CatalogEngine<S> {
    /// Summary using the configured low-stock threshold.
    pub async fn summarize(&self, ctx: &CallContext, product_id: ProductId) -> CatalogResult<ProductSummary> {
        self.summarize_with_threshold(ctx, product_id, self.config.low_stock_threshold)
            .await
    }

    /// Stock and price rollup over purchasable variants, recomputed from the
    /// store on every call.
    #[instrument(skip(self, ctx), fields(tenant_id = %ctx.tenant_id(), product_id = %product_id), err)]
    pub async fn summarize_with_threshold(
        &self,
        ctx: &CallContext,
        product_id: ProductId,
        low_stock_threshold: u32,
    ) -> CatalogResult<ProductSummary> {
        let snapshot = self.snapshot(ctx, product_id).await?;
        let summary = ProductSummary::compute(
            product_id,
            &snapshot.variants,
            low_stock_threshold,
            snapshot.available_options(),
        );
        debug!(
            total_stock = summary.total_stock,
            variants_in_stock = summary.variants_in_stock,
            stock_status = summary.stock_status.as_str(),
            "product summarized"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use storefront_catalog::{NewProduct, NewVariant, StockStatus};
    use storefront_core::TenantId;

    use crate::catalog_store::InMemoryCatalogStore;
    use crate::config::EngineConfig;

    use super::*;

    #[tokio::test]
    async fn threshold_comes_from_config_unless_overridden() {
        let config = EngineConfig {
            low_stock_threshold: 0,
            ..EngineConfig::default()
        };
        let engine = CatalogEngine::new(InMemoryCatalogStore::new(), config);
        let ctx = engine.context(TenantId::new());
        let product = engine.create_product(&ctx, NewProduct::new("Tea")).await.unwrap().id;
        engine
            .create_variant(&ctx, product, NewVariant::new("Default", 1200, 4))
            .await
            .unwrap();

        let summary = engine.summarize(&ctx, product).await.unwrap();
        assert_eq!(summary.stock_status, StockStatus::InStock);
        assert_eq!(summary.min_price, Some(1200));
        assert!(summary.available_options.is_empty());

        let summary = engine.summarize_with_threshold(&ctx, product, 10).await.unwrap();
        assert_eq!(summary.stock_status, StockStatus::Low);
    }

    #[tokio::test]
    async fn empty_product_is_out_of_stock() {
        let engine = CatalogEngine::new(InMemoryCatalogStore::new(), EngineConfig::default());
        let ctx = engine.context(TenantId::new());
        let product = engine.create_product(&ctx, NewProduct::new("Tea")).await.unwrap().id;

        let summary = engine.summarize(&ctx, product).await.unwrap();
        assert_eq!(summary.total_variants, 0);
        assert_eq!(summary.min_price, None);
        assert_eq!(summary.stock_status, StockStatus::OutOfStock);
    }
}
