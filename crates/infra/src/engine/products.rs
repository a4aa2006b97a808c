use chrono::Utc;
use tracing::{info, instrument};

use storefront_catalog::{NewProduct, OptionValue, OptionWithValues, Product, ProductOption, ProductPatch};
use storefront_core::{CatalogResult, OptionId, ProductId};

use super::CatalogEngine;
use crate::catalog_store::CatalogStore;
use crate::context::CallContext;

impl<S: CatalogStore> CatalogEngine<S> {
    #[instrument(skip(self, ctx, input), fields(tenant_id = %ctx.tenant_id()), err)]
    pub async fn create_product(&self, ctx: &CallContext, input: NewProduct) -> CatalogResult<Product> {
        let product = Product::create(ProductId::new(), &input, Utc::now())?;
        let product = ctx
            .run("insert_product", self.store.insert_product(ctx.tenant_id(), product))
            .await?;
        info!(product_id = %product.id, name = %product.name, "product created");
        Ok(product)
    }

    pub async fn get_product(&self, ctx: &CallContext, id: ProductId) -> CatalogResult<Product> {
        self.require_product(ctx, id).await
    }

    #[instrument(skip(self, ctx, patch), fields(tenant_id = %ctx.tenant_id(), product_id = %id), err)]
    pub async fn update_product(
        &self,
        ctx: &CallContext,
        id: ProductId,
        patch: ProductPatch,
    ) -> CatalogResult<Product> {
        let mut product = self.require_product(ctx, id).await?;
        product.apply(&patch)?;
        let product = ctx
            .run("update_product", self.store.update_product(ctx.tenant_id(), product))
            .await?;
        info!(product_id = %id, "product updated");
        Ok(product)
    }

    /// Fails `HAS_VARIANTS` while any variant exists (archived included),
    /// then `HAS_OPTIONS` while any option exists.
    #[instrument(skip(self, ctx), fields(tenant_id = %ctx.tenant_id(), product_id = %id), err)]
    pub async fn delete_product(&self, ctx: &CallContext, id: ProductId) -> CatalogResult<()> {
        self.require_product(ctx, id).await?;
        self.ensure_product_deletable(ctx, id).await?;
        ctx.run("delete_product", self.store.delete_product(ctx.tenant_id(), id))
            .await?;
        info!(product_id = %id, "product deleted");
        Ok(())
    }

    /// Options of a product, in creation order.
    pub async fn list_options(&self, ctx: &CallContext, product_id: ProductId) -> CatalogResult<Vec<ProductOption>> {
        self.require_product(ctx, product_id).await?;
        ctx.run("list_options", self.store.list_options(ctx.tenant_id(), product_id))
            .await
    }

    /// Values of an option, in creation order, whether or not any variant uses them.
    pub async fn list_values(&self, ctx: &CallContext, option_id: OptionId) -> CatalogResult<Vec<OptionValue>> {
        self.require_option(ctx, option_id).await?;
        ctx.run("list_values", self.store.list_values(ctx.tenant_id(), option_id))
            .await
    }

    pub async fn get_option(&self, ctx: &CallContext, option_id: OptionId) -> CatalogResult<OptionWithValues> {
        let option = self.require_option(ctx, option_id).await?;
        let values = ctx
            .run("list_values", self.store.list_values(ctx.tenant_id(), option_id))
            .await?;
        Ok(OptionWithValues { option, values })
    }
}
