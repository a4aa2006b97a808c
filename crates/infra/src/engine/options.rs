use chrono::Utc;
use tracing::{info, instrument};

use storefront_catalog::rules;
use storefront_catalog::{OptionValue, OptionWithValues, ProductOption};
use storefront_core::{CatalogResult, OptionId, OptionValueId, ProductId};

use super::CatalogEngine;
use crate::catalog_store::CatalogStore;
use crate::context::CallContext;

impl<S: CatalogStore> CatalogEngine<S> {
    /// Add an option (key trimmed and lower-cased) to a product.
    ///
    /// Rejected with `HAS_VARIANTS` while the product has live variants, since
    /// each of them would be left without a value for the new option.
    #[instrument(skip(self, ctx), fields(tenant_id = %ctx.tenant_id(), product_id = %product_id), err)]
    pub async fn create_option(
        &self,
        ctx: &CallContext,
        product_id: ProductId,
        key: &str,
    ) -> CatalogResult<OptionWithValues> {
        let option = ProductOption::create(OptionId::new(), product_id, key, Utc::now())?;
        self.require_product(ctx, product_id).await?;

        let siblings = ctx
            .run("list_options", self.store.list_options(ctx.tenant_id(), product_id))
            .await?;
        rules::ensure_unique_option_key(&option.key, &siblings, None)?;
        let variants = ctx
            .run("list_variants", self.store.list_variants(ctx.tenant_id(), product_id))
            .await?;
        rules::ensure_option_can_be_added(product_id, &variants)?;

        let option = ctx
            .run("insert_option", self.store.insert_option(ctx.tenant_id(), option))
            .await?;
        info!(option_id = %option.id, key = %option.key, "option created");
        Ok(OptionWithValues {
            option,
            values: Vec::new(),
        })
    }

    #[instrument(skip(self, ctx), fields(tenant_id = %ctx.tenant_id(), option_id = %id), err)]
    pub async fn update_option(
        &self,
        ctx: &CallContext,
        id: OptionId,
        new_key: &str,
    ) -> CatalogResult<OptionWithValues> {
        let mut option = self.require_option(ctx, id).await?;
        option.rename(new_key)?;

        let siblings = ctx
            .run("list_options", self.store.list_options(ctx.tenant_id(), option.product_id))
            .await?;
        rules::ensure_unique_option_key(&option.key, &siblings, Some(id))?;

        let option = ctx
            .run("update_option", self.store.update_option(ctx.tenant_id(), option))
            .await?;
        let values = ctx
            .run("list_values", self.store.list_values(ctx.tenant_id(), id))
            .await?;
        info!(option_id = %id, key = %option.key, "option renamed");
        Ok(OptionWithValues { option, values })
    }

    #[instrument(skip(self, ctx), fields(tenant_id = %ctx.tenant_id(), option_id = %id), err)]
    pub async fn delete_option(&self, ctx: &CallContext, id: OptionId) -> CatalogResult<()> {
        self.require_option(ctx, id).await?;
        self.ensure_option_deletable(ctx, id).await?;
        ctx.run("delete_option", self.store.delete_option(ctx.tenant_id(), id))
            .await?;
        info!(option_id = %id, "option deleted");
        Ok(())
    }

    /// Add a value (trimmed, display casing kept) to an option.
    #[instrument(skip(self, ctx), fields(tenant_id = %ctx.tenant_id(), option_id = %option_id), err)]
    pub async fn create_value(
        &self,
        ctx: &CallContext,
        option_id: OptionId,
        value: &str,
    ) -> CatalogResult<OptionValue> {
        let value = OptionValue::create(OptionValueId::new(), option_id, value, Utc::now())?;
        self.require_option(ctx, option_id).await?;

        let siblings = ctx
            .run("list_values", self.store.list_values(ctx.tenant_id(), option_id))
            .await?;
        rules::ensure_unique_option_value(&value.value, &siblings, None)?;

        let value = ctx
            .run("insert_value", self.store.insert_value(ctx.tenant_id(), value))
            .await?;
        info!(option_value_id = %value.id, value = %value.value, "option value created");
        Ok(value)
    }

    #[instrument(skip(self, ctx), fields(tenant_id = %ctx.tenant_id(), option_value_id = %id), err)]
    pub async fn update_value(
        &self,
        ctx: &CallContext,
        id: OptionValueId,
        new_value: &str,
    ) -> CatalogResult<OptionValue> {
        let mut value = self.require_value(ctx, id).await?;
        value.relabel(new_value)?;

        let siblings = ctx
            .run("list_values", self.store.list_values(ctx.tenant_id(), value.option_id))
            .await?;
        rules::ensure_unique_option_value(&value.value, &siblings, Some(id))?;

        let value = ctx
            .run("update_value", self.store.update_value(ctx.tenant_id(), value))
            .await?;
        info!(option_value_id = %id, value = %value.value, "option value relabeled");
        Ok(value)
    }

    /// Fails `OPTION_VALUE_IN_USE` while a live variant references the value.
    #[instrument(skip(self, ctx), fields(tenant_id = %ctx.tenant_id(), option_value_id = %id), err)]
    pub async fn delete_value(&self, ctx: &CallContext, id: OptionValueId) -> CatalogResult<()> {
        self.require_value(ctx, id).await?;
        self.ensure_value_deletable(ctx, id).await?;
        ctx.run("delete_value", self.store.delete_value(ctx.tenant_id(), id))
            .await?;
        info!(option_value_id = %id, "option value deleted");
        Ok(())
    }
}
