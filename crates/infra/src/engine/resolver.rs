use tracing::{error, instrument};

use storefront_catalog::combination::{self, AvailableOption, Combination};
use storefront_catalog::{
    OptionValue, ProductOption, Selection, Variant, VariantOptionAssignment, VariantWithAssignments,
};
use storefront_core::{CatalogResult, ErrorKind, ProductId};

use super::CatalogEngine;
use crate::catalog_store::CatalogStore;
use crate::context::CallContext;

/// Every row the read paths need for one product, loaded per call.
pub(crate) struct ProductSnapshot {
    pub options: Vec<ProductOption>,
    pub values: Vec<OptionValue>,
    pub variants: Vec<Variant>,
    pub assignments: Vec<VariantOptionAssignment>,
}

impl ProductSnapshot {
    pub fn available_options(&self) -> Vec<AvailableOption> {
        combination::available_options(&self.options, &self.values, &self.variants, &self.assignments)
    }
}

impl<S: CatalogStore> CatalogEngine<S> {
    pub(crate) async fn snapshot(&self, ctx: &CallContext, product_id: ProductId) -> CatalogResult<ProductSnapshot> {
        self.require_product(ctx, product_id).await?;
        let tenant_id = ctx.tenant_id();
        Ok(ProductSnapshot {
            options: ctx
                .run("list_options", self.store.list_options(tenant_id, product_id))
                .await?,
            values: ctx
                .run("list_product_values", self.store.list_product_values(tenant_id, product_id))
                .await?,
            variants: ctx
                .run("list_variants", self.store.list_variants(tenant_id, product_id))
                .await?,
            assignments: ctx
                .run(
                    "list_product_assignments",
                    self.store.list_product_assignments(tenant_id, product_id),
                )
                .await?,
        })
    }

    /// The single purchasable variant whose assignment set equals `selection`
    /// exactly. Order of the selection entries does not matter.
    #[instrument(skip(self, ctx, selection), fields(tenant_id = %ctx.tenant_id(), product_id = %product_id), err)]
    pub async fn find_variant_by_options(
        &self,
        ctx: &CallContext,
        product_id: ProductId,
        selection: &Selection,
    ) -> CatalogResult<VariantWithAssignments> {
        self.require_product(ctx, product_id).await?;
        let tenant_id = ctx.tenant_id();
        let variants = ctx
            .run("list_variants", self.store.list_variants(tenant_id, product_id))
            .await?;
        let assignments = ctx
            .run(
                "list_product_assignments",
                self.store.list_product_assignments(tenant_id, product_id),
            )
            .await?;

        let key = selection.combination_key();
        let variant = combination::resolve(&variants, &assignments, &key).inspect_err(|err| {
            if err.kind() == ErrorKind::DataIntegrity {
                error!(product_id = %product_id, combination = %key, error = %err, "combination resolves to several variants");
            }
        })?;

        Ok(VariantWithAssignments {
            variant: variant.clone(),
            assignments: assignments
                .iter()
                .filter(|a| a.variant_id == variant.id)
                .copied()
                .collect(),
        })
    }

    /// For each option, the values some purchasable variant uses.
    pub async fn get_available_options(
        &self,
        ctx: &CallContext,
        product_id: ProductId,
    ) -> CatalogResult<Vec<AvailableOption>> {
        Ok(self.snapshot(ctx, product_id).await?.available_options())
    }

    /// Distinct assignment sets of purchasable variants with stock.
    pub async fn get_option_combinations_in_stock(
        &self,
        ctx: &CallContext,
        product_id: ProductId,
    ) -> CatalogResult<Vec<Combination>> {
        self.require_product(ctx, product_id).await?;
        let tenant_id = ctx.tenant_id();
        let variants = ctx
            .run("list_variants", self.store.list_variants(tenant_id, product_id))
            .await?;
        let assignments = ctx
            .run(
                "list_product_assignments",
                self.store.list_product_assignments(tenant_id, product_id),
            )
            .await?;
        Ok(combination::in_stock_combinations(&variants, &assignments))
    }
}
