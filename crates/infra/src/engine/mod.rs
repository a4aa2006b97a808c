//! The catalog engine: one façade over a [`CatalogStore`], with its operations
//! grouped per component.
//!
//! - `products`: product registry
//! - `options`: option registry (options and values)
//! - `variants`: variant lifecycle and the creation saga
//! - `resolver`: combination resolution
//! - `aggregator`: stock and price summaries
//! - `guard`: referential checks run before deletes
//!
//! The engine holds no mutable state. Its pre-checks only produce friendlier
//! errors early; the store re-checks every invariant atomically.

mod aggregator;
mod guard;
mod options;
mod products;
mod resolver;
mod variants;

pub use variants::{CreationSaga, CreationStep};

use storefront_catalog::{OptionValue, Product, ProductOption, Variant};
use storefront_core::{
    CatalogError, CatalogResult, ErrorCode, OptionId, OptionValueId, ProductId, TenantId,
    VariantId,
};

use crate::catalog_store::CatalogStore;
use crate::config::EngineConfig;
use crate::context::CallContext;

pub struct CatalogEngine<S> {
    store: S,
    config: EngineConfig,
}

impl<S: CatalogStore> CatalogEngine<S> {
    pub fn new(store: S, config: EngineConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// A context for `tenant_id` carrying the configured default deadline.
    pub fn context(&self, tenant_id: TenantId) -> CallContext {
        let ctx = CallContext::new(tenant_id);
        match self.config.default_deadline {
            Some(timeout) => ctx.with_timeout(timeout),
            None => ctx,
        }
    }

    pub(crate) async fn require_product(&self, ctx: &CallContext, id: ProductId) -> CatalogResult<Product> {
        ctx.run("get_product", self.store.get_product(ctx.tenant_id(), id))
            .await?
            .ok_or_else(|| {
                CatalogError::not_found(ErrorCode::ProductNotFound, format!("product {id} not found"))
            })
    }

    pub(crate) async fn require_option(&self, ctx: &CallContext, id: OptionId) -> CatalogResult<ProductOption> {
        ctx.run("get_option", self.store.get_option(ctx.tenant_id(), id))
            .await?
            .ok_or_else(|| {
                CatalogError::not_found(ErrorCode::OptionNotFound, format!("option {id} not found"))
            })
    }

    pub(crate) async fn require_value(&self, ctx: &CallContext, id: OptionValueId) -> CatalogResult<OptionValue> {
        ctx.run("get_value", self.store.get_value(ctx.tenant_id(), id))
            .await?
            .ok_or_else(|| {
                CatalogError::not_found(
                    ErrorCode::OptionValueNotFound,
                    format!("option value {id} not found"),
                )
            })
    }

    pub(crate) async fn require_variant(&self, ctx: &CallContext, id: VariantId) -> CatalogResult<Variant> {
        ctx.run("get_variant", self.store.get_variant(ctx.tenant_id(), id))
            .await?
            .ok_or_else(|| {
                CatalogError::not_found(ErrorCode::VariantNotFound, format!("variant {id} not found"))
            })
    }
}
