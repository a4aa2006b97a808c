//! Catalog seeding: builds a store from configuration and loads a fixture
//! through the catalog engine.

pub mod fixture;

use std::sync::Arc;

use anyhow::{Context, anyhow};
use tracing::info;

use storefront_catalog::{
    NewProduct, NewVariant, OptionWithValues, ProductSummary, Selection, normalize,
};
use storefront_infra::{
    CallContext, CatalogEngine, CatalogStore, InMemoryCatalogStore, PostgresCatalogStore, StoreConfig,
};

pub use fixture::{CatalogFixture, OptionFixture, ProductFixture, VariantFixture};

/// Open the configured store, creating the schema for Postgres.
pub async fn build_store(config: &StoreConfig) -> anyhow::Result<Arc<dyn CatalogStore>> {
    match config {
        StoreConfig::InMemory => Ok(Arc::new(InMemoryCatalogStore::new())),
        StoreConfig::Postgres {
            database_url,
            max_connections,
        } => {
            let store = PostgresCatalogStore::connect(database_url, *max_connections)
                .await
                .context("connecting to Postgres")?;
            store.ensure_schema().await.context("creating catalog schema")?;
            Ok(Arc::new(store))
        }
    }
}

/// Create every product of `fixture` with its options, values and variants,
/// returning one summary per product.
pub async fn load<S: CatalogStore>(
    engine: &CatalogEngine<S>,
    ctx: &CallContext,
    fixture: &CatalogFixture,
) -> anyhow::Result<Vec<ProductSummary>> {
    let mut summaries = Vec::with_capacity(fixture.products.len());
    for product in &fixture.products {
        summaries.push(
            load_product(engine, ctx, product)
                .await
                .with_context(|| format!("loading product '{}'", product.name))?,
        );
    }
    Ok(summaries)
}

async fn load_product<S: CatalogStore>(
    engine: &CatalogEngine<S>,
    ctx: &CallContext,
    input: &ProductFixture,
) -> anyhow::Result<ProductSummary> {
    let product = engine
        .create_product(
            ctx,
            NewProduct {
                active: input.active,
                ..NewProduct::new(input.name.clone())
            },
        )
        .await?;

    let mut options: Vec<OptionWithValues> = Vec::with_capacity(input.options.len());
    for option in &input.options {
        let mut created = engine.create_option(ctx, product.id, &option.key).await?;
        for value in &option.values {
            created.values.push(engine.create_value(ctx, created.option.id, value).await?);
        }
        options.push(created);
    }

    for variant in &input.variants {
        let selection = select(&options, variant)?;
        let created = engine
            .create_variant(
                ctx,
                product.id,
                NewVariant {
                    active: variant.active,
                    is_subscription: variant.is_subscription,
                    ..NewVariant::new(variant.name.clone(), variant.price, variant.stock)
                }
                .with_selection(selection),
            )
            .await
            .with_context(|| format!("creating variant '{}'", variant.name))?;
        if variant.archived {
            engine.archive_variant(ctx, created.variant.id).await?;
        }
    }

    let summary = engine.summarize(ctx, product.id).await?;
    info!(
        product_id = %product.id,
        variants = summary.total_variants,
        total_stock = summary.total_stock,
        "product seeded"
    );
    Ok(summary)
}

/// Translate an option-key to value-text map into ids.
fn select(options: &[OptionWithValues], variant: &VariantFixture) -> anyhow::Result<Selection> {
    let mut selection = Selection::new();
    for (key, text) in &variant.selection {
        let option = options
            .iter()
            .find(|o| normalize::identity(&o.option.key) == normalize::identity(key))
            .ok_or_else(|| anyhow!("variant '{}' names unknown option '{key}'", variant.name))?;
        let value = option
            .values
            .iter()
            .find(|v| v.same_text(text))
            .ok_or_else(|| anyhow!("option '{key}' has no value '{text}'"))?;
        selection.push(option.option.id, value.id);
    }
    Ok(selection)
}
