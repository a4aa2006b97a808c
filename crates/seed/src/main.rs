use anyhow::Context;

use storefront_infra::{CatalogConfig, CatalogEngine};
use storefront_seed::CatalogFixture;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = CatalogConfig::from_env().context("reading configuration")?;
    storefront_observability::init_with(config.log_format);

    let fixture = match std::env::args().nth(1) {
        Some(path) => {
            let raw = std::fs::read_to_string(&path).with_context(|| format!("reading {path}"))?;
            CatalogFixture::from_json(&raw).with_context(|| format!("parsing {path}"))?
        }
        None => {
            tracing::info!("no fixture path given; loading the demo catalog");
            CatalogFixture::demo()
        }
    };

    let store = storefront_seed::build_store(&config.store).await?;
    let engine = CatalogEngine::new(store, config.engine.clone());
    let ctx = engine.context(fixture.tenant_id.unwrap_or_default());
    tracing::info!(tenant_id = %ctx.tenant_id(), products = fixture.products.len(), "seeding catalog");

    let summaries = storefront_seed::load(&engine, &ctx, &fixture).await?;
    println!("{}", serde_json::to_string_pretty(&summaries)?);
    Ok(())
}
