//! End-to-end tests of the catalog engine over the in-memory store.
//!
//! Verifies:
//! - The storefront scenarios (duplicate combinations, mixed mode, rollups,
//!   value-in-use) behave as an admin/storefront caller sees them
//! - Compensation leaves no partially configured variant behind
//! - Concurrent writers cannot break combination uniqueness
//! - Tenant isolation is preserved

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::time::Duration;

    use proptest::prelude::*;

    use storefront_catalog::{
        CombinationKey, NewProduct, NewVariant, Selection, StockStatus, VariantPatch,
    };
    use storefront_core::{ErrorCode, ErrorKind, OptionId, OptionValueId, ProductId, TenantId};

    use crate::catalog_store::{CatalogStore, InMemoryCatalogStore};
    use crate::config::EngineConfig;
    use crate::context::{CallContext, CancelSignal};
    use crate::engine::CatalogEngine;

    type Engine = CatalogEngine<Arc<InMemoryCatalogStore>>;

    fn setup() -> (Engine, CallContext) {
        let engine = CatalogEngine::new(Arc::new(InMemoryCatalogStore::new()), EngineConfig::default());
        let ctx = engine.context(TenantId::new());
        (engine, ctx)
    }

    struct CoffeeA {
        product: ProductId,
        size: OptionId,
        oz12: OptionValueId,
        lb5: OptionValueId,
    }

    async fn coffee_a(engine: &Engine, ctx: &CallContext) -> CoffeeA {
        let product = engine.create_product(ctx, NewProduct::new("Coffee A")).await.unwrap().id;
        let size = engine.create_option(ctx, product, "size").await.unwrap().option.id;
        let oz12 = engine.create_value(ctx, size, "12oz").await.unwrap().id;
        let lb5 = engine.create_value(ctx, size, "5lb").await.unwrap().id;
        CoffeeA {
            product,
            size,
            oz12,
            lb5,
        }
    }

    /// Live variants must cover every option once and never share a set.
    async fn assert_catalog_invariants(engine: &Engine, ctx: &CallContext, product: ProductId) {
        let option_count = engine.list_options(ctx, product).await.unwrap().len();
        let mut keys = HashSet::new();
        for variant in engine.get_variants_by_product(ctx, product, false).await.unwrap() {
            if variant.is_archived() {
                continue;
            }
            let full = engine.get_variant(ctx, variant.id).await.unwrap();
            assert_eq!(full.assignments.len(), option_count, "variant {} incomplete", variant.name);
            let options: HashSet<OptionId> = full.assignments.iter().map(|a| a.option_id).collect();
            assert_eq!(options.len(), option_count, "variant {} repeats an option", variant.name);
            assert!(keys.insert(full.combination_key()), "duplicate combination");
        }
    }

    #[tokio::test]
    async fn duplicate_selection_is_rejected() {
        let (engine, ctx) = setup();
        let c = coffee_a(&engine, &ctx).await;

        let first = engine
            .create_variant(
                &ctx,
                c.product,
                NewVariant::new("12oz bag", 1800, 5).with_selection(Selection::new().with(c.size, c.oz12)),
            )
            .await
            .unwrap();
        assert_eq!(first.assignments.len(), 1);

        let err = engine
            .create_variant(
                &ctx,
                c.product,
                NewVariant::new("12oz again", 1800, 5).with_selection(Selection::new().with(c.size, c.oz12)),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidCombination);
        assert_eq!(err.code(), ErrorCode::DuplicateCombination);

        let live = engine.get_variants_by_product(&ctx, c.product, true).await.unwrap();
        assert_eq!(live.len(), 1);
        assert_catalog_invariants(&engine, &ctx, c.product).await;
    }

    #[tokio::test]
    async fn foreign_option_is_invalid_and_variant_is_archived() {
        let (engine, ctx) = setup();
        let c = coffee_a(&engine, &ctx).await;

        let other = engine.create_product(&ctx, NewProduct::new("Coffee Z")).await.unwrap().id;
        let grind = engine.create_option(&ctx, other, "grind").await.unwrap().option.id;
        let whole = engine.create_value(&ctx, grind, "whole").await.unwrap().id;

        let err = engine
            .create_variant(
                &ctx,
                c.product,
                NewVariant::new("12oz whole", 1800, 5)
                    .with_selection(Selection::new().with(c.size, c.oz12).with(grind, whole)),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidCombination);

        let all = engine.get_variants_by_product(&ctx, c.product, false).await.unwrap();
        assert_eq!(all.len(), 1);
        assert!(all[0].is_archived());
        let leftover = engine.get_variant(&ctx, all[0].id).await.unwrap();
        assert!(leftover.assignments.is_empty());
        assert_eq!(engine.store().count_value_usage(ctx.tenant_id(), c.oz12).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn default_variant_mode_forbids_selections() {
        let (engine, ctx) = setup();
        let c = coffee_a(&engine, &ctx).await;
        let b = engine.create_product(&ctx, NewProduct::new("Coffee B")).await.unwrap().id;

        let default = engine
            .create_variant(&ctx, b, NewVariant::new("Default", 2400, 8))
            .await
            .unwrap();
        assert!(default.assignments.is_empty());

        let err = engine
            .create_variant(
                &ctx,
                b,
                NewVariant::new("Sized", 2400, 8).with_selection(Selection::new().with(c.size, c.lb5)),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidCombination);

        let found = engine
            .find_variant_by_options(&ctx, b, &Selection::new())
            .await
            .unwrap();
        assert_eq!(found.variant.id, default.variant.id);
        assert_catalog_invariants(&engine, &ctx, b).await;
    }

    #[tokio::test]
    async fn summary_ignores_archived_stock() {
        let (engine, ctx) = setup();
        let c = coffee_a(&engine, &ctx).await;
        let xl = engine.create_value(&ctx, c.size, "10lb").await.unwrap().id;

        for (name, price, stock, value) in [("12oz", 1800, 3, c.oz12), ("5lb", 5400, 0, c.lb5), ("10lb", 9000, 100, xl)] {
            engine
                .create_variant(
                    &ctx,
                    c.product,
                    NewVariant::new(name, price, stock).with_selection(Selection::new().with(c.size, value)),
                )
                .await
                .unwrap();
        }
        let archived = engine
            .find_variant_by_options(&ctx, c.product, &Selection::new().with(c.size, xl))
            .await
            .unwrap();
        engine.archive_variant(&ctx, archived.variant.id).await.unwrap();

        let summary = engine.summarize(&ctx, c.product).await.unwrap();
        assert_eq!(summary.total_stock, 3);
        assert_eq!(summary.variants_in_stock, 1);
        assert_eq!(summary.total_variants, 2);
        assert!(summary.has_stock);
        assert_eq!(summary.stock_status, StockStatus::Low);
        assert_eq!(summary.min_price, Some(1800));
        assert_eq!(summary.max_price, Some(5400));

        let active = engine.get_variants_by_product(&ctx, c.product, true).await.unwrap();
        let active_stock: u64 = active.iter().map(|v| u64::from(v.stock)).sum();
        assert_eq!(summary.total_stock, active_stock);

        let sizes: Vec<OptionValueId> = summary.available_options[0].values.iter().map(|v| v.id).collect();
        assert_eq!(sizes, vec![c.oz12, c.lb5]);
    }

    #[tokio::test]
    async fn value_in_use_until_variant_archived() {
        let (engine, ctx) = setup();
        let c = coffee_a(&engine, &ctx).await;
        let v = engine
            .create_variant(
                &ctx,
                c.product,
                NewVariant::new("5lb", 5400, 2).with_selection(Selection::new().with(c.size, c.lb5)),
            )
            .await
            .unwrap();

        let err = engine.delete_value(&ctx, c.lb5).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(err.code(), ErrorCode::OptionValueInUse);

        engine.archive_variant(&ctx, v.variant.id).await.unwrap();
        engine.delete_value(&ctx, c.lb5).await.unwrap();

        let values = engine.list_values(&ctx, c.size).await.unwrap();
        assert_eq!(values.iter().map(|v| v.id).collect::<Vec<_>>(), vec![c.oz12]);
    }

    #[tokio::test]
    async fn option_delete_follows_its_values() {
        let (engine, ctx) = setup();
        let c = coffee_a(&engine, &ctx).await;

        let err = engine.delete_option(&ctx, c.size).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);

        engine.delete_value(&ctx, c.oz12).await.unwrap();
        engine.delete_value(&ctx, c.lb5).await.unwrap();
        engine.delete_option(&ctx, c.size).await.unwrap();
        engine.delete_product(&ctx, c.product).await.unwrap();
    }

    #[tokio::test]
    async fn archived_name_can_be_reused_but_combination_is_rechecked() {
        let (engine, ctx) = setup();
        let c = coffee_a(&engine, &ctx).await;
        let first = engine
            .create_variant(
                &ctx,
                c.product,
                NewVariant::new("House", 1800, 5).with_selection(Selection::new().with(c.size, c.oz12)),
            )
            .await
            .unwrap();
        engine.archive_variant(&ctx, first.variant.id).await.unwrap();

        let second = engine
            .create_variant(
                &ctx,
                c.product,
                NewVariant::new("house", 1900, 5).with_selection(Selection::new().with(c.size, c.oz12)),
            )
            .await
            .unwrap();

        let err = engine
            .update_variant(
                &ctx,
                second.variant.id,
                VariantPatch {
                    name: Some("  ".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert_catalog_invariants(&engine, &ctx, c.product).await;
    }

    #[tokio::test]
    async fn tenants_do_not_see_each_other() {
        let (engine, ctx) = setup();
        let c = coffee_a(&engine, &ctx).await;
        let other = engine.context(TenantId::new());

        let err = engine.get_product(&other, c.product).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::ProductNotFound);
        let err = engine.create_option(&other, c.product, "grind").await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::ProductNotFound);
        let err = engine.delete_value(&other, c.oz12).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::OptionValueNotFound);
    }

    #[tokio::test]
    async fn pre_cancelled_call_touches_nothing() {
        let (engine, ctx) = setup();
        let signal = CancelSignal::new();
        signal.cancel();
        let cancelled = ctx.clone().with_cancel(signal);

        let err = engine
            .create_product(&cancelled, NewProduct::new("Never"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Cancelled);
        assert_eq!(err.http_status(), 499);

        let expired = ctx.clone().with_timeout(Duration::ZERO);
        let err = engine.create_product(&expired, NewProduct::new("Never")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Cancelled);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_identical_selections_yield_one_variant() {
        let (engine, ctx) = setup();
        let c = coffee_a(&engine, &ctx).await;
        let engine = Arc::new(engine);

        let mut handles = Vec::new();
        for i in 0..16 {
            let engine = engine.clone();
            let ctx = ctx.clone();
            let selection = Selection::new().with(c.size, c.oz12);
            handles.push(tokio::spawn(async move {
                engine
                    .create_variant(
                        &ctx,
                        c.product,
                        NewVariant::new(format!("racer {i}"), 1800, 1).with_selection(selection),
                    )
                    .await
            }));
        }

        let mut winners = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => winners += 1,
                Err(err) => assert_eq!(err.code(), ErrorCode::DuplicateCombination),
            }
        }
        assert_eq!(winners, 1);
        assert_catalog_invariants(&engine, &ctx, c.product).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_patches_of_different_fields_both_land() {
        let (engine, ctx) = setup();
        let c = coffee_a(&engine, &ctx).await;
        let id = engine
            .create_variant(
                &ctx,
                c.product,
                NewVariant::new("12oz", 1800, 5).with_selection(Selection::new().with(c.size, c.oz12)),
            )
            .await
            .unwrap()
            .variant
            .id;
        let engine = Arc::new(engine);

        for round in 0..200u32 {
            let stock = {
                let engine = engine.clone();
                let ctx = ctx.clone();
                tokio::spawn(async move {
                    let patch = VariantPatch {
                        stock: Some(round),
                        ..Default::default()
                    };
                    engine.update_variant(&ctx, id, patch).await
                })
            };
            let price = {
                let engine = engine.clone();
                let ctx = ctx.clone();
                tokio::spawn(async move {
                    let patch = VariantPatch {
                        price: Some(1000 + u64::from(round)),
                        ..Default::default()
                    };
                    engine.update_variant(&ctx, id, patch).await
                })
            };
            stock.await.unwrap().unwrap();
            price.await.unwrap().unwrap();

            let stored = engine.get_variant(&ctx, id).await.unwrap().variant;
            assert_eq!(stored.stock, round, "stock patch lost in round {round}");
            assert_eq!(stored.price, 1000 + u64::from(round), "price patch lost in round {round}");
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_archive_has_one_winner() {
        let (engine, ctx) = setup();
        let c = coffee_a(&engine, &ctx).await;
        let v = engine
            .create_variant(
                &ctx,
                c.product,
                NewVariant::new("12oz", 1800, 1).with_selection(Selection::new().with(c.size, c.oz12)),
            )
            .await
            .unwrap();
        let engine = Arc::new(engine);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let engine = engine.clone();
                let ctx = ctx.clone();
                let id = v.variant.id;
                tokio::spawn(async move { engine.archive_variant(&ctx, id).await })
            })
            .collect();

        let mut archived = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => archived += 1,
                Err(err) => assert_eq!(err.code(), ErrorCode::AlreadyArchived),
            }
        }
        assert_eq!(archived, 1);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Create { size: Option<usize>, grind: Option<usize> },
        Archive(usize),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            3 => (prop::option::of(0usize..3), prop::option::of(0usize..2))
                .prop_map(|(size, grind)| Op::Create { size, grind }),
            1 => (0usize..8).prop_map(Op::Archive),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 48,
            ..ProptestConfig::default()
        })]

        /// Property: any sequence of creations and archivals leaves every live
        /// variant complete, exclusive and unique.
        #[test]
        fn random_sequences_preserve_invariants(ops in prop::collection::vec(op(), 1..24)) {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            rt.block_on(async {
                let (engine, ctx) = setup();
                let product = engine.create_product(&ctx, NewProduct::new("Coffee")).await.unwrap().id;
                let size = engine.create_option(&ctx, product, "size").await.unwrap().option.id;
                let grind = engine.create_option(&ctx, product, "grind").await.unwrap().option.id;
                let mut sizes = Vec::new();
                for v in ["12oz", "2lb", "5lb"] {
                    sizes.push(engine.create_value(&ctx, size, v).await.unwrap().id);
                }
                let mut grinds = Vec::new();
                for v in ["whole", "ground"] {
                    grinds.push(engine.create_value(&ctx, grind, v).await.unwrap().id);
                }

                let mut created = Vec::new();
                let mut live_keys: HashSet<CombinationKey> = HashSet::new();
                for (i, op) in ops.into_iter().enumerate() {
                    match op {
                        Op::Create { size: s, grind: g } => {
                            let mut selection = Selection::new();
                            if let Some(s) = s {
                                selection.push(size, sizes[s]);
                            }
                            if let Some(g) = g {
                                selection.push(grind, grinds[g]);
                            }
                            let key = selection.combination_key();
                            let complete = s.is_some() && g.is_some();
                            let result = engine
                                .create_variant(&ctx, product, NewVariant::new(format!("v{i}"), 100, 1).with_selection(selection))
                                .await;
                            match result {
                                Ok(v) => {
                                    assert!(complete);
                                    assert!(live_keys.insert(key));
                                    created.push((v.variant.id, v.combination_key()));
                                }
                                Err(err) => {
                                    assert_eq!(err.kind(), ErrorKind::InvalidCombination);
                                    assert!(!complete || live_keys.contains(&key));
                                }
                            }
                        }
                        Op::Archive(n) => {
                            if created.is_empty() {
                                continue;
                            }
                            let (id, key) = created.remove(n % created.len());
                            engine.archive_variant(&ctx, id).await.unwrap();
                            live_keys.remove(&key);
                        }
                    }
                    assert_catalog_invariants(&engine, &ctx, product).await;
                }
            });
        }
    }
}
