use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use chrono::Utc;
use storefront_catalog::combination;
use storefront_catalog::{
    CombinationKey, NewProduct, NewVariant, OptionValue, ProductOption, ProductSummary, Selection,
    SelectionEntry, Variant, VariantOptionAssignment,
};
use storefront_core::{OptionId, OptionValueId, ProductId, TenantId, VariantId};
use storefront_infra::{CatalogEngine, EngineConfig, InMemoryCatalogStore};

/// A product with two options and one variant per (size, grind) pair.
struct Catalog {
    product_id: ProductId,
    options: Vec<ProductOption>,
    values: Vec<OptionValue>,
    variants: Vec<Variant>,
    assignments: Vec<VariantOptionAssignment>,
}

fn catalog(sizes: usize, grinds: usize) -> Catalog {
    let now = Utc::now();
    let product_id = ProductId::new();
    let size = ProductOption::create(OptionId::new(), product_id, "size", now).unwrap();
    let grind = ProductOption::create(OptionId::new(), product_id, "grind", now).unwrap();

    let size_values: Vec<OptionValue> = (0..sizes)
        .map(|i| OptionValue::create(OptionValueId::new(), size.id, &format!("{i}oz"), now).unwrap())
        .collect();
    let grind_values: Vec<OptionValue> = (0..grinds)
        .map(|i| OptionValue::create(OptionValueId::new(), grind.id, &format!("grind {i}"), now).unwrap())
        .collect();

    let mut variants = Vec::new();
    let mut assignments = Vec::new();
    for (i, s) in size_values.iter().enumerate() {
        for (j, g) in grind_values.iter().enumerate() {
            let input = NewVariant::new(format!("{i}-{j}"), 1000 + i as u64, ((i + j) % 4) as u32);
            let variant = Variant::create(VariantId::new(), product_id, &input, now).unwrap();
            assignments.push(VariantOptionAssignment::new(variant.id, SelectionEntry::new(size.id, s.id)));
            assignments.push(VariantOptionAssignment::new(variant.id, SelectionEntry::new(grind.id, g.id)));
            variants.push(variant);
        }
    }

    let mut values = size_values;
    values.extend(grind_values);
    Catalog {
        product_id,
        options: vec![size, grind],
        values,
        variants,
        assignments,
    }
}

fn bench_resolve(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolve_combination");

    for side in [4usize, 16, 64].iter() {
        let cat = catalog(*side, *side);
        let last: Vec<_> = cat
            .assignments
            .iter()
            .rev()
            .take(2)
            .map(|a| (a.option_id, a.option_value_id))
            .collect();
        let key = CombinationKey::from_pairs(last);

        group.throughput(Throughput::Elements(cat.variants.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(cat.variants.len()), &key, |b, key| {
            b.iter(|| {
                let found = combination::resolve(&cat.variants, &cat.assignments, black_box(key)).unwrap();
                black_box(found.id);
            });
        });
    }

    group.finish();
}

fn bench_summary(c: &mut Criterion) {
    let mut group = c.benchmark_group("product_summary");

    for side in [4usize, 16, 64].iter() {
        let cat = catalog(*side, *side);
        group.throughput(Throughput::Elements(cat.variants.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(cat.variants.len()), &cat, |b, cat| {
            b.iter(|| {
                let available =
                    combination::available_options(&cat.options, &cat.values, &cat.variants, &cat.assignments);
                let summary = ProductSummary::compute(cat.product_id, &cat.variants, 10, available);
                black_box(summary.total_stock);
            });
        });
    }

    group.finish();
}

fn bench_engine_lookup(c: &mut Criterion) {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    let engine = CatalogEngine::new(InMemoryCatalogStore::new(), EngineConfig::default());
    let ctx = engine.context(TenantId::new());

    let (product, selection) = rt.block_on(async {
        let product = engine.create_product(&ctx, NewProduct::new("Coffee")).await.unwrap().id;
        let size = engine.create_option(&ctx, product, "size").await.unwrap().option.id;
        let grind = engine.create_option(&ctx, product, "grind").await.unwrap().option.id;
        let mut last = Selection::new();
        for i in 0..8 {
            let s = engine.create_value(&ctx, size, &format!("{i}oz")).await.unwrap().id;
            for j in 0..8 {
                let g = if i == 0 {
                    engine.create_value(&ctx, grind, &format!("grind {j}")).await.unwrap().id
                } else {
                    engine.list_values(&ctx, grind).await.unwrap()[j].id
                };
                last = Selection::new().with(size, s).with(grind, g);
                engine
                    .create_variant(
                        &ctx,
                        product,
                        NewVariant::new(format!("{i}-{j}"), 1000, 2).with_selection(last.clone()),
                    )
                    .await
                    .unwrap();
            }
        }
        (product, last)
    });

    let mut group = c.benchmark_group("engine_lookup");
    group.bench_function("find_variant_by_options_64", |b| {
        b.iter(|| {
            let found = rt
                .block_on(engine.find_variant_by_options(&ctx, product, black_box(&selection)))
                .unwrap();
            black_box(found.variant.id);
        });
    });
    group.bench_function("summarize_64", |b| {
        b.iter(|| {
            let summary = rt.block_on(engine.summarize(&ctx, product)).unwrap();
            black_box(summary.total_stock);
        });
    });
    group.finish();
}

criterion_group!(benches, bench_resolve, bench_summary, bench_engine_lookup);
criterion_main!(benches);
