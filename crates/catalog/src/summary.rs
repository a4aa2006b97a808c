//! Per-product stock and price rollup.

use serde::{Deserialize, Serialize};

use storefront_core::ProductId;

use crate::combination::AvailableOption;
use crate::variant::Variant;

/// Low-stock threshold used when the caller does not override it.
pub const DEFAULT_LOW_STOCK_THRESHOLD: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockStatus {
    OutOfStock,
    Low,
    InStock,
}

impl StockStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StockStatus::OutOfStock => "out_of_stock",
            StockStatus::Low => "low",
            StockStatus::InStock => "in_stock",
        }
    }

    /// `low` compares the number of in-stock variants, not units.
    pub fn classify(variants_in_stock: u32, low_stock_threshold: u32) -> Self {
        if variants_in_stock == 0 {
            StockStatus::OutOfStock
        } else if variants_in_stock <= low_stock_threshold {
            StockStatus::Low
        } else {
            StockStatus::InStock
        }
    }
}

/// Derived view of a product's purchasable variants.
///
/// Always recomputed from current rows; never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductSummary {
    pub product_id: ProductId,
    pub total_stock: u64,
    pub variants_in_stock: u32,
    pub total_variants: u32,
    pub min_price: Option<u64>,
    pub max_price: Option<u64>,
    pub has_stock: bool,
    pub stock_status: StockStatus,
    pub available_options: Vec<AvailableOption>,
}

impl ProductSummary {
    /// Roll up `variants`, considering only purchasable ones.
    pub fn compute(
        product_id: ProductId,
        variants: &[Variant],
        low_stock_threshold: u32,
        available_options: Vec<AvailableOption>,
    ) -> Self {
        let mut total_stock = 0u64;
        let mut variants_in_stock = 0u32;
        let mut total_variants = 0u32;
        let mut min_price: Option<u64> = None;
        let mut max_price: Option<u64> = None;

        for v in variants.iter().filter(|v| v.is_purchasable()) {
            total_variants += 1;
            total_stock += u64::from(v.stock);
            if v.in_stock() {
                variants_in_stock += 1;
            }
            min_price = Some(min_price.map_or(v.price, |p| p.min(v.price)));
            max_price = Some(max_price.map_or(v.price, |p| p.max(v.price)));
        }

        Self {
            product_id,
            total_stock,
            variants_in_stock,
            total_variants,
            min_price,
            max_price,
            has_stock: variants_in_stock > 0,
            stock_status: StockStatus::classify(variants_in_stock, low_stock_threshold),
            available_options,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use proptest::prelude::*;
    use storefront_core::VariantId;

    use crate::variant::NewVariant;

    fn variant(product_id: ProductId, price: u64, stock: u32) -> Variant {
        Variant::create(
            VariantId::new(),
            product_id,
            &NewVariant::new(format!("v-{price}-{stock}"), price, stock),
            Utc::now(),
        )
        .unwrap()
    }

    #[test]
    fn archived_stock_is_ignored() {
        let product_id = ProductId::new();
        let mut archived = variant(product_id, 9000, 100);
        archived.archive(Utc::now()).unwrap();
        let variants = vec![variant(product_id, 1800, 3), variant(product_id, 5400, 0), archived];

        let s = ProductSummary::compute(product_id, &variants, DEFAULT_LOW_STOCK_THRESHOLD, vec![]);
        assert_eq!(s.total_stock, 3);
        assert_eq!(s.variants_in_stock, 1);
        assert_eq!(s.total_variants, 2);
        assert_eq!(s.min_price, Some(1800));
        assert_eq!(s.max_price, Some(5400));
        assert!(s.has_stock);
        assert_eq!(s.stock_status, StockStatus::Low);
    }

    #[test]
    fn no_purchasable_variants_means_no_price_range() {
        let product_id = ProductId::new();
        let mut inactive = variant(product_id, 100, 5);
        inactive.active = false;

        let s = ProductSummary::compute(product_id, &[inactive], DEFAULT_LOW_STOCK_THRESHOLD, vec![]);
        assert_eq!(s.total_variants, 0);
        assert_eq!(s.min_price, None);
        assert_eq!(s.max_price, None);
        assert!(!s.has_stock);
        assert_eq!(s.stock_status, StockStatus::OutOfStock);
    }

    #[test]
    fn classification_boundaries() {
        assert_eq!(StockStatus::classify(0, 10), StockStatus::OutOfStock);
        assert_eq!(StockStatus::classify(10, 10), StockStatus::Low);
        assert_eq!(StockStatus::classify(11, 10), StockStatus::InStock);
        assert_eq!(StockStatus::classify(1, 0), StockStatus::InStock);
    }

    #[test]
    fn status_serializes_snake_case() {
        let json = serde_json::to_string(&StockStatus::OutOfStock).unwrap();
        assert_eq!(json, "\"out_of_stock\"");
        assert_eq!(StockStatus::InStock.as_str(), "in_stock");
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: totals equal the sum over purchasable variants.
        #[test]
        fn totals_match_purchasable_rows(
            rows in prop::collection::vec((0u64..100_000, 0u32..500, any::<bool>(), any::<bool>()), 0..20)
        ) {
            let product_id = ProductId::new();
            let variants: Vec<Variant> = rows
                .iter()
                .map(|(price, stock, active, archived)| {
                    let mut v = variant(product_id, *price, *stock);
                    v.active = *active;
                    if *archived {
                        v.archived_at = Some(Utc::now());
                    }
                    v
                })
                .collect();

            let s = ProductSummary::compute(product_id, &variants, DEFAULT_LOW_STOCK_THRESHOLD, vec![]);
            let live: Vec<&Variant> = variants.iter().filter(|v| v.is_purchasable()).collect();

            prop_assert_eq!(s.total_stock, live.iter().map(|v| u64::from(v.stock)).sum::<u64>());
            prop_assert_eq!(s.total_variants as usize, live.len());
            prop_assert_eq!(s.variants_in_stock as usize, live.iter().filter(|v| v.stock > 0).count());
            prop_assert_eq!(s.min_price, live.iter().map(|v| v.price).min());
            prop_assert_eq!(s.max_price, live.iter().map(|v| v.price).max());
            prop_assert_eq!(s.has_stock, s.variants_in_stock > 0);
        }
    }
}
