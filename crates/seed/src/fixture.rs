//! JSON catalog fixtures.
//!
//! Options and values are referred to by their text, the way an admin would
//! type them; the loader resolves them to ids as it creates rows.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use storefront_core::TenantId;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogFixture {
    /// Tenant to load into. A fresh one is generated when absent.
    #[serde(default)]
    pub tenant_id: Option<TenantId>,
    pub products: Vec<ProductFixture>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductFixture {
    pub name: String,
    #[serde(default = "yes")]
    pub active: bool,
    #[serde(default)]
    pub options: Vec<OptionFixture>,
    #[serde(default)]
    pub variants: Vec<VariantFixture>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptionFixture {
    pub key: String,
    pub values: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariantFixture {
    pub name: String,
    pub price: u64,
    pub stock: u32,
    #[serde(default = "yes")]
    pub active: bool,
    #[serde(default)]
    pub is_subscription: bool,
    /// Option key to value text, applied in the order written.
    #[serde(default)]
    pub selection: IndexMap<String, String>,
    #[serde(default)]
    pub archived: bool,
}

fn yes() -> bool {
    true
}

impl CatalogFixture {
    pub fn from_json(raw: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Two coffees: one configured by size and grind, one sold as a single
    /// default variant.
    pub fn demo() -> Self {
        let selection = |size: &str, grind: &str| {
            IndexMap::from([
                ("size".to_string(), size.to_string()),
                ("grind".to_string(), grind.to_string()),
            ])
        };
        let variant = |name: &str, price: u64, stock: u32, sel: IndexMap<String, String>| VariantFixture {
            name: name.to_string(),
            price,
            stock,
            active: true,
            is_subscription: false,
            selection: sel,
            archived: false,
        };

        Self {
            tenant_id: None,
            products: vec![
                ProductFixture {
                    name: "Ethiopia Guji".into(),
                    active: true,
                    options: vec![
                        OptionFixture {
                            key: "size".into(),
                            values: vec!["12oz".into(), "2lb".into(), "5lb".into()],
                        },
                        OptionFixture {
                            key: "grind".into(),
                            values: vec!["whole bean".into(), "espresso".into()],
                        },
                    ],
                    variants: vec![
                        variant("12oz whole bean", 1800, 24, selection("12oz", "whole bean")),
                        variant("12oz espresso", 1800, 3, selection("12oz", "espresso")),
                        variant("2lb whole bean", 4200, 0, selection("2lb", "whole bean")),
                        VariantFixture {
                            archived: true,
                            ..variant("5lb whole bean", 9000, 100, selection("5lb", "whole bean"))
                        },
                    ],
                },
                ProductFixture {
                    name: "House Decaf".into(),
                    active: true,
                    options: Vec::new(),
                    variants: vec![variant("Default", 1600, 8, IndexMap::new())],
                },
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_optional_fields() {
        let raw = r#"{
            "products": [{
                "name": "Tea",
                "variants": [{ "name": "Default", "price": 900, "stock": 2 }]
            }]
        }"#;
        let fixture = CatalogFixture::from_json(raw).unwrap();
        assert!(fixture.tenant_id.is_none());
        let product = &fixture.products[0];
        assert!(product.active);
        assert!(product.options.is_empty());
        assert!(product.variants[0].active);
        assert!(!product.variants[0].archived);
        assert!(product.variants[0].selection.is_empty());
    }

    #[test]
    fn demo_fixture_survives_json() {
        let json = serde_json::to_string(&CatalogFixture::demo()).unwrap();
        let back = CatalogFixture::from_json(&json).unwrap();
        assert_eq!(back.products.len(), 2);
        assert_eq!(back.products[0].variants.len(), 4);
    }

    #[test]
    fn selection_keeps_written_order() {
        let raw = r#"{
            "products": [{
                "name": "Coffee",
                "variants": [{
                    "name": "Fine 12oz", "price": 1800, "stock": 1,
                    "selection": { "size": "12oz", "grind": "fine", "roast": "dark" }
                }]
            }]
        }"#;
        let fixture = CatalogFixture::from_json(raw).unwrap();
        let keys: Vec<&str> = fixture.products[0].variants[0]
            .selection
            .keys()
            .map(String::as_str)
            .collect();
        assert_eq!(keys, ["size", "grind", "roast"]);
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(CatalogFixture::from_json("{ \"products\": 3 }").is_err());
    }
}
