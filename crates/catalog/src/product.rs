use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use storefront_core::{CatalogResult, Entity, ProductId};

use crate::normalize;

/// A product: the owner of options and variants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl Product {
    /// Build a validated product row from creation input.
    pub fn create(id: ProductId, input: &NewProduct, now: DateTime<Utc>) -> CatalogResult<Self> {
        Ok(Self {
            id,
            name: normalize::product_name(&input.name)?,
            active: input.active,
            created_at: now,
        })
    }

    /// Apply a partial update, validating any new name.
    pub fn apply(&mut self, patch: &ProductPatch) -> CatalogResult<()> {
        if let Some(name) = &patch.name {
            self.name = normalize::product_name(name)?;
        }
        if let Some(active) = patch.active {
            self.active = active;
        }
        Ok(())
    }
}

impl Entity for Product {
    type Id = ProductId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// Input for creating a product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewProduct {
    pub name: String,
    #[serde(default = "default_active")]
    pub active: bool,
}

impl NewProduct {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            active: true,
        }
    }
}

fn default_active() -> bool {
    true
}

/// Partial update of a product.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductPatch {
    pub name: Option<String>,
    pub active: Option<bool>,
}
