use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use storefront_core::{CatalogResult, Entity, OptionId, OptionValueId, ProductId};

use crate::normalize;

/// A named configurable dimension of a product (e.g. "size").
///
/// `key` is always stored normalized (trimmed, lower-case).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductOption {
    pub id: OptionId,
    pub product_id: ProductId,
    pub key: String,
    pub created_at: DateTime<Utc>,
}

impl ProductOption {
    pub fn create(
        id: OptionId,
        product_id: ProductId,
        raw_key: &str,
        now: DateTime<Utc>,
    ) -> CatalogResult<Self> {
        Ok(Self {
            id,
            product_id,
            key: normalize::option_key(raw_key)?,
            created_at: now,
        })
    }

    pub fn rename(&mut self, raw_key: &str) -> CatalogResult<()> {
        self.key = normalize::option_key(raw_key)?;
        Ok(())
    }
}

impl Entity for ProductOption {
    type Id = OptionId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// One discrete choice of an option (e.g. "12oz").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionValue {
    pub id: OptionValueId,
    pub option_id: OptionId,
    pub value: String,
    pub created_at: DateTime<Utc>,
}

impl OptionValue {
    pub fn create(
        id: OptionValueId,
        option_id: OptionId,
        raw_value: &str,
        now: DateTime<Utc>,
    ) -> CatalogResult<Self> {
        Ok(Self {
            id,
            option_id,
            value: normalize::option_value(raw_value)?,
            created_at: now,
        })
    }

    pub fn relabel(&mut self, raw_value: &str) -> CatalogResult<()> {
        self.value = normalize::option_value(raw_value)?;
        Ok(())
    }

    /// Whether two values collide under the per-option uniqueness rule.
    pub fn same_text(&self, other: &str) -> bool {
        normalize::identity(&self.value) == normalize::identity(other)
    }
}

impl Entity for OptionValue {
    type Id = OptionValueId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// An option together with all of its values, in creation order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionWithValues {
    pub option: ProductOption,
    pub values: Vec<OptionValue>,
}
