use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use storefront_core::{CatalogError, CatalogResult, Entity, ErrorCode, ProductId, VariantId};

use crate::normalize;
use crate::selection::{CombinationKey, Selection, VariantOptionAssignment};

/// Variant lifecycle.
///
/// `Active → Archived` is the only transition and it is terminal. The
/// `active` flag on [`Variant`] is orthogonal: a deactivated variant is still
/// `Active` in this sense.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariantStatus {
    Active,
    Archived,
}

/// A concrete, purchasable SKU of a product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variant {
    pub id: VariantId,
    pub product_id: ProductId,
    pub name: String,
    /// Price in smallest currency unit (e.g., cents).
    pub price: u64,
    pub stock: u32,
    pub active: bool,
    pub is_subscription: bool,
    pub created_at: DateTime<Utc>,
    pub archived_at: Option<DateTime<Utc>>,
}

impl Variant {
    /// Build a validated, not-yet-assigned variant row.
    pub fn create(
        id: VariantId,
        product_id: ProductId,
        input: &NewVariant,
        now: DateTime<Utc>,
    ) -> CatalogResult<Self> {
        Ok(Self {
            id,
            product_id,
            name: normalize::variant_name(&input.name)?,
            price: input.price,
            stock: input.stock,
            active: input.active,
            is_subscription: input.is_subscription,
            created_at: now,
            archived_at: None,
        })
    }

    pub fn status(&self) -> VariantStatus {
        if self.archived_at.is_some() {
            VariantStatus::Archived
        } else {
            VariantStatus::Active
        }
    }

    pub fn is_archived(&self) -> bool {
        self.archived_at.is_some()
    }

    /// Non-archived and flagged active: visible to resolution and aggregation.
    pub fn is_purchasable(&self) -> bool {
        self.active && !self.is_archived()
    }

    pub fn in_stock(&self) -> bool {
        self.stock > 0
    }

    /// One-way transition to `Archived`.
    pub fn archive(&mut self, at: DateTime<Utc>) -> CatalogResult<()> {
        if self.is_archived() {
            return Err(CatalogError::conflict(
                ErrorCode::AlreadyArchived,
                format!("variant {} is already archived", self.id),
            ));
        }
        self.archived_at = Some(at);
        Ok(())
    }

    /// Apply a partial update. Archived variants are frozen.
    pub fn apply(&mut self, patch: &VariantPatch) -> CatalogResult<()> {
        if self.is_archived() {
            return Err(CatalogError::conflict(
                ErrorCode::VariantArchived,
                format!("variant {} is archived and cannot be updated", self.id),
            ));
        }
        if let Some(name) = &patch.name {
            self.name = normalize::variant_name(name)?;
        }
        if let Some(price) = patch.price {
            self.price = price;
        }
        if let Some(stock) = patch.stock {
            self.stock = stock;
        }
        if let Some(active) = patch.active {
            self.active = active;
        }
        if let Some(is_subscription) = patch.is_subscription {
            self.is_subscription = is_subscription;
        }
        Ok(())
    }
}

impl Entity for Variant {
    type Id = VariantId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// Input for creating a variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewVariant {
    pub name: String,
    pub price: u64,
    pub stock: u32,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default)]
    pub is_subscription: bool,
    #[serde(default)]
    pub selection: Selection,
}

impl NewVariant {
    pub fn new(name: impl Into<String>, price: u64, stock: u32) -> Self {
        Self {
            name: name.into(),
            price,
            stock,
            active: true,
            is_subscription: false,
            selection: Selection::new(),
        }
    }

    pub fn with_selection(mut self, selection: Selection) -> Self {
        self.selection = selection;
        self
    }

    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }

    pub fn subscription(mut self) -> Self {
        self.is_subscription = true;
        self
    }
}

fn default_true() -> bool {
    true
}

/// Partial update of a variant. Never touches assignments.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantPatch {
    pub name: Option<String>,
    pub price: Option<u64>,
    pub stock: Option<u32>,
    pub active: Option<bool>,
    pub is_subscription: Option<bool>,
}

/// A variant with its full assignment set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantWithAssignments {
    pub variant: Variant,
    pub assignments: Vec<VariantOptionAssignment>,
}

impl VariantWithAssignments {
    pub fn combination_key(&self) -> CombinationKey {
        CombinationKey::of_assignments(&self.assignments)
    }
}
