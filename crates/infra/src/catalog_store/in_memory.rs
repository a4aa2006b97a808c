use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};

use storefront_catalog::rules::{self, AssignmentCandidate};
use storefront_catalog::{
    CombinationKey, OptionValue, Product, ProductOption, Variant, VariantOptionAssignment,
    VariantPatch,
};
use storefront_core::{
    CatalogError, CatalogResult, Entity, ErrorCode, OptionId, OptionValueId, ProductId, TenantId,
    VariantId,
};

use super::r#trait::CatalogStore;

/// One tenant's rows. Each table is a `Vec` kept in insertion order, which is
/// the creation order every listing must return.
#[derive(Debug, Default)]
struct TenantCatalog {
    products: Vec<Product>,
    options: Vec<ProductOption>,
    values: Vec<OptionValue>,
    variants: Vec<Variant>,
    assignments: Vec<VariantOptionAssignment>,
}

fn find_row<'a, T: Entity>(table: &'a [T], id: &T::Id) -> Option<&'a T> {
    table.iter().find(|r| r.id() == id)
}

fn find_row_mut<'a, T: Entity>(table: &'a mut [T], id: &T::Id) -> Option<&'a mut T> {
    table.iter_mut().find(|r| r.id() == id)
}

impl TenantCatalog {
    fn product(&self, id: ProductId) -> Option<&Product> {
        find_row(&self.products, &id)
    }

    fn option(&self, id: OptionId) -> Option<&ProductOption> {
        find_row(&self.options, &id)
    }

    fn value(&self, id: OptionValueId) -> Option<&OptionValue> {
        find_row(&self.values, &id)
    }

    fn variant(&self, id: VariantId) -> Option<&Variant> {
        find_row(&self.variants, &id)
    }

    fn options_of(&self, product_id: ProductId) -> Vec<ProductOption> {
        self.options
            .iter()
            .filter(|o| o.product_id == product_id)
            .cloned()
            .collect()
    }

    fn values_of(&self, option_id: OptionId) -> Vec<OptionValue> {
        self.values
            .iter()
            .filter(|v| v.option_id == option_id)
            .cloned()
            .collect()
    }

    fn variants_of(&self, product_id: ProductId) -> Vec<Variant> {
        self.variants
            .iter()
            .filter(|v| v.product_id == product_id)
            .cloned()
            .collect()
    }

    fn assignments_of(&self, variant_id: VariantId) -> Vec<VariantOptionAssignment> {
        self.assignments
            .iter()
            .filter(|a| a.variant_id == variant_id)
            .copied()
            .collect()
    }

    fn option_count(&self, product_id: ProductId) -> usize {
        self.options
            .iter()
            .filter(|o| o.product_id == product_id)
            .count()
    }

    fn live_usage(&self, value_id: OptionValueId) -> usize {
        self.assignments
            .iter()
            .filter(|a| a.option_value_id == value_id)
            .filter(|a| self.variant(a.variant_id).is_some_and(|v| !v.is_archived()))
            .count()
    }

    /// Keys of the product's non-archived variants whose set is complete.
    fn live_keys(&self, product_id: ProductId, option_count: usize) -> Vec<(VariantId, CombinationKey)> {
        self.variants
            .iter()
            .filter(|v| v.product_id == product_id && !v.is_archived())
            .filter_map(|v| {
                rules::completed_key(&self.assignments_of(v.id), option_count).map(|k| (v.id, k))
            })
            .collect()
    }
}

/// Deterministic failure hooks for exercising compensation and cancellation.
#[derive(Debug, Clone, Default)]
pub struct FaultPlan {
    /// Fail the n-th (0-based) assignment insert with a store error.
    pub fail_assignment_at: Option<usize>,
    /// Fail every `discard_variant` call with a store error.
    pub fail_discard: bool,
    /// Sleep before every assignment insert.
    pub assignment_delay: Option<Duration>,
}

/// In-memory catalog store.
///
/// Intended for tests/dev. A single write lock makes every mutation atomic, so
/// invariants are checked and applied in one critical section.
#[derive(Debug, Default)]
pub struct InMemoryCatalogStore {
    tenants: RwLock<HashMap<TenantId, TenantCatalog>>,
    faults: Mutex<FaultPlan>,
    assignment_inserts: AtomicUsize,
}

fn poisoned() -> CatalogError {
    CatalogError::store("lock poisoned")
}

fn product_not_found(id: ProductId) -> CatalogError {
    CatalogError::not_found(ErrorCode::ProductNotFound, format!("product {id} not found"))
}

fn option_not_found(id: OptionId) -> CatalogError {
    CatalogError::not_found(ErrorCode::OptionNotFound, format!("option {id} not found"))
}

fn value_not_found(id: OptionValueId) -> CatalogError {
    CatalogError::not_found(
        ErrorCode::OptionValueNotFound,
        format!("option value {id} not found"),
    )
}

fn variant_not_found(id: VariantId) -> CatalogError {
    CatalogError::not_found(ErrorCode::VariantNotFound, format!("variant {id} not found"))
}

impl InMemoryCatalogStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store that misbehaves according to `plan`.
    pub fn with_faults(plan: FaultPlan) -> Self {
        Self {
            faults: Mutex::new(plan),
            ..Self::default()
        }
    }

    pub fn set_faults(&self, plan: FaultPlan) -> CatalogResult<()> {
        *self.faults.lock().map_err(|_| poisoned())? = plan;
        Ok(())
    }

    fn faults(&self) -> CatalogResult<FaultPlan> {
        Ok(self.faults.lock().map_err(|_| poisoned())?.clone())
    }

    fn read<T>(&self, tenant_id: TenantId, f: impl FnOnce(&TenantCatalog) -> T) -> CatalogResult<T> {
        let tenants = self.tenants.read().map_err(|_| poisoned())?;
        match tenants.get(&tenant_id) {
            Some(catalog) => Ok(f(catalog)),
            None => Ok(f(&TenantCatalog::default())),
        }
    }

    fn write<T>(
        &self,
        tenant_id: TenantId,
        f: impl FnOnce(&mut TenantCatalog) -> CatalogResult<T>,
    ) -> CatalogResult<T> {
        let mut tenants = self.tenants.write().map_err(|_| poisoned())?;
        f(tenants.entry(tenant_id).or_default())
    }
}

#[async_trait::async_trait]
impl CatalogStore for InMemoryCatalogStore {
    async fn insert_product(&self, tenant_id: TenantId, product: Product) -> CatalogResult<Product> {
        self.write(tenant_id, |c| {
            if c.product(product.id).is_some() {
                return Err(CatalogError::store(format!(
                    "product {} already exists",
                    product.id
                )));
            }
            c.products.push(product.clone());
            Ok(product)
        })
    }

    async fn get_product(&self, tenant_id: TenantId, id: ProductId) -> CatalogResult<Option<Product>> {
        self.read(tenant_id, |c| c.product(id).cloned())
    }

    async fn update_product(&self, tenant_id: TenantId, product: Product) -> CatalogResult<Product> {
        self.write(tenant_id, |c| {
            let row = find_row_mut(&mut c.products, &product.id)
                .ok_or_else(|| product_not_found(product.id))?;
            row.name = product.name;
            row.active = product.active;
            Ok(row.clone())
        })
    }

    async fn delete_product(&self, tenant_id: TenantId, id: ProductId) -> CatalogResult<()> {
        self.write(tenant_id, |c| {
            if c.product(id).is_none() {
                return Err(product_not_found(id));
            }
            let variants = c.variants.iter().filter(|v| v.product_id == id).count();
            if variants > 0 {
                return Err(CatalogError::conflict(
                    ErrorCode::HasVariants,
                    format!("product {id} still has {variants} variant(s)"),
                ));
            }
            let options = c.option_count(id);
            if options > 0 {
                return Err(CatalogError::conflict(
                    ErrorCode::HasOptions,
                    format!("product {id} still has {options} option(s)"),
                ));
            }
            c.products.retain(|p| p.id != id);
            Ok(())
        })
    }

    async fn insert_option(
        &self,
        tenant_id: TenantId,
        option: ProductOption,
    ) -> CatalogResult<ProductOption> {
        self.write(tenant_id, |c| {
            if c.product(option.product_id).is_none() {
                return Err(product_not_found(option.product_id));
            }
            rules::ensure_option_can_be_added(option.product_id, &c.variants_of(option.product_id))?;
            rules::ensure_unique_option_key(&option.key, &c.options_of(option.product_id), None)?;
            c.options.push(option.clone());
            Ok(option)
        })
    }

    async fn get_option(&self, tenant_id: TenantId, id: OptionId) -> CatalogResult<Option<ProductOption>> {
        self.read(tenant_id, |c| c.option(id).cloned())
    }

    async fn list_options(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
    ) -> CatalogResult<Vec<ProductOption>> {
        self.read(tenant_id, |c| c.options_of(product_id))
    }

    async fn update_option(
        &self,
        tenant_id: TenantId,
        option: ProductOption,
    ) -> CatalogResult<ProductOption> {
        self.write(tenant_id, |c| {
            let product_id = c
                .option(option.id)
                .map(|o| o.product_id)
                .ok_or_else(|| option_not_found(option.id))?;
            rules::ensure_unique_option_key(&option.key, &c.options_of(product_id), Some(option.id))?;
            let row = find_row_mut(&mut c.options, &option.id)
                .ok_or_else(|| option_not_found(option.id))?;
            row.key = option.key;
            Ok(row.clone())
        })
    }

    async fn delete_option(&self, tenant_id: TenantId, id: OptionId) -> CatalogResult<()> {
        self.write(tenant_id, |c| {
            if c.option(id).is_none() {
                return Err(option_not_found(id));
            }
            let values = c.values.iter().filter(|v| v.option_id == id).count();
            if values > 0 {
                return Err(CatalogError::conflict(
                    ErrorCode::HasOptionValues,
                    format!("option {id} still has {values} value(s)"),
                ));
            }
            c.options.retain(|o| o.id != id);
            Ok(())
        })
    }

    async fn insert_value(&self, tenant_id: TenantId, value: OptionValue) -> CatalogResult<OptionValue> {
        self.write(tenant_id, |c| {
            if c.option(value.option_id).is_none() {
                return Err(option_not_found(value.option_id));
            }
            rules::ensure_unique_option_value(&value.value, &c.values_of(value.option_id), None)?;
            c.values.push(value.clone());
            Ok(value)
        })
    }

    async fn get_value(
        &self,
        tenant_id: TenantId,
        id: OptionValueId,
    ) -> CatalogResult<Option<OptionValue>> {
        self.read(tenant_id, |c| c.value(id).cloned())
    }

    async fn list_values(&self, tenant_id: TenantId, option_id: OptionId) -> CatalogResult<Vec<OptionValue>> {
        self.read(tenant_id, |c| c.values_of(option_id))
    }

    async fn list_product_values(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
    ) -> CatalogResult<Vec<OptionValue>> {
        self.read(tenant_id, |c| {
            c.options_of(product_id)
                .iter()
                .flat_map(|o| c.values_of(o.id))
                .collect()
        })
    }

    async fn update_value(&self, tenant_id: TenantId, value: OptionValue) -> CatalogResult<OptionValue> {
        self.write(tenant_id, |c| {
            let option_id = c
                .value(value.id)
                .map(|v| v.option_id)
                .ok_or_else(|| value_not_found(value.id))?;
            rules::ensure_unique_option_value(&value.value, &c.values_of(option_id), Some(value.id))?;
            let row = find_row_mut(&mut c.values, &value.id)
                .ok_or_else(|| value_not_found(value.id))?;
            row.value = value.value;
            Ok(row.clone())
        })
    }

    async fn delete_value(&self, tenant_id: TenantId, id: OptionValueId) -> CatalogResult<()> {
        self.write(tenant_id, |c| {
            if c.value(id).is_none() {
                return Err(value_not_found(id));
            }
            let usage = c.live_usage(id);
            if usage > 0 {
                return Err(CatalogError::conflict(
                    ErrorCode::OptionValueInUse,
                    format!("option value {id} is used by {usage} variant(s)"),
                ));
            }
            c.assignments.retain(|a| a.option_value_id != id);
            c.values.retain(|v| v.id != id);
            Ok(())
        })
    }

    async fn count_option_values(&self, tenant_id: TenantId, option_id: OptionId) -> CatalogResult<u64> {
        self.read(tenant_id, |c| {
            c.values.iter().filter(|v| v.option_id == option_id).count() as u64
        })
    }

    async fn count_value_usage(&self, tenant_id: TenantId, value_id: OptionValueId) -> CatalogResult<u64> {
        self.read(tenant_id, |c| c.live_usage(value_id) as u64)
    }

    async fn count_options(&self, tenant_id: TenantId, product_id: ProductId) -> CatalogResult<u64> {
        self.read(tenant_id, |c| c.option_count(product_id) as u64)
    }

    async fn count_variants(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
        include_archived: bool,
    ) -> CatalogResult<u64> {
        self.read(tenant_id, |c| {
            c.variants
                .iter()
                .filter(|v| v.product_id == product_id)
                .filter(|v| include_archived || !v.is_archived())
                .count() as u64
        })
    }

    async fn insert_variant(&self, tenant_id: TenantId, variant: Variant) -> CatalogResult<Variant> {
        self.write(tenant_id, |c| {
            if c.product(variant.product_id).is_none() {
                return Err(product_not_found(variant.product_id));
            }
            rules::ensure_unique_variant_name(&variant.name, &c.variants_of(variant.product_id), None)?;

            // Zero options: the empty set is already complete.
            if c.option_count(variant.product_id) == 0 {
                let others = c.live_keys(variant.product_id, 0);
                rules::ensure_unique_combination(
                    &CombinationKey::default(),
                    variant.id,
                    others.iter().map(|(id, k)| (*id, k)),
                )?;
            }

            c.variants.push(variant.clone());
            Ok(variant)
        })
    }

    async fn get_variant(&self, tenant_id: TenantId, id: VariantId) -> CatalogResult<Option<Variant>> {
        self.read(tenant_id, |c| c.variant(id).cloned())
    }

    async fn list_variants(&self, tenant_id: TenantId, product_id: ProductId) -> CatalogResult<Vec<Variant>> {
        self.read(tenant_id, |c| c.variants_of(product_id))
    }

    async fn update_variant(
        &self,
        tenant_id: TenantId,
        id: VariantId,
        patch: VariantPatch,
    ) -> CatalogResult<Variant> {
        self.write(tenant_id, |c| {
            let mut updated = c.variant(id).ok_or_else(|| variant_not_found(id))?.clone();
            updated.apply(&patch)?;
            if patch.name.is_some() {
                rules::ensure_unique_variant_name(&updated.name, &c.variants_of(updated.product_id), Some(id))?;
            }

            let row = find_row_mut(&mut c.variants, &id)
                .ok_or_else(|| variant_not_found(id))?;
            *row = updated;
            Ok(row.clone())
        })
    }

    async fn archive_variant(
        &self,
        tenant_id: TenantId,
        id: VariantId,
        at: DateTime<Utc>,
    ) -> CatalogResult<Variant> {
        self.write(tenant_id, |c| {
            let row = find_row_mut(&mut c.variants, &id)
                .ok_or_else(|| variant_not_found(id))?;
            row.archive(at)?;
            Ok(row.clone())
        })
    }

    async fn discard_variant(
        &self,
        tenant_id: TenantId,
        id: VariantId,
        at: DateTime<Utc>,
    ) -> CatalogResult<()> {
        if self.faults()?.fail_discard {
            return Err(CatalogError::store(format!("injected failure discarding variant {id}")));
        }
        self.write(tenant_id, |c| {
            let row = find_row_mut(&mut c.variants, &id)
                .ok_or_else(|| variant_not_found(id))?;
            if !row.is_archived() {
                row.archived_at = Some(at);
            }
            c.assignments.retain(|a| a.variant_id != id);
            Ok(())
        })
    }

    async fn insert_assignment(
        &self,
        tenant_id: TenantId,
        assignment: VariantOptionAssignment,
    ) -> CatalogResult<VariantOptionAssignment> {
        let faults = self.faults()?;
        let nth = self.assignment_inserts.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = faults.assignment_delay {
            tokio::time::sleep(delay).await;
        }
        if faults.fail_assignment_at == Some(nth) {
            return Err(CatalogError::store(format!(
                "injected failure on assignment insert #{nth}"
            )));
        }

        self.write(tenant_id, |c| {
            let variant = c
                .variant(assignment.variant_id)
                .ok_or_else(|| variant_not_found(assignment.variant_id))?;
            let value = c
                .value(assignment.option_value_id)
                .ok_or_else(|| value_not_found(assignment.option_value_id))?;
            let existing = c.assignments_of(variant.id);
            let option_count = c.option_count(variant.product_id);

            rules::validate_assignment(AssignmentCandidate {
                variant,
                option: c.option(assignment.option_id),
                stated_option_id: assignment.option_id,
                value,
                existing: &existing,
                option_count,
            })?;

            let mut next = existing;
            next.push(assignment);
            if let Some(key) = rules::completed_key(&next, option_count) {
                let others = c.live_keys(variant.product_id, option_count);
                rules::ensure_unique_combination(
                    &key,
                    variant.id,
                    others.iter().map(|(id, k)| (*id, k)),
                )?;
            }

            c.assignments.push(assignment);
            Ok(assignment)
        })
    }

    async fn list_assignments(
        &self,
        tenant_id: TenantId,
        variant_id: VariantId,
    ) -> CatalogResult<Vec<VariantOptionAssignment>> {
        self.read(tenant_id, |c| c.assignments_of(variant_id))
    }

    async fn list_product_assignments(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
    ) -> CatalogResult<Vec<VariantOptionAssignment>> {
        self.read(tenant_id, |c| {
            c.assignments
                .iter()
                .filter(|a| c.variant(a.variant_id).is_some_and(|v| v.product_id == product_id))
                .copied()
                .collect()
        })
    }
}
