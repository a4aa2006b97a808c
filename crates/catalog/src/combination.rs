//! Combination resolution over a snapshot of a product's catalog rows.
//!
//! The engine loads variants, options, values and assignments from the store
//! and hands them here; everything in this module is deterministic given that
//! snapshot.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use storefront_core::{CatalogError, CatalogResult, ErrorCode, OptionId, OptionValueId, VariantId};

use crate::option::{OptionValue, ProductOption};
use crate::selection::{CombinationKey, Selection, VariantOptionAssignment};
use crate::variant::Variant;

/// Customer-facing picker entry: an option and the values some purchasable
/// variant actually uses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailableOption {
    pub option_id: OptionId,
    pub key: String,
    pub values: Vec<OptionValue>,
}

/// A purchasable assignment set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Combination {
    pub variant_id: VariantId,
    /// Entries ordered by option id.
    pub selection: Selection,
}

/// Group assignments by the variant that owns them.
pub fn assignments_by_variant(
    assignments: &[VariantOptionAssignment],
) -> HashMap<VariantId, Vec<VariantOptionAssignment>> {
    let mut grouped: HashMap<VariantId, Vec<VariantOptionAssignment>> = HashMap::new();
    for a in assignments {
        grouped.entry(a.variant_id).or_default().push(*a);
    }
    grouped
}

/// Find the one purchasable variant whose assignment set has exactly `key`.
///
/// More than one match means the combination-uniqueness invariant is broken;
/// that is reported as [`CatalogError::DataIntegrity`] instead of picking one.
pub fn resolve<'a>(
    variants: &'a [Variant],
    assignments: &[VariantOptionAssignment],
    key: &CombinationKey,
) -> CatalogResult<&'a Variant> {
    let grouped = assignments_by_variant(assignments);
    let empty = Vec::new();

    let matches: Vec<&Variant> = variants
        .iter()
        .filter(|v| v.is_purchasable())
        .filter(|v| {
            let set = grouped.get(&v.id).unwrap_or(&empty);
            CombinationKey::of_assignments(set) == *key
        })
        .collect();

    match matches.as_slice() {
        [] => Err(CatalogError::not_found(
            ErrorCode::VariantNotFound,
            format!("no purchasable variant matches combination {key}"),
        )),
        [single] => Ok(*single),
        many => Err(CatalogError::data_integrity(format!(
            "{} variants share combination {key}: {}",
            many.len(),
            many.iter()
                .map(|v| v.id.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        ))),
    }
}

/// For each option (in the given order), the values used by at least one
/// purchasable variant, in the given value order.
pub fn available_options(
    options: &[ProductOption],
    values: &[OptionValue],
    variants: &[Variant],
    assignments: &[VariantOptionAssignment],
) -> Vec<AvailableOption> {
    let purchasable: HashSet<VariantId> = variants
        .iter()
        .filter(|v| v.is_purchasable())
        .map(|v| v.id)
        .collect();
    let used: HashSet<OptionValueId> = assignments
        .iter()
        .filter(|a| purchasable.contains(&a.variant_id))
        .map(|a| a.option_value_id)
        .collect();

    options
        .iter()
        .map(|option| AvailableOption {
            option_id: option.id,
            key: option.key.clone(),
            values: values
                .iter()
                .filter(|v| v.option_id == option.id && used.contains(&v.id))
                .cloned()
                .collect(),
        })
        .collect()
}

/// Distinct assignment sets of purchasable, in-stock variants, in variant order.
pub fn in_stock_combinations(
    variants: &[Variant],
    assignments: &[VariantOptionAssignment],
) -> Vec<Combination> {
    let grouped = assignments_by_variant(assignments);
    let mut seen: HashSet<CombinationKey> = HashSet::new();
    let mut out = Vec::new();

    for variant in variants.iter().filter(|v| v.is_purchasable() && v.in_stock()) {
        let set = grouped.get(&variant.id).map(Vec::as_slice).unwrap_or(&[]);
        let key = CombinationKey::of_assignments(set);
        if !seen.insert(key) {
            continue;
        }
        let selection: Selection = set.iter().map(|a| a.entry()).collect();
        out.push(Combination {
            variant_id: variant.id,
            selection: selection.canonical(),
        });
    }
    out
}
