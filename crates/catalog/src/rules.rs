//! Catalog invariants as pure checks.
//!
//! Every store adapter runs these inside its own atomic section (write lock or
//! SQL transaction); the engine runs the same checks up front to fail early
//! with the same codes. Only the store's run is authoritative.

use storefront_core::{
    CatalogError, CatalogResult, ErrorCode, OptionId, OptionValueId, ProductId, VariantId,
};

use crate::normalize;
use crate::option::{OptionValue, ProductOption};
use crate::selection::{CombinationKey, VariantOptionAssignment};
use crate::variant::Variant;

/// Option keys are unique per product (keys are stored normalized).
pub fn ensure_unique_option_key(
    key: &str,
    siblings: &[ProductOption],
    exclude: Option<OptionId>,
) -> CatalogResult<()> {
    let clash = siblings
        .iter()
        .filter(|o| Some(o.id) != exclude)
        .any(|o| o.key == key);
    if clash {
        return Err(CatalogError::conflict(
            ErrorCode::OptionKeyConflict,
            format!("option '{key}' already exists for this product"),
        ));
    }
    Ok(())
}

/// Option values are unique per option, compared case-insensitively.
pub fn ensure_unique_option_value(
    value: &str,
    siblings: &[OptionValue],
    exclude: Option<OptionValueId>,
) -> CatalogResult<()> {
    let clash = siblings
        .iter()
        .filter(|v| Some(v.id) != exclude)
        .any(|v| v.same_text(value));
    if clash {
        return Err(CatalogError::conflict(
            ErrorCode::OptionValueConflict,
            format!("value '{value}' already exists for this option"),
        ));
    }
    Ok(())
}

/// Variant names are unique among the product's non-archived variants.
pub fn ensure_unique_variant_name(
    name: &str,
    siblings: &[Variant],
    exclude: Option<VariantId>,
) -> CatalogResult<()> {
    let wanted = normalize::identity(name);
    let clash = siblings
        .iter()
        .filter(|v| !v.is_archived() && Some(v.id) != exclude)
        .any(|v| normalize::identity(&v.name) == wanted);
    if clash {
        return Err(CatalogError::conflict(
            ErrorCode::VariantNameConflict,
            format!("a variant named '{name}' already exists for this product"),
        ));
    }
    Ok(())
}

/// Adding an option would leave every existing variant one assignment short,
/// so options can only be added while the product has no live variants.
pub fn ensure_option_can_be_added(product_id: ProductId, variants: &[Variant]) -> CatalogResult<()> {
    let live = variants.iter().filter(|v| !v.is_archived()).count();
    if live > 0 {
        return Err(CatalogError::conflict(
            ErrorCode::HasVariants,
            format!(
                "product {product_id} has {live} non-archived variant(s); archive them before adding options"
            ),
        ));
    }
    Ok(())
}

/// Everything the store knows when a single assignment is about to be written.
#[derive(Debug, Clone, Copy)]
pub struct AssignmentCandidate<'a> {
    pub variant: &'a Variant,
    /// The stated option, if it exists at all.
    pub option: Option<&'a ProductOption>,
    pub stated_option_id: OptionId,
    pub value: &'a OptionValue,
    /// Assignments the variant already has.
    pub existing: &'a [VariantOptionAssignment],
    /// Number of options the variant's product currently has.
    pub option_count: usize,
}

/// Validate one assignment against invariants 1 and 2.
pub fn validate_assignment(candidate: AssignmentCandidate<'_>) -> CatalogResult<()> {
    let AssignmentCandidate {
        variant,
        option,
        stated_option_id,
        value,
        existing,
        option_count,
    } = candidate;

    if variant.is_archived() {
        return Err(CatalogError::conflict(
            ErrorCode::VariantArchived,
            format!("variant {} is archived", variant.id),
        ));
    }

    let option = match option {
        Some(o) if o.product_id == variant.product_id => o,
        _ => {
            return Err(CatalogError::invalid_combination(
                ErrorCode::InvalidOptionCombination,
                format!(
                    "option {stated_option_id} is not an option of product {}",
                    variant.product_id
                ),
            ));
        }
    };

    if value.option_id != option.id {
        return Err(CatalogError::invalid_combination(
            ErrorCode::InvalidOptionCombination,
            format!("value '{}' does not belong to option '{}'", value.value, option.key),
        ));
    }

    if existing.iter().any(|a| a.option_id == option.id) {
        return Err(CatalogError::invalid_combination(
            ErrorCode::InvalidOptionCombination,
            format!("variant {} already has a value for option '{}'", variant.id, option.key),
        ));
    }

    if existing.len() >= option_count {
        return Err(CatalogError::invalid_combination(
            ErrorCode::InvalidOptionCombination,
            format!(
                "variant {} already has {} assignment(s) for {option_count} option(s)",
                variant.id,
                existing.len()
            ),
        ));
    }

    Ok(())
}

/// The combination key once an assignment set covers every option, else `None`.
pub fn completed_key(
    assignments: &[VariantOptionAssignment],
    option_count: usize,
) -> Option<CombinationKey> {
    (assignments.len() == option_count).then(|| CombinationKey::of_assignments(assignments))
}

/// No two non-archived variants of a product may share a combination.
///
/// `others` yields the keys of the product's other non-archived, complete
/// variants.
pub fn ensure_unique_combination<'a>(
    key: &CombinationKey,
    variant_id: VariantId,
    others: impl IntoIterator<Item = (VariantId, &'a CombinationKey)>,
) -> CatalogResult<()> {
    let duplicate = others
        .into_iter()
        .find(|(id, other)| *id != variant_id && *other == key);
    if let Some((other_id, _)) = duplicate {
        return Err(CatalogError::invalid_combination(
            ErrorCode::DuplicateCombination,
            format!("variant {other_id} already uses combination {key}"),
        ));
    }
    Ok(())
}

/// After a selection has been applied, the variant must cover every option.
pub fn ensure_complete(assigned: usize, option_count: usize) -> CatalogResult<()> {
    if assigned != option_count {
        return Err(CatalogError::invalid_combination(
            ErrorCode::IncompleteOptionSet,
            format!("selection covers {assigned} of {option_count} option(s)"),
        ));
    }
    Ok(())
}
