//! Catalog domain module: products, options, variants and their combinations.
//!
//! This crate contains the business rules of the variant configuration engine,
//! implemented purely as deterministic domain logic (no IO, no storage). The
//! store adapters and the engine in `storefront-infra` call into these rules so
//! that a constraint rejected by the store and one caught by an engine
//! pre-check produce the same error.

pub mod combination;
pub mod normalize;
pub mod option;
pub mod product;
pub mod rules;
pub mod selection;
pub mod summary;
pub mod variant;

pub use combination::{AvailableOption, Combination};
pub use option::{OptionValue, OptionWithValues, ProductOption};
pub use product::{NewProduct, Product, ProductPatch};
pub use selection::{CombinationKey, Selection, SelectionEntry, VariantOptionAssignment};
pub use summary::{DEFAULT_LOW_STOCK_THRESHOLD, ProductSummary, StockStatus};
pub use variant::{NewVariant, Variant, VariantPatch, VariantStatus, VariantWithAssignments};
