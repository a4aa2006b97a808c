//! `storefront-core`: catalog foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! typed identifiers, the catalog error taxonomy, and the `Entity` trait the
//! stores look rows up by.

pub mod entity;
pub mod error;
pub mod id;

pub use entity::Entity;
pub use error::{CatalogError, CatalogResult, ErrorCode, ErrorKind};
pub use id::{OptionId, OptionValueId, ProductId, TenantId, VariantId};
