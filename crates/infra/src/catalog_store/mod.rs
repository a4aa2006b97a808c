//! Catalog store abstraction and adapters.
//!
//! - [`InMemoryCatalogStore`]: tests/dev, one write lock per mutation.
//! - [`PostgresCatalogStore`]: persistent, constraints enforced by the schema.

pub mod in_memory;
pub mod postgres;
pub mod r#trait;

pub use in_memory::{FaultPlan, InMemoryCatalogStore};
pub use postgres::PostgresCatalogStore;
pub use r#trait::CatalogStore;
