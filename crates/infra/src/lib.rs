//! Infrastructure layer: catalog stores, call context, configuration and the
//! catalog engine built on top of them.

pub mod catalog_store;
pub mod config;
pub mod context;
pub mod engine;

mod integration_tests;

pub use catalog_store::{CatalogStore, FaultPlan, InMemoryCatalogStore, PostgresCatalogStore};
pub use config::{CatalogConfig, ConfigError, EngineConfig, StoreConfig};
pub use context::{CallContext, CancelSignal};
pub use engine::{CatalogEngine, CreationSaga, CreationStep};
