//! Catalog error model.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type used across the catalog crates.
pub type CatalogResult<T> = Result<T, CatalogError>;

/// Broad failure category.
///
/// Handlers branch on the kind to pick a transport status; the [`ErrorCode`]
/// carries the precise reason.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed or empty-after-trim input. Caller's fault, never retried.
    InvalidInput,
    /// A referenced product/option/value/variant does not exist.
    NotFound,
    /// Uniqueness violation or a referential-guard block.
    Conflict,
    /// An assignment set is incomplete, over-complete, crosses options or
    /// duplicates another variant's combination.
    InvalidCombination,
    /// An invariant the catalog relies on was found violated at read time.
    DataIntegrity,
    /// The backing store failed for reasons unrelated to catalog rules.
    Store,
    /// The caller's deadline passed or its cancel signal fired.
    Cancelled,
}

/// Stable, machine-readable error code.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InvalidInput,
    ProductNotFound,
    OptionNotFound,
    OptionValueNotFound,
    VariantNotFound,
    OptionKeyConflict,
    OptionValueConflict,
    VariantNameConflict,
    HasVariants,
    HasOptions,
    HasOptionValues,
    OptionValueInUse,
    AlreadyArchived,
    VariantArchived,
    IncompleteOptionSet,
    InvalidOptionCombination,
    DuplicateCombination,
    DataIntegrity,
    StoreError,
    Cancelled,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidInput => "INVALID_INPUT",
            ErrorCode::ProductNotFound => "PRODUCT_NOT_FOUND",
            ErrorCode::OptionNotFound => "OPTION_NOT_FOUND",
            ErrorCode::OptionValueNotFound => "OPTION_VALUE_NOT_FOUND",
            ErrorCode::VariantNotFound => "VARIANT_NOT_FOUND",
            ErrorCode::OptionKeyConflict => "OPTION_KEY_CONFLICT",
            ErrorCode::OptionValueConflict => "OPTION_VALUE_CONFLICT",
            ErrorCode::VariantNameConflict => "VARIANT_NAME_CONFLICT",
            ErrorCode::HasVariants => "HAS_VARIANTS",
            ErrorCode::HasOptions => "HAS_OPTIONS",
            ErrorCode::HasOptionValues => "HAS_OPTION_VALUES",
            ErrorCode::OptionValueInUse => "OPTION_VALUE_IN_USE",
            ErrorCode::AlreadyArchived => "ALREADY_ARCHIVED",
            ErrorCode::VariantArchived => "VARIANT_ARCHIVED",
            ErrorCode::IncompleteOptionSet => "INCOMPLETE_OPTION_SET",
            ErrorCode::InvalidOptionCombination => "INVALID_OPTION_COMBINATION",
            ErrorCode::DuplicateCombination => "DUPLICATE_COMBINATION",
            ErrorCode::DataIntegrity => "DATA_INTEGRITY",
            ErrorCode::StoreError => "STORE_ERROR",
            ErrorCode::Cancelled => "CANCELLED",
        }
    }
}

impl core::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Catalog-level error.
///
/// Shared by the pure rules in `storefront-catalog`, the store adapters and
/// the engine, so a constraint rejected by the store surfaces with the same
/// code as the engine's own pre-check.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CatalogError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("{code}: {message}")]
    NotFound { code: ErrorCode, message: String },

    #[error("{code}: {message}")]
    Conflict { code: ErrorCode, message: String },

    #[error("{code}: {message}")]
    InvalidCombination { code: ErrorCode, message: String },

    #[error("data integrity violation: {0}")]
    DataIntegrity(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("cancelled: {0}")]
    Cancelled(String),
}

impl CatalogError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn not_found(code: ErrorCode, msg: impl Into<String>) -> Self {
        Self::NotFound {
            code,
            message: msg.into(),
        }
    }

    pub fn conflict(code: ErrorCode, msg: impl Into<String>) -> Self {
        Self::Conflict {
            code,
            message: msg.into(),
        }
    }

    pub fn invalid_combination(code: ErrorCode, msg: impl Into<String>) -> Self {
        Self::InvalidCombination {
            code,
            message: msg.into(),
        }
    }

    pub fn data_integrity(msg: impl Into<String>) -> Self {
        Self::DataIntegrity(msg.into())
    }

    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    pub fn cancelled(msg: impl Into<String>) -> Self {
        Self::Cancelled(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            CatalogError::InvalidInput(_) => ErrorKind::InvalidInput,
            CatalogError::NotFound { .. } => ErrorKind::NotFound,
            CatalogError::Conflict { .. } => ErrorKind::Conflict,
            CatalogError::InvalidCombination { .. } => ErrorKind::InvalidCombination,
            CatalogError::DataIntegrity(_) => ErrorKind::DataIntegrity,
            CatalogError::Store(_) => ErrorKind::Store,
            CatalogError::Cancelled(_) => ErrorKind::Cancelled,
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            CatalogError::InvalidInput(_) => ErrorCode::InvalidInput,
            CatalogError::NotFound { code, .. }
            | CatalogError::Conflict { code, .. }
            | CatalogError::InvalidCombination { code, .. } => *code,
            CatalogError::DataIntegrity(_) => ErrorCode::DataIntegrity,
            CatalogError::Store(_) => ErrorCode::StoreError,
            CatalogError::Cancelled(_) => ErrorCode::Cancelled,
        }
    }

    /// Human-readable message without the code prefix.
    pub fn message(&self) -> &str {
        match self {
            CatalogError::InvalidInput(m)
            | CatalogError::DataIntegrity(m)
            | CatalogError::Store(m)
            | CatalogError::Cancelled(m) => m,
            CatalogError::NotFound { message, .. }
            | CatalogError::Conflict { message, .. }
            | CatalogError::InvalidCombination { message, .. } => message,
        }
    }

    /// Suggested HTTP status for handlers that do not carry their own mapping.
    pub fn http_status(&self) -> u16 {
        match self.kind() {
            ErrorKind::InvalidInput | ErrorKind::InvalidCombination => 400,
            ErrorKind::NotFound => 404,
            ErrorKind::Conflict => 409,
            ErrorKind::Cancelled => 499,
            ErrorKind::DataIntegrity | ErrorKind::Store => 500,
        }
    }
}
