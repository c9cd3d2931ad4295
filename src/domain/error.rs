use std::time::Duration;

use thiserror::Error;

use crate::domain::models::TenantId;

/// Structural problems with an uploaded file. The user has to fix the file;
/// resubmitting the same payload will fail the same way.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SheetError {
    #[error("File too large: {size} bytes (max {limit} bytes)")]
    FileTooLarge { size: usize, limit: usize },

    #[error("Unsupported file type: {0}")]
    UnsupportedFormat(String),

    #[error("Sheet named \"{expected}\" not found")]
    SheetNotFound { expected: String },

    #[error("Column \"{column}\" not found in sheet \"{sheet}\"")]
    ColumnNotFound { sheet: String, column: String },

    #[error("Column \"{column}\" is ambiguous in sheet \"{sheet}\": matches {candidates:?}")]
    AmbiguousColumn {
        sheet: String,
        column: String,
        candidates: Vec<String>,
    },

    #[error("Sheet \"{0}\" is empty")]
    EmptySheet(String),

    #[error("Failed to parse file: {0}")]
    Malformed(String),
}

#[derive(Debug, Error)]
pub enum IngestionError {
    #[error("Unauthorized")]
    Unauthorized,

    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Sheet(#[from] SheetError),

    #[error("Customer {0} not found")]
    TenantNotFound(TenantId),

    #[error("PNR(s) already exist for different company: {}", identifiers.join(", "))]
    CrossTenantConflict { identifiers: Vec<String> },

    #[error("Unique constraint violated: {0}")]
    UniqueConflict(String),

    #[error("Transaction exceeded its {0:?} budget")]
    TransactionTimeout(Duration),

    #[error("Transient database error: {0}")]
    Transient(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

impl IngestionError {
    /// Whether the caller may resubmit the same payload unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            IngestionError::TransactionTimeout(_) | IngestionError::Transient(_)
        )
    }
}

#[derive(Debug, Error)]
pub enum ComparatorError {
    #[error(transparent)]
    Sheet(#[from] SheetError),

    #[error("Too many master files: {count} (max {limit})")]
    TooManyFiles { count: usize, limit: usize },

    #[error("No master files selected")]
    NoMasterFiles,

    #[error("No company file selected")]
    NoCompanyFile,

    #[error("{file}: {source}")]
    File {
        file: String,
        #[source]
        source: SheetError,
    },

    #[error("Please upload both files.")]
    MissingInput,

    #[error("Please select at least one USER_ID to compare.")]
    NoFilterSelected,

    #[error("Unknown USER_ID: {0}")]
    UnknownFilterValue(String),

    #[error("Failed to parse file: {0}")]
    Worker(String),
}
