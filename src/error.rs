use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReconciliationError {
    #[error("Invalid contract code in {source_name} row {row}: {reason}")]
    InvalidContractCode {
        source_name: String,
        row: usize,
        reason: String,
    },

    #[error("Classification conflict: code(s) {} carry revenue but are configured as cost centers", .codes.join(", "))]
    ClassificationConflict { codes: Vec<String> },

    #[error("Allocation tag conflict for contract code '{code}': found both 'Data' and 'Wellness' tags")]
    AllocationTagConflict { code: String },

    #[error("{pool} allocation does not reconcile: allocated {allocated:.2} vs pool {pool_total:.2} (diff {difference:.4})")]
    AllocationMismatch {
        pool: String,
        allocated: f64,
        pool_total: f64,
        difference: f64,
    },

    #[error("Completeness validation failed ({summary}): {}", .failures.join("; "))]
    CompletenessFailure {
        summary: String,
        failures: Vec<String>,
    },

    #[error("Key integrity validation failed ({summary}): {}", .failures.join("; "))]
    KeyIntegrityFailure {
        summary: String,
        failures: Vec<String>,
    },

    #[error("Reconciliation validation failed ({summary}): {}", .failures.join("; "))]
    ReconciliationFailure {
        summary: String,
        failures: Vec<String>,
    },

    #[error("Invalid month label '{0}': expected e.g. 'November2025'")]
    InvalidMonth(String),

    #[error("Required column '{field}' not found in {source_name}. Tried: {}", .candidates.join(", "))]
    MissingColumn {
        source_name: String,
        field: String,
        candidates: Vec<String>,
    },

    #[error("Invalid tagging rule #{index} ('{pattern}'): {reason}")]
    InvalidTagRule {
        index: usize,
        pattern: String,
        reason: String,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to load {source_name}: {details}")]
    Load {
        source_name: String,
        details: String,
    },

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl ReconciliationError {
    /// True for the errors raised by the validator's aggregated gate.
    pub fn is_validation_failure(&self) -> bool {
        matches!(
            self,
            Self::CompletenessFailure { .. }
                | Self::KeyIntegrityFailure { .. }
                | Self::ReconciliationFailure { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, ReconciliationError>;
