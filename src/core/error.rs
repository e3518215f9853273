use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while assembling, certifying, or cancelling a DTE.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum FelError {
    /// A required emitter/receiver/line field is blank.
    #[error("required field is empty: {field}")]
    MissingRequiredField {
        /// Dot-separated path to the blank field (e.g. "receptor.street").
        field: String,
    },

    /// A line tax belongs to a tax group no provider schema accepts.
    #[error("unsupported tax group: {group}")]
    UnsupportedTaxGroup { group: String },

    /// The company has no certification provider selected.
    #[error("no certification provider configured")]
    NoProviderConfigured,

    /// The selected provider is configured but credentials are incomplete.
    #[error("incomplete provider configuration, missing: {}", missing.join(", "))]
    IncompleteProviderConfiguration { missing: Vec<String> },

    /// The wire call timed out; a local access number was issued.
    #[error("transport timeout, access number {access_number}")]
    TransportTimeout { access_number: u32 },

    /// The wire call failed without a contingency-eligible cause.
    #[error("transport failure: {message}")]
    TransportFailure { message: String },

    /// The provider rejected the document with structured errors.
    #[error("provider rejected the document ({} error(s))", errors.len())]
    ProviderRejected { errors: Vec<CertError> },

    /// Other documents are being certified right now; resubmit later.
    #[error("documents already in process: {}", documents.join(", "))]
    ConcurrentModification { documents: Vec<String> },

    /// The host store failed while persisting a certification result.
    /// The operator must not resubmit: the remote authority may already
    /// hold a certified copy.
    #[error("persistence failure, do not resubmit: {message}")]
    Persistence { message: String },

    /// Cancellation was requested for a document that was never certified.
    #[error("no certified document to cancel")]
    NothingToCancel,

    /// Any other validation rule failed.
    #[error("validation failed: {0}")]
    Validation(String),

    /// XML generation or response scraping error.
    #[error("XML error: {0}")]
    Xml(String),
}

/// One structured error entry returned by a certification provider.
///
/// Providers differ wildly in how much of this they fill in; only the
/// message is guaranteed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertError {
    /// Human-readable error description.
    pub message: String,
    /// Origin of the error as reported by the provider.
    pub source: String,
    /// Provider error category (e.g. communication vs. validation).
    pub category: String,
    /// Regulatory numeral the rejection cites, if any.
    pub numeral: String,
    /// Name of the failed validation rule, if any.
    pub validation: String,
}

impl std::fmt::Display for CertError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.validation.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "[{}] {}", self.validation, self.message)
        }
    }
}

impl CertError {
    /// Create an error entry carrying only a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: String::new(),
            category: String::new(),
            numeral: String::new(),
            validation: String::new(),
        }
    }

    /// Create an error entry with a category label (used for transport faults).
    pub fn with_category(message: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: String::new(),
            category: category.into(),
            numeral: String::new(),
            validation: String::new(),
        }
    }

    /// Create a fully-populated entry.
    pub fn detailed(
        message: impl Into<String>,
        source: impl Into<String>,
        category: impl Into<String>,
        numeral: impl Into<String>,
        validation: impl Into<String>,
    ) -> Self {
        Self {
            message: message.into(),
            source: source.into(),
            category: category.into(),
            numeral: numeral.into(),
            validation: validation.into(),
        }
    }
}
