//! Audit trail of certification attempts.
//!
//! One entry is recorded per provider outcome: a single success line, or
//! one line per structured rejection detail. Entries raised while a
//! contingency window is open are filed under that window.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::core::CertError;

/// Whether an entry records a certified document or a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogKind {
    Success,
    Error,
}

impl LogKind {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Success => "S",
            Self::Error => "E",
        }
    }
}

/// One line of the certification audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FelLogEntry {
    /// Reference of the document this entry belongs to.
    pub reference: String,
    pub kind: LogKind,
    pub logged_at: NaiveDateTime,
    /// Provider response description.
    pub response: String,
    pub error_message: String,
    pub source: String,
    pub category: String,
    pub numeral: String,
    pub validation: String,
    /// Contingency window this failure was filed under, if one was open.
    pub window: Option<u32>,
}

impl FelLogEntry {
    pub fn success(
        reference: impl Into<String>,
        response: impl Into<String>,
        logged_at: NaiveDateTime,
    ) -> Self {
        Self {
            reference: reference.into(),
            kind: LogKind::Success,
            logged_at,
            response: response.into(),
            error_message: String::new(),
            source: String::new(),
            category: String::new(),
            numeral: String::new(),
            validation: String::new(),
            window: None,
        }
    }

    pub fn failure(
        reference: impl Into<String>,
        error: &CertError,
        response: impl Into<String>,
        logged_at: NaiveDateTime,
    ) -> Self {
        Self {
            reference: reference.into(),
            kind: LogKind::Error,
            logged_at,
            response: response.into(),
            error_message: error.message.clone(),
            source: error.source.clone(),
            category: error.category.clone(),
            numeral: error.numeral.clone(),
            validation: error.validation.clone(),
            window: None,
        }
    }

    /// File this entry under a contingency window.
    pub fn under_window(mut self, window: u32) -> Self {
        self.window = Some(window);
        self
    }
}
