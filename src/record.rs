//! Per-document certification state as stored by the host system.

use chrono::{NaiveDateTime, TimeDelta};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a document with respect to FEL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DocumentState {
    /// Not yet certified, or released from a closed contingency window.
    Draft,
    Certified,
    /// Issued locally under an access number, awaiting re-certification.
    Contingency,
    Cancelled,
}

impl DocumentState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Certified => "certified",
            Self::Contingency => "contingency",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Mutable FEL state of one document. The orchestrator writes results here
/// and hands the record to the host sink for persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DteRecord {
    /// Host-side document reference, used in guards and logs.
    pub reference: String,
    pub state: DocumentState,

    /// SAT authorization UUID once certified.
    pub fel_uuid: Option<String>,
    pub fel_series: Option<String>,
    pub fel_number: Option<String>,
    pub fel_date: Option<NaiveDateTime>,

    /// XML as sent (pre-signature).
    pub plain_xml: Option<String>,
    pub signed_xml: Option<String>,
    pub certified_xml: Option<String>,
    /// Provider-rendered PDF, base64 as received.
    pub pdf_base64: Option<String>,

    /// Cancellation acknowledgment fields.
    pub cancel_uuid: Option<String>,
    pub cancel_series: Option<String>,
    pub cancel_number: Option<String>,
    pub cancel_date: Option<NaiveDateTime>,

    /// Access number under which this document was issued in contingency.
    pub access_number: Option<u32>,
    /// Client submission key, reused across attempts once issued.
    pub key_identifier: Option<String>,

    in_process_since: Option<NaiveDateTime>,
    /// Set when a persistence write failed after a wire call; the document
    /// must not be resubmitted until the host reconciles it.
    pub serialization_error: bool,
}

impl DteRecord {
    pub fn new(reference: impl Into<String>) -> Self {
        Self {
            reference: reference.into(),
            state: DocumentState::Draft,
            fel_uuid: None,
            fel_series: None,
            fel_number: None,
            fel_date: None,
            plain_xml: None,
            signed_xml: None,
            certified_xml: None,
            pdf_base64: None,
            cancel_uuid: None,
            cancel_series: None,
            cancel_number: None,
            cancel_date: None,
            access_number: None,
            key_identifier: None,
            in_process_since: None,
            serialization_error: false,
        }
    }

    pub fn is_certified(&self) -> bool {
        self.state == DocumentState::Certified
    }

    /// Whether another submission touched this record within `window` of
    /// `now`. Advisory only; races outside one process are the host's
    /// problem.
    pub fn in_process_within(&self, window: TimeDelta, now: NaiveDateTime) -> bool {
        match self.in_process_since {
            Some(since) => now.signed_duration_since(since) < window,
            None => false,
        }
    }

    pub fn mark_in_process(&mut self, now: NaiveDateTime) {
        self.in_process_since = Some(now);
    }

    pub fn clear_in_process(&mut self) {
        self.in_process_since = None;
    }
}
