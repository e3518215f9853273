//! Outcome of one certification attempt, as parsed from a provider
//! response or synthesized from a transport failure.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::core::CertError;

/// What one submission round-trip produced.
///
/// On success the authorization fields are filled from the provider
/// response. On failure either [`errors`](Self::errors) carries the
/// provider's structured rejection detail, or
/// [`description`](Self::description) carries free text, with an access
/// number attached when the failure was a communication problem.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CertificationResult {
    pub success: bool,
    /// SAT authorization UUID.
    pub uuid: Option<String>,
    pub series: Option<String>,
    pub number: Option<String>,
    pub certified_at: Option<NaiveDateTime>,
    /// Signed document as submitted, when the provider echoes it back.
    pub signed_xml: Option<String>,
    /// Certified document returned by the provider.
    pub certified_xml: Option<String>,
    /// Provider-hosted PDF, as a location or base64 payload.
    pub pdf_route: Option<String>,
    /// Access number attached locally when the provider was unreachable.
    pub access_number: Option<u32>,
    /// Structured rejection detail.
    pub errors: Vec<CertError>,
    /// Free-text failure description when no structured detail came back.
    pub description: Option<String>,
}

impl CertificationResult {
    /// A rejection with provider validation detail.
    pub fn rejected(errors: Vec<CertError>) -> Self {
        Self {
            success: false,
            errors,
            ..Self::default()
        }
    }

    /// A failure with only a free-text description.
    pub fn failed(description: impl Into<String>) -> Self {
        Self {
            success: false,
            description: Some(description.into()),
            ..Self::default()
        }
    }

    /// A communication failure, stamped with the locally-issued access
    /// number that keeps the document issuable under contingency.
    pub fn unreachable(description: impl Into<String>, access_number: u32) -> Self {
        Self {
            success: false,
            description: Some(description.into()),
            access_number: Some(access_number),
            ..Self::default()
        }
    }

    /// Whether the failure carries provider validation detail rather than
    /// a communication problem.
    pub fn has_structured_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// Parse a certification timestamp as providers variously render it: a
/// date-time with or without a trailing offset, or a bare date.
pub fn parse_certified_at(raw: &str) -> Option<NaiveDateTime> {
    let trimmed = raw.trim();
    if let Some(head) = trimmed.get(..19) {
        if let Ok(moment) = NaiveDateTime::parse_from_str(head, "%Y-%m-%dT%H:%M:%S") {
            return Some(moment);
        }
    }
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .map(|d| d.and_time(NaiveTime::MIN))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamps_parse_with_and_without_offset() {
        let expected = NaiveDate::from_ymd_opt(2024, 3, 5)
            .unwrap()
            .and_hms_opt(10, 30, 0)
            .unwrap();
        assert_eq!(parse_certified_at("2024-03-05T10:30:00"), Some(expected));
        assert_eq!(parse_certified_at("2024-03-05T10:30:00-06:00"), Some(expected));
        assert_eq!(
            parse_certified_at("2024-03-05T10:30:00.123-06:00"),
            Some(expected)
        );
    }

    #[test]
    fn bare_dates_parse_to_midnight() {
        let expected = NaiveDate::from_ymd_opt(2024, 3, 5)
            .unwrap()
            .and_time(NaiveTime::MIN);
        assert_eq!(parse_certified_at("2024-03-05"), Some(expected));
        assert_eq!(parse_certified_at("  2024-03-05 "), Some(expected));
    }

    #[test]
    fn garbage_timestamps_parse_to_none() {
        assert_eq!(parse_certified_at(""), None);
        assert_eq!(parse_certified_at("no fecha"), None);
        assert_eq!(parse_certified_at("05/03/2024"), None);
    }

    #[test]
    fn unreachable_results_carry_the_access_number() {
        let result = CertificationResult::unreachable("timed out", 42);
        assert!(!result.success);
        assert!(!result.has_structured_errors());
        assert_eq!(result.access_number, Some(42));
    }
}
