//! Certification-provider adapters.
//!
//! Each provider pairs a serializer for its document dialect with the
//! request/response plumbing of its service. Adapters are pure: they
//! build [`WireRequest`]s and interpret response bodies, while the
//! transport itself lives in [`crate::wire`].

pub(crate) mod xml;

#[cfg(any(
    feature = "infile",
    feature = "digifact",
    feature = "contap",
    feature = "megaprint"
))]
pub(crate) mod sat;

#[cfg(feature = "contap")]
mod contap;
#[cfg(feature = "digifact")]
mod digifact;
#[cfg(feature = "ecofactura")]
mod ecofactura;
#[cfg(feature = "eforcon")]
mod eforcon;
#[cfg(feature = "infile")]
mod infile;
#[cfg(feature = "megaprint")]
mod megaprint;

#[cfg(feature = "contap")]
pub use contap::Contap;
#[cfg(feature = "digifact")]
pub use digifact::Digifact;
#[cfg(feature = "ecofactura")]
pub use ecofactura::Ecofactura;
#[cfg(feature = "eforcon")]
pub use eforcon::Eforcon;
#[cfg(feature = "infile")]
pub use infile::Infile;
#[cfg(feature = "megaprint")]
pub use megaprint::MegaPrint;

use chrono::NaiveDateTime;
use sha2::{Digest, Sha256};

use crate::company::{CompanyProfile, ProviderCode};
use crate::core::{Dte, DteType, FelError, NormalizePolicy};
use crate::result::CertificationResult;
use crate::wire::WireRequest;

/// Everything a provider needs to cancel a certified document.
#[derive(Debug, Clone, Copy)]
pub struct CancelOrder<'a> {
    /// SAT authorization UUID of the certified document.
    pub uuid: &'a str,
    pub series: Option<&'a str>,
    pub number: Option<&'a str>,
    /// Certification timestamp of the document being voided.
    pub certified_on: NaiveDateTime,
    /// Receiver NIT, dashes stripped.
    pub receiver_nit: &'a str,
    /// Escaped cancellation reason.
    pub reason: &'a str,
    pub cancelled_at: NaiveDateTime,
}

/// One certification provider: schema policy, serializer, and service
/// protocol. Implementations never touch the network; [`crate::certify`]
/// drives them through a [`crate::wire::WireClient`].
pub trait ProviderAdapter: Send + Sync {
    fn code(&self) -> ProviderCode;

    /// How to normalize invoices for this provider's schema.
    fn policy(&self) -> NormalizePolicy;

    /// Client-side submission key. `stored` carries the key of an earlier
    /// attempt for the same document; most providers reuse it so retries
    /// stay idempotent, Ecofactura draws a fresh sequence number instead.
    fn key_identifier(
        &self,
        stored: Option<&str>,
        _company: &mut CompanyProfile,
        _doc_type: DteType,
        now: NaiveDateTime,
    ) -> String {
        match stored {
            Some(key) => key.to_string(),
            None => time_hash_key(now),
        }
    }

    /// Verify the configuration fields this provider requires, naming
    /// every missing one.
    fn check_credentials(&self, company: &CompanyProfile) -> Result<(), FelError>;

    /// Render the normalized document into the provider dialect.
    fn serialize(&self, dte: &Dte) -> Result<String, FelError>;

    /// Wrap a serialized document into the certification request.
    fn certify_request(
        &self,
        xml: &str,
        company: &CompanyProfile,
    ) -> Result<WireRequest, FelError>;

    /// Interpret a certification response body. Parsing never fails: an
    /// unintelligible body becomes a failed result describing it.
    fn parse_certify_response(&self, body: &str) -> CertificationResult;

    /// Build the cancellation request. Providers without an online
    /// cancellation service reject with [`FelError::ProviderRejected`].
    fn cancel_request(
        &self,
        order: &CancelOrder<'_>,
        company: &CompanyProfile,
    ) -> Result<WireRequest, FelError>;

    fn parse_cancel_response(&self, body: &str) -> CertificationResult {
        self.parse_certify_response(body)
    }

    /// PDF retrieval request, for providers that render one server-side.
    fn pdf_request(&self, _uuid: &str, _company: &CompanyProfile) -> Option<WireRequest> {
        None
    }

    fn parse_pdf_response(&self, _body: &str) -> Option<String> {
        None
    }
}

/// Adapter for a provider code. Errors when support for that provider is
/// not compiled in.
pub fn adapter_for(code: ProviderCode) -> Result<Box<dyn ProviderAdapter>, FelError> {
    match code {
        #[cfg(feature = "infile")]
        ProviderCode::Infile => Ok(Box::new(Infile)),
        #[cfg(feature = "digifact")]
        ProviderCode::Digifact => Ok(Box::new(Digifact)),
        #[cfg(feature = "contap")]
        ProviderCode::Contap => Ok(Box::new(Contap)),
        #[cfg(feature = "megaprint")]
        ProviderCode::MegaPrint => Ok(Box::new(MegaPrint)),
        #[cfg(feature = "ecofactura")]
        ProviderCode::Ecofactura => Ok(Box::new(Ecofactura)),
        #[cfg(feature = "eforcon")]
        ProviderCode::Eforcon => Ok(Box::new(Eforcon)),
        #[allow(unreachable_patterns)]
        other => Err(FelError::Validation(format!(
            "support for provider {} is not compiled into this build",
            other.code()
        ))),
    }
}

/// Adapter for the provider configured on the company.
pub fn configured_adapter(
    company: &CompanyProfile,
) -> Result<Box<dyn ProviderAdapter>, FelError> {
    let code = company.provider.ok_or(FelError::NoProviderConfigured)?;
    adapter_for(code)
}

/// 32-hex-character submission key derived from the current instant.
pub(crate) fn time_hash_key(now: NaiveDateTime) -> String {
    let stamp = now.format("%Y-%m-%d %H:%M:%S%.6f").to_string();
    let mut hex = format!("{:x}", Sha256::digest(stamp.as_bytes()));
    hex.truncate(32);
    hex
}

/// First part of a response body, for failure descriptions.
pub(crate) fn preview(body: &str) -> String {
    const LIMIT: usize = 300;
    let trimmed = body.trim();
    if trimmed.chars().count() <= LIMIT {
        trimmed.to_string()
    } else {
        let cut: String = trimmed.chars().take(LIMIT).collect();
        format!("{cut}...")
    }
}

/// Report every blank field in one configuration error.
pub(crate) fn require_config(fields: &[(&str, Option<&str>)]) -> Result<(), FelError> {
    let missing: Vec<String> = fields
        .iter()
        .filter(|(_, value)| value.map_or(true, |v| v.trim().is_empty()))
        .map(|(name, _)| (*name).to_string())
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(FelError::IncompleteProviderConfiguration { missing })
    }
}
