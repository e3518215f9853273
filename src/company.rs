//! Issuer-side configuration: provider selection, credentials, counters,
//! establishment data, and addenda mappings.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::core::{Direccion, DteType, FelError, IvaRegime, Phrase};

/// The six certification providers a company can route documents through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProviderCode {
    Infile,
    Digifact,
    Contap,
    MegaPrint,
    Ecofactura,
    Eforcon,
}

impl ProviderCode {
    /// Two-or-three-letter configuration code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Infile => "IN",
            Self::Digifact => "DI",
            Self::Contap => "CO",
            Self::MegaPrint => "MP",
            Self::Ecofactura => "ECO",
            Self::Eforcon => "FC",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim() {
            "IN" => Some(Self::Infile),
            "DI" => Some(Self::Digifact),
            "CO" => Some(Self::Contap),
            "MP" => Some(Self::MegaPrint),
            "ECO" => Some(Self::Ecofactura),
            "FC" => Some(Self::Eforcon),
            _ => None,
        }
    }
}

/// Provider account credentials. Which fields must be present depends on
/// the provider; adapters report the missing ones by name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub user: Option<String>,
    pub password: Option<String>,
    /// Password protecting the signing key (Infile, Ecofactura).
    pub signing_password: Option<String>,
    /// API token (Digifact, Contap, MegaPrint).
    pub token: Option<String>,
    /// Taxpayer id registered with Digifact, distinct from the SAT NIT.
    pub digifact_nit: Option<String>,
}

/// Highest access number before the counter wraps back to 1.
pub const ACCESS_NUMBER_MAX: u32 = 9_999_999;

/// Rolling issuer of SAT contingency access numbers.
///
/// Numbers run 1..=9,999,999 and wrap back to 1; the regulation only asks
/// that numbers not repeat within the retention horizon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessCounter {
    next: u32,
}

impl Default for AccessCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl AccessCounter {
    /// Create a counter starting at 1.
    pub fn new() -> Self {
        Self { next: 1 }
    }

    /// Create a counter continuing from a stored value.
    pub fn starting_at(next: u32) -> Self {
        let next = if next == 0 || next > ACCESS_NUMBER_MAX {
            1
        } else {
            next
        };
        Self { next }
    }

    /// Issue the next access number.
    pub fn next_access_number(&mut self) -> u32 {
        let number = self.next;
        self.next = if number >= ACCESS_NUMBER_MAX {
            1
        } else {
            number + 1
        };
        number
    }

    /// Preview the next number without consuming it.
    pub fn peek(&self) -> u32 {
        self.next
    }
}

/// Issuing location configured on the sales journal, overriding the company
/// block when fully set. A half-configured group is a hard error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Establishment {
    pub name: Option<String>,
    /// SAT establishment code.
    pub code: Option<String>,
    pub address: Option<Direccion>,
    /// Phrases declared for this location; empty falls back to the company
    /// phrase list.
    pub phrases: Vec<Phrase>,
}

impl Establishment {
    fn present(value: &Option<String>) -> bool {
        value.as_deref().is_some_and(|v| !v.trim().is_empty())
    }

    pub fn is_fully_set(&self) -> bool {
        Self::present(&self.name) && Self::present(&self.code) && self.address.is_some()
    }

    pub fn is_partially_set(&self) -> bool {
        !self.is_fully_set()
            && (Self::present(&self.name) || Self::present(&self.code) || self.address.is_some())
    }
}

/// Where an addendum value comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AddendumSource {
    /// Literal value configured on the mapping.
    Fixed(String),
    SalespersonName,
    SalespersonEmail,
    PaymentTerm,
    /// Payment method selection key, printed through the label table.
    PaymentMethod,
    SaleOrderName,
    /// Order partner name; resolves only when the partner is a person.
    SaleOrderPartner,
    /// Delivery order names, concatenated.
    SaleOrderPickings,
    SaleOrderClientReference,
    InvoiceReference,
    /// Free narration, stripped of markup.
    InvoiceNarration,
    /// Per-line product references, rendered as a listing.
    ProductReferences,
}

/// One configured addendum: which documents it applies to and where its
/// value comes from. The ordinal position in the company list drives the
/// numbered naming schemes (Ecofactura, MegaPrint).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddendumMapping {
    pub name: String,
    /// Restrict to one document type; `None` applies to all.
    pub doc_type: Option<DteType>,
    pub source: AddendumSource,
}

/// Endpoint set for the configured provider. URLs are deployment
/// configuration (test vs. production), never constants.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderEndpoints {
    pub certify: String,
    pub cancel: String,
    /// PDF retrieval endpoint (MegaPrint).
    pub pdf: Option<String>,
}

/// Credentials and URL for the receiver NIT registry lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NitServiceConfig {
    pub url: String,
    pub issuer_code: String,
    pub issuer_key: String,
}

/// Everything the certification pipeline needs to know about the issuing
/// company.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompanyProfile {
    pub provider: Option<ProviderCode>,
    pub credentials: Credentials,
    pub regime: IvaRegime,
    /// NIT as registered, possibly dashed; stripped on the wire.
    pub nit: String,
    pub legal_name: String,
    pub trade_name: String,
    pub email: String,
    /// SAT establishment code of the main location.
    pub establishment_code: String,
    pub address: Direccion,
    /// Journal-level issuing location override.
    pub establishment: Establishment,
    /// Block `CF` documents at or above this GTQ total; `None` disables.
    pub amount_restrict_cf: Option<Decimal>,
    /// Treat blank receiver address fields as errors instead of filling
    /// the SAT placeholder values.
    pub mandatory_address: bool,
    /// SAT exporter registration code (required by Infile for exports).
    pub exporter_code: Option<String>,
    pub expedition_place: Option<String>,
    pub phrases: Vec<Phrase>,
    pub addenda: Vec<AddendumMapping>,
    pub access_counter: AccessCounter,
    /// Per-document-type identifier sequences (Ecofactura).
    document_sequences: BTreeMap<String, u64>,
    pub endpoints: ProviderEndpoints,
    pub nit_service: Option<NitServiceConfig>,
}

/// Resolved issuing location: establishment when configured, company
/// otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IssuingSite<'a> {
    pub trade_name: &'a str,
    pub code: &'a str,
    pub address: &'a Direccion,
}

impl CompanyProfile {
    pub fn new(
        nit: impl Into<String>,
        legal_name: impl Into<String>,
        regime: IvaRegime,
        establishment_code: impl Into<String>,
        address: Direccion,
    ) -> Self {
        let legal_name = legal_name.into();
        Self {
            provider: None,
            credentials: Credentials::default(),
            regime,
            nit: nit.into(),
            trade_name: legal_name.clone(),
            legal_name,
            email: String::new(),
            establishment_code: establishment_code.into(),
            address,
            establishment: Establishment::default(),
            amount_restrict_cf: None,
            mandatory_address: false,
            exporter_code: None,
            expedition_place: None,
            phrases: Vec::new(),
            addenda: Vec::new(),
            access_counter: AccessCounter::new(),
            document_sequences: BTreeMap::new(),
            endpoints: ProviderEndpoints::default(),
            nit_service: None,
        }
    }

    /// The establishment block when fully configured, the company block
    /// when absent. A partially-filled establishment is a configuration
    /// error naming the first missing field.
    pub fn issuing_site(&self) -> Result<IssuingSite<'_>, FelError> {
        let est = &self.establishment;
        if est.is_fully_set() {
            let name = est.name.as_deref().unwrap_or_default();
            let code = est.code.as_deref().unwrap_or_default();
            let address = est.address.as_ref().ok_or(FelError::MissingRequiredField {
                field: "establishment.address".into(),
            })?;
            return Ok(IssuingSite {
                trade_name: name,
                code,
                address,
            });
        }
        if est.is_partially_set() {
            let field = if !Establishment::present(&est.name) {
                "establishment.name"
            } else if !Establishment::present(&est.code) {
                "establishment.code"
            } else {
                "establishment.address"
            };
            return Err(FelError::MissingRequiredField {
                field: field.into(),
            });
        }
        Ok(IssuingSite {
            trade_name: &self.trade_name,
            code: &self.establishment_code,
            address: &self.address,
        })
    }

    /// Phrases to emit besides the invoice-level ones: establishment list
    /// when non-empty, company list otherwise.
    pub fn site_phrases(&self) -> &[Phrase] {
        if self.establishment.phrases.is_empty() {
            &self.phrases
        } else {
            &self.establishment.phrases
        }
    }

    /// Next Ecofactura document identifier for the given type. Sequences
    /// advance on every call; a fresh identifier is drawn per attempt.
    pub fn next_document_identifier(&mut self, doc_type: DteType) -> String {
        let counter = self
            .document_sequences
            .entry(doc_type.code().to_string())
            .or_insert(0);
        *counter += 1;
        counter.to_string()
    }

    /// Resume a document-identifier sequence from a stored value.
    pub fn seed_document_identifier(&mut self, doc_type: DteType, last_issued: u64) {
        self.document_sequences
            .insert(doc_type.code().to_string(), last_issued);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access_numbers_roll_over_at_the_cap() {
        let mut counter = AccessCounter::starting_at(ACCESS_NUMBER_MAX - 1);
        assert_eq!(counter.next_access_number(), ACCESS_NUMBER_MAX - 1);
        assert_eq!(counter.next_access_number(), ACCESS_NUMBER_MAX);
        assert_eq!(counter.next_access_number(), 1);
        assert_eq!(counter.peek(), 2);
    }

    #[test]
    fn counter_rejects_out_of_range_seeds() {
        assert_eq!(AccessCounter::starting_at(0).peek(), 1);
        assert_eq!(AccessCounter::starting_at(ACCESS_NUMBER_MAX + 1).peek(), 1);
    }

    #[test]
    fn provider_codes_round_trip() {
        for p in [
            ProviderCode::Infile,
            ProviderCode::Digifact,
            ProviderCode::Contap,
            ProviderCode::MegaPrint,
            ProviderCode::Ecofactura,
            ProviderCode::Eforcon,
        ] {
            assert_eq!(ProviderCode::from_code(p.code()), Some(p));
        }
        assert_eq!(ProviderCode::from_code("XX"), None);
    }

    fn profile() -> CompanyProfile {
        CompanyProfile::new(
            "123456-7",
            "Comercial La Ceiba, S.A.",
            IvaRegime::General,
            "1",
            Direccion::new("5a avenida 4-41 zona 1", "01001", "Guatemala", "Guatemala", "GT"),
        )
    }

    #[test]
    fn establishment_fallback_and_partial_error() {
        let mut company = profile();
        let site = company.issuing_site().unwrap();
        assert_eq!(site.code, "1");
        assert_eq!(site.trade_name, "Comercial La Ceiba, S.A.");

        company.establishment.code = Some("7".into());
        assert!(matches!(
            company.issuing_site(),
            Err(FelError::MissingRequiredField { .. })
        ));

        company.establishment.name = Some("Bodega zona 12".into());
        company.establishment.address = Some(Direccion::new(
            "calzada Atanasio Tzul 21-00",
            "01012",
            "Guatemala",
            "Guatemala",
            "GT",
        ));
        let site = company.issuing_site().unwrap();
        assert_eq!(site.code, "7");
        assert_eq!(site.trade_name, "Bodega zona 12");
    }

    #[test]
    fn document_identifiers_advance_per_type() {
        let mut company = profile();
        assert_eq!(company.next_document_identifier(DteType::Fact), "1");
        assert_eq!(company.next_document_identifier(DteType::Fact), "2");
        assert_eq!(company.next_document_identifier(DteType::Ncre), "1");

        company.seed_document_identifier(DteType::Fact, 41);
        assert_eq!(company.next_document_identifier(DteType::Fact), "42");
    }
}
