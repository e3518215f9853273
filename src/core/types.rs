use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// SAT short codes for the FEL document types this crate can emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DteType {
    /// FACT: Factura.
    Fact,
    /// FCAM: Factura cambiaria (financed sale, carries installments).
    Fcam,
    /// FPEQ: Factura de pequeño contribuyente.
    Fpeq,
    /// FCAP: Factura cambiaria de pequeño contribuyente.
    Fcap,
    /// FAPE: Factura de agropecuario, pequeño contribuyente.
    Fape,
    /// NCRE: Nota de crédito.
    Ncre,
    /// NDEB: Nota de débito.
    Ndeb,
    /// NABN: Nota de abono.
    Nabn,
    /// RECI: Recibo.
    Reci,
    /// RDON: Recibo por donación.
    Rdon,
    /// FESP: Factura especial (buyer withholds ISR/IVA).
    Fesp,
}

impl DteType {
    /// SAT short code as sent on the wire.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Fact => "FACT",
            Self::Fcam => "FCAM",
            Self::Fpeq => "FPEQ",
            Self::Fcap => "FCAP",
            Self::Fape => "FAPE",
            Self::Ncre => "NCRE",
            Self::Ndeb => "NDEB",
            Self::Nabn => "NABN",
            Self::Reci => "RECI",
            Self::Rdon => "RDON",
            Self::Fesp => "FESP",
        }
    }

    /// Parse from a SAT short code.
    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim() {
            "FACT" => Some(Self::Fact),
            "FCAM" => Some(Self::Fcam),
            "FPEQ" => Some(Self::Fpeq),
            "FCAP" => Some(Self::Fcap),
            "FAPE" => Some(Self::Fape),
            "NCRE" => Some(Self::Ncre),
            "NDEB" => Some(Self::Ndeb),
            "NABN" => Some(Self::Nabn),
            "RECI" => Some(Self::Reci),
            "RDON" => Some(Self::Rdon),
            "FESP" => Some(Self::Fesp),
            _ => None,
        }
    }

    /// Credit/debit notes reference a prior document.
    pub fn is_note(&self) -> bool {
        matches!(self, Self::Ncre | Self::Ndeb)
    }

    /// NABN, RECI and RDON carry no tax section at all.
    pub fn carries_taxes(&self) -> bool {
        !matches!(self, Self::Nabn | Self::Reci | Self::Rdon)
    }
}

/// IVA affiliation of the emitting company.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IvaRegime {
    /// GEN: general regime, 12% IVA broken out per line.
    General,
    /// PEQ: pequeño contribuyente, lines exempt except on FESP.
    Small,
    /// EXE: exempt entity.
    Exempt,
}

impl IvaRegime {
    pub fn code(&self) -> &'static str {
        match self {
            Self::General => "GEN",
            Self::Small => "PEQ",
            Self::Exempt => "EXE",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "GEN" => Some(Self::General),
            "PEQ" => Some(Self::Small),
            "EXE" => Some(Self::Exempt),
            _ => None,
        }
    }
}

/// Whether the document certifies a local sale or an export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DteUse {
    Local,
    Export,
}

/// Receiver subtype in the Ecofactura schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EspecialKind {
    /// VAT-registered NIT holder.
    Registered,
    /// No NIT; local id document (CUI etc.).
    Unregistered,
    /// Foreign identification.
    Foreign,
}

impl EspecialKind {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Registered => "1",
            Self::Unregistered => "2",
            Self::Foreign => "3",
        }
    }

    /// Subtype for a receiver: VAT-registered ids are `1`, the `EXT`
    /// foreign id type is `3`, everything else is `2`.
    pub fn classify(receptor: &Receptor) -> Self {
        if receptor.vat_registered {
            Self::Registered
        } else if receptor.id_kind.as_deref() == Some("EXT") {
            Self::Foreign
        } else {
            Self::Unregistered
        }
    }
}

/// Postal address block shared by emitter and receiver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Direccion {
    pub street: String,
    pub postal_code: String,
    pub municipality: String,
    pub department: String,
    /// ISO 3166-1 alpha-2, "GT" for domestic parties.
    pub country: String,
}

impl Direccion {
    pub fn new(
        street: impl Into<String>,
        postal_code: impl Into<String>,
        municipality: impl Into<String>,
        department: impl Into<String>,
        country: impl Into<String>,
    ) -> Self {
        Self {
            street: street.into(),
            postal_code: postal_code.into(),
            municipality: municipality.into(),
            department: department.into(),
            country: country.into(),
        }
    }
}

/// Emitter identity as serialized into every provider schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Emisor {
    /// NIT without dashes.
    pub nit: String,
    pub legal_name: String,
    pub trade_name: String,
    pub email: String,
    pub regime: IvaRegime,
    /// SAT establishment code of the issuing location.
    pub establishment_code: String,
    pub address: Direccion,
}

/// Receiver identity. The generic consumer carries id "CF".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receptor {
    /// NIT without dashes, CUI, passport number, or "CF".
    pub id: String,
    pub name: String,
    pub email: String,
    pub address: Direccion,
    /// Identification-type key when the id is not a NIT (e.g. "CUI", "EXT").
    pub id_kind: Option<String>,
    /// Whether the id type is a VAT registration.
    pub vat_registered: bool,
}

impl Receptor {
    pub fn is_final_consumer(&self) -> bool {
        self.id == "CF"
    }
}

/// Legal declaration phrase. Applicability is gated per document type and
/// duplicates (same type + scenario code) are suppressed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Phrase {
    /// SAT phrase type ("1".."9").
    pub phrase_type: String,
    /// SAT scenario code within the type.
    pub scenario_code: String,
    pub resolution_number: Option<String>,
    pub resolution_date: Option<NaiveDate>,
}

impl Phrase {
    pub fn new(phrase_type: impl Into<String>, scenario_code: impl Into<String>) -> Self {
        Self {
            phrase_type: phrase_type.into(),
            scenario_code: scenario_code.into(),
            resolution_number: None,
            resolution_date: None,
        }
    }

    pub fn with_resolution(
        mut self,
        number: impl Into<String>,
        date: NaiveDate,
    ) -> Self {
        self.resolution_number = Some(number.into());
        self.resolution_date = Some(date);
        self
    }
}

/// One tax charge on a line after classification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineTax {
    /// Tax short name ("IVA", "TIMBRE DE PRENSA").
    pub short_name: String,
    /// SAT taxable-unit code: 1 taxed, 2 exempt.
    pub unit_code: u8,
    pub taxable: Decimal,
    pub amount: Decimal,
}

/// Goods-or-service marker on a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ItemKind {
    Goods,
    Service,
}

impl ItemKind {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Goods => "B",
            Self::Service => "S",
        }
    }
}

/// One normalized invoice line, ready for serialization.
///
/// All amounts are already truncated to the provider precision and the
/// description is escaped; serializers emit these verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    /// 1-based position, preserved from the source invoice.
    pub number: u32,
    pub kind: ItemKind,
    pub quantity: Decimal,
    pub unit_of_measure: String,
    pub description: String,
    pub unit_price: Decimal,
    /// Gross line price before discount (tax inclusive).
    pub price: Decimal,
    pub discount: Decimal,
    /// Line total including any press-stamp excise.
    pub total: Decimal,
    pub taxes: Vec<LineTax>,
    /// eForcon per-line tax label ("IVA", "IVA (EXENTO)", tax name).
    pub short_tax_name: Option<String>,
    /// eForcon municipal levy code: state + county + "000-" + amount.
    pub municipal_code: Option<String>,
}

/// Document-level tax total accumulated by short name across lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxTotal {
    pub short_name: String,
    pub taxable: Decimal,
    pub amount: Decimal,
}

/// Reference to the certified (or paper-regime) document a credit/debit
/// note adjusts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteReference {
    /// True when the referenced document predates the FEL regime.
    pub ancient: bool,
    pub reason: String,
    pub origin_issued_on: NaiveDate,
    pub origin_series: String,
    /// Authorization UUID, or the paper authorization number.
    pub origin_authorization: String,
    pub origin_number: String,
}

/// Financed-sale installment for FCAM/FCAP documents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Installment {
    pub number: u32,
    pub due_date: NaiveDate,
    pub amount: Decimal,
}

/// FESP withholding block: the buyer retains ISR and IVA.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecialRegime {
    pub isr_withheld: Decimal,
    pub iva_withheld: Decimal,
    /// Taxable total minus ISR withholding.
    pub net_payable: Decimal,
}

/// Export complement attached to export documents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportComplement {
    pub consignee_name: String,
    pub consignee_address: String,
    pub consignee_code: String,
    pub buyer_name: String,
    pub buyer_address: String,
    pub buyer_code: String,
    pub origin_reference: String,
    pub incoterm: String,
    pub exporter_name: String,
    pub exporter_code: String,
    pub expedition_place: String,
    pub consignee_country: String,
}

/// Schema-defined supplementary block required by specific document types.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Complement {
    Note(NoteReference),
    Installment(Installment),
    SpecialRegime(SpecialRegime),
    Export(ExportComplement),
}

/// Free-form name/value pair attached after the certified body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Addendum {
    pub name: String,
    pub value: String,
}

/// Provider-neutral DTE, built fresh per submission attempt and consumed
/// by exactly one provider serializer. Never mutated after construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dte {
    pub doc_type: DteType,
    /// ISO 4217 code, "GTQ" for domestic documents.
    pub currency: String,
    pub issued_at: NaiveDateTime,
    /// 32-character client-side key identifying this submission.
    pub key_identifier: String,
    pub emisor: Emisor,
    pub receptor: Receptor,
    pub items: Vec<LineItem>,
    pub tax_totals: Vec<TaxTotal>,
    pub phrases: Vec<Phrase>,
    pub complements: Vec<Complement>,
    pub addenda: Vec<Addendum>,
    /// Locally-issued access number when re-submitting a contingent document.
    pub access_number: Option<u32>,
    pub grand_total: Decimal,
    pub use_kind: DteUse,
}

impl Dte {
    /// The export complement, when this is an export document.
    pub fn export_complement(&self) -> Option<&ExportComplement> {
        self.complements.iter().find_map(|c| match c {
            Complement::Export(e) => Some(e),
            _ => None,
        })
    }
}

// ---------------------------------------------------------------------------
// Input surface: what the accounting collaborator hands over per document.
// ---------------------------------------------------------------------------

/// One tax charge as configured on an invoice line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxCharge {
    /// Tax group name driving classification ("IVA", "TIMBRE DE PRENSA",
    /// "RETENCIONES", "IDP").
    pub group: String,
    /// Tax name; eForcon keys municipal levies on the literal name
    /// "TASA MUNICIPAL".
    pub name: String,
    /// Percentage rate.
    pub rate: Decimal,
    /// Department code for municipal levies.
    pub state_code: Option<String>,
    /// Municipality code for municipal levies.
    pub county_code: Option<String>,
}

impl TaxCharge {
    pub fn new(group: impl Into<String>, name: impl Into<String>, rate: Decimal) -> Self {
        Self {
            group: group.into(),
            name: name.into(),
            rate,
            state_code: None,
            county_code: None,
        }
    }
}

/// One invoice line as supplied by the collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceLine {
    pub description: String,
    pub quantity: Decimal,
    pub unit_of_measure: String,
    pub unit_price: Decimal,
    /// Percentage discount.
    pub discount_pct: Decimal,
    /// Line total after every discount, tax inclusive.
    pub line_total: Decimal,
    pub is_service: bool,
    pub taxes: Vec<TaxCharge>,
    /// Product field value used by per-line addenda listings.
    pub product_reference: Option<String>,
}

/// Receiver data as known to the collaborator before name resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiverInfo {
    /// Raw tax id, possibly dashed, or "CF".
    pub nit: String,
    pub name: String,
    pub legal_name: Option<String>,
    /// Identification-type key ("CUI", "EXT", ...) when not a NIT.
    pub id_kind: Option<String>,
    /// Whether the identification type is a VAT registration.
    pub vat_registered: bool,
    pub street: Option<String>,
    pub postal_code: Option<String>,
    pub municipality: Option<String>,
    pub department: Option<String>,
    pub country: Option<String>,
    pub email: Option<String>,
    /// Code the export complement reports as the buyer code.
    pub reference_code: Option<String>,
}

/// Export consignee (ship-to party) details.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsigneeInfo {
    pub name: String,
    pub street: String,
    pub code: Option<String>,
}

/// Prior-document data for credit/debit notes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriorDocument {
    /// Authorization UUID, or paper authorization number for the old regime.
    pub authorization: String,
    pub series: String,
    pub number: String,
    pub issued_on: NaiveDate,
    /// True when referencing a pre-FEL paper document.
    pub ancient_regime: bool,
}

/// Linked sales order data available to addenda resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleOrderInfo {
    pub name: String,
    pub partner_name: String,
    /// Order partner resolves only when the partner is a person.
    pub partner_is_person: bool,
    pub picking_names: Vec<String>,
    pub client_reference: Option<String>,
}

/// Values addenda mappings may reference besides the invoice itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddendaContext {
    pub salesperson_name: Option<String>,
    pub salesperson_email: Option<String>,
    pub payment_term: Option<String>,
    /// Payment method selection key, remapped through the label table.
    pub payment_method: Option<String>,
    pub sale_order: Option<SaleOrderInfo>,
    /// Free narration, possibly rich text.
    pub narration: Option<String>,
}

/// Payment-method selection keys and their printable labels.
pub fn payment_method_label(key: &str) -> Option<&'static str> {
    match key {
        "e" => Some("Efectivo"),
        "c" => Some("Cheque"),
        "t" => Some("Transferencia"),
        "tc" => Some("Tarjeta de Crédito"),
        "de" => Some("Depósito"),
        "cr" => Some("Credito"),
        _ => None,
    }
}

/// Invoice-like input for one certification attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    /// Document reference in the host system (used in logs and guards).
    pub reference: String,
    pub doc_type: DteType,
    pub currency: String,
    /// Conversion rate to GTQ when the currency is foreign.
    pub exchange_rate: Option<Decimal>,
    /// Issue date; past dates render as midnight of that day.
    pub date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub lines: Vec<InvoiceLine>,
    pub receiver: ReceiverInfo,
    /// Partner- or fiscal-position-level phrases. These drive the
    /// exemption/export flags in addition to being emitted.
    pub phrases: Vec<Phrase>,
    pub consignee: Option<ConsigneeInfo>,
    pub consignee_country: Option<String>,
    pub incoterm: Option<String>,
    pub expedition_place: Option<String>,
    /// Source-document reference (sale order name).
    pub origin: Option<String>,
    pub prior_document: Option<PriorDocument>,
    /// Adjustment reason for notes and cancellations.
    pub reason: Option<String>,
    /// Whether the provider should validate the internal reference.
    pub validate_internal_reference: bool,
    pub addenda_context: AddendaContext,
}

impl Invoice {
    /// Tax-inclusive grand total across lines.
    pub fn total(&self) -> Decimal {
        self.lines.iter().map(|l| l.line_total).sum()
    }

    /// Grand total converted to GTQ using the invoice exchange rate.
    pub fn total_in_gtq(&self) -> Decimal {
        match self.exchange_rate {
            Some(rate) if self.currency != "GTQ" => self.total() * rate,
            _ => self.total(),
        }
    }

    pub fn all_services(&self) -> bool {
        self.lines.iter().all(|l| l.is_service)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn doc_type_codes_round_trip() {
        for t in [
            DteType::Fact,
            DteType::Fcam,
            DteType::Fpeq,
            DteType::Fcap,
            DteType::Fape,
            DteType::Ncre,
            DteType::Ndeb,
            DteType::Nabn,
            DteType::Reci,
            DteType::Rdon,
            DteType::Fesp,
        ] {
            assert_eq!(DteType::from_code(t.code()), Some(t));
        }
        assert_eq!(DteType::from_code(" FACT "), Some(DteType::Fact));
        assert_eq!(DteType::from_code("XXXX"), None);
    }

    #[test]
    fn tax_sections_skipped_for_receipts() {
        assert!(!DteType::Nabn.carries_taxes());
        assert!(!DteType::Reci.carries_taxes());
        assert!(!DteType::Rdon.carries_taxes());
        assert!(DteType::Fact.carries_taxes());
    }

    #[test]
    fn total_conversion_uses_rate_for_foreign_currency() {
        let mut invoice = Invoice {
            reference: "F-1".into(),
            doc_type: DteType::Fact,
            currency: "USD".into(),
            exchange_rate: Some(dec!(7.8)),
            date: None,
            due_date: None,
            lines: vec![InvoiceLine {
                description: "item".into(),
                quantity: dec!(1),
                unit_of_measure: "UND".into(),
                unit_price: dec!(100),
                discount_pct: dec!(0),
                line_total: dec!(100),
                is_service: false,
                taxes: vec![],
                product_reference: None,
            }],
            receiver: ReceiverInfo {
                nit: "CF".into(),
                name: "Consumidor".into(),
                legal_name: None,
                id_kind: None,
                vat_registered: false,
                street: None,
                postal_code: None,
                municipality: None,
                department: None,
                country: None,
                email: None,
                reference_code: None,
            },
            phrases: vec![],
            consignee: None,
            consignee_country: None,
            incoterm: None,
            expedition_place: None,
            origin: None,
            prior_document: None,
            reason: None,
            validate_internal_reference: false,
            addenda_context: AddendaContext::default(),
        };
        assert_eq!(invoice.total_in_gtq(), dec!(780.0));
        invoice.currency = "GTQ".into();
        assert_eq!(invoice.total_in_gtq(), dec!(100));
    }

    #[test]
    fn payment_method_labels() {
        assert_eq!(payment_method_label("tc"), Some("Tarjeta de Crédito"));
        assert_eq!(payment_method_label("zz"), None);
    }
}
