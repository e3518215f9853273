//! Invoice-to-DTE normalization: party resolution, tax classification,
//! phrase gating, complements, and addenda.
//!
//! The output [`Dte`] is fully escaped and truncated; serializers emit its
//! strings and amounts verbatim.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::company::{AddendumSource, CompanyProfile};

use super::amount::truncate;
use super::error::FelError;
use super::escape::{EscapeMode, escape_required, escape_value, strip_accents, strip_html, strip_nit};
use super::types::*;

/// All local sale prices are IVA-inclusive at 12%.
const IVA_FACTOR: Decimal = dec!(1.12);
/// ISR withholding rate on special invoices (Decreto 10-2012).
const FESP_ISR_RATE: Decimal = dec!(5);

const TAX_GROUP_IVA: &str = "IVA";
const TAX_GROUP_PRESS_STAMP: &str = "TIMBRE DE PRENSA";
const TAX_GROUP_WITHHOLDING: &str = "RETENCIONES";
const TAX_GROUP_FUEL: &str = "IDP";
/// Tax name (not group) that turns into a municipal item code on eForcon.
pub const MUNICIPAL_TAX_NAME: &str = "TASA MUNICIPAL";

/// How a provider renders the emission timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StampFormat {
    /// `%Y-%m-%dT%H:%M:%S-06:00` (Infile, MegaPrint).
    OffsetDateTime,
    /// `%Y-%m-%dT%H:%M:%S` (Digifact, Contap).
    LocalDateTime,
    /// `%Y-%m-%d` (Ecofactura, eForcon).
    DateOnly,
}

impl StampFormat {
    pub fn render(&self, moment: NaiveDateTime) -> String {
        match self {
            Self::OffsetDateTime => format!("{}-06:00", moment.format("%Y-%m-%dT%H:%M:%S")),
            Self::LocalDateTime => moment.format("%Y-%m-%dT%H:%M:%S").to_string(),
            Self::DateOnly => moment.format("%Y-%m-%d").to_string(),
        }
    }
}

/// How a provider names resolved addenda.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddendumNaming {
    /// The mapping's own name (Infile, eForcon).
    MappingName,
    /// `TrnCampAd01`..`TrnCampAdNN` by mapping position (Ecofactura).
    NumberedField,
    /// `Valor1`..`ValorN` by mapping position (MegaPrint).
    NumberedValue,
    /// Mappings are ignored; a fixed internal-reference block is emitted
    /// instead (Digifact).
    InternalReference,
}

/// Provider policy knobs consumed during normalization and serialization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizePolicy {
    /// Decimal places amounts are truncated to.
    pub precision: u32,
    pub escape_mode: EscapeMode,
    /// Emit unit price / price / discount / total per line.
    pub per_line_amounts: bool,
    /// Emit document-level tax totals and grand total.
    pub document_totals: bool,
    /// Classify taxes into a per-line breakdown. Off for eForcon, which
    /// labels lines with a short tax name instead.
    pub tax_breakdown: bool,
    /// Track `TASA MUNICIPAL` charges as municipal item codes (eForcon).
    pub municipal_codes: bool,
    /// Attach the ISR/IVA withholding complement on FESP documents.
    pub fesp_complement: bool,
    /// Exports need the issuer's SAT exporter code (Infile).
    pub requires_exporter_code: bool,
    /// Exports need consignee name, address, and a buyer reference code.
    pub requires_consignee: bool,
    pub stamp: StampFormat,
    pub addendum_naming: AddendumNaming,
    /// Strip accents from host-field addendum values (MegaPrint).
    pub ascii_addenda: bool,
}

impl NormalizePolicy {
    /// The policy most of the SAT-schema providers share.
    pub fn standard() -> Self {
        Self {
            precision: super::amount::DEFAULT_PRECISION,
            escape_mode: EscapeMode::NumericRefs,
            per_line_amounts: true,
            document_totals: true,
            tax_breakdown: true,
            municipal_codes: false,
            fesp_complement: true,
            requires_exporter_code: false,
            requires_consignee: false,
            stamp: StampFormat::OffsetDateTime,
            addendum_naming: AddendumNaming::MappingName,
            ascii_addenda: false,
        }
    }
}

/// Per-attempt inputs that accompany the invoice into normalization.
#[derive(Debug, Clone, Copy)]
pub struct NormalizeContext<'a> {
    pub company: &'a CompanyProfile,
    pub policy: &'a NormalizePolicy,
    /// Client submission key for this attempt.
    pub key_identifier: &'a str,
    /// Access number when re-issuing a contingent document.
    pub access_number: Option<u32>,
    /// Receiver legal name as resolved from the NIT registry.
    pub resolved_name: Option<&'a str>,
    /// Current Guatemala local time.
    pub now: NaiveDateTime,
}

/// Current local time in Guatemala (fixed UTC-6, no DST).
pub fn guatemala_now() -> NaiveDateTime {
    Utc::now().naive_utc() - TimeDelta::hours(6)
}

/// The emission moment: now, or midnight of the invoice date when it lies
/// in the past.
pub fn emission_moment(invoice_date: Option<NaiveDate>, now: NaiveDateTime) -> NaiveDateTime {
    match invoice_date {
        Some(date) if date < now.date() => date.and_time(NaiveTime::MIN),
        _ => now,
    }
}

/// Build the provider-neutral document from an invoice.
pub fn normalize(invoice: &Invoice, ctx: &NormalizeContext<'_>) -> Result<Dte, FelError> {
    let policy = ctx.policy;
    let company = ctx.company;
    let mode = policy.escape_mode;

    let emisor = build_emisor(company, mode)?;
    let receptor = build_receptor(invoice, company, ctx.resolved_name, mode)?;

    let (phrases, flags) = gate_phrases(invoice, company, invoice.doc_type);
    let exempt_like = flags.exempt || flags.export;

    let itemized = build_items(invoice, company.regime, policy, exempt_like)?;
    let issued_at = emission_moment(invoice.date, ctx.now);

    let mut complements = Vec::new();
    if invoice.doc_type.is_note() {
        complements.push(Complement::Note(note_reference(invoice, mode)?));
    }
    if invoice.doc_type == DteType::Fcam {
        let due_date = invoice.due_date.ok_or(FelError::MissingRequiredField {
            field: "invoice.due_date".into(),
        })?;
        complements.push(Complement::Installment(Installment {
            number: 1,
            due_date,
            amount: truncate(invoice.total(), policy.precision),
        }));
    }
    if invoice.doc_type == DteType::Fesp && policy.fesp_complement {
        let isr = truncate(itemized.taxable_sum * FESP_ISR_RATE / Decimal::ONE_HUNDRED, policy.precision);
        complements.push(Complement::SpecialRegime(SpecialRegime {
            isr_withheld: isr,
            iva_withheld: itemized.tax_sum,
            net_payable: truncate((itemized.taxable_sum - isr).abs(), policy.precision),
        }));
    }
    if flags.export && !matches!(invoice.doc_type, DteType::Ncre | DteType::Ndeb | DteType::Nabn) {
        complements.push(Complement::Export(export_complement(invoice, company, policy)?));
    }

    let addenda = resolve_addenda(invoice, company, policy, ctx.key_identifier, issued_at);

    Ok(Dte {
        doc_type: invoice.doc_type,
        currency: invoice.currency.clone(),
        issued_at,
        key_identifier: ctx.key_identifier.to_string(),
        emisor,
        receptor,
        items: itemized.items,
        tax_totals: itemized.tax_totals,
        phrases,
        complements,
        addenda,
        access_number: ctx.access_number,
        grand_total: truncate(invoice.total(), policy.precision),
        use_kind: if flags.export {
            DteUse::Export
        } else {
            DteUse::Local
        },
    })
}

fn build_emisor(company: &CompanyProfile, mode: EscapeMode) -> Result<Emisor, FelError> {
    let site = company.issuing_site()?;
    if site.code.trim().is_empty() {
        return Err(FelError::MissingRequiredField {
            field: "company.establishment_code".into(),
        });
    }
    Ok(Emisor {
        nit: strip_nit(&company.nit),
        legal_name: escape_required("company", "legal_name", &company.legal_name, mode)?,
        trade_name: escape_required("company", "trade_name", site.trade_name, mode)?,
        email: escape_required("company", "email", &company.email, mode)?,
        regime: company.regime,
        establishment_code: site.code.to_string(),
        address: Direccion {
            street: escape_required("company", "street", &site.address.street, mode)?,
            postal_code: escape_required("company", "postal_code", &site.address.postal_code, mode)?,
            municipality: escape_required("company", "municipality", &site.address.municipality, mode)?,
            department: escape_required("company", "department", &site.address.department, mode)?,
            country: escape_required("company", "country", &site.address.country, mode)?,
        },
    })
}

fn build_receptor(
    invoice: &Invoice,
    company: &CompanyProfile,
    resolved_name: Option<&str>,
    mode: EscapeMode,
) -> Result<Receptor, FelError> {
    let info = &invoice.receiver;
    if info.nit.trim().is_empty() {
        return Err(FelError::MissingRequiredField {
            field: "receiver.nit".into(),
        });
    }
    let final_consumer = info.nit == "CF";

    let name_raw = if final_consumer {
        "Consumidor Final".to_string()
    } else if let Some(name) = resolved_name {
        name.to_string()
    } else {
        info.legal_name
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or(&info.name)
            .to_string()
    };

    // Blank address parts either error out or take the SAT placeholder
    // values; exports (incoterm set) placeholder with `---`.
    let address = if company.mandatory_address {
        Direccion {
            street: escape_required("receiver", "street", info.street.as_deref().unwrap_or(""), mode)?,
            postal_code: escape_required("receiver", "postal_code", info.postal_code.as_deref().unwrap_or(""), mode)?,
            municipality: escape_required("receiver", "municipality", info.municipality.as_deref().unwrap_or(""), mode)?,
            department: escape_required("receiver", "department", info.department.as_deref().unwrap_or(""), mode)?,
            country: escape_required("receiver", "country", info.country.as_deref().unwrap_or(""), mode)?,
        }
    } else {
        let fallback = |value: &Option<String>, default: &str| -> String {
            let raw = value
                .as_deref()
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(default);
            escape_value(raw, mode)
        };
        if invoice.incoterm.is_some() {
            Direccion {
                street: fallback(&info.street, "---"),
                postal_code: fallback(&info.postal_code, "00000"),
                municipality: fallback(&info.municipality, "---"),
                department: fallback(&info.department, "---"),
                country: fallback(&info.country, "---"),
            }
        } else {
            Direccion {
                street: fallback(&info.street, "Guatemala"),
                postal_code: fallback(&info.postal_code, "00000"),
                municipality: fallback(&info.municipality, "Guatemala"),
                department: fallback(&info.department, "Guatemala"),
                country: fallback(&info.country, "GT"),
            }
        }
    };

    Ok(Receptor {
        id: if final_consumer {
            "CF".to_string()
        } else {
            strip_nit(&info.nit)
        },
        name: escape_required("receiver", "name", &name_raw, mode)?,
        email: escape_value(info.email.as_deref().unwrap_or(" "), mode),
        address,
        id_kind: info.id_kind.clone(),
        vat_registered: info.vat_registered,
    })
}

struct PhraseFlags {
    exempt: bool,
    export: bool,
}

fn phrase_permitted(phrase_type: &str, doc: DteType) -> bool {
    use DteType::*;
    match phrase_type {
        "4" => matches!(doc, Fact | Fcam | Ncre | Ndeb | Fesp | Reci | Rdon),
        "1" | "2" => matches!(doc, Fact | Fcam | Ncre | Ndeb),
        "3" => matches!(doc, Fpeq | Fcap | Fape),
        "5" => doc == Fesp,
        "6" => doc != Nabn,
        "7" => !matches!(doc, Nabn | Fesp),
        "8" => matches!(doc, Fact | Fcam | Ncre | Ndeb | Reci | Rdon),
        "9" => matches!(doc, Fact | Fcam | Ncre | Ndeb | Fpeq | Fcap),
        _ => false,
    }
}

/// Resolution data only survives on the document types whose schema
/// position carries it.
fn keeps_resolution(phrase_type: &str, doc: DteType) -> bool {
    use DteType::*;
    match phrase_type {
        "1" | "2" | "8" | "9" => matches!(doc, Fact | Fcam | Ncre | Ndeb),
        "7" => !matches!(doc, Nabn | Fesp),
        _ => false,
    }
}

fn gate_phrases(
    invoice: &Invoice,
    company: &CompanyProfile,
    doc: DteType,
) -> (Vec<Phrase>, PhraseFlags) {
    let mut emitted = Vec::new();
    let mut seen: Vec<(String, String)> = Vec::new();
    let mut flags = PhraseFlags {
        exempt: false,
        export: false,
    };

    for phrase in invoice.phrases.iter().chain(company.site_phrases()) {
        if !phrase_permitted(&phrase.phrase_type, doc) {
            continue;
        }
        let key = (phrase.phrase_type.clone(), phrase.scenario_code.clone());
        if seen.contains(&key) {
            continue;
        }
        seen.push(key);

        if phrase.phrase_type == "4" {
            flags.exempt = true;
            if phrase.scenario_code == "1" {
                flags.export = true;
            }
        }

        let mut out = phrase.clone();
        if !(keeps_resolution(&phrase.phrase_type, doc)
            && out.resolution_number.is_some()
            && out.resolution_date.is_some())
        {
            out.resolution_number = None;
            out.resolution_date = None;
        }
        emitted.push(out);
    }
    (emitted, flags)
}

struct Itemized {
    items: Vec<LineItem>,
    tax_totals: Vec<TaxTotal>,
    /// Taxable bases summed over every emitted line tax.
    taxable_sum: Decimal,
    /// Tax amounts summed over every emitted line tax.
    tax_sum: Decimal,
}

fn build_items(
    invoice: &Invoice,
    regime: IvaRegime,
    policy: &NormalizePolicy,
    exempt_like: bool,
) -> Result<Itemized, FelError> {
    let p = policy.precision;
    let mode = policy.escape_mode;
    let mut items = Vec::with_capacity(invoice.lines.len());
    let mut tax_totals: Vec<TaxTotal> = Vec::new();
    let mut taxable_sum = Decimal::ZERO;
    let mut tax_sum = Decimal::ZERO;

    for (idx, line) in invoice.lines.iter().enumerate() {
        let description = {
            let escaped = escape_required("invoice line", "description", &line.description, mode)?;
            escaped.strip_prefix('/').unwrap_or(&escaped).to_string()
        };

        let discount_raw = line.unit_price * line.quantity * line.discount_pct / Decimal::ONE_HUNDRED;
        let press_rate = line
            .taxes
            .iter()
            .find(|t| t.group == TAX_GROUP_PRESS_STAMP)
            .map(|t| t.rate)
            .unwrap_or(Decimal::ZERO);
        let press_base = line.unit_price * (Decimal::ONE - line.discount_pct / Decimal::ONE_HUNDRED)
            * line.quantity
            / IVA_FACTOR;
        let press_sum = press_rate * press_base / Decimal::ONE_HUNDRED;

        let mut taxes = Vec::new();
        if policy.tax_breakdown && invoice.doc_type.carries_taxes() {
            for charge in &line.taxes {
                let classified = classify_tax(charge, line, discount_raw, regime, invoice.doc_type, exempt_like, p)?;
                let Some(line_tax) = classified else { continue };
                taxable_sum += line_tax.taxable;
                tax_sum += line_tax.amount;
                accumulate_total(&mut tax_totals, &line_tax);
                taxes.push(line_tax);
            }
        }

        let (short_tax_name, municipal_code) = if policy.municipal_codes {
            municipal_labels(line, exempt_like)
        } else {
            (None, None)
        };

        items.push(LineItem {
            number: idx as u32 + 1,
            kind: if line.is_service {
                ItemKind::Service
            } else {
                ItemKind::Goods
            },
            quantity: line.quantity,
            unit_of_measure: escape_value(&line.unit_of_measure, mode),
            description,
            unit_price: truncate(line.unit_price, p),
            price: truncate(line.line_total + discount_raw, p),
            discount: truncate(discount_raw, p),
            total: truncate(line.line_total + press_sum, p),
            taxes,
            short_tax_name,
            municipal_code,
        });
    }

    Ok(Itemized {
        items,
        tax_totals,
        taxable_sum,
        tax_sum,
    })
}

/// One tax charge into a line tax, or `None` for the pass-through groups.
fn classify_tax(
    charge: &TaxCharge,
    line: &InvoiceLine,
    discount_raw: Decimal,
    regime: IvaRegime,
    doc_type: DteType,
    exempt_like: bool,
    precision: u32,
) -> Result<Option<LineTax>, FelError> {
    if charge.group.trim().is_empty() {
        return Err(FelError::Validation(
            "line tax has no tax group assigned".into(),
        ));
    }

    let exempt_tax = || LineTax {
        short_name: charge.group.clone(),
        unit_code: 2,
        taxable: truncate(line.line_total, precision),
        amount: Decimal::ZERO,
    };

    match charge.group.as_str() {
        TAX_GROUP_IVA => {
            let general_math = regime == IvaRegime::General
                || (regime == IvaRegime::Small && doc_type == DteType::Fesp);
            if regime == IvaRegime::General && exempt_like {
                Ok(Some(exempt_tax()))
            } else if general_math {
                let taxable = truncate(
                    (line.unit_price * line.quantity - discount_raw).abs()
                        / (Decimal::ONE + charge.rate / Decimal::ONE_HUNDRED),
                    precision,
                );
                Ok(Some(LineTax {
                    short_name: charge.group.clone(),
                    unit_code: 1,
                    taxable,
                    amount: truncate(charge.rate * taxable / Decimal::ONE_HUNDRED, precision),
                }))
            } else {
                Ok(Some(exempt_tax()))
            }
        }
        TAX_GROUP_WITHHOLDING | TAX_GROUP_FUEL => Ok(None),
        TAX_GROUP_PRESS_STAMP => {
            if regime == IvaRegime::General {
                // The tax amount derives from the untruncated base.
                let taxable_raw =
                    (line.unit_price * line.quantity - discount_raw).abs() / IVA_FACTOR;
                Ok(Some(LineTax {
                    short_name: charge.group.clone(),
                    unit_code: 1,
                    taxable: truncate(taxable_raw, precision),
                    amount: truncate(charge.rate * taxable_raw / Decimal::ONE_HUNDRED, precision),
                }))
            } else {
                Ok(Some(exempt_tax()))
            }
        }
        other => Err(FelError::UnsupportedTaxGroup {
            group: other.to_string(),
        }),
    }
}

/// Accumulate a line tax into the per-name document totals, first-seen
/// order preserved.
fn accumulate_total(totals: &mut Vec<TaxTotal>, tax: &LineTax) {
    if let Some(entry) = totals.iter_mut().find(|t| t.short_name == tax.short_name) {
        entry.taxable += tax.taxable;
        entry.amount += tax.amount;
    } else {
        totals.push(TaxTotal {
            short_name: tax.short_name.clone(),
            taxable: tax.taxable,
            amount: tax.amount,
        });
    }
}

/// eForcon line labeling: short tax name per line, municipal levy code
/// when a `TASA MUNICIPAL` charge is present, and the blanket exempt
/// label for exempt documents.
fn municipal_labels(line: &InvoiceLine, exempt_like: bool) -> (Option<String>, Option<String>) {
    let mut short_name = None;
    let mut municipal_code = None;

    for charge in &line.taxes {
        if charge.name == MUNICIPAL_TAX_NAME {
            short_name = Some(MUNICIPAL_TAX_NAME.to_string());
            let base = line.unit_price * (Decimal::ONE - line.discount_pct / Decimal::ONE_HUNDRED)
                * line.quantity
                / IVA_FACTOR;
            let amount = charge.rate * base / Decimal::ONE_HUNDRED;
            municipal_code = Some(format!(
                "{}{}000-{}",
                charge.state_code.as_deref().unwrap_or(""),
                charge.county_code.as_deref().unwrap_or(""),
                municipal_amount(amount),
            ));
            break;
        }
        short_name = Some(charge.name.clone());
    }

    if exempt_like {
        short_name = Some("IVA (EXENTO)".to_string());
    }
    (short_name, municipal_code)
}

/// Municipal levy amounts render rounded to two places with trailing
/// zeros trimmed, one decimal minimum.
fn municipal_amount(value: Decimal) -> String {
    let mut rendered = value.round_dp(2).normalize().to_string();
    if !rendered.contains('.') {
        rendered.push_str(".0");
    }
    rendered
}

fn note_reference(invoice: &Invoice, mode: EscapeMode) -> Result<NoteReference, FelError> {
    let kind = if invoice.doc_type == DteType::Ncre {
        "credit"
    } else {
        "debit"
    };
    let prior = invoice.prior_document.as_ref().ok_or_else(|| {
        FelError::Validation(format!("no certified document to issue this {kind} note against"))
    })?;
    if prior.ancient_regime
        && (prior.series.trim().is_empty()
            || prior.authorization.trim().is_empty())
    {
        return Err(FelError::Validation(format!(
            "paper-regime {kind} note needs the original series and authorization number"
        )));
    }

    let reason_raw = invoice
        .reason
        .as_deref()
        .filter(|r| !r.trim().is_empty())
        .unwrap_or("Anulación");
    Ok(NoteReference {
        ancient: prior.ancient_regime,
        reason: escape_required("note", "reason", reason_raw, mode)?,
        origin_issued_on: prior.issued_on,
        origin_series: escape_value(&prior.series, mode),
        origin_authorization: prior.authorization.clone(),
        origin_number: prior.number.clone(),
    })
}

fn export_complement(
    invoice: &Invoice,
    company: &CompanyProfile,
    policy: &NormalizePolicy,
) -> Result<ExportComplement, FelError> {
    let mode = policy.escape_mode;

    if invoice.incoterm.is_none() && !invoice.all_services() {
        return Err(FelError::Validation(
            "export invoices of goods need an incoterm".into(),
        ));
    }
    if policy.requires_exporter_code && company.exporter_code.is_none() {
        return Err(FelError::Validation(
            "export invoices need the issuer's SAT exporter code".into(),
        ));
    }
    if policy.requires_consignee {
        let consignee = invoice.consignee.as_ref().ok_or_else(|| {
            FelError::Validation("export invoices need the destination consignee".into())
        })?;
        if consignee.name.trim().is_empty() {
            return Err(FelError::Validation(
                "export invoices need the consignee name".into(),
            ));
        }
        if consignee.street.trim().is_empty() {
            return Err(FelError::Validation(
                "export invoices need the consignee address".into(),
            ));
        }
        if invoice.receiver.reference_code.is_none() {
            return Err(FelError::Validation(
                "export invoices need the receiver's buyer reference code".into(),
            ));
        }
    }

    let consignee_name = invoice.consignee.as_ref().map(|c| c.name.as_str()).unwrap_or("");
    let consignee_street = invoice.consignee.as_ref().map(|c| c.street.as_str()).unwrap_or("");
    let consignee_code = invoice
        .consignee
        .as_ref()
        .and_then(|c| c.code.as_deref())
        .filter(|c| !c.trim().is_empty())
        .unwrap_or("-");

    Ok(ExportComplement {
        consignee_name: escape_value(consignee_name, mode),
        consignee_address: escape_value(consignee_street, mode),
        consignee_code: consignee_code.to_string(),
        buyer_name: escape_value(&invoice.receiver.name, mode),
        buyer_address: escape_value(invoice.receiver.street.as_deref().unwrap_or(""), mode),
        buyer_code: invoice
            .receiver
            .reference_code
            .clone()
            .filter(|c| !c.trim().is_empty())
            .unwrap_or_else(|| "-".to_string()),
        origin_reference: escape_value(invoice.origin.as_deref().unwrap_or(""), mode),
        incoterm: invoice.incoterm.clone().unwrap_or_default(),
        exporter_name: escape_value(&company.legal_name, mode),
        exporter_code: company.exporter_code.clone().unwrap_or_default(),
        expedition_place: escape_value(
            invoice
                .expedition_place
                .as_deref()
                .or(company.expedition_place.as_deref())
                .unwrap_or(""),
            mode,
        ),
        consignee_country: invoice.consignee_country.clone().unwrap_or_default(),
    })
}

fn resolve_addenda(
    invoice: &Invoice,
    company: &CompanyProfile,
    policy: &NormalizePolicy,
    key_identifier: &str,
    issued_at: NaiveDateTime,
) -> Vec<Addendum> {
    if policy.addendum_naming == AddendumNaming::InternalReference {
        return vec![
            Addendum {
                name: "NumeroReferenciaInterna".to_string(),
                value: key_identifier.to_string(),
            },
            Addendum {
                name: "FechaReferencia".to_string(),
                value: policy.stamp.render(issued_at),
            },
            Addendum {
                name: "ValidarReferenciaInterna".to_string(),
                value: if invoice.validate_internal_reference {
                    "VALIDAR".to_string()
                } else {
                    "NO_VALIDAR".to_string()
                },
            },
        ];
    }

    company
        .addenda
        .iter()
        .enumerate()
        .filter(|(_, mapping)| mapping.doc_type.is_none_or(|t| t == invoice.doc_type))
        .map(|(idx, mapping)| {
            let mut value = resolve_addendum_source(&mapping.source, invoice, policy);
            if policy.ascii_addenda
                && matches!(
                    mapping.source,
                    AddendumSource::InvoiceReference | AddendumSource::PaymentMethod
                )
            {
                value = strip_accents(&value);
                if mapping.source == AddendumSource::PaymentMethod {
                    if let Some(label) = payment_method_label(&value) {
                        value = label.to_string();
                    }
                }
            }
            let name = match policy.addendum_naming {
                AddendumNaming::NumberedField => format!("TrnCampAd{:02}", idx + 1),
                AddendumNaming::NumberedValue => format!("Valor{}", idx + 1),
                _ => mapping.name.clone(),
            };
            Addendum {
                name,
                value: escape_value(&value, policy.escape_mode),
            }
        })
        .collect()
}

fn resolve_addendum_source(
    source: &AddendumSource,
    invoice: &Invoice,
    policy: &NormalizePolicy,
) -> String {
    let ctx = &invoice.addenda_context;
    let order = ctx.sale_order.as_ref();
    match source {
        AddendumSource::Fixed(value) => value.clone(),
        AddendumSource::SalespersonName => ctx.salesperson_name.clone().unwrap_or_default(),
        AddendumSource::SalespersonEmail => ctx.salesperson_email.clone().unwrap_or_default(),
        AddendumSource::PaymentTerm => ctx.payment_term.clone().unwrap_or_default(),
        AddendumSource::PaymentMethod => ctx.payment_method.clone().unwrap_or_default(),
        AddendumSource::SaleOrderName => order.map(|o| o.name.clone()).unwrap_or_default(),
        AddendumSource::SaleOrderPartner => order
            .filter(|o| o.partner_is_person)
            .map(|o| o.partner_name.clone())
            .unwrap_or_default(),
        AddendumSource::SaleOrderPickings => order
            .map(|o| o.picking_names.concat())
            .unwrap_or_default(),
        AddendumSource::SaleOrderClientReference => order
            .and_then(|o| o.client_reference.clone())
            .unwrap_or_default(),
        AddendumSource::InvoiceReference => invoice.reference.clone(),
        AddendumSource::InvoiceNarration => ctx
            .narration
            .as_deref()
            .map(strip_html)
            .unwrap_or_default(),
        AddendumSource::ProductReferences => {
            if policy.addendum_naming == AddendumNaming::NumberedValue {
                invoice
                    .lines
                    .iter()
                    .map(|l| l.product_reference.clone().unwrap_or_default())
                    .collect::<Vec<_>>()
                    .join(", ")
            } else {
                let mut listing = String::new();
                for (i, line) in invoice.lines.iter().enumerate() {
                    listing.push_str(&format!(
                        "{} @ {} | ",
                        i + 1,
                        line.product_reference.as_deref().unwrap_or("")
                    ));
                }
                listing
            }
        }
    }
}
