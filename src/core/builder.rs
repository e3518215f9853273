use chrono::NaiveDate;
use rust_decimal::Decimal;

use super::error::FelError;
use super::types::*;

/// Builder for the invoice-like input handed to the certifier.
///
/// ```
/// use timbrado::core::*;
/// use rust_decimal_macros::dec;
///
/// let invoice = InvoiceBuilder::new("F-0001", DteType::Fact)
///     .receiver(ReceiverBuilder::new("CF", "Consumidor Final").build())
///     .add_line(
///         InvoiceLineBuilder::new("Servicio contable", dec!(1), dec!(500.00))
///             .service()
///             .tax(TaxCharge::new("IVA", "IVA", dec!(12)))
///             .build(),
///     )
///     .build()
///     .unwrap();
///
/// assert_eq!(invoice.total(), dec!(500.00));
/// ```
pub struct InvoiceBuilder {
    reference: String,
    doc_type: DteType,
    currency: String,
    exchange_rate: Option<Decimal>,
    date: Option<NaiveDate>,
    due_date: Option<NaiveDate>,
    lines: Vec<InvoiceLine>,
    receiver: Option<ReceiverInfo>,
    phrases: Vec<Phrase>,
    consignee: Option<ConsigneeInfo>,
    consignee_country: Option<String>,
    incoterm: Option<String>,
    expedition_place: Option<String>,
    origin: Option<String>,
    prior_document: Option<PriorDocument>,
    reason: Option<String>,
    validate_internal_reference: bool,
    addenda_context: AddendaContext,
}

impl InvoiceBuilder {
    pub fn new(reference: impl Into<String>, doc_type: DteType) -> Self {
        Self {
            reference: reference.into(),
            doc_type,
            currency: "GTQ".to_string(),
            exchange_rate: None,
            date: None,
            due_date: None,
            lines: Vec::new(),
            receiver: None,
            phrases: Vec::new(),
            consignee: None,
            consignee_country: None,
            incoterm: None,
            expedition_place: None,
            origin: None,
            prior_document: None,
            reason: None,
            validate_internal_reference: false,
            addenda_context: AddendaContext::default(),
        }
    }

    pub fn currency(mut self, code: impl Into<String>) -> Self {
        self.currency = code.into();
        self
    }

    pub fn exchange_rate(mut self, rate: Decimal) -> Self {
        self.exchange_rate = Some(rate);
        self
    }

    pub fn date(mut self, date: NaiveDate) -> Self {
        self.date = Some(date);
        self
    }

    pub fn due_date(mut self, date: NaiveDate) -> Self {
        self.due_date = Some(date);
        self
    }

    pub fn receiver(mut self, receiver: ReceiverInfo) -> Self {
        self.receiver = Some(receiver);
        self
    }

    pub fn add_line(mut self, line: InvoiceLine) -> Self {
        self.lines.push(line);
        self
    }

    pub fn add_phrase(mut self, phrase: Phrase) -> Self {
        self.phrases.push(phrase);
        self
    }

    pub fn consignee(mut self, consignee: ConsigneeInfo) -> Self {
        self.consignee = Some(consignee);
        self
    }

    pub fn consignee_country(mut self, country: impl Into<String>) -> Self {
        self.consignee_country = Some(country.into());
        self
    }

    pub fn incoterm(mut self, code: impl Into<String>) -> Self {
        self.incoterm = Some(code.into());
        self
    }

    pub fn expedition_place(mut self, place: impl Into<String>) -> Self {
        self.expedition_place = Some(place.into());
        self
    }

    pub fn origin(mut self, reference: impl Into<String>) -> Self {
        self.origin = Some(reference.into());
        self
    }

    pub fn prior_document(mut self, prior: PriorDocument) -> Self {
        self.prior_document = Some(prior);
        self
    }

    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn validate_internal_reference(mut self, validate: bool) -> Self {
        self.validate_internal_reference = validate;
        self
    }

    pub fn addenda_context(mut self, context: AddendaContext) -> Self {
        self.addenda_context = context;
        self
    }

    pub fn build(self) -> Result<Invoice, FelError> {
        let receiver = self
            .receiver
            .ok_or_else(|| FelError::Validation("invoice has no receiver".into()))?;
        if self.lines.is_empty() {
            return Err(FelError::Validation("invoice has no lines".into()));
        }
        if self.currency.trim().is_empty() {
            return Err(FelError::Validation("invoice has no currency".into()));
        }
        Ok(Invoice {
            reference: self.reference,
            doc_type: self.doc_type,
            currency: self.currency,
            exchange_rate: self.exchange_rate,
            date: self.date,
            due_date: self.due_date,
            lines: self.lines,
            receiver,
            phrases: self.phrases,
            consignee: self.consignee,
            consignee_country: self.consignee_country,
            incoterm: self.incoterm,
            expedition_place: self.expedition_place,
            origin: self.origin,
            prior_document: self.prior_document,
            reason: self.reason,
            validate_internal_reference: self.validate_internal_reference,
            addenda_context: self.addenda_context,
        })
    }
}

/// Builder for one invoice line.
pub struct InvoiceLineBuilder {
    description: String,
    quantity: Decimal,
    unit_price: Decimal,
    unit_of_measure: String,
    discount_pct: Decimal,
    line_total: Option<Decimal>,
    is_service: bool,
    taxes: Vec<TaxCharge>,
    product_reference: Option<String>,
}

impl InvoiceLineBuilder {
    pub fn new(description: impl Into<String>, quantity: Decimal, unit_price: Decimal) -> Self {
        Self {
            description: description.into(),
            quantity,
            unit_price,
            unit_of_measure: "UND".to_string(),
            discount_pct: Decimal::ZERO,
            line_total: None,
            is_service: false,
            taxes: Vec::new(),
            product_reference: None,
        }
    }

    pub fn unit(mut self, unit: impl Into<String>) -> Self {
        self.unit_of_measure = unit.into();
        self
    }

    pub fn discount_pct(mut self, pct: Decimal) -> Self {
        self.discount_pct = pct;
        self
    }

    /// Override the computed tax-inclusive line total; used when the host
    /// applies discounts beyond the percentage channel.
    pub fn line_total(mut self, total: Decimal) -> Self {
        self.line_total = Some(total);
        self
    }

    pub fn service(mut self) -> Self {
        self.is_service = true;
        self
    }

    pub fn tax(mut self, tax: TaxCharge) -> Self {
        self.taxes.push(tax);
        self
    }

    pub fn product_reference(mut self, reference: impl Into<String>) -> Self {
        self.product_reference = Some(reference.into());
        self
    }

    pub fn build(self) -> InvoiceLine {
        let hundred = Decimal::ONE_HUNDRED;
        let line_total = self.line_total.unwrap_or_else(|| {
            self.unit_price * self.quantity * (Decimal::ONE - self.discount_pct / hundred)
        });
        InvoiceLine {
            description: self.description,
            quantity: self.quantity,
            unit_of_measure: self.unit_of_measure,
            unit_price: self.unit_price,
            discount_pct: self.discount_pct,
            line_total,
            is_service: self.is_service,
            taxes: self.taxes,
            product_reference: self.product_reference,
        }
    }
}

/// Builder for receiver data.
pub struct ReceiverBuilder {
    info: ReceiverInfo,
}

impl ReceiverBuilder {
    pub fn new(nit: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            info: ReceiverInfo {
                nit: nit.into(),
                name: name.into(),
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
        }
    }

    pub fn legal_name(mut self, name: impl Into<String>) -> Self {
        self.info.legal_name = Some(name.into());
        self
    }

    /// Mark the id as a VAT-registered NIT, enabling registry resolution.
    pub fn vat_registered(mut self) -> Self {
        self.info.vat_registered = true;
        self
    }

    pub fn id_kind(mut self, kind: impl Into<String>) -> Self {
        self.info.id_kind = Some(kind.into());
        self
    }

    pub fn address(
        mut self,
        street: impl Into<String>,
        postal_code: impl Into<String>,
        municipality: impl Into<String>,
        department: impl Into<String>,
        country: impl Into<String>,
    ) -> Self {
        self.info.street = Some(street.into());
        self.info.postal_code = Some(postal_code.into());
        self.info.municipality = Some(municipality.into());
        self.info.department = Some(department.into());
        self.info.country = Some(country.into());
        self
    }

    pub fn email(mut self, email: impl Into<String>) -> Self {
        self.info.email = Some(email.into());
        self
    }

    pub fn reference_code(mut self, code: impl Into<String>) -> Self {
        self.info.reference_code = Some(code.into());
        self
    }

    pub fn build(self) -> ReceiverInfo {
        self.info
    }
}
