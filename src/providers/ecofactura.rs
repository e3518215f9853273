//! Ecofactura adapter: flat `Transaccion` element set over SOAP 1.1.
//!
//! Ecofactura computes document totals remotely, draws a fresh per-type
//! sequence number on every attempt, and renders amounts with 6 decimals.

use chrono::NaiveDateTime;

use crate::company::{CompanyProfile, ProviderCode};
use crate::core::{
    AddendumNaming, CertError, Complement, Dte, DteType, DteUse, EspecialKind, FelError,
    NormalizePolicy, StampFormat, strip_nit,
};
use crate::result::{CertificationResult, parse_certified_at};
use crate::wire::WireRequest;
use crate::wire::soap;

use super::xml::XmlWriter;
use super::{CancelOrder, ProviderAdapter, preview, require_config};

const WS_NS: &str = "http://www.ecofactura.com.gt/fel";

pub struct Ecofactura;

impl ProviderAdapter for Ecofactura {
    fn code(&self) -> ProviderCode {
        ProviderCode::Ecofactura
    }

    fn policy(&self) -> NormalizePolicy {
        NormalizePolicy {
            precision: 6,
            per_line_amounts: false,
            document_totals: false,
            fesp_complement: false,
            stamp: StampFormat::DateOnly,
            addendum_naming: AddendumNaming::NumberedField,
            ..NormalizePolicy::standard()
        }
    }

    /// A fresh sequence number per attempt; earlier keys are never reused.
    fn key_identifier(
        &self,
        _stored: Option<&str>,
        company: &mut CompanyProfile,
        doc_type: DteType,
        _now: NaiveDateTime,
    ) -> String {
        company.next_document_identifier(doc_type)
    }

    fn check_credentials(&self, company: &CompanyProfile) -> Result<(), FelError> {
        let c = &company.credentials;
        require_config(&[
            ("credentials.user", c.user.as_deref()),
            ("credentials.password", c.password.as_deref()),
            ("credentials.signing_password", c.signing_password.as_deref()),
            ("company.nit", Some(&company.nit)),
            ("company.email", Some(&company.email)),
            ("endpoints.certify", Some(&company.endpoints.certify)),
        ])
    }

    fn serialize(&self, dte: &Dte) -> Result<String, FelError> {
        transaccion(dte, self.policy().precision)
    }

    fn certify_request(
        &self,
        xml: &str,
        company: &CompanyProfile,
    ) -> Result<WireRequest, FelError> {
        let c = &company.credentials;
        let body = format!(
            "<eco:Certifica xmlns:eco=\"{WS_NS}\">\
             <eco:usuario>{user}</eco:usuario>\
             <eco:clave>{password}</eco:clave>\
             <eco:claveCertificado>{signing}</eco:claveCertificado>\
             <eco:nit>{nit}</eco:nit>\
             <eco:correo>{email}</eco:correo>\
             <eco:xmlTransaccion><![CDATA[{xml}]]></eco:xmlTransaccion>\
             </eco:Certifica>",
            user = c.user.as_deref().unwrap_or_default(),
            password = c.password.as_deref().unwrap_or_default(),
            signing = c.signing_password.as_deref().unwrap_or_default(),
            nit = strip_nit(&company.nit),
            email = company.email,
        );
        Ok(WireRequest::soap(
            &company.endpoints.certify,
            format!("{WS_NS}/Certifica"),
            soap::envelope(&body),
        ))
    }

    fn parse_certify_response(&self, body: &str) -> CertificationResult {
        match soap::scrape_tag(body, "estado").as_deref().map(str::trim) {
            Some("0") => CertificationResult {
                success: true,
                uuid: soap::scrape_tag_nonempty(body, "uuid"),
                series: soap::scrape_tag_nonempty(body, "serie"),
                number: soap::scrape_tag_nonempty(body, "numero"),
                certified_at: soap::scrape_tag_nonempty(body, "fecha_certificacion")
                    .as_deref()
                    .and_then(parse_certified_at),
                certified_xml: soap::scrape_tag_nonempty(body, "xml_certificado"),
                ..CertificationResult::default()
            },
            Some(_) => {
                let mut errors = soap::scrape_error_blocks(body, "error");
                let description = soap::scrape_tag_nonempty(body, "descripcion");
                if errors.is_empty() {
                    if let Some(text) = description.as_deref() {
                        errors.push(CertError::new(text));
                    }
                }
                let mut result = CertificationResult::rejected(errors);
                result.description = description;
                result
            }
            None => CertificationResult::failed(format!(
                "unrecognized Ecofactura response: {}",
                preview(body)
            )),
        }
    }

    fn cancel_request(
        &self,
        order: &CancelOrder<'_>,
        company: &CompanyProfile,
    ) -> Result<WireRequest, FelError> {
        self.check_credentials(company)?;
        require_config(&[("endpoints.cancel", Some(&company.endpoints.cancel))])?;
        let c = &company.credentials;
        let body = format!(
            "<eco:Anula xmlns:eco=\"{WS_NS}\">\
             <eco:usuario>{user}</eco:usuario>\
             <eco:clave>{password}</eco:clave>\
             <eco:claveCertificado>{signing}</eco:claveCertificado>\
             <eco:nit>{nit}</eco:nit>\
             <eco:autorizacion>{uuid}</eco:autorizacion>\
             <eco:motivo>{reason}</eco:motivo>\
             </eco:Anula>",
            user = c.user.as_deref().unwrap_or_default(),
            password = c.password.as_deref().unwrap_or_default(),
            signing = c.signing_password.as_deref().unwrap_or_default(),
            nit = strip_nit(&company.nit),
            uuid = order.uuid,
            reason = order.reason,
        );
        Ok(WireRequest::soap(
            &company.endpoints.cancel,
            format!("{WS_NS}/Anula"),
            soap::envelope(&body),
        ))
    }
}

/// Render the flat `Transaccion` document.
fn transaccion(dte: &Dte, precision: u32) -> Result<String, FelError> {
    let mut w = XmlWriter::new()?;
    w.start_element("Transaccion")?
        .text_element("TrnEstNum", &dte.emisor.establishment_code)?
        .text_element("TipTrnCod", dte.doc_type.code())?
        .text_element("TrnNum", &dte.key_identifier)?
        .text_element("TrnFec", &StampFormat::DateOnly.render(dte.issued_at))?
        .text_element("TrnMonCod", &dte.currency)?
        .text_element(
            "TrnExp",
            if dte.use_kind == DteUse::Export { "1" } else { "0" },
        )?
        .text_element("TrnBenConNIT", &dte.receptor.id)?
        .text_element("TrnCliTip", EspecialKind::classify(&dte.receptor).code())?
        .text_element("TrnCliNom", &dte.receptor.name)?
        .text_element("TrnCliDir", &dte.receptor.address.street)?
        .text_element("TrnCliEmail", &dte.receptor.email)?;

    if !dte.phrases.is_empty() {
        w.start_element("TrnFrases")?;
        for phrase in &dte.phrases {
            w.start_element("TrnFrase")?
                .text_element("TrnFraTip", &phrase.phrase_type)?
                .text_element("TrnEscCod", &phrase.scenario_code)?
                .end_element("TrnFrase")?;
        }
        w.end_element("TrnFrases")?;
    }

    w.start_element("TrnLineas")?;
    for item in &dte.items {
        w.start_element("TrnLinea")?
            .text_element("TrnLinNum", &item.number.to_string())?
            .text_element("TrnArtBienSrv", item.kind.code())?
            .amount_element("TrnCan", item.quantity, precision)?
            .text_element("TrnUniMed", &item.unit_of_measure)?
            .text_element("TrnArtNom", &item.description)?
            .amount_element("TrnVUn", item.unit_price, precision)?
            .amount_element("TrnVDes", item.discount, precision)?;
        if !item.taxes.is_empty() {
            w.start_element("TrnImps")?;
            for tax in &item.taxes {
                w.start_element("TrnImp")?
                    .text_element("TrnImpNomCorto", &tax.short_name)?
                    .text_element("TrnImpUniGrav", &tax.unit_code.to_string())?
                    .amount_element("TrnImpBase", tax.taxable, precision)?
                    .amount_element("TrnImpMonto", tax.amount, precision)?
                    .end_element("TrnImp")?;
            }
            w.end_element("TrnImps")?;
        }
        w.end_element("TrnLinea")?;
    }
    w.end_element("TrnLineas")?;

    for complement in &dte.complements {
        write_complement(&mut w, complement, precision)?;
    }

    for addendum in &dte.addenda {
        w.text_element(&addendum.name, &addendum.value)?;
    }

    w.end_element("Transaccion")?;
    w.into_string()
}

fn write_complement(
    w: &mut XmlWriter,
    complement: &Complement,
    precision: u32,
) -> Result<(), FelError> {
    match complement {
        Complement::Note(note) => {
            w.start_element("TrnNotaRef")?
                .text_element("TrnRefRegimen", if note.ancient { "FACE" } else { "FEL" })?
                .text_element("TrnRefAut", &note.origin_authorization)?
                .text_element("TrnRefSerie", &note.origin_series)?
                .text_element("TrnRefNum", &note.origin_number)?
                .text_element(
                    "TrnRefFec",
                    &note.origin_issued_on.format("%Y-%m-%d").to_string(),
                )?
                .text_element("TrnRefMotivo", &note.reason)?
                .end_element("TrnNotaRef")?;
        }
        Complement::Installment(installment) => {
            w.start_element("TrnAbonos")?
                .start_element("TrnAbono")?
                .text_element("TrnAbonoNum", &installment.number.to_string())?
                .text_element(
                    "TrnAbonoFec",
                    &installment.due_date.format("%Y-%m-%d").to_string(),
                )?
                .amount_element("TrnAbonoMonto", installment.amount, precision)?
                .end_element("TrnAbono")?
                .end_element("TrnAbonos")?;
        }
        Complement::SpecialRegime(regime) => {
            w.amount_element("TrnRetISR", regime.isr_withheld, precision)?
                .amount_element("TrnRetIVA", regime.iva_withheld, precision)?
                .amount_element("TrnRetNeto", regime.net_payable, precision)?;
        }
        Complement::Export(export) => {
            w.start_element("TrnExpComp")?
                .text_element("TrnExpNomConsig", &export.consignee_name)?
                .text_element("TrnExpDirConsig", &export.consignee_address)?
                .text_element("TrnExpCodConsig", &export.consignee_code)?
                .text_element("TrnExpNomComprador", &export.buyer_name)?
                .text_element("TrnExpDirComprador", &export.buyer_address)?
                .text_element("TrnExpCodComprador", &export.buyer_code)?
                .text_element("TrnExpOtraRef", &export.origin_reference)?
                .text_element("TrnExpIncoterm", &export.incoterm)?
                .text_element("TrnExpNomExportador", &export.exporter_name)?
                .text_element("TrnExpCodExportador", &export.exporter_code)?
                .end_element("TrnExpComp")?;
        }
    }
    Ok(())
}
