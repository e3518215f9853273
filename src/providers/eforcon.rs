//! eForcon adapter: `plantilla/dte` template over SOAP 1.1, cancellation
//! by series + number instead of UUID.

use crate::company::{CompanyProfile, ProviderCode};
use crate::core::{
    CertError, Complement, Dte, DteType, DteUse, FelError, NormalizePolicy, StampFormat,
};
use crate::result::{CertificationResult, parse_certified_at};
use crate::wire::WireRequest;
use crate::wire::soap;

use super::xml::XmlWriter;
use super::{CancelOrder, ProviderAdapter, preview, require_config};

const WS_NS: &str = "http://www.eforcon.com/webservice";

/// Per-line tax label when the invoice line has none of its own.
const DEFAULT_TAX_LABEL: &str = "IVA (AFECTO)";

pub struct Eforcon;

impl ProviderAdapter for Eforcon {
    fn code(&self) -> ProviderCode {
        ProviderCode::Eforcon
    }

    fn policy(&self) -> NormalizePolicy {
        NormalizePolicy {
            per_line_amounts: false,
            document_totals: false,
            tax_breakdown: false,
            municipal_codes: true,
            fesp_complement: false,
            stamp: StampFormat::DateOnly,
            ..NormalizePolicy::standard()
        }
    }

    fn check_credentials(&self, company: &CompanyProfile) -> Result<(), FelError> {
        let c = &company.credentials;
        require_config(&[
            ("credentials.user", c.user.as_deref()),
            ("credentials.password", c.password.as_deref()),
            ("endpoints.certify", Some(&company.endpoints.certify)),
        ])
    }

    fn serialize(&self, dte: &Dte) -> Result<String, FelError> {
        plantilla(dte, self.policy().precision)
    }

    fn certify_request(
        &self,
        xml: &str,
        company: &CompanyProfile,
    ) -> Result<WireRequest, FelError> {
        let c = &company.credentials;
        let body = format!(
            "<web:EmitirDteGenerico xmlns:web=\"{WS_NS}\">\
             <web:sUsuario>{user}</web:sUsuario>\
             <web:sClave>{password}</web:sClave>\
             <web:sXmlDte><![CDATA[{xml}]]></web:sXmlDte>\
             </web:EmitirDteGenerico>",
            user = c.user.as_deref().unwrap_or_default(),
            password = c.password.as_deref().unwrap_or_default(),
        );
        Ok(WireRequest::soap(
            &company.endpoints.certify,
            format!("{WS_NS}/EmitirDteGenerico"),
            soap::envelope(&body),
        ))
    }

    fn parse_certify_response(&self, body: &str) -> CertificationResult {
        match soap::scrape_tag(body, "rwsResultado").as_deref().map(str::trim) {
            Some("true") => CertificationResult {
                success: true,
                uuid: soap::scrape_tag_nonempty(body, "rwsAutorizacionUUID"),
                series: soap::scrape_tag_nonempty(body, "rwsSerieDTE"),
                number: soap::scrape_tag_nonempty(body, "rwsNumeroDTE"),
                certified_at: soap::scrape_tag_nonempty(body, "rwsFechaCertificaDTE")
                    .as_deref()
                    .and_then(parse_certified_at),
                certified_xml: soap::scrape_tag_nonempty(body, "rwsXMLCertificado"),
                pdf_route: soap::scrape_tag_nonempty(body, "rwsRutaPDF"),
                ..CertificationResult::default()
            },
            Some(_) => rejection_from_description(body),
            None => {
                let mut result = CertificationResult::rejected(vec![CertError::detailed(
                    "HTTP call succeeded but the body is not a valid eForcon response",
                    "eForcon",
                    "External",
                    "",
                    "rwsResultado missing from response",
                )]);
                result.description = Some(format!(
                    "unrecognized eForcon response: {}",
                    preview(body)
                ));
                result
            }
        }
    }

    fn cancel_request(
        &self,
        order: &CancelOrder<'_>,
        company: &CompanyProfile,
    ) -> Result<WireRequest, FelError> {
        self.check_credentials(company)?;
        require_config(&[("endpoints.cancel", Some(&company.endpoints.cancel))])?;
        let series = order.series.ok_or(FelError::MissingRequiredField {
            field: "record.fel_series".into(),
        })?;
        let number = order.number.ok_or(FelError::MissingRequiredField {
            field: "record.fel_number".into(),
        })?;
        let c = &company.credentials;
        let body = format!(
            "<web:AnularDteGenerico xmlns:web=\"{WS_NS}\">\
             <web:sUsuario>{user}</web:sUsuario>\
             <web:sClave>{password}</web:sClave>\
             <web:sNumeroDTE>{number}</web:sNumeroDTE>\
             <web:sSerieDTE>{series}</web:sSerieDTE>\
             <web:sMotivo>{reason}</web:sMotivo>\
             </web:AnularDteGenerico>",
            user = c.user.as_deref().unwrap_or_default(),
            password = c.password.as_deref().unwrap_or_default(),
            reason = order.reason,
        );
        Ok(WireRequest::soap(
            &company.endpoints.cancel,
            format!("{WS_NS}/AnularDteGenerico"),
            soap::envelope(&body),
        ))
    }

    fn parse_cancel_response(&self, body: &str) -> CertificationResult {
        match soap::scrape_tag(body, "rwsResultado").as_deref().map(str::trim) {
            Some("true") => CertificationResult {
                success: true,
                certified_at: soap::scrape_tag_nonempty(body, "rwsFechaAnulacionDTE")
                    .as_deref()
                    .and_then(parse_certified_at),
                ..CertificationResult::default()
            },
            _ => rejection_from_description(body),
        }
    }
}

/// Split the one-blob failure description on the literal `ERROR` token.
/// The leading segment before `:` of each fragment doubles as the
/// validation label; this is best effort, the service guarantees nothing.
fn rejection_from_description(body: &str) -> CertificationResult {
    let blob = soap::scrape_tag(body, "rwsDescripcion").unwrap_or_default();
    let errors: Vec<CertError> = blob
        .trim()
        .split("ERROR")
        .filter_map(|fragment| {
            let fragment = fragment.trim();
            if fragment.is_empty() {
                return None;
            }
            let mut error = CertError::new(fragment);
            error.validation = fragment
                .split(':')
                .next()
                .unwrap_or_default()
                .trim()
                .to_string();
            Some(error)
        })
        .collect();
    let mut result = CertificationResult::rejected(errors);
    result.description =
        Some("eForcon rejected the document; review the reported validations and retry".into());
    result
}

/// Render the `plantilla/dte` document.
fn plantilla(dte: &Dte, precision: u32) -> Result<String, FelError> {
    let mut w = XmlWriter::standalone()?;
    w.start_element_with_attrs(
        "plantilla",
        &[("xmlns:xsi", "http://www.w3.org/2001/XMLSchema-instance")],
    )?
    .start_element("dte")?
    .start_element("encabezadoPrincipal")?
    .text_element("codigoInternoEmisor", &dte.key_identifier)?
    .text_element("nitEmisor", &dte.emisor.nit)?
    .text_element("codigoEstablecimiento", &dte.emisor.establishment_code)?
    .text_element(
        "usoComercialDTE",
        match dte.use_kind {
            DteUse::Local => "LOCAL",
            DteUse::Export => "EXPORTACION",
        },
    )?
    .text_element("tipoDTE", dte.doc_type.code())?
    .text_element("fechaEmision", &StampFormat::DateOnly.render(dte.issued_at))?
    .text_element("moneda", &dte.currency)?
    .text_element("tipoReceptor", receiver_kind(dte))?
    .text_element("idReceptor", &dte.receptor.id)?
    .text_element("nombreReceptor", &dte.receptor.name)?
    .text_element("correoReceptor", "")?
    .text_element("copiarCorreoReceptor", "")?
    .text_element("direccionReceptor", &dte.receptor.address.street)?
    .text_element("codigoPostalReceptor", &dte.receptor.address.postal_code)?
    .text_element("municipioReceptor", &dte.receptor.address.municipality)?
    .text_element("departamentoReceptor", &dte.receptor.address.department)?
    .text_element("paisReceptor", &dte.receptor.address.country)?;

    if !dte.phrases.is_empty() {
        w.start_element("frases")?;
        for phrase in &dte.phrases {
            w.start_element("definicionFrase")?
                .text_element("codigoFrase", &phrase.phrase_type)?
                .text_element("codigoEscenario", &phrase.scenario_code)?
                .end_element("definicionFrase")?;
        }
        w.end_element("frases")?;
    }

    if !dte.complements.is_empty() {
        w.start_element("complementos")?;
        for complement in &dte.complements {
            write_complement(&mut w, complement, precision)?;
        }
        w.end_element("complementos")?;
    }

    w.end_element("encabezadoPrincipal")?
        .start_element("detallePrincipal")?;
    for item in &dte.items {
        w.start_element("definicionDP")?
            .text_element("numeroItem", &item.number.to_string())?
            .text_element("bienServicio", item.kind.code())?
            .text_element(
                "nombreCortoImpuesto",
                item.short_tax_name.as_deref().unwrap_or(DEFAULT_TAX_LABEL),
            )?
            .amount_element("cantidad", item.quantity, precision)?
            .text_element("metrica", &item.unit_of_measure)?
            .text_element(
                "valorTasaMunicipal",
                item.municipal_code.as_deref().unwrap_or("0"),
            )?
            .text_element("descripcion", &item.description)?
            .amount_element("precioUnitario", item.unit_price, precision)?
            .amount_element("descuento", item.discount, precision)?
            .end_element("definicionDP")?;
    }
    w.end_element("detallePrincipal")?;

    if !dte.addenda.is_empty() {
        w.start_element("encabezadoExtra")?;
        for addendum in &dte.addenda {
            w.start_element("definicionEE")?
                .text_element("codigoEtiquetaEE", &addendum.name)?
                .text_element("valorEtiquetaEE", &addendum.value)?
                .end_element("definicionEE")?;
        }
        w.end_element("encabezadoExtra")?;
    }

    w.end_element("dte")?.end_element("plantilla")?;
    w.into_string()
}

/// FESP documents address a withholding receiver; otherwise the id-type
/// key rides through, `N` for plain NITs.
fn receiver_kind(dte: &Dte) -> &str {
    if dte.doc_type == DteType::Fesp {
        "C"
    } else {
        dte.receptor.id_kind.as_deref().unwrap_or("N")
    }
}

fn write_complement(
    w: &mut XmlWriter,
    complement: &Complement,
    precision: u32,
) -> Result<(), FelError> {
    match complement {
        Complement::Note(note) => {
            w.text_element("tipoRegimenDTE", if note.ancient { "FACE" } else { "FEL" })?
                .text_element("numeroAutorizacion", &note.origin_authorization)?
                .text_element("motivoAjuste", &note.reason)?
                .text_element(
                    "fechaEmisionOrigen",
                    &note.origin_issued_on.format("%Y-%m-%d").to_string(),
                )?
                .text_element("numeroOrigenFace", &note.origin_number)?
                .text_element("serieOrigenFace", &note.origin_series)?;
        }
        Complement::Installment(installment) => {
            w.text_element("numeroAbonosCAMB", &installment.number.to_string())?
                .text_element(
                    "fechaInicialVenceCAMB",
                    &installment.due_date.format("%Y-%m-%d").to_string(),
                )?
                .text_element("diasEntreAbonosCAMB", "15")?;
        }
        Complement::SpecialRegime(regime) => {
            w.amount_element("cfe:RetencionISR", regime.isr_withheld, precision)?
                .amount_element("cfe:RetencionIVA", regime.iva_withheld, precision)?
                .amount_element("cfe:TotalMenosRetenciones", regime.net_payable, precision)?;
        }
        Complement::Export(export) => {
            w.text_element("LugarExpedicionEXP", &export.expedition_place)?
                .text_element("nombreConsignatarioEXP", &export.consignee_name)?
                .text_element("direccionConsignatarioEXP", &export.consignee_address)?
                .text_element("incotermEXP", &export.incoterm)?
                .text_element("codigoConsignatarioEXP", &export.consignee_code)?
                .text_element("nombreCompradorEXP", &export.buyer_name)?
                .text_element("direccionCompradorEXP", &export.buyer_address)?
                .text_element("codigoCompradorEXP", &export.buyer_code)?
                .text_element("PaisConsignatarioEXP", &export.consignee_country)?
                .text_element("otraReferenciaEXP", &export.origin_reference)?
                .text_element("nombreExportadorEXP", &export.exporter_name)?
                .text_element("codigoExportadorEXP", &export.exporter_code)?;
        }
    }
    Ok(())
}
