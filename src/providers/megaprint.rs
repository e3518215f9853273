//! MegaPrint adapter: SAT `GTDocumento` posted as bare XML with a bearer
//! token, plus server-side PDF retrieval.

use chrono::NaiveDateTime;
use uuid::Uuid;

use crate::company::{CompanyProfile, ProviderCode};
use crate::core::{AddendumNaming, Dte, DteType, FelError, NormalizePolicy};
use crate::result::{CertificationResult, parse_certified_at};
use crate::wire::WireRequest;
use crate::wire::soap;

use super::{CancelOrder, ProviderAdapter, preview, require_config, sat};

pub struct MegaPrint;

impl MegaPrint {
    /// The service wants the exact literal `bearer`, lower case.
    fn authorization(company: &CompanyProfile) -> String {
        format!(
            "bearer {}",
            company.credentials.token.as_deref().unwrap_or_default()
        )
    }
}

impl ProviderAdapter for MegaPrint {
    fn code(&self) -> ProviderCode {
        ProviderCode::MegaPrint
    }

    fn policy(&self) -> NormalizePolicy {
        NormalizePolicy {
            addendum_naming: AddendumNaming::NumberedValue,
            ascii_addenda: true,
            requires_consignee: true,
            ..NormalizePolicy::standard()
        }
    }

    fn key_identifier(
        &self,
        stored: Option<&str>,
        _company: &mut CompanyProfile,
        _doc_type: DteType,
        _now: NaiveDateTime,
    ) -> String {
        match stored {
            Some(key) => key.to_string(),
            None => Uuid::new_v4().to_string().to_uppercase(),
        }
    }

    fn check_credentials(&self, company: &CompanyProfile) -> Result<(), FelError> {
        require_config(&[
            ("credentials.token", company.credentials.token.as_deref()),
            ("endpoints.certify", Some(&company.endpoints.certify)),
        ])
    }

    fn serialize(&self, dte: &Dte) -> Result<String, FelError> {
        sat::gt_documento(dte, &self.policy())
    }

    fn certify_request(
        &self,
        xml: &str,
        company: &CompanyProfile,
    ) -> Result<WireRequest, FelError> {
        Ok(
            WireRequest::xml(&company.endpoints.certify, xml.to_string())
                .with_authorization(Self::authorization(company)),
        )
    }

    fn parse_certify_response(&self, body: &str) -> CertificationResult {
        let errors = soap::scrape_error_blocks(body, "error");
        if !errors.is_empty() {
            let mut result = CertificationResult::rejected(errors);
            result.description = soap::scrape_tag_nonempty(body, "descripcion");
            return result;
        }
        match soap::scrape_tag_nonempty(body, "uuid") {
            Some(uuid) => CertificationResult {
                success: true,
                uuid: Some(uuid),
                series: soap::scrape_tag_nonempty(body, "serie"),
                number: soap::scrape_tag_nonempty(body, "numero"),
                certified_at: soap::scrape_tag_nonempty(body, "fecha_certificacion")
                    .as_deref()
                    .and_then(parse_certified_at),
                certified_xml: soap::scrape_tag_nonempty(body, "xml_certificado"),
                ..CertificationResult::default()
            },
            None => CertificationResult::failed(format!(
                "unrecognized MegaPrint response: {}",
                preview(body)
            )),
        }
    }

    fn cancel_request(
        &self,
        order: &CancelOrder<'_>,
        company: &CompanyProfile,
    ) -> Result<WireRequest, FelError> {
        require_config(&[
            ("credentials.token", company.credentials.token.as_deref()),
            ("endpoints.cancel", Some(&company.endpoints.cancel)),
        ])?;
        let stamp = self.policy().stamp;
        let body = format!(
            "<AnulaDocumentoRequest>\
             <uuid>{uuid}</uuid>\
             <nit_receptor>{receiver}</nit_receptor>\
             <fecha_emision>{issued}</fecha_emision>\
             <fecha_anulacion>{cancelled}</fecha_anulacion>\
             <motivo>{reason}</motivo>\
             </AnulaDocumentoRequest>",
            uuid = order.uuid,
            receiver = order.receiver_nit,
            issued = stamp.render(order.certified_on),
            cancelled = stamp.render(order.cancelled_at),
            reason = order.reason,
        );
        Ok(WireRequest::xml(&company.endpoints.cancel, body)
            .with_authorization(Self::authorization(company)))
    }

    fn pdf_request(&self, uuid: &str, company: &CompanyProfile) -> Option<WireRequest> {
        let url = company.endpoints.pdf.as_deref()?;
        let body = format!("<RetornaPDFRequest><uuid>{uuid}</uuid></RetornaPDFRequest>");
        Some(WireRequest::xml(url, body).with_authorization(Self::authorization(company)))
    }

    fn parse_pdf_response(&self, body: &str) -> Option<String> {
        soap::scrape_tag_nonempty(body, "pdf")
    }
}
