//! Contap adapter: SAT `GTDocumento` over SOAP 1.1 with token auth.

use crate::company::{CompanyProfile, ProviderCode};
use crate::core::{CertError, Dte, FelError, NormalizePolicy, StampFormat};
use crate::result::{CertificationResult, parse_certified_at};
use crate::wire::WireRequest;
use crate::wire::soap;

use super::{CancelOrder, ProviderAdapter, preview, require_config, sat};

const WS_NS: &str = "http://ws.contap.com.gt/fel";

pub struct Contap;

impl ProviderAdapter for Contap {
    fn code(&self) -> ProviderCode {
        ProviderCode::Contap
    }

    fn policy(&self) -> NormalizePolicy {
        NormalizePolicy {
            stamp: StampFormat::LocalDateTime,
            ..NormalizePolicy::standard()
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
        let body = format!(
            "<con:CertificaDocumento xmlns:con=\"{WS_NS}\">\
             <con:token>{token}</con:token>\
             <con:xmlDocumento><![CDATA[{xml}]]></con:xmlDocumento>\
             </con:CertificaDocumento>",
            token = company.credentials.token.as_deref().unwrap_or_default(),
        );
        Ok(WireRequest::soap(
            &company.endpoints.certify,
            format!("{WS_NS}/CertificaDocumento"),
            soap::envelope(&body),
        ))
    }

    fn parse_certify_response(&self, body: &str) -> CertificationResult {
        match soap::scrape_tag(body, "estado").as_deref().map(str::trim) {
            Some("OK") => CertificationResult {
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
                "unrecognized Contap response: {}",
                preview(body)
            )),
        }
    }

    /// Contap has no online cancellation service; voiding is done in the
    /// provider's own portal.
    fn cancel_request(
        &self,
        _order: &CancelOrder<'_>,
        _company: &CompanyProfile,
    ) -> Result<WireRequest, FelError> {
        Err(FelError::ProviderRejected {
            errors: vec![CertError::with_category(
                "Contap does not expose an online cancellation service",
                "Configuration",
            )],
        })
    }
}
