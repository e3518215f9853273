//! Infile adapter: SAT `GTDocumento` over SOAP 1.1.

use chrono::NaiveDateTime;

use crate::company::{CompanyProfile, ProviderCode};
use crate::core::{CertError, Dte, FelError, NormalizePolicy, strip_nit};
use crate::result::{CertificationResult, parse_certified_at};
use crate::wire::soap;
use crate::wire::WireRequest;

use super::{CancelOrder, ProviderAdapter, preview, require_config, sat};

const WS_NS: &str = "http://www.infile.com.gt/ws/fel";

pub struct Infile;

impl Infile {
    fn stamp(&self, at: NaiveDateTime) -> String {
        self.policy().stamp.render(at)
    }
}

impl ProviderAdapter for Infile {
    fn code(&self) -> ProviderCode {
        ProviderCode::Infile
    }

    fn policy(&self) -> NormalizePolicy {
        NormalizePolicy {
            requires_exporter_code: true,
            requires_consignee: true,
            ..NormalizePolicy::standard()
        }
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
        sat::gt_documento(dte, &self.policy())
    }

    fn certify_request(
        &self,
        xml: &str,
        company: &CompanyProfile,
    ) -> Result<WireRequest, FelError> {
        let c = &company.credentials;
        let body = format!(
            "<ws:RegistrarDocumentoXML xmlns:ws=\"{WS_NS}\">\
             <ws:usuario>{user}</ws:usuario>\
             <ws:clave>{password}</ws:clave>\
             <ws:claveFirma>{signing}</ws:claveFirma>\
             <ws:nitEmisor>{nit}</ws:nitEmisor>\
             <ws:correoCopia>{email}</ws:correoCopia>\
             <ws:xmlDocumento><![CDATA[{xml}]]></ws:xmlDocumento>\
             </ws:RegistrarDocumentoXML>",
            user = c.user.as_deref().unwrap_or_default(),
            password = c.password.as_deref().unwrap_or_default(),
            signing = c.signing_password.as_deref().unwrap_or_default(),
            nit = strip_nit(&company.nit),
            email = company.email,
        );
        Ok(WireRequest::soap(
            &company.endpoints.certify,
            format!("{WS_NS}/RegistrarDocumentoXML"),
            soap::envelope(&body),
        ))
    }

    fn parse_certify_response(&self, body: &str) -> CertificationResult {
        match soap::scrape_tag(body, "resultado") {
            Some(flag) if flag.trim().eq_ignore_ascii_case("true") => CertificationResult {
                success: true,
                uuid: soap::scrape_tag_nonempty(body, "uuid"),
                series: soap::scrape_tag_nonempty(body, "serie"),
                number: soap::scrape_tag_nonempty(body, "numero"),
                certified_at: soap::scrape_tag_nonempty(body, "fecha_certificacion")
                    .as_deref()
                    .and_then(parse_certified_at),
                signed_xml: soap::scrape_tag_nonempty(body, "xml_firmado"),
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
                "unrecognized Infile response: {}",
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
            "<ws:AnularDocumentoXML xmlns:ws=\"{WS_NS}\">\
             <ws:usuario>{user}</ws:usuario>\
             <ws:clave>{password}</ws:clave>\
             <ws:claveFirma>{signing}</ws:claveFirma>\
             <ws:nitEmisor>{nit}</ws:nitEmisor>\
             <ws:nitReceptor>{receiver}</ws:nitReceptor>\
             <ws:idDocumento>{uuid}</ws:idDocumento>\
             <ws:fechaEmisionDocumento>{issued}</ws:fechaEmisionDocumento>\
             <ws:fechaAnulacion>{cancelled}</ws:fechaAnulacion>\
             <ws:motivoAnulacion>{reason}</ws:motivoAnulacion>\
             </ws:AnularDocumentoXML>",
            user = c.user.as_deref().unwrap_or_default(),
            password = c.password.as_deref().unwrap_or_default(),
            signing = c.signing_password.as_deref().unwrap_or_default(),
            nit = strip_nit(&company.nit),
            receiver = order.receiver_nit,
            uuid = order.uuid,
            issued = self.stamp(order.certified_on),
            cancelled = self.stamp(order.cancelled_at),
            reason = order.reason,
        );
        Ok(WireRequest::soap(
            &company.endpoints.cancel,
            format!("{WS_NS}/AnularDocumentoXML"),
            soap::envelope(&body),
        ))
    }
}
