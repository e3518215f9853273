//! Digifact adapter: SAT `GTDocumento` over a JSON REST service.
//!
//! Digifact is the odd one out twice over: plain XML escaping (its service
//! re-encodes entities itself) and a fixed internal-reference addendum
//! instead of the configured mappings.

use serde::{Deserialize, Serialize};

use crate::company::{CompanyProfile, ProviderCode};
use crate::core::{
    AddendumNaming, CertError, Dte, EscapeMode, FelError, NormalizePolicy, StampFormat, strip_nit,
};
use crate::result::{CertificationResult, parse_certified_at};
use crate::wire::WireRequest;

use super::{CancelOrder, ProviderAdapter, preview, require_config, sat};

pub struct Digifact;

#[derive(Serialize)]
struct CertifyBody<'a> {
    nit_emisor: &'a str,
    xml_dte: &'a str,
}

#[derive(Serialize)]
struct CancelBody<'a> {
    nit_emisor: &'a str,
    nit_receptor: &'a str,
    uuid: &'a str,
    motivo_anulacion: &'a str,
    fecha_emision: String,
    fecha_anulacion: String,
}

#[derive(Deserialize)]
struct Reply {
    codigo: Option<i64>,
    descripcion: Option<String>,
    uuid: Option<String>,
    serie: Option<String>,
    numero: Option<String>,
    fecha_certificacion: Option<String>,
    xml_certificado: Option<String>,
    #[serde(default)]
    errores: Vec<ReplyError>,
}

#[derive(Deserialize)]
struct ReplyError {
    mensaje: Option<String>,
    fuente: Option<String>,
    categoria: Option<String>,
    numeral: Option<String>,
    validacion: Option<String>,
}

impl From<ReplyError> for CertError {
    fn from(e: ReplyError) -> Self {
        CertError::detailed(
            e.mensaje.unwrap_or_default(),
            e.fuente.unwrap_or_default(),
            e.categoria.unwrap_or_default(),
            e.numeral.unwrap_or_default(),
            e.validacion.unwrap_or_default(),
        )
    }
}

fn encode<T: Serialize>(body: &T) -> Result<String, FelError> {
    serde_json::to_string(body)
        .map_err(|e| FelError::Validation(format!("could not encode the Digifact request: {e}")))
}

impl ProviderAdapter for Digifact {
    fn code(&self) -> ProviderCode {
        ProviderCode::Digifact
    }

    fn policy(&self) -> NormalizePolicy {
        NormalizePolicy {
            escape_mode: EscapeMode::Plain,
            stamp: StampFormat::LocalDateTime,
            addendum_naming: AddendumNaming::InternalReference,
            requires_consignee: true,
            ..NormalizePolicy::standard()
        }
    }

    fn check_credentials(&self, company: &CompanyProfile) -> Result<(), FelError> {
        let c = &company.credentials;
        require_config(&[
            ("credentials.token", c.token.as_deref()),
            ("credentials.digifact_nit", c.digifact_nit.as_deref()),
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
        let body = encode(&CertifyBody {
            nit_emisor: c.digifact_nit.as_deref().unwrap_or_default(),
            xml_dte: xml,
        })?;
        Ok(WireRequest::json(&company.endpoints.certify, body)
            .with_authorization(c.token.clone().unwrap_or_default()))
    }

    fn parse_certify_response(&self, body: &str) -> CertificationResult {
        let reply: Reply = match serde_json::from_str(body) {
            Ok(reply) => reply,
            Err(_) => {
                return CertificationResult::failed(format!(
                    "unrecognized Digifact response: {}",
                    preview(body)
                ));
            }
        };
        if reply.codigo == Some(1) {
            CertificationResult {
                success: true,
                uuid: reply.uuid.filter(|v| !v.is_empty()),
                series: reply.serie.filter(|v| !v.is_empty()),
                number: reply.numero.filter(|v| !v.is_empty()),
                certified_at: reply
                    .fecha_certificacion
                    .as_deref()
                    .and_then(parse_certified_at),
                certified_xml: reply.xml_certificado.filter(|v| !v.is_empty()),
                ..CertificationResult::default()
            }
        } else {
            let mut errors: Vec<CertError> =
                reply.errores.into_iter().map(CertError::from).collect();
            if errors.is_empty() {
                if let Some(text) = reply.descripcion.as_deref() {
                    errors.push(CertError::new(text));
                }
            }
            let mut result = CertificationResult::rejected(errors);
            result.description = reply.descripcion;
            result
        }
    }

    fn cancel_request(
        &self,
        order: &CancelOrder<'_>,
        company: &CompanyProfile,
    ) -> Result<WireRequest, FelError> {
        let c = &company.credentials;
        require_config(&[
            ("credentials.token", c.token.as_deref()),
            ("credentials.digifact_nit", c.digifact_nit.as_deref()),
            ("endpoints.cancel", Some(&company.endpoints.cancel)),
        ])?;
        let stamp = self.policy().stamp;
        let body = encode(&CancelBody {
            nit_emisor: &strip_nit(&company.nit),
            nit_receptor: order.receiver_nit,
            uuid: order.uuid,
            motivo_anulacion: order.reason,
            fecha_emision: stamp.render(order.certified_on),
            fecha_anulacion: stamp.render(order.cancelled_at),
        })?;
        Ok(WireRequest::json(&company.endpoints.cancel, body)
            .with_authorization(c.token.clone().unwrap_or_default()))
    }
}
