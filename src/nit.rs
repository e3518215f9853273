//! Taxpayer registry lookup: resolve a receiver's registered name by NIT
//! through the certifier's query service.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::company::NitServiceConfig;
use crate::core::{FelError, strip_nit};

/// Error from the NIT query service.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum NitLookupError {
    /// Network or HTTP error.
    Network(String),
    /// The service answered with a rejection message.
    Service(String),
    /// Failed to parse the response.
    Parse(String),
}

impl fmt::Display for NitLookupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Network(e) => write!(f, "NIT service network error: {e}"),
            Self::Service(e) => write!(f, "NIT service error: {e}"),
            Self::Parse(e) => write!(f, "NIT service parse error: {e}"),
        }
    }
}

impl std::error::Error for NitLookupError {}

impl From<NitLookupError> for FelError {
    fn from(err: NitLookupError) -> Self {
        match err {
            NitLookupError::Service(message) => FelError::Validation(message),
            NitLookupError::Network(message) | NitLookupError::Parse(message) => {
                FelError::TransportFailure { message }
            }
        }
    }
}

/// Query request body. The service speaks Spanish field names.
#[derive(Serialize)]
struct NitRequest<'a> {
    emisor_codigo: &'a str,
    emisor_clave: &'a str,
    nit_consulta: &'a str,
}

/// Query response: a registered name on success, a message otherwise.
#[derive(Debug, Deserialize)]
struct NitResponse {
    nombre: Option<String>,
    mensaje: Option<String>,
}

/// The registry renders names as comma-separated parts (surnames first);
/// blank parts are dropped and the rest joined with single spaces.
fn join_name_parts(raw: &str) -> String {
    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Look up the registered name for a NIT.
///
/// The NIT is sent without dashes. A service-level rejection (unknown
/// NIT, bad issuer credentials) comes back as [`NitLookupError::Service`]
/// carrying the service's own message.
pub async fn lookup_nit(config: &NitServiceConfig, nit: &str) -> Result<String, NitLookupError> {
    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(30))
        .build()
        .map_err(|e| NitLookupError::Network(e.to_string()))?;

    let plain_nit = strip_nit(nit);
    let req = NitRequest {
        emisor_codigo: &config.issuer_code,
        emisor_clave: &config.issuer_key,
        nit_consulta: &plain_nit,
    };

    let resp = client
        .post(&config.url)
        .json(&req)
        .send()
        .await
        .map_err(|e| NitLookupError::Network(e.to_string()))?;

    let status = resp.status();
    let body = resp
        .text()
        .await
        .map_err(|e| NitLookupError::Network(e.to_string()))?;

    if !status.is_success() {
        return Err(NitLookupError::Network(format!("HTTP {status}: {body}")));
    }

    let parsed: NitResponse = serde_json::from_str(&body)
        .map_err(|e: serde_json::Error| NitLookupError::Parse(e.to_string()))?;

    if let Some(nombre) = parsed.nombre.as_deref().filter(|n| !n.trim().is_empty()) {
        return Ok(join_name_parts(nombre));
    }
    match parsed.mensaje {
        Some(mensaje) if !mensaje.trim().is_empty() => Err(NitLookupError::Service(mensaje)),
        _ => Err(NitLookupError::Parse("response carries neither nombre nor mensaje".into())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_serializes_with_spanish_field_names() {
        let req = NitRequest {
            emisor_codigo: "GT001",
            emisor_clave: "secreta",
            nit_consulta: "12345678",
        };
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains("\"emisor_codigo\":\"GT001\""));
        assert!(json.contains("\"nit_consulta\":\"12345678\""));
    }

    #[test]
    fn registry_names_join_non_blank_parts() {
        assert_eq!(join_name_parts("PEREZ,GOMEZ,JUAN,CARLOS"), "PEREZ GOMEZ JUAN CARLOS");
        assert_eq!(join_name_parts("PEREZ,,JUAN,"), "PEREZ JUAN");
        assert_eq!(join_name_parts("COMERCIAL EL QUETZAL"), "COMERCIAL EL QUETZAL");
        assert_eq!(join_name_parts(" , ,"), "");
    }

    #[test]
    fn response_parses_both_shapes() {
        let ok: NitResponse = serde_json::from_str(r#"{"nombre":"PEREZ,JUAN"}"#).unwrap();
        assert_eq!(ok.nombre.as_deref(), Some("PEREZ,JUAN"));

        let rejected: NitResponse =
            serde_json::from_str(r#"{"mensaje":"NIT no registrado"}"#).unwrap();
        assert!(rejected.nombre.is_none());
        assert_eq!(rejected.mensaje.as_deref(), Some("NIT no registrado"));
    }
}
