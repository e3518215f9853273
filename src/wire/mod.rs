//! HTTP plumbing shared by the provider adapters.
//!
//! Adapters build [`WireRequest`]s; the [`WireClient`] pushes them through
//! a [`Transport`] and applies the contingency rule: when the provider is
//! unreachable, a fresh access number is issued so the document stays
//! legally issuable offline.

pub mod soap;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use crate::company::AccessCounter;
use crate::core::FelError;

/// Failure description providers file when the wire call timed out.
pub const COMMUNICATION_TIMEOUT_MESSAGE: &str =
    "ERROR DE COMUNICACIÓN POR TIEMPO DE ESPERA EXCEDIDO";
/// Failure description for any other unreachability.
pub const COMMUNICATION_FAILURE_MESSAGE: &str = "ERROR DE COMUNICACIÓN GENERAL";

/// Gateway statuses that mean the certifier never saw the request.
const GATEWAY_TIMEOUT_STATUSES: [u16; 2] = [522, 524];

const WIRE_TIMEOUT: Duration = Duration::from_secs(60);

/// One outbound provider call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireRequest {
    pub url: String,
    pub body: String,
    pub content_type: &'static str,
    /// SOAPAction header for SOAP 1.1 endpoints.
    pub soap_action: Option<String>,
    /// Authorization header value, sent verbatim.
    pub authorization: Option<String>,
}

impl WireRequest {
    pub fn soap(url: impl Into<String>, action: impl Into<String>, body: String) -> Self {
        Self {
            url: url.into(),
            body,
            content_type: "text/xml; charset=utf-8",
            soap_action: Some(action.into()),
            authorization: None,
        }
    }

    pub fn json(url: impl Into<String>, body: String) -> Self {
        Self {
            url: url.into(),
            body,
            content_type: "application/json",
            soap_action: None,
            authorization: None,
        }
    }

    pub fn xml(url: impl Into<String>, body: String) -> Self {
        Self {
            url: url.into(),
            body,
            content_type: "application/xml",
            soap_action: None,
            authorization: None,
        }
    }

    pub fn with_authorization(mut self, value: impl Into<String>) -> Self {
        self.authorization = Some(value.into());
        self
    }
}

/// Raw reply from the provider, any status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireResponse {
    pub status: u16,
    pub body: String,
}

/// Transport-level failure, before any provider semantics apply.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("{0}")]
    Other(String),
}

/// Anything that can carry a [`WireRequest`] to a provider.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &WireRequest) -> Result<WireResponse, TransportError>;
}

/// Shared handle so a test or caller can keep inspecting the transport
/// while the client owns it.
#[async_trait]
impl<T: Transport + ?Sized> Transport for std::sync::Arc<T> {
    async fn send(&self, request: &WireRequest) -> Result<WireResponse, TransportError> {
        (**self).send(request).await
    }
}

/// The production transport over reqwest.
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self, FelError> {
        let client = reqwest::Client::builder()
            .timeout(WIRE_TIMEOUT)
            .build()
            .map_err(|e| FelError::TransportFailure {
                message: e.to_string(),
            })?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &WireRequest) -> Result<WireResponse, TransportError> {
        let mut builder = self
            .client
            .post(&request.url)
            .header(reqwest::header::CONTENT_TYPE, request.content_type)
            .body(request.body.clone());
        if let Some(action) = &request.soap_action {
            builder = builder.header("SOAPAction", action);
        }
        if let Some(value) = &request.authorization {
            builder = builder.header(reqwest::header::AUTHORIZATION, value);
        }

        let response = builder.send().await.map_err(classify_reqwest_error)?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| TransportError::Other(e.to_string()))?;
        Ok(WireResponse { status, body })
    }
}

fn classify_reqwest_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout
    } else if err.is_connect() {
        TransportError::Connect(err.to_string())
    } else {
        TransportError::Other(err.to_string())
    }
}

/// How a certification submission failed on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireFailure {
    /// Provider unreachable. The document received this access number and
    /// belongs in a contingency window.
    Unreachable { access_number: u32, message: String },
    /// The call failed for a non-contingency reason.
    Failed { message: String },
}

/// Transport wrapper applying the access-number rule.
pub struct WireClient {
    transport: Box<dyn Transport>,
}

impl WireClient {
    pub fn new(transport: Box<dyn Transport>) -> Self {
        Self { transport }
    }

    pub fn over_http() -> Result<Self, FelError> {
        Ok(Self::new(Box::new(HttpTransport::new()?)))
    }

    /// Submit a certification call. Timeouts, connection failures, and
    /// gateway timeout statuses issue a fresh access number.
    pub async fn dispatch(
        &self,
        request: &WireRequest,
        counter: &mut AccessCounter,
    ) -> Result<WireResponse, WireFailure> {
        match self.transport.send(request).await {
            Ok(response) if GATEWAY_TIMEOUT_STATUSES.contains(&response.status) => {
                Err(WireFailure::Unreachable {
                    access_number: counter.next_access_number(),
                    message: COMMUNICATION_FAILURE_MESSAGE.to_string(),
                })
            }
            Ok(response) => Ok(response),
            Err(TransportError::Timeout) => Err(WireFailure::Unreachable {
                access_number: counter.next_access_number(),
                message: COMMUNICATION_TIMEOUT_MESSAGE.to_string(),
            }),
            Err(TransportError::Connect(_)) => Err(WireFailure::Unreachable {
                access_number: counter.next_access_number(),
                message: COMMUNICATION_FAILURE_MESSAGE.to_string(),
            }),
            Err(TransportError::Other(message)) => Err(WireFailure::Failed { message }),
        }
    }

    /// Send a call outside the contingency flow (cancellation, PDF
    /// retrieval). Failures surface as plain transport errors.
    pub async fn send(&self, request: &WireRequest) -> Result<WireResponse, FelError> {
        self.transport
            .send(request)
            .await
            .map_err(|err| FelError::TransportFailure {
                message: err.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedStatus(u16);

    #[async_trait]
    impl Transport for FixedStatus {
        async fn send(&self, _request: &WireRequest) -> Result<WireResponse, TransportError> {
            Ok(WireResponse {
                status: self.0,
                body: "<ok/>".to_string(),
            })
        }
    }

    struct FailWith(TransportError);

    #[async_trait]
    impl Transport for FailWith {
        async fn send(&self, _request: &WireRequest) -> Result<WireResponse, TransportError> {
            Err(self.0.clone())
        }
    }

    fn request() -> WireRequest {
        WireRequest::xml("https://cert.example.gt/dte", "<GTDocumento/>".to_string())
    }

    #[tokio::test]
    async fn timeouts_issue_sequential_access_numbers() {
        let client = WireClient::new(Box::new(FailWith(TransportError::Timeout)));
        let mut counter = AccessCounter::new();

        match client.dispatch(&request(), &mut counter).await {
            Err(WireFailure::Unreachable {
                access_number,
                message,
            }) => {
                assert_eq!(access_number, 1);
                assert_eq!(message, COMMUNICATION_TIMEOUT_MESSAGE);
            }
            other => panic!("expected unreachable, got {other:?}"),
        }
        match client.dispatch(&request(), &mut counter).await {
            Err(WireFailure::Unreachable { access_number, .. }) => assert_eq!(access_number, 2),
            other => panic!("expected unreachable, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn gateway_timeout_statuses_count_as_unreachable() {
        let mut counter = AccessCounter::new();
        for status in [522, 524] {
            let client = WireClient::new(Box::new(FixedStatus(status)));
            match client.dispatch(&request(), &mut counter).await {
                Err(WireFailure::Unreachable { message, .. }) => {
                    assert_eq!(message, COMMUNICATION_FAILURE_MESSAGE)
                }
                other => panic!("expected unreachable for {status}, got {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn ordinary_statuses_pass_through() {
        let client = WireClient::new(Box::new(FixedStatus(400)));
        let mut counter = AccessCounter::new();
        let response = client.dispatch(&request(), &mut counter).await.unwrap();
        assert_eq!(response.status, 400);
        assert_eq!(counter.peek(), 1);
    }

    #[tokio::test]
    async fn protocol_errors_do_not_open_contingency() {
        let client = WireClient::new(Box::new(FailWith(TransportError::Other(
            "bad redirect".to_string(),
        ))));
        let mut counter = AccessCounter::new();
        match client.dispatch(&request(), &mut counter).await {
            Err(WireFailure::Failed { message }) => assert_eq!(message, "bad redirect"),
            other => panic!("expected failed, got {other:?}"),
        }
        assert_eq!(counter.peek(), 1);
    }

    #[test]
    fn soap_requests_carry_the_action_header() {
        let req = WireRequest::soap("https://fel.example.gt/ws", "urn:certify", "<x/>".into());
        assert_eq!(req.soap_action.as_deref(), Some("urn:certify"));
        assert_eq!(req.content_type, "text/xml; charset=utf-8");
        assert!(req.authorization.is_none());
    }
}
