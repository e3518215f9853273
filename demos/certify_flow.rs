use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rust_decimal_macros::dec;
use timbrado::certify::{Certifier, MemorySink};
use timbrado::company::{CompanyProfile, ProviderCode};
use timbrado::core::*;
use timbrado::record::DteRecord;
use timbrado::wire::{Transport, TransportError, WireClient, WireRequest, WireResponse};

/// Replays canned provider responses; an empty queue behaves like an
/// unreachable provider.
struct Canned {
    replies: Mutex<VecDeque<WireResponse>>,
}

impl Canned {
    fn with(bodies: &[&str]) -> Self {
        Self {
            replies: Mutex::new(
                bodies
                    .iter()
                    .map(|body| WireResponse {
                        status: 200,
                        body: (*body).to_string(),
                    })
                    .collect(),
            ),
        }
    }
}

#[async_trait]
impl Transport for Canned {
    async fn send(&self, _request: &WireRequest) -> Result<WireResponse, TransportError> {
        match self.replies.lock().expect("reply queue poisoned").pop_front() {
            Some(response) => Ok(response),
            None => Err(TransportError::Timeout),
        }
    }
}

fn company() -> CompanyProfile {
    let mut company = CompanyProfile::new(
        "1234567-8",
        "Comercial La Ceiba, S.A.",
        IvaRegime::General,
        "1",
        Direccion::new("4a Calle 5-20 Zona 1", "01001", "Guatemala", "Guatemala", "GT"),
    );
    company.email = "facturas@laceiba.com.gt".into();
    company.provider = Some(ProviderCode::Infile);
    company.credentials.user = Some("laceiba.fel".into());
    company.credentials.password = Some("s3cre7".into());
    company.credentials.signing_password = Some("firma".into());
    company.endpoints.certify = "https://fel.test/certify".into();
    company.endpoints.cancel = "https://fel.test/cancel".into();
    company
}

fn invoice(reference: &str) -> Invoice {
    InvoiceBuilder::new(reference, DteType::Fact)
        .receiver(ReceiverBuilder::new("CF", "Consumidor Final").build())
        .add_line(
            InvoiceLineBuilder::new("Caja de carton", dec!(1), dec!(100))
                .tax(TaxCharge::new("IVA", "IVA", dec!(12)))
                .build(),
        )
        .build()
        .expect("invoice should be valid")
}

#[tokio::main]
async fn main() {
    // One scripted success; the second document finds the queue empty and
    // the provider unreachable.
    let transport = Canned::with(&["<RegistrarDocumentoXMLResponse>\
        <resultado>true</resultado>\
        <uuid>0AF8C2E1-6DDE-4C5B-93A8-1A2B3C4D5E6F</uuid>\
        <serie>6DDE4C5B</serie>\
        <numero>93</numero>\
        <fecha_certificacion>2024-03-05T10:30:05</fecha_certificacion>\
        </RegistrarDocumentoXMLResponse>"]);
    let sink = Arc::new(Mutex::new(MemorySink::default()));
    let mut certifier = Certifier::new(
        company(),
        WireClient::new(Box::new(transport)),
        Box::new(sink.clone()),
    );

    // ── 1. Normal certification ───────────────────────────────────────
    println!("=== Certification ===");
    let mut record = DteRecord::new("FAC-0001");
    let issuance = certifier
        .issue(&mut record, &invoice("FAC-0001"))
        .await
        .expect("certification failed");
    println!("  success: {}", issuance.result.success);
    println!("  uuid:    {}", record.fel_uuid.as_deref().unwrap_or("-"));
    println!(
        "  doc:     serie {} numero {}",
        record.fel_series.as_deref().unwrap_or("-"),
        record.fel_number.as_deref().unwrap_or("-"),
    );

    // ── 2. Provider outage: contingency issuance ──────────────────────
    println!("=== Outage ===");
    let mut offline = DteRecord::new("FAC-0002");
    let issuance = certifier
        .issue(&mut offline, &invoice("FAC-0002"))
        .await
        .expect("contingency issuance failed");
    println!("  success: {}", issuance.result.success);
    println!(
        "  access:  {}",
        offline
            .access_number
            .map(|n| n.to_string())
            .unwrap_or_else(|| "-".into()),
    );
    if let Some(window) = certifier.tracker().open_window() {
        println!("  window:  {} holding {:?}", window.id, window.references);
    }

    // ── 3. Audit trail ────────────────────────────────────────────────
    println!("=== Audit log ===");
    for entry in &sink.lock().expect("sink poisoned").entries {
        println!(
            "  [{}] {} window={:?} {}",
            entry.kind.code(),
            entry.reference,
            entry.window,
            entry.response,
        );
    }
}
