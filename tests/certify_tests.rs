#![cfg(all(
    feature = "certify",
    feature = "infile",
    feature = "megaprint",
    feature = "ecofactura",
    feature = "eforcon"
))]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal_macros::dec;
use timbrado::certify::{Certifier, MemorySink};
use timbrado::company::{CompanyProfile, ProviderCode};
use timbrado::core::*;
use timbrado::record::{DocumentState, DteRecord};
use timbrado::wire::{Transport, TransportError, WireClient, WireRequest, WireResponse};

struct Scripted {
    replies: Mutex<VecDeque<Result<WireResponse, TransportError>>>,
    sent: Mutex<Vec<WireRequest>>,
}

impl Scripted {
    fn new(replies: Vec<Result<WireResponse, TransportError>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into_iter().collect()),
            sent: Mutex::new(Vec::new()),
        })
    }

    fn bodies(bodies: &[&str]) -> Arc<Self> {
        Self::new(
            bodies
                .iter()
                .map(|body| {
                    Ok(WireResponse {
                        status: 200,
                        body: (*body).to_string(),
                    })
                })
                .collect(),
        )
    }

    fn sent_bodies(&self) -> Vec<String> {
        self.sent.lock().unwrap().iter().map(|r| r.body.clone()).collect()
    }
}

#[async_trait]
impl Transport for Scripted {
    async fn send(&self, request: &WireRequest) -> Result<WireResponse, TransportError> {
        self.sent.lock().unwrap().push(request.clone());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .expect("unscripted wire call")
    }
}

fn company_for(code: ProviderCode) -> CompanyProfile {
    let mut company = CompanyProfile::new(
        "1234567-8",
        "Comercial La Ceiba, S.A.",
        IvaRegime::General,
        "1",
        Direccion::new("5a avenida 4-41 zona 1", "01001", "Guatemala", "Guatemala", "GT"),
    );
    company.email = "fel@laceiba.com.gt".into();
    company.provider = Some(code);
    company.credentials.user = Some("ceiba".into());
    company.credentials.password = Some("pw".into());
    company.credentials.signing_password = Some("sign".into());
    company.credentials.token = Some("tok-441".into());
    company.endpoints.certify = "https://fel.test/certify".into();
    company.endpoints.cancel = "https://fel.test/cancel".into();
    company.endpoints.pdf = Some("https://fel.test/pdf".into());
    company
}

fn invoice(reference: &str) -> Invoice {
    InvoiceBuilder::new(reference, DteType::Fact)
        .receiver(
            ReceiverBuilder::new("7777444-4", "Distribuidora El Quetzal, S.A.")
                .vat_registered()
                .build(),
        )
        .add_line(
            InvoiceLineBuilder::new("Caja de carton", dec!(1), dec!(100))
                .tax(TaxCharge::new("IVA", "IVA", dec!(12)))
                .build(),
        )
        .build()
        .unwrap()
}

fn certifier(
    company: CompanyProfile,
    transport: Arc<Scripted>,
) -> (Certifier, Arc<Mutex<MemorySink>>) {
    let sink = Arc::new(Mutex::new(MemorySink::default()));
    let certifier = Certifier::new(
        company,
        WireClient::new(Box::new(transport)),
        Box::new(sink.clone()),
    );
    (certifier, sink)
}

const MP_CERTIFIED: &str = "<RegistraDocumentoResponse>\
    <uuid>0AF8C2E1-6DDE-4C5B-93A8-1A2B3C4D5E6F</uuid>\
    <serie>6DDE4C5B</serie>\
    <numero>93</numero>\
    <fecha_certificacion>2024-03-05T10:30:05-06:00</fecha_certificacion>\
    </RegistraDocumentoResponse>";

const IN_CERTIFIED: &str = "<RegistrarDocumentoXMLResponse>\
    <resultado>true</resultado>\
    <uuid>0AF8C2E1-6DDE-4C5B-93A8-1A2B3C4D5E6F</uuid>\
    <serie>6DDE4C5B</serie>\
    <numero>93</numero>\
    <fecha_certificacion>2024-03-05T10:30:05</fecha_certificacion>\
    </RegistrarDocumentoXMLResponse>";

#[tokio::test]
async fn megaprint_fetches_the_pdf_after_certifying() {
    let transport = Scripted::bodies(&[
        MP_CERTIFIED,
        "<RetornaPDFResponse><pdf>JVBERi0xLjQ=</pdf></RetornaPDFResponse>",
    ]);
    let (mut certifier, sink) =
        certifier(company_for(ProviderCode::MegaPrint), transport.clone());

    let mut record = DteRecord::new("FAC-0001");
    let issuance = certifier.issue(&mut record, &invoice("FAC-0001")).await.unwrap();

    assert!(issuance.result.success);
    assert_eq!(record.state, DocumentState::Certified);
    assert_eq!(record.pdf_base64.as_deref(), Some("JVBERi0xLjQ="));
    let key = record.key_identifier.as_deref().unwrap();
    assert_eq!(key.len(), 36);
    assert!(!key.chars().any(|c| c.is_ascii_lowercase()));

    // Two calls: certification, then the PDF endpoint.
    let sent = transport.sent.lock().unwrap();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[1].url, "https://fel.test/pdf");
    assert_eq!(sent[1].authorization.as_deref(), Some("bearer tok-441"));
    drop(sent);

    assert_eq!(sink.lock().unwrap().entries.len(), 1);
}

#[tokio::test]
async fn a_missing_pdf_never_fails_the_certification() {
    let transport = Scripted::new(vec![
        Ok(WireResponse {
            status: 200,
            body: MP_CERTIFIED.to_string(),
        }),
        Err(TransportError::Timeout),
    ]);
    let (mut certifier, _) = certifier(company_for(ProviderCode::MegaPrint), transport);

    let mut record = DteRecord::new("FAC-0001");
    let issuance = certifier.issue(&mut record, &invoice("FAC-0001")).await.unwrap();

    assert!(issuance.result.success);
    assert_eq!(record.state, DocumentState::Certified);
    assert!(record.pdf_base64.is_none());
}

#[tokio::test]
async fn ecofactura_numbers_each_attempt() {
    let transport = Scripted::bodies(&[
        "<RegistraResponse><estado>1</estado><descripcion>NIT invalido</descripcion></RegistraResponse>",
        "<RegistraResponse><estado>0</estado>\
         <uuid>0AF8C2E1-6DDE-4C5B-93A8-1A2B3C4D5E6F</uuid>\
         <serie>6DDE4C5B</serie><numero>93</numero>\
         </RegistraResponse>",
    ]);
    let (mut certifier, _) = certifier(company_for(ProviderCode::Ecofactura), transport);

    let mut record = DteRecord::new("FAC-0001");
    let rejected = certifier.issue(&mut record, &invoice("FAC-0001")).await;
    assert!(matches!(rejected, Err(FelError::ProviderRejected { .. })));
    assert_eq!(record.key_identifier.as_deref(), Some("1"));

    let issuance = certifier.issue(&mut record, &invoice("FAC-0001")).await.unwrap();
    assert!(issuance.result.success);
    // The stored key is never reused; each attempt draws the next number.
    assert_eq!(record.key_identifier.as_deref(), Some("2"));
}

#[tokio::test]
async fn eforcon_cancellation_reads_the_acknowledged_date() {
    let transport = Scripted::bodies(&[
        "<AnularDteGenericoResponse>\
         <rwsResultado>true</rwsResultado>\
         <rwsFechaAnulacionDTE>2024-03-06T16:20:00</rwsFechaAnulacionDTE>\
         </AnularDteGenericoResponse>",
    ]);
    let (mut certifier, sink) = certifier(company_for(ProviderCode::Eforcon), transport.clone());

    let mut record = DteRecord::new("FAC-0001");
    record.state = DocumentState::Certified;
    record.fel_uuid = Some("0AF8C2E1-6DDE-4C5B-93A8-1A2B3C4D5E6F".into());
    record.fel_series = Some("6DDE4C5B".into());
    record.fel_number = Some("93".into());
    record.fel_date = Some(
        NaiveDate::from_ymd_opt(2024, 3, 5)
            .unwrap()
            .and_hms_opt(10, 30, 5)
            .unwrap(),
    );

    let issuance = certifier
        .void(&mut record, &invoice("FAC-0001"), None)
        .await
        .unwrap();

    assert!(issuance.result.success);
    assert_eq!(record.state, DocumentState::Cancelled);
    assert_eq!(
        record.cancel_date,
        Some(
            NaiveDate::from_ymd_opt(2024, 3, 6)
                .unwrap()
                .and_hms_opt(16, 20, 0)
                .unwrap()
        )
    );

    // The default reason rides escaped inside the SOAP body.
    let bodies = transport.sent_bodies();
    assert_eq!(bodies.len(), 1);
    assert!(bodies[0].contains("<web:sSerieDTE>6DDE4C5B</web:sSerieDTE>"));
    assert!(bodies[0].contains("<web:sNumeroDTE>93</web:sNumeroDTE>"));
    assert!(bodies[0].contains("<web:sMotivo>Anulaci&#243;n</web:sMotivo>"));

    assert_eq!(sink.lock().unwrap().records.len(), 1);
}

#[tokio::test]
async fn a_batch_outage_releases_on_the_next_success() {
    let transport = Scripted::new(vec![
        Err(TransportError::Timeout),
        Err(TransportError::Connect("connection refused".into())),
        Ok(WireResponse {
            status: 200,
            body: IN_CERTIFIED.to_string(),
        }),
    ]);
    let (mut certifier, sink) = certifier(company_for(ProviderCode::Infile), transport);

    let mut batch = vec![
        (DteRecord::new("FAC-0001"), invoice("FAC-0001")),
        (DteRecord::new("FAC-0002"), invoice("FAC-0002")),
    ];
    let certified = certifier.issue_all(&mut batch).await;
    assert_eq!(certified, vec![false, false]);
    assert_eq!(batch[0].0.access_number, Some(1));
    assert_eq!(batch[1].0.access_number, Some(2));
    assert!(batch.iter().all(|(r, _)| r.state == DocumentState::Contingency));

    let window = certifier.tracker().open_window().unwrap();
    assert_eq!(window.references, vec!["FAC-0001", "FAC-0002"]);

    // The provider recovers; re-issuing the first document closes the
    // window and hands back everything filed under it.
    let (record, invoice) = &mut batch[0];
    let issuance = certifier.issue(record, invoice).await.unwrap();
    assert!(issuance.result.success);
    assert_eq!(issuance.released, vec!["FAC-0001", "FAC-0002"]);
    assert_eq!(record.state, DocumentState::Certified);
    assert!(certifier.tracker().open_window().is_none());

    let sink = sink.lock().unwrap();
    assert_eq!(sink.records.len(), 3);
    let windows: Vec<_> = sink.entries.iter().map(|e| e.window).collect();
    assert_eq!(windows, vec![Some(1), Some(1), None]);
}
