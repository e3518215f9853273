#![cfg(all(
    feature = "infile",
    feature = "digifact",
    feature = "contap",
    feature = "megaprint",
    feature = "ecofactura",
    feature = "eforcon"
))]

use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal_macros::dec;
use timbrado::company::{CompanyProfile, ProviderCode, ProviderEndpoints};
use timbrado::core::*;
use timbrado::providers::{adapter_for, configured_adapter, ProviderAdapter};

const KEY: &str = "0123456789abcdef0123456789abcdef";

const ALL: [ProviderCode; 6] = [
    ProviderCode::Infile,
    ProviderCode::Digifact,
    ProviderCode::Contap,
    ProviderCode::MegaPrint,
    ProviderCode::Ecofactura,
    ProviderCode::Eforcon,
];

fn clock() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 3, 5)
        .unwrap()
        .and_hms_opt(9, 30, 0)
        .unwrap()
}

fn company_for(code: ProviderCode) -> CompanyProfile {
    let mut company = CompanyProfile::new(
        "1234567-8",
        "Comercial La Ceiba, S.A.",
        IvaRegime::General,
        "1",
        Direccion::new("4a Calle 5-20 Zona 1", "01001", "Guatemala", "Guatemala", "GT"),
    );
    company.email = "facturas@laceiba.com.gt".into();
    company.provider = Some(code);
    company.credentials.user = Some("laceiba.fel".into());
    company.credentials.password = Some("s3cre7".into());
    company.credentials.signing_password = Some("firma".into());
    company.credentials.token = Some("tok-441".into());
    company.credentials.digifact_nit = Some("12345678".into());
    company.endpoints = ProviderEndpoints {
        certify: "https://fel.example/certify".into(),
        cancel: "https://fel.example/cancel".into(),
        pdf: Some("https://fel.example/pdf".into()),
    };
    company
}

fn invoice() -> Invoice {
    InvoiceBuilder::new("FAC-2024-0051", DteType::Fact)
        .date(NaiveDate::from_ymd_opt(2024, 3, 5).unwrap())
        .receiver(
            ReceiverBuilder::new("7777444-4", "Distribuidora El Quetzal, S.A.")
                .vat_registered()
                .address("Km 17.5 Carretera a El Salvador", "01051", "Fraijanes", "Guatemala", "GT")
                .build(),
        )
        .add_line(
            InvoiceLineBuilder::new("Asesoría mensual", dec!(1), dec!(500.00))
                .unit("UND")
                .service()
                .tax(TaxCharge::new("IVA", "IVA", dec!(12)))
                .build(),
        )
        .build()
        .unwrap()
}

fn serialized(adapter: &dyn ProviderAdapter, company: &CompanyProfile) -> String {
    let policy = adapter.policy();
    let ctx = NormalizeContext {
        company,
        policy: &policy,
        key_identifier: KEY,
        access_number: None,
        resolved_name: None,
        now: clock(),
    };
    let dte = normalize(&invoice(), &ctx).unwrap();
    adapter.serialize(&dte).unwrap()
}

// --- Configuration ---

#[test]
fn every_provider_accepts_a_full_profile() {
    for code in ALL {
        let company = company_for(code);
        let adapter = configured_adapter(&company).unwrap();
        assert_eq!(adapter.code(), code);
        adapter.check_credentials(&company).unwrap();
    }
}

#[test]
fn unconfigured_companies_have_no_adapter() {
    let mut company = company_for(ProviderCode::Infile);
    company.provider = None;
    assert!(matches!(
        configured_adapter(&company),
        Err(FelError::NoProviderConfigured)
    ));
}

// --- Dialects ---

#[test]
fn each_dialect_keeps_its_schema_root() {
    for code in [
        ProviderCode::Infile,
        ProviderCode::Digifact,
        ProviderCode::Contap,
        ProviderCode::MegaPrint,
    ] {
        let adapter = adapter_for(code).unwrap();
        let body = serialized(adapter.as_ref(), &company_for(code));
        assert!(
            body.contains("<dte:GTDocumento xmlns:dte=\"http://www.sat.gob.gt/dte/fel/0.2.0\""),
            "{code:?} should emit the SAT schema"
        );
    }

    let eco = adapter_for(ProviderCode::Ecofactura).unwrap();
    let body = serialized(eco.as_ref(), &company_for(ProviderCode::Ecofactura));
    assert!(body.contains("<Transaccion"));
    assert!(!body.contains("GTDocumento"));

    let fc = adapter_for(ProviderCode::Eforcon).unwrap();
    let body = serialized(fc.as_ref(), &company_for(ProviderCode::Eforcon));
    assert!(body.contains("<plantilla"));
    assert!(!body.contains("GTDocumento"));
}

#[test]
fn escape_modes_split_on_accents() {
    let infile = adapter_for(ProviderCode::Infile).unwrap();
    let body = serialized(infile.as_ref(), &company_for(ProviderCode::Infile));
    assert!(body.contains("Asesor&#237;a mensual"));

    let digifact = adapter_for(ProviderCode::Digifact).unwrap();
    let body = serialized(digifact.as_ref(), &company_for(ProviderCode::Digifact));
    assert!(body.contains("Asesoría mensual"));
    assert!(!body.contains("&#237;"));
}

#[test]
fn amount_precision_follows_each_provider() {
    // 500.00 at 12% backs out a periodic decimal; the SAT schema keeps
    // ten places, the transaccion schema six.
    let infile = adapter_for(ProviderCode::Infile).unwrap();
    let body = serialized(infile.as_ref(), &company_for(ProviderCode::Infile));
    assert!(body.contains("53.5714285714"));

    let eco = adapter_for(ProviderCode::Ecofactura).unwrap();
    let body = serialized(eco.as_ref(), &company_for(ProviderCode::Ecofactura));
    assert!(body.contains("53.571428"));
    assert!(!body.contains("53.5714285714"));
}

#[test]
fn stamps_render_in_three_shapes() {
    let moment = clock();
    let expect = [
        (ProviderCode::Infile, "2024-03-05T09:30:00-06:00"),
        (ProviderCode::MegaPrint, "2024-03-05T09:30:00-06:00"),
        (ProviderCode::Digifact, "2024-03-05T09:30:00"),
        (ProviderCode::Contap, "2024-03-05T09:30:00"),
        (ProviderCode::Ecofactura, "2024-03-05"),
        (ProviderCode::Eforcon, "2024-03-05"),
    ];
    for (code, stamp) in expect {
        let adapter = adapter_for(code).unwrap();
        assert_eq!(adapter.policy().stamp.render(moment), stamp, "{code:?}");
    }
}

// --- Submission keys ---

#[test]
fn submission_keys_follow_provider_policy() {
    let now = clock();

    // The hash providers reuse a stored key so retries stay idempotent.
    let infile = adapter_for(ProviderCode::Infile).unwrap();
    let mut company = company_for(ProviderCode::Infile);
    let fresh = infile.key_identifier(None, &mut company, DteType::Fact, now);
    assert_eq!(fresh.len(), 32);
    assert!(fresh.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    let reused = infile.key_identifier(Some(&fresh), &mut company, DteType::Fact, now);
    assert_eq!(reused, fresh);

    // MegaPrint wants an upper-case UUID.
    let megaprint = adapter_for(ProviderCode::MegaPrint).unwrap();
    let mut company = company_for(ProviderCode::MegaPrint);
    let uuid = megaprint.key_identifier(None, &mut company, DteType::Fact, now);
    assert_eq!(uuid.len(), 36);
    assert!(!uuid.chars().any(|c| c.is_ascii_lowercase()));

    // Ecofactura numbers attempts and never reuses one.
    let eco = adapter_for(ProviderCode::Ecofactura).unwrap();
    let mut company = company_for(ProviderCode::Ecofactura);
    assert_eq!(eco.key_identifier(None, &mut company, DteType::Fact, now), "1");
    assert_eq!(eco.key_identifier(Some("40"), &mut company, DteType::Fact, now), "2");
}

// --- Request shapes ---

#[test]
fn certify_requests_carry_each_auth_style() {
    let xml = "<doc/>";

    let infile = adapter_for(ProviderCode::Infile).unwrap();
    let company = company_for(ProviderCode::Infile);
    let request = infile.certify_request(xml, &company).unwrap();
    assert_eq!(request.url, "https://fel.example/certify");
    assert_eq!(request.content_type, "text/xml; charset=utf-8");
    assert!(request.soap_action.is_some());
    assert!(request.authorization.is_none());
    assert!(request.body.contains("<![CDATA[<doc/>]]>"));

    let digifact = adapter_for(ProviderCode::Digifact).unwrap();
    let company = company_for(ProviderCode::Digifact);
    let request = digifact.certify_request(xml, &company).unwrap();
    assert_eq!(request.content_type, "application/json");
    assert_eq!(request.authorization.as_deref(), Some("tok-441"));

    let contap = adapter_for(ProviderCode::Contap).unwrap();
    let company = company_for(ProviderCode::Contap);
    let request = contap.certify_request(xml, &company).unwrap();
    assert!(request.soap_action.is_some());
    // Contap authenticates inside the SOAP body.
    assert!(request.authorization.is_none());
    assert!(request.body.contains("<con:token>tok-441</con:token>"));

    let megaprint = adapter_for(ProviderCode::MegaPrint).unwrap();
    let company = company_for(ProviderCode::MegaPrint);
    let request = megaprint.certify_request(xml, &company).unwrap();
    assert_eq!(request.content_type, "application/xml");
    assert_eq!(request.authorization.as_deref(), Some("bearer tok-441"));
    assert_eq!(request.body, xml);

    let eforcon = adapter_for(ProviderCode::Eforcon).unwrap();
    let company = company_for(ProviderCode::Eforcon);
    let request = eforcon.certify_request(xml, &company).unwrap();
    assert!(request.soap_action.is_some());
    assert!(request.body.contains("<web:sUsuario>laceiba.fel</web:sUsuario>"));
}
