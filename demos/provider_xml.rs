use timbrado::company::{CompanyProfile, ProviderCode};
use timbrado::core::*;
use timbrado::providers::adapter_for;
use rust_decimal_macros::dec;

fn company() -> CompanyProfile {
    let mut company = CompanyProfile::new(
        "1234567-8",
        "Comercial La Ceiba, S.A.",
        IvaRegime::General,
        "1",
        Direccion::new("4a Calle 5-20 Zona 1", "01001", "Guatemala", "Guatemala", "GT"),
    );
    company.email = "facturas@laceiba.com.gt".into();
    company
}

fn invoice() -> Invoice {
    InvoiceBuilder::new("FAC-2024-042", DteType::Fact)
        .receiver(ReceiverBuilder::new("CF", "Consumidor Final").build())
        .add_line(
            InvoiceLineBuilder::new("Asesoría técnica", dec!(1), dec!(500))
                .service()
                .tax(TaxCharge::new("IVA", "IVA", dec!(12)))
                .build(),
        )
        .build()
        .expect("invoice should be valid")
}

fn render(code: ProviderCode) -> String {
    let adapter = adapter_for(code).expect("provider feature enabled");
    let company = company();
    let policy = adapter.policy();
    let ctx = NormalizeContext {
        company: &company,
        policy: &policy,
        key_identifier: "0123456789abcdef0123456789abcdef",
        access_number: None,
        resolved_name: None,
        now: guatemala_now(),
    };
    let dte = normalize(&invoice(), &ctx).expect("normalization failed");
    adapter.serialize(&dte).expect("serialization failed")
}

fn main() {
    // Same invoice, two certifier dialects. INFILE takes the SAT
    // GTDocumento schema with accents as numeric references; Ecofactura
    // takes its own Transaccion envelope at six decimal places.
    let infile = render(ProviderCode::Infile);
    println!("=== INFILE (SAT GTDocumento) ===");
    println!("{}", &infile[..800.min(infile.len())]);
    println!("...");
    println!();

    let ecofactura = render(ProviderCode::Ecofactura);
    println!("=== Ecofactura (Transaccion) ===");
    println!("{}", &ecofactura[..800.min(ecofactura.len())]);
    println!("...");
}
