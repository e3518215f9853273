use timbrado::company::CompanyProfile;
use timbrado::core::*;
use rust_decimal_macros::dec;

fn main() {
    // The issuing company, as configured once per installation
    let mut company = CompanyProfile::new(
        "1234567-8",
        "Comercial La Ceiba, S.A.",
        IvaRegime::General,
        "1",
        Direccion::new("4a Calle 5-20 Zona 1", "01001", "Guatemala", "Guatemala", "GT"),
    );
    company.email = "facturas@laceiba.com.gt".into();

    // A standard domestic Factura for a registered receiver
    let invoice = InvoiceBuilder::new("FAC-2024-001", DteType::Fact)
        .receiver(
            ReceiverBuilder::new("7777444-4", "El Quetzal")
                .legal_name("Distribuidora El Quetzal, S.A.")
                .vat_registered()
                .address("5a Avenida 10-25 Zona 9", "01009", "Guatemala", "Guatemala", "GT")
                .email("pagos@elquetzal.com.gt")
                .build(),
        )
        .add_line(
            InvoiceLineBuilder::new("Asesoria mensual", dec!(1), dec!(1120))
                .service()
                .tax(TaxCharge::new("IVA", "IVA", dec!(12)))
                .build(),
        )
        .add_line(
            InvoiceLineBuilder::new("Caja de carton", dec!(10), dec!(56))
                .discount_pct(dec!(25))
                .tax(TaxCharge::new("IVA", "IVA", dec!(12)))
                .build(),
        )
        .build()
        .expect("invoice should be valid");

    // Provider-neutral normalization: NIT cleanup, tax breakdown, escaping
    let policy = NormalizePolicy::standard();
    let ctx = NormalizeContext {
        company: &company,
        policy: &policy,
        key_identifier: "0123456789abcdef0123456789abcdef",
        access_number: None,
        resolved_name: None,
        now: guatemala_now(),
    };
    let dte = normalize(&invoice, &ctx).expect("normalization failed");

    println!("Document: {} ({})", invoice.reference, dte.doc_type.code());
    println!("Issued:   {}", dte.issued_at);
    println!("Key:      {}", dte.key_identifier);
    println!("Issuer:   {} (NIT {})", dte.emisor.legal_name, dte.emisor.nit);
    println!("Receiver: {} (NIT {})", dte.receptor.name, dte.receptor.id);
    println!("---");
    for item in &dte.items {
        println!(
            "  {}. {} x {} @ {} = {}",
            item.number,
            item.quantity,
            item.description,
            format_amount(item.unit_price, policy.precision),
            format_amount(item.total, policy.precision),
        );
    }
    println!("---");
    for total in &dte.tax_totals {
        println!(
            "{}:      base {} tax {}",
            total.short_name,
            format_amount(total.taxable, policy.precision),
            format_amount(total.amount, policy.precision),
        );
    }
    println!("Total:    {} {}", format_amount(dte.grand_total, policy.precision), dte.currency);
}
