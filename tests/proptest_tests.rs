//! Property-based tests and edge case tests for the timbrado crate.
//!
//! Run with: `cargo test --features all --test proptest_tests`

#![cfg(feature = "wire")]

use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::str::FromStr;
use timbrado::company::{AccessCounter, CompanyProfile, ACCESS_NUMBER_MAX};
use timbrado::core::*;
use timbrado::wire::soap;

const KEY: &str = "0123456789abcdef0123456789abcdef";

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

fn normalized(invoice: &Invoice) -> Dte {
    let company = company();
    let policy = NormalizePolicy::standard();
    let ctx = NormalizeContext {
        company: &company,
        policy: &policy,
        key_identifier: KEY,
        access_number: None,
        resolved_name: None,
        now: guatemala_now(),
    };
    normalize(invoice, &ctx).unwrap()
}

// ── Proptest Strategies ─────────────────────────────────────────────────────

/// Any amount a host system could plausibly hand over, up to 15 digits
/// and 12 decimal places.
fn arb_amount() -> impl Strategy<Value = Decimal> {
    (-1_000_000_000_000_000i64..1_000_000_000_000_000i64, 0u32..=12)
        .prop_map(|(mantissa, scale)| Decimal::new(mantissa, scale))
}

/// A unit price in cents, positive.
fn arb_price() -> impl Strategy<Value = Decimal> {
    (1u64..10_000_000u64).prop_map(|cents| Decimal::new(cents as i64, 2))
}

fn arb_quantity() -> impl Strategy<Value = Decimal> {
    (1u32..=1_000u32).prop_map(Decimal::from)
}

/// Whole-percent discount between none and the full price.
fn arb_discount() -> impl Strategy<Value = Decimal> {
    (0u32..=100u32).prop_map(Decimal::from)
}

// ── Property Tests ──────────────────────────────────────────────────────────

proptest! {
    /// Truncation moves toward zero, lands at the asked scale, and is
    /// idempotent. Rounding up would get documents rejected.
    #[test]
    fn truncate_never_rounds_up(value in arb_amount(), precision in 0u32..=10) {
        let cut = truncate(value, precision);
        prop_assert!(cut.abs() <= value.abs());
        prop_assert!(cut.scale() <= precision);
        prop_assert_eq!(truncate(cut, precision), cut);
    }

    /// The rendered amount parses back to the truncated value and always
    /// shows at least two decimal places.
    #[test]
    fn format_amount_round_trips(value in arb_amount()) {
        let rendered = format_amount(value, DEFAULT_PRECISION);
        let reparsed = Decimal::from_str(&rendered).unwrap();
        prop_assert_eq!(reparsed, truncate(value, DEFAULT_PRECISION));

        let decimals = rendered.len() - rendered.find('.').unwrap() - 1;
        prop_assert!(decimals >= 2);
        prop_assert!(decimals <= DEFAULT_PRECISION.max(2) as usize);
    }

    /// Neither escape mode lets a quote or closing angle through; the
    /// numeric-reference mode also clears every mapped accent.
    #[test]
    fn escaped_text_is_schema_safe(value in ".*") {
        for mode in [EscapeMode::NumericRefs, EscapeMode::Plain] {
            let escaped = escape_value(&value, mode);
            prop_assert!(!escaped.contains('>'));
            prop_assert!(!escaped.contains('"'));
            prop_assert!(!escaped.contains('\''));
        }
        let refs = escape_value(&value, EscapeMode::NumericRefs);
        prop_assert!(!refs.chars().any(|c| "áéíóúÁÉÍÓÚñÑ".contains(c)));
        let plain = escape_value(&value, EscapeMode::Plain);
        prop_assert!(!plain.contains('<'));
    }

    /// Tax identifiers lose their dashes and nothing else.
    #[test]
    fn stripped_nits_keep_every_other_character(value in "[A-Z0-9-]{1,12}") {
        let stripped = strip_nit(&value);
        prop_assert!(!stripped.contains('-'));
        prop_assert_eq!(stripped.len(), value.chars().filter(|c| *c != '-').count());
    }

    /// Access numbers stay inside the SAT range whatever the seed, and
    /// advance by one with a wrap at the cap.
    #[test]
    fn access_numbers_stay_in_range(seed in any::<u32>()) {
        let mut counter = AccessCounter::starting_at(seed);
        let mut previous = None;
        for _ in 0..1_000 {
            let number = counter.next_access_number();
            prop_assert!((1..=ACCESS_NUMBER_MAX).contains(&number));
            if let Some(prev) = previous {
                let expected = if prev == ACCESS_NUMBER_MAX { 1 } else { prev + 1 };
                prop_assert_eq!(number, expected);
            }
            previous = Some(number);
        }
    }

    /// Response scraping recovers a clean payload and never panics on
    /// arbitrary bodies.
    #[test]
    fn scraping_is_total(payload in "[A-Za-z0-9]{1,40}", garbage in ".*") {
        let body = format!("<respuesta><dato>{payload}</dato></respuesta>");
        prop_assert_eq!(soap::scrape_tag(&body, "dato"), Some(payload));

        let _ = soap::scrape_tag(&garbage, "dato");
        let _ = soap::scrape_error_blocks(&garbage, "error");
    }

    /// The IVA broken out of a line can never exceed the line itself:
    /// both the base and the tax only lose to truncation.
    #[test]
    fn iva_breakdown_never_exceeds_the_line(
        price in arb_price(),
        quantity in arb_quantity(),
        discount in arb_discount(),
    ) {
        let invoice = InvoiceBuilder::new("FAC-PROP", DteType::Fact)
            .receiver(ReceiverBuilder::new("CF", "Consumidor Final").build())
            .add_line(
                InvoiceLineBuilder::new("Articulo", quantity, price)
                    .discount_pct(discount)
                    .tax(TaxCharge::new("IVA", "IVA", dec!(12)))
                    .build(),
            )
            .build()
            .unwrap();
        let dte = normalized(&invoice);

        let line = &dte.items[0];
        let tax = &line.taxes[0];
        prop_assert!(tax.taxable >= Decimal::ZERO);
        prop_assert!(tax.amount >= Decimal::ZERO);
        prop_assert!(tax.taxable + tax.amount <= invoice.lines[0].line_total);
        // Cent-scale inputs pass through without any rounding drift.
        prop_assert_eq!(dte.grand_total, invoice.total());
    }
}

// ── Edge Case Tests ─────────────────────────────────────────────────────────

#[test]
fn zero_amount_lines_normalize() {
    let invoice = InvoiceBuilder::new("FAC-ZERO", DteType::Fact)
        .receiver(ReceiverBuilder::new("CF", "Consumidor Final").build())
        .add_line(
            InvoiceLineBuilder::new("Muestra gratis", dec!(1), dec!(0))
                .tax(TaxCharge::new("IVA", "IVA", dec!(12)))
                .build(),
        )
        .build()
        .unwrap();

    let dte = normalized(&invoice);
    assert_eq!(dte.items[0].taxes[0].taxable, Decimal::ZERO);
    assert_eq!(dte.items[0].taxes[0].amount, Decimal::ZERO);
    assert_eq!(dte.grand_total, Decimal::ZERO);
    assert_eq!(format_amount(dte.grand_total, DEFAULT_PRECISION), "0.00");
}

#[test]
fn a_hundred_lines_keep_their_positions() {
    let mut builder = InvoiceBuilder::new("FAC-MANY", DteType::Fact)
        .receiver(ReceiverBuilder::new("CF", "Consumidor Final").build());
    for i in 1..=100 {
        builder = builder.add_line(
            InvoiceLineBuilder::new(format!("Articulo {i}"), dec!(1), dec!(10))
                .tax(TaxCharge::new("IVA", "IVA", dec!(12)))
                .build(),
        );
    }
    let invoice = builder.build().unwrap();

    let dte = normalized(&invoice);
    assert_eq!(dte.items.len(), 100);
    assert_eq!(dte.items[0].number, 1);
    assert_eq!(dte.items[99].number, 100);
    assert_eq!(dte.grand_total, dec!(1000));
    // 100 times trunc(10 / 1.12, 10).
    assert_eq!(dte.tax_totals[0].taxable, dec!(892.85714285));
}

#[test]
fn long_accented_descriptions_escape_without_loss() {
    let description = "Soporte técnico año 2024 señalización ".repeat(12);
    let invoice = InvoiceBuilder::new("FAC-LONG", DteType::Fact)
        .receiver(ReceiverBuilder::new("CF", "Consumidor Final").build())
        .add_line(
            InvoiceLineBuilder::new(&description, dec!(1), dec!(100))
                .tax(TaxCharge::new("IVA", "IVA", dec!(12)))
                .build(),
        )
        .build()
        .unwrap();

    let dte = normalized(&invoice);
    let escaped = &dte.items[0].description;
    assert!(escaped.contains("t&#233;cnico"));
    assert!(escaped.contains("a&#241;o"));
    assert!(!escaped.contains('é'));
    // Each repetition survives in order.
    assert_eq!(escaped.matches("se&#241;alizaci&#243;n").count(), 12);
}

#[test]
fn discounts_above_the_price_stay_classifiable() {
    // Hosts occasionally send over-100% discounts on correction lines;
    // the taxable base works on the absolute value.
    let invoice = InvoiceBuilder::new("FAC-NEG", DteType::Fact)
        .receiver(ReceiverBuilder::new("CF", "Consumidor Final").build())
        .add_line(
            InvoiceLineBuilder::new("Ajuste", dec!(1), dec!(100))
                .discount_pct(dec!(150))
                .tax(TaxCharge::new("IVA", "IVA", dec!(12)))
                .build(),
        )
        .build()
        .unwrap();

    let dte = normalized(&invoice);
    assert!(dte.items[0].taxes[0].taxable >= Decimal::ZERO);
    assert!(dte.items[0].taxes[0].amount >= Decimal::ZERO);
}
