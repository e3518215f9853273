use rust_decimal::Decimal;

/// Decimal precision used by most certification providers.
pub const DEFAULT_PRECISION: u32 = 10;

/// Truncate toward zero to `precision` decimal places.
///
/// Providers reconcile amounts by truncation on their side; standard
/// rounding produces off-by-one-cent rejections, so no amount may be
/// rounded before serialization.
pub fn truncate(value: Decimal, precision: u32) -> Decimal {
    value.trunc_with_scale(precision)
}

/// Render an amount truncated to `precision`, trailing zeros trimmed but
/// always keeping at least two decimal places.
pub fn format_amount(value: Decimal, precision: u32) -> String {
    let s = truncate(value, precision).normalize().to_string();
    match s.find('.') {
        Some(dot) => {
            let decimals = s.len() - dot - 1;
            if decimals < 2 {
                format!("{s}{}", "0".repeat(2 - decimals))
            } else {
                s
            }
        }
        None => format!("{s}.00"),
    }
}
