//! # timbrado
//!
//! Guatemalan electronic-invoicing (FEL) certification core: normalize
//! accounting invoices into provider-neutral DTEs, serialize each
//! certifier's XML dialect, submit over SOAP or REST, and fall back to
//! contingency access numbers when a certifier is down.
//!
//! All monetary values use [`rust_decimal::Decimal`]; floating point never
//! touches an amount. Amounts are truncated, not rounded, to each
//! provider's decimal precision.
//!
//! ## Quick Start
//!
//! ```rust
//! use timbrado::company::CompanyProfile;
//! use timbrado::core::*;
//! use rust_decimal_macros::dec;
//!
//! let mut company = CompanyProfile::new(
//!     "1234567-8",
//!     "Comercial La Ceiba, S.A.",
//!     IvaRegime::General,
//!     "1",
//!     Direccion::new("5a avenida 4-41 zona 1", "01001", "Guatemala", "Guatemala", "GT"),
//! );
//! company.email = "fel@laceiba.com.gt".to_string();
//!
//! let invoice = InvoiceBuilder::new("FAC-0001", DteType::Fact)
//!     .receiver(ReceiverBuilder::new("CF", "Consumidor Final").build())
//!     .add_line(
//!         InvoiceLineBuilder::new("Servicio contable", dec!(1), dec!(500.00))
//!             .service()
//!             .tax(TaxCharge::new("IVA", "IVA", dec!(12)))
//!             .build(),
//!     )
//!     .build()
//!     .unwrap();
//!
//! let policy = NormalizePolicy::standard();
//! let ctx = NormalizeContext {
//!     company: &company,
//!     policy: &policy,
//!     key_identifier: "5f2c9a1e77b04c0d8e3a6b1f2c9a1e77",
//!     access_number: None,
//!     resolved_name: None,
//!     now: guatemala_now(),
//! };
//! let dte = normalize(&invoice, &ctx).unwrap();
//!
//! assert_eq!(dte.grand_total, dec!(500.00));
//! assert_eq!(dte.items[0].taxes[0].amount, dec!(53.5714285714));
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `core` (default) | Invoice model, normalization, company profile, records |
//! | `nit` | Receiver NIT registry lookup |
//! | `wire` | HTTP/SOAP transport and the provider adapter layer |
//! | `infile` | INFILE adapter (SAT schema, SOAP) |
//! | `digifact` | Digifact adapter (SAT schema, REST/JSON) |
//! | `contap` | Contap adapter (SAT schema, SOAP) |
//! | `megaprint` | MegaPrint adapter (SAT schema, raw XML + bearer auth) |
//! | `ecofactura` | Ecofactura adapter (flat transaction schema, SOAP) |
//! | `eforcon` | eForcon adapter (template schema, SOAP) |
//! | `certify` | The end-to-end certification orchestrator |
//! | `all` | Everything |

#[cfg(feature = "core")]
pub mod core;

#[cfg(feature = "core")]
pub mod audit;
#[cfg(feature = "core")]
pub mod company;
#[cfg(feature = "core")]
pub mod contingency;
#[cfg(feature = "core")]
pub mod record;
#[cfg(feature = "core")]
pub mod result;

#[cfg(feature = "nit")]
pub mod nit;

#[cfg(feature = "wire")]
pub mod providers;
#[cfg(feature = "wire")]
pub mod wire;

#[cfg(feature = "certify")]
pub mod certify;

// Re-export core types at crate root for convenience
#[cfg(feature = "core")]
pub use crate::core::*;
