//! Core document types, normalization, and amount handling.
//!
//! This module provides the foundational types for Guatemalan electronic
//! invoicing (FEL), with the provider-neutral normalization pass that
//! every certifier dialect starts from.

mod amount;
mod builder;
mod error;
mod escape;
mod normalize;
mod types;

pub use amount::*;
pub use builder::*;
pub use error::*;
pub use escape::*;
pub use normalize::*;
pub use types::*;
