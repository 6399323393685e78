//! Core business logic abstractions

pub mod adapter;
pub mod config;
pub mod currency;
pub mod error;
pub mod log;
pub mod rate;

// Re-export main types for cleaner imports
pub use adapter::{AdapterError, RateAdapter};
pub use currency::{Currency, CurrencyCode};
pub use error::ResolveError;
pub use rate::{RateOrigin, RateQuote, RateRecord, ResolvedRate};
