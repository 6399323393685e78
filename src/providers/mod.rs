//! Rate provider adapters

pub mod beacon;
pub mod fixed;
pub mod frankfurter;
pub mod util;
