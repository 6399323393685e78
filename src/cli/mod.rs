//! Terminal commands and shared presentation helpers

pub mod backfill;
pub mod convert;
pub mod rate;
pub mod refresh;
pub mod setup;
pub mod ui;
