//! Ledger module: chart of accounts, entries, lettering and fiscal years

pub mod chart;
pub mod core;
pub mod entry;
pub mod link;
pub mod year;

pub use chart::*;
pub use core::*;
pub use entry::*;
pub use link::LinkManager;
pub use year::*;
