//! # Ledger Core
//!
//! A general-ledger engine: balanced double-entry transactions grouped
//! into fiscal years with a strict lifecycle, cross-entry reconciliation
//! ("lettering"), cost-center tagging and multi-invoice payment
//! allocation.
//!
//! ## Features
//!
//! - **Double-entry ledger**: draft/commit/close entry protocol with a
//!   serialized edit format and strict balance invariants
//! - **Fiscal years**: building/running/finished lifecycle, carry-forward
//!   opening, profit allocation and year-end rollover
//! - **Reconciliation**: letter-coded entry links marking settled pairs
//! - **Payments**: one payment split across several invoices, with merged
//!   posting and automatic re-lettering
//! - **Deposit slips**: cheque batches with their own lifecycle
//! - **Storage abstraction**: database-agnostic design with trait-based
//!   storage
//!
//! ## Quick Start
//!
//! ```rust
//! use ledger_core::{Ledger, LedgerSettings, MemoryStorage, ProfileKind};
//!
//! let storage = MemoryStorage::new();
//! let mut ledger = Ledger::new(storage, ProfileKind::French, LedgerSettings::default());
//! // create a fiscal year, build drafts, close entries...
//! ```

pub mod ledger;
pub mod payoff;
pub mod profiles;
pub mod settings;
pub mod traits;
pub mod types;
pub mod utils;

// Re-export commonly used types
pub use ledger::*;
pub use payoff::*;
pub use profiles::{profile_for, DefaultProfile, FrenchProfile, ProfileKind};
pub use settings::*;
pub use traits::*;
pub use types::*;
pub use utils::{Currency, MemoryStorage};
