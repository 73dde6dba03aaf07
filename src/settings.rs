//! Engine configuration
//!
//! Plain serde-deserializable settings; callers load them from whatever
//! configuration source they use and hand them to [`crate::Ledger`]. There
//! is no process-wide state: everything flows through the context object.

use serde::{Deserialize, Serialize};

/// Operating currency settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrencySettings {
    /// Number of decimal digits carried by displayed/rounded amounts.
    pub precision: u32,
}

impl Default for CurrencySettings {
    fn default() -> Self {
        Self { precision: 2 }
    }
}

/// Accounts used by the payment engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PayoffSettings {
    /// Cash account code debited/credited when a payment has no bank account.
    pub cash_account_code: String,
    /// Expense account code receiving bank fees; `None` disables fee lines.
    pub bank_fee_account_code: Option<String>,
}

/// Top-level engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerSettings {
    pub currency: CurrencySettings,
    pub payoff: PayoffSettings,
    /// Normalized length of account codes (zero-padded/trimmed).
    pub account_code_size: usize,
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self {
            currency: CurrencySettings::default(),
            payoff: PayoffSettings::default(),
            account_code_size: 6,
        }
    }
}
