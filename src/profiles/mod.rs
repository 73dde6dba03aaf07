//! Accounting-system profiles
//!
//! One profile exists per supported chart standard. Profiles are picked
//! through [`ProfileKind`] when the engine is built, so an unknown profile
//! is a configuration error caught at startup, never a runtime lookup
//! failure.

pub mod french;

pub use french::FrenchProfile;

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::traits::AccountingSystemProfile;
use crate::types::*;

/// Available accounting-system profiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ProfileKind {
    /// No chart standard chosen yet; fiscal-year workflows stay blocked.
    #[default]
    None,
    /// French PCG chart.
    French,
}

/// Resolves a profile selection into its implementation.
pub fn profile_for(kind: ProfileKind) -> Arc<dyn AccountingSystemProfile> {
    match kind {
        ProfileKind::None => Arc::new(DefaultProfile::new()),
        ProfileKind::French => Arc::new(FrenchProfile::new()),
    }
}

/// Placeholder profile used before a chart standard is selected.
///
/// Its masks match no code at all and account inference always fails, so
/// everything requiring a configured chart is refused.
pub struct DefaultProfile {
    nothing: Regex,
}

impl DefaultProfile {
    pub fn new() -> Self {
        Self {
            // matches only the empty string, which is never a valid code
            nothing: Regex::new("^$").expect("static mask pattern"),
        }
    }
}

impl Default for DefaultProfile {
    fn default() -> Self {
        Self::new()
    }
}

impl AccountingSystemProfile for DefaultProfile {
    fn name(&self) -> &str {
        "none"
    }

    fn is_configured(&self) -> bool {
        false
    }

    fn has_minimum_code_size(&self) -> bool {
        false
    }

    fn general_mask(&self) -> &Regex {
        &self.nothing
    }

    fn cash_mask(&self) -> &Regex {
        &self.nothing
    }

    fn provider_mask(&self) -> &Regex {
        &self.nothing
    }

    fn customer_mask(&self) -> &Regex {
        &self.nothing
    }

    fn revenue_mask(&self) -> &Regex {
        &self.nothing
    }

    fn expense_mask(&self) -> &Regex {
        &self.nothing
    }

    fn third_mask(&self) -> &Regex {
        &self.nothing
    }

    fn annexe_mask(&self) -> &Regex {
        &self.nothing
    }

    fn profit_account(&self) -> &str {
        ""
    }

    fn deficit_account(&self) -> &str {
        ""
    }

    fn new_charts_account(&self, code: &str) -> LedgerResult<(String, AccountType)> {
        Err(LedgerError::AccountNotConfigured(code.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_profile_blocks_everything() {
        let profile = DefaultProfile::new();
        assert!(!profile.is_configured());
        assert!(!profile.cash_mask().is_match("512000"));
        assert!(profile.new_charts_account("512000").is_err());
    }

    #[test]
    fn test_profile_registry() {
        assert!(!profile_for(ProfileKind::None).is_configured());
        assert!(profile_for(ProfileKind::French).is_configured());
    }
}
