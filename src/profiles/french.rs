//! French PCG accounting-system profile

use regex::Regex;

use crate::traits::AccountingSystemProfile;
use crate::types::*;
use crate::utils::validation::validate_account_code;

/// French "plan comptable général" profile: class-based code masks, result
/// carried on 120 (profit) / 129 (deficit).
pub struct FrenchProfile {
    general: Regex,
    cash: Regex,
    provider: Regex,
    customer: Regex,
    revenue: Regex,
    expense: Regex,
    third: Regex,
    annexe: Regex,
}

impl FrenchProfile {
    pub fn new() -> Self {
        let mask = |pattern: &str| Regex::new(pattern).expect("static mask pattern");
        Self {
            general: mask("^[0-8][0-9]*$"),
            cash: mask("^5[0-9]*$"),
            provider: mask("^40[0-9]*$"),
            customer: mask("^41[0-9]*$"),
            revenue: mask("^7[0-9]*$"),
            expense: mask("^6[0-9]*$"),
            third: mask("^4[0-9]*$"),
            annexe: mask("^8[0-9]*$"),
        }
    }
}

impl Default for FrenchProfile {
    fn default() -> Self {
        Self::new()
    }
}

impl AccountingSystemProfile for FrenchProfile {
    fn name(&self) -> &str {
        "french"
    }

    fn general_mask(&self) -> &Regex {
        &self.general
    }

    fn cash_mask(&self) -> &Regex {
        &self.cash
    }

    fn provider_mask(&self) -> &Regex {
        &self.provider
    }

    fn customer_mask(&self) -> &Regex {
        &self.customer
    }

    fn revenue_mask(&self) -> &Regex {
        &self.revenue
    }

    fn expense_mask(&self) -> &Regex {
        &self.expense
    }

    fn third_mask(&self) -> &Regex {
        &self.third
    }

    fn annexe_mask(&self) -> &Regex {
        &self.annexe
    }

    fn profit_account(&self) -> &str {
        "120"
    }

    fn deficit_account(&self) -> &str {
        "129"
    }

    /// Default name and type by PCG class digit. Customer (41x) and
    /// supplier (40x) codes get their usual asset/liability split.
    fn new_charts_account(&self, code: &str) -> LedgerResult<(String, AccountType)> {
        validate_account_code(code)?;
        let (name, account_type) = match code.chars().next() {
            Some('1') => ("capitaux", AccountType::Equity),
            Some('2') => ("immobilisations", AccountType::Asset),
            Some('3') => ("stocks", AccountType::Asset),
            Some('4') => {
                if self.customer.is_match(code) {
                    ("clients", AccountType::Asset)
                } else if self.provider.is_match(code) {
                    ("fournisseurs", AccountType::Liability)
                } else {
                    ("tiers", AccountType::Liability)
                }
            }
            Some('5') => ("finances", AccountType::Asset),
            Some('6') => ("charges", AccountType::Expense),
            Some('7') => ("produits", AccountType::Revenue),
            Some('8') => ("comptes speciaux", AccountType::Contra),
            _ => return Err(LedgerError::AccountNotConfigured(code.to_string())),
        };
        Ok((name.to_string(), account_type))
    }
}
