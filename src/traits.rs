//! Traits for storage abstraction and external capabilities

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use regex::Regex;
use std::sync::Arc;

use crate::payoff::{BankAccount, DepositDetail, DepositSlip, Payoff};
use crate::settings::LedgerSettings;
use crate::types::*;
use crate::utils::currency::Currency;

/// Storage abstraction for the ledger engine
///
/// This trait allows the engine to work with any storage backend
/// (PostgreSQL, MySQL, SQLite, in-memory, etc.) by implementing these
/// methods. Conventions:
///
/// - `insert_*` methods ignore the incoming id, allocate a fresh one and
///   return the stored row.
/// - Multi-row mutators (`replace_entry_lines`, `delete_entry`) must be
///   atomic per aggregate: either every row of the entry changes or none
///   does. The engine never mutates two aggregates in one call.
/// - A fresh store is expected to contain the built-in journals
///   ([`Journal::builtins`]).
#[async_trait]
pub trait LedgerStorage: Send + Sync {
    // Fiscal years
    async fn insert_year(&mut self, year: FiscalYear) -> LedgerResult<FiscalYear>;
    async fn update_year(&mut self, year: &FiscalYear) -> LedgerResult<()>;
    async fn get_year(&self, id: YearId) -> LedgerResult<Option<FiscalYear>>;
    /// All years ordered by end date ascending.
    async fn list_years(&self) -> LedgerResult<Vec<FiscalYear>>;
    async fn delete_year(&mut self, id: YearId) -> LedgerResult<()>;

    // Journals
    async fn insert_journal(&mut self, name: String) -> LedgerResult<Journal>;
    async fn get_journal(&self, id: JournalId) -> LedgerResult<Option<Journal>>;
    async fn list_journals(&self) -> LedgerResult<Vec<Journal>>;
    async fn delete_journal(&mut self, id: JournalId) -> LedgerResult<()>;

    // Chart of accounts
    async fn insert_account(&mut self, account: ChartsAccount) -> LedgerResult<ChartsAccount>;
    async fn update_account(&mut self, account: &ChartsAccount) -> LedgerResult<()>;
    async fn get_account(&self, id: AccountId) -> LedgerResult<Option<ChartsAccount>>;
    async fn account_by_code(
        &self,
        year: YearId,
        code: &str,
    ) -> LedgerResult<Option<ChartsAccount>>;
    /// Accounts of a year ordered by code.
    async fn list_accounts(&self, year: YearId) -> LedgerResult<Vec<ChartsAccount>>;

    // Thirds
    async fn insert_third(&mut self, third: Third) -> LedgerResult<Third>;
    async fn update_third(&mut self, third: &Third) -> LedgerResult<()>;
    async fn get_third(&self, id: ThirdId) -> LedgerResult<Option<Third>>;
    async fn list_thirds(&self) -> LedgerResult<Vec<Third>>;

    // Cost accounting
    async fn insert_cost(&mut self, cost: CostAccounting) -> LedgerResult<CostAccounting>;
    async fn update_cost(&mut self, cost: &CostAccounting) -> LedgerResult<()>;
    async fn get_cost(&self, id: CostId) -> LedgerResult<Option<CostAccounting>>;
    async fn list_costs(&self) -> LedgerResult<Vec<CostAccounting>>;

    // Entries
    async fn insert_entry(&mut self, entry: EntryAccount) -> LedgerResult<EntryAccount>;
    async fn update_entry(&mut self, entry: &EntryAccount) -> LedgerResult<()>;
    async fn get_entry(&self, id: EntryId) -> LedgerResult<Option<EntryAccount>>;
    async fn list_entries(&self, filter: &EntryFilter) -> LedgerResult<Vec<EntryAccount>>;
    /// Deletes an entry header together with all its lines.
    async fn delete_entry(&mut self, id: EntryId) -> LedgerResult<()>;
    async fn max_entry_num(&self, year: YearId) -> LedgerResult<Option<i32>>;

    // Entry lines
    /// Atomically replaces every line of the entry with the given set.
    /// Pending refs receive fresh persisted ids; the stored set is returned.
    async fn replace_entry_lines(
        &mut self,
        entry: EntryId,
        lines: Vec<EntryLineAccount>,
    ) -> LedgerResult<Vec<EntryLineAccount>>;
    async fn insert_line(&mut self, line: EntryLineAccount) -> LedgerResult<EntryLineAccount>;
    async fn update_line(&mut self, line: &EntryLineAccount) -> LedgerResult<()>;
    async fn lines_of_entry(&self, entry: EntryId) -> LedgerResult<Vec<EntryLineAccount>>;
    /// Every line whose account belongs to the given year.
    async fn lines_for_year(&self, year: YearId) -> LedgerResult<Vec<EntryLineAccount>>;

    // Reconciliation links
    async fn insert_link(&mut self) -> LedgerResult<AccountLink>;
    async fn delete_link(&mut self, id: LinkId) -> LedgerResult<()>;
    async fn entries_of_link(&self, link: LinkId) -> LedgerResult<Vec<EntryAccount>>;

    // Payoffs
    async fn insert_payoff(&mut self, payoff: Payoff) -> LedgerResult<Payoff>;
    async fn update_payoff(&mut self, payoff: &Payoff) -> LedgerResult<()>;
    async fn get_payoff(&self, id: PayoffId) -> LedgerResult<Option<Payoff>>;
    async fn delete_payoff(&mut self, id: PayoffId) -> LedgerResult<()>;
    async fn payoffs_of_supporting(&self, supporting: SupportingId)
        -> LedgerResult<Vec<Payoff>>;
    async fn payoffs_of_entry(&self, entry: EntryId) -> LedgerResult<Vec<Payoff>>;
    async fn list_payoffs(&self) -> LedgerResult<Vec<Payoff>>;

    // Bank accounts
    async fn insert_bank_account(&mut self, bank: BankAccount) -> LedgerResult<BankAccount>;
    async fn update_bank_account(&mut self, bank: &BankAccount) -> LedgerResult<()>;
    async fn get_bank_account(&self, id: BankAccountId) -> LedgerResult<Option<BankAccount>>;
    /// Bank accounts ordered by their order key.
    async fn list_bank_accounts(&self) -> LedgerResult<Vec<BankAccount>>;

    // Deposit slips
    async fn insert_deposit(&mut self, deposit: DepositSlip) -> LedgerResult<DepositSlip>;
    async fn update_deposit(&mut self, deposit: &DepositSlip) -> LedgerResult<()>;
    async fn get_deposit(&self, id: DepositId) -> LedgerResult<Option<DepositSlip>>;
    async fn list_deposits(&self) -> LedgerResult<Vec<DepositSlip>>;
    async fn delete_deposit(&mut self, id: DepositId) -> LedgerResult<()>;
    async fn insert_deposit_detail(
        &mut self,
        detail: DepositDetail,
    ) -> LedgerResult<DepositDetail>;
    async fn details_of_deposit(&self, deposit: DepositId) -> LedgerResult<Vec<DepositDetail>>;
    async fn all_deposit_details(&self) -> LedgerResult<Vec<DepositDetail>>;

    // Entry models
    async fn insert_model(&mut self, model: ModelEntry) -> LedgerResult<ModelEntry>;
    async fn get_model(&self, id: ModelId) -> LedgerResult<Option<ModelEntry>>;
    async fn list_models(&self) -> LedgerResult<Vec<ModelEntry>>;
}

/// Country/chart-standard profile consumed by the engine
///
/// One implementation exists per supported chart of accounts; the engine
/// never hard-codes account codes or masks. Implementations are selected
/// through [`crate::profiles::ProfileKind`] at startup, so resolution
/// failure is a configuration error rather than a runtime lookup failure.
pub trait AccountingSystemProfile: Send + Sync {
    fn name(&self) -> &str;

    /// False for the placeholder profile used before a chart standard is
    /// chosen; fiscal-year workflows are blocked while unconfigured.
    fn is_configured(&self) -> bool {
        true
    }

    /// Whether account codes are normalized to a minimum size.
    fn has_minimum_code_size(&self) -> bool {
        true
    }

    /// Mask matching every general-ledger account code.
    fn general_mask(&self) -> &Regex;
    /// Mask matching cash/bank account codes.
    fn cash_mask(&self) -> &Regex;
    /// Mask matching supplier account codes.
    fn provider_mask(&self) -> &Regex;
    /// Mask matching customer account codes.
    fn customer_mask(&self) -> &Regex;
    /// Mask matching revenue account codes.
    fn revenue_mask(&self) -> &Regex;
    /// Mask matching expense account codes.
    fn expense_mask(&self) -> &Regex;
    /// Mask matching every third-party account code.
    fn third_mask(&self) -> &Regex;
    /// Mask matching contra/annex account codes.
    fn annexe_mask(&self) -> &Regex;

    /// Equity account code receiving a year-end profit.
    fn profit_account(&self) -> &str;
    /// Equity account code receiving a year-end deficit.
    fn deficit_account(&self) -> &str;

    /// Infers the default name and type for a new account code.
    fn new_charts_account(&self, code: &str) -> LedgerResult<(String, AccountType)>;
}

/// Context threaded through every operation needing chart masks or
/// currency rules. Explicit by design: there is no cached global
/// "current accounting system".
#[derive(Clone)]
pub struct LedgerContext {
    pub profile: Arc<dyn AccountingSystemProfile>,
    pub currency: Currency,
    pub settings: LedgerSettings,
}

impl LedgerContext {
    pub fn new(profile: Arc<dyn AccountingSystemProfile>, settings: LedgerSettings) -> Self {
        Self {
            profile,
            currency: Currency::new(settings.currency.precision),
            settings,
        }
    }
}

/// Supporting document capability (invoice, quote, receipt, credit note)
///
/// The billing catalog lives outside this crate; the payment engine only
/// needs the data below. Paid/rest-to-pay figures are deliberately *not*
/// part of the capability: the engine computes them from stored payoffs so
/// a figure cannot go stale between selection and allocation.
pub trait Supporting: Send + Sync {
    fn id(&self) -> SupportingId;
    fn third(&self) -> ThirdId;
    /// Total amount of the document.
    fn total(&self) -> BigDecimal;
    /// True when paying this document is revenue for the bookkeeper
    /// (customer side), false for supplier-side documents.
    fn is_revenue(&self) -> bool;
    /// Chronological key used to order documents in sequential allocation.
    fn document_date(&self) -> NaiveDate;
    /// Ledger entries already posted for this document, when it has any.
    fn entry_links(&self) -> Option<Vec<EntryId>>;
    /// Human-readable label used in generated designations.
    fn label(&self) -> String;

    /// Upper bound a payment against this document may reach. The default
    /// allows no over-payment; document types wanting a tolerance window
    /// add it here.
    fn max_payoff(&self, rest_to_pay: &BigDecimal) -> BigDecimal {
        rest_to_pay.clone()
    }

    /// Mask selecting the third-party account this document settles on.
    fn third_mask<'a>(&self, profile: &'a dyn AccountingSystemProfile) -> &'a Regex {
        if self.is_revenue() {
            profile.customer_mask()
        } else {
            profile.provider_mask()
        }
    }
}
