//! Core types and data structures for the ledger engine

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Identifier aliases. Ids are allocated by the storage backend; `0` is
/// never a valid persisted id.
pub type YearId = i64;
pub type AccountId = i64;
pub type JournalId = i64;
pub type EntryId = i64;
pub type LinkId = i64;
pub type ThirdId = i64;
pub type CostId = i64;
pub type PayoffId = i64;
pub type SupportingId = i64;
pub type BankAccountId = i64;
pub type DepositId = i64;
pub type ModelId = i64;

/// Account types following standard accounting principles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccountType {
    /// Assets - what the business owns (Cash, Receivables, Equipment, etc.)
    Asset,
    /// Liabilities - what the business owes (Loans, Accounts Payable, etc.)
    Liability,
    /// Equity - owner's interest in the business (Capital, Retained Earnings, etc.)
    Equity,
    /// Revenue - money earned by the business
    Revenue,
    /// Expenses - costs incurred by the business
    Expense,
    /// Contra/annex accounts outside the balance sheet
    Contra,
}

impl AccountType {
    /// Returns the normal balance type for this account type.
    /// Assets and Expenses normally have debit balances;
    /// Liabilities, Equity, Revenue and Contra normally have credit balances.
    pub fn normal_balance(&self) -> EntryType {
        match self {
            AccountType::Asset | AccountType::Expense => EntryType::Debit,
            _ => EntryType::Credit,
        }
    }

    /// Sign applied to a stored amount to read it back as a credit figure.
    ///
    /// A stored amount `a` on an account with sign `s` displays as
    /// `debit = max(0, -s*a)` and `credit = max(0, s*a)`.
    pub fn balance_sign(&self) -> i64 {
        match self.normal_balance() {
            EntryType::Debit => -1,
            EntryType::Credit => 1,
        }
    }

    /// True for accounts that appear on the balance sheet.
    pub fn is_balance_sheet(&self) -> bool {
        matches!(
            self,
            AccountType::Asset | AccountType::Liability | AccountType::Equity
        )
    }
}

/// Types of entries in double-entry bookkeeping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryType {
    /// Debit entry - increases Assets and Expenses
    Debit,
    /// Credit entry - increases Liabilities, Equity and Revenue
    Credit,
}

/// Lifecycle states of a fiscal year (forward-only, no skipping).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum YearStatus {
    /// Year is being prepared: chart import and carry-forward entries.
    Building,
    /// Year is open for day-to-day bookkeeping.
    Running,
    /// Year is closed; its data is immutable.
    Finished,
}

/// One fiscal year. Years form a chain through `predecessor`; at most one
/// year is active system-wide at any time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FiscalYear {
    pub id: YearId,
    pub begin: NaiveDate,
    pub end: NaiveDate,
    pub status: YearStatus,
    pub is_active: bool,
    pub predecessor: Option<YearId>,
}

impl FiscalYear {
    /// Returns true if the given date falls within this year.
    pub fn contains_date(&self, date: NaiveDate) -> bool {
        date >= self.begin && date <= self.end
    }
}

/// One account of a fiscal year's chart. Codes are unique per year; the
/// same code usually reappears in every year of the chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartsAccount {
    pub id: AccountId,
    pub year: YearId,
    pub code: String,
    pub name: String,
    pub account_type: AccountType,
}

impl ChartsAccount {
    pub fn balance_sign(&self) -> i64 {
        self.account_type.balance_sign()
    }
}

/// An accounting journal. Journals `1..=5` are built in and non-deletable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Journal {
    pub id: JournalId,
    pub name: String,
}

impl Journal {
    pub const CARRY_FORWARD: JournalId = 1;
    pub const PURCHASES: JournalId = 2;
    pub const SALES: JournalId = 3;
    pub const PAYMENTS: JournalId = 4;
    pub const MISCELLANEOUS: JournalId = 5;

    pub fn is_builtin(id: JournalId) -> bool {
        (Self::CARRY_FORWARD..=Self::MISCELLANEOUS).contains(&id)
    }

    /// The five built-in journals seeded into every fresh store.
    pub fn builtins() -> Vec<Journal> {
        [
            (Self::CARRY_FORWARD, "carry-forward"),
            (Self::PURCHASES, "purchases"),
            (Self::SALES, "sales"),
            (Self::PAYMENTS, "payments"),
            (Self::MISCELLANEOUS, "miscellaneous"),
        ]
        .into_iter()
        .map(|(id, name)| Journal {
            id,
            name: name.to_string(),
        })
        .collect()
    }
}

/// A reconciliation link ("letter") grouping mutually settled entries.
/// Identity only; its display letter derives from creation order within the
/// fiscal year of its entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountLink {
    pub id: LinkId,
}

/// Lifecycle states of a cost-accounting pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CostStatus {
    Open,
    Closed,
}

/// An analytic cost center, usable as an optional tag on entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostAccounting {
    pub id: CostId,
    pub name: String,
    pub description: String,
    pub status: CostStatus,
    pub is_default: bool,
    pub predecessor: Option<CostId>,
}

/// A counterparty (customer/supplier) seen through its ledger account codes.
/// Contact management itself lives outside this crate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Third {
    pub id: ThirdId,
    pub name: String,
    /// Account codes this third operates under (e.g. one customer code and
    /// one supplier code).
    pub account_codes: Vec<String>,
}

impl Third {
    /// First of the third's account codes matching the given mask.
    pub fn code_matching(&self, mask: &regex::Regex) -> Option<&str> {
        self.account_codes
            .iter()
            .map(String::as_str)
            .find(|code| mask.is_match(code))
    }
}

/// Reference to a ledger line: either persisted under a storage id, or
/// pending inside a draft under a local token. Keeping the two apart by
/// construction rules out identity confusion between real and draft lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LineRef {
    Persisted(i64),
    Pending(i64),
}

impl LineRef {
    /// Wire representation used by the draft serialization format:
    /// persisted ids are positive, pending tokens are negative.
    pub fn to_serial(self) -> i64 {
        match self {
            LineRef::Persisted(id) => id,
            LineRef::Pending(token) => -token,
        }
    }

    pub fn from_serial(raw: i64) -> Self {
        if raw < 0 {
            LineRef::Pending(-raw)
        } else {
            LineRef::Persisted(raw)
        }
    }

    pub fn is_pending(self) -> bool {
        matches!(self, LineRef::Pending(_))
    }
}

/// One double-entry transaction header. While `close` is false the entry is
/// a mutable draft; once closed it is immutable except for link changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryAccount {
    pub id: EntryId,
    pub year: YearId,
    /// Definitive sequential number, assigned at closing only.
    pub num: Option<i32>,
    pub journal: JournalId,
    pub link: Option<LinkId>,
    /// Bookkeeping date, assigned at closing only.
    pub date_entry: Option<NaiveDate>,
    /// Value date of the operation.
    pub date_value: NaiveDate,
    pub designation: String,
    pub cost_accounting: Option<CostId>,
    pub close: bool,
}

/// One account movement within an entry. The amount is stored as a single
/// signed value; the account's normal-balance sign turns it back into a
/// debit or credit figure for display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryLineAccount {
    pub id: LineRef,
    pub entry: EntryId,
    pub account: AccountId,
    pub amount: BigDecimal,
    pub third: Option<ThirdId>,
    pub reference: Option<String>,
}

impl EntryLineAccount {
    /// Debit side of the stored amount for an account with the given sign.
    pub fn debit(&self, sign: i64) -> BigDecimal {
        let signed = BigDecimal::from(-sign) * &self.amount;
        if signed > BigDecimal::from(0) {
            signed
        } else {
            BigDecimal::from(0)
        }
    }

    /// Credit side of the stored amount for an account with the given sign.
    pub fn credit(&self, sign: i64) -> BigDecimal {
        let signed = BigDecimal::from(sign) * &self.amount;
        if signed > BigDecimal::from(0) {
            signed
        } else {
            BigDecimal::from(0)
        }
    }

    /// Sets the stored amount from a one-sided debit/credit pair.
    pub fn set_amount(&mut self, debit: &BigDecimal, credit: &BigDecimal, sign: i64) {
        let zero = BigDecimal::from(0);
        if debit > &zero {
            self.amount = BigDecimal::from(-sign) * debit;
        } else if credit > &zero {
            self.amount = BigDecimal::from(sign) * credit;
        } else {
            self.amount = zero;
        }
    }

    /// Field-wise comparison used by the draft change control.
    pub fn same_as(&self, other: &EntryLineAccount) -> bool {
        self.id == other.id
            && self.account == other.account
            && self.amount == other.amount
            && self.reference == other.reference
            && self.third == other.third
    }
}

/// Filter for entry listing, consumed by presentation layers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntryFilter {
    pub year: Option<YearId>,
    pub journal: Option<JournalId>,
    pub close: Option<bool>,
    pub linked: Option<bool>,
}

impl EntryFilter {
    pub fn for_year(year: YearId) -> Self {
        Self {
            year: Some(year),
            ..Self::default()
        }
    }

    pub fn matches(&self, entry: &EntryAccount) -> bool {
        self.year.map_or(true, |y| entry.year == y)
            && self.journal.map_or(true, |j| entry.journal == j)
            && self.close.map_or(true, |c| entry.close == c)
            && self.linked.map_or(true, |l| entry.link.is_some() == l)
    }
}

/// A reusable entry template: a journal plus named line templates that
/// expand into a draft with a multiplying factor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelEntry {
    pub id: ModelId,
    pub journal: JournalId,
    pub designation: String,
    pub lines: Vec<ModelLine>,
}

/// One template line of a [`ModelEntry`], addressed by account code so the
/// model survives across fiscal years.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelLine {
    pub code: String,
    pub third: Option<ThirdId>,
    pub amount: BigDecimal,
}

/// Errors that can occur in the ledger engine.
///
/// Every variant is a local validation failure surfaced synchronously to the
/// caller; none is retried automatically. Storage faults are wrapped in
/// [`LedgerError::Storage`] and carry whatever the backend reports.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Operation not valid in the current state: {0}")]
    InvalidState(String),
    #[error("Entry is unbalanced: credit {credit}, debit {debit}")]
    Unbalanced { credit: BigDecimal, debit: BigDecimal },
    #[error("Entry {0} is closed and cannot be modified")]
    EntryClosed(EntryId),
    #[error("This kind of account is not allowed for this journal")]
    ForbiddenJournalUse,
    #[error("Account not configured: {0}")]
    AccountNotConfigured(String),
    #[error("No fiscal year defined")]
    NoCurrentFiscalYear,
    #[error("No valid selection")]
    NoValidSelection,
    #[error("A bank account is required for this payment mode")]
    BankAccountMissing,
    #[error("Carry-forward entries are not all validated")]
    UnvalidatedCarryForward,
    #[error("A profit/deficit of {0} must be allocated to an equity account")]
    ProfitAllocationRequired(BigDecimal),
    #[error("Cannot delete: {0}")]
    CannotDelete(String),
    #[error("Account not found: {0}")]
    AccountNotFound(String),
    #[error("Entry not found: {0}")]
    EntryNotFound(EntryId),
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Result type for ledger operations
pub type LedgerResult<T> = Result<T, LedgerError>;
