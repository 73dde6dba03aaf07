//! Chart-of-accounts store
//!
//! Accounts are scoped per fiscal year; the active accounting-system
//! profile supplies code masks and infers name/type for new codes.

use bigdecimal::BigDecimal;
use std::collections::HashMap;
use tracing::debug;

use crate::traits::{LedgerContext, LedgerStorage};
use crate::types::*;

/// Which lines participate in an account total.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TotalScope {
    /// Every line of the account.
    All,
    /// Lines of closed entries only.
    Validated,
    /// Lines of carry-forward (journal 1) entries only.
    CarryForward,
}

/// Manager for chart-of-accounts operations
pub struct ChartManager<S: LedgerStorage> {
    storage: S,
    context: LedgerContext,
}

impl<S: LedgerStorage> ChartManager<S> {
    pub fn new(storage: S, context: LedgerContext) -> Self {
        Self { storage, context }
    }

    /// Returns the account with that `(year, code)`, creating it if absent.
    ///
    /// When `name` is omitted, the profile's code-to-type mapping supplies
    /// the default name; the account type always comes from the profile.
    pub async fn get_or_create_account(
        &mut self,
        year: YearId,
        code: &str,
        name: Option<&str>,
    ) -> LedgerResult<ChartsAccount> {
        if let Some(existing) = self.storage.account_by_code(year, code).await? {
            return Ok(existing);
        }
        let (default_name, account_type) = self.context.profile.new_charts_account(code)?;
        let name = name.unwrap_or(&default_name);
        debug!(year, code, "creating chart account");
        self.storage
            .insert_account(ChartsAccount {
                id: 0,
                year,
                code: code.to_string(),
                name: name.to_string(),
                account_type,
            })
            .await
    }

    /// Gets an account by id, returning an error if not found.
    pub async fn get_account_required(&self, id: AccountId) -> LedgerResult<ChartsAccount> {
        self.storage
            .get_account(id)
            .await?
            .ok_or_else(|| LedgerError::AccountNotFound(id.to_string()))
    }

    /// Gets an account by `(year, code)`.
    pub async fn account_by_code(
        &self,
        year: YearId,
        code: &str,
    ) -> LedgerResult<Option<ChartsAccount>> {
        self.storage.account_by_code(year, code).await
    }

    /// Accounts of a year, ordered by code.
    pub async fn list_accounts(&self, year: YearId) -> LedgerResult<Vec<ChartsAccount>> {
        self.storage.list_accounts(year).await
    }

    /// Map of account id to account for a year, for join-style lookups.
    pub async fn accounts_by_id(
        &self,
        year: YearId,
    ) -> LedgerResult<HashMap<AccountId, ChartsAccount>> {
        Ok(self
            .storage
            .list_accounts(year)
            .await?
            .into_iter()
            .map(|account| (account.id, account))
            .collect())
    }

    /// Copies every account of the predecessor year that is not already
    /// present in this year.
    pub async fn import_from_predecessor(&mut self, year: YearId) -> LedgerResult<()> {
        let year = self
            .storage
            .get_year(year)
            .await?
            .ok_or(LedgerError::NoCurrentFiscalYear)?;
        let predecessor = year.predecessor.ok_or_else(|| {
            LedgerError::InvalidState("this fiscal year has no predecessor".to_string())
        })?;
        if year.status == YearStatus::Finished {
            return Err(LedgerError::InvalidState(
                "fiscal year is finished".to_string(),
            ));
        }
        for account in self.storage.list_accounts(predecessor).await? {
            if self
                .storage
                .account_by_code(year.id, &account.code)
                .await?
                .is_none()
            {
                self.storage
                    .insert_account(ChartsAccount {
                        id: 0,
                        year: year.id,
                        code: account.code.clone(),
                        name: account.name.clone(),
                        account_type: account.account_type,
                    })
                    .await?;
            }
        }
        Ok(())
    }

    /// Resolves the ledger account a third settles on for the given mask,
    /// in the given year.
    pub async fn third_account(
        &self,
        third: &Third,
        year: YearId,
        mask: &regex::Regex,
    ) -> LedgerResult<ChartsAccount> {
        let code = third
            .code_matching(mask)
            .ok_or_else(|| LedgerError::AccountNotConfigured(third.name.clone()))?;
        self.storage
            .account_by_code(year, code)
            .await?
            .ok_or_else(|| LedgerError::AccountNotConfigured(code.to_string()))
    }

    async fn total(&self, account: &ChartsAccount, scope: TotalScope) -> LedgerResult<BigDecimal> {
        let lines = self.storage.lines_for_year(account.year).await?;
        let entries: HashMap<EntryId, EntryAccount> = self
            .storage
            .list_entries(&EntryFilter::for_year(account.year))
            .await?
            .into_iter()
            .map(|entry| (entry.id, entry))
            .collect();
        let mut sum = BigDecimal::from(0);
        for line in lines.iter().filter(|line| line.account == account.id) {
            let keep = match scope {
                TotalScope::All => true,
                TotalScope::Validated => entries.get(&line.entry).map_or(false, |e| e.close),
                TotalScope::CarryForward => entries
                    .get(&line.entry)
                    .map_or(false, |e| e.journal == Journal::CARRY_FORWARD),
            };
            if keep {
                sum += &line.amount;
            }
        }
        Ok(sum)
    }

    /// Raw signed-amount sum of every line of the account.
    pub async fn raw_total(&self, account: &ChartsAccount) -> LedgerResult<BigDecimal> {
        self.total(account, TotalScope::All).await
    }

    /// Raw signed-amount sum of the account's closed-entry lines.
    pub async fn raw_validated(&self, account: &ChartsAccount) -> LedgerResult<BigDecimal> {
        self.total(account, TotalScope::Validated).await
    }

    /// Opening balance carried into the year (carry-forward journal lines),
    /// in the account's display convention.
    pub async fn last_year_total(&self, account: &ChartsAccount) -> LedgerResult<BigDecimal> {
        let raw = self.total(account, TotalScope::CarryForward).await?;
        Ok(BigDecimal::from(account.balance_sign()) * raw)
    }

    /// Current balance of the account, in its display convention.
    pub async fn current_total(&self, account: &ChartsAccount) -> LedgerResult<BigDecimal> {
        let raw = self.total(account, TotalScope::All).await?;
        Ok(BigDecimal::from(account.balance_sign()) * raw)
    }

    /// Balance restricted to validated (closed) entries, in the account's
    /// display convention.
    pub async fn current_validated(&self, account: &ChartsAccount) -> LedgerResult<BigDecimal> {
        let raw = self.total(account, TotalScope::Validated).await?;
        Ok(BigDecimal::from(account.balance_sign()) * raw)
    }
}
