//! Fiscal year lifecycle
//!
//! A year moves forward-only through Building -> Running -> Finished.
//! Opening imports the predecessor's chart and replays its balances into
//! the carry-forward journal; closing posts the result and third-party
//! closing entries, then rolls still-open entries into the successor year.

use bigdecimal::BigDecimal;
use chrono::{Datelike, Days, NaiveDate, Utc};
use std::collections::{BTreeMap, HashMap};
use tracing::info;

use crate::ledger::chart::ChartManager;
use crate::ledger::entry::EntryManager;
use crate::traits::{LedgerContext, LedgerStorage};
use crate::types::*;

/// Manager for fiscal-year creation and lifecycle transitions
pub struct YearManager<S: LedgerStorage + Clone> {
    storage: S,
    context: LedgerContext,
    charts: ChartManager<S>,
    entries: EntryManager<S>,
}

impl<S: LedgerStorage + Clone> YearManager<S> {
    pub fn new(storage: S, context: LedgerContext) -> Self {
        Self {
            charts: ChartManager::new(storage.clone(), context.clone()),
            entries: EntryManager::new(storage.clone(), context.clone()),
            storage,
            context,
        }
    }

    /// Creates a fiscal year chained after the most recently ended one.
    ///
    /// Dates default to the day after the last year's end (or today) and a
    /// duration of one year. Refused while no accounting system is
    /// configured.
    pub async fn create_year(
        &mut self,
        begin: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> LedgerResult<FiscalYear> {
        if !self.context.profile.is_configured() {
            return Err(LedgerError::InvalidState(
                "no accounting system configured".to_string(),
            ));
        }
        let years = self.storage.list_years().await?;
        let predecessor = years.last().cloned();
        let begin = begin.unwrap_or_else(|| {
            predecessor
                .as_ref()
                .and_then(|year| year.end.checked_add_days(Days::new(1)))
                .unwrap_or_else(|| Utc::now().date_naive())
        });
        let end = end.unwrap_or_else(|| {
            NaiveDate::from_ymd_opt(begin.year() + 1, begin.month(), begin.day())
                .unwrap_or(begin)
                .pred_opt()
                .unwrap_or(begin)
        });
        if begin > end {
            return Err(LedgerError::Validation(
                "fiscal year must begin before it ends".to_string(),
            ));
        }
        let year = self
            .storage
            .insert_year(FiscalYear {
                id: 0,
                begin,
                end,
                status: YearStatus::Building,
                is_active: years.is_empty(),
                predecessor: predecessor.map(|year| year.id),
            })
            .await?;
        info!(year = year.id, %begin, %end, "fiscal year created");
        Ok(year)
    }

    /// Makes this year the active one, clearing the flag on every other.
    pub async fn set_active(&mut self, year: YearId) -> LedgerResult<()> {
        let mut found = false;
        for mut item in self.storage.list_years().await? {
            let active = item.id == year;
            found |= active;
            if item.is_active != active {
                item.is_active = active;
                self.storage.update_year(&item).await?;
            }
        }
        if !found {
            return Err(LedgerError::NoCurrentFiscalYear);
        }
        Ok(())
    }

    /// The single active fiscal year.
    pub async fn current(&self) -> LedgerResult<FiscalYear> {
        self.storage
            .list_years()
            .await?
            .into_iter()
            .find(|year| year.is_active)
            .ok_or(LedgerError::NoCurrentFiscalYear)
    }

    pub async fn get_year_required(&self, year: YearId) -> LedgerResult<FiscalYear> {
        self.storage
            .get_year(year)
            .await?
            .ok_or(LedgerError::NoCurrentFiscalYear)
    }

    /// Deletes a year and its entries. Only the most recently ended year
    /// may be deleted, and never a finished one.
    pub async fn delete_year(&mut self, year: YearId) -> LedgerResult<()> {
        let years = self.storage.list_years().await?;
        let target = self.get_year_required(year).await?;
        if years.last().map(|last| last.id) != Some(year) {
            return Err(LedgerError::CannotDelete(
                "this fiscal year is not the last".to_string(),
            ));
        }
        if target.status == YearStatus::Finished {
            return Err(LedgerError::CannotDelete(
                "fiscal year is finished".to_string(),
            ));
        }
        for entry in self
            .storage
            .list_entries(&EntryFilter::for_year(year))
            .await?
        {
            crate::ledger::link::unlink_entry(&mut self.storage, entry.id).await?;
            self.storage.delete_entry(entry.id).await?;
        }
        self.storage.delete_year(year).await
    }

    /// Imports every chart account of the predecessor not already present.
    pub async fn import_charts(&mut self, year: YearId) -> LedgerResult<()> {
        self.charts.import_from_predecessor(year).await
    }

    async fn year_lines(
        &self,
        year: &FiscalYear,
    ) -> LedgerResult<(
        Vec<EntryLineAccount>,
        HashMap<AccountId, ChartsAccount>,
        HashMap<EntryId, EntryAccount>,
    )> {
        let lines = self.storage.lines_for_year(year.id).await?;
        let accounts = self.charts.accounts_by_id(year.id).await?;
        let entries: HashMap<EntryId, EntryAccount> = self
            .storage
            .list_entries(&EntryFilter::for_year(year.id))
            .await?
            .into_iter()
            .map(|entry| (entry.id, entry))
            .collect();
        Ok((lines, accounts, entries))
    }

    async fn sum_lines<F>(&self, year: &FiscalYear, keep: F) -> LedgerResult<BigDecimal>
    where
        F: Fn(&EntryLineAccount, &ChartsAccount, &EntryAccount) -> bool,
    {
        let (lines, accounts, entries) = self.year_lines(year).await?;
        let mut sum = BigDecimal::from(0);
        for line in &lines {
            let (Some(account), Some(entry)) =
                (accounts.get(&line.account), entries.get(&line.entry))
            else {
                continue;
            };
            if entry.date_value >= year.begin && entry.date_value <= year.end
                && keep(line, account, entry)
            {
                sum += &line.amount;
            }
        }
        Ok(sum)
    }

    /// Total of revenue-account movements over the year.
    pub async fn total_revenue(&self, year: YearId) -> LedgerResult<BigDecimal> {
        let year = self.get_year_required(year).await?;
        self.sum_lines(&year, |_, account, _| {
            account.account_type == AccountType::Revenue
        })
        .await
    }

    /// Total of expense-account movements over the year.
    pub async fn total_expense(&self, year: YearId) -> LedgerResult<BigDecimal> {
        let year = self.get_year_required(year).await?;
        self.sum_lines(&year, |_, account, _| {
            account.account_type == AccountType::Expense
        })
        .await
    }

    /// Total of cash-account movements over the year.
    pub async fn total_cash(&self, year: YearId) -> LedgerResult<BigDecimal> {
        let year = self.get_year_required(year).await?;
        let mask = self.context.profile.cash_mask().clone();
        self.sum_lines(&year, |_, account, _| mask.is_match(&account.code))
            .await
    }

    /// Cash-account movements restricted to closed entries.
    pub async fn total_cash_closed(&self, year: YearId) -> LedgerResult<BigDecimal> {
        let year = self.get_year_required(year).await?;
        let mask = self.context.profile.cash_mask().clone();
        self.sum_lines(&year, |_, account, entry| {
            entry.close && mask.is_match(&account.code)
        })
        .await
    }

    /// True when the carry-forward journal already holds a balance, i.e.
    /// the opening replay has been run for this year.
    pub async fn has_carry_forward_balance(&self, year: YearId) -> LedgerResult<bool> {
        let year = self.get_year_required(year).await?;
        let sum = self
            .sum_lines(&year, |_, _, entry| entry.journal == Journal::CARRY_FORWARD)
            .await?;
        Ok(!self.context.currency.is_negligible(&sum))
    }

    fn is_result_code(&self, code: &str) -> bool {
        let profile = self.context.profile.as_ref();
        let profit = profile.profit_account();
        let deficit = profile.deficit_account();
        (!profit.is_empty() && code.starts_with(profit))
            || (!deficit.is_empty() && code.starts_with(deficit))
    }

    /// Balance currently carried on the profile's result accounts: the
    /// predecessor's profit or deficit awaiting allocation.
    pub async fn profit_to_allocate(&self, year: YearId) -> LedgerResult<BigDecimal> {
        let year = self.get_year_required(year).await?;
        self.sum_lines(&year, |_, account, _| self.is_result_code(&account.code))
            .await
    }

    /// Starts the year: Building -> Running.
    ///
    /// Every carry-forward entry must be validated first. When the result
    /// accounts carry a profit or deficit, the caller must name the equity
    /// account receiving it; the affectation entry is posted in the
    /// miscellaneous journal and closed.
    pub async fn begin(
        &mut self,
        year: YearId,
        profit_account: Option<AccountId>,
    ) -> LedgerResult<FiscalYear> {
        let mut year = self.get_year_required(year).await?;
        if year.status != YearStatus::Building {
            return Err(LedgerError::InvalidState(
                "fiscal year is not in building".to_string(),
            ));
        }
        let unvalidated = self
            .storage
            .list_entries(&EntryFilter {
                year: Some(year.id),
                journal: Some(Journal::CARRY_FORWARD),
                close: Some(false),
                linked: None,
            })
            .await?;
        if !unvalidated.is_empty() {
            return Err(LedgerError::UnvalidatedCarryForward);
        }
        let profit = self.profit_to_allocate(year.id).await?;
        if !self.context.currency.is_negligible(&profit) {
            let destination = profit_account.ok_or_else(|| {
                LedgerError::ProfitAllocationRequired(self.context.currency.round(&profit))
            })?;
            self.post_profit_affectation(&year, destination, &profit)
                .await?;
        }
        year.status = YearStatus::Running;
        self.storage.update_year(&year).await?;
        info!(year = year.id, "fiscal year running");
        Ok(year)
    }

    async fn post_profit_affectation(
        &mut self,
        year: &FiscalYear,
        destination: AccountId,
        profit: &BigDecimal,
    ) -> LedgerResult<()> {
        let account = self.charts.get_account_required(destination).await?;
        if account.year != year.id || account.account_type != AccountType::Equity {
            return Err(LedgerError::Validation(
                "profit must be allocated to an equity account of this year".to_string(),
            ));
        }
        if self.is_result_code(&account.code) {
            return Err(LedgerError::Validation(
                "profit cannot be allocated back to a result account".to_string(),
            ));
        }
        let entry = self
            .entries
            .create_entry(
                year.id,
                Journal::MISCELLANEOUS,
                year.begin,
                "Profit/deficit affectation",
                None,
            )
            .await?;
        let (lines, accounts, _) = self.year_lines(year).await?;
        for line in &lines {
            let Some(line_account) = accounts.get(&line.account) else {
                continue;
            };
            if self.is_result_code(&line_account.code) {
                self.storage
                    .insert_line(EntryLineAccount {
                        id: LineRef::Pending(0),
                        entry: entry.id,
                        account: line.account,
                        amount: -line.amount.clone(),
                        third: None,
                        reference: None,
                    })
                    .await?;
            }
        }
        self.storage
            .insert_line(EntryLineAccount {
                id: LineRef::Pending(0),
                entry: entry.id,
                account: account.id,
                amount: profit.clone(),
                third: None,
                reference: None,
            })
            .await?;
        self.entries.close(entry.id).await?;
        Ok(())
    }

    /// Finishes the year: Running -> Finished.
    ///
    /// Posts the result entry and the third-party closing entry, then
    /// rolls every still-open entry into the successor year. Open entries
    /// without a successor year block the close.
    pub async fn close(&mut self, year: YearId) -> LedgerResult<FiscalYear> {
        let mut year = self.get_year_required(year).await?;
        if year.status != YearStatus::Running {
            return Err(LedgerError::InvalidState(
                "fiscal year is not running".to_string(),
            ));
        }
        let successor = self
            .storage
            .list_years()
            .await?
            .into_iter()
            .find(|candidate| candidate.predecessor == Some(year.id));
        let open = self
            .storage
            .list_entries(&EntryFilter {
                year: Some(year.id),
                close: Some(false),
                ..EntryFilter::default()
            })
            .await?;
        if !open.is_empty() && successor.is_none() {
            return Err(LedgerError::InvalidState(
                "cannot close the year: open entries need a successor year".to_string(),
            ));
        }
        self.post_result_entry(&year).await?;
        self.post_thirds_closing_entry(&year).await?;
        if let Some(successor) = successor {
            self.roll_forward_open_entries(&year, &successor).await?;
        }
        year.status = YearStatus::Finished;
        self.storage.update_year(&year).await?;
        info!(year = year.id, "fiscal year finished");
        Ok(year)
    }

    /// Moves `revenue - expense` onto the profile's profit or deficit
    /// account. The entry is one-sided by construction: the revenue and
    /// expense accounts themselves are left untouched.
    async fn post_result_entry(&mut self, year: &FiscalYear) -> LedgerResult<()> {
        let revenue = self.total_revenue(year.id).await?;
        let expense = self.total_expense(year.id).await?;
        let result = &revenue - &expense;
        if self.context.currency.is_negligible(&result) {
            return Ok(());
        }
        let profile = self.context.profile.as_ref();
        let code = if expense > revenue {
            profile.deficit_account().to_string()
        } else {
            profile.profit_account().to_string()
        };
        let entry = self
            .entries
            .create_entry(
                year.id,
                Journal::MISCELLANEOUS,
                year.end,
                "Fiscal year closing - result",
                None,
            )
            .await?;
        let account = self
            .charts
            .get_or_create_account(year.id, &code, None)
            .await?;
        self.storage
            .insert_line(EntryLineAccount {
                id: LineRef::Pending(0),
                entry: entry.id,
                account: account.id,
                amount: result,
                third: None,
                reference: None,
            })
            .await?;
        self.entries.close_unchecked(entry.id).await?;
        Ok(())
    }

    /// Zeroes out every third-party position open at year end: one
    /// reversal line per `(account, third)` balance, offset by a single
    /// aggregate line per account.
    async fn post_thirds_closing_entry(&mut self, year: &FiscalYear) -> LedgerResult<()> {
        let third_mask = self.context.profile.third_mask().clone();
        let (lines, accounts, _) = self.year_lines(year).await?;
        let mut by_account_third: BTreeMap<(AccountId, Option<ThirdId>), BigDecimal> =
            BTreeMap::new();
        for line in &lines {
            let Some(account) = accounts.get(&line.account) else {
                continue;
            };
            if third_mask.is_match(&account.code) {
                *by_account_third
                    .entry((line.account, line.third))
                    .or_default() += &line.amount;
            }
        }
        by_account_third.retain(|_, sum| !self.context.currency.is_negligible(sum));
        if by_account_third.is_empty() {
            return Ok(());
        }
        let mut by_account: BTreeMap<AccountId, BigDecimal> = BTreeMap::new();
        for ((account, _), sum) in &by_account_third {
            *by_account.entry(*account).or_default() += sum;
        }
        let entry = self
            .entries
            .create_entry(
                year.id,
                Journal::MISCELLANEOUS,
                year.end,
                "Fiscal year closing - third",
                None,
            )
            .await?;
        for ((account, third), sum) in &by_account_third {
            self.storage
                .insert_line(EntryLineAccount {
                    id: LineRef::Pending(0),
                    entry: entry.id,
                    account: *account,
                    amount: -sum.clone(),
                    third: *third,
                    reference: None,
                })
                .await?;
        }
        for (account, sum) in &by_account {
            self.storage
                .insert_line(EntryLineAccount {
                    id: LineRef::Pending(0),
                    entry: entry.id,
                    account: *account,
                    amount: sum.clone(),
                    third: None,
                    reference: None,
                })
                .await?;
        }
        self.entries.close(entry.id).await?;
        Ok(())
    }

    /// Rebinds every open entry to the successor year: accounts remapped
    /// by code, value date rewritten to the successor's first day.
    async fn roll_forward_open_entries(
        &mut self,
        year: &FiscalYear,
        successor: &FiscalYear,
    ) -> LedgerResult<()> {
        let accounts = self.charts.accounts_by_id(year.id).await?;
        let open = self
            .storage
            .list_entries(&EntryFilter {
                year: Some(year.id),
                close: Some(false),
                ..EntryFilter::default()
            })
            .await?;
        for mut entry in open {
            for mut line in self.storage.lines_of_entry(entry.id).await? {
                let Some(old_account) = accounts.get(&line.account) else {
                    continue;
                };
                let new_account = self
                    .charts
                    .get_or_create_account(
                        successor.id,
                        &old_account.code,
                        Some(&old_account.name),
                    )
                    .await?;
                line.account = new_account.id;
                self.storage.update_line(&line).await?;
            }
            entry.year = successor.id;
            entry.date_value = successor.begin;
            self.storage.update_entry(&entry).await?;
        }
        Ok(())
    }

    /// Seeds the opening balances of a building year from its predecessor:
    /// one carry-forward entry replaying the balance-sheet balances, and
    /// one replaying the third-party lines of the predecessor's last
    /// closing entry.
    pub async fn report_lastyear(&mut self, year: YearId) -> LedgerResult<()> {
        let year = self.get_year_required(year).await?;
        let predecessor_id = year.predecessor.ok_or_else(|| {
            LedgerError::InvalidState("this fiscal year has no predecessor".to_string())
        })?;
        if year.status != YearStatus::Building {
            return Err(LedgerError::InvalidState(
                "fiscal year is not in building".to_string(),
            ));
        }
        self.report_balance_sheet(&year, predecessor_id).await?;
        self.report_thirds(&year, predecessor_id).await?;
        Ok(())
    }

    async fn report_balance_sheet(
        &mut self,
        year: &FiscalYear,
        predecessor: YearId,
    ) -> LedgerResult<()> {
        let entry = self
            .entries
            .create_entry(
                year.id,
                Journal::CARRY_FORWARD,
                year.begin,
                "Retained earnings - balance sheet",
                None,
            )
            .await?;
        for account in self.storage.list_accounts(predecessor).await? {
            if !account.account_type.is_balance_sheet() {
                continue;
            }
            let balance = self.charts.raw_validated(&account).await?;
            if self.context.currency.is_negligible(&balance) {
                continue;
            }
            let target = self
                .charts
                .get_or_create_account(year.id, &account.code, Some(&account.name))
                .await?;
            self.storage
                .insert_line(EntryLineAccount {
                    id: LineRef::Pending(0),
                    entry: entry.id,
                    account: target.id,
                    amount: balance,
                    third: None,
                    reference: None,
                })
                .await?;
        }
        self.entries.close_unchecked(entry.id).await?;
        Ok(())
    }

    async fn report_thirds(
        &mut self,
        year: &FiscalYear,
        predecessor: YearId,
    ) -> LedgerResult<()> {
        let closing_entries = self
            .storage
            .list_entries(&EntryFilter {
                year: Some(predecessor),
                journal: Some(Journal::MISCELLANEOUS),
                ..EntryFilter::default()
            })
            .await?;
        let Some(last) = closing_entries
            .into_iter()
            .filter(|entry| entry.num.is_some())
            .max_by_key(|entry| entry.num)
        else {
            return Ok(());
        };
        let accounts = self.charts.accounts_by_id(predecessor).await?;
        let lines = self.storage.lines_of_entry(last.id).await?;
        let mut total_credit = BigDecimal::from(0);
        let mut total_debit = BigDecimal::from(0);
        for line in &lines {
            let sign = accounts
                .get(&line.account)
                .map_or(1, ChartsAccount::balance_sign);
            total_credit += line.credit(sign);
            total_debit += line.debit(sign);
        }
        // replay only when the closing entry's rest is itself balanced
        if !self
            .context
            .currency
            .is_negligible(&(&total_credit - &total_debit))
        {
            return Ok(());
        }
        let third_mask = self.context.profile.third_mask().clone();
        let entry = self
            .entries
            .create_entry(
                year.id,
                Journal::CARRY_FORWARD,
                year.begin,
                "Retained earnings - third party debt",
                None,
            )
            .await?;
        for line in &lines {
            let Some(account) = accounts.get(&line.account) else {
                continue;
            };
            if !third_mask.is_match(&account.code) {
                continue;
            }
            let target = self
                .charts
                .get_or_create_account(year.id, &account.code, Some(&account.name))
                .await?;
            self.storage
                .insert_line(EntryLineAccount {
                    id: LineRef::Pending(0),
                    entry: entry.id,
                    account: target.id,
                    amount: -line.amount.clone(),
                    third: line.third,
                    reference: None,
                })
                .await?;
        }
        self.entries.close(entry.id).await?;
        Ok(())
    }
}
