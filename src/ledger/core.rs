//! Ledger facade coordinating chart, entries, years, links and payments

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use std::sync::Arc;

use crate::ledger::chart::ChartManager;
use crate::ledger::entry::{DraftControl, EntryDraft, EntryManager};
use crate::ledger::link::LinkManager;
use crate::ledger::year::YearManager;
use crate::payoff::deposit::{CandidateFilter, DepositCandidate, DepositManager, DepositSlip};
use crate::payoff::{
    AllocationOutcome, BankAccount, PaymentTerms, Payoff, PayoffManager, Repartition,
};
use crate::profiles::{profile_for, ProfileKind};
use crate::settings::LedgerSettings;
use crate::traits::{AccountingSystemProfile, LedgerContext, LedgerStorage, Supporting};
use crate::types::*;

/// Main engine facade
///
/// Owns one manager per concern, all sharing the same storage handle and
/// context. Every mutating operation is scoped to a single aggregate; the
/// storage backend provides atomicity per aggregate.
pub struct Ledger<S: LedgerStorage + Clone> {
    context: LedgerContext,
    storage: S,
    charts: ChartManager<S>,
    entries: EntryManager<S>,
    links: LinkManager<S>,
    years: YearManager<S>,
    payoffs: PayoffManager<S>,
    deposits: DepositManager<S>,
}

impl<S: LedgerStorage + Clone> Ledger<S> {
    /// Builds the engine for a registered profile.
    pub fn new(storage: S, profile: ProfileKind, settings: LedgerSettings) -> Self {
        Self::with_profile(storage, profile_for(profile), settings)
    }

    /// Builds the engine with a custom accounting-system profile.
    pub fn with_profile(
        storage: S,
        profile: Arc<dyn AccountingSystemProfile>,
        settings: LedgerSettings,
    ) -> Self {
        let context = LedgerContext::new(profile, settings);
        Self {
            charts: ChartManager::new(storage.clone(), context.clone()),
            entries: EntryManager::new(storage.clone(), context.clone()),
            links: LinkManager::new(storage.clone()),
            years: YearManager::new(storage.clone(), context.clone()),
            payoffs: PayoffManager::new(storage.clone(), context.clone()),
            deposits: DepositManager::new(storage.clone(), context.clone()),
            storage,
            context,
        }
    }

    pub fn context(&self) -> &LedgerContext {
        &self.context
    }

    // Fiscal years
    pub async fn create_year(
        &mut self,
        begin: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> LedgerResult<FiscalYear> {
        self.years.create_year(begin, end).await
    }

    pub async fn set_active_year(&mut self, year: YearId) -> LedgerResult<()> {
        self.years.set_active(year).await
    }

    pub async fn current_year(&self) -> LedgerResult<FiscalYear> {
        self.years.current().await
    }

    /// Years ordered by end date ascending.
    pub async fn list_years(&self) -> LedgerResult<Vec<FiscalYear>> {
        self.storage.list_years().await
    }

    pub async fn begin_year(
        &mut self,
        year: YearId,
        profit_account: Option<AccountId>,
    ) -> LedgerResult<FiscalYear> {
        self.years.begin(year, profit_account).await
    }

    pub async fn close_year(&mut self, year: YearId) -> LedgerResult<FiscalYear> {
        self.years.close(year).await
    }

    pub async fn delete_year(&mut self, year: YearId) -> LedgerResult<()> {
        self.years.delete_year(year).await
    }

    pub async fn import_charts(&mut self, year: YearId) -> LedgerResult<()> {
        self.years.import_charts(year).await
    }

    pub async fn report_lastyear(&mut self, year: YearId) -> LedgerResult<()> {
        self.years.report_lastyear(year).await
    }

    pub async fn profit_to_allocate(&self, year: YearId) -> LedgerResult<BigDecimal> {
        self.years.profit_to_allocate(year).await
    }

    pub async fn total_revenue(&self, year: YearId) -> LedgerResult<BigDecimal> {
        self.years.total_revenue(year).await
    }

    pub async fn total_expense(&self, year: YearId) -> LedgerResult<BigDecimal> {
        self.years.total_expense(year).await
    }

    pub async fn total_cash(&self, year: YearId) -> LedgerResult<BigDecimal> {
        self.years.total_cash(year).await
    }

    pub async fn total_cash_closed(&self, year: YearId) -> LedgerResult<BigDecimal> {
        self.years.total_cash_closed(year).await
    }

    // Chart of accounts
    pub async fn get_or_create_account(
        &mut self,
        year: YearId,
        code: &str,
        name: Option<&str>,
    ) -> LedgerResult<ChartsAccount> {
        self.charts.get_or_create_account(year, code, name).await
    }

    pub async fn account_by_code(
        &self,
        year: YearId,
        code: &str,
    ) -> LedgerResult<Option<ChartsAccount>> {
        self.charts.account_by_code(year, code).await
    }

    pub async fn list_accounts(&self, year: YearId) -> LedgerResult<Vec<ChartsAccount>> {
        self.charts.list_accounts(year).await
    }

    pub async fn last_year_total(&self, account: &ChartsAccount) -> LedgerResult<BigDecimal> {
        self.charts.last_year_total(account).await
    }

    pub async fn current_total(&self, account: &ChartsAccount) -> LedgerResult<BigDecimal> {
        self.charts.current_total(account).await
    }

    pub async fn current_validated(&self, account: &ChartsAccount) -> LedgerResult<BigDecimal> {
        self.charts.current_validated(account).await
    }

    // Thirds
    pub async fn create_third(&mut self, name: &str, account_codes: Vec<String>) -> LedgerResult<Third> {
        self.storage
            .insert_third(Third {
                id: 0,
                name: name.to_string(),
                account_codes,
            })
            .await
    }

    pub async fn get_third(&self, id: ThirdId) -> LedgerResult<Option<Third>> {
        self.storage.get_third(id).await
    }

    // Journals
    pub async fn create_journal(&mut self, name: &str) -> LedgerResult<Journal> {
        self.storage.insert_journal(name.to_string()).await
    }

    pub async fn delete_journal(&mut self, id: JournalId) -> LedgerResult<()> {
        if Journal::is_builtin(id) {
            return Err(LedgerError::CannotDelete("journal reserved".to_string()));
        }
        self.storage.delete_journal(id).await
    }

    pub async fn list_journals(&self) -> LedgerResult<Vec<Journal>> {
        self.storage.list_journals().await
    }

    // Cost accounting
    pub async fn create_cost(
        &mut self,
        name: &str,
        description: &str,
        predecessor: Option<CostId>,
    ) -> LedgerResult<CostAccounting> {
        self.storage
            .insert_cost(CostAccounting {
                id: 0,
                name: name.to_string(),
                description: description.to_string(),
                status: CostStatus::Open,
                is_default: false,
                predecessor,
            })
            .await
    }

    pub async fn list_costs(&self) -> LedgerResult<Vec<CostAccounting>> {
        self.storage.list_costs().await
    }

    /// Toggles the default flag of an open cost center, keeping at most
    /// one default across the open pool.
    pub async fn toggle_default_cost(&mut self, cost: CostId) -> LedgerResult<()> {
        let mut target = self
            .storage
            .get_cost(cost)
            .await?
            .ok_or_else(|| LedgerError::Validation("unknown cost accounting".to_string()))?;
        if target.status != CostStatus::Open {
            return Err(LedgerError::InvalidState(
                "cost accounting is closed".to_string(),
            ));
        }
        if target.is_default {
            target.is_default = false;
            self.storage.update_cost(&target).await?;
            return Ok(());
        }
        for mut other in self.storage.list_costs().await? {
            if other.is_default {
                other.is_default = false;
                self.storage.update_cost(&other).await?;
            }
        }
        target.is_default = true;
        self.storage.update_cost(&target).await
    }

    /// Revenue and expense totals of the entries tagged with a cost center.
    pub async fn cost_totals(&self, cost: CostId) -> LedgerResult<(BigDecimal, BigDecimal)> {
        let mut revenue = BigDecimal::from(0);
        let mut expense = BigDecimal::from(0);
        for entry in self.storage.list_entries(&EntryFilter::default()).await? {
            if entry.cost_accounting != Some(cost) {
                continue;
            }
            for line in self.storage.lines_of_entry(entry.id).await? {
                let Some(account) = self.storage.get_account(line.account).await? else {
                    continue;
                };
                match account.account_type {
                    AccountType::Revenue => revenue += &line.amount,
                    AccountType::Expense => expense += &line.amount,
                    _ => {}
                }
            }
        }
        Ok((revenue, expense))
    }

    // Entries and drafts
    pub async fn create_entry(
        &mut self,
        year: YearId,
        journal: JournalId,
        date_value: NaiveDate,
        designation: &str,
        cost_accounting: Option<CostId>,
    ) -> LedgerResult<EntryAccount> {
        self.entries
            .create_entry(year, journal, date_value, designation, cost_accounting)
            .await
    }

    pub async fn draft(&self, entry: EntryId) -> LedgerResult<EntryDraft> {
        self.entries.draft(entry).await
    }

    pub async fn add_line(
        &self,
        draft: &mut EntryDraft,
        account_code: &str,
        debit: BigDecimal,
        credit: BigDecimal,
        third: Option<ThirdId>,
        reference: Option<String>,
    ) -> LedgerResult<LineRef> {
        self.entries
            .add_line(draft, account_code, debit, credit, third, reference)
            .await
    }

    pub async fn control(&self, draft: &EntryDraft) -> LedgerResult<DraftControl> {
        self.entries.control(draft).await
    }

    pub async fn commit(&mut self, draft: &EntryDraft) -> LedgerResult<Vec<EntryLineAccount>> {
        self.entries.commit(draft).await
    }

    pub async fn close_entry(&mut self, entry: EntryId) -> LedgerResult<EntryAccount> {
        self.entries.close(entry).await
    }

    pub async fn reverse_entry(&mut self, entry: EntryId) -> LedgerResult<(EntryAccount, String)> {
        self.entries.reverse(entry).await
    }

    pub async fn delete_entry(&mut self, entry: EntryId) -> LedgerResult<()> {
        self.entries.delete(entry).await
    }

    pub async fn get_entry(&self, entry: EntryId) -> LedgerResult<EntryAccount> {
        self.entries.get_entry_required(entry).await
    }

    pub async fn list_entries(&self, filter: &EntryFilter) -> LedgerResult<Vec<EntryAccount>> {
        self.entries.list_entries(filter).await
    }

    pub async fn lines_of_entry(&self, entry: EntryId) -> LedgerResult<Vec<EntryLineAccount>> {
        self.storage.lines_of_entry(entry).await
    }

    pub async fn apply_model(
        &self,
        draft: &mut EntryDraft,
        model: &ModelEntry,
        factor: &BigDecimal,
    ) -> LedgerResult<()> {
        self.entries.apply_model(draft, model, factor).await
    }

    pub async fn create_model(&mut self, model: ModelEntry) -> LedgerResult<ModelEntry> {
        self.storage.insert_model(model).await
    }

    // Reconciliation
    pub async fn create_link(&mut self, entries: &[EntryId]) -> LedgerResult<AccountLink> {
        self.links.create_link(entries).await
    }

    pub async fn unlink(&mut self, entry: EntryId) -> LedgerResult<()> {
        self.links.unlink(entry).await
    }

    pub async fn letter_of(&self, link: LinkId) -> LedgerResult<String> {
        self.links.letter_of(link).await
    }

    // Payments
    pub async fn rest_to_pay(
        &self,
        doc: &dyn Supporting,
        ignore: Option<PayoffId>,
    ) -> LedgerResult<BigDecimal> {
        self.payoffs.rest_to_pay(doc, ignore).await
    }

    pub async fn record_payoff(
        &mut self,
        doc: &dyn Supporting,
        amount: BigDecimal,
        terms: PaymentTerms,
    ) -> LedgerResult<Payoff> {
        self.payoffs.record_payoff(doc, amount, terms).await
    }

    pub async fn allocate_payment(
        &mut self,
        docs: &[&dyn Supporting],
        amount: BigDecimal,
        repartition: Repartition,
        terms: PaymentTerms,
    ) -> LedgerResult<AllocationOutcome> {
        self.payoffs.allocate(docs, amount, repartition, terms).await
    }

    pub async fn delete_payoff(&mut self, payoff: PayoffId) -> LedgerResult<()> {
        self.payoffs.delete_payoff(payoff).await
    }

    pub async fn create_bank_account(
        &mut self,
        designation: &str,
        reference: &str,
        account_code: &str,
    ) -> LedgerResult<BankAccount> {
        self.payoffs
            .create_bank_account(designation, reference, account_code)
            .await
    }

    pub async fn bank_account_up_order(&mut self, id: BankAccountId) -> LedgerResult<()> {
        self.payoffs.bank_account_up_order(id).await
    }

    // Deposit slips
    pub async fn create_deposit(
        &mut self,
        bank_account: BankAccountId,
        date: NaiveDate,
        reference: &str,
    ) -> LedgerResult<DepositSlip> {
        self.deposits
            .create_deposit(bank_account, date, reference)
            .await
    }

    pub async fn deposit_candidates(
        &self,
        deposit: DepositId,
        filter: &CandidateFilter,
    ) -> LedgerResult<Vec<DepositCandidate>> {
        self.deposits.candidates(deposit, filter).await
    }

    pub async fn add_deposit_payoffs(
        &mut self,
        deposit: DepositId,
        entries: &[EntryId],
    ) -> LedgerResult<()> {
        self.deposits.add_payoffs(deposit, entries).await
    }

    pub async fn close_deposit(&mut self, deposit: DepositId) -> LedgerResult<DepositSlip> {
        self.deposits.close_deposit(deposit).await
    }

    pub async fn validate_deposit(&mut self, deposit: DepositId) -> LedgerResult<DepositSlip> {
        self.deposits.validate_deposit(deposit).await
    }

    pub async fn deposit_total(&self, deposit: DepositId) -> LedgerResult<BigDecimal> {
        self.deposits.total(deposit).await
    }

    pub async fn delete_deposit(&mut self, deposit: DepositId) -> LedgerResult<()> {
        self.deposits.delete_deposit(deposit).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profiles::ProfileKind;
    use crate::utils::memory_storage::MemoryStorage;
    use std::str::FromStr;

    async fn ledger_with_year() -> (Ledger<MemoryStorage>, FiscalYear) {
        let storage = MemoryStorage::new();
        let mut ledger = Ledger::new(storage, ProfileKind::French, LedgerSettings::default());
        let year = ledger
            .create_year(
                NaiveDate::from_ymd_opt(2024, 1, 1),
                NaiveDate::from_ymd_opt(2024, 12, 31),
            )
            .await
            .unwrap();
        (ledger, year)
    }

    #[tokio::test]
    async fn test_sales_entry_closes_with_first_number() {
        let (mut ledger, year) = ledger_with_year().await;
        ledger
            .get_or_create_account(year.id, "411000", None)
            .await
            .unwrap();
        ledger
            .get_or_create_account(year.id, "706000", None)
            .await
            .unwrap();

        let entry = ledger
            .create_entry(
                year.id,
                Journal::SALES,
                NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(),
                "invoice A",
                None,
            )
            .await
            .unwrap();
        let mut draft = ledger.draft(entry.id).await.unwrap();
        ledger
            .add_line(
                &mut draft,
                "411000",
                BigDecimal::from_str("100.00").unwrap(),
                BigDecimal::from(0),
                None,
                None,
            )
            .await
            .unwrap();
        ledger
            .add_line(
                &mut draft,
                "706000",
                BigDecimal::from(0),
                BigDecimal::from_str("100.00").unwrap(),
                None,
                None,
            )
            .await
            .unwrap();
        ledger.commit(&draft).await.unwrap();

        let closed = ledger.close_entry(entry.id).await.unwrap();
        assert!(closed.close);
        assert_eq!(closed.num, Some(1));
        assert!(closed.date_entry.is_some());
    }

    #[tokio::test]
    async fn test_unbalanced_entry_refuses_close() {
        let (mut ledger, year) = ledger_with_year().await;
        ledger
            .get_or_create_account(year.id, "401000", None)
            .await
            .unwrap();
        ledger
            .get_or_create_account(year.id, "601000", None)
            .await
            .unwrap();

        let entry = ledger
            .create_entry(
                year.id,
                Journal::PURCHASES,
                NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
                "supplier bill",
                None,
            )
            .await
            .unwrap();
        let mut draft = ledger.draft(entry.id).await.unwrap();
        ledger
            .add_line(
                &mut draft,
                "401000",
                BigDecimal::from(0),
                BigDecimal::from_str("50.00").unwrap(),
                None,
                None,
            )
            .await
            .unwrap();
        ledger
            .add_line(
                &mut draft,
                "601000",
                BigDecimal::from_str("49.00").unwrap(),
                BigDecimal::from(0),
                None,
                None,
            )
            .await
            .unwrap();
        ledger.commit(&draft).await.unwrap();

        match ledger.close_entry(entry.id).await {
            Err(LedgerError::Unbalanced { credit, debit }) => {
                assert_eq!(&credit - &debit, BigDecimal::from(1));
            }
            other => panic!("expected Unbalanced, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_closed_entry_is_immutable_and_close_idempotent() {
        let (mut ledger, year) = ledger_with_year().await;
        ledger
            .get_or_create_account(year.id, "411000", None)
            .await
            .unwrap();
        ledger
            .get_or_create_account(year.id, "706000", None)
            .await
            .unwrap();
        let entry = ledger
            .create_entry(
                year.id,
                Journal::SALES,
                NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(),
                "invoice",
                None,
            )
            .await
            .unwrap();
        let mut draft = ledger.draft(entry.id).await.unwrap();
        ledger
            .add_line(
                &mut draft,
                "411000",
                BigDecimal::from(80),
                BigDecimal::from(0),
                None,
                None,
            )
            .await
            .unwrap();
        ledger
            .add_line(
                &mut draft,
                "706000",
                BigDecimal::from(0),
                BigDecimal::from(80),
                None,
                None,
            )
            .await
            .unwrap();
        ledger.commit(&draft).await.unwrap();
        let closed = ledger.close_entry(entry.id).await.unwrap();
        let again = ledger.close_entry(entry.id).await.unwrap();
        assert_eq!(closed.num, again.num);
        assert_eq!(closed.date_entry, again.date_entry);

        let draft = ledger.draft(entry.id).await.unwrap();
        match ledger.commit(&draft).await {
            Err(LedgerError::EntryClosed(id)) => assert_eq!(id, entry.id),
            other => panic!("expected EntryClosed, got {other:?}"),
        }
        match ledger.delete_entry(entry.id).await {
            Err(LedgerError::EntryClosed(_)) => {}
            other => panic!("expected EntryClosed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_carry_forward_refuses_revenue_account() {
        let (mut ledger, year) = ledger_with_year().await;
        ledger
            .get_or_create_account(year.id, "706000", None)
            .await
            .unwrap();
        let entry = ledger
            .create_entry(
                year.id,
                Journal::CARRY_FORWARD,
                NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
                "opening",
                None,
            )
            .await
            .unwrap();
        let mut draft = ledger.draft(entry.id).await.unwrap();
        match ledger
            .add_line(
                &mut draft,
                "706000",
                BigDecimal::from(0),
                BigDecimal::from(10),
                None,
                None,
            )
            .await
        {
            Err(LedgerError::ForbiddenJournalUse) => {}
            other => panic!("expected ForbiddenJournalUse, got {other:?}"),
        }
    }
}
