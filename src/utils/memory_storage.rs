//! In-memory storage implementation for testing and development

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::payoff::{BankAccount, DepositDetail, DepositSlip, Payoff};
use crate::traits::LedgerStorage;
use crate::types::*;

#[derive(Debug, Default)]
struct Inner {
    next_id: i64,
    years: HashMap<YearId, FiscalYear>,
    journals: HashMap<JournalId, Journal>,
    accounts: HashMap<AccountId, ChartsAccount>,
    thirds: HashMap<ThirdId, Third>,
    costs: HashMap<CostId, CostAccounting>,
    entries: HashMap<EntryId, EntryAccount>,
    lines: HashMap<i64, EntryLineAccount>,
    links: HashMap<LinkId, AccountLink>,
    payoffs: HashMap<PayoffId, Payoff>,
    bank_accounts: HashMap<BankAccountId, BankAccount>,
    deposits: HashMap<DepositId, DepositSlip>,
    deposit_details: HashMap<i64, DepositDetail>,
    models: HashMap<ModelId, ModelEntry>,
}

impl Inner {
    fn allocate(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// In-memory storage backed by shared maps. Clones share the same state,
/// which lets the managers hold independent handles onto one store.
#[derive(Debug, Clone)]
pub struct MemoryStorage {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryStorage {
    /// Creates an empty store seeded with the built-in journals.
    pub fn new() -> Self {
        let mut inner = Inner::default();
        for journal in Journal::builtins() {
            inner.next_id = inner.next_id.max(journal.id);
            inner.journals.insert(journal.id, journal);
        }
        Self {
            inner: Arc::new(RwLock::new(inner)),
        }
    }

    /// Clears all data (useful for testing); built-in journals are
    /// re-seeded.
    pub fn clear(&self) {
        let mut inner = self.inner.write().unwrap();
        *inner = Inner::default();
        for journal in Journal::builtins() {
            inner.next_id = inner.next_id.max(journal.id);
            inner.journals.insert(journal.id, journal);
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap()
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap()
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LedgerStorage for MemoryStorage {
    async fn insert_year(&mut self, mut year: FiscalYear) -> LedgerResult<FiscalYear> {
        let mut inner = self.write();
        year.id = inner.allocate();
        inner.years.insert(year.id, year.clone());
        Ok(year)
    }

    async fn update_year(&mut self, year: &FiscalYear) -> LedgerResult<()> {
        let mut inner = self.write();
        if !inner.years.contains_key(&year.id) {
            return Err(LedgerError::Storage(format!("unknown year {}", year.id)));
        }
        inner.years.insert(year.id, year.clone());
        Ok(())
    }

    async fn get_year(&self, id: YearId) -> LedgerResult<Option<FiscalYear>> {
        Ok(self.read().years.get(&id).cloned())
    }

    async fn list_years(&self) -> LedgerResult<Vec<FiscalYear>> {
        let mut years: Vec<FiscalYear> = self.read().years.values().cloned().collect();
        years.sort_by_key(|year| (year.end, year.id));
        Ok(years)
    }

    async fn delete_year(&mut self, id: YearId) -> LedgerResult<()> {
        if self.write().years.remove(&id).is_none() {
            return Err(LedgerError::Storage(format!("unknown year {id}")));
        }
        Ok(())
    }

    async fn insert_journal(&mut self, name: String) -> LedgerResult<Journal> {
        let mut inner = self.write();
        let journal = Journal {
            id: inner.allocate(),
            name,
        };
        inner.journals.insert(journal.id, journal.clone());
        Ok(journal)
    }

    async fn get_journal(&self, id: JournalId) -> LedgerResult<Option<Journal>> {
        Ok(self.read().journals.get(&id).cloned())
    }

    async fn list_journals(&self) -> LedgerResult<Vec<Journal>> {
        let mut journals: Vec<Journal> = self.read().journals.values().cloned().collect();
        journals.sort_by_key(|journal| journal.id);
        Ok(journals)
    }

    async fn delete_journal(&mut self, id: JournalId) -> LedgerResult<()> {
        if Journal::is_builtin(id) {
            return Err(LedgerError::CannotDelete("journal reserved".to_string()));
        }
        if self.write().journals.remove(&id).is_none() {
            return Err(LedgerError::Storage(format!("unknown journal {id}")));
        }
        Ok(())
    }

    async fn insert_account(&mut self, mut account: ChartsAccount) -> LedgerResult<ChartsAccount> {
        let mut inner = self.write();
        let duplicate = inner
            .accounts
            .values()
            .any(|existing| existing.year == account.year && existing.code == account.code);
        if duplicate {
            return Err(LedgerError::Validation(format!(
                "account code {} already exists for this year",
                account.code
            )));
        }
        account.id = inner.allocate();
        inner.accounts.insert(account.id, account.clone());
        Ok(account)
    }

    async fn update_account(&mut self, account: &ChartsAccount) -> LedgerResult<()> {
        let mut inner = self.write();
        if !inner.accounts.contains_key(&account.id) {
            return Err(LedgerError::AccountNotFound(account.id.to_string()));
        }
        inner.accounts.insert(account.id, account.clone());
        Ok(())
    }

    async fn get_account(&self, id: AccountId) -> LedgerResult<Option<ChartsAccount>> {
        Ok(self.read().accounts.get(&id).cloned())
    }

    async fn account_by_code(
        &self,
        year: YearId,
        code: &str,
    ) -> LedgerResult<Option<ChartsAccount>> {
        Ok(self
            .read()
            .accounts
            .values()
            .find(|account| account.year == year && account.code == code)
            .cloned())
    }

    async fn list_accounts(&self, year: YearId) -> LedgerResult<Vec<ChartsAccount>> {
        let mut accounts: Vec<ChartsAccount> = self
            .read()
            .accounts
            .values()
            .filter(|account| account.year == year)
            .cloned()
            .collect();
        accounts.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(accounts)
    }

    async fn insert_third(&mut self, mut third: Third) -> LedgerResult<Third> {
        let mut inner = self.write();
        third.id = inner.allocate();
        inner.thirds.insert(third.id, third.clone());
        Ok(third)
    }

    async fn update_third(&mut self, third: &Third) -> LedgerResult<()> {
        let mut inner = self.write();
        if !inner.thirds.contains_key(&third.id) {
            return Err(LedgerError::Storage(format!("unknown third {}", third.id)));
        }
        inner.thirds.insert(third.id, third.clone());
        Ok(())
    }

    async fn get_third(&self, id: ThirdId) -> LedgerResult<Option<Third>> {
        Ok(self.read().thirds.get(&id).cloned())
    }

    async fn list_thirds(&self) -> LedgerResult<Vec<Third>> {
        let mut thirds: Vec<Third> = self.read().thirds.values().cloned().collect();
        thirds.sort_by_key(|third| third.id);
        Ok(thirds)
    }

    async fn insert_cost(&mut self, mut cost: CostAccounting) -> LedgerResult<CostAccounting> {
        let mut inner = self.write();
        cost.id = inner.allocate();
        inner.costs.insert(cost.id, cost.clone());
        Ok(cost)
    }

    async fn update_cost(&mut self, cost: &CostAccounting) -> LedgerResult<()> {
        let mut inner = self.write();
        if !inner.costs.contains_key(&cost.id) {
            return Err(LedgerError::Storage(format!("unknown cost {}", cost.id)));
        }
        inner.costs.insert(cost.id, cost.clone());
        Ok(())
    }

    async fn get_cost(&self, id: CostId) -> LedgerResult<Option<CostAccounting>> {
        Ok(self.read().costs.get(&id).cloned())
    }

    async fn list_costs(&self) -> LedgerResult<Vec<CostAccounting>> {
        let mut costs: Vec<CostAccounting> = self.read().costs.values().cloned().collect();
        costs.sort_by_key(|cost| cost.id);
        Ok(costs)
    }

    async fn insert_entry(&mut self, mut entry: EntryAccount) -> LedgerResult<EntryAccount> {
        let mut inner = self.write();
        entry.id = inner.allocate();
        inner.entries.insert(entry.id, entry.clone());
        Ok(entry)
    }

    async fn update_entry(&mut self, entry: &EntryAccount) -> LedgerResult<()> {
        let mut inner = self.write();
        if !inner.entries.contains_key(&entry.id) {
            return Err(LedgerError::EntryNotFound(entry.id));
        }
        inner.entries.insert(entry.id, entry.clone());
        Ok(())
    }

    async fn get_entry(&self, id: EntryId) -> LedgerResult<Option<EntryAccount>> {
        Ok(self.read().entries.get(&id).cloned())
    }

    async fn list_entries(&self, filter: &EntryFilter) -> LedgerResult<Vec<EntryAccount>> {
        let mut entries: Vec<EntryAccount> = self
            .read()
            .entries
            .values()
            .filter(|entry| filter.matches(entry))
            .cloned()
            .collect();
        entries.sort_by_key(|entry| entry.id);
        Ok(entries)
    }

    async fn delete_entry(&mut self, id: EntryId) -> LedgerResult<()> {
        let mut inner = self.write();
        if inner.entries.remove(&id).is_none() {
            return Err(LedgerError::EntryNotFound(id));
        }
        inner.lines.retain(|_, line| line.entry != id);
        Ok(())
    }

    async fn max_entry_num(&self, year: YearId) -> LedgerResult<Option<i32>> {
        Ok(self
            .read()
            .entries
            .values()
            .filter(|entry| entry.year == year)
            .filter_map(|entry| entry.num)
            .max())
    }

    async fn replace_entry_lines(
        &mut self,
        entry: EntryId,
        lines: Vec<EntryLineAccount>,
    ) -> LedgerResult<Vec<EntryLineAccount>> {
        let mut inner = self.write();
        inner.lines.retain(|_, line| line.entry != entry);
        let mut stored = Vec::with_capacity(lines.len());
        for mut line in lines {
            let id = match line.id {
                LineRef::Persisted(id) => id,
                LineRef::Pending(_) => inner.allocate(),
            };
            line.id = LineRef::Persisted(id);
            line.entry = entry;
            inner.lines.insert(id, line.clone());
            stored.push(line);
        }
        Ok(stored)
    }

    async fn insert_line(&mut self, mut line: EntryLineAccount) -> LedgerResult<EntryLineAccount> {
        let mut inner = self.write();
        let id = inner.allocate();
        line.id = LineRef::Persisted(id);
        inner.lines.insert(id, line.clone());
        Ok(line)
    }

    async fn update_line(&mut self, line: &EntryLineAccount) -> LedgerResult<()> {
        let LineRef::Persisted(id) = line.id else {
            return Err(LedgerError::Storage(
                "cannot update a pending line".to_string(),
            ));
        };
        let mut inner = self.write();
        if !inner.lines.contains_key(&id) {
            return Err(LedgerError::Storage(format!("unknown line {id}")));
        }
        inner.lines.insert(id, line.clone());
        Ok(())
    }

    async fn lines_of_entry(&self, entry: EntryId) -> LedgerResult<Vec<EntryLineAccount>> {
        let mut lines: Vec<EntryLineAccount> = self
            .read()
            .lines
            .values()
            .filter(|line| line.entry == entry)
            .cloned()
            .collect();
        lines.sort_by_key(|line| line.id.to_serial());
        Ok(lines)
    }

    async fn lines_for_year(&self, year: YearId) -> LedgerResult<Vec<EntryLineAccount>> {
        let inner = self.read();
        let mut lines: Vec<EntryLineAccount> = inner
            .lines
            .values()
            .filter(|line| {
                inner
                    .accounts
                    .get(&line.account)
                    .map_or(false, |account| account.year == year)
            })
            .cloned()
            .collect();
        lines.sort_by_key(|line| line.id.to_serial());
        Ok(lines)
    }

    async fn insert_link(&mut self) -> LedgerResult<AccountLink> {
        let mut inner = self.write();
        let link = AccountLink {
            id: inner.allocate(),
        };
        inner.links.insert(link.id, link);
        Ok(link)
    }

    async fn delete_link(&mut self, id: LinkId) -> LedgerResult<()> {
        if self.write().links.remove(&id).is_none() {
            return Err(LedgerError::Storage(format!("unknown link {id}")));
        }
        Ok(())
    }

    async fn entries_of_link(&self, link: LinkId) -> LedgerResult<Vec<EntryAccount>> {
        let mut entries: Vec<EntryAccount> = self
            .read()
            .entries
            .values()
            .filter(|entry| entry.link == Some(link))
            .cloned()
            .collect();
        entries.sort_by_key(|entry| entry.id);
        Ok(entries)
    }

    async fn insert_payoff(&mut self, mut payoff: Payoff) -> LedgerResult<Payoff> {
        let mut inner = self.write();
        payoff.id = inner.allocate();
        inner.payoffs.insert(payoff.id, payoff.clone());
        Ok(payoff)
    }

    async fn update_payoff(&mut self, payoff: &Payoff) -> LedgerResult<()> {
        let mut inner = self.write();
        if !inner.payoffs.contains_key(&payoff.id) {
            return Err(LedgerError::Storage(format!(
                "unknown payoff {}",
                payoff.id
            )));
        }
        inner.payoffs.insert(payoff.id, payoff.clone());
        Ok(())
    }

    async fn get_payoff(&self, id: PayoffId) -> LedgerResult<Option<Payoff>> {
        Ok(self.read().payoffs.get(&id).cloned())
    }

    async fn delete_payoff(&mut self, id: PayoffId) -> LedgerResult<()> {
        if self.write().payoffs.remove(&id).is_none() {
            return Err(LedgerError::Storage(format!("unknown payoff {id}")));
        }
        Ok(())
    }

    async fn payoffs_of_supporting(
        &self,
        supporting: SupportingId,
    ) -> LedgerResult<Vec<Payoff>> {
        let mut payoffs: Vec<Payoff> = self
            .read()
            .payoffs
            .values()
            .filter(|payoff| payoff.supporting == supporting)
            .cloned()
            .collect();
        payoffs.sort_by_key(|payoff| payoff.id);
        Ok(payoffs)
    }

    async fn payoffs_of_entry(&self, entry: EntryId) -> LedgerResult<Vec<Payoff>> {
        let mut payoffs: Vec<Payoff> = self
            .read()
            .payoffs
            .values()
            .filter(|payoff| payoff.entry == Some(entry))
            .cloned()
            .collect();
        payoffs.sort_by_key(|payoff| payoff.id);
        Ok(payoffs)
    }

    async fn list_payoffs(&self) -> LedgerResult<Vec<Payoff>> {
        let mut payoffs: Vec<Payoff> = self.read().payoffs.values().cloned().collect();
        payoffs.sort_by_key(|payoff| payoff.id);
        Ok(payoffs)
    }

    async fn insert_bank_account(&mut self, mut bank: BankAccount) -> LedgerResult<BankAccount> {
        let mut inner = self.write();
        bank.id = inner.allocate();
        inner.bank_accounts.insert(bank.id, bank.clone());
        Ok(bank)
    }

    async fn update_bank_account(&mut self, bank: &BankAccount) -> LedgerResult<()> {
        let mut inner = self.write();
        if !inner.bank_accounts.contains_key(&bank.id) {
            return Err(LedgerError::Storage(format!(
                "unknown bank account {}",
                bank.id
            )));
        }
        inner.bank_accounts.insert(bank.id, bank.clone());
        Ok(())
    }

    async fn get_bank_account(&self, id: BankAccountId) -> LedgerResult<Option<BankAccount>> {
        Ok(self.read().bank_accounts.get(&id).cloned())
    }

    async fn list_bank_accounts(&self) -> LedgerResult<Vec<BankAccount>> {
        let mut banks: Vec<BankAccount> = self.read().bank_accounts.values().cloned().collect();
        banks.sort_by_key(|bank| (bank.order_key, bank.id));
        Ok(banks)
    }

    async fn insert_deposit(&mut self, mut deposit: DepositSlip) -> LedgerResult<DepositSlip> {
        let mut inner = self.write();
        deposit.id = inner.allocate();
        inner.deposits.insert(deposit.id, deposit.clone());
        Ok(deposit)
    }

    async fn update_deposit(&mut self, deposit: &DepositSlip) -> LedgerResult<()> {
        let mut inner = self.write();
        if !inner.deposits.contains_key(&deposit.id) {
            return Err(LedgerError::Storage(format!(
                "unknown deposit {}",
                deposit.id
            )));
        }
        inner.deposits.insert(deposit.id, deposit.clone());
        Ok(())
    }

    async fn get_deposit(&self, id: DepositId) -> LedgerResult<Option<DepositSlip>> {
        Ok(self.read().deposits.get(&id).cloned())
    }

    async fn list_deposits(&self) -> LedgerResult<Vec<DepositSlip>> {
        let mut deposits: Vec<DepositSlip> = self.read().deposits.values().cloned().collect();
        deposits.sort_by_key(|deposit| deposit.id);
        Ok(deposits)
    }

    async fn delete_deposit(&mut self, id: DepositId) -> LedgerResult<()> {
        let mut inner = self.write();
        if inner.deposits.remove(&id).is_none() {
            return Err(LedgerError::Storage(format!("unknown deposit {id}")));
        }
        inner.deposit_details.retain(|_, detail| detail.deposit != id);
        Ok(())
    }

    async fn insert_deposit_detail(
        &mut self,
        mut detail: DepositDetail,
    ) -> LedgerResult<DepositDetail> {
        let mut inner = self.write();
        detail.id = inner.allocate();
        inner.deposit_details.insert(detail.id, detail.clone());
        Ok(detail)
    }

    async fn details_of_deposit(&self, deposit: DepositId) -> LedgerResult<Vec<DepositDetail>> {
        let mut details: Vec<DepositDetail> = self
            .read()
            .deposit_details
            .values()
            .filter(|detail| detail.deposit == deposit)
            .cloned()
            .collect();
        details.sort_by_key(|detail| detail.id);
        Ok(details)
    }

    async fn all_deposit_details(&self) -> LedgerResult<Vec<DepositDetail>> {
        let mut details: Vec<DepositDetail> =
            self.read().deposit_details.values().cloned().collect();
        details.sort_by_key(|detail| detail.id);
        Ok(details)
    }

    async fn insert_model(&mut self, mut model: ModelEntry) -> LedgerResult<ModelEntry> {
        let mut inner = self.write();
        model.id = inner.allocate();
        inner.models.insert(model.id, model.clone());
        Ok(model)
    }

    async fn get_model(&self, id: ModelId) -> LedgerResult<Option<ModelEntry>> {
        Ok(self.read().models.get(&id).cloned())
    }

    async fn list_models(&self) -> LedgerResult<Vec<ModelEntry>> {
        let mut models: Vec<ModelEntry> = self.read().models.values().cloned().collect();
        models.sort_by_key(|model| model.id);
        Ok(models)
    }
}
