//! Payment recording and multi-document payoff allocation
//!
//! A payoff records one payment against a supporting document and owns the
//! ledger entry generated for it in the payments journal. The allocation
//! engine splits a single payment across several outstanding documents,
//! posts one merged entry, and closes the reconciliation loop by
//! re-lettering fully settled documents.

pub mod deposit;

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::ledger::chart::ChartManager;
use crate::ledger::entry::EntryManager;
use crate::ledger::link;
use crate::traits::{LedgerContext, LedgerStorage, Supporting};
use crate::types::*;

pub use deposit::{
    CandidateFilter, DepositCandidate, DepositDetail, DepositManager, DepositSlip, DepositStatus,
};

/// Payment modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PayoffMode {
    Cash,
    Cheque,
    Transfer,
    CreditCard,
    Other,
    Levy,
}

impl PayoffMode {
    pub fn label(&self) -> &'static str {
        match self {
            PayoffMode::Cash => "cash",
            PayoffMode::Cheque => "cheque",
            PayoffMode::Transfer => "transfer",
            PayoffMode::CreditCard => "credit card",
            PayoffMode::Other => "other",
            PayoffMode::Levy => "levy",
        }
    }
}

/// One recorded payment against a supporting document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payoff {
    pub id: PayoffId,
    pub supporting: SupportingId,
    pub date: NaiveDate,
    pub amount: BigDecimal,
    pub mode: PayoffMode,
    pub payer: String,
    pub reference: String,
    /// The generated payments-journal entry; every payoff owns exactly one.
    pub entry: Option<EntryId>,
    pub bank_account: Option<BankAccountId>,
    pub bank_fee: BigDecimal,
    /// Side of the settled document, denormalized for deposit queries.
    pub is_revenue: bool,
}

/// A bank account payments can be routed through.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BankAccount {
    pub id: BankAccountId,
    pub designation: String,
    pub reference: String,
    /// Ledger account code movements are posted on.
    pub account_code: String,
    pub order_key: Option<i32>,
    pub is_disabled: bool,
}

/// How a payment is split across several documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Repartition {
    /// Each document receives its rest-to-pay share of the payment.
    Proportional,
    /// Documents are settled oldest first until the payment runs out.
    ByDate,
}

/// Payment fields shared by single and multi-document recording.
#[derive(Debug, Clone)]
pub struct PaymentTerms {
    pub date: NaiveDate,
    pub mode: PayoffMode,
    pub payer: String,
    pub reference: String,
    pub bank_account: Option<BankAccountId>,
    pub bank_fee: BigDecimal,
}

/// Result of a multi-document allocation.
#[derive(Debug, Clone)]
pub struct AllocationOutcome {
    pub entry: EntryAccount,
    pub payoffs: Vec<Payoff>,
}

/// Data shared by the built-in supporting-document variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentData {
    pub id: SupportingId,
    pub third: ThirdId,
    pub total: BigDecimal,
    pub date: NaiveDate,
    /// Ledger entries already posted for the document.
    pub entries: Vec<EntryId>,
    pub label: String,
    /// How far above the rest-to-pay a payment may go.
    pub over_payment_tolerance: BigDecimal,
}

/// The closed set of billable documents payable through this engine.
/// Callers with their own document model implement [`Supporting`] directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SupportingDoc {
    Invoice(DocumentData),
    Quote(DocumentData),
    Receipt(DocumentData),
    CreditNote(DocumentData),
}

impl SupportingDoc {
    fn data(&self) -> &DocumentData {
        match self {
            SupportingDoc::Invoice(data)
            | SupportingDoc::Quote(data)
            | SupportingDoc::Receipt(data)
            | SupportingDoc::CreditNote(data) => data,
        }
    }
}

impl Supporting for SupportingDoc {
    fn id(&self) -> SupportingId {
        self.data().id
    }

    fn third(&self) -> ThirdId {
        self.data().third
    }

    fn total(&self) -> BigDecimal {
        self.data().total.clone()
    }

    fn is_revenue(&self) -> bool {
        // a credit note refunds the customer; everything else collects
        !matches!(self, SupportingDoc::CreditNote(_))
    }

    fn document_date(&self) -> NaiveDate {
        self.data().date
    }

    fn entry_links(&self) -> Option<Vec<EntryId>> {
        let entries = &self.data().entries;
        (!entries.is_empty()).then(|| entries.clone())
    }

    fn label(&self) -> String {
        self.data().label.clone()
    }

    fn max_payoff(&self, rest_to_pay: &BigDecimal) -> BigDecimal {
        rest_to_pay + &self.data().over_payment_tolerance
    }
}

/// Manager for payments and the allocation engine
pub struct PayoffManager<S: LedgerStorage + Clone> {
    storage: S,
    context: LedgerContext,
    charts: ChartManager<S>,
    entries: EntryManager<S>,
}

impl<S: LedgerStorage + Clone> PayoffManager<S> {
    pub fn new(storage: S, context: LedgerContext) -> Self {
        Self {
            charts: ChartManager::new(storage.clone(), context.clone()),
            entries: EntryManager::new(storage.clone(), context.clone()),
            storage,
            context,
        }
    }

    /// Sum of payments already recorded against the document, optionally
    /// ignoring one payoff (used while editing it).
    pub async fn total_payed(
        &self,
        supporting: SupportingId,
        ignore: Option<PayoffId>,
    ) -> LedgerResult<BigDecimal> {
        let mut total = BigDecimal::from(0);
        for payoff in self.storage.payoffs_of_supporting(supporting).await? {
            if Some(payoff.id) != ignore {
                total += self.context.currency.round(&payoff.amount);
            }
        }
        Ok(total)
    }

    /// Amount still owed on the document.
    pub async fn rest_to_pay(
        &self,
        doc: &dyn Supporting,
        ignore: Option<PayoffId>,
    ) -> LedgerResult<BigDecimal> {
        Ok(doc.total() - self.total_payed(doc.id(), ignore).await?)
    }

    /// Records a single payment against one document, generating its
    /// ledger entry and re-lettering the document once fully settled.
    pub async fn record_payoff(
        &mut self,
        doc: &dyn Supporting,
        amount: BigDecimal,
        terms: PaymentTerms,
    ) -> LedgerResult<Payoff> {
        if amount < BigDecimal::from(0) {
            return Err(LedgerError::Validation(
                "payment amount cannot be negative".to_string(),
            ));
        }
        self.check_bank_account(&terms)?;
        let designation = format!("payoff for {}", doc.label());
        let entry = self
            .generate_accounting(
                doc,
                &[(doc.third(), amount.clone())],
                &designation,
                &terms,
            )
            .await?;
        let payoff = self
            .storage
            .insert_payoff(Payoff {
                id: 0,
                supporting: doc.id(),
                date: terms.date,
                amount,
                mode: terms.mode,
                payer: terms.payer.clone(),
                reference: terms.reference.clone(),
                entry: Some(entry.id),
                bank_account: self.effective_bank_account(&terms),
                bank_fee: terms.bank_fee.clone(),
                is_revenue: doc.is_revenue(),
            })
            .await?;
        self.generate_accountlink(doc).await?;
        info!(payoff = payoff.id, entry = entry.id, "payoff recorded");
        Ok(payoff)
    }

    /// Deletes a payoff together with its generated entry. Refused when
    /// the entry has been closed.
    pub async fn delete_payoff(&mut self, payoff: PayoffId) -> LedgerResult<()> {
        let payoff = self
            .storage
            .get_payoff(payoff)
            .await?
            .ok_or_else(|| LedgerError::Validation("unknown payoff".to_string()))?;
        if let Some(entry) = payoff.entry {
            let entry = self.entries.get_entry_required(entry).await?;
            if entry.close {
                return Err(LedgerError::EntryClosed(entry.id));
            }
            self.entries.delete(entry.id).await?;
        }
        self.storage.delete_payoff(payoff.id).await
    }

    /// Splits one payment across several outstanding documents.
    ///
    /// Documents are settled proportionally to their rest-to-pay or
    /// sequentially oldest-first; rounding remainders fold into the last
    /// share, negligible shares are skipped, and a single merged entry is
    /// posted with one third-party line per third and account. Documents
    /// fully settled by the pass are re-lettered together with the new
    /// entry.
    pub async fn allocate(
        &mut self,
        docs: &[&dyn Supporting],
        amount: BigDecimal,
        repartition: Repartition,
        terms: PaymentTerms,
    ) -> LedgerResult<AllocationOutcome> {
        self.check_bank_account(&terms)?;
        let currency = self.context.currency.clone();

        // resolve the working set: unique documents with their rests
        let mut pending: Vec<(&dyn Supporting, BigDecimal)> = Vec::new();
        let mut amount_sum = BigDecimal::from(0);
        let mut amount_max = BigDecimal::from(0);
        for &doc in docs {
            if pending.iter().any(|(seen, _)| seen.id() == doc.id()) {
                continue;
            }
            let rest = self.rest_to_pay(doc, None).await?;
            amount_sum += &rest;
            amount_max += doc.max_payoff(&rest);
            pending.push((doc, rest));
        }
        if currency.is_negligible(&amount_max) {
            return Err(LedgerError::NoValidSelection);
        }
        // intentional over-payment is allowed up to the documents' caps
        if amount > amount_sum && amount_sum < amount_max {
            amount_sum = amount.clone();
        }
        pending.sort_by_key(|(doc, _)| doc.document_date());

        let mut amount_rest = amount.clone();
        let mut bank_fee = terms.bank_fee.clone();
        let mut payoffs: Vec<(Payoff, &dyn Supporting)> = Vec::new();
        for (doc, rest) in &pending {
            let share = match repartition {
                Repartition::Proportional => {
                    currency.round(&(rest * &amount / &amount_sum))
                }
                Repartition::ByDate => rest.clone().min(amount_rest.clone()),
            };
            if currency.is_negligible(&share) || share < BigDecimal::from(0) {
                continue;
            }
            amount_rest -= &share;
            let payoff = self
                .storage
                .insert_payoff(Payoff {
                    id: 0,
                    supporting: doc.id(),
                    date: terms.date,
                    amount: share,
                    mode: terms.mode,
                    payer: terms.payer.clone(),
                    reference: terms.reference.clone(),
                    entry: None,
                    bank_account: self.effective_bank_account(&terms),
                    bank_fee: std::mem::replace(&mut bank_fee, BigDecimal::from(0)),
                    is_revenue: doc.is_revenue(),
                })
                .await?;
            payoffs.push((payoff, *doc));
        }
        if payoffs.is_empty() {
            return Err(LedgerError::NoValidSelection);
        }
        // fold any rounding remainder into the last share
        if !currency.is_negligible(&amount_rest) {
            if let Some((last, _)) = payoffs.last_mut() {
                last.amount += &amount_rest;
                self.storage.update_payoff(last).await?;
            }
        }

        // one merged posting: per-third sums in first-seen order
        let mut third_amounts: Vec<(ThirdId, BigDecimal)> = Vec::new();
        let mut labels = Vec::new();
        for (payoff, doc) in &payoffs {
            match third_amounts
                .iter()
                .position(|(third, _)| *third == doc.third())
            {
                Some(position) => third_amounts[position].1 += &payoff.amount,
                None => third_amounts.push((doc.third(), payoff.amount.clone())),
            }
            labels.push(doc.label());
        }
        let mut designation = format!("payoff for {}", labels.join(","));
        if designation.len() > 190 {
            designation = format!("payoff for {} multi-pay", labels.len());
        }
        let first_doc = payoffs[0].1;
        let entry = self
            .generate_accounting(first_doc, &third_amounts, &designation, &terms)
            .await?;
        self.merge_multipay_lines(&entry, &payoffs).await?;

        // close the reconciliation loop for fully settled documents
        let mut settled_entries: Vec<EntryId> = Vec::new();
        for (doc, _) in &pending {
            let rest = self.rest_to_pay(*doc, None).await?;
            let links = doc.entry_links().unwrap_or_default();
            let payoff_count = self.storage.payoffs_of_supporting(doc.id()).await?.len();
            if currency.is_negligible(&rest) && !links.is_empty() && payoff_count == 1 {
                for linked in &links {
                    if let Err(error) = link::unlink_entry(&mut self.storage, *linked).await {
                        debug!(%error, "could not release prior link");
                    }
                }
                settled_entries.extend(links);
            }
        }
        if settled_entries.len() == pending.len() {
            settled_entries.push(entry.id);
            if let Err(error) = link::create_link(&mut self.storage, &settled_entries).await {
                debug!(%error, "automatic lettering skipped");
            }
        }

        let payoffs = {
            let mut refreshed = Vec::new();
            for (payoff, _) in payoffs {
                match self.storage.get_payoff(payoff.id).await? {
                    Some(stored) => refreshed.push(stored),
                    None => refreshed.push(payoff),
                }
            }
            refreshed
        };
        info!(
            entry = entry.id,
            payoffs = payoffs.len(),
            "payment allocated"
        );
        Ok(AllocationOutcome { entry, payoffs })
    }

    fn check_bank_account(&self, terms: &PaymentTerms) -> LedgerResult<()> {
        if terms.mode != PayoffMode::Cash && terms.bank_account.is_none() {
            return Err(LedgerError::BankAccountMissing);
        }
        Ok(())
    }

    fn effective_bank_account(&self, terms: &PaymentTerms) -> Option<BankAccountId> {
        if terms.mode == PayoffMode::Cash {
            None
        } else {
            terms.bank_account
        }
    }

    /// Fiscal year a payment date belongs to, falling back to the active
    /// year when no year covers the date.
    async fn year_for_date(&self, date: NaiveDate) -> LedgerResult<FiscalYear> {
        let years = self.storage.list_years().await?;
        let covering: Vec<&FiscalYear> = years
            .iter()
            .filter(|year| year.contains_date(date))
            .collect();
        if covering.len() == 1 {
            return Ok(covering[0].clone());
        }
        years
            .into_iter()
            .find(|year| year.is_active)
            .ok_or(LedgerError::NoCurrentFiscalYear)
    }

    /// Posts the payment entry: one third-party line per third, an
    /// optional bank-fee expense line, and one bank/cash line for the net
    /// amount actually moved.
    async fn generate_accounting(
        &mut self,
        doc: &dyn Supporting,
        third_amounts: &[(ThirdId, BigDecimal)],
        designation: &str,
        terms: &PaymentTerms,
    ) -> LedgerResult<EntryAccount> {
        let revenue_sign = BigDecimal::from(if doc.is_revenue() { -1 } else { 1 });
        let year = self.year_for_date(terms.date).await?;
        let entry = self
            .entries
            .create_entry(year.id, Journal::PAYMENTS, terms.date, designation, None)
            .await?;
        let mask = doc.third_mask(self.context.profile.as_ref()).clone();
        let mut amount_to_bank = BigDecimal::from(0);
        for (third_id, amount) in third_amounts {
            let third = self
                .storage
                .get_third(*third_id)
                .await?
                .ok_or_else(|| LedgerError::AccountNotConfigured(format!("third {third_id}")))?;
            let account = self.charts.third_account(&third, year.id, &mask).await?;
            let liability_sign =
                BigDecimal::from(if account.account_type == AccountType::Asset { 1 } else { -1 });
            self.storage
                .insert_line(EntryLineAccount {
                    id: LineRef::Pending(0),
                    entry: entry.id,
                    account: account.id,
                    amount: &liability_sign * &revenue_sign * amount,
                    third: Some(*third_id),
                    reference: None,
                })
                .await?;
            amount_to_bank += amount;
        }
        if let Some(fee_code) = self.context.settings.payoff.bank_fee_account_code.clone() {
            if !self.context.currency.is_negligible(&terms.bank_fee) {
                if let Some(fee_account) =
                    self.storage.account_by_code(year.id, &fee_code).await?
                {
                    self.storage
                        .insert_line(EntryLineAccount {
                            id: LineRef::Pending(0),
                            entry: entry.id,
                            account: fee_account.id,
                            amount: -(&revenue_sign) * &terms.bank_fee,
                            third: None,
                            reference: None,
                        })
                        .await?;
                    amount_to_bank -= &terms.bank_fee;
                }
            }
        }
        let bank_code = match self.effective_bank_account(terms) {
            Some(id) => {
                self.storage
                    .get_bank_account(id)
                    .await?
                    .ok_or(LedgerError::BankAccountMissing)?
                    .account_code
            }
            None => self.context.settings.payoff.cash_account_code.clone(),
        };
        let bank_account = self
            .storage
            .account_by_code(year.id, &bank_code)
            .await?
            .ok_or_else(|| LedgerError::AccountNotConfigured(bank_code.clone()))?;
        let reference = (!terms.reference.is_empty())
            .then(|| format!("{} : {}", terms.mode.label(), terms.reference));
        self.storage
            .insert_line(EntryLineAccount {
                id: LineRef::Pending(0),
                entry: entry.id,
                account: bank_account.id,
                amount: -(&revenue_sign) * &amount_to_bank,
                third: None,
                reference,
            })
            .await?;
        Ok(entry)
    }

    /// Re-homes each payoff's share onto its own third account: postings
    /// that would duplicate a third line for the same third and account
    /// are merged by transferring balance from the first document's line.
    async fn merge_multipay_lines(
        &mut self,
        entry: &EntryAccount,
        payoffs: &[(Payoff, &dyn Supporting)],
    ) -> LedgerResult<()> {
        let (first_payoff, first_doc) = &payoffs[0];
        let year = self.year_for_date(first_payoff.date).await?;
        let revenue_sign = BigDecimal::from(if first_doc.is_revenue() { -1 } else { 1 });
        let first_mask = first_doc.third_mask(self.context.profile.as_ref()).clone();
        let first_third = self
            .storage
            .get_third(first_doc.third())
            .await?
            .ok_or_else(|| {
                LedgerError::AccountNotConfigured(format!("third {}", first_doc.third()))
            })?;
        let first_account = self
            .charts
            .third_account(&first_third, year.id, &first_mask)
            .await?;
        let liability_sign =
            BigDecimal::from(if first_account.account_type == AccountType::Asset { 1 } else { -1 });
        let mut first_line = self
            .storage
            .lines_of_entry(entry.id)
            .await?
            .into_iter()
            .find(|line| {
                line.account == first_account.id && line.third == Some(first_doc.third())
            });
        for (payoff, doc) in payoffs {
            let third = self
                .storage
                .get_third(doc.third())
                .await?
                .ok_or_else(|| {
                    LedgerError::AccountNotConfigured(format!("third {}", doc.third()))
                })?;
            let mask = doc.third_mask(self.context.profile.as_ref()).clone();
            let account = self.charts.third_account(&third, year.id, &mask).await?;
            if !entry.close && first_line.is_some() && account.id != first_account.id {
                let existing = self
                    .storage
                    .lines_of_entry(entry.id)
                    .await?
                    .into_iter()
                    .find(|line| line.account == account.id && line.third == Some(doc.third()));
                let mut item_line = match existing {
                    Some(line) => line,
                    None => {
                        self.storage
                            .insert_line(EntryLineAccount {
                                id: LineRef::Pending(0),
                                entry: entry.id,
                                account: account.id,
                                amount: BigDecimal::from(0),
                                third: Some(doc.third()),
                                reference: None,
                            })
                            .await?
                    }
                };
                let moved = &liability_sign * &revenue_sign * &payoff.amount;
                item_line.amount += &moved;
                self.storage.update_line(&item_line).await?;
                if let Some(line) = first_line.as_mut() {
                    line.amount -= &moved;
                    self.storage.update_line(line).await?;
                }
            }
            let mut payoff = payoff.clone();
            payoff.entry = Some(entry.id);
            self.storage.update_payoff(&payoff).await?;
        }
        link::unlink_entry(&mut self.storage, entry.id).await
    }

    /// Registers a bank account, normalizing its ledger code and appending
    /// it to the display order.
    pub async fn create_bank_account(
        &mut self,
        designation: &str,
        reference: &str,
        account_code: &str,
    ) -> LedgerResult<BankAccount> {
        let code = if self.context.profile.has_minimum_code_size() {
            crate::utils::validation::correct_accounting_code(
                account_code,
                self.context.settings.account_code_size,
            )
        } else {
            account_code.to_string()
        };
        let next_order = self
            .storage
            .list_bank_accounts()
            .await?
            .iter()
            .filter_map(|bank| bank.order_key)
            .max()
            .unwrap_or(0)
            + 1;
        self.storage
            .insert_bank_account(BankAccount {
                id: 0,
                designation: designation.to_string(),
                reference: reference.to_string(),
                account_code: code,
                order_key: Some(next_order),
                is_disabled: false,
            })
            .await
    }

    /// Moves a bank account one position up in the display order.
    pub async fn bank_account_up_order(&mut self, id: BankAccountId) -> LedgerResult<()> {
        let banks = self.storage.list_bank_accounts().await?;
        let Some(position) = banks.iter().position(|bank| bank.id == id) else {
            return Err(LedgerError::Validation("unknown bank account".to_string()));
        };
        if position == 0 {
            return Ok(());
        }
        let mut current = banks[position].clone();
        let mut previous = banks[position - 1].clone();
        std::mem::swap(&mut current.order_key, &mut previous.order_key);
        self.storage.update_bank_account(&current).await?;
        self.storage.update_bank_account(&previous).await?;
        Ok(())
    }

    /// Letters the document's posted entries together with its payment
    /// entries once nothing is left to pay.
    async fn generate_accountlink(&mut self, doc: &dyn Supporting) -> LedgerResult<()> {
        let rest = self.rest_to_pay(doc, None).await?;
        let Some(links) = doc.entry_links() else {
            return Ok(());
        };
        if links.is_empty() || !self.context.currency.is_negligible(&rest) {
            return Ok(());
        }
        let mut entries = links;
        for payoff in self.storage.payoffs_of_supporting(doc.id()).await? {
            if let Some(entry) = payoff.entry {
                entries.push(entry);
            }
        }
        if let Err(error) = link::create_link(&mut self.storage, &entries).await {
            debug!(%error, "automatic lettering skipped");
        }
        Ok(())
    }
}
