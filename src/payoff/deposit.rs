//! Cheque deposit slips
//!
//! A deposit slip batches cheque payoffs into one bank deposit. The slip
//! moves Building -> Closed -> Valid; validation closes the underlying
//! payment entries, assigning their definitive numbers.

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::info;

use crate::ledger::entry::EntryManager;
use crate::payoff::{Payoff, PayoffMode};
use crate::traits::{LedgerContext, LedgerStorage};
use crate::types::*;

/// Lifecycle states of a deposit slip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DepositStatus {
    /// Details can still be added or removed.
    Building,
    /// Content frozen, awaiting bank confirmation.
    Closed,
    /// Confirmed; the payment entries got their definitive numbers.
    Valid,
}

/// One bank deposit batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepositSlip {
    pub id: DepositId,
    pub status: DepositStatus,
    pub bank_account: BankAccountId,
    pub date: NaiveDate,
    pub reference: String,
}

/// One cheque inside a deposit slip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepositDetail {
    pub id: i64,
    pub deposit: DepositId,
    pub payoff: PayoffId,
}

/// A depositable cheque payment, grouped by `(entry, reference)` so a
/// multi-invoice payoff shows as one row with its summed amount.
#[derive(Debug, Clone, PartialEq)]
pub struct DepositCandidate {
    pub entry: EntryId,
    pub date: NaiveDate,
    pub reference: String,
    pub payer: String,
    pub amount: BigDecimal,
}

/// Filters applied when listing depositable payments.
#[derive(Debug, Clone, Default)]
pub struct CandidateFilter {
    pub payer: Option<String>,
    pub reference: Option<String>,
    pub date_begin: Option<NaiveDate>,
    pub date_end: Option<NaiveDate>,
}

/// Manager for deposit slips
pub struct DepositManager<S: LedgerStorage + Clone> {
    storage: S,
    entries: EntryManager<S>,
}

impl<S: LedgerStorage + Clone> DepositManager<S> {
    pub fn new(storage: S, context: LedgerContext) -> Self {
        Self {
            entries: EntryManager::new(storage.clone(), context),
            storage,
        }
    }

    pub async fn create_deposit(
        &mut self,
        bank_account: BankAccountId,
        date: NaiveDate,
        reference: &str,
    ) -> LedgerResult<DepositSlip> {
        self.storage
            .get_bank_account(bank_account)
            .await?
            .ok_or(LedgerError::BankAccountMissing)?;
        self.storage
            .insert_deposit(DepositSlip {
                id: 0,
                status: DepositStatus::Building,
                bank_account,
                date,
                reference: reference.to_string(),
            })
            .await
    }

    pub async fn get_deposit_required(&self, deposit: DepositId) -> LedgerResult<DepositSlip> {
        self.storage
            .get_deposit(deposit)
            .await?
            .ok_or_else(|| LedgerError::Validation("unknown deposit slip".to_string()))
    }

    /// Attaches the payoffs behind the given payment entries to the slip.
    pub async fn add_payoffs(
        &mut self,
        deposit: DepositId,
        entries: &[EntryId],
    ) -> LedgerResult<()> {
        let slip = self.get_deposit_required(deposit).await?;
        if slip.status != DepositStatus::Building {
            return Err(LedgerError::InvalidState(
                "deposit slip is no longer building".to_string(),
            ));
        }
        for &entry in entries {
            if let Some(payoff) = self.storage.payoffs_of_entry(entry).await?.into_iter().next()
            {
                self.storage
                    .insert_deposit_detail(DepositDetail {
                        id: 0,
                        deposit,
                        payoff: payoff.id,
                    })
                    .await?;
            }
        }
        Ok(())
    }

    /// Summed amount of a detail: every payoff sharing the detail's entry
    /// and reference (a multi-invoice payoff counts once, in full).
    pub async fn detail_amount(&self, detail: &DepositDetail) -> LedgerResult<BigDecimal> {
        let payoff = self
            .storage
            .get_payoff(detail.payoff)
            .await?
            .ok_or_else(|| LedgerError::Validation("unknown payoff".to_string()))?;
        let mut amount = BigDecimal::from(0);
        if let Some(entry) = payoff.entry {
            for peer in self.storage.payoffs_of_entry(entry).await? {
                if peer.reference == payoff.reference {
                    amount += &peer.amount;
                }
            }
        } else {
            amount = payoff.amount;
        }
        Ok(amount)
    }

    /// Total of the slip across its details.
    pub async fn total(&self, deposit: DepositId) -> LedgerResult<BigDecimal> {
        let mut total = BigDecimal::from(0);
        for detail in self.storage.details_of_deposit(deposit).await? {
            total += self.detail_amount(&detail).await?;
        }
        Ok(total)
    }

    /// Building -> Closed. Requires at least one detail.
    pub async fn close_deposit(&mut self, deposit: DepositId) -> LedgerResult<DepositSlip> {
        let mut slip = self.get_deposit_required(deposit).await?;
        if slip.status != DepositStatus::Building {
            return Err(LedgerError::InvalidState(
                "deposit slip is no longer building".to_string(),
            ));
        }
        if self.storage.details_of_deposit(deposit).await?.is_empty() {
            return Err(LedgerError::InvalidState(
                "deposit slip has no detail".to_string(),
            ));
        }
        slip.status = DepositStatus::Closed;
        self.storage.update_deposit(&slip).await?;
        Ok(slip)
    }

    /// Closed -> Valid. Closes the payment entry of every detail's payoff,
    /// assigning their definitive numbers.
    pub async fn validate_deposit(&mut self, deposit: DepositId) -> LedgerResult<DepositSlip> {
        let mut slip = self.get_deposit_required(deposit).await?;
        if slip.status != DepositStatus::Closed {
            return Err(LedgerError::InvalidState(
                "deposit slip is not closed".to_string(),
            ));
        }
        for detail in self.storage.details_of_deposit(deposit).await? {
            let payoff = self
                .storage
                .get_payoff(detail.payoff)
                .await?
                .ok_or_else(|| LedgerError::Validation("unknown payoff".to_string()))?;
            if let Some(entry) = payoff.entry {
                self.entries.close(entry).await?;
            }
        }
        slip.status = DepositStatus::Valid;
        self.storage.update_deposit(&slip).await?;
        info!(deposit = slip.id, "deposit slip validated");
        Ok(slip)
    }

    /// A slip can only be removed while it is still building.
    pub async fn delete_deposit(&mut self, deposit: DepositId) -> LedgerResult<()> {
        let slip = self.get_deposit_required(deposit).await?;
        if slip.status != DepositStatus::Building {
            return Err(LedgerError::CannotDelete(
                "deposit slip is closed".to_string(),
            ));
        }
        self.storage.delete_deposit(deposit).await
    }

    /// Cheque payments eligible for the slip: revenue-side, cheque mode,
    /// routed through the slip's bank account and not already deposited,
    /// grouped by `(entry, reference)`.
    pub async fn candidates(
        &self,
        deposit: DepositId,
        filter: &CandidateFilter,
    ) -> LedgerResult<Vec<DepositCandidate>> {
        let slip = self.get_deposit_required(deposit).await?;
        let deposited: HashSet<PayoffId> = self
            .storage
            .all_deposit_details()
            .await?
            .into_iter()
            .map(|detail| detail.payoff)
            .collect();
        let mut deposited_entries: HashSet<EntryId> = HashSet::new();
        for id in &deposited {
            if let Some(payoff) = self.storage.get_payoff(*id).await? {
                if let Some(entry) = payoff.entry {
                    deposited_entries.insert(entry);
                }
            }
        }
        let eligible = |payoff: &Payoff| {
            payoff.is_revenue
                && payoff.mode == PayoffMode::Cheque
                && payoff.bank_account == Some(slip.bank_account)
                && payoff.entry.map_or(false, |entry| !deposited_entries.contains(&entry))
                && filter
                    .payer
                    .as_deref()
                    .map_or(true, |payer| payoff.payer.contains(payer))
                && filter
                    .reference
                    .as_deref()
                    .map_or(true, |reference| payoff.reference.contains(reference))
                && filter.date_begin.map_or(true, |begin| payoff.date >= begin)
                && filter.date_end.map_or(true, |end| payoff.date <= end)
        };
        let mut candidates: Vec<DepositCandidate> = Vec::new();
        for payoff in self.storage.list_payoffs().await? {
            if !eligible(&payoff) {
                continue;
            }
            let entry = match payoff.entry {
                Some(entry) => entry,
                None => continue,
            };
            match candidates.iter().position(|candidate| {
                candidate.entry == entry && candidate.reference == payoff.reference
            }) {
                Some(position) => candidates[position].amount += &payoff.amount,
                None => candidates.push(DepositCandidate {
                    entry,
                    date: payoff.date,
                    reference: payoff.reference.clone(),
                    payer: payoff.payer.clone(),
                    amount: payoff.amount.clone(),
                }),
            }
        }
        candidates.sort_by(|a, b| a.payer.cmp(&b.payer));
        Ok(candidates)
    }
}
