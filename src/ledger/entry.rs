//! Entry editing: the draft protocol and the entry state machine
//!
//! A draft entry is edited through a serialized line list crossing the edit
//! boundary as text: one line per ledger line, fields pipe-separated
//! (`id|account_id|third_id|amount|reference|`), lines joined by newline.
//! Amounts are rendered with 6 decimal digits; `third_id = 0` means no
//! third and the literal `None` means no reference. Lines not yet persisted
//! travel under negative ids ([`LineRef::Pending`] tokens).

use bigdecimal::{BigDecimal, RoundingMode};
use chrono::Utc;
use std::collections::HashMap;
use std::str::FromStr;
use tracing::{debug, info};

use crate::ledger::link;
use crate::traits::{LedgerContext, LedgerStorage};
use crate::types::*;

/// Scale used when rendering amounts into the draft wire format.
const SERIAL_SCALE: i64 = 6;

/// Renders one line into its wire form.
pub fn serialize_line(line: &EntryLineAccount) -> String {
    format!(
        "{}|{}|{}|{}|{}|",
        line.id.to_serial(),
        line.account,
        line.third.unwrap_or(0),
        line.amount.with_scale_round(SERIAL_SCALE, RoundingMode::HalfUp),
        line.reference.as_deref().unwrap_or("None"),
    )
}

/// Parses one wire line. The reference field may itself contain pipes: it
/// spans everything between the amount field and the trailing separator.
pub fn parse_line(entry: EntryId, serial: &str) -> LedgerResult<EntryLineAccount> {
    let parts: Vec<&str> = serial.split('|').collect();
    if parts.len() < 5 {
        return Err(LedgerError::Validation(format!(
            "invalid draft line: {serial}"
        )));
    }
    let invalid = || LedgerError::Validation(format!("invalid draft line: {serial}"));
    let id = LineRef::from_serial(parts[0].parse::<i64>().map_err(|_| invalid())?);
    let account = parts[1].parse::<i64>().map_err(|_| invalid())?;
    let third_raw = parts[2].parse::<i64>().map_err(|_| invalid())?;
    let amount = BigDecimal::from_str(parts[3]).map_err(|_| invalid())?;
    let reference = parts[4..parts.len() - 1].join("|");
    Ok(EntryLineAccount {
        id,
        entry,
        account,
        amount,
        third: (third_raw != 0).then_some(third_raw),
        reference: (reference != "None").then_some(reference),
    })
}

/// Working set of lines for one entry being edited.
///
/// The draft round-trips through [`EntryDraft::serialize`]/
/// [`EntryDraft::load_serial`] without touching storage; nothing is
/// persisted before [`EntryManager::commit`].
#[derive(Debug, Clone)]
pub struct EntryDraft {
    pub entry: EntryId,
    pub year: YearId,
    pub journal: JournalId,
    lines: Vec<EntryLineAccount>,
    next_pending: i64,
}

impl EntryDraft {
    pub fn new(entry: &EntryAccount, lines: Vec<EntryLineAccount>) -> Self {
        Self {
            entry: entry.id,
            year: entry.year,
            journal: entry.journal,
            lines,
            next_pending: 1,
        }
    }

    pub fn lines(&self) -> &[EntryLineAccount] {
        &self.lines
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Serializes the working set; an empty draft yields the empty string.
    pub fn serialize(&self) -> String {
        self.lines
            .iter()
            .map(serialize_line)
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Replaces the working set from its wire form.
    pub fn load_serial(&mut self, serial: &str) -> LedgerResult<()> {
        let mut lines = Vec::new();
        let mut max_token = 0;
        for raw in serial.split('\n').filter(|raw| !raw.is_empty()) {
            let line = parse_line(self.entry, raw)?;
            if let LineRef::Pending(token) = line.id {
                max_token = max_token.max(token);
            }
            lines.push(line);
        }
        self.lines = lines;
        self.next_pending = max_token + 1;
        Ok(())
    }

    /// Removes a line from the working set.
    pub fn remove_line(&mut self, line: LineRef) -> LedgerResult<()> {
        let before = self.lines.len();
        self.lines.retain(|candidate| candidate.id != line);
        if self.lines.len() == before {
            return Err(LedgerError::Validation(
                "line not found in draft".to_string(),
            ));
        }
        Ok(())
    }

    fn push_pending(&mut self, mut line: EntryLineAccount) -> LineRef {
        let id = LineRef::Pending(self.next_pending);
        self.next_pending += 1;
        line.id = id;
        self.lines.push(line);
        id
    }
}

/// Outcome of comparing a draft against the persisted lines.
#[derive(Debug, Clone, PartialEq)]
pub struct DraftControl {
    /// True when the draft is non-empty and identical to what is stored.
    pub unchanged: bool,
    /// One-sided imbalance `max(0, total_credit - total_debit)`.
    pub credit_shortfall: BigDecimal,
    /// One-sided imbalance `max(0, total_debit - total_credit)`.
    pub debit_shortfall: BigDecimal,
}

/// Manager for entry creation, draft editing and the close/reverse/delete
/// state machine.
pub struct EntryManager<S: LedgerStorage> {
    storage: S,
    context: LedgerContext,
}

impl<S: LedgerStorage> EntryManager<S> {
    pub fn new(storage: S, context: LedgerContext) -> Self {
        Self { storage, context }
    }

    /// Creates a new draft entry header.
    pub async fn create_entry(
        &mut self,
        year: YearId,
        journal: JournalId,
        date_value: chrono::NaiveDate,
        designation: &str,
        cost_accounting: Option<CostId>,
    ) -> LedgerResult<EntryAccount> {
        crate::utils::validation::validate_designation(designation)?;
        self.storage
            .get_journal(journal)
            .await?
            .ok_or_else(|| LedgerError::Validation(format!("unknown journal {journal}")))?;
        self.storage
            .insert_entry(EntryAccount {
                id: 0,
                year,
                num: None,
                journal,
                link: None,
                date_entry: None,
                date_value,
                designation: designation.to_string(),
                cost_accounting,
                close: false,
            })
            .await
    }

    pub async fn get_entry_required(&self, id: EntryId) -> LedgerResult<EntryAccount> {
        self.storage
            .get_entry(id)
            .await?
            .ok_or(LedgerError::EntryNotFound(id))
    }

    /// Entry listing for presentation layers.
    pub async fn list_entries(&self, filter: &EntryFilter) -> LedgerResult<Vec<EntryAccount>> {
        self.storage.list_entries(filter).await
    }

    /// Loads the persisted lines of an entry into a fresh draft.
    pub async fn draft(&self, entry: EntryId) -> LedgerResult<EntryDraft> {
        let entry = self.get_entry_required(entry).await?;
        let lines = self.storage.lines_of_entry(entry.id).await?;
        Ok(EntryDraft::new(&entry, lines))
    }

    /// Adds a line to the draft. Exactly one of `debit`/`credit` must be
    /// positive; the stored amount is signed by the account's normal
    /// balance. Carry-forward entries may only touch balance-sheet
    /// accounts, so revenue/expense codes are refused for journal 1.
    pub async fn add_line(
        &self,
        draft: &mut EntryDraft,
        account_code: &str,
        debit: BigDecimal,
        credit: BigDecimal,
        third: Option<ThirdId>,
        reference: Option<String>,
    ) -> LedgerResult<LineRef> {
        let account = self
            .storage
            .account_by_code(draft.year, account_code)
            .await?
            .ok_or_else(|| LedgerError::AccountNotFound(account_code.to_string()))?;
        if draft.journal == Journal::CARRY_FORWARD {
            let profile = self.context.profile.as_ref();
            if profile.revenue_mask().is_match(&account.code)
                || profile.expense_mask().is_match(&account.code)
            {
                return Err(LedgerError::ForbiddenJournalUse);
            }
        }
        let zero = BigDecimal::from(0);
        if (debit > zero) == (credit > zero) {
            return Err(LedgerError::Validation(
                "exactly one of debit or credit must be positive".to_string(),
            ));
        }
        let mut line = EntryLineAccount {
            id: LineRef::Pending(0),
            entry: draft.entry,
            account: account.id,
            amount: zero,
            third,
            reference,
        };
        line.set_amount(&debit, &credit, account.balance_sign());
        Ok(draft.push_pending(line))
    }

    /// Compares the draft against the persisted lines and totals both
    /// sides, so the caller can gate closing on a balanced, changed set.
    pub async fn control(&self, draft: &EntryDraft) -> LedgerResult<DraftControl> {
        let signs = self.account_signs(draft.year).await?;
        let current = self.storage.lines_of_entry(draft.entry).await?;
        let zero = BigDecimal::from(0);
        let mut total_credit = zero.clone();
        let mut total_debit = zero.clone();
        for line in draft.lines() {
            let sign = *signs.get(&line.account).unwrap_or(&1);
            total_credit += line.credit(sign);
            total_debit += line.debit(sign);
        }
        let mut unchanged = !draft.is_empty() && draft.lines().len() == current.len();
        if unchanged {
            unchanged = draft
                .lines()
                .iter()
                .zip(current.iter())
                .all(|(draft_line, stored)| stored.same_as(draft_line));
        }
        let credit_shortfall = if total_credit > total_debit {
            &total_credit - &total_debit
        } else {
            zero.clone()
        };
        let debit_shortfall = if total_debit > total_credit {
            &total_debit - &total_credit
        } else {
            zero
        };
        Ok(DraftControl {
            unchanged,
            credit_shortfall,
            debit_shortfall,
        })
    }

    /// Replaces the persisted lines of the entry with the draft set.
    pub async fn commit(&mut self, draft: &EntryDraft) -> LedgerResult<Vec<EntryLineAccount>> {
        let entry = self.get_entry_required(draft.entry).await?;
        if entry.close {
            return Err(LedgerError::EntryClosed(entry.id));
        }
        self.storage
            .replace_entry_lines(entry.id, draft.lines().to_vec())
            .await
    }

    /// Closes an entry: checks the balance invariant, then assigns the
    /// definitive sequential number and the bookkeeping date. Calling it
    /// again, or calling it within a finished year, is a no-op.
    pub async fn close(&mut self, entry: EntryId) -> LedgerResult<EntryAccount> {
        self.close_inner(entry, true).await
    }

    /// Closing variant without the balance check, for profile-posted
    /// year-end result entries which are one-sided by construction.
    pub(crate) async fn close_unchecked(&mut self, entry: EntryId) -> LedgerResult<EntryAccount> {
        self.close_inner(entry, false).await
    }

    async fn close_inner(&mut self, entry: EntryId, check_balance: bool) -> LedgerResult<EntryAccount> {
        let mut entry = self.get_entry_required(entry).await?;
        let year = self
            .storage
            .get_year(entry.year)
            .await?
            .ok_or(LedgerError::NoCurrentFiscalYear)?;
        if entry.close || year.status == YearStatus::Finished {
            return Ok(entry);
        }
        if check_balance {
            let signs = self.account_signs(entry.year).await?;
            let mut total_credit = BigDecimal::from(0);
            let mut total_debit = BigDecimal::from(0);
            for line in self.storage.lines_of_entry(entry.id).await? {
                let sign = *signs.get(&line.account).unwrap_or(&1);
                total_credit += line.credit(sign);
                total_debit += line.debit(sign);
            }
            let gap = &total_credit - &total_debit;
            if !self.context.currency.is_negligible(&gap) {
                return Err(LedgerError::Unbalanced {
                    credit: total_credit,
                    debit: total_debit,
                });
            }
        }
        entry.close = true;
        entry.num = Some(self.storage.max_entry_num(entry.year).await?.unwrap_or(0) + 1);
        entry.date_entry = Some(Utc::now().date_naive());
        self.storage.update_entry(&entry).await?;
        info!(entry = entry.id, num = entry.num, "entry closed");
        Ok(entry)
    }

    /// Creates the credit-note companion of a closed, unlinked entry: a new
    /// draft in the payments journal whose third-party lines are the
    /// source's negated, then links source and companion.
    pub async fn reverse(&mut self, entry: EntryId) -> LedgerResult<(EntryAccount, String)> {
        let source = self.get_entry_required(entry).await?;
        let year = self
            .storage
            .get_year(source.year)
            .await?
            .ok_or(LedgerError::NoCurrentFiscalYear)?;
        if year.status == YearStatus::Finished {
            return Err(LedgerError::InvalidState(
                "fiscal year is finished".to_string(),
            ));
        }
        if !source.close {
            return Err(LedgerError::InvalidState(
                "only a closed entry can be reversed".to_string(),
            ));
        }
        if source.link.is_some() {
            return Err(LedgerError::InvalidState(
                "entry is already linked".to_string(),
            ));
        }
        let designation = format!("payment of {}", source.designation);
        let companion = self
            .create_entry(
                source.year,
                Journal::PAYMENTS,
                Utc::now().date_naive(),
                &designation,
                None,
            )
            .await?;
        let accounts = self.account_map(source.year).await?;
        let third_mask = self.context.profile.third_mask().clone();
        let mut draft = EntryDraft::new(&companion, Vec::new());
        for line in self.storage.lines_of_entry(source.id).await? {
            let is_third = accounts
                .get(&line.account)
                .map_or(false, |account| third_mask.is_match(&account.code));
            if is_third {
                draft.push_pending(EntryLineAccount {
                    id: LineRef::Pending(0),
                    entry: companion.id,
                    account: line.account,
                    amount: -line.amount.clone(),
                    third: line.third,
                    reference: line.reference.clone(),
                });
            }
        }
        link::create_link(&mut self.storage, &[source.id, companion.id]).await?;
        debug!(source = source.id, companion = companion.id, "entry reversed");
        Ok((companion, draft.serialize()))
    }

    /// Deletes a draft entry and its lines, releasing any link first.
    pub async fn delete(&mut self, entry: EntryId) -> LedgerResult<()> {
        let header = self.get_entry_required(entry).await?;
        link::unlink_entry(&mut self.storage, header.id).await?;
        let header = self.get_entry_required(entry).await?;
        if header.close {
            return Err(LedgerError::EntryClosed(header.id));
        }
        self.storage.delete_entry(header.id).await
    }

    /// Expands an entry model into the draft, scaled by `factor`.
    pub async fn apply_model(
        &self,
        draft: &mut EntryDraft,
        model: &ModelEntry,
        factor: &BigDecimal,
    ) -> LedgerResult<()> {
        for template in &model.lines {
            let account = self
                .storage
                .account_by_code(draft.year, &template.code)
                .await?
                .ok_or_else(|| {
                    LedgerError::AccountNotFound(format!(
                        "account code {} unknown for this fiscal year",
                        template.code
                    ))
                })?;
            let amount = self.context.currency.round(&(&template.amount * factor));
            draft.push_pending(EntryLineAccount {
                id: LineRef::Pending(0),
                entry: draft.entry,
                account: account.id,
                amount,
                third: template.third,
                reference: None,
            });
        }
        Ok(())
    }

    async fn account_signs(&self, year: YearId) -> LedgerResult<HashMap<AccountId, i64>> {
        Ok(self
            .storage
            .list_accounts(year)
            .await?
            .into_iter()
            .map(|account| (account.id, account.balance_sign()))
            .collect())
    }

    async fn account_map(
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
}
