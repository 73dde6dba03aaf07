//! Integration tests for ledger-core

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use std::str::FromStr;

use ledger_core::{
    CandidateFilter, DocumentData, EntryFilter, FiscalYear, Journal, Ledger, LedgerError,
    LedgerSettings, MemoryStorage, PaymentTerms, PayoffMode, ProfileKind, Repartition,
    SupportingDoc, Third, YearStatus,
};

fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap()
}

fn dec(value: &str) -> BigDecimal {
    BigDecimal::from_str(value).unwrap()
}

fn settings() -> LedgerSettings {
    let mut settings = LedgerSettings::default();
    settings.payoff.cash_account_code = "531000".to_string();
    settings.payoff.bank_fee_account_code = Some("627000".to_string());
    settings
}

async fn ledger_2024() -> (Ledger<MemoryStorage>, FiscalYear) {
    let storage = MemoryStorage::new();
    let mut ledger = Ledger::new(storage, ProfileKind::French, settings());
    let year = ledger
        .create_year(Some(date(2024, 1, 1)), Some(date(2024, 12, 31)))
        .await
        .unwrap();
    for code in ["411000", "401000", "512000", "531000", "627000", "706000", "601000", "106000"] {
        ledger.get_or_create_account(year.id, code, None).await.unwrap();
    }
    (ledger, year)
}

/// Posts and closes a sales entry `411000 debit / 706000 credit` for the
/// given customer, returning the entry id.
async fn post_sale(
    ledger: &mut Ledger<MemoryStorage>,
    year: &FiscalYear,
    third: &Third,
    amount: &str,
    day: u32,
) -> i64 {
    let entry = ledger
        .create_entry(
            year.id,
            Journal::SALES,
            date(2024, 2, day),
            &format!("invoice {amount}"),
            None,
        )
        .await
        .unwrap();
    let mut draft = ledger.draft(entry.id).await.unwrap();
    ledger
        .add_line(
            &mut draft,
            "411000",
            dec(amount),
            BigDecimal::from(0),
            Some(third.id),
            None,
        )
        .await
        .unwrap();
    ledger
        .add_line(
            &mut draft,
            "706000",
            BigDecimal::from(0),
            dec(amount),
            None,
            None,
        )
        .await
        .unwrap();
    ledger.commit(&draft).await.unwrap();
    ledger.close_entry(entry.id).await.unwrap();
    entry.id
}

fn invoice(id: i64, third: &Third, total: &str, day: u32, entries: Vec<i64>) -> SupportingDoc {
    SupportingDoc::Invoice(DocumentData {
        id,
        third: third.id,
        total: dec(total),
        date: date(2024, 2, day),
        entries,
        label: format!("invoice {id}"),
        over_payment_tolerance: BigDecimal::from(0),
    })
}

fn cash_terms(day: u32) -> PaymentTerms {
    PaymentTerms {
        date: date(2024, 3, day),
        mode: PayoffMode::Cash,
        payer: "Dupont".to_string(),
        reference: String::new(),
        bank_account: None,
        bank_fee: BigDecimal::from(0),
    }
}

#[tokio::test]
async fn test_balance_queries_after_sale() {
    let (mut ledger, year) = ledger_2024().await;
    let third = ledger
        .create_third("Dupont", vec!["411000".to_string()])
        .await
        .unwrap();
    post_sale(&mut ledger, &year, &third, "100.00", 1).await;

    let client = ledger
        .account_by_code(year.id, "411000")
        .await
        .unwrap()
        .unwrap();
    let revenue = ledger
        .account_by_code(year.id, "706000")
        .await
        .unwrap()
        .unwrap();
    // display convention: a debit balance on a debit-normal account is positive
    assert_eq!(
        ledger.current_total(&client).await.unwrap(),
        dec("-100.00")
    );
    assert_eq!(
        ledger.current_validated(&client).await.unwrap(),
        dec("-100.00")
    );
    assert_eq!(
        ledger.current_total(&revenue).await.unwrap(),
        dec("100.00")
    );
    assert_eq!(ledger.total_revenue(year.id).await.unwrap(), dec("100.00"));
    assert_eq!(ledger.total_expense(year.id).await.unwrap(), dec("0"));
}

#[tokio::test]
async fn test_link_stealing_between_entries() {
    let (mut ledger, year) = ledger_2024().await;
    let third = ledger
        .create_third("Dupont", vec!["411000".to_string()])
        .await
        .unwrap();
    let e1 = post_sale(&mut ledger, &year, &third, "10.00", 1).await;
    let e2 = post_sale(&mut ledger, &year, &third, "20.00", 2).await;
    let e3 = post_sale(&mut ledger, &year, &third, "30.00", 3).await;

    ledger.create_link(&[e1, e2]).await.unwrap();
    ledger.create_link(&[e2, e3]).await.unwrap();

    let e1 = ledger.get_entry(e1).await.unwrap();
    let e2 = ledger.get_entry(e2).await.unwrap();
    let e3 = ledger.get_entry(e3).await.unwrap();
    assert!(e1.link.is_none());
    assert!(e2.link.is_some());
    assert_eq!(e2.link, e3.link);
}

#[tokio::test]
async fn test_letters_follow_creation_order() {
    let (mut ledger, year) = ledger_2024().await;
    let third = ledger
        .create_third("Dupont", vec!["411000".to_string()])
        .await
        .unwrap();
    let mut letters = Vec::new();
    let mut entries = Vec::new();
    for day in 1..=8 {
        entries.push(post_sale(&mut ledger, &year, &third, "5.00", day).await);
    }
    for pair in entries.chunks(2) {
        let link = ledger.create_link(pair).await.unwrap();
        letters.push(ledger.letter_of(link.id).await.unwrap());
    }
    assert_eq!(letters, vec!["A", "B", "C", "D"]);
}

#[tokio::test]
async fn test_unlink_deletes_orphan_link() {
    let (mut ledger, year) = ledger_2024().await;
    let third = ledger
        .create_third("Dupont", vec!["411000".to_string()])
        .await
        .unwrap();
    let e1 = post_sale(&mut ledger, &year, &third, "10.00", 1).await;
    let e2 = post_sale(&mut ledger, &year, &third, "10.00", 2).await;
    ledger.create_link(&[e1, e2]).await.unwrap();
    ledger.unlink(e1).await.unwrap();
    assert!(ledger.get_entry(e1).await.unwrap().link.is_none());
    assert!(ledger.get_entry(e2).await.unwrap().link.is_none());
}

#[tokio::test]
async fn test_proportional_allocation_splits_120_into_80_and_40() {
    let (mut ledger, year) = ledger_2024().await;
    let third = ledger
        .create_third("Dupont", vec!["411000".to_string()])
        .await
        .unwrap();
    let e1 = post_sale(&mut ledger, &year, &third, "100.00", 1).await;
    let e2 = post_sale(&mut ledger, &year, &third, "50.00", 2).await;
    let inv1 = invoice(1, &third, "100.00", 1, vec![e1]);
    let inv2 = invoice(2, &third, "50.00", 2, vec![e2]);

    let outcome = ledger
        .allocate_payment(
            &[&inv1, &inv2],
            dec("120.00"),
            Repartition::Proportional,
            cash_terms(1),
        )
        .await
        .unwrap();

    let mut amounts: Vec<BigDecimal> = outcome
        .payoffs
        .iter()
        .map(|payoff| payoff.amount.clone())
        .collect();
    amounts.sort();
    assert_eq!(amounts, vec![dec("40.00"), dec("80.00")]);
    // conservation: the requested amount is fully allocated
    let total: BigDecimal = outcome
        .payoffs
        .iter()
        .map(|payoff| payoff.amount.clone())
        .sum();
    assert_eq!(total, dec("120.00"));
    assert_eq!(
        ledger.rest_to_pay(&inv1, None).await.unwrap(),
        dec("20.00")
    );
    assert_eq!(ledger.rest_to_pay(&inv2, None).await.unwrap(), dec("10.00"));

    // one posted entry: customer credited 120, cash debited 120
    let lines = ledger.lines_of_entry(outcome.entry.id).await.unwrap();
    assert_eq!(lines.len(), 2);
    let client = ledger
        .account_by_code(year.id, "411000")
        .await
        .unwrap()
        .unwrap();
    let cash = ledger
        .account_by_code(year.id, "531000")
        .await
        .unwrap()
        .unwrap();
    let client_line = lines.iter().find(|line| line.account == client.id).unwrap();
    let cash_line = lines.iter().find(|line| line.account == cash.id).unwrap();
    assert_eq!(client_line.credit(client.balance_sign()), dec("120.00"));
    assert_eq!(cash_line.debit(cash.balance_sign()), dec("120.00"));
}

#[tokio::test]
async fn test_sequential_allocation_settles_oldest_first() {
    let (mut ledger, year) = ledger_2024().await;
    let third = ledger
        .create_third("Dupont", vec!["411000".to_string()])
        .await
        .unwrap();
    let e1 = post_sale(&mut ledger, &year, &third, "100.00", 1).await;
    let e2 = post_sale(&mut ledger, &year, &third, "50.00", 2).await;
    let inv1 = invoice(1, &third, "100.00", 1, vec![e1]);
    let inv2 = invoice(2, &third, "50.00", 2, vec![e2]);

    let outcome = ledger
        .allocate_payment(
            &[&inv2, &inv1],
            dec("120.00"),
            Repartition::ByDate,
            cash_terms(1),
        )
        .await
        .unwrap();

    // oldest invoice fully settled first, remainder to the second
    let p1 = outcome
        .payoffs
        .iter()
        .find(|payoff| payoff.supporting == 1)
        .unwrap();
    let p2 = outcome
        .payoffs
        .iter()
        .find(|payoff| payoff.supporting == 2)
        .unwrap();
    assert_eq!(p1.amount, dec("100.00"));
    assert_eq!(p2.amount, dec("20.00"));
}

#[tokio::test]
async fn test_full_settlement_links_invoices_with_payment() {
    let (mut ledger, year) = ledger_2024().await;
    let third = ledger
        .create_third("Dupont", vec!["411000".to_string()])
        .await
        .unwrap();
    let e1 = post_sale(&mut ledger, &year, &third, "100.00", 1).await;
    let e2 = post_sale(&mut ledger, &year, &third, "50.00", 2).await;
    let inv1 = invoice(1, &third, "100.00", 1, vec![e1]);
    let inv2 = invoice(2, &third, "50.00", 2, vec![e2]);

    let outcome = ledger
        .allocate_payment(
            &[&inv1, &inv2],
            dec("150.00"),
            Repartition::Proportional,
            cash_terms(1),
        )
        .await
        .unwrap();

    assert_eq!(ledger.rest_to_pay(&inv1, None).await.unwrap(), dec("0"));
    assert_eq!(ledger.rest_to_pay(&inv2, None).await.unwrap(), dec("0"));
    let e1 = ledger.get_entry(e1).await.unwrap();
    let e2 = ledger.get_entry(e2).await.unwrap();
    let payment = ledger.get_entry(outcome.entry.id).await.unwrap();
    assert!(e1.link.is_some());
    assert_eq!(e1.link, e2.link);
    assert_eq!(e1.link, payment.link);
}

#[tokio::test]
async fn test_allocation_with_nothing_payable_is_refused() {
    let (mut ledger, year) = ledger_2024().await;
    let third = ledger
        .create_third("Dupont", vec!["411000".to_string()])
        .await
        .unwrap();
    let e1 = post_sale(&mut ledger, &year, &third, "30.00", 1).await;
    let inv = invoice(1, &third, "30.00", 1, vec![e1]);
    ledger
        .record_payoff(&inv, dec("30.00"), cash_terms(1))
        .await
        .unwrap();

    match ledger
        .allocate_payment(&[&inv], dec("10.00"), Repartition::Proportional, cash_terms(2))
        .await
    {
        Err(LedgerError::NoValidSelection) => {}
        other => panic!("expected NoValidSelection, got {other:?}"),
    }
}

#[tokio::test]
async fn test_non_cash_payment_requires_bank_account() {
    let (mut ledger, year) = ledger_2024().await;
    let third = ledger
        .create_third("Dupont", vec!["411000".to_string()])
        .await
        .unwrap();
    let e1 = post_sale(&mut ledger, &year, &third, "30.00", 1).await;
    let inv = invoice(1, &third, "30.00", 1, vec![e1]);
    let mut terms = cash_terms(1);
    terms.mode = PayoffMode::Cheque;
    match ledger.record_payoff(&inv, dec("30.00"), terms).await {
        Err(LedgerError::BankAccountMissing) => {}
        other => panic!("expected BankAccountMissing, got {other:?}"),
    }
}

#[tokio::test]
async fn test_bank_fee_posts_expense_line() {
    let (mut ledger, year) = ledger_2024().await;
    let third = ledger
        .create_third("Dupont", vec!["411000".to_string()])
        .await
        .unwrap();
    let e1 = post_sale(&mut ledger, &year, &third, "100.00", 1).await;
    let inv = invoice(1, &third, "100.00", 1, vec![e1]);
    let bank = ledger
        .create_bank_account("main account", "FR76", "512000")
        .await
        .unwrap();
    let terms = PaymentTerms {
        date: date(2024, 3, 1),
        mode: PayoffMode::Transfer,
        payer: "Dupont".to_string(),
        reference: "VIR-77".to_string(),
        bank_account: Some(bank.id),
        bank_fee: dec("1.50"),
    };
    let payoff = ledger.record_payoff(&inv, dec("100.00"), terms).await.unwrap();

    let lines = ledger
        .lines_of_entry(payoff.entry.unwrap())
        .await
        .unwrap();
    assert_eq!(lines.len(), 3);
    let fee_account = ledger
        .account_by_code(year.id, "627000")
        .await
        .unwrap()
        .unwrap();
    let bank_chart = ledger
        .account_by_code(year.id, "512000")
        .await
        .unwrap()
        .unwrap();
    let fee_line = lines
        .iter()
        .find(|line| line.account == fee_account.id)
        .unwrap();
    let bank_line = lines
        .iter()
        .find(|line| line.account == bank_chart.id)
        .unwrap();
    // the bank receives the net amount, the fee burdens the expense account
    assert_eq!(fee_line.debit(fee_account.balance_sign()), dec("1.50"));
    assert_eq!(bank_line.debit(bank_chart.balance_sign()), dec("98.50"));
    assert_eq!(
        bank_line.reference.as_deref(),
        Some("transfer : VIR-77")
    );
}

#[tokio::test]
async fn test_delete_payoff_removes_entry_unless_closed() {
    let (mut ledger, year) = ledger_2024().await;
    let third = ledger
        .create_third("Dupont", vec!["411000".to_string()])
        .await
        .unwrap();
    let e1 = post_sale(&mut ledger, &year, &third, "60.00", 1).await;
    let inv = invoice(1, &third, "60.00", 1, vec![e1]);
    let payoff = ledger
        .record_payoff(&inv, dec("60.00"), cash_terms(1))
        .await
        .unwrap();
    let entry = payoff.entry.unwrap();

    ledger.close_entry(entry).await.unwrap();
    match ledger.delete_payoff(payoff.id).await {
        Err(LedgerError::EntryClosed(id)) => assert_eq!(id, entry),
        other => panic!("expected EntryClosed, got {other:?}"),
    }
}

#[tokio::test]
async fn test_deposit_slip_lifecycle() {
    let (mut ledger, year) = ledger_2024().await;
    let third = ledger
        .create_third("Dupont", vec!["411000".to_string()])
        .await
        .unwrap();
    let e1 = post_sale(&mut ledger, &year, &third, "100.00", 1).await;
    let e2 = post_sale(&mut ledger, &year, &third, "50.00", 2).await;
    let inv1 = invoice(1, &third, "100.00", 1, vec![e1]);
    let inv2 = invoice(2, &third, "50.00", 2, vec![e2]);
    let bank = ledger
        .create_bank_account("main account", "FR76", "512000")
        .await
        .unwrap();
    let terms = PaymentTerms {
        date: date(2024, 3, 1),
        mode: PayoffMode::Cheque,
        payer: "Dupont".to_string(),
        reference: "CHQ-1".to_string(),
        bank_account: Some(bank.id),
        bank_fee: BigDecimal::from(0),
    };
    // one cheque paying both invoices: must show as a single candidate row
    let outcome = ledger
        .allocate_payment(
            &[&inv1, &inv2],
            dec("150.00"),
            Repartition::ByDate,
            terms,
        )
        .await
        .unwrap();

    let slip = ledger
        .create_deposit(bank.id, date(2024, 3, 5), "DEP-1")
        .await
        .unwrap();
    match ledger.close_deposit(slip.id).await {
        Err(LedgerError::InvalidState(_)) => {}
        other => panic!("expected InvalidState on empty slip, got {other:?}"),
    }

    let candidates = ledger
        .deposit_candidates(slip.id, &CandidateFilter::default())
        .await
        .unwrap();
    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].entry, outcome.entry.id);
    assert_eq!(candidates[0].amount, dec("150.00"));

    ledger
        .add_deposit_payoffs(slip.id, &[outcome.entry.id])
        .await
        .unwrap();
    assert_eq!(ledger.deposit_total(slip.id).await.unwrap(), dec("150.00"));
    ledger.close_deposit(slip.id).await.unwrap();
    let slip = ledger.validate_deposit(slip.id).await.unwrap();
    assert_eq!(
        slip.status,
        ledger_core::DepositStatus::Valid
    );
    // validation assigned the payment entry its definitive number
    let payment = ledger.get_entry(outcome.entry.id).await.unwrap();
    assert!(payment.close);
    assert!(payment.num.is_some());

    // already-deposited cheques no longer show as candidates
    let slip2 = ledger
        .create_deposit(bank.id, date(2024, 3, 6), "DEP-2")
        .await
        .unwrap();
    let candidates = ledger
        .deposit_candidates(slip2.id, &CandidateFilter::default())
        .await
        .unwrap();
    assert!(candidates.is_empty());
}

#[tokio::test]
async fn test_year_close_rolls_open_entries_forward() {
    let (mut ledger, year) = ledger_2024().await;
    ledger.begin_year(year.id, None).await.unwrap();
    let third = ledger
        .create_third("Dupont", vec!["411000".to_string()])
        .await
        .unwrap();
    post_sale(&mut ledger, &year, &third, "100.00", 1).await;

    // an open draft entry left behind at year end
    let open = ledger
        .create_entry(
            year.id,
            Journal::PURCHASES,
            date(2024, 11, 5),
            "pending bill",
            None,
        )
        .await
        .unwrap();
    let mut draft = ledger.draft(open.id).await.unwrap();
    ledger
        .add_line(&mut draft, "601000", dec("25.00"), BigDecimal::from(0), None, None)
        .await
        .unwrap();
    ledger
        .add_line(
            &mut draft,
            "401000",
            BigDecimal::from(0),
            dec("25.00"),
            Some(third.id),
            None,
        )
        .await
        .unwrap();
    ledger.commit(&draft).await.unwrap();

    // no successor yet: close must be refused while the draft is open
    match ledger.close_year(year.id).await {
        Err(LedgerError::InvalidState(_)) => {}
        other => panic!("expected InvalidState, got {other:?}"),
    }

    let successor = ledger.create_year(None, None).await.unwrap();
    assert_eq!(successor.begin, date(2025, 1, 1));
    assert_eq!(successor.predecessor, Some(year.id));
    let closed_year = ledger.close_year(year.id).await.unwrap();
    assert_eq!(closed_year.status, YearStatus::Finished);

    // the open entry now lives in the successor, rebound by account code
    let rolled = ledger.get_entry(open.id).await.unwrap();
    assert_eq!(rolled.year, successor.id);
    assert_eq!(rolled.date_value, successor.begin);
    assert!(!rolled.close);
    let lines = ledger.lines_of_entry(rolled.id).await.unwrap();
    assert_eq!(lines.len(), 2);
    let successor_accounts = ledger.list_accounts(successor.id).await.unwrap();
    let mut codes = Vec::new();
    for line in &lines {
        let account = successor_accounts
            .iter()
            .find(|account| account.id == line.account)
            .expect("line must point at a successor account");
        codes.push(account.code.clone());
        // stored amounts are unchanged in content: 25 debit on the expense
        // account, 25 credit on the supplier account, both +25 raw
        assert_eq!(line.amount, dec("25.00"));
    }
    codes.sort();
    assert_eq!(codes, vec!["401000", "601000"]);
    assert_eq!(
        lines
            .iter()
            .find_map(|line| line.third)
            .expect("supplier line keeps its third"),
        third.id
    );
}

#[tokio::test]
async fn test_year_rollover_seeds_and_allocates_profit() {
    let (mut ledger, year) = ledger_2024().await;
    ledger.begin_year(year.id, None).await.unwrap();
    let third = ledger
        .create_third("Dupont", vec!["411000".to_string()])
        .await
        .unwrap();
    post_sale(&mut ledger, &year, &third, "100.00", 1).await;

    let successor = ledger.create_year(None, None).await.unwrap();
    ledger.close_year(year.id).await.unwrap();

    ledger.import_charts(successor.id).await.unwrap();
    ledger.report_lastyear(successor.id).await.unwrap();

    // the profit of 2024 waits on the result account
    let profit = ledger.profit_to_allocate(successor.id).await.unwrap();
    assert_eq!(profit, dec("100.00"));

    // begin without a destination account is refused
    match ledger.begin_year(successor.id, None).await {
        Err(LedgerError::ProfitAllocationRequired(amount)) => {
            assert_eq!(amount, dec("100.00"));
        }
        other => panic!("expected ProfitAllocationRequired, got {other:?}"),
    }

    let equity = ledger
        .account_by_code(successor.id, "106000")
        .await
        .unwrap()
        .unwrap();
    let running = ledger
        .begin_year(successor.id, Some(equity.id))
        .await
        .unwrap();
    assert_eq!(running.status, YearStatus::Running);
    // the affectation moved the whole result onto the chosen account
    assert_eq!(
        ledger.profit_to_allocate(successor.id).await.unwrap(),
        dec("0")
    );
    assert_eq!(
        ledger.current_total(&equity).await.unwrap(),
        dec("100.00")
    );

    // the customer position was carried forward with its third
    let client = ledger
        .account_by_code(successor.id, "411000")
        .await
        .unwrap()
        .unwrap();
    let carried = ledger.last_year_total(&client).await.unwrap();
    assert_eq!(carried, dec("-100.00"));
    let lines = ledger
        .lines_of_entry(
            ledger
                .list_entries(&EntryFilter {
                    year: Some(successor.id),
                    journal: Some(Journal::CARRY_FORWARD),
                    ..EntryFilter::default()
                })
                .await
                .unwrap()
                .last()
                .unwrap()
                .id,
        )
        .await
        .unwrap();
    assert!(lines.iter().any(|line| line.third == Some(third.id)));
}

#[tokio::test]
async fn test_begin_requires_validated_carry_forward() {
    let (mut ledger, year) = ledger_2024().await;
    let entry = ledger
        .create_entry(
            year.id,
            Journal::CARRY_FORWARD,
            date(2024, 1, 1),
            "opening",
            None,
        )
        .await
        .unwrap();
    let mut draft = ledger.draft(entry.id).await.unwrap();
    ledger
        .add_line(&mut draft, "512000", dec("10.00"), BigDecimal::from(0), None, None)
        .await
        .unwrap();
    ledger
        .add_line(&mut draft, "106000", BigDecimal::from(0), dec("10.00"), None, None)
        .await
        .unwrap();
    ledger.commit(&draft).await.unwrap();

    match ledger.begin_year(year.id, None).await {
        Err(LedgerError::UnvalidatedCarryForward) => {}
        other => panic!("expected UnvalidatedCarryForward, got {other:?}"),
    }
    ledger.close_entry(entry.id).await.unwrap();
    ledger.begin_year(year.id, None).await.unwrap();
}

#[tokio::test]
async fn test_reverse_creates_linked_companion() {
    let (mut ledger, year) = ledger_2024().await;
    let third = ledger
        .create_third("Dupont", vec!["411000".to_string()])
        .await
        .unwrap();
    let sale = post_sale(&mut ledger, &year, &third, "100.00", 1).await;

    let (companion, serial) = ledger.reverse_entry(sale).await.unwrap();
    assert_eq!(companion.journal, Journal::PAYMENTS);
    // only the third-party line is mirrored, negated
    let mut draft = ledger.draft(companion.id).await.unwrap();
    draft.load_serial(&serial).unwrap();
    assert_eq!(draft.lines().len(), 1);
    assert_eq!(draft.lines()[0].amount, dec("-100.000000"));
    assert_eq!(draft.lines()[0].third, Some(third.id));

    let sale = ledger.get_entry(sale).await.unwrap();
    let companion = ledger.get_entry(companion.id).await.unwrap();
    assert!(sale.link.is_some());
    assert_eq!(sale.link, companion.link);
}

#[tokio::test]
async fn test_unconfigured_profile_blocks_year_creation() {
    let storage = MemoryStorage::new();
    let mut ledger = Ledger::new(storage, ProfileKind::None, LedgerSettings::default());
    match ledger.create_year(None, None).await {
        Err(LedgerError::InvalidState(_)) => {}
        other => panic!("expected InvalidState, got {other:?}"),
    }
}

#[tokio::test]
async fn test_year_deletion_guards() {
    let (mut ledger, year) = ledger_2024().await;
    let successor = ledger.create_year(None, None).await.unwrap();
    match ledger.delete_year(year.id).await {
        Err(LedgerError::CannotDelete(_)) => {}
        other => panic!("expected CannotDelete, got {other:?}"),
    }
    ledger.delete_year(successor.id).await.unwrap();
    ledger.delete_year(year.id).await.unwrap();
}

#[tokio::test]
async fn test_builtin_journals_are_protected() {
    let (mut ledger, _) = ledger_2024().await;
    match ledger.delete_journal(Journal::PAYMENTS).await {
        Err(LedgerError::CannotDelete(_)) => {}
        other => panic!("expected CannotDelete, got {other:?}"),
    }
    let custom = ledger.create_journal("subscriptions").await.unwrap();
    ledger.delete_journal(custom.id).await.unwrap();
}

#[tokio::test]
async fn test_draft_control_reports_shortfalls() {
    let (mut ledger, year) = ledger_2024().await;
    let entry = ledger
        .create_entry(year.id, Journal::SALES, date(2024, 2, 1), "partial", None)
        .await
        .unwrap();
    let mut draft = ledger.draft(entry.id).await.unwrap();
    ledger
        .add_line(&mut draft, "411000", dec("100.00"), BigDecimal::from(0), None, None)
        .await
        .unwrap();
    ledger
        .add_line(&mut draft, "706000", BigDecimal::from(0), dec("60.00"), None, None)
        .await
        .unwrap();
    let control = ledger.control(&draft).await.unwrap();
    assert!(!control.unchanged);
    assert_eq!(control.debit_shortfall, dec("40.00"));
    assert_eq!(control.credit_shortfall, dec("0"));

    ledger.commit(&draft).await.unwrap();
    let stored = ledger.draft(entry.id).await.unwrap();
    let control = ledger.control(&stored).await.unwrap();
    assert!(control.unchanged);
}

#[tokio::test]
async fn test_entry_model_expands_into_draft() {
    let (mut ledger, year) = ledger_2024().await;
    let model = ledger
        .create_model(ledger_core::ModelEntry {
            id: 0,
            journal: Journal::PURCHASES,
            designation: "monthly rent".to_string(),
            lines: vec![
                // raw signed amounts: 250 debit on the expense account and
                // 250 credit on the supplier account both store as +250
                ledger_core::ModelLine {
                    code: "601000".to_string(),
                    third: None,
                    amount: dec("250.00"),
                },
                ledger_core::ModelLine {
                    code: "401000".to_string(),
                    third: None,
                    amount: dec("250.00"),
                },
            ],
        })
        .await
        .unwrap();

    let entry = ledger
        .create_entry(year.id, Journal::PURCHASES, date(2024, 4, 1), "rent april", None)
        .await
        .unwrap();
    let mut draft = ledger.draft(entry.id).await.unwrap();
    ledger
        .apply_model(&mut draft, &model, &dec("2"))
        .await
        .unwrap();
    assert_eq!(draft.lines().len(), 2);
    // amounts are scaled by the factor and rounded to currency precision
    for line in draft.lines() {
        assert_eq!(line.amount, dec("500.00"));
    }
    ledger.commit(&draft).await.unwrap();
    ledger.close_entry(entry.id).await.unwrap();
}

#[tokio::test]
async fn test_single_active_year() {
    let (mut ledger, year) = ledger_2024().await;
    // the first created year becomes active by default
    assert_eq!(ledger.current_year().await.unwrap().id, year.id);
    let successor = ledger.create_year(None, None).await.unwrap();
    assert!(!successor.is_active);
    ledger.set_active_year(successor.id).await.unwrap();
    assert_eq!(ledger.current_year().await.unwrap().id, successor.id);
    let active: Vec<i64> = ledger
        .list_years()
        .await
        .unwrap()
        .iter()
        .filter(|year| year.is_active)
        .map(|year| year.id)
        .collect();
    assert_eq!(active, vec![successor.id]);
}

#[tokio::test]
async fn test_cost_accounting_default_is_exclusive() {
    let (mut ledger, _) = ledger_2024().await;
    let c1 = ledger.create_cost("workshop", "workshop costs", None).await.unwrap();
    let c2 = ledger.create_cost("office", "office costs", None).await.unwrap();
    ledger.toggle_default_cost(c1.id).await.unwrap();
    ledger.toggle_default_cost(c2.id).await.unwrap();
    let defaults: Vec<i64> = ledger
        .list_costs()
        .await
        .unwrap()
        .iter()
        .filter(|cost| cost.is_default)
        .map(|cost| cost.id)
        .collect();
    assert_eq!(defaults, vec![c2.id]);

    // toggling the default off leaves no default at all
    ledger.toggle_default_cost(c2.id).await.unwrap();
    assert!(ledger
        .list_costs()
        .await
        .unwrap()
        .iter()
        .all(|cost| !cost.is_default));
}

#[tokio::test]
async fn test_cost_center_totals() {
    let (mut ledger, year) = ledger_2024().await;
    let workshop = ledger
        .create_cost("workshop", "workshop costs", None)
        .await
        .unwrap();
    let entry = ledger
        .create_entry(
            year.id,
            Journal::SALES,
            date(2024, 5, 2),
            "workshop sale",
            Some(workshop.id),
        )
        .await
        .unwrap();
    let mut draft = ledger.draft(entry.id).await.unwrap();
    ledger
        .add_line(&mut draft, "411000", dec("75.00"), BigDecimal::from(0), None, None)
        .await
        .unwrap();
    ledger
        .add_line(&mut draft, "706000", BigDecimal::from(0), dec("75.00"), None, None)
        .await
        .unwrap();
    ledger.commit(&draft).await.unwrap();
    ledger.close_entry(entry.id).await.unwrap();

    let (revenue, expense) = ledger.cost_totals(workshop.id).await.unwrap();
    assert_eq!(revenue, dec("75.00"));
    assert_eq!(expense, dec("0"));
}
