//! Preparing the statement and owned files for a session, and saving the
//! results afterwards.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{Months, NaiveDate};
use ledger_reconcile::Decimal;
use ledger_reconcile::dataset::Dataset;
use ledger_reconcile::ledger::Ledger;
use ledger_reconcile::reconcile::{Reconciled, Reconciliator};
use ledger_reconcile::record::{DATE_FORMAT, Details, Record, Side, Variant};
use ledger_reconcile::review::Console;
use ledger_reconcile::store::{self, Separator};

use crate::config::{Config, ConfigCard};
use crate::kinds::{Bespoke, DIRECT_DEBIT_SHEET, LoadingInfo};

pub struct Loader<'a, C, L> {
    pub info: &'a LoadingInfo,
    pub main_path: &'a Path,
    pub config: &'a Config,
    pub default_separator: Separator,
    pub loading_separator: Separator,
    pub console: &'a mut C,
    pub ledger: &'a mut L,
    /// First direct-debit month offered when the ledger has none yet.
    pub today: NaiveDate,
}

impl<C: Console, L: Ledger> Loader<'_, C, L> {
    fn say(&mut self, text: &str) -> Result<()> {
        self.console.output_line(text)?;
        Ok(())
    }

    /// Merges pending, bespoke and outstanding ledger rows into the owned
    /// file, then loads both files.
    pub fn load(&mut self) -> Result<Reconciliator> {
        let info = self.info;
        let owned_path = self.main_path.join(info.owned_file);

        self.say("Loading data from pending file...")?;
        let pending_path = self.main_path.join(info.pending_file);
        let mut pending =
            store::read_records(&pending_path, self.default_separator, info.owned_variant)?;
        store::convert_source_lines(&mut pending, self.default_separator, self.loading_separator)?;

        self.say("Merging bespoke data with pending data...")?;
        match info.bespoke {
            Bespoke::ExpectedIncome => self.merge_expected_income(&mut pending)?,
            Bespoke::DirectDebits => self.merge_direct_debits(&mut pending)?,
        }

        self.say("Merging unreconciled rows from the ledger...")?;
        pending.extend(self.ledger.unreconciled_rows(info.sheet, info.owned_variant)?);
        store::update_source_lines(&mut pending, self.loading_separator)?;
        store::write_records(&owned_path, &pending, self.loading_separator)?;
        tracing::info!(rows = pending.len(), file = %owned_path.display(), "wrote owned file");

        self.say("Loading data back in from owned and statement files...")?;
        self.load_files()
    }

    /// Loads the statement and the owned file as they are on disk.
    pub fn load_files(&self) -> Result<Reconciliator> {
        let info = self.info;
        let owned_path = self.main_path.join(info.owned_file);
        let statement = store::read_records(
            &self.main_path.join(info.third_party_file),
            self.default_separator,
            info.third_party_variant,
        )?;
        let mut third_party = Dataset::from_records(Side::ThirdParty, statement);
        for &action in info.load_actions {
            third_party.apply(action);
        }
        third_party.sort_by_date();

        let owned = store::read_records(&owned_path, self.loading_separator, info.owned_variant)?;
        let owned = Dataset::from_records(Side::Owned, owned);
        tracing::info!(
            statement = third_party.len(),
            owned = owned.len(),
            "loaded {} and {}",
            info.third_party_descriptor,
            info.owned_descriptor
        );

        Ok(Reconciliator::new(third_party, owned)
            .with_settings(self.config.match_settings())
            .with_template(self.config.merge_template()))
    }

    fn merge_expected_income(&mut self, pending: &mut Vec<Record>) -> Result<()> {
        let outstanding = self.ledger.unreconciled_rows(self.info.sheet, self.info.owned_variant)?;
        let already_listed = |income: &Record| {
            outstanding.iter().chain(pending.iter()).any(|row| {
                row.date() == income.date()
                    && row.amount() == income.amount()
                    && row.description() == income.description()
            })
        };

        let mut merged = Vec::new();
        for income in self.ledger.expected_income()? {
            let unpaid = matches!(
                income.details(),
                Details::ExpectedIncome {
                    reconciled_amount: None,
                    ..
                }
            );
            if income.is_divider() || !unpaid {
                continue;
            }
            let row = income.to_bank_ledger();
            if !already_listed(&row) {
                merged.push(row);
            }
        }
        tracing::info!(rows = merged.len(), "merged expected income");
        pending.extend(merged);
        Ok(())
    }

    /// Asks for each month's card direct debit until the user enters 0, then
    /// records the last amount as the card balance.
    fn merge_direct_debits(&mut self, pending: &mut Vec<Record>) -> Result<()> {
        let card = &self.config.card;
        let last = self
            .ledger
            .last_date_containing(DIRECT_DEBIT_SHEET, &card.direct_debit_description)?;
        let mut next = match last {
            Some(date) => next_month(date)?,
            None => self.today,
        };
        let mut statement_month = previous_month(next)?;
        let mut last_amount = None;

        loop {
            let prompt = format!(
                "Enter next {} direct debit (due {}), or 0 to finish: ",
                card.name,
                next.format(DATE_FORMAT)
            );
            let Some(input) = self.console.get_input(&prompt)? else {
                break;
            };
            let amount = match store::parse_amount(input.trim()) {
                Ok(amount) => amount,
                Err(error) => {
                    self.console.output_line(&error.to_string())?;
                    continue;
                }
            };
            if amount.is_zero() {
                break;
            }

            pending.push(direct_debit(self.info.owned_variant, &self.config.card, next, amount));
            last_amount = Some(amount);
            statement_month = previous_month(next)?;
            next = next_month(next)?;
        }

        let text = format!("{} bal ({})", card.name, statement_month.format("%b %Y"));
        let balance = last_amount.map(|amount| -amount).unwrap_or_default();
        self.ledger.update_balance(&card.balance_code, balance, &text)
    }
}

fn next_month(date: NaiveDate) -> Result<NaiveDate> {
    date.checked_add_months(Months::new(1))
        .with_context(|| format!("no month after {date}"))
}

fn previous_month(date: NaiveDate) -> Result<NaiveDate> {
    date.checked_sub_months(Months::new(1))
        .with_context(|| format!("no month before {date}"))
}

fn direct_debit(
    variant: Variant,
    card: &ConfigCard,
    date: NaiveDate,
    amount: Decimal,
) -> Record {
    match variant {
        Variant::CardLedger => {
            Record::new(Details::empty(variant), date, amount, card.payment_description.as_str())
        }
        _ => Record::new(
            Details::empty(variant),
            date,
            amount,
            card.direct_debit_description.as_str(),
        )
        .with_kind("DD"),
    }
}

/// Writes the session back: the owned file, the ledger, and an empty pending
/// file.
pub fn save(
    reconciled: &Reconciled,
    info: &LoadingInfo,
    main_path: &Path,
    loading_separator: Separator,
    ledger: &mut impl Ledger,
) -> Result<()> {
    let owned_path = main_path.join(info.owned_file);
    store::write_records(&owned_path, reconciled.owned().iter(), loading_separator)?;

    let pairs = reconciled.matched_pairs();
    let unmatched: Vec<&Record> = reconciled.unmatched_owned().collect();
    ledger.store_results(info.sheet, &pairs, &unmatched)?;

    let pending_path = main_path.join(info.pending_file);
    std::fs::write(&pending_path, "")
        .with_context(|| format!("Failed to empty {}", pending_path.display()))?;
    tracing::info!(
        matched = pairs.len(),
        unmatched = unmatched.len(),
        "saved results"
    );
    Ok(())
}
