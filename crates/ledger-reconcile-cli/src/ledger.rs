use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use chrono::NaiveDate;
use csv::{ReaderBuilder, WriterBuilder};
use ledger_reconcile::Decimal;
use ledger_reconcile::ledger::Ledger;
use ledger_reconcile::record::{Details, Record, Variant};
use ledger_reconcile::store::{self, Separator};

const EXPECTED_INCOME_FILE: &str = "expected-income.csv";
const TOTALS_FILE: &str = "totals.csv";

/// A ledger kept as comma-separated files in one directory:
/// `<sheet>-unreconciled.csv`, `<sheet>-reconciled.csv`, `expected-income.csv`
/// and `totals.csv`.
#[derive(Debug, Clone)]
pub struct FileLedger {
    dir: PathBuf,
    sheets: HashMap<String, Variant>,
}

impl FileLedger {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        FileLedger {
            dir: dir.into(),
            sheets: HashMap::new(),
        }
    }

    pub fn with_sheet(mut self, sheet: &str, variant: Variant) -> Self {
        self.sheets.insert(sheet.to_owned(), variant);
        self
    }

    fn variant(&self, sheet: &str) -> Result<Variant> {
        match self.sheets.get(sheet) {
            Some(variant) => Ok(*variant),
            None => bail!("unknown ledger sheet '{sheet}'"),
        }
    }

    fn unreconciled_path(&self, sheet: &str) -> PathBuf {
        self.dir.join(format!("{sheet}-unreconciled.csv"))
    }

    fn reconciled_path(&self, sheet: &str) -> PathBuf {
        self.dir.join(format!("{sheet}-reconciled.csv"))
    }

    /// A ledger file that does not exist yet holds no rows.
    fn read_if_present(path: &Path, variant: Variant) -> Result<Vec<Record>> {
        if !path.exists() {
            tracing::debug!("{} does not exist yet", path.display());
            return Ok(Vec::new());
        }
        store::read_records(path, Separator::COMMA, variant)
    }

    fn lines<'a>(records: impl IntoIterator<Item = &'a Record>) -> Result<String> {
        let mut contents = String::new();
        for record in records {
            contents.push_str(&store::regenerate_line(record, Separator::COMMA)?);
            contents.push('\n');
        }
        Ok(contents)
    }

    fn mark_income_paid(&self, matched_pairs: &[(&Record, &Record)]) -> Result<()> {
        let path = self.dir.join(EXPECTED_INCOME_FILE);
        let mut income = Self::read_if_present(&path, Variant::ExpectedIncome)?;
        let mut paid = 0;
        for row in income.iter_mut() {
            let outstanding = matches!(
                row.details(),
                Details::ExpectedIncome {
                    reconciled_amount: None,
                    ..
                }
            );
            if row.is_divider() || !outstanding {
                continue;
            }
            let payment = matched_pairs.iter().find(|(_, owned)| {
                owned.date() == row.date()
                    && owned.amount() == row.amount()
                    && owned.kind() == row.kind()
                    && owned.description() == row.description()
            });
            if let Some((statement, _)) = payment {
                *row = Record::new(
                    Details::ExpectedIncome {
                        reconciled_amount: Some(statement.amount()),
                        date_paid: Some(statement.date()),
                        total_paid: Some(statement.amount()),
                    },
                    row.date(),
                    row.amount(),
                    row.description(),
                )
                .with_kind(row.kind().unwrap_or_default());
                paid += 1;
            }
        }
        if paid > 0 {
            store::write_records(&path, &income, Separator::COMMA)?;
            tracing::info!(paid, "marked expected income as paid");
        }
        Ok(())
    }
}

impl Ledger for FileLedger {
    fn unreconciled_rows(&self, sheet: &str, variant: Variant) -> Result<Vec<Record>> {
        Self::read_if_present(&self.unreconciled_path(sheet), variant)
    }

    fn expected_income(&self) -> Result<Vec<Record>> {
        Self::read_if_present(&self.dir.join(EXPECTED_INCOME_FILE), Variant::ExpectedIncome)
    }

    fn last_date_containing(&self, sheet: &str, text: &str) -> Result<Option<NaiveDate>> {
        let rows = Self::read_if_present(&self.reconciled_path(sheet), self.variant(sheet)?)?;
        Ok(rows
            .iter()
            .filter(|row| !row.is_divider() && row.description().contains(text))
            .map(Record::date)
            .max())
    }

    fn update_balance(&mut self, code: &str, amount: Decimal, text: &str) -> Result<()> {
        let path = self.dir.join(TOTALS_FILE);
        let mut rows: Vec<Vec<String>> = Vec::new();
        if path.exists() {
            let mut reader = ReaderBuilder::new()
                .has_headers(false)
                .flexible(true)
                .from_path(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            for row in reader.records() {
                rows.push(row?.iter().map(str::to_owned).collect());
            }
        }

        let updated = vec![
            code.to_owned(),
            format!("{:.2}", amount.round_dp(2)),
            text.to_owned(),
        ];
        match rows.iter_mut().find(|row| row.first().map(String::as_str) == Some(code)) {
            Some(row) => *row = updated,
            None => rows.push(updated),
        }

        let mut writer = WriterBuilder::new()
            .flexible(true)
            .from_path(&path)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        for row in &rows {
            writer.write_record(row)?;
        }
        writer.flush()?;
        tracing::info!(code, %amount, text, "updated balance");
        Ok(())
    }

    fn store_results(
        &mut self,
        sheet: &str,
        matched_pairs: &[(&Record, &Record)],
        unmatched: &[&Record],
    ) -> Result<()> {
        let reconciled: Vec<Record> = matched_pairs
            .iter()
            .map(|(statement, owned)| owned.reconciled_at(statement.amount()))
            .collect();
        let path = self.reconciled_path(sheet);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to open {}", path.display()))?;
        file.write_all(Self::lines(&reconciled)?.as_bytes())
            .with_context(|| format!("Failed to write {}", path.display()))?;

        let path = self.unreconciled_path(sheet);
        std::fs::write(&path, Self::lines(unmatched.iter().copied())?)
            .with_context(|| format!("Failed to write {}", path.display()))?;

        self.mark_income_paid(matched_pairs)?;
        tracing::info!(
            sheet,
            reconciled = reconciled.len(),
            unreconciled = unmatched.len(),
            "stored results"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledger_reconcile::store::parse_line;
    use rust_decimal_macros::dec;

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, day).unwrap()
    }

    fn card(line: &str) -> Record {
        parse_line(line, Separator::COMMA, Variant::CardLedger).unwrap()
    }

    fn statement(line: &str) -> Record {
        parse_line(line, Separator::COMMA, Variant::CardStatement).unwrap()
    }

    #[test]
    fn missing_files_are_empty() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = FileLedger::new(dir.path()).with_sheet("card", Variant::CardLedger);

        assert!(ledger.unreconciled_rows("card", Variant::CardLedger).unwrap().is_empty());
        assert!(ledger.expected_income().unwrap().is_empty());
        assert_eq!(ledger.last_date_containing("card", "x").unwrap(), None);
        assert!(ledger.last_date_containing("elsewhere", "x").is_err());
    }

    #[test]
    fn store_results_appends_and_replaces() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("card-reconciled.csv"), "01/02/2024,1.00,Old,1.00\n").unwrap();
        std::fs::write(dir.path().join("card-unreconciled.csv"), "02/02/2024,5.00,Stale,\n").unwrap();
        let mut ledger = FileLedger::new(dir.path()).with_sheet("card", Variant::CardLedger);

        let bought = card("04/03/2024,12.50,Books,");
        let paid = statement("05/03/2024,12.50,BOOKSHOP");
        let left = parse_line("06/03/2024^3.20^\"Tea, cake\"^", Separator::CARET, Variant::CardLedger)
            .unwrap();
        ledger
            .store_results("card", &[(&paid, &bought)], &[&left])
            .unwrap();

        let reconciled = std::fs::read_to_string(dir.path().join("card-reconciled.csv")).unwrap();
        assert_eq!(
            reconciled,
            "01/02/2024,1.00,Old,1.00\n04/03/2024,12.50,Books,12.50\n"
        );
        let unreconciled =
            std::fs::read_to_string(dir.path().join("card-unreconciled.csv")).unwrap();
        assert_eq!(unreconciled, "06/03/2024,3.20,\"Tea, cake\",\n");

        assert_eq!(
            ledger.last_date_containing("card", "Books").unwrap(),
            Some(date(4))
        );
    }

    #[test]
    fn balances_are_replaced_by_code() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(TOTALS_FILE),
            "savings,100.00,Savings\ncard-bal,-10.00,Card bal (Jan 2024)\n",
        )
        .unwrap();
        let mut ledger = FileLedger::new(dir.path());

        ledger
            .update_balance("card-bal", dec!(-45.1), "Card bal (Feb 2024)")
            .unwrap();
        ledger.update_balance("new", dec!(0), "New").unwrap();

        let totals = std::fs::read_to_string(dir.path().join(TOTALS_FILE)).unwrap();
        assert_eq!(
            totals,
            "savings,100.00,Savings\ncard-bal,-45.10,Card bal (Feb 2024)\nnew,0.00,New\n"
        );
    }

    #[test]
    fn matched_income_is_marked_paid() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(EXPECTED_INCOME_FILE),
            "01/03/2024,250.00,EXP,,,,Expenses claim\n02/03/2024,80.00,EXP,,,,Other claim\n",
        )
        .unwrap();
        let mut ledger = FileLedger::new(dir.path()).with_sheet("bank-in", Variant::BankLedger);

        let owned = ledger.expected_income().unwrap()[0].to_bank_ledger();
        let paid = parse_line(
            "07/03/2024,BAC,EMPLOYER,250.00,1000.00",
            Separator::COMMA,
            Variant::BankStatement,
        )
        .unwrap();
        ledger
            .store_results("bank-in", &[(&paid, &owned)], &[])
            .unwrap();

        let income = std::fs::read_to_string(dir.path().join(EXPECTED_INCOME_FILE)).unwrap();
        assert_eq!(
            income,
            "01/03/2024,250.00,EXP,250.00,07/03/2024,250.00,Expenses claim\n\
             02/03/2024,80.00,EXP,,,,Other claim\n"
        );
    }
}
