//! Reading and writing records as delimited text.
//!
//! Each line keeps its original text so that records nobody touched are
//! written back exactly as they were read. Lines are only regenerated from the
//! record's fields when the content changed, and only then is the quoting rule
//! applied.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, anyhow, bail};
use chrono::NaiveDate;
use csv::{QuoteStyle, ReaderBuilder, Terminator, WriterBuilder};

use crate::error::ReconcileError;
use crate::record::{DATE_FORMAT, Details, Record, Variant};
use crate::{Decimal, Result};

/// Cell text marking a divider row in an owned file.
pub const DIVIDER_TEXT: &str = "divider";

const DIVIDER_COLUMN: usize = 1;

/// A single-byte cell separator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Separator(u8);

impl Separator {
    pub const COMMA: Separator = Separator(b',');
    pub const CARET: Separator = Separator(b'^');

    pub fn as_char(self) -> char {
        char::from(self.0)
    }
}

impl TryFrom<char> for Separator {
    type Error = anyhow::Error;

    fn try_from(separator: char) -> Result<Self> {
        match u8::try_from(separator) {
            Ok(byte) if byte.is_ascii() && byte != b'"' && !byte.is_ascii_alphanumeric() => {
                Ok(Separator(byte))
            }
            _ => bail!("'{separator}' cannot be used as a separator"),
        }
    }
}

impl fmt::Display for Separator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

/// Parses an amount cell, tolerating a currency symbol and thousands separators.
pub fn parse_amount(text: &str) -> std::result::Result<Decimal, ReconcileError> {
    let cleaned: String = text
        .trim()
        .chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, '.' | '-' | '+'))
        .collect();
    let has_digits = cleaned.chars().any(|c| c.is_ascii_digit());
    let stray = text
        .trim()
        .chars()
        .any(|c| c.is_ascii_alphabetic() || c.is_whitespace());
    if !has_digits || stray {
        return Err(ReconcileError::MalformedAmount(text.to_owned()));
    }
    Decimal::from_str(&cleaned).map_err(|_| ReconcileError::MalformedAmount(text.to_owned()))
}

fn parse_optional_amount(cell: &str) -> Result<Option<Decimal>> {
    if cell.trim().is_empty() {
        return Ok(None);
    }
    Ok(Some(parse_amount(cell)?))
}

fn parse_optional_date(cell: &str) -> Result<Option<NaiveDate>> {
    let cell = cell.trim();
    if cell.is_empty() {
        return Ok(None);
    }
    NaiveDate::parse_from_str(cell, DATE_FORMAT)
        .map(Some)
        .with_context(|| format!("'{cell}' is not a dd/mm/yyyy date"))
}

fn parse_optional_number(cell: &str) -> Result<Option<u32>> {
    let cell = cell.trim();
    if cell.is_empty() {
        return Ok(None);
    }
    cell.parse()
        .map(Some)
        .with_context(|| format!("'{cell}' is not a whole number"))
}

fn split_line(line: &str, separator: Separator) -> Result<Vec<String>> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(separator.0)
        .from_reader(line.as_bytes());
    match reader.records().next() {
        Some(cells) => Ok(cells?.iter().map(str::to_owned).collect()),
        None => Ok(Vec::new()),
    }
}

fn join_cells(cells: &[String], separator: Separator) -> Result<String> {
    let mut writer = WriterBuilder::new()
        .delimiter(separator.0)
        .quote_style(QuoteStyle::Necessary)
        .terminator(Terminator::Any(b'\n'))
        .from_writer(Vec::new());
    writer.write_record(cells)?;
    let bytes = writer
        .into_inner()
        .map_err(|error| anyhow!("cannot flush line: {error}"))?;
    let mut line = String::from_utf8(bytes)?;
    line.truncate(line.trim_end_matches('\n').len());
    Ok(line)
}

/// Parses one line of the given layout.
pub fn parse_line(line: &str, separator: Separator, variant: Variant) -> Result<Record> {
    let mut cells = split_line(line, separator)?;
    if cells.len() < variant.columns() {
        cells.resize(variant.columns(), String::new());
    }

    if variant.has_dividers() && cells[DIVIDER_COLUMN].trim().eq_ignore_ascii_case(DIVIDER_TEXT) {
        return Ok(Record::divider(variant).with_source_line(line));
    }

    let date = parse_optional_date(&cells[0])?.context("missing date")?;
    let record = match variant {
        Variant::BankStatement => {
            let amount = parse_optional_amount(&cells[3])?.context("missing amount")?;
            let balance = parse_optional_amount(&cells[4])?;
            Record::new(
                Details::BankStatement { balance },
                date,
                amount,
                cells[2].as_str(),
            )
            .with_kind(cells[1].as_str())
        }
        Variant::BankLedger => {
            let amount = parse_optional_amount(&cells[1])?.context("missing unreconciled amount")?;
            if cells[2].trim().is_empty() && cells[3].trim().is_empty() {
                bail!("missing type or description");
            }
            let reconciled_amount = parse_optional_amount(&cells[5])?;
            Record::new(
                Details::BankLedger { reconciled_amount },
                date,
                amount,
                cells[3].as_str(),
            )
            .with_kind(cells[2].as_str())
            .with_extra_info(parse_optional_number(&cells[4])?)
        }
        Variant::CardStatement => {
            let amount = parse_optional_amount(&cells[1])?.context("missing amount")?;
            Record::new(Details::CardStatement, date, amount, cells[2].as_str())
        }
        Variant::CardLedger => {
            let amount = parse_optional_amount(&cells[1])?.context("missing unreconciled amount")?;
            if cells[2].trim().is_empty() {
                bail!("missing description");
            }
            let reconciled_amount = parse_optional_amount(&cells[3])?;
            Record::new(
                Details::CardLedger { reconciled_amount },
                date,
                amount,
                cells[2].as_str(),
            )
        }
        Variant::ExpectedIncome => {
            let amount = parse_optional_amount(&cells[1])?.context("missing unreconciled amount")?;
            if cells[2].trim().is_empty() && cells[6].trim().is_empty() {
                bail!("missing code or description");
            }
            Record::new(
                Details::ExpectedIncome {
                    reconciled_amount: parse_optional_amount(&cells[3])?,
                    date_paid: parse_optional_date(&cells[4])?,
                    total_paid: parse_optional_amount(&cells[5])?,
                },
                date,
                amount,
                cells[6].as_str(),
            )
            .with_kind(cells[2].as_str())
        }
    };
    Ok(record.with_source_line(line))
}

/// Two decimal places at least, never losing precision.
fn amount_cell(amount: Decimal) -> String {
    if amount.scale() < 2 {
        format!("{amount:.2}")
    } else {
        amount.to_string()
    }
}

fn optional_amount_cell(amount: Option<Decimal>) -> String {
    amount.map(amount_cell).unwrap_or_default()
}

fn optional_date_cell(date: Option<NaiveDate>) -> String {
    date.map(|date| date.format(DATE_FORMAT).to_string())
        .unwrap_or_default()
}

fn cells(record: &Record) -> Vec<String> {
    let variant = record.variant();
    if record.is_divider() {
        let mut cells = vec![String::new(); variant.columns()];
        cells[DIVIDER_COLUMN] = DIVIDER_TEXT.to_owned();
        return cells;
    }

    let date = record.date().format(DATE_FORMAT).to_string();
    let amount = amount_cell(record.amount());
    let kind = record.kind().unwrap_or_default().to_owned();
    let description = record.description().to_owned();
    match record.details() {
        Details::BankStatement { balance } => {
            vec![date, kind, description, amount, optional_amount_cell(*balance)]
        }
        Details::BankLedger { reconciled_amount } => vec![
            date,
            amount,
            kind,
            description,
            record
                .extra_info()
                .map(|number| number.to_string())
                .unwrap_or_default(),
            optional_amount_cell(*reconciled_amount),
        ],
        Details::CardStatement => vec![date, amount, description],
        Details::CardLedger { reconciled_amount } => {
            vec![date, amount, description, optional_amount_cell(*reconciled_amount)]
        }
        Details::ExpectedIncome {
            reconciled_amount,
            date_paid,
            total_paid,
        } => vec![
            date,
            amount,
            kind,
            optional_amount_cell(*reconciled_amount),
            optional_date_cell(*date_paid),
            optional_amount_cell(*total_paid),
            description,
        ],
    }
}

/// Builds a line from the record's fields, ignoring any stored source line.
pub fn regenerate_line(record: &Record, separator: Separator) -> Result<String> {
    join_cells(&cells(record), separator)
}

/// The line to write for a record: its source line if unchanged.
pub fn format_line(record: &Record, separator: Separator) -> Result<String> {
    match record.source_line() {
        Some(line) => Ok(line.to_owned()),
        None => regenerate_line(record, separator),
    }
}

/// Re-delimits a line, keeping quoted cells intact.
pub fn convert_separator(line: &str, from: Separator, to: Separator) -> Result<String> {
    join_cells(&split_line(line, from)?, to)
}

/// Converts the stored source lines of `records` from one separator to another.
pub fn convert_source_lines(records: &mut [Record], from: Separator, to: Separator) -> Result<()> {
    for record in records {
        if let Some(line) = record.source_line() {
            let converted = convert_separator(line, from, to)?;
            record.replace_source_line(converted);
        }
    }
    Ok(())
}

/// Regenerates every source line with the given separator.
pub fn update_source_lines(records: &mut [Record], separator: Separator) -> Result<()> {
    for record in records {
        let line = regenerate_line(record, separator)?;
        record.replace_source_line(line);
    }
    Ok(())
}

/// Reads every non-blank line of a file. Any failure is a
/// [`ReconcileError::LoadFailure`]; nothing is silently dropped.
pub fn read_records(path: &Path, separator: Separator, variant: Variant) -> Result<Vec<Record>> {
    let contents = std::fs::read_to_string(path).map_err(|error| ReconcileError::LoadFailure {
        path: path.to_owned(),
        line: None,
        reason: error.to_string(),
    })?;

    let mut records = Vec::new();
    for (index, line) in contents.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let record =
            parse_line(line, separator, variant).map_err(|error| ReconcileError::LoadFailure {
                path: path.to_owned(),
                line: Some(index + 1),
                reason: format!("{error:#}"),
            })?;
        records.push(record);
    }
    tracing::debug!("read {} record(s) from {}", records.len(), path.display());
    Ok(records)
}

pub fn write_records<'a>(
    path: &Path,
    records: impl IntoIterator<Item = &'a Record>,
    separator: Separator,
) -> Result<()> {
    let mut contents = String::new();
    let mut count = 0;
    for record in records {
        contents.push_str(&format_line(record, separator)?);
        contents.push('\n');
        count += 1;
    }
    std::fs::write(path, contents)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    tracing::debug!("wrote {count} record(s) to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn parses_bank_statement_line() {
        let line = r#"06/03/2024,BAC,"Smith, J","£1,261.40",4273.63"#;

        let record = parse_line(line, Separator::COMMA, Variant::BankStatement).unwrap();
        assert_eq!(record.date(), date(2024, 3, 6));
        assert_eq!(record.kind(), Some("BAC"));
        assert_eq!(record.description(), "Smith, J");
        assert_eq!(record.amount(), dec!(1261.40));
        assert_eq!(
            record.details(),
            &Details::BankStatement {
                balance: Some(dec!(4273.63))
            }
        );
        assert_eq!(record.source_line(), Some(line));
    }

    #[test]
    fn parses_bank_ledger_line_with_missing_cells() {
        let record = parse_line("01/02/2024^12.99^POS^Groceries", Separator::CARET, Variant::BankLedger)
            .unwrap();
        assert_eq!(record.amount(), dec!(12.99));
        assert_eq!(record.kind(), Some("POS"));
        assert_eq!(record.description(), "Groceries");
        assert_eq!(record.extra_info(), None);
        assert_eq!(
            record.details(),
            &Details::BankLedger {
                reconciled_amount: None
            }
        );
    }

    #[test]
    fn recognises_dividers() {
        let record = parse_line(",Divider,,,,", Separator::COMMA, Variant::BankLedger).unwrap();
        assert!(record.is_divider());
        assert_eq!(format_line(&record, Separator::COMMA).unwrap(), ",Divider,,,,");
        assert_eq!(regenerate_line(&record, Separator::COMMA).unwrap(), ",divider,,,,");
    }

    #[test]
    fn missing_essential_fields_fail() {
        let error = parse_line("01/02/2024,,POS,Groceries", Separator::COMMA, Variant::BankLedger)
            .unwrap_err();
        assert_eq!(format!("{error:#}"), "missing unreconciled amount");

        let error = parse_line("01/02/2024,4.00,,", Separator::COMMA, Variant::BankLedger)
            .unwrap_err();
        assert_eq!(format!("{error:#}"), "missing type or description");

        assert!(parse_line("2024-02-01,4.00,POS,x", Separator::COMMA, Variant::BankLedger).is_err());
    }

    #[test]
    fn untouched_records_round_trip_byte_for_byte() {
        let line = "05/01/2024,  -4.5 ,\"Odd \"\"quoted\"\" text\",";
        let record = parse_line(line, Separator::COMMA, Variant::CardLedger).unwrap();
        assert_eq!(record.amount(), dec!(-4.5));
        assert_eq!(record.description(), "Odd \"quoted\" text");
        assert_eq!(format_line(&record, Separator::COMMA).unwrap(), line);
    }

    #[test]
    fn regenerated_lines_quote_separator_and_quotes() {
        let record = Record::new(
            Details::CardLedger {
                reconciled_amount: None,
            },
            date(2024, 1, 5),
            dec!(4),
            "Fish, chips and \"peas\"",
        );
        assert_eq!(
            format_line(&record, Separator::COMMA).unwrap(),
            r#"05/01/2024,4.00,"Fish, chips and ""peas""","#
        );
        assert_eq!(
            format_line(&record, Separator::CARET).unwrap(),
            r#"05/01/2024^4.00^"Fish, chips and ""peas"""^"#
        );

        let plain = Record::new(Details::CardStatement, date(2024, 1, 5), dec!(4.125), "Fish, chips");
        assert_eq!(
            format_line(&plain, Separator::CARET).unwrap(),
            "05/01/2024^4.125^Fish, chips"
        );
    }

    #[test]
    fn converts_separators_outside_quotes_only() {
        let converted =
            convert_separator(r#"01/01/2024,3.00,"a, b""#, Separator::COMMA, Separator::CARET).unwrap();
        assert_eq!(converted, "01/01/2024^3.00^a, b");

        let mut records =
            vec![parse_line("01/01/2024,3.00,c", Separator::COMMA, Variant::CardStatement).unwrap()];
        convert_source_lines(&mut records, Separator::COMMA, Separator::CARET).unwrap();
        assert_eq!(records[0].source_line(), Some("01/01/2024^3.00^c"));
    }

    #[test]
    fn amounts() {
        assert_eq!(parse_amount("£1,234.56").unwrap(), dec!(1234.56));
        assert_eq!(parse_amount(" -0.10 ").unwrap(), dec!(-0.10));
        assert_eq!(
            parse_amount("ten"),
            Err(ReconcileError::MalformedAmount("ten".to_owned()))
        );
        assert!(parse_amount("").is_err());
        assert!(parse_amount("1 2").is_err());
    }

    #[test]
    fn separators() {
        assert_eq!(Separator::try_from('^').unwrap(), Separator::CARET);
        assert!(Separator::try_from('a').is_err());
        assert!(Separator::try_from('"').is_err());
        assert!(Separator::try_from('€').is_err());
    }

    #[test]
    fn files_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("owned.csv");
        std::fs::write(
            &path,
            "01/01/2024,10.00,DD,Rent,,\n\n,divider,,,,\n02/01/2024,2.50,POS,\"Tea, cake\",17,\n",
        )
        .unwrap();

        let records = read_records(&path, Separator::COMMA, Variant::BankLedger).unwrap();
        assert_eq!(records.len(), 3);
        assert!(records[1].is_divider());
        assert_eq!(records[2].extra_info(), Some(17));

        write_records(&path, &records, Separator::COMMA).unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "01/01/2024,10.00,DD,Rent,,\n,divider,,,,\n02/01/2024,2.50,POS,\"Tea, cake\",17,\n"
        );
    }

    #[test]
    fn load_failures_name_the_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("statement.csv");
        std::fs::write(&path, "01/01/2024,1.00,ok\nnot a date,2.00,bad\n").unwrap();

        let error = read_records(&path, Separator::COMMA, Variant::CardStatement).unwrap_err();
        match error.downcast_ref::<ReconcileError>() {
            Some(ReconcileError::LoadFailure { line, .. }) => assert_eq!(*line, Some(2)),
            other => panic!("unexpected error: {other:?}"),
        }

        let missing = dir.path().join("missing.csv");
        let error = read_records(&missing, Separator::COMMA, Variant::CardStatement).unwrap_err();
        assert!(matches!(
            error.downcast_ref::<ReconcileError>(),
            Some(ReconcileError::LoadFailure { line: None, .. })
        ));
    }
}
