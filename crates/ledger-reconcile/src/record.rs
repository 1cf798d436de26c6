//! Transaction records shared by every statement and ledger format.

use std::fmt;

use chrono::NaiveDate;

use crate::Decimal;

/// Date format used in files and on the console.
pub const DATE_FORMAT: &str = "%d/%m/%Y";

/// Identifies a record within its [`Dataset`](crate::dataset::Dataset).
///
/// Ids are stable across insertions and removals, unlike positions, so match
/// links are stored as ids.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordId(pub(crate) u32);

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Which side of a reconciliation a dataset holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    /// Statement lines from a bank or card provider.
    ThirdParty,
    /// Transactions tracked by the user.
    Owned,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Loaded,
    /// Created by consolidating several owned records into one.
    Merged,
}

/// Column layout of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    BankStatement,
    BankLedger,
    CardStatement,
    CardLedger,
    ExpectedIncome,
}

impl Variant {
    /// Number of cells in a line of this layout.
    pub fn columns(self) -> usize {
        match self {
            Variant::BankStatement => 5,
            Variant::BankLedger => 6,
            Variant::CardStatement => 3,
            Variant::CardLedger => 4,
            Variant::ExpectedIncome => 7,
        }
    }

    /// Owned layouts can contain divider rows.
    pub fn has_dividers(self) -> bool {
        matches!(
            self,
            Variant::BankLedger | Variant::CardLedger | Variant::ExpectedIncome
        )
    }
}

/// Fields only some layouts carry.
#[derive(Debug, Clone, PartialEq)]
pub enum Details {
    BankStatement {
        balance: Option<Decimal>,
    },
    BankLedger {
        reconciled_amount: Option<Decimal>,
    },
    CardStatement,
    CardLedger {
        reconciled_amount: Option<Decimal>,
    },
    ExpectedIncome {
        reconciled_amount: Option<Decimal>,
        date_paid: Option<NaiveDate>,
        total_paid: Option<Decimal>,
    },
}

impl Details {
    pub fn empty(variant: Variant) -> Self {
        match variant {
            Variant::BankStatement => Details::BankStatement { balance: None },
            Variant::BankLedger => Details::BankLedger {
                reconciled_amount: None,
            },
            Variant::CardStatement => Details::CardStatement,
            Variant::CardLedger => Details::CardLedger {
                reconciled_amount: None,
            },
            Variant::ExpectedIncome => Details::ExpectedIncome {
                reconciled_amount: None,
                date_paid: None,
                total_paid: None,
            },
        }
    }

    pub fn variant(&self) -> Variant {
        match self {
            Details::BankStatement { .. } => Variant::BankStatement,
            Details::BankLedger { .. } => Variant::BankLedger,
            Details::CardStatement => Variant::CardStatement,
            Details::CardLedger { .. } => Variant::CardLedger,
            Details::ExpectedIncome { .. } => Variant::ExpectedIncome,
        }
    }
}

/// One transaction line.
///
/// `source_line` holds the text the record was read from. It is written back
/// unchanged until the record's content changes, at which point it is dropped
/// and the line is regenerated from the fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    id: RecordId,
    date: NaiveDate,
    amount: Decimal,
    description: String,
    kind: Option<String>,
    extra_info: Option<u32>,
    details: Details,
    divider: bool,
    origin: Origin,
    matched_with: Option<RecordId>,
    source_line: Option<String>,
}

impl Record {
    pub fn new(
        details: Details,
        date: NaiveDate,
        amount: Decimal,
        description: impl Into<String>,
    ) -> Self {
        Record {
            id: RecordId::default(),
            date,
            amount,
            description: description.into(),
            kind: None,
            extra_info: None,
            details,
            divider: false,
            origin: Origin::Loaded,
            matched_with: None,
            source_line: None,
        }
    }

    /// A placeholder row that separates blocks of an owned file.
    pub fn divider(variant: Variant) -> Self {
        Record {
            divider: true,
            ..Record::new(
                Details::empty(variant),
                NaiveDate::default(),
                Decimal::ZERO,
                "",
            )
        }
    }

    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        let kind = kind.into();
        self.kind = (!kind.is_empty()).then_some(kind);
        self
    }

    pub fn with_extra_info(mut self, extra_info: Option<u32>) -> Self {
        self.extra_info = extra_info;
        self
    }

    pub(crate) fn with_source_line(mut self, line: impl Into<String>) -> Self {
        self.source_line = Some(line.into());
        self
    }

    pub(crate) fn merged(mut self) -> Self {
        self.origin = Origin::Merged;
        self
    }

    pub fn id(&self) -> RecordId {
        self.id
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn amount(&self) -> Decimal {
        self.amount
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn kind(&self) -> Option<&str> {
        self.kind.as_deref()
    }

    pub fn extra_info(&self) -> Option<u32> {
        self.extra_info
    }

    pub fn details(&self) -> &Details {
        &self.details
    }

    pub fn variant(&self) -> Variant {
        self.details.variant()
    }

    pub fn is_divider(&self) -> bool {
        self.divider
    }

    pub fn origin(&self) -> Origin {
        self.origin
    }

    pub fn is_synthetic(&self) -> bool {
        self.origin == Origin::Merged
    }

    pub fn is_matched(&self) -> bool {
        self.matched_with.is_some()
    }

    /// The record on the other side this one is matched with.
    pub fn matched_with(&self) -> Option<RecordId> {
        self.matched_with
    }

    pub fn source_line(&self) -> Option<&str> {
        self.source_line.as_deref()
    }

    /// Whether this record may take part in a match.
    pub fn is_available(&self) -> bool {
        !self.divider && self.matched_with.is_none()
    }

    pub fn swap_sign(&mut self) {
        self.amount = -self.amount;
        self.source_line = None;
    }

    /// Regenerate the line on the next write, e.g. after a separator change.
    pub fn clear_source_line(&mut self) {
        self.source_line = None;
    }

    pub(crate) fn replace_source_line(&mut self, line: String) {
        self.source_line = Some(line);
    }

    pub(crate) fn set_id(&mut self, id: RecordId) {
        self.id = id;
    }

    pub(crate) fn link(&mut self, other: RecordId) {
        self.matched_with = Some(other);
    }

    pub(crate) fn unlink(&mut self) {
        self.matched_with = None;
    }

    /// Expected income is paid into the bank account, so it is reconciled as
    /// a bank ledger record.
    pub fn to_bank_ledger(&self) -> Record {
        let mut record = Record::new(
            Details::empty(Variant::BankLedger),
            self.date,
            self.amount,
            self.description.clone(),
        );
        record.kind = self.kind.clone();
        record
    }

    /// A copy marked as reconciled at `amount`, for the ledger's reconciled
    /// rows. Statement layouts have no reconciled column and are unchanged.
    pub fn reconciled_at(&self, amount: Decimal) -> Record {
        let mut record = self.clone();
        match &mut record.details {
            Details::BankLedger { reconciled_amount }
            | Details::CardLedger { reconciled_amount }
            | Details::ExpectedIncome {
                reconciled_amount, ..
            } => *reconciled_amount = Some(amount),
            Details::BankStatement { .. } | Details::CardStatement => {}
        }
        record.matched_with = None;
        record.source_line = None;
        record
    }

    /// Date, amount and description, as shown on the console.
    pub fn console_line(&self, currency_symbol: &str) -> String {
        format!(
            "{}  {}  {}",
            self.date.format(DATE_FORMAT),
            format_amount(self.amount, currency_symbol),
            self.description
        )
    }
}

/// Formats an amount to two places with a leading currency symbol.
pub fn format_amount(amount: Decimal, currency_symbol: &str) -> String {
    let rounded = amount.round_dp(2);
    if rounded.is_sign_negative() && !rounded.is_zero() {
        format!("-{currency_symbol}{:.2}", rounded.abs())
    } else {
        format!("{currency_symbol}{:.2}", rounded.abs())
    }
}
