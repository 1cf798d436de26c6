use ledger_reconcile::dataset::LoadAction;
use ledger_reconcile::record::Variant;

/// Which pair of files to reconcile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ReconciliationKind {
    /// Money coming into the bank account
    BankIn,
    /// Money leaving the bank account
    BankOut,
    /// Credit card spending
    Card,
}

/// Extra rows merged into the pending set before reconciling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bespoke {
    ExpectedIncome,
    DirectDebits,
}

/// Ledger sheet whose reconciled rows record card direct debits.
pub const DIRECT_DEBIT_SHEET: &str = "bank-out";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadingInfo {
    pub third_party_file: &'static str,
    pub owned_file: &'static str,
    pub pending_file: &'static str,
    pub third_party_descriptor: &'static str,
    pub owned_descriptor: &'static str,
    pub third_party_variant: Variant,
    pub owned_variant: Variant,
    /// Applied in order to the freshly loaded statement.
    pub load_actions: &'static [LoadAction],
    pub sheet: &'static str,
    pub bespoke: Bespoke,
}

impl ReconciliationKind {
    pub fn loading_info(self) -> LoadingInfo {
        match self {
            ReconciliationKind::BankIn => LoadingInfo {
                third_party_file: "ActualBank.csv",
                owned_file: "BankIn.csv",
                pending_file: "BankIn-pending.csv",
                third_party_descriptor: "Bank statement",
                owned_descriptor: "Bank in",
                third_party_variant: Variant::BankStatement,
                owned_variant: Variant::BankLedger,
                load_actions: &[LoadAction::FilterForPositiveRecordsOnly],
                sheet: "bank-in",
                bespoke: Bespoke::ExpectedIncome,
            },
            ReconciliationKind::BankOut => LoadingInfo {
                third_party_file: "ActualBank.csv",
                owned_file: "BankOut.csv",
                pending_file: "BankOut-pending.csv",
                third_party_descriptor: "Bank statement",
                owned_descriptor: "Bank out",
                third_party_variant: Variant::BankStatement,
                owned_variant: Variant::BankLedger,
                load_actions: &[
                    LoadAction::FilterForNegativeRecordsOnly,
                    LoadAction::SwapSignsOfAllAmounts,
                ],
                sheet: DIRECT_DEBIT_SHEET,
                bespoke: Bespoke::DirectDebits,
            },
            ReconciliationKind::Card => LoadingInfo {
                third_party_file: "ActualCard.csv",
                owned_file: "Card.csv",
                pending_file: "Card-pending.csv",
                third_party_descriptor: "Card statement",
                owned_descriptor: "Card",
                third_party_variant: Variant::CardStatement,
                owned_variant: Variant::CardLedger,
                load_actions: &[],
                sheet: "card",
                bespoke: Bespoke::DirectDebits,
            },
        }
    }
}
