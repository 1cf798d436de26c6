use chrono::NaiveDate;

use crate::record::{Record, Variant};
use crate::{Decimal, Result};

/// The user's persistent ledger, where reconciled and outstanding rows live
/// between sessions.
pub trait Ledger {
    /// Outstanding rows of `sheet`, to be reconciled alongside pending ones.
    fn unreconciled_rows(&self, sheet: &str, variant: Variant) -> Result<Vec<Record>>;

    fn expected_income(&self) -> Result<Vec<Record>>;

    /// Date of the latest reconciled row of `sheet` whose description
    /// contains `text`.
    fn last_date_containing(&self, sheet: &str, text: &str) -> Result<Option<NaiveDate>>;

    fn update_balance(&mut self, code: &str, amount: Decimal, text: &str) -> Result<()>;

    /// Appends matched `(third party, owned)` pairs to the reconciled rows and
    /// replaces the outstanding rows with `unmatched`.
    fn store_results(
        &mut self,
        sheet: &str,
        matched_pairs: &[(&Record, &Record)],
        unmatched: &[&Record],
    ) -> Result<()>;
}
