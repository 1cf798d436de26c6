use crate::Decimal;
use crate::dataset::Dataset;
use crate::error::ReconcileError;
use crate::record::{Details, Record, RecordId, format_amount};
use crate::reconcile::candidates::{PotentialMatch, RecordForMatching};

/// How a record standing in for several owned records is described.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeTemplate {
    pub label: String,
    pub currency_symbol: String,
}

impl Default for MergeTemplate {
    fn default() -> Self {
        MergeTemplate {
            label: "Several items".to_owned(),
            currency_symbol: "£".to_owned(),
        }
    }
}

impl MergeTemplate {
    /// `Several items (£20.22, £30.33, £40.44)`
    pub fn describe(&self, amounts: impl IntoIterator<Item = Decimal>) -> String {
        let amounts: Vec<String> = amounts
            .into_iter()
            .map(|amount| format_amount(amount, &self.currency_symbol))
            .collect();
        format!("{} ({})", self.label, amounts.join(", "))
    }
}

/// A confirmed match, with enough kept to reverse it.
#[derive(Debug, Clone, PartialEq)]
pub struct AppliedMatch {
    source: RecordId,
    owned: RecordId,
    /// Owned records replaced by a merged record, at their original positions.
    removed: Vec<(usize, Record)>,
}

impl AppliedMatch {
    pub fn source(&self) -> RecordId {
        self.source
    }

    /// The owned record the source is now linked with.
    pub fn owned(&self) -> RecordId {
        self.owned
    }

    pub fn is_synthetic(&self) -> bool {
        !self.removed.is_empty()
    }

    pub fn removed(&self) -> impl Iterator<Item = &Record> {
        self.removed.iter().map(|(_, record)| record)
    }
}

fn available<'a>(
    dataset: &'a Dataset,
    id: RecordId,
    what: &str,
) -> Result<&'a Record, ReconcileError> {
    let record = dataset
        .get(id)
        .ok_or_else(|| ReconcileError::consistency(format!("{what} {id} does not exist")))?;
    if !record.is_available() {
        return Err(ReconcileError::consistency(format!(
            "{what} {id} is already matched or is a divider"
        )));
    }
    Ok(record)
}

/// Links two unmatched records, checking both ends before writing either.
fn link(
    third_party: &mut Dataset,
    source: RecordId,
    owned: &mut Dataset,
    target: RecordId,
) -> Result<(), ReconcileError> {
    available(third_party, source, "source")?;
    available(owned, target, "owned record")?;
    if let Some(record) = third_party.get_mut(source) {
        record.link(target);
    }
    if let Some(record) = owned.get_mut(target) {
        record.link(source);
    }
    Ok(())
}

fn check_candidate(
    source: &Record,
    candidate: &PotentialMatch,
    owned: &Dataset,
) -> Result<(), ReconcileError> {
    let mut total = Decimal::ZERO;
    for &member in candidate.members() {
        total += available(owned, member, "candidate member")?.amount();
    }
    if total != source.amount() {
        return Err(ReconcileError::consistency(format!(
            "candidate sums to {total} but source {} is {}",
            source.id(),
            source.amount()
        )));
    }
    Ok(())
}

/// Confirms candidate `chosen` of `rfm`.
///
/// A single member is linked directly. Several members are removed from
/// `owned` and replaced, at the lowest removed position, by one merged record
/// carrying their total, which is then linked with the source.
pub fn match_specified(
    rfm: &RecordForMatching,
    chosen: usize,
    third_party: &mut Dataset,
    owned: &mut Dataset,
    template: &MergeTemplate,
) -> Result<AppliedMatch, ReconcileError> {
    let candidate = rfm
        .candidates()
        .get(chosen)
        .ok_or(ReconcileError::InvalidSelection {
            index: chosen,
            available: rfm.candidates().len(),
        })?;
    let source = available(third_party, rfm.source(), "source")?;
    check_candidate(source, candidate, owned)?;

    if let [member] = candidate.members() {
        link(third_party, rfm.source(), owned, *member)?;
        tracing::info!(source = %rfm.source(), owned = %member, "matched");
        return Ok(AppliedMatch {
            source: rfm.source(),
            owned: *member,
            removed: Vec::new(),
        });
    }

    let members: Vec<&Record> = candidate
        .members()
        .iter()
        .filter_map(|&id| owned.get(id))
        .collect();
    let Some(first) = members.first() else {
        return Err(ReconcileError::consistency("candidate has no members"));
    };
    let merged = Record::new(
        Details::empty(first.variant()),
        source.date(),
        candidate.total(),
        template.describe(members.iter().map(|record| record.amount())),
    )
    .with_kind(first.kind().unwrap_or_default())
    .merged();

    let mut positions: Vec<(usize, RecordId)> = candidate
        .members()
        .iter()
        .filter_map(|&id| Some((owned.position(id)?, id)))
        .collect();
    positions.sort_unstable();
    let Some(&(lowest, _)) = positions.first() else {
        return Err(ReconcileError::consistency("candidate has no members"));
    };

    // back to front, so earlier positions stay valid
    let mut removed = Vec::with_capacity(positions.len());
    for &(_, id) in positions.iter().rev() {
        if let Some(entry) = owned.remove(id) {
            removed.push(entry);
        }
    }
    removed.reverse();

    let merged_id = owned.insert(lowest, merged);
    link(third_party, rfm.source(), owned, merged_id)?;
    tracing::info!(
        source = %rfm.source(),
        owned = %merged_id,
        merged = removed.len(),
        "matched with merged record"
    );

    Ok(AppliedMatch {
        source: rfm.source(),
        owned: merged_id,
        removed,
    })
}

/// Reverses `applied`, leaving `owned` as it was before the confirm.
pub fn undo_match(
    applied: AppliedMatch,
    third_party: &mut Dataset,
    owned: &mut Dataset,
) -> Result<(), ReconcileError> {
    let source = third_party
        .get(applied.source)
        .ok_or_else(|| ReconcileError::consistency(format!("source {} is gone", applied.source)))?;
    let target = owned.get(applied.owned).ok_or_else(|| {
        ReconcileError::consistency(format!("owned record {} is gone", applied.owned))
    })?;
    if source.matched_with() != Some(applied.owned) || target.matched_with() != Some(applied.source)
    {
        return Err(ReconcileError::consistency(format!(
            "{} and {} are not linked with each other",
            applied.source, applied.owned
        )));
    }

    if let Some(record) = third_party.get_mut(applied.source) {
        record.unlink();
    }
    if applied.removed.is_empty() {
        if let Some(record) = owned.get_mut(applied.owned) {
            record.unlink();
        }
    } else {
        owned.remove(applied.owned);
        for (position, record) in applied.removed {
            owned.restore(position, record);
        }
    }
    tracing::info!(source = %applied.source, owned = %applied.owned, "undid match");
    Ok(())
}

/// Checks that every link points at a record that links back.
pub fn check_links(third_party: &Dataset, owned: &Dataset) -> Result<(), ReconcileError> {
    for (this, other) in [(third_party, owned), (owned, third_party)] {
        for record in this.iter() {
            let Some(partner) = record.matched_with() else {
                continue;
            };
            let back = other.get(partner).and_then(Record::matched_with);
            if back != Some(record.id()) {
                return Err(ReconcileError::consistency(format!(
                    "{} links to {partner}, which does not link back",
                    record.id()
                )));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconcile::candidates::{MatchSettings, generate};
    use crate::record::Side;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, day).unwrap()
    }

    fn statement(amounts: &[Decimal]) -> Dataset {
        Dataset::from_records(
            Side::ThirdParty,
            amounts.iter().enumerate().map(|(index, &amount)| {
                Record::new(
                    Details::CardStatement,
                    date(10 + index as u32),
                    amount,
                    format!("statement {index}"),
                )
            }),
        )
    }

    fn ledger(amounts: &[Decimal]) -> Dataset {
        Dataset::from_records(
            Side::Owned,
            amounts.iter().enumerate().map(|(index, &amount)| {
                Record::new(
                    Details::CardLedger {
                        reconciled_amount: Some(amount),
                    },
                    date(1 + index as u32),
                    amount,
                    format!("ledger {index}"),
                )
                .with_kind("POS")
            }),
        )
    }

    fn candidates_for(position: usize, third_party: &Dataset, owned: &Dataset) -> RecordForMatching {
        let source = third_party.at(position).unwrap();
        RecordForMatching::new(
            source.id(),
            generate(source, owned, &MatchSettings::default()),
        )
    }

    #[test]
    fn single_candidate_links_directly() {
        let mut third_party = statement(&[dec!(34.56)]);
        let mut owned = ledger(&[dec!(10.00), dec!(34.56)]);
        let rfm = candidates_for(0, &third_party, &owned);

        let applied = match_specified(
            &rfm,
            0,
            &mut third_party,
            &mut owned,
            &MergeTemplate::default(),
        )
        .unwrap();

        assert!(!applied.is_synthetic());
        assert_eq!(owned.len(), 2);
        let source = third_party.at(0).unwrap();
        let target = owned.at(1).unwrap();
        assert_eq!(source.matched_with(), Some(target.id()));
        assert_eq!(target.matched_with(), Some(source.id()));
        assert!(!target.is_synthetic());
        check_links(&third_party, &owned).unwrap();
    }

    #[test]
    fn several_candidates_are_merged() {
        let mut third_party = statement(&[dec!(90.99)]);
        let mut owned = ledger(&[dec!(5.00), dec!(20.22), dec!(30.33), dec!(40.44)]);
        let rfm = candidates_for(0, &third_party, &owned);
        let members = rfm.candidates()[0].members().to_vec();

        let applied = match_specified(
            &rfm,
            0,
            &mut third_party,
            &mut owned,
            &MergeTemplate::default(),
        )
        .unwrap();

        assert!(applied.is_synthetic());
        assert_eq!(owned.len(), 2);
        for member in members {
            assert_eq!(owned.get(member), None);
        }

        let merged = owned.at(1).unwrap();
        assert!(merged.is_synthetic());
        assert_eq!(merged.amount(), dec!(90.99));
        assert_eq!(merged.date(), date(10));
        assert_eq!(merged.kind(), Some("POS"));
        assert_eq!(
            merged.description(),
            "Several items (£20.22, £30.33, £40.44)"
        );
        assert_eq!(
            merged.details(),
            &Details::CardLedger {
                reconciled_amount: None
            }
        );
        assert_eq!(merged.matched_with(), Some(third_party.at(0).unwrap().id()));
        assert_eq!(owned.at(0).unwrap().description(), "ledger 0");
        check_links(&third_party, &owned).unwrap();
    }

    #[test]
    fn merged_record_takes_lowest_position() {
        let mut third_party = statement(&[dec!(3)]);
        let mut owned = ledger(&[dec!(1), dec!(100), dec!(2), dec!(200)]);
        let rfm = candidates_for(0, &third_party, &owned);

        match_specified(
            &rfm,
            0,
            &mut third_party,
            &mut owned,
            &MergeTemplate::default(),
        )
        .unwrap();

        let descriptions: Vec<_> = owned.iter().map(Record::description).collect();
        assert_eq!(
            descriptions,
            ["Several items (£1.00, £2.00)", "ledger 1", "ledger 3"]
        );
    }

    #[test]
    fn undo_restores_owned_records() {
        let mut third_party = statement(&[dec!(90.99)]);
        let mut owned = ledger(&[dec!(5.00), dec!(20.22), dec!(30.33), dec!(40.44), dec!(1)]);
        let (before_third_party, before_owned) = (third_party.clone(), owned.clone());
        let rfm = candidates_for(0, &third_party, &owned);

        let applied = match_specified(
            &rfm,
            0,
            &mut third_party,
            &mut owned,
            &MergeTemplate::default(),
        )
        .unwrap();
        undo_match(applied, &mut third_party, &mut owned).unwrap();

        assert_eq!(owned.records(), before_owned.records());
        assert_eq!(third_party.records(), before_third_party.records());
        for record in before_owned.iter() {
            assert_eq!(owned.position(record.id()), before_owned.position(record.id()));
        }
    }

    #[test]
    fn undo_single_clears_both_links() {
        let mut third_party = statement(&[dec!(34.56)]);
        let mut owned = ledger(&[dec!(34.56)]);
        let rfm = candidates_for(0, &third_party, &owned);

        let applied = match_specified(
            &rfm,
            0,
            &mut third_party,
            &mut owned,
            &MergeTemplate::default(),
        )
        .unwrap();
        undo_match(applied, &mut third_party, &mut owned).unwrap();

        assert!(!third_party.at(0).unwrap().is_matched());
        assert!(!owned.at(0).unwrap().is_matched());
    }

    #[test]
    fn out_of_range_selection_changes_nothing() {
        let mut third_party = statement(&[dec!(34.56)]);
        let mut owned = ledger(&[dec!(34.56)]);
        let rfm = candidates_for(0, &third_party, &owned);

        let error = match_specified(
            &rfm,
            3,
            &mut third_party,
            &mut owned,
            &MergeTemplate::default(),
        )
        .unwrap_err();

        assert_eq!(
            error,
            ReconcileError::InvalidSelection {
                index: 3,
                available: 1
            }
        );
        assert!(!third_party.at(0).unwrap().is_matched());
        assert!(!owned.at(0).unwrap().is_matched());
    }

    #[test]
    fn stale_candidate_is_rejected() {
        let mut third_party = statement(&[dec!(5), dec!(5)]);
        let mut owned = ledger(&[dec!(5)]);
        let first = candidates_for(0, &third_party, &owned);
        let second = candidates_for(1, &third_party, &owned);
        let template = MergeTemplate::default();

        match_specified(&first, 0, &mut third_party, &mut owned, &template).unwrap();
        let error =
            match_specified(&second, 0, &mut third_party, &mut owned, &template).unwrap_err();

        assert!(matches!(error, ReconcileError::ConsistencyViolation(_)));
        assert!(!third_party.at(1).unwrap().is_matched());
    }

    #[test]
    fn one_sided_link_is_detected() {
        let third_party = statement(&[dec!(1)]);
        let mut owned = ledger(&[dec!(1)]);
        let source = third_party.at(0).unwrap().id();
        let target = owned.at(0).unwrap().id();
        owned.get_mut(target).unwrap().link(source);

        assert!(matches!(
            check_links(&third_party, &owned),
            Err(ReconcileError::ConsistencyViolation(_))
        ));
    }

    #[test]
    fn describe_uses_template() {
        let template = MergeTemplate {
            label: "Bundle".to_owned(),
            currency_symbol: "$".to_owned(),
        };
        assert_eq!(
            template.describe([dec!(1), dec!(-2.5)]),
            "Bundle ($1.00, -$2.50)"
        );
    }
}
