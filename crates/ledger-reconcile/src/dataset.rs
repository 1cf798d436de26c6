use std::collections::HashMap;

use crate::record::{Record, RecordId, Side};

/// What to do with a third-party file straight after loading it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadAction {
    #[default]
    None,
    FilterForPositiveRecordsOnly,
    FilterForNegativeRecordsOnly,
    SwapSignsOfAllAmounts,
}

/// An ordered, index-addressable sequence of records for one side.
///
/// Every record receives an id on insertion. The id → position index is
/// rebuilt whenever the sequence changes shape.
#[derive(Debug, Clone)]
pub struct Dataset {
    side: Side,
    records: Vec<Record>,
    positions: HashMap<RecordId, usize>,
    next_id: u32,
}

impl Dataset {
    pub fn new(side: Side) -> Self {
        Dataset {
            side,
            records: Vec::new(),
            positions: HashMap::new(),
            next_id: 1,
        }
    }

    pub fn from_records(side: Side, records: impl IntoIterator<Item = Record>) -> Self {
        let mut dataset = Dataset::new(side);
        for record in records {
            dataset.push(record);
        }
        dataset
    }

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn iter(&self) -> impl Iterator<Item = &Record> {
        self.records.iter()
    }

    pub fn into_records(self) -> Vec<Record> {
        self.records
    }

    pub fn get(&self, id: RecordId) -> Option<&Record> {
        self.position(id).map(|position| &self.records[position])
    }

    pub fn position(&self, id: RecordId) -> Option<usize> {
        self.positions.get(&id).copied()
    }

    pub fn at(&self, position: usize) -> Option<&Record> {
        self.records.get(position)
    }

    /// Records that can still be matched, with their positions.
    pub fn available(&self) -> impl Iterator<Item = (usize, &Record)> {
        self.records
            .iter()
            .enumerate()
            .filter(|(_, record)| record.is_available())
    }

    pub fn push(&mut self, record: Record) -> RecordId {
        let position = self.records.len();
        self.insert(position, record)
    }

    /// Inserts a new record, giving it a fresh id.
    pub fn insert(&mut self, position: usize, mut record: Record) -> RecordId {
        let id = RecordId(self.next_id);
        self.next_id += 1;
        record.set_id(id);
        self.records.insert(position, record);
        self.reindex();
        id
    }

    /// Puts back a record that was removed earlier, keeping its id.
    pub(crate) fn restore(&mut self, position: usize, record: Record) {
        debug_assert!(!self.positions.contains_key(&record.id()));
        self.records.insert(position, record);
        self.reindex();
    }

    pub(crate) fn remove(&mut self, id: RecordId) -> Option<(usize, Record)> {
        let position = self.position(id)?;
        let record = self.records.remove(position);
        self.reindex();
        Some((position, record))
    }

    pub(crate) fn get_mut(&mut self, id: RecordId) -> Option<&mut Record> {
        let position = self.position(id)?;
        self.records.get_mut(position)
    }

    /// Stable sort by date, as statements and ledgers are read in date order.
    pub fn sort_by_date(&mut self) {
        self.records.sort_by_key(Record::date);
        self.reindex();
    }

    pub fn apply(&mut self, action: LoadAction) {
        match action {
            LoadAction::None => return,
            LoadAction::FilterForPositiveRecordsOnly => self
                .records
                .retain(|record| record.is_divider() || record.amount().is_sign_positive()),
            LoadAction::FilterForNegativeRecordsOnly => self
                .records
                .retain(|record| record.is_divider() || record.amount().is_sign_negative()),
            LoadAction::SwapSignsOfAllAmounts => {
                for record in self.records.iter_mut().filter(|record| !record.is_divider()) {
                    record.swap_sign();
                }
            }
        }
        self.reindex();
    }

    /// Regenerates every source line on the next write.
    pub fn clear_source_lines(&mut self) {
        for record in &mut self.records {
            record.clear_source_line();
        }
    }

    fn reindex(&mut self) {
        self.positions.clear();
        self.positions.extend(
            self.records
                .iter()
                .enumerate()
                .map(|(position, record)| (record.id(), position)),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{Details, Variant};
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn record(day: u32, amount: crate::Decimal, description: &str) -> Record {
        Record::new(
            Details::CardStatement,
            NaiveDate::from_ymd_opt(2024, 5, day).unwrap(),
            amount,
            description,
        )
    }

    fn descriptions(dataset: &Dataset) -> Vec<&str> {
        dataset.iter().map(Record::description).collect()
    }

    #[test]
    fn ids_survive_removal_and_restore() {
        let mut dataset = Dataset::from_records(
            Side::ThirdParty,
            [
                record(1, dec!(1), "a"),
                record(2, dec!(2), "b"),
                record(3, dec!(3), "c"),
            ],
        );
        let b = dataset.at(1).unwrap().id();
        let c = dataset.at(2).unwrap().id();

        let (position, removed) = dataset.remove(b).unwrap();
        assert_eq!(position, 1);
        assert_eq!(dataset.position(c), Some(1));
        assert_eq!(dataset.get(b), None);

        dataset.restore(position, removed);
        assert_eq!(descriptions(&dataset), ["a", "b", "c"]);
        assert_eq!(dataset.position(b), Some(1));
        assert_eq!(dataset.position(c), Some(2));
    }

    #[test]
    fn inserted_records_get_fresh_ids() {
        let mut dataset = Dataset::new(Side::Owned);
        let first = dataset.push(record(1, dec!(1), "a"));
        let second = dataset.insert(0, record(2, dec!(2), "b"));
        assert_ne!(first, second);
        assert_eq!(descriptions(&dataset), ["b", "a"]);
        assert_eq!(dataset.get(first).unwrap().id(), first);
    }

    #[test]
    fn sort_by_date_is_stable() {
        let mut dataset = Dataset::from_records(
            Side::ThirdParty,
            [
                record(3, dec!(1), "late"),
                record(1, dec!(2), "early one"),
                record(1, dec!(3), "early two"),
            ],
        );
        dataset.sort_by_date();
        assert_eq!(descriptions(&dataset), ["early one", "early two", "late"]);
    }

    #[test]
    fn load_actions() {
        let records = [
            record(1, dec!(10), "in"),
            record(2, dec!(-4), "out"),
            record(3, dec!(7), "in again"),
        ];

        let mut positive = Dataset::from_records(Side::ThirdParty, records.clone());
        positive.apply(LoadAction::FilterForPositiveRecordsOnly);
        assert_eq!(descriptions(&positive), ["in", "in again"]);

        let mut negative = Dataset::from_records(Side::ThirdParty, records.clone());
        negative.apply(LoadAction::FilterForNegativeRecordsOnly);
        assert_eq!(descriptions(&negative), ["out"]);

        let mut swapped = Dataset::from_records(Side::ThirdParty, records);
        swapped.apply(LoadAction::SwapSignsOfAllAmounts);
        let amounts: Vec<_> = swapped.iter().map(Record::amount).collect();
        assert_eq!(amounts, [dec!(-10), dec!(4), dec!(-7)]);
    }

    #[test]
    fn available_skips_dividers_and_matched() {
        let mut dataset = Dataset::from_records(
            Side::Owned,
            [
                record(1, dec!(1), "a"),
                Record::divider(Variant::CardLedger),
                record(2, dec!(2), "b"),
            ],
        );
        let a = dataset.at(0).unwrap().id();
        dataset.get_mut(a).unwrap().link(RecordId(99));

        let available: Vec<_> = dataset.available().map(|(position, _)| position).collect();
        assert_eq!(available, [2]);
    }
}
