//! Pairing statement lines with owned records, one source record at a time.

pub mod candidates;
pub mod matching;

use crate::dataset::Dataset;
use crate::error::ReconcileError;
use crate::record::{Record, RecordId};
use candidates::{MatchSettings, RecordForMatching, generate};
use matching::{AppliedMatch, MergeTemplate, check_links, match_specified, undo_match};

/// What the user decided for the record being presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Accept the candidate at this index.
    Confirm(usize),
    Skip,
    /// Reverse the most recent confirm.
    Undo,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Summary {
    pub third_party_matched: usize,
    pub third_party_unmatched: usize,
    pub owned_matched: usize,
    pub owned_unmatched: usize,
    /// Merged records created for many-to-one matches.
    pub synthetic: usize,
}

/// Drives a reconciliation between a third-party statement and owned records.
///
/// The cursor is a position in the third-party dataset. That dataset never
/// changes shape during a session, only its links do, so positions stay valid.
#[derive(Debug)]
pub struct Reconciliator {
    third_party: Dataset,
    owned: Dataset,
    settings: MatchSettings,
    template: MergeTemplate,
    cursor: usize,
    current: Option<RecordForMatching>,
    last_match: Option<AppliedMatch>,
}

impl Reconciliator {
    pub fn new(third_party: Dataset, owned: Dataset) -> Self {
        Reconciliator {
            third_party,
            owned,
            settings: MatchSettings::default(),
            template: MergeTemplate::default(),
            cursor: 0,
            current: None,
            last_match: None,
        }
    }

    pub fn with_settings(mut self, settings: MatchSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_template(mut self, template: MergeTemplate) -> Self {
        self.template = template;
        self
    }

    pub fn third_party(&self) -> &Dataset {
        &self.third_party
    }

    pub fn owned(&self) -> &Dataset {
        &self.owned
    }

    /// The record being presented and its candidates, if any.
    pub fn current(&self) -> Option<&RecordForMatching> {
        self.current.as_ref()
    }

    /// The third-party record being presented.
    pub fn current_source(&self) -> Option<&Record> {
        self.current
            .as_ref()
            .and_then(|rfm| self.third_party.get(rfm.source()))
    }

    pub fn can_undo(&self) -> bool {
        self.last_match.is_some()
    }

    /// Moves to the next unmatched third-party record at or after the cursor
    /// and generates its candidates.
    pub fn prepare_next(&mut self) -> Option<&RecordForMatching> {
        let next = self
            .third_party
            .available()
            .find(|(position, _)| *position >= self.cursor);
        let Some((position, source)) = next else {
            self.cursor = self.third_party.len();
            self.current = None;
            return None;
        };
        let candidates = generate(source, &self.owned, &self.settings);
        tracing::debug!(
            source = %source.id(),
            position,
            candidates = candidates.len(),
            "presenting"
        );
        self.current = Some(RecordForMatching::new(source.id(), candidates));
        self.cursor = position;
        self.current.as_ref()
    }

    pub fn apply(&mut self, decision: Decision) -> Result<(), ReconcileError> {
        tracing::debug!(?decision, "applying decision");
        match decision {
            Decision::Confirm(index) => {
                let rfm = self
                    .current
                    .as_ref()
                    .ok_or_else(|| ReconcileError::consistency("no record is being presented"))?;
                let applied = match_specified(
                    rfm,
                    index,
                    &mut self.third_party,
                    &mut self.owned,
                    &self.template,
                )?;
                self.move_past(applied.source());
                self.last_match = Some(applied);
            }
            Decision::Skip => {
                let rfm = self
                    .current
                    .as_ref()
                    .ok_or_else(|| ReconcileError::consistency("no record is being presented"))?;
                let source = rfm.source();
                self.move_past(source);
            }
            Decision::Undo => {
                let applied = self
                    .last_match
                    .take()
                    .ok_or_else(|| ReconcileError::consistency("there is no match to undo"))?;
                let source = applied.source();
                undo_match(applied, &mut self.third_party, &mut self.owned)?;
                self.cursor = self.third_party.position(source).unwrap_or(self.cursor);
                self.current = None;
            }
        }
        Ok(())
    }

    fn move_past(&mut self, source: RecordId) {
        if let Some(position) = self.third_party.position(source) {
            self.cursor = position + 1;
        }
        self.current = None;
    }

    /// Confirms every source whose only candidate is one owned record dated
    /// the same day. Returns the number of matches made.
    ///
    /// Leaves nothing to undo and rewinds the cursor to the start.
    pub fn auto_match(&mut self) -> Result<usize, ReconcileError> {
        let mut matched = 0;
        for position in 0..self.third_party.len() {
            let Some(source) = self.third_party.at(position) else {
                continue;
            };
            if !source.is_available() {
                continue;
            }
            let candidates = generate(source, &self.owned, &self.settings);
            let obvious = matches!(
                candidates.as_slice(),
                [only] if only.is_single() && only.date_distance() == 0
            );
            if !obvious {
                continue;
            }
            let rfm = RecordForMatching::new(source.id(), candidates);
            match_specified(
                &rfm,
                0,
                &mut self.third_party,
                &mut self.owned,
                &self.template,
            )?;
            matched += 1;
        }
        tracing::info!(matched, "auto-matched same-day records");

        self.cursor = 0;
        self.current = None;
        self.last_match = None;
        Ok(matched)
    }

    /// Candidates for every unmatched third-party record, without changing
    /// anything.
    pub fn preview(&self) -> Vec<RecordForMatching> {
        self.third_party
            .available()
            .map(|(_, source)| {
                RecordForMatching::new(
                    source.id(),
                    generate(source, &self.owned, &self.settings),
                )
            })
            .collect()
    }

    pub fn is_done(&self) -> bool {
        self.current.is_none()
            && self
                .third_party
                .available()
                .all(|(position, _)| position < self.cursor)
    }

    pub fn summary(&self) -> Summary {
        let mut summary = Summary::default();
        for record in self.third_party.iter().filter(|record| !record.is_divider()) {
            if record.is_matched() {
                summary.third_party_matched += 1;
            } else {
                summary.third_party_unmatched += 1;
            }
        }
        for record in self.owned.iter().filter(|record| !record.is_divider()) {
            if record.is_matched() {
                summary.owned_matched += 1;
            } else {
                summary.owned_unmatched += 1;
            }
            if record.is_synthetic() {
                summary.synthetic += 1;
            }
        }
        summary
    }

    /// Ends the session, checking that every link is mutual.
    pub fn finish(self) -> Result<Reconciled, ReconcileError> {
        check_links(&self.third_party, &self.owned)?;
        Ok(Reconciled {
            third_party: self.third_party,
            owned: self.owned,
        })
    }
}

/// Outcome of a session, possibly a partial one.
#[derive(Debug, Clone)]
pub struct Reconciled {
    third_party: Dataset,
    owned: Dataset,
}

impl Reconciled {
    pub fn third_party(&self) -> &Dataset {
        &self.third_party
    }

    pub fn owned(&self) -> &Dataset {
        &self.owned
    }

    /// Matched `(third party, owned)` pairs in statement order.
    pub fn matched_pairs(&self) -> Vec<(&Record, &Record)> {
        self.third_party
            .iter()
            .filter_map(|record| {
                let owned = self.owned.get(record.matched_with()?)?;
                Some((record, owned))
            })
            .collect()
    }

    /// Owned records left without a match.
    pub fn unmatched_owned(&self) -> impl Iterator<Item = &Record> {
        self.owned.available().map(|(_, record)| record)
    }

    pub fn unmatched_third_party(&self) -> impl Iterator<Item = &Record> {
        self.third_party.available().map(|(_, record)| record)
    }

    pub fn into_datasets(self) -> (Dataset, Dataset) {
        (self.third_party, self.owned)
    }
}
