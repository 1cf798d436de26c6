//! Finding owned records whose amounts add up to a statement line.

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::Decimal;
use crate::dataset::Dataset;
use crate::record::{Record, RecordId};

/// Order in which candidates are presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RankingPolicy {
    /// Single records before pairs before triples, then by date distance.
    #[default]
    FewestRecordsFirst,
    /// Nearest date first, then by number of records.
    ClosestDateFirst,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchSettings {
    /// Largest number of owned records combined into one candidate.
    pub max_group_size: usize,
    pub ranking: RankingPolicy,
    /// Upper bound on visited search nodes per source record.
    pub max_search_nodes: usize,
}

impl Default for MatchSettings {
    fn default() -> Self {
        MatchSettings {
            max_group_size: 3,
            ranking: RankingPolicy::default(),
            max_search_nodes: 250_000,
        }
    }
}

/// A group of owned records whose amounts sum exactly to a source amount.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PotentialMatch {
    members: Vec<RecordId>,
    positions: Vec<usize>,
    total: Decimal,
    date_distance: u64,
}

impl PotentialMatch {
    /// Member ids in dataset order.
    pub fn members(&self) -> &[RecordId] {
        &self.members
    }

    pub fn positions(&self) -> &[usize] {
        &self.positions
    }

    pub fn total(&self) -> Decimal {
        self.total
    }

    /// Largest distance in days between the source and any member.
    pub fn date_distance(&self) -> u64 {
        self.date_distance
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_single(&self) -> bool {
        self.members.len() == 1
    }
}

/// A source record together with its ranked candidates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordForMatching {
    source: RecordId,
    candidates: Vec<PotentialMatch>,
}

impl RecordForMatching {
    pub fn new(source: RecordId, candidates: Vec<PotentialMatch>) -> Self {
        RecordForMatching { source, candidates }
    }

    pub fn source(&self) -> RecordId {
        self.source
    }

    pub fn candidates(&self) -> &[PotentialMatch] {
        &self.candidates
    }

    pub fn has_candidates(&self) -> bool {
        !self.candidates.is_empty()
    }
}

struct Search<'a> {
    pool: &'a [(usize, &'a Record)],
    by_amount: HashMap<Decimal, Vec<usize>>,
    max_nodes: usize,
    nodes: usize,
    found: Vec<Vec<usize>>,
}

impl Search<'_> {
    fn capped(&self) -> bool {
        self.nodes >= self.max_nodes
    }

    /// Extends `prefix` (ascending pool indices, all below `start`) to every
    /// exact group of exactly `size` members whose remaining members are at
    /// or after `start`.
    fn visit(&mut self, prefix: &mut Vec<usize>, start: usize, remaining: Decimal, size: usize) {
        if self.capped() {
            return;
        }
        self.nodes += 1;

        if prefix.len() + 1 == size {
            if let Some(indices) = self.by_amount.get(&remaining.normalize()) {
                for &last in indices.iter().filter(|&&index| index >= start) {
                    let mut group = prefix.clone();
                    group.push(last);
                    self.found.push(group);
                }
            }
            return;
        }
        for next in start..self.pool.len() {
            if self.capped() {
                return;
            }
            prefix.push(next);
            let amount = self.pool[next].1.amount();
            self.visit(prefix, next + 1, remaining - amount, size);
            prefix.pop();
        }
    }
}

/// Every group of available owned records, up to `max_group_size` members,
/// whose amounts sum exactly to the source amount, ranked by `settings`.
///
/// Matched records and dividers never take part. An empty result means no
/// exact combination exists.
pub fn generate(source: &Record, pool: &Dataset, settings: &MatchSettings) -> Vec<PotentialMatch> {
    let available: Vec<(usize, &Record)> = pool.available().collect();
    let mut by_amount: HashMap<Decimal, Vec<usize>> = HashMap::new();
    for (index, (_, record)) in available.iter().enumerate() {
        by_amount
            .entry(record.amount().normalize())
            .or_default()
            .push(index);
    }

    let mut search = Search {
        pool: &available,
        by_amount,
        max_nodes: settings.max_search_nodes,
        nodes: 0,
        found: Vec::new(),
    };
    // every smaller group is found before the cap can cut into a larger size
    for size in 1..=settings.max_group_size {
        search.visit(&mut Vec::new(), 0, source.amount(), size);
    }
    if search.capped() {
        tracing::warn!(
            source = %source.id(),
            nodes = search.nodes,
            "candidate search stopped early, some combinations were not considered"
        );
    }

    let mut candidates: Vec<PotentialMatch> = search
        .found
        .into_iter()
        .map(|group| {
            let members: Vec<&Record> = group.iter().map(|&index| available[index].1).collect();
            PotentialMatch {
                members: members.iter().map(|record| record.id()).collect(),
                positions: group.iter().map(|&index| available[index].0).collect(),
                total: members.iter().map(|record| record.amount()).sum(),
                date_distance: members
                    .iter()
                    .map(|record| (record.date() - source.date()).num_days().unsigned_abs())
                    .max()
                    .unwrap_or_default(),
            }
        })
        .collect();
    candidates.sort_by(|a, b| compare(settings.ranking, a, b));

    tracing::debug!(
        source = %source.id(),
        pool = available.len(),
        candidates = candidates.len(),
        "generated candidates"
    );
    candidates
}

fn compare(ranking: RankingPolicy, a: &PotentialMatch, b: &PotentialMatch) -> Ordering {
    let by_size = a.len().cmp(&b.len());
    let by_distance = a.date_distance.cmp(&b.date_distance);
    let primary = match ranking {
        RankingPolicy::FewestRecordsFirst => by_size.then(by_distance),
        RankingPolicy::ClosestDateFirst => by_distance.then(by_size),
    };
    primary.then_with(|| a.positions.cmp(&b.positions))
}
