// 📊 Aggregator - records grouped along any combination of dimensions
//
// Conservation: for every grouping, Σ bucket.sum_amount == Σ record.amount and
// Σ bucket.count == number of records. Sentinel values (UNCLASSIFIED, other)
// are ordinary keys, so nothing is dropped.

use crate::normalizer::Amount;
use crate::record::BudgetRecord;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::thread;

/// Key value used when a record has no subtype
pub const NO_SUBTYPE: &str = "UNCLASSIFIED";

// ============================================================================
// DIMENSION
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Region,
    ProjectType,
    ProjectSubtype,
    InstitutionType,
    Institution,
    RootInstitution,
    BudgetScale,
}

impl Dimension {
    pub const ALL: [Dimension; 7] = [
        Dimension::Region,
        Dimension::ProjectType,
        Dimension::ProjectSubtype,
        Dimension::InstitutionType,
        Dimension::Institution,
        Dimension::RootInstitution,
        Dimension::BudgetScale,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Dimension::Region => "region",
            Dimension::ProjectType => "project_type",
            Dimension::ProjectSubtype => "project_subtype",
            Dimension::InstitutionType => "institution_type",
            Dimension::Institution => "institution",
            Dimension::RootInstitution => "root_institution",
            Dimension::BudgetScale => "budget_scale",
        }
    }

    /// This record's value along the dimension
    pub fn value_of(&self, record: &BudgetRecord) -> String {
        match self {
            Dimension::Region => record.region.as_str().to_string(),
            Dimension::ProjectType => record.project_type.code().to_string(),
            Dimension::ProjectSubtype => record
                .project_subtype
                .clone()
                .unwrap_or_else(|| NO_SUBTYPE.to_string()),
            Dimension::InstitutionType => record.institution_type.as_str().to_string(),
            Dimension::Institution => record.institution_name.clone(),
            Dimension::RootInstitution => record.root_institution.clone(),
            Dimension::BudgetScale => record.budget_scale.as_str().to_string(),
        }
    }

    /// Parse a comma-separated list such as "region,project_type"
    pub fn parse_list(list: &str) -> Result<Vec<Dimension>, String> {
        list.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::parse)
            .collect()
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Dimension {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        Dimension::ALL
            .iter()
            .copied()
            .find(|d| d.as_str().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| format!("unknown dimension '{}'", trimmed))
    }
}

// ============================================================================
// BUCKETS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateBucket {
    /// One value per grouping dimension, in dimension order
    pub key: Vec<String>,
    pub sum_amount: Amount,
    pub count: usize,
    /// Indices into the record set the bucket was computed from
    pub records: Vec<usize>,
}

#[derive(Debug, Clone, Default)]
struct Accumulator {
    sum_amount: Amount,
    count: usize,
    records: Vec<usize>,
}

impl Accumulator {
    fn add(&mut self, idx: usize, amount: Amount) {
        self.sum_amount = self.sum_amount + amount;
        self.count += 1;
        self.records.push(idx);
    }

    fn merge(&mut self, other: Accumulator) {
        self.sum_amount = self.sum_amount + other.sum_amount;
        self.count += other.count;
        self.records.extend(other.records);
    }
}

/// All buckets for one dimension combination, ordered by key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grouping {
    pub dimensions: Vec<Dimension>,
    pub buckets: Vec<AggregateBucket>,
}

impl Grouping {
    pub fn total_amount(&self) -> Amount {
        self.buckets.iter().map(|b| b.sum_amount).sum()
    }

    pub fn total_count(&self) -> usize {
        self.buckets.iter().map(|b| b.count).sum()
    }

    pub fn get(&self, key: &[&str]) -> Option<&AggregateBucket> {
        self.buckets
            .iter()
            .find(|bucket| bucket.key.len() == key.len() && bucket.key.iter().zip(key).all(|(k, v)| k.as_str() == *v))
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Buckets sorted by amount, largest first; key order breaks ties
    pub fn ranked(&self) -> Vec<&AggregateBucket> {
        let mut ranked: Vec<&AggregateBucket> = self.buckets.iter().collect();
        ranked.sort_by(|a, b| b.sum_amount.cmp(&a.sum_amount).then_with(|| a.key.cmp(&b.key)));
        ranked
    }
}

// ============================================================================
// PARTIAL GROUPING (mergeable)
// ============================================================================

/// Per-partition result. `merge` is commutative and associative, so
/// partitions can be combined in any order.
#[derive(Debug, Clone, Default)]
pub struct PartialGrouping {
    buckets: BTreeMap<Vec<String>, Accumulator>,
}

impl PartialGrouping {
    pub fn add(&mut self, dimensions: &[Dimension], idx: usize, record: &BudgetRecord) {
        let key: Vec<String> = dimensions.iter().map(|d| d.value_of(record)).collect();
        self.buckets.entry(key).or_default().add(idx, record.amount);
    }

    pub fn merge(mut self, other: PartialGrouping) -> PartialGrouping {
        for (key, acc) in other.buckets {
            self.buckets.entry(key).or_default().merge(acc);
        }
        self
    }

    pub fn finish(self, dimensions: &[Dimension]) -> Grouping {
        let buckets = self
            .buckets
            .into_iter()
            .map(|(key, mut acc)| {
                acc.records.sort_unstable();
                AggregateBucket {
                    key,
                    sum_amount: acc.sum_amount,
                    count: acc.count,
                    records: acc.records,
                }
            })
            .collect();

        Grouping {
            dimensions: dimensions.to_vec(),
            buckets,
        }
    }
}

// ============================================================================
// AGGREGATION
// ============================================================================

/// Group every record
pub fn aggregate(records: &[BudgetRecord], dimensions: &[Dimension]) -> Grouping {
    aggregate_indices(records, 0..records.len(), dimensions)
}

/// Group a subset of records, given by index
pub fn aggregate_indices<I>(records: &[BudgetRecord], indices: I, dimensions: &[Dimension]) -> Grouping
where
    I: IntoIterator<Item = usize>,
{
    let mut partial = PartialGrouping::default();
    for idx in indices {
        if let Some(record) = records.get(idx) {
            partial.add(dimensions, idx, record);
        }
    }
    partial.finish(dimensions)
}

/// Same result as `aggregate`, computed over `partitions` scoped threads
pub fn aggregate_partitioned(records: &[BudgetRecord], dimensions: &[Dimension], partitions: usize) -> Grouping {
    let partitions = partitions.max(1);
    if records.is_empty() || partitions == 1 {
        return aggregate(records, dimensions);
    }

    let chunk_size = records.len().div_ceil(partitions);
    let partials: Vec<PartialGrouping> = thread::scope(|scope| {
        let handles: Vec<_> = records
            .chunks(chunk_size)
            .enumerate()
            .map(|(chunk_idx, chunk)| {
                scope.spawn(move || {
                    let offset = chunk_idx * chunk_size;
                    let mut partial = PartialGrouping::default();
                    for (i, record) in chunk.iter().enumerate() {
                        partial.add(dimensions, offset + i, record);
                    }
                    partial
                })
            })
            .collect();

        handles
            .into_iter()
            .map(|h| h.join().unwrap_or_else(|e| std::panic::resume_unwind(e)))
            .collect()
    });

    partials
        .into_iter()
        .fold(PartialGrouping::default(), PartialGrouping::merge)
        .finish(dimensions)
}

// ============================================================================
// SUMMARY
// ============================================================================

/// Headline figures for a record sequence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub count: usize,
    pub total_amount: Amount,
    /// Mean over records with a readable amount
    pub mean_amount: Amount,
    pub max_amount: Amount,
    /// Records whose amount could not be read
    pub unpriced_count: usize,
    pub institution_count: usize,
}

impl Summary {
    pub fn of<'a, I>(records: I) -> Summary
    where
        I: IntoIterator<Item = &'a BudgetRecord>,
    {
        let mut count = 0usize;
        let mut unpriced = 0usize;
        let mut total = Amount::ZERO;
        let mut max = Amount::ZERO;
        let mut institutions = std::collections::BTreeSet::new();

        for record in records {
            count += 1;
            institutions.insert(record.institution_name.as_str());
            match record.known_amount() {
                Some(amount) => {
                    total = total + amount;
                    max = max.max(amount);
                }
                None => unpriced += 1,
            }
        }

        let priced = count - unpriced;
        let mean = if priced == 0 {
            Amount::ZERO
        } else {
            Amount::from_hundredths(total.hundredths() / priced as i64)
        };

        Summary {
            count,
            total_amount: total,
            mean_amount: mean,
            max_amount: max,
            unpriced_count: unpriced,
            institution_count: institutions.len(),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
