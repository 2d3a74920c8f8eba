// 🔎 Query Facade - read-only filtered views over one snapshot
//
// Filtering is conjunctive across dimensions and disjunctive inside one
// multiselect dimension. An empty set or absent range does not restrict.

use crate::aggregate::{aggregate_indices, Dimension, Grouping, Summary};
use crate::normalizer::Amount;
use crate::record::{BudgetRecord, ProjectType, RegionSet};
use crate::snapshot::Snapshot;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

// ============================================================================
// FILTER
// ============================================================================

/// Inclusive amount bounds; either end may be open
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmountRange {
    pub min: Option<Amount>,
    pub max: Option<Amount>,
}

impl AmountRange {
    pub fn between(min: Amount, max: Amount) -> Self {
        AmountRange { min: Some(min), max: Some(max) }
    }

    pub fn at_least(min: Amount) -> Self {
        AmountRange { min: Some(min), max: None }
    }

    pub fn at_most(max: Amount) -> Self {
        AmountRange { min: None, max: Some(max) }
    }

    pub fn contains(&self, amount: Amount) -> bool {
        self.min.map_or(true, |min| amount >= min) && self.max.map_or(true, |max| amount <= max)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    #[serde(default)]
    pub regions: BTreeSet<String>,
    #[serde(default)]
    pub project_types: BTreeSet<ProjectType>,
    #[serde(default)]
    pub amount_range: Option<AmountRange>,
}

impl Filter {
    /// No restriction at all
    pub fn all() -> Self {
        Filter::default()
    }

    pub fn region(mut self, region: impl Into<String>) -> Self {
        self.regions.insert(region.into());
        self
    }

    pub fn project_type(mut self, project_type: ProjectType) -> Self {
        self.project_types.insert(project_type);
        self
    }

    pub fn amount_range(mut self, range: AmountRange) -> Self {
        self.amount_range = Some(range);
        self
    }

    pub fn is_unrestricted(&self) -> bool {
        self.regions.is_empty() && self.project_types.is_empty() && self.amount_range.is_none()
    }

    pub fn matches(&self, record: &BudgetRecord) -> bool {
        if !self.regions.is_empty() && !self.regions.contains(record.region.as_str()) {
            return false;
        }

        if !self.project_types.is_empty() && !self.project_types.contains(&record.project_type) {
            return false;
        }

        // An unreadable amount is in no range
        match &self.amount_range {
            Some(range) => record.known_amount().is_some_and(|amount| range.contains(amount)),
            None => true,
        }
    }

    /// Region names rewritten to the set's canonical names ("서울특별시" →
    /// "서울"). Names the set does not know are kept and match nothing.
    pub fn canonicalized(&self, regions: &RegionSet) -> Filter {
        Filter {
            regions: self
                .regions
                .iter()
                .map(|name| match regions.parse(name) {
                    Some(region) => region.as_str().to_string(),
                    None => name.clone(),
                })
                .collect(),
            ..self.clone()
        }
    }
}

// ============================================================================
// QUERY FACADE
// ============================================================================

/// Borrowing view; any number may be live against one snapshot
#[derive(Debug, Clone, Copy)]
pub struct QueryFacade<'a> {
    snapshot: &'a Snapshot,
}

impl<'a> QueryFacade<'a> {
    pub fn new(snapshot: &'a Snapshot) -> Self {
        QueryFacade { snapshot }
    }

    pub fn snapshot(&self) -> &'a Snapshot {
        self.snapshot
    }

    /// Matching records, in input order
    pub fn filter(&self, filter: &Filter) -> Vec<&'a BudgetRecord> {
        let filter = filter.canonicalized(self.snapshot.regions());
        self.snapshot
            .records()
            .iter()
            .filter(|record| filter.matches(record))
            .collect()
    }

    /// Positions of the matching records inside the snapshot
    pub fn filter_indices(&self, filter: &Filter) -> Vec<usize> {
        let filter = filter.canonicalized(self.snapshot.regions());
        self.snapshot
            .records()
            .iter()
            .enumerate()
            .filter(|(_, record)| filter.matches(record))
            .map(|(idx, _)| idx)
            .collect()
    }

    /// Buckets recomputed over the filtered subset. Bucket record lists point
    /// into the full snapshot.
    pub fn filter_buckets(&self, filter: &Filter, dimensions: &[Dimension]) -> Grouping {
        if filter.is_unrestricted() {
            return self.aggregate(dimensions);
        }
        aggregate_indices(self.snapshot.records(), self.filter_indices(filter), dimensions)
    }

    /// Buckets over the whole snapshot
    pub fn aggregate(&self, dimensions: &[Dimension]) -> Grouping {
        self.snapshot.aggregate(dimensions)
    }

    pub fn summary(&self, filter: &Filter) -> Summary {
        Summary::of(self.filter(filter))
    }

    /// Largest `n` matching records; equal amounts keep input order
    pub fn top_projects(&self, filter: &Filter, n: usize) -> Vec<&'a BudgetRecord> {
        let mut matched = self.filter(filter);
        matched.sort_by(|a, b| b.amount.cmp(&a.amount).then(a.line.cmp(&b.line)));
        matched.truncate(n);
        matched
    }
}

// ============================================================================
// TESTS
// ============================================================================
