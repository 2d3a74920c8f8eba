// 📸 Snapshots - immutable generations of the dataset + atomic swap
//
// A reload builds a complete `Snapshot` off to the side, then swaps one `Arc`.
// Readers holding the previous `Arc` keep a fully consistent view until they
// drop it; nobody ever sees a half-built generation.

use crate::aggregate::{aggregate, Dimension, Grouping};
use crate::error::PipelineResult;
use crate::hierarchy::{HierarchyBuilder, HierarchyTable, InstitutionTyper};
use crate::pipeline::PipelineOutput;
use crate::quality::QualityReport;
use crate::record::{BudgetRecord, InstitutionType, RegionSet};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, RwLock};
use tracing::{info, warn};

// ============================================================================
// SNAPSHOT
// ============================================================================

#[derive(Debug)]
pub struct Snapshot {
    /// Unique snapshot ID
    snapshot_id: String,
    /// Monotonic within one store; 0 is the empty initial snapshot
    version: u64,
    /// Fingerprint of the input that produced this generation
    token: String,
    built_at: DateTime<Utc>,
    records: Vec<BudgetRecord>,
    groupings: BTreeMap<Vec<Dimension>, Grouping>,
    quality: QualityReport,
    hierarchy: HierarchyTable,
    regions: RegionSet,
}

impl Snapshot {
    pub fn new(version: u64, output: PipelineOutput) -> Self {
        Snapshot {
            snapshot_id: uuid::Uuid::new_v4().to_string(),
            version,
            token: output.token,
            built_at: Utc::now(),
            records: output.records,
            groupings: output.groupings,
            quality: output.quality,
            hierarchy: output.hierarchy,
            regions: output.regions,
        }
    }

    /// Generation 0: no records, no buckets
    pub fn empty() -> Self {
        let typer = InstitutionTyper::new(Vec::new(), InstitutionType::LocalGovernment);
        Snapshot {
            snapshot_id: uuid::Uuid::new_v4().to_string(),
            version: 0,
            token: String::new(),
            built_at: Utc::now(),
            records: Vec::new(),
            groupings: BTreeMap::new(),
            quality: QualityReport::default(),
            hierarchy: HierarchyBuilder::new(typer).build(),
            regions: RegionSet::new(Vec::<String>::new()),
        }
    }

    pub fn snapshot_id(&self) -> &str {
        &self.snapshot_id
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn built_at(&self) -> DateTime<Utc> {
        self.built_at
    }

    pub fn records(&self) -> &[BudgetRecord] {
        &self.records
    }

    pub fn count(&self) -> usize {
        self.records.len()
    }

    pub fn quality(&self) -> &QualityReport {
        &self.quality
    }

    pub fn hierarchy(&self) -> &HierarchyTable {
        &self.hierarchy
    }

    pub fn regions(&self) -> &RegionSet {
        &self.regions
    }

    /// Pre-computed grouping, if this combination was built with the snapshot
    pub fn grouping(&self, dimensions: &[Dimension]) -> Option<&Grouping> {
        self.groupings.get(dimensions)
    }

    pub fn groupings(&self) -> impl Iterator<Item = &Grouping> {
        self.groupings.values()
    }

    /// Pre-computed grouping, or a fresh one over all records
    pub fn aggregate(&self, dimensions: &[Dimension]) -> Grouping {
        match self.grouping(dimensions) {
            Some(grouping) => grouping.clone(),
            None => aggregate(&self.records, dimensions),
        }
    }
}

// ============================================================================
// SNAPSHOT STORE
// ============================================================================

/// (snapshot id, dimensions). The id is unique per build, so snapshots that
/// share a version number never share entries.
type CacheKey = (String, Vec<Dimension>);

/// Holds the live snapshot plus an explicit, snapshot-keyed aggregate cache
#[derive(Debug)]
pub struct SnapshotStore {
    current: RwLock<Arc<Snapshot>>,
    cache: Mutex<HashMap<CacheKey, Arc<Grouping>>>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        SnapshotStore {
            current: RwLock::new(Arc::new(Snapshot::empty())),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// The live snapshot. Cheap: clones one `Arc`.
    pub fn current(&self) -> Arc<Snapshot> {
        let guard = self.current.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&guard)
    }

    /// Swap in a finished build and drop cache entries of earlier snapshots
    pub fn publish(&self, output: PipelineOutput) -> Arc<Snapshot> {
        let published = {
            let mut guard = self.current.write().unwrap_or_else(|e| e.into_inner());
            let snapshot = Arc::new(Snapshot::new(guard.version + 1, output));
            *guard = Arc::clone(&snapshot);
            snapshot
        };

        self.retain_only(&published.snapshot_id);
        info!(
            version = published.version,
            records = published.count(),
            token = %published.token,
            "Snapshot published"
        );
        published
    }

    /// Build with `build` and publish the result. On failure the previous
    /// snapshot stays live and the error is returned.
    pub fn reload<F>(&self, build: F) -> PipelineResult<Arc<Snapshot>>
    where
        F: FnOnce() -> PipelineResult<PipelineOutput>,
    {
        match build() {
            Ok(output) => Ok(self.publish(output)),
            Err(err) => {
                let live = self.current();
                warn!(
                    version = live.version,
                    error = %err,
                    "Reload failed; previous snapshot stays live"
                );
                Err(err)
            }
        }
    }

    /// Like `reload`, but keeps the live snapshot when the build's token
    /// matches it (same input, same configuration).
    pub fn reload_if_changed<F>(&self, build: F) -> PipelineResult<Arc<Snapshot>>
    where
        F: FnOnce() -> PipelineResult<PipelineOutput>,
    {
        let output = build().map_err(|err| {
            warn!(error = %err, "Reload failed; previous snapshot stays live");
            err
        })?;

        let live = self.current();
        if live.version > 0 && live.token == output.token {
            info!(version = live.version, "Input unchanged; snapshot kept");
            return Ok(live);
        }

        Ok(self.publish(output))
    }

    /// Aggregate against the live snapshot, memoized per (snapshot, dimensions)
    pub fn aggregate(&self, dimensions: &[Dimension]) -> Arc<Grouping> {
        let snapshot = self.current();
        self.aggregate_on(&snapshot, dimensions)
    }

    /// Aggregate against a snapshot a reader is already holding
    pub fn aggregate_on(&self, snapshot: &Snapshot, dimensions: &[Dimension]) -> Arc<Grouping> {
        let key = (snapshot.snapshot_id.clone(), dimensions.to_vec());

        if let Some(hit) = self.lock_cache().get(&key) {
            return Arc::clone(hit);
        }

        // Computed outside the lock; a racing reader may compute the same value
        let grouping = Arc::new(snapshot.aggregate(dimensions));
        self.lock_cache()
            .entry(key)
            .or_insert_with(|| Arc::clone(&grouping))
            .clone()
    }

    /// Drop every cached aggregate
    pub fn invalidate_cache(&self) {
        self.lock_cache().clear();
    }

    pub fn cached_entries(&self) -> usize {
        self.lock_cache().len()
    }

    fn retain_only(&self, snapshot_id: &str) {
        self.lock_cache().retain(|(id, _), _| id == snapshot_id);
    }

    fn lock_cache(&self) -> std::sync::MutexGuard<'_, HashMap<CacheKey, Arc<Grouping>>> {
        self.cache.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// TESTS
// ============================================================================
