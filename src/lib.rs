// Archive Budget Pipeline - Core Library
// Raw budget rows → normalized, classified, aggregated snapshots for querying

pub mod error;
pub mod record;
pub mod normalizer;     // Amount parsing (fixed-point hundredths)
pub mod classifier;     // Ordered first-match project-type rules
pub mod config;
pub mod hierarchy;      // Institution table + cycle-guarded root walk
pub mod ingest;
pub mod quality;
pub mod aggregate;
pub mod pipeline;
pub mod snapshot;       // Versioned snapshots, atomic swap
pub mod query;
pub mod logging;

// Re-export commonly used types
pub use error::{
    AmountError, ConfigError, PipelineError, PipelineResult, RejectReason,
};
pub use record::{
    BudgetRecord, BudgetScale, CandidateRecord, DataQualityFlag,
    InstitutionType, ProjectType, Region, RegionSet, ScaleThresholds,
};
pub use normalizer::{normalize, normalize_flagged, parse_signed, Amount};
pub use classifier::{
    Classification, ClassificationRule, ProjectClassifier, SubtypeRule,
};
pub use config::PipelineConfig;
pub use hierarchy::{
    HierarchyBuilder, HierarchyTable, InstitutionEntry, InstitutionKeyword,
    InstitutionNode, InstitutionTyper, KeywordMatch, Resolution,
};
pub use ingest::{
    ingest_reader, ingest_rows, load_institutions, load_rows, read_institutions,
    Ingested, RawRow, Rejection,
};
pub use quality::{QualityIssue, QualityReport, Severity};
pub use aggregate::{
    aggregate, aggregate_indices, aggregate_partitioned,
    AggregateBucket, Dimension, Grouping, PartialGrouping, Summary,
};
pub use pipeline::{default_groupings, Pipeline, PipelineOutput};
pub use snapshot::{Snapshot, SnapshotStore};
pub use query::{AmountRange, Filter, QueryFacade};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
