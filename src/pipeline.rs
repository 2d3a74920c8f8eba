// 🔄 Pipeline - ingest → normalize → classify → resolve → aggregate
//
// One synchronous batch pass over an in-memory dataset. The output is a
// complete, immutable build that the snapshot store can publish in one swap.

use crate::aggregate::{aggregate, Dimension, Grouping};
use crate::classifier::ProjectClassifier;
use crate::config::PipelineConfig;
use crate::error::{ConfigError, PipelineResult, RejectReason};
use crate::hierarchy::{HierarchyBuilder, HierarchyTable, InstitutionEntry};
use crate::ingest::{accept, read_rows, Ingested, RawRow};
use crate::normalizer::normalize_flagged;
use crate::quality::QualityReport;
use crate::record::{BudgetRecord, BudgetScale, CandidateRecord, DataQualityFlag, RegionSet, ScaleThresholds};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::io::Read;
use std::thread;
use tracing::info;

/// Groupings built for every snapshot unless configured otherwise
pub fn default_groupings() -> Vec<Vec<Dimension>> {
    vec![
        vec![Dimension::Region],
        vec![Dimension::ProjectType],
        vec![Dimension::InstitutionType],
        vec![Dimension::BudgetScale],
        vec![Dimension::Region, Dimension::ProjectType],
        vec![Dimension::ProjectType, Dimension::ProjectSubtype],
    ]
}

// ============================================================================
// PIPELINE OUTPUT
// ============================================================================

/// Everything one run produces; becomes a `Snapshot` when published
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    /// SHA-256 over input rows, institution list and configuration
    pub token: String,
    pub records: Vec<BudgetRecord>,
    pub groupings: BTreeMap<Vec<Dimension>, Grouping>,
    pub quality: QualityReport,
    pub hierarchy: HierarchyTable,
    /// Region set the rows were validated against
    pub regions: RegionSet,
}

// ============================================================================
// PIPELINE
// ============================================================================

#[derive(Debug, Clone)]
pub struct Pipeline {
    config: PipelineConfig,
    classifier: ProjectClassifier,
    regions: RegionSet,
    groupings: Vec<Vec<Dimension>>,
    workers: usize,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        Ok(Pipeline {
            classifier: config.classifier(),
            regions: config.region_set(),
            config,
            groupings: default_groupings(),
            workers: 1,
        })
    }

    /// Dimension combinations to pre-compute
    pub fn with_groupings(mut self, groupings: Vec<Vec<Dimension>>) -> Self {
        self.groupings = groupings;
        self
    }

    /// Worker threads for normalization and classification
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn classifier(&self) -> &ProjectClassifier {
        &self.classifier
    }

    pub fn regions(&self) -> &RegionSet {
        &self.regions
    }

    /// Run over rows already in memory
    pub fn run(&self, rows: &[RawRow], institutions: &[InstitutionEntry]) -> PipelineOutput {
        let lines: Vec<(usize, Result<RawRow, RejectReason>)> = rows
            .iter()
            .enumerate()
            .map(|(idx, row)| (idx + 2, Ok(row.clone())))
            .collect();

        self.run_lines(lines, institutions)
    }

    /// Run over a CSV table. Fails only when the table cannot be read at all.
    pub fn run_csv<R: Read>(&self, reader: R, institutions: &[InstitutionEntry]) -> PipelineResult<PipelineOutput> {
        let lines = read_rows(reader)?;
        Ok(self.run_lines(lines, institutions))
    }

    fn run_lines(
        &self,
        lines: Vec<(usize, Result<RawRow, RejectReason>)>,
        institutions: &[InstitutionEntry],
    ) -> PipelineOutput {
        let token = self.fingerprint(&lines, institutions);
        let total_rows = lines.len();

        // 1. Ingest
        let mut ingested = Ingested::default();
        for (line, row) in lines {
            accept(&mut ingested, row.and_then(|r| r.validate(line, &self.regions)), line);
        }

        // 2. Hierarchy table: external list first, then whatever the rows add
        let mut builder = HierarchyBuilder::new(self.config.institution_typer());
        builder.extend(institutions.iter().cloned());
        builder.extend(ingested.candidates.iter().map(|c| InstitutionEntry {
            name: c.institution_name.clone(),
            region: Some(c.region.clone()),
            parent: c.parent_institution.clone(),
            institution_type: None,
        }));
        let hierarchy = builder.build();

        // 3. Normalize, classify and resolve each record independently
        let (records, unresolved) = self.complete_all(&ingested.candidates, &hierarchy);

        // 4. Aggregate
        let groupings: BTreeMap<Vec<Dimension>, Grouping> = self
            .groupings
            .iter()
            .map(|dims| (dims.clone(), aggregate(&records, dims)))
            .collect();

        let mut quality = QualityReport::from_records(total_rows, ingested.rejected, &records);
        for parent in &unresolved {
            quality.note_unresolved_parent(parent);
        }

        info!(
            records = records.len(),
            rejected = quality.rejected_count(),
            institutions = hierarchy.count(),
            groupings = groupings.len(),
            "Pipeline run complete: {}",
            quality.summary()
        );

        PipelineOutput {
            token,
            records,
            groupings,
            quality,
            hierarchy,
            regions: self.regions.clone(),
        }
    }

    fn complete_all(
        &self,
        candidates: &[CandidateRecord],
        hierarchy: &HierarchyTable,
    ) -> (Vec<BudgetRecord>, Vec<String>) {
        let scale = self.config.budget_scale;
        let complete_chunk = |chunk: &[CandidateRecord]| -> Vec<(BudgetRecord, Option<String>)> {
            chunk
                .iter()
                .map(|c| complete(c, &self.classifier, hierarchy, &scale))
                .collect()
        };

        let completed: Vec<(BudgetRecord, Option<String>)> = if self.workers <= 1 || candidates.len() < 2 {
            complete_chunk(candidates)
        } else {
            let chunk_size = candidates.len().div_ceil(self.workers);
            thread::scope(|scope| {
                let handles: Vec<_> = candidates
                    .chunks(chunk_size)
                    .map(|chunk| scope.spawn(move || complete_chunk(chunk)))
                    .collect();

                handles
                    .into_iter()
                    .flat_map(|h| h.join().unwrap_or_else(|e| std::panic::resume_unwind(e)))
                    .collect()
            })
        };

        let mut unresolved = Vec::new();
        let records = completed
            .into_iter()
            .map(|(record, missing_parent)| {
                if let Some(parent) = missing_parent {
                    unresolved.push(parent);
                }
                record
            })
            .collect();

        (records, unresolved)
    }

    fn fingerprint(&self, lines: &[(usize, Result<RawRow, RejectReason>)], institutions: &[InstitutionEntry]) -> String {
        #[derive(Serialize)]
        struct Input<'a> {
            rows: Vec<(usize, Option<&'a RawRow>, Option<&'a RejectReason>)>,
            institutions: &'a [InstitutionEntry],
            config: String,
        }

        let input = Input {
            rows: lines
                .iter()
                .map(|(line, row)| (*line, row.as_ref().ok(), row.as_ref().err()))
                .collect(),
            institutions,
            config: self.config.fingerprint(),
        };

        let mut hasher = Sha256::new();
        match serde_json::to_vec(&input) {
            Ok(bytes) => hasher.update(bytes),
            Err(_) => hasher.update(format!("{:?}", lines)),
        }
        format!("{:x}", hasher.finalize())
    }
}

/// Candidate → finished record. Pure in its inputs, so records can be
/// completed in any order.
fn complete(
    candidate: &CandidateRecord,
    classifier: &ProjectClassifier,
    hierarchy: &HierarchyTable,
    scale: &ScaleThresholds,
) -> (BudgetRecord, Option<String>) {
    let mut flags = Vec::new();

    let (amount, amount_flag) = normalize_flagged(&candidate.raw_amount);
    flags.extend(amount_flag);

    let classification = classifier.classify_full(&candidate.project_title, &candidate.description);

    let resolution = hierarchy.resolve(&candidate.institution_name);
    if resolution.unresolved_parent.is_some() {
        flags.push(DataQualityFlag::UnresolvedParent);
    }
    if resolution.cyclic {
        flags.push(DataQualityFlag::CyclicHierarchy);
    }

    let record = BudgetRecord {
        line: candidate.line,
        institution_name: candidate.institution_name.clone(),
        region: candidate.region.clone(),
        parent_institution: candidate.parent_institution.clone(),
        raw_amount: candidate.raw_amount.clone(),
        amount,
        project_title: candidate.project_title.clone(),
        description: candidate.description.clone(),
        project_type: classification.project_type,
        project_subtype: classification.subtype,
        institution_type: hierarchy.institution_type(&candidate.institution_name),
        root_institution: resolution.root,
        budget_scale: match amount_flag {
            Some(DataQualityFlag::MalformedAmount) => BudgetScale::Unknown,
            _ => scale.scale_of(amount),
        },
        data_quality_flags: flags,
    };

    (record, resolution.unresolved_parent)
}

// ============================================================================
// TESTS
// ============================================================================
