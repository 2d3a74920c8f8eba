// ✅ Data Quality Report - what the pipeline degraded, dropped or repaired
//
// The pipeline never aborts on a bad row; this report is how the caller finds
// out what happened to the rows it handed in.

use crate::error::PipelineError;
use crate::ingest::Rejection;
use crate::record::{BudgetRecord, DataQualityFlag};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Severity {
    Critical, // Row was dropped
    Warning,  // Row kept, value repaired
    Info,     // Row kept as-is, context incomplete
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityIssue {
    pub severity: Severity,
    pub field: String,
    pub issue: String,
    pub recommendation: String,
}

// ============================================================================
// QUALITY REPORT
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    /// Rows handed to the ingester
    pub total_rows: usize,
    /// Rows that became records
    pub accepted_rows: usize,
    pub rejected: Vec<Rejection>,
    /// Flagged record count per flag
    pub flag_counts: BTreeMap<DataQualityFlag, usize>,
    /// Indices (into the snapshot's records) of rows whose amount could not
    /// be parsed; they carry a zero amount
    pub malformed_amounts: Vec<usize>,
    pub cyclic_institutions: BTreeSet<String>,
    pub unresolved_parents: BTreeSet<String>,
}

impl QualityReport {
    /// Tally flags over a finished record set
    pub fn from_records(total_rows: usize, rejected: Vec<Rejection>, records: &[BudgetRecord]) -> Self {
        let mut report = QualityReport {
            total_rows,
            accepted_rows: records.len(),
            rejected,
            ..QualityReport::default()
        };

        for (idx, record) in records.iter().enumerate() {
            for flag in &record.data_quality_flags {
                *report.flag_counts.entry(*flag).or_insert(0) += 1;

                match flag {
                    DataQualityFlag::MalformedAmount => report.malformed_amounts.push(idx),
                    DataQualityFlag::CyclicHierarchy => {
                        report.cyclic_institutions.insert(record.institution_name.clone());
                    }
                    DataQualityFlag::UnresolvedParent | DataQualityFlag::NegativeAmount => {}
                }
            }
        }

        report
    }

    /// Record a parent name that did not resolve to any institution
    pub fn note_unresolved_parent(&mut self, parent: &str) {
        self.unresolved_parents.insert(parent.to_string());
    }

    pub fn rejected_count(&self) -> usize {
        self.rejected.len()
    }

    /// One error per dropped row, in input order
    pub fn rejection_errors(&self) -> impl Iterator<Item = PipelineError> + '_ {
        self.rejected.iter().cloned().map(PipelineError::from)
    }

    pub fn flagged_count(&self, flag: DataQualityFlag) -> usize {
        self.flag_counts.get(&flag).copied().unwrap_or(0)
    }

    pub fn is_clean(&self) -> bool {
        self.rejected.is_empty() && self.flag_counts.is_empty()
    }

    pub fn issues(&self) -> Vec<QualityIssue> {
        let mut issues = Vec::new();

        if !self.rejected.is_empty() {
            let lines: Vec<String> = self.rejected.iter().map(|r| r.line.to_string()).collect();
            issues.push(QualityIssue {
                severity: Severity::Critical,
                field: "row".to_string(),
                issue: format!("{} row(s) rejected (lines {})", self.rejected.len(), lines.join(", ")),
                recommendation: "Fill in institution, region, amount and title".to_string(),
            });
        }

        let malformed = self.flagged_count(DataQualityFlag::MalformedAmount);
        if malformed > 0 {
            issues.push(QualityIssue {
                severity: Severity::Warning,
                field: "budget_amount".to_string(),
                issue: format!("{} amount(s) not numeric, counted as 0 and left out of averages", malformed),
                recommendation: "Use digits with optional thousands separators".to_string(),
            });
        }

        let negative = self.flagged_count(DataQualityFlag::NegativeAmount);
        if negative > 0 {
            issues.push(QualityIssue {
                severity: Severity::Warning,
                field: "budget_amount".to_string(),
                issue: format!("{} negative amount(s) clamped to 0", negative),
                recommendation: "Verify the sign of the budget amount".to_string(),
            });
        }

        if !self.cyclic_institutions.is_empty() {
            issues.push(QualityIssue {
                severity: Severity::Warning,
                field: "parent_institution".to_string(),
                issue: format!(
                    "cyclic parent chain at: {}",
                    self.cyclic_institutions.iter().cloned().collect::<Vec<_>>().join(", ")
                ),
                recommendation: "Fix the parent references in the institution list".to_string(),
            });
        }

        if !self.unresolved_parents.is_empty() {
            issues.push(QualityIssue {
                severity: Severity::Info,
                field: "parent_institution".to_string(),
                issue: format!("{} parent name(s) not found", self.unresolved_parents.len()),
                recommendation: "Add the missing institutions to the institution list".to_string(),
            });
        }

        issues
    }

    pub fn summary(&self) -> String {
        format!(
            "{} rows: {} accepted, {} rejected | {} malformed, {} negative, {} cyclic, {} unresolved parent",
            self.total_rows,
            self.accepted_rows,
            self.rejected.len(),
            self.flagged_count(DataQualityFlag::MalformedAmount),
            self.flagged_count(DataQualityFlag::NegativeAmount),
            self.flagged_count(DataQualityFlag::CyclicHierarchy),
            self.flagged_count(DataQualityFlag::UnresolvedParent),
        )
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RejectReason;
    use crate::normalizer::Amount;
    use crate::record::{BudgetScale, InstitutionType, ProjectType, RegionSet};

    fn record(name: &str, flags: Vec<DataQualityFlag>) -> BudgetRecord {
        let region = RegionSet::new(["서울"]).parse("서울").unwrap();
        BudgetRecord {
            line: 2,
            institution_name: name.to_string(),
            region,
            parent_institution: Some("상위".to_string()),
            raw_amount: "x".to_string(),
            amount: Amount::ZERO,
            project_title: "t".to_string(),
            description: String::new(),
            project_type: ProjectType::Unclassified,
            project_subtype: None,
            institution_type: InstitutionType::LocalGovernment,
            root_institution: name.to_string(),
            budget_scale: BudgetScale::Small,
            data_quality_flags: flags,
        }
    }

    #[test]
    fn test_clean_report() {
        let records = vec![record("a", vec![])];
        let report = QualityReport::from_records(1, vec![], &records);

        assert!(report.is_clean());
        assert!(report.issues().is_empty());
        assert_eq!(report.accepted_rows, 1);
    }

    #[test]
    fn test_counts_flags_and_rejections() {
        let records = vec![
            record("a", vec![DataQualityFlag::MalformedAmount]),
            record("b", vec![DataQualityFlag::NegativeAmount, DataQualityFlag::UnresolvedParent]),
            record("c", vec![DataQualityFlag::CyclicHierarchy]),
        ];
        let rejected = vec![Rejection {
            line: 7,
            reason: RejectReason::MissingField("institution_name".to_string()),
        }];

        let mut report = QualityReport::from_records(4, rejected, &records);
        report.note_unresolved_parent("상위");

        assert_eq!(report.rejected_count(), 1);
        assert_eq!(report.flagged_count(DataQualityFlag::MalformedAmount), 1);
        assert_eq!(report.flagged_count(DataQualityFlag::NegativeAmount), 1);
        assert_eq!(report.malformed_amounts, vec![0]);
        assert!(report.cyclic_institutions.contains("c"));
        assert!(report.unresolved_parents.contains("상위"));
        assert!(!report.is_clean());

        let issues = report.issues();
        assert_eq!(issues.len(), 5);
        assert_eq!(issues[0].severity, Severity::Critical);
        assert!(issues[0].issue.contains("lines 7"));

        let errors: Vec<String> = report.rejection_errors().map(|e| e.to_string()).collect();
        assert_eq!(errors, vec!["record rejected at line 7: missing required field 'institution_name'"]);
    }

    #[test]
    fn test_summary_line() {
        let report = QualityReport::from_records(0, vec![], &[]);
        assert_eq!(
            report.summary(),
            "0 rows: 0 accepted, 0 rejected | 0 malformed, 0 negative, 0 cyclic, 0 unresolved parent"
        );
    }
}
