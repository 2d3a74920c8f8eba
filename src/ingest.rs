// 📥 Record Ingester - tabular rows → validated candidate records
//
// Rows missing a required field are rejected one by one; only a table whose
// header lacks a required column is refused as a whole.

use crate::error::{PipelineError, PipelineResult, RejectReason};
use crate::hierarchy::{normalize_name, InstitutionEntry};
use crate::record::{CandidateRecord, InstitutionType, RegionSet};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::debug;

/// Required columns and the header names accepted for each
const REQUIRED_COLUMNS: [(&str, &[&str]); 4] = [
    ("institution_name", &["institution_name", "organization", "기관"]),
    ("region", &["region", "지역"]),
    ("budget_amount", &["budget_amount", "금액"]),
    ("project_title", &["project_title", "project_detail", "사업명", "상세"]),
];

// ============================================================================
// RAW ROW
// ============================================================================

/// A row exactly as it appears in the table, before any validation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawRow {
    #[serde(default, alias = "organization", alias = "기관")]
    pub institution_name: Option<String>,

    #[serde(default, alias = "지역")]
    pub region: Option<String>,

    #[serde(default, alias = "parent", alias = "parent_org", alias = "상위기관", alias = "상급기관")]
    pub parent_institution: Option<String>,

    #[serde(default, alias = "금액")]
    pub budget_amount: Option<String>,

    #[serde(default, alias = "project_detail", alias = "사업명", alias = "상세")]
    pub project_title: Option<String>,

    #[serde(default, alias = "비고")]
    pub description: Option<String>,
}

impl RawRow {
    pub fn new(
        institution_name: &str,
        region: &str,
        budget_amount: &str,
        project_title: &str,
    ) -> Self {
        RawRow {
            institution_name: Some(institution_name.to_string()),
            region: Some(region.to_string()),
            parent_institution: None,
            budget_amount: Some(budget_amount.to_string()),
            project_title: Some(project_title.to_string()),
            description: None,
        }
    }

    pub fn with_parent(mut self, parent: &str) -> Self {
        self.parent_institution = Some(parent.to_string());
        self
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    /// Validate into a typed candidate
    pub fn validate(&self, line: usize, regions: &RegionSet) -> Result<CandidateRecord, RejectReason> {
        let institution_name = required(&self.institution_name, "institution_name")?;
        let region_raw = required(&self.region, "region")?;
        let raw_amount = required(&self.budget_amount, "budget_amount")?;
        let project_title = required(&self.project_title, "project_title")?;

        let region = regions
            .parse(&region_raw)
            .ok_or_else(|| RejectReason::UnknownRegion(region_raw.clone()))?;

        Ok(CandidateRecord {
            line,
            institution_name: normalize_name(&institution_name),
            region,
            parent_institution: optional(&self.parent_institution).map(|p| normalize_name(&p)),
            raw_amount,
            project_title,
            description: optional(&self.description).unwrap_or_default(),
        })
    }
}

fn optional(field: &Option<String>) -> Option<String> {
    field
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn required(field: &Option<String>, name: &str) -> Result<String, RejectReason> {
    optional(field).ok_or_else(|| RejectReason::MissingField(name.to_string()))
}

// ============================================================================
// INGESTION RESULT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rejection {
    pub line: usize,
    pub reason: RejectReason,
}

impl From<Rejection> for PipelineError {
    fn from(r: Rejection) -> Self {
        PipelineError::RecordRejected {
            line: r.line,
            reason: r.reason,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Ingested {
    pub candidates: Vec<CandidateRecord>,
    pub rejected: Vec<Rejection>,
}

// ============================================================================
// INGESTION
// ============================================================================

/// Validate rows already in memory. Line numbers assume a header on line 1.
pub fn ingest_rows(rows: &[RawRow], regions: &RegionSet) -> Ingested {
    let mut ingested = Ingested::default();

    for (idx, row) in rows.iter().enumerate() {
        accept(&mut ingested, row.validate(idx + 2, regions), idx + 2);
    }

    ingested
}

pub(crate) fn accept(ingested: &mut Ingested, result: Result<CandidateRecord, RejectReason>, line: usize) {
    match result {
        Ok(candidate) => ingested.candidates.push(candidate),
        Err(reason) => {
            debug!(line, %reason, "RecordRejected");
            ingested.rejected.push(Rejection { line, reason });
        }
    }
}

/// Read raw rows from CSV. Fails only when the header itself is unusable.
pub fn read_rows<R: Read>(reader: R) -> PipelineResult<Vec<(usize, Result<RawRow, RejectReason>)>> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);

    let headers = rdr.headers()?.clone();
    if headers.is_empty() {
        return Ok(Vec::new());
    }

    let present: Vec<String> = headers
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').trim().to_string())
        .collect();
    let missing: Vec<&str> = REQUIRED_COLUMNS
        .iter()
        .filter(|(_, accepted)| !accepted.iter().any(|a| present.iter().any(|p| p == a)))
        .map(|(name, _)| *name)
        .collect();
    if !missing.is_empty() {
        return Err(PipelineError::UnreadableInput(format!(
            "missing required column(s): {}",
            missing.join(", ")
        )));
    }
    let headers = csv::StringRecord::from(present);

    let mut rows = Vec::new();
    for (idx, result) in rdr.records().enumerate() {
        let fallback_line = idx + 2;
        match result {
            Ok(record) => {
                let line = record
                    .position()
                    .map(|p| p.line() as usize)
                    .unwrap_or(fallback_line);
                let row = record
                    .deserialize::<RawRow>(Some(&headers))
                    .map_err(|e| RejectReason::Unparseable(e.to_string()));
                rows.push((line, row));
            }
            Err(e) => {
                let line = e
                    .position()
                    .map(|p| p.line() as usize)
                    .unwrap_or(fallback_line);
                rows.push((line, Err(RejectReason::Unparseable(e.to_string()))));
            }
        }
    }

    Ok(rows)
}

/// Read and validate a CSV budget table
pub fn ingest_reader<R: Read>(reader: R, regions: &RegionSet) -> PipelineResult<Ingested> {
    let mut ingested = Ingested::default();

    for (line, row) in read_rows(reader)? {
        let result = row.and_then(|r| r.validate(line, regions));
        accept(&mut ingested, result, line);
    }

    Ok(ingested)
}

/// Read the raw rows of a CSV file
pub fn load_rows(csv_path: &Path) -> Result<Vec<RawRow>> {
    let file = File::open(csv_path)
        .with_context(|| format!("Failed to open CSV file: {:?}", csv_path))?;

    let rows = read_rows(file).context("Failed to read budget table")?;
    let total = rows.len();
    let parsed: Vec<RawRow> = rows.into_iter().filter_map(|(_, row)| row.ok()).collect();
    if parsed.len() < total {
        debug!(skipped = total - parsed.len(), "Unparseable CSV rows skipped");
    }

    Ok(parsed)
}

// ============================================================================
// INSTITUTION LIST
// ============================================================================

#[derive(Debug, Deserialize)]
struct InstitutionRow {
    #[serde(default, alias = "institution_name", alias = "organization", alias = "기관")]
    name: Option<String>,
    #[serde(default, alias = "지역")]
    region: Option<String>,
    #[serde(
        default,
        alias = "parent_institution",
        alias = "parent_org",
        alias = "상위기관",
        alias = "상급기관"
    )]
    parent: Option<String>,
    #[serde(default)]
    institution_type: Option<InstitutionType>,
}

/// Read an institution list (name, region, parent, optional type).
/// Rows without a name are skipped; unknown regions are dropped to `None`.
pub fn read_institutions<R: Read>(reader: R, regions: &RegionSet) -> PipelineResult<Vec<InstitutionEntry>> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);

    let mut entries = Vec::new();
    for result in rdr.deserialize::<InstitutionRow>() {
        let row = match result {
            Ok(row) => row,
            Err(e) => {
                debug!(error = %e, "Skipping unreadable institution row");
                continue;
            }
        };

        let Some(name) = optional(&row.name) else {
            continue;
        };

        entries.push(InstitutionEntry {
            name,
            region: row.region.as_deref().and_then(|r| regions.parse(r)),
            parent: optional(&row.parent),
            institution_type: row.institution_type,
        });
    }

    Ok(entries)
}

pub fn load_institutions(csv_path: &Path, regions: &RegionSet) -> Result<Vec<InstitutionEntry>> {
    let file = File::open(csv_path)
        .with_context(|| format!("Failed to open institution list: {:?}", csv_path))?;

    read_institutions(file, regions).context("Failed to read institution list")
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;

    fn regions() -> RegionSet {
        PipelineConfig::default().region_set()
    }

    #[test]
    fn test_ingest_valid_csv() {
        let csv = "institution_name,region,parent_institution,budget_amount,project_title,description\n\
                   서울시교육청,서울,,\"1,000,000\",전자기록물 관리,\n\
                   종로구,서울,서울특별시,500000,서고 정비,서가 교체\n";

        let ingested = ingest_reader(csv.as_bytes(), &regions()).unwrap();

        assert_eq!(ingested.candidates.len(), 2);
        assert!(ingested.rejected.is_empty());

        let first = &ingested.candidates[0];
        assert_eq!(first.line, 2);
        assert_eq!(first.institution_name, "서울시교육청");
        assert_eq!(first.raw_amount, "1,000,000");
        assert_eq!(first.parent_institution, None);
        assert_eq!(first.description, "");

        let second = &ingested.candidates[1];
        assert_eq!(second.parent_institution.as_deref(), Some("서울특별시"));
        assert_eq!(second.description, "서가 교체");
    }

    #[test]
    fn test_missing_field_rejects_row_only() {
        let csv = "institution_name,region,budget_amount,project_title\n\
                   ,서울,1000,정리\n\
                   부산광역시,부산,2000,정리\n\
                   대구광역시,,3000,정리\n";

        let ingested = ingest_reader(csv.as_bytes(), &regions()).unwrap();

        assert_eq!(ingested.candidates.len(), 1);
        assert_eq!(ingested.rejected.len(), 2);
        assert_eq!(
            ingested.rejected[0],
            Rejection {
                line: 2,
                reason: RejectReason::MissingField("institution_name".to_string())
            }
        );
        assert_eq!(ingested.rejected[1].line, 4);
    }

    #[test]
    fn test_unknown_region_rejected() {
        let rows = vec![RawRow::new("어딘가시", "화성", "1000", "정리")];
        let ingested = ingest_rows(&rows, &regions());

        assert!(ingested.candidates.is_empty());
        assert_eq!(
            ingested.rejected[0].reason,
            RejectReason::UnknownRegion("화성".to_string())
        );
    }

    #[test]
    fn test_korean_headers() {
        let csv = "연도,지역,기관,부서,금액,상세\n2025,경기,수원시,총무과,\"12,000\",기록물 정리\n";
        let ingested = ingest_reader(csv.as_bytes(), &regions()).unwrap();

        assert_eq!(ingested.candidates.len(), 1);
        assert_eq!(ingested.candidates[0].institution_name, "수원시");
        assert_eq!(ingested.candidates[0].project_title, "기록물 정리");
    }

    #[test]
    fn test_dashboard_export_headers() {
        let csv = "region,org_type,organization,parent_org,budget_amount,project_detail\n\
                   서울,기초자치단체,종로구,서울특별시,\"3,000,000\",기록물 정리\n\
                   경상남도,광역자치단체,경상남도,,\"5,000,000\",서고 소독\n";

        let ingested = ingest_reader(csv.as_bytes(), &regions()).unwrap();

        assert!(ingested.rejected.is_empty());
        let jongno = &ingested.candidates[0];
        assert_eq!(jongno.institution_name, "종로구");
        assert_eq!(jongno.parent_institution.as_deref(), Some("서울특별시"));
        assert_eq!(jongno.project_title, "기록물 정리");
        assert_eq!(ingested.candidates[1].region.as_str(), "경남");
    }

    #[test]
    fn test_institution_list_parent_aliases() {
        let csv = "organization,지역,상급기관\n창원시,경상남도,경상남도\n";
        let entries = read_institutions(csv.as_bytes(), &regions()).unwrap();

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "창원시");
        assert_eq!(entries[0].parent.as_deref(), Some("경상남도"));
        assert_eq!(entries[0].region.as_ref().map(|r| r.as_str()), Some("경남"));
    }

    #[test]
    fn test_missing_column_is_fatal() {
        let csv = "institution_name,region,project_title\n서울시,서울,정리\n";
        let err = ingest_reader(csv.as_bytes(), &regions()).unwrap_err();

        assert!(matches!(err, PipelineError::UnreadableInput(_)));
        assert!(err.to_string().contains("budget_amount"));
    }

    #[test]
    fn test_empty_input() {
        let ingested = ingest_reader("".as_bytes(), &regions()).unwrap();
        assert!(ingested.candidates.is_empty());
        assert!(ingested.rejected.is_empty());

        let header_only = "institution_name,region,budget_amount,project_title\n";
        let ingested = ingest_reader(header_only.as_bytes(), &regions()).unwrap();
        assert!(ingested.candidates.is_empty());
    }

    #[test]
    fn test_read_institutions() {
        let csv = "name,region,parent,institution_type\n\
                   경기도,경기,,\n\
                   수원시,경기,경기도,\n\
                   경기도교육청,경기,,education_authority\n\
                   ,경기,,\n";

        let entries = read_institutions(csv.as_bytes(), &regions()).unwrap();

        assert_eq!(entries.len(), 3);
        assert_eq!(entries[1].parent.as_deref(), Some("경기도"));
        assert_eq!(entries[2].institution_type, Some(InstitutionType::EducationAuthority));
        assert_eq!(entries[0].region.as_ref().map(|r| r.as_str()), Some("경기"));
    }

    #[test]
    fn test_load_rows_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("budget.csv");
        std::fs::write(
            &path,
            "institution_name,region,budget_amount,project_title\n부산광역시,부산,\"2,000\",보존\n",
        )
        .unwrap();

        let rows = load_rows(&path).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].budget_amount.as_deref(), Some("2,000"));

        assert!(load_rows(&dir.path().join("missing.csv")).is_err());
    }
}
