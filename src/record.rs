// 📋 Budget Records - typed rows from the ingestion boundary onward
//
// Raw rows are validated once into `CandidateRecord`; the pipeline then
// completes them into immutable `BudgetRecord`s. Nothing past ingestion
// looks fields up by column name.

use crate::normalizer::Amount;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

// ============================================================================
// REGION
// ============================================================================

/// One administrative region from the configured closed set
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Region(String);

impl Region {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The closed set of regions a dataset may reference, plus long-form aliases
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionSet {
    names: Vec<String>,
    /// Official or historical name → configured short name
    aliases: BTreeMap<String, String>,
}

impl RegionSet {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        RegionSet {
            names: names.into_iter().map(Into::into).collect(),
            aliases: BTreeMap::new(),
        }
    }

    /// Add aliases. Targets outside the set are ignored.
    pub fn with_aliases<I, K, V>(mut self, aliases: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (alias, target) in aliases {
            let target = target.into();
            if self.names.contains(&target) {
                self.aliases.insert(alias.into(), target);
            }
        }
        self
    }

    /// Resolve a raw region string against the set.
    ///
    /// Order: exact name, exact alias, then the longest name or alias the
    /// raw string starts with ("서울특별시" → "서울").
    pub fn parse(&self, raw: &str) -> Option<Region> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }

        if let Some(name) = self.names.iter().find(|n| n.as_str() == trimmed) {
            return Some(Region(name.clone()));
        }
        if let Some(target) = self.aliases.get(trimmed) {
            return Some(Region(target.clone()));
        }

        let by_name = self.names.iter().map(|n| (n.as_str(), n.as_str()));
        let by_alias = self.aliases.iter().map(|(a, t)| (a.as_str(), t.as_str()));
        by_name
            .chain(by_alias)
            .filter(|(prefix, _)| trimmed.starts_with(prefix))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, target)| Region(target.to_string()))
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }
}

// ============================================================================
// PROJECT TYPE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProjectType {
    Digitalization,
    RecordsMgmt,
    SpecialProject,
    SystemMgmt,
    Preservation,
    Unclassified,
}

impl ProjectType {
    pub const CANONICAL: [ProjectType; 5] = [
        ProjectType::Digitalization,
        ProjectType::RecordsMgmt,
        ProjectType::SpecialProject,
        ProjectType::SystemMgmt,
        ProjectType::Preservation,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            ProjectType::Digitalization => "DIGITALIZATION",
            ProjectType::RecordsMgmt => "RECORDS_MGMT",
            ProjectType::SpecialProject => "SPECIAL_PROJECT",
            ProjectType::SystemMgmt => "SYSTEM_MGMT",
            ProjectType::Preservation => "PRESERVATION",
            ProjectType::Unclassified => "UNCLASSIFIED",
        }
    }

    /// Label shown on the dashboard
    pub fn label_kr(&self) -> &'static str {
        match self {
            ProjectType::Digitalization => "전자화 사업",
            ProjectType::RecordsMgmt => "기록물관리",
            ProjectType::SpecialProject => "특수사업",
            ProjectType::SystemMgmt => "시스템 관리",
            ProjectType::Preservation => "보존관리",
            ProjectType::Unclassified => "미분류",
        }
    }
}

impl fmt::Display for ProjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for ProjectType {
    type Err = String;

    /// Accepts either the code or the Korean label
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        CANONICAL_AND_SENTINEL
            .iter()
            .copied()
            .find(|t| t.code().eq_ignore_ascii_case(trimmed) || t.label_kr() == trimmed)
            .ok_or_else(|| format!("unknown project type '{}'", trimmed))
    }
}

const CANONICAL_AND_SENTINEL: [ProjectType; 6] = [
    ProjectType::Digitalization,
    ProjectType::RecordsMgmt,
    ProjectType::SpecialProject,
    ProjectType::SystemMgmt,
    ProjectType::Preservation,
    ProjectType::Unclassified,
];

// ============================================================================
// INSTITUTION TYPE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstitutionType {
    LocalGovernment,
    EducationAuthority,
    Other,
}

impl InstitutionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstitutionType::LocalGovernment => "local_government",
            InstitutionType::EducationAuthority => "education_authority",
            InstitutionType::Other => "other",
        }
    }

    pub fn label_kr(&self) -> &'static str {
        match self {
            InstitutionType::LocalGovernment => "지방자치단체",
            InstitutionType::EducationAuthority => "교육행정기관",
            InstitutionType::Other => "기타",
        }
    }
}

impl fmt::Display for InstitutionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// BUDGET SCALE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetScale {
    Small,
    Medium,
    Large,
    /// Amount could not be read
    Unknown,
}

impl BudgetScale {
    pub fn as_str(&self) -> &'static str {
        match self {
            BudgetScale::Small => "small",
            BudgetScale::Medium => "medium",
            BudgetScale::Large => "large",
            BudgetScale::Unknown => "unknown",
        }
    }

    pub fn label_kr(&self) -> &'static str {
        match self {
            BudgetScale::Small => "소규모",
            BudgetScale::Medium => "중규모",
            BudgetScale::Large => "대규모",
            BudgetScale::Unknown => "미상",
        }
    }
}

/// Thresholds separating the three budget scales
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScaleThresholds {
    /// Amounts below this are small
    pub medium_from: Amount,
    /// Amounts at or above this are large
    pub large_from: Amount,
}

impl ScaleThresholds {
    pub fn scale_of(&self, amount: Amount) -> BudgetScale {
        if amount < self.medium_from {
            BudgetScale::Small
        } else if amount < self.large_from {
            BudgetScale::Medium
        } else {
            BudgetScale::Large
        }
    }
}

impl Default for ScaleThresholds {
    fn default() -> Self {
        ScaleThresholds {
            medium_from: Amount::from_won(50_000_000),
            large_from: Amount::from_won(500_000_000),
        }
    }
}

// ============================================================================
// DATA QUALITY FLAGS
// ============================================================================

/// Marks a record whose input was degraded but retained
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DataQualityFlag {
    MalformedAmount,
    NegativeAmount,
    UnresolvedParent,
    CyclicHierarchy,
}

impl DataQualityFlag {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataQualityFlag::MalformedAmount => "MalformedAmount",
            DataQualityFlag::NegativeAmount => "NegativeAmount",
            DataQualityFlag::UnresolvedParent => "UnresolvedParent",
            DataQualityFlag::CyclicHierarchy => "CyclicHierarchy",
        }
    }
}

// ============================================================================
// CANDIDATE RECORD (validated row, not yet normalized)
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateRecord {
    /// Line in the source table (header is line 1)
    pub line: usize,
    pub institution_name: String,
    pub region: Region,
    pub parent_institution: Option<String>,
    pub raw_amount: String,
    pub project_title: String,
    pub description: String,
}

// ============================================================================
// BUDGET RECORD
// ============================================================================

/// One project line item after the full pipeline.
///
/// Records only live inside a `Snapshot`, which hands out shared references,
/// so nothing can change a record once the snapshot is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetRecord {
    pub line: usize,
    pub institution_name: String,
    pub region: Region,
    pub parent_institution: Option<String>,
    pub raw_amount: String,
    pub amount: Amount,
    pub project_title: String,
    pub description: String,
    pub project_type: ProjectType,
    pub project_subtype: Option<String>,
    pub institution_type: InstitutionType,
    pub root_institution: String,
    pub budget_scale: BudgetScale,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub data_quality_flags: Vec<DataQualityFlag>,
}

impl BudgetRecord {
    pub fn has_flag(&self, flag: DataQualityFlag) -> bool {
        self.data_quality_flags.contains(&flag)
    }

    /// The amount, unless the raw text could not be read. A malformed amount
    /// is stored as zero so sums stay whole, but it is not a 0-won project.
    pub fn known_amount(&self) -> Option<Amount> {
        if self.has_flag(DataQualityFlag::MalformedAmount) {
            None
        } else {
            Some(self.amount)
        }
    }

    pub fn is_flagged(&self) -> bool {
        !self.data_quality_flags.is_empty()
    }
}

// ============================================================================
// TESTS
// ============================================================================
