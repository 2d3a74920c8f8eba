// ⚙️ Pipeline Configuration - rules, keyword tables and regions as data
//
// Everything the pipeline needs to know about the domain lives here so a new
// rule set can be swapped in on the next reload without touching code.

use crate::classifier::{ClassificationRule, ProjectClassifier, SubtypeRule};
use crate::error::ConfigError;
use crate::hierarchy::{InstitutionKeyword, InstitutionTyper, KeywordMatch};
use crate::record::{InstitutionType, ProjectType, RegionSet, ScaleThresholds};
use anyhow::{Context as AnyhowContext, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;

// ============================================================================
// DEFAULT TABLES
// ============================================================================

/// Category keywords in priority order (first category with a hit wins)
const CATEGORY_KEYWORDS: [(ProjectType, &[&str]); 5] = [
    (
        ProjectType::Digitalization,
        &[
            "전자기록물", "전자화", "디지털화", "스캔", "색인", "DB", "데이터베이스",
            "디지털 아카이브", "메타데이터", "기록화", "전산화", "구축", "멀티미디어",
            "시청각", "영상",
        ],
    ),
    (
        ProjectType::RecordsMgmt,
        &[
            "기록물", "정리", "기술", "이관", "인수", "평가", "폐기", "실태점검",
            "정수점검", "공개재분류", "접근", "전수조사",
        ],
    ),
    (
        ProjectType::SpecialProject,
        &[
            "컨설팅", "연구", "용역", "전략", "계획", "ISP", "교육", "훈련", "수집",
            "구술", "기증", "전시", "채록", "면담", "인터뷰", "리모델링", "개선",
        ],
    ),
    (
        ProjectType::SystemMgmt,
        &[
            "시스템", "유지보수", "고도화", "기능개선", "보안", "백신", "인프라", "HW",
            "SW", "하드웨어", "소프트웨어", "라이선스", "업그레이드", "서버", "장비",
            "virus", "anti", "프로그램", "이전", "S/W",
        ],
    ),
    (
        ProjectType::Preservation,
        &[
            "보존", "환경", "온습도", "공기질", "해충", "방제", "방균", "소독", "서고",
            "보존용품", "복원", "복구", "향균", "항균", "조습", "살충", "모빌", "서가",
            "이동식", "체인", "이송", "수리",
        ],
    ),
];

/// (category, subtype, keywords, is_default)
const SUBTYPE_KEYWORDS: [(ProjectType, &str, &[&str], bool); 24] = [
    (ProjectType::Digitalization, "PAPER_DIGITIZATION", &["종이기록물", "일반문서", "도면", "카드", "대장"], true),
    (ProjectType::Digitalization, "SPECIAL_DIGITIZATION", &["책자", "간행물", "행정박물"], false),
    (ProjectType::Digitalization, "AV_DIGITIZATION", &["멀티미디어", "시청각", "영상", "사진", "필름", "오디오"], false),
    (ProjectType::Digitalization, "DIGITAL_ARCHIVE", &["아카이브", "기록화", "콘텐츠", "컨텐츠"], false),
    (ProjectType::RecordsMgmt, "RECORDS_ARRANGE", &["정리", "기술", "전수조사", "목록", "분류", "메타데이터"], true),
    (ProjectType::RecordsMgmt, "RECORDS_TRANSFER", &["이관", "인수"], false),
    (ProjectType::RecordsMgmt, "RECORDS_APPRAISAL", &["평가", "폐기"], false),
    (ProjectType::RecordsMgmt, "RECORDS_INSPECTION", &["실태점검", "정수점검"], false),
    (ProjectType::RecordsMgmt, "ACCESS_CONTROL", &["공개재분류", "접근"], false),
    (ProjectType::SpecialProject, "CONSULTING", &["컨설팅", "연구", "용역"], true),
    (ProjectType::SpecialProject, "PLANNING", &["전략", "계획", "ISP", "ISMP"], false),
    (ProjectType::SpecialProject, "EDUCATION", &["교육", "훈련"], false),
    (ProjectType::SpecialProject, "RECORDS_COLLECTION", &["수집", "구술", "기증", "채록", "면담", "인터뷰"], false),
    (ProjectType::SpecialProject, "EXHIBITION", &["전시", "상설", "기획", "순회", "콘텐츠"], false),
    (ProjectType::SpecialProject, "FACILITY_IMPROVE", &["시설", "공사", "리모델링", "개선"], false),
    (ProjectType::SystemMgmt, "SYS_OPERATION", &["운영", "유지보수", "HW", "SW", "라이선스", "백업"], true),
    (ProjectType::SystemMgmt, "SYS_ENHANCEMENT", &["고도화", "기능개선", "업그레이드", "이전", "설치", "전환"], false),
    (ProjectType::SystemMgmt, "SECURITY_MGMT", &["보안", "백신", "문서보안", "virus", "anti"], false),
    (ProjectType::SystemMgmt, "INFRA_ESTABLISH", &["인프라", "구축", "신규", "시스템", "장비", "서버", "교체", "노후"], false),
    (ProjectType::Preservation, "ENVIRONMENT_CONTROL", &["환경", "온습도", "공기질", "조습"], false),
    (ProjectType::Preservation, "PEST_PREVENTION", &["해충", "방제", "방균", "소독", "방역", "향균", "항균", "살충"], false),
    (ProjectType::Preservation, "STORAGE_MGMT", &["서고", "시설", "장비", "서가", "모빌", "이동식", "체인", "이송"], true),
    (ProjectType::Preservation, "SUPPLIES_MGMT", &["보존용품", "상자", "봉투", "용품"], false),
    (ProjectType::Preservation, "REPAIR_RESTORE", &["복원", "복구", "처리", "수리", "교체"], false),
];

const REGIONS: [&str; 17] = [
    "서울", "부산", "대구", "인천", "광주", "대전", "울산", "세종", "경기", "강원", "충북",
    "충남", "전북", "전남", "경북", "경남", "제주",
];

/// Official long names (and pre-2023 names) of the 17 regions
const REGION_ALIASES: [(&str, &str); 20] = [
    ("서울특별시", "서울"),
    ("부산광역시", "부산"),
    ("대구광역시", "대구"),
    ("인천광역시", "인천"),
    ("광주광역시", "광주"),
    ("대전광역시", "대전"),
    ("울산광역시", "울산"),
    ("세종특별자치시", "세종"),
    ("경기도", "경기"),
    ("강원특별자치도", "강원"),
    ("강원도", "강원"),
    ("충청북도", "충북"),
    ("충청남도", "충남"),
    ("전북특별자치도", "전북"),
    ("전라북도", "전북"),
    ("전라남도", "전남"),
    ("경상북도", "경북"),
    ("경상남도", "경남"),
    ("제주특별자치도", "제주"),
    ("제주도", "제주"),
];

fn default_region_aliases() -> BTreeMap<String, String> {
    REGION_ALIASES
        .iter()
        .map(|(alias, region)| (alias.to_string(), region.to_string()))
        .collect()
}

fn default_institution_keywords() -> Vec<InstitutionKeyword> {
    let contains = |keyword: &str, institution_type| InstitutionKeyword {
        keyword: keyword.to_string(),
        institution_type,
        match_kind: KeywordMatch::Contains,
    };
    let suffix = |keyword: &str, institution_type| InstitutionKeyword {
        keyword: keyword.to_string(),
        institution_type,
        match_kind: KeywordMatch::Suffix,
    };

    vec![
        contains("교육청", InstitutionType::EducationAuthority),
        contains("교육지원청", InstitutionType::EducationAuthority),
        suffix("교육원", InstitutionType::EducationAuthority),
        contains("공사", InstitutionType::Other),
        contains("공단", InstitutionType::Other),
        contains("재단", InstitutionType::Other),
        contains("대학교", InstitutionType::Other),
        suffix("시", InstitutionType::LocalGovernment),
        suffix("군", InstitutionType::LocalGovernment),
        suffix("구", InstitutionType::LocalGovernment),
        suffix("도", InstitutionType::LocalGovernment),
        suffix("청", InstitutionType::LocalGovernment),
    ]
}

fn default_institution_type() -> InstitutionType {
    InstitutionType::LocalGovernment
}

// ============================================================================
// PIPELINE CONFIG
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Ordered classification rules (first match wins)
    pub rules: Vec<ClassificationRule>,

    #[serde(default)]
    pub subtypes: Vec<SubtypeRule>,

    /// Ordered institution-name keywords (first match wins)
    pub institution_keywords: Vec<InstitutionKeyword>,

    #[serde(default = "default_institution_type")]
    pub default_institution_type: InstitutionType,

    /// Closed set of regions
    pub regions: Vec<String>,

    /// Long-form region name → entry of `regions`
    #[serde(default = "default_region_aliases")]
    pub region_aliases: BTreeMap<String, String>,

    #[serde(default)]
    pub budget_scale: ScaleThresholds,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let rules = CATEGORY_KEYWORDS
            .iter()
            .flat_map(|(category, keywords)| {
                keywords.iter().enumerate().map(move |(i, keyword)| {
                    ClassificationRule::new(
                        format!("{}-{:02}", category.code().to_lowercase(), i + 1),
                        *keyword,
                        *category,
                    )
                })
            })
            .collect();

        let subtypes = SUBTYPE_KEYWORDS
            .iter()
            .map(|(category, subtype, keywords, is_default)| SubtypeRule {
                category: *category,
                subtype: subtype.to_string(),
                keywords: keywords.iter().map(|k| k.to_string()).collect(),
                is_default: *is_default,
            })
            .collect();

        PipelineConfig {
            rules,
            subtypes,
            institution_keywords: default_institution_keywords(),
            default_institution_type: default_institution_type(),
            regions: REGIONS.iter().map(|r| r.to_string()).collect(),
            region_aliases: default_region_aliases(),
            budget_scale: ScaleThresholds::default(),
        }
    }
}

impl PipelineConfig {
    /// Parse and validate a JSON configuration
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: PipelineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

        PipelineConfig::from_json(&content)
            .with_context(|| format!("Invalid config file: {:?}", path.as_ref()))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.regions.is_empty() {
            return Err(ConfigError::NoRegions);
        }

        let mut seen = HashSet::new();
        for rule in &self.rules {
            if !seen.insert(rule.id.as_str()) {
                return Err(ConfigError::DuplicateRule(rule.id.clone()));
            }
            if rule.pattern.trim().is_empty() || rule.pattern.chars().all(|c| c == '*') {
                return Err(ConfigError::EmptyPattern(rule.id.clone()));
            }
        }

        Ok(())
    }

    pub fn classifier(&self) -> ProjectClassifier {
        ProjectClassifier::from_rules(self.rules.clone()).with_subtypes(self.subtypes.clone())
    }

    pub fn institution_typer(&self) -> InstitutionTyper {
        InstitutionTyper::new(self.institution_keywords.clone(), self.default_institution_type)
    }

    pub fn region_set(&self) -> RegionSet {
        RegionSet::new(self.regions.iter().cloned()).with_aliases(self.region_aliases.clone())
    }

    /// SHA-256 over the serialized configuration
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        // Serializing plain data cannot fail; fall back to Debug just in case
        match serde_json::to_vec(self) {
            Ok(bytes) => hasher.update(bytes),
            Err(_) => hasher.update(format!("{:?}", self)),
        }
        format!("{:x}", hasher.finalize())
    }
}

// ============================================================================
// TESTS
// ============================================================================
