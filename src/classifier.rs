// 🏷️ Project-Type Classifier - Rules as Data
// Ordered pattern rules assign every record exactly one project type

use crate::record::ProjectType;
use anyhow::{Context as AnyhowContext, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Placeholder texts the source uses for "no project this year"
const NO_PROJECT_MARKERS: [&str; 2] = ["사업없음", "미업로드"];

// ============================================================================
// RULE DEFINITION
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationRule {
    /// Rule ID for tracking
    pub id: String,

    /// Pattern to match (supports wildcards with *)
    pub pattern: String,

    /// Category to assign
    pub category: ProjectType,

    /// Priority (higher = applied first, ties keep list order)
    #[serde(default)]
    pub priority: i32,
}

impl ClassificationRule {
    pub fn new(id: impl Into<String>, pattern: impl Into<String>, category: ProjectType) -> Self {
        ClassificationRule {
            id: id.into(),
            pattern: pattern.into(),
            category,
            priority: 0,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Check if pattern matches the given (already lower-cased) text
    pub fn matches(&self, text_lower: &str) -> bool {
        pattern_matches(&self.pattern.to_lowercase(), text_lower)
    }
}

/// Case-folded pattern match.
///
/// Without `*` the pattern is a substring. With `*` the pieces must appear in
/// order, anchored at the start/end unless the pattern begins/ends with `*`.
fn pattern_matches(pattern_lower: &str, text_lower: &str) -> bool {
    if !pattern_lower.contains('*') {
        return text_lower.contains(pattern_lower);
    }

    let parts: Vec<&str> = pattern_lower.split('*').collect();
    let first = parts[0];
    let last = parts[parts.len() - 1];

    if !text_lower.starts_with(first) {
        return false;
    }

    let mut current_pos = first.len();
    for part in &parts[1..parts.len() - 1] {
        if part.is_empty() {
            continue;
        }
        match text_lower[current_pos..].find(part) {
            Some(pos) => current_pos += pos + part.len(),
            None => return false,
        }
    }

    last.is_empty() || text_lower[current_pos..].ends_with(last)
}

// ============================================================================
// SUBTYPE RULES
// ============================================================================

/// Keyword table for one subtype inside a category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubtypeRule {
    pub category: ProjectType,
    pub subtype: String,
    pub keywords: Vec<String>,
    /// Used when no subtype of the category has a keyword hit
    #[serde(default)]
    pub is_default: bool,
}

impl SubtypeRule {
    fn hits(&self, text_lower: &str) -> usize {
        self.keywords
            .iter()
            .filter(|k| text_lower.contains(&k.to_lowercase()))
            .count()
    }
}

// ============================================================================
// CLASSIFICATION RESULT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub project_type: ProjectType,
    pub subtype: Option<String>,
    pub rule_id: Option<String>,
}

impl Classification {
    fn unclassified() -> Self {
        Classification {
            project_type: ProjectType::Unclassified,
            subtype: None,
            rule_id: None,
        }
    }
}

// ============================================================================
// CLASSIFIER
// ============================================================================

/// Holds one rule set. Pure: the same text always gets the same answer, so
/// records can be classified in any order or in parallel.
#[derive(Debug, Clone, Default)]
pub struct ProjectClassifier {
    rules: Vec<ClassificationRule>,
    subtypes: Vec<SubtypeRule>,
}

impl ProjectClassifier {
    /// Create classifier from a list of rules
    pub fn from_rules(mut rules: Vec<ClassificationRule>) -> Self {
        // Stable sort: equal priorities keep their configured order
        rules.sort_by(|a, b| b.priority.cmp(&a.priority));
        ProjectClassifier {
            rules,
            subtypes: Vec::new(),
        }
    }

    pub fn with_subtypes(mut self, subtypes: Vec<SubtypeRule>) -> Self {
        self.subtypes = subtypes;
        self
    }

    /// Load rules from JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read rules file: {:?}", path.as_ref()))?;

        let rules: Vec<ClassificationRule> =
            serde_json::from_str(&content).context("Failed to parse rules JSON")?;

        Ok(ProjectClassifier::from_rules(rules))
    }

    /// Category only
    pub fn classify(&self, title: &str, description: &str) -> ProjectType {
        self.classify_full(title, description).project_type
    }

    /// Category, subtype and the rule that decided it
    pub fn classify_full(&self, title: &str, description: &str) -> Classification {
        let text = format!("{} {}", title.trim(), description.trim())
            .trim()
            .to_lowercase();

        if text.is_empty() || NO_PROJECT_MARKERS.contains(&text.as_str()) {
            return Classification::unclassified();
        }

        let Some(rule) = self.rules.iter().find(|r| r.matches(&text)) else {
            return Classification::unclassified();
        };

        Classification {
            project_type: rule.category,
            subtype: self.subtype_for(rule.category, &text),
            rule_id: Some(rule.id.clone()),
        }
    }

    /// Most keyword hits within the category wins; earlier subtype on ties
    fn subtype_for(&self, category: ProjectType, text_lower: &str) -> Option<String> {
        let mut best: Option<(&SubtypeRule, usize)> = None;
        for rule in self.subtypes.iter().filter(|s| s.category == category) {
            let hits = rule.hits(text_lower);
            if hits > 0 && best.map_or(true, |(_, h)| hits > h) {
                best = Some((rule, hits));
            }
        }

        best.map(|(rule, _)| rule.subtype.clone()).or_else(|| {
            self.subtypes
                .iter()
                .find(|s| s.category == category && s.is_default)
                .map(|s| s.subtype.clone())
        })
    }

    /// Get number of rules loaded
    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    pub fn rules(&self) -> &[ClassificationRule] {
        &self.rules
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;

    fn default_classifier() -> ProjectClassifier {
        PipelineConfig::default().classifier()
    }

    #[test]
    fn test_substring_pattern_match() {
        let rule = ClassificationRule::new("scan", "스캔", ProjectType::Digitalization);

        assert!(rule.matches("기록물 스캔 및 색인"));
        assert!(!rule.matches("서고 환경 개선"));
    }

    #[test]
    fn test_case_insensitive() {
        let rule = ClassificationRule::new("db", "DB", ProjectType::Digitalization);
        assert!(rule.matches(&"행정박물 db구축".to_lowercase()));
    }

    #[test]
    fn test_wildcard_pattern() {
        let rule = ClassificationRule::new("sys", "시스템*유지보수", ProjectType::SystemMgmt);

        assert!(rule.matches("시스템 유지보수"));
        assert!(rule.matches("시스템 운영 및 유지보수"));
        assert!(!rule.matches("유지보수 시스템"));

        let open = ClassificationRule::new("open", "*보존*", ProjectType::Preservation);
        assert!(open.matches("기록물 보존 환경"));
        assert!(!open.matches("기록물 정리"));
    }

    #[test]
    fn test_first_match_wins() {
        let classifier = ProjectClassifier::from_rules(vec![
            ClassificationRule::new("a", "구축", ProjectType::Digitalization),
            ClassificationRule::new("b", "시스템", ProjectType::SystemMgmt),
        ]);

        assert_eq!(classifier.classify("시스템 구축", ""), ProjectType::Digitalization);
    }

    #[test]
    fn test_priority_overrides_order() {
        let classifier = ProjectClassifier::from_rules(vec![
            ClassificationRule::new("a", "구축", ProjectType::Digitalization),
            ClassificationRule::new("b", "시스템", ProjectType::SystemMgmt).with_priority(10),
        ]);

        let result = classifier.classify_full("시스템 구축", "");
        assert_eq!(result.project_type, ProjectType::SystemMgmt);
        assert_eq!(result.rule_id, Some("b".to_string()));
    }

    #[test]
    fn test_no_match_is_unclassified() {
        let classifier = ProjectClassifier::from_rules(vec![ClassificationRule::new(
            "scan",
            "스캔",
            ProjectType::Digitalization,
        )]);

        assert_eq!(classifier.classify("청사 조경 관리", ""), ProjectType::Unclassified);
        assert_eq!(ProjectClassifier::default().classify("anything", ""), ProjectType::Unclassified);
    }

    #[test]
    fn test_no_project_markers() {
        let classifier = default_classifier();

        assert_eq!(classifier.classify("사업없음", ""), ProjectType::Unclassified);
        assert_eq!(classifier.classify(" 미업로드 ", ""), ProjectType::Unclassified);
        assert_eq!(classifier.classify("", ""), ProjectType::Unclassified);
    }

    #[test]
    fn test_default_rules_categories() {
        let classifier = default_classifier();

        assert_eq!(classifier.classify("전자기록물 관리", ""), ProjectType::Digitalization);
        assert_eq!(classifier.classify("기록물 이관", ""), ProjectType::RecordsMgmt);
        assert_eq!(classifier.classify("기록관리 컨설팅", ""), ProjectType::SpecialProject);
        assert_eq!(classifier.classify("백신 라이선스", ""), ProjectType::SystemMgmt);
        assert_eq!(classifier.classify("서고 온습도 관리", ""), ProjectType::Preservation);
    }

    #[test]
    fn test_description_participates() {
        let classifier = default_classifier();
        assert_eq!(
            classifier.classify("기록관 운영비", "서고 해충 방제"),
            ProjectType::Preservation
        );
    }

    #[test]
    fn test_subtype_most_hits() {
        let classifier = default_classifier();

        let result = classifier.classify_full("시청각 영상 필름 디지털화", "");
        assert_eq!(result.project_type, ProjectType::Digitalization);
        assert_eq!(result.subtype.as_deref(), Some("AV_DIGITIZATION"));
    }

    #[test]
    fn test_subtype_falls_back_to_default() {
        let classifier = default_classifier();

        let result = classifier.classify_full("전산화", "");
        assert_eq!(result.project_type, ProjectType::Digitalization);
        assert_eq!(result.subtype.as_deref(), Some("PAPER_DIGITIZATION"));

        let none = classifier.classify_full("조경", "");
        assert_eq!(none.subtype, None);
    }

    #[test]
    fn test_deterministic() {
        let classifier = default_classifier();
        let first = classifier.classify_full("기록물 정리 및 DB 구축", "");

        for _ in 0..10 {
            classifier.classify("보존 환경", "");
            assert_eq!(classifier.classify_full("기록물 정리 및 DB 구축", ""), first);
        }
    }

    #[test]
    fn test_independent_rule_sets() {
        let strict = ProjectClassifier::from_rules(vec![ClassificationRule::new(
            "only",
            "보존",
            ProjectType::Preservation,
        )]);
        let full = default_classifier();

        assert_eq!(strict.classify("기록물 이관", ""), ProjectType::Unclassified);
        assert_eq!(full.classify("기록물 이관", ""), ProjectType::RecordsMgmt);
    }

    #[test]
    fn test_rules_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.json");
        fs::write(
            &path,
            r#"[{"id": "x", "pattern": "전시", "category": "SPECIAL_PROJECT"}]"#,
        )
        .unwrap();

        let classifier = ProjectClassifier::from_file(&path).unwrap();
        assert_eq!(classifier.rule_count(), 1);
        assert_eq!(classifier.classify("기록 전시회", ""), ProjectType::SpecialProject);
    }
}
