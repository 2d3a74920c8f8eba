// 🏛️ Institution Hierarchy - name-keyed table + cycle-guarded parent walks
//
// "서울특별시교육청" → education_authority, root = itself
// "종로구" → local_government, parent "서울특별시"
//
// Parents are lookup keys, never owned links. A parent missing from the table
// is left unresolved; a chain that loops is cut at the node being resolved.

use crate::record::{InstitutionType, Region};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, warn};

// ============================================================================
// INSTITUTION TYPE KEYWORDS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeywordMatch {
    Suffix,
    Contains,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstitutionKeyword {
    pub keyword: String,
    pub institution_type: InstitutionType,
    #[serde(default = "default_match_kind")]
    pub match_kind: KeywordMatch,
}

fn default_match_kind() -> KeywordMatch {
    KeywordMatch::Suffix
}

impl InstitutionKeyword {
    pub fn matches(&self, name: &str) -> bool {
        match self.match_kind {
            KeywordMatch::Suffix => name.ends_with(&self.keyword),
            KeywordMatch::Contains => name.contains(&self.keyword),
        }
    }
}

/// Derives an institution type from its name; first matching keyword wins
#[derive(Debug, Clone)]
pub struct InstitutionTyper {
    keywords: Vec<InstitutionKeyword>,
    default: InstitutionType,
}

impl InstitutionTyper {
    pub fn new(keywords: Vec<InstitutionKeyword>, default: InstitutionType) -> Self {
        InstitutionTyper { keywords, default }
    }

    pub fn type_of(&self, name: &str) -> InstitutionType {
        let name = normalize_name(name);
        self.keywords
            .iter()
            .find(|k| k.matches(&name))
            .map(|k| k.institution_type)
            .unwrap_or(self.default)
    }
}

/// Trim and collapse internal whitespace so "서울 특별시  교육청" keys the same
/// way every time it appears.
pub fn normalize_name(name: &str) -> String {
    name.split_whitespace().collect::<Vec<_>>().join(" ")
}

// ============================================================================
// INSTITUTION ENTRY / NODE
// ============================================================================

/// One row of the externally supplied institution list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstitutionEntry {
    pub name: String,
    #[serde(default)]
    pub region: Option<Region>,
    #[serde(default)]
    pub parent: Option<String>,
    /// Explicit type; when absent the name keywords decide
    #[serde(default)]
    pub institution_type: Option<InstitutionType>,
}

impl InstitutionEntry {
    pub fn new(name: impl Into<String>) -> Self {
        InstitutionEntry {
            name: name.into(),
            region: None,
            parent: None,
            institution_type: None,
        }
    }

    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn with_region(mut self, region: Region) -> Self {
        self.region = Some(region);
        self
    }

    pub fn with_type(mut self, institution_type: InstitutionType) -> Self {
        self.institution_type = Some(institution_type);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstitutionNode {
    pub name: String,
    pub institution_type: InstitutionType,
    pub region: Option<Region>,
    /// Name of the parent; only a lookup key
    pub parent: Option<String>,
}

// ============================================================================
// RESOLUTION
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// Effective root; never empty
    pub root: String,
    /// Names walked from the start node to the root, inclusive
    pub chain: Vec<String>,
    /// Parent name that broke the chain because it is not in the table
    pub unresolved_parent: Option<String>,
    /// The chain looped and was cut at the start node
    pub cyclic: bool,
}

// ============================================================================
// BUILDER (mutable) → TABLE (read-only)
// ============================================================================

/// Collects entries. The table only exists once `build` has run, so lookups
/// never see a half-built hierarchy.
#[derive(Debug)]
pub struct HierarchyBuilder {
    typer: InstitutionTyper,
    nodes: BTreeMap<String, InstitutionNode>,
}

impl HierarchyBuilder {
    pub fn new(typer: InstitutionTyper) -> Self {
        HierarchyBuilder {
            typer,
            nodes: BTreeMap::new(),
        }
    }

    /// Add an entry. The first entry for a name wins; later duplicates only
    /// fill in a missing parent or region.
    pub fn insert(&mut self, entry: InstitutionEntry) {
        let name = normalize_name(&entry.name);
        if name.is_empty() {
            return;
        }

        let parent = entry
            .parent
            .as_deref()
            .map(normalize_name)
            .filter(|p| !p.is_empty());

        if let Some(existing) = self.nodes.get_mut(&name) {
            if existing.parent.is_none() {
                existing.parent = parent;
            }
            if existing.region.is_none() {
                existing.region = entry.region;
            }
            return;
        }

        let institution_type = entry
            .institution_type
            .unwrap_or_else(|| self.typer.type_of(&name));

        self.nodes.insert(
            name.clone(),
            InstitutionNode {
                name,
                institution_type,
                region: entry.region,
                parent,
            },
        );
    }

    pub fn extend<I: IntoIterator<Item = InstitutionEntry>>(&mut self, entries: I) {
        for entry in entries {
            self.insert(entry);
        }
    }

    pub fn build(self) -> HierarchyTable {
        debug!(institutions = self.nodes.len(), "Institution hierarchy built");
        HierarchyTable {
            typer: self.typer,
            nodes: self.nodes,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HierarchyTable {
    typer: InstitutionTyper,
    nodes: BTreeMap<String, InstitutionNode>,
}

impl HierarchyTable {
    pub fn get(&self, name: &str) -> Option<&InstitutionNode> {
        self.nodes.get(&normalize_name(name))
    }

    pub fn count(&self) -> usize {
        self.nodes.len()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &InstitutionNode> {
        self.nodes.values()
    }

    /// Parent node, if the parent name resolves to a row in the table
    pub fn parent_of(&self, name: &str) -> Option<&InstitutionNode> {
        self.get(name)
            .and_then(|node| node.parent.as_deref())
            .and_then(|parent| self.get(parent))
    }

    /// Table type when known, otherwise keyword-derived from the name
    pub fn institution_type(&self, name: &str) -> InstitutionType {
        self.get(name)
            .map(|node| node.institution_type)
            .unwrap_or_else(|| self.typer.type_of(name))
    }

    /// Walk the parent chain to the effective root.
    ///
    /// Terminates in at most `count() + 1` steps: every step either visits a
    /// new name or stops.
    pub fn resolve(&self, name: &str) -> Resolution {
        let start = normalize_name(name);
        let mut visited: HashSet<String> = HashSet::new();
        let mut chain = vec![start.clone()];
        visited.insert(start.clone());

        let mut current = start.clone();
        let mut unresolved_parent = None;

        loop {
            let Some(parent) = self.get(&current).and_then(|n| n.parent.clone()) else {
                break;
            };

            if self.get(&parent).is_none() {
                unresolved_parent = Some(parent);
                break;
            }

            if !visited.insert(parent.clone()) {
                warn!(
                    institution = %start,
                    chain = ?chain,
                    "CyclicHierarchy: parent chain loops back to '{}'; treating '{}' as its own root",
                    parent,
                    start
                );
                return Resolution {
                    root: start.clone(),
                    chain: vec![start],
                    unresolved_parent,
                    cyclic: true,
                };
            }

            chain.push(parent.clone());
            current = parent;
        }

        Resolution {
            root: current,
            chain,
            unresolved_parent,
            cyclic: false,
        }
    }

    /// Direct children, sorted by name
    pub fn children_of(&self, name: &str) -> Vec<&InstitutionNode> {
        let key = normalize_name(name);
        self.nodes
            .values()
            .filter(|n| n.parent.as_deref() == Some(key.as_str()))
            .collect()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;

    fn builder() -> HierarchyBuilder {
        HierarchyBuilder::new(PipelineConfig::default().institution_typer())
    }

    #[test]
    fn test_type_from_keywords() {
        let typer = PipelineConfig::default().institution_typer();

        assert_eq!(typer.type_of("서울시교육청"), InstitutionType::EducationAuthority);
        assert_eq!(typer.type_of("수원교육지원청"), InstitutionType::EducationAuthority);
        assert_eq!(typer.type_of("종로구"), InstitutionType::LocalGovernment);
        assert_eq!(typer.type_of("부산광역시"), InstitutionType::LocalGovernment);
        assert_eq!(typer.type_of("한국토지주택공사"), InstitutionType::Other);
        // Unknown names default to local government
        assert_eq!(typer.type_of("국가기록원"), InstitutionType::LocalGovernment);
    }

    #[test]
    fn test_suffix_vs_contains() {
        let suffix = InstitutionKeyword {
            keyword: "시".to_string(),
            institution_type: InstitutionType::LocalGovernment,
            match_kind: KeywordMatch::Suffix,
        };
        assert!(suffix.matches("수원시"));
        assert!(!suffix.matches("시흥교육지원청"));

        let contains = InstitutionKeyword {
            match_kind: KeywordMatch::Contains,
            ..suffix
        };
        assert!(contains.matches("시흥교육지원청"));
    }

    #[test]
    fn test_explicit_type_wins() {
        let mut b = builder();
        b.insert(InstitutionEntry::new("서울기록원").with_type(InstitutionType::Other));
        let table = b.build();

        assert_eq!(table.institution_type("서울기록원"), InstitutionType::Other);
    }

    #[test]
    fn test_parent_chain() {
        let mut b = builder();
        b.insert(InstitutionEntry::new("서울특별시"));
        b.insert(InstitutionEntry::new("종로구").with_parent("서울특별시"));
        b.insert(InstitutionEntry::new("종로구 기록관").with_parent("종로구"));
        let table = b.build();

        let resolution = table.resolve("종로구 기록관");
        assert_eq!(resolution.root, "서울특별시");
        assert_eq!(resolution.chain, vec!["종로구 기록관", "종로구", "서울특별시"]);
        assert!(!resolution.cyclic);
        assert_eq!(resolution.unresolved_parent, None);

        assert_eq!(table.parent_of("종로구").unwrap().name, "서울특별시");
        assert_eq!(table.children_of("서울특별시").len(), 1);
    }

    #[test]
    fn test_unresolved_parent_is_left_null() {
        let mut b = builder();
        b.insert(InstitutionEntry::new("강남구").with_parent("없는기관"));
        let table = b.build();

        assert!(table.parent_of("강남구").is_none());

        let resolution = table.resolve("강남구");
        assert_eq!(resolution.root, "강남구");
        assert_eq!(resolution.unresolved_parent.as_deref(), Some("없는기관"));
        assert!(!resolution.cyclic);
    }

    #[test]
    fn test_two_node_cycle_terminates() {
        let mut b = builder();
        b.insert(InstitutionEntry::new("A").with_parent("B"));
        b.insert(InstitutionEntry::new("B").with_parent("A"));
        let table = b.build();

        let a = table.resolve("A");
        let b = table.resolve("B");

        assert!(a.cyclic);
        assert!(b.cyclic);
        assert_eq!(a.root, "A");
        assert_eq!(b.root, "B");
    }

    #[test]
    fn test_self_parent_and_tail_cycle() {
        let mut b = builder();
        b.insert(InstitutionEntry::new("self").with_parent("self"));
        b.insert(InstitutionEntry::new("x").with_parent("y"));
        b.insert(InstitutionEntry::new("y").with_parent("z"));
        b.insert(InstitutionEntry::new("z").with_parent("y"));
        let table = b.build();

        let own = table.resolve("self");
        assert!(own.cyclic);
        assert_eq!(own.root, "self");

        // x is outside the loop but its chain runs into it
        let tail = table.resolve("x");
        assert!(tail.cyclic);
        assert_eq!(tail.root, "x");
    }

    #[test]
    fn test_unknown_institution_is_its_own_root() {
        let table = builder().build();

        let resolution = table.resolve("처음보는기관");
        assert_eq!(resolution.root, "처음보는기관");
        assert!(!resolution.cyclic);
        assert_eq!(resolution.unresolved_parent, None);
        assert_eq!(table.institution_type("처음보는교육청"), InstitutionType::EducationAuthority);
    }

    #[test]
    fn test_duplicates_fill_missing_parent() {
        let mut b = builder();
        b.insert(InstitutionEntry::new("수원시"));
        b.insert(InstitutionEntry::new("경기도"));
        b.insert(InstitutionEntry::new(" 수원시 ").with_parent("경기도"));
        b.insert(InstitutionEntry::new("수원시").with_parent("다른곳"));
        let table = b.build();

        assert_eq!(table.count(), 2);
        assert_eq!(table.get("수원시").unwrap().parent.as_deref(), Some("경기도"));
    }

    #[test]
    fn test_name_normalization() {
        assert_eq!(normalize_name("  서울  특별시 교육청 "), "서울 특별시 교육청");
    }
}
