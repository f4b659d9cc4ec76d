//! Rubric catalogs: versioned, stage-specific definitions of scoreable items.
//!
//! A catalog is plain data. The scoring engine never special-cases a stage;
//! adding a stage means registering another [`RubricCatalog`] value, either
//! in code or from a TOML/JSON file through [`CatalogRegistry::load_file`].

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::workflow::Stage;

/// Identifier of the combined IMER/PIMEC rubric.
pub const IMER_PIMEC_CATALOG_ID: &str = "imer-pimec";
/// Identifier of the university evaluation rubric.
pub const UEC_CATALOG_ID: &str = "uec";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors raised while defining, loading or resolving catalogs.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("catalog {catalog}: duplicate item id '{item_id}'")]
    DuplicateItem { catalog: String, item_id: String },

    #[error("catalog {catalog}: duplicate section id '{section_id}'")]
    DuplicateSection { catalog: String, section_id: String },

    #[error("catalog {catalog}: item '{item_id}' references unknown section '{section_id}'")]
    UnknownSection {
        catalog: String,
        item_id: String,
        section_id: String,
    },

    #[error("catalog {catalog} defines no items")]
    Empty { catalog: String },

    #[error("catalog {catalog}: combined item maxima exceed u32")]
    MaxOverflow { catalog: String },

    #[error("unknown catalog: {0}")]
    UnknownCatalog(String),

    #[error("no rubric catalog is bound to stage {0}")]
    NoCatalogForStage(Stage),

    #[error("failed to read catalog file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse catalog file {path}: {details}")]
    Parse { path: String, details: String },
}

// ---------------------------------------------------------------------------
// Definitions
// ---------------------------------------------------------------------------

/// Context flags an item's applicability is evaluated against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoringContext {
    /// Whether the IM under review is a module (as opposed to e.g. a
    /// laboratory manual or textbook chapter).
    #[serde(alias = "isModule")]
    pub is_module: bool,
}

impl ScoringContext {
    pub fn module() -> Self {
        Self { is_module: true }
    }

    pub fn non_module() -> Self {
        Self { is_module: false }
    }
}

/// When an item participates in scoring.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Applicability {
    #[default]
    Always,
    ModuleOnly,
    NonModuleOnly,
}

impl Applicability {
    pub fn applies(self, context: ScoringContext) -> bool {
        match self {
            Self::Always => true,
            Self::ModuleOnly => context.is_module,
            Self::NonModuleOnly => !context.is_module,
        }
    }
}

/// A single scoreable rubric item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RubricItem {
    pub id: String,
    pub label: String,
    pub max: u32,
    pub section: String,
    #[serde(default, skip_serializing_if = "is_always")]
    pub applies_when: Applicability,
}

fn is_always(a: &Applicability) -> bool {
    *a == Applicability::Always
}

impl RubricItem {
    pub fn new(id: &str, section: &str, max: u32, label: &str) -> Self {
        Self {
            id: id.to_string(),
            label: label.to_string(),
            max,
            section: section.to_string(),
            applies_when: Applicability::Always,
        }
    }

    pub fn module_only(mut self) -> Self {
        self.applies_when = Applicability::ModuleOnly;
        self
    }

    pub fn is_visible(&self, context: ScoringContext) -> bool {
        self.applies_when.applies(context)
    }
}

/// A named group of items. Its maximum is derived, never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RubricSection {
    pub id: String,
    /// Title as it appears in ledger lines, e.g. `"A. Content"`.
    pub title: String,
}

impl RubricSection {
    pub fn new(id: &str, title: &str) -> Self {
        Self {
            id: id.to_string(),
            title: title.to_string(),
        }
    }
}

/// Serialized shape of a catalog; validated into [`RubricCatalog`].
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CatalogDef {
    id: String,
    version: u32,
    title: String,
    #[serde(default)]
    stages: Vec<Stage>,
    sections: Vec<RubricSection>,
    items: Vec<RubricItem>,
}

/// An immutable, validated rubric catalog.
///
/// # Invariants
///
/// Item ids and section ids are unique; every item belongs to a declared
/// section; at least one item exists; the item maxima sum within `u32`, so
/// no subtotal or total can overflow. Fields are only reachable through
/// accessors, so maxima cannot change after construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "CatalogDef", into = "CatalogDef")]
pub struct RubricCatalog {
    id: String,
    version: u32,
    title: String,
    stages: Vec<Stage>,
    sections: Vec<RubricSection>,
    items: Vec<RubricItem>,
}

impl TryFrom<CatalogDef> for RubricCatalog {
    type Error = CatalogError;

    fn try_from(def: CatalogDef) -> Result<Self, Self::Error> {
        Self::new(
            def.id,
            def.version,
            def.title,
            def.stages,
            def.sections,
            def.items,
        )
    }
}

impl From<RubricCatalog> for CatalogDef {
    fn from(c: RubricCatalog) -> Self {
        Self {
            id: c.id,
            version: c.version,
            title: c.title,
            stages: c.stages,
            sections: c.sections,
            items: c.items,
        }
    }
}

impl RubricCatalog {
    /// Build and validate a catalog.
    pub fn new(
        id: impl Into<String>,
        version: u32,
        title: impl Into<String>,
        stages: Vec<Stage>,
        sections: Vec<RubricSection>,
        items: Vec<RubricItem>,
    ) -> Result<Self, CatalogError> {
        let id = id.into();
        if items.is_empty() {
            return Err(CatalogError::Empty { catalog: id });
        }

        let mut section_ids = HashSet::new();
        for s in &sections {
            if !section_ids.insert(s.id.as_str()) {
                return Err(CatalogError::DuplicateSection {
                    catalog: id.clone(),
                    section_id: s.id.clone(),
                });
            }
        }

        let mut item_ids = HashSet::new();
        for item in &items {
            if !item_ids.insert(item.id.as_str()) {
                return Err(CatalogError::DuplicateItem {
                    catalog: id.clone(),
                    item_id: item.id.clone(),
                });
            }
            if !section_ids.contains(item.section.as_str()) {
                return Err(CatalogError::UnknownSection {
                    catalog: id.clone(),
                    item_id: item.id.clone(),
                    section_id: item.section.clone(),
                });
            }
        }

        if items
            .iter()
            .try_fold(0u32, |acc, item| acc.checked_add(item.max))
            .is_none()
        {
            return Err(CatalogError::MaxOverflow { catalog: id });
        }

        Ok(Self {
            id,
            version,
            title: title.into(),
            stages,
            sections,
            items,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    /// Stages this catalog is bound to by default.
    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn sections(&self) -> &[RubricSection] {
        &self.sections
    }

    pub fn items(&self) -> &[RubricItem] {
        &self.items
    }

    pub fn item(&self, item_id: &str) -> Option<&RubricItem> {
        self.items.iter().find(|i| i.id == item_id)
    }

    /// Items of a section that participate under `context`, in catalog order.
    pub fn visible_items<'a>(
        &'a self,
        section_id: &'a str,
        context: ScoringContext,
    ) -> impl Iterator<Item = &'a RubricItem> + 'a {
        self.items
            .iter()
            .filter(move |i| i.section == section_id && i.is_visible(context))
    }

    /// Sum of visible item maxima of one section.
    pub fn section_max(&self, section_id: &str, context: ScoringContext) -> u32 {
        self.visible_items(section_id, context).map(|i| i.max).sum()
    }

    /// Denominator of the grand total, recomputed from the filtered catalog.
    pub fn total_max(&self, context: ScoringContext) -> u32 {
        self.items
            .iter()
            .filter(|i| i.is_visible(context))
            .map(|i| i.max)
            .sum()
    }
}

// ---------------------------------------------------------------------------
// Built-in catalogs
// ---------------------------------------------------------------------------

/// `(id, section, max, applicability, label)`
type ItemRow = (&'static str, &'static str, u32, Applicability, &'static str);

/// The IMER/PIMEC rubric: sections A–E, 22 items, 100 points. Sections B, D
/// and E only apply to modules.
pub fn imer_pimec_catalog() -> RubricCatalog {
    use Applicability::{Always, ModuleOnly};

    let sections = vec![
        RubricSection::new("A", "A. Content"),
        RubricSection::new("B", "B. Learning Objectives"),
        RubricSection::new("C", "C. Instructional Design and Presentation"),
        RubricSection::new("D", "D. Assessment"),
        RubricSection::new("E", "E. Module Structure"),
    ];
    let items: &[ItemRow] = &[
        ("a1", "A", 5, Always, "Content is aligned with the course outcomes and syllabus"),
        ("a2", "A", 5, Always, "Concepts are accurate, current and free of factual errors"),
        ("a3", "A", 5, Always, "Content is free from social, cultural and gender bias"),
        ("b1", "B", 5, ModuleOnly, "Objectives are stated at the start of each module"),
        ("b2", "B", 5, ModuleOnly, "Objectives are specific, measurable and attainable"),
        ("b3", "B", 5, ModuleOnly, "Lessons and activities are aligned with the objectives"),
        ("c1", "C", 5, Always, "Language is appropriate to the level of the learners"),
        ("c2", "C", 5, Always, "Concepts are presented in a logical sequence"),
        ("c3", "C", 5, Always, "Explanations and examples are clear and sufficient"),
        ("c4", "C", 5, Always, "Illustrations, tables and figures support the text"),
        ("c5", "C", 5, Always, "Learning activities develop critical thinking"),
        ("c6", "C", 5, Always, "Activities encourage engagement and independent study"),
        ("c7", "C", 5, Always, "Typography, spacing and layout are readable"),
        ("c8", "C", 5, Always, "Sources and references are properly cited"),
        ("c9", "C", 5, Always, "Material observes copyright and intellectual property rules"),
        ("c10", "C", 5, Always, "Overall organization supports self-paced learning"),
        ("d1", "D", 4, ModuleOnly, "Assessment tasks measure the stated objectives"),
        ("d2", "D", 3, ModuleOnly, "Assessment items are varied and appropriate"),
        ("d3", "D", 3, ModuleOnly, "Answer keys or scoring rubrics are provided"),
        ("e1", "E", 4, ModuleOnly, "Module has an overview, lessons and a summary"),
        ("e2", "E", 3, ModuleOnly, "Each lesson includes practice and feedback"),
        ("e3", "E", 3, ModuleOnly, "Module includes a glossary and references"),
    ];
    builtin(
        IMER_PIMEC_CATALOG_ID,
        "IMER/PIMEC Evaluation Rubric",
        vec![Stage::Imer, Stage::Pimec],
        sections,
        items,
    )
}

/// The UEC rubric: 4 sections, 11 items, 65 points.
pub fn uec_catalog() -> RubricCatalog {
    use Applicability::Always;

    let sections = vec![
        RubricSection::new("I", "I. Relevance"),
        RubricSection::new("II", "II. Content Quality"),
        RubricSection::new("III", "III. Pedagogy"),
        RubricSection::new("IV", "IV. Publication Readiness"),
    ];
    let items: &[ItemRow] = &[
        ("u1", "I", 5, Always, "Material responds to program and curriculum needs"),
        ("u2", "I", 5, Always, "Material supports the institution's vision and mission"),
        ("u3", "I", 5, Always, "Material addresses current needs of the discipline"),
        ("u4", "II", 10, Always, "Content is accurate, sufficient and up to date"),
        ("u5", "II", 5, Always, "Content reflects outcomes-based education principles"),
        ("u6", "II", 5, Always, "Content integrates values and local context"),
        ("u7", "III", 5, Always, "Teaching and learning strategies are appropriate"),
        ("u8", "III", 10, Always, "Assessment is aligned with intended learning outcomes"),
        ("u9", "IV", 5, Always, "Text is free of grammatical and typographical errors"),
        ("u10", "IV", 5, Always, "Layout meets institutional publication standards"),
        ("u11", "IV", 5, Always, "Copyright and attribution requirements are satisfied"),
    ];
    builtin(
        UEC_CATALOG_ID,
        "University Evaluation Committee Rubric",
        vec![Stage::Uec],
        sections,
        items,
    )
}

fn builtin(
    id: &str,
    title: &str,
    stages: Vec<Stage>,
    sections: Vec<RubricSection>,
    items: &[ItemRow],
) -> RubricCatalog {
    let items = items
        .iter()
        .map(|&(item_id, section, max, applies_when, label)| RubricItem {
            applies_when,
            ..RubricItem::new(item_id, section, max, label)
        })
        .collect();
    // Built-in definitions are covered by tests; they cannot fail validation.
    RubricCatalog {
        id: id.to_string(),
        version: 1,
        title: title.to_string(),
        stages,
        sections,
        items,
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Catalogs by id, with stage bindings derived from each catalog's `stages`.
#[derive(Debug, Clone, Default)]
pub struct CatalogRegistry {
    catalogs: BTreeMap<String, RubricCatalog>,
}

impl CatalogRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the IMER/PIMEC and UEC catalogs.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.insert(imer_pimec_catalog());
        registry.insert(uec_catalog());
        registry
    }

    /// Register a catalog, replacing any catalog with the same id. Stage
    /// bindings of the replaced catalog are dropped with it.
    pub fn insert(&mut self, catalog: RubricCatalog) -> Option<RubricCatalog> {
        self.catalogs.insert(catalog.id.clone(), catalog)
    }

    pub fn get(&self, id: &str) -> Result<&RubricCatalog, CatalogError> {
        self.catalogs
            .get(id)
            .ok_or_else(|| CatalogError::UnknownCatalog(id.to_string()))
    }

    /// The catalog bound to a review stage. When several catalogs claim the
    /// same stage the one with the highest version wins.
    pub fn for_stage(&self, stage: Stage) -> Result<&RubricCatalog, CatalogError> {
        self.catalogs
            .values()
            .filter(|c| c.stages.contains(&stage))
            .max_by_key(|c| c.version)
            .ok_or(CatalogError::NoCatalogForStage(stage))
    }

    pub fn iter(&self) -> impl Iterator<Item = &RubricCatalog> {
        self.catalogs.values()
    }

    /// Load a catalog from a `.toml` or `.json` file and register it.
    pub fn load_file(&mut self, path: &Path) -> Result<&RubricCatalog, CatalogError> {
        let shown = path.display().to_string();
        let raw = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: shown.clone(),
            source,
        })?;
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        let catalog: RubricCatalog = if is_json {
            serde_json::from_str(&raw).map_err(|e| CatalogError::Parse {
                path: shown.clone(),
                details: e.to_string(),
            })?
        } else {
            toml::from_str(&raw).map_err(|e| CatalogError::Parse {
                path: shown.clone(),
                details: e.to_string(),
            })?
        };
        tracing::debug!(
            catalog = %catalog.id,
            version = catalog.version,
            path = %shown,
            "catalog loaded"
        );
        let id = catalog.id.clone();
        self.insert(catalog);
        self.get(&id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn imer_catalog_shape() {
        let c = imer_pimec_catalog();
        assert_eq!(c.items().len(), 22);
        assert_eq!(c.sections().len(), 5);
        assert_eq!(c.total_max(ScoringContext::module()), 100);
        assert_eq!(c.section_max("A", ScoringContext::module()), 15);
        assert_eq!(c.section_max("C", ScoringContext::module()), 50);
        assert_eq!(c.section_max("D", ScoringContext::module()), 10);
    }

    #[test]
    fn imer_catalog_non_module_drops_b_d_e() {
        let c = imer_pimec_catalog();
        assert_eq!(c.total_max(ScoringContext::non_module()), 65);
        assert_eq!(c.section_max("B", ScoringContext::non_module()), 0);
        assert_eq!(c.section_max("E", ScoringContext::non_module()), 0);
    }

    #[test]
    fn uec_catalog_shape() {
        let c = uec_catalog();
        assert_eq!(c.items().len(), 11);
        assert_eq!(c.sections().len(), 4);
        assert_eq!(c.total_max(ScoringContext::module()), 65);
        assert_eq!(c.total_max(ScoringContext::non_module()), 65);
    }

    #[test]
    fn builtins_pass_validation() {
        for c in [imer_pimec_catalog(), uec_catalog()] {
            let def: CatalogDef = c.clone().into();
            let rebuilt = RubricCatalog::try_from(def).expect("builtin catalog is valid");
            assert_eq!(rebuilt, c);
        }
    }

    fn one_section(items: Vec<RubricItem>) -> Result<RubricCatalog, CatalogError> {
        let sections = vec![RubricSection::new("S", "S")];
        RubricCatalog::new("t", 1, "T", vec![], sections, items)
    }

    #[test]
    fn duplicate_item_rejected() {
        let err = one_section(vec![
            RubricItem::new("x", "S", 5, "x"),
            RubricItem::new("x", "S", 3, "y"),
        ])
        .unwrap_err();
        assert!(matches!(err, CatalogError::DuplicateItem { .. }));
    }

    #[test]
    fn unknown_section_rejected() {
        let err = one_section(vec![RubricItem::new("x", "T", 5, "x")]).unwrap_err();
        assert!(matches!(err, CatalogError::UnknownSection { .. }));
    }

    #[test]
    fn combined_maxima_beyond_u32_rejected() {
        let err = one_section(vec![
            RubricItem::new("x", "S", u32::MAX, "x"),
            RubricItem::new("y", "S", 1, "y"),
        ])
        .unwrap_err();
        assert!(matches!(err, CatalogError::MaxOverflow { .. }));

        let at_limit = one_section(vec![
            RubricItem::new("x", "S", u32::MAX - 1, "x"),
            RubricItem::new("y", "S", 1, "y"),
        ])
        .unwrap();
        assert_eq!(at_limit.total_max(ScoringContext::module()), u32::MAX);
    }

    #[test]
    fn deserialization_validates() {
        let json = serde_json::json!({
            "id": "broken",
            "version": 1,
            "title": "Broken",
            "sections": [{"id": "S", "title": "S"}],
            "items": []
        });
        assert!(serde_json::from_value::<RubricCatalog>(json).is_err());
    }

    #[test]
    fn registry_resolves_stages() {
        let registry = CatalogRegistry::builtin();
        let bound = |stage| registry.for_stage(stage).map(|c| c.id().to_string());
        assert_eq!(bound(Stage::Imer).unwrap(), IMER_PIMEC_CATALOG_ID);
        assert_eq!(bound(Stage::Pimec).unwrap(), IMER_PIMEC_CATALOG_ID);
        assert_eq!(bound(Stage::Uec).unwrap(), UEC_CATALOG_ID);
        assert!(matches!(
            registry.for_stage(Stage::Admin),
            Err(CatalogError::NoCatalogForStage(Stage::Admin))
        ));
    }

    #[test]
    fn newer_catalog_version_wins_for_stage() {
        let mut registry = CatalogRegistry::builtin();
        let v2 = RubricCatalog::new(
            "uec-v2",
            2,
            "UEC v2",
            vec![Stage::Uec],
            vec![RubricSection::new("I", "I. Relevance")],
            vec![RubricItem::new("u1", "I", 10, "Relevance")],
        )
        .unwrap();
        registry.insert(v2);
        assert_eq!(registry.for_stage(Stage::Uec).unwrap().id(), "uec-v2");
    }
}
