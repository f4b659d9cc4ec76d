//! Rubric scoring engine.
//!
//! Folds a [`ScoreSheet`] into an [`EvaluationOutcome`] against a
//! [`RubricCatalog`] and a [`Threshold`]. The engine is catalog-agnostic and
//! pure: it refuses out-of-range and incomplete input instead of clamping or
//! defaulting, so whatever reaches the ledger is exactly what was entered.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::catalog::{RubricCatalog, ScoringContext};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors raised while filling or scoring a sheet.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScoringError {
    #[error("score {score} for item '{item_id}' is outside 0..={max}")]
    InvalidScore { item_id: String, score: i64, max: u32 },

    #[error("item '{item_id}' does not exist in catalog {catalog}")]
    UnknownItem { catalog: String, item_id: String },

    #[error("evaluation is incomplete: {} unscored item(s): {}", missing.len(), missing.join(", "))]
    Incomplete { catalog: String, missing: Vec<String> },

    #[error("score sheet belongs to catalog {sheet}, not {catalog}")]
    CatalogMismatch { sheet: String, catalog: String },
}

// ---------------------------------------------------------------------------
// Threshold
// ---------------------------------------------------------------------------

/// Pass/fail policy of a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "value", rename_all = "snake_case")]
pub enum Threshold {
    /// Raw points: `total ≥ value`.
    Absolute(u32),
    /// Percent of the filtered maximum: `total × 100 ≥ value × max`.
    Percentage(u32),
}

impl Threshold {
    /// IMER and PIMEC: 75 raw points out of a 100-point catalog.
    pub const IMER_PIMEC_DEFAULT: Threshold = Threshold::Absolute(75);
    /// UEC: 75% of the catalog maximum.
    pub const UEC_DEFAULT: Threshold = Threshold::Percentage(75);

    pub fn is_met(self, total: u32, total_max: u32) -> bool {
        match self {
            Self::Absolute(points) => total >= points,
            Self::Percentage(pct) => {
                u64::from(total) * 100 >= u64::from(pct) * u64::from(total_max)
            }
        }
    }
}

impl std::fmt::Display for Threshold {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Absolute(points) => write!(f, "{points} points"),
            Self::Percentage(pct) => write!(f, "{pct}%"),
        }
    }
}

// ---------------------------------------------------------------------------
// Score sheet
// ---------------------------------------------------------------------------

/// A reviewer's in-progress scores for one catalog.
///
/// Absent items are unscored, not zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreSheet {
    catalog_id: String,
    #[serde(default)]
    scores: BTreeMap<String, u32>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    section_comments: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    overall_comment: Option<String>,
}

impl ScoreSheet {
    /// An empty sheet for `catalog`.
    pub fn new(catalog: &RubricCatalog) -> Self {
        Self {
            catalog_id: catalog.id().to_string(),
            scores: BTreeMap::new(),
            section_comments: BTreeMap::new(),
            overall_comment: None,
        }
    }

    pub fn catalog_id(&self) -> &str {
        &self.catalog_id
    }

    /// Set one item's score.
    ///
    /// # Errors
    ///
    /// `UnknownItem` or `InvalidScore`; the sheet is left untouched so the
    /// rest of the entered scores survive.
    pub fn set(
        &mut self,
        catalog: &RubricCatalog,
        item_id: &str,
        score: i64,
    ) -> Result<(), ScoringError> {
        self.ensure_catalog(catalog)?;
        let item = catalog.item(item_id).ok_or_else(|| ScoringError::UnknownItem {
            catalog: catalog.id().to_string(),
            item_id: item_id.to_string(),
        })?;
        let value = u32::try_from(score)
            .ok()
            .filter(|v| *v <= item.max)
            .ok_or_else(|| ScoringError::InvalidScore {
                item_id: item_id.to_string(),
                score,
                max: item.max,
            })?;
        self.scores.insert(item_id.to_string(), value);
        Ok(())
    }

    /// Forget an item's score; it becomes incomplete again.
    pub fn clear(&mut self, item_id: &str) -> Option<u32> {
        self.scores.remove(item_id)
    }

    pub fn get(&self, item_id: &str) -> Option<u32> {
        self.scores.get(item_id).copied()
    }

    pub fn set_section_comment(&mut self, section_id: &str, comment: impl Into<String>) {
        let comment = comment.into();
        if comment.trim().is_empty() {
            self.section_comments.remove(section_id);
        } else {
            self.section_comments.insert(section_id.to_string(), comment);
        }
    }

    pub fn set_overall_comment(&mut self, comment: impl Into<String>) {
        let comment = comment.into();
        self.overall_comment = (!comment.trim().is_empty()).then_some(comment);
    }

    fn ensure_catalog(&self, catalog: &RubricCatalog) -> Result<(), ScoringError> {
        if self.catalog_id == catalog.id() {
            Ok(())
        } else {
            Err(ScoringError::CatalogMismatch {
                sheet: self.catalog_id.clone(),
                catalog: catalog.id().to_string(),
            })
        }
    }
}

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// Subtotal of one section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionScore {
    pub section: String,
    pub title: String,
    pub subtotal: u32,
    pub max: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

/// Result of scoring a complete sheet. Produced once, never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationOutcome {
    pub total_score: u32,
    pub total_max: u32,
    pub passed: bool,
    pub breakdown: Vec<SectionScore>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overall_comment: Option<String>,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Visible items that have no score yet, in catalog order.
pub fn missing_items(
    catalog: &RubricCatalog,
    sheet: &ScoreSheet,
    context: ScoringContext,
) -> Vec<String> {
    catalog
        .items()
        .iter()
        .filter(|i| i.is_visible(context))
        .filter(|i| !sheet.scores.contains_key(&i.id))
        .map(|i| i.id.clone())
        .collect()
}

/// Whether the sheet may be submitted under `context`.
pub fn is_complete(catalog: &RubricCatalog, sheet: &ScoreSheet, context: ScoringContext) -> bool {
    missing_items(catalog, sheet, context).is_empty()
}

/// Score a sheet.
///
/// Items hidden by `context` are excluded from both numerator and
/// denominator, and any score stored for them is ignored; sections left
/// without visible items are omitted from the breakdown.
///
/// # Errors
///
/// `CatalogMismatch`, `UnknownItem` for a score on an item the catalog does
/// not define, `InvalidScore` for a visible item scored above its maximum;
/// `Incomplete` when any visible item is unscored.
pub fn score_sheet(
    catalog: &RubricCatalog,
    sheet: &ScoreSheet,
    context: ScoringContext,
    threshold: Threshold,
) -> Result<EvaluationOutcome, ScoringError> {
    sheet.ensure_catalog(catalog)?;

    for (item_id, score) in &sheet.scores {
        let item = catalog.item(item_id).ok_or_else(|| ScoringError::UnknownItem {
            catalog: catalog.id().to_string(),
            item_id: item_id.clone(),
        })?;
        if item.is_visible(context) && *score > item.max {
            return Err(ScoringError::InvalidScore {
                item_id: item_id.clone(),
                score: i64::from(*score),
                max: item.max,
            });
        }
    }

    let missing = missing_items(catalog, sheet, context);
    if !missing.is_empty() {
        return Err(ScoringError::Incomplete {
            catalog: catalog.id().to_string(),
            missing,
        });
    }

    let mut breakdown = Vec::new();
    for section in catalog.sections() {
        let mut visible = catalog.visible_items(&section.id, context).peekable();
        if visible.peek().is_none() {
            continue;
        }
        // Visible scores are range-checked above and catalog maxima sum within u32.
        let (subtotal, max) = visible.fold((0u32, 0u32), |(sum, max), item| {
            (sum + sheet.get(&item.id).unwrap_or(0), max + item.max)
        });
        breakdown.push(SectionScore {
            section: section.id.clone(),
            title: section.title.clone(),
            subtotal,
            max,
            comment: sheet.section_comments.get(&section.id).cloned(),
        });
    }

    let total_score: u32 = breakdown.iter().map(|s| s.subtotal).sum();
    let total_max = catalog.total_max(context);
    let passed = threshold.is_met(total_score, total_max);

    tracing::debug!(
        catalog = %catalog.id(),
        total_score,
        total_max,
        passed,
        %threshold,
        "score sheet evaluated"
    );

    Ok(EvaluationOutcome {
        total_score,
        total_max,
        passed,
        breakdown,
        overall_comment: sheet.overall_comment.clone(),
    })
}

// ---------------------------------------------------------------------------
// Plain-data interface
// ---------------------------------------------------------------------------

/// Transport-independent scoring input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreRequest {
    #[serde(alias = "catalog_id")]
    pub catalog_id: String,
    pub scores: BTreeMap<String, i64>,
    pub context: ScoringContext,
    #[serde(default, alias = "section_comments")]
    pub section_comments: BTreeMap<String, String>,
    #[serde(default, alias = "overall_comment")]
    pub overall_comment: Option<String>,
}

impl ScoreRequest {
    /// Build a sheet, applying every acceptable field.
    ///
    /// Rejected fields are returned next to the sheet rather than failing
    /// the whole request.
    pub fn to_sheet(
        &self,
        catalog: &RubricCatalog,
    ) -> Result<(ScoreSheet, Vec<ScoringError>), ScoringError> {
        let mut sheet = ScoreSheet::new(catalog);
        if self.catalog_id != catalog.id() {
            return Err(ScoringError::CatalogMismatch {
                sheet: self.catalog_id.clone(),
                catalog: catalog.id().to_string(),
            });
        }
        let mut rejected = Vec::new();
        for (item_id, score) in &self.scores {
            if let Err(e) = sheet.set(catalog, item_id, *score) {
                tracing::warn!(item = %item_id, error = %e, "score rejected");
                rejected.push(e);
            }
        }
        for (section, comment) in &self.section_comments {
            sheet.set_section_comment(section, comment.clone());
        }
        if let Some(comment) = &self.overall_comment {
            sheet.set_overall_comment(comment.clone());
        }
        Ok((sheet, rejected))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{imer_pimec_catalog, uec_catalog};

    const IMER: Threshold = Threshold::IMER_PIMEC_DEFAULT;
    const UEC: Threshold = Threshold::UEC_DEFAULT;

    fn filled(
        catalog: &RubricCatalog,
        context: ScoringContext,
        pick: impl Fn(u32) -> u32,
    ) -> ScoreSheet {
        let mut sheet = ScoreSheet::new(catalog);
        for item in catalog.items().iter().filter(|i| i.is_visible(context)) {
            sheet.set(catalog, &item.id, i64::from(pick(item.max))).unwrap();
        }
        sheet
    }

    #[test]
    fn all_zero_fails() {
        let c = imer_pimec_catalog();
        let sheet = filled(&c, ScoringContext::module(), |_| 0);
        let out = score_sheet(&c, &sheet, ScoringContext::module(), IMER).unwrap();
        assert_eq!(out.total_score, 0);
        assert!(!out.passed);
    }

    #[test]
    fn all_max_passes() {
        let c = uec_catalog();
        let sheet = filled(&c, ScoringContext::module(), |max| max);
        let out = score_sheet(&c, &sheet, ScoringContext::module(), UEC).unwrap();
        assert_eq!(out.total_score, out.total_max);
        assert_eq!(out.total_max, 65);
        assert!(out.passed);
    }

    #[test]
    fn set_rejects_out_of_range_without_touching_sheet() {
        let c = imer_pimec_catalog();
        let mut sheet = ScoreSheet::new(&c);
        sheet.set(&c, "a1", 4).unwrap();

        let err = sheet.set(&c, "a1", 6).unwrap_err();
        assert_eq!(
            err,
            ScoringError::InvalidScore {
                item_id: "a1".into(),
                score: 6,
                max: 5
            }
        );
        assert!(matches!(
            sheet.set(&c, "a1", -1),
            Err(ScoringError::InvalidScore { .. })
        ));
        assert_eq!(sheet.get("a1"), Some(4));
    }

    #[test]
    fn set_rejects_unknown_item() {
        let c = imer_pimec_catalog();
        let mut sheet = ScoreSheet::new(&c);
        assert!(matches!(
            sheet.set(&c, "z9", 1),
            Err(ScoringError::UnknownItem { .. })
        ));
    }

    #[test]
    fn engine_refuses_out_of_range_from_deserialized_sheet() {
        let c = uec_catalog();
        let mut scores = serde_json::Map::new();
        for item in c.items() {
            scores.insert(item.id.clone(), serde_json::json!(item.max));
        }
        scores.insert("u1".into(), serde_json::json!(9));
        let sheet: ScoreSheet = serde_json::from_value(serde_json::json!({
            "catalog_id": "uec",
            "scores": scores
        }))
        .unwrap();
        let err = score_sheet(&c, &sheet, ScoringContext::module(), UEC).unwrap_err();
        assert!(matches!(err, ScoringError::InvalidScore { ref item_id, .. } if item_id == "u1"));
    }

    #[test]
    fn absent_is_incomplete_not_zero() {
        let c = imer_pimec_catalog();
        let mut sheet = filled(&c, ScoringContext::module(), |max| max);
        sheet.clear("c7");
        assert!(!is_complete(&c, &sheet, ScoringContext::module()));
        let err = score_sheet(&c, &sheet, ScoringContext::module(), IMER).unwrap_err();
        assert_eq!(
            err,
            ScoringError::Incomplete {
                catalog: "imer-pimec".into(),
                missing: vec!["c7".into()]
            }
        );
    }

    #[test]
    fn hidden_items_do_not_count_toward_completion() {
        let c = imer_pimec_catalog();
        let sheet = filled(&c, ScoringContext::non_module(), |max| max);
        assert!(is_complete(&c, &sheet, ScoringContext::non_module()));
        assert!(!is_complete(&c, &sheet, ScoringContext::module()));
    }

    #[test]
    fn module_filter_shrinks_total_and_breakdown() {
        let c = imer_pimec_catalog();
        let module = filled(&c, ScoringContext::module(), |max| max);
        let full = score_sheet(&c, &module, ScoringContext::module(), IMER).unwrap();

        let excluded_max: u32 = c
            .items()
            .iter()
            .filter(|i| !i.is_visible(ScoringContext::non_module()))
            .map(|i| i.max)
            .sum();
        let reduced = score_sheet(&c, &module, ScoringContext::non_module(), IMER).unwrap();

        assert_eq!(full.total_max - reduced.total_max, excluded_max);
        assert_eq!(reduced.total_score, reduced.total_max);
        let sections: Vec<&str> = reduced.breakdown.iter().map(|s| s.section.as_str()).collect();
        assert_eq!(sections, vec!["A", "C"]);
    }

    #[test]
    fn percentage_threshold_uses_integer_math() {
        // 75% of 65 is 48.75: 48 fails, 49 passes.
        assert!(!Threshold::Percentage(75).is_met(48, 65));
        assert!(Threshold::Percentage(75).is_met(49, 65));
        assert!(Threshold::Absolute(75).is_met(75, 100));
        assert!(!Threshold::Absolute(75).is_met(74, 100));
    }

    #[test]
    fn percentage_threshold_handles_large_totals() {
        assert!(Threshold::Percentage(100).is_met(u32::MAX, u32::MAX));
        assert!(!Threshold::Percentage(100).is_met(u32::MAX - 1, u32::MAX));
        assert!(Threshold::Percentage(50).is_met(u32::MAX / 2 + 1, u32::MAX));
    }

    #[test]
    fn stored_score_on_hidden_item_is_ignored() {
        let c = imer_pimec_catalog();
        let non_module = ScoringContext::non_module();
        let mut scores = serde_json::Map::new();
        for item in c.items().iter().filter(|i| i.is_visible(non_module)) {
            scores.insert(item.id.clone(), serde_json::json!(item.max));
        }
        // b1 is module-only with a maximum of 5.
        scores.insert("b1".into(), serde_json::json!(40));
        let sheet: ScoreSheet = serde_json::from_value(serde_json::json!({
            "catalog_id": "imer-pimec",
            "scores": scores
        }))
        .unwrap();

        let out = score_sheet(&c, &sheet, non_module, IMER).unwrap();
        assert_eq!(out.total_score, out.total_max);
        assert_eq!(out.total_max, 65);

        let err = score_sheet(&c, &sheet, ScoringContext::module(), IMER).unwrap_err();
        assert!(matches!(err, ScoringError::InvalidScore { ref item_id, .. } if item_id == "b1"));
    }

    #[test]
    fn comments_flow_into_outcome() {
        let c = uec_catalog();
        let mut sheet = filled(&c, ScoringContext::module(), |max| max);
        sheet.set_section_comment("II", "Update the statistics chapter");
        sheet.set_overall_comment("Ready for certification");
        sheet.set_section_comment("III", "   ");
        let out = score_sheet(&c, &sheet, ScoringContext::module(), UEC).unwrap();
        let comment = |idx: usize| out.breakdown[idx].comment.as_deref();
        assert_eq!(comment(1), Some("Update the statistics chapter"));
        assert_eq!(comment(2), None);
        let overall = out.overall_comment.as_deref();
        assert_eq!(overall, Some("Ready for certification"));
    }

    #[test]
    fn request_keeps_good_fields_and_reports_bad_ones() {
        let c = uec_catalog();
        let request: ScoreRequest = serde_json::from_value(serde_json::json!({
            "catalogId": "uec",
            "scores": {"u1": 5, "u2": 50, "nope": 1},
            "context": {"is_module": false}
        }))
        .unwrap();
        let (sheet, rejected) = request.to_sheet(&c).unwrap();
        assert_eq!(sheet.get("u1"), Some(5));
        assert_eq!(sheet.get("u2"), None);
        assert_eq!(rejected.len(), 2);
    }

    #[test]
    fn catalog_mismatch_refused() {
        let imer = imer_pimec_catalog();
        let uec = uec_catalog();
        let sheet = ScoreSheet::new(&imer);
        assert!(matches!(
            score_sheet(&uec, &sheet, ScoringContext::module(), UEC),
            Err(ScoringError::CatalogMismatch { .. })
        ));
    }
}
