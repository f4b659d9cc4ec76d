//! Workflow statuses and review stages.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::WorkflowError;

/// Status of an IM in the review pipeline.
///
/// The serialized and displayed form is the exact string persisted in the
/// record's status field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WorkflowStatus {
    #[serde(rename = "Assigned to Faculty")]
    AssignedToFaculty,
    #[serde(rename = "For IMER Evaluation")]
    ForImerEvaluation,
    #[serde(rename = "For PIMEC Evaluation")]
    ForPimecEvaluation,
    #[serde(rename = "For UTLDO Evaluation")]
    ForUtldoEvaluation,
    #[serde(rename = "For Certification")]
    ForCertification,
    #[serde(rename = "For Resubmission")]
    ForResubmission,
    #[serde(rename = "Certified")]
    Certified,
    #[serde(rename = "Published")]
    Published,
}

impl WorkflowStatus {
    pub const ALL: [WorkflowStatus; 8] = [
        Self::AssignedToFaculty,
        Self::ForImerEvaluation,
        Self::ForPimecEvaluation,
        Self::ForUtldoEvaluation,
        Self::ForCertification,
        Self::ForResubmission,
        Self::Certified,
        Self::Published,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::AssignedToFaculty => "Assigned to Faculty",
            Self::ForImerEvaluation => "For IMER Evaluation",
            Self::ForPimecEvaluation => "For PIMEC Evaluation",
            Self::ForUtldoEvaluation => "For UTLDO Evaluation",
            Self::ForCertification => "For Certification",
            Self::ForResubmission => "For Resubmission",
            Self::Certified => "Certified",
            Self::Published => "Published",
        }
    }

    /// No transition leaves a terminal status.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Certified | Self::Published)
    }
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkflowStatus {
    type Err = WorkflowError;

    /// Case-insensitive, surrounding whitespace ignored.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Self::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| WorkflowError::UnknownStatus(s.to_string()))
    }
}

/// The actor acting on an IM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    #[serde(alias = "FACULTY", alias = "Faculty")]
    Faculty,
    #[serde(alias = "IMER")]
    Imer,
    #[serde(alias = "PIMEC")]
    Pimec,
    #[serde(alias = "UEC", alias = "utldo", alias = "UTLDO")]
    Uec,
    #[serde(alias = "ADMIN", alias = "Admin")]
    Admin,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Faculty => "Faculty",
            Self::Imer => "IMER",
            Self::Pimec => "PIMEC",
            Self::Uec => "UEC",
            Self::Admin => "Admin",
        }
    }

    /// Statuses in which this stage may act at all.
    pub fn acts_on(self) -> &'static [WorkflowStatus] {
        match self {
            Self::Faculty => &[
                WorkflowStatus::AssignedToFaculty,
                WorkflowStatus::ForResubmission,
            ],
            Self::Imer => &[WorkflowStatus::ForImerEvaluation],
            Self::Pimec => &[WorkflowStatus::ForPimecEvaluation],
            Self::Uec => &[WorkflowStatus::ForUtldoEvaluation],
            Self::Admin => &[WorkflowStatus::ForCertification],
        }
    }

    /// Whether this stage scores a rubric.
    pub fn is_rubric_stage(self) -> bool {
        matches!(self, Self::Imer | Self::Pimec | Self::Uec)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = WorkflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "faculty" => Ok(Self::Faculty),
            "imer" => Ok(Self::Imer),
            "pimec" => Ok(Self::Pimec),
            "uec" | "utldo" => Ok(Self::Uec),
            "admin" => Ok(Self::Admin),
            _ => Err(WorkflowError::UnknownStage(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_display_parse_roundtrip() {
        for status in WorkflowStatus::ALL {
            assert_eq!(
                status.to_string().parse::<WorkflowStatus>().unwrap(),
                status
            );
        }
    }

    #[test]
    fn status_parse_is_lenient_on_case_and_whitespace() {
        assert_eq!(
            "  for imer evaluation ".parse::<WorkflowStatus>().unwrap(),
            WorkflowStatus::ForImerEvaluation
        );
        assert!(matches!(
            "Under Review".parse::<WorkflowStatus>(),
            Err(WorkflowError::UnknownStatus(_))
        ));
    }

    #[test]
    fn status_serializes_as_persisted_string() {
        let json = serde_json::to_string(&WorkflowStatus::ForUtldoEvaluation).unwrap();
        assert_eq!(json, "\"For UTLDO Evaluation\"");
    }

    #[test]
    fn only_certified_and_published_are_terminal() {
        let terminal: Vec<_> = WorkflowStatus::ALL
            .into_iter()
            .filter(|s| s.is_terminal())
            .collect();
        assert_eq!(
            terminal,
            vec![WorkflowStatus::Certified, WorkflowStatus::Published]
        );
    }

    #[test]
    fn stage_parse_accepts_utldo_alias() {
        assert_eq!("UTLDO".parse::<Stage>().unwrap(), Stage::Uec);
        assert_eq!("imer".parse::<Stage>().unwrap(), Stage::Imer);
        let from_json: Stage = serde_json::from_str("\"PIMEC\"").unwrap();
        assert_eq!(from_json, Stage::Pimec);
        assert!("dean".parse::<Stage>().is_err());
    }
}
