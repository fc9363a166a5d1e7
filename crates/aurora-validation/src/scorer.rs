//! Risk scoring.
//!
//! A scorer only decides what a single finding does to the assessment. Applying impacts
//! through [`RiskAssessment`] keeps the level monotonic whatever the scorer says.

use aurora_core::{RiskAssessment, RiskLevel};

use crate::finding::{Finding, FindingKind};

/// What one finding does to the running assessment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Impact {
    /// Raise the level to at least this.
    AtLeast(RiskLevel),
    /// Raise the level one step.
    Escalate,
    /// CRITICAL and undeployable, even with approval.
    Block,
}

pub trait RiskScorer: Send + Sync {
    fn impact(&self, finding: &Finding) -> Impact;

    /// Fold a finding into an assessment.
    fn apply(&self, assessment: &mut RiskAssessment, finding: &Finding) {
        match self.impact(finding) {
            Impact::AtLeast(level) => assessment.record(level, finding.message.clone()),
            Impact::Escalate => assessment.escalate(finding.message.clone()),
            Impact::Block => assessment.block(finding.message.clone()),
        }
    }
}

/// Maps each finding kind onto a fixed level. No weights, no sums.
#[derive(Debug, Clone, Copy, Default)]
pub struct CategoricalScorer;

impl RiskScorer for CategoricalScorer {
    fn impact(&self, finding: &Finding) -> Impact {
        match finding.kind {
            FindingKind::ChecksumMismatch | FindingKind::Malformed => Impact::Block,
            FindingKind::SemanticMismatch
            | FindingKind::MissingValue
            | FindingKind::NotExpressible
            | FindingKind::AggressiveSlo => Impact::AtLeast(RiskLevel::High),
            FindingKind::NoSafeCommit | FindingKind::PartialDeployment => {
                Impact::AtLeast(RiskLevel::Medium)
            }
            FindingKind::SharedInfrastructure => Impact::AtLeast(RiskLevel::Low),
            FindingKind::ProductionOverlap => Impact::Escalate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aurora_core::IntentField;

    fn findings() -> Vec<Finding> {
        vec![
            Finding::shared_infrastructure("PE1", &["svc-a"]),
            Finding::no_safe_commit("PE3"),
            Finding::missing_value("PE1", IntentField::Mtu, "9000"),
            Finding::partial_deployment(&["P1".to_string()]),
            Finding::production_overlap(&["PE1"]),
            Finding::malformed("PE2", "unexpected end of input"),
            Finding::shared_infrastructure("PE2", &["svc-b"]),
        ]
    }

    #[test]
    fn appending_findings_never_lowers_the_level() {
        let scorer = CategoricalScorer;
        let mut assessment = RiskAssessment::new();
        let mut previous = assessment.risk_level;
        for finding in findings() {
            scorer.apply(&mut assessment, &finding);
            assert!(assessment.risk_level >= previous);
            previous = assessment.risk_level;
        }
        assert_eq!(assessment.risk_level, RiskLevel::Critical);
        assert!(assessment.blocked);
        assert_eq!(assessment.reasons.len(), 7);
    }

    #[test]
    fn production_overlap_raises_one_level() {
        let scorer = CategoricalScorer;
        let mut assessment = RiskAssessment::new();
        scorer.apply(&mut assessment, &Finding::no_safe_commit("PE3"));
        scorer.apply(&mut assessment, &Finding::production_overlap(&["PE3"]));
        assert_eq!(assessment.risk_level, RiskLevel::High);
        assert!(!assessment.blocked);
    }

    #[test]
    fn final_level_is_the_maximum_not_an_average() {
        let scorer = CategoricalScorer;
        let mut assessment = RiskAssessment::new();
        scorer.apply(&mut assessment, &Finding::aggressive_slo(5.0));
        for _ in 0..5 {
            scorer.apply(&mut assessment, &Finding::shared_infrastructure("PE1", &["svc-a"]));
        }
        assert_eq!(assessment.risk_level, RiskLevel::High);
    }
}
