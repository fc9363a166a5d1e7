//! Validation of generated payloads and risk assessment.
//!
//! - [`syntax`]: well-formedness per payload format, usable on its own through [`validate`]
//! - [`engine`]: semantic and impact checks over a whole request
//! - [`scorer`]: pluggable mapping from findings to risk levels
//! - [`plan`]: verification and commit plans attached to the response

pub mod engine;
pub mod finding;
pub mod plan;
pub mod scorer;
pub mod syntax;

pub use engine::{Assessment, AssessmentRequest, ValidationEngine};
pub use finding::{Finding, FindingKind};
pub use plan::{commit_plan, verification_plan};
pub use scorer::{CategoricalScorer, Impact, RiskScorer};
pub use syntax::{ValidationResult, validate};
