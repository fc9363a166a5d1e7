//! Intent extraction and normalization.
//!
//! Free text is first turned into loosely typed [`RawFields`](aurora_core::RawFields) by an
//! [`Extractor`], then validated and resolved against the inventory by the
//! [`IntentNormalizer`].

pub mod error;
pub mod extract;
pub mod normalizer;

pub use error::ExtractError;
pub use extract::{
    AnthropicModel, Extractor, FallbackExtractor, LanguageModel, ModelBackedExtractor,
    OpenAiCompatibleModel, RuleBasedExtractor, build_extractor, model_from_config,
};
pub use normalizer::IntentNormalizer;
