//! Extraction providers.
//!
//! The provider is chosen once from configuration when the processor is built. Callers
//! only ever see `dyn Extractor`.

mod model;
mod rules;

use async_trait::async_trait;
use aurora_core::{ExtractionConfig, ProviderKind, RawFields};
use std::sync::Arc;

use crate::error::ExtractError;

pub use model::{
    AnthropicModel, LanguageModel, ModelBackedExtractor, OpenAiCompatibleModel, model_from_config,
};
pub use rules::RuleBasedExtractor;

/// Turns intent text into raw candidate fields.
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Short provider name for logs.
    fn name(&self) -> &'static str;

    async fn extract(&self, text: &str) -> Result<RawFields, ExtractError>;
}

/// Tries a primary extractor and falls back to a second one when it fails.
pub struct FallbackExtractor {
    primary: Arc<dyn Extractor>,
    fallback: Arc<dyn Extractor>,
}

impl FallbackExtractor {
    pub fn new(primary: Arc<dyn Extractor>, fallback: Arc<dyn Extractor>) -> Self {
        Self { primary, fallback }
    }
}

#[async_trait]
impl Extractor for FallbackExtractor {
    fn name(&self) -> &'static str {
        self.primary.name()
    }

    async fn extract(&self, text: &str) -> Result<RawFields, ExtractError> {
        match self.primary.extract(text).await {
            Ok(fields) => Ok(fields),
            Err(ExtractError::EmptyInput) => Err(ExtractError::EmptyInput),
            Err(e) => {
                tracing::warn!(
                    provider = self.primary.name(),
                    fallback = self.fallback.name(),
                    error = %e,
                    "Extraction failed, falling back"
                );
                self.fallback.extract(text).await
            }
        }
    }
}

/// Build the extractor selected by configuration.
///
/// `model` overrides the HTTP client built from `config.model`, which lets tests and
/// embedders plug in their own language model.
pub fn build_extractor(
    config: &ExtractionConfig,
    model: Option<Arc<dyn LanguageModel>>,
) -> Result<Arc<dyn Extractor>, ExtractError> {
    let rules: Arc<dyn Extractor> = Arc::new(RuleBasedExtractor::new()?);
    match config.provider {
        ProviderKind::Rules => Ok(rules),
        ProviderKind::Model => {
            let model = match model {
                Some(model) => model,
                None => {
                    let settings = config.model.as_ref().ok_or_else(|| {
                        ExtractError::Config("model provider selected without settings".into())
                    })?;
                    model_from_config(settings)?
                }
            };
            let primary: Arc<dyn Extractor> = Arc::new(ModelBackedExtractor::new(model)?);
            if config.fallback_to_rules {
                Ok(Arc::new(FallbackExtractor::new(primary, rules)))
            } else {
                Ok(primary)
            }
        }
    }
}
