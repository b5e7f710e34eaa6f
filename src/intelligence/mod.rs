//! The guide: AI-generated insights and SMART tasks.
//!
//! Every operation degrades instead of failing. With no generator configured
//! the results are fixed placeholders; a failed call yields the documented
//! fallback text (or the unchanged input for simplification).

pub mod gemini;
pub mod parse;
pub mod prompts;

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::types::{Config, LifeArea, SmartTask};

pub use prompts::ResponseSchema;

pub const UNCONFIGURED_INSIGHT: &str =
    "Configure your Gemini API key to receive personalized insights.";
pub const UNCONFIGURED_EVOLUTION: &str =
    "Configure your Gemini API key to receive insights about your evolution.";
pub const FAILED_INSIGHT: &str = "Error generating insight.";
pub const EMPTY_INSIGHT: &str = "Stay focused on your progress.";
pub const EVOLUTION_FALLBACK: &str = "Your evolution is visible. Keep it consistent.";

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("service returned no text")]
    EmptyResponse,

    #[error("unusable output: {0}")]
    Parse(String),
}

/// Anything that turns a prompt into text.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(
        &self,
        prompt: &str,
        schema: Option<ResponseSchema>,
    ) -> Result<String, GenerationError>;
}

/// Where a [`Guidance`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GuidanceSource {
    Generated,
    Unconfigured,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Guidance {
    pub insight: String,
    pub tasks: Vec<SmartTask>,
    pub source: GuidanceSource,
}

impl Guidance {
    fn placeholder(insight: &str, source: GuidanceSource) -> Self {
        Self {
            insight: insight.to_string(),
            tasks: Vec::new(),
            source,
        }
    }

    /// True when the user should see the generic "could not reach the AI" alert.
    pub fn failed(&self) -> bool {
        self.source == GuidanceSource::Failed
    }
}

#[derive(Clone, Default)]
pub struct Guide {
    generator: Option<Arc<dyn TextGenerator>>,
}

impl Guide {
    pub fn new(generator: Option<Arc<dyn TextGenerator>>) -> Self {
        Self { generator }
    }

    pub fn unconfigured() -> Self {
        Self::default()
    }

    /// Gemini-backed guide when a key is configured, unconfigured otherwise.
    pub fn from_config(config: &Config) -> Self {
        let generator = gemini::GeminiClient::from_config(config)
            .map(|c| Arc::new(c) as Arc<dyn TextGenerator>);
        if generator.is_none() {
            log::info!("No Gemini API key configured; guidance will use placeholders");
        }
        Self::new(generator)
    }

    pub fn is_configured(&self) -> bool {
        self.generator.is_some()
    }

    /// Insight plus up to three fresh SMART tasks aimed at the weakest areas.
    pub async fn generate_guidance(&self, wheel: &[LifeArea]) -> Guidance {
        let Some(generator) = &self.generator else {
            return Guidance::placeholder(UNCONFIGURED_INSIGHT, GuidanceSource::Unconfigured);
        };

        let prompt = prompts::build_guidance_prompt(wheel);
        let result = generator
            .generate(&prompt, Some(ResponseSchema::Guidance))
            .await
            .and_then(|raw| parse::parse_guidance(&raw));

        match result {
            Ok((insight, tasks)) => {
                log::info!("Generated guidance with {} tasks", tasks.len());
                Guidance {
                    insight: if insight.is_empty() {
                        EMPTY_INSIGHT.to_string()
                    } else {
                        insight
                    },
                    tasks,
                    source: GuidanceSource::Generated,
                }
            }
            Err(e) => {
                log::warn!("Guidance generation failed: {e}");
                Guidance::placeholder(FAILED_INSIGHT, GuidanceSource::Failed)
            }
        }
    }

    /// Free-text comment on how the wheel moved between two reviews.
    pub async fn generate_evolution_insight(&self, old: &[LifeArea], new: &[LifeArea]) -> String {
        let Some(generator) = &self.generator else {
            return UNCONFIGURED_EVOLUTION.to_string();
        };

        let prompt = prompts::build_evolution_prompt(old, new);
        match generator.generate(&prompt, None).await {
            Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
            Ok(_) => EVOLUTION_FALLBACK.to_string(),
            Err(e) => {
                log::warn!("Evolution insight failed: {e}");
                EVOLUTION_FALLBACK.to_string()
            }
        }
    }

    /// Rewrite each task as a two-minute micro-action, keeping ids and order.
    pub async fn simplify_tasks(&self, tasks: &[SmartTask]) -> Vec<SmartTask> {
        let Some(generator) = &self.generator else {
            return tasks.to_vec();
        };
        if tasks.is_empty() {
            return Vec::new();
        }

        let prompt = prompts::build_simplify_prompt(tasks);
        let result = generator
            .generate(&prompt, Some(ResponseSchema::TaskList))
            .await
            .and_then(|raw| parse::parse_task_list(&raw));

        match result {
            Ok(generated) => parse::merge_simplified(tasks, &generated),
            Err(e) => {
                log::warn!("Simplify failed, keeping current tasks: {e}");
                tasks.to_vec()
            }
        }
    }
}
