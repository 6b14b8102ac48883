//! Language-model endpoint boundary
//!
//! The orchestrator and the judge talk to the model only through
//! [`LanguageModel`], constructed once and handed to each component.

mod client;
pub mod fakes;

pub use client::{HttpModel, ModelConfig};

use crate::error::ModelCallError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Sampling parameters sent with each request
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            temperature: 0.3,
            max_tokens: 1024,
        }
    }
}

/// One prompt sent to the model
#[derive(Debug, Clone, PartialEq)]
pub struct ModelRequest {
    pub system: String,
    pub user: String,
    pub params: GenerationParams,
}

/// Text generation endpoint
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Model identifier recorded in the session output
    fn name(&self) -> &str;

    /// Generate a completion for `request`
    async fn generate(&self, request: &ModelRequest) -> Result<String, ModelCallError>;
}
