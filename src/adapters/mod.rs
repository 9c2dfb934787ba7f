pub mod gemini;

use crate::errors::{AppError, AppResult};
use crate::models::AppSettings;
use std::collections::BTreeMap;

/// One prompt for the generative text service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub model: String,
    pub prompt: String,
    pub json_response: bool,
}

#[derive(Debug, Clone)]
pub struct ValidatedCommand {
    pub program: String,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub stdin: Option<String>,
}

/// Output captured from a finished generator process.
#[derive(Debug, Clone, Default)]
pub struct ProcessOutput {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

pub trait Adapter: Send + Sync {
    fn validate(&self, request: &GenerationRequest) -> AppResult<()> {
        if request.prompt.trim().is_empty() {
            return Err(AppError::Validation("Prompt cannot be empty".to_string()));
        }
        if request.model.trim().is_empty() {
            return Err(AppError::Validation("Model identifier cannot be empty".to_string()));
        }
        Ok(())
    }
    fn build_command(
        &self,
        request: &GenerationRequest,
        settings: &AppSettings,
        api_key: &str,
    ) -> AppResult<ValidatedCommand>;
    /// Extracts the completion text, or the transport failure, from a finished run.
    fn parse_final(&self, output: &ProcessOutput) -> AppResult<String>;
}
