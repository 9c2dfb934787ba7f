use crate::adapters::GenerationRequest;
use crate::errors::{AppError, AppResult};
use crate::harness::prompts::{forecast_prompt, report_prompt};
use crate::harness::structured_output::decode_forecast;
use crate::models::{AppSettings, FinancialRecord, ForecastPoint, FORECAST_PERIODS};
use std::future::Future;
use std::sync::RwLock;

/// A generative text service: one prompt in, one completion out.
pub trait TextGenerator: Send + Sync {
    fn generate(&self, request: GenerationRequest) -> impl Future<Output = AppResult<String>> + Send;

    fn apply_settings(&self, _settings: &AppSettings) {}
}

/// Builds prompts for the dashboard's two AI actions and interprets the replies.
///
/// Shared with in-flight requests; settings are applied through `&self`.
pub struct AiGateway<G> {
    generator: G,
    model: RwLock<String>,
}

impl<G: TextGenerator> AiGateway<G> {
    pub fn new(generator: G, model: impl Into<String>) -> Self {
        Self {
            generator,
            model: RwLock::new(model.into()),
        }
    }

    pub fn model(&self) -> String {
        match self.model.read() {
            Ok(model) => model.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn generator(&self) -> &G {
        &self.generator
    }

    pub fn apply_settings(&self, settings: &AppSettings) {
        match self.model.write() {
            Ok(mut model) => *model = settings.model.clone(),
            Err(poisoned) => *poisoned.into_inner() = settings.model.clone(),
        }
        self.generator.apply_settings(settings);
    }

    /// Asks for the next [`FORECAST_PERIODS`] points of `series`. No retry on a malformed reply.
    pub async fn forecast(
        &self,
        series: &[serde_json::Value],
        date_key: &str,
        value_key: &str,
    ) -> AppResult<Vec<ForecastPoint>> {
        let prompt = forecast_prompt(series, date_key, value_key, FORECAST_PERIODS)?;
        let text = self
            .generator
            .generate(GenerationRequest {
                model: self.model(),
                prompt,
                json_response: true,
            })
            .await?;

        let points = decode_forecast(&text, date_key, value_key)?;
        if points.len() != FORECAST_PERIODS {
            tracing::warn!(
                expected = FORECAST_PERIODS,
                received = points.len(),
                "forecast returned an unexpected number of periods"
            );
        }
        Ok(points)
    }

    /// Returns the Markdown report verbatim.
    pub async fn report(&self, rows: &[FinancialRecord]) -> AppResult<String> {
        let prompt = report_prompt(rows)?;
        let text = self
            .generator
            .generate(GenerationRequest {
                model: self.model(),
                prompt,
                json_response: false,
            })
            .await?;

        if text.trim().is_empty() {
            return Err(AppError::AiFormat("The AI returned an empty report. Please try again.".to_string()));
        }
        Ok(text)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::TextGenerator;
    use crate::adapters::GenerationRequest;
    use crate::errors::{AppError, AppResult};
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    /// Replays canned replies in order and records every request.
    #[derive(Clone, Default)]
    pub struct ScriptedGenerator {
        replies: Arc<Mutex<VecDeque<AppResult<String>>>>,
        requests: Arc<Mutex<Vec<GenerationRequest>>>,
    }

    impl ScriptedGenerator {
        pub fn with_replies(replies: Vec<AppResult<String>>) -> Self {
            Self {
                replies: Arc::new(Mutex::new(replies.into())),
                requests: Arc::default(),
            }
        }

        pub fn requests(&self) -> Vec<GenerationRequest> {
            self.requests.lock().expect("requests lock").clone()
        }
    }

    impl TextGenerator for ScriptedGenerator {
        async fn generate(&self, request: GenerationRequest) -> AppResult<String> {
            self.requests.lock().expect("requests lock").push(request);
            self.replies
                .lock()
                .expect("replies lock")
                .pop_front()
                .unwrap_or_else(|| Err(AppError::AiTransport("no scripted reply".to_string())))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::ScriptedGenerator;
    use super::AiGateway;
    use crate::errors::AppError;
    use crate::models::{AppSettings, FinancialRecord};
    use chrono::Utc;

    fn series() -> Vec<serde_json::Value> {
        vec![serde_json::json!({ "month": "2024-08", "revenue": 50000 })]
    }

    #[tokio::test]
    async fn forecast_requests_json_and_decodes_fenced_reply() {
        let generator = ScriptedGenerator::with_replies(vec![Ok(
            "```json\n[{\"month\":\"2024-09\",\"revenue\":51000}]\n```".to_string(),
        )]);
        let gateway = AiGateway::new(generator.clone(), "gemini-2.5-flash");
        let points = gateway.forecast(&series(), "month", "revenue").await.expect("forecast");
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].period, "2024-09");
        assert_eq!(points[0].value, 51_000.0);

        let requests = generator.requests();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].json_response);
        assert_eq!(requests[0].model, "gemini-2.5-flash");
    }

    #[tokio::test]
    async fn forecast_prose_is_format_error_without_retry() {
        let generator = ScriptedGenerator::with_replies(vec![
            Ok("I cannot forecast this data.".to_string()),
            Ok("[]".to_string()),
        ]);
        let gateway = AiGateway::new(generator.clone(), "m");
        let error = gateway.forecast(&series(), "month", "revenue").await.expect_err("prose");
        assert!(matches!(error, AppError::AiFormat(_)));
        assert_eq!(generator.requests().len(), 1);
    }

    #[tokio::test]
    async fn report_returns_text_verbatim_and_propagates_transport_errors() {
        let rows = vec![FinancialRecord {
            id: 1,
            created_at: Utc::now(),
            month: "2024-08".to_string(),
            revenue: Some(50_000.0),
            new_users: None,
            conversion_rate: None,
        }];
        let generator = ScriptedGenerator::with_replies(vec![
            Ok("## Executive Summary\nSteady growth.".to_string()),
            Err(AppError::AiTransport("network unreachable".to_string())),
        ]);
        let gateway = AiGateway::new(generator.clone(), "m");
        assert_eq!(
            gateway.report(&rows).await.expect("report"),
            "## Executive Summary\nSteady growth."
        );
        let error = gateway.report(&rows).await.expect_err("transport");
        assert_eq!(error.user_message(), "network unreachable");
        assert!(!generator.requests()[0].json_response);
    }

    #[test]
    fn settings_update_model() {
        let gateway = AiGateway::new(ScriptedGenerator::default(), "old");
        gateway.apply_settings(&AppSettings {
            model: "new".to_string(),
            ..AppSettings::default()
        });
        assert_eq!(gateway.model(), "new");
    }
}
