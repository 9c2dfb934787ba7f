use crate::adapters::{Adapter, GenerationRequest, ProcessOutput, ValidatedCommand};
use crate::errors::{AppError, AppResult};
use crate::gateway::TextGenerator;
use crate::harness::cli_missing::{cli_missing_message, is_cli_missing_line};
use crate::models::AppSettings;
use crate::redaction::Redactor;
use std::process::Stdio;
use std::sync::{Arc, RwLock};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use uuid::Uuid;

/// Runs the generator CLI once per request and returns its completion text.
///
/// Settings may change while a request is in flight; each request works from a
/// snapshot taken when it starts.
pub struct CliGenerator {
    adapter: Arc<dyn Adapter>,
    settings: RwLock<AppSettings>,
    api_key: String,
}

impl CliGenerator {
    pub fn new(adapter: Arc<dyn Adapter>, settings: AppSettings, api_key: impl Into<String>) -> Self {
        Self {
            adapter,
            settings: RwLock::new(settings),
            api_key: api_key.into(),
        }
    }

    fn snapshot(&self) -> AppResult<AppSettings> {
        self.settings
            .read()
            .map(|settings| settings.clone())
            .map_err(|_| AppError::Internal("generator settings lock poisoned".to_string()))
    }

    async fn execute(
        &self,
        command_spec: &ValidatedCommand,
        redactor: &Redactor,
        request_id: &Uuid,
    ) -> AppResult<ProcessOutput> {
        let mut command = Command::new(&command_spec.program);
        command
            .args(command_spec.args.clone())
            .stdin(if command_spec.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for (key, value) in &command_spec.env {
            command.env(key, value);
        }

        let mut child = command.spawn().map_err(|error| {
            let detail = error.to_string();
            tracing::error!(
                request_id = %request_id,
                program = %command_spec.program,
                error = %detail,
                "failed to spawn generator"
            );
            let message = cli_missing_message(&command_spec.program, &detail)
                .unwrap_or_else(|| format!("failed to start AI generator: {}", detail));
            AppError::AiTransport(redactor.redact(&message))
        })?;

        // Written from a separate task so a chatty child cannot block on a full stdout pipe.
        let stdin_task = match (command_spec.stdin.clone(), child.stdin.take()) {
            (Some(payload), Some(mut stdin)) => Some(tokio::spawn(async move {
                stdin.write_all(payload.as_bytes()).await?;
                stdin.shutdown().await
            })),
            _ => None,
        };

        let output = child
            .wait_with_output()
            .await
            .map_err(|error| AppError::AiTransport(format!("failed to read AI generator output: {}", error)))?;

        if let Some(task) = stdin_task {
            match task.await {
                Ok(Ok(())) => {}
                Ok(Err(error)) => {
                    tracing::warn!(request_id = %request_id, error = %error, "generator closed stdin early");
                }
                Err(error) => {
                    return Err(AppError::Internal(format!("stdin writer task failed: {}", error)));
                }
            }
        }

        Ok(ProcessOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: redactor.redact(&String::from_utf8_lossy(&output.stderr)),
        })
    }
}

impl TextGenerator for CliGenerator {
    async fn generate(&self, request: GenerationRequest) -> AppResult<String> {
        self.adapter.validate(&request)?;
        let settings = self.snapshot()?;
        let redactor = Redactor::new(settings.redact_aggressive).with_secret(self.api_key.clone());
        let command_spec = self.adapter.build_command(&request, &settings, &self.api_key)?;

        let request_id = Uuid::new_v4();
        let started = tokio::time::Instant::now();
        tracing::info!(
            request_id = %request_id,
            program = %command_spec.program,
            model = %request.model,
            json_response = request.json_response,
            prompt_chars = request.prompt.len(),
            "invoking AI generator"
        );

        let output = self.execute(&command_spec, &redactor, &request_id).await?;
        if output.exit_code != Some(0) && output.stderr.lines().any(is_cli_missing_line) {
            tracing::warn!(request_id = %request_id, "generator reported a missing dependency");
        }

        let result = self.adapter.parse_final(&output).map_err(|error| match error {
            AppError::AiTransport(message) => AppError::AiTransport(redactor.redact(&message)),
            other => other,
        });

        match &result {
            Ok(text) => tracing::info!(
                request_id = %request_id,
                elapsed_ms = started.elapsed().as_millis() as u64,
                response_chars = text.len(),
                "AI generator completed"
            ),
            Err(error) => tracing::warn!(
                request_id = %request_id,
                elapsed_ms = started.elapsed().as_millis() as u64,
                exit_code = ?output.exit_code,
                error = %error,
                "AI generator failed"
            ),
        }
        result
    }

    fn apply_settings(&self, settings: &AppSettings) {
        match self.settings.write() {
            Ok(mut current) => *current = settings.clone(),
            Err(_) => tracing::error!("generator settings lock poisoned; keeping previous settings"),
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::CliGenerator;
    use crate::adapters::gemini::GeminiAdapter;
    use crate::adapters::GenerationRequest;
    use crate::errors::AppError;
    use crate::gateway::TextGenerator;
    use crate::models::AppSettings;
    use std::sync::Arc;

    fn shell_generator(script: &str, api_key: &str) -> CliGenerator {
        let settings = AppSettings {
            gemini_path: "sh".to_string(),
            gemini_launch_args: vec!["-c".to_string(), script.to_string(), "gemini".to_string()],
            ..AppSettings::default()
        };
        CliGenerator::new(Arc::new(GeminiAdapter), settings, api_key)
    }

    fn request() -> GenerationRequest {
        GenerationRequest {
            model: "gemini-2.5-flash".to_string(),
            prompt: "hello generator".to_string(),
            json_response: false,
        }
    }

    #[tokio::test]
    async fn passes_prompt_on_stdin_and_reads_stdout() {
        let generator = shell_generator("cat", "k-1");
        let text = generator.generate(request()).await.expect("completion");
        assert_eq!(text, "hello generator");
    }

    #[tokio::test]
    async fn passes_model_flag_and_api_key_env() {
        let generator = shell_generator("cat >/dev/null; echo \"$2:$GEMINI_API_KEY\"", "k-2");
        let text = generator.generate(request()).await.expect("completion");
        assert_eq!(text, "gemini-2.5-flash:k-2");
    }

    #[tokio::test]
    async fn stderr_is_redacted_on_failure() {
        let generator = shell_generator(
            "cat >/dev/null; echo \"rejected key $GEMINI_API_KEY\" >&2; exit 3",
            "super-secret-value",
        );
        let error = generator.generate(request()).await.expect_err("failure");
        assert!(matches!(error, AppError::AiTransport(_)));
        assert_eq!(error.user_message(), "rejected key [REDACTED]");
    }

    #[tokio::test]
    async fn applied_settings_take_effect_on_next_request() {
        let generator = shell_generator("cat", "k");
        generator.apply_settings(&AppSettings {
            gemini_path: "sh".to_string(),
            gemini_launch_args: vec!["-c".to_string(), "cat >/dev/null; echo switched".to_string()],
            ..AppSettings::default()
        });
        let text = generator.generate(request()).await.expect("completion");
        assert_eq!(text, "switched");
    }

    #[tokio::test]
    async fn missing_program_is_transport_error_with_hint() {
        let settings = AppSettings {
            gemini_path: "definitely-not-a-real-generator-binary".to_string(),
            ..AppSettings::default()
        };
        let generator = CliGenerator::new(Arc::new(GeminiAdapter), settings, "k");
        let error = generator.generate(request()).await.expect_err("missing");
        assert!(matches!(error, AppError::AiTransport(_)));
        assert!(error.user_message().contains("geminiPath"));
    }
}
