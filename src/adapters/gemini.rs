use super::{Adapter, GenerationRequest, ProcessOutput, ValidatedCommand};
use crate::errors::{AppError, AppResult};
use crate::models::AppSettings;
use std::collections::BTreeMap;

pub const API_KEY_ENV: &str = "GEMINI_API_KEY";

#[derive(Debug, Default)]
pub struct GeminiAdapter;

impl Adapter for GeminiAdapter {
    fn build_command(
        &self,
        request: &GenerationRequest,
        settings: &AppSettings,
        api_key: &str,
    ) -> AppResult<ValidatedCommand> {
        if settings.gemini_path.trim().is_empty() {
            return Err(AppError::Config("geminiPath is not configured".to_string()));
        }

        let mut args = settings.gemini_launch_args.clone();
        args.push("--model".to_string());
        args.push(request.model.clone());
        args.push("--output-format".to_string());
        args.push("json".to_string());
        if request.json_response {
            args.push("--response-mime-type".to_string());
            args.push("application/json".to_string());
        }

        let mut env = BTreeMap::new();
        env.insert(API_KEY_ENV.to_string(), api_key.to_string());

        Ok(ValidatedCommand {
            program: settings.gemini_path.clone(),
            args,
            env,
            stdin: Some(request.prompt.clone()),
        })
    }

    fn parse_final(&self, output: &ProcessOutput) -> AppResult<String> {
        if output.exit_code != Some(0) {
            let reason = last_non_empty_line(&output.stderr)
                .or_else(|| envelope_error(&output.stdout))
                .unwrap_or_else(|| match output.exit_code {
                    Some(code) => format!("generator exited with status {}", code),
                    None => "generator was terminated by a signal".to_string(),
                });
            return Err(AppError::AiTransport(reason));
        }

        let trimmed = output.stdout.trim();
        match serde_json::from_str::<serde_json::Value>(trimmed) {
            Ok(serde_json::Value::Object(envelope)) => {
                if let Some(text) = envelope.get("response").and_then(|value| value.as_str()) {
                    return Ok(text.to_string());
                }
                if let Some(message) = envelope_error(trimmed) {
                    return Err(AppError::AiTransport(message));
                }
                // Bare JSON object without an envelope is the completion itself.
                Ok(trimmed.to_string())
            }
            _ => Ok(trimmed.to_string()),
        }
    }
}

fn envelope_error(stdout: &str) -> Option<String> {
    let value = serde_json::from_str::<serde_json::Value>(stdout.trim()).ok()?;
    let error = value.get("error")?;
    error
        .get("message")
        .and_then(|message| message.as_str())
        .map(ToString::to_string)
        .or_else(|| error.as_str().map(ToString::to_string))
}

fn last_non_empty_line(raw: &str) -> Option<String> {
    raw.lines()
        .rev()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(ToString::to_string)
}

#[cfg(test)]
mod tests {
    use super::{GeminiAdapter, API_KEY_ENV};
    use crate::adapters::{Adapter, GenerationRequest, ProcessOutput};
    use crate::errors::AppError;
    use crate::models::AppSettings;

    fn request(json_response: bool) -> GenerationRequest {
        GenerationRequest {
            model: "gemini-2.5-flash".to_string(),
            prompt: "predict".to_string(),
            json_response,
        }
    }

    fn output(exit_code: Option<i32>, stdout: &str, stderr: &str) -> ProcessOutput {
        ProcessOutput {
            exit_code,
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
        }
    }

    #[test]
    fn builds_command_with_launch_args_and_json_flag() {
        let settings = AppSettings {
            gemini_path: "npx".to_string(),
            gemini_launch_args: vec!["@google/gemini-cli".to_string()],
            ..AppSettings::default()
        };
        let command = GeminiAdapter
            .build_command(&request(true), &settings, "secret")
            .expect("command");
        assert_eq!(command.program, "npx");
        assert_eq!(
            command.args,
            vec![
                "@google/gemini-cli",
                "--model",
                "gemini-2.5-flash",
                "--output-format",
                "json",
                "--response-mime-type",
                "application/json"
            ]
        );
        assert_eq!(command.env.get(API_KEY_ENV).map(String::as_str), Some("secret"));
        assert_eq!(command.stdin.as_deref(), Some("predict"));
    }

    #[test]
    fn text_requests_omit_mime_type() {
        let command = GeminiAdapter
            .build_command(&request(false), &AppSettings::default(), "secret")
            .expect("command");
        assert!(!command.args.iter().any(|arg| arg == "--response-mime-type"));
    }

    #[test]
    fn validate_rejects_blank_prompt() {
        let mut blank = request(false);
        blank.prompt = "  ".to_string();
        assert!(GeminiAdapter.validate(&blank).is_err());
    }

    #[test]
    fn unwraps_response_envelope() {
        let text = GeminiAdapter
            .parse_final(&output(Some(0), "{\"response\":\"# Report\\nAll good\"}", ""))
            .expect("text");
        assert_eq!(text, "# Report\nAll good");
    }

    #[test]
    fn plain_stdout_is_taken_verbatim() {
        let text = GeminiAdapter
            .parse_final(&output(Some(0), "  [{\"month\":\"2024-09\"}]\n", ""))
            .expect("text");
        assert_eq!(text, "[{\"month\":\"2024-09\"}]");
    }

    #[test]
    fn failures_are_transport_errors() {
        let error = GeminiAdapter
            .parse_final(&output(Some(1), "", "warming up\nerror: quota exceeded\n"))
            .expect_err("failure");
        assert!(matches!(error, AppError::AiTransport(ref message) if message == "error: quota exceeded"));

        let error = GeminiAdapter
            .parse_final(&output(Some(0), "{\"error\":{\"message\":\"API key not valid\"}}", ""))
            .expect_err("envelope error");
        assert_eq!(error.user_message(), "API key not valid");

        let error = GeminiAdapter
            .parse_final(&output(Some(2), "", ""))
            .expect_err("silent failure");
        assert_eq!(error.user_message(), "generator exited with status 2");
    }
}
