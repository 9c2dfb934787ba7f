use once_cell::sync::Lazy;
use regex::Regex;

static SECRET_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r#"(?i)(api[_-]?key|token|secret|password)\s*[:=]\s*["']?([A-Za-z0-9_\-\.]{6,})["']?"#)
            .expect("valid regex"),
        Regex::new(r"\b(AIza[0-9A-Za-z_\-]{30,})\b").expect("valid regex"),
        Regex::new(r"\b(sk-[A-Za-z0-9]{20,})\b").expect("valid regex"),
    ]
});

const REDACTED: &str = "[REDACTED]";

/// Scrubs credentials out of generator stderr before it reaches logs or the error slot.
#[derive(Debug, Default, Clone)]
pub struct Redactor {
    aggressive: bool,
    known_secrets: Vec<String>,
}

impl Redactor {
    pub fn new(aggressive: bool) -> Self {
        Self {
            aggressive,
            known_secrets: Vec::new(),
        }
    }

    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        let secret = secret.into();
        if !secret.trim().is_empty() {
            self.known_secrets.push(secret);
        }
        self
    }

    pub fn redact(&self, input: &str) -> String {
        if input.is_empty() {
            return String::new();
        }

        let mut result = input.to_string();
        for secret in &self.known_secrets {
            result = result.replace(secret.as_str(), REDACTED);
        }

        if self.aggressive {
            result = result
                .split(' ')
                .map(|token| {
                    if token.len() > 48 && token.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
                        "[REDACTED_LONG_TOKEN]".to_string()
                    } else {
                        token.to_string()
                    }
                })
                .collect::<Vec<_>>()
                .join(" ");
        }

        for pattern in SECRET_PATTERNS.iter() {
            result = pattern
                .replace_all(&result, |caps: &regex::Captures<'_>| {
                    if caps.len() > 2 {
                        let key = caps
                            .get(1)
                            .map(|m| m.as_str())
                            .unwrap_or("secret")
                            .to_ascii_lowercase();
                        format!("{}={}", key, REDACTED)
                    } else {
                        REDACTED.to_string()
                    }
                })
                .to_string();
        }

        result
    }
}
