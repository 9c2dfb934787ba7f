static CLI_MISSING_PATTERNS: &[&str] = &[
    "not installed",
    "command not found",
    "no such file or directory",
    "is not recognized as an internal or external command",
];

pub fn is_cli_missing_line(line: &str) -> bool {
    let lower = line.to_ascii_lowercase();
    CLI_MISSING_PATTERNS
        .iter()
        .any(|pattern| lower.contains(pattern))
}

/// User-facing hint when the generator program cannot be launched.
pub fn cli_missing_message(program: &str, detail: &str) -> Option<String> {
    if !is_cli_missing_line(detail) {
        return None;
    }
    Some(format!(
        "The AI generator '{}' could not be started ({}). Install it or point geminiPath at it with `set geminiPath=<path>`.",
        program, detail
    ))
}

#[cfg(test)]
mod tests {
    use super::{cli_missing_message, is_cli_missing_line};

    #[test]
    fn detects_cli_missing_variants() {
        assert!(is_cli_missing_line("command not found: gemini"));
        assert!(is_cli_missing_line("is not recognized as an internal or external command"));
        assert!(!is_cli_missing_line("normal stderr line"));
    }

    #[test]
    fn builds_hint_only_for_missing_programs() {
        let hint = cli_missing_message("gemini", "No such file or directory (os error 2)").expect("hint");
        assert!(hint.contains("'gemini'"));
        assert!(cli_missing_message("gemini", "permission denied").is_none());
    }
}
