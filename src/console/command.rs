use crate::models::FormField;

#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleCommand {
    /// Empty input line; dismisses an open report like a click outside it.
    Blank,
    Add(Vec<(FormField, String)>),
    Forecast,
    Report,
    Close,
    Refresh,
    Settings,
    Set(serde_json::Value),
    Help,
    Quit,
}

pub fn parse_command(line: &str) -> Result<ConsoleCommand, String> {
    let mut tokens = line.split_whitespace();
    let Some(verb) = tokens.next() else {
        return Ok(ConsoleCommand::Blank);
    };

    match verb.to_ascii_lowercase().as_str() {
        "add" => {
            let mut fields = Vec::new();
            for token in tokens {
                let (key, value) = token
                    .split_once('=')
                    .ok_or_else(|| format!("Expected key=value, got '{}'.", token))?;
                fields.push((key.parse::<FormField>()?, value.to_string()));
            }
            Ok(ConsoleCommand::Add(fields))
        }
        "forecast" => Ok(ConsoleCommand::Forecast),
        "report" => Ok(ConsoleCommand::Report),
        "close" | "dismiss" => Ok(ConsoleCommand::Close),
        "refresh" | "load" => Ok(ConsoleCommand::Refresh),
        "settings" => Ok(ConsoleCommand::Settings),
        "set" => {
            let mut update = serde_json::Map::new();
            for token in tokens {
                let (key, raw) = token
                    .split_once('=')
                    .ok_or_else(|| format!("Expected key=value, got '{}'.", token))?;
                let value = serde_json::from_str::<serde_json::Value>(raw)
                    .unwrap_or_else(|_| serde_json::Value::String(raw.to_string()));
                update.insert(key.to_string(), value);
            }
            if update.is_empty() {
                return Err("Usage: set key=value [key=value ...]".to_string());
            }
            Ok(ConsoleCommand::Set(serde_json::Value::Object(update)))
        }
        "help" | "?" => Ok(ConsoleCommand::Help),
        "quit" | "exit" | "q" => Ok(ConsoleCommand::Quit),
        other => Err(format!("Unknown command '{}'. Type 'help' for the command list.", other)),
    }
}

pub const HELP_LINES: [&str; 12] = [
    "add month=2024-08 revenue=50000 [new_users=500] [conversion_rate=0.05]",
    "    fill the form and add the record",
    "forecast          AI forecast of the next periods",
    "report            AI business report",
    "close             dismiss the report (also Esc, Enter, or a click outside)",
    "refresh           reload records from the store",
    "settings          show generator settings",
    "set key=value     update geminiPath, geminiLaunchArgs, model, redactAggressive",
    "help              toggle this help",
    "quit              leave (also Ctrl-C)",
    "",
    "Up/Down and PgUp/PgDn scroll an open report.",
];

#[cfg(test)]
mod tests {
    use super::{parse_command, ConsoleCommand};
    use crate::models::FormField;

    #[test]
    fn parses_add_with_fields() {
        let command = parse_command("add month=2024-08 revenue=50000 new_users=500").expect("command");
        assert_eq!(
            command,
            ConsoleCommand::Add(vec![
                (FormField::Month, "2024-08".to_string()),
                (FormField::Revenue, "50000".to_string()),
                (FormField::NewUsers, "500".to_string()),
            ])
        );
        assert!(parse_command("add month").is_err());
        assert!(parse_command("add churn=3").is_err());
    }

    #[test]
    fn parses_set_values_as_json_when_possible() {
        let command = parse_command("set model=gemini-pro geminiLaunchArgs=[\"@google/gemini-cli\"] redactAggressive=false")
            .expect("command");
        assert_eq!(
            command,
            ConsoleCommand::Set(serde_json::json!({
                "model": "gemini-pro",
                "geminiLaunchArgs": ["@google/gemini-cli"],
                "redactAggressive": false
            }))
        );
        assert!(parse_command("set").is_err());
    }

    #[test]
    fn blank_and_unknown_lines() {
        assert_eq!(parse_command("   ").expect("blank"), ConsoleCommand::Blank);
        assert_eq!(parse_command("Q").expect("quit"), ConsoleCommand::Quit);
        assert!(parse_command("dance").is_err());
    }
}
