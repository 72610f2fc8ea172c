//! Line-oriented player input.

/// One parsed line of player input.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReplCommand {
    /// Narrative input for the session.
    Input(String),
    /// `/abort`
    Abort,
    /// `/compact`
    Compact,
    /// `/status`
    Status,
    /// `/help`
    Help,
    /// `/quit` or `/exit`
    Quit,
    /// Unrecognized slash command.
    Unknown(String),
}

pub const HELP: &str = "\
Type to play. Commands:
  /abort    stop the current narration
  /compact  archive old history now
  /status   show session state
  /quit     leave";

/// Parse a line; blank lines yield `None`.
pub fn parse_line(line: &str) -> Option<ReplCommand> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    let Some(command) = trimmed.strip_prefix('/') else {
        return Some(ReplCommand::Input(trimmed.to_string()));
    };
    Some(match command.to_ascii_lowercase().as_str() {
        "abort" | "stop" => ReplCommand::Abort,
        "compact" => ReplCommand::Compact,
        "status" => ReplCommand::Status,
        "help" | "?" => ReplCommand::Help,
        "quit" | "exit" => ReplCommand::Quit,
        _ => ReplCommand::Unknown(trimmed.to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn narrative_input_is_trimmed() {
        assert_eq!(
            parse_line("  open the door \n"),
            Some(ReplCommand::Input("open the door".into()))
        );
    }

    #[test]
    fn blank_lines_ignored() {
        assert_eq!(parse_line("   "), None);
    }

    #[test]
    fn slash_commands() {
        assert_eq!(parse_line("/abort"), Some(ReplCommand::Abort));
        assert_eq!(parse_line("/STATUS"), Some(ReplCommand::Status));
        assert_eq!(parse_line("/compact"), Some(ReplCommand::Compact));
        assert_eq!(parse_line("/exit"), Some(ReplCommand::Quit));
        assert_eq!(
            parse_line("/dance"),
            Some(ReplCommand::Unknown("/dance".into()))
        );
    }
}
