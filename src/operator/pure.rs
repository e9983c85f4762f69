// Instruction parsing (no I/O)

use crate::operator::types::{OperatorCommand, ScriptAction};

/// Parse one operator line. Whitespace and case of the keywords are
/// normalized; script names are kept as typed.
pub fn parse_instruction(line: &str) -> Result<OperatorCommand, String> {
    let words: Vec<&str> = line.split_whitespace().collect();
    let lowered: Vec<String> = words.iter().map(|w| w.to_ascii_lowercase()).collect();
    let keywords: Vec<&str> = lowered.iter().map(String::as_str).collect();

    match keywords.as_slice() {
        [] => Err("empty instruction".to_string()),
        ["free", "all", "slots"] => Ok(OperatorCommand::FreeAllSlots),
        ["free", "denied", "slots"] => Ok(OperatorCommand::FreeDeniedSlots),
        ["list"] | ["get", "windows"] => Ok(OperatorCommand::List),
        ["refit"] => Ok(OperatorCommand::Refit),
        ["refit", "server"] | ["refit_server"] => Ok(OperatorCommand::RefitServer),
        [_, action] => {
            let action = match *action {
                "start" => ScriptAction::Start,
                "stop" => ScriptAction::Stop,
                "unlock" => ScriptAction::Unlock,
                other => return Err(format!("unknown action '{}'", other)),
            };
            Ok(OperatorCommand::Script {
                name: words[0].to_string(),
                action,
            })
        }
        _ => Err(format!("unrecognized instruction '{}'", line.trim())),
    }
}
