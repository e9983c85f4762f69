use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptAction {
    Start,
    Stop,
    Unlock,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperatorCommand {
    Script { name: String, action: ScriptAction },
    /// Frees both inventories
    FreeAllSlots,
    FreeDeniedSlots,
    List,
    Refit,
    RefitServer,
}

impl fmt::Display for ScriptAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScriptAction::Start => write!(f, "start"),
            ScriptAction::Stop => write!(f, "stop"),
            ScriptAction::Unlock => write!(f, "unlock"),
        }
    }
}
