use serde::{Deserialize, Serialize};
use std::fmt;

/// Which of the two slot tables a record lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Inventory {
    Primary,
    Denied,
}

impl Inventory {
    pub fn table(self) -> &'static str {
        match self {
            Inventory::Primary => "slots",
            Inventory::Denied => "denied_slots",
        }
    }

    /// State a slot of this inventory takes when claimed.
    pub fn occupied_state(self) -> SlotState {
        match self {
            Inventory::Primary => SlotState::Occupied,
            Inventory::Denied => SlotState::DeniedOccupied,
        }
    }
}

impl fmt::Display for Inventory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Inventory::Primary => write!(f, "primary"),
            Inventory::Denied => write!(f, "denied"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Free,
    Occupied,
    DeniedOccupied,
}

impl SlotState {
    pub fn as_str(self) -> &'static str {
        match self {
            SlotState::Free => "free",
            SlotState::Occupied => "occupied",
            SlotState::DeniedOccupied => "denied_occupied",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "free" => Some(SlotState::Free),
            "occupied" => Some(SlotState::Occupied),
            "denied_occupied" => Some(SlotState::DeniedOccupied),
            _ => None,
        }
    }
}

/// One window recorded under a slot. Row 0 is the primary window.
///
/// Persisted as a `[label, width, height]` triple.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(String, u32, u32)", into = "(String, u32, u32)")]
pub struct OccupantRow {
    pub label: String,
    pub width: u32,
    pub height: u32,
}

impl OccupantRow {
    pub fn new(label: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            label: label.into(),
            width,
            height,
        }
    }
}

impl From<(String, u32, u32)> for OccupantRow {
    fn from((label, width, height): (String, u32, u32)) -> Self {
        Self {
            label,
            width,
            height,
        }
    }
}

impl From<OccupantRow> for (String, u32, u32) {
    fn from(row: OccupantRow) -> Self {
        (row.label, row.width, row.height)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slot {
    pub index: usize,
    pub state: SlotState,
    pub owner_name: Option<String>,
    pub rows: Vec<OccupantRow>,
}

impl Slot {
    pub fn is_free(&self) -> bool {
        self.state == SlotState::Free
    }
}
