//! Error taxonomy shared by the store, the layout engine and the window backends.

use crate::slots::Inventory;

pub type SlotResult<T> = Result<T, SlotError>;

#[derive(Debug, thiserror::Error)]
pub enum SlotError {
    /// The slot database could not be opened, or stayed locked past the busy timeout.
    #[error("slot store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("no free {inventory} slot available")]
    NoSlotAvailable { inventory: Inventory },

    /// Transient: the window may not have been mapped yet.
    #[error("no window titled '{title}' found")]
    WindowNotFound { title: String },

    /// Programming error, the inventory is fixed at startup.
    #[error("{inventory} slot {index} out of range (inventory size {size})")]
    InvalidSlot {
        inventory: Inventory,
        index: usize,
        size: usize,
    },

    #[error("{inventory} slot {index} is not claimed")]
    NotClaimed { inventory: Inventory, index: usize },

    #[error("lock for '{name}' is stale: no process answers its control channel")]
    StaleLock { name: String },

    #[error("'{name}' answers its control channel, refusing to unlock")]
    LockHeld { name: String },

    #[error("invalid script name '{0}'")]
    InvalidName(String),

    #[error("unknown script '{0}'")]
    UnknownScript(String),

    #[error("window backend error: {0}")]
    Backend(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<rusqlite::Error> for SlotError {
    fn from(e: rusqlite::Error) -> Self {
        SlotError::StoreUnavailable(e.to_string())
    }
}

impl From<serde_json::Error> for SlotError {
    fn from(e: serde_json::Error) -> Self {
        SlotError::StoreUnavailable(format!("corrupt occupant rows: {}", e))
    }
}

impl SlotError {
    /// Whether retrying the same operation later can succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SlotError::WindowNotFound { .. } | SlotError::StoreUnavailable(_)
        )
    }
}
