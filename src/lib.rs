//! termslots: slot allocation and window layout for terminal script windows
//!
//! Independently launched scripts each claim an exclusive screen slot from a
//! shared SQLite table, get their terminal window moved into it, and give it
//! back on every exit path, including signals and crashes recovered through
//! lock probing.

pub mod allocator;
pub mod config;
pub mod control;
pub mod error;
pub mod lifecycle;
pub mod lock;
pub mod logging;
pub mod operator;
pub mod paths;
pub mod script;
pub mod slots;
pub mod wm;

pub use allocator::{Acquisition, ReleaseTarget, SlotAllocator};
pub use error::{SlotError, SlotResult};
pub use script::{Readiness, ScriptSession, SessionOptions, SessionState, setup_script};
