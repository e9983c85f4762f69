//! Slot reservation table
//!
//! Two fixed-size inventories (primary and denied) persisted in one SQLite
//! database shared by every script process on the host. All mutations run
//! inside `BEGIN IMMEDIATE` transactions, which is what serializes concurrent
//! claimers across processes.
//!
//! ## Module Structure
//! - `types.rs`: Inventory, SlotState, OccupantRow, Slot
//! - `store.rs`: SlotStore, the transactional operations

mod store;
mod types;

pub use store::SlotStore;
pub use types::{Inventory, OccupantRow, Slot, SlotState};
