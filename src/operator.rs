//! Operator channel
//!
//! A line-oriented TCP endpoint on localhost through which a human or a
//! stream-deck style tool starts, stops and unlocks scripts, frees slots and
//! re-applies the layout. One reply line per instruction.
//!
//! ## Module Structure
//! - `types.rs`: OperatorCommand, ScriptAction
//! - `pure.rs`: instruction parsing
//! - `server.rs`: OperatorServer, the dispatcher and accept loop

mod pure;
mod server;
mod types;

pub use pure::parse_instruction;
pub use server::OperatorServer;
pub use types::{OperatorCommand, ScriptAction};
