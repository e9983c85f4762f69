//! Operations that talk to a live window backend

mod poll;

pub use poll::{adjust_with_retry, backoff_delay};
