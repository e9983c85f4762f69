//! Config operations - reading and writing settings from the data directory

mod io;

pub use io::{load_cfg, load_cfg_from, read_cfg_from, load_scripts, load_scripts_from, save_cfg, SUGGESTED_PORTS};
