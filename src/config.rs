pub mod operations;
pub mod types;

// Re-export types
pub use types::{
    LayoutConfig, RetryConfig, ScriptEntry, ScriptRegistry, TermslotsConfig, WindowBackendType,
};

// Re-export operations
pub use operations::{load_cfg, load_cfg_from, read_cfg_from, load_scripts, load_scripts_from, save_cfg};
