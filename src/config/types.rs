use crate::wm::{SecondaryWindow, WindowGeometry};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum WindowBackendType {
    #[default]
    Auto,
    X11,
    Hyprland,
    Headless,
}

/// Static geometry of the slot grid.
///
/// Slots are rows of one column starting at (`origin_left`, `origin_top`);
/// each row is `row_height` tall and `column_width` wide. The primary window
/// sits at the left of its row, secondary windows fill the rest of the row.
/// Denied slots use the next column over, shifted by the denied offset.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct LayoutConfig {
    pub screen_width: u32,
    pub screen_height: u32,
    pub origin_left: i32,
    pub origin_top: i32,
    pub row_height: u32,
    pub column_width: u32,
    pub main_width: u32,
    pub main_height: u32,
    pub denied_offset_left: i32,
    pub denied_offset_top: i32,
    /// Fixed position of the operator server window
    pub server: WindowGeometry,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            screen_width: 1920,
            screen_height: 1080,
            origin_left: 0,
            origin_top: 0,
            row_height: 170,
            column_width: 1100,
            main_width: 480,
            main_height: 160,
            denied_offset_left: 20,
            denied_offset_top: 20,
            server: WindowGeometry {
                left: 0,
                top: 870,
                width: 480,
                height: 200,
            },
        }
    }
}

/// Backoff policy for locating windows that may not be mapped yet
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct RetryConfig {
    pub attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: 8,
            base_delay_ms: 150,
            max_delay_ms: 2000,
        }
    }
}

/// Main configuration, read once at startup
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct TermslotsConfig {
    #[serde(default)]
    pub window_backend: WindowBackendType,
    #[serde(default = "default_slot_count")]
    pub slot_count: usize,
    #[serde(default = "default_denied_slot_count")]
    pub denied_slot_count: usize,
    /// Prepended to the script name to form its window title
    #[serde(default = "default_title_prefix")]
    pub title_prefix: String,
    #[serde(default = "default_server_title")]
    pub server_title: String,
    #[serde(default)]
    pub layout: LayoutConfig,
    /// Upper bound on waiting for another process holding the slot store
    #[serde(default = "default_store_timeout_ms")]
    pub store_timeout_ms: u64,
    #[serde(default)]
    pub adjust_retry: RetryConfig,
    /// How long a stopped script may take to return before cleanup is forced
    #[serde(default = "default_stop_grace_ms")]
    pub stop_grace_ms: u64,
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
    /// Remove a lock whose owner does not answer its control channel and
    /// start as accepted, instead of starting denied
    #[serde(default = "default_true")]
    pub reclaim_stale_locks: bool,
    #[serde(default = "default_operator_addr")]
    pub operator_addr: String,
    /// Used when RUST_LOG is not set
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_slot_count() -> usize {
    5
}

fn default_denied_slot_count() -> usize {
    3
}

fn default_title_prefix() -> String {
    "tsl_".to_string()
}

fn default_server_title() -> String {
    "tsl_SERVER".to_string()
}

fn default_store_timeout_ms() -> u64 {
    2000
}

fn default_stop_grace_ms() -> u64 {
    5000
}

fn default_probe_timeout_ms() -> u64 {
    500
}

fn default_true() -> bool {
    true
}

fn default_operator_addr() -> String {
    "127.0.0.1:50000".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for TermslotsConfig {
    fn default() -> Self {
        TermslotsConfig {
            window_backend: WindowBackendType::Auto,
            slot_count: default_slot_count(),
            denied_slot_count: default_denied_slot_count(),
            title_prefix: default_title_prefix(),
            server_title: default_server_title(),
            layout: LayoutConfig::default(),
            store_timeout_ms: default_store_timeout_ms(),
            adjust_retry: RetryConfig::default(),
            stop_grace_ms: default_stop_grace_ms(),
            probe_timeout_ms: default_probe_timeout_ms(),
            reclaim_stale_locks: true,
            operator_addr: default_operator_addr(),
            log_level: default_log_level(),
        }
    }
}

/// A script the operator channel can start, stop and unlock.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ScriptEntry {
    pub name: String,
    /// Localhost port of the script's control channel
    pub port: u16,
    /// Program and arguments used by `<name> start`
    #[serde(default)]
    pub command: Vec<String>,
    #[serde(default)]
    pub secondary_windows: Vec<SecondaryWindow>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
pub struct ScriptRegistry {
    #[serde(default)]
    pub scripts: Vec<ScriptEntry>,
}

impl ScriptRegistry {
    pub fn get(&self, name: &str) -> Option<&ScriptEntry> {
        self.scripts.iter().find(|s| s.name == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.scripts.iter().map(|s| s.name.as_str()).collect()
    }
}
