use crate::config::types::{ScriptRegistry, TermslotsConfig};
use crate::paths::PATH_DATA;

use std::error::Error;
use std::fs::File;
use std::io::BufReader;
use std::ops::RangeInclusive;
use std::path::Path;

/// Control ports are expected in this range so they never collide with the
/// operator channel or other local services.
pub const SUGGESTED_PORTS: RangeInclusive<u16> = 59000..=59999;

/// Settings from the data directory, plus why an existing settings file was
/// ignored. Meant for startup, before logging is up.
pub fn load_cfg() -> (TermslotsConfig, Option<String>) {
    read_cfg_from(&PATH_DATA.join("settings.json"))
}

/// Read settings from `path`, falling back to defaults if the file is missing
/// or unreadable. A missing file is not a problem; an unreadable one is
/// described in the second value.
pub fn read_cfg_from(path: &Path) -> (TermslotsConfig, Option<String>) {
    match File::open(path) {
        Ok(file) => match serde_json::from_reader::<_, TermslotsConfig>(BufReader::new(file)) {
            Ok(config) => (config, None),
            Err(e) => (
                TermslotsConfig::default(),
                Some(format!("Ignoring {}: {}", path.display(), e)),
            ),
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => (TermslotsConfig::default(), None),
        Err(e) => (
            TermslotsConfig::default(),
            Some(format!("Cannot read {}: {}", path.display(), e)),
        ),
    }
}

/// Like `read_cfg_from`, logging the problem if there is one.
pub fn load_cfg_from(path: &Path) -> TermslotsConfig {
    let (config, problem) = read_cfg_from(path);
    if let Some(problem) = problem {
        tracing::warn!("{}", problem);
    }
    config
}

pub fn save_cfg(config: &TermslotsConfig) -> Result<(), Box<dyn Error>> {
    std::fs::create_dir_all(PATH_DATA.as_path())?;
    let file = File::create(PATH_DATA.join("settings.json"))?;
    serde_json::to_writer_pretty(file, config)?;
    Ok(())
}

pub fn load_scripts() -> ScriptRegistry {
    load_scripts_from(&PATH_DATA.join("scripts.yaml"))
}

pub fn load_scripts_from(path: &Path) -> ScriptRegistry {
    let registry = match std::fs::read_to_string(path) {
        Ok(raw) => match serde_yaml::from_str::<ScriptRegistry>(&raw) {
            Ok(registry) => registry,
            Err(e) => {
                tracing::warn!("Ignoring {}: {}", path.display(), e);
                ScriptRegistry::default()
            }
        },
        Err(_) => ScriptRegistry::default(),
    };

    for script in &registry.scripts {
        if !SUGGESTED_PORTS.contains(&script.port) {
            tracing::warn!(
                "Port {} of '{}' is outside {}..={}",
                script.port,
                script.name,
                SUGGESTED_PORTS.start(),
                SUGGESTED_PORTS.end()
            );
        }
    }
    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WindowBackendType;

    #[test]
    fn missing_settings_fall_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load_cfg_from(&dir.path().join("settings.json"));
        assert_eq!(cfg, TermslotsConfig::default());
    }

    #[test]
    fn broken_settings_are_reported_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{ not json").unwrap();

        let (cfg, problem) = read_cfg_from(&path);
        assert_eq!(cfg, TermslotsConfig::default());
        let problem = problem.unwrap();
        assert!(problem.starts_with("Ignoring "));
        assert!(problem.contains("settings.json"));

        let (_, missing) = read_cfg_from(&dir.path().join("absent.json"));
        assert_eq!(missing, None);
    }

    #[test]
    fn partial_settings_keep_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{ "slot_count": 3, "window_backend": "Headless", "layout": { "row_height": 40 } }"#,
        )
        .unwrap();

        let cfg = load_cfg_from(&path);
        assert_eq!(cfg.slot_count, 3);
        assert_eq!(cfg.window_backend, WindowBackendType::Headless);
        assert_eq!(cfg.layout.row_height, 40);
        assert_eq!(cfg.layout.main_width, 480);
        assert_eq!(cfg.denied_slot_count, 3);
    }

    #[test]
    fn scripts_registry_parses_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scripts.yaml");
        std::fs::write(
            &path,
            r#"
scripts:
  - name: shopwatcher
    port: 59000
    command: ["termslots", "demo", "--name", "shopwatcher"]
    secondary_windows:
      - name: shop_scanner
        width: 150
        height: 100
  - name: pregamespy
    port: 59001
"#,
        )
        .unwrap();

        let registry = load_scripts_from(&path);
        assert_eq!(registry.names(), vec!["shopwatcher", "pregamespy"]);
        let shop = registry.get("shopwatcher").unwrap();
        assert_eq!(shop.port, 59000);
        assert_eq!(shop.secondary_windows[0].width, 150);
        assert!(registry.get("pregamespy").unwrap().command.is_empty());
        assert!(registry.get("robeau").is_none());
    }
}
