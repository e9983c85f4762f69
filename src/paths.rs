use std::env;
use std::path::PathBuf;
use std::sync::LazyLock;

pub static PATH_HOME: LazyLock<PathBuf> = LazyLock::new(|| {
    env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| env::temp_dir())
});

pub static PATH_LOCAL_SHARE: LazyLock<PathBuf> = LazyLock::new(|| PATH_HOME.join(".local/share"));

/// Root of everything termslots persists: settings, slot database, locks, logs.
pub static PATH_DATA: LazyLock<PathBuf> = LazyLock::new(|| {
    if let Ok(dir) = env::var("TERMSLOTS_DATA_DIR")
        && !dir.trim().is_empty()
    {
        return PathBuf::from(dir);
    }
    if let Ok(xdg_data_home) = env::var("XDG_DATA_HOME") {
        return PathBuf::from(xdg_data_home).join("termslots");
    }
    PATH_LOCAL_SHARE.join("termslots")
});

pub static PATH_SLOTS_DB: LazyLock<PathBuf> = LazyLock::new(|| PATH_DATA.join("slots.db"));

pub static PATH_LOCKS: LazyLock<PathBuf> = LazyLock::new(|| PATH_DATA.join("locks"));

pub static PATH_LOGS: LazyLock<PathBuf> = LazyLock::new(|| PATH_DATA.join("logs"));

/// Create the data directory tree if it does not exist yet.
pub fn ensure_dirs() -> std::io::Result<()> {
    std::fs::create_dir_all(PATH_LOCKS.as_path())?;
    std::fs::create_dir_all(PATH_LOGS.as_path())?;
    Ok(())
}
