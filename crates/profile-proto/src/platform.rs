use std::path::PathBuf;

const APP_DIR: &str = "profile-sync";

/// File the game client writes while it is running. Holds
/// `name:pid:port:password:protocol`.
pub const LOCKFILE_NAME: &str = "lockfile";

/// Overrides both directories; handy for running a second daemon side by side.
const HOME_ENV: &str = "PROFILE_SYNC_HOME";

fn override_dir() -> Option<PathBuf> {
    std::env::var_os(HOME_ENV)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

/// Settings, activity exports and the daemon log.
pub fn data_dir() -> PathBuf {
    if let Some(dir) = override_dir() {
        return dir;
    }
    // XDG layout on macOS too, so support requests look the same everywhere
    #[cfg(unix)]
    let base = dirs::home_dir().map(|h| h.join(".local").join("share"));
    #[cfg(windows)]
    let base = dirs::data_local_dir();

    base.unwrap_or_else(std::env::temp_dir).join(APP_DIR)
}

/// Holds `config.toml`.
pub fn config_dir() -> PathBuf {
    if let Some(dir) = override_dir() {
        return dir;
    }
    #[cfg(unix)]
    let base = dirs::home_dir().map(|h| h.join(".config"));
    #[cfg(windows)]
    let base = dirs::config_dir();

    base.unwrap_or_else(|| PathBuf::from(".")).join(APP_DIR)
}

#[cfg(windows)]
fn install_dirs() -> Vec<PathBuf> {
    let mut dirs = vec![PathBuf::from(r"C:\Riot Games\League of Legends")];
    if let Ok(drive) = std::env::var("SystemDrive") {
        dirs.push(PathBuf::from(format!(r"{}\Riot Games\League of Legends", drive)));
    }
    dirs
}

#[cfg(target_os = "macos")]
fn install_dirs() -> Vec<PathBuf> {
    vec![PathBuf::from(
        "/Applications/League of Legends.app/Contents/LoL",
    )]
}

#[cfg(all(unix, not(target_os = "macos")))]
fn install_dirs() -> Vec<PathBuf> {
    // No native client; Wine prefixes vary too much to guess. Users point
    // `lcu.lockfile_path` at their prefix instead.
    Vec::new()
}

/// Lockfile locations to check, in priority order.
pub fn lockfile_candidates() -> Vec<PathBuf> {
    install_dirs()
        .into_iter()
        .map(|dir| dir.join(LOCKFILE_NAME))
        .collect()
}
