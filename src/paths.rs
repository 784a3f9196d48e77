//! Centralised toolbelt user-directory resolution.
//!
//! When `TOOLBELT_HOME` is set, it replaces **all** platform-native user
//! directories (config and data alike).  Project-local `.toolbelt/`
//! directories are unaffected.
//!
//! Priority for the user-level base directory:
//!   1. `TOOLBELT_HOME` env var (if set and non-empty)
//!   2. `dirs::config_dir().map(|d| d.join("toolbelt"))` (platform default)
//!
//! For the memory directory, `TOOLBELT_MEMORY_DIR` applies on top; see
//! `config::load`.

use std::path::PathBuf;

/// Return the `TOOLBELT_HOME` path when set and non-empty, otherwise fall
/// through to the platform-native `dirs_fallback`.
fn resolve_user_path(dirs_fallback: Option<PathBuf>) -> Option<PathBuf> {
    if let Ok(home) = std::env::var("TOOLBELT_HOME")
        && !home.is_empty()
    {
        return Some(PathBuf::from(home));
    }
    dirs_fallback
}

/// Returns the toolbelt user-level config directory.
///
/// This is the single source of truth for user-level config paths
/// (`config.toml`).
pub fn user_dir() -> Option<PathBuf> {
    resolve_user_path(dirs::config_dir().map(|d| d.join("toolbelt")))
}

/// Returns the base directory for data files (the memory directory lives
/// under it by default).
///
/// When `TOOLBELT_HOME` is set, identical to `user_dir()`.
pub fn user_data_dir() -> Option<PathBuf> {
    resolve_user_path(dirs::data_local_dir().map(|d| d.join("toolbelt")))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serial_test::serial;

    use super::*;

    fn set_home(val: &str) {
        // SAFETY: test-only env mutation; #[serial] prevents races.
        unsafe { std::env::set_var("TOOLBELT_HOME", val) };
    }

    fn clear_home() {
        unsafe { std::env::remove_var("TOOLBELT_HOME") };
    }

    #[test]
    #[serial]
    fn user_dir_uses_toolbelt_home_when_set() {
        set_home("/custom/toolbelt/home");
        let result = user_dir();
        clear_home();
        assert_eq!(result, Some(PathBuf::from("/custom/toolbelt/home")));
    }

    #[test]
    #[serial]
    fn user_dir_ignores_empty_toolbelt_home() {
        set_home("");
        let result = user_dir();
        clear_home();
        if let Some(p) = result {
            assert_ne!(p, PathBuf::from(""));
        }
    }

    #[test]
    #[serial]
    fn user_data_dir_uses_toolbelt_home_when_set() {
        set_home("/custom/toolbelt/home");
        let result = user_data_dir();
        clear_home();
        assert_eq!(result, Some(PathBuf::from("/custom/toolbelt/home")));
    }

    #[test]
    #[serial]
    fn user_dir_fallback_matches_dirs_crate() {
        clear_home();
        let via_paths = user_dir();
        let via_dirs = dirs::config_dir().map(|d| d.join("toolbelt"));
        assert_eq!(via_paths, via_dirs);
    }

    #[test]
    #[serial]
    fn both_dirs_agree_when_toolbelt_home_set() {
        set_home("/unified/home");
        let config = user_dir();
        let data = user_data_dir();
        clear_home();
        assert_eq!(config, data);
        assert_eq!(config, Some(PathBuf::from("/unified/home")));
    }
}
