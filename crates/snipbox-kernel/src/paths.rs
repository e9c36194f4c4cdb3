//! XDG Base Directory paths for snipbox.
//!
//! | Purpose | XDG Variable | Default |
//! |---------|--------------|---------|
//! | Config | `$XDG_CONFIG_HOME` | `~/.config` |
//! | Cache | `$XDG_CACHE_HOME` | `~/.cache` |
//!
//! Staged scripts live under the cache root, in `staging/`.

use std::path::PathBuf;

use directories::BaseDirs;

/// Name of the staging directory under a cache root.
pub const STAGING_DIR_NAME: &str = "staging";

/// Get the user's home directory.
///
/// Returns `$HOME` or falls back to `/tmp` if not set.
pub fn home_dir() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

/// Get XDG config home directory.
///
/// Returns `$XDG_CONFIG_HOME` or falls back to `~/.config`.
pub fn xdg_config_home() -> PathBuf {
    BaseDirs::new()
        .map(|d| d.config_dir().to_path_buf())
        .unwrap_or_else(|| home_dir().join(".config"))
}

/// Get XDG cache home directory.
///
/// Returns `$XDG_CACHE_HOME` or falls back to `~/.cache`.
pub fn xdg_cache_home() -> PathBuf {
    BaseDirs::new()
        .map(|d| d.cache_dir().to_path_buf())
        .unwrap_or_else(|| home_dir().join(".cache"))
}

/// Get the snipbox config directory.
pub fn config_dir() -> PathBuf {
    xdg_config_home().join("snipbox")
}

/// Get the snipbox cache directory.
pub fn cache_dir() -> PathBuf {
    xdg_cache_home().join("snipbox")
}

/// Get the default staging directory.
pub fn staging_dir() -> PathBuf {
    cache_dir().join(STAGING_DIR_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn home_dir_is_absolute() {
        assert!(home_dir().is_absolute());
    }

    #[test]
    fn xdg_cache_home_defaults_to_cache() {
        let cache = xdg_cache_home();
        assert!(cache.is_absolute());
        let path_str = cache.to_string_lossy();
        assert!(
            path_str.ends_with(".cache") || std::env::var("XDG_CACHE_HOME").is_ok(),
            "Expected .cache or XDG override, got: {}",
            path_str
        );
    }

    #[test]
    fn snipbox_paths_build_on_xdg_primitives() {
        assert_eq!(config_dir(), xdg_config_home().join("snipbox"));
        assert_eq!(cache_dir(), xdg_cache_home().join("snipbox"));
        assert_eq!(staging_dir(), cache_dir().join("staging"));
    }
}
