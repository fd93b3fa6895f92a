//! Data directory and executable path resolution.
//!
//! Priority for the data directory:
//! 1. `DIALFARM_DATA_DIR` (explicit override)
//! 2. `XDG_DATA_HOME/dialfarm` (Linux standard)
//! 3. `~/.dialfarm` (home directory fallback)
//! 4. `/tmp/dialfarm` (last resort)
//!
//! Layout under the data directory:
//! - `coords/<W>x<H>.txt`: coordinate cache, one file per screen geometry
//! - `outcomes.csv`: append-only session outcome log

use std::env;
use std::path::{Path, PathBuf};

use dialfarm_core::coords::ScreenSize;

/// Non-empty value of an environment variable.
fn env_non_empty(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.is_empty())
}

/// Get data directory with priority fallback.
pub fn get_data_dir() -> PathBuf {
    if let Some(dir) = env_non_empty("DIALFARM_DATA_DIR") {
        return PathBuf::from(dir);
    }

    if let Some(data_home) = env_non_empty("XDG_DATA_HOME") {
        return PathBuf::from(data_home).join("dialfarm");
    }

    if let Some(home) = dirs::home_dir() {
        return home.join(".dialfarm");
    }

    env::temp_dir().join("dialfarm")
}

/// Directory holding the per-geometry coordinate caches.
pub fn get_coords_dir() -> PathBuf {
    get_data_dir().join("coords")
}

/// Path of the outcome log.
pub fn get_outcome_log_path() -> PathBuf {
    get_data_dir().join("outcomes.csv")
}

/// The adb executable: `DIALFARM_ADB` or `adb` from `PATH`.
pub fn get_adb_program() -> PathBuf {
    env_non_empty("DIALFARM_ADB")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("adb"))
}

/// Cache file for one screen geometry inside `dir`.
pub fn cache_file(dir: &Path, size: ScreenSize) -> PathBuf {
    dir.join(format!("{}.txt", size))
}

/// Recover the screen geometry from a cache file name, if it is one.
pub fn parse_cache_file_name(path: &Path) -> Option<ScreenSize> {
    let stem = path
        .file_name()?
        .to_str()?
        .strip_suffix(".txt")?;
    let (w, h) = stem.split_once('x')?;
    ScreenSize::new(w.parse().ok()?, h.parse().ok()?)
}

/// Ensure a directory exists, restricting it to the current user on Unix.
pub fn ensure_dir(dir: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(dir)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o700))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    // Env var manipulation is process-global, so these tests run serially.
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    // Saves env vars on creation and restores them on drop, holding the mutex.
    struct EnvGuard {
        vars: Vec<(String, Option<String>)>,
        _lock: std::sync::MutexGuard<'static, ()>,
    }

    impl EnvGuard {
        fn new(var_names: &[&str]) -> Self {
            let lock = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
            let vars = var_names
                .iter()
                .map(|name| (name.to_string(), std::env::var(name).ok()))
                .collect();
            Self { vars, _lock: lock }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (name, value) in &self.vars {
                // SAFETY: We hold ENV_MUTEX, so no other test thread is modifying env vars
                unsafe {
                    match value {
                        Some(v) => std::env::set_var(name, v),
                        None => std::env::remove_var(name),
                    }
                }
            }
        }
    }

    #[test]
    fn test_data_dir_explicit_override() {
        let _guard = EnvGuard::new(&["DIALFARM_DATA_DIR", "XDG_DATA_HOME"]);
        // SAFETY: We hold ENV_MUTEX via _guard
        unsafe {
            std::env::set_var("DIALFARM_DATA_DIR", "/srv/dialfarm");
            std::env::set_var("XDG_DATA_HOME", "/home/op/.local/share");
        }

        assert_eq!(get_data_dir(), PathBuf::from("/srv/dialfarm"));
        assert_eq!(get_coords_dir(), PathBuf::from("/srv/dialfarm/coords"));
        assert_eq!(
            get_outcome_log_path(),
            PathBuf::from("/srv/dialfarm/outcomes.csv")
        );
    }

    #[test]
    fn test_data_dir_ignores_empty_override() {
        let _guard = EnvGuard::new(&["DIALFARM_DATA_DIR", "XDG_DATA_HOME"]);
        // SAFETY: We hold ENV_MUTEX via _guard
        unsafe {
            std::env::set_var("DIALFARM_DATA_DIR", "");
            std::env::set_var("XDG_DATA_HOME", "/home/op/.local/share");
        }

        assert_eq!(
            get_data_dir(),
            PathBuf::from("/home/op/.local/share/dialfarm")
        );
    }

    #[test]
    fn test_data_dir_home_fallback() {
        let _guard = EnvGuard::new(&["DIALFARM_DATA_DIR", "XDG_DATA_HOME"]);
        // SAFETY: We hold ENV_MUTEX via _guard
        unsafe {
            std::env::remove_var("DIALFARM_DATA_DIR");
            std::env::remove_var("XDG_DATA_HOME");
        }

        let dir = get_data_dir();
        if let Some(home) = dirs::home_dir() {
            assert_eq!(dir, home.join(".dialfarm"));
        } else {
            assert!(dir.ends_with("dialfarm"));
        }
    }

    #[test]
    fn test_adb_program_override() {
        let _guard = EnvGuard::new(&["DIALFARM_ADB"]);
        // SAFETY: We hold ENV_MUTEX via _guard
        unsafe { std::env::set_var("DIALFARM_ADB", "/opt/platform-tools/adb") };
        assert_eq!(get_adb_program(), PathBuf::from("/opt/platform-tools/adb"));

        // SAFETY: We hold ENV_MUTEX via _guard
        unsafe { std::env::remove_var("DIALFARM_ADB") };
        assert_eq!(get_adb_program(), PathBuf::from("adb"));
    }

    #[test]
    fn test_cache_file_name_roundtrip() {
        let size = ScreenSize::new(1080, 2400).unwrap();
        let path = cache_file(Path::new("/data/coords"), size);
        assert_eq!(path, PathBuf::from("/data/coords/1080x2400.txt"));
        assert_eq!(parse_cache_file_name(&path), Some(size));
    }

    #[test]
    fn test_parse_cache_file_name_rejects_others() {
        assert_eq!(parse_cache_file_name(Path::new("outcomes.csv")), None);
        assert_eq!(parse_cache_file_name(Path::new("1080x2400.txt.tmp")), None);
        assert_eq!(parse_cache_file_name(Path::new("notes.txt")), None);
    }

    #[test]
    fn test_ensure_dir_creates_nested() {
        let tmp = tempfile::tempdir().unwrap();
        let nested = tmp.path().join("a").join("coords");
        ensure_dir(&nested).unwrap();
        assert!(nested.is_dir());
    }
}
