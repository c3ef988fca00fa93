//! Per-user directories for config and logs.

use std::io;
use std::path::{Path, PathBuf};

const APP_NAME: &str = "orrery";

#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    #[error("could not determine OS configuration directory")]
    NoConfigDir,
    #[error("platform I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Where `config.ron` and the debug log live.
#[derive(Debug, Clone, PartialEq)]
pub struct PlatformDirs {
    pub config_dir: PathBuf,
    pub log_dir: PathBuf,
}

impl PlatformDirs {
    /// OS conventions: XDG on Linux, Known Folders on Windows, Library on macOS.
    /// Logs go to the local data dir, or next to the config if there is none.
    pub fn resolve() -> Result<Self, PlatformError> {
        let config_dir = dirs::config_dir()
            .ok_or(PlatformError::NoConfigDir)?
            .join(APP_NAME);
        let log_dir = dirs::data_local_dir()
            .map(|d| d.join(APP_NAME).join("logs"))
            .unwrap_or_else(|| config_dir.join("logs"));
        Ok(Self {
            config_dir,
            log_dir,
        })
    }

    /// Use an explicit config directory, logging into a `logs` subdirectory.
    pub fn with_config_dir(config_dir: impl Into<PathBuf>) -> Self {
        let config_dir = config_dir.into();
        Self {
            log_dir: config_dir.join("logs"),
            config_dir,
        }
    }

    /// Both directories under `root/orrery`. Used by tests.
    pub fn resolve_with_root(root: &Path) -> Self {
        Self::with_config_dir(root.join(APP_NAME))
    }

    pub fn create_dirs(&self) -> Result<(), PlatformError> {
        std::fs::create_dir_all(&self.config_dir)?;
        std::fs::create_dir_all(&self.log_dir)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_is_absolute() {
        let Ok(dirs) = PlatformDirs::resolve() else {
            return;
        };
        assert!(dirs.config_dir.is_absolute());
        assert!(dirs.log_dir.is_absolute());
        assert!(dirs.config_dir.ends_with(APP_NAME));
    }

    #[test]
    fn test_explicit_config_dir() {
        let dirs = PlatformDirs::with_config_dir("/tmp/orrery-cfg");
        assert_eq!(dirs.config_dir, PathBuf::from("/tmp/orrery-cfg"));
        assert_eq!(dirs.log_dir, PathBuf::from("/tmp/orrery-cfg").join("logs"));
    }

    #[test]
    fn test_directory_creation() {
        let tmp = tempfile::tempdir().unwrap();
        let dirs = PlatformDirs::resolve_with_root(tmp.path());
        dirs.create_dirs().unwrap();
        assert!(dirs.config_dir.is_dir());
        assert!(dirs.log_dir.is_dir());
    }
}
