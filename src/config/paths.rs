//! Default locations for config, credentials and downloaded mods

use directories::ProjectDirs;
use std::path::PathBuf;

/// Per-user directories for factorio-mod-sync.
///
/// Used only when `mods_dir` or `server_settings_path` are not set in the config.
#[derive(Debug, Clone)]
pub struct Paths {
    dirs: ProjectDirs,
}

impl Default for Paths {
    fn default() -> Self {
        Self::new()
    }
}

impl Paths {
    pub fn new() -> Self {
        let dirs = ProjectDirs::from("", "", "factorio-mod-sync")
            .expect("No home directory to place factorio-mod-sync files in");
        Self { dirs }
    }

    pub fn config_dir(&self) -> PathBuf {
        self.dirs.config_dir().to_path_buf()
    }

    /// `config.toml` in the config dir.
    pub fn config_file(&self) -> PathBuf {
        self.config_dir().join("config.toml")
    }

    /// Fallback `server-settings.json` holding the portal username and token.
    pub fn server_settings_file(&self) -> PathBuf {
        self.config_dir().join("server-settings.json")
    }

    /// Fallback mods directory (holds `mod-list.json` and the archives).
    pub fn mods_dir(&self) -> PathBuf {
        self.dirs.data_dir().join("mods")
    }

    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(self.config_dir())?;
        std::fs::create_dir_all(self.mods_dir())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_live_under_project_dirs() {
        let paths = Paths::new();
        assert!(paths.config_file().starts_with(paths.config_dir()));
        assert!(paths.server_settings_file().ends_with("server-settings.json"));
        assert!(paths.mods_dir().ends_with("mods"));
    }
}
