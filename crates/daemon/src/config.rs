// Daemon configuration file.
//
// Global config: `~/.draftsync/config.toml`

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::engine::codec::OffsetUnit;
use crate::engine::ManagerOptions;
use crate::security::{ensure_owner_only_dir, ensure_owner_only_file};
use crate::store::backing::DEFAULT_BACKING_DIR;

/// Root directory for draftsync global state: `~/.draftsync/`.
pub fn global_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".draftsync"))
}

/// Path to the global config file: `~/.draftsync/config.toml`.
pub fn global_config_path() -> Option<PathBuf> {
    global_dir().map(|d| d.join("config.toml"))
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct DaemonConfig {
    pub working_copies: WorkingCopiesConfig,
    pub events: EventsConfig,
}

impl DaemonConfig {
    /// Load from `~/.draftsync/config.toml`. Returns defaults if the file
    /// doesn't exist or can't be parsed.
    pub fn load() -> Self {
        global_config_path().and_then(|p| Self::load_from(&p).ok()).unwrap_or_default()
    }

    /// Load from a specific path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        toml::from_str(&contents).map_err(ConfigError::Parse)
    }

    /// Save to a specific path (creates parent directories).
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(ConfigError::Io)?;
            ensure_owner_only_dir(parent)
                .map_err(|error| ConfigError::Io(std::io::Error::other(error.to_string())))?;
        }
        let contents = toml::to_string_pretty(self).map_err(ConfigError::Serialize)?;
        std::fs::write(path, contents).map_err(ConfigError::Io).and_then(|_| {
            ensure_owner_only_file(path)
                .map_err(|error| ConfigError::Io(std::io::Error::other(error.to_string())))
        })
    }

    pub fn manager_options(&self) -> ManagerOptions {
        ManagerOptions {
            backing_dir: self.working_copies.dir.clone(),
            offset_unit: self.working_copies.offset_unit,
            update_capacity: self.events.channel_capacity,
        }
    }

    /// Interval of the background persistence sweep; `None` when disabled.
    pub fn persist_interval(&self) -> Option<Duration> {
        match self.working_copies.persist_interval_sec {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}

/// Where and how working copies are kept.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WorkingCopiesConfig {
    /// Backing directory relative to each project's base folder.
    pub dir: String,
    /// What editor offsets count: `char` or `utf16`.
    pub offset_unit: OffsetUnit,
    /// Seconds between persistence sweeps (0 = disabled).
    pub persist_interval_sec: u64,
}

impl Default for WorkingCopiesConfig {
    fn default() -> Self {
        Self {
            dir: DEFAULT_BACKING_DIR.into(),
            offset_unit: OffsetUnit::Char,
            persist_interval_sec: 30,
        }
    }
}

/// Event channel sizing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EventsConfig {
    /// Capacity of inbound, outbound and update channels.
    pub channel_capacity: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self { channel_capacity: 512 }
    }
}

// ── Errors ─────────────────────────────────────────────────────────

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Serialize(toml::ser::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "config I/O error: {e}"),
            Self::Parse(e) => write!(f, "config parse error: {e}"),
            Self::Serialize(e) => write!(f, "config serialize error: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults() {
        let cfg = DaemonConfig::default();
        assert_eq!(cfg.working_copies.dir, ".draftsync/working_copies");
        assert_eq!(cfg.working_copies.offset_unit, OffsetUnit::Char);
        assert_eq!(cfg.persist_interval(), Some(Duration::from_secs(30)));
        assert_eq!(cfg.events.channel_capacity, 512);
    }

    #[test]
    fn roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/config.toml");

        let cfg = DaemonConfig {
            working_copies: WorkingCopiesConfig {
                dir: ".cache/wc".into(),
                offset_unit: OffsetUnit::Utf16,
                persist_interval_sec: 5,
            },
            events: EventsConfig { channel_capacity: 8 },
        };
        cfg.save_to(&path).unwrap();
        let loaded = DaemonConfig::load_from(&path).unwrap();
        assert_eq!(cfg, loaded);
    }

    #[test]
    fn parse_from_toml() {
        let toml_str = r#"
[working_copies]
dir = ".wc"
offset_unit = "utf16"
persist_interval_sec = 0

[events]
channel_capacity = 64
"#;
        let cfg: DaemonConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.working_copies.offset_unit, OffsetUnit::Utf16);
        assert_eq!(cfg.persist_interval(), None);

        let options = cfg.manager_options();
        assert_eq!(options.backing_dir, ".wc");
        assert_eq!(options.update_capacity, 64);
    }

    #[test]
    fn partial_toml_uses_defaults() {
        let cfg: DaemonConfig = toml::from_str("[working_copies]\ndir = \".wc\"\n").unwrap();
        assert_eq!(cfg.working_copies.dir, ".wc");
        assert_eq!(cfg.working_copies.persist_interval_sec, 30); // default
        assert_eq!(cfg.events, EventsConfig::default());
    }

    #[test]
    fn unknown_offset_unit_is_rejected() {
        let error = toml::from_str::<DaemonConfig>("[working_copies]\noffset_unit = \"bytes\"\n")
            .expect_err("parse should fail");
        assert!(error.to_string().contains("unknown variant"));
    }

    #[test]
    fn load_missing_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            DaemonConfig::load_from(&dir.path().join("missing.toml")),
            Err(ConfigError::Io(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn saved_config_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        DaemonConfig::default().save_to(&path).unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
    }
}
