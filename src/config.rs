// Configuration management module
// Handles loading, saving, and validating configuration

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::scrobbler::listenbrainz::DEFAULT_API_URL;

const APP_DIR: &str = "mpd-scrobbler";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// MPD connection
    #[serde(default)]
    pub mpd: MpdConfig,

    /// Tag guessing for songs without artist/title tags
    #[serde(default)]
    pub tag_guess: TagGuessConfig,

    /// Scrobbling machine behaviour
    #[serde(default)]
    pub machine: MachineConfig,

    /// Where undelivered scrobbles are kept
    #[serde(default)]
    pub queue: QueueConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// Last.fm configuration
    pub lastfm: Option<LastFmConfig>,

    /// ListenBrainz configurations (can have multiple instances)
    #[serde(default)]
    pub listenbrainz: Vec<ListenBrainzConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MpdConfig {
    pub host: String,
    pub port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl Default for MpdConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 6600,
            password: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TagGuessConfig {
    /// Enable tag guessing
    pub enabled: bool,

    /// Regex patterns with `artist` and `title` named groups, tried in order
    /// against the title tag or, if missing, the file name
    pub patterns: Vec<String>,
}

impl Default for TagGuessConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            patterns: vec![r"(?P<artist>.+) - (?P<title>.+)".to_string()],
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MachineConfig {
    /// Compare song files instead of relying on elapsed time alone to tell a
    /// seek from a song change
    #[serde(default)]
    pub compare_song_identity: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Directory for queue files, defaults to the user data directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directory: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when RUST_LOG is not set
    pub level: String,

    /// Append logs to this file instead of stderr
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LastFmConfig {
    pub enabled: bool,
    pub api_key: String,
    pub api_secret: String,
    pub session_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListenBrainzConfig {
    pub enabled: bool,
    pub name: String,
    pub token: String,
    pub api_url: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mpd: MpdConfig::default(),
            tag_guess: TagGuessConfig::default(),
            machine: MachineConfig::default(),
            queue: QueueConfig::default(),
            logging: LoggingConfig::default(),
            lastfm: Some(LastFmConfig {
                enabled: false,
                api_key: String::new(),
                api_secret: String::new(),
                session_key: String::new(),
            }),
            listenbrainz: vec![ListenBrainzConfig {
                enabled: false,
                name: "Primary".to_string(),
                token: String::new(),
                api_url: DEFAULT_API_URL.to_string(),
            }],
        }
    }
}

impl Config {
    /// Get the path to the configuration file
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().context("Failed to get config directory")?;

        Ok(config_dir.join(APP_DIR).join("config.toml"))
    }

    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load configuration from file, or create default if it doesn't exist
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::info!("Config file not found, creating default at {:?}", path);
            let default_config = Self::default();
            default_config.save_to(path)?;
            return Ok(default_config);
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;

        let config: Config = toml::from_str(&content).context("Failed to parse config file")?;

        config.validate()?;

        Ok(config)
    }

    /// Save configuration to file
    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Create parent directory if it doesn't exist
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(path, content).context("Failed to write config file")?;

        log::info!("Config saved to {:?}", path);

        Ok(())
    }

    /// Directory holding the scrobble queue files
    pub fn queue_dir(&self) -> Result<PathBuf> {
        match &self.queue.directory {
            Some(dir) => Ok(dir.clone()),
            None => {
                let data_dir = dirs::data_dir().context("Failed to get data directory")?;
                Ok(data_dir.join(APP_DIR))
            }
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.mpd.host.trim().is_empty() {
            anyhow::bail!("mpd host must not be empty");
        }
        if self.mpd.port == 0 {
            anyhow::bail!("mpd port must be greater than 0");
        }

        // Check that at least one scrobbler is enabled
        let lastfm_enabled = self.lastfm.as_ref().map(|l| l.enabled).unwrap_or(false);
        let listenbrainz_enabled = self.listenbrainz.iter().any(|l| l.enabled);

        if !lastfm_enabled && !listenbrainz_enabled {
            log::warn!("No scrobbling services are enabled");
        }

        // Validate Last.fm config if enabled
        if let Some(lastfm) = &self.lastfm {
            if lastfm.enabled {
                if lastfm.api_key.is_empty() {
                    anyhow::bail!("Last.fm api_key is required when Last.fm is enabled");
                }
                if lastfm.api_secret.is_empty() {
                    anyhow::bail!("Last.fm api_secret is required when Last.fm is enabled");
                }
                if lastfm.session_key.is_empty() {
                    anyhow::bail!("Last.fm session_key is required when Last.fm is enabled");
                }
            }
        }

        // Validate ListenBrainz configs if enabled
        let mut names = HashSet::new();
        for lb in &self.listenbrainz {
            if !names.insert(lb.name.as_str()) {
                anyhow::bail!("Duplicate ListenBrainz instance name: {}", lb.name);
            }
            if lb.enabled {
                if lb.token.is_empty() {
                    anyhow::bail!(
                        "ListenBrainz token is required when enabled (instance: {})",
                        lb.name
                    );
                }
                if lb.api_url.is_empty() {
                    anyhow::bail!("ListenBrainz api_url is required (instance: {})", lb.name);
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_writes_default() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("sub").join("config.toml");

        let config = Config::load_from(&path).expect("load");
        assert!(path.exists());
        assert_eq!(config.mpd.port, 6600);
        assert!(config.tag_guess.enabled);

        // the written default loads back
        let again = Config::load_from(&path).expect("reload");
        assert_eq!(again.mpd.host, "localhost");
        assert_eq!(again.listenbrainz.len(), 1);
    }

    #[test]
    fn minimal_file_fills_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
[mpd]
host = "music.local"
port = 6601

[machine]
compare_song_identity = true

[queue]
directory = "/var/lib/scrobbler"

[[listenbrainz]]
enabled = true
name = "Home"
token = "abc"
api_url = "https://lb.example.org"
"#,
        )
        .expect("write");

        let config = Config::load_from(&path).expect("load");
        assert_eq!(config.mpd.host, "music.local");
        assert_eq!(config.mpd.password, None);
        assert!(config.machine.compare_song_identity);
        assert!(config.lastfm.is_none());
        assert_eq!(config.logging.level, "info");
        assert_eq!(
            config.queue_dir().expect("queue dir"),
            PathBuf::from("/var/lib/scrobbler")
        );
        assert_eq!(config.tag_guess.patterns.len(), 1);
    }

    #[test]
    fn enabled_services_need_credentials() {
        let mut config = Config::default();
        config.validate().expect("default is valid");

        if let Some(lastfm) = config.lastfm.as_mut() {
            lastfm.enabled = true;
            lastfm.api_key = "key".to_string();
            lastfm.api_secret = "secret".to_string();
        }
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.listenbrainz[0].enabled = true;
        assert!(config.validate().is_err());
    }

    #[test]
    fn duplicate_listenbrainz_names_are_rejected() {
        let mut config = Config::default();
        let copy = config.listenbrainz[0].clone();
        config.listenbrainz.push(copy);
        assert!(config.validate().is_err());
    }

    #[test]
    fn bad_port_is_rejected() {
        let mut config = Config::default();
        config.mpd.port = 0;
        assert!(config.validate().is_err());
    }
}
