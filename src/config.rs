use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, ensure};
use serde::Deserialize;

const DEFAULT_SLIDESHOW_DIR: &str = "public/slideshow";
const DEFAULT_URL_PREFIX: &str = "/slideshow";
const DEFAULT_MUSIC_PLAYLIST_ID: &str = "37i9dQZF1DX0Yxoavh5qJV";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct Configuration {
    /// Flat folder whose image files make up the slideshow.
    pub slideshow_dir: PathBuf,
    /// Public URL prefix the image files are served under.
    pub url_prefix: String,
    /// Delay between automatic slide advances.
    #[serde(with = "humantime_serde")]
    pub advance_interval: Duration,
    /// Playlist embedded as background music on the landing page.
    pub music_playlist_id: String,
    /// Heading shown on the landing page.
    pub title: String,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct ServerConfig {
    pub bind_address: IpAddr,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 3000,
        }
    }
}

impl Configuration {
    pub const DEFAULT_ADVANCE_INTERVAL: Duration = Duration::from_secs(10);

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let s = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&s)?)
    }

    /// Like [`Configuration::from_yaml_file`], but a missing file yields the defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::info!(config = %path.display(), "config file not found; using defaults");
            return Ok(Self::default());
        }
        Self::from_yaml_file(path)
            .with_context(|| format!("failed to load configuration from {}", path.display()))
    }

    /// Validate runtime invariants that cannot be expressed via serde defaults alone.
    pub fn validated(self) -> Result<Self> {
        ensure!(
            self.advance_interval > Duration::ZERO,
            "advance-interval must be greater than zero"
        );
        ensure!(
            self.url_prefix.starts_with('/'),
            "url-prefix must start with '/'"
        );
        ensure!(
            self.url_prefix.len() == 1 || !self.url_prefix.ends_with('/'),
            "url-prefix must not end with '/'"
        );
        ensure!(
            !self.slideshow_dir.as_os_str().is_empty(),
            "slideshow-dir must not be empty"
        );
        ensure!(
            !self.music_playlist_id.is_empty()
                && self
                    .music_playlist_id
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric()),
            "music-playlist-id must be a non-empty alphanumeric id"
        );
        Ok(self)
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            slideshow_dir: PathBuf::from(DEFAULT_SLIDESHOW_DIR),
            url_prefix: DEFAULT_URL_PREFIX.to_string(),
            advance_interval: Self::DEFAULT_ADVANCE_INTERVAL,
            music_playlist_id: DEFAULT_MUSIC_PLAYLIST_ID.to_string(),
            title: "Winter Festival".to_string(),
            server: ServerConfig::default(),
        }
    }
}
