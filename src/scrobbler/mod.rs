// Scrobbler module
// Contains implementations for various scrobbling services

#[cfg(test)]
pub(crate) mod fake;
pub mod lastfm;
pub mod listenbrainz;
pub mod traits;

pub use self::lastfm::LastFmScrobbler;
pub use self::listenbrainz::ListenBrainzScrobbler;
pub use self::traits::Transport;

use crate::config::Config;
use crate::error::TransportError;
use crate::model::Song;

/// Scrobbling service
pub enum Service {
    LastFm(LastFmScrobbler),
    ListenBrainz(ListenBrainzScrobbler),
}

impl Service {
    /// Create a Last.fm service
    pub fn lastfm(api_key: &str, api_secret: &str, session_key: &str) -> Self {
        Self::LastFm(LastFmScrobbler::new(api_key, api_secret, session_key))
    }

    /// Create a ListenBrainz service
    pub fn listenbrainz(name: String, token: String, api_url: String) -> Self {
        Self::ListenBrainz(ListenBrainzScrobbler::new(name, token, api_url))
    }

    /// Every service enabled in the config
    pub fn from_config(config: &Config) -> Vec<Self> {
        let mut services = Vec::new();

        if let Some(lastfm) = config.lastfm.as_ref().filter(|l| l.enabled) {
            services.push(Self::lastfm(
                &lastfm.api_key,
                &lastfm.api_secret,
                &lastfm.session_key,
            ));
        }

        for lb in config.listenbrainz.iter().filter(|l| l.enabled) {
            services.push(Self::listenbrainz(
                lb.name.clone(),
                lb.token.clone(),
                lb.api_url.clone(),
            ));
        }

        services
    }

    fn transport(&self) -> &dyn Transport {
        match self {
            Self::LastFm(scrobbler) => scrobbler,
            Self::ListenBrainz(scrobbler) => scrobbler,
        }
    }
}

impl Transport for Service {
    fn id(&self) -> &str {
        self.transport().id()
    }

    fn now_playing(&self, song: &Song) -> Result<(), TransportError> {
        self.transport().now_playing(song)
    }

    fn scrobble(&self, song: &Song, start: i64) -> Result<(), TransportError> {
        self.transport().scrobble(song, start)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LastFmConfig, ListenBrainzConfig};

    #[test]
    fn only_enabled_services_are_built() {
        let mut config = Config::default();
        assert!(Service::from_config(&config).is_empty());

        config.lastfm = Some(LastFmConfig {
            enabled: true,
            api_key: "key".to_string(),
            api_secret: "secret".to_string(),
            session_key: "session".to_string(),
        });
        config.listenbrainz = vec![
            ListenBrainzConfig {
                enabled: true,
                name: "Primary".to_string(),
                token: "token".to_string(),
                api_url: super::listenbrainz::DEFAULT_API_URL.to_string(),
            },
            ListenBrainzConfig {
                enabled: false,
                name: "Backup".to_string(),
                token: "token".to_string(),
                api_url: "https://lb.example.org".to_string(),
            },
        ];

        let ids: Vec<String> = Service::from_config(&config)
            .iter()
            .map(|s| s.id().to_string())
            .collect();
        assert_eq!(ids, ["lastfm", "listenbrainz-primary"]);
    }
}
