// Last.fm scrobbler implementation

use rustfm_scrobble_proxy::{Scrobble, Scrobbler};

use super::traits::{required_tags, Transport};
use crate::error::TransportError;
use crate::model::Song;

pub struct LastFmScrobbler {
    client: Scrobbler,
}

impl LastFmScrobbler {
    pub fn new(api_key: &str, api_secret: &str, session_key: &str) -> Self {
        let mut client = Scrobbler::new(api_key, api_secret);
        client.authenticate_with_session_key(session_key);
        Self { client }
    }
}

impl Transport for LastFmScrobbler {
    fn id(&self) -> &str {
        "lastfm"
    }

    fn now_playing(&self, song: &Song) -> Result<(), TransportError> {
        let (artist, title) = required_tags(song)?;
        let scrobble = Scrobble::new(artist, title, song.album.as_deref());

        self.client
            .now_playing(&scrobble)
            .map_err(|e| TransportError::Service(format!("Last.fm now playing: {}", e)))?;

        log::info!("Last.fm: Now playing updated");
        Ok(())
    }

    fn scrobble(&self, song: &Song, start: i64) -> Result<(), TransportError> {
        let (artist, title) = required_tags(song)?;
        let mut scrobble = Scrobble::new(artist, title, song.album.as_deref());
        scrobble.with_timestamp(start.max(0) as u64);

        self.client
            .scrobble(&scrobble)
            .map_err(|e| TransportError::Service(format!("Last.fm scrobble: {}", e)))?;

        log::info!("Last.fm: Scrobbled successfully");
        Ok(())
    }
}
