// ListenBrainz scrobbler implementation
// API Documentation: https://listenbrainz.readthedocs.io/

use std::cell::RefCell;
use std::fmt;

use listenbrainz::ListenBrainz;

use super::traits::{required_tags, Transport};
use crate::error::TransportError;
use crate::model::Song;

pub const DEFAULT_API_URL: &str = "https://api.listenbrainz.org";

/// ListenBrainz instance. Authentication needs the network, so it happens
/// on first use and is retried on every call until it succeeds.
pub struct ListenBrainzScrobbler {
    name: String,
    id: String,
    token: String,
    api_url: String,
    client: RefCell<Option<ListenBrainz>>,
}

impl ListenBrainzScrobbler {
    pub fn new(name: String, token: String, api_url: String) -> Self {
        let id = format!("listenbrainz-{}", sanitize(&name));
        Self {
            name,
            id,
            token,
            api_url,
            client: RefCell::new(None),
        }
    }

    fn connect(&self) -> Result<ListenBrainz, TransportError> {
        let mut client = if self.api_url == DEFAULT_API_URL {
            ListenBrainz::new()
        } else {
            ListenBrainz::new_with_url(&self.api_url)
        };

        client.authenticate(&self.token).map_err(|e| {
            TransportError::Service(format!(
                "Failed to authenticate with ListenBrainz ({}): {}",
                self.name, e
            ))
        })?;

        log::info!("ListenBrainz ({}): Authenticated", self.name);
        Ok(client)
    }

    fn with_client<F, E>(&self, action: &str, f: F) -> Result<(), TransportError>
    where
        F: FnOnce(&ListenBrainz) -> Result<(), E>,
        E: fmt::Display,
    {
        let mut slot = self.client.borrow_mut();
        if slot.is_none() {
            *slot = Some(self.connect()?);
        }
        let client = slot.as_ref().ok_or_else(|| {
            TransportError::Service(format!("ListenBrainz ({}) is not connected", self.name))
        })?;

        f(client).map_err(|e| {
            TransportError::Service(format!("ListenBrainz ({}) {}: {}", self.name, action, e))
        })
    }
}

impl Transport for ListenBrainzScrobbler {
    fn id(&self) -> &str {
        &self.id
    }

    fn now_playing(&self, song: &Song) -> Result<(), TransportError> {
        let (artist, title) = required_tags(song)?;
        log::debug!(
            "Sending now playing to ListenBrainz ({}): {} - {}",
            self.name,
            artist,
            title
        );

        self.with_client("now playing", |client| {
            client.playing_now(artist, title, song.album.as_deref())
        })?;

        log::info!("ListenBrainz ({}): Now playing updated", self.name);
        Ok(())
    }

    fn scrobble(&self, song: &Song, start: i64) -> Result<(), TransportError> {
        let (artist, title) = required_tags(song)?;
        log::debug!(
            "Scrobbling to ListenBrainz ({}): {} - {}",
            self.name,
            artist,
            title
        );

        // import() keeps the original listen time, listen() would use "now"
        self.with_client("scrobble", |client| {
            client.import(artist, title, song.album.as_deref(), start)
        })?;

        log::info!("ListenBrainz ({}): Scrobbled successfully", self.name);
        Ok(())
    }
}

/// Lower-case name safe to embed in a file name
pub(crate) fn sanitize(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect();

    if cleaned.is_empty() {
        "default".to_string()
    } else {
        cleaned
    }
}
