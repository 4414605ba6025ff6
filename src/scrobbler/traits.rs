// Common traits for scrobbling services

use crate::error::TransportError;
use crate::model::Song;

/// A remote service that accepts now playing updates and scrobbles.
/// Calls block for the network round trip.
pub trait Transport {
    /// Short identifier, used in log lines and queue file names
    fn id(&self) -> &str;

    /// Update "now playing" status
    fn now_playing(&self, song: &Song) -> Result<(), TransportError>;

    /// Submit a scrobble for a song that started at `start` (epoch seconds)
    fn scrobble(&self, song: &Song, start: i64) -> Result<(), TransportError>;
}

/// Artist and title of a song, or a rejection if either is missing
pub(crate) fn required_tags(song: &Song) -> Result<(&str, &str), TransportError> {
    song.tags()
        .ok_or_else(|| TransportError::Rejected(format!("song has no artist/title: {}", song)))
}
