// Value types describing what the player has loaded and what it is doing

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ParseError;

/// Shortest track (ms) that may be scrobbled at all
pub const MIN_SCROBBLABLE_LENGTH: i64 = 30_000;
/// Least listening time (ms) before a scrobble, also used for streams
pub const MIN_SCROBBLE_THRESHOLD: i64 = 15_000;
/// Listening time (ms) after which any track qualifies (4 minutes)
pub const MAX_SCROBBLE_THRESHOLD: i64 = 240_000;

/// Key/value pairs as reported by the player, keys lower-cased
pub type Fields = HashMap<String, String>;

/// A song loaded in the player
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Song {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artist: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub album: Option<String>,
    /// File path relative to the music directory, or a stream URL
    pub file: String,
    /// Track length in milliseconds, never set for streams
    #[serde(default, rename = "length", skip_serializing_if = "Option::is_none")]
    pub length_millis: Option<i64>,
}

impl Song {
    pub fn new(file: impl Into<String>) -> Self {
        Self {
            title: None,
            artist: None,
            album: None,
            file: file.into(),
            length_millis: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_artist(mut self, artist: impl Into<String>) -> Self {
        self.artist = Some(artist.into());
        self
    }

    pub fn with_album(mut self, album: impl Into<String>) -> Self {
        self.album = Some(album.into());
        self
    }

    pub fn with_length_secs(mut self, seconds: i64) -> Self {
        if !self.is_stream() {
            self.length_millis = Some(seconds.saturating_mul(1000));
        }
        self
    }

    /// Build a song from a `currentsong` response.
    ///
    /// Only `file` is required. Empty tags are treated as missing, and the
    /// length is taken from `time` (whole seconds) or `duration` (fractional
    /// seconds) for anything that is not a stream.
    pub fn from_fields(fields: &Fields) -> Result<Self, ParseError> {
        let file = fields
            .get("file")
            .filter(|f| !f.is_empty())
            .ok_or(ParseError::MissingField("file"))?
            .clone();

        let tag = |key: &str| {
            fields
                .get(key)
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        let mut song = Self {
            title: tag("title"),
            artist: tag("artist"),
            album: tag("album"),
            file,
            length_millis: None,
        };

        if !song.is_stream() {
            song.length_millis = parse_length(fields)?;
        }

        Ok(song)
    }

    /// Streams are identified by a network URL scheme in the locator
    pub fn is_stream(&self) -> bool {
        match self.file.split_once("://") {
            Some((scheme, _)) => {
                let mut chars = scheme.chars();
                let valid = chars.next().is_some_and(|c| c.is_ascii_alphabetic())
                    && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
                valid && !scheme.eq_ignore_ascii_case("file")
            }
            None => false,
        }
    }

    /// Artist and title, when both are known
    pub fn tags(&self) -> Option<(&str, &str)> {
        let artist = self.artist.as_deref().filter(|a| !a.is_empty())?;
        let title = self.title.as_deref().filter(|t| !t.is_empty())?;
        Some((artist, title))
    }

    /// Whether the song may be announced and scrobbled at all
    pub fn is_eligible(&self) -> bool {
        self.tags().is_some()
            && (self.is_stream()
                || self
                    .length_millis
                    .is_some_and(|length| length > MIN_SCROBBLABLE_LENGTH))
    }

    /// Listening time (ms) that must be exceeded before the song is scrobbled
    pub fn scrobble_threshold(&self) -> i64 {
        if self.is_stream() {
            return MIN_SCROBBLE_THRESHOLD;
        }
        self.length_millis
            .map(|length| (length / 2).clamp(MIN_SCROBBLE_THRESHOLD, MAX_SCROBBLE_THRESHOLD))
            .unwrap_or(MIN_SCROBBLE_THRESHOLD)
    }
}

fn parse_length(fields: &Fields) -> Result<Option<i64>, ParseError> {
    if let Some(time) = fields.get("time") {
        let millis = time
            .trim()
            .parse::<i64>()
            .ok()
            .and_then(|seconds| seconds.checked_mul(1000))
            .ok_or_else(|| ParseError::InvalidField {
                field: "time",
                value: time.clone(),
            })?;
        return Ok(Some(millis));
    }

    if let Some(duration) = fields.get("duration") {
        let seconds = parse_seconds("duration", duration)?;
        return Ok(Some((seconds * 1000.0) as i64));
    }

    Ok(None)
}

fn parse_seconds(field: &'static str, value: &str) -> Result<f64, ParseError> {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|s| s.is_finite() && *s >= 0.0)
        .ok_or_else(|| ParseError::InvalidField {
            field,
            value: value.to_string(),
        })
}

impl fmt::Display for Song {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let source = if self.is_stream() { "[http]" } else { "[file]" };
        write!(
            f,
            "{} {} - {}",
            source,
            self.artist.as_deref().unwrap_or("<empty>"),
            self.title.as_deref().unwrap_or("<empty>")
        )
    }
}

/// What the player is doing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlaybackState {
    Stopped,
    Playing,
    Paused,
}

impl FromStr for PlaybackState {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stop" => Ok(Self::Stopped),
            "play" => Ok(Self::Playing),
            "pause" => Ok(Self::Paused),
            other => Err(ParseError::UnknownState(other.to_string())),
        }
    }
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Stopped => "stopped",
            Self::Playing => "playing",
            Self::Paused => "paused",
        };
        f.write_str(name)
    }
}

/// Snapshot of the player status. Elapsed time is always present unless stopped.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackStatus {
    state: PlaybackState,
    elapsed: Option<f64>,
}

impl PlaybackStatus {
    pub fn stopped() -> Self {
        Self {
            state: PlaybackState::Stopped,
            elapsed: None,
        }
    }

    pub fn playing(elapsed_secs: f64) -> Self {
        Self {
            state: PlaybackState::Playing,
            elapsed: Some(elapsed_secs.max(0.0)),
        }
    }

    pub fn paused(elapsed_secs: f64) -> Self {
        Self {
            state: PlaybackState::Paused,
            elapsed: Some(elapsed_secs.max(0.0)),
        }
    }

    /// Build a status from a `status` response
    pub fn from_fields(fields: &Fields) -> Result<Self, ParseError> {
        let state: PlaybackState = fields
            .get("state")
            .ok_or(ParseError::MissingField("state"))?
            .parse()?;

        if state == PlaybackState::Stopped {
            return Ok(Self::stopped());
        }

        let elapsed = fields
            .get("elapsed")
            .ok_or(ParseError::MissingField("elapsed"))?;
        let elapsed = parse_seconds("elapsed", elapsed)?;

        Ok(Self {
            state,
            elapsed: Some(elapsed),
        })
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn elapsed_secs(&self) -> Option<f64> {
        self.elapsed
    }

    /// Elapsed position truncated to whole milliseconds
    pub fn elapsed_millis(&self) -> Option<i64> {
        self.elapsed.map(|secs| (secs * 1000.0) as i64)
    }
}

impl fmt::Display for PlaybackStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.elapsed {
            Some(elapsed) => write!(f, "{}({:.3})", self.state, elapsed),
            None => write!(f, "{}", self.state),
        }
    }
}
