//! Follows MPD playback and scrobbles to Last.fm and ListenBrainz.
//!
//! Player observations go through an optional [`transform::SongTransformer`]
//! into the [`state::ScrobblingMachine`], which decides when a song is
//! announced as now playing and when it has earned a scrobble. Scrobbles are
//! handed to a [`delivery::DeliveryLog`] per service, which queues them on
//! disk whenever the service cannot be reached.

pub mod clock;
pub mod config;
pub mod daemon;
pub mod delivery;
pub mod error;
pub mod model;
pub mod player;
pub mod queue;
pub mod scrobbler;
pub mod state;
pub mod transform;
