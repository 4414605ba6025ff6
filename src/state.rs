// Playback state machine
// Turns player observations into now playing and scrobble decisions

use std::fmt;

use crate::clock::Clock;
use crate::error::MachineError;
use crate::model::{PlaybackState, PlaybackStatus, Song};

/// A play observed with at most this much elapsed time (ms) starts a new song
pub const NEW_SONG_THRESHOLD: i64 = 1_000;

/// Phase of the current session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Stopped,
    Playing,
    Paused,
}

/// Current phase and the instant (ms) it was entered. Replaced on every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionState {
    pub phase: Phase,
    pub since: i64,
}

impl SessionState {
    pub fn new(phase: Phase, since: i64) -> Self {
        Self { phase, since }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}@{}", self.phase, self.since)
    }
}

/// A song that qualified for a scrobble
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrobbleDecision {
    pub song: Song,
    /// When the song started, in whole seconds since the epoch
    pub start: i64,
}

/// Outcome of a single observation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Decisions {
    pub now_playing: Option<Song>,
    pub scrobble: Option<ScrobbleDecision>,
}

impl Decisions {
    pub fn is_empty(&self) -> bool {
        self.now_playing.is_none() && self.scrobble.is_none()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MachineOptions {
    /// Treat a different song locator on continuation or pause as a song change
    /// instead of trusting the elapsed-time heuristic
    pub compare_song_identity: bool,
}

/// Tracks the current play session and decides when to notify
pub struct ScrobblingMachine<C> {
    clock: C,
    options: MachineOptions,
    session: SessionState,
    song: Option<Song>,
    /// Listening time (ms) counted towards the scrobble threshold
    elapsed: i64,
    /// When the current song started (ms), reported as the scrobble time
    song_started_at: i64,
}

impl<C: Clock> ScrobblingMachine<C> {
    /// A machine in the stopped state with no song
    pub fn new(clock: C, options: MachineOptions) -> Self {
        let now = clock.now_millis();
        Self {
            clock,
            options,
            session: SessionState::new(Phase::Stopped, now),
            song: None,
            elapsed: 0,
            song_started_at: now,
        }
    }

    /// Create a machine seeded with the player's state at startup
    pub fn with_initial(
        clock: C,
        options: MachineOptions,
        status: &PlaybackStatus,
        song: Option<Song>,
    ) -> Result<(Self, Decisions), MachineError> {
        let mut machine = Self::new(clock, options);
        let decisions = machine.on_event(status, song)?;
        Ok((machine, decisions))
    }

    pub fn session(&self) -> SessionState {
        self.session
    }

    pub fn song(&self) -> Option<&Song> {
        self.song.as_ref()
    }

    pub fn accumulated_millis(&self) -> i64 {
        self.elapsed
    }

    pub fn song_started_at(&self) -> i64 {
        self.song_started_at
    }

    /// Handle one player observation.
    ///
    /// A playing or paused status without a song is a protocol violation and
    /// leaves the machine untouched.
    pub fn on_event(
        &mut self,
        status: &PlaybackStatus,
        song: Option<Song>,
    ) -> Result<Decisions, MachineError> {
        log::debug!(
            "Handling event {}, song: {}",
            status,
            song.as_ref().map(ToString::to_string).unwrap_or_default()
        );

        let now = self.clock.now_millis();
        let state = status.state();

        if state == PlaybackState::Stopped {
            return Ok(self.stop(now));
        }

        let song = song.ok_or(MachineError::MissingSong(state))?;
        let elapsed = status.elapsed_millis().unwrap_or(0);

        let decisions = match state {
            PlaybackState::Playing if song.is_stream() || elapsed <= NEW_SONG_THRESHOLD => {
                self.play(song, now)
            }
            PlaybackState::Playing => self.play_continue(song, elapsed, now),
            PlaybackState::Paused => self.pause(song, elapsed, now),
            PlaybackState::Stopped => Decisions::default(),
        };

        log::debug!(
            "Session {} accumulated {}ms",
            self.session,
            self.elapsed
        );
        Ok(decisions)
    }

    /// A song started from the beginning
    fn play(&mut self, song: Song, now: i64) -> Decisions {
        let scrobble = self.close(now);
        self.open(song, 0, now, Phase::Playing);

        Decisions {
            now_playing: self.now_playing_if_needed(),
            scrobble,
        }
    }

    /// Resume after pause, or a seek within the current song
    fn play_continue(&mut self, song: Song, elapsed: i64, now: i64) -> Decisions {
        if self.is_other_song(&song) {
            log::info!("Song changed mid-playback to {}", song);
            let scrobble = self.close(now);
            self.open(song, elapsed, now, Phase::Playing);
            return Decisions {
                now_playing: self.now_playing_if_needed(),
                scrobble,
            };
        }

        match self.session.phase {
            // attached in the middle of playback
            Phase::Stopped => {
                self.open(song, elapsed, now, Phase::Playing);
                Decisions {
                    now_playing: self.now_playing_if_needed(),
                    scrobble: None,
                }
            }
            Phase::Paused => {
                self.session = SessionState::new(Phase::Playing, now);
                // the previous notification may have timed out during the pause
                Decisions {
                    now_playing: self.now_playing_if_needed(),
                    scrobble: None,
                }
            }
            Phase::Playing => Decisions::default(),
        }
    }

    fn pause(&mut self, song: Song, elapsed: i64, now: i64) -> Decisions {
        if self.is_other_song(&song) {
            log::info!("Song changed while paused to {}", song);
            let scrobble = self.close(now);
            self.open(song, elapsed, now, Phase::Paused);
            return Decisions {
                now_playing: None,
                scrobble,
            };
        }

        match self.session.phase {
            Phase::Stopped => self.open(song, elapsed, now, Phase::Paused),
            Phase::Playing => {
                self.fold(now);
                self.session = SessionState::new(Phase::Paused, now);
            }
            Phase::Paused => self.session = SessionState::new(Phase::Paused, now),
        }

        Decisions::default()
    }

    fn stop(&mut self, now: i64) -> Decisions {
        let scrobble = self.close(now);
        self.elapsed = 0;
        self.session = SessionState::new(Phase::Stopped, now);

        Decisions {
            now_playing: None,
            scrobble,
        }
    }

    /// Start tracking a song that has already been listened to for `elapsed` ms
    fn open(&mut self, song: Song, elapsed: i64, now: i64, phase: Phase) {
        log::info!("Tracking {} from {}ms", song, elapsed);
        self.song = Some(song);
        self.elapsed = elapsed.max(0);
        self.song_started_at = now - self.elapsed;
        self.session = SessionState::new(phase, now);
    }

    /// End the open session, if any, and decide whether it earned a scrobble
    fn close(&mut self, now: i64) -> Option<ScrobbleDecision> {
        if self.session.phase == Phase::Playing {
            self.fold(now);
        }
        let scrobble = self.scrobble_if_needed();
        self.song = None;
        scrobble
    }

    fn fold(&mut self, now: i64) {
        self.elapsed += (now - self.session.since).max(0);
    }

    fn is_other_song(&self, song: &Song) -> bool {
        self.options.compare_song_identity
            && self.song.as_ref().is_some_and(|open| open.file != song.file)
    }

    fn scrobble_if_needed(&self) -> Option<ScrobbleDecision> {
        let song = self.song.as_ref()?;
        log::debug!("Asked to scrobble {}", song);

        if song.is_eligible() && self.elapsed > song.scrobble_threshold() {
            log::info!(
                "Scrobbling {} (listened {}ms, threshold {}ms)",
                song,
                self.elapsed,
                song.scrobble_threshold()
            );
            Some(ScrobbleDecision {
                song: song.clone(),
                start: self.song_started_at / 1000,
            })
        } else {
            None
        }
    }

    fn now_playing_if_needed(&self) -> Option<Song> {
        let song = self.song.as_ref()?;
        log::debug!("Asked to announce {}", song);
        song.is_eligible().then(|| song.clone())
    }
}
