// Glue between player observations, the scrobbling machine and the services

use crate::clock::Clock;
use crate::delivery::{Delivery, DeliveryLog};
use crate::error::MachineError;
use crate::model::{PlaybackStatus, Song};
use crate::player::Observation;
use crate::scrobbler::Transport;
use crate::state::{Decisions, ScrobblingMachine};
use crate::transform::SongTransformer;

/// Feeds observations to the machine and fans its decisions out to every service
pub struct Daemon<T, C, X> {
    machine: ScrobblingMachine<C>,
    transformer: X,
    logs: Vec<DeliveryLog<T, C>>,
}

impl<T, C, X> Daemon<T, C, X>
where
    T: Transport,
    C: Clock,
    X: SongTransformer,
{
    pub fn new(machine: ScrobblingMachine<C>, transformer: X, logs: Vec<DeliveryLog<T, C>>) -> Self {
        Self {
            machine,
            transformer,
            logs,
        }
    }

    pub fn machine(&self) -> &ScrobblingMachine<C> {
        &self.machine
    }

    pub fn logs(&self) -> &[DeliveryLog<T, C>] {
        &self.logs
    }

    pub fn observe(&mut self, observation: Observation) -> Result<Decisions, MachineError> {
        self.handle(&observation.status, observation.song)
    }

    /// Transform the song, run the machine and deliver what it decided
    pub fn handle(
        &mut self,
        status: &PlaybackStatus,
        song: Option<Song>,
    ) -> Result<Decisions, MachineError> {
        let song = song.map(|s| self.transformer.transform(s));
        let decisions = self.machine.on_event(status, song)?;
        self.dispatch(&decisions);
        Ok(decisions)
    }

    /// Deliver decisions to every service. Failures stay with the service they
    /// happened in.
    pub fn dispatch(&self, decisions: &Decisions) {
        if let Some(scrobble) = &decisions.scrobble {
            for log in &self.logs {
                match log.record_scrobble(&scrobble.song, scrobble.start) {
                    Ok(Delivery::Delivered) => {}
                    Ok(Delivery::Queued) => log::info!(
                        "{}: queued scrobble of {} for later",
                        log.transport().id(),
                        scrobble.song
                    ),
                    Err(e) => log::error!(
                        "{}: scrobble of {} failed: {}",
                        log.transport().id(),
                        scrobble.song,
                        e
                    ),
                }
            }
        }

        if let Some(song) = &decisions.now_playing {
            log::info!("Now playing: {}", song);
            for log in &self.logs {
                if let Err(e) = log.record_now_playing(song) {
                    log::error!("{}: now playing failed: {}", log.transport().id(), e);
                }
            }
        }
    }

    /// Replay every service's queue once
    pub fn flush_all(&self) {
        flush_all(&self.logs);
    }
}

/// Replay the queue of each log, logging the outcome
pub fn flush_all<T: Transport, C: Clock>(logs: &[DeliveryLog<T, C>]) {
    for log in logs {
        match log.flush() {
            Ok(report) if report.remaining > 0 => log::warn!(
                "{}: {} scrobble(s) still queued in {:?}",
                log.transport().id(),
                report.remaining,
                log.queue().path()
            ),
            Ok(_) => {}
            Err(e) => log::error!("{}: queue flush failed: {}", log.transport().id(), e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::error::TransportError;
    use crate::queue::ScrobbleQueue;
    use crate::scrobbler::fake::FakeTransport;
    use crate::state::MachineOptions;
    use crate::transform::TagGuesser;

    fn daemon(
        dir: &tempfile::TempDir,
        clock: &ManualClock,
    ) -> Daemon<FakeTransport, ManualClock, TagGuesser> {
        let logs = ["a", "b"]
            .iter()
            .map(|name| {
                DeliveryLog::new(
                    FakeTransport::default(),
                    ScrobbleQueue::new(dir.path().join(format!("queue-{name}.jsonl"))),
                    clock.clone(),
                )
            })
            .collect();
        Daemon::new(
            ScrobblingMachine::new(clock.clone(), MachineOptions::default()),
            TagGuesser::from_patterns(&["(?P<artist>.+) - (?P<title>.+)"]),
            logs,
        )
    }

    #[test]
    fn guessed_song_is_announced_and_scrobbled_everywhere() {
        let dir = tempfile::tempdir().expect("tempdir");
        let clock = ManualClock::at(0);
        let mut d = daemon(&dir, &clock);
        let song = Song::new("Bill Doggett - Honky Tonk.mp3").with_length_secs(180);

        let decisions = d
            .handle(&PlaybackStatus::playing(0.0), Some(song.clone()))
            .expect("play");
        assert!(decisions.now_playing.is_some());

        // one service is down when the song ends
        d.logs()[1]
            .transport()
            .script([Err(TransportError::Network("down".to_string()))]);

        clock.set(100_000);
        let decisions = d
            .handle(&PlaybackStatus::stopped(), None)
            .expect("stop");
        let scrobble = decisions.scrobble.expect("scrobble");
        assert_eq!(scrobble.song.artist.as_deref(), Some("Bill Doggett"));

        for log in d.logs() {
            assert_eq!(*log.transport().announced.borrow(), ["Honky Tonk"]);
        }
        assert_eq!(d.logs()[0].transport().scrobbled_titles(), ["Honky Tonk"]);
        assert!(d.logs()[1].transport().scrobbled_titles().is_empty());
        assert_eq!(d.logs()[1].queue().len().expect("len"), 1);

        d.flush_all();
        assert_eq!(d.logs()[1].transport().scrobbled_titles(), ["Honky Tonk"]);
        assert!(d.logs()[1].queue().is_empty().expect("empty"));
    }

    #[test]
    fn protocol_violation_is_reported() {
        let dir = tempfile::tempdir().expect("tempdir");
        let clock = ManualClock::at(0);
        let mut d = daemon(&dir, &clock);

        let err = d.handle(&PlaybackStatus::playing(3.0), None).unwrap_err();
        assert!(matches!(err, MachineError::MissingSong(_)));
        assert!(d.machine().song().is_none());
    }
}
