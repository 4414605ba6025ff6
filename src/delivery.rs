// Scrobble delivery log
// Delivers decisions right away and falls back to the durable queue

use crate::clock::Clock;
use crate::error::{DeliveryError, QueueError, TransportError};
use crate::model::Song;
use crate::queue::{ScrobbleQueue, ScrobbleRecord};
use crate::scrobbler::Transport;

/// What happened to a scrobble handed to the log
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Delivered,
    Queued,
}

/// Result of replaying the queue
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub delivered: usize,
    pub remaining: usize,
    pub rejected: usize,
}

pub struct DeliveryLog<T, C> {
    transport: T,
    queue: ScrobbleQueue,
    clock: C,
}

impl<T: Transport, C: Clock> DeliveryLog<T, C> {
    pub fn new(transport: T, queue: ScrobbleQueue, clock: C) -> Self {
        Self {
            transport,
            queue,
            clock,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn queue(&self) -> &ScrobbleQueue {
        &self.queue
    }

    /// Best effort: transient failures are logged and forgotten
    pub fn record_now_playing(&self, song: &Song) -> Result<(), DeliveryError> {
        match self.transport.now_playing(song) {
            Ok(()) => Ok(()),
            Err(e) if e.is_transient() => {
                log::warn!("{}: now playing not sent: {}", self.transport.id(), e);
                Ok(())
            }
            Err(e) => Err(DeliveryError::Transport(e)),
        }
    }

    /// Deliver a scrobble, or queue it when the service is unreachable.
    ///
    /// After a successful delivery the queue is flushed. A failed flush is
    /// logged and does not change the outcome of this scrobble.
    pub fn record_scrobble(&self, song: &Song, start: i64) -> Result<Delivery, DeliveryError> {
        match self.transport.scrobble(song, start) {
            Ok(()) => {
                if let Err(e) = self.flush() {
                    log::error!("{}: queue flush failed: {}", self.transport.id(), e);
                }
                Ok(Delivery::Delivered)
            }
            Err(e) if e.is_transient() => {
                log::warn!("{}: scrobble queued: {}", self.transport.id(), e);
                let record = ScrobbleRecord {
                    song: song.clone(),
                    start,
                    queued_at: Some(self.clock.now_secs()),
                };
                self.queue.append(&record).map_err(|e| {
                    log::error!(
                        "{}: failed to queue scrobble of {}: {}",
                        self.transport.id(),
                        song,
                        e
                    );
                    DeliveryError::Persistence(e)
                })?;
                Ok(Delivery::Queued)
            }
            Err(e) => Err(DeliveryError::Transport(e)),
        }
    }

    /// Replay queued records in order, stopping at the first failure.
    ///
    /// Delivered records are removed from the queue, everything from the
    /// first failure onwards stays in original order.
    pub fn flush(&self) -> Result<FlushReport, DeliveryError> {
        let contents = self.queue.load()?;
        let mut rejected = contents.invalid;

        if contents.records.is_empty() && rejected.is_empty() {
            return Ok(FlushReport::default());
        }

        let total = contents.records.len();
        let mut remaining = Vec::new();
        let mut delivered = 0;
        let mut fatal: Option<TransportError> = None;

        let mut records = contents.records.into_iter();
        for record in records.by_ref() {
            if !record.song.is_eligible() {
                log::error!(
                    "{}: queued song is not scrobblable: {}",
                    self.transport.id(),
                    record.song
                );
                rejected.push(serde_json::to_string(&record).map_err(QueueError::from)?);
                continue;
            }

            match self.transport.scrobble(&record.song, record.start) {
                Ok(()) => {
                    delivered += 1;
                    if let Some(queued_at) = record.queued_at {
                        log::info!(
                            "{}: delivered queued scrobble of {} after {}s",
                            self.transport.id(),
                            record.song,
                            self.clock.now_secs() - queued_at
                        );
                    }
                }
                Err(e) => {
                    if e.is_transient() {
                        log::warn!("{}: queue replay stopped: {}", self.transport.id(), e);
                    } else {
                        fatal = Some(e);
                    }
                    remaining.push(record);
                    break;
                }
            }
        }
        remaining.extend(records);

        let report = FlushReport {
            delivered,
            remaining: remaining.len(),
            rejected: rejected.len(),
        };

        if delivered > 0 || !rejected.is_empty() {
            self.queue.reject(&rejected).map_err(|e| {
                log::error!("{}: failed to set aside rejected records: {}", self.transport.id(), e);
                e
            })?;
            self.queue.replace(&remaining).map_err(|e| {
                log::error!("{}: failed to rewrite queue: {}", self.transport.id(), e);
                e
            })?;
        }

        if delivered > 0 {
            log::info!(
                "{}: delivered {}/{} queued scrobble(s)",
                self.transport.id(),
                delivered,
                total
            );
        }

        match fatal {
            Some(e) => Err(DeliveryError::Transport(e)),
            None => Ok(report),
        }
    }
}
