// Scripted transport for tests

use std::cell::RefCell;
use std::collections::VecDeque;

use super::traits::Transport;
use crate::error::TransportError;
use crate::model::Song;

/// Pops one scripted outcome per call and succeeds once the script runs out
#[derive(Default)]
pub struct FakeTransport {
    pub outcomes: RefCell<VecDeque<Result<(), TransportError>>>,
    pub scrobbled: RefCell<Vec<(String, i64)>>,
    pub announced: RefCell<Vec<String>>,
}

impl FakeTransport {
    pub fn script(&self, outcomes: impl IntoIterator<Item = Result<(), TransportError>>) {
        self.outcomes.borrow_mut().extend(outcomes);
    }

    pub fn scrobbled_titles(&self) -> Vec<String> {
        self.scrobbled.borrow().iter().map(|(t, _)| t.clone()).collect()
    }

    fn next(&self) -> Result<(), TransportError> {
        self.outcomes.borrow_mut().pop_front().unwrap_or(Ok(()))
    }
}

impl Transport for FakeTransport {
    fn id(&self) -> &str {
        "fake"
    }

    fn now_playing(&self, song: &Song) -> Result<(), TransportError> {
        self.next()?;
        self.announced
            .borrow_mut()
            .push(song.title.clone().unwrap_or_default());
        Ok(())
    }

    fn scrobble(&self, song: &Song, start: i64) -> Result<(), TransportError> {
        self.next()?;
        self.scrobbled
            .borrow_mut()
            .push((song.title.clone().unwrap_or_default(), start));
        Ok(())
    }
}
