//! Debounce state machine of the watch loop, kept free of threads and
//! clocks so every transition can be driven by hand.

use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use camino::Utf8PathBuf;

/// Tasks to run together with the source files that triggered them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Batch {
    pub tasks: BTreeSet<String>,
    pub changed: BTreeSet<Utf8PathBuf>,
}

impl Batch {
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    fn merge(&mut self, other: Batch) {
        self.tasks.extend(other.tasks);
        self.changed.extend(other.changed);
    }
}

#[derive(Debug)]
enum State {
    Idle,
    Debouncing { pending: Batch, deadline: Instant },
    /// Changes seen while a run is in flight wait in `queued`.
    Running { queued: Batch },
}

#[derive(Debug)]
pub struct Debouncer {
    window: Duration,
    state: State,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            state: State::Idle,
        }
    }

    /// Records a batch of matched changes. Empty batches are ignored.
    pub fn event(&mut self, batch: Batch, now: Instant) {
        if batch.is_empty() {
            return;
        }

        match &mut self.state {
            State::Idle => {}
            State::Debouncing { pending, deadline } => {
                pending.merge(batch);
                *deadline = now + self.window;
                return;
            }
            State::Running { queued } => {
                queued.merge(batch);
                return;
            }
        }

        self.state = State::Debouncing {
            pending: batch,
            deadline: now + self.window,
        };
    }

    /// When the loop has to wake up next, if at all.
    pub fn deadline(&self) -> Option<Instant> {
        match &self.state {
            State::Debouncing { deadline, .. } => Some(*deadline),
            _ => None,
        }
    }

    /// Hands out the pending batch once the window has elapsed. The caller
    /// must start a run for it and report back with [`Debouncer::finished`].
    pub fn poll(&mut self, now: Instant) -> Option<Batch> {
        match &self.state {
            State::Debouncing { deadline, .. } if now >= *deadline => {}
            _ => return None,
        }

        let state = std::mem::replace(
            &mut self.state,
            State::Running {
                queued: Batch::default(),
            },
        );

        match state {
            State::Debouncing { pending, .. } => Some(pending),
            _ => None,
        }
    }

    /// The in-flight run completed. Changes queued in the meantime start a
    /// fresh window.
    pub fn finished(&mut self, now: Instant) {
        let state = std::mem::replace(&mut self.state, State::Idle);

        if let State::Running { queued } = state
            && !queued.is_empty()
        {
            self.state = State::Debouncing {
                pending: queued,
                deadline: now + self.window,
            };
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.state, State::Idle)
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state, State::Running { .. })
    }
}
