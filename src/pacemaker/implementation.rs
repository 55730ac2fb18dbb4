/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Timeout bookkeeping for the round state machine.
//!
//! Main type: [`Pacemaker`].

use std::{
    collections::BTreeMap,
    time::{Duration, Instant},
};

use crate::{tendermint::types::Step, types::data_types::Round};

/// Keeps track of the deadlines of the steps of the current round.
///
/// # Usage
///
/// The round state machine [`schedule`](Self::schedule)s a timeout whenever it enters a step, and
/// [`clear`](Self::clear)s all timeouts whenever it enters a new round or height. The thread that
/// drives the state machine calls [`tick`](Self::tick) as often as is practical to collect the
/// timeouts that have expired, and uses [`next_deadline`](Self::next_deadline) to bound how long it
/// blocks waiting for messages.
pub(crate) struct Pacemaker {
    config: PacemakerConfiguration,
    timeouts: BTreeMap<(Round, Step), Instant>,
}

impl Pacemaker {
    pub(crate) fn new(config: PacemakerConfiguration) -> Self {
        Self {
            config,
            timeouts: BTreeMap::new(),
        }
    }

    /// Get how long `step` of `round` may last before it times out.
    pub(crate) fn timeout_duration(&self, round: Round, step: Step) -> Duration {
        let base = match step {
            Step::Propose => self.config.propose_timeout,
            Step::Prevote => self.config.prevote_timeout,
            Step::Precommit | Step::Commit => self.config.precommit_timeout,
        };
        let backoff_factor = round.int().clamp(0, u32::MAX as i64) as u32;
        base.saturating_add(self.config.timeout_delta.saturating_mul(backoff_factor))
    }

    /// Schedule the timeout of `step` in `round`, starting now.
    ///
    /// A timeout that is already scheduled keeps its original deadline.
    pub(crate) fn schedule(&mut self, round: Round, step: Step) {
        let deadline = Instant::now() + self.timeout_duration(round, step);
        self.timeouts.entry((round, step)).or_insert(deadline);
    }

    /// Cancel every scheduled timeout.
    pub(crate) fn clear(&mut self) {
        self.timeouts.clear()
    }

    /// Remove and return every timeout whose deadline has passed, ordered by round, then by step.
    pub(crate) fn tick(&mut self) -> Vec<(Round, Step)> {
        let now = Instant::now();
        let expired: Vec<(Round, Step)> = self
            .timeouts
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(key, _)| *key)
            .collect();
        for key in &expired {
            self.timeouts.remove(key);
        }
        expired
    }

    /// Get the earliest deadline among the scheduled timeouts.
    pub(crate) fn next_deadline(&self) -> Option<Instant> {
        self.timeouts.values().min().copied()
    }
}

/// Configuration variables for the [`Pacemaker`] struct.
#[derive(Clone)]
pub(crate) struct PacemakerConfiguration {
    /// Timeout of the propose step in round 0.
    pub(crate) propose_timeout: Duration,

    /// Timeout of the prevote step in round 0.
    pub(crate) prevote_timeout: Duration,

    /// Timeout of the precommit step in round 0.
    pub(crate) precommit_timeout: Duration,

    /// How much longer every step's timeout gets with every round.
    pub(crate) timeout_delta: Duration,
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    fn config() -> PacemakerConfiguration {
        PacemakerConfiguration {
            propose_timeout: Duration::from_millis(30),
            prevote_timeout: Duration::from_millis(10),
            precommit_timeout: Duration::from_millis(20),
            timeout_delta: Duration::from_millis(5),
        }
    }

    #[test]
    fn linear_backoff_test() {
        let pacemaker = Pacemaker::new(config());
        assert_eq!(
            pacemaker.timeout_duration(Round::init(), Step::Propose),
            Duration::from_millis(30)
        );
        assert_eq!(
            pacemaker.timeout_duration(Round::new(1), Step::Prevote),
            Duration::from_millis(15)
        );
        assert_eq!(
            pacemaker.timeout_duration(Round::new(4), Step::Precommit),
            Duration::from_millis(40)
        );
        assert!(
            pacemaker.timeout_duration(Round::new(3), Step::Propose)
                > pacemaker.timeout_duration(Round::new(2), Step::Propose)
        );
    }

    #[test]
    fn expiry_and_cancellation_test() {
        let mut pacemaker = Pacemaker::new(config());
        assert!(pacemaker.next_deadline().is_none());

        pacemaker.schedule(Round::init(), Step::Prevote);
        pacemaker.schedule(Round::init(), Step::Propose);
        let first_deadline = pacemaker.next_deadline().unwrap();

        // Rescheduling does not push the deadline back.
        pacemaker.schedule(Round::init(), Step::Prevote);
        assert_eq!(pacemaker.next_deadline(), Some(first_deadline));

        assert!(pacemaker.tick().is_empty());
        thread::sleep(Duration::from_millis(15));
        assert_eq!(pacemaker.tick(), vec![(Round::init(), Step::Prevote)]);
        assert!(pacemaker.tick().is_empty());

        pacemaker.clear();
        assert!(pacemaker.next_deadline().is_none());
        thread::sleep(Duration::from_millis(30));
        assert!(pacemaker.tick().is_empty());
    }
}
