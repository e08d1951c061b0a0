//! Distribution of shared action arrivals over a stage's live scenarios.
//!
//! A distributed action has one set of arrival timers for the whole stage.
//! The roster tracks the action channels of every scenario the stage has
//! handed out; each arrival is dispatched to exactly one of them, picked by
//! the configured strategy. A scenario whose consumer dropped its action
//! stream is treated as gone and falls out of the roster on the next pick.

use std::collections::VecDeque;
use std::sync::Mutex;

use rand::Rng;
use tokio::sync::mpsc;

use super::ActionInvocation;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Strategy {
    RoundRobin,
    Random,
}

pub(crate) struct ActionRoster {
    strategy: Strategy,
    receivers: Mutex<VecDeque<mpsc::UnboundedSender<ActionInvocation>>>,
}

impl ActionRoster {
    pub(crate) fn new(strategy: Strategy) -> Self {
        Self {
            strategy,
            receivers: Mutex::new(VecDeque::new()),
        }
    }

    pub(crate) fn add(&self, receiver: mpsc::UnboundedSender<ActionInvocation>) {
        self.receivers
            .lock()
            .expect("action roster lock poisoned")
            .push_back(receiver);
    }

    /// Delivers one arrival to a single live scenario. Closed channels found
    /// along the way are discarded; with nobody left the arrival is dropped.
    pub(crate) fn dispatch(&self, invocation: ActionInvocation) {
        let mut receivers = self
            .receivers
            .lock()
            .expect("action roster lock poisoned");
        while !receivers.is_empty() {
            match self.strategy {
                Strategy::RoundRobin => {
                    let receiver = receivers.pop_front().expect("roster checked non-empty");
                    if receiver.send(invocation.clone()).is_ok() {
                        receivers.push_back(receiver);
                        return;
                    }
                }
                Strategy::Random => {
                    let idx = rand::rng().random_range(0..receivers.len());
                    if receivers[idx].send(invocation.clone()).is_ok() {
                        return;
                    }
                    let _ = receivers.remove(idx);
                }
            }
        }
        tracing::debug!(action = %invocation.action, "no live scenario for action arrival");
    }
}
