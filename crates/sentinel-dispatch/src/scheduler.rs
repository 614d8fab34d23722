//! Cancellable periodic timers bound to a session
//!
//! At most one timer runs per [`TimerClass`]. Starting a class aborts the
//! previous task and bumps the generation, so a tick that was already queued
//! by the old task is recognisably stale.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::debug;

use crate::session::SessionId;

/// Kind of periodic work
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerClass {
    /// Civilian navigation: poll the live position
    PositionTracking,
    /// Ambulance replay along the route
    MovementSimulation,
}

/// One timer firing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick {
    pub session: SessionId,
    pub class: TimerClass,
    pub generation: u64,
}

struct Timer {
    session: SessionId,
    generation: u64,
    task: JoinHandle<()>,
}

/// Owns the running timers and hands out ticks on a channel
pub struct TickScheduler {
    tick_tx: mpsc::Sender<Tick>,
    timers: HashMap<TimerClass, Timer>,
    generation: u64,
}

impl TickScheduler {
    pub fn new(tick_tx: mpsc::Sender<Tick>) -> Self {
        Self {
            tick_tx,
            timers: HashMap::new(),
            generation: 0,
        }
    }

    /// Start (or restart) `class`; the first tick fires after `delay + period`
    pub fn start(
        &mut self,
        session: SessionId,
        class: TimerClass,
        period: Duration,
        delay: Duration,
    ) -> u64 {
        self.cancel(class);
        self.generation += 1;
        let generation = self.generation;

        let tick_tx = self.tick_tx.clone();
        let task = tokio::spawn(async move {
            let mut interval = time::interval_at(Instant::now() + delay + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                let tick = Tick {
                    session,
                    class,
                    generation,
                };
                if tick_tx.send(tick).await.is_err() {
                    break;
                }
            }
        });

        debug!("Started {:?} timer (generation {})", class, generation);
        self.timers.insert(
            class,
            Timer {
                session,
                generation,
                task,
            },
        );
        generation
    }

    /// Stop `class`; returns whether a timer was running
    pub fn cancel(&mut self, class: TimerClass) -> bool {
        match self.timers.remove(&class) {
            Some(timer) => {
                timer.task.abort();
                debug!("Cancelled {:?} timer (generation {})", class, timer.generation);
                true
            }
            None => false,
        }
    }

    pub fn cancel_all(&mut self) {
        for (_, timer) in self.timers.drain() {
            timer.task.abort();
        }
    }

    pub fn is_active(&self, class: TimerClass) -> bool {
        self.timers.contains_key(&class)
    }

    /// Tick came from the live timer of its class and session
    pub fn is_current(&self, tick: &Tick) -> bool {
        self.timers
            .get(&tick.class)
            .map(|t| t.generation == tick.generation && t.session == tick.session)
            .unwrap_or(false)
    }
}

impl Drop for TickScheduler {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
