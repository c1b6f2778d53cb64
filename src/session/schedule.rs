//! Cancellable recurring tasks that drive a session's run loop.
//!
//! A [`Session`][super::Session] only knows about [`Scheduler`] and [`LoopHandle`], so it
//! can be driven by the bundled [`TokioScheduler`] or by anything else that can call a
//! closure repeatedly and stop on request.

use std::{ops::ControlFlow, time::Duration};

use tokio::{
    runtime::Handle,
    task::JoinHandle,
    time::{interval, MissedTickBehavior},
};

/// How often a run loop ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Cadence {
    /// Tick again as soon as the scheduler gets back to the loop.
    #[default]
    BestEffort,
    /// Tick once per period. Ticks missed because a step ran long are skipped, not
    /// replayed in a burst. A zero period runs as [`Cadence::BestEffort`].
    FixedRate(Duration),
}

impl Cadence {
    /// A fixed rate of `hz` ticks per second. Zero, negative, non-finite and
    /// unrepresentable rates fall back to [`Cadence::BestEffort`].
    pub fn from_hz(hz: f64) -> Self {
        if !hz.is_finite() || hz <= 0.0 {
            return Self::BestEffort;
        }
        match Duration::try_from_secs_f64(hz.recip()) {
            Ok(period) if !period.is_zero() => Self::FixedRate(period),
            _ => Self::BestEffort,
        }
    }
}

/// One invocation of a run loop. Returning [`ControlFlow::Break`] ends the loop.
pub type Tick = Box<dyn FnMut() -> ControlFlow<()> + Send + 'static>;

/// A handle to an active run loop.
pub trait LoopHandle: Send {
    /// Stops the loop. No tick starts after this returns.
    fn cancel(&mut self);

    /// Whether the loop has stopped, either by cancellation or by breaking.
    fn is_finished(&self) -> bool;
}

/// Starts run loops.
pub trait Scheduler: Send + Sync {
    fn start(&self, cadence: Cadence, tick: Tick) -> Box<dyn LoopHandle>;
}

/// A [`Scheduler`] that spawns each loop as a task on a tokio runtime.
#[derive(Debug, Clone)]
pub struct TokioScheduler {
    handle: Handle,
}

impl TokioScheduler {
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Schedules onto the runtime the caller is running in, if any.
    pub fn current() -> Option<Self> {
        Handle::try_current().ok().map(Self::new)
    }
}

impl Scheduler for TokioScheduler {
    fn start(&self, cadence: Cadence, tick: Tick) -> Box<dyn LoopHandle> {
        let task = self.handle.spawn(drive(cadence, tick));
        Box::new(TokioLoop { task })
    }
}

async fn drive(cadence: Cadence, mut tick: Tick) {
    match cadence {
        // `interval` rejects a zero period
        Cadence::FixedRate(period) if !period.is_zero() => {
            let mut clock = interval(period);
            clock.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                clock.tick().await;
                if tick().is_break() {
                    break;
                }
            }
        }
        _ => loop {
            if tick().is_break() {
                break;
            }
            tokio::task::yield_now().await;
        },
    }
}

/// A run loop spawned by [`TokioScheduler`]. Dropping it cancels the loop.
#[derive(Debug)]
pub struct TokioLoop {
    task: JoinHandle<()>,
}

impl LoopHandle for TokioLoop {
    fn cancel(&mut self) {
        self.task.abort();
    }

    fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for TokioLoop {
    fn drop(&mut self) {
        self.task.abort();
    }
}
