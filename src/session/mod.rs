//! The emulator session controller.
//!
//! A [`Session`] owns one [`VmCore`], drives it one step at a time or from a recurring run
//! loop, publishes a fresh [`RenderContext`] after every step and relays host key events
//! into the core through an optional [`Keymap`].
//!
//! Every operation takes the session lock and runs to completion before any other
//! operation (including a scheduled tick) can observe the session, so steps never
//! overlap. Resetting always stops the run loop before the core is reinitialized.

use std::{
    any::Any,
    fmt,
    ops::ControlFlow,
    panic::{self, AssertUnwindSafe},
    sync::{Arc, Mutex, MutexGuard, PoisonError, Weak},
};

use log::{debug, error, trace, warn};
use thiserror::Error;
use tokio::sync::watch;

use crate::{
    input::Keymap,
    render::RenderContext,
    vm::{CoreError, Key, VmCore},
};

pub mod schedule;

pub use schedule::{Cadence, LoopHandle, Scheduler, Tick, TokioScheduler};

/// An error raised by a [`Session`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("failed to initialize program {program:?}: {source}")]
    Initialization { program: String, source: CoreError },
    #[error("session has not been reset with a program")]
    NotInitialized,
    #[error(transparent)]
    Core(CoreError),
    #[error("no tokio runtime available to schedule the run loop")]
    NoRuntime,
    #[error("run loop ended without stopping the session")]
    LoopLost,
}

impl From<CoreError> for SessionError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::NotInitialized => Self::NotInitialized,
            other => Self::Core(other),
        }
    }
}

/// Type alias for Result<T, [SessionError]>.
pub type SessionResult<T> = Result<T, SessionError>;

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Phase {
    /// No program loaded.
    #[default]
    Idle,
    /// A program is loaded and only advances when stepped by hand.
    Paused,
    /// A run loop is stepping the program.
    Running,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::Idle => "idle",
            Phase::Paused => "paused",
            Phase::Running => "running",
        })
    }
}

/// Everything a host needs to draw a session. Republished after every change.
#[derive(Debug, Clone, Default)]
pub struct SessionView {
    pub phase: Phase,
    /// The program identifier last loaded successfully.
    pub program: Option<String>,
    pub render: Option<Arc<RenderContext>>,
    /// Why the last run loop died, until the next reset, manual step or loop start.
    pub fault: Option<SessionError>,
}

impl SessionView {
    pub fn is_running(&self) -> bool {
        self.phase == Phase::Running
    }
}

/// Tunables for a [`Session`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionConfig {
    pub cadence: Cadence,
}

/// Assembles a [`Session`].
#[derive(Default)]
pub struct SessionBuilder {
    config: SessionConfig,
    keymap: Option<Keymap>,
    scheduler: Option<Arc<dyn Scheduler>>,
}

impl SessionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn cadence(mut self, cadence: Cadence) -> Self {
        self.config.cadence = cadence;
        self
    }

    /// Enables key handling. Without a keymap every key event is dropped.
    pub fn keymap(mut self, keymap: Keymap) -> Self {
        self.keymap = Some(keymap);
        self
    }

    /// Runs loops on `scheduler` instead of the current tokio runtime.
    pub fn scheduler(mut self, scheduler: impl Scheduler + 'static) -> Self {
        self.scheduler = Some(Arc::new(scheduler));
        self
    }

    /// Creates a new idle [`Session`] owning `core`.
    ///
    /// # Errors
    ///
    /// [`SessionError::NoRuntime`] if no scheduler was given and the caller is not inside a
    /// tokio runtime.
    pub fn build<C: VmCore + 'static>(self, core: C) -> SessionResult<Session<C>> {
        let scheduler: Arc<dyn Scheduler> = match self.scheduler {
            Some(scheduler) => scheduler,
            None => Arc::new(TokioScheduler::current().ok_or(SessionError::NoRuntime)?),
        };
        let (view, _) = watch::channel(SessionView::default());
        Ok(Session {
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner {
                    core,
                    program: None,
                    render: None,
                    ticker: None,
                    generation: 0,
                    fault: None,
                }),
                view,
                keymap: self.keymap,
                scheduler,
                config: self.config,
            }),
        })
    }
}

struct Inner<C> {
    core: C,
    program: Option<String>,
    render: Option<Arc<RenderContext>>,
    /// Present exactly while a run loop is active.
    ticker: Option<Box<dyn LoopHandle>>,
    /// Bumped whenever a run loop is stopped, so a tick from an older loop that was
    /// already waiting on the lock knows to bail out.
    generation: u64,
    fault: Option<SessionError>,
}

impl<C: VmCore> Inner<C> {
    fn phase(&self) -> Phase {
        match (&self.program, &self.ticker) {
            (_, Some(_)) => Phase::Running,
            (Some(_), None) => Phase::Paused,
            (None, None) => Phase::Idle,
        }
    }

    fn view(&self) -> SessionView {
        SessionView {
            phase: self.phase(),
            program: self.program.clone(),
            render: self.render.clone(),
            fault: self.fault.clone(),
        }
    }

    fn step(&mut self) -> SessionResult<Arc<RenderContext>> {
        if self.program.is_none() {
            return Err(SessionError::NotInitialized);
        }
        self.core.step()?;
        let render = Arc::new(self.core.snapshot());
        self.render = Some(render.clone());
        Ok(render)
    }

    /// Returns whether a loop was actually stopped.
    fn stop_ticking(&mut self) -> bool {
        let Some(mut ticker) = self.ticker.take() else {
            return false;
        };
        ticker.cancel();
        self.generation += 1;
        debug!("run loop stopped");
        true
    }

    /// Drops a ticker whose loop ended behind the session's back. Returns whether one was
    /// dropped.
    fn reap(&mut self) -> bool {
        if !self.ticker.as_ref().is_some_and(|ticker| ticker.is_finished()) {
            return false;
        }
        self.ticker = None;
        self.generation += 1;
        error!("run loop ended unexpectedly");
        self.fault.get_or_insert(SessionError::LoopLost);
        true
    }
}

impl<C> Drop for Inner<C> {
    fn drop(&mut self) {
        if let Some(mut ticker) = self.ticker.take() {
            ticker.cancel();
        }
    }
}

struct Shared<C> {
    inner: Mutex<Inner<C>>,
    view: watch::Sender<SessionView>,
    keymap: Option<Keymap>,
    scheduler: Arc<dyn Scheduler>,
    config: SessionConfig,
}

impl<C: VmCore> Shared<C> {
    fn lock(&self) -> MutexGuard<'_, Inner<C>> {
        // Every mutation completes before the guard drops, so a poisoned session is
        // still consistent.
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if inner.reap() {
            self.publish(&inner);
        }
        inner
    }

    fn publish(&self, inner: &Inner<C>) {
        self.view.send_replace(inner.view());
    }
}

/// A handle to an emulator session. Clones share the same session.
///
/// The scheduled run loop only holds a weak reference, so dropping the last handle ends
/// the session and cancels the loop.
pub struct Session<C> {
    shared: Arc<Shared<C>>,
}

impl<C> Clone for Session<C> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<C: VmCore + 'static> Session<C> {
    /// Creates a session with default settings, no keymap and the current tokio runtime.
    ///
    /// # Errors
    ///
    /// See [`SessionBuilder::build`].
    pub fn new(core: C) -> SessionResult<Self> {
        SessionBuilder::new().build(core)
    }

    /// Stops any run loop, loads `program` into the core and steps once.
    ///
    /// # Errors
    ///
    /// [`SessionError::Initialization`] if the core rejects `program`; the session is then
    /// [`Phase::Idle`] with no render context. Errors from the first step are passed on.
    pub fn reset(&self, program: &str) -> SessionResult<Arc<RenderContext>> {
        let mut inner = self.shared.lock();
        inner.stop_ticking();
        inner.program = None;
        inner.render = None;
        inner.fault = None;

        if let Err(source) = inner.core.initialize(program) {
            warn!("rejected program {:?}: {}", program, source);
            self.shared.publish(&inner);
            return Err(SessionError::Initialization {
                program: program.to_owned(),
                source,
            });
        }
        debug!("loaded program {:?}", program);
        inner.program = Some(program.to_owned());

        let result = inner.step();
        self.shared.publish(&inner);
        result
    }

    /// Advances the core one cycle and publishes the new render context.
    ///
    /// # Errors
    ///
    /// [`SessionError::NotInitialized`] before a successful [`reset`][Self::reset], or
    /// whatever the core reports.
    pub fn step(&self) -> SessionResult<Arc<RenderContext>> {
        let mut inner = self.shared.lock();
        let result = inner.step();
        if result.is_ok() {
            inner.fault = None;
        }
        self.shared.publish(&inner);
        result
    }

    /// Starts a run loop if none is active, otherwise stops it. Returns whether a loop is
    /// running afterwards.
    ///
    /// # Errors
    ///
    /// [`SessionError::NotInitialized`] when starting a loop before a successful
    /// [`reset`][Self::reset]. Stopping never fails.
    pub fn toggle_run(&self) -> SessionResult<bool> {
        let mut inner = self.shared.lock();
        if inner.stop_ticking() {
            self.shared.publish(&inner);
            return Ok(false);
        }
        if inner.program.is_none() {
            return Err(SessionError::NotInitialized);
        }

        let generation = inner.generation;
        let session = Arc::downgrade(&self.shared);
        let ticker = self.shared.scheduler.start(
            self.shared.config.cadence,
            Box::new(move || Self::tick(&session, generation)),
        );
        inner.ticker = Some(ticker);
        inner.fault = None;
        debug!("run loop started ({:?})", self.shared.config.cadence);
        self.shared.publish(&inner);
        Ok(true)
    }

    fn tick(session: &Weak<Shared<C>>, generation: u64) -> ControlFlow<()> {
        let Some(shared) = session.upgrade() else {
            return ControlFlow::Break(());
        };
        let mut inner = shared.lock();
        if inner.generation != generation {
            trace!("stale tick from loop {}", generation);
            return ControlFlow::Break(());
        }
        // a panicking core must not take the loop down without a trace
        let stepped = panic::catch_unwind(AssertUnwindSafe(|| inner.step()))
            .unwrap_or_else(|payload| Err(CoreError::Fault(panic_message(&*payload)).into()));
        match stepped {
            Ok(_) => {
                trace!("tick");
                shared.publish(&inner);
                ControlFlow::Continue(())
            }
            Err(err) => {
                error!("run loop stopped: {}", err);
                inner.stop_ticking();
                inner.fault = Some(err);
                shared.publish(&inner);
                ControlFlow::Break(())
            }
        }
    }

    /// Cancels the run loop, if any. Calling this with no loop active does nothing.
    pub fn stop_ticking(&self) {
        let mut inner = self.shared.lock();
        if inner.stop_ticking() {
            self.shared.publish(&inner);
        }
    }

    /// Presses the keypad key mapped to `raw`. Returns the key if it was forwarded.
    pub fn handle_key_down(&self, raw: &str) -> Option<Key> {
        let key = self.map_key(raw)?;
        self.shared.lock().core.key_down(key);
        Some(key)
    }

    /// Releases the keypad key mapped to `raw`. Returns the key if it was forwarded.
    pub fn handle_key_up(&self, raw: &str) -> Option<Key> {
        let key = self.map_key(raw)?;
        self.shared.lock().core.key_up(key);
        Some(key)
    }

    fn map_key(&self, raw: &str) -> Option<Key> {
        let key = self.shared.keymap.as_ref().and_then(|keymap| keymap.lookup(raw));
        match key {
            Some(key) => trace!("key {:?} -> {}", raw, key),
            None => trace!("dropping unmapped key {:?}", raw),
        }
        key
    }

    /// Stops the run loop. The session can still be reset afterwards.
    pub fn shutdown(&self) {
        self.stop_ticking();
    }

    pub fn last_render_context(&self) -> Option<Arc<RenderContext>> {
        self.shared.lock().render.clone()
    }

    pub fn is_running(&self) -> bool {
        self.shared.lock().ticker.is_some()
    }

    pub fn phase(&self) -> Phase {
        self.shared.lock().phase()
    }

    pub fn program(&self) -> Option<String> {
        self.shared.lock().program.clone()
    }

    /// Why the last run loop died, if it did.
    pub fn fault(&self) -> Option<SessionError> {
        self.shared.lock().fault.clone()
    }

    pub fn keymap(&self) -> Option<&Keymap> {
        self.shared.keymap.as_ref()
    }

    pub fn config(&self) -> SessionConfig {
        self.shared.config
    }

    /// The current [`SessionView`].
    pub fn view(&self) -> SessionView {
        self.shared.lock().view()
    }

    /// Subscribes to every future [`SessionView`].
    pub fn subscribe(&self) -> watch::Receiver<SessionView> {
        self.shared.view.subscribe()
    }

    /// Runs `f` against the core without stepping it.
    pub fn inspect_core<R>(&self, f: impl FnOnce(&C) -> R) -> R {
        f(&self.shared.lock().core)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        format!("core panicked: {}", msg)
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        format!("core panicked: {}", msg)
    } else {
        "core panicked".to_owned()
    }
}
