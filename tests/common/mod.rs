#![allow(dead_code)]

use std::{
    mem,
    ops::ControlFlow,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex,
    },
};

use chip8_session::{
    render::RenderContext,
    session::{Cadence, LoopHandle, Scheduler, Tick},
    vm::{demo::DemoCore, CoreError, Key, VmCore},
};

/// Wraps [`DemoCore`], counting every step and optionally failing or panicking after a
/// number of them.
pub struct CountingCore {
    pub inner: DemoCore,
    pub steps: Arc<AtomicUsize>,
    pub fail_after: Option<usize>,
    pub panic_after: Option<usize>,
}

impl CountingCore {
    pub fn new() -> (Self, Arc<AtomicUsize>) {
        let steps = Arc::new(AtomicUsize::new(0));
        let core = Self {
            inner: DemoCore::new(),
            steps: steps.clone(),
            fail_after: None,
            panic_after: None,
        };
        (core, steps)
    }

    pub fn failing_after(limit: usize) -> (Self, Arc<AtomicUsize>) {
        let (mut core, steps) = Self::new();
        core.fail_after = Some(limit);
        (core, steps)
    }

    pub fn panicking_after(limit: usize) -> (Self, Arc<AtomicUsize>) {
        let (mut core, steps) = Self::new();
        core.panic_after = Some(limit);
        (core, steps)
    }
}

impl VmCore for CountingCore {
    fn initialize(&mut self, program: &str) -> Result<(), CoreError> {
        self.inner.initialize(program)
    }

    fn step(&mut self) -> Result<(), CoreError> {
        self.inner.step()?;
        let done = self.steps.fetch_add(1, Ordering::SeqCst) + 1;
        if self.panic_after.is_some_and(|limit| done > limit) {
            panic!("opcode table exploded at step {done}");
        }
        match self.fail_after {
            Some(limit) if done > limit => Err(CoreError::Fault(format!("died at step {done}"))),
            _ => Ok(()),
        }
    }

    fn snapshot(&self) -> RenderContext {
        self.inner.snapshot()
    }

    fn key_down(&mut self, key: Key) {
        self.inner.key_down(key)
    }

    fn key_up(&mut self, key: Key) {
        self.inner.key_up(key)
    }
}

struct Slot {
    tick: Tick,
    cancelled: Arc<AtomicBool>,
    done: Arc<AtomicBool>,
}

/// A [`Scheduler`] that only ticks when told to.
#[derive(Clone, Default)]
pub struct ManualScheduler {
    slots: Arc<Mutex<Vec<Slot>>>,
    started: Arc<AtomicUsize>,
}

struct ManualHandle {
    cancelled: Arc<AtomicBool>,
    done: Arc<AtomicBool>,
}

impl LoopHandle for ManualHandle {
    fn cancel(&mut self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    fn is_finished(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst) || self.done.load(Ordering::SeqCst)
    }
}

impl Scheduler for ManualScheduler {
    fn start(&self, _cadence: Cadence, tick: Tick) -> Box<dyn LoopHandle> {
        let cancelled = Arc::new(AtomicBool::new(false));
        let done = Arc::new(AtomicBool::new(false));
        self.slots.lock().unwrap().push(Slot {
            tick,
            cancelled: cancelled.clone(),
            done: done.clone(),
        });
        self.started.fetch_add(1, Ordering::SeqCst);
        Box::new(ManualHandle { cancelled, done })
    }
}

impl ManualScheduler {
    /// Ticks every live loop once. Returns how many ticks ran.
    pub fn fire(&self) -> usize {
        self.run(|slot| !slot.cancelled.load(Ordering::SeqCst))
    }

    /// Ticks every loop that was cancelled but has not yet returned `Break`, the way a
    /// tick already waiting on the session lock runs after a stop. Returns how many ran.
    pub fn fire_stale(&self) -> usize {
        self.run(|slot| slot.cancelled.load(Ordering::SeqCst))
    }

    /// Ends every live loop without telling the session, as if its task had died.
    pub fn abandon(&self) {
        for slot in self.slots.lock().unwrap().iter() {
            if !slot.cancelled.load(Ordering::SeqCst) {
                slot.done.store(true, Ordering::SeqCst);
            }
        }
    }

    fn run(&self, pick: impl Fn(&Slot) -> bool) -> usize {
        // run the ticks without holding our own lock, a tick may start or stop loops
        let mut slots = mem::take(&mut *self.slots.lock().unwrap());
        let mut fired = 0;
        for slot in &mut slots {
            if slot.done.load(Ordering::SeqCst) || !pick(slot) {
                continue;
            }
            fired += 1;
            if let ControlFlow::Break(()) = (slot.tick)() {
                slot.done.store(true, Ordering::SeqCst);
            }
        }
        slots.retain(|slot| !slot.done.load(Ordering::SeqCst));
        let mut kept = self.slots.lock().unwrap();
        slots.append(&mut kept);
        *kept = slots;
        fired
    }

    /// Number of loops that have not been cancelled or finished.
    pub fn live(&self) -> usize {
        self.slots
            .lock()
            .unwrap()
            .iter()
            .filter(|slot| {
                !slot.cancelled.load(Ordering::SeqCst) && !slot.done.load(Ordering::SeqCst)
            })
            .count()
    }

    /// Number of loops ever started.
    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }
}
