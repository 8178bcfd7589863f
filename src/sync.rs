//! Startup synchronization between the coordinator and the receiver task.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};

enum GateState<T> {
    Closed,
    Released(T),
    Abandoned,
}

/// One-shot rendezvous that parks the receiver task until the bus driver is
/// installed and started.
///
/// The gate starts closed. The coordinator either `release`s it exactly once,
/// handing the started driver to the waiting task, or `abandon`s it when
/// startup fails so the task can exit instead of parking forever. After the
/// single release the gate is never touched again.
pub struct StartupGate<T> {
    state: Mutex<GateState<T>>,
    ready: Condvar,
}

impl<T> StartupGate<T> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(GateState::Closed),
            ready: Condvar::new(),
        }
    }

    /// Open the gate, handing `value` to the waiter. One-shot: a second call
    /// is a caller bug and is ignored.
    pub fn release(&self, value: T) {
        let mut state = self.state.lock().unwrap();
        if matches!(*state, GateState::Closed) {
            *state = GateState::Released(value);
            self.ready.notify_all();
        } else {
            debug_assert!(false, "startup gate released twice");
        }
    }

    /// Wake the waiter empty-handed; used when startup fails before release.
    pub fn abandon(&self) {
        let mut state = self.state.lock().unwrap();
        if matches!(*state, GateState::Closed) {
            *state = GateState::Abandoned;
            self.ready.notify_all();
        }
    }

    /// Block until the gate is released or abandoned. Returns the released
    /// value, or `None` when startup was abandoned (or the value was already
    /// taken by an earlier wait).
    pub fn wait(&self) -> Option<T> {
        let mut state = self.state.lock().unwrap();
        while matches!(*state, GateState::Closed) {
            state = self.ready.wait(state).unwrap();
        }
        match std::mem::replace(&mut *state, GateState::Abandoned) {
            GateState::Released(value) => Some(value),
            _ => None,
        }
    }
}

impl<T> Default for StartupGate<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Cancellation flag for the receiver loop.
///
/// The loop checks it between bounded receive waits, so `cancel` takes effect
/// within one wait interval.
#[derive(Clone, Default, Debug)]
pub struct ShutdownToken(Arc<AtomicBool>);

impl ShutdownToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}
