// vim: tw=80
//! Synchronous dispatch in the submitter's context

use nix::errno::Errno;
use std::sync::{
    Arc,
    Condvar,
    Mutex,
    PoisonError,
    atomic::{AtomicBool, AtomicUsize, Ordering}
};
use tracing::{debug, info};

use crate::{
    bio::Bio,
    types::*,
};
use super::{AtomicEngineState, Dispatch, EngineState, Process};

/// Processes each request synchronously, in whatever thread submits it.
///
/// Every request in flight holds a reference.  The engine itself holds one
/// more from `start` until `stop`, so the count can only reach zero once
/// teardown has begun, and once it has reached zero it can never be raised
/// again.
pub struct InlineEngine {
    processor: Arc<dyn Process>,
    state: AtomicEngineState,
    deleting: AtomicBool,
    refs: AtomicUsize,
    exit_lock: Mutex<()>,
    exit_wait: Condvar,
}

impl InlineEngine {
    pub fn new(processor: Arc<dyn Process>) -> Self {
        InlineEngine {
            processor,
            state: AtomicEngineState::new(EngineState::Uninitialized),
            deleting: AtomicBool::new(false),
            refs: AtomicUsize::new(0),
            exit_lock: Mutex::new(()),
            exit_wait: Condvar::new(),
        }
    }

    /// Take a reference, unless the count has already dropped to zero.
    fn get(&self) -> Option<InFlight<'_>> {
        let mut refs = self.refs.load(Ordering::Acquire);
        loop {
            if refs == 0 {
                return None;
            }
            match self.refs.compare_exchange_weak(refs, refs + 1,
                Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return Some(InFlight(self)),
                Err(actual) => refs = actual
            }
        }
    }

    /// Number of references currently held, including the engine's own
    pub fn in_flight(&self) -> usize {
        self.refs.load(Ordering::Acquire)
    }

    /// Drop a reference, waking the teardown waiter if it was the last.
    fn put(&self) {
        if self.refs.fetch_sub(1, Ordering::AcqRel) == 1 {
            let _guard = self.exit_lock.lock()
                .unwrap_or_else(PoisonError::into_inner);
            self.exit_wait.notify_all();
        }
    }
}

impl Dispatch for InlineEngine {
    fn start(&self) -> Result<()> {
        if self.state.load(Ordering::Acquire) != EngineState::Uninitialized {
            return Err(Error::InvalidArgument("engine already started".into()));
        }
        self.refs.store(1, Ordering::Release);
        self.state.store(EngineState::Active, Ordering::Release);
        info!("inline dispatch started");
        Ok(())
    }

    fn state(&self) -> EngineState {
        self.state.load(Ordering::Acquire)
    }

    fn stop(&self) {
        self.deleting.store(true, Ordering::SeqCst);
        match self.state.compare_exchange(EngineState::Active,
            EngineState::Stopping, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => {
                info!("stopping inline dispatch");
                // Release the reference taken by start
                self.put();
            }
            Err(EngineState::Uninitialized) => {
                self.state.store(EngineState::Stopped, Ordering::Release);
                return;
            }
            Err(_) => ()
        }
        let mut guard = self.exit_lock.lock()
            .unwrap_or_else(PoisonError::into_inner);
        while self.refs.load(Ordering::Acquire) != 0 {
            guard = self.exit_wait.wait(guard)
                .unwrap_or_else(PoisonError::into_inner);
        }
        drop(guard);
        if self.state.swap(EngineState::Stopped, Ordering::AcqRel) !=
            EngineState::Stopped
        {
            info!("inline dispatch stopped");
        }
    }

    fn submit(&self, bio: Bio) {
        let held = if self.deleting.load(Ordering::Acquire) {
            None
        } else {
            self.get()
        };
        let Some(_held) = held else {
            debug!(?bio, "rejecting request: device is not active");
            bio.fail(Errno::EIO);
            return;
        };
        if let Some(rest) = self.processor.process(bio) {
            self.submit(rest);
        }
    }
}

/// A reference held by one request in flight.  Released on drop, even if
/// processing panics.
struct InFlight<'a>(&'a InlineEngine);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.put();
    }
}
