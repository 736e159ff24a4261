// vim: tw=80
//! Deferred dispatch through a single worker thread

use nix::errno::Errno;
use std::{
    collections::VecDeque,
    mem,
    panic::{self, AssertUnwindSafe},
    sync::{
        Arc,
        Condvar,
        Mutex,
        MutexGuard,
        PoisonError,
        atomic::Ordering
    },
    thread::{self, JoinHandle},
};
use tracing::{debug, error, info, warn};

use crate::{
    bio::Bio,
    types::*,
};
use super::{AtomicEngineState, Dispatch, EngineState, Process};

#[derive(Default)]
struct Queue {
    bios: VecDeque<Bio>,
    /// Set once teardown has begun.  The worker exits when it sees it.
    stop: bool,
}

struct Shared {
    processor: Arc<dyn Process>,
    queue: Mutex<Queue>,
    wakeup: Condvar,
    /// Only changed while holding `queue`
    state: AtomicEngineState,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Queue> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn run(&self) {
        debug!("worker running");
        loop {
            let bio = {
                let mut queue = self.lock();
                loop {
                    if queue.stop {
                        debug!("worker exiting");
                        return;
                    }
                    if let Some(bio) = queue.bios.pop_front() {
                        break bio;
                    }
                    queue = self.wakeup.wait(queue)
                        .unwrap_or_else(PoisonError::into_inner);
                }
            };
            // A panicking request drops its bio, which fails it with EIO
            let r = panic::catch_unwind(AssertUnwindSafe(|| {
                self.processor.process(bio)
            }));
            match r {
                Ok(Some(rest)) => self.submit(rest),
                Ok(None) => (),
                Err(_) => error!("request processing panicked"),
            }
        }
    }

    fn submit(&self, bio: Bio) {
        let mut queue = self.lock();
        if self.state.load(Ordering::Acquire) == EngineState::Active {
            queue.bios.push_back(bio);
            drop(queue);
            self.wakeup.notify_one();
        } else {
            drop(queue);
            debug!(?bio, "rejecting request: device is not active");
            bio.fail(Errno::EIO);
        }
    }
}

/// Queues requests for one worker thread, which processes them in FIFO order.
///
/// Submission never blocks on I/O.  At teardown, whatever is still queued is
/// failed with `EIO`.
pub struct QueuedEngine {
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl QueuedEngine {
    pub fn new(processor: Arc<dyn Process>) -> Self {
        let shared = Arc::new(Shared {
            processor,
            queue: Mutex::new(Queue::default()),
            wakeup: Condvar::new(),
            state: AtomicEngineState::new(EngineState::Uninitialized),
        });
        QueuedEngine{shared, worker: Mutex::new(None)}
    }

    /// Number of requests waiting for the worker
    pub fn queued(&self) -> usize {
        self.shared.lock().bios.len()
    }
}

impl Dispatch for QueuedEngine {
    fn start(&self) -> Result<()> {
        let mut worker = self.worker.lock()
            .unwrap_or_else(PoisonError::into_inner);
        if self.state() != EngineState::Uninitialized {
            return Err(Error::InvalidArgument("engine already started".into()));
        }
        let shared = self.shared.clone();
        let handle = thread::Builder::new()
            .name("sbdd-io".to_owned())
            .spawn(move || shared.run())
            .map_err(|e| {
                error!(error = %e, "cannot create worker thread");
                Error::ResourceExhausted
            })?;
        *worker = Some(handle);
        let _queue = self.shared.lock();
        self.shared.state.store(EngineState::Active, Ordering::Release);
        info!("queued dispatch started");
        Ok(())
    }

    fn state(&self) -> EngineState {
        self.shared.state.load(Ordering::Acquire)
    }

    fn stop(&self) {
        {
            let mut queue = self.shared.lock();
            match self.shared.state.load(Ordering::Acquire) {
                EngineState::Uninitialized => {
                    self.shared.state.store(EngineState::Stopped,
                                            Ordering::Release);
                    return;
                }
                EngineState::Active => {
                    info!("stopping queued dispatch");
                    self.shared.state.store(EngineState::Stopping,
                                            Ordering::Release);
                    queue.stop = true;
                    self.shared.wakeup.notify_all();
                }
                EngineState::Stopping | EngineState::Stopped => ()
            }
        }
        // Concurrent callers serialize here, so none returns before the
        // worker has exited and the queue is empty.
        let mut worker = self.worker.lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = worker.take() {
            if handle.join().is_err() {
                error!("worker thread panicked");
            }
        }
        let drained = mem::take(&mut self.shared.lock().bios);
        if !drained.is_empty() {
            warn!(count = drained.len(), "failing queued requests");
        }
        for bio in drained {
            bio.fail(Errno::EIO);
        }
        let _queue = self.shared.lock();
        if self.shared.state.swap(EngineState::Stopped, Ordering::AcqRel) !=
            EngineState::Stopped
        {
            info!("queued dispatch stopped");
        }
    }

    fn submit(&self, bio: Bio) {
        self.shared.submit(bio)
    }
}

impl Drop for QueuedEngine {
    fn drop(&mut self) {
        self.stop();
    }
}
