// vim: tw=80
//! Moving requests from the submission boundary to the processing function
//!
//! Two engines are available.  [`InlineEngine`] processes each request in the
//! submitter's own context.  [`QueuedEngine`] hands requests to a single worker
//! thread.  Both guarantee that once [`Dispatch::stop`] returns, no request is
//! being processed and every request ever submitted has been completed.

use atomic_enum::atomic_enum;
#[cfg(test)] use mockall::automock;
use serde_derive::{Deserialize, Serialize};
use std::sync::Arc;

use crate::{
    bio::Bio,
    config::DispatchMode,
};

mod inline;
mod queued;

pub use self::inline::InlineEngine;
pub use self::queued::QueuedEngine;

/// Lifecycle of an engine.  It only ever moves forward.
#[atomic_enum]
#[derive(Deserialize, Eq, PartialEq, Serialize)]
pub enum EngineState {
    /// Built, but not yet accepting requests
    Uninitialized,
    /// Accepting requests
    Active,
    /// Teardown has begun.  New requests fail.
    Stopping,
    /// Fully quiesced
    Stopped,
}

/// The work done for each request.
#[cfg_attr(test, automock)]
pub trait Process: Send + Sync {
    /// Perform as much of `bio` as fits in one piece, completing that piece.
    ///
    /// Returns whatever remains, which the engine will resubmit.
    fn process(&self, bio: Bio) -> Option<Bio>;
}

#[enum_dispatch::enum_dispatch]
pub trait Dispatch {
    /// Begin accepting requests.
    fn start(&self) -> crate::Result<()>;

    /// Accept one request.  Never blocks waiting for its completion.
    ///
    /// If the engine is not active, the request fails with `EIO`.
    fn submit(&self, bio: Bio);

    /// Stop accepting requests and wait for everything in flight.
    ///
    /// Idempotent.
    fn stop(&self);

    fn state(&self) -> EngineState;
}

/// Either dispatch engine
#[enum_dispatch::enum_dispatch(Dispatch)]
pub enum Engine {
    Inline(InlineEngine),
    Queued(QueuedEngine),
}

impl Engine {
    /// Build an engine of the given mode around `processor`.  It must still be
    /// started.
    pub fn new(mode: DispatchMode, processor: Arc<dyn Process>) -> Self {
        match mode {
            DispatchMode::Inline => InlineEngine::new(processor).into(),
            DispatchMode::Queued => QueuedEngine::new(processor).into(),
        }
    }

    pub fn mode(&self) -> DispatchMode {
        match self {
            Engine::Inline(_) => DispatchMode::Inline,
            Engine::Queued(_) => DispatchMode::Queued,
        }
    }
}
