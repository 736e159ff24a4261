// vim: tw=80
//! Block I/O requests and their completions

use futures::{
    Future,
    channel::oneshot,
    task::{Context, Poll}
};
use nix::errno::Errno;
use pin_project::pin_project;
use std::{
    fmt,
    pin::Pin,
    sync::{Arc, Mutex, PoisonError},
};

use crate::types::*;

/// Data carried by a [`Bio`].  The direction is implied by the buffer type.
pub enum Payload {
    /// Destination buffer for a read
    Read(IoVecMut),
    /// Source buffer for a write
    Write(IoVec),
}

impl Payload {
    pub fn direction(&self) -> Direction {
        match self {
            Payload::Read(_) => Direction::Read,
            Payload::Write(_) => Direction::Write,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Length in bytes
    pub fn len(&self) -> usize {
        match self {
            Payload::Read(buf) => buf.len(),
            Payload::Write(buf) => buf.len(),
        }
    }

    /// Split off the first `at` bytes, leaving the rest in `self`.
    fn split_to(&mut self, at: usize) -> Payload {
        match self {
            Payload::Read(buf) => Payload::Read(buf.split_to(at)),
            Payload::Write(buf) => Payload::Write(buf.split_to(at)),
        }
    }
}

enum Notifier {
    Channel(oneshot::Sender<Result<()>>),
    Callback(Box<dyn FnOnce(Result<()>) + Send>),
}

/// State shared by every piece of one original request.
///
/// The original requester is notified when the last piece lets go of it.
struct Chain {
    error: Mutex<Option<Error>>,
    notifier: Mutex<Option<Notifier>>,
}

impl Drop for Chain {
    fn drop(&mut self) {
        let error = self.error.get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let r = match error {
            Some(e) => Err(e),
            None => Ok(())
        };
        let notifier = self.notifier.get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match notifier {
            // The receiver may have been dropped.  That's fine.
            Some(Notifier::Channel(tx)) => drop(tx.send(r)),
            Some(Notifier::Callback(f)) => f(r),
            None => ()
        }
    }
}

/// Completion handle for one piece of a request.
///
/// A handle that is dropped without being completed fails its request with
/// `EIO`, so a request can never be silently lost.
pub struct Completion {
    chain: Arc<Chain>,
    done: bool
}

impl Completion {
    fn from_notifier(notifier: Notifier) -> Self {
        let chain = Arc::new(Chain {
            error: Mutex::new(None),
            notifier: Mutex::new(Some(notifier))
        });
        Completion{chain, done: false}
    }

    /// A completion that reports through a [`BioFut`]
    pub fn channel() -> (Self, BioFut) {
        let (tx, rx) = oneshot::channel();
        (Completion::from_notifier(Notifier::Channel(tx)), BioFut{rx})
    }

    /// A completion that calls `f` once every piece is complete.
    ///
    /// `f` runs in whatever context completes the last piece.
    pub fn callback<F>(f: F) -> Self
        where F: FnOnce(Result<()>) + Send + 'static
    {
        Completion::from_notifier(Notifier::Callback(Box::new(f)))
    }

    /// Create another handle for the same request.  The request completes
    /// once both handles have.
    pub fn chain(&self) -> Self {
        Completion{chain: self.chain.clone(), done: false}
    }

    /// Complete this piece.  The first error from any piece wins.
    pub fn complete(mut self, r: Result<()>) {
        self.record(r);
        self.done = true;
    }

    fn record(&self, r: Result<()>) {
        if let Err(e) = r {
            let mut guard = self.chain.error.lock()
                .unwrap_or_else(PoisonError::into_inner);
            guard.get_or_insert(e);
        }
    }
}

impl Drop for Completion {
    fn drop(&mut self) {
        if !self.done {
            self.record(Err(Error::Io(Errno::EIO)));
        }
    }
}

/// Future that resolves when a request, and every piece split from it, has
/// completed.
#[pin_project]
pub struct BioFut {
    #[pin]
    rx: oneshot::Receiver<Result<()>>
}

impl Future for BioFut {
    type Output = Result<()>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context) -> Poll<Self::Output> {
        match self.project().rx.poll(cx) {
            Poll::Ready(Ok(r)) => Poll::Ready(r),
            Poll::Ready(Err(_)) => Poll::Ready(Err(Error::Io(Errno::EPIPE))),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// A block I/O request against the striped device.
pub struct Bio {
    sector: SectorT,
    payload: Payload,
    completion: Completion,
    /// How many times this request's remainder has been resubmitted
    depth: u32,
}

impl Bio {
    pub fn new(sector: SectorT, payload: Payload, completion: Completion)
        -> Self
    {
        Bio{sector, payload, completion, depth: 0}
    }

    /// Create a read request, returning the future for its completion
    pub fn read(buf: IoVecMut, sector: SectorT) -> (Self, BioFut) {
        let (completion, fut) = Completion::channel();
        (Bio::new(sector, Payload::Read(buf), completion), fut)
    }

    /// Create a write request, returning the future for its completion
    pub fn write(buf: IoVec, sector: SectorT) -> (Self, BioFut) {
        let (completion, fut) = Completion::channel();
        (Bio::new(sector, Payload::Write(buf), completion), fut)
    }

    /// Complete this request, or this piece of it.
    ///
    /// The buffer is released first, so the requester may reclaim it as soon
    /// as it learns of completion.
    pub fn complete(self, r: Result<()>) {
        let Bio{payload, completion, ..} = self;
        drop(payload);
        completion.complete(r)
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn direction(&self) -> Direction {
        self.payload.direction()
    }

    /// The first sector past the end of this request
    pub fn end(&self) -> SectorT {
        self.sector + self.sectors()
    }

    pub fn fail(self, errno: Errno) {
        self.complete(Err(Error::Io(errno)))
    }

    /// Is the payload a whole number of sectors?
    pub fn is_aligned(&self) -> bool {
        self.payload.len() % SECTOR_SIZE == 0
    }

    pub fn payload_mut(&mut self) -> &mut Payload {
        &mut self.payload
    }

    pub fn sector(&self) -> SectorT {
        self.sector
    }

    pub fn sectors(&self) -> SectorT {
        bytes2sectors(self.payload.len())
    }

    /// Split after the first `sectors` sectors.
    ///
    /// Returns the head and the remainder.  Both share this request's
    /// completion.  The remainder counts as one more resubmission.
    ///
    /// # Panics
    ///
    /// Panics if `sectors` is not strictly inside the request.
    pub fn split_at(mut self, sectors: SectorT) -> (Bio, Bio) {
        assert!(sectors > 0 && sectors < self.sectors(),
                "split point {} outside of a {}-sector request",
                sectors, self.sectors());
        let head = Bio {
            sector: self.sector,
            payload: self.payload.split_to(sectors2bytes(sectors)),
            completion: self.completion.chain(),
            depth: self.depth
        };
        self.sector += sectors;
        self.depth += 1;
        (head, self)
    }
}

impl fmt::Debug for Bio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bio")
            .field("direction", &self.direction())
            .field("sector", &self.sector)
            .field("sectors", &self.sectors())
            .field("depth", &self.depth)
            .finish()
    }
}
