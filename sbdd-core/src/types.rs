// vim: tw=80
//! Common type definitions used throughout sbdd

use divbuf::{DivBuf, DivBufMut};
use nix::errno::Errno;
use serde_derive::{Deserialize, Serialize};
use thiserror::Error;
use std::{
    fmt::{self, Display, Formatter},
    io,
};

/// Indexes a 512-byte sector
pub type SectorT = u64;

/// log2 of `SECTOR_SIZE`
pub const SECTOR_SHIFT: u32 = 9;

/// Sectors are always 512 bytes, regardless of the member disks' native block
/// size.
pub const SECTOR_SIZE: usize = 1 << SECTOR_SHIFT;

/// Our `IoVec`.  Unlike the standard library's, ours is reference-counted so it
/// can have more than one owner.
pub type IoVec = DivBuf;

/// Mutable version of `IoVec`.  Uniquely owned.
pub type IoVecMut = DivBufMut;

/// Convert a byte count into a sector count, rounding down.
pub const fn bytes2sectors(bytes: usize) -> SectorT {
    (bytes >> SECTOR_SHIFT) as SectorT
}

/// Convert a sector count into a byte count.
pub const fn sectors2bytes(sectors: SectorT) -> usize {
    (sectors << SECTOR_SHIFT) as usize
}

/// Which way the data flows
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum Direction {
    /// From the member disk into the request's buffer
    Read,
    /// From the request's buffer onto the member disk
    Write
}

impl Display for Direction {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Read => "read".fmt(f),
            Direction::Write => "write".fmt(f),
        }
    }
}

/// sbdd's error type.
///
/// Configuration and open errors are fatal to activation.  `Io` errors are
/// only ever reported through a request's completion.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum Error {
    /// Malformed or missing configuration
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Too many member disks
    #[error("Too many disks: {count}, max: {max}")]
    CapacityExceeded {
        count: usize,
        max: usize
    },

    /// A RAID level or mode that we don't implement
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// A member device could not be opened
    #[error("Cannot open device '{name}': {errno}")]
    DeviceOpen {
        name: String,
        errno: Errno
    },

    /// A request failed
    #[error("I/O error: {0}")]
    Io(Errno),

    /// Could not allocate an internal structure
    #[error("Cannot allocate memory")]
    ResourceExhausted,
}

impl Error {
    /// Is this one of the errors that rejects a configuration?
    pub fn is_config(&self) -> bool {
        matches!(self, Error::InvalidArgument(_) |
                       Error::CapacityExceeded{..} |
                       Error::Unsupported(_))
    }

    /// The closest errno, as a kernel block driver would have reported it
    pub fn errno(&self) -> Errno {
        match self {
            Error::InvalidArgument(_) => Errno::EINVAL,
            Error::CapacityExceeded{..} => Errno::EINVAL,
            Error::Unsupported(_) => Errno::EOPNOTSUPP,
            Error::DeviceOpen{errno, ..} => *errno,
            Error::Io(errno) => *errno,
            Error::ResourceExhausted => Errno::ENOMEM,
        }
    }
}

impl From<Errno> for Error {
    fn from(e: Errno) -> Self {
        Error::Io(e)
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        let errno = e.raw_os_error()
            .map(Errno::from_raw)
            .unwrap_or(Errno::EIO);
        Error::Io(errno)
    }
}

pub type Result<T> = ::std::result::Result<T, Error>;
