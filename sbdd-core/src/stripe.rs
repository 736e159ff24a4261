// vim: tw=80
//! RAID-0 sector layout
//!
//! The striped address space is dealt out to the member disks in chunks, round
//! robin.  With a chunk of 8 sectors and two disks, sectors 0-7 live on disk 0,
//! 8-15 on disk 1, 16-23 on disk 0 again, and so on.

use crate::types::*;

/// Location of a sector on a member disk
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct Chunkloc {
    /// Index of the disk within the configuration
    pub disk: usize,
    /// Sector within that disk
    pub sector: SectorT,
}

impl Chunkloc {
    pub fn new(disk: usize, sector: SectorT) -> Self {
        Chunkloc{disk, sector}
    }
}

/// Translates between the striped address space and member disk addresses.
///
/// Pure and stateless beyond its geometry.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Raid0Locator {
    /// Sectors per chunk
    chunk: SectorT,
    /// Number of member disks
    n: SectorT,
}

impl Raid0Locator {
    /// # Panics
    ///
    /// Panics if either argument is zero.
    pub fn new(chunk: SectorT, ndisks: usize) -> Self {
        assert!(chunk > 0, "chunk size must be positive");
        assert!(ndisks > 0, "must have at least one disk");
        Raid0Locator{chunk, n: ndisks as SectorT}
    }

    pub fn chunk(&self) -> SectorT {
        self.chunk
    }

    /// Map a sector of the striped device to its member disk location.
    pub fn map(&self, sector: SectorT) -> Chunkloc {
        let stripe_width = self.chunk * self.n;
        let disk = (sector % stripe_width) / self.chunk;
        let target = sector / stripe_width * self.chunk + sector % self.chunk;
        Chunkloc::new(disk as usize, target)
    }

    pub fn ndisks(&self) -> usize {
        self.n as usize
    }

    /// Number of sectors from `sector` up to the start of the next chunk.
    ///
    /// Always in the range `[1, chunk]`.
    pub fn sectors_to_boundary(&self, sector: SectorT) -> SectorT {
        self.chunk - sector % self.chunk
    }

    /// The inverse of [`map`](Self::map)
    pub fn unmap(&self, loc: Chunkloc) -> SectorT {
        let stripe = loc.sector / self.chunk;
        let offset = loc.sector % self.chunk;
        (stripe * self.n + loc.disk as SectorT) * self.chunk + offset
    }
}
