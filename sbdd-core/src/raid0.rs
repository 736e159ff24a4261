// vim: tw=80
//! The RAID-0 processing function

use nix::errno::Errno;
use tracing::{debug, error, warn};

use crate::{
    bio::Bio,
    config::StripeConfig,
    disk::DiskSet,
    dispatch::Process,
    split::split,
    stripe::Raid0Locator,
    types::*,
};

/// Stripes requests across an owned [`DiskSet`].
///
/// Each call to [`process`](Process::process) performs at most one chunk's
/// worth of a request against exactly one member disk.
#[derive(Debug)]
pub struct Raid0 {
    disks: DiskSet,
    locator: Raid0Locator,
    /// Most resubmissions any legal request can need
    max_depth: u32,
}

impl Raid0 {
    pub fn new(config: &StripeConfig, disks: DiskSet) -> Self {
        debug_assert_eq!(config.ndisks(), disks.len());
        let chunk = config.chunk_sectors();
        let locator = Raid0Locator::new(chunk, disks.len());
        // An unaligned request can touch one more chunk than an aligned one
        let max_depth = disks.max_transfer().div_ceil(chunk) + 1;
        Raid0 {
            disks,
            locator,
            max_depth: u32::try_from(max_depth).unwrap_or(u32::MAX)
        }
    }

    /// Usable capacity in sectors
    pub fn capacity(&self) -> SectorT {
        self.disks.capacity()
    }

    pub fn disks(&self) -> &DiskSet {
        &self.disks
    }

    pub fn locator(&self) -> &Raid0Locator {
        &self.locator
    }

    /// Largest request accepted, in sectors
    pub fn max_transfer(&self) -> SectorT {
        self.disks.max_transfer()
    }

    /// Transfer a request that lies within a single chunk
    fn transfer(&self, bio: &mut Bio) -> Result<()> {
        let loc = self.locator.map(bio.sector());
        let disk = self.disks.get(loc.disk)
            .ok_or(Error::Io(Errno::EIO))?;
        let sectors = bio.sectors();
        if loc.sector + sectors > disk.capacity() {
            error!(sector = bio.sector(), disk = loc.disk, target = loc.sector,
                   sectors, "mapping failure: past the end of the disk");
            return Err(Error::Io(Errno::EIO));
        }
        debug!(dir = %bio.direction(), sector = bio.sector(), sectors,
               disk = loc.disk, target = loc.sector, "mapped request");
        let expected = sectors2bytes(sectors);
        let done = disk.transfer(bio.payload_mut(), loc.sector)?;
        if done != expected {
            warn!(disk = disk.label(), expected, done, "short transfer");
            return Err(Error::Io(Errno::EIO));
        }
        Ok(())
    }
}

impl Process for Raid0 {
    fn process(&self, bio: Bio) -> Option<Bio> {
        if bio.depth() > self.max_depth {
            error!(?bio, max = self.max_depth, "request split too many times");
            bio.fail(Errno::EIO);
            return None;
        }
        if self.disks.is_closed() {
            bio.fail(Errno::EIO);
            return None;
        }
        let (mut head, rest) = split(bio, self.locator.chunk());
        let r = self.transfer(&mut head);
        if let Err(e) = &r {
            warn!(?head, error = %e, "request failed");
        }
        head.complete(r);
        rest
    }
}
