// vim: tw=80
//! RAM-backed member disks

use nix::errno::Errno;
use std::{
    collections::BTreeMap,
    sync::{
        Arc,
        Mutex,
        PoisonError,
        atomic::{AtomicBool, Ordering}
    },
};
use tracing::debug;

use crate::{
    disk::{BlockDevice, DeviceProvider},
    types::*,
};

/// A block device that keeps its data in memory.
///
/// Transfers that run off the end are truncated at the end of the disk, and
/// report the shorter length.
#[derive(Debug)]
pub struct MemDisk {
    data: Mutex<Box<[u8]>>,
    capacity: SectorT,
    max_transfer: SectorT,
    open: AtomicBool,
}

impl MemDisk {
    /// Create a zero-filled disk.  It starts out closed.
    pub fn new(capacity: SectorT, max_transfer: SectorT) -> Self {
        MemDisk {
            data: Mutex::new(vec![0u8; sectors2bytes(capacity)].into()),
            capacity,
            max_transfer,
            open: AtomicBool::new(false),
        }
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Byte range of a transfer, clamped to the disk
    fn range(&self, sector: SectorT, len: usize) -> Result<(usize, usize)> {
        if !self.is_open() {
            return Err(Error::Io(Errno::EBADF));
        }
        let size = sectors2bytes(self.capacity);
        let start = sectors2bytes(sector).min(size);
        let end = start.saturating_add(len).min(size);
        Ok((start, end))
    }
}

impl BlockDevice for MemDisk {
    fn capacity(&self) -> SectorT {
        self.capacity
    }

    fn close(&self) {
        self.open.store(false, Ordering::Release);
    }

    fn max_transfer(&self) -> SectorT {
        self.max_transfer
    }

    fn read_at(&self, buf: &mut [u8], sector: SectorT) -> Result<usize> {
        let (start, end) = self.range(sector, buf.len())?;
        let data = self.data.lock().unwrap_or_else(PoisonError::into_inner);
        buf[..end - start].copy_from_slice(&data[start..end]);
        Ok(end - start)
    }

    fn write_at(&self, buf: &[u8], sector: SectorT) -> Result<usize> {
        let (start, end) = self.range(sector, buf.len())?;
        let mut data = self.data.lock()
            .unwrap_or_else(PoisonError::into_inner);
        data[start..end].copy_from_slice(&buf[..end - start]);
        Ok(end - start)
    }
}

/// Hands out [`MemDisk`]s by name.
///
/// A disk keeps its contents when closed, and may then be opened again.
#[derive(Debug, Default)]
pub struct MemProvider {
    disks: Mutex<BTreeMap<String, Arc<MemDisk>>>,
}

impl MemProvider {
    /// Look up a disk, whether or not it is open
    pub fn get(&self, name: &str) -> Option<Arc<MemDisk>> {
        self.disks.lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Add a new disk.  Replaces any disk of the same name.
    pub fn insert(&self, name: &str, capacity: SectorT, max_transfer: SectorT)
        -> Arc<MemDisk>
    {
        let disk = Arc::new(MemDisk::new(capacity, max_transfer));
        self.disks.lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_owned(), disk.clone());
        disk
    }

    pub fn new() -> Self {
        Self::default()
    }

    /// A provider populated with identical disks
    pub fn with_disks<I, S>(names: I, capacity: SectorT, max_transfer: SectorT)
        -> Self
        where I: IntoIterator<Item=S>,
              S: AsRef<str>
    {
        let provider = MemProvider::new();
        for name in names {
            provider.insert(name.as_ref(), capacity, max_transfer);
        }
        provider
    }
}

impl DeviceProvider for MemProvider {
    fn open(&self, name: &str) -> Result<Arc<dyn BlockDevice>> {
        let disk = self.get(name).ok_or(Error::Io(Errno::ENOENT))?;
        if disk.open.swap(true, Ordering::AcqRel) {
            return Err(Error::Io(Errno::EBUSY));
        }
        debug!(name, capacity = disk.capacity, "opened memory disk");
        Ok(disk)
    }
}
