// vim: tw=80
//! Member disks and the host capabilities used to reach them

use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering}
    },
};
#[cfg(test)] use mockall::automock;
use serde_derive::{Deserialize, Serialize};
use tracing::{error, info};

use crate::{
    bio::Payload,
    config::StripeConfig,
    types::*,
};

/// A block device as provided by the host.
///
/// Implementations must tolerate concurrent calls from many threads.
#[cfg_attr(test, automock)]
pub trait BlockDevice: Send + Sync {
    /// Size of the device in sectors
    fn capacity(&self) -> SectorT;

    /// Largest single transfer the device accepts, in sectors
    fn max_transfer(&self) -> SectorT;

    /// Read into `buf` starting at `sector`.  Returns the number of bytes read.
    fn read_at(&self, buf: &mut [u8], sector: SectorT) -> Result<usize>;

    /// Write `buf` starting at `sector`.  Returns the number of bytes written.
    fn write_at(&self, buf: &[u8], sector: SectorT) -> Result<usize>;

    /// Release the device.  Further I/O will fail.
    fn close(&self);
}

/// Opens block devices by name on behalf of a striped device.
#[cfg_attr(test, automock)]
pub trait DeviceProvider: Send + Sync {
    /// Open `name` for exclusive read/write access
    fn open(&self, name: &str) -> Result<Arc<dyn BlockDevice>>;
}

/// One opened member of a [`DiskSet`].
pub struct DiskHandle {
    dev: Arc<dyn BlockDevice>,
    capacity: SectorT,
    max_transfer: SectorT,
    label: String,
}

impl DiskHandle {
    /// Open `name` through `provider` and record its limits.
    pub fn open(provider: &dyn DeviceProvider, name: &str) -> Result<Self> {
        let dev = provider.open(name)
            .map_err(|e| {
                error!(name, error = %e, "cannot open block device");
                Error::DeviceOpen{name: name.to_owned(), errno: e.errno()}
            })?;
        let capacity = dev.capacity();
        let max_transfer = dev.max_transfer();
        info!(name, capacity, max_transfer, "allocated disk");
        Ok(DiskHandle{dev, capacity, max_transfer, label: name.to_owned()})
    }

    pub fn capacity(&self) -> SectorT {
        self.capacity
    }

    pub fn close(&self) {
        self.dev.close()
    }

    /// The identifier this disk was opened with
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn max_transfer(&self) -> SectorT {
        self.max_transfer
    }

    /// Move the payload's data to or from the disk at `sector`.
    ///
    /// Returns the number of bytes transferred.
    pub fn transfer(&self, payload: &mut Payload, sector: SectorT)
        -> Result<usize>
    {
        match payload {
            Payload::Read(buf) => self.dev.read_at(&mut buf[..], sector),
            Payload::Write(buf) => self.dev.write_at(&buf[..], sector),
        }
    }
}

impl fmt::Debug for DiskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiskHandle")
            .field("label", &self.label)
            .field("capacity", &self.capacity)
            .field("max_transfer", &self.max_transfer)
            .finish()
    }
}

/// Return value of [`DiskSet::status`]
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Status {
    pub label: String,
    pub capacity: SectorT,
    pub max_transfer: SectorT,
}

/// The ordered, exclusively owned set of member disks.
///
/// Index `i` of the set is disk `i` of the stripe mapping.  Handles are
/// read-only between `open` and `close`.
#[derive(Debug)]
pub struct DiskSet {
    disks: Box<[DiskHandle]>,
    closed: AtomicBool,
}

impl DiskSet {
    /// Usable capacity in sectors.  Every member contributes only as much as
    /// the smallest one.
    pub fn capacity(&self) -> SectorT {
        let smallest = self.disks.iter()
            .map(DiskHandle::capacity)
            .min()
            .unwrap_or(0);
        smallest * self.disks.len() as SectorT
    }

    /// Close every member.  Closing twice is a no-op.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        for disk in self.disks.iter() {
            info!(name = disk.label(), "closing disk");
            disk.close();
        }
    }

    pub fn get(&self, idx: usize) -> Option<&DiskHandle> {
        self.disks.get(idx)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn iter(&self) -> impl Iterator<Item=&DiskHandle> {
        self.disks.iter()
    }

    pub fn len(&self) -> usize {
        self.disks.len()
    }

    /// Largest request, in sectors, that every member can accept.
    // The kernel driver this replaces reported the largest member's limit,
    // which lets requests through that the smaller members would reject.
    pub fn max_transfer(&self) -> SectorT {
        self.disks.iter()
            .map(DiskHandle::max_transfer)
            .min()
            .unwrap_or(0)
    }

    /// Open every disk named by `config`, in order.
    ///
    /// If any disk fails to open, the ones already opened are closed again and
    /// the error names the failing disk.
    #[tracing::instrument(skip(provider))]
    pub fn open(config: &StripeConfig, provider: &dyn DeviceProvider)
        -> Result<Self>
    {
        let mut disks = Vec::with_capacity(config.ndisks());
        for name in config.disks() {
            match DiskHandle::open(provider, name) {
                Ok(disk) => disks.push(disk),
                Err(e) => {
                    for disk in disks.iter() {
                        disk.close();
                    }
                    return Err(e);
                }
            }
        }
        Ok(DiskSet {
            disks: disks.into_boxed_slice(),
            closed: AtomicBool::new(false)
        })
    }

    pub fn status(&self) -> Vec<Status> {
        self.disks.iter()
            .map(|d| Status {
                label: d.label.clone(),
                capacity: d.capacity,
                max_transfer: d.max_transfer
            }).collect()
    }
}

impl Drop for DiskSet {
    fn drop(&mut self) {
        self.close();
    }
}
