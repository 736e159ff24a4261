// vim: tw=80
//! A registry of loose member disks

use nix::errno::Errno;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::info;

use crate::{
    disk::{DeviceProvider, DiskHandle},
    types::*,
};

/// Keeps a set of open disks that don't yet belong to any striped device.
///
/// Every operation holds a single lock, so it may be shared between threads.
pub struct ClusterRegistry {
    provider: Arc<dyn DeviceProvider>,
    disks: Mutex<Vec<DiskHandle>>,
}

impl ClusterRegistry {
    /// Open `name` and add it to the registry
    pub fn add_disk(&self, name: &str) -> Result<()> {
        let disk = DiskHandle::open(self.provider.as_ref(), name)?;
        self.lock().push(disk);
        info!(name, "added disk to cluster");
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<DiskHandle>> {
        self.disks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Names of the registered disks, oldest first
    pub fn names(&self) -> Vec<String> {
        self.lock().iter().map(|d| d.label().to_owned()).collect()
    }

    pub fn new(provider: Arc<dyn DeviceProvider>) -> Self {
        ClusterRegistry{provider, disks: Mutex::new(Vec::new())}
    }

    /// Close `name` and remove it from the registry.
    ///
    /// Fails with `ENODEV` if no such disk is registered.
    pub fn remove_disk(&self, name: &str) -> Result<()> {
        let disk = {
            let mut disks = self.lock();
            let idx = disks.iter()
                .position(|d| d.label() == name)
                .ok_or(Error::Io(Errno::ENODEV))?;
            disks.remove(idx)
        };
        disk.close();
        info!(name, "removed disk from cluster");
        Ok(())
    }
}

impl Drop for ClusterRegistry {
    fn drop(&mut self) {
        for disk in self.lock().drain(..) {
            disk.close();
        }
    }
}
