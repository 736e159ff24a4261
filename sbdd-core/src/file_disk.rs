// vim: tw=80
//! Member disks backed by files or device nodes

use nix::{
    errno::Errno,
    fcntl::{Flock, FlockArg},
};
use std::{
    fmt,
    fs::{File, OpenOptions},
    io::{self, Seek, SeekFrom},
    os::unix::fs::FileExt,
    path::{Path, PathBuf},
    sync::{Arc, PoisonError, RwLock},
};
use tracing::{debug, info};

use crate::{
    disk::{BlockDevice, DeviceProvider},
    types::*,
};

/// A [`BlockDevice`] backed by a regular file or a device node.
///
/// The file is exclusively locked for as long as it is open.
pub struct FileDisk {
    file: RwLock<Option<Flock<File>>>,
    capacity: SectorT,
    max_transfer: SectorT,
    path: PathBuf,
}

impl FileDisk {
    /// Largest transfer, in sectors, unless otherwise specified
    pub const DEFAULT_MAX_TRANSFER: SectorT = 2560;

    /// Open a file for exclusive read/write access.
    ///
    /// * `path`:           Pathname for the file.  It may be a device node.
    /// * `max_transfer`:   Largest single transfer to allow, in sectors
    pub fn open<P>(path: P, max_transfer: SectorT) -> Result<Self>
        where P: AsRef<Path>
    {
        let path = path.as_ref().to_path_buf();
        let f = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)?;
        let mut f = Flock::lock(f, FlockArg::LockExclusiveNonblock)
            .map_err(|(_, e)| match e {
                Errno::EWOULDBLOCK => Error::Io(Errno::EBUSY),
                e => Error::Io(e)
            })?;
        // Seeking works for device nodes, whose metadata reports no length
        let len = f.seek(SeekFrom::End(0))?;
        let capacity = bytes2sectors(usize::try_from(len)
            .map_err(|_| Error::Io(Errno::EFBIG))?);
        debug!(path = %path.display(), capacity, "opened file disk");
        Ok(FileDisk {
            file: RwLock::new(Some(f)),
            capacity,
            max_transfer,
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn with_file<F>(&self, f: F) -> Result<usize>
        where F: FnOnce(&File) -> io::Result<usize>
    {
        let guard = self.file.read().unwrap_or_else(PoisonError::into_inner);
        match guard.as_ref() {
            Some(file) => f(file).map_err(Error::from),
            None => Err(Error::Io(Errno::EBADF))
        }
    }
}

impl fmt::Debug for FileDisk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileDisk")
            .field("path", &self.path)
            .field("capacity", &self.capacity)
            .field("max_transfer", &self.max_transfer)
            .finish()
    }
}

/// Repeat a positional transfer until it completes or hits end of file.
fn transfer_all<F>(len: usize, mut f: F) -> io::Result<usize>
    where F: FnMut(usize) -> io::Result<usize>
{
    let mut done = 0;
    while done < len {
        match f(done) {
            Ok(0) => break,
            Ok(n) => done += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e)
        }
    }
    Ok(done)
}

impl BlockDevice for FileDisk {
    fn capacity(&self) -> SectorT {
        self.capacity
    }

    fn close(&self) {
        let mut guard = self.file.write()
            .unwrap_or_else(PoisonError::into_inner);
        // Dropping the Flock releases the lock and closes the file
        if guard.take().is_some() {
            info!(path = %self.path.display(), "closed file disk");
        }
    }

    fn max_transfer(&self) -> SectorT {
        self.max_transfer
    }

    fn read_at(&self, buf: &mut [u8], sector: SectorT) -> Result<usize> {
        let offset = sectors2bytes(sector) as u64;
        self.with_file(|file| {
            let len = buf.len();
            transfer_all(len, |done| {
                file.read_at(&mut buf[done..], offset + done as u64)
            })
        })
    }

    fn write_at(&self, buf: &[u8], sector: SectorT) -> Result<usize> {
        let offset = sectors2bytes(sector) as u64;
        self.with_file(|file| {
            transfer_all(buf.len(), |done| {
                file.write_at(&buf[done..], offset + done as u64)
            })
        })
    }
}

/// Opens [`FileDisk`]s by path
#[derive(Clone, Copy, Debug)]
pub struct FileProvider {
    max_transfer: SectorT,
}

impl FileProvider {
    pub fn new(max_transfer: SectorT) -> Self {
        FileProvider{max_transfer}
    }
}

impl Default for FileProvider {
    fn default() -> Self {
        FileProvider::new(FileDisk::DEFAULT_MAX_TRANSFER)
    }
}

impl DeviceProvider for FileProvider {
    fn open(&self, name: &str) -> Result<Arc<dyn BlockDevice>> {
        let disk = FileDisk::open(name, self.max_transfer)?;
        Ok(Arc::new(disk))
    }
}
