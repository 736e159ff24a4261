// vim: tw=80
//! Striped devices over regular files
use std::{
    fs,
    os::unix::fs::FileExt,
    path::PathBuf,
};

use divbuf::DivBufShared;
use futures::future;
use itertools::Itertools;
use nix::errno::Errno;
use pretty_assertions::assert_eq;
use rstest::{fixture, rstest};
use tempfile::{Builder, TempDir};

use sbdd_core::{
    config::{DispatchMode, Params},
    device::RaidDevice,
    file_disk::FileProvider,
    stripe::Raid0Locator,
    *
};

use super::pattern;

struct Harness {
    _tempdir: TempDir,
    paths: Vec<PathBuf>,
}

impl Harness {
    fn params(&self, mode: DispatchMode) -> Params {
        let disks = self.paths.iter()
            .map(|p| p.display().to_string())
            .join(",");
        Params {
            raid_type: 0,
            raid_config: format!("stripe=8;disks={disks}"),
            mode
        }
    }
}

/// Four files of 1 MB each, and 16-sector chunks
#[fixture]
fn harness() -> Harness {
    let tempdir = t!(Builder::new().prefix("test_files").tempdir());
    let paths = (0..4).map(|i| {
        let path = tempdir.path().join(format!("disk{i}"));
        let file = t!(fs::File::create(&path));
        t!(file.set_len(1 << 20));
        path
    }).collect::<Vec<_>>();
    Harness{_tempdir: tempdir, paths}
}

#[rstest]
#[test_log::test(tokio::test)]
async fn read_after_write(
    harness: Harness,
    #[values(DispatchMode::Inline, DispatchMode::Queued)] mode: DispatchMode)
{
    let provider = FileProvider::new(64);
    let dev = t!(RaidDevice::activate(&harness.params(mode), &provider));
    assert_eq!(dev.capacity(), 8192);
    let extents = [(0, 64), (15, 2), (100, 37), (8128, 64)];
    let bufs = extents.iter()
        .map(|&(sector, sectors)| DivBufShared::from(pattern(sector, sectors)))
        .collect::<Vec<_>>();
    let writes = extents.iter().zip(bufs.iter()).map(|(&(sector, _), dbs)| {
        dev.write_at(dbs.try_const().unwrap(), sector)
    });
    t!(future::try_join_all(writes).await);
    for (sector, sectors) in extents {
        let dbs = DivBufShared::from(vec![0u8; sectors2bytes(sectors)]);
        t!(dev.read_at(dbs.try_mut().unwrap(), sector).await);
        assert!(dbs.try_const().unwrap()[..] == pattern(sector, sectors)[..]);
    }
}

/// The member files hold exactly what the layout says they should
#[rstest]
#[test_log::test(tokio::test)]
async fn on_disk_format(harness: Harness) {
    let provider = FileProvider::new(64);
    let dev = t!(RaidDevice::activate(&harness.params(DispatchMode::Queued),
                                      &provider));
    let dbs = DivBufShared::from(pattern(40, 64));
    t!(dev.write_at(dbs.try_const().unwrap(), 40).await);
    dev.shutdown();

    let locator = Raid0Locator::new(16, 4);
    for sector in 40..104 {
        let loc = locator.map(sector);
        let file = t!(fs::File::open(&harness.paths[loc.disk]));
        let mut buf = vec![0u8; SECTOR_SIZE];
        t!(file.read_exact_at(&mut buf, sectors2bytes(loc.sector) as u64));
        assert!(buf == pattern(sector, 1), "sector {sector} misplaced");
    }
}

/// Capacity is limited by the smallest member
#[rstest]
fn mismatched_sizes(harness: Harness) {
    let file = t!(fs::OpenOptions::new().write(true).open(&harness.paths[2]));
    t!(file.set_len(100 * 512));
    let provider = FileProvider::default();
    let dev = t!(RaidDevice::activate(&harness.params(DispatchMode::Inline),
                                      &provider));
    assert_eq!(dev.capacity(), 4 * 100);
}

/// A device's files can't be claimed twice
#[rstest]
fn exclusive(harness: Harness) {
    let provider = FileProvider::default();
    let params = harness.params(DispatchMode::Inline);
    let dev = t!(RaidDevice::activate(&params, &provider));
    let e = RaidDevice::activate(&params, &provider).err().unwrap();
    assert_eq!(e.errno(), Errno::EBUSY);
    drop(dev);
    t!(RaidDevice::activate(&params, &provider));
}
