// vim: tw=80
//! Activation, teardown, and reactivation of whole devices
use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
        mpsc,
    },
    thread,
};

use divbuf::DivBufShared;
use nix::errno::Errno;
use pretty_assertions::assert_eq;
use rstest::rstest;

use sbdd_core::{
    bio::{Bio, Completion, Payload},
    config::{DispatchMode, Params},
    device::RaidDevice,
    dispatch::EngineState,
    mem_disk::MemProvider,
    *
};

use super::{basic_runtime, pattern};

fn params(mode: DispatchMode) -> Params {
    Params {
        raid_type: 0,
        raid_config: "stripe=2;disks=a,b".to_owned(),
        mode
    }
}

/// Data outlives the device that wrote it
#[rstest]
fn reactivate(
    #[values(DispatchMode::Inline, DispatchMode::Queued)] mode: DispatchMode)
{
    let provider = MemProvider::with_disks(["a", "b"], 64, 16);
    let rt = basic_runtime();
    let dev = t!(RaidDevice::activate(&params(mode), &provider));
    let dbs = DivBufShared::from(pattern(3, 10));
    t!(rt.block_on(dev.write_at(dbs.try_const().unwrap(), 3)));
    dev.shutdown();
    // The members are released, so a second device may claim them
    drop(dev);
    let dev = t!(RaidDevice::activate(&params(mode), &provider));
    let dbs = DivBufShared::from(vec![0u8; sectors2bytes(10)]);
    t!(rt.block_on(dev.read_at(dbs.try_mut().unwrap(), 3)));
    assert!(dbs.try_const().unwrap()[..] == pattern(3, 10)[..]);
}

/// Members stay claimed for as long as the device lives
#[test]
fn members_claimed() {
    let provider = MemProvider::with_disks(["a", "b"], 64, 16);
    let _dev = t!(RaidDevice::activate(&params(DispatchMode::Inline),
                                       &provider));
    let e = RaidDevice::activate(&params(DispatchMode::Queued), &provider)
        .err()
        .unwrap();
    assert_eq!(e, Error::DeviceOpen{name: "a".into(), errno: Errno::EBUSY});
    assert!(provider.get("a").unwrap().is_open());
}

/// A failed activation leaves no member open
#[test]
fn partial_activation() {
    let provider = MemProvider::with_disks(["a"], 64, 16);
    let e = RaidDevice::activate(&params(DispatchMode::Inline), &provider)
        .err()
        .unwrap();
    assert_eq!(e, Error::DeviceOpen{name: "b".into(), errno: Errno::ENOENT});
    assert!(!provider.get("a").unwrap().is_open());
}

/// Shutdown races with submitters on other threads.  Every request still
/// completes exactly once, and none completes after shutdown returns.
#[rstest]
fn shutdown_under_load(
    #[values(DispatchMode::Inline, DispatchMode::Queued)] mode: DispatchMode)
{
    const SUBMITTERS: usize = 4;
    const PER_THREAD: usize = 200;

    let provider = MemProvider::with_disks(["a", "b"], 256, 16);
    let dev = t!(RaidDevice::activate(&params(mode), &provider));
    let completed = Arc::new(AtomicUsize::new(0));
    let (started_tx, started_rx) = mpsc::channel();
    thread::scope(|s| {
        for i in 0..SUBMITTERS {
            let dev = &dev;
            let completed = completed.clone();
            let started_tx = started_tx.clone();
            s.spawn(move || {
                let dbs = DivBufShared::from(vec![0u8; sectors2bytes(5)]);
                for j in 0..PER_THREAD {
                    let completed = completed.clone();
                    let completion = Completion::callback(move |r| {
                        assert!(r.is_ok() || r == Err(Error::Io(Errno::EIO)));
                        completed.fetch_add(1, Ordering::Relaxed);
                    });
                    let sector = ((i * PER_THREAD + j) % 100) as SectorT;
                    let payload = Payload::Write(dbs.try_const().unwrap());
                    dev.submit(Bio::new(sector, payload, completion));
                    if j == 0 {
                        started_tx.send(()).unwrap();
                    }
                }
            });
        }
        for _ in 0..SUBMITTERS {
            started_rx.recv().unwrap();
        }
        dev.shutdown();
        assert_eq!(dev.state(), EngineState::Stopped);
        assert!(!provider.get("a").unwrap().is_open());
    });
    assert_eq!(completed.load(Ordering::Relaxed), SUBMITTERS * PER_THREAD);
}

/// After shutdown, requests fail promptly
#[rstest]
fn after_shutdown(
    #[values(DispatchMode::Inline, DispatchMode::Queued)] mode: DispatchMode)
{
    let provider = MemProvider::with_disks(["a", "b"], 64, 16);
    let rt = basic_runtime();
    let dev = t!(RaidDevice::activate(&params(mode), &provider));
    dev.shutdown();
    dev.shutdown();
    let dbs = DivBufShared::from(vec![0u8; 512]);
    let r = rt.block_on(dev.read_at(dbs.try_mut().unwrap(), 0));
    assert_eq!(r, Err(Error::Io(Errno::EIO)));
    assert_eq!(dev.status().state, EngineState::Stopped);
}
