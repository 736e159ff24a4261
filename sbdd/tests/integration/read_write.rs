// vim: tw=80
use std::{fs, path::PathBuf};

use assert_cmd::prelude::*;
use nix::fcntl::{Flock, FlockArg};
use predicates::prelude::*;
use rstest::{fixture, rstest};
use tempfile::{Builder, TempDir};

use super::sbdd;

/// Backing files for a two-disk device
type Harness = (TempDir, String);

#[fixture]
fn harness() -> Harness {
    let tempdir = Builder::new()
        .prefix(concat!(module_path!(), "."))
        .tempdir()
        .unwrap();
    let paths = (0..2).map(|i| {
        let path = tempdir.path().join(format!("disk{i}"));
        let file = fs::File::create(&path).unwrap();
        file.set_len(1 << 20).unwrap();
        path.display().to_string()
    }).collect::<Vec<_>>();
    let config = format!("stripe=4;disks={}", paths.join(","));
    (tempdir, config)
}

/// Data written in one invocation can be read back in another
#[rstest]
fn roundtrip(harness: Harness) {
    let (tempdir, config) = harness;
    let input: PathBuf = tempdir.path().join("input");
    fs::write(&input, b"Hello, striped world").unwrap();

    sbdd()
        .args(["--raid-config", &config, "--mode", "queued"])
        .args(["write", "--sector", "6", "--input"])
        .arg(&input)
        .assert()
        .success()
        .stdout(predicate::str::contains("wrote 1 sectors at sector 6"));

    sbdd()
        .args(["--raid-config", &config])
        .args(["read", "--sector", "6", "--count", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Hello, striped w"));
}

/// A write spanning chunks lands on both member files
#[rstest]
fn striped(harness: Harness) {
    let (tempdir, config) = harness;
    let input = tempdir.path().join("input");
    fs::write(&input, vec![0xa5u8; 16 * 512]).unwrap();

    sbdd()
        .args(["--raid-config", &config])
        .args(["write", "--sector", "0", "--input"])
        .arg(&input)
        .assert()
        .success();

    for i in 0..2 {
        let data = fs::read(tempdir.path().join(format!("disk{i}"))).unwrap();
        assert!(data[..8 * 512].iter().all(|b| *b == 0xa5));
        assert!(data[8 * 512..16 * 512].iter().all(|b| *b == 0));
    }
}

/// Reads larger than the transfer limit are issued in pieces
#[rstest]
fn large_read(harness: Harness) {
    let (_tempdir, config) = harness;
    sbdd()
        .args(["--raid-config", &config, "--max-transfer", "8"])
        .args(["read", "--sector", "0", "--count", "40"])
        .assert()
        .success();
}

/// A second device can't open disks that are already in use
#[rstest]
fn exclusive(harness: Harness) {
    let (_tempdir, config) = harness;
    let disk0 = config.trim_start_matches("stripe=4;disks=")
        .split(',')
        .next()
        .unwrap()
        .to_owned();
    let _lock = nix_flock(&disk0);
    sbdd()
        .args(["--raid-config", &config, "info"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("EBUSY")
            .or(predicate::str::contains("EWOULDBLOCK")));
}

/// Hold an exclusive lock on `path`, the same way a running device would
fn nix_flock(path: &str) -> Flock<fs::File> {
    let file = fs::OpenOptions::new()
        .read(true)
        .write(true)
        .open(path)
        .unwrap();
    Flock::lock(file, FlockArg::LockExclusiveNonblock).unwrap()
}

/// Ranges that wrap around the sector space are refused, not attempted
#[rstest]
fn overflow(harness: Harness) {
    let (_tempdir, config) = harness;
    sbdd()
        .args(["--raid-config", &config])
        .args(["read", "--sector", "18446744073709551615", "--count", "2"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("overflows"));
}
