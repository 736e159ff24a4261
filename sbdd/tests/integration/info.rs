// vim: tw=80
use assert_cmd::prelude::*;
use predicates::prelude::*;
use rstest::rstest;

use super::sbdd;

#[rstest]
#[case::inline("inline")]
#[case::queued("queued")]
fn mem(#[case] mode: &str) {
    sbdd()
        .args(["--raid-config", "stripe=4;disks=a,b,c", "--mem", "1000"])
        .args(["--mode", mode])
        .arg("info")
        .assert()
        .success()
        .stdout(predicate::str::contains("capacity: 3000"))
        .stdout(predicate::str::contains("chunk_sectors: 8"))
        .stdout(predicate::str::contains(format!("mode: {}",
            if mode == "inline" { "Inline" } else { "Queued" })))
        .stdout(predicate::str::contains("label: c"));
}

#[test]
fn bad_config() {
    sbdd()
        .args(["--raid-config", "stripe=0;disks=a", "--mem", "1000", "info"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("InvalidArgument"));
}

#[test]
fn bad_mode() {
    sbdd()
        .args(["--raid-config", "stripe=4;disks=a", "--mode", "threaded"])
        .arg("info")
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown mode"));
}

#[test]
fn missing_disk() {
    sbdd()
        .args(["--raid-config", "stripe=4;disks=/nonexistent/sbdd/disk"])
        .arg("info")
        .assert()
        .failure()
        .stderr(predicate::str::contains("DeviceOpen"));
}

#[test]
fn raid_type() {
    sbdd()
        .args(["--raid-type", "1", "--raid-config", "stripe=4;disks=a"])
        .args(["--mem", "100", "info"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unsupported"));
}
