// vim: tw=80
use assert_cmd::prelude::*;
use predicates::prelude::*;
use rstest::rstest;

use super::sbdd;

#[rstest]
#[case(0, "disk: 0", "target: 0")]
#[case(8, "disk: 1", "target: 0")]
#[case(16, "disk: 0", "target: 8")]
#[case(23, "disk: 0", "target: 15")]
fn two_disks(#[case] sector: u64, #[case] disk: &str, #[case] target: &str) {
    sbdd()
        .args(["--raid-config", "stripe=4;disks=a,b", "--mem", "64"])
        .args(["map", "--sector", &sector.to_string()])
        .assert()
        .success()
        .stdout(predicate::str::contains(disk))
        .stdout(predicate::str::contains(target));
}

#[test]
fn past_end() {
    sbdd()
        .args(["--raid-config", "stripe=4;disks=a,b", "--mem", "64"])
        .args(["map", "--sector", "128"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("past the end"));
}
