//! CLI argument parsing tests for nl-bridge.
//!
//! These only exercise argument handling; nothing here opens a netlink
//! socket or needs privileges.

use assert_cmd::Command;
use predicates::prelude::*;

fn bridge_cmd() -> Command {
    Command::new(env!("CARGO_BIN_EXE_nl-bridge"))
}

mod global_flags {
    use super::*;

    #[test]
    fn test_help() {
        bridge_cmd()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("Bridge VLAN and multicast database utility"));
    }

    #[test]
    fn test_version() {
        bridge_cmd()
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("nl-bridge"));
    }

    #[test]
    fn test_invalid_subcommand() {
        bridge_cmd()
            .arg("fdb")
            .assert()
            .failure()
            .stderr(predicate::str::contains("error"));
    }
}

mod vlan_command {
    use super::*;

    #[test]
    fn test_vlan_help() {
        bridge_cmd()
            .args(["vlan", "--help"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Manage VLAN filtering"));
    }

    #[test]
    fn test_vlan_add_requires_dev() {
        bridge_cmd()
            .args(["vlan", "add", "--vid", "100"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("--dev"));
    }

    #[test]
    fn test_vlan_add_rejects_bad_vid() {
        bridge_cmd()
            .args(["vlan", "add", "--vid", "5000", "--dev", "1"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("VLAN ID must be 1-4094"));
    }

    #[test]
    fn test_vlan_set_pvid_is_numeric() {
        bridge_cmd()
            .args(["vlan", "set", "--pvid", "abc", "--dev", "eth0"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("invalid value"));
    }
}

mod mdb_command {
    use super::*;

    #[test]
    fn test_mdb_help() {
        bridge_cmd()
            .args(["mdb", "--help"])
            .assert()
            .success()
            .stdout(predicate::str::contains("multicast"));
    }

    #[test]
    fn test_mdb_add_requires_group() {
        bridge_cmd()
            .args(["mdb", "add", "--dev", "br0", "--port", "eth0"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("--grp"));
    }

    #[test]
    fn test_mdb_add_rejects_bad_group() {
        bridge_cmd()
            .args(["mdb", "add", "--dev", "1", "--port", "2", "--grp", "nonsense"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("invalid group address"));
    }
}

mod monitor_command {
    use super::*;

    #[test]
    fn test_monitor_help() {
        bridge_cmd()
            .args(["monitor", "--help"])
            .assert()
            .success()
            .stdout(predicate::str::contains("vlan"));
    }

    #[test]
    fn test_monitor_rejects_unknown_object() {
        bridge_cmd()
            .args(["monitor", "link"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("invalid value"));
    }
}
