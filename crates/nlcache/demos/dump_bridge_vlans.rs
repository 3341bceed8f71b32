//! Bridge VLAN Dump Example
//!
//! Fills a bridge VLAN cache from the kernel and prints every port with
//! its VLANs, one sub-record per line.
//!
//! Run: cargo run -p nlcache --example dump_bridge_vlans

use nlcache::netlink::{BridgeVlan, Cache, DumpParams, DumpType, NetlinkSocket};

fn main() -> nlcache::Result<()> {
    let mut sock = NetlinkSocket::new()?;
    let cache = Cache::<BridgeVlan>::alloc_and_fill(&mut sock)?;

    println!("=== Bridge VLANs ===\n");

    if cache.is_empty() {
        println!("No bridge ports with VLAN filtering found.\n");
        println!("Create one with:");
        println!("  sudo ip link add br0 type bridge vlan_filtering 1");
        println!("  sudo ip link set eth1 master br0");
        return Ok(());
    }

    let names = nlcache::util::interface_names().unwrap_or_default();
    let mut out = String::new();
    let mut params = DumpParams::new(&mut out)
        .dump_type(DumpType::Details)
        .names(&names);
    if cache.dump(&mut params).is_err() {
        eprintln!("failed to format cache");
    }
    print!("{}", out);

    // Per-port access goes through shared handles.
    for port in &cache {
        let pvid = port.entries().iter().find(|e| e.is_pvid());
        if let (Some(ifindex), Some(pvid)) = (port.ifindex(), pvid) {
            println!("ifindex {} pvid {}", ifindex, pvid.vlan_id);
        }
    }

    Ok(())
}
