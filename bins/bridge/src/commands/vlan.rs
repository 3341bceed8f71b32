//! `nl-bridge vlan` command implementation.

use clap::{Args, Subcommand};
use nlcache::netlink::types::bridge::bridge_vlan_flags;
use nlcache::netlink::{BridgeVlan, BridgeVlanEntry, Cache, Error, NetlinkSocket, NlObject, Result};

use super::{OutputOptions, dev_name, fmt_error};

#[derive(Args)]
pub struct VlanCmd {
    #[command(subcommand)]
    command: Option<VlanCommand>,
}

#[derive(Subcommand)]
enum VlanCommand {
    /// Show VLAN configuration
    #[command(visible_alias = "list", visible_alias = "ls")]
    Show {
        /// Port device (optional, shows all if omitted)
        #[arg(long)]
        dev: Option<String>,
    },
    /// Add VLAN to a port
    Add(VlanAddArgs),
    /// Delete VLAN from a port
    #[command(visible_alias = "delete")]
    Del(VlanDelArgs),
    /// Set PVID for a port
    Set(VlanSetArgs),
}

#[derive(Args)]
struct VlanAddArgs {
    /// VLAN ID (1-4094) or range (e.g., 100-110)
    #[arg(long)]
    vid: String,

    /// Port device
    #[arg(long)]
    dev: String,

    /// Set as PVID (native VLAN)
    #[arg(long)]
    pvid: bool,

    /// Egress untagged
    #[arg(long)]
    untagged: bool,
}

#[derive(Args)]
struct VlanDelArgs {
    /// VLAN ID or range (e.g., 100 or 100-110)
    #[arg(long)]
    vid: String,

    /// Port device
    #[arg(long)]
    dev: String,
}

#[derive(Args)]
struct VlanSetArgs {
    /// PVID to set
    #[arg(long)]
    pvid: u16,

    /// Port device
    #[arg(long)]
    dev: String,
}

impl VlanCmd {
    pub fn run(self, opts: &OutputOptions) -> Result<()> {
        match self.command {
            None => show_vlans(None, opts),
            Some(VlanCommand::Show { dev }) => show_vlans(dev, opts),
            Some(VlanCommand::Add(args)) => add_vlan(args),
            Some(VlanCommand::Del(args)) => del_vlan(args),
            Some(VlanCommand::Set(args)) => set_pvid(args),
        }
    }
}

/// Parse a VLAN ID or range string (e.g., "100" or "100-110").
fn parse_vid_range(s: &str) -> Result<(u16, Option<u16>)> {
    let parse_one = |v: &str| -> Result<u16> {
        let vid: u16 = v
            .trim()
            .parse()
            .map_err(|_| Error::InvalidMessage(format!("invalid VLAN ID: {}", v)))?;
        if vid == 0 || vid > 4094 {
            return Err(Error::InvalidMessage("VLAN ID must be 1-4094".into()));
        }
        Ok(vid)
    };

    match s.split_once('-') {
        Some((start, end)) => {
            let (start, end) = (parse_one(start)?, parse_one(end)?);
            if start > end {
                return Err(Error::InvalidMessage(
                    "VLAN range start must be <= end".into(),
                ));
            }
            Ok((start, Some(end)))
        }
        None => Ok((parse_one(s)?, None)),
    }
}

/// The object naming port `dev`, as the original side of a change.
fn port(dev: &str) -> Result<BridgeVlan> {
    let mut orig = BridgeVlan::new();
    orig.set_ifindex(nlcache::util::resolve(dev)?);
    Ok(orig)
}

fn changes_for(vid: &str, flags: u16) -> Result<BridgeVlan> {
    let (start, end) = parse_vid_range(vid)?;
    let mut entry = BridgeVlanEntry::new(start).with_flags(flags);
    if let Some(end) = end.filter(|&e| e > start) {
        entry = entry.with_range(end);
    }
    let mut changes = BridgeVlan::new();
    changes.add_entry(entry);
    Ok(changes)
}

fn show_vlans(dev: Option<String>, opts: &OutputOptions) -> Result<()> {
    let filter = dev.as_deref().map(nlcache::util::resolve).transpose()?;

    let mut sock = NetlinkSocket::new()?;
    let cache = Cache::<BridgeVlan>::alloc_and_fill(&mut sock)?;
    let names = opts.names();

    let ports: Vec<_> = cache
        .iter()
        .filter(|v| filter.is_none() || v.ifindex() == filter)
        .collect();

    if opts.json {
        let json: Vec<serde_json::Value> = ports
            .iter()
            .map(|v| {
                let ifindex = v.ifindex().unwrap_or(0);
                serde_json::json!({
                    "ifindex": ifindex,
                    "dev": dev_name(&names, ifindex),
                    "vlans": v.entries(),
                })
            })
            .collect();
        return opts.print_json(&serde_json::Value::Array(json));
    }

    let mut out = String::new();
    {
        let mut params = opts.params(&mut out, &names);
        for vlan in &ports {
            vlan.dump(&mut params).map_err(fmt_error)?;
            std::fmt::Write::write_char(&mut params, '\n').map_err(fmt_error)?;
        }
    }
    print!("{}", out);
    Ok(())
}

fn add_vlan(args: VlanAddArgs) -> Result<()> {
    let mut flags = 0;
    if args.pvid {
        flags |= bridge_vlan_flags::PVID;
    }
    if args.untagged {
        flags |= bridge_vlan_flags::UNTAGGED;
    }

    let changes = changes_for(&args.vid, flags)?;
    let mut sock = NetlinkSocket::new()?;
    BridgeVlan::change(&mut sock, &port(&args.dev)?, &changes, 0)
}

fn del_vlan(args: VlanDelArgs) -> Result<()> {
    let changes = changes_for(&args.vid, 0)?;
    let mut sock = NetlinkSocket::new()?;
    BridgeVlan::delete(&mut sock, &port(&args.dev)?, &changes)
}

fn set_pvid(args: VlanSetArgs) -> Result<()> {
    let changes = changes_for(&args.pvid.to_string(), bridge_vlan_flags::PVID)?;
    let mut sock = NetlinkSocket::new()?;
    BridgeVlan::change(&mut sock, &port(&args.dev)?, &changes, 0)
}
