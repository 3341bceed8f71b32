//! `nl-bridge mdb` command implementation.

use std::net::IpAddr;

use clap::{Args, Subcommand};
use nlcache::netlink::{Cache, Error, GroupAddr, Mdb, MdbEntry, NetlinkSocket, NlObject, Result};

use super::{OutputOptions, dev_name, fmt_error};

#[derive(Args)]
pub struct MdbCmd {
    #[command(subcommand)]
    command: Option<MdbCommand>,
}

#[derive(Subcommand)]
enum MdbCommand {
    /// Show multicast group entries
    #[command(visible_alias = "list", visible_alias = "ls")]
    Show {
        /// Bridge device (optional, shows all if omitted)
        #[arg(long)]
        dev: Option<String>,
    },
    /// Add a port to a multicast group
    Add(MdbEntryArgs),
    /// Remove a port from a multicast group
    #[command(visible_alias = "delete")]
    Del(MdbEntryArgs),
}

#[derive(Args)]
struct MdbEntryArgs {
    /// Bridge device
    #[arg(long)]
    dev: String,

    /// Port device
    #[arg(long)]
    port: String,

    /// Group address (IPv4, IPv6 or MAC)
    #[arg(long)]
    grp: String,

    /// VLAN the group belongs to
    #[arg(long)]
    vid: Option<u16>,

    /// Keep the entry until deleted instead of letting it age out
    #[arg(long)]
    permanent: bool,
}

impl MdbCmd {
    pub fn run(self, opts: &OutputOptions) -> Result<()> {
        match self.command {
            None => show_mdb(None, opts),
            Some(MdbCommand::Show { dev }) => show_mdb(dev, opts),
            Some(MdbCommand::Add(args)) => {
                let (bridge, entry) = args.entry()?;
                let mut sock = NetlinkSocket::new()?;
                Mdb::add(&mut sock, bridge, &entry, 0)
            }
            Some(MdbCommand::Del(args)) => {
                let (bridge, entry) = args.entry()?;
                let mut sock = NetlinkSocket::new()?;
                Mdb::delete(&mut sock, bridge, &entry)
            }
        }
    }
}

impl MdbEntryArgs {
    /// Bridge index and the entry to send.
    fn entry(&self) -> Result<(u32, MdbEntry)> {
        let bridge = nlcache::util::resolve(&self.dev)?;
        let port = nlcache::util::resolve(&self.port)?;
        let mut entry = MdbEntry::new(port, parse_group(&self.grp)?);
        if let Some(vid) = self.vid {
            entry = entry.with_vid(vid);
        }
        if self.permanent {
            entry = entry.permanent();
        }
        Ok((bridge, entry))
    }
}

/// Parse an IP group address or a MAC address.
fn parse_group(s: &str) -> Result<GroupAddr> {
    if let Ok(ip) = s.parse::<IpAddr>() {
        return Ok(match ip {
            IpAddr::V4(a) => GroupAddr::V4(a),
            IpAddr::V6(a) => GroupAddr::V6(a),
        });
    }

    let invalid = || Error::InvalidMessage(format!("invalid group address: {}", s));
    let mut mac = [0u8; 6];
    let mut parts = s.split(':');
    for byte in mac.iter_mut() {
        let part = parts.next().ok_or_else(invalid)?;
        *byte = u8::from_str_radix(part, 16).map_err(|_| invalid())?;
    }
    if parts.next().is_some() {
        return Err(invalid());
    }
    Ok(GroupAddr::L2(mac))
}

fn show_mdb(dev: Option<String>, opts: &OutputOptions) -> Result<()> {
    let filter = dev.as_deref().map(nlcache::util::resolve).transpose()?;

    let mut sock = NetlinkSocket::new()?;
    let cache = Cache::<Mdb>::alloc_and_fill(&mut sock)?;
    let names = opts.names();

    let bridges: Vec<_> = cache
        .iter()
        .filter(|m| filter.is_none() || m.ifindex() == filter)
        .collect();

    if opts.json {
        let json: Vec<serde_json::Value> = bridges
            .iter()
            .map(|m| {
                let ifindex = m.ifindex().unwrap_or(0);
                let groups: Vec<serde_json::Value> = m
                    .entries()
                    .iter()
                    .map(|e| {
                        serde_json::json!({
                            "port": dev_name(&names, e.ifindex),
                            "grp": e.addr,
                            "vid": e.vid,
                            "state": if e.is_permanent() { "permanent" } else { "temp" },
                            "timer": e.timer,
                        })
                    })
                    .collect();
                let routers: Vec<String> = m
                    .router_ports()
                    .iter()
                    .map(|&p| dev_name(&names, p))
                    .collect();
                serde_json::json!({
                    "dev": dev_name(&names, ifindex),
                    "groups": groups,
                    "router_ports": routers,
                })
            })
            .collect();
        return opts.print_json(&serde_json::Value::Array(json));
    }

    let mut out = String::new();
    {
        let mut params = opts.params(&mut out, &names);
        for mdb in &bridges {
            mdb.dump(&mut params).map_err(fmt_error)?;
            std::fmt::Write::write_char(&mut params, '\n').map_err(fmt_error)?;
        }
    }
    print!("{}", out);
    Ok(())
}
