//! `nl-bridge monitor` - follow VLAN and MDB changes.
//!
//! Each selected cache is added to a [`CacheManager`] by registry name and
//! driven by the tokio reactor; every applied event prints one line.

use std::time::{SystemTime, UNIX_EPOCH};

use clap::{Args, ValueEnum};
use nlcache::netlink::{
    Action, AsyncCacheManager, CacheManager, CacheRegistry, DumpObject, DumpParams, Result,
};
use tokio_stream::StreamExt;

use super::OutputOptions;

/// Objects that can be monitored.
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum Object {
    /// Per-port VLAN membership.
    Vlan,
    /// Multicast group database.
    Mdb,
    /// Everything above.
    All,
}

impl Object {
    fn cache_names(self) -> &'static [&'static str] {
        match self {
            Object::Vlan => &["route/bridgevlan"],
            Object::Mdb => &["route/mdb"],
            Object::All => &["route/bridgevlan", "route/mdb"],
        }
    }
}

#[derive(Args)]
pub struct MonitorCmd {
    /// Objects to monitor.
    #[arg(default_value = "all")]
    objects: Vec<Object>,

    /// Label output lines with event timestamps.
    #[arg(short = 't', long)]
    timestamp: bool,
}

impl MonitorCmd {
    /// Registry names of the selected caches, deduplicated, in order.
    fn cache_names(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = Vec::new();
        for name in self.objects.iter().flat_map(|o| o.cache_names()) {
            if !names.contains(name) {
                names.push(*name);
            }
        }
        names
    }

    pub async fn run(&self, opts: &OutputOptions) -> Result<()> {
        let registry = CacheRegistry::with_defaults();
        let mut mngr = CacheManager::new()?;

        for name in self.cache_names() {
            let printer = EventPrinter {
                opts: *opts,
                timestamp: self.timestamp,
                names: opts.names(),
            };
            mngr.add_by_name(&registry, name, move |obj, action| printer.print(obj, action))?;
        }

        if !opts.json {
            eprintln!("Monitoring {} (Ctrl+C to stop)...", self.cache_names().join(", "));
        }

        let mut mngr = AsyncCacheManager::new(mngr)?;
        let mut updates = mngr.updates();
        while let Some(applied) = updates.try_next().await? {
            tracing::trace!(applied, "events applied");
        }
        Ok(())
    }
}

struct EventPrinter {
    opts: OutputOptions,
    timestamp: bool,
    names: std::collections::HashMap<u32, String>,
}

impl EventPrinter {
    fn print(&self, obj: &dyn DumpObject, action: Action) {
        let mut line = String::new();
        let mut params = DumpParams::new(&mut line)
            .dump_type(self.opts.dump_type())
            .names(&self.names);
        if obj.dump_to(&mut params).is_err() {
            tracing::warn!(cache = obj.type_name(), "failed to format object");
            return;
        }

        let stamp = self.timestamp.then(now);
        if self.opts.json {
            let value = serde_json::json!({
                "timestamp": stamp,
                "action": action.as_str(),
                "type": obj.type_name(),
                "object": line,
            });
            println!("{}", value);
            return;
        }

        match stamp {
            Some(t) => println!("[{t}] {action} {} {line}", obj.type_name()),
            None => println!("{action} {} {line}", obj.type_name()),
        }
    }
}

/// Wall clock time as `seconds.millis`.
fn now() -> String {
    let elapsed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    format!("{}.{:03}", elapsed.as_secs(), elapsed.subsec_millis())
}
