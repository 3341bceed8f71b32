//! nl-bridge - bridge VLAN and multicast database utility
//!
//! Shows and changes per-port VLAN membership and multicast group entries,
//! and watches both caches for kernel notifications.

mod commands;

use clap::{Parser, Subcommand};
use nlcache::Result;

use commands::mdb::MdbCmd;
use commands::monitor::MonitorCmd;
use commands::vlan::VlanCmd;
use commands::OutputOptions;

#[derive(Parser)]
#[command(name = "nl-bridge")]
#[command(about = "Bridge VLAN and multicast database utility", long_about = None)]
#[command(version)]
struct Cli {
    /// Output JSON
    #[arg(short = 'j', long, global = true)]
    json: bool,

    /// Pretty print JSON
    #[arg(short = 'p', long, global = true)]
    pretty: bool,

    /// Show details
    #[arg(short = 'd', long, global = true)]
    details: bool,

    /// Print interface indexes instead of names
    #[arg(short = 'n', long, global = true)]
    numeric: bool,

    /// Log library activity to stderr
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Manage VLAN filtering
    Vlan(VlanCmd),

    /// Manage multicast group database entries
    Mdb(MdbCmd),

    /// Watch VLAN and MDB changes
    Monitor(MonitorCmd),
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let opts = OutputOptions {
        json: cli.json,
        pretty: cli.pretty,
        details: cli.details,
        numeric: cli.numeric,
    };

    match cli.command {
        Command::Vlan(cmd) => cmd.run(&opts),
        Command::Mdb(cmd) => cmd.run(&opts),
        Command::Monitor(cmd) => cmd.run(&opts).await,
    }
}
