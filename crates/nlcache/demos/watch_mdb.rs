//! Multicast Database Watch Example
//!
//! Keeps an MDB cache live through the tokio driver and prints every
//! group change the kernel reports.
//!
//! Run: cargo run -p nlcache --features tokio --example watch_mdb
//!
//! Then, in another terminal:
//!   sudo bridge mdb add dev br0 port eth1 grp 239.0.1.13 permanent

use nlcache::netlink::{AsyncCacheManager, CacheManager, Mdb};
use tokio_stream::StreamExt;

#[tokio::main(flavor = "current_thread")]
async fn main() -> nlcache::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut mngr = CacheManager::new()?;
    mngr.add::<Mdb, _>(|cache, mdb, action| {
        println!(
            "{} bridge {:?}: {} groups ({} bridges cached)",
            action,
            mdb.ifindex(),
            mdb.entries().len(),
            cache.len()
        );
        for entry in mdb.entries() {
            println!("    port {} grp {} vid {}", entry.ifindex, entry.addr, entry.vid);
        }
    })?;

    let initial = mngr.cache::<Mdb>()?.len();
    println!("Watching multicast groups ({} bridges cached, Ctrl+C to stop)...", initial);

    let mut mngr = AsyncCacheManager::new(mngr)?;
    let mut updates = mngr.updates();
    while let Some(applied) = updates.try_next().await? {
        tracing::debug!(applied, "events applied");
    }

    Ok(())
}
