//! palisaded - workload-policy enforcement daemon.

use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    palisade_daemon::run().await
}
