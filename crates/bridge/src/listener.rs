use std::{sync::Arc, time::Duration};

use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::{channel::SkillChannel, link::DeviceLink};

/// Accepts controller connections and attaches each one to `link`, replacing
/// the previous connection. Runs until accepting fails.
pub async fn serve_bridge(
    listener: TcpListener,
    link: Arc<DeviceLink>,
    call_timeout: Duration,
) -> std::io::Result<()> {
    info!(
        device = %link.name(),
        addr = %listener.local_addr()?,
        "skill bridge listening"
    );
    loop {
        let (stream, peer) = listener.accept().await?;
        if let Err(error) = stream.set_nodelay(true) {
            warn!(%peer, %error, "failed to set TCP_NODELAY");
        }
        info!(device = %link.name(), %peer, "controller connected");
        let (reader, writer) = stream.into_split();
        SkillChannel::open(
            peer.to_string(),
            Arc::clone(&link),
            reader,
            writer,
            call_timeout,
        )
        .await;
    }
}
