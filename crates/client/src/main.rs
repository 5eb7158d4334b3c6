//! QG FURIOSO realtime listener
//!
//! Connects to the backend named by `FURIOSO_BASE_URL`, binds the socket to
//! the session in `FURIOSO_SESSION_COOKIE` and logs every notification until
//! interrupted.

#[cfg(not(target_arch = "wasm32"))]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    use furioso_client::{NotificationFeed, WsClient, WsConfig};

    furioso_client::logging::init("furioso_client=info");

    let config = WsConfig::from_env();
    let client = WsClient::new(config);
    let feed = NotificationFeed::with_toasts(|n| {
        furioso_client::log_info!("[{}] {}: {}", n.kind, n.title, n.message);
    });
    feed.attach(client.events());

    client.connect().await?;
    if let Err(e) = client.authenticate().await {
        furioso_client::log_warn!("Continuing unauthenticated: {}", e);
    }

    tokio::signal::ctrl_c().await?;
    client.disconnect();
    furioso_client::log_info!(
        "Received {} notifications ({} unread)",
        feed.len(),
        feed.unread_count()
    );
    Ok(())
}

#[cfg(target_arch = "wasm32")]
fn main() {}
