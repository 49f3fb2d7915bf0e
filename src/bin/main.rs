use std::net::Ipv4Addr;

use boom_rs::{
    api::{cluster::BoomCluster, config::BoomConfig},
    LocalIdentity, MembershipEvent, Result, DEFAULT_LISTEN_PORT,
};
use tracing_subscriber::EnvFilter;

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_level(true)
        .init();

    let address: Ipv4Addr = env_or("BOOM_ADDRESS", "127.0.0.1").parse()?;
    let port: u16 = env_or("BOOM_PORT", &DEFAULT_LISTEN_PORT.to_string()).parse()?;
    let identity = LocalIdentity::new(
        env_or("BOOM_NAME", "MySelf"),
        env_or("BOOM_HOSTNAME", "localhost"),
        address,
    )
    .with_port(port);

    let cluster = BoomCluster::try_new(identity, BoomConfig::default()).await?;
    let mut rx = cluster.subscribe();
    cluster.run().await;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = rx.recv() => match event {
                Ok(MembershipEvent::MemberJoined(e)) => tracing::info!("{} joined", e.member),
                Ok(MembershipEvent::MemberFailed(e)) => tracing::info!("{} failed", e.member),
                Ok(_) => {}
                Err(e) => tracing::debug!("event stream: {}", e),
            }
        }
    }

    let notified = cluster.leave().await;
    tracing::info!("[{}] said goodbye to {} members", cluster.addr(), notified);

    Ok(())
}
