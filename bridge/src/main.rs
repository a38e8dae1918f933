mod appliance;
mod bridge;
mod cli;
mod host;
mod myair;
mod scheduler;
mod transport;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    host::run().await
}
