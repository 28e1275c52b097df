// src/main.rs

use osmium::node::config::Config;
use osmium::node::runner::Node;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let config = Config::load();
    let node = Node::new(config)?;

    // Runs the gossip service forever; the process lives until killed.
    node.run().await;
    Ok(())
}
