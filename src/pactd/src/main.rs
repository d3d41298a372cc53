use std::sync::Arc;

use logger::logger;
use server::{Metrics, NodeServer};
use twopc::{Coordinator, NodeConfig, ParticipantStateMachine};

// Use jemalloc as the global allocator for better memory efficiency
// jemalloc reduces memory fragmentation significantly compared to the system allocator
// Used by Redis, Firefox, and other high-performance systems
#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[tokio::main]
async fn main() {
    logger::setup_logging();

    let ascii_logo = r#"
   ___  ___   ___  ______
  / _ \/ _ | / __\/_  __/
 / ___/ __ |/ /__  / /
/_/  /_/ |_|\___/ /_/
-----------------------------------------------
Distributed two-phase-commit key-value store
-----------------------------------------------
    "#;

    println!("{}", ascii_logo);

    let config = NodeConfig::from_env();
    println!("Starting two-phase commit node on port: {}", config.port);

    let participant = Arc::new(ParticipantStateMachine::new(config.max_retry));
    let coordinator = match Coordinator::new(config.clone()) {
        Ok(c) => Arc::new(c),
        Err(e) => {
            eprintln!("Failed to initialize coordinator: {}", e);
            std::process::exit(1);
        }
    };
    let metrics = Arc::new(Metrics::new());

    let node = NodeServer::new(config, participant, coordinator, metrics);
    if let Err(e) = node.run().await {
        eprintln!("Server error: {}", e);
        std::process::exit(1);
    }
}
