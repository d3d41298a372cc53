mod config;
mod connection;

use std::env;
use std::sync::Arc;

use chaos::ChaosEngine;
use log::{error, info};
use logger::logger;

use config::{print_usage, ProxyConfig};

#[tokio::main]
async fn main() {
    logger::setup_logging();

    let args: Vec<String> = env::args().skip(1).collect();
    let config = match ProxyConfig::parse(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            print_usage();
            std::process::exit(1);
        }
    };

    info!(
        "starting chaos proxy: strategy {}, delay bound {}ms, crash {}%",
        config.strategy, config.time_limit_ms, config.crash_percent
    );

    let engine = Arc::new(ChaosEngine::new(
        config.strategy,
        config.time_limit_ms,
        config.crash_percent,
        config.graph_file.clone().into(),
    ));

    let mut handles = Vec::new();
    for mapping in &config.mappings {
        for host in &config.hosts {
            let local_addr = format!("{}:{}", host, mapping.local);
            let backend_addr = format!("{}:{}", host, mapping.remote);
            let backend_port = mapping.remote;
            let engine = engine.clone();

            handles.push(tokio::spawn(async move {
                if let Err(e) =
                    connection::run_listener(local_addr.clone(), backend_addr, backend_port, engine)
                        .await
                {
                    error!("listener on {} failed: {}", local_addr, e);
                }
            }));
        }
    }

    for handle in handles {
        let _ = handle.await;
    }
}
