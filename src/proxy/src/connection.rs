use std::sync::Arc;

use chaos::{ChaosEngine, ChunkCarry};
use log::{debug, info, warn};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::net::TcpStream;
use tokio::sync::broadcast;

const CHUNK_SIZE: usize = 4096;

/// Accept connections on `local_addr` and proxy each to `backend_addr`.
pub async fn run_listener(
    local_addr: String,
    backend_addr: String,
    backend_port: u16,
    engine: Arc<ChaosEngine>,
) -> std::io::Result<()> {
    let listener = TcpListener::bind(&local_addr).await?;
    info!("proxy listening on {} for backend {}", local_addr, backend_addr);

    loop {
        match listener.accept().await {
            Ok((client, peer_addr)) => {
                let backend_addr = backend_addr.clone();
                let engine = engine.clone();

                tokio::spawn(async move {
                    let result =
                        proxy_connection(client, backend_addr, backend_port, engine).await;

                    if let Err(e) = result {
                        debug!("connection from {} closed: {}", peer_addr, e);
                    } else {
                        debug!("connection from {} closed", peer_addr);
                    }
                });
            }
            Err(e) => {
                warn!("failed to accept connection: {}", e);
            }
        }
    }
}

/// Pump bytes both ways between a client and its backend node.
///
/// The client->server leg is where classification and injection happen;
/// the server->client leg forwards unmodified. A crash decision closes
/// both halves mid-exchange, which the 2PC engine sees as a partition.
async fn proxy_connection(
    client: TcpStream,
    backend_addr: String,
    backend_port: u16,
    engine: Arc<ChaosEngine>,
) -> std::io::Result<()> {
    let server = TcpStream::connect(&backend_addr).await?;

    let (mut client_read, mut client_write) = client.into_split();
    let (mut server_read, mut server_write) = server.into_split();

    let (teardown_tx, mut upstream_teardown) = broadcast::channel::<()>(1);
    let mut downstream_teardown = teardown_tx.subscribe();
    let upstream_tx = teardown_tx.clone();

    let upstream = tokio::spawn(async move {
        let mut carry = ChunkCarry::default();
        let mut buf = vec![0u8; CHUNK_SIZE];

        loop {
            let n = tokio::select! {
                read = client_read.read(&mut buf) => match read {
                    Ok(0) => break,
                    Ok(n) => n,
                    Err(_) => break,
                },
                _ = upstream_teardown.recv() => break,
            };

            // decide outside the trackers' critical sections, sleep here
            let decision = engine.observe_chunk(backend_port, &buf[..n], &mut carry);
            if !decision.delay.is_zero() {
                tokio::time::sleep(decision.delay).await;
            }

            if decision.crash {
                info!(
                    "simulated crash: dropping connection to backend port {}",
                    backend_port
                );
                let _ = server_write.shutdown().await;
                let _ = upstream_tx.send(());
                return;
            }

            if server_write.write_all(&buf[..n]).await.is_err() {
                break;
            }
        }

        // client finished sending; half-close toward the backend and let
        // the response drain on the other leg
        let _ = server_write.shutdown().await;
    });

    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        tokio::select! {
            read = server_read.read(&mut buf) => match read {
                Ok(0) => break,
                Ok(n) => {
                    if client_write.write_all(&buf[..n]).await.is_err() {
                        break;
                    }
                }
                Err(_) => break,
            },
            _ = downstream_teardown.recv() => break,
        }
    }

    let _ = client_write.shutdown().await;
    let _ = teardown_tx.send(());
    let _ = upstream.await;

    Ok(())
}
