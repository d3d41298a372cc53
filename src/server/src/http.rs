//! HTTP surface of a PACT node.
//!
//! Exposes:
//! - GET  /2pc     - full store snapshot as JSON
//! - PUT  /2pc     - coordinator write (vote/commit/apply across peers)
//! - PUT  /vote    - participant lock acquisition
//! - PUT  /commit  - participant pending-log write
//! - PUT  /apply   - participant store merge
//! - PUT  /abort   - participant lock/log cleanup
//! - GET  /health  - liveness check
//! - GET  /metrics - Prometheus-format metrics

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use log::{debug, error, info};
use tokio::net::TcpListener;

use twopc::{Coordinator, CoordinatorError, NodeConfig, ParticipantStateMachine, TransactionId, TRID_FIELD};

use crate::error::ServerError;
use crate::metrics::Metrics;

/// Node HTTP server
pub struct NodeServer {
    config: NodeConfig,
    participant: Arc<ParticipantStateMachine>,
    coordinator: Arc<Coordinator>,
    metrics: Arc<Metrics>,
}

impl NodeServer {
    pub fn new(
        config: NodeConfig,
        participant: Arc<ParticipantStateMachine>,
        coordinator: Arc<Coordinator>,
        metrics: Arc<Metrics>,
    ) -> Self {
        NodeServer {
            config,
            participant,
            coordinator,
            metrics,
        }
    }

    /// Start serving; runs until the listener fails.
    pub async fn run(self) -> Result<(), ServerError> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr).await?;

        info!("two-phase commit node listening on http://{}", addr);

        let participant = self.participant;
        let coordinator = self.coordinator;
        let metrics = self.metrics;

        loop {
            let (stream, remote_addr) = match listener.accept().await {
                Ok(conn) => conn,
                Err(e) => {
                    error!("Failed to accept HTTP connection: {}", e);
                    continue;
                }
            };

            let io = TokioIo::new(stream);
            let participant = participant.clone();
            let coordinator = coordinator.clone();
            let metrics = metrics.clone();

            tokio::spawn(async move {
                let service = service_fn(move |req| {
                    let participant = participant.clone();
                    let coordinator = coordinator.clone();
                    let metrics = metrics.clone();
                    async move { handle_request(req, participant, coordinator, metrics).await }
                });

                if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                    debug!("HTTP connection error from {}: {}", remote_addr, e);
                }
            });
        }
    }
}

async fn handle_request(
    req: Request<Incoming>,
    participant: Arc<ParticipantStateMachine>,
    coordinator: Arc<Coordinator>,
    metrics: Arc<Metrics>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let (parts, body) = req.into_parts();

    let response = match (&parts.method, parts.uri.path()) {
        (&Method::GET, "/2pc") => {
            let snapshot = participant.snapshot().await;
            match serde_json::to_string(&snapshot) {
                Ok(json) => json_response(StatusCode::OK, json),
                Err(e) => {
                    error!("cannot serialize store snapshot: {}", e);
                    json_response(StatusCode::OK, "{}".to_string())
                }
            }
        }
        (&Method::PUT, "/2pc") => {
            metrics.total_writes.fetch_add(1, Ordering::SeqCst);
            match read_fields(body).await {
                Some(fields) => match coordinator.write(fields).await {
                    Ok(()) => empty_response(StatusCode::OK),
                    Err(CoordinatorError::Client(e)) => {
                        error!("unexpected coordinator failure: {}", e);
                        empty_response(StatusCode::INTERNAL_SERVER_ERROR)
                    }
                    Err(_) => empty_response(StatusCode::NOT_MODIFIED),
                },
                None => empty_response(StatusCode::INTERNAL_SERVER_ERROR),
            }
        }
        (&Method::PUT, "/vote") => {
            metrics.total_votes.fetch_add(1, Ordering::SeqCst);
            match read_transaction(body).await {
                Some((trid, _)) => match participant.vote(trid).await {
                    Ok(()) => empty_response(StatusCode::OK),
                    Err(_) => {
                        metrics.rejected_votes.fetch_add(1, Ordering::SeqCst);
                        empty_response(StatusCode::NOT_MODIFIED)
                    }
                },
                None => empty_response(StatusCode::INTERNAL_SERVER_ERROR),
            }
        }
        (&Method::PUT, "/commit") => {
            metrics.total_commits.fetch_add(1, Ordering::SeqCst);
            match read_transaction(body).await {
                Some((trid, payload)) => match participant.commit(trid, payload).await {
                    Ok(()) => empty_response(StatusCode::OK),
                    Err(_) => empty_response(StatusCode::NOT_MODIFIED),
                },
                None => empty_response(StatusCode::INTERNAL_SERVER_ERROR),
            }
        }
        (&Method::PUT, "/apply") => {
            metrics.total_applies.fetch_add(1, Ordering::SeqCst);
            match read_transaction(body).await {
                Some((trid, payload)) => match participant.apply(trid, payload).await {
                    Ok(()) => empty_response(StatusCode::OK),
                    Err(_) => empty_response(StatusCode::NOT_MODIFIED),
                },
                None => empty_response(StatusCode::INTERNAL_SERVER_ERROR),
            }
        }
        (&Method::PUT, "/abort") => {
            metrics.total_aborts.fetch_add(1, Ordering::SeqCst);
            match read_transaction(body).await {
                Some((trid, _)) => {
                    participant.abort(trid).await;
                    empty_response(StatusCode::OK)
                }
                None => empty_response(StatusCode::INTERNAL_SERVER_ERROR),
            }
        }
        (&Method::GET, "/health") => text_response(StatusCode::OK, "Up, testing".to_string()),
        (&Method::GET, "/metrics") => {
            let keys = participant.keys_count().await;
            text_response(StatusCode::OK, metrics.to_prometheus(keys))
        }
        _ => json_response(StatusCode::NOT_FOUND, r#"{"error":"not found"}"#.to_string()),
    };

    Ok(response)
}

/// Read and parse a flat JSON body of string fields.
async fn read_fields(body: Incoming) -> Option<HashMap<String, String>> {
    let bytes = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            error!("failed to read request body: {}", e);
            return None;
        }
    };
    match serde_json::from_slice(&bytes) {
        Ok(fields) => Some(fields),
        Err(e) => {
            error!("failed to parse request body: {}", e);
            None
        }
    }
}

/// Read a body and extract its transaction id.
async fn read_transaction(body: Incoming) -> Option<(TransactionId, HashMap<String, String>)> {
    let fields = read_fields(body).await?;
    let trid = match fields.get(TRID_FIELD).and_then(|s| TransactionId::parse(s)) {
        Some(trid) => trid,
        None => {
            error!("request body is missing a usable {} field", TRID_FIELD);
            return None;
        }
    };
    Some((trid, fields))
}

fn empty_response(status: StatusCode) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .body(Full::new(Bytes::new()))
        .unwrap()
}

fn json_response(status: StatusCode, body: String) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .body(Full::new(Bytes::from(body)))
        .unwrap()
}

fn text_response(status: StatusCode, body: String) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .header("Content-Type", "text/plain")
        .body(Full::new(Bytes::from(body)))
        .unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    async fn http_get(addr: &str, path: &str) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(format!("GET {} HTTP/1.0\r\nHost: test\r\n\r\n", path).as_bytes())
            .await
            .unwrap();
        let mut buf = Vec::new();
        stream.read_to_end(&mut buf).await.unwrap();
        String::from_utf8_lossy(&buf).to_string()
    }

    #[tokio::test]
    async fn test_write_round_trip_over_http() {
        let config = NodeConfig {
            port: 24951,
            host: "127.0.0.1".to_string(),
            nodes: vec![24951],
            max_retry: 3,
            max_full_retry: 5,
        };
        let participant = Arc::new(ParticipantStateMachine::new(config.max_retry));
        let coordinator = Arc::new(Coordinator::new(config.clone()).unwrap());
        let metrics = Arc::new(Metrics::new());

        let server = NodeServer::new(
            config,
            participant.clone(),
            coordinator.clone(),
            metrics,
        );
        tokio::spawn(server.run());
        tokio::time::sleep(Duration::from_millis(200)).await;

        let mut fields = HashMap::new();
        fields.insert("a".to_string(), "1".to_string());
        coordinator.write(fields).await.unwrap();

        // the write went through vote/commit/apply on this node's participant
        let store = participant.snapshot().await;
        assert_eq!(store.get("a").map(String::as_str), Some("1"));
        assert!(store.contains_key(TRID_FIELD));

        let health = http_get("127.0.0.1:24951", "/health").await;
        assert!(health.contains("200"));
        assert!(health.contains("Up, testing"));

        let snapshot = http_get("127.0.0.1:24951", "/2pc").await;
        assert!(snapshot.contains("\"a\":\"1\""));

        let metrics_text = http_get("127.0.0.1:24951", "/metrics").await;
        assert!(metrics_text.contains("pact_operations_total{type=\"vote\"} 1"));
    }
}
