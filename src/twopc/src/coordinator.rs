use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use log::{debug, info, warn};

use crate::config::{NodeConfig, RETRY_STEP_MS};
use crate::error::CoordinatorError;
use crate::types::{TransactionId, TRID_FIELD};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(4);

/// Drives one client write through vote/commit/apply across all
/// configured peer nodes, or aborts everywhere on failure.
///
/// Broadcasts go out sequentially in fixed node order. Vote and commit
/// get a single attempt per peer and stop at the first failure; apply
/// and abort are retried per peer up to the configured ceiling, because
/// an already-decided outcome must eventually land everywhere.
pub struct Coordinator {
    config: NodeConfig,
    client: reqwest::Client,
    next_txn: AtomicI64,
}

impl Coordinator {
    pub fn new(config: NodeConfig) -> Result<Self, CoordinatorError> {
        let client = reqwest::Client::builder()
            .connect_timeout(REQUEST_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Coordinator {
            config,
            client,
            next_txn: AtomicI64::new(0),
        })
    }

    /// Allocate the next transaction id for this node.
    fn allocate(&self) -> TransactionId {
        let counter = self.next_txn.fetch_add(1, Ordering::SeqCst);
        TransactionId::pack(counter, self.config.port)
    }

    /// Outgoing payload = client fields plus the reserved trid field.
    fn build_payload(
        fields: &HashMap<String, String>,
        trid: TransactionId,
    ) -> HashMap<String, String> {
        let mut payload = fields.clone();
        payload.insert(TRID_FIELD.to_string(), trid.wire());
        payload
    }

    /// Run one client write through the full 2PC exchange.
    pub async fn write(&self, fields: HashMap<String, String>) -> Result<(), CoordinatorError> {
        let trid = self.allocate();
        info!("transaction create {}", trid);

        let payload = Self::build_payload(&fields, trid);

        info!("vote broadcast start for {}", trid);
        if !self.broadcast("/vote", &payload, false).await {
            warn!("vote broadcast failed for {}", trid);
            self.broadcast("/abort", &payload, true).await;
            warn!("abort sent for {}", trid);
            return Err(CoordinatorError::VoteRejected);
        }
        info!("vote broadcast complete for {}", trid);

        info!("commit broadcast start for {}", trid);
        if !self.broadcast("/commit", &payload, false).await {
            warn!("commit broadcast failed for {}", trid);
            self.broadcast("/abort", &payload, true).await;
            warn!("abort sent for {}", trid);
            return Err(CoordinatorError::CommitRejected);
        }
        info!("commit broadcast complete for {}", trid);

        info!("apply broadcast start for {}", trid);
        if !self.broadcast("/apply", &payload, true).await {
            // the decision is committed; report failure but never exit
            warn!("apply broadcast incomplete for {}", trid);
            return Err(CoordinatorError::ApplyIncomplete);
        }
        info!("apply broadcast complete for {}", trid);

        Ok(())
    }

    /// Send `command` to every node in fixed order, stopping at the
    /// first peer that cannot be satisfied under the retry policy.
    async fn broadcast(
        &self,
        command: &str,
        payload: &HashMap<String, String>,
        retry_to_ceiling: bool,
    ) -> bool {
        for port in &self.config.nodes {
            if !self
                .put_to_node(*port, command, payload, retry_to_ceiling)
                .await
            {
                warn!("broadcast {} stopped at port {}", command, port);
                return false;
            }
        }
        true
    }

    async fn put_to_node(
        &self,
        port: u16,
        command: &str,
        payload: &HashMap<String, String>,
        retry_to_ceiling: bool,
    ) -> bool {
        let url = format!("http://{}:{}{}", self.config.host, port, command);

        let mut attempt: u32 = 0;
        loop {
            match self.client.put(&url).json(payload).send().await {
                Ok(resp) if resp.status() == reqwest::StatusCode::OK => return true,
                Ok(resp) => debug!("{} returned {} for {}", url, resp.status(), command),
                Err(e) => debug!("{} request failed: {}", url, e),
            }

            if !retry_to_ceiling || attempt >= self.config.max_full_retry {
                return false;
            }
            attempt += 1;
            warn!("retry {} for {} on port {}", attempt, command, port);
            tokio::time::sleep(Duration::from_millis(RETRY_STEP_MS * attempt as u64)).await;
        }
    }
}
