use std::path::PathBuf;
use std::sync::Mutex;

use log::{debug, warn};

use crate::classify::{ChunkCarry, Classification, SequenceClassifier};
use crate::freq::{FrequencyTable, DEFAULT_DEPTH};
use crate::graph;
use crate::inject::{Decision, DelayCrashInjector, Strategy};
use crate::pathtree::PathTree;

/// How many path-tree observations between graph exports.
pub const EXPORT_EVERY: u64 = 100;

/// Shared per-proxy-process fault-injection state.
///
/// One engine instance is constructor-injected into every proxied
/// connection. Each tracker sits behind its own mutex; the critical
/// sections are in-memory map work only, and sleeping or socket I/O
/// happens strictly outside them.
pub struct ChaosEngine {
    classifier: Mutex<SequenceClassifier>,
    freq: Mutex<FrequencyTable>,
    tree: Mutex<PathTree>,
    injector: DelayCrashInjector,
    graph_path: PathBuf,
}

impl ChaosEngine {
    pub fn new(
        strategy: Strategy,
        time_limit_ms: u64,
        crash_percent: u64,
        graph_path: PathBuf,
    ) -> Self {
        ChaosEngine {
            classifier: Mutex::new(SequenceClassifier::new()),
            freq: Mutex::new(FrequencyTable::new(DEFAULT_DEPTH)),
            tree: Mutex::new(PathTree::new()),
            injector: DelayCrashInjector::new(strategy, time_limit_ms, crash_percent),
            graph_path,
        }
    }

    pub fn strategy(&self) -> Strategy {
        self.injector.strategy()
    }

    /// Classify one client->server chunk, update the trackers and decide
    /// what to inject. The caller performs the sleep and any teardown.
    pub fn observe_chunk(
        &self,
        backend_port: u16,
        chunk: &[u8],
        carry: &mut ChunkCarry,
    ) -> Decision {
        let (classification, alphabet) = {
            let mut classifier = self.classifier.lock().unwrap();
            let classification = classifier.classify(backend_port, chunk, carry);
            (classification, classifier.alphabet_len())
        };

        let decision = match &classification {
            Classification::Unknown => self.injector.decide(0),
            Classification::Blackbox { token } => {
                let novelty = self.freq.lock().unwrap().observe(*token, alphabet);
                self.injector.decide(novelty)
            }
            Classification::Request {
                token,
                trid,
                terminal,
                ..
            } => {
                let novelty = self.freq.lock().unwrap().observe(*token, alphabet);

                // the path tree tracks every attributable request; its
                // score drives the delay only in tree strategy
                let repeat = trid.as_ref().map(|trid| {
                    self.tree
                        .lock()
                        .unwrap()
                        .observe(trid, *token, true, *terminal)
                });

                let score = match (self.injector.strategy(), repeat) {
                    (Strategy::Tree, Some(repeat)) => repeat,
                    _ => novelty,
                };
                let decision = self.injector.decide(score);

                if decision.crash {
                    if let Some(trid) = trid {
                        self.tree.lock().unwrap().mark_failed(trid);
                    }
                }
                decision
            }
        };

        self.maybe_export();

        if !decision.delay.is_zero() || decision.crash {
            debug!(
                "chunk on port {} -> delay {:?} crash {}",
                backend_port, decision.delay, decision.crash
            );
        }
        decision
    }

    /// Periodically dump the path tree as a Graphviz file. The snapshot
    /// is taken under the lock, the file write happens outside it.
    fn maybe_export(&self) {
        let snapshot = {
            let tree = self.tree.lock().unwrap();
            if tree.observations() == 0 || tree.observations() % EXPORT_EVERY != 0 {
                return;
            }
            tree.snapshot()
        };
        let names = self.classifier.lock().unwrap().token_names();

        let resolve = |token: u32| {
            names
                .get(token as usize)
                .cloned()
                .unwrap_or_else(|| format!("token-{}", token))
        };
        if let Err(e) = graph::write_dot(&self.graph_path, &snapshot, resolve) {
            warn!(
                "cannot write path graph to {}: {}",
                self.graph_path.display(),
                e
            );
        }
    }
}
