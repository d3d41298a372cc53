use std::collections::HashMap;

use crate::token::NONE_TOKEN;

/// One tree position, identified by (parent, token).
///
/// `hist` maps a final (success, fail) tally to the number of
/// transactions that left this position with that tally.
#[derive(Debug)]
struct PathNode {
    token: u32,
    children: HashMap<u32, usize>,
    hist: HashMap<(u64, u64), u64>,
}

impl PathNode {
    fn new(token: u32) -> Self {
        PathNode {
            token,
            children: HashMap::new(),
            hist: HashMap::new(),
        }
    }

    /// Transactions that left here without a single failure.
    fn success_total(&self) -> u64 {
        self.hist
            .iter()
            .filter(|((_, f), _)| *f == 0)
            .map(|(_, count)| count)
            .sum()
    }

    /// Transactions that left here with at least one failure.
    fn drop_total(&self) -> u64 {
        self.hist
            .iter()
            .filter(|((_, f), _)| *f > 0)
            .map(|(_, count)| count)
            .sum()
    }
}

/// Live position of one in-flight transaction.
#[derive(Debug, Clone)]
struct Cursor {
    node: usize,
    success: u64,
    fail: u64,
}

/// Exported shape of the tree for offline inspection.
#[derive(Debug, Clone)]
pub struct TreeSnapshot {
    pub nodes: Vec<SnapshotNode>,
    /// Edges as (parent index, child index) into `nodes`.
    pub edges: Vec<(usize, usize)>,
}

#[derive(Debug, Clone)]
pub struct SnapshotNode {
    pub token: u32,
    pub success: u64,
    pub drop: u64,
}

/// Per-transaction state-path tracker.
///
/// Each transaction walks the tree one token at a time. Repeating the
/// same token at the same position accumulates into the cursor's live
/// success/fail counters; moving to a new token commits the tally into
/// the departed node's histogram and descends. The returned repeat score
/// is the histogram count of the current tally, i.e. how many earlier
/// transactions sat at this exact position with this exact outcome
/// profile.
#[derive(Debug)]
pub struct PathTree {
    nodes: Vec<PathNode>,
    cursors: HashMap<String, Cursor>,
    observations: u64,
}

impl PathTree {
    pub fn new() -> Self {
        PathTree {
            nodes: vec![PathNode::new(NONE_TOKEN)],
            cursors: HashMap::new(),
            observations: 0,
        }
    }

    fn child_of(&mut self, parent: usize, token: u32) -> usize {
        if let Some(&idx) = self.nodes[parent].children.get(&token) {
            return idx;
        }
        let idx = self.nodes.len();
        self.nodes.push(PathNode::new(token));
        self.nodes[parent].children.insert(token, idx);
        idx
    }

    /// Advance `trid` by one observed token and return its repeat score.
    ///
    /// `terminal` marks the protocol's finishing operations: the final
    /// tally is committed and the cursor is discarded, freeing the
    /// per-transaction state.
    pub fn observe(&mut self, trid: &str, token: u32, success: bool, terminal: bool) -> u64 {
        self.observations += 1;
        let step_success = success as u64;
        let step_fail = !success as u64;

        let cursor = match self.cursors.remove(trid) {
            Some(mut cursor) if self.nodes[cursor.node].token == token => {
                cursor.success += step_success;
                cursor.fail += step_fail;
                cursor
            }
            Some(cursor) => {
                let tally = (cursor.success, cursor.fail);
                *self.nodes[cursor.node].hist.entry(tally).or_insert(0) += 1;
                let next = self.child_of(cursor.node, token);
                Cursor {
                    node: next,
                    success: step_success,
                    fail: step_fail,
                }
            }
            None => {
                let next = self.child_of(0, token);
                Cursor {
                    node: next,
                    success: step_success,
                    fail: step_fail,
                }
            }
        };

        let score = self.nodes[cursor.node]
            .hist
            .get(&(cursor.success, cursor.fail))
            .copied()
            .unwrap_or(0);

        if terminal {
            let tally = (cursor.success, cursor.fail);
            *self.nodes[cursor.node].hist.entry(tally).or_insert(0) += 1;
        } else {
            self.cursors.insert(trid.to_string(), cursor);
        }

        score
    }

    /// Turn the most recent optimistic success into a failure.
    ///
    /// Used when a crash is injected after scoring: the step was counted
    /// as a normal exchange before the decision was known.
    pub fn mark_failed(&mut self, trid: &str) {
        if let Some(cursor) = self.cursors.get_mut(trid) {
            if cursor.success > 0 {
                cursor.success -= 1;
                cursor.fail += 1;
            }
        }
    }

    pub fn observations(&self) -> u64 {
        self.observations
    }

    pub fn live_transactions(&self) -> usize {
        self.cursors.len()
    }

    pub fn snapshot(&self) -> TreeSnapshot {
        let nodes = self
            .nodes
            .iter()
            .map(|n| SnapshotNode {
                token: n.token,
                success: n.success_total(),
                drop: n.drop_total(),
            })
            .collect();

        let mut edges = Vec::new();
        for (idx, node) in self.nodes.iter().enumerate() {
            for &child in node.children.values() {
                edges.push((idx, child));
            }
        }

        TreeSnapshot { nodes, edges }
    }
}

impl Default for PathTree {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repeat_score_is_monotone() {
        let mut tree = PathTree::new();

        // ten transactions walk the identical path with identical
        // outcomes; each must score at least as high as the previous
        let mut last = 0;
        for i in 0..10 {
            let trid = format!("t{}", i);
            tree.observe(&trid, 1, true, false);
            tree.observe(&trid, 2, true, false);
            let score = tree.observe(&trid, 3, true, true);
            assert!(score >= last, "score regressed at transaction {}", i);
            last = score;
        }
        assert!(last > 0);
    }

    #[test]
    fn test_same_token_accumulates_in_place() {
        let mut tree = PathTree::new();

        tree.observe("t1", 5, true, false);
        tree.observe("t1", 5, true, false);
        tree.observe("t1", 5, false, false);
        // one live transaction, still parked on a single node
        assert_eq!(tree.live_transactions(), 1);
        assert_eq!(tree.snapshot().nodes.len(), 2);
    }

    #[test]
    fn test_terminal_discards_cursor() {
        let mut tree = PathTree::new();

        tree.observe("t1", 1, true, false);
        tree.observe("t1", 2, true, true);
        assert_eq!(tree.live_transactions(), 0);

        // the same trid starts over from the root afterwards
        tree.observe("t1", 1, true, false);
        assert_eq!(tree.live_transactions(), 1);
    }

    #[test]
    fn test_step_change_commits_tally() {
        let mut tree = PathTree::new();

        tree.observe("t1", 1, true, false);
        tree.observe("t1", 1, true, false);
        tree.observe("t1", 2, true, true);

        // the first node's histogram holds the committed (2, 0) tally
        let snap = tree.snapshot();
        let first = snap.nodes.iter().find(|n| n.token == 1).unwrap();
        assert_eq!(first.success, 1);
        assert_eq!(first.drop, 0);
    }

    #[test]
    fn test_mark_failed_flips_live_counter() {
        let mut tree = PathTree::new();

        tree.observe("t1", 1, true, false);
        tree.mark_failed("t1");
        tree.observe("t1", 2, true, true);

        let snap = tree.snapshot();
        let first = snap.nodes.iter().find(|n| n.token == 1).unwrap();
        assert_eq!(first.success, 0);
        assert_eq!(first.drop, 1);
    }

    #[test]
    fn test_snapshot_edges_follow_paths() {
        let mut tree = PathTree::new();

        tree.observe("t1", 1, true, false);
        tree.observe("t1", 2, true, true);
        tree.observe("t2", 1, true, false);
        tree.observe("t2", 3, true, true);

        let snap = tree.snapshot();
        // root -> 1, 1 -> 2, 1 -> 3
        assert_eq!(snap.edges.len(), 3);
        assert_eq!(snap.nodes.len(), 4);
    }
}
