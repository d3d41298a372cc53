//! Graphviz export of the path tree for offline inspection.
//!
//! Nodes carry their success/drop totals; edges are the observed
//! transitions. Tree positions sharing a token name are merged into one
//! graph node with aggregated counts, which keeps the rendered graph
//! readable.

use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use crate::pathtree::TreeSnapshot;

pub fn write_dot<P, F>(path: P, snapshot: &TreeSnapshot, name_of: F) -> io::Result<()>
where
    P: AsRef<Path>,
    F: Fn(u32) -> String,
{
    let file = File::create(path)?;
    let mut out = BufWriter::new(file);

    writeln!(out, "digraph visited {{")?;
    writeln!(out, "\tbgcolor=white;")?;

    // aggregate counts per token name
    let mut totals: HashMap<String, (u64, u64)> = HashMap::new();
    let mut order: Vec<String> = Vec::new();
    for node in &snapshot.nodes {
        let name = name_of(node.token);
        let entry = totals.entry(name.clone()).or_insert_with(|| {
            order.push(name);
            (0, 0)
        });
        entry.0 += node.success;
        entry.1 += node.drop;
    }

    for name in &order {
        let (success, drop) = totals[name];
        writeln!(
            out,
            "\t\"{}\" [fontname=\"Arial\",label=\"{} \\n success:{} \\n drop:{}\"];",
            name, name, success, drop
        )?;
    }

    let mut seen: HashSet<(String, String)> = HashSet::new();
    for (from, to) in &snapshot.edges {
        let from_name = name_of(snapshot.nodes[*from].token);
        let to_name = name_of(snapshot.nodes[*to].token);
        if seen.insert((from_name.clone(), to_name.clone())) {
            writeln!(
                out,
                "\t\"{}\" -> \"{}\" [fontname=\"Arial-Italic\",fontsize=8];",
                from_name, to_name
            )?;
        }
    }

    writeln!(out, "}}")?;
    out.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pathtree::PathTree;

    #[test]
    fn test_dot_output_shape() {
        let mut tree = PathTree::new();
        tree.observe("t1", 1, true, false);
        tree.observe("t1", 2, true, true);

        let names = ["root", "24001,/vote", "24001,/apply"];
        let path = std::env::temp_dir().join("pact_graph_test.gv");
        write_dot(&path, &tree.snapshot(), |t| {
            names[t as usize].to_string()
        })
        .unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("digraph visited {"));
        assert!(text.contains("\"24001,/vote\" -> \"24001,/apply\""));
        assert!(text.contains("success:"));
        let _ = std::fs::remove_file(&path);
    }
}
