//! Rewrites a pattern tree into a flat set of option-free alternatives.
//!
//! Each brace group is distributed over its surrounding sequence, taking
//! the Cartesian product with any sibling groups. Ranges are left as
//! ranges. The flat set is what the matcher regex, `union`, and the
//! list-tree planner consume.

use crate::ast::{push_merged, Ast, Sequence};

/// Expands every options node in `seq`, producing the full set of
/// alternative sequences.
pub(crate) fn flatten(seq: &Sequence) -> Vec<Sequence> {
    let Some(index) = seq
        .nodes
        .iter()
        .position(|node| matches!(node, Ast::Options(_)))
    else {
        return vec![seq.clone()];
    };
    let Ast::Options(alternatives) = &seq.nodes[index] else {
        unreachable!("position found an options node");
    };

    // Splice each alternative in place of the group, then recurse for any
    // remaining (or nested) groups. Splicing goes through `push_merged` so
    // literal runs meeting at the splice boundaries fuse; otherwise two
    // alternatives rendering the same text (`{ab,a}{,b}` produces `ab`
    // twice) would not be structurally equal, and the planner's
    // sequence-keyed child map would split them.
    let mut results = Vec::new();
    for alternative in alternatives {
        let mut nodes = Vec::with_capacity(seq.nodes.len() + alternative.nodes.len());
        let spliced = seq.nodes[..index]
            .iter()
            .chain(&alternative.nodes)
            .chain(&seq.nodes[index + 1..]);
        for node in spliced {
            push_merged(&mut nodes, node.clone());
        }
        results.extend(flatten(&Sequence::new(nodes)));
    }
    results
}
