//! The list tree: a directory-descent plan compiled from a glob.
//!
//! Each flattened alternative is split into `/` segments and routed into a
//! tree of nodes, one per directory level, keyed by the segment's
//! structural identity so alternatives sharing a prefix share one subtree.
//! Listing then visits only directories that can possibly contain matches:
//! literal-only levels are entered by direct descent without enumeration,
//! a `**` turns the node into a single recursive enumeration with a
//! terminal filter, and everything else enumerates one level and filters
//! by compiled per-segment patterns.

use std::collections::HashMap;

use regex::Regex;
use tracing::debug;

use crate::ast::{alternatives_to_regex, join_segments, Sequence};
use crate::style::PathStyle;

/// Root key used for alternatives that do not start at an absolute root.
pub(crate) const RELATIVE_ROOT: &str = ".";

/// A directory-descent plan, one node tree per filesystem root.
#[derive(Debug)]
pub(crate) struct ListTree {
    pub roots: Vec<(String, ListTreeNode)>,
    /// Whether two descent paths may yield the same entity, requiring the
    /// walker to deduplicate.
    pub can_overlap: bool,
}

/// One directory level of the plan.
#[derive(Debug)]
pub(crate) struct ListTreeNode {
    /// Children keyed by segment pattern; `None` marks a recursive node,
    /// which enumerates its directory in one recursive pass instead.
    pub children: Option<Vec<Child>>,
    /// Alternatives to test against paths relative to this node's
    /// directory (basenames for non-recursive nodes).
    pub validator: Option<Validator>,
}

/// A child edge: the segment pattern compiled for basename matching, plus
/// its literal text when the segment is literal-only.
#[derive(Debug)]
pub(crate) struct Child {
    pub literal: Option<String>,
    pub regex: Regex,
    pub node: ListTreeNode,
}

/// A compiled set of validator alternatives.
#[derive(Debug)]
pub(crate) struct Validator {
    regex: Regex,
}

impl Validator {
    pub fn is_match(&self, relative: &str) -> bool {
        self.regex.is_match(relative)
    }
}

impl ListTreeNode {
    pub fn is_recursive(&self) -> bool {
        self.children.is_none()
    }

    /// A node entered by direct descent: nothing to validate here and
    /// every child is a plain literal segment.
    pub fn is_intermediate(&self) -> bool {
        self.validator.is_none()
            && self
                .children
                .as_ref()
                .is_some_and(|children| children.iter().all(|c| c.literal.is_some()))
    }

    fn overlaps(&self, case_sensitive: bool) -> bool {
        let Some(children) = &self.children else {
            // A recursive node is one enumeration plus one filter.
            return false;
        };
        if children.len() > 1
            && (!case_sensitive || children.iter().any(|c| c.literal.is_none()))
        {
            return true;
        }
        children.iter().any(|c| c.node.overlaps(case_sensitive))
    }
}

impl ListTree {
    /// Builds the plan for a set of flattened alternatives.
    pub fn build(
        alternatives: &[Sequence],
        style: PathStyle,
        case_sensitive: bool,
    ) -> ListTree {
        let mut roots: Vec<(String, NodeBuilder)> = Vec::new();
        for alternative in alternatives {
            let mut segments = alternative.split_segments();
            let root_key = match alternative.leading_root() {
                Some(root) => {
                    segments.remove(0);
                    root
                }
                None => RELATIVE_ROOT.to_string(),
            };
            let index = match roots.iter().position(|(key, _)| *key == root_key) {
                Some(index) => index,
                None => {
                    roots.push((root_key, NodeBuilder::new()));
                    roots.len() - 1
                }
            };
            add_alternative(&mut roots[index].1, &segments);
        }

        let has_relative = roots.iter().any(|(key, _)| key == RELATIVE_ROOT);
        let has_absolute = roots.iter().any(|(key, _)| key != RELATIVE_ROOT);
        let roots: Vec<(String, ListTreeNode)> = roots
            .into_iter()
            .map(|(key, builder)| (key, builder.finalize(style, case_sensitive)))
            .collect();
        let can_overlap = (has_relative && has_absolute)
            || roots.iter().any(|(_, node)| node.overlaps(case_sensitive));
        debug!(
            roots = roots.len(),
            can_overlap, "compiled glob into a list tree"
        );
        ListTree {
            roots,
            can_overlap,
        }
    }
}

fn add_alternative(node: &mut NodeBuilder, segments: &[Sequence]) {
    let Some((segment, rest)) = segments.split_first() else {
        return;
    };
    // Below a recursive node there is nothing to descend into; the
    // remaining segments become one validator alternative instead.
    if node.is_recursive() || segment.has_double_star() {
        node.make_recursive();
        node.add_validator(join_segments(segments));
        return;
    }
    if rest.is_empty() {
        node.add_validator(segment.clone());
        return;
    }
    let child = node
        .children
        .as_mut()
        .expect("non-recursive node has children")
        .entry(segment.clone())
        .or_insert_with(NodeBuilder::new);
    add_alternative(child, rest);
}

/// Mutable build-time node; finalized into a [`ListTreeNode`] with
/// compiled regexes once every alternative is routed.
struct NodeBuilder {
    children: Option<HashMap<Sequence, NodeBuilder>>,
    validator: Vec<Sequence>,
}

impl NodeBuilder {
    fn new() -> NodeBuilder {
        NodeBuilder {
            children: Some(HashMap::new()),
            validator: Vec::new(),
        }
    }

    fn is_recursive(&self) -> bool {
        self.children.is_none()
    }

    fn add_validator(&mut self, alternative: Sequence) {
        if !self.validator.contains(&alternative) {
            self.validator.push(alternative);
        }
    }

    /// Turns this node recursive, folding every child into the validator
    /// (the child's key joined with the child's own folded validator) so
    /// alternatives routed earlier keep matching.
    fn make_recursive(&mut self) {
        let Some(children) = self.children.take() else {
            return;
        };
        for (key, mut child) in children {
            child.make_recursive();
            for alternative in child.validator {
                self.add_validator(join_segments(&[key.clone(), alternative]));
            }
        }
    }

    fn finalize(self, style: PathStyle, case_sensitive: bool) -> ListTreeNode {
        let validator = if self.validator.is_empty() {
            None
        } else {
            let source = alternatives_to_regex(&self.validator, style, case_sensitive);
            Some(Validator {
                regex: Regex::new(&source).expect("generated validator regex must be valid"),
            })
        };
        let children = self.children.map(|children| {
            children
                .into_iter()
                .map(|(key, child)| {
                    let source =
                        alternatives_to_regex(std::slice::from_ref(&key), style, case_sensitive);
                    Child {
                        literal: key.as_literal(),
                        regex: Regex::new(&source)
                            .expect("generated segment regex must be valid"),
                        node: child.finalize(style, case_sensitive),
                    }
                })
                .collect()
        });
        ListTreeNode {
            children,
            validator,
        }
    }
}
