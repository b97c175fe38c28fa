//! The compiled pattern tree and its translation to a regular expression.
//!
//! Nodes are plain tagged variants with structural equality and hashing;
//! the list-tree planner keys child nodes by [`Sequence`] so structurally
//! identical segments share one subtree.
//!
//! Matching compiles a set of flattened alternatives into a single
//! anchored regex. `*` and `?` never cross a separator, character classes
//! exclude the separator from their resolved set, and `**` is written as a
//! `/`-joined repetition of segments that are anything but `..`, so an
//! unresolved `..` segment never matches.

use crate::style::{encode_url_literal, PathStyle};

/// One element of a character class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClassItem {
    Char(char),
    Range(char, char),
}

/// A single node of a compiled pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum Ast {
    /// Literal text. The only literals containing `/` are absolute root
    /// prefixes consumed at parse time.
    Literal(String),
    /// `?` — exactly one non-separator character.
    AnyChar,
    /// `*` — zero or more non-separator characters.
    Star,
    /// `**` — zero or more whole segments; always alone in its segment.
    DoubleStar,
    /// `/`
    Separator,
    /// `[...]` — never matches a separator.
    Range { negated: bool, items: Vec<ClassItem> },
    /// `{a,b}` — matches when any alternative matches.
    Options(Vec<Sequence>),
}

/// An ordered run of pattern nodes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub(crate) struct Sequence {
    pub nodes: Vec<Ast>,
}

impl Sequence {
    pub fn new(nodes: Vec<Ast>) -> Sequence {
        Sequence { nodes }
    }

    /// The root prefix this sequence starts with, if any: either a root
    /// literal made by the parser (`/`, `C:/`, `//host/share/`,
    /// `scheme://authority/`) or a bare leading separator.
    pub fn leading_root(&self) -> Option<String> {
        match self.nodes.first() {
            Some(Ast::Literal(text)) if text.contains('/') => Some(text.clone()),
            Some(Ast::Separator) => Some("/".to_string()),
            _ => None,
        }
    }

    /// The literal text of this sequence, when every node is a literal.
    pub fn as_literal(&self) -> Option<String> {
        let mut text = String::new();
        for node in &self.nodes {
            match node {
                Ast::Literal(t) => text.push_str(t),
                _ => return None,
            }
        }
        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    }

    /// Whether any node (recursing into options) is a `**`.
    pub fn has_double_star(&self) -> bool {
        self.nodes.iter().any(|node| match node {
            Ast::DoubleStar => true,
            Ast::Options(alts) => alts.iter().any(Sequence::has_double_star),
            _ => false,
        })
    }

    /// Splits this sequence into `/`-separated segments. A leading root
    /// (root literal or bare separator) becomes its own segment containing
    /// a single literal; empty segments from repeated separators drop.
    pub fn split_segments(&self) -> Vec<Sequence> {
        let mut segments = Vec::new();
        let mut nodes = self.nodes.as_slice();
        if let Some(root) = self.leading_root() {
            segments.push(Sequence::new(vec![Ast::Literal(root)]));
            nodes = &nodes[1..];
        }
        let mut current: Vec<Ast> = Vec::new();
        for node in nodes {
            if matches!(node, Ast::Separator) {
                if !current.is_empty() {
                    segments.push(Sequence::new(std::mem::take(&mut current)));
                }
            } else {
                current.push(node.clone());
            }
        }
        if !current.is_empty() {
            segments.push(Sequence::new(current));
        }
        segments
    }
}

/// Pushes a node onto a sequence under construction, merging adjacent
/// literal runs. Structural equality and hashing compare node-by-node, so
/// every sequence must keep its literal runs canonical: two sequences that
/// render the same text must be built from the same nodes. Root literals
/// stay separate.
pub(crate) fn push_merged(nodes: &mut Vec<Ast>, node: Ast) {
    if let Ast::Literal(text) = &node {
        if let Some(Ast::Literal(prev)) = nodes.last_mut() {
            if !prev.contains('/') {
                prev.push_str(text);
                return;
            }
        }
    }
    nodes.push(node);
}

/// Joins segments back into one sequence with separators between them.
pub(crate) fn join_segments(segments: &[Sequence]) -> Sequence {
    let mut nodes = Vec::new();
    for (i, segment) in segments.iter().enumerate() {
        if i > 0 {
            nodes.push(Ast::Separator);
        }
        nodes.extend(segment.nodes.iter().cloned());
    }
    Sequence::new(nodes)
}

/// Regex for one path segment that is anything but `..`. Matching input is
/// normalized, so the only `..` segments left are unresolved leading ones,
/// which must not match.
const NOT_DOTDOT: &str = r"(?:[^/.][^/]*|\.[^/.][^/]*|\.\.[^/]+|\.)";

/// Writes the anchored regex matching any of `alternatives`.
pub(crate) fn alternatives_to_regex(
    alternatives: &[Sequence],
    style: PathStyle,
    case_sensitive: bool,
) -> String {
    let mut re = String::from("^(?:");
    for (i, alt) in alternatives.iter().enumerate() {
        if i > 0 {
            re.push('|');
        }
        sequence_to_regex(alt, style, case_sensitive, &mut re);
    }
    re.push_str(")$");
    re
}

fn sequence_to_regex(seq: &Sequence, style: PathStyle, case_sensitive: bool, re: &mut String) {
    let segments = seq.split_segments();
    let last = segments.len().saturating_sub(1);
    let mut need_sep = false;
    for (i, segment) in segments.iter().enumerate() {
        if let Some(root) = segment.leading_root() {
            push_literal(re, &root, style, case_sensitive);
            need_sep = false;
            continue;
        }
        if segment.nodes == [Ast::DoubleStar] {
            if i == last {
                if need_sep {
                    re.push_str("(?:/");
                    re.push_str(NOT_DOTDOT);
                    re.push_str(")*");
                } else {
                    re.push_str("(?:");
                    re.push_str(NOT_DOTDOT);
                    re.push_str("(?:/");
                    re.push_str(NOT_DOTDOT);
                    re.push_str(")*)?");
                }
            } else if need_sep {
                re.push_str("(?:/");
                re.push_str(NOT_DOTDOT);
                re.push_str(")*");
                // The following segment still writes its own `/`.
            } else {
                re.push_str("(?:");
                re.push_str(NOT_DOTDOT);
                re.push_str("/)*");
            }
            continue;
        }
        if need_sep {
            re.push('/');
        }
        for node in &segment.nodes {
            node_to_regex(node, style, case_sensitive, re);
        }
        need_sep = true;
    }
}

fn node_to_regex(node: &Ast, style: PathStyle, case_sensitive: bool, re: &mut String) {
    match node {
        Ast::Literal(text) => push_literal(re, text, style, case_sensitive),
        Ast::AnyChar => re.push_str("[^/]"),
        Ast::Star => re.push_str("[^/]*"),
        Ast::Range { negated, items } => push_class(re, *negated, items, case_sensitive),
        // Separators are consumed by segment splitting; `**` is handled at
        // the segment level; options are flattened before regex generation.
        Ast::Separator | Ast::DoubleStar | Ast::Options(_) => {
            unreachable!("segment atoms only")
        }
    }
}

fn push_literal(re: &mut String, text: &str, style: PathStyle, case_sensitive: bool) {
    let encoded;
    let text = if style == PathStyle::Url {
        encoded = encode_url_literal(text);
        &encoded
    } else {
        text
    };
    for c in text.chars() {
        if !case_sensitive && c.is_ascii_alphabetic() {
            re.push('[');
            re.push(c.to_ascii_lowercase());
            re.push(c.to_ascii_uppercase());
            re.push(']');
        } else {
            if c.is_ascii_punctuation() {
                re.push('\\');
            }
            re.push(c);
        }
    }
}

fn push_class(re: &mut String, negated: bool, items: &[ClassItem], case_sensitive: bool) {
    let mut ranges: Vec<(char, char)> = items
        .iter()
        .map(|item| match *item {
            ClassItem::Char(c) => (c, c),
            ClassItem::Range(lo, hi) => (lo, hi),
        })
        .collect();
    if !case_sensitive {
        fold_ascii_case(&mut ranges);
    }
    re.push('[');
    if negated {
        re.push('^');
        // A negated class additionally never matches the separator.
        re.push('/');
        for (lo, hi) in ranges {
            push_class_range(re, lo, hi);
        }
    } else {
        // A positive class excludes the separator from its resolved set.
        for (lo, hi) in ranges {
            if lo <= '/' && '/' <= hi {
                if lo < '/' {
                    push_class_range(re, lo, '.');
                }
                if '/' < hi {
                    push_class_range(re, '0', hi);
                }
            } else {
                push_class_range(re, lo, hi);
            }
        }
    }
    re.push(']');
}

fn push_class_range(re: &mut String, lo: char, hi: char) {
    push_class_char(re, lo);
    if lo < hi {
        re.push('-');
        push_class_char(re, hi);
    }
}

fn push_class_char(re: &mut String, c: char) {
    if matches!(c, '\\' | ']' | '^' | '-' | '[' | '&' | '~') {
        re.push('\\');
    }
    re.push(c);
}

/// Adds the case-swapped counterparts of any ASCII-letter overlap, so that
/// case folding stays ASCII-only.
fn fold_ascii_case(ranges: &mut Vec<(char, char)>) {
    let mut extra = Vec::new();
    for &(lo, hi) in ranges.iter() {
        let l = lo.max('a');
        let h = hi.min('z');
        if l <= h {
            extra.push((l.to_ascii_uppercase(), h.to_ascii_uppercase()));
        }
        let l = lo.max('A');
        let h = hi.min('Z');
        if l <= h {
            extra.push((l.to_ascii_lowercase(), h.to_ascii_lowercase()));
        }
    }
    ranges.extend(extra);
}
