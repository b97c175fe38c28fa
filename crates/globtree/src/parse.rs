//! Recursive-descent parser: token stream to pattern tree.
//!
//! A recognized absolute root prefix is consumed off the raw pattern
//! before lexing and becomes a single literal node. Brace groups nest
//! arbitrarily; a comma is an alternative separator only directly inside a
//! brace group and is an ordinary literal everywhere else.

use crate::ast::{push_merged, Ast, Sequence};
use crate::lexer::{tokenize, Spanned, Token};
use crate::style::PathStyle;
use crate::{GlobError, ParseErrorKind};

/// Characters with meaning in a pattern; a root prefix containing any of
/// these is not consumed as a root literal.
const META_CHARS: &[char] = &['*', '?', '[', ']', '{', '}', ',', '\\'];

/// Parses `pattern` into its tree. The returned sequence is normalized:
/// `**` adjacent to non-separator atoms is demoted to `*`, and consecutive
/// `**` segments collapse into one.
pub(crate) fn parse(pattern: &str, style: PathStyle) -> Result<Sequence, GlobError> {
    if pattern.is_empty() {
        return Err(GlobError::Parse {
            pattern: pattern.to_string(),
            pos: 0,
            reason: ParseErrorKind::EmptyPattern,
        });
    }
    let (root, rest) = match style.split_root(pattern) {
        Some((root, rest)) if !root.contains(META_CHARS) => (Some(root), rest),
        _ => (None, pattern),
    };
    // Token spans are relative to `rest`; shift them back to the pattern.
    let offset = pattern.len() - rest.len();
    let tokens = tokenize(rest).map_err(|err| match err {
        GlobError::Parse { pos, reason, .. } => GlobError::Parse {
            pattern: pattern.to_string(),
            pos: pos + offset,
            reason,
        },
        other => other,
    })?;
    let mut parser = Parser {
        pattern,
        offset,
        tokens,
        pos: 0,
    };
    let mut seq = parser.parse_sequence(false)?;
    // parse_sequence(false) stops only at a stray `}`.
    if let Some(spanned) = parser.peek() {
        debug_assert_eq!(spanned.token, Token::CloseOptions);
        return Err(parser.error(spanned.span.start, ParseErrorKind::StrayOptionsEnd));
    }
    if let Some(root) = root {
        seq.nodes.insert(0, Ast::Literal(root));
    }
    normalize_sequence(&mut seq);
    Ok(seq)
}

struct Parser<'a> {
    pattern: &'a str,
    offset: usize,
    tokens: Vec<Spanned<Token>>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Spanned<Token>> {
        self.tokens.get(self.pos)
    }

    fn bump(&mut self) -> Option<Spanned<Token>> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn error(&self, pos: usize, reason: ParseErrorKind) -> GlobError {
        GlobError::Parse {
            pattern: self.pattern.to_string(),
            pos: pos + self.offset,
            reason,
        }
    }

    /// Parses atoms until end of input or, inside a brace group, until a
    /// `,` or `}` (left for the caller to consume).
    fn parse_sequence(&mut self, in_options: bool) -> Result<Sequence, GlobError> {
        let mut nodes: Vec<Ast> = Vec::new();
        while let Some(spanned) = self.peek() {
            match &spanned.token {
                Token::Comma | Token::CloseOptions if in_options => break,
                Token::CloseOptions => break,
                Token::Comma => {
                    // A comma outside any brace group is an ordinary literal.
                    self.bump();
                    push_literal(&mut nodes, ",");
                }
                Token::OpenOptions => {
                    let options = self.parse_options()?;
                    nodes.push(options);
                }
                Token::Literal(text) => {
                    let text = text.clone();
                    self.bump();
                    push_literal(&mut nodes, &text);
                }
                Token::AnyChar => {
                    self.bump();
                    nodes.push(Ast::AnyChar);
                }
                Token::Star => {
                    self.bump();
                    nodes.push(Ast::Star);
                }
                Token::DoubleStar => {
                    self.bump();
                    nodes.push(Ast::DoubleStar);
                }
                Token::Separator => {
                    self.bump();
                    nodes.push(Ast::Separator);
                }
                Token::Class { negated, items } => {
                    let node = Ast::Range {
                        negated: *negated,
                        items: items.clone(),
                    };
                    self.bump();
                    nodes.push(node);
                }
            }
        }
        Ok(Sequence::new(nodes))
    }

    fn parse_options(&mut self) -> Result<Ast, GlobError> {
        let open = self.bump().expect("caller peeked `{`");
        debug_assert_eq!(open.token, Token::OpenOptions);
        let mut alternatives = vec![self.parse_sequence(true)?];
        loop {
            match self.bump() {
                Some(Spanned {
                    token: Token::Comma,
                    ..
                }) => alternatives.push(self.parse_sequence(true)?),
                Some(Spanned {
                    token: Token::CloseOptions,
                    ..
                }) => return Ok(Ast::Options(alternatives)),
                None => {
                    return Err(
                        self.error(open.span.start, ParseErrorKind::UnterminatedOptions)
                    )
                }
                Some(other) => unreachable!("parse_sequence stopped at {other:?}"),
            }
        }
    }
}

fn push_literal(nodes: &mut Vec<Ast>, text: &str) {
    push_merged(nodes, Ast::Literal(text.to_string()));
}

/// Demotes `**` with a non-separator neighbor to `*` and collapses
/// consecutive `**` segments, recursing into options.
pub(crate) fn normalize_sequence(seq: &mut Sequence) {
    for node in &mut seq.nodes {
        if let Ast::Options(alternatives) = node {
            for alt in alternatives {
                normalize_sequence(alt);
            }
        }
    }

    let len = seq.nodes.len();
    for i in 0..len {
        if !matches!(seq.nodes[i], Ast::DoubleStar) {
            continue;
        }
        let open_before = i == 0 || at_boundary(&seq.nodes[i - 1]);
        let open_after = i + 1 == len || matches!(seq.nodes[i + 1], Ast::Separator);
        if !(open_before && open_after) {
            seq.nodes[i] = Ast::Star;
        }
    }

    let mut collapsed: Vec<Ast> = Vec::with_capacity(seq.nodes.len());
    let mut i = 0;
    while i < seq.nodes.len() {
        if matches!(collapsed.last(), Some(Ast::DoubleStar))
            && matches!(seq.nodes[i], Ast::Separator)
            && matches!(seq.nodes.get(i + 1), Some(Ast::DoubleStar))
        {
            i += 2;
            continue;
        }
        collapsed.push(seq.nodes[i].clone());
        i += 1;
    }
    seq.nodes = collapsed;
}

/// Whether `node` ends a segment, making a following `**` segment-initial.
fn at_boundary(node: &Ast) -> bool {
    match node {
        Ast::Separator => true,
        // A root literal ends with its own separator.
        Ast::Literal(text) => text.ends_with('/'),
        _ => false,
    }
}
