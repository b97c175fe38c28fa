//! The public [`Glob`] value: construction, matching, union, and listing.

use std::hash::{Hash, Hasher};
use std::str::FromStr;
use std::sync::{Arc, OnceLock};

use regex::Regex;

use crate::ast::{alternatives_to_regex, Ast, Sequence};
use crate::flatten::flatten;
use crate::fs::LocalFs;
use crate::parse::{normalize_sequence, parse};
use crate::style::{PathContext, PathStyle};
use crate::tree::ListTree;
use crate::walker::{self, EntityStream, ListOptions};
use crate::{Entity, GlobError, GlobFs};

/// Characters escaped by [`Glob::quote`].
const QUOTED_CHARS: &[char] = &[
    '*', '{', '[', '?', '\\', '}', ']', ',', '-', '(', ')',
];

/// A compiled glob pattern.
///
/// A `Glob` is immutable after construction and cheap to share across
/// threads. Matching is a pure string test; listing walks a filesystem
/// through the [`GlobFs`] adapter, visiting only directories that can
/// possibly contain matches. The directory-descent plan is built lazily on
/// the first list call and cached.
#[derive(Clone)]
pub struct Glob {
    pattern: String,
    context: PathContext,
    recursive: bool,
    case_sensitive: bool,
    /// The compiled tree, flattened into option-free alternatives.
    alternatives: Vec<Sequence>,
    regex: Regex,
    can_match_absolute: bool,
    can_match_relative: bool,
    tree: OnceLock<Arc<ListTree>>,
}

/// Configures and compiles a [`Glob`].
///
/// ```
/// use globtree::{Glob, PathContext, PathStyle};
///
/// let glob = Glob::builder("foo/*.csv")
///     .context(PathContext::with_current(PathStyle::Posix, "/data"))
///     .case_sensitive(false)
///     .build()?;
/// assert!(glob.matches("/data/foo/REPORT.CSV"));
/// # Ok::<(), globtree::GlobError>(())
/// ```
#[derive(Clone, Debug)]
pub struct GlobBuilder<'a> {
    pattern: &'a str,
    context: Option<PathContext>,
    recursive: bool,
    case_sensitive: Option<bool>,
}

impl<'a> GlobBuilder<'a> {
    pub fn new(pattern: &'a str) -> GlobBuilder<'a> {
        GlobBuilder {
            pattern,
            context: None,
            recursive: false,
            case_sensitive: None,
        }
    }

    /// Sets the path context. Defaults to the platform's.
    pub fn context(&mut self, context: PathContext) -> &mut GlobBuilder<'a> {
        self.context = Some(context);
        self
    }

    /// Convenience for a default context of the given style.
    pub fn style(&mut self, style: PathStyle) -> &mut GlobBuilder<'a> {
        self.context = Some(PathContext::new(style));
        self
    }

    /// When set, the pattern also matches everything below its matches:
    /// the compiled tree is `{pattern,pattern/**}`. Defaults to false.
    pub fn recursive(&mut self, yes: bool) -> &mut GlobBuilder<'a> {
        self.recursive = yes;
        self
    }

    /// Overrides case sensitivity. Defaults to the style's convention:
    /// insensitive for Windows, sensitive otherwise. Folding is
    /// ASCII-only.
    pub fn case_sensitive(&mut self, yes: bool) -> &mut GlobBuilder<'a> {
        self.case_sensitive = Some(yes);
        self
    }

    /// Parses and compiles the pattern.
    pub fn build(&self) -> Result<Glob, GlobError> {
        let context = self.context.clone().unwrap_or_else(PathContext::system);
        let style = context.style();
        let case_sensitive = self
            .case_sensitive
            .unwrap_or_else(|| style.default_case_sensitivity());
        let parsed = parse(self.pattern, style)?;
        let root = if self.recursive {
            let mut suffixed = parsed.clone();
            suffixed.nodes.push(Ast::Separator);
            suffixed.nodes.push(Ast::DoubleStar);
            Sequence::new(vec![Ast::Options(vec![parsed, suffixed])])
        } else {
            parsed
        };
        Ok(Glob::compile(
            self.pattern.to_string(),
            context,
            self.recursive,
            case_sensitive,
            flatten(&root),
        ))
    }
}

impl Glob {
    /// Compiles `pattern` with default options (platform context,
    /// non-recursive, the style's case sensitivity).
    pub fn new(pattern: &str) -> Result<Glob, GlobError> {
        GlobBuilder::new(pattern).build()
    }

    /// Starts a [`GlobBuilder`] for `pattern`.
    pub fn builder(pattern: &str) -> GlobBuilder<'_> {
        GlobBuilder::new(pattern)
    }

    fn compile(
        pattern: String,
        context: PathContext,
        recursive: bool,
        case_sensitive: bool,
        raw_alternatives: Vec<Sequence>,
    ) -> Glob {
        let mut alternatives: Vec<Sequence> = Vec::with_capacity(raw_alternatives.len());
        for mut alternative in raw_alternatives {
            normalize_sequence(&mut alternative);
            if !alternatives.contains(&alternative) {
                alternatives.push(alternative);
            }
        }
        let source = alternatives_to_regex(&alternatives, context.style(), case_sensitive);
        let regex = Regex::new(&source).expect("generated glob regex must be valid");
        let can_match_absolute = alternatives.iter().any(|a| a.leading_root().is_some());
        let can_match_relative = alternatives.iter().any(|a| a.leading_root().is_none());
        Glob {
            pattern,
            context,
            recursive,
            case_sensitive,
            alternatives,
            regex,
            can_match_absolute,
            can_match_relative,
            tree: OnceLock::new(),
        }
    }

    /// The original pattern string.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn context(&self) -> &PathContext {
        &self.context
    }

    pub fn is_recursive(&self) -> bool {
        self.recursive
    }

    pub fn is_case_sensitive(&self) -> bool {
        self.case_sensitive
    }

    /// Escapes `text` so it matches only itself when compiled.
    pub fn quote(text: &str) -> String {
        let mut quoted = String::with_capacity(text.len());
        for c in text.chars() {
            if QUOTED_CHARS.contains(&c) {
                quoted.push('\\');
            }
            quoted.push(c);
        }
        quoted
    }

    /// A glob matching everything `self` or `other` matches.
    ///
    /// Fails when the two disagree on context or case sensitivity.
    pub fn union(&self, other: &Glob) -> Result<Glob, GlobError> {
        if self.context != other.context {
            return Err(GlobError::IncompatibleUnion("contexts"));
        }
        if self.case_sensitive != other.case_sensitive {
            return Err(GlobError::IncompatibleUnion("case sensitivity"));
        }
        let mut alternatives = self.alternatives.clone();
        for alternative in &other.alternatives {
            if !alternatives.contains(alternative) {
                alternatives.push(alternative.clone());
            }
        }
        Ok(Glob::compile(
            format!("{{{},{}}}", self.pattern, other.pattern),
            self.context.clone(),
            false,
            self.case_sensitive,
            alternatives,
        ))
    }

    /// Whether this glob matches `path` as a whole. Never fails: a
    /// malformed path simply does not match.
    ///
    /// The path is normalized first, so `foo/./bar` and `foo/bar` are the
    /// same path. Absolute and relative paths both match when the
    /// context's current directory relates them to the pattern.
    pub fn matches(&self, path: &str) -> bool {
        let style = self.context.style();
        if self.can_match_absolute {
            let absolute = if style.is_absolute(path) {
                Some(path.to_string())
            } else if style.is_absolute(self.context.current()) {
                Some(style.join(self.context.current(), path))
            } else {
                None
            };
            if let Some(absolute) = absolute {
                if self.regex.is_match(&style.normalize(&absolute)) {
                    return true;
                }
            }
        }
        if self.can_match_relative {
            let relative = if style.is_absolute(path) {
                style.relative(path, self.context.current())
            } else {
                Some(path.to_string())
            };
            if let Some(relative) = relative {
                if self.regex.is_match(&style.normalize(&relative)) {
                    return true;
                }
            }
        }
        false
    }

    /// Matches the whole of `path` starting at `start`. Globs only match
    /// entire paths, so any `start` other than 0 is `None`.
    pub fn match_as_prefix<'p>(&self, path: &'p str, start: usize) -> Option<GlobMatch<'p>> {
        if start != 0 {
            return None;
        }
        self.matches(path).then_some(GlobMatch { input: path })
    }

    /// All matches of this glob in `path` from `start`: zero or one.
    pub fn all_matches<'p>(&self, path: &'p str, start: usize) -> Vec<GlobMatch<'p>> {
        self.match_as_prefix(path, start).into_iter().collect()
    }

    fn list_tree(&self) -> Arc<ListTree> {
        self.tree
            .get_or_init(|| {
                Arc::new(ListTree::build(
                    &self.alternatives,
                    self.context.style(),
                    self.case_sensitive,
                ))
            })
            .clone()
    }

    fn check_platform(&self) -> Result<(), GlobError> {
        let system = PathStyle::system();
        if self.context.style() != system {
            return Err(GlobError::ContextMismatch {
                glob: self.context.style(),
                system,
            });
        }
        Ok(())
    }

    /// Lists matching entities on the local filesystem, materialized.
    ///
    /// Fails when the glob's context is not the platform's style. A
    /// missing directory at the listing root or below a literal prefix is
    /// an error; a missing candidate below a wildcard is not a match.
    pub fn list_sync(&self, options: &ListOptions) -> Result<Vec<Entity>, GlobError> {
        self.list_sync_with(&LocalFs, options)
    }

    /// [`Glob::list_sync`] over any [`GlobFs`] implementation.
    pub fn list_sync_with<F: GlobFs + ?Sized>(
        &self,
        fs: &F,
        options: &ListOptions,
    ) -> Result<Vec<Entity>, GlobError> {
        self.check_platform()?;
        let tree = self.list_tree();
        walker::walk_sync(&tree, fs, options, self.case_sensitive)
    }

    /// Lists matching entities on the local filesystem as a lazy stream.
    ///
    /// Must be called within a tokio runtime. Entities are emitted as the
    /// walk produces them, in no guaranteed order; dropping the stream
    /// abandons the walk. Yields the same set as [`Glob::list_sync`].
    pub fn list(&self, options: &ListOptions) -> Result<EntityStream, GlobError> {
        self.list_with(Arc::new(LocalFs), options)
    }

    /// [`Glob::list`] over any [`GlobFs`] implementation.
    pub fn list_with<F: GlobFs + 'static>(
        &self,
        fs: Arc<F>,
        options: &ListOptions,
    ) -> Result<EntityStream, GlobError> {
        self.check_platform()?;
        Ok(walker::spawn_walk(
            self.list_tree(),
            fs,
            options.clone(),
            self.case_sensitive,
        ))
    }
}

impl std::fmt::Debug for Glob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Glob").field(&self.pattern).finish()
    }
}

impl std::fmt::Display for Glob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.pattern.fmt(f)
    }
}

impl FromStr for Glob {
    type Err = GlobError;

    fn from_str(pattern: &str) -> Result<Glob, GlobError> {
        Glob::new(pattern)
    }
}

impl PartialEq for Glob {
    fn eq(&self, other: &Glob) -> bool {
        self.pattern == other.pattern
            && self.context == other.context
            && self.recursive == other.recursive
            && self.case_sensitive == other.case_sensitive
    }
}

impl Eq for Glob {}

impl Hash for Glob {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.pattern.hash(state);
        self.context.hash(state);
        self.recursive.hash(state);
        self.case_sensitive.hash(state);
    }
}

/// A successful whole-path match. The matched range is always the entire
/// input, mirroring an anchored regex match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlobMatch<'p> {
    input: &'p str,
}

impl<'p> GlobMatch<'p> {
    pub fn start(&self) -> usize {
        0
    }

    pub fn end(&self) -> usize {
        self.input.len()
    }

    pub fn as_str(&self) -> &'p str {
        self.input
    }
}
