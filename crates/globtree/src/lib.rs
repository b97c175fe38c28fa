//! globtree: glob pattern compilation, matching, and minimal-visit listing.
//!
//! Provides:
//! - **Glob**: compile a pattern once, then test paths (`matches`) or
//!   enumerate the filesystem (`list`, `list_sync`)
//! - **Pattern syntax**: `*`, `?`, `[a-z]` ranges (negatable, with literal
//!   dangling hyphens), `{a,b}` alternation (nestable, may span `/`), and
//!   `**` across segments
//! - **List trees**: listing visits only the directories that can contain
//!   matches — literal prefixes descend directly, alternatives sharing a
//!   prefix share one walk, `**` becomes a single recursive enumeration
//! - **GlobFs**: a minimal filesystem abstraction with a [`LocalFs`]
//!   implementation; implement it yourself to list virtual trees
//!
//! ```
//! use globtree::Glob;
//!
//! let glob = Glob::new("src/**/*.rs")?;
//! assert!(glob.matches("src/lib.rs"));
//! assert!(glob.matches("src/walker/filter.rs"));
//! assert!(!glob.matches("tests/lib.rs"));
//! # Ok::<(), globtree::GlobError>(())
//! ```

mod ast;
mod flatten;
mod fs;
mod glob;
mod lexer;
mod parse;
mod style;
mod tree;
mod walker;

pub use fs::LocalFs;
pub use glob::{Glob, GlobBuilder, GlobMatch};
pub use style::{PathContext, PathStyle};
pub use walker::{EntityStream, ListOptions};

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;

/// Errors produced when compiling or listing a glob.
#[derive(Debug, Clone, Error)]
pub enum GlobError {
    /// The pattern is malformed; `pos` is a byte offset into `pattern`.
    #[error("invalid glob `{pattern}` at offset {pos}: {reason}")]
    Parse {
        pattern: String,
        pos: usize,
        reason: ParseErrorKind,
    },
    /// `list` was invoked on a glob compiled for a foreign path style.
    #[error("glob was compiled for {glob:?} paths but the platform uses {system:?}")]
    ContextMismatch { glob: PathStyle, system: PathStyle },
    /// `union` of globs that disagree on context or case-sensitivity.
    #[error("cannot union globs with different {0}")]
    IncompatibleUnion(&'static str),
    /// A filesystem error surfaced by the walker.
    #[error(transparent)]
    Walk(#[from] WalkError),
}

/// What exactly is wrong with a malformed pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ParseErrorKind {
    #[error("empty pattern")]
    EmptyPattern,
    #[error("unterminated character class")]
    UnterminatedClass,
    #[error("character class matches nothing")]
    EmptyClass,
    #[error("invalid character range")]
    InvalidRange,
    #[error("`]` outside of a character class")]
    StrayClassEnd,
    #[error("unterminated `{{` group")]
    UnterminatedOptions,
    #[error("`}}` without a matching `{{`")]
    StrayOptionsEnd,
    #[error("trailing `\\` escape")]
    TrailingEscape,
}

/// Errors from filesystem operations within the walker.
#[derive(Debug, Clone, Error)]
pub enum WalkError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("io error: {0}")]
    Io(String),
}

impl WalkError {
    /// Whether this is the adapter's "no such file or directory" error
    /// (POSIX errno 2, Windows errno 3).
    pub fn is_not_found(&self) -> bool {
        matches!(self, WalkError::NotFound(_))
    }

    pub(crate) fn from_io(err: std::io::Error, path: &Path) -> WalkError {
        let message = format!("{}: {}", path.display(), err);
        match err.kind() {
            std::io::ErrorKind::NotFound => WalkError::NotFound(message),
            std::io::ErrorKind::PermissionDenied => WalkError::PermissionDenied(message),
            _ => WalkError::Io(message),
        }
    }
}

impl From<std::io::Error> for WalkError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => WalkError::NotFound(err.to_string()),
            std::io::ErrorKind::PermissionDenied => WalkError::PermissionDenied(err.to_string()),
            _ => WalkError::Io(err.to_string()),
        }
    }
}

/// Kind of directory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    File,
    Directory,
    Symlink,
}

impl EntryKind {
    pub fn is_dir(self) -> bool {
        self == EntryKind::Directory
    }
}

/// A single entry returned by [`GlobFs::list_dir`]: a basename plus kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsEntry {
    pub name: String,
    pub kind: EntryKind,
}

impl FsEntry {
    pub fn file(name: impl Into<String>) -> FsEntry {
        FsEntry {
            name: name.into(),
            kind: EntryKind::File,
        }
    }

    pub fn directory(name: impl Into<String>) -> FsEntry {
        FsEntry {
            name: name.into(),
            kind: EntryKind::Directory,
        }
    }

    pub fn symlink(name: impl Into<String>) -> FsEntry {
        FsEntry {
            name: name.into(),
            kind: EntryKind::Symlink,
        }
    }
}

/// A filesystem entity yielded by listing: its full path plus kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Entity {
    pub path: PathBuf,
    pub kind: EntryKind,
}

/// Minimal read-only filesystem abstraction consumed by the walker.
///
/// Implement this trait to list globs over your own filesystem layer
/// (VFS, archives, test fixtures). When `follow_links` is set, an
/// implementation should report a symlink's kind as that of its target
/// (keeping `Symlink` for dangling links).
#[async_trait]
pub trait GlobFs: Send + Sync {
    /// List the entries of a directory.
    fn list_dir_sync(&self, dir: &Path, follow_links: bool) -> Result<Vec<FsEntry>, WalkError>;

    /// Async variant of [`GlobFs::list_dir_sync`].
    async fn list_dir(&self, dir: &Path, follow_links: bool) -> Result<Vec<FsEntry>, WalkError>;

    /// Resolved physical path, used for symlink-cycle detection when
    /// following links. The default returns the path unchanged.
    fn canonicalize_sync(&self, path: &Path) -> PathBuf {
        path.to_path_buf()
    }

    /// Async variant of [`GlobFs::canonicalize_sync`].
    async fn canonicalize(&self, path: &Path) -> PathBuf {
        path.to_path_buf()
    }

    /// Lists `dir` and everything below it. Errors from the root listing
    /// propagate; an entry that vanishes mid-walk is skipped. When
    /// following links, already-visited physical directories are not
    /// descended into again.
    fn list_dir_recursive_sync(
        &self,
        dir: &Path,
        follow_links: bool,
    ) -> Result<Vec<Entity>, WalkError> {
        let mut visited: HashSet<PathBuf> = HashSet::new();
        if follow_links {
            visited.insert(self.canonicalize_sync(dir));
        }
        let mut results = Vec::new();
        let mut stack = vec![dir.to_path_buf()];
        let mut at_root = true;
        while let Some(current) = stack.pop() {
            let entries = match self.list_dir_sync(&current, follow_links) {
                Ok(entries) => entries,
                Err(err) if err.is_not_found() && !at_root => continue,
                Err(err) => return Err(err),
            };
            at_root = false;
            for entry in entries {
                let path = join_entry(&current, &entry.name);
                if entry.kind == EntryKind::Directory {
                    let descend = if follow_links {
                        visited.insert(self.canonicalize_sync(&path))
                    } else {
                        true
                    };
                    if descend {
                        stack.push(path.clone());
                    }
                }
                results.push(Entity {
                    path,
                    kind: entry.kind,
                });
            }
        }
        Ok(results)
    }

    /// Async variant of [`GlobFs::list_dir_recursive_sync`].
    async fn list_dir_recursive(
        &self,
        dir: &Path,
        follow_links: bool,
    ) -> Result<Vec<Entity>, WalkError> {
        let mut visited: HashSet<PathBuf> = HashSet::new();
        if follow_links {
            visited.insert(self.canonicalize(dir).await);
        }
        let mut results = Vec::new();
        let mut stack = vec![dir.to_path_buf()];
        let mut at_root = true;
        while let Some(current) = stack.pop() {
            let entries = match self.list_dir(&current, follow_links).await {
                Ok(entries) => entries,
                Err(err) if err.is_not_found() && !at_root => continue,
                Err(err) => return Err(err),
            };
            at_root = false;
            for entry in entries {
                let path = join_entry(&current, &entry.name);
                if entry.kind == EntryKind::Directory {
                    let descend = if follow_links {
                        visited.insert(self.canonicalize(&path).await)
                    } else {
                        true
                    };
                    if descend {
                        stack.push(path.clone());
                    }
                }
                results.push(Entity {
                    path,
                    kind: entry.kind,
                });
            }
        }
        Ok(results)
    }
}

/// Joins a listed entry's name onto its directory without accumulating a
/// leading `./` when walking from the current directory.
fn join_entry(dir: &Path, name: &str) -> PathBuf {
    if dir == Path::new(".") {
        PathBuf::from(name)
    } else {
        dir.join(name)
    }
}
