//! Drives a compiled list tree over a filesystem, sync or async.
//!
//! Both walkers run the same iterative frame stack. Error routing is
//! per-frame: frames for listing roots and literal descents propagate
//! everything, while descents below wildcard children silently absorb the
//! adapter's not-found error (a candidate directory that turned out not
//! to exist is simply not a match).
//!
//! The async walker feeds a bounded channel from a single task; entities
//! are emitted as each enumeration produces them, with no ordering
//! guarantee. Dropping the [`EntityStream`] closes the channel, which
//! makes the next send fail and abandons the walk.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::mpsc;
use tracing::trace;

use crate::style::PathStyle;
use crate::tree::{ListTree, ListTreeNode, RELATIVE_ROOT};
use crate::{Entity, FsEntry, GlobError, GlobFs};

/// Options for a single list invocation.
#[derive(Debug, Clone)]
pub struct ListOptions {
    /// Directory that relative globs resolve against. Defaults to `.`.
    pub root: Option<PathBuf>,
    /// Follow symbolic links while enumerating. Defaults to true.
    pub follow_links: bool,
}

impl Default for ListOptions {
    fn default() -> Self {
        Self {
            root: None,
            follow_links: true,
        }
    }
}

/// Lazy sequence of listed entities, produced by [`Glob::list`].
///
/// [`Glob::list`]: crate::Glob::list
pub struct EntityStream {
    receiver: mpsc::Receiver<Result<Entity, GlobError>>,
}

impl Stream for EntityStream {
    type Item = Result<Entity, GlobError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

impl std::fmt::Debug for EntityStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityStream").finish_non_exhaustive()
    }
}

/// One pending directory visit.
struct Frame<'t> {
    dir: PathBuf,
    node: &'t ListTreeNode,
    /// Whether listing errors here surface to the caller. True for roots
    /// and literal descents, false below wildcard children.
    propagate: bool,
}

enum Action<'t> {
    Emit(Entity),
    Descend(Frame<'t>),
}

/// Materializes the full result set in the calling thread.
pub(crate) fn walk_sync<F: GlobFs + ?Sized>(
    tree: &ListTree,
    fs: &F,
    options: &ListOptions,
    case_sensitive: bool,
) -> Result<Vec<Entity>, GlobError> {
    let mut results = Vec::new();
    let mut dedup = tree.can_overlap.then(HashSet::new);
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from(RELATIVE_ROOT));
    for (root_key, node) in &tree.roots {
        let mut stack = vec![Frame {
            dir: root_dir(root_key, options),
            node,
            propagate: true,
        }];
        while let Some(frame) = stack.pop() {
            let mut actions = Vec::new();
            if frame.node.is_recursive() {
                trace!(dir = %frame.dir.display(), "enumerating recursively");
                match fs.list_dir_recursive_sync(&frame.dir, options.follow_links) {
                    Ok(entities) => process_recursive(&frame, entities, &mut actions),
                    Err(err) => {
                        absorb(err, &frame)?;
                        continue;
                    }
                }
            } else if frame.node.is_intermediate() && case_sensitive {
                descend_intermediate(&frame, &mut actions);
            } else {
                trace!(dir = %frame.dir.display(), "enumerating");
                match fs.list_dir_sync(&frame.dir, options.follow_links) {
                    Ok(entries) => process_listing(&frame, &entries, case_sensitive, &mut actions),
                    Err(err) => {
                        absorb(err, &frame)?;
                        continue;
                    }
                }
            }
            for action in actions {
                match action {
                    Action::Emit(entity) => {
                        if accept(&mut dedup, &cwd, &entity) {
                            results.push(entity);
                        }
                    }
                    Action::Descend(child) => stack.push(child),
                }
            }
        }
    }
    Ok(results)
}

/// Feeds the channel behind an [`EntityStream`]. A failed send means the
/// consumer dropped the stream; the walk stops. A propagated error is
/// emitted and ends the walk, mirroring [`walk_sync`] returning `Err`.
pub(crate) async fn walk<F: GlobFs + 'static>(
    tree: Arc<ListTree>,
    fs: Arc<F>,
    options: ListOptions,
    case_sensitive: bool,
    tx: mpsc::Sender<Result<Entity, GlobError>>,
) {
    let mut dedup = tree.can_overlap.then(HashSet::new);
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from(RELATIVE_ROOT));
    for (root_key, node) in &tree.roots {
        let mut stack = vec![Frame {
            dir: root_dir(root_key, &options),
            node,
            propagate: true,
        }];
        while let Some(frame) = stack.pop() {
            let mut actions = Vec::new();
            if frame.node.is_recursive() {
                trace!(dir = %frame.dir.display(), "enumerating recursively");
                match fs.list_dir_recursive(&frame.dir, options.follow_links).await {
                    Ok(entities) => process_recursive(&frame, entities, &mut actions),
                    Err(err) => match absorb(err, &frame) {
                        Ok(()) => continue,
                        Err(err) => {
                            let _ = tx.send(Err(err)).await;
                            return;
                        }
                    },
                }
            } else if frame.node.is_intermediate() && case_sensitive {
                descend_intermediate(&frame, &mut actions);
            } else {
                trace!(dir = %frame.dir.display(), "enumerating");
                match fs.list_dir(&frame.dir, options.follow_links).await {
                    Ok(entries) => process_listing(&frame, &entries, case_sensitive, &mut actions),
                    Err(err) => match absorb(err, &frame) {
                        Ok(()) => continue,
                        Err(err) => {
                            let _ = tx.send(Err(err)).await;
                            return;
                        }
                    },
                }
            }
            for action in actions {
                match action {
                    Action::Emit(entity) => {
                        if accept(&mut dedup, &cwd, &entity) && tx.send(Ok(entity)).await.is_err() {
                            return;
                        }
                    }
                    Action::Descend(child) => stack.push(child),
                }
            }
        }
    }
}

pub(crate) fn spawn_walk<F: GlobFs + 'static>(
    tree: Arc<ListTree>,
    fs: Arc<F>,
    options: ListOptions,
    case_sensitive: bool,
) -> EntityStream {
    let (tx, receiver) = mpsc::channel(16);
    tokio::spawn(walk(tree, fs, options, case_sensitive, tx));
    EntityStream { receiver }
}

fn root_dir(root_key: &str, options: &ListOptions) -> PathBuf {
    if root_key == RELATIVE_ROOT {
        options
            .root
            .clone()
            .unwrap_or_else(|| PathBuf::from(RELATIVE_ROOT))
    } else {
        PathBuf::from(root_key)
    }
}

/// Decides whether a listing error at `frame` is absorbed or surfaced.
fn absorb(err: crate::WalkError, frame: &Frame<'_>) -> Result<(), GlobError> {
    if err.is_not_found() && !frame.propagate {
        trace!(dir = %frame.dir.display(), "candidate directory does not exist");
        Ok(())
    } else {
        Err(err.into())
    }
}

/// Joins without accumulating a leading `./` on relative results.
fn clean_join(dir: &Path, name: &str) -> PathBuf {
    if dir == Path::new(RELATIVE_ROOT) {
        PathBuf::from(name)
    } else {
        dir.join(name)
    }
}

fn posix_relative(path: &Path, base: &Path) -> String {
    let relative = path.strip_prefix(base).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// Recursive node: one subtree enumeration filtered by the validator
/// against paths relative to the node's directory.
fn process_recursive(frame: &Frame<'_>, entities: Vec<Entity>, actions: &mut Vec<Action<'_>>) {
    let Some(validator) = &frame.node.validator else {
        return;
    };
    for entity in entities {
        let relative = posix_relative(&entity.path, &frame.dir);
        if validator.is_match(&relative) {
            let path = if frame.dir == Path::new(RELATIVE_ROOT) {
                PathBuf::from(&relative)
            } else {
                entity.path
            };
            actions.push(Action::Emit(Entity {
                path,
                kind: entity.kind,
            }));
        }
    }
}

/// Case-sensitive intermediate node: no enumeration, direct descent into
/// every literal child. Errors below propagate.
fn descend_intermediate<'t>(frame: &Frame<'t>, actions: &mut Vec<Action<'t>>) {
    for child in frame.node.children.as_deref().unwrap_or(&[]) {
        let literal = child
            .literal
            .as_deref()
            .expect("intermediate children are literal");
        actions.push(Action::Descend(Frame {
            dir: clean_join(&frame.dir, literal),
            node: &child.node,
            propagate: true,
        }));
    }
}

/// General node: enumerate once, validate basenames, and descend into
/// directory entries matched by a child key.
fn process_listing<'t>(
    frame: &Frame<'t>,
    entries: &[FsEntry],
    case_sensitive: bool,
    actions: &mut Vec<Action<'t>>,
) {
    let node = frame.node;
    let children = node.children.as_deref().unwrap_or(&[]);
    let mut matched = vec![false; children.len()];
    for entry in entries {
        if let Some(validator) = &node.validator {
            if validator.is_match(&entry.name) {
                actions.push(Action::Emit(Entity {
                    path: clean_join(&frame.dir, &entry.name),
                    kind: entry.kind,
                }));
            }
        }
        for (i, child) in children.iter().enumerate() {
            if child.regex.is_match(&entry.name) {
                matched[i] = true;
                if entry.kind.is_dir() {
                    actions.push(Action::Descend(Frame {
                        dir: clean_join(&frame.dir, &entry.name),
                        node: &child.node,
                        propagate: false,
                    }));
                }
            }
        }
    }
    // A case-insensitive intermediate still enumerates (literal descent
    // could miss differently-cased entries), but a literal child that
    // matched nothing is descended anyway so the adapter raises the same
    // not-found error the case-sensitive descent would have.
    if !case_sensitive && node.is_intermediate() {
        for (i, child) in children.iter().enumerate() {
            if !matched[i] {
                let literal = child
                    .literal
                    .as_deref()
                    .expect("intermediate children are literal");
                actions.push(Action::Descend(Frame {
                    dir: clean_join(&frame.dir, literal),
                    node: &child.node,
                    propagate: true,
                }));
            }
        }
    }
}

/// Applies per-invocation deduplication. Keys are absolute POSIX-normalized
/// strings so one entity reached from both a relative and an absolute root
/// still collides.
fn accept(dedup: &mut Option<HashSet<String>>, cwd: &Path, entity: &Entity) -> bool {
    let Some(seen) = dedup else {
        return true;
    };
    let style = PathStyle::system();
    let path = entity.path.to_string_lossy();
    let absolute = if style.is_absolute(&path) {
        path.into_owned()
    } else {
        style.join(&cwd.to_string_lossy(), &path)
    };
    seen.insert(style.normalize(&absolute))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EntryKind, FsEntry, Glob, WalkError};
    use futures::StreamExt;
    use std::collections::HashMap;

    /// In-memory filesystem for walker tests. Paths are stored relative
    /// (with `""` standing for the listing root `.`) or absolute.
    #[derive(Default)]
    struct MemoryFs {
        dirs: HashSet<PathBuf>,
        files: HashSet<PathBuf>,
        /// link path -> target path (resolved on every lookup).
        symlinks: HashMap<PathBuf, PathBuf>,
        /// Directories listed by their parent but erroring on enumeration,
        /// standing in for entries that vanish between list and descent.
        phantoms: HashSet<PathBuf>,
    }

    impl MemoryFs {
        fn new() -> MemoryFs {
            let mut fs = MemoryFs::default();
            fs.dirs.insert(PathBuf::new());
            fs
        }

        fn add_file(&mut self, path: &str) {
            let path = PathBuf::from(path);
            self.ensure_parents(&path);
            self.files.insert(path);
        }

        fn add_dir(&mut self, path: &str) {
            let path = PathBuf::from(path);
            self.ensure_parents(&path);
            self.dirs.insert(path);
        }

        fn add_symlink(&mut self, link: &str, target: &str) {
            let link = PathBuf::from(link);
            self.ensure_parents(&link);
            self.symlinks.insert(link, PathBuf::from(target));
        }

        fn add_phantom_dir(&mut self, path: &str) {
            let path = PathBuf::from(path);
            self.ensure_parents(&path);
            self.phantoms.insert(path);
        }

        fn ensure_parents(&mut self, path: &Path) {
            let mut current = PathBuf::new();
            for component in path.parent().unwrap_or(Path::new("")).components() {
                current.push(component);
                self.dirs.insert(current.clone());
            }
        }

        /// Resolves symlinks in every prefix, the way a real filesystem
        /// resolves intermediate links.
        fn resolve(&self, path: &Path) -> PathBuf {
            let mut resolved = PathBuf::new();
            for component in path.components() {
                resolved.push(component);
                if let Some(target) = self.symlinks.get(&resolved) {
                    resolved = target.clone();
                }
            }
            resolved
        }

        fn target_kind(&self, link: &Path) -> EntryKind {
            let target = self.resolve(link);
            if self.dirs.contains(&target) {
                EntryKind::Directory
            } else if self.files.contains(&target) {
                EntryKind::File
            } else {
                EntryKind::Symlink
            }
        }
    }

    #[async_trait::async_trait]
    impl GlobFs for MemoryFs {
        fn list_dir_sync(
            &self,
            dir: &Path,
            follow_links: bool,
        ) -> Result<Vec<FsEntry>, WalkError> {
            let base: PathBuf = dir
                .components()
                .filter(|c| !matches!(c, std::path::Component::CurDir))
                .collect();
            let base = self.resolve(&base);
            if self.phantoms.contains(&base) || !self.dirs.contains(&base) {
                return Err(WalkError::NotFound(dir.display().to_string()));
            }
            let name_of = |path: &Path| {
                path.file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default()
            };
            let mut entries = Vec::new();
            for file in &self.files {
                if file.parent() == Some(base.as_path()) {
                    entries.push(FsEntry::file(name_of(file)));
                }
            }
            for sub in self.dirs.iter().chain(&self.phantoms) {
                if sub.parent() == Some(base.as_path()) && !sub.as_os_str().is_empty() {
                    entries.push(FsEntry::directory(name_of(sub)));
                }
            }
            for link in self.symlinks.keys() {
                if link.parent() == Some(base.as_path()) {
                    let kind = if follow_links {
                        self.target_kind(link)
                    } else {
                        EntryKind::Symlink
                    };
                    entries.push(FsEntry {
                        name: name_of(link),
                        kind,
                    });
                }
            }
            Ok(entries)
        }

        async fn list_dir(
            &self,
            dir: &Path,
            follow_links: bool,
        ) -> Result<Vec<FsEntry>, WalkError> {
            self.list_dir_sync(dir, follow_links)
        }
    }

    fn scenario_fs() -> MemoryFs {
        let mut fs = MemoryFs::new();
        fs.add_file("foo/bar");
        fs.add_file("foo/baz/qux");
        fs.add_file("foo/baz/bang");
        fs
    }

    fn list(pattern: &str, fs: &MemoryFs) -> Result<Vec<Entity>, GlobError> {
        Glob::new(pattern)
            .unwrap()
            .list_sync_with(fs, &ListOptions::default())
    }

    fn paths(entities: &[Entity]) -> Vec<String> {
        let mut paths: Vec<String> = entities
            .iter()
            .map(|e| e.path.to_string_lossy().into_owned())
            .collect();
        paths.sort();
        paths
    }

    #[test]
    fn double_star_lists_the_whole_subtree() {
        let entities = list("foo/**", &scenario_fs()).unwrap();
        assert_eq!(
            paths(&entities),
            vec!["foo/bar", "foo/baz", "foo/baz/bang", "foo/baz/qux"]
        );
    }

    #[test]
    fn single_segment_wildcard_lists_one_level() {
        let entities = list("foo/ba?", &scenario_fs()).unwrap();
        assert_eq!(paths(&entities), vec!["foo/bar", "foo/baz"]);
        // The directory entry keeps its kind.
        assert!(entities
            .iter()
            .any(|e| e.path == Path::new("foo/baz") && e.kind.is_dir()));
    }

    #[test]
    fn missing_literal_root_propagates_not_found() {
        let err = list("non/existent/**", &scenario_fs()).unwrap_err();
        assert!(matches!(err, GlobError::Walk(WalkError::NotFound(_))));
    }

    #[test]
    fn wildcard_descent_absorbs_not_found() {
        let mut fs = scenario_fs();
        fs.add_phantom_dir("ghost");
        // `ghost` matches `*` but vanishes on descent; that is not an error.
        let entities = list("*/qux", &fs).unwrap();
        assert!(paths(&entities).is_empty());
        // A literal descent into the same entry still surfaces the error.
        let err = list("ghost/qux", &fs).unwrap_err();
        assert!(matches!(err, GlobError::Walk(WalkError::NotFound(_))));
    }

    #[test]
    fn overlapping_alternatives_deduplicate() {
        let mut fs = MemoryFs::new();
        fs.add_file("aa/f");
        let glob = Glob::new("{a*,*a}/f").unwrap();
        let entities = glob.list_sync_with(&fs, &ListOptions::default()).unwrap();
        assert_eq!(paths(&entities), vec!["aa/f"]);
    }

    #[test]
    fn spliced_literal_alternatives_emit_each_entity_once() {
        // `{ab,a}{,b}/z` renders the `ab` branch twice from different
        // splits; the plan must fuse them so `ab/z` is listed exactly once
        // even with deduplication disabled for this all-literal tree.
        let mut fs = MemoryFs::new();
        fs.add_file("ab/z");
        fs.add_dir("abb");
        fs.add_dir("a");
        let entities = list("{ab,a}{,b}/z", &fs).unwrap();
        assert_eq!(paths(&entities), vec!["ab/z"]);
    }

    #[test]
    fn case_insensitive_descent_finds_other_casings() {
        let mut fs = MemoryFs::new();
        fs.add_file("foo/bar");
        let glob = Glob::builder("FOO/b*").case_sensitive(false).build().unwrap();
        let entities = glob.list_sync_with(&fs, &ListOptions::default()).unwrap();
        assert_eq!(paths(&entities), vec!["foo/bar"]);
    }

    #[test]
    fn case_insensitive_missing_literal_still_errors() {
        let fs = MemoryFs::new();
        let glob = Glob::builder("FOO/b*").case_sensitive(false).build().unwrap();
        let err = glob
            .list_sync_with(&fs, &ListOptions::default())
            .unwrap_err();
        assert!(matches!(err, GlobError::Walk(WalkError::NotFound(_))));
    }

    #[test]
    fn symlinks_followed_and_not() {
        let mut fs = MemoryFs::new();
        fs.add_file("real/data.txt");
        fs.add_symlink("link", "real");

        let glob = Glob::new("**").unwrap();
        let followed = glob.list_sync_with(&fs, &ListOptions::default()).unwrap();
        assert!(followed
            .iter()
            .any(|e| e.path == Path::new("link/data.txt")));

        let unfollowed = glob
            .list_sync_with(
                &fs,
                &ListOptions {
                    follow_links: false,
                    ..Default::default()
                },
            )
            .unwrap();
        assert!(!unfollowed
            .iter()
            .any(|e| e.path == Path::new("link/data.txt")));
        assert!(unfollowed
            .iter()
            .any(|e| e.path == Path::new("link") && e.kind == EntryKind::Symlink));
    }

    #[test]
    fn explicit_list_root_prefixes_results() {
        let mut fs = MemoryFs::new();
        fs.add_file("sub/foo/bar");
        let glob = Glob::new("foo/*").unwrap();
        let entities = glob
            .list_sync_with(
                &fs,
                &ListOptions {
                    root: Some(PathBuf::from("sub")),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(paths(&entities), vec!["sub/foo/bar"]);
    }

    #[test]
    fn absolute_roots_list_from_the_root_key() {
        let mut fs = MemoryFs::new();
        fs.add_file("/abs/x");
        let glob = Glob::new("/abs/*").unwrap();
        let entities = glob.list_sync_with(&fs, &ListOptions::default()).unwrap();
        assert_eq!(paths(&entities), vec!["/abs/x"]);
    }

    #[tokio::test]
    async fn async_walk_yields_the_same_set() {
        let fs = Arc::new(scenario_fs());
        for pattern in ["foo/**", "foo/ba?", "**"] {
            let glob = Glob::new(pattern).unwrap();
            let sync_entities = glob
                .list_sync_with(fs.as_ref(), &ListOptions::default())
                .unwrap();
            let mut stream = glob
                .list_with(fs.clone(), &ListOptions::default())
                .unwrap();
            let mut async_entities = Vec::new();
            while let Some(item) = stream.next().await {
                async_entities.push(item.unwrap());
            }
            assert_eq!(paths(&async_entities), paths(&sync_entities), "{pattern}");
        }
    }

    #[tokio::test]
    async fn async_errors_surface_on_the_stream() {
        let fs = Arc::new(scenario_fs());
        let glob = Glob::new("non/existent/**").unwrap();
        let mut stream = glob.list_with(fs, &ListOptions::default()).unwrap();
        let first = stream.next().await.expect("stream must yield the error");
        assert!(matches!(first, Err(GlobError::Walk(WalkError::NotFound(_)))));
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn dropping_the_stream_abandons_the_walk() {
        let fs = Arc::new(scenario_fs());
        let glob = Glob::new("foo/**").unwrap();
        let mut stream = glob.list_with(fs, &ListOptions::default()).unwrap();
        let first = stream.next().await.expect("at least one entity");
        assert!(first.is_ok());
        drop(stream);
        // Nothing to assert beyond not hanging: the walker's next send
        // fails and the task exits.
    }
}
