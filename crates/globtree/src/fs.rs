//! Local-filesystem adapter: `std::fs` for the sync half, `tokio::fs`
//! for the async half.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::{EntryKind, FsEntry, GlobFs, WalkError};

/// [`GlobFs`] over the real filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFs;

/// Resolves an entry's kind, looking through symlinks when asked to.
/// A dangling link stays a link.
fn resolve_kind(
    path: &Path,
    file_type: std::fs::FileType,
    follow_links: bool,
) -> EntryKind {
    if file_type.is_symlink() {
        if follow_links {
            match std::fs::metadata(path) {
                Ok(meta) if meta.is_dir() => EntryKind::Directory,
                Ok(_) => EntryKind::File,
                Err(_) => EntryKind::Symlink,
            }
        } else {
            EntryKind::Symlink
        }
    } else if file_type.is_dir() {
        EntryKind::Directory
    } else {
        EntryKind::File
    }
}

#[async_trait]
impl GlobFs for LocalFs {
    fn list_dir_sync(&self, dir: &Path, follow_links: bool) -> Result<Vec<FsEntry>, WalkError> {
        let read = std::fs::read_dir(dir).map_err(|err| WalkError::from_io(err, dir))?;
        let mut entries = Vec::new();
        for entry in read {
            let entry = entry.map_err(|err| WalkError::from_io(err, dir))?;
            let path = entry.path();
            let file_type = entry
                .file_type()
                .map_err(|err| WalkError::from_io(err, &path))?;
            entries.push(FsEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                kind: resolve_kind(&path, file_type, follow_links),
            });
        }
        Ok(entries)
    }

    async fn list_dir(&self, dir: &Path, follow_links: bool) -> Result<Vec<FsEntry>, WalkError> {
        let mut read = tokio::fs::read_dir(dir)
            .await
            .map_err(|err| WalkError::from_io(err, dir))?;
        let mut entries = Vec::new();
        while let Some(entry) = read
            .next_entry()
            .await
            .map_err(|err| WalkError::from_io(err, dir))?
        {
            let path = entry.path();
            let file_type = entry
                .file_type()
                .await
                .map_err(|err| WalkError::from_io(err, &path))?;
            let kind = if file_type.is_symlink() {
                if follow_links {
                    match tokio::fs::metadata(&path).await {
                        Ok(meta) if meta.is_dir() => EntryKind::Directory,
                        Ok(_) => EntryKind::File,
                        Err(_) => EntryKind::Symlink,
                    }
                } else {
                    EntryKind::Symlink
                }
            } else if file_type.is_dir() {
                EntryKind::Directory
            } else {
                EntryKind::File
            };
            entries.push(FsEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                kind,
            });
        }
        Ok(entries)
    }

    fn canonicalize_sync(&self, path: &Path) -> PathBuf {
        std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
    }

    async fn canonicalize(&self, path: &Path) -> PathBuf {
        tokio::fs::canonicalize(path)
            .await
            .unwrap_or_else(|_| path.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lists_names_and_kinds() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("file.txt"), b"x").unwrap();

        let mut entries = LocalFs.list_dir_sync(dir.path(), true).unwrap();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        assert_eq!(
            entries,
            vec![FsEntry::file("file.txt"), FsEntry::directory("sub")]
        );
    }

    #[test]
    fn missing_directory_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = LocalFs
            .list_dir_sync(&dir.path().join("nope"), true)
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn recursive_listing_joins_paths() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("a/b")).unwrap();
        std::fs::write(dir.path().join("a/b/c.txt"), b"x").unwrap();

        let entities = LocalFs.list_dir_recursive_sync(dir.path(), true).unwrap();
        assert!(entities.iter().any(|e| e.path == dir.path().join("a/b/c.txt")));
        assert!(entities
            .iter()
            .any(|e| e.path == dir.path().join("a/b") && e.kind.is_dir()));
    }

    #[tokio::test]
    async fn async_listing_matches_sync() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("file.txt"), b"x").unwrap();

        let mut sync_entries = LocalFs.list_dir_sync(dir.path(), true).unwrap();
        let mut async_entries = LocalFs.list_dir(dir.path(), true).await.unwrap();
        sync_entries.sort_by(|a, b| a.name.cmp(&b.name));
        async_entries.sort_by(|a, b| a.name.cmp(&b.name));
        assert_eq!(sync_entries, async_entries);
    }
}
