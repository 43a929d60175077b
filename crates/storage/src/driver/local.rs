//! Local filesystem driver.
//!
//! This module provides the reference [`Driver`] implementation: a disk
//! confined to one directory on the host filesystem, accessed through
//! `tokio::fs` for async I/O. Listings walk the tree with `read_dir` and
//! match every entry against the composed glob expression.

use crate::content::{ByteReader, Content};
use crate::error::{ErrorKind, Result};
use crate::pattern::{GlobExpr, MATCH_OPTIONS};
use crate::models::{EntryKind, Exists, FileInfo, ListOptions};
use crate::path::{is_root, logical, normalize};
use crate::Driver;
use async_trait::async_trait;
use std::fs::{Metadata, create_dir_all as sync_create_dir};
use std::io::{Error as IoError, ErrorKind as IoErrorKind};
use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// Local filesystem driver.
///
/// Stores files in a directory on the local filesystem. Every logical path
/// is normalized and joined onto the configured root, and symlinks are only
/// followed while they stay inside it, so no path can climb out of it.
///
/// # Examples
///
/// ```no_run
/// use stowage_storage::LocalDriver;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let disk = LocalDriver::new("uploads", "/srv/uploads")?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct LocalDriver {
    name: String,
    /// Root directory of the disk
    root: PathBuf,
}
impl LocalDriver {
    /// Create a new local driver, creating the root directory if missing.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidPath`](ErrorKind::InvalidPath) if the root is not
    /// absolute, not valid UTF-8, or exists but is not a directory.
    pub fn new(name: impl Into<String>, root: impl AsRef<Path>) -> Result<Self> {
        let driver = Self::detached(name, root)?;
        if driver.root.exists() {
            if !driver.root.is_dir() {
                exn::bail!(ErrorKind::InvalidPath(driver.root));
            }
        } else {
            // Use non-async here; it'll only happen once on disk registration
            // and it's not worth the hassle of making the constructor async.
            sync_create_dir(&driver.root).map_err(|e| ErrorKind::from_io(e, &driver.root))?;
        }
        Ok(driver)
    }

    /// Create a new local driver without touching the filesystem.
    ///
    /// The root may not exist yet; [`test()`](Driver::test) reports whether
    /// it is usable.
    pub fn detached(name: impl Into<String>, root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_absolute() || root.to_str().is_none() {
            exn::bail!(ErrorKind::InvalidPath(root));
        }
        Ok(Self { name: name.into(), root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a logical path into its normalized relative form and the host
    /// path it designates. The host path is always inside the root, even
    /// once symlinks are followed.
    async fn resolve(&self, path: &Path) -> Result<(PathBuf, PathBuf)> {
        let relative = normalize(path)?;
        let absolute = match is_root(&relative) {
            true => self.root.clone(),
            false => self.root.join(&relative),
        };
        self.confine(&absolute, path).await?;
        Ok((relative, absolute))
    }

    /// The root with every symlink resolved; `None` while it does not exist.
    async fn canonical_root(&self) -> Option<PathBuf> {
        fs::canonicalize(&self.root).await.ok()
    }

    /// Fails with `InvalidPath` when `absolute` lands outside the root once
    /// symlinks are followed. For a path that does not exist yet, its deepest
    /// existing ancestor decides.
    async fn confine(&self, absolute: &Path, logical: &Path) -> Result<()> {
        let Some(root) = self.canonical_root().await else {
            return Ok(());
        };
        let mut candidate = absolute.to_path_buf();
        while candidate.starts_with(&self.root) {
            match fs::canonicalize(&candidate).await {
                Ok(target) if target.starts_with(&root) => return Ok(()),
                Ok(_) => exn::bail!(ErrorKind::InvalidPath(logical.to_path_buf())),
                Err(_) => {
                    // Dangling link: its target is unknown.
                    if fs::symlink_metadata(&candidate).await.is_ok_and(|metadata| metadata.is_symlink()) {
                        exn::bail!(ErrorKind::InvalidPath(logical.to_path_buf()));
                    }
                },
            }
            if !candidate.pop() {
                break;
            }
        }
        Ok(())
    }

    /// Host metadata of a walked entry and whether the walk may descend into
    /// it. Symlinks leading outside the root are skipped, the others are
    /// reported but never descended into.
    async fn process_entry(&self, entry: &fs::DirEntry, root: Option<&Path>) -> Result<Option<(Metadata, bool)>> {
        let path = entry.path();
        let file_type = entry.file_type().await.map_err(ErrorKind::Io)?;
        if file_type.is_symlink() {
            let inside = match fs::canonicalize(&path).await {
                Ok(target) => root.is_none_or(|root| target.starts_with(root)),
                Err(_) => false,
            };
            if !inside {
                tracing::debug!(disk = %self.name, path = %path.display(), "Skipping symlink leading outside the root");
                return Ok(None);
            }
        }
        match fs::metadata(&path).await {
            Ok(metadata) => Ok(Some((metadata, file_type.is_dir()))),
            // Deleted since the directory was read.
            Err(err) if err.kind() == IoErrorKind::NotFound => Ok(None),
            Err(err) => exn::bail!(ErrorKind::Io(err)),
        }
    }

    /// Re-use same data collection from host metadata for both list and stat functions
    fn file_info(relative: &Path, absolute: PathBuf, metadata: Metadata) -> Result<FileInfo> {
        let kind = match metadata.is_dir() {
            true => EntryKind::Directory,
            false => EntryKind::File,
        };
        let modified = metadata.modified().map_err(ErrorKind::Io)?.into();
        let created = metadata.created().ok().map(OffsetDateTime::from);
        Ok(FileInfo::new(relative, kind, metadata.len(), created, modified).with_resolved_path(absolute))
    }

    /// Refuse tree operations that would clobber the root, recurse into
    /// themselves or replace one of their own ancestors.
    fn guard_tree(src: &Path, src_rel: &Path, dest: &Path, dest_rel: &Path) -> Result<()> {
        if is_root(src_rel) {
            exn::bail!(ErrorKind::Forbidden(src.to_path_buf()));
        }
        if is_root(dest_rel) {
            exn::bail!(ErrorKind::Forbidden(dest.to_path_buf()));
        }
        if dest_rel.starts_with(src_rel) || src_rel.starts_with(dest_rel) {
            exn::bail!(ErrorKind::InvalidPath(dest.to_path_buf()));
        }
        Ok(())
    }

    /// Fails unless `absolute` is an existing directory.
    async fn require_directory(absolute: &Path, logical: &Path) -> Result<()> {
        let metadata = fs::metadata(absolute).await.map_err(|e| ErrorKind::from_io(e, logical))?;
        if !metadata.is_dir() {
            exn::bail!(ErrorKind::Io(IoError::from(IoErrorKind::NotADirectory)));
        }
        Ok(())
    }

    /// Remove whatever sits at `absolute`; nothing there is fine.
    async fn remove_any(absolute: &Path) -> std::io::Result<()> {
        match fs::symlink_metadata(absolute).await {
            Ok(metadata) if metadata.is_dir() => fs::remove_dir_all(absolute).await,
            Ok(_) => fs::remove_file(absolute).await,
            Err(err) if err.kind() == IoErrorKind::NotFound => Ok(()),
            Err(err) => Err(err),
        }
    }

    /// Recursively copy a directory tree. Symlinks are not followed, so a
    /// link pointing outside the root cannot smuggle content into it.
    async fn copy_tree(from: &Path, to: &Path) -> std::io::Result<()> {
        let mut stack = vec![(from.to_path_buf(), to.to_path_buf())];
        while let Some((src, dest)) = stack.pop() {
            fs::create_dir_all(&dest).await?;
            let mut entries = fs::read_dir(&src).await?;
            while let Some(entry) = entries.next_entry().await? {
                let target = dest.join(entry.file_name());
                let file_type = entry.file_type().await?;
                if file_type.is_dir() {
                    stack.push((entry.path(), target));
                } else if file_type.is_file() {
                    fs::copy(entry.path(), &target).await?;
                } else {
                    tracing::debug!(path = %entry.path().display(), "Skipping non-regular file during copy");
                }
            }
        }
        Ok(())
    }

    /// Drain a stream into `absolute`. On failure the partial file is removed.
    async fn write_stream(absolute: &Path, logical: &Path, mut reader: ByteReader) -> Result<()> {
        let mut file = fs::File::create(absolute).await.map_err(|e| ErrorKind::from_io(e, logical))?;
        let outcome = match tokio::io::copy(&mut reader, &mut file).await {
            Ok(_) => file.flush().await,
            Err(err) => Err(err),
        };
        drop(file);
        if let Err(err) = outcome {
            tracing::warn!(path = %logical.display(), error = %err, "Stream write failed, removing partial file");
            if let Err(cleanup) = fs::remove_file(absolute).await {
                tracing::warn!(path = %logical.display(), error = %cleanup, "Could not remove partial file");
            }
            exn::bail!(ErrorKind::Io(err));
        }
        Ok(())
    }
}

#[async_trait]
impl Driver for LocalDriver {
    fn name(&self) -> &str {
        &self.name
    }

    async fn test(&self) -> bool {
        fs::metadata(&self.root).await.is_ok_and(|metadata| metadata.is_dir())
    }

    async fn make_directory(&self, path: &Path) -> Result<bool> {
        let (_, absolute) = self.resolve(path).await?;
        fs::create_dir_all(&absolute).await.map_err(|e| ErrorKind::from_io(e, path))?;
        Ok(true)
    }

    async fn delete_directory(&self, path: &Path) -> Result<bool> {
        let (relative, absolute) = self.resolve(path).await?;
        if is_root(&relative) {
            exn::bail!(ErrorKind::Forbidden(path.to_path_buf()));
        }
        match fs::metadata(&absolute).await {
            Ok(metadata) if metadata.is_dir() => {},
            Ok(_) => exn::bail!(ErrorKind::Io(IoError::from(IoErrorKind::NotADirectory))),
            Err(err) if err.kind() == IoErrorKind::NotFound => return Ok(false),
            Err(err) => exn::bail!(ErrorKind::from_io(err, path)),
        }
        tracing::info!(disk = %self.name, path = %path.display(), "Deleting directory");
        fs::remove_dir_all(&absolute).await.map_err(|e| ErrorKind::from_io(e, path))?;
        Ok(true)
    }

    async fn empty_directory(&self, path: &Path) -> Result<bool> {
        let (_, absolute) = self.resolve(path).await?;
        fs::create_dir_all(&absolute).await.map_err(|e| ErrorKind::from_io(e, path))?;
        tracing::info!(disk = %self.name, path = %path.display(), "Emptying directory");
        let mut entries = fs::read_dir(&absolute).await.map_err(|e| ErrorKind::from_io(e, path))?;
        while let Some(entry) = entries.next_entry().await.map_err(ErrorKind::Io)? {
            Self::remove_any(&entry.path()).await.map_err(ErrorKind::Io)?;
        }
        Ok(true)
    }

    async fn move_directory(&self, src: &Path, dest: &Path) -> Result<bool> {
        let (src_rel, src_abs) = self.resolve(src).await?;
        let (dest_rel, dest_abs) = self.resolve(dest).await?;
        if src_rel == dest_rel {
            Self::require_directory(&src_abs, src).await?;
            return Ok(true);
        }
        Self::guard_tree(src, &src_rel, dest, &dest_rel)?;
        Self::require_directory(&src_abs, src).await?;

        Self::remove_any(&dest_abs).await.map_err(|e| ErrorKind::from_io(e, dest))?;
        if let Some(parent) = dest_abs.parent() {
            fs::create_dir_all(parent).await.map_err(|e| ErrorKind::from_io(e, dest))?;
        }
        match fs::rename(&src_abs, &dest_abs).await {
            Ok(()) => {},
            // Something mounted inside the root; fall back to copy and delete.
            Err(err) if err.kind() == IoErrorKind::CrossesDevices => {
                Self::copy_tree(&src_abs, &dest_abs).await.map_err(|e| ErrorKind::from_io(e, dest))?;
                fs::remove_dir_all(&src_abs).await.map_err(|e| ErrorKind::from_io(e, src))?;
            },
            Err(err) => exn::bail!(ErrorKind::from_io(err, dest)),
        }
        Ok(true)
    }

    async fn copy_directory(&self, src: &Path, dest: &Path) -> Result<bool> {
        let (src_rel, src_abs) = self.resolve(src).await?;
        let (dest_rel, dest_abs) = self.resolve(dest).await?;
        if src_rel == dest_rel {
            Self::require_directory(&src_abs, src).await?;
            return Ok(true);
        }
        Self::guard_tree(src, &src_rel, dest, &dest_rel)?;
        Self::require_directory(&src_abs, src).await?;

        Self::remove_any(&dest_abs).await.map_err(|e| ErrorKind::from_io(e, dest))?;
        Self::copy_tree(&src_abs, &dest_abs).await.map_err(|e| ErrorKind::from_io(e, dest))?;
        Ok(true)
    }

    async fn exists(&self, path: &Path) -> Result<Exists> {
        let (_, absolute) = self.resolve(path).await?;
        match fs::metadata(&absolute).await {
            Ok(metadata) if metadata.is_file() => Ok(Exists::File),
            Ok(metadata) if metadata.is_dir() => Ok(Exists::Directory),
            Ok(_) => Ok(Exists::None),
            Err(err) if matches!(err.kind(), IoErrorKind::NotFound | IoErrorKind::NotADirectory) => Ok(Exists::None),
            Err(err) => exn::bail!(ErrorKind::from_io(err, path)),
        }
    }

    async fn stat(&self, path: &Path) -> Result<FileInfo> {
        let (relative, absolute) = self.resolve(path).await?;
        let metadata = fs::metadata(&absolute).await.map_err(|e| ErrorKind::from_io(e, path))?;
        Self::file_info(&relative, absolute, metadata)
    }

    async fn list(&self, path: &Path, pattern: Option<&str>, options: ListOptions) -> Result<Vec<FileInfo>> {
        let expr = GlobExpr::compose(path, pattern)?;
        let matcher = expr.matcher()?;
        let (base, base_abs) = self.resolve(path).await?;
        tracing::trace!(disk = %self.name, pattern = %expr.expr, "Walking for glob");
        let accepts = |info: &FileInfo| options.kind.accepts(info.kind) && (!expr.dirs_only || info.is_dir());

        let mut found = Vec::new();
        // Without a pattern the expression names the directory itself.
        if !expr.reaches(1) {
            if is_root(&base) {
                return Ok(found);
            }
            let metadata = match fs::metadata(&base_abs).await {
                Ok(metadata) => metadata,
                Err(err) if matches!(err.kind(), IoErrorKind::NotFound | IoErrorKind::NotADirectory) => return Ok(found),
                Err(err) => exn::bail!(ErrorKind::from_io(err, path)),
            };
            let info = Self::file_info(&base, base_abs, metadata)?;
            if accepts(&info) {
                found.push(info);
            }
            return Ok(found);
        }

        let root = self.canonical_root().await;
        let mut stack = vec![(base, 0)];
        while let Some((dir, level)) = stack.pop() {
            let mut entries = match fs::read_dir(self.root.join(&dir)).await {
                Ok(entries) => entries,
                Err(err) if matches!(err.kind(), IoErrorKind::NotFound | IoErrorKind::NotADirectory) => continue,
                Err(err) => exn::bail!(ErrorKind::from_io(err, &logical(&dir))),
            };
            let level = level + 1;
            while let Some(entry) = entries.next_entry().await.map_err(ErrorKind::Io)? {
                let relative = dir.join(entry.file_name());
                let Some((metadata, descend)) = self.process_entry(&entry, root.as_deref()).await? else {
                    continue;
                };
                if descend && expr.reaches(level + 1) {
                    stack.push((relative.clone(), level));
                }
                if !matcher.matches_path_with(&logical(&relative), MATCH_OPTIONS) {
                    continue;
                }
                let info = Self::file_info(&relative, entry.path(), metadata)?;
                if accepts(&info) {
                    found.push(info);
                }
            }
        }
        Ok(found)
    }

    async fn put_file(&self, path: &Path, content: Content) -> Result<bool> {
        let (relative, absolute) = self.resolve(path).await?;
        if is_root(&relative) {
            exn::bail!(ErrorKind::InvalidPath(path.to_path_buf()));
        }
        // Create parent directories if needed.
        if let Some(parent) = absolute.parent() {
            fs::create_dir_all(parent).await.map_err(|e| ErrorKind::from_io(e, path))?;
        }
        match content {
            Content::Bytes(bytes) => fs::write(&absolute, bytes).await.map_err(|e| ErrorKind::from_io(e, path))?,
            Content::Text(text) => fs::write(&absolute, text).await.map_err(|e| ErrorKind::from_io(e, path))?,
            Content::Stream(reader) => Self::write_stream(&absolute, path, reader).await?,
        }
        Ok(true)
    }

    async fn get_file(&self, path: &Path) -> Result<Vec<u8>> {
        let (_, absolute) = self.resolve(path).await?;
        Ok(fs::read(&absolute).await.map_err(|e| ErrorKind::from_io(e, path))?)
    }

    async fn get_file_stream(&self, path: &Path) -> Result<ByteReader> {
        let (_, absolute) = self.resolve(path).await?;
        let file = fs::File::open(&absolute).await.map_err(|e| ErrorKind::from_io(e, path))?;
        let metadata = file.metadata().await.map_err(ErrorKind::Io)?;
        if metadata.is_dir() {
            exn::bail!(ErrorKind::Io(IoError::from(IoErrorKind::IsADirectory)));
        }
        Ok(Box::new(file))
    }

    async fn copy_file(&self, src: &Path, dest: &Path) -> Result<bool> {
        let (src_rel, src_abs) = self.resolve(src).await?;
        let (dest_rel, dest_abs) = self.resolve(dest).await?;
        if self.exists(src).await? != Exists::File {
            exn::bail!(ErrorKind::NotFound(src.to_path_buf()));
        }
        // Copying a file onto itself would truncate it before reading.
        if src_rel == dest_rel {
            return Ok(true);
        }
        if let Some(parent) = dest_abs.parent() {
            fs::create_dir_all(parent).await.map_err(|e| ErrorKind::from_io(e, dest))?;
        }
        fs::copy(&src_abs, &dest_abs).await.map_err(|e| ErrorKind::from_io(e, dest))?;
        Ok(true)
    }

    async fn delete_file(&self, path: &Path) -> Result<bool> {
        let (_, absolute) = self.resolve(path).await?;
        match fs::remove_file(&absolute).await {
            Ok(()) => Ok(true),
            Err(err) if matches!(err.kind(), IoErrorKind::NotFound | IoErrorKind::NotADirectory | IoErrorKind::IsADirectory) => {
                tracing::debug!(disk = %self.name, path = %path.display(), "No file to delete");
                Ok(false)
            },
            Err(err) => exn::bail!(ErrorKind::from_io(err, path)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ListKind;
    use std::collections::HashSet;

    fn disk() -> (tempfile::TempDir, LocalDriver) {
        let temp_dir = tempfile::tempdir().unwrap();
        let driver = LocalDriver::new("local", temp_dir.path()).unwrap();
        (temp_dir, driver)
    }

    fn filenames(infos: &[FileInfo]) -> HashSet<PathBuf> {
        infos.iter().map(|info| info.filename.clone()).collect()
    }

    /// Reader that yields some bytes then fails.
    struct Broken {
        sent: bool,
    }
    impl tokio::io::AsyncRead for Broken {
        fn poll_read(
            mut self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
            buf: &mut tokio::io::ReadBuf<'_>,
        ) -> std::task::Poll<std::io::Result<()>> {
            if self.sent {
                return std::task::Poll::Ready(Err(IoError::other("connection reset")));
            }
            self.sent = true;
            buf.put_slice(b"partial");
            std::task::Poll::Ready(Ok(()))
        }
    }

    #[test]
    fn test_new_requires_absolute_path() {
        let temp_dir = tempfile::tempdir().unwrap();
        assert!(LocalDriver::new("name", temp_dir.path()).is_ok());
        assert!(LocalDriver::new("name", "relative/path").is_err());
        assert!(LocalDriver::new("name", "./relative").is_err());
    }

    #[test]
    fn test_new_creates_root() {
        let temp_dir = tempfile::tempdir().unwrap();
        let root = temp_dir.path().join("nested/root");
        LocalDriver::new("name", &root).unwrap();
        assert!(root.is_dir());
    }

    #[test]
    fn test_new_rejects_file_root() {
        let temp_dir = tempfile::tempdir().unwrap();
        let root = temp_dir.path().join("file");
        std::fs::write(&root, b"data").unwrap();
        let err = LocalDriver::new("name", &root).unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidPath(_)));
    }

    #[tokio::test]
    async fn test_test_reports_reachability() {
        let temp_dir = tempfile::tempdir().unwrap();
        let missing = LocalDriver::detached("name", temp_dir.path().join("missing")).unwrap();
        assert!(!missing.test().await);
        let (_temp, present) = disk();
        assert!(present.test().await);
    }

    #[tokio::test]
    async fn test_resolve_is_confined() {
        let (temp_dir, driver) = disk();
        let (relative, absolute) = driver.resolve(Path::new("/1/2/../3/file.txt")).await.unwrap();
        assert_eq!(relative, Path::new("1/3/file.txt"));
        assert_eq!(absolute, temp_dir.path().join("1/3/file.txt"));
        let (_, absolute) = driver.resolve(Path::new("/")).await.unwrap();
        assert_eq!(absolute, temp_dir.path());
        // Path traversal is prevented
        assert!(driver.resolve(Path::new("/../../etc/passwd")).await.is_err());
        assert!(driver.resolve(Path::new("1/../../escape")).await.is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlinks_cannot_leave_the_root() {
        let temp_dir = tempfile::tempdir().unwrap();
        let root = temp_dir.path().join("root");
        let driver = LocalDriver::new("name", &root).unwrap();
        std::fs::write(temp_dir.path().join("secret.txt"), b"secret").unwrap();
        std::os::unix::fs::symlink("..", root.join("link")).unwrap();
        std::os::unix::fs::symlink(temp_dir.path().join("secret.txt"), root.join("secret-link.txt")).unwrap();
        std::os::unix::fs::symlink(temp_dir.path().join("nowhere"), root.join("dangling")).unwrap();

        let err = driver.get_file(Path::new("/link/secret.txt")).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidPath(_)));
        assert!(driver.get_file(Path::new("/secret-link.txt")).await.is_err());
        assert!(driver.put_file(Path::new("/link/planted.txt"), "data".into()).await.is_err());
        assert!(driver.put_file(Path::new("/dangling"), "data".into()).await.is_err());
        assert!(driver.stat(Path::new("/link")).await.is_err());
        assert!(driver.list(Path::new("/link"), Some("*"), ListOptions::all()).await.is_err());
        assert!(!temp_dir.path().join("planted.txt").exists());
        assert!(!temp_dir.path().join("nowhere").exists());

        // Escaping links are left out of listings
        let all = driver.list(Path::new("/"), Some("**/*"), ListOptions::all()).await.unwrap();
        assert!(all.is_empty(), "{:?}", filenames(&all));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlinks_inside_the_root_are_followed() {
        let (temp_dir, driver) = disk();
        driver.put_file(Path::new("/real/file.txt"), "data".into()).await.unwrap();
        std::os::unix::fs::symlink(temp_dir.path().join("real"), temp_dir.path().join("alias")).unwrap();
        assert_eq!(driver.get_file(Path::new("/alias/file.txt")).await.unwrap(), b"data");
        let dirs = driver.list_directories(Path::new("/"), None).await.unwrap();
        let expected: HashSet<PathBuf> = ["/alias", "/real"].into_iter().map(PathBuf::from).collect();
        assert_eq!(filenames(&dirs), expected);
    }

    #[tokio::test]
    async fn test_path_security() {
        let temp_dir = tempfile::tempdir().unwrap();
        let root = temp_dir.path().join("root");
        let driver = LocalDriver::new("name", &root).unwrap();
        std::fs::write(temp_dir.path().join("secret.txt"), b"secret").unwrap();

        // Attempts to escape the root should fail
        assert!(driver.get_file(Path::new("/../secret.txt")).await.is_err());
        assert!(driver.get_file(Path::new("a/../../secret.txt")).await.is_err());
        assert!(driver.put_file(Path::new("/../escape.txt"), "data".into()).await.is_err());
        assert!(driver.delete_file(Path::new("/../secret.txt")).await.is_err());
        assert!(driver.delete_directory(Path::new("/..")).await.is_err());
        assert!(driver.list(Path::new("/"), Some("../*"), ListOptions::all()).await.is_err());
        assert!(!temp_dir.path().join("escape.txt").exists());
        assert!(temp_dir.path().join("secret.txt").exists());
    }

    #[tokio::test]
    async fn test_put_and_get_round_trip() {
        let (_temp, driver) = disk();
        let binary: Vec<u8> = (0..=255).collect();
        driver.put_file(Path::new("/bin/all.bytes"), binary.clone().into()).await.unwrap();
        assert_eq!(driver.get_file(Path::new("/bin/all.bytes")).await.unwrap(), binary);

        driver.put_file(Path::new("text.txt"), "ünïcödé".into()).await.unwrap();
        assert_eq!(driver.get_file(Path::new("/text.txt")).await.unwrap(), "ünïcödé".as_bytes());
    }

    #[tokio::test]
    async fn test_put_file_creates_directories() {
        let (temp_dir, driver) = disk();
        driver.put_file(Path::new("/a/b/c/file.txt"), "data".into()).await.unwrap();
        assert!(temp_dir.path().join("a/b/c/file.txt").is_file());
    }

    #[tokio::test]
    async fn test_put_file_rejects_root() {
        let (_temp, driver) = disk();
        let err = driver.put_file(Path::new("/"), "data".into()).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidPath(_)));
    }

    #[tokio::test]
    async fn test_put_file_from_stream() {
        let (_temp, driver) = disk();
        driver.put_file(Path::new("/source.txt"), "streamed".into()).await.unwrap();
        let reader = driver.get_file_stream(Path::new("/source.txt")).await.unwrap();
        driver.put_file(Path::new("/dest/copy.txt"), Content::Stream(reader)).await.unwrap();
        assert_eq!(driver.get_file(Path::new("/dest/copy.txt")).await.unwrap(), b"streamed");
    }

    #[tokio::test]
    async fn test_failed_stream_leaves_no_partial_file() {
        let (temp_dir, driver) = disk();
        let result = driver.put_file(Path::new("/broken.txt"), Content::stream(Broken { sent: false })).await;
        let err = result.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Io(_)));
        assert!(!temp_dir.path().join("broken.txt").exists());
    }

    #[tokio::test]
    async fn test_get_file_not_found() {
        let (_temp, driver) = disk();
        let err = driver.get_file(Path::new("/missing.txt")).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(p) if p == Path::new("/missing.txt")));
        let Err(err) = driver.get_file_stream(Path::new("/missing.txt")).await else {
            panic!("opened a missing file");
        };
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
    }

    #[tokio::test]
    async fn test_get_file_stream_rejects_directory() {
        let (_temp, driver) = disk();
        driver.make_directory(Path::new("/dir")).await.unwrap();
        assert!(driver.get_file_stream(Path::new("/dir")).await.is_err());
    }

    #[tokio::test]
    async fn test_make_directory_is_idempotent() {
        let (temp_dir, driver) = disk();
        assert!(driver.make_directory(Path::new("/1/2/3")).await.unwrap());
        assert!(driver.make_directory(Path::new("/1/2/3")).await.unwrap());
        assert!(temp_dir.path().join("1/2/3").is_dir());
        assert!(driver.directory_exists(Path::new("/1/2/3")).await.unwrap());
    }

    #[tokio::test]
    async fn test_exists() {
        let (_temp, driver) = disk();
        driver.put_file(Path::new("/dir/file.txt"), "data".into()).await.unwrap();
        assert_eq!(driver.exists(Path::new("/dir/file.txt")).await.unwrap(), Exists::File);
        assert_eq!(driver.exists(Path::new("/dir")).await.unwrap(), Exists::Directory);
        assert_eq!(driver.exists(Path::new("/")).await.unwrap(), Exists::Directory);
        assert_eq!(driver.exists(Path::new("/nope")).await.unwrap(), Exists::None);
        // Looking beneath a file is absence, not an error
        assert_eq!(driver.exists(Path::new("/dir/file.txt/child")).await.unwrap(), Exists::None);
        assert!(driver.file_exists(Path::new("/dir/file.txt")).await.unwrap());
        assert!(!driver.file_exists(Path::new("/dir")).await.unwrap());
        assert!(!driver.directory_exists(Path::new("/dir/file.txt")).await.unwrap());
    }

    #[tokio::test]
    async fn test_stat() {
        let (temp_dir, driver) = disk();
        driver.put_file(Path::new("/docs/data.json"), r#"{"a":1}"#.into()).await.unwrap();
        let info = driver.stat(Path::new("docs/data.json")).await.unwrap();
        assert_eq!(info.filename, Path::new("/docs/data.json"));
        assert_eq!(info.path, Path::new("/docs"));
        assert_eq!(info.basename, "data.json");
        assert_eq!(info.extension.as_deref(), Some("json"));
        assert_eq!(info.mime.as_deref(), Some("application/json"));
        assert_eq!(info.content_type.as_deref(), Some("application/json; charset=utf-8"));
        assert_eq!(info.kind, EntryKind::File);
        assert_eq!(info.size, 7);
        assert_eq!(info.resolved_path.as_deref(), Some(temp_dir.path().join("docs/data.json").as_path()));
        assert!(info.exists());

        let dir = driver.stat(Path::new("/docs")).await.unwrap();
        assert_eq!(dir.kind, EntryKind::Directory);

        let err = driver.stat(Path::new("/docs/missing.json")).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
    }

    #[tokio::test]
    async fn test_delete_directory() {
        let (temp_dir, driver) = disk();
        driver.put_file(Path::new("/1/2/3/file.txt"), "data".into()).await.unwrap();
        assert!(driver.delete_directory(Path::new("/1/2")).await.unwrap());
        assert!(!temp_dir.path().join("1/2").exists());
        assert!(temp_dir.path().join("1").is_dir());
        // Already gone
        assert!(!driver.delete_directory(Path::new("/1/2")).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_directory_refuses_root() {
        let (temp_dir, driver) = disk();
        driver.put_file(Path::new("/keep.txt"), "data".into()).await.unwrap();
        for root in ["/", "", ".", "/1/..", "//"] {
            let err = driver.delete_directory(Path::new(root)).await.unwrap_err();
            assert!(matches!(&*err, ErrorKind::Forbidden(_)), "{root:?} was not forbidden");
        }
        assert!(temp_dir.path().join("keep.txt").exists());
        assert!(driver.directory_exists(Path::new("/")).await.unwrap());
    }

    #[tokio::test]
    async fn test_empty_directory() {
        let (temp_dir, driver) = disk();
        driver.put_file(Path::new("/box/a.txt"), "a".into()).await.unwrap();
        driver.put_file(Path::new("/box/inner/b.txt"), "b".into()).await.unwrap();
        assert!(driver.empty_directory(Path::new("/box")).await.unwrap());
        assert!(temp_dir.path().join("box").is_dir());
        assert_eq!(std::fs::read_dir(temp_dir.path().join("box")).unwrap().count(), 0);
        // Missing directories are created
        assert!(driver.empty_directory(Path::new("/fresh")).await.unwrap());
        assert!(temp_dir.path().join("fresh").is_dir());
    }

    #[tokio::test]
    async fn test_empty_root() {
        let (temp_dir, driver) = disk();
        driver.put_file(Path::new("/1/2/file.txt"), "data".into()).await.unwrap();
        driver.empty_directory(Path::new("/")).await.unwrap();
        assert!(temp_dir.path().is_dir());
        assert!(driver.list_directories(Path::new("/"), None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_move_directory_overwrites() {
        let (temp_dir, driver) = disk();
        driver.put_file(Path::new("/src/a.txt"), "new".into()).await.unwrap();
        driver.put_file(Path::new("/dest/stale.txt"), "old".into()).await.unwrap();
        assert!(driver.move_directory(Path::new("/src"), Path::new("/dest")).await.unwrap());
        assert!(!temp_dir.path().join("src").exists());
        assert_eq!(driver.get_file(Path::new("/dest/a.txt")).await.unwrap(), b"new");
        assert!(!driver.file_exists(Path::new("/dest/stale.txt")).await.unwrap());
    }

    #[tokio::test]
    async fn test_move_directory_creates_parents() {
        let (_temp, driver) = disk();
        driver.put_file(Path::new("/src/a.txt"), "a".into()).await.unwrap();
        driver.move_directory(Path::new("/src"), Path::new("/x/y/z")).await.unwrap();
        assert!(driver.file_exists(Path::new("/x/y/z/a.txt")).await.unwrap());
    }

    #[tokio::test]
    async fn test_move_directory_guards() {
        let (_temp, driver) = disk();
        driver.make_directory(Path::new("/src/inner")).await.unwrap();
        let err = driver.move_directory(Path::new("/missing"), Path::new("/dest")).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
        let err = driver.move_directory(Path::new("/"), Path::new("/dest")).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Forbidden(_)));
        let err = driver.move_directory(Path::new("/src"), Path::new("/")).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Forbidden(_)));
        let err = driver.move_directory(Path::new("/src"), Path::new("/src/inner/deeper")).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidPath(_)));
        assert!(driver.directory_exists(Path::new("/src/inner")).await.unwrap());
    }

    #[tokio::test]
    async fn test_copy_directory_replaces_destination() {
        let (_temp, driver) = disk();
        driver.put_file(Path::new("/src/a.txt"), "a".into()).await.unwrap();
        driver.put_file(Path::new("/src/nested/b.txt"), "b".into()).await.unwrap();
        driver.put_file(Path::new("/dest/stale.txt"), "old".into()).await.unwrap();
        assert!(driver.copy_directory(Path::new("/src"), Path::new("/dest")).await.unwrap());
        assert_eq!(driver.get_file(Path::new("/dest/a.txt")).await.unwrap(), b"a");
        assert_eq!(driver.get_file(Path::new("/dest/nested/b.txt")).await.unwrap(), b"b");
        assert!(!driver.file_exists(Path::new("/dest/stale.txt")).await.unwrap());
        // Source untouched
        assert!(driver.file_exists(Path::new("/src/nested/b.txt")).await.unwrap());
    }

    #[tokio::test]
    async fn test_tree_operations_onto_an_ancestor_are_rejected() {
        let (_temp, driver) = disk();
        driver.put_file(Path::new("/a/keep.txt"), "keep".into()).await.unwrap();
        driver.put_file(Path::new("/a/b/inner.txt"), "inner".into()).await.unwrap();
        let err = driver.move_directory(Path::new("/a/b"), Path::new("/a")).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidPath(_)));
        let err = driver.copy_directory(Path::new("/a/b"), Path::new("/")).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Forbidden(_)));
        let err = driver.copy_directory(Path::new("/a/b"), Path::new("a/./")).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidPath(_)));
        assert_eq!(driver.get_file(Path::new("/a/keep.txt")).await.unwrap(), b"keep");
        assert_eq!(driver.get_file(Path::new("/a/b/inner.txt")).await.unwrap(), b"inner");
    }

    #[tokio::test]
    async fn test_copy_directory_into_itself_is_rejected() {
        let (_temp, driver) = disk();
        driver.make_directory(Path::new("/src")).await.unwrap();
        let err = driver.copy_directory(Path::new("/src"), Path::new("/src/copy")).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidPath(_)));
    }

    #[tokio::test]
    async fn test_copy_file() {
        let (_temp, driver) = disk();
        driver.put_file(Path::new("/a.txt"), "data".into()).await.unwrap();
        assert!(driver.copy_file(Path::new("/a.txt"), Path::new("/deep/er/b.txt")).await.unwrap());
        assert_eq!(driver.get_file(Path::new("/deep/er/b.txt")).await.unwrap(), b"data");
        assert_eq!(driver.get_file(Path::new("/a.txt")).await.unwrap(), b"data");
    }

    #[tokio::test]
    async fn test_copy_file_onto_itself_keeps_content() {
        let (_temp, driver) = disk();
        driver.put_file(Path::new("/a.txt"), "data".into()).await.unwrap();
        assert!(driver.copy_file(Path::new("/a.txt"), Path::new("/a.txt")).await.unwrap());
        assert!(driver.copy_file(Path::new("/a.txt"), Path::new("/x/../a.txt")).await.unwrap());
        assert_eq!(driver.get_file(Path::new("/a.txt")).await.unwrap(), b"data");
    }

    #[tokio::test]
    async fn test_copy_file_missing_source() {
        let (_temp, driver) = disk();
        let err = driver.copy_file(Path::new("/missing.txt"), Path::new("/b.txt")).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(p) if p == Path::new("/missing.txt")));
        assert!(!driver.file_exists(Path::new("/b.txt")).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_file_soft_failure() {
        let (_temp, driver) = disk();
        driver.put_file(Path::new("/file.txt"), "data".into()).await.unwrap();
        assert!(driver.delete_file(Path::new("/file.txt")).await.unwrap());
        assert!(!driver.delete_file(Path::new("/file.txt")).await.unwrap());
        assert!(!driver.delete_file(Path::new("/never/existed.txt")).await.unwrap());
    }

    #[tokio::test]
    async fn test_list_counts() {
        let (_temp, driver) = disk();
        // N = 3 files directly under /tree, M = 2 in subdirectories
        for file in ["/tree/a.txt", "/tree/b.txt", "/tree/c.md", "/tree/sub/d.txt", "/tree/sub/deeper/e.txt"] {
            driver.put_file(Path::new(file), "x".into()).await.unwrap();
        }
        assert_eq!(driver.list_files(Path::new("/tree"), None).await.unwrap().len(), 3);
        assert_eq!(driver.list_files(Path::new("/tree"), Some("**/*")).await.unwrap().len(), 5);
        assert_eq!(driver.list_files(Path::new("/tree"), Some("*.txt")).await.unwrap().len(), 2);
        assert_eq!(driver.list_directories(Path::new("/tree"), None).await.unwrap().len(), 1);
        assert_eq!(driver.list_directories(Path::new("/tree"), Some("/**/*/")).await.unwrap().len(), 2);
        assert_eq!(driver.list(Path::new("/tree"), Some("**/*"), ListOptions::all()).await.unwrap().len(), 7);
    }

    #[tokio::test]
    async fn test_list_membership() {
        let (_temp, driver) = disk();
        driver.put_file(Path::new("/1/2/3/a.txt"), "x".into()).await.unwrap();
        driver.put_file(Path::new("/1/2/3/b.txt"), "x".into()).await.unwrap();
        let files = driver.list_files(Path::new("/1/2/3"), None).await.unwrap();
        let expected: HashSet<PathBuf> = ["/1/2/3/a.txt", "/1/2/3/b.txt"].into_iter().map(PathBuf::from).collect();
        assert_eq!(filenames(&files), expected);
        assert!(files.iter().all(|info| info.path == Path::new("/1/2/3")));
    }

    #[tokio::test]
    async fn test_list_never_includes_root() {
        let (_temp, driver) = disk();
        driver.put_file(Path::new("/a.txt"), "x".into()).await.unwrap();
        assert!(driver.list(Path::new("/"), None, ListOptions::all()).await.unwrap().is_empty());
        assert!(driver.list(Path::new("/"), Some("/"), ListOptions::all()).await.unwrap().is_empty());
        let all = driver.list(Path::new("/"), Some("**"), ListOptions::all()).await.unwrap();
        assert!(all.iter().all(|info| info.filename != Path::new("/")));
    }

    #[tokio::test]
    async fn test_list_without_pattern_matches_the_path_itself() {
        let (_temp, driver) = disk();
        driver.make_directory(Path::new("/1/2")).await.unwrap();
        let found = driver.list(Path::new("/1/2"), None, ListOptions { kind: ListKind::Both }).await.unwrap();
        assert_eq!(filenames(&found), HashSet::from([PathBuf::from("/1/2")]));
    }

    #[tokio::test]
    async fn test_list_skips_dot_files() {
        let (_temp, driver) = disk();
        driver.put_file(Path::new("/.hidden"), "x".into()).await.unwrap();
        driver.put_file(Path::new("/shown"), "x".into()).await.unwrap();
        assert_eq!(driver.list_files(Path::new("/"), None).await.unwrap().len(), 1);
        let hidden = driver.list_files(Path::new("/"), Some(".*")).await.unwrap();
        assert_eq!(filenames(&hidden), HashSet::from([PathBuf::from("/.hidden")]));
    }

    #[tokio::test]
    async fn test_list_dot_files_in_subdirectories() {
        let (_temp, driver) = disk();
        driver.put_file(Path::new("/conf/.env"), "x".into()).await.unwrap();
        driver.put_file(Path::new("/conf/app.toml"), "x".into()).await.unwrap();
        driver.put_file(Path::new("/.git/HEAD"), "x".into()).await.unwrap();
        let hidden = driver.list(Path::new("/conf"), Some(".*"), ListOptions::all()).await.unwrap();
        assert_eq!(filenames(&hidden), HashSet::from([PathBuf::from("/conf/.env")]));
        let dirs = driver.list_directories(Path::new("/"), Some(".*/")).await.unwrap();
        assert_eq!(filenames(&dirs), HashSet::from([PathBuf::from("/.git")]));
        // `**` never crosses into dot directories
        let all = driver.list_files(Path::new("/"), Some("**/*")).await.unwrap();
        assert_eq!(filenames(&all), HashSet::from([PathBuf::from("/conf/app.toml")]));
    }

    #[tokio::test]
    async fn test_list_single_file() {
        let (_temp, driver) = disk();
        driver.put_file(Path::new("/dir/a.txt"), "x".into()).await.unwrap();
        let found = driver.list_files(Path::new("/dir/a.txt"), Some("")).await.unwrap();
        assert_eq!(filenames(&found), HashSet::from([PathBuf::from("/dir/a.txt")]));
    }

    #[tokio::test]
    async fn test_list_escapes_directory_names() {
        let (_temp, driver) = disk();
        driver.put_file(Path::new("/[x]/inside.txt"), "x".into()).await.unwrap();
        driver.put_file(Path::new("/x/decoy.txt"), "x".into()).await.unwrap();
        let files = driver.list_files(Path::new("/[x]"), None).await.unwrap();
        assert_eq!(filenames(&files), HashSet::from([PathBuf::from("/[x]/inside.txt")]));
    }

    #[tokio::test]
    async fn test_list_nonexistent_directory() {
        let (_temp, driver) = disk();
        assert!(driver.list_files(Path::new("/nope"), None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_files() {
        let (_temp, driver) = disk();
        for file in ["/d/a.txt", "/d/b.txt", "/d/c.md", "/d/sub/e.txt"] {
            driver.put_file(Path::new(file), "x".into()).await.unwrap();
        }
        let removals = driver.delete_files(Path::new("/d"), Some("/*.txt")).await.unwrap();
        assert_eq!(removals.len(), 2);
        assert!(removals.iter().all(|removal| removal.removed));
        let left = driver.list_files(Path::new("/d"), Some("**/*")).await.unwrap();
        let expected: HashSet<PathBuf> = ["/d/c.md", "/d/sub/e.txt"].into_iter().map(PathBuf::from).collect();
        assert_eq!(filenames(&left), expected);
    }
}
