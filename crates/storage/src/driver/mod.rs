//! Driver trait and implementations.
//!
//! This module defines the [`Driver`] trait, the one operation contract every
//! disk exposes regardless of where its bytes live (local filesystem,
//! memory, ...).

mod local;
#[cfg(feature = "memory")]
mod memory;

pub use self::local::LocalDriver;
#[cfg(feature = "memory")]
pub use self::memory::MemoryDriver;
use crate::content::{ByteReader, Content};
use crate::error::Result;
use crate::models::{Exists, FileInfo, ListOptions, Removal};
use async_trait::async_trait;
use std::fmt;
use std::path::Path;

/// Default pattern of [`Driver::list_files`]: one level deep.
pub const DEFAULT_FILE_PATTERN: &str = "/*";
/// Default pattern of [`Driver::list_directories`]: one level deep.
pub const DEFAULT_DIRECTORY_PATTERN: &str = "/*/";

/// Unified interface for disks.
///
/// All operations are asynchronous and independent of each other; no
/// operation holds a lock across another. It's a glorified filesystem API,
/// but in ✨Rust✨
///
/// # Path Handling
/// All paths are logical: rooted at `/` and relative to the disk root. They
/// are normalized with [`normalize_path`](crate::normalize_path), so a path
/// that would climb out of the root is refused with
/// [`InvalidPath`](crate::error::ErrorKind::InvalidPath). Implementations
/// must enforce this.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use stowage_storage::{Driver, error::Result};
///
/// async fn greet(disk: &dyn Driver) -> Result<Vec<u8>> {
///     disk.make_directory(Path::new("/greetings")).await?;
///     disk.put_file(Path::new("/greetings/hello.txt"), "hello".into()).await?;
///     disk.get_file(Path::new("/greetings/hello.txt")).await
/// }
/// ```
#[async_trait]
pub trait Driver: Send + Sync {
    /// Name of the configured disk. Used for logging only.
    fn name(&self) -> &str;

    /// Whether the disk root is reachable and usable. Never errors.
    async fn test(&self) -> bool;

    /// Create a directory and all missing ancestors.
    ///
    /// Creating a directory that already exists succeeds.
    async fn make_directory(&self, path: &Path) -> Result<bool>;

    /// Recursively remove a directory and its contents.
    ///
    /// Returns `false` if the directory does not exist. The disk root can
    /// never be removed: asking for it fails with
    /// [`Forbidden`](crate::error::ErrorKind::Forbidden) and touches nothing.
    async fn delete_directory(&self, path: &Path) -> Result<bool>;

    /// Remove everything inside a directory but keep the directory itself,
    /// creating it if it is missing.
    async fn empty_directory(&self, path: &Path) -> Result<bool>;

    /// Move a directory, replacing whatever is at `dest`.
    ///
    /// # Notes
    /// - Fails with [`NotFound`](crate::error::ErrorKind::NotFound) when `src` is missing.
    /// - Neither side may be the disk root, and neither may lie inside the
    ///   other: moving `/a/b` onto `/a` fails with
    ///   [`InvalidPath`](crate::error::ErrorKind::InvalidPath).
    async fn move_directory(&self, src: &Path, dest: &Path) -> Result<bool>;

    /// Recursively copy a directory, replacing (not merging into) `dest`.
    ///
    /// Same restrictions as [`move_directory()`](Self::move_directory).
    async fn copy_directory(&self, src: &Path, dest: &Path) -> Result<bool>;

    /// Check what, if anything, lives at `path`.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use std::path::Path;
    /// use stowage_storage::{Driver, Exists};
    /// # use stowage_storage::error::Result;
    /// # async fn example(disk: &dyn Driver) -> Result<()> {
    /// match disk.exists(Path::new("/1/2/3")).await? {
    ///     Exists::File => println!("a file"),
    ///     Exists::Directory => println!("a directory"),
    ///     Exists::None => println!("nothing"),
    /// }
    /// # Ok(())
    /// # }
    /// ```
    async fn exists(&self, path: &Path) -> Result<Exists>;

    async fn directory_exists(&self, path: &Path) -> Result<bool> {
        Ok(self.exists(path).await? == Exists::Directory)
    }

    async fn file_exists(&self, path: &Path) -> Result<bool> {
        Ok(self.exists(path).await? == Exists::File)
    }

    /// Get metadata for a file or directory.
    ///
    /// Returns [`NotFound`](crate::error::ErrorKind::NotFound) if nothing
    /// exists at `path`.
    async fn stat(&self, path: &Path) -> Result<FileInfo>;

    /// List entries matching a glob pattern below `path`.
    ///
    /// `path` and `pattern` are joined into a single expression anchored at
    /// the disk root, expanded, then filtered by
    /// [`options.kind`](ListOptions::kind). The disk root itself is never
    /// part of the result.
    ///
    /// # Notes
    /// - The result is a set: **no ordering is guaranteed**.
    /// - There is no recursive flag, ask for recursion with the pattern
    ///   (`**/*`).
    /// - A pattern ending in `/` only matches directories.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use std::path::Path;
    /// use stowage_storage::{Driver, ListOptions};
    /// # use stowage_storage::error::Result;
    /// # async fn example(disk: &dyn Driver) -> Result<()> {
    /// // Everything below `/1`, at any depth
    /// let all = disk.list(Path::new("/1"), Some("**/*"), ListOptions::all()).await?;
    /// // Only text files directly inside `/1/2/3`
    /// let text = disk.list(Path::new("/1/2/3"), Some("*.txt"), ListOptions::files()).await?;
    /// # Ok(())
    /// # }
    /// ```
    async fn list(&self, path: &Path, pattern: Option<&str>, options: ListOptions) -> Result<Vec<FileInfo>>;

    /// [`list()`](Self::list) restricted to directories, one level deep
    /// unless the pattern says otherwise.
    async fn list_directories(&self, path: &Path, pattern: Option<&str>) -> Result<Vec<FileInfo>> {
        let pattern = pattern.unwrap_or(DEFAULT_DIRECTORY_PATTERN);
        self.list(path, Some(pattern), ListOptions::directories()).await
    }

    /// [`list()`](Self::list) restricted to files, one level deep unless the
    /// pattern says otherwise.
    async fn list_files(&self, path: &Path, pattern: Option<&str>) -> Result<Vec<FileInfo>> {
        let pattern = pattern.unwrap_or(DEFAULT_FILE_PATTERN);
        self.list(path, Some(pattern), ListOptions::files()).await
    }

    /// Write a file, creating missing ancestor directories.
    ///
    /// # Notes
    /// - Existing files are overwritten.
    /// - [`Content::Stream`] is copied as it is read; the call only returns
    ///   once the stream is drained. If reading or writing fails halfway,
    ///   the partially written file is removed and the error returned.
    async fn put_file(&self, path: &Path, content: Content) -> Result<bool>;

    /// Read a whole file into memory.
    ///
    /// Returns [`NotFound`](crate::error::ErrorKind::NotFound) if the file
    /// does not exist.
    async fn get_file(&self, path: &Path) -> Result<Vec<u8>>;

    /// Open a file for streaming reads.
    ///
    /// The returned reader is single-pass; reading the file again needs a
    /// new call. Returns [`NotFound`](crate::error::ErrorKind::NotFound) if
    /// the file does not exist.
    async fn get_file_stream(&self, path: &Path) -> Result<ByteReader>;

    /// Copy a file, creating missing ancestor directories of `dest`.
    ///
    /// Returns [`NotFound`](crate::error::ErrorKind::NotFound) if `src` is
    /// not an existing file. Copying a file onto itself leaves it untouched.
    async fn copy_file(&self, src: &Path, dest: &Path) -> Result<bool>;

    /// Delete a file. A file that is already gone yields `false`.
    async fn delete_file(&self, path: &Path) -> Result<bool>;

    /// Delete every file matched by
    /// [`list_files(path, pattern)`](Self::list_files).
    ///
    /// Best-effort: a file that fails to delete is logged, reported with
    /// `removed: false` and does not stop the rest of the batch.
    async fn delete_files(&self, path: &Path, pattern: Option<&str>) -> Result<Vec<Removal>> {
        let targets = self.list_files(path, pattern).await?;
        tracing::info!(disk = self.name(), path = %path.display(), count = targets.len(), "Deleting files");
        let mut removals = Vec::with_capacity(targets.len());
        for target in targets {
            let removed = match self.delete_file(&target.filename).await {
                Ok(removed) => removed,
                Err(err) => {
                    tracing::warn!(disk = self.name(), path = %target.filename.display(), error = ?err, "Failed to delete file");
                    false
                },
            };
            removals.push(Removal { filename: target.filename, removed });
        }
        Ok(removals)
    }
}

impl fmt::Debug for dyn Driver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Driver").field("name", &self.name()).finish_non_exhaustive()
    }
}
