//! In-memory driver.

use crate::content::{ByteReader, Content};
use crate::error::{ErrorKind, Result};
use crate::models::{EntryKind, Exists, FileInfo, ListOptions};
use crate::path::{is_root, normalize};
use crate::pattern::{GlobExpr, MATCH_OPTIONS};
use crate::Driver;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::io::{Cursor, Error as IoError, ErrorKind as IoErrorKind};
use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use tokio::io::AsyncReadExt;
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
enum Node {
    Directory { created: OffsetDateTime },
    File { data: Vec<u8>, created: OffsetDateTime, modified: OffsetDateTime },
}
impl Node {
    fn kind(&self) -> EntryKind {
        match self {
            Self::Directory { .. } => EntryKind::Directory,
            Self::File { .. } => EntryKind::File,
        }
    }

    fn info(&self, relative: &Path) -> FileInfo {
        match self {
            Self::Directory { created } => FileInfo::new(relative, EntryKind::Directory, 0, Some(*created), *created),
            Self::File { data, created, modified } => {
                FileInfo::new(relative, EntryKind::File, data.len() as u64, Some(*created), *modified)
            },
        }
    }
}

type Tree = BTreeMap<PathBuf, Node>;

/// In-memory driver.
///
/// Directories and files live in a map keyed by normalized path behind a
/// [`RwLock`], so every trait method works on `&self`. Follows the same
/// confinement and glob rules as [`LocalDriver`](crate::LocalDriver), which
/// makes it a drop-in disk for tests and scratch space.
///
/// # Examples
///
/// ```
/// use stowage_storage::{Driver, MemoryDriver};
/// use std::path::Path;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let disk = MemoryDriver::with_files([
///     ("/reports/2024.csv", b"year,total"),
/// ]);
/// assert!(disk.file_exists(Path::new("/reports/2024.csv")).await?);
/// assert!(disk.directory_exists(Path::new("/reports")).await?);
/// # Ok(())
/// # }
/// ```
pub struct MemoryDriver {
    name: String,
    created: OffsetDateTime,
    nodes: RwLock<Tree>,
}

impl MemoryDriver {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            created: OffsetDateTime::now_utc(),
            nodes: RwLock::new(Tree::new()),
        }
    }

    /// Create a memory driver pre-populated with files.
    ///
    /// Panics if any path fails validation (e.g. path traversal). If test
    /// setup is wrong, then test should not pass.
    pub fn with_files(files: impl IntoIterator<Item = (impl Into<PathBuf>, impl Into<Vec<u8>>)>) -> Self {
        let driver = Self::new("memory");
        let now = OffsetDateTime::now_utc();
        let mut nodes = Tree::new();
        for (path, data) in files {
            let path = path.into();
            let relative = match normalize(&path) {
                Ok(relative) if !is_root(&relative) => relative,
                // The panic here is DELIBERATE. There is no error result.
                _ => panic!("MemoryDriver::with_files: invalid path {}", path.display()),
            };
            if let Some(parent) = relative.parent()
                && Self::ensure_directories(&mut nodes, parent, now).is_err()
            {
                panic!("MemoryDriver::with_files: file in the way of {}", path.display());
            }
            nodes.insert(relative, Node::File { data: data.into(), created: now, modified: now });
        }
        Self { nodes: RwLock::new(nodes), ..driver }
    }

    /// Change the name of the memory driver.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Create `relative` and every missing ancestor as directories.
    fn ensure_directories(nodes: &mut Tree, relative: &Path, now: OffsetDateTime) -> Result<()> {
        let mut current = PathBuf::new();
        for component in relative.components() {
            current.push(component);
            match nodes.get(&current) {
                Some(Node::Directory { .. }) => {},
                Some(Node::File { .. }) => exn::bail!(ErrorKind::Io(IoError::from(IoErrorKind::NotADirectory))),
                None => {
                    nodes.insert(current.clone(), Node::Directory { created: now });
                },
            }
        }
        Ok(())
    }

    /// Every key strictly below `relative`.
    fn descendants(nodes: &Tree, relative: &Path) -> Vec<PathBuf> {
        nodes.keys().filter(|key| key.starts_with(relative) && key.as_path() != relative).cloned().collect()
    }

    fn remove_tree(nodes: &mut Tree, relative: &Path) {
        for key in Self::descendants(nodes, relative) {
            nodes.remove(&key);
        }
        nodes.remove(relative);
    }

    /// Clone `src` and everything below it onto `dest`.
    fn subtree(nodes: &Tree, src: &Path, dest: &Path) -> Vec<(PathBuf, Node)> {
        nodes
            .iter()
            .filter(|(key, _)| key.starts_with(src))
            .filter_map(|(key, node)| {
                let suffix = key.strip_prefix(src).ok()?;
                let target = match suffix.as_os_str().is_empty() {
                    true => dest.to_path_buf(),
                    false => dest.join(suffix),
                };
                Some((target, node.clone()))
            })
            .collect()
    }

    /// Shared checks of move and copy. Returns `false` when src and dest are
    /// the same directory and there is nothing to do.
    fn check_tree_operation(nodes: &Tree, src: &Path, src_rel: &Path, dest: &Path, dest_rel: &Path) -> Result<bool> {
        if src_rel != dest_rel {
            if is_root(src_rel) {
                exn::bail!(ErrorKind::Forbidden(src.to_path_buf()));
            }
            if is_root(dest_rel) {
                exn::bail!(ErrorKind::Forbidden(dest.to_path_buf()));
            }
            if dest_rel.starts_with(src_rel) || src_rel.starts_with(dest_rel) {
                exn::bail!(ErrorKind::InvalidPath(dest.to_path_buf()));
            }
        }
        match nodes.get(src_rel) {
            _ if is_root(src_rel) => {},
            Some(Node::Directory { .. }) => {},
            Some(Node::File { .. }) => exn::bail!(ErrorKind::Io(IoError::from(IoErrorKind::NotADirectory))),
            None => exn::bail!(ErrorKind::NotFound(src.to_path_buf())),
        }
        Ok(src_rel != dest_rel)
    }

    /// Write a finished buffer as a file, creating its ancestors.
    async fn insert_file(&self, relative: &Path, data: Vec<u8>) -> Result<()> {
        let now = OffsetDateTime::now_utc();
        let mut nodes = self.nodes.write().await;
        let created = match nodes.get(relative) {
            Some(Node::Directory { .. }) => exn::bail!(ErrorKind::Io(IoError::from(IoErrorKind::IsADirectory))),
            Some(Node::File { created, .. }) => *created,
            None => now,
        };
        if let Some(parent) = relative.parent() {
            Self::ensure_directories(&mut nodes, parent, now)?;
        }
        nodes.insert(relative.to_path_buf(), Node::File { data, created, modified: now });
        Ok(())
    }
}
impl Default for MemoryDriver {
    fn default() -> Self {
        Self::new("memory")
    }
}

#[async_trait]
impl Driver for MemoryDriver {
    fn name(&self) -> &str {
        &self.name
    }

    async fn test(&self) -> bool {
        true
    }

    async fn make_directory(&self, path: &Path) -> Result<bool> {
        let relative = normalize(path)?;
        let mut nodes = self.nodes.write().await;
        Self::ensure_directories(&mut nodes, &relative, OffsetDateTime::now_utc())?;
        Ok(true)
    }

    async fn delete_directory(&self, path: &Path) -> Result<bool> {
        let relative = normalize(path)?;
        if is_root(&relative) {
            exn::bail!(ErrorKind::Forbidden(path.to_path_buf()));
        }
        let mut nodes = self.nodes.write().await;
        match nodes.get(&relative) {
            Some(Node::Directory { .. }) => {},
            Some(Node::File { .. }) => exn::bail!(ErrorKind::Io(IoError::from(IoErrorKind::NotADirectory))),
            None => return Ok(false),
        }
        tracing::info!(disk = %self.name, path = %path.display(), "Deleting directory");
        Self::remove_tree(&mut nodes, &relative);
        Ok(true)
    }

    async fn empty_directory(&self, path: &Path) -> Result<bool> {
        let relative = normalize(path)?;
        let mut nodes = self.nodes.write().await;
        Self::ensure_directories(&mut nodes, &relative, OffsetDateTime::now_utc())?;
        tracing::info!(disk = %self.name, path = %path.display(), "Emptying directory");
        for key in Self::descendants(&nodes, &relative) {
            nodes.remove(&key);
        }
        Ok(true)
    }

    async fn move_directory(&self, src: &Path, dest: &Path) -> Result<bool> {
        let src_rel = normalize(src)?;
        let dest_rel = normalize(dest)?;
        let mut nodes = self.nodes.write().await;
        if !Self::check_tree_operation(&nodes, src, &src_rel, dest, &dest_rel)? {
            return Ok(true);
        }
        let moved = Self::subtree(&nodes, &src_rel, &dest_rel);
        Self::remove_tree(&mut nodes, &dest_rel);
        if let Some(parent) = dest_rel.parent() {
            Self::ensure_directories(&mut nodes, parent, OffsetDateTime::now_utc())?;
        }
        Self::remove_tree(&mut nodes, &src_rel);
        nodes.extend(moved);
        Ok(true)
    }

    async fn copy_directory(&self, src: &Path, dest: &Path) -> Result<bool> {
        let src_rel = normalize(src)?;
        let dest_rel = normalize(dest)?;
        let mut nodes = self.nodes.write().await;
        if !Self::check_tree_operation(&nodes, src, &src_rel, dest, &dest_rel)? {
            return Ok(true);
        }
        let copied = Self::subtree(&nodes, &src_rel, &dest_rel);
        Self::remove_tree(&mut nodes, &dest_rel);
        if let Some(parent) = dest_rel.parent() {
            Self::ensure_directories(&mut nodes, parent, OffsetDateTime::now_utc())?;
        }
        nodes.extend(copied);
        Ok(true)
    }

    async fn exists(&self, path: &Path) -> Result<Exists> {
        let relative = normalize(path)?;
        if is_root(&relative) {
            return Ok(Exists::Directory);
        }
        Ok(self.nodes.read().await.get(&relative).map(|node| node.kind().into()).unwrap_or(Exists::None))
    }

    async fn stat(&self, path: &Path) -> Result<FileInfo> {
        let relative = normalize(path)?;
        if is_root(&relative) {
            return Ok(Node::Directory { created: self.created }.info(&relative));
        }
        match self.nodes.read().await.get(&relative) {
            Some(node) => Ok(node.info(&relative)),
            None => exn::bail!(ErrorKind::NotFound(path.to_path_buf())),
        }
    }

    async fn list(&self, path: &Path, pattern: Option<&str>, options: ListOptions) -> Result<Vec<FileInfo>> {
        let expr = GlobExpr::compose(path, pattern)?;
        let matcher = expr.matcher()?;
        let nodes = self.nodes.read().await;
        Ok(nodes
            .iter()
            .filter(|(_, node)| options.kind.accepts(node.kind()))
            .filter(|(_, node)| !expr.dirs_only || node.kind() == EntryKind::Directory)
            .map(|(relative, node)| node.info(relative))
            .filter(|info| matcher.matches_path_with(&info.filename, MATCH_OPTIONS))
            .collect())
    }

    async fn put_file(&self, path: &Path, content: Content) -> Result<bool> {
        let relative = normalize(path)?;
        if is_root(&relative) {
            exn::bail!(ErrorKind::InvalidPath(path.to_path_buf()));
        }
        // Drain the stream before taking the lock; a failed read stores nothing.
        let data = match content {
            Content::Bytes(bytes) => bytes,
            Content::Text(text) => text.into_bytes(),
            Content::Stream(mut reader) => {
                let mut buffer = Vec::new();
                reader.read_to_end(&mut buffer).await.map_err(ErrorKind::Io)?;
                buffer
            },
        };
        self.insert_file(&relative, data).await?;
        Ok(true)
    }

    async fn get_file(&self, path: &Path) -> Result<Vec<u8>> {
        let relative = normalize(path)?;
        match self.nodes.read().await.get(&relative) {
            Some(Node::File { data, .. }) => Ok(data.clone()),
            Some(Node::Directory { .. }) => exn::bail!(ErrorKind::Io(IoError::from(IoErrorKind::IsADirectory))),
            None if is_root(&relative) => exn::bail!(ErrorKind::Io(IoError::from(IoErrorKind::IsADirectory))),
            None => exn::bail!(ErrorKind::NotFound(path.to_path_buf())),
        }
    }

    async fn get_file_stream(&self, path: &Path) -> Result<ByteReader> {
        let data = self.get_file(path).await?;
        Ok(Box::new(Cursor::new(data)))
    }

    async fn copy_file(&self, src: &Path, dest: &Path) -> Result<bool> {
        let src_rel = normalize(src)?;
        let dest_rel = normalize(dest)?;
        if is_root(&dest_rel) {
            exn::bail!(ErrorKind::Io(IoError::from(IoErrorKind::IsADirectory)));
        }
        let data = match self.nodes.read().await.get(&src_rel) {
            Some(Node::File { data, .. }) => data.clone(),
            _ => exn::bail!(ErrorKind::NotFound(src.to_path_buf())),
        };
        if src_rel != dest_rel {
            self.insert_file(&dest_rel, data).await?;
        }
        Ok(true)
    }

    async fn delete_file(&self, path: &Path) -> Result<bool> {
        let relative = normalize(path)?;
        let mut nodes = self.nodes.write().await;
        match nodes.get(&relative) {
            Some(Node::File { .. }) => {
                nodes.remove(&relative);
                Ok(true)
            },
            _ => {
                tracing::debug!(disk = %self.name, path = %path.display(), "No file to delete");
                Ok(false)
            },
        }
    }
}
