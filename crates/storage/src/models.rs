//! Storage models.
//!
//! These types are what [`Driver`](crate::Driver) operations hand back to the
//! caller: metadata snapshots, existence results and listing options.

use std::path::{Path, PathBuf};
use time::OffsetDateTime;

use crate::path::logical;

/// What kind of entry a [`FileInfo`] describes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EntryKind {
    File,
    Directory,
}

/// Tri-state result of [`Driver::exists`](crate::Driver::exists).
///
/// Absence is a valid outcome, not an error.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Exists {
    File,
    Directory,
    #[default]
    None,
}
impl From<EntryKind> for Exists {
    fn from(kind: EntryKind) -> Self {
        match kind {
            EntryKind::File => Self::File,
            EntryKind::Directory => Self::Directory,
        }
    }
}

/// Which entry kinds a listing keeps after glob expansion.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ListKind {
    File,
    Directory,
    #[default]
    Both,
}
impl ListKind {
    pub fn accepts(self, kind: EntryKind) -> bool {
        match self {
            Self::File => kind == EntryKind::File,
            Self::Directory => kind == EntryKind::Directory,
            Self::Both => true,
        }
    }
}

/// Options for [`Driver::list`](crate::Driver::list).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ListOptions {
    pub kind: ListKind,
}
impl ListOptions {
    pub fn files() -> Self {
        Self { kind: ListKind::File }
    }

    pub fn directories() -> Self {
        Self { kind: ListKind::Directory }
    }

    pub fn all() -> Self {
        Self { kind: ListKind::Both }
    }
}

/// Outcome of deleting one file targeted by
/// [`Driver::delete_files`](crate::Driver::delete_files).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Removal {
    /// Logical path of the targeted file
    pub filename: PathBuf,
    /// Whether the file was actually removed
    pub removed: bool,
}

/// Metadata snapshot of one filesystem entry at inspection time.
///
/// Created fresh on every stat or list call and never mutated afterwards.
/// There is no "missing" [`FileInfo`]: absence is reported through
/// [`NotFound`](crate::error::ErrorKind::NotFound) or [`Exists::None`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    /// Logical path within the disk, always starting with `/`
    pub filename: PathBuf,
    /// Host path actually touched, when the backend has one
    pub resolved_path: Option<PathBuf>,
    /// Logical parent directory of `filename`
    pub path: PathBuf,
    pub basename: String,
    /// Extension without the leading dot
    pub extension: Option<String>,
    /// MIME type guessed from the extension
    pub mime: Option<String>,
    /// MIME type suitable for a `Content-Type` header (charset included)
    pub content_type: Option<String>,
    pub kind: EntryKind,
    /// Size in bytes
    pub size: u64,
    /// Not every platform records creation time
    pub created_at: Option<OffsetDateTime>,
    pub modified_at: OffsetDateTime,
}

impl FileInfo {
    /// Build a [`FileInfo`] from a normalized path relative to the disk root.
    pub fn new(
        relative: &Path,
        kind: EntryKind,
        size: u64,
        created_at: Option<OffsetDateTime>,
        modified_at: OffsetDateTime,
    ) -> Self {
        let filename = logical(relative);
        let path = filename.parent().map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from("/"));
        let basename = relative.file_name().map(|name| name.to_string_lossy().into_owned()).unwrap_or_default();
        let extension = relative.extension().map(|ext| ext.to_string_lossy().into_owned());
        let mime = match kind {
            EntryKind::File => mime_guess::from_path(relative).first().map(|m| m.essence_str().to_string()),
            EntryKind::Directory => None,
        };
        let content_type = mime.as_deref().map(content_type);
        Self {
            filename,
            resolved_path: None,
            path,
            basename,
            extension,
            mime,
            content_type,
            kind,
            size,
            created_at,
            modified_at,
        }
    }

    pub fn with_resolved_path(mut self, resolved: impl Into<PathBuf>) -> Self {
        self.resolved_path = Some(resolved.into());
        self
    }

    /// Always `true`: a [`FileInfo`] only exists for entries that exist.
    pub const fn exists(&self) -> bool {
        true
    }

    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }

    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }
}

/// Textual types get an explicit charset, the same way HTTP servers label them.
fn content_type(mime: &str) -> String {
    let textual = mime.starts_with("text/") || matches!(mime, "application/json" | "application/javascript");
    match textual {
        true => format!("{mime}; charset=utf-8"),
        false => mime.to_string(),
    }
}
