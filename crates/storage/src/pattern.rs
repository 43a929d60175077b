//! Glob expression composition shared by every driver.
//!
//! A listing is always described by one expression anchored at the disk
//! root: the (escaped) directory argument followed by the caller's pattern,
//! e.g. `list("/1/2", Some("*/**"))` becomes `/1/2/*/**`. Drivers walk their
//! entries below the directory and keep those whose logical path matches, so
//! the pattern can never climb out of the root.

use glob::{MatchOptions, Pattern};
use std::path::{Path, PathBuf};

use crate::error::{ErrorKind, Result};
use crate::path::normalize;

/// Matching rules used by every driver. Dot files are only matched by a
/// pattern that spells out the leading dot.
pub(crate) const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: true,
};

/// A glob expression anchored at the disk root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct GlobExpr {
    /// Always starts with `/`, never ends with one (unless it is just `/`)
    pub(crate) expr: String,
    /// Normalized directory every match lies under
    pub(crate) base: PathBuf,
    /// How many levels below `base` a match can be; `None` when `**` is used
    pub(crate) depth: Option<usize>,
    /// Trailing separator in the pattern: only directories match
    pub(crate) dirs_only: bool,
}
impl GlobExpr {
    /// Compose a directory and an optional pattern into one expression.
    ///
    /// The directory is normalized and escaped, so a directory literally
    /// named `[a]` is not mistaken for a character class. The pattern is
    /// kept as-is except that `..` segments are refused.
    pub(crate) fn compose(dir: &Path, pattern: Option<&str>) -> Result<Self> {
        let dir = normalize(dir)?;
        let pattern = pattern.unwrap_or_default();
        if pattern.contains('\0') {
            exn::bail!(ErrorKind::InvalidPattern(pattern.to_string()));
        }

        let mut segments = Vec::new();
        let mut depth = Some(0);
        for component in dir.components() {
            let Some(component) = component.as_os_str().to_str() else {
                exn::bail!(ErrorKind::InvalidPath(dir.clone()));
            };
            segments.push(Pattern::escape(component));
        }
        for segment in pattern.split('/') {
            match segment {
                "" | "." => {},
                ".." => exn::bail!(ErrorKind::InvalidPattern(pattern.to_string())),
                segment => {
                    depth = match segment.contains("**") {
                        true => None,
                        false => depth.map(|depth| depth + 1),
                    };
                    segments.push(segment.to_string());
                },
            }
        }
        // Validate early so a malformed pattern is reported the same way
        // regardless of the driver doing the expansion.
        let expr = format!("/{}", segments.join("/"));
        Pattern::new(&expr).map_err(|e| ErrorKind::InvalidPattern(format!("{pattern}: {}", e.msg)))?;
        Ok(Self { expr, base: dir, depth, dirs_only: pattern.ends_with('/') })
    }

    /// Whether entries `level` directories below `base` can still match.
    pub(crate) fn reaches(&self, level: usize) -> bool {
        self.depth.is_none_or(|depth| level <= depth)
    }

    /// The expression as an in-memory matcher over logical paths.
    pub(crate) fn matcher(&self) -> Result<Pattern> {
        Ok(Pattern::new(&self.expr).map_err(|e| ErrorKind::InvalidPattern(e.msg.to_string()))?)
    }
}
