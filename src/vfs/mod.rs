//! Virtual filesystem over bundle archives
//!
//! A [`BundleFileSystem`] mounts one open [`ArchiveContainer`] under one
//! base locator. Everything inside is reached through [`BundlePath`] values
//! produced by the filesystem, never constructed directly, so every path
//! knows which mount it belongs to and fails once that mount is closed.
//!
//! [`ArchiveContainer`]: crate::archive::ArchiveContainer

mod filesystem;
mod path;
mod store;

pub use filesystem::{BundleFileSystem, BundlePathMatcher};
pub use path::{AnyPath, BundlePath};
pub use store::BundleFileStore;

use crate::archive::EntryMetadata;
use crate::error::Result;

/// What a walk should do after a visitor callback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisitResult {
    Continue,
    /// Do not descend into this directory (only meaningful before visiting it)
    SkipSubtree,
    Terminate,
}

/// Callbacks for a depth-first tree walk
pub trait FileVisitor<P> {
    fn pre_visit_directory(&mut self, _dir: &P) -> Result<VisitResult> {
        Ok(VisitResult::Continue)
    }

    fn visit_file(&mut self, file: &P, metadata: &EntryMetadata) -> Result<VisitResult>;

    /// Called after all children of `dir` have been visited
    fn post_visit_directory(&mut self, _dir: &P) -> Result<VisitResult> {
        Ok(VisitResult::Continue)
    }
}

/// Capability set of a mounted filesystem: path resolution, tree iteration,
/// metadata queries, and lifecycle.
pub trait VirtualFilesystem {
    type Path: Clone;

    fn get_path(&self, first: &str, more: &[&str]) -> Result<Self::Path>;

    fn root_directory(&self) -> Result<Self::Path>;

    fn read_dir(&self, dir: &Self::Path) -> Result<Vec<Self::Path>>;

    fn metadata(&self, path: &Self::Path) -> Result<EntryMetadata>;

    fn is_open(&self) -> bool;

    fn is_read_only(&self) -> Result<bool>;

    fn close(&self) -> Result<()>;

    /// Depth-first walk from `start`, children before the post-visit of their
    /// parent. Directory listings are taken before descending, so visitors may
    /// touch the filesystem from their callbacks. Depth is bounded by memory,
    /// not by the call stack.
    fn walk(&self, start: &Self::Path, visitor: &mut dyn FileVisitor<Self::Path>) -> Result<()> {
        let mut pending = vec![Step::Enter(start.clone())];
        while let Some(step) = pending.pop() {
            match step {
                Step::Enter(path) => {
                    let metadata = self.metadata(&path)?;
                    if !metadata.is_dir() {
                        if visitor.visit_file(&path, &metadata)? == VisitResult::Terminate {
                            return Ok(());
                        }
                        continue;
                    }
                    match visitor.pre_visit_directory(&path)? {
                        VisitResult::Continue => {}
                        VisitResult::SkipSubtree => continue,
                        VisitResult::Terminate => return Ok(()),
                    }
                    let children = self.read_dir(&path)?;
                    pending.push(Step::Leave(path));
                    // Reversed so the first child is popped first
                    pending.extend(children.into_iter().rev().map(Step::Enter));
                }
                Step::Leave(path) => {
                    if visitor.post_visit_directory(&path)? == VisitResult::Terminate {
                        return Ok(());
                    }
                }
            }
        }
        Ok(())
    }
}

/// Pending work of a walk
enum Step<P> {
    Enter(P),
    Leave(P),
}
