//! Path handles within a root.

use crate::errors::CoreError;
use crate::fs::ReadAt;
use crate::models::{DeletedFileStat, Stat};
use crate::path;
use crate::range::{BoundedReader, ChunkedReader, RangeResponse, RangeWindow};
use crate::root::Root;
use std::path::PathBuf;

/// Identifies one path inside a [`Root`].
///
/// Holds no metadata of its own: every `stat()` hits the filesystem.
#[derive(Debug, Clone)]
pub struct FileInfo<'r> {
    root: &'r Root,
    rpath: String,
}

impl<'r> FileInfo<'r> {
    pub(crate) fn new(root: &'r Root, rpath: String) -> Self {
        Self { root, rpath }
    }

    pub fn root(&self) -> &'r Root {
        self.root
    }

    pub fn is_root(&self) -> bool {
        self.rpath.is_empty()
    }

    /// Last path segment; the root's own name for the root.
    pub fn name(&self) -> &str {
        if self.is_root() {
            self.root.name()
        } else {
            path::file_name(&self.rpath)
        }
    }

    /// Path relative to the root, `""` for the root itself.
    pub fn rpath(&self) -> &str {
        &self.rpath
    }

    /// Context path, always `/`-rooted.
    pub fn cpath(&self) -> String {
        if self.is_root() {
            format!("/{}", self.root.name())
        } else {
            format!("/{}/{}", self.root.name(), self.rpath)
        }
    }

    pub fn physical_path(&self) -> PathBuf {
        self.root.physical(&self.rpath)
    }

    pub fn parent(&self) -> Option<FileInfo<'r>> {
        path::split_parent(&self.rpath).map(|(dir, _)| Self::new(self.root, dir.to_string()))
    }

    pub fn stat(&self) -> crate::Result<Stat> {
        self.root.stat(&self.rpath)
    }

    pub fn exists(&self) -> bool {
        self.root.fs().exists(&self.physical_path())
    }

    /// Navigates to a direct child.
    pub fn file_info(&self, child: &str) -> crate::Result<FileInfo<'r>> {
        path::check_name(child)?;
        Ok(Self::new(self.root, path::join(&self.rpath, child)))
    }

    /// Lists children in name order.
    pub fn read_dir(&self) -> crate::Result<Vec<FileInfo<'r>>> {
        Ok(self
            .root
            .fs()
            .list_dir(&self.physical_path())?
            .into_iter()
            .map(|name| Self::new(self.root, path::join(&self.rpath, &name)))
            .collect())
    }

    /// Creates this directory and any missing parents.
    pub fn mkdirs(&self) -> crate::Result<()> {
        self.root.check_writable()?;
        self.root
            .transaction(|root| root.fs().create_dir_all(&self.physical_path()))
    }

    /// Deletes a file or an empty directory. On a history-capable root the
    /// entry goes to the trash and its record is returned.
    pub fn delete(&self) -> crate::Result<Option<DeletedFileStat>> {
        self.root.transaction(|root| root.remove_entry(&self.rpath))
    }

    /// Opens the file for absolute-offset reads.
    pub fn content(&self) -> crate::Result<Content> {
        let stat = self.stat()?;
        if !stat.is_file {
            return Err(CoreError::invalid_input(format!("{} is not a file", self.cpath())));
        }
        if !stat.readable {
            return Err(CoreError::permission_denied(self.cpath()));
        }
        let source = self.root.fs().open_read(&self.physical_path())?;
        let length = source.size().map_err(|err| CoreError::io(self.physical_path(), err))?;
        Ok(Content { source, length })
    }
}

/// Byte accessor for one file.
pub struct Content {
    source: Box<dyn ReadAt>,
    length: u64,
}

impl std::fmt::Debug for Content {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Content").field("length", &self.length).finish()
    }
}

impl Content {
    pub fn len(&self) -> u64 {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    pub fn read_at(&self, offset: u64, buf: &mut [u8]) -> std::io::Result<usize> {
        self.source.read_at(offset, buf)
    }

    /// Response descriptor for an optional `Range` header.
    pub fn respond(&self, range_header: Option<&str>) -> RangeResponse {
        RangeResponse::for_request(range_header, self.length)
    }

    pub fn bounded(self, window: RangeWindow) -> BoundedReader<Box<dyn ReadAt>> {
        BoundedReader::new(self.source, window)
    }

    pub fn chunked(self, window: RangeWindow) -> ChunkedReader<Box<dyn ReadAt>> {
        ChunkedReader::new(self.source, window)
    }
}
