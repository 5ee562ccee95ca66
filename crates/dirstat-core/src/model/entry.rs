/// Intrinsic attributes of a single filesystem object.
///
/// An `Entry` is what the directory reader reports for one name inside a
/// directory. It carries no aggregation state; subtree totals live on the
/// container node that wraps a directory entry.
use compact_str::CompactString;
use std::fs::{FileType, Metadata};
use std::time::SystemTime;

#[cfg(unix)]
use std::os::unix::fs::{FileTypeExt, MetadataExt};

/// Size of one unit of `st_blocks`, independent of the filesystem block size.
pub const BLOCK_SIZE: u64 = 512;

/// Kind of filesystem object, as reported by `lstat()`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EntryKind {
    File,
    Directory,
    Symlink,
    BlockDevice,
    CharDevice,
    Fifo,
    Socket,
    Unknown,
}

impl EntryKind {
    /// Map an OS file type without following symlinks.
    pub fn from_file_type(file_type: &FileType) -> Self {
        if file_type.is_symlink() {
            return Self::Symlink;
        }
        if file_type.is_dir() {
            return Self::Directory;
        }
        if file_type.is_file() {
            return Self::File;
        }
        Self::from_special(file_type)
    }

    #[cfg(unix)]
    fn from_special(file_type: &FileType) -> Self {
        if file_type.is_block_device() {
            Self::BlockDevice
        } else if file_type.is_char_device() {
            Self::CharDevice
        } else if file_type.is_fifo() {
            Self::Fifo
        } else if file_type.is_socket() {
            Self::Socket
        } else {
            Self::Unknown
        }
    }

    #[cfg(not(unix))]
    fn from_special(_file_type: &FileType) -> Self {
        Self::Unknown
    }

    /// `true` for directories. Only directories become container nodes.
    #[inline]
    pub fn is_dir(self) -> bool {
        self == Self::Directory
    }

    /// `true` for regular files.
    #[inline]
    pub fn is_file(self) -> bool {
        self == Self::File
    }
}

/// A single filesystem node's own attributes.
///
/// `size` and `blocks` describe the object itself. For a directory that is
/// the size of the directory inode, never the size of what it contains.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Entry {
    /// Path component only, never a full path.
    pub name: CompactString,
    pub kind: EntryKind,
    /// Logical size in bytes.
    pub size: u64,
    /// Allocated 512-byte blocks.
    pub blocks: u64,
    pub mtime: SystemTime,
    /// Device id of the filesystem holding this object.
    pub device: u64,
    /// Hard link count.
    pub links: u64,
}

impl Entry {
    /// Create an entry of the given kind with all numeric attributes zeroed.
    pub fn new(name: impl Into<CompactString>, kind: EntryKind) -> Self {
        Self {
            name: name.into(),
            kind,
            size: 0,
            blocks: 0,
            mtime: SystemTime::UNIX_EPOCH,
            device: 0,
            links: 1,
        }
    }

    /// A regular file of `size` bytes occupying `blocks` blocks.
    pub fn file(name: impl Into<CompactString>, size: u64, blocks: u64) -> Self {
        Self::new(name, EntryKind::File)
            .with_size(size)
            .with_blocks(blocks)
    }

    /// A directory with no recorded size of its own.
    pub fn directory(name: impl Into<CompactString>) -> Self {
        Self::new(name, EntryKind::Directory)
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.size = size;
        self
    }

    pub fn with_blocks(mut self, blocks: u64) -> Self {
        self.blocks = blocks;
        self
    }

    pub fn with_mtime(mut self, mtime: SystemTime) -> Self {
        self.mtime = mtime;
        self
    }

    pub fn with_device(mut self, device: u64) -> Self {
        self.device = device;
        self
    }

    pub fn with_links(mut self, links: u64) -> Self {
        self.links = links;
        self
    }

    /// Build an entry from `symlink_metadata()` output.
    pub fn from_metadata(name: impl Into<CompactString>, metadata: &Metadata) -> Self {
        let kind = EntryKind::from_file_type(&metadata.file_type());
        let mtime = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        let (blocks, device, links) = unix_fields(metadata);
        Self {
            name: name.into(),
            kind,
            size: metadata.len(),
            blocks,
            mtime,
            device,
            links,
        }
    }

    /// Bytes actually allocated on disk.
    #[inline]
    pub fn allocated_bytes(&self) -> u64 {
        self.blocks * BLOCK_SIZE
    }

    #[inline]
    pub fn is_dir(&self) -> bool {
        self.kind.is_dir()
    }
}

#[cfg(unix)]
fn unix_fields(metadata: &Metadata) -> (u64, u64, u64) {
    (metadata.blocks(), metadata.dev(), metadata.nlink())
}

#[cfg(not(unix))]
fn unix_fields(metadata: &Metadata) -> (u64, u64, u64) {
    // No st_blocks here: round the logical size up to whole blocks.
    (metadata.len().div_ceil(BLOCK_SIZE), 0, 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_file_builder() {
        let mtime = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000);
        let entry = Entry::file("a.txt", 100, 8).with_mtime(mtime).with_device(3);
        assert_eq!(entry.kind, EntryKind::File);
        assert_eq!(entry.size, 100);
        assert_eq!(entry.allocated_bytes(), 4096);
        assert_eq!(entry.mtime, mtime);
        assert_eq!(entry.device, 3);
        assert!(!entry.is_dir());
    }

    #[test]
    fn test_from_metadata() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("data.bin");
        std::fs::write(&path, vec![0u8; 1234]).unwrap();

        let meta = std::fs::symlink_metadata(&path).unwrap();
        let entry = Entry::from_metadata("data.bin", &meta);
        assert_eq!(entry.kind, EntryKind::File);
        assert_eq!(entry.size, 1234);

        let dir_meta = std::fs::symlink_metadata(tmp.path()).unwrap();
        assert!(Entry::from_metadata("tmp", &dir_meta).is_dir());
    }
}
